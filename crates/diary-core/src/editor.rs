//! What saving the editor means.
//!
//! Saving a note with both fields empty is how a user deletes it, so the
//! decision is made here, before any store is touched. The caller confirms
//! [`SaveAction::ConfirmDelete`] with the user before deleting.

use crate::Note;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveAction {
    /// Nothing was typed into a new note.
    Discard,
    Create {
        header: String,
        body: String,
    },
    Update {
        id: i64,
        header: String,
        body: String,
    },
    /// An existing note was emptied.
    ConfirmDelete { id: i64 },
}

/// Result of applying a [`SaveAction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Created(Note),
    Updated(i64),
    Discarded,
    NotFound(i64),
    NeedsConfirmation(i64),
}

/// Decide what saving `header` and `body` does for the selected note.
pub fn plan_save(selected: Option<i64>, header: &str, body: &str) -> SaveAction {
    let header = header.trim().to_string();
    let body = body.trim().to_string();
    let empty = header.is_empty() && body.is_empty();

    match (selected, empty) {
        (None, true) => SaveAction::Discard,
        (None, false) => SaveAction::Create { header, body },
        (Some(id), true) => SaveAction::ConfirmDelete { id },
        (Some(id), false) => SaveAction::Update { id, header, body },
    }
}
