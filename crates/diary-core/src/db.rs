use crate::{Error, Note, Session};

/// Persistence abstraction shared by the SQLite, JSON file and remote stores.
///
/// Futures are not required to be `Send`; callers drive them on a
/// current-thread runtime.
#[async_trait::async_trait(?Send)]
pub trait NoteStore {
    /// Create a user and return its session.
    async fn register_user(&self, username: &str, password: Option<&str>)
        -> Result<Session, Error>;

    /// Look up an existing user. Fails with `Error::Auth` for unknown users.
    async fn authenticate(&self, username: &str, password: Option<&str>)
        -> Result<Session, Error>;

    /// All notes owned by the user, in storage order.
    async fn list_notes(&self, user_id: i64) -> Result<Vec<Note>, Error>;

    /// Get a note by ID.
    async fn get_note(&self, user_id: i64, id: i64) -> Result<Option<Note>, Error>;

    /// Create a note, assigning its ID and timestamps.
    async fn create_note(&self, user_id: i64, header: &str, body: &str) -> Result<Note, Error>;

    /// Replace a note's header and body and refresh its update timestamp.
    /// Returns false if the note does not exist.
    async fn update_note(&self, user_id: i64, id: i64, header: &str, body: &str)
        -> Result<bool, Error>;

    /// Delete a note by ID. Returns true if deleted, false if not found.
    async fn delete_note(&self, user_id: i64, id: i64) -> Result<bool, Error>;
}
