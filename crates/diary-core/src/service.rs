use chrono::NaiveDateTime;
use regex::Regex;
use tracing::debug;

use crate::{categorize, Error, Note, NoteGroup, NoteStore, SaveAction, SaveOutcome, Session};

/// The main service that contains all business logic.
/// Generic over the store implementation.
pub struct DiaryService<D: NoteStore> {
    store: D,
}

impl<D: NoteStore> DiaryService<D> {
    pub fn new(store: D) -> Self {
        Self { store }
    }

    /// Register a new user.
    pub async fn register(&self, username: &str, password: Option<&str>) -> Result<Session, Error> {
        let username = validate_username(username)?;
        let session = self.store.register_user(username, password).await?;
        debug!(user_id = session.user_id, "registered user");
        Ok(session)
    }

    /// Authenticate an existing user.
    pub async fn authenticate(
        &self,
        username: &str,
        password: Option<&str>,
    ) -> Result<Session, Error> {
        let username = validate_username(username)?;
        self.store.authenticate(username, password).await
    }

    /// List the user's notes matching `query`, grouped by recency relative to `now`.
    pub async fn list(
        &self,
        user_id: i64,
        query: &str,
        now: NaiveDateTime,
    ) -> Result<Vec<NoteGroup>, Error> {
        let notes = self.store.list_notes(user_id).await?;
        debug!(count = notes.len(), query, "categorizing notes");
        categorize(&notes, query, now)
    }

    /// Get a note by ID.
    pub async fn get_note(&self, user_id: i64, id: i64) -> Result<Option<Note>, Error> {
        self.store.get_note(user_id, id).await
    }

    /// Add a new note.
    pub async fn create_note(&self, user_id: i64, header: &str, body: &str) -> Result<Note, Error> {
        self.store.create_note(user_id, header.trim(), body).await
    }

    /// Replace a note's header and body.
    pub async fn update_note(
        &self,
        user_id: i64,
        id: i64,
        header: &str,
        body: &str,
    ) -> Result<bool, Error> {
        self.store.update_note(user_id, id, header.trim(), body).await
    }

    /// Delete a note by ID.
    pub async fn delete_note(&self, user_id: i64, id: i64) -> Result<bool, Error> {
        self.store.delete_note(user_id, id).await
    }

    /// Carry out a planned save. Deletions are handed back to the caller to confirm.
    pub async fn save(&self, user_id: i64, action: SaveAction) -> Result<SaveOutcome, Error> {
        match action {
            SaveAction::Discard => Ok(SaveOutcome::Discarded),
            SaveAction::Create { header, body } => {
                let note = self.create_note(user_id, &header, &body).await?;
                Ok(SaveOutcome::Created(note))
            }
            SaveAction::Update { id, header, body } => {
                if self.update_note(user_id, id, &header, &body).await? {
                    Ok(SaveOutcome::Updated(id))
                } else {
                    Ok(SaveOutcome::NotFound(id))
                }
            }
            SaveAction::ConfirmDelete { id } => Ok(SaveOutcome::NeedsConfirmation(id)),
        }
    }

    /// Search headers and bodies with a regular expression, most recent first.
    pub async fn grep(
        &self,
        user_id: i64,
        pattern: &str,
        case_sensitive: bool,
    ) -> Result<Vec<Note>, Error> {
        let regex = if case_sensitive {
            Regex::new(pattern)
        } else {
            Regex::new(&format!("(?i){}", pattern))
        }
        .map_err(|e| Error::Validation(format!("invalid regex: {}", e)))?;

        let mut matching = Vec::new();
        for note in self.store.list_notes(user_id).await? {
            if regex.is_match(&note.header) || regex.is_match(&note.body) {
                matching.push((note.created()?, note));
            }
        }

        matching.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.id.cmp(&a.1.id)));
        Ok(matching.into_iter().map(|(_, note)| note).collect())
    }
}

fn validate_username(username: &str) -> Result<&str, Error> {
    let username = username.trim();
    if username.is_empty() {
        return Err(Error::Validation("username cannot be empty".into()));
    }
    Ok(username)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{plan_save, Bucket};
    use std::cell::RefCell;

    /// In-memory store used to exercise the service without I/O.
    #[derive(Default)]
    struct MemoryStore {
        users: RefCell<Vec<String>>,
        notes: RefCell<Vec<Note>>,
        clock: RefCell<Vec<String>>,
    }

    impl MemoryStore {
        fn with_clock(times: &[&str]) -> Self {
            let store = Self::default();
            store
                .clock
                .borrow_mut()
                .extend(times.iter().rev().map(|t| t.to_string()));
            store
        }

        fn tick(&self) -> String {
            self.clock
                .borrow_mut()
                .pop()
                .unwrap_or_else(|| "2024-03-15 12:00:00".to_string())
        }
    }

    #[async_trait::async_trait(?Send)]
    impl NoteStore for MemoryStore {
        async fn register_user(&self, username: &str, _: Option<&str>) -> Result<Session, Error> {
            let mut users = self.users.borrow_mut();
            if users.iter().any(|u| u == username) {
                return Err(Error::Validation(format!("user {} already exists", username)));
            }
            users.push(username.to_string());
            Ok(Session {
                user_id: users.len() as i64,
                username: username.to_string(),
                token: None,
            })
        }

        async fn authenticate(&self, username: &str, _: Option<&str>) -> Result<Session, Error> {
            let users = self.users.borrow();
            let pos = users
                .iter()
                .position(|u| u == username)
                .ok_or_else(|| Error::Auth(format!("unknown user {}", username)))?;
            Ok(Session {
                user_id: pos as i64 + 1,
                username: username.to_string(),
                token: None,
            })
        }

        async fn list_notes(&self, user_id: i64) -> Result<Vec<Note>, Error> {
            Ok(self
                .notes
                .borrow()
                .iter()
                .filter(|n| n.user_id == user_id)
                .cloned()
                .collect())
        }

        async fn get_note(&self, user_id: i64, id: i64) -> Result<Option<Note>, Error> {
            Ok(self
                .notes
                .borrow()
                .iter()
                .find(|n| n.user_id == user_id && n.id == id)
                .cloned())
        }

        async fn create_note(&self, user_id: i64, header: &str, body: &str) -> Result<Note, Error> {
            let now = self.tick();
            let mut notes = self.notes.borrow_mut();
            let note = Note {
                id: notes.iter().map(|n| n.id).max().unwrap_or(0) + 1,
                user_id,
                header: header.to_string(),
                body: body.to_string(),
                created_at: now.clone(),
                updated_at: now,
            };
            notes.push(note.clone());
            Ok(note)
        }

        async fn update_note(
            &self,
            user_id: i64,
            id: i64,
            header: &str,
            body: &str,
        ) -> Result<bool, Error> {
            let now = self.tick();
            let mut notes = self.notes.borrow_mut();
            match notes.iter_mut().find(|n| n.user_id == user_id && n.id == id) {
                Some(note) => {
                    note.header = header.to_string();
                    note.body = body.to_string();
                    note.updated_at = now;
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn delete_note(&self, user_id: i64, id: i64) -> Result<bool, Error> {
            let mut notes = self.notes.borrow_mut();
            let before = notes.len();
            notes.retain(|n| !(n.user_id == user_id && n.id == id));
            Ok(notes.len() < before)
        }
    }

    fn reference() -> NaiveDateTime {
        crate::parse_timestamp("2024-03-15 12:00:00").unwrap()
    }

    #[tokio::test]
    async fn test_register_trims_and_rejects_empty() {
        let service = DiaryService::new(MemoryStore::default());

        let session = service.register("  alice ", None).await.unwrap();
        assert_eq!(session.username, "alice");

        assert!(matches!(
            service.register("   ", None).await,
            Err(Error::Validation(_))
        ));

        let again = service.authenticate("alice", None).await.unwrap();
        assert_eq!(again.user_id, session.user_id);

        assert!(matches!(
            service.authenticate("bob", None).await,
            Err(Error::Auth(_))
        ));
    }

    #[tokio::test]
    async fn test_list_groups_only_own_notes() {
        let store = MemoryStore::with_clock(&[
            "2024-01-01 09:00:00",
            "2024-03-15 08:00:00",
            "2024-03-15 09:00:00",
        ]);
        let service = DiaryService::new(store);

        service.create_note(1, "Shopping", "eggs").await.unwrap();
        service.create_note(1, "Meeting", "notes").await.unwrap();
        service.create_note(2, "Someone else", "").await.unwrap();

        let groups = service.list(1, "", reference()).await.unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].bucket, Bucket::Today);
        assert_eq!(groups[0].notes[0].header, "Meeting");
        assert_eq!(groups[1].label(), "January 2024");

        let groups = service.list(1, "meet", reference()).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].notes.len(), 1);
    }

    #[tokio::test]
    async fn test_save_flow() {
        let service = DiaryService::new(MemoryStore::default());

        let outcome = service
            .save(1, plan_save(None, "Draft", "text"))
            .await
            .unwrap();
        let id = match outcome {
            SaveOutcome::Created(note) => note.id,
            other => panic!("expected created, got {:?}", other),
        };

        assert_eq!(
            service.save(1, plan_save(Some(id), "Final", "")).await.unwrap(),
            SaveOutcome::Updated(id)
        );
        assert_eq!(
            service.get_note(1, id).await.unwrap().unwrap().header,
            "Final"
        );

        assert_eq!(
            service.save(1, plan_save(Some(99), "x", "")).await.unwrap(),
            SaveOutcome::NotFound(99)
        );
        assert_eq!(
            service.save(1, plan_save(None, "", "")).await.unwrap(),
            SaveOutcome::Discarded
        );

        // Emptying a note does not delete it until the caller confirms.
        assert_eq!(
            service.save(1, plan_save(Some(id), "", "")).await.unwrap(),
            SaveOutcome::NeedsConfirmation(id)
        );
        assert!(service.get_note(1, id).await.unwrap().is_some());
        assert!(service.delete_note(1, id).await.unwrap());
        assert!(service.get_note(1, id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_grep_searches_body_and_orders_newest_first() {
        let store = MemoryStore::with_clock(&["2024-03-01 10:00:00", "2024-03-10 10:00:00"]);
        let service = DiaryService::new(store);

        service.create_note(1, "Old", "Buy MILK").await.unwrap();
        service.create_note(1, "New", "milk again").await.unwrap();

        let found = service.grep(1, "milk", false).await.unwrap();
        let headers: Vec<&str> = found.iter().map(|n| n.header.as_str()).collect();
        assert_eq!(headers, vec!["New", "Old"]);

        let found = service.grep(1, "milk", true).await.unwrap();
        assert_eq!(found.len(), 1);

        assert!(matches!(
            service.grep(1, "(", false).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_list_reports_bad_timestamps() {
        let service = DiaryService::new(MemoryStore::with_clock(&["not a time"]));
        service.create_note(1, "x", "").await.unwrap();

        assert!(matches!(
            service.list(1, "", reference()).await,
            Err(Error::Format(_))
        ));
    }
}
