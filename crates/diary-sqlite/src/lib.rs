//! SQLite implementation of the diary note store.

use chrono::Local;
use diary_core::{
    format_timestamp, get_pending_migrations, Error, Note, NoteStore, Session, User,
    SCHEMA_VERSION,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

const NOTE_COLUMNS: &str = "id, user_id, header, body, created_at, updated_at";

/// SQLite-backed note store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open a database at the given path and run any pending migrations.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::init(conn)
    }

    /// Open an in-memory database and run migrations.
    pub fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, Error> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(db_err)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, Error> {
        self.conn
            .lock()
            .map_err(|_| Error::Internal("database connection lock poisoned".into()))
    }

    /// Run any pending database migrations.
    fn run_migrations(&self) -> Result<(), Error> {
        let conn = self.conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _diary_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )
        .map_err(db_err)?;

        let current_version: i64 = conn
            .query_row(
                "SELECT value FROM _diary_meta WHERE key = 'schema_version'",
                [],
                |row| {
                    let val: String = row.get(0)?;
                    Ok(val.parse().unwrap_or(0))
                },
            )
            .optional()
            .map_err(db_err)?
            .unwrap_or(0);

        if current_version >= SCHEMA_VERSION {
            return Ok(());
        }

        for migration in get_pending_migrations(current_version) {
            debug!(version = migration.version, name = migration.name, "applying migration");
            for statement in migration.statements {
                conn.execute(statement, []).map_err(|e| {
                    Error::Database(format!("Migration {} failed: {}", migration.name, e))
                })?;
            }
        }

        conn.execute(
            "INSERT OR REPLACE INTO _diary_meta (key, value) VALUES ('schema_version', ?1)",
            params![SCHEMA_VERSION.to_string()],
        )
        .map_err(db_err)?;

        Ok(())
    }

    fn find_user(conn: &Connection, username: &str) -> Result<Option<User>, Error> {
        conn.query_row(
            "SELECT id, username FROM users WHERE username = ?1",
            params![username],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                })
            },
        )
        .optional()
        .map_err(db_err)
    }

    fn note_from_row(row: &Row<'_>) -> rusqlite::Result<Note> {
        Ok(Note {
            id: row.get(0)?,
            user_id: row.get(1)?,
            header: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            body: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn now() -> String {
        format_timestamp(Local::now().naive_local())
    }
}

fn db_err(e: rusqlite::Error) -> Error {
    Error::Database(e.to_string())
}

#[async_trait::async_trait(?Send)]
impl NoteStore for SqliteStore {
    async fn register_user(&self, username: &str, _password: Option<&str>) -> Result<Session, Error> {
        let conn = self.conn()?;

        if Self::find_user(&conn, username)?.is_some() {
            return Err(Error::Validation(format!("user {} already exists", username)));
        }

        conn.execute(
            "INSERT INTO users (username, created_at) VALUES (?1, ?2)",
            params![username, Self::now()],
        )
        .map_err(db_err)?;

        Ok(Session::from(User {
            id: conn.last_insert_rowid(),
            username: username.to_string(),
        }))
    }

    async fn authenticate(&self, username: &str, _password: Option<&str>) -> Result<Session, Error> {
        let conn = self.conn()?;
        Self::find_user(&conn, username)?
            .map(Session::from)
            .ok_or_else(|| Error::Auth(format!("unknown user {}", username)))
    }

    async fn list_notes(&self, user_id: i64) -> Result<Vec<Note>, Error> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM notes WHERE user_id = ?1 ORDER BY id",
                NOTE_COLUMNS
            ))
            .map_err(db_err)?;

        let notes = stmt
            .query_map(params![user_id], Self::note_from_row)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;

        Ok(notes)
    }

    async fn get_note(&self, user_id: i64, id: i64) -> Result<Option<Note>, Error> {
        let conn = self.conn()?;

        conn.query_row(
            &format!(
                "SELECT {} FROM notes WHERE id = ?1 AND user_id = ?2",
                NOTE_COLUMNS
            ),
            params![id, user_id],
            Self::note_from_row,
        )
        .optional()
        .map_err(db_err)
    }

    async fn create_note(&self, user_id: i64, header: &str, body: &str) -> Result<Note, Error> {
        let conn = self.conn()?;
        let now = Self::now();

        conn.execute(
            "INSERT INTO notes (user_id, header, body, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![user_id, header, body, now],
        )
        .map_err(db_err)?;

        let id = conn.last_insert_rowid();
        debug!(id, user_id, "created note");

        Ok(Note {
            id,
            user_id,
            header: header.to_string(),
            body: body.to_string(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    async fn update_note(
        &self,
        user_id: i64,
        id: i64,
        header: &str,
        body: &str,
    ) -> Result<bool, Error> {
        let conn = self.conn()?;

        let rows = conn
            .execute(
                "UPDATE notes SET header = ?1, body = ?2, updated_at = ?3
                 WHERE id = ?4 AND user_id = ?5",
                params![header, body, Self::now(), id, user_id],
            )
            .map_err(db_err)?;

        Ok(rows > 0)
    }

    async fn delete_note(&self, user_id: i64, id: i64) -> Result<bool, Error> {
        let conn = self.conn()?;

        let rows = conn
            .execute(
                "DELETE FROM notes WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )
            .map_err(db_err)?;

        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup() -> (SqliteStore, i64) {
        let store = SqliteStore::open_in_memory().unwrap();
        let session = store.register_user("alice", None).await.unwrap();
        (store, session.user_id)
    }

    #[tokio::test]
    async fn test_register_and_authenticate() {
        let store = SqliteStore::open_in_memory().unwrap();

        let alice = store.register_user("alice", None).await.unwrap();
        let bob = store.register_user("bob", None).await.unwrap();
        assert_ne!(alice.user_id, bob.user_id);
        assert!(alice.token.is_none());

        assert_eq!(store.authenticate("bob", None).await.unwrap(), bob);
        assert!(matches!(
            store.register_user("alice", None).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            store.authenticate("carol", None).await,
            Err(Error::Auth(_))
        ));
    }

    #[tokio::test]
    async fn test_create_and_get_note() {
        let (store, user) = setup().await;

        let note = store.create_note(user, "Groceries", "eggs").await.unwrap();
        assert_eq!(note.created_at, note.updated_at);
        assert!(note.created().is_ok());

        let fetched = store.get_note(user, note.id).await.unwrap().unwrap();
        assert_eq!(fetched, note);
    }

    #[tokio::test]
    async fn test_notes_are_scoped_to_user() {
        let (store, alice) = setup().await;
        let bob = store.register_user("bob", None).await.unwrap().user_id;

        let note = store.create_note(alice, "Private", "").await.unwrap();
        store.create_note(bob, "Bob's", "").await.unwrap();

        assert_eq!(store.list_notes(alice).await.unwrap().len(), 1);
        assert!(store.get_note(bob, note.id).await.unwrap().is_none());
        assert!(!store.update_note(bob, note.id, "x", "y").await.unwrap());
        assert!(!store.delete_note(bob, note.id).await.unwrap());
        assert!(store.get_note(alice, note.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_note() {
        let (store, user) = setup().await;
        let note = store.create_note(user, "Draft", "v1").await.unwrap();

        assert!(store.update_note(user, note.id, "Final", "v2").await.unwrap());

        let updated = store.get_note(user, note.id).await.unwrap().unwrap();
        assert_eq!(updated.header, "Final");
        assert_eq!(updated.body, "v2");
        assert_eq!(updated.created_at, note.created_at);
        assert!(updated.updated().unwrap() >= note.updated().unwrap());

        assert!(!store.update_note(user, 999, "x", "y").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_note() {
        let (store, user) = setup().await;
        let note = store.create_note(user, "To delete", "").await.unwrap();

        assert!(store.delete_note(user, note.id).await.unwrap());
        assert!(store.get_note(user, note.id).await.unwrap().is_none());
        assert!(!store.delete_note(user, note.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_fields_round_trip() {
        let (store, user) = setup().await;
        let note = store.create_note(user, "", "").await.unwrap();

        let fetched = store.get_note(user, note.id).await.unwrap().unwrap();
        assert_eq!(fetched.header, "");
        assert_eq!(fetched.display_header(), "No title");
    }

    #[tokio::test]
    async fn test_reopen_keeps_data_and_schema() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("diary.sqlite");

        let user = {
            let store = SqliteStore::open(&path).unwrap();
            let user = store.register_user("alice", None).await.unwrap().user_id;
            store.create_note(user, "Persisted", "").await.unwrap();
            user
        };

        let store = SqliteStore::open(&path).unwrap();
        let notes = store.list_notes(user).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].header, "Persisted");
    }
}
