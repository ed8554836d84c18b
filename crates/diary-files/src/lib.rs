//! File-based storage implementation for the diary.
//!
//! Keeps every user and note in a single JSON document:
//!
//! ```text
//! .diary/
//!   .lock          # Lock file held during read-modify-write
//!   diary.json     # {"users": [...], "notes": [...]}
//! ```
//!
//! New note IDs are one more than the largest ID in the file, so an ID freed
//! by deleting the newest note is handed out again.

use chrono::Local;
use diary_core::{format_timestamp, Error, Note, NoteStore, Session, User};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const DATA_FILE: &str = "diary.json";

/// The whole file as stored on disk.
#[derive(Debug, Default, Serialize, Deserialize)]
struct DiaryFile {
    #[serde(default)]
    users: Vec<User>,
    #[serde(default)]
    notes: Vec<NoteRecord>,
}

/// A note as stored on disk. Older files may have nulls for empty fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct NoteRecord {
    id: i64,
    user_id: i64,
    #[serde(default)]
    header: Option<String>,
    #[serde(default)]
    body: Option<String>,
    created_at: String,
    updated_at: String,
}

impl NoteRecord {
    fn into_note(self) -> Note {
        Note {
            id: self.id,
            user_id: self.user_id,
            header: self.header.unwrap_or_default(),
            body: self.body.unwrap_or_default(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// JSON file store.
pub struct FilesStore {
    root: PathBuf,
}

impl FilesStore {
    /// Open a file store in the given directory, creating it if needed.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, Error> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(&root)
            .map_err(|e| Error::Database(format!("Failed to create data dir: {}", e)))?;

        Ok(Self { root })
    }

    /// Path of the JSON document.
    pub fn data_path(&self) -> PathBuf {
        self.root.join(DATA_FILE)
    }

    /// Acquire an exclusive lock on the store.
    fn lock(&self) -> Result<FileLock, Error> {
        let lock_path = self.root.join(".lock");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&lock_path)
            .map_err(|e| Error::Database(format!("Failed to open lock file: {}", e)))?;

        file.lock_exclusive()
            .map_err(|e| Error::Database(format!("Failed to acquire lock: {}", e)))?;

        Ok(FileLock { file })
    }

    /// Read the document; a missing file is an empty diary.
    fn load(&self) -> Result<DiaryFile, Error> {
        let path = self.data_path();

        if !path.exists() {
            return Ok(DiaryFile::default());
        }

        let contents = fs::read_to_string(&path)
            .map_err(|e| Error::Database(format!("Failed to read {}: {}", DATA_FILE, e)))?;

        if contents.trim().is_empty() {
            warn!(path = %path.display(), "data file is empty");
            return Ok(DiaryFile::default());
        }

        serde_json::from_str(&contents)
            .map_err(|e| Error::Database(format!("Failed to parse {}: {}", DATA_FILE, e)))
    }

    /// Write the document to disk atomically.
    fn save(&self, data: &DiaryFile) -> Result<(), Error> {
        let path = self.data_path();
        let temp_path = self.root.join(format!("{}.tmp", DATA_FILE));

        let contents = serde_json::to_string_pretty(data)
            .map_err(|e| Error::Database(format!("Failed to serialize diary: {}", e)))?;

        let mut file = File::create(&temp_path)
            .map_err(|e| Error::Database(format!("Failed to create temp file: {}", e)))?;

        file.write_all(contents.as_bytes())
            .map_err(|e| Error::Database(format!("Failed to write temp file: {}", e)))?;

        file.sync_all()
            .map_err(|e| Error::Database(format!("Failed to sync temp file: {}", e)))?;

        fs::rename(&temp_path, &path)
            .map_err(|e| Error::Database(format!("Failed to rename temp file: {}", e)))?;

        Ok(())
    }

    /// Load, apply `f`, and write back under the lock.
    fn modify<T>(&self, f: impl FnOnce(&mut DiaryFile) -> Result<T, Error>) -> Result<T, Error> {
        let _lock = self.lock()?;
        let mut data = self.load()?;
        let result = f(&mut data)?;
        self.save(&data)?;
        Ok(result)
    }

    /// Get current local timestamp.
    fn now() -> String {
        format_timestamp(Local::now().naive_local())
    }
}

/// RAII guard for file locking.
struct FileLock {
    file: File,
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[async_trait::async_trait(?Send)]
impl NoteStore for FilesStore {
    async fn register_user(&self, username: &str, _password: Option<&str>) -> Result<Session, Error> {
        let user = self.modify(|data| {
            if data.users.iter().any(|u| u.username == username) {
                return Err(Error::Validation(format!("user {} already exists", username)));
            }
            let user = User {
                id: data.users.iter().map(|u| u.id).max().unwrap_or(0) + 1,
                username: username.to_string(),
            };
            data.users.push(user.clone());
            Ok(user)
        })?;

        Ok(Session::from(user))
    }

    async fn authenticate(&self, username: &str, _password: Option<&str>) -> Result<Session, Error> {
        self.load()?
            .users
            .into_iter()
            .find(|u| u.username == username)
            .map(Session::from)
            .ok_or_else(|| Error::Auth(format!("unknown user {}", username)))
    }

    async fn list_notes(&self, user_id: i64) -> Result<Vec<Note>, Error> {
        Ok(self
            .load()?
            .notes
            .into_iter()
            .filter(|n| n.user_id == user_id)
            .map(NoteRecord::into_note)
            .collect())
    }

    async fn get_note(&self, user_id: i64, id: i64) -> Result<Option<Note>, Error> {
        Ok(self
            .load()?
            .notes
            .into_iter()
            .find(|n| n.user_id == user_id && n.id == id)
            .map(NoteRecord::into_note))
    }

    async fn create_note(&self, user_id: i64, header: &str, body: &str) -> Result<Note, Error> {
        let record = self.modify(|data| {
            let now = Self::now();
            let record = NoteRecord {
                id: data.notes.iter().map(|n| n.id).max().unwrap_or(0) + 1,
                user_id,
                header: Some(header.to_string()),
                body: Some(body.to_string()),
                created_at: now.clone(),
                updated_at: now,
            };
            data.notes.push(record.clone());
            Ok(record)
        })?;

        debug!(id = record.id, user_id, "created note");
        Ok(record.into_note())
    }

    async fn update_note(
        &self,
        user_id: i64,
        id: i64,
        header: &str,
        body: &str,
    ) -> Result<bool, Error> {
        let _lock = self.lock()?;
        let mut data = self.load()?;

        let record = match data
            .notes
            .iter_mut()
            .find(|n| n.user_id == user_id && n.id == id)
        {
            Some(record) => record,
            None => return Ok(false),
        };

        record.header = Some(header.to_string());
        record.body = Some(body.to_string());
        record.updated_at = Self::now();

        self.save(&data)?;
        Ok(true)
    }

    async fn delete_note(&self, user_id: i64, id: i64) -> Result<bool, Error> {
        let _lock = self.lock()?;
        let mut data = self.load()?;

        let before = data.notes.len();
        data.notes.retain(|n| !(n.user_id == user_id && n.id == id));
        if data.notes.len() == before {
            return Ok(false);
        }

        self.save(&data)?;
        Ok(true)
    }
}
