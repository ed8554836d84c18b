//! On-disk configuration and session for the CLI.
//!
//! ```text
//! .diary/
//!   config.json     # {"backend": "files", "api_url": null}
//!   session.json    # {"backend": "files", "user_id": 1, "username": "alice"}
//!   diary.json      # files backend
//!   diary.sqlite    # sqlite backend
//! ```

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use diary_core::Session;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const DIARY_DIR: &str = ".diary";
pub const SQLITE_FILE: &str = "diary.sqlite";
const CONFIG_FILE: &str = "config.json";
const SESSION_FILE: &str = "session.json";

/// Every file a diary may create in its directory.
const OWNED_FILES: &[&str] = &[
    CONFIG_FILE,
    SESSION_FILE,
    "diary.json",
    "diary.json.tmp",
    ".lock",
    SQLITE_FILE,
    "diary.sqlite-journal",
    "diary.sqlite-wal",
    "diary.sqlite-shm",
];

/// Where notes are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// SQLite database in the diary directory
    Sqlite,
    /// JSON file in the diary directory
    #[default]
    Files,
    /// Remote HTTP API with token authentication
    Remote,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Sqlite => f.write_str("sqlite"),
            Backend::Files => f.write_str("files"),
            Backend::Remote => f.write_str("remote"),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: Backend,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl Config {
    /// Read the config, falling back to defaults when the file is absent.
    pub fn load(diary_dir: &Path) -> Result<Self> {
        let path = diary_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("Invalid {}", path.display()))
    }

    pub fn save(&self, diary_dir: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(diary_dir.join(CONFIG_FILE), contents).context("Failed to write config")
    }

    pub fn exists(diary_dir: &Path) -> bool {
        diary_dir.join(CONFIG_FILE).exists()
    }
}

/// The logged-in user, tied to the backend that issued it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedSession {
    pub backend: Backend,
    #[serde(flatten)]
    pub session: Session,
}

impl SavedSession {
    /// The session, if it was issued by `backend`.
    pub fn for_backend(self, backend: Backend) -> Result<Session> {
        if self.backend != backend {
            bail!(
                "Logged in as {} on the {} backend, not {}. Run 'diary login <username>' again.",
                self.session.username,
                self.backend,
                backend
            );
        }
        Ok(self.session)
    }
}

/// Read the saved session, if any.
pub fn load_session(diary_dir: &Path) -> Result<Option<SavedSession>> {
    let path = diary_dir.join(SESSION_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(&path).context("Failed to read session")?;
    let saved = serde_json::from_str(&contents).context("Invalid session file")?;
    Ok(Some(saved))
}

pub fn save_session(diary_dir: &Path, backend: Backend, session: Session) -> Result<()> {
    let saved = SavedSession { backend, session };
    let contents = serde_json::to_string_pretty(&saved).context("Failed to serialize session")?;
    fs::write(diary_dir.join(SESSION_FILE), contents).context("Failed to write session")
}

/// Remove the saved session. Returns false if there was none.
pub fn clear_session(diary_dir: &Path) -> Result<bool> {
    let path = diary_dir.join(SESSION_FILE);
    if !path.exists() {
        return Ok(false);
    }
    fs::remove_file(&path).context("Failed to remove session")?;
    Ok(true)
}

/// Delete the diary's own files, leaving anything else in the directory.
pub fn remove_diary_files(diary_dir: &Path) -> Result<()> {
    for name in OWNED_FILES {
        let path = diary_dir.join(name);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        }
    }
    Ok(())
}

/// Find the .diary directory by searching up from current directory
fn find_diary_dir() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;
    loop {
        let diary_path = current.join(DIARY_DIR);
        if diary_path.is_dir() {
            return Some(diary_path);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Get the diary directory path, or error if not initialized
pub fn get_diary_dir(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        if !dir.is_dir() {
            bail!(
                "{} does not exist. Run 'diary init' to initialize a new diary.",
                dir.display()
            );
        }
        return Ok(dir);
    }
    match find_diary_dir() {
        Some(diary_dir) => Ok(diary_dir),
        None => bail!("No .diary directory found. Run 'diary init' to initialize a new diary."),
    }
}
