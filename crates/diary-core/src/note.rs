use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::{parse_timestamp, Error};

/// Label shown (and searched) in place of an empty header.
pub const UNTITLED: &str = "No title";

/// A diary note owned by a single user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub header: String,
    #[serde(default)]
    pub body: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
}

/// Identity returned by registration or authentication.
///
/// Only the remote store issues a token; the local stores identify the user
/// by id alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: i64,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Note {
    /// The header, or [`UNTITLED`] when it is blank.
    pub fn display_header(&self) -> &str {
        if self.header.trim().is_empty() {
            UNTITLED
        } else {
            &self.header
        }
    }

    pub fn created(&self) -> Result<NaiveDateTime, Error> {
        parse_timestamp(&self.created_at)
    }

    pub fn updated(&self) -> Result<NaiveDateTime, Error> {
        parse_timestamp(&self.updated_at)
    }

    /// First line of the body, truncated to `max_len` characters.
    pub fn preview(&self, max_len: usize) -> String {
        let first_line = self.body.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
        let trimmed = first_line.trim();
        if trimmed.chars().count() > max_len {
            let cut: String = trimmed.chars().take(max_len).collect();
            format!("{}...", cut)
        } else {
            trimmed.to_string()
        }
    }
}

impl From<User> for Session {
    fn from(user: User) -> Self {
        Session {
            user_id: user.id,
            username: user.username,
            token: None,
        }
    }
}
