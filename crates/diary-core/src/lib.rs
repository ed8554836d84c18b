//! Diary core library - shared types, traits, and note categorization.
//!
//! This crate contains no I/O and can be compiled for any target.

mod categorize;
mod dateparse;
mod db;
mod editor;
mod error;
mod migrations;
mod note;
mod service;

pub use categorize::{categorize, matches_query, Bucket, NoteGroup};
pub use dateparse::{format_timestamp, parse_human_date, parse_timestamp};
pub use db::NoteStore;
pub use editor::{plan_save, SaveAction, SaveOutcome};
pub use error::Error;
pub use migrations::{get_pending_migrations, Migration, MIGRATIONS, SCHEMA_VERSION};
pub use note::{Note, Session, User, UNTITLED};
pub use service::DiaryService;
