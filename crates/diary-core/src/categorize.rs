//! Grouping notes by recency.
//!
//! [`categorize`] filters notes by a header query and partitions them into
//! display buckets: Today, Last 7 days, Last 30 days, then one bucket per
//! calendar month, newest first.

use std::fmt;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};

use crate::{Error, Note};

/// A recency classification for a group of notes. Serializes as its label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Today,
    LastSevenDays,
    LastThirtyDays,
    Month { year: i32, month: u32 },
}

/// A labelled group of notes, most recently created first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteGroup {
    pub bucket: Bucket,
    pub notes: Vec<Note>,
}

impl Bucket {
    fn classify(created: NaiveDateTime, now: NaiveDateTime) -> Bucket {
        if created.date() == now.date() {
            Bucket::Today
        } else if created >= now - Duration::days(7) {
            Bucket::LastSevenDays
        } else if created >= now - Duration::days(30) {
            Bucket::LastThirtyDays
        } else {
            Bucket::Month {
                year: created.year(),
                month: created.month(),
            }
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bucket::Today => f.write_str("Today"),
            Bucket::LastSevenDays => f.write_str("Last 7 days"),
            Bucket::LastThirtyDays => f.write_str("Last 30 days"),
            Bucket::Month { year, month } => match NaiveDate::from_ymd_opt(*year, *month, 1) {
                Some(first) => write!(f, "{}", first.format("%B %Y")),
                None => write!(f, "{:04}-{:02}", year, month),
            },
        }
    }
}

impl Serialize for Bucket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl NoteGroup {
    pub fn label(&self) -> String {
        self.bucket.to_string()
    }
}

/// Whether a note's display header contains `query`, ignoring case.
pub fn matches_query(note: &Note, query: &str) -> bool {
    note.display_header()
        .to_lowercase()
        .contains(&query.to_lowercase())
}

/// Filter `notes` by `query` and group them by recency relative to `now`.
///
/// Fails with [`Error::Format`] if a matching note has an unparseable
/// creation timestamp.
pub fn categorize(notes: &[Note], query: &str, now: NaiveDateTime) -> Result<Vec<NoteGroup>, Error> {
    let mut matching = notes
        .iter()
        .filter(|note| matches_query(note, query))
        .map(|note| -> Result<_, Error> { Ok((note.created()?, note)) })
        .collect::<Result<Vec<_>, Error>>()?;

    // Stable, so equal timestamps keep their input order.
    matching.sort_by(|a, b| b.0.cmp(&a.0));

    let mut today = Vec::new();
    let mut last_week = Vec::new();
    let mut last_month = Vec::new();
    let mut months: Vec<NoteGroup> = Vec::new();

    for (created, note) in matching {
        match Bucket::classify(created, now) {
            Bucket::Today => today.push(note.clone()),
            Bucket::LastSevenDays => last_week.push(note.clone()),
            Bucket::LastThirtyDays => last_month.push(note.clone()),
            bucket => match months.iter_mut().find(|g| g.bucket == bucket) {
                Some(group) => group.notes.push(note.clone()),
                None => months.push(NoteGroup {
                    bucket,
                    notes: vec![note.clone()],
                }),
            },
        }
    }

    let fixed = [
        (Bucket::Today, today),
        (Bucket::LastSevenDays, last_week),
        (Bucket::LastThirtyDays, last_month),
    ];

    let groups = fixed
        .into_iter()
        .filter(|(_, notes)| !notes.is_empty())
        .map(|(bucket, notes)| NoteGroup { bucket, notes })
        .chain(months)
        .collect();

    Ok(groups)
}
