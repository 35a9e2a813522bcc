// src/state.rs
//! Per-stream cursors for incremental extraction.
//!
//! A cursor only ever moves forward. State is advanced at checkpoint
//! boundaries, so a run that dies between two checkpoints replays at
//! most the records since the last one and never skips any.

use crate::streams::StreamKind;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The record timestamp a stream's cursor tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorField {
    LastEditedTime,
    CreatedTime,
}

impl CursorField {
    pub fn as_str(&self) -> &'static str {
        match self {
            CursorField::LastEditedTime => "last_edited_time",
            CursorField::CreatedTime => "created_time",
        }
    }
}

impl fmt::Display for CursorField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub cursor_field: CursorField,
    pub value: DateTime<Utc>,
}

/// Stream name to cursor, in the order streams first checkpointed.
///
/// Serialized as a plain JSON object:
/// `{"pages": {"cursor_field": "last_edited_time", "value": "..."}}`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncState(IndexMap<String, Cursor>);

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, stream: &str) -> Option<&Cursor> {
        self.0.get(stream)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn streams(&self) -> impl Iterator<Item = (&str, &Cursor)> {
        self.0.iter().map(|(name, cursor)| (name.as_str(), cursor))
    }

    /// Inserts or replaces a cursor without the monotonic check.
    pub fn with_cursor(mut self, stream: impl Into<String>, cursor: Cursor) -> Self {
        self.0.insert(stream.into(), cursor);
        self
    }
}

/// Thread-safe owner of the run's `SyncState`.
#[derive(Debug, Default)]
pub struct SyncStateStore {
    state: Mutex<SyncState>,
}

impl SyncStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads caller-supplied state, dropping cursors that cannot belong to
    /// the stream they are filed under.
    pub fn from_state(input: SyncState) -> Self {
        let mut accepted = SyncState::new();
        for (name, cursor) in input.0 {
            let expected = StreamKind::from_name(&name).and_then(|kind| kind.descriptor().cursor_field);
            match expected {
                Some(field) if field == cursor.cursor_field => {
                    accepted.0.insert(name, cursor);
                }
                Some(field) => log::warn!(
                    "Ignoring '{}' cursor on {}: stream is keyed on {}",
                    cursor.cursor_field,
                    name,
                    field
                ),
                None => log::warn!("Ignoring cursor for unknown or full-refresh stream '{}'", name),
            }
        }
        Self {
            state: Mutex::new(accepted),
        }
    }

    pub fn get(&self, kind: StreamKind) -> Option<Cursor> {
        self.state.lock().get(kind.name()).copied()
    }

    /// Moves the stream's cursor to `candidate` if that is later.
    ///
    /// Returns whether the cursor changed. Streams without a cursor field
    /// are never recorded.
    pub fn advance(&self, kind: StreamKind, candidate: DateTime<Utc>) -> bool {
        let Some(cursor_field) = kind.descriptor().cursor_field else {
            return false;
        };

        let mut state = self.state.lock();
        match state.0.get_mut(kind.name()) {
            Some(current) if current.value >= candidate => false,
            Some(current) => {
                current.value = candidate;
                true
            }
            None => {
                state.0.insert(
                    kind.name().to_string(),
                    Cursor {
                        cursor_field,
                        value: candidate,
                    },
                );
                true
            }
        }
    }

    pub fn snapshot(&self) -> SyncState {
        self.state.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_advance_is_monotonic() {
        let store = SyncStateStore::new();

        assert!(store.advance(StreamKind::Pages, at(5)));
        assert!(!store.advance(StreamKind::Pages, at(3)));
        assert!(!store.advance(StreamKind::Pages, at(5)));
        assert!(store.advance(StreamKind::Pages, at(6)));

        assert_eq!(store.get(StreamKind::Pages).map(|c| c.value), Some(at(6)));
    }

    #[test]
    fn test_users_never_get_a_cursor() {
        let store = SyncStateStore::new();
        assert!(!store.advance(StreamKind::Users, at(1)));
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_comments_are_keyed_on_created_time() {
        let store = SyncStateStore::new();
        store.advance(StreamKind::Comments, at(2));
        assert_eq!(
            store.get(StreamKind::Comments).map(|c| c.cursor_field),
            Some(CursorField::CreatedTime)
        );
    }

    #[test]
    fn test_state_json_shape() {
        let store = SyncStateStore::new();
        store.advance(StreamKind::Pages, at(1));
        store.advance(StreamKind::Comments, at(2));

        let json = serde_json::to_value(store.snapshot()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "pages": {"cursor_field": "last_edited_time", "value": "2024-03-01T01:00:00Z"},
                "comments": {"cursor_field": "created_time", "value": "2024-03-01T02:00:00Z"},
            })
        );

        let parsed: SyncState = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, store.snapshot());
    }

    #[test]
    fn test_mismatched_cursors_are_dropped_on_load() {
        let input = SyncState::new()
            .with_cursor(
                "comments",
                Cursor {
                    cursor_field: CursorField::LastEditedTime,
                    value: at(1),
                },
            )
            .with_cursor(
                "pages",
                Cursor {
                    cursor_field: CursorField::LastEditedTime,
                    value: at(1),
                },
            )
            .with_cursor(
                "users",
                Cursor {
                    cursor_field: CursorField::LastEditedTime,
                    value: at(1),
                },
            );

        let store = SyncStateStore::from_state(input);
        let snapshot = store.snapshot();
        let kept: Vec<&str> = snapshot.streams().map(|(name, _)| name).collect();
        assert_eq!(kept, vec!["pages"]);
    }
}
