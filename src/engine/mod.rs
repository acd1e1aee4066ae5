//! State reconstruction primitives
//!
//! A stream's state is computed by folding an ordered sequence of entries:
//! a snapshot entry replaces the state wholesale, a delta entry merges its
//! keys into it. The engine is consumed through two cursor views defined in
//! [`cursor`]: the write cursor tracks the latest applied position for the
//! live stream, read cursors replay history from an arbitrary time.

pub mod cursor;

use serde::{Deserialize, Serialize};

pub use cursor::{ReadCursor, WriteCursor};

/// Opaque state payload: a JSON object folded key-by-key
pub type StateData = serde_json::Map<String, serde_json::Value>;

/// Kind of a persisted entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Full state at the entry's timestamp
    Snapshot,
    /// Partial mutation merged into the preceding state
    Delta,
}

/// Entry-kind filter for range queries
///
/// `Any` is a query wildcard only; it is never a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryFilter {
    /// Match every entry
    Any,
    /// Match only entries of the given kind
    Kind(EntryKind),
}

impl EntryFilter {
    /// Check whether an entry kind passes this filter
    pub fn matches(&self, kind: EntryKind) -> bool {
        match self {
            EntryFilter::Any => true,
            EntryFilter::Kind(k) => *k == kind,
        }
    }
}

/// One timestamped state delta or snapshot persisted to a stream's log
///
/// Entries are immutable once persisted. Ordering is by timestamp, not
/// insertion order: entries may arrive out of order from independent
/// writers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEntry {
    /// Unix milliseconds
    pub timestamp: i64,
    /// Snapshot or delta
    pub kind: EntryKind,
    /// State payload
    pub data: StateData,
}

impl StreamEntry {
    /// Create a snapshot entry
    pub fn snapshot(timestamp: i64, data: StateData) -> Self {
        Self {
            timestamp,
            kind: EntryKind::Snapshot,
            data,
        }
    }

    /// Create a delta entry
    pub fn delta(timestamp: i64, data: StateData) -> Self {
        Self {
            timestamp,
            kind: EntryKind::Delta,
            data,
        }
    }
}

/// Fold one entry into a state
///
/// A snapshot replaces the state; a delta merges its keys, with a `null`
/// value removing the key.
pub fn fold(state: &mut StateData, entry: &StreamEntry) {
    match entry.kind {
        EntryKind::Snapshot => {
            *state = entry.data.clone();
        }
        EntryKind::Delta => {
            for (key, value) in &entry.data {
                if value.is_null() {
                    state.remove(key);
                } else {
                    state.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

/// Current time in Unix milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: serde_json::Value) -> StateData {
        match value {
            serde_json::Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_snapshot_replaces_state() {
        let mut state = map(json!({"a": 1, "b": 2}));
        let entry = StreamEntry::snapshot(10, map(json!({"c": 3})));

        fold(&mut state, &entry);

        assert_eq!(state, map(json!({"c": 3})));
    }

    #[test]
    fn test_delta_merges_keys() {
        let mut state = map(json!({"a": 1, "b": 2}));
        let entry = StreamEntry::delta(10, map(json!({"b": 20, "c": 3})));

        fold(&mut state, &entry);

        assert_eq!(state, map(json!({"a": 1, "b": 20, "c": 3})));
    }

    #[test]
    fn test_delta_null_removes_key() {
        let mut state = map(json!({"a": 1, "b": 2}));
        let entry = StreamEntry::delta(10, map(json!({"a": null})));

        fold(&mut state, &entry);

        assert_eq!(state, map(json!({"b": 2})));
    }

    #[test]
    fn test_delta_fold_is_idempotent() {
        let mut state = map(json!({"a": 1}));
        let entry = StreamEntry::delta(10, map(json!({"a": 5, "b": 6})));

        fold(&mut state, &entry);
        let once = state.clone();
        fold(&mut state, &entry);

        assert_eq!(state, once);
    }

    #[test]
    fn test_filter_any_matches_all() {
        assert!(EntryFilter::Any.matches(EntryKind::Snapshot));
        assert!(EntryFilter::Any.matches(EntryKind::Delta));
        assert!(EntryFilter::Kind(EntryKind::Snapshot).matches(EntryKind::Snapshot));
        assert!(!EntryFilter::Kind(EntryKind::Snapshot).matches(EntryKind::Delta));
    }

    #[test]
    fn test_entry_serde_round_trip() {
        let entry = StreamEntry::snapshot(42, map(json!({"x": "y"})));
        let encoded = serde_json::to_string(&entry).unwrap();
        let decoded: StreamEntry = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded, entry);
        assert!(encoded.contains("snapshot"));
    }
}
