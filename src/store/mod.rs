//! Persisted log store boundary
//!
//! The service keeps its state consistent with an external append-only
//! store holding two kinds of collections: one stream-descriptor collection
//! watched as a whole, and one entry collection per stream. Both support a
//! change-notification subscription that can optionally replay current
//! contents before switching to live events.
//!
//! These traits are the full contract; [`memory::MemoryStore`] is an
//! in-process implementation used by tests and embedded deployments.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::engine::{EntryFilter, StreamEntry};
use crate::error::Result;
use crate::registry::StreamDescriptor;

pub use memory::MemoryStore;

/// Synthetic feed markers interleaved with change events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedMarker {
    /// The initial replay is complete; subsequent events are live
    Ready,
}

/// One change observed on a watched collection
///
/// An insertion carries only `new_val`, a deletion only `old_val`, an
/// update both. Marker events carry neither.
#[derive(Debug, Clone)]
pub struct Change<T> {
    /// Value after the change, if any
    pub new_val: Option<T>,
    /// Value before the change, if any
    pub old_val: Option<T>,
    /// Synthetic marker, if this is not a data event
    pub marker: Option<FeedMarker>,
}

impl<T> Change<T> {
    /// An insertion or the initial-replay form of an existing value
    pub fn upsert(value: T) -> Self {
        Self {
            new_val: Some(value),
            old_val: None,
            marker: None,
        }
    }

    /// An in-place update
    pub fn update(old: T, new: T) -> Self {
        Self {
            new_val: Some(new),
            old_val: Some(old),
            marker: None,
        }
    }

    /// A deletion
    pub fn delete(old: T) -> Self {
        Self {
            new_val: None,
            old_val: Some(old),
            marker: None,
        }
    }

    /// A synthetic marker event
    pub fn marker(marker: FeedMarker) -> Self {
        Self {
            new_val: None,
            old_val: None,
            marker: Some(marker),
        }
    }

    /// Whether this event signals the end of the initial replay
    pub fn is_ready_marker(&self) -> bool {
        self.marker == Some(FeedMarker::Ready)
    }
}

/// A live change subscription; the channel closing signals transport loss
pub type ChangeFeed<T> = mpsc::UnboundedReceiver<Change<T>>;

/// Handle to the store backing the service
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Subscribe to changes on the stream-descriptor collection
    ///
    /// With `include_initial`, every current descriptor is replayed as an
    /// upsert, followed by a [`FeedMarker::Ready`] event, before live
    /// changes are delivered.
    async fn watch_descriptors(&self, include_initial: bool) -> Result<ChangeFeed<StreamDescriptor>>;

    /// Handle to the entry collection for one stream
    async fn entries(&self, stream_id: &str) -> Result<Arc<dyn EntryCollection>>;
}

/// One stream's append-only entry collection
#[async_trait]
pub trait EntryCollection: Send + Sync {
    /// Persist one entry
    async fn append(&self, entry: StreamEntry) -> Result<()>;

    /// Latest snapshot entry with timestamp strictly before `before`
    async fn snapshot_before(&self, before: i64) -> Result<Option<StreamEntry>>;

    /// Earliest entry with timestamp strictly after `after`, optionally
    /// filtered by kind
    async fn entry_after(&self, after: i64, filter: EntryFilter) -> Result<Option<StreamEntry>>;

    /// Entries with `after < timestamp <= until`, in timestamp order
    async fn range(&self, after: i64, until: i64) -> Result<Vec<StreamEntry>>;

    /// Subscribe to live changes on this collection
    async fn watch(&self) -> Result<ChangeFeed<StreamEntry>>;
}
