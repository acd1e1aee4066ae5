//! In-memory log store
//!
//! A process-local implementation of the store contract, used by tests and
//! embedded deployments. Change feeds are wired through retained senders;
//! [`MemoryStore::sever_feeds`] closes every open feed to simulate a
//! transport drop without tearing the data down.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use crate::engine::{EntryFilter, EntryKind, StreamEntry};
use crate::error::Result;
use crate::registry::StreamDescriptor;

use super::{Change, ChangeFeed, EntryCollection, FeedMarker, LogStore};

type Watchers<T> = Mutex<Vec<mpsc::UnboundedSender<Change<T>>>>;

fn notify<T: Clone>(watchers: &Watchers<T>, change: &Change<T>) {
    // Drop watchers whose receiver is gone.
    watchers
        .lock()
        .retain(|tx| tx.send(change.clone()).is_ok());
}

/// In-memory store handle; clones share the same data
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    descriptors: RwLock<BTreeMap<String, StreamDescriptor>>,
    descriptor_watchers: Watchers<StreamDescriptor>,
    collections: RwLock<HashMap<String, Arc<MemoryEntryCollection>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                descriptors: RwLock::new(BTreeMap::new()),
                descriptor_watchers: Mutex::new(Vec::new()),
                collections: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Insert or replace a stream descriptor, notifying watchers
    pub fn put_descriptor(&self, descriptor: StreamDescriptor) {
        let change = {
            let mut descriptors = self.inner.descriptors.write();
            let old = descriptors.insert(descriptor.id.clone(), descriptor.clone());
            match old {
                Some(old) => Change::update(old, descriptor),
                None => Change::upsert(descriptor),
            }
        };
        notify(&self.inner.descriptor_watchers, &change);
    }

    /// Delete a stream descriptor, notifying watchers
    pub fn remove_descriptor(&self, id: &str) {
        let change = {
            let mut descriptors = self.inner.descriptors.write();
            match descriptors.remove(id) {
                Some(old) => Change::delete(old),
                None => return,
            }
        };
        notify(&self.inner.descriptor_watchers, &change);
    }

    /// Handle to one stream's collection, creating it if absent
    pub fn collection(&self, stream_id: &str) -> Arc<MemoryEntryCollection> {
        let mut collections = self.inner.collections.write();
        Arc::clone(
            collections
                .entry(stream_id.to_string())
                .or_insert_with(|| Arc::new(MemoryEntryCollection::new())),
        )
    }

    /// Close every open change feed, simulating a dropped transport
    ///
    /// Data is untouched; watchers see their feed end and are expected to
    /// reconnect.
    pub fn sever_feeds(&self) {
        self.inner.descriptor_watchers.lock().clear();
        let collections: Vec<_> = self.inner.collections.read().values().cloned().collect();
        for collection in collections {
            collection.watchers.lock().clear();
        }
    }

    /// Number of descriptors currently stored
    pub fn descriptor_count(&self) -> usize {
        self.inner.descriptors.read().len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogStore for MemoryStore {
    async fn watch_descriptors(&self, include_initial: bool) -> Result<ChangeFeed<StreamDescriptor>> {
        let (tx, rx) = mpsc::unbounded_channel();

        // Register while holding the read lock so no concurrent write can
        // land between the initial replay and the live subscription.
        let descriptors = self.inner.descriptors.read();
        if include_initial {
            for descriptor in descriptors.values() {
                let _ = tx.send(Change::upsert(descriptor.clone()));
            }
            let _ = tx.send(Change::marker(FeedMarker::Ready));
        }
        self.inner.descriptor_watchers.lock().push(tx);

        Ok(rx)
    }

    async fn entries(&self, stream_id: &str) -> Result<Arc<dyn EntryCollection>> {
        Ok(self.collection(stream_id))
    }
}

/// One stream's in-memory entry collection, kept in timestamp order
pub struct MemoryEntryCollection {
    entries: RwLock<Vec<StreamEntry>>,
    watchers: Watchers<StreamEntry>,
}

impl MemoryEntryCollection {
    fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            watchers: Mutex::new(Vec::new()),
        }
    }

    /// Number of persisted entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the collection holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl EntryCollection for MemoryEntryCollection {
    async fn append(&self, entry: StreamEntry) -> Result<()> {
        {
            let mut entries = self.entries.write();
            // Insert after any equal timestamp so arrival order breaks ties.
            let at = entries.partition_point(|e| e.timestamp <= entry.timestamp);
            entries.insert(at, entry.clone());
        }
        notify(&self.watchers, &Change::upsert(entry));
        Ok(())
    }

    async fn snapshot_before(&self, before: i64) -> Result<Option<StreamEntry>> {
        let entries = self.entries.read();
        Ok(entries
            .iter()
            .rev()
            .find(|e| e.timestamp < before && e.kind == EntryKind::Snapshot)
            .cloned())
    }

    async fn entry_after(&self, after: i64, filter: EntryFilter) -> Result<Option<StreamEntry>> {
        let entries = self.entries.read();
        Ok(entries
            .iter()
            .find(|e| e.timestamp > after && filter.matches(e.kind))
            .cloned())
    }

    async fn range(&self, after: i64, until: i64) -> Result<Vec<StreamEntry>> {
        let entries = self.entries.read();
        Ok(entries
            .iter()
            .filter(|e| e.timestamp > after && e.timestamp <= until)
            .cloned()
            .collect())
    }

    async fn watch(&self) -> Result<ChangeFeed<StreamEntry>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.watchers.lock().push(tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EntryKind, StateData};
    use crate::registry::StreamDescriptor;

    fn entry(kind: EntryKind, ts: i64) -> StreamEntry {
        StreamEntry {
            timestamp: ts,
            kind,
            data: StateData::new(),
        }
    }

    #[tokio::test]
    async fn test_initial_replay_then_ready_marker() {
        let store = MemoryStore::new();
        store.put_descriptor(StreamDescriptor::new("dev", "cmp", "state"));

        let mut feed = store.watch_descriptors(true).await.unwrap();

        let first = feed.recv().await.unwrap();
        assert!(first.new_val.is_some());
        let second = feed.recv().await.unwrap();
        assert!(second.is_ready_marker());
    }

    #[tokio::test]
    async fn test_live_changes_after_marker() {
        let store = MemoryStore::new();
        let mut feed = store.watch_descriptors(true).await.unwrap();
        assert!(feed.recv().await.unwrap().is_ready_marker());

        store.put_descriptor(StreamDescriptor::new("dev", "cmp", "state"));
        let change = feed.recv().await.unwrap();
        assert_eq!(change.new_val.unwrap().device_hostname, "dev");
        assert!(change.old_val.is_none());

        store.remove_descriptor("dev_cmp_state");
        let change = feed.recv().await.unwrap();
        assert!(change.new_val.is_none());
        assert!(change.old_val.is_some());
    }

    #[tokio::test]
    async fn test_sever_feeds_closes_watchers() {
        let store = MemoryStore::new();
        let mut feed = store.watch_descriptors(false).await.unwrap();

        store.sever_feeds();

        assert!(feed.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_range_is_timestamp_ordered() {
        let store = MemoryStore::new();
        let collection = store.collection("s");
        // Out-of-order appends.
        collection.append(entry(EntryKind::Delta, 30)).await.unwrap();
        collection.append(entry(EntryKind::Delta, 10)).await.unwrap();
        collection.append(entry(EntryKind::Delta, 20)).await.unwrap();

        let got = collection.range(10, 30).await.unwrap();
        let ts: Vec<i64> = got.iter().map(|e| e.timestamp).collect();

        // Bounds: exclusive below, inclusive above.
        assert_eq!(ts, vec![20, 30]);
    }

    #[tokio::test]
    async fn test_snapshot_before_returns_latest() {
        let store = MemoryStore::new();
        let collection = store.collection("s");
        collection.append(entry(EntryKind::Snapshot, 5)).await.unwrap();
        collection.append(entry(EntryKind::Delta, 8)).await.unwrap();
        collection.append(entry(EntryKind::Snapshot, 10)).await.unwrap();

        let snap = collection.snapshot_before(11).await.unwrap().unwrap();
        assert_eq!(snap.timestamp, 10);

        let snap = collection.snapshot_before(10).await.unwrap().unwrap();
        assert_eq!(snap.timestamp, 5);

        assert!(collection.snapshot_before(5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_entry_after_with_kind_filter() {
        let store = MemoryStore::new();
        let collection = store.collection("s");
        collection.append(entry(EntryKind::Delta, 5)).await.unwrap();
        collection.append(entry(EntryKind::Snapshot, 10)).await.unwrap();

        let found = collection
            .entry_after(2, EntryFilter::Kind(EntryKind::Snapshot))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.timestamp, 10);

        let found = collection.entry_after(2, EntryFilter::Any).await.unwrap().unwrap();
        assert_eq!(found.timestamp, 5);
    }
}
