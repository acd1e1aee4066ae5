//! Per-stream reconciliation
//!
//! A [`Stream`] binds one descriptor to its persisted entry collection and
//! a write cursor, and runs a watcher that reconciles externally observed
//! entries into the cursor. Entries reach the log from two sources: this
//! process appending through the write path, and other processes whose
//! writes arrive via change notifications. The watcher's
//! timestamp gate is what keeps the two from double-applying or reordering.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::engine::{EntryFilter, ReadCursor, StreamEntry, WriteCursor};
use crate::error::Result;
use crate::registry::{RegistryConfig, StreamDescriptor};
use crate::store::{Change, EntryCollection, LogStore};

type DisposeHook = Box<dyn FnOnce() + Send>;

/// Live, queryable representation of one stream's entry log
pub struct Stream {
    descriptor: StreamDescriptor,
    entries: Arc<dyn EntryCollection>,
    write_cursor: Arc<WriteCursor>,
    retry_backoff: Duration,
    dispose_tx: watch::Sender<bool>,
    disposed: AtomicBool,
    hooks: Mutex<Vec<DisposeHook>>,
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl Stream {
    /// Open a stream: catch the write cursor up, then start the watcher
    ///
    /// Blocks until the cursor has caught up to the persisted log, so a
    /// freshly opened stream can serve current-state queries immediately.
    pub(crate) async fn open(
        descriptor: StreamDescriptor,
        store: Arc<dyn LogStore>,
        config: &RegistryConfig,
    ) -> Result<Arc<Self>> {
        let entries = store.entries(&descriptor.id).await?;
        let write_cursor = Arc::new(WriteCursor::new(Arc::clone(&entries), config.tail_buffer));
        write_cursor.catch_up().await?;

        let (dispose_tx, _) = watch::channel(false);
        let stream = Arc::new(Self {
            descriptor,
            entries,
            write_cursor,
            retry_backoff: config.stream_retry_backoff,
            dispose_tx,
            disposed: AtomicBool::new(false),
            hooks: Mutex::new(Vec::new()),
        });

        let watcher = Arc::clone(&stream);
        tokio::spawn(async move { watcher.reconcile_loop().await });

        Ok(stream)
    }

    /// The descriptor this stream was opened from
    pub fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    /// The stream's write cursor
    pub fn write_cursor(&self) -> &Arc<WriteCursor> {
        &self.write_cursor
    }

    /// A fresh, unpositioned read cursor over this stream's log
    pub fn read_cursor(&self) -> ReadCursor {
        ReadCursor::new(Arc::clone(&self.entries))
    }

    /// Append one entry through the local write path
    pub async fn write_entry(&self, entry: StreamEntry) -> Result<()> {
        self.write_cursor.append(entry).await
    }

    /// Latest snapshot strictly before `before`
    pub async fn snapshot_before(&self, before: i64) -> Result<Option<StreamEntry>> {
        self.entries.snapshot_before(before).await
    }

    /// Earliest entry strictly after `after` matching `filter`
    pub async fn entry_after(&self, after: i64, filter: EntryFilter) -> Result<Option<StreamEntry>> {
        self.entries.entry_after(after, filter).await
    }

    /// Register a teardown hook, run exactly once on disposal
    pub fn on_dispose(&self, hook: impl FnOnce() + Send + 'static) {
        if self.disposed.load(Ordering::SeqCst) {
            hook();
            return;
        }
        self.hooks.lock().push(Box::new(hook));
    }

    /// Stop the watcher and run teardown hooks
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.dispose_tx.send_replace(true);
        let hooks = std::mem::take(&mut *self.hooks.lock());
        for hook in hooks {
            hook();
        }
        tracing::debug!(stream = %self.descriptor.id, "stream disposed");
    }

    /// Whether the stream has been disposed
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Watcher: reconcile change-feed events into the write cursor,
    /// retrying with a fixed backoff until disposed
    async fn reconcile_loop(self: Arc<Self>) {
        let mut dispose = self.dispose_tx.subscribe();
        loop {
            if *dispose.borrow() {
                return;
            }

            match self.entries.watch().await {
                Ok(mut feed) => {
                    // Subscribe before catching up: events observed during
                    // catch-up overlap with the replay, and the timestamp
                    // gate makes the overlap safe.
                    if let Err(e) = self.write_cursor.catch_up().await {
                        tracing::warn!(stream = %self.descriptor.id, error = %e, "write cursor catch-up failed");
                    } else {
                        loop {
                            tokio::select! {
                                _ = dispose.changed() => return,
                                event = feed.recv() => match event {
                                    Some(change) => self.reconcile(change),
                                    None => break,
                                },
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(stream = %self.descriptor.id, error = %e, "entry feed subscribe failed");
                }
            }

            if *dispose.borrow() {
                return;
            }
            tracing::warn!(
                stream = %self.descriptor.id,
                backoff_ms = self.retry_backoff.as_millis() as u64,
                "entry change feed lost, retrying"
            );
            tokio::select! {
                _ = dispose.changed() => return,
                _ = tokio::time::sleep(self.retry_backoff) => {}
            }
        }
    }

    fn reconcile(&self, change: Change<StreamEntry>) {
        // The log is append-only: only pure insertions are reconcilable.
        if change.marker.is_some() || change.old_val.is_some() {
            return;
        }
        let Some(entry) = change.new_val else {
            return;
        };

        let timestamp = entry.timestamp;
        if self.write_cursor.observe(&entry) {
            tracing::debug!(stream = %self.descriptor.id, timestamp, "applied external entry");
        } else {
            tracing::debug!(stream = %self.descriptor.id, timestamp, "discarded subsumed entry");
        }
    }
}
