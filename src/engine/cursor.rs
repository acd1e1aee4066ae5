//! Write and read cursors
//!
//! The write cursor is the append-oriented view of a stream: it tracks the
//! latest position folded into "current state" and owns the live fan-out
//! feed for tail subscribers. Its computed position is the single piece of
//! state contended between the local write path and the reconciliation
//! watcher, so it sits behind a sync guard held only for a compare and a
//! fold, never across I/O.
//!
//! Read cursors replay history: seeded from a snapshot, advanced forward
//! through the persisted log, optionally delivering every folded entry to a
//! subscriber channel.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};

use crate::error::{Error, Result};
use crate::store::EntryCollection;

use super::{fold, EntryKind, StateData, StreamEntry};

struct WritePosition {
    state: StateData,
    computed_ts: i64,
    ready: bool,
}

/// Append-oriented cursor over one stream's log
pub struct WriteCursor {
    entries: Arc<dyn EntryCollection>,
    position: Mutex<WritePosition>,
    live: broadcast::Sender<StreamEntry>,
}

impl WriteCursor {
    /// Create a cursor over a collection; not ready until caught up
    ///
    /// `live_capacity` bounds the per-subscriber tail buffer: a receiver
    /// that falls more than this many entries behind loses the oldest ones
    /// instead of stalling the writer.
    pub fn new(entries: Arc<dyn EntryCollection>, live_capacity: usize) -> Self {
        let (live, _) = broadcast::channel(live_capacity.max(1));
        Self {
            entries,
            position: Mutex::new(WritePosition {
                state: StateData::new(),
                computed_ts: 0,
                ready: false,
            }),
            live,
        }
    }

    /// Replay the persisted log up to its latest position
    ///
    /// Safe to call again after a feed loss: the computed position only
    /// moves forward, so overlapping with concurrent appends cannot rewind
    /// it.
    pub async fn catch_up(&self) -> Result<()> {
        let snapshot = self.entries.snapshot_before(i64::MAX).await?;
        let (mut state, seed_ts) = match snapshot {
            Some(snap) => {
                let ts = snap.timestamp;
                (snap.data, ts)
            }
            None => (StateData::new(), 0),
        };

        let rest = self.entries.range(seed_ts, i64::MAX).await?;
        let mut latest = seed_ts;
        for entry in &rest {
            fold(&mut state, entry);
            latest = entry.timestamp;
        }

        let mut position = self.position.lock();
        if latest >= position.computed_ts {
            position.state = state;
            position.computed_ts = latest;
        }
        position.ready = true;
        Ok(())
    }

    /// Whether the cursor has caught up to the persisted log
    pub fn ready(&self) -> bool {
        self.position.lock().ready
    }

    /// Timestamp of the latest applied entry
    pub fn computed_timestamp(&self) -> i64 {
        self.position.lock().computed_ts
    }

    /// Current state and its computed timestamp
    pub fn state(&self) -> (StateData, i64) {
        let position = self.position.lock();
        (position.state.clone(), position.computed_ts)
    }

    /// Subscribe to entries as they are folded in
    pub fn subscribe_live(&self) -> broadcast::Receiver<StreamEntry> {
        self.live.subscribe()
    }

    /// Local write path: fold, publish, then persist
    ///
    /// The fold advances the computed position before the entry reaches the
    /// store, so the change-feed echo of this write fails the timestamp
    /// gate in [`WriteCursor::observe`].
    pub async fn append(&self, entry: StreamEntry) -> Result<()> {
        {
            let mut position = self.position.lock();
            fold(&mut position.state, &entry);
            if entry.timestamp > position.computed_ts {
                position.computed_ts = entry.timestamp;
            }
            let _ = self.live.send(entry.clone());
        }
        self.entries.append(entry).await
    }

    /// Reconciliation path: apply an externally observed entry
    ///
    /// Returns whether the entry was applied. An entry whose timestamp is
    /// not strictly greater than the computed position is discarded: it is
    /// either this process's own write echoed back, or a write already
    /// subsumed. An external write landing between the last position read
    /// and its own persistence is silently dropped; that narrow race is
    /// accepted, not worked around.
    pub fn observe(&self, entry: &StreamEntry) -> bool {
        let mut position = self.position.lock();
        if entry.timestamp <= position.computed_ts {
            return false;
        }
        fold(&mut position.state, entry);
        position.computed_ts = entry.timestamp;
        let _ = self.live.send(entry.clone());
        true
    }
}

/// Replay cursor seeded at an arbitrary time
pub struct ReadCursor {
    entries: Arc<dyn EntryCollection>,
    state: StateData,
    computed_ts: i64,
    feed: Option<mpsc::Sender<StreamEntry>>,
}

impl ReadCursor {
    /// Create an unpositioned cursor over a collection
    pub fn new(entries: Arc<dyn EntryCollection>) -> Self {
        Self {
            entries,
            state: StateData::new(),
            computed_ts: 0,
            feed: None,
        }
    }

    /// Deliver every subsequently folded entry to `tx`
    pub fn subscribe_entries(&mut self, tx: mpsc::Sender<StreamEntry>) {
        self.feed = Some(tx);
    }

    /// Stop delivering folded entries
    pub fn unsubscribe(&mut self) {
        self.feed = None;
    }

    /// Establish state as of `at`
    ///
    /// Seeds from the latest snapshot at or before `at` and folds the
    /// deltas up to it. Fails with [`Error::NoData`] when no snapshot
    /// exists at or before that time.
    pub async fn init(&mut self, at: i64) -> Result<()> {
        let snapshot = self
            .entries
            .snapshot_before(at.saturating_add(1))
            .await?
            .ok_or(Error::NoData)?;
        self.seed_snapshot(snapshot).await?;
        self.advance_to(at).await
    }

    /// Seed the cursor directly from a snapshot entry
    pub async fn seed_snapshot(&mut self, entry: StreamEntry) -> Result<()> {
        if entry.kind != EntryKind::Snapshot {
            return Err(Error::Validation("seed entry must be a snapshot".into()));
        }
        self.state = entry.data.clone();
        self.computed_ts = entry.timestamp;
        self.deliver(&entry).await;
        Ok(())
    }

    /// Fold forward through every persisted entry up to `until`
    ///
    /// Stops early without error if the entry subscriber goes away; that is
    /// a cancellation, not a failure.
    pub async fn advance_to(&mut self, until: i64) -> Result<()> {
        if until <= self.computed_ts {
            return Ok(());
        }
        let pending = self.entries.range(self.computed_ts, until).await?;
        for entry in pending {
            fold(&mut self.state, &entry);
            self.computed_ts = entry.timestamp;
            if !self.deliver(&entry).await {
                break;
            }
        }
        Ok(())
    }

    /// Computed state at the cursor's position
    pub fn state(&self) -> &StateData {
        &self.state
    }

    /// Timestamp of the latest folded entry
    pub fn computed_timestamp(&self) -> i64 {
        self.computed_ts
    }

    async fn deliver(&mut self, entry: &StreamEntry) -> bool {
        let Some(tx) = &self.feed else {
            return true;
        };
        if tx.send(entry.clone()).await.is_err() {
            self.feed = None;
            return false;
        }
        true
    }
}
