//! Client-facing service: state queries, listings, and history
//!
//! `get_state_history` serves a long-lived call as a sequence of frames:
//! first the bounded initial set, concurrently folded and forwarded, then
//! an end-of-initial-set marker, then (if requested) a live tail through a
//! bounded buffer. The caller cancels by dropping the frame receiver; every
//! producer task observes that at its next suspension point and exits.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::engine::{now_ms, EntryFilter, EntryKind, ReadCursor, StreamEntry};
use crate::error::{Error, Result};
use crate::registry::StreamRegistry;

use super::types::{
    GetStateRequest, GetStateResponse, HistoryEntry, HistoryFrame, ListStatesResponse,
    StateHistoryRequest, StateListComponent, StateListState, StateReport,
};

/// Handlers for the client-facing surface
pub struct ViewService {
    registry: Arc<StreamRegistry>,
}

impl ViewService {
    /// Create the service over a registry
    pub fn new(registry: Arc<StreamRegistry>) -> Self {
        Self { registry }
    }

    /// Point-in-time state lookup
    ///
    /// A non-positive time answers from the write cursor; otherwise a
    /// fresh read cursor is positioned at the requested time.
    pub async fn get_state(&self, request: GetStateRequest) -> Result<GetStateResponse> {
        request.validate()?;
        let stream = self.registry.get_stream(&request.context.stream_id()).await?;

        let (state, timestamp) = if request.time <= 0 {
            let cursor = stream.write_cursor();
            if !cursor.ready() {
                return Err(Error::Transient);
            }
            cursor.state()
        } else {
            let mut cursor = stream.read_cursor();
            cursor.init(request.time).await?;
            (cursor.state().clone(), cursor.computed_timestamp())
        };

        Ok(GetStateResponse {
            state: StateReport {
                json_state: serde_json::to_string(&state)?,
                timestamp,
            },
        })
    }

    /// Every known state, grouped by device and component
    pub fn list_states(&self) -> ListStatesResponse {
        let mut grouped: BTreeMap<(String, String), Vec<StateListState>> = BTreeMap::new();
        for descriptor in self.registry.known_streams() {
            grouped
                .entry((descriptor.device_hostname, descriptor.component_name))
                .or_default()
                .push(StateListState {
                    name: descriptor.state_name,
                    config: descriptor.config,
                });
        }

        let components = grouped
            .into_iter()
            .map(|((host_identifier, name), mut states)| {
                states.sort_by(|a, b| a.name.cmp(&b.name));
                StateListComponent {
                    host_identifier,
                    name,
                    states,
                }
            })
            .collect();
        ListStatesResponse { components }
    }

    /// Bounded history replay, optionally followed by a live tail
    ///
    /// Frames arrive on the returned channel; dropping it cancels the
    /// call. Seeding errors surface here, before any frame is produced:
    /// [`Error::NoData`] when nothing can establish state in the requested
    /// range, [`Error::Transient`] when a tail was requested but the write
    /// cursor has not caught up yet.
    ///
    /// A store failure during the replay itself cannot surface through the
    /// frame channel: the channel closes without an
    /// [`HistoryFrame::InitialSetComplete`] marker. A close before the
    /// marker therefore always means the replay failed and the call should
    /// be retried.
    pub async fn get_state_history(
        &self,
        request: StateHistoryRequest,
    ) -> Result<mpsc::Receiver<HistoryFrame>> {
        request.validate()?;
        let stream_id = request.context.stream_id();
        let stream = self.registry.get_stream(&stream_id).await?;

        let begin = request.begin_time;
        let end = if request.end_time == 0 {
            now_ms()
        } else {
            request.end_time
        };

        // Resolve the cursor seed before producing any frame. If no
        // snapshot exists at or before the begin time, fall back to the
        // first snapshot strictly after it; the effective begin advances
        // to that snapshot's timestamp.
        let seed = match stream.snapshot_before(begin.saturating_add(1)).await? {
            Some(snapshot) => snapshot,
            None => match stream
                .entry_after(begin, EntryFilter::Kind(EntryKind::Snapshot))
                .await?
            {
                Some(snapshot) if snapshot.timestamp <= end => snapshot,
                _ => return Err(Error::NoData),
            },
        };

        // Check tail readiness up front so the caller gets the retry
        // signal instead of a truncated stream.
        let live = if request.tail {
            let cursor = stream.write_cursor();
            if !cursor.ready() {
                return Err(Error::Transient);
            }
            Some(cursor.subscribe_live())
        } else {
            None
        };

        let config = self.registry.config();
        let (frames_tx, frames_rx) = mpsc::channel(config.tail_buffer.max(1));
        let initial_buffer = config.initial_set_buffer.max(1);
        let cursor = stream.read_cursor();

        tokio::spawn(async move {
            if let Err(e) = run_history(cursor, seed, end, live, frames_tx, initial_buffer).await {
                tracing::warn!(stream = %stream_id, error = %e, "state history terminated");
            }
        });

        Ok(frames_rx)
    }
}

async fn run_history(
    mut cursor: ReadCursor,
    seed: StreamEntry,
    end: i64,
    live: Option<broadcast::Receiver<StreamEntry>>,
    frames: mpsc::Sender<HistoryFrame>,
    initial_buffer: usize,
) -> Result<()> {
    // Phase 1: forward every entry the cursor folds while it advances.
    let (entries_tx, mut entries_rx) = mpsc::channel::<StreamEntry>(initial_buffer);
    cursor.subscribe_entries(entries_tx);

    let forward = {
        let frames = frames.clone();
        tokio::spawn(async move {
            while let Some(entry) = entries_rx.recv().await {
                let frame = match HistoryEntry::from_entry(&entry) {
                    Ok(history_entry) => HistoryFrame::InitialSet(history_entry),
                    Err(e) => {
                        tracing::warn!(error = %e, "undeliverable history entry");
                        continue;
                    }
                };
                if frames.send(frame).await.is_err() {
                    // Caller went away; dropping the receiver stops the fold.
                    return;
                }
            }
        })
    };

    let replayed = {
        let result = cursor.seed_snapshot(seed).await;
        match result {
            Ok(()) => cursor.advance_to(end).await,
            Err(e) => Err(e),
        }
    };
    cursor.unsubscribe();
    let _ = forward.await;
    replayed?;

    if frames.send(HistoryFrame::InitialSetComplete).await.is_err() {
        return Ok(());
    }

    // Phase 2: tail. Entries folded during the initial set are filtered
    // out by position; the live feed only carries gate-passing entries, so
    // the position check is exact, not heuristic.
    let Some(mut live) = live else {
        return Ok(());
    };
    let floor = cursor.computed_timestamp();
    loop {
        tokio::select! {
            _ = frames.closed() => return Ok(()),
            event = live.recv() => match event {
                Ok(entry) => {
                    if entry.timestamp <= floor {
                        continue;
                    }
                    let frame = HistoryFrame::Tail(HistoryEntry::from_entry(&entry)?);
                    if frames.send(frame).await.is_err() {
                        return Ok(());
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "history tail lagging, entries dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },
        }
    }
}
