//! Embedded end-to-end example
//!
//! Run with: cargo run --example embedded
//!
//! Wires the whole pipeline in one process over the in-memory store:
//! a descriptor is registered, a "device" pushes a snapshot and deltas
//! through the device-facing service, and a "client" queries current state,
//! lists the topology, and follows a history stream with a live tail.

use std::sync::Arc;

use statelog::engine::now_ms;
use statelog::registry::StreamDescriptor;
use statelog::service::{
    GetStateRequest, HistoryFrame, PushStreamEntryRequest, PushedEntry, StateHistoryRequest,
    StreamContext,
};
use statelog::store::MemoryStore;
use statelog::{EntryKind, RemoteService, StreamRegistry, ViewService};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,statelog=debug".into()),
        )
        .init();

    let store = Arc::new(MemoryStore::new());
    store.put_descriptor(StreamDescriptor::new("rover-1", "gps", "position"));

    let registry = StreamRegistry::new(store);
    registry.init().await?;

    let remote = RemoteService::new(Arc::clone(&registry));
    let views = ViewService::new(Arc::clone(&registry));
    let context = StreamContext::new("rover-1", "gps", "position");

    // The device pushes entries; a stale checksum gets the manifest back.
    let base = now_ms();
    push(&remote, &context, base, EntryKind::Snapshot, r#"{"lat": 37.77, "lon": -122.42}"#).await?;
    push(&remote, &context, base + 1_000, EntryKind::Delta, r#"{"lat": 37.78}"#).await?;
    push(&remote, &context, base + 2_000, EntryKind::Delta, r#"{"lon": -122.41}"#).await?;

    // Current state folds the snapshot and both deltas.
    let current = views
        .get_state(GetStateRequest {
            context: context.clone(),
            time: 0,
        })
        .await?;
    println!("current state @ {}: {}", current.state.timestamp, current.state.json_state);

    // Topology listing.
    for component in views.list_states().components {
        for state in &component.states {
            println!(
                "known stream: {}/{}/{}",
                component.host_identifier, component.name, state.name
            );
        }
    }

    // History with a live tail: replay first, then follow new pushes.
    let mut frames = views
        .get_state_history(StateHistoryRequest {
            context: context.clone(),
            begin_time: base,
            end_time: 0,
            tail: true,
        })
        .await?;

    let pusher = tokio::spawn(async move {
        push(&remote, &context, base + 3_000, EntryKind::Delta, r#"{"lat": 37.79}"#).await
    });

    let mut tailed = 0;
    while let Some(frame) = frames.recv().await {
        match frame {
            HistoryFrame::InitialSet(entry) => {
                println!("initial @ {}: {}", entry.timestamp, entry.json_state);
            }
            HistoryFrame::InitialSetComplete => println!("initial set complete"),
            HistoryFrame::Tail(entry) => {
                println!("tail @ {}: {}", entry.timestamp, entry.json_state);
                tailed += 1;
                if tailed == 1 {
                    break;
                }
            }
        }
    }
    pusher.await??;

    registry.dispose();
    Ok(())
}

async fn push(
    remote: &RemoteService,
    context: &StreamContext,
    timestamp: i64,
    kind: EntryKind,
    json_data: &str,
) -> statelog::Result<()> {
    let response = remote
        .push_stream_entry(PushStreamEntryRequest {
            context: context.clone(),
            entry: Some(PushedEntry {
                timestamp,
                kind,
                json_data: json_data.into(),
            }),
            config_crc32: 0,
        })
        .await?;
    if let Some(config) = response.config {
        tracing::info!(crc32 = config.crc32, streams = config.streams.len(), "manifest refreshed");
    }
    Ok(())
}
