//! Stream registry implementation
//!
//! The registry owns the authoritative view of which streams exist. It
//! performs an initial full load of descriptors, then watches the
//! descriptor collection for topology changes, keeping three indices
//! consistent: the known-stream index (id to descriptor), the loaded-stream
//! index (id to live [`Stream`], always a subset of known), and the
//! manifest cache (hostname to derived [`RemoteStreamConfig`]).
//!
//! A dropped topology subscription may have missed events and cannot be
//! trusted to resume, so every reconnect clears and rebuilds all three
//! indices.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::store::{Change, ChangeFeed, LogStore};
use crate::stream::Stream;

use super::config::RegistryConfig;
use super::descriptor::StreamDescriptor;
use super::manifest::RemoteStreamConfig;

#[derive(Default)]
struct Indices {
    /// All known streams, rebuilt wholesale on every (re)connect
    known: HashMap<String, StreamDescriptor>,
    /// Lazily instantiated streams; strict subset of `known`
    loaded: HashMap<String, Arc<Stream>>,
    /// Derived manifests; delete to invalidate one
    manifests: HashMap<String, RemoteStreamConfig>,
}

/// Registry of known and loaded streams
pub struct StreamRegistry {
    store: Arc<dyn LogStore>,
    config: RegistryConfig,
    indices: Arc<RwLock<Indices>>,
    dispose_tx: watch::Sender<bool>,
}

impl StreamRegistry {
    /// Create a registry with default configuration
    pub fn new(store: Arc<dyn LogStore>) -> Arc<Self> {
        Self::with_config(store, RegistryConfig::default())
    }

    /// Create a registry with custom configuration
    pub fn with_config(store: Arc<dyn LogStore>, config: RegistryConfig) -> Arc<Self> {
        let (dispose_tx, _) = watch::channel(false);
        Arc::new(Self {
            store,
            config,
            indices: Arc::new(RwLock::new(Indices::default())),
            dispose_tx,
        })
    }

    /// The registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Initial full load of stream descriptors
    ///
    /// Blocks until the initial load completes, then starts the background
    /// topology watcher. Fails with [`Error::Startup`] if the load cannot
    /// complete; subsequent watcher failures are recovered internally and
    /// never surface here.
    pub async fn init(self: &Arc<Self>) -> Result<()> {
        let feed = self
            .connect()
            .await
            .map_err(|e| Error::Startup(e.to_string()))?;

        let registry = Arc::clone(self);
        tokio::spawn(async move { registry.watch_topology(feed).await });
        Ok(())
    }

    /// The loaded stream for `id`, instantiating it on first access
    pub async fn get_stream(self: &Arc<Self>, id: &str) -> Result<Arc<Stream>> {
        let descriptor = {
            let indices = self.indices.read();
            if let Some(stream) = indices.loaded.get(id) {
                return Ok(Arc::clone(stream));
            }
            indices
                .known
                .get(id)
                .cloned()
                .ok_or_else(|| Error::StreamNotFound(id.to_string()))?
        };

        let stream = Stream::open(descriptor, Arc::clone(&self.store), &self.config).await?;

        // Evict from the loaded index whenever the stream is disposed. The
        // pointer check keeps a raced, never-inserted instance from
        // evicting the one that won.
        let indices = Arc::clone(&self.indices);
        let stream_id = id.to_string();
        let this = Arc::downgrade(&stream);
        stream.on_dispose(move || {
            let mut indices = indices.write();
            let matches = match (indices.loaded.get(&stream_id), this.upgrade()) {
                (Some(current), Some(me)) => Arc::ptr_eq(current, &me),
                _ => false,
            };
            if matches {
                indices.loaded.remove(&stream_id);
            }
        });

        // A topology change or a concurrent caller may have raced us.
        let raced = {
            let mut indices = self.indices.write();
            if !indices.known.contains_key(id) {
                None
            } else {
                match indices.loaded.get(id) {
                    Some(existing) => Some(Arc::clone(existing)),
                    None => {
                        indices.loaded.insert(id.to_string(), Arc::clone(&stream));
                        return Ok(stream);
                    }
                }
            }
        };

        stream.dispose();
        raced.ok_or_else(|| Error::StreamNotFound(id.to_string()))
    }

    /// All known descriptors for a device; pure read, no I/O
    pub fn device_streams(&self, hostname: &str) -> Vec<StreamDescriptor> {
        self.indices
            .read()
            .known
            .values()
            .filter(|d| d.device_hostname == hostname)
            .cloned()
            .collect()
    }

    /// Every known descriptor
    pub fn known_streams(&self) -> Vec<StreamDescriptor> {
        self.indices.read().known.values().cloned().collect()
    }

    /// The cached manifest for a device, deriving it if absent
    ///
    /// Derivation and insert happen under one guard: a topology change
    /// landing between them could otherwise re-cache a manifest its
    /// invalidation had just deleted. A cached manifest is therefore
    /// always the derivation of the current known index.
    pub fn remote_config(&self, hostname: &str) -> RemoteStreamConfig {
        if let Some(config) = self.indices.read().manifests.get(hostname) {
            return config.clone();
        }

        let mut indices = self.indices.write();
        if let Some(config) = indices.manifests.get(hostname) {
            return config.clone();
        }
        let config = RemoteStreamConfig::from_descriptors(
            indices
                .known
                .values()
                .filter(|d| d.device_hostname == hostname),
        );
        indices
            .manifests
            .insert(hostname.to_string(), config.clone());
        config
    }

    /// Stop the topology watcher and dispose every loaded stream
    pub fn dispose(&self) {
        self.dispose_tx.send_replace(true);
        self.reset_indices();
    }

    /// Subscribe with initial contents and rebuild the indices
    ///
    /// Returns the feed positioned after the ready marker. The indices are
    /// wholly reset first: a resumed subscription cannot be trusted after
    /// a drop.
    async fn connect(&self) -> Result<ChangeFeed<StreamDescriptor>> {
        let mut feed = self.store.watch_descriptors(true).await?;
        self.reset_indices();

        loop {
            match feed.recv().await {
                None => {
                    return Err(Error::Transport(
                        "descriptor feed closed during initial load".into(),
                    ))
                }
                Some(change) if change.is_ready_marker() => break,
                Some(change) => self.apply_change(change),
            }
        }

        let known = self.indices.read().known.len();
        tracing::info!(streams = known, "stream topology synced");
        Ok(feed)
    }

    fn reset_indices(&self) {
        let loaded = {
            let mut indices = self.indices.write();
            indices.known.clear();
            indices.manifests.clear();
            indices.loaded.drain().map(|(_, s)| s).collect::<Vec<_>>()
        };
        for stream in loaded {
            stream.dispose();
        }
    }

    /// Topology watcher: Synced until the feed drops, then Disconnected
    /// with a fixed backoff, then Connecting again
    async fn watch_topology(self: Arc<Self>, mut feed: ChangeFeed<StreamDescriptor>) {
        let mut dispose = self.dispose_tx.subscribe();
        loop {
            if *dispose.borrow() {
                return;
            }

            // Synced: apply events until the feed ends.
            loop {
                tokio::select! {
                    _ = dispose.changed() => return,
                    event = feed.recv() => match event {
                        Some(change) => self.apply_change(change),
                        None => break,
                    },
                }
            }

            tracing::warn!(
                backoff_ms = self.config.reconnect_backoff.as_millis() as u64,
                "lost descriptor change feed, reconnecting"
            );

            // Disconnected: back off, then rebuild from scratch.
            loop {
                tokio::select! {
                    _ = dispose.changed() => return,
                    _ = tokio::time::sleep(self.config.reconnect_backoff) => {}
                }
                match self.connect().await {
                    Ok(fresh) => {
                        feed = fresh;
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "descriptor reload failed, retrying");
                    }
                }
            }
        }
    }

    /// Reconciliation rule, applied during initial load and live operation
    fn apply_change(&self, change: Change<StreamDescriptor>) {
        if change.marker.is_some() {
            return;
        }

        let mut disposed: Option<Arc<Stream>> = None;
        {
            let mut indices = self.indices.write();

            match (change.old_val, change.new_val) {
                // Deletion: tear down the loaded stream with the descriptor.
                (Some(old), None) => {
                    tracing::info!(stream = %old.id, "removing stream");
                    indices.known.remove(&old.id);
                    disposed = indices.loaded.remove(&old.id);
                    indices.manifests.remove(&old.device_hostname);
                }
                // Insertion or update: upsert the known index.
                (old, Some(new)) => {
                    tracing::info!(stream = %new.id, "upserting stream");
                    if let Some(old) = old {
                        if old.device_hostname != new.device_hostname {
                            indices.manifests.remove(&old.device_hostname);
                        }
                    }
                    indices.manifests.remove(&new.device_hostname);
                    indices.known.insert(new.id.clone(), new);
                }
                // Control events carry neither value.
                (None, None) => {}
            }
        }

        if let Some(stream) = disposed {
            stream.dispose();
        }
    }
}
