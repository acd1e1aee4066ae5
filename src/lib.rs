//! Time-series state service core
//!
//! Networked devices report their state as streams of timestamped entries:
//! full snapshots and partial deltas. This crate keeps a registry of those
//! streams consistent with an external append-only store, reconstructs
//! current and historical state by folding entries forward, and serves it
//! back as point-in-time queries or snapshot+tail history streams.
//!
//! # Architecture
//!
//! - [`store`]: the persistence boundary, an append-only [`store::LogStore`]
//!   with change-feed subscriptions, plus the in-memory implementation.
//! - [`engine`]: entry folding and the two cursor views, the write cursor
//!   tracking live state and read cursors replaying history.
//! - [`registry`]: stream topology, descriptor watching, lazy stream
//!   instantiation, and checksummed per-device manifests.
//! - [`stream`]: one live stream, its write cursor plus the watcher that
//!   reconciles externally observed entries through a timestamp gate.
//! - [`service`]: the device-facing and client-facing handler surfaces.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use statelog::store::MemoryStore;
//! use statelog::{StreamRegistry, ViewService};
//!
//! # async fn run() -> statelog::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! let registry = StreamRegistry::new(store);
//! registry.init().await?;
//! let views = ViewService::new(registry);
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod error;
pub mod registry;
pub mod service;
pub mod store;
pub mod stream;

pub use engine::{EntryKind, StreamEntry};
pub use error::{Error, Result};
pub use registry::{RegistryConfig, StreamRegistry};
pub use service::{RemoteService, ViewService};
pub use stream::Stream;
