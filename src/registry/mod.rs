//! Stream registry: topology, identity, and derived manifests
//!
//! The registry tracks which streams exist by watching the descriptor
//! collection, instantiates live [`crate::stream::Stream`]s lazily, and
//! derives checksummed per-device manifests from the topology.

pub mod config;
pub mod descriptor;
pub mod manifest;
pub mod store;

pub use config::RegistryConfig;
pub use descriptor::{stream_id, EngineConfig, StreamDescriptor};
pub use manifest::{RemoteStream, RemoteStreamConfig};
pub use store::StreamRegistry;
