//! Stream descriptors and identity derivation
//!
//! Descriptors are created, updated and deleted exclusively by external
//! writers to the descriptor collection; this service only observes them.

use serde::{Deserialize, Serialize};

/// Reconstruction-engine configuration blob
///
/// Carried opaquely with each descriptor and handed back to devices in
/// state listings; the service itself never interprets it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineConfig(pub serde_json::Map<String, serde_json::Value>);

/// Identity and configuration of one stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Derived identity, see [`stream_id`]
    pub id: String,
    /// Reporting device's hostname
    pub device_hostname: String,
    /// Component on the device
    pub component_name: String,
    /// State within the component
    pub state_name: String,
    /// Engine configuration blob
    #[serde(default)]
    pub config: EngineConfig,
}

impl StreamDescriptor {
    /// Build a descriptor with its derived id
    pub fn new(
        device_hostname: impl Into<String>,
        component_name: impl Into<String>,
        state_name: impl Into<String>,
    ) -> Self {
        let device_hostname = device_hostname.into();
        let component_name = component_name.into();
        let state_name = state_name.into();
        Self {
            id: stream_id(&device_hostname, &component_name, &state_name),
            device_hostname,
            component_name,
            state_name,
            config: EngineConfig::default(),
        }
    }
}

/// Derive the stream identity for a (hostname, component, state) triple
///
/// Each non-empty leading segment is followed by `_`; the trailing segment
/// is always the state name. Empty segments are omitted without producing
/// doubled separators.
pub fn stream_id(device_hostname: &str, component_name: &str, state_name: &str) -> String {
    let mut id = String::new();

    if !device_hostname.is_empty() {
        id.push_str(device_hostname);
        id.push('_');
    }
    if !component_name.is_empty() {
        id.push_str(component_name);
        id.push('_');
    }
    id.push_str(state_name);

    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_id_full_triple() {
        assert_eq!(stream_id("host", "cmp", "state"), "host_cmp_state");
    }

    #[test]
    fn test_stream_id_omits_empty_segments() {
        assert_eq!(stream_id("", "cmp", "state"), "cmp_state");
        assert_eq!(stream_id("host", "", "state"), "host_state");
        assert_eq!(stream_id("", "", "state"), "state");
    }

    #[test]
    fn test_stream_id_is_stable() {
        assert_eq!(
            stream_id("host", "cmp", "state"),
            stream_id("host", "cmp", "state")
        );
    }

    #[test]
    fn test_stream_id_distinct_triples_differ() {
        let ids = [
            stream_id("a", "b", "c"),
            stream_id("a", "b", "d"),
            stream_id("a", "x", "c"),
            stream_id("y", "b", "c"),
        ];
        for (i, left) in ids.iter().enumerate() {
            for right in &ids[i + 1..] {
                assert_ne!(left, right);
            }
        }
    }

    #[test]
    fn test_descriptor_new_derives_id() {
        let descriptor = StreamDescriptor::new("dev1", "gps", "position");
        assert_eq!(descriptor.id, "dev1_gps_position");
    }

    #[test]
    fn test_descriptor_serde_defaults_config() {
        let raw = r#"{"id":"a_b_c","device_hostname":"a","component_name":"b","state_name":"c"}"#;
        let descriptor: StreamDescriptor = serde_json::from_str(raw).unwrap();
        assert_eq!(descriptor.config, EngineConfig::default());
    }
}
