//! Per-device stream manifests
//!
//! The manifest tells a device which streams it should report. The
//! checksum lets the device skip re-fetching it on every push: the push
//! path returns a fresh manifest only when the checksum the device holds
//! differs from the one the service computes.

use serde::{Deserialize, Serialize};

use super::descriptor::StreamDescriptor;

/// One stream a device is expected to report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteStream {
    /// Component identifier
    pub component_id: String,
    /// State identifier
    pub state_id: String,
}

/// Derived, checksummed list of a device's streams
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteStreamConfig {
    /// Ordered stream list
    pub streams: Vec<RemoteStream>,
    /// CRC32 over the ordered pair list
    pub crc32: u32,
}

impl RemoteStreamConfig {
    /// Derive a manifest from a device's descriptors
    ///
    /// The stream list is sorted so that two processes deriving from the
    /// same topology compute the same checksum.
    pub fn from_descriptors<'a>(descriptors: impl IntoIterator<Item = &'a StreamDescriptor>) -> Self {
        let mut streams: Vec<RemoteStream> = descriptors
            .into_iter()
            .map(|d| RemoteStream {
                component_id: d.component_name.clone(),
                state_id: d.state_name.clone(),
            })
            .collect();
        streams.sort();

        let mut config = Self { streams, crc32: 0 };
        config.fill_crc32();
        config
    }

    /// Recompute and store the checksum
    pub fn fill_crc32(&mut self) {
        self.crc32 = self.computed_crc32();
    }

    /// Checksum as a pure function of the ordered pair list
    pub fn computed_crc32(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        for stream in &self.streams {
            hasher.update(stream.component_id.as_bytes());
            hasher.update(&[0]);
            hasher.update(stream.state_id.as_bytes());
            hasher.update(&[0]);
        }
        hasher.finalize()
    }
}

impl PartialOrd for RemoteStream {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RemoteStream {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (&self.component_id, &self.state_id).cmp(&(&other.component_id, &other.state_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptors() -> Vec<StreamDescriptor> {
        vec![
            StreamDescriptor::new("dev", "imu", "orientation"),
            StreamDescriptor::new("dev", "gps", "position"),
        ]
    }

    #[test]
    fn test_manifest_is_sorted_and_checksummed() {
        let descs = descriptors();
        let config = RemoteStreamConfig::from_descriptors(&descs);

        assert_eq!(config.streams[0].component_id, "gps");
        assert_eq!(config.streams[1].component_id, "imu");
        assert_eq!(config.crc32, config.computed_crc32());
        assert_ne!(config.crc32, 0);
    }

    #[test]
    fn test_checksum_is_order_insensitive_across_processes() {
        let mut descs = descriptors();
        let forward = RemoteStreamConfig::from_descriptors(&descs);
        descs.reverse();
        let backward = RemoteStreamConfig::from_descriptors(&descs);

        assert_eq!(forward, backward);
    }

    #[test]
    fn test_checksum_depends_on_stream_set() {
        let descs = descriptors();
        let full = RemoteStreamConfig::from_descriptors(&descs);
        let partial = RemoteStreamConfig::from_descriptors(&descs[..1]);

        assert_ne!(full.crc32, partial.crc32);
    }

    #[test]
    fn test_checksum_separates_segments() {
        // ("ab", "c") must not collide with ("a", "bc").
        let a = RemoteStreamConfig::from_descriptors(&[StreamDescriptor::new("d", "ab", "c")]);
        let b = RemoteStreamConfig::from_descriptors(&[StreamDescriptor::new("d", "a", "bc")]);

        assert_ne!(a.crc32, b.crc32);
    }

    #[test]
    fn test_empty_manifest() {
        let config = RemoteStreamConfig::from_descriptors([]);
        assert!(config.streams.is_empty());
        assert_eq!(config.crc32, crc32fast::hash(&[]));
    }
}
