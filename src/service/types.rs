//! Request, response and frame types for the service surface
//!
//! Field validation happens here, before any I/O: a malformed request is
//! rejected with [`Error::Validation`] without touching the store.

use serde::{Deserialize, Serialize};

use crate::engine::{EntryKind, StreamEntry};
use crate::error::{Error, Result};
use crate::registry::{stream_id, EngineConfig, RemoteStreamConfig};

/// Identifies one stream from the caller's side
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamContext {
    /// Device hostname
    pub host_identifier: String,
    /// Component on the device (may be empty)
    pub component_id: String,
    /// State within the component
    pub state_id: String,
}

impl StreamContext {
    /// Build a context
    pub fn new(
        host_identifier: impl Into<String>,
        component_id: impl Into<String>,
        state_id: impl Into<String>,
    ) -> Self {
        Self {
            host_identifier: host_identifier.into(),
            component_id: component_id.into(),
            state_id: state_id.into(),
        }
    }

    /// The derived stream identity for this context
    pub fn stream_id(&self) -> String {
        stream_id(&self.host_identifier, &self.component_id, &self.state_id)
    }

    /// Reject contexts missing required fields
    pub fn validate(&self) -> Result<()> {
        if self.host_identifier.is_empty() {
            return Err(Error::Validation("host identifier must be specified".into()));
        }
        if self.state_id.is_empty() {
            return Err(Error::Validation("state id must be specified".into()));
        }
        Ok(())
    }
}

/// Request for a device's stream manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetRemoteConfigRequest {
    /// Device hostname
    pub host_identifier: String,
}

impl GetRemoteConfigRequest {
    pub fn validate(&self) -> Result<()> {
        if self.host_identifier.is_empty() {
            return Err(Error::Validation("host identifier must be specified".into()));
        }
        Ok(())
    }
}

/// Response carrying a device's stream manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetRemoteConfigResponse {
    pub config: RemoteStreamConfig,
}

/// One entry pushed by a device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushedEntry {
    /// Unix milliseconds; must be positive
    pub timestamp: i64,
    /// Snapshot or delta
    pub kind: EntryKind,
    /// JSON object payload
    pub json_data: String,
}

/// Request appending one entry to a stream's log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushStreamEntryRequest {
    pub context: StreamContext,
    pub entry: Option<PushedEntry>,
    /// Manifest checksum the device currently holds
    pub config_crc32: u32,
}

impl PushStreamEntryRequest {
    pub fn validate(&self) -> Result<()> {
        self.context.validate()?;
        let entry = self
            .entry
            .as_ref()
            .ok_or_else(|| Error::Validation("entry must be specified".into()))?;
        if entry.timestamp <= 0 {
            return Err(Error::Validation("entry timestamp must be positive".into()));
        }
        Ok(())
    }
}

/// Response to a push; carries a fresh manifest only on checksum mismatch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushStreamEntryResponse {
    pub config: Option<RemoteStreamConfig>,
}

/// Point-in-time state request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetStateRequest {
    pub context: StreamContext,
    /// Unix milliseconds; non-positive means "current state"
    pub time: i64,
}

impl GetStateRequest {
    pub fn validate(&self) -> Result<()> {
        self.context.validate()
    }
}

/// Serialized state at a computed timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateReport {
    pub json_state: String,
    pub timestamp: i64,
}

/// Point-in-time state response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetStateResponse {
    pub state: StateReport,
}

/// One state under a component in a listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateListState {
    pub name: String,
    pub config: EngineConfig,
}

/// One device component and its states
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateListComponent {
    pub host_identifier: String,
    pub name: String,
    pub states: Vec<StateListState>,
}

/// Listing of every known state, grouped by device and component
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListStatesResponse {
    pub components: Vec<StateListComponent>,
}

/// History replay request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateHistoryRequest {
    pub context: StreamContext,
    /// Unix milliseconds, inclusive lower bound
    pub begin_time: i64,
    /// Unix milliseconds, inclusive upper bound; zero means "now"
    pub end_time: i64,
    /// Follow the live feed after the initial set
    pub tail: bool,
}

impl StateHistoryRequest {
    pub fn validate(&self) -> Result<()> {
        self.context.validate()?;
        if self.begin_time < 0 || self.end_time < 0 {
            return Err(Error::Validation("history bounds must be non-negative".into()));
        }
        if self.end_time != 0 && self.end_time < self.begin_time {
            return Err(Error::Validation("end time precedes begin time".into()));
        }
        Ok(())
    }
}

/// One entry as delivered in a history frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub json_state: String,
    pub timestamp: i64,
    pub kind: EntryKind,
}

impl HistoryEntry {
    pub(crate) fn from_entry(entry: &StreamEntry) -> Result<Self> {
        Ok(Self {
            json_state: serde_json::to_string(&entry.data)?,
            timestamp: entry.timestamp,
            kind: entry.kind,
        })
    }
}

/// One frame of a history response stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HistoryFrame {
    /// Entry from the bounded initial replay
    InitialSet(HistoryEntry),
    /// The initial set is complete; tail frames may follow
    InitialSetComplete,
    /// Entry from the live feed
    Tail(HistoryEntry),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_validation() {
        assert!(StreamContext::new("host", "cmp", "state").validate().is_ok());
        assert!(StreamContext::new("host", "", "state").validate().is_ok());
        assert!(StreamContext::new("", "cmp", "state").validate().is_err());
        assert!(StreamContext::new("host", "cmp", "").validate().is_err());
    }

    #[test]
    fn test_context_stream_id() {
        let context = StreamContext::new("host", "cmp", "state");
        assert_eq!(context.stream_id(), "host_cmp_state");
    }

    #[test]
    fn test_push_request_requires_entry() {
        let request = PushStreamEntryRequest {
            context: StreamContext::new("host", "cmp", "state"),
            entry: None,
            config_crc32: 0,
        };
        assert!(matches!(request.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_push_request_rejects_bad_timestamp() {
        let request = PushStreamEntryRequest {
            context: StreamContext::new("host", "cmp", "state"),
            entry: Some(PushedEntry {
                timestamp: 0,
                kind: EntryKind::Delta,
                json_data: "{}".into(),
            }),
            config_crc32: 0,
        };
        assert!(matches!(request.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_history_request_bounds() {
        let mut request = StateHistoryRequest {
            context: StreamContext::new("host", "cmp", "state"),
            begin_time: 10,
            end_time: 5,
            tail: false,
        };
        assert!(request.validate().is_err());

        request.end_time = 0; // "now"
        assert!(request.validate().is_ok());

        request.end_time = 10;
        assert!(request.validate().is_ok());
    }
}
