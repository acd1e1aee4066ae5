//! Device-facing service: manifests and entry pushes

use std::sync::Arc;

use crate::engine::{StateData, StreamEntry};
use crate::error::{Error, Result};
use crate::registry::StreamRegistry;

use super::types::{
    GetRemoteConfigRequest, GetRemoteConfigResponse, PushStreamEntryRequest,
    PushStreamEntryResponse,
};

/// Handlers for the device-facing surface
pub struct RemoteService {
    registry: Arc<StreamRegistry>,
}

impl RemoteService {
    /// Create the service over a registry
    pub fn new(registry: Arc<StreamRegistry>) -> Self {
        Self { registry }
    }

    /// The manifest of streams a device should report
    pub async fn get_remote_config(
        &self,
        request: GetRemoteConfigRequest,
    ) -> Result<GetRemoteConfigResponse> {
        request.validate()?;
        Ok(GetRemoteConfigResponse {
            config: self.registry.remote_config(&request.host_identifier),
        })
    }

    /// Append one entry to the named stream's log
    ///
    /// The payload must be a JSON object; anything else is rejected before
    /// persistence. The response carries a fresh manifest only when the
    /// checksum the device sent differs from the current one.
    pub async fn push_stream_entry(
        &self,
        request: PushStreamEntryRequest,
    ) -> Result<PushStreamEntryResponse> {
        request.validate()?;
        let Some(entry) = request.entry else {
            return Err(Error::Validation("entry must be specified".into()));
        };
        let data: StateData = serde_json::from_str(&entry.json_data)
            .map_err(|e| Error::Validation(format!("entry payload must be a JSON object: {e}")))?;

        let stream = self.registry.get_stream(&request.context.stream_id()).await?;
        stream
            .write_entry(StreamEntry {
                timestamp: entry.timestamp,
                kind: entry.kind,
                data,
            })
            .await?;

        tracing::debug!(
            stream = %request.context.stream_id(),
            timestamp = entry.timestamp,
            "entry pushed"
        );

        let config = self.registry.remote_config(&request.context.host_identifier);
        let config = (config.crc32 != request.config_crc32).then_some(config);
        Ok(PushStreamEntryResponse { config })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EntryKind;
    use crate::registry::{RegistryConfig, StreamDescriptor};
    use crate::service::types::{PushedEntry, StreamContext};
    use crate::store::MemoryStore;
    use std::time::Duration;

    async fn service_with(store: &MemoryStore) -> RemoteService {
        let config = RegistryConfig::default()
            .reconnect_backoff(Duration::from_millis(10))
            .stream_retry_backoff(Duration::from_millis(10));
        let registry = StreamRegistry::with_config(Arc::new(store.clone()), config);
        registry.init().await.unwrap();
        RemoteService::new(registry)
    }

    fn push_request(json_data: &str, crc32: u32) -> PushStreamEntryRequest {
        PushStreamEntryRequest {
            context: StreamContext::new("dev", "gps", "position"),
            entry: Some(PushedEntry {
                timestamp: 100,
                kind: EntryKind::Snapshot,
                json_data: json_data.into(),
            }),
            config_crc32: crc32,
        }
    }

    #[tokio::test]
    async fn test_push_appends_and_applies() {
        let store = MemoryStore::new();
        store.put_descriptor(StreamDescriptor::new("dev", "gps", "position"));
        let service = service_with(&store).await;

        let response = service.push_stream_entry(push_request(r#"{"lat": 1}"#, 0)).await.unwrap();

        // Checksum 0 never matches a one-stream manifest.
        assert!(response.config.is_some());
        assert_eq!(store.collection("dev_gps_position").len(), 1);

        let stream = service.registry.get_stream("dev_gps_position").await.unwrap();
        assert_eq!(stream.write_cursor().computed_timestamp(), 100);
    }

    #[tokio::test]
    async fn test_push_with_matching_checksum_omits_config() {
        let store = MemoryStore::new();
        store.put_descriptor(StreamDescriptor::new("dev", "gps", "position"));
        let service = service_with(&store).await;

        let current = service
            .get_remote_config(GetRemoteConfigRequest {
                host_identifier: "dev".into(),
            })
            .await
            .unwrap()
            .config;

        let response = service
            .push_stream_entry(push_request(r#"{"lat": 1}"#, current.crc32))
            .await
            .unwrap();
        assert!(response.config.is_none());
    }

    #[tokio::test]
    async fn test_push_rejects_non_object_payload() {
        let store = MemoryStore::new();
        store.put_descriptor(StreamDescriptor::new("dev", "gps", "position"));
        let service = service_with(&store).await;

        let err = service.push_stream_entry(push_request("[1, 2]", 0)).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        // Rejected before persistence.
        assert!(store.collection("dev_gps_position").is_empty());
    }

    #[tokio::test]
    async fn test_push_to_unknown_stream() {
        let store = MemoryStore::new();
        let service = service_with(&store).await;

        let err = service.push_stream_entry(push_request("{}", 0)).await.unwrap_err();
        assert!(matches!(err, Error::StreamNotFound(_)));
    }

    #[tokio::test]
    async fn test_get_remote_config_validates() {
        let store = MemoryStore::new();
        let service = service_with(&store).await;

        let err = service
            .get_remote_config(GetRemoteConfigRequest {
                host_identifier: String::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
