//! Registry configuration

use std::time::Duration;

/// Tuning knobs for the registry and its streams
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Delay before re-subscribing after the topology feed drops
    pub reconnect_backoff: Duration,

    /// Delay before a stream watcher re-subscribes after its feed drops
    pub stream_retry_backoff: Duration,

    /// Tail buffer capacity per history subscriber; a slower caller loses
    /// oldest entries instead of stalling the writer
    pub tail_buffer: usize,

    /// Buffer between the replay cursor and the frame forwarder during the
    /// initial-set phase
    pub initial_set_buffer: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            reconnect_backoff: Duration::from_secs(3),
            stream_retry_backoff: Duration::from_secs(3),
            tail_buffer: 100,
            initial_set_buffer: 32,
        }
    }
}

impl RegistryConfig {
    /// Set the topology reconnect backoff
    pub fn reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = backoff;
        self
    }

    /// Set the stream watcher retry backoff
    pub fn stream_retry_backoff(mut self, backoff: Duration) -> Self {
        self.stream_retry_backoff = backoff;
        self
    }

    /// Set the tail buffer capacity
    pub fn tail_buffer(mut self, capacity: usize) -> Self {
        self.tail_buffer = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();

        assert_eq!(config.reconnect_backoff, Duration::from_secs(3));
        assert_eq!(config.stream_retry_backoff, Duration::from_secs(3));
        assert_eq!(config.tail_buffer, 100);
    }

    #[test]
    fn test_builder_chaining() {
        let config = RegistryConfig::default()
            .reconnect_backoff(Duration::from_millis(10))
            .stream_retry_backoff(Duration::from_millis(20))
            .tail_buffer(8);

        assert_eq!(config.reconnect_backoff, Duration::from_millis(10));
        assert_eq!(config.stream_retry_backoff, Duration::from_millis(20));
        assert_eq!(config.tail_buffer, 8);
    }
}
