//! Client configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for [`NdgrClient`](crate::NdgrClient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Retries after the first attempt for connection-level faults.
    #[serde(default = "default_max_retry")]
    pub max_retry: u32,
    /// Fixed delay between retries in milliseconds.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// Delay between backward page fetches in milliseconds.
    #[serde(default = "default_backward_segment_interval_ms")]
    pub backward_segment_interval_ms: u64,
    /// Whole-request timeout. Unset by default since head requests long-poll.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Capacity of the channel between the fetch task and the consumer.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_max_retry() -> u32 {
    3
}

fn default_retry_interval_ms() -> u64 {
    1000
}

fn default_backward_segment_interval_ms() -> u64 {
    7
}

fn default_connect_timeout_ms() -> u64 {
    30_000
}

fn default_user_agent() -> String {
    concat!("ndgr-client/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_retry: default_max_retry(),
            retry_interval_ms: default_retry_interval_ms(),
            backward_segment_interval_ms: default_backward_segment_interval_ms(),
            request_timeout_ms: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            user_agent: default_user_agent(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl ClientConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn backward_segment_interval(&self) -> Duration {
        Duration::from_millis(self.backward_segment_interval_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Set the retry count.
    pub fn with_max_retry(mut self, max_retry: u32) -> Self {
        self.max_retry = max_retry;
        self
    }

    /// Set the retry interval.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval_ms = interval.as_millis() as u64;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.max_retry, 3);
        assert_eq!(config.retry_interval(), Duration::from_secs(1));
        assert_eq!(config.backward_segment_interval(), Duration::from_millis(7));
        assert_eq!(config.request_timeout(), None);
        assert_eq!(config.channel_capacity, 256);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ClientConfig = serde_json::from_str(r#"{"max_retry": 5}"#).unwrap();
        assert_eq!(config.max_retry, 5);
        assert_eq!(config.retry_interval_ms, 1000);
        assert_eq!(config.connect_timeout_ms, 30_000);
    }
}
