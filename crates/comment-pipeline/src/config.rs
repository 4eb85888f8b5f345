//! Pipeline configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::retention::MAX_RETAIN;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Width of the batching window in milliseconds.
    #[serde(default = "default_batch_window_ms")]
    pub batch_window_ms: u64,
    #[serde(default = "default_max_retain")]
    pub max_retain: usize,
    /// Only messages newer than this are spoken or relayed.
    #[serde(default = "default_speech_recency_secs")]
    pub speech_recency_secs: u64,
    /// Most recent eligible messages spoken per batch.
    #[serde(default = "default_speech_batch_cap")]
    pub speech_batch_cap: usize,
    /// Historical messages replayed on connect.
    #[serde(default)]
    pub num_backward: usize,
    /// Initial cursor: `now`, a Unix timestamp or a server cursor.
    #[serde(default = "default_start_at")]
    pub start_at: String,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_batch_window_ms() -> u64 {
    1000
}

fn default_max_retain() -> usize {
    MAX_RETAIN
}

fn default_speech_recency_secs() -> u64 {
    60
}

fn default_speech_batch_cap() -> usize {
    3
}

fn default_start_at() -> String {
    "now".to_string()
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_window_ms: default_batch_window_ms(),
            max_retain: default_max_retain(),
            speech_recency_secs: default_speech_recency_secs(),
            speech_batch_cap: default_speech_batch_cap(),
            num_backward: 0,
            start_at: default_start_at(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl PipelineConfig {
    pub fn batch_window(&self) -> Duration {
        Duration::from_millis(self.batch_window_ms.max(1))
    }

    pub fn speech_recency(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.speech_recency_secs as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.batch_window(), Duration::from_secs(1));
        assert_eq!(config.max_retain, 100);
        assert_eq!(config.speech_recency(), chrono::Duration::seconds(60));
        assert_eq!(config.speech_batch_cap, 3);
        assert_eq!(config.start_at, "now");
    }
}
