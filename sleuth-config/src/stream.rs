//! Stream publisher configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct StreamConfig {
    /// Publisher tick, milliseconds.
    #[validate(range(min = 50, max = 60000))]
    #[serde(default = "default_interval")]
    pub interval_ms: u64,

    /// Messages buffered on each observer channel before the publisher
    /// waits on the observer.
    #[validate(range(min = 1, max = 65536))]
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_interval() -> u64 {
    2000
}

fn default_channel_capacity() -> usize {
    256
}

impl StreamConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval(),
            channel_capacity: default_channel_capacity(),
        }
    }
}
