//! Event queue sizing and aggregate statistics parameters.

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

#[derive(Default, Debug, Serialize, Deserialize, Validate, Clone)]
pub struct PipelineConfig {
    /// Per‑observer event queues.
    #[serde(default)]
    #[validate(nested)]
    pub queue: QueueConfig,

    /// Aggregate statistics.
    #[serde(default)]
    #[validate(nested)]
    pub stats: StatsConfig,
}

/// What an observer queue discards when it is full.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverflowMode {
    #[default]
    DropOldest,
    DropNewest,
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct QueueConfig {
    /// Records buffered per observer between publisher ticks.
    #[validate(range(min = 16, max = 1048576))]
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    #[serde(default)]
    pub overflow: OverflowMode,
}

fn default_capacity() -> usize {
    4096
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            overflow: OverflowMode::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct StatsConfig {
    /// Scores strictly above this count as anomalies.
    #[validate(range(min = 0.0, max = 1.0))]
    #[serde(default = "default_anomaly_threshold")]
    pub anomaly_threshold: f64,

    /// Number of recent source observations reported.
    #[validate(range(min = 1, max = 100))]
    #[serde(default = "default_recent_sources")]
    pub recent_sources: usize,
}

fn default_anomaly_threshold() -> f64 {
    0.7
}

fn default_recent_sources() -> usize {
    5
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            anomaly_threshold: default_anomaly_threshold(),
            recent_sources: default_recent_sources(),
        }
    }
}
