//! Messages pushed to observers on the streaming channel.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::record::SharedRecord;
use crate::stats::{SourceObservation, StatsView};

/// Wire shape: `{"type": "packet" | "stats", "data": ...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum StreamMessage {
    Packet(SharedRecord),
    Stats(StatsSnapshot),
}

impl StreamMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub total_packets: u64,
    pub packets_per_second: f64,
    pub anomalies: u64,
    /// Human readable, e.g. `"12 KB"`.
    pub data_volume: String,
    #[serde(rename = "uniqueIPs")]
    pub unique_ips: usize,
    pub protocol_distribution: BTreeMap<String, u64>,
    pub top_sources: Vec<SourceObservation>,
}

impl StatsSnapshot {
    pub fn from_view(view: StatsView, packets_per_second: f64) -> Self {
        Self {
            total_packets: view.total_packets,
            packets_per_second,
            anomalies: view.anomaly_count,
            data_volume: format_volume(view.total_bytes),
            unique_ips: view.unique_endpoints,
            protocol_distribution: view.protocol_histogram,
            top_sources: view.recent_sources,
        }
    }
}

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;

/// Formats a byte count: whole bytes and kilobytes, one decimal for
/// megabytes, two for gigabytes.
pub fn format_volume(bytes: u64) -> String {
    match bytes {
        b if b < KIB => format!("{b} B"),
        b if b < MIB => format!("{} KB", b / KIB),
        b if b < GIB => format!("{:.1} MB", b as f64 / MIB as f64),
        b => format!("{:.2} GB", b as f64 / GIB as f64),
    }
}
