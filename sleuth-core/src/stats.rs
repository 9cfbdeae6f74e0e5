//! ## sleuth-core::stats
//! **Running aggregate statistics for the current capture**
//!
//! Written by the capture thread for every classified record, read by the
//! stream publishers through [`StatsAggregator::snapshot`]. Throughput is not
//! kept here; it needs wall-clock windowing and is computed per observer.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use parking_lot::RwLock;
use serde::Serialize;

use crate::record::{PacketRecord, Protocol};

pub const DEFAULT_ANOMALY_THRESHOLD: f64 = 0.7;
pub const DEFAULT_RECENT_SOURCES: usize = 5;

/// One observed source address, with the number of packets seen from it so
/// far in the capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceObservation {
    pub ip: String,
    pub count: u64,
}

#[derive(Debug, Default)]
struct AggregateStats {
    total_packets: u64,
    total_bytes: u64,
    anomaly_count: u64,
    unique_endpoints: HashSet<String>,
    protocol_histogram: HashMap<Protocol, u64>,
    source_counts: HashMap<String, u64>,
    recent_sources: VecDeque<SourceObservation>,
}

/// Read-only view of the aggregate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsView {
    pub total_packets: u64,
    pub total_bytes: u64,
    pub anomaly_count: u64,
    pub unique_endpoints: usize,
    pub protocol_histogram: BTreeMap<String, u64>,
    /// Most recent first-to-last, trimmed to the display bound.
    pub recent_sources: Vec<SourceObservation>,
}

pub struct StatsAggregator {
    inner: RwLock<AggregateStats>,
    anomaly_threshold: f64,
    recent_bound: usize,
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_ANOMALY_THRESHOLD, DEFAULT_RECENT_SOURCES)
    }
}

impl StatsAggregator {
    /// A record counts as an anomaly when its score is strictly greater than
    /// `anomaly_threshold`.
    pub fn new(anomaly_threshold: f64, recent_bound: usize) -> Self {
        Self {
            inner: RwLock::new(AggregateStats::default()),
            anomaly_threshold,
            recent_bound: recent_bound.max(1),
        }
    }

    pub fn reset(&self) {
        *self.inner.write() = AggregateStats::default();
    }

    /// Folds one record into the totals. Returns whether it was counted as
    /// an anomaly.
    pub fn record(&self, packet: &PacketRecord) -> bool {
        let anomalous = packet.anomaly_score > self.anomaly_threshold;
        let mut stats = self.inner.write();

        stats.total_packets += 1;
        stats.total_bytes += u64::from(packet.size_bytes);
        if anomalous {
            stats.anomaly_count += 1;
        }

        for address in [&packet.source_address, &packet.destination_address] {
            if !stats.unique_endpoints.contains(address) {
                stats.unique_endpoints.insert(address.clone());
            }
        }
        *stats.protocol_histogram.entry(packet.protocol).or_default() += 1;

        let count = {
            let seen = stats
                .source_counts
                .entry(packet.source_address.clone())
                .or_default();
            *seen += 1;
            *seen
        };
        if stats.recent_sources.len() == self.recent_bound {
            stats.recent_sources.pop_front();
        }
        stats.recent_sources.push_back(SourceObservation {
            ip: packet.source_address.clone(),
            count,
        });

        anomalous
    }

    pub fn snapshot(&self) -> StatsView {
        let stats = self.inner.read();
        StatsView {
            total_packets: stats.total_packets,
            total_bytes: stats.total_bytes,
            anomaly_count: stats.anomaly_count,
            unique_endpoints: stats.unique_endpoints.len(),
            protocol_histogram: stats
                .protocol_histogram
                .iter()
                .map(|(protocol, count)| (protocol.to_string(), *count))
                .collect(),
            recent_sources: stats.recent_sources.iter().cloned().collect(),
        }
    }
}
