//! Packet records: the immutable, structured view of one captured packet.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// Address used when a packet has no resolvable network-layer endpoints.
pub const UNRESOLVED_ADDRESS: &str = "?";

/// Records are shared between every observer queue they are fanned out to.
pub type SharedRecord = Arc<PacketRecord>;

/// Transport classification of a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    /// No network-layer header present.
    Other,
    /// IP protocol number without a well-known name.
    Number(u8),
}

impl Protocol {
    pub fn from_ip_number(number: u8) -> Self {
        match number {
            1 => Protocol::Icmp,
            6 => Protocol::Tcp,
            17 => Protocol::Udp,
            n => Protocol::Number(n),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("TCP"),
            Protocol::Udp => f.write_str("UDP"),
            Protocol::Icmp => f.write_str("ICMP"),
            Protocol::Other => f.write_str("Other"),
            Protocol::Number(n) => write!(f, "{n}"),
        }
    }
}

impl Serialize for Protocol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PacketRecord {
    /// Sequence number within the capture, starting at 1.
    pub id: u64,
    pub captured_at: DateTime<Utc>,
    pub source_address: String,
    pub destination_address: String,
    pub protocol: Protocol,
    /// Wire length of the packet.
    pub size_bytes: u32,
    pub summary: String,
    /// Always within [0, 1].
    pub anomaly_score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_protocol_numbers_are_named() {
        assert_eq!(Protocol::from_ip_number(1).to_string(), "ICMP");
        assert_eq!(Protocol::from_ip_number(6).to_string(), "TCP");
        assert_eq!(Protocol::from_ip_number(17).to_string(), "UDP");
        assert_eq!(Protocol::from_ip_number(47).to_string(), "47");
        assert_eq!(Protocol::Other.to_string(), "Other");
    }

    #[test]
    fn record_serializes_with_camel_case_fields() {
        let record = PacketRecord {
            id: 7,
            captured_at: DateTime::from_timestamp(0, 0).unwrap(),
            source_address: "10.0.0.1".into(),
            destination_address: "10.0.0.2".into(),
            protocol: Protocol::Tcp,
            size_bytes: 60,
            summary: String::new(),
            anomaly_score: 0.6,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["sourceAddress"], "10.0.0.1");
        assert_eq!(json["protocol"], "TCP");
        assert_eq!(json["sizeBytes"], 60);
        assert_eq!(json["anomalyScore"], 0.6);
    }
}
