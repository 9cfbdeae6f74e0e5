//! ## sleuth-core::classify
//! **Raw packet → [`PacketRecord`]**
//!
//! Classification inspects the link and network layer only. It never fails:
//! frames that cannot be parsed degrade to the `"?"` sentinel addresses and
//! the `Other` protocol. The anomaly score comes from a pluggable
//! [`AnomalyScorer`]; the default is a size-based placeholder, not a detector.

use std::sync::Arc;

use etherparse::{
    EtherType, LaxNetSlice, LaxSlicedPacket, LinuxSllHeaderSlice, LinuxSllProtocolType,
    TransportSlice,
};
use sleuth_capture::{LinkKind, RawPacket};

use crate::record::{PacketRecord, Protocol, UNRESOLVED_ADDRESS};

const ETHERTYPE_ARP: u16 = 0x0806;
const NULL_HEADER_LEN: usize = 4;

/// Scoring policy for the anomaly score. Implementations should return a
/// value in [0, 1]; the classifier clamps whatever they return.
pub trait AnomalyScorer: Send + Sync {
    fn score(&self, packet: &RawPacket) -> f64;
}

impl<F> AnomalyScorer for F
where
    F: Fn(&RawPacket) -> f64 + Send + Sync,
{
    fn score(&self, packet: &RawPacket) -> f64 {
        self(packet)
    }
}

/// Placeholder policy: `(wire_len mod 100) / 100`, two decimals.
#[derive(Debug, Clone, Copy, Default)]
pub struct SizeModuloScorer;

impl AnomalyScorer for SizeModuloScorer {
    fn score(&self, packet: &RawPacket) -> f64 {
        round_score((packet.wire_len % 100) as f64 / 100.0)
    }
}

/// Rounds to two decimal places.
pub fn round_score(score: f64) -> f64 {
    (score * 100.0).round() / 100.0
}

#[derive(Clone)]
pub struct Classifier {
    scorer: Arc<dyn AnomalyScorer>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(Arc::new(SizeModuloScorer))
    }
}

impl Classifier {
    pub fn new(scorer: Arc<dyn AnomalyScorer>) -> Self {
        Self { scorer }
    }

    /// Builds the record for `packet`. `id` is the caller's sequence number.
    pub fn classify(&self, id: u64, packet: &RawPacket) -> PacketRecord {
        let network = inspect(packet);
        let (source_address, destination_address, protocol) = match &network {
            Layer::Ip(ip) => (
                ip.source.clone(),
                ip.destination.clone(),
                Protocol::from_ip_number(ip.protocol),
            ),
            Layer::NonIp(_) | Layer::Opaque => (
                UNRESOLVED_ADDRESS.to_string(),
                UNRESOLVED_ADDRESS.to_string(),
                Protocol::Other,
            ),
        };

        let score = self.scorer.score(packet);
        let anomaly_score = if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            0.0
        };

        PacketRecord {
            id,
            captured_at: packet.captured_at,
            source_address,
            destination_address,
            protocol,
            size_bytes: packet.wire_len,
            summary: summarize(&network, protocol, packet),
            anomaly_score,
        }
    }
}

struct IpInfo {
    version: u8,
    source: String,
    destination: String,
    protocol: u8,
    ports: Option<(u16, u16)>,
}

enum Layer {
    Ip(IpInfo),
    /// Link layer parsed, payload is not IP; carries the ether type.
    NonIp(u16),
    Opaque,
}

fn inspect(packet: &RawPacket) -> Layer {
    let data = packet.data.as_ref();
    let sliced = match packet.link {
        LinkKind::Ethernet => LaxSlicedPacket::from_ethernet(data).ok(),
        LinkKind::LinuxSll => slice_sll(data),
        LinkKind::Null => data
            .get(NULL_HEADER_LEN..)
            .and_then(|ip| LaxSlicedPacket::from_ip(ip).ok()),
        LinkKind::RawIp => LaxSlicedPacket::from_ip(data).ok(),
        LinkKind::Unsupported(_) => None,
    };
    let Some(sliced) = sliced else {
        return Layer::Opaque;
    };

    match &sliced.net {
        Some(net) => Layer::Ip(ip_info(net, sliced.transport.as_ref())),
        // An IP ether type whose header failed to parse stays opaque.
        None if packet.link == LinkKind::Ethernet => match sliced.ether_payload() {
            Some(payload)
                if payload.ether_type != EtherType::IPV4
                    && payload.ether_type != EtherType::IPV6 =>
            {
                Layer::NonIp(payload.ether_type.0)
            }
            _ => Layer::Opaque,
        },
        None => Layer::Opaque,
    }
}

fn slice_sll(data: &[u8]) -> Option<LaxSlicedPacket<'_>> {
    let header = LinuxSllHeaderSlice::from_slice(data).ok()?;
    match header.protocol_type() {
        LinuxSllProtocolType::EtherType(ether_type) => Some(LaxSlicedPacket::from_ether_type(
            ether_type,
            &data[header.slice().len()..],
        )),
        _ => None,
    }
}

/// Addresses and upper-layer protocol. The slicer skips transport parsing
/// for fragmented payloads, so only whole TCP/UDP segments carry ports.
fn ip_info(net: &LaxNetSlice<'_>, transport: Option<&TransportSlice<'_>>) -> IpInfo {
    let ports = match transport {
        Some(TransportSlice::Tcp(tcp)) => Some((tcp.source_port(), tcp.destination_port())),
        Some(TransportSlice::Udp(udp)) => Some((udp.source_port(), udp.destination_port())),
        _ => None,
    };

    match net {
        LaxNetSlice::Ipv4(ipv4) => {
            let header = ipv4.header();
            IpInfo {
                version: 4,
                source: header.source_addr().to_string(),
                destination: header.destination_addr().to_string(),
                protocol: ipv4.payload().ip_number.0,
                ports,
            }
        }
        LaxNetSlice::Ipv6(ipv6) => {
            let header = ipv6.header();
            IpInfo {
                version: 6,
                source: header.source_addr().to_string(),
                destination: header.destination_addr().to_string(),
                protocol: ipv6.payload().ip_number.0,
                ports,
            }
        }
    }
}

fn summarize(layer: &Layer, protocol: Protocol, packet: &RawPacket) -> String {
    match layer {
        Layer::Ip(ip) => match ip.ports {
            Some((sport, dport)) if ip.version == 6 => format!(
                "IPv6 / {protocol} [{}]:{sport} > [{}]:{dport}",
                ip.source, ip.destination
            ),
            Some((sport, dport)) => format!(
                "IPv{} / {protocol} {}:{sport} > {}:{dport}",
                ip.version, ip.source, ip.destination
            ),
            None => format!(
                "IPv{} / {protocol} {} > {}",
                ip.version, ip.source, ip.destination
            ),
        },
        Layer::NonIp(ETHERTYPE_ARP) => "ARP".to_string(),
        Layer::NonIp(ether_type) => format!("EtherType 0x{ether_type:04x}"),
        Layer::Opaque => format!("Frame ({} bytes)", packet.wire_len),
    }
}
