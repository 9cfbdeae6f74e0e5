//! A raw frame as delivered by the capture facility.

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Link-layer framing of the captured bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// Ethernet II, optionally VLAN tagged.
    Ethernet,
    /// Linux "cooked" capture (the `any` pseudo-device).
    LinuxSll,
    /// BSD loopback: 4-byte address family then an IP packet.
    Null,
    /// Bare IPv4/IPv6 packet without link header.
    RawIp,
    /// Anything else; carries the DLT number.
    Unsupported(i32),
}

impl LinkKind {
    /// Maps a libpcap data link type number.
    pub fn from_dlt(dlt: i32) -> Self {
        match dlt {
            1 => LinkKind::Ethernet,
            0 | 108 => LinkKind::Null,
            12 | 14 | 101 | 228 | 229 => LinkKind::RawIp,
            113 => LinkKind::LinuxSll,
            other => LinkKind::Unsupported(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RawPacket {
    /// Captured bytes (possibly truncated to the snap length).
    pub data: Bytes,
    /// Length of the packet on the wire.
    pub wire_len: u32,
    pub link: LinkKind,
    pub captured_at: DateTime<Utc>,
}

impl RawPacket {
    /// Creates an Ethernet packet stamped with the current time, whose wire
    /// length equals the captured length.
    pub fn new(data: Vec<u8>) -> Self {
        Self::with_link(data, LinkKind::Ethernet)
    }

    pub fn with_link(data: Vec<u8>, link: LinkKind) -> Self {
        let wire_len = data.len() as u32;
        RawPacket {
            data: Bytes::from(data),
            wire_len,
            link,
            captured_at: Utc::now(),
        }
    }
}
