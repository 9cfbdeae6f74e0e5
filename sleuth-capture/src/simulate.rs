//! Synthetic capture: hand-built frames served through the regular
//! [`PacketSource`] interface, for tests and demos without capture privileges.

use std::collections::VecDeque;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use crate::capture::{CaptureBackend, Fetch, PacketSource};
use crate::error::CaptureError;
use crate::packet::{LinkKind, RawPacket};

const ETHERNET_HEADER_LEN: usize = 14;
const IPV4_HEADER_LEN: usize = 20;
const IPV6_HEADER_LEN: usize = 40;
const IDLE_WAIT: Duration = Duration::from_millis(5);

/// Serves a fixed list of packets, then either reports exhaustion or keeps
/// idling like a quiet live interface.
pub struct SyntheticSource {
    frames: VecDeque<RawPacket>,
    hold_open: bool,
}

impl SyntheticSource {
    pub fn new(frames: Vec<RawPacket>, hold_open: bool) -> Self {
        Self {
            frames: frames.into(),
            hold_open,
        }
    }
}

impl PacketSource for SyntheticSource {
    fn link_kind(&self) -> LinkKind {
        self.frames
            .front()
            .map(|p| p.link)
            .unwrap_or(LinkKind::Ethernet)
    }

    fn next_packet(&mut self) -> Result<Fetch, CaptureError> {
        match self.frames.pop_front() {
            Some(packet) => Ok(Fetch::Packet(packet)),
            None if self.hold_open => {
                std::thread::sleep(IDLE_WAIT);
                Ok(Fetch::Idle)
            }
            None => Ok(Fetch::Exhausted),
        }
    }
}

/// Backend handing out a fresh [`SyntheticSource`] over the same frames on
/// every open.
#[derive(Debug, Clone, Default)]
pub struct SyntheticBackend {
    frames: Vec<RawPacket>,
    hold_open: bool,
}

impl SyntheticBackend {
    pub fn new(frames: Vec<RawPacket>) -> Self {
        Self {
            frames,
            hold_open: false,
        }
    }

    /// Keep the source open after the frames are served, until stopped.
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }
}

impl CaptureBackend for SyntheticBackend {
    fn open(&self, _interface: Option<&str>) -> Result<Box<dyn PacketSource>, CaptureError> {
        Ok(Box::new(SyntheticSource::new(
            self.frames.clone(),
            self.hold_open,
        )))
    }
}

fn ethernet_header(frame: &mut Vec<u8>, ether_type: u16) {
    frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 0x02]);
    frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 0x01]);
    frame.extend_from_slice(&ether_type.to_be_bytes());
}

/// Ethernet II frame carrying an IPv4 header with the given protocol number,
/// zero-padded to `total_len` bytes (at least the two headers).
pub fn ipv4_frame(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, total_len: usize) -> Vec<u8> {
    let total_len = total_len.max(ETHERNET_HEADER_LEN + IPV4_HEADER_LEN);
    let ip_len = (total_len - ETHERNET_HEADER_LEN).min(u16::MAX as usize) as u16;

    let mut frame = Vec::with_capacity(total_len);
    ethernet_header(&mut frame, 0x0800);
    frame.push(0x45);
    frame.push(0);
    frame.extend_from_slice(&ip_len.to_be_bytes());
    frame.extend_from_slice(&[0, 0, 0x40, 0]);
    frame.push(64);
    frame.push(protocol);
    frame.extend_from_slice(&[0, 0]);
    frame.extend_from_slice(&src.octets());
    frame.extend_from_slice(&dst.octets());
    frame.resize(total_len, 0);
    frame
}

/// Ethernet II frame carrying an IPv6 header, zero-padded to `total_len`.
pub fn ipv6_frame(src: Ipv6Addr, dst: Ipv6Addr, next_header: u8, total_len: usize) -> Vec<u8> {
    let total_len = total_len.max(ETHERNET_HEADER_LEN + IPV6_HEADER_LEN);
    let payload_len =
        (total_len - ETHERNET_HEADER_LEN - IPV6_HEADER_LEN).min(u16::MAX as usize) as u16;

    let mut frame = Vec::with_capacity(total_len);
    ethernet_header(&mut frame, 0x86DD);
    frame.extend_from_slice(&[0x60, 0, 0, 0]);
    frame.extend_from_slice(&payload_len.to_be_bytes());
    frame.push(next_header);
    frame.push(64);
    frame.extend_from_slice(&src.octets());
    frame.extend_from_slice(&dst.octets());
    frame.resize(total_len, 0);
    frame
}

/// Ethernet II frame with a non-IP ether type (ARP by default), zero-padded.
pub fn non_ip_frame(ether_type: u16, total_len: usize) -> Vec<u8> {
    let mut frame = Vec::with_capacity(total_len.max(ETHERNET_HEADER_LEN));
    ethernet_header(&mut frame, ether_type);
    frame.resize(total_len.max(ETHERNET_HEADER_LEN), 0);
    frame
}
