use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use pcap::{Activated, Capture, Device, Linktype, Packet, PacketHeader};
use tracing::{debug, info, warn};

use crate::error::CaptureError;
use crate::packet::{LinkKind, RawPacket};

/// Result of a single read from a [`PacketSource`].
#[derive(Debug)]
pub enum Fetch {
    Packet(RawPacket),
    /// Read timeout elapsed without traffic.
    Idle,
    /// The source has no more packets (end of a savefile).
    Exhausted,
}

/// An open capture handle. Dropping it releases the facility.
pub trait PacketSource: Send {
    fn link_kind(&self) -> LinkKind;

    /// Blocks for at most the source's read timeout.
    fn next_packet(&mut self) -> Result<Fetch, CaptureError>;
}

/// Opens capture handles. `interface` is the caller's selector; backends
/// that are not interface based ignore it.
pub trait CaptureBackend: Send + Sync {
    fn open(&self, interface: Option<&str>) -> Result<Box<dyn PacketSource>, CaptureError>;
}

/// How a capture loop ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureExit {
    /// `terminate` was raised.
    Stopped,
    /// The source ran dry.
    Exhausted,
}

/// Run a capture loop over an open source.
/// Returns once `terminate` is set, the source is exhausted, or the
/// facility fails.
pub fn run_capture_loop<F>(
    source: &mut dyn PacketSource,
    terminate: &AtomicBool,
    mut callback: F,
) -> Result<CaptureExit, CaptureError>
where
    F: FnMut(RawPacket),
{
    while !terminate.load(Ordering::Acquire) {
        match source.next_packet()? {
            Fetch::Packet(packet) => callback(packet),
            Fetch::Idle => continue,
            Fetch::Exhausted => return Ok(CaptureExit::Exhausted),
        }
    }
    Ok(CaptureExit::Stopped)
}

/// libpcap handle, live or offline.
pub struct PcapSource<T: Activated + ?Sized> {
    capture: Capture<T>,
    link: LinkKind,
}

impl<T: Activated + ?Sized> PcapSource<T> {
    fn new(capture: Capture<T>) -> Self {
        let link = LinkKind::from_dlt(capture.get_datalink().0);
        if let LinkKind::Unsupported(dlt) = link {
            warn!("Unsupported data link type {dlt}, packets will classify as Other");
        }
        Self { capture, link }
    }
}

impl<T: Activated + ?Sized> PacketSource for PcapSource<T> {
    fn link_kind(&self) -> LinkKind {
        self.link
    }

    fn next_packet(&mut self) -> Result<Fetch, CaptureError> {
        match self.capture.next_packet() {
            Ok(packet) => {
                let captured_at = DateTime::from_timestamp(
                    packet.header.ts.tv_sec as i64,
                    (packet.header.ts.tv_usec as u32).saturating_mul(1000),
                )
                .unwrap_or_else(Utc::now);
                Ok(Fetch::Packet(RawPacket {
                    data: bytes::Bytes::copy_from_slice(packet.data),
                    wire_len: packet.header.len,
                    link: self.link,
                    captured_at,
                }))
            }
            Err(pcap::Error::TimeoutExpired) => Ok(Fetch::Idle),
            Err(pcap::Error::NoMorePackets) => Ok(Fetch::Exhausted),
            Err(e) => Err(CaptureError::Facility(e)),
        }
    }
}

/// Parameters for opening a live device.
#[derive(Debug, Clone)]
pub struct LiveSettings {
    pub promiscuous: bool,
    pub snaplen: i32,
    pub read_timeout_ms: i32,
    pub immediate_mode: bool,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            promiscuous: true,
            snaplen: 65535,
            read_timeout_ms: 250,
            immediate_mode: true,
        }
    }
}

/// Live capture on a network device.
#[derive(Debug, Clone, Default)]
pub struct LiveBackend {
    settings: LiveSettings,
}

impl LiveBackend {
    pub fn new(settings: LiveSettings) -> Self {
        Self { settings }
    }

    fn select_device(interface: Option<&str>) -> Result<Device, CaptureError> {
        match interface {
            Some(name) => Device::list()?
                .into_iter()
                .find(|d| d.name == name)
                .ok_or_else(|| CaptureError::DeviceNotFound(name.to_string())),
            None => Device::lookup()?.ok_or(CaptureError::NoDefaultDevice),
        }
    }
}

impl CaptureBackend for LiveBackend {
    fn open(&self, interface: Option<&str>) -> Result<Box<dyn PacketSource>, CaptureError> {
        let device = Self::select_device(interface)?;
        info!("Opening live capture on {}", device.name);
        debug!("Live capture settings: {:?}", self.settings);

        let capture = Capture::from_device(device)?
            .promisc(self.settings.promiscuous)
            .snaplen(self.settings.snaplen)
            .timeout(self.settings.read_timeout_ms)
            .immediate_mode(self.settings.immediate_mode)
            .open()?;

        Ok(Box::new(PcapSource::new(capture)))
    }
}

/// Replays a pcap savefile. The interface selector is ignored.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CaptureBackend for FileBackend {
    fn open(&self, _interface: Option<&str>) -> Result<Box<dyn PacketSource>, CaptureError> {
        info!("Replaying capture file {}", self.path.display());
        let capture = Capture::from_file(&self.path)?;
        Ok(Box::new(PcapSource::new(capture)))
    }
}

/// Writes `packets` to a pcap savefile with Ethernet framing, keeping each
/// packet's capture time and wire length.
pub fn write_savefile(path: &Path, packets: &[RawPacket]) -> Result<(), CaptureError> {
    let mut savefile = Capture::dead(Linktype::ETHERNET)?.savefile(path)?;
    for packet in packets {
        let header = PacketHeader {
            ts: libc::timeval {
                tv_sec: packet.captured_at.timestamp() as libc::time_t,
                tv_usec: packet.captured_at.timestamp_subsec_micros() as libc::suseconds_t,
            },
            caplen: packet.data.len() as u32,
            len: packet.wire_len,
        };
        savefile.write(&Packet::new(&header, &packet.data));
    }
    savefile.flush()?;
    debug!(packets = packets.len(), "Savefile written to {}", path.display());
    Ok(())
}

/// A capture device as reported by libpcap.
#[derive(Debug, Clone)]
pub struct InterfaceInfo {
    pub name: String,
    pub description: Option<String>,
}

pub fn list_interfaces() -> Result<Vec<InterfaceInfo>, CaptureError> {
    Ok(Device::list()?
        .into_iter()
        .map(|d| InterfaceInfo {
            name: d.name,
            description: d.desc,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulate::{ipv4_frame, SyntheticSource};
    use std::net::Ipv4Addr;

    fn frames(n: usize) -> Vec<RawPacket> {
        (0..n)
            .map(|i| {
                RawPacket::new(ipv4_frame(
                    Ipv4Addr::new(10, 0, 0, 1),
                    Ipv4Addr::new(10, 0, 0, 2),
                    17,
                    60 + i,
                ))
            })
            .collect()
    }

    #[test]
    fn loop_ends_when_source_is_exhausted() {
        let mut source = SyntheticSource::new(frames(3), false);
        let terminate = AtomicBool::new(false);
        let mut seen = Vec::new();

        let exit = run_capture_loop(&mut source, &terminate, |p| seen.push(p.wire_len)).unwrap();

        assert_eq!(exit, CaptureExit::Exhausted);
        assert_eq!(seen, vec![60, 61, 62]);
    }

    #[test]
    fn loop_honours_terminate_flag() {
        let mut source = SyntheticSource::new(frames(3), true);
        let terminate = AtomicBool::new(true);
        let mut count = 0;

        let exit = run_capture_loop(&mut source, &terminate, |_| count += 1).unwrap();

        assert_eq!(exit, CaptureExit::Stopped);
        assert_eq!(count, 0);
    }

    #[test]
    fn savefile_replays_to_exhaustion() {
        let path = std::env::temp_dir().join(format!("sleuth-capture-{}.pcap", std::process::id()));
        let written = frames(3);
        write_savefile(&path, &written).unwrap();

        let mut source = FileBackend::new(&path).open(None).unwrap();
        assert_eq!(source.link_kind(), LinkKind::Ethernet);
        let terminate = AtomicBool::new(false);
        let mut replayed = Vec::new();
        let exit = run_capture_loop(source.as_mut(), &terminate, |p| replayed.push(p)).unwrap();
        drop(source);
        std::fs::remove_file(&path).ok();

        assert_eq!(exit, CaptureExit::Exhausted);
        assert_eq!(replayed.len(), 3);
        for (original, copy) in written.iter().zip(&replayed) {
            assert_eq!(copy.data, original.data);
            assert_eq!(copy.wire_len, original.wire_len);
            assert_eq!(copy.captured_at.timestamp(), original.captured_at.timestamp());
        }
    }

    #[test]
    fn missing_savefile_is_a_facility_error() {
        let backend = FileBackend::new("/nonexistent/sleuth-capture.pcap");
        assert!(matches!(
            backend.open(None),
            Err(CaptureError::Facility(_))
        ));
    }
}
