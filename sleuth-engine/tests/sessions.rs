use std::net::Ipv4Addr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sleuth_capture::simulate::{ipv4_frame, non_ip_frame, SyntheticBackend, SyntheticSource};
use sleuth_capture::{
    write_savefile, CaptureBackend, CaptureError, Fetch, LinkKind, PacketSource, RawPacket,
};
use sleuth_config::SleuthConfig;
use sleuth_engine::{AnalyticsService, ControlResponse, EngineError, SessionState};

fn tcp_packet(len: usize) -> RawPacket {
    RawPacket::new(ipv4_frame(
        Ipv4Addr::new(10, 0, 0, 1),
        Ipv4Addr::new(10, 0, 0, 2),
        6,
        len,
    ))
}

fn service(backend: impl CaptureBackend + 'static) -> AnalyticsService {
    AnalyticsService::new(SleuthConfig::default(), Arc::new(backend)).unwrap()
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        thread::sleep(Duration::from_millis(5));
    }
    panic!("condition not reached");
}

struct MissingDevice;

impl CaptureBackend for MissingDevice {
    fn open(&self, interface: Option<&str>) -> Result<Box<dyn PacketSource>, CaptureError> {
        Err(CaptureError::DeviceNotFound(
            interface.unwrap_or("any").to_string(),
        ))
    }
}

/// Serves its frames, then fails like an interface going away.
struct FailingSource(SyntheticSource);

impl PacketSource for FailingSource {
    fn link_kind(&self) -> LinkKind {
        LinkKind::Ethernet
    }

    fn next_packet(&mut self) -> Result<Fetch, CaptureError> {
        match self.0.next_packet()? {
            Fetch::Exhausted => Err(CaptureError::Source("link down".into())),
            other => Ok(other),
        }
    }
}

struct FailingBackend(Vec<RawPacket>);

impl CaptureBackend for FailingBackend {
    fn open(&self, _interface: Option<&str>) -> Result<Box<dyn PacketSource>, CaptureError> {
        Ok(Box::new(FailingSource(SyntheticSource::new(
            self.0.clone(),
            false,
        ))))
    }
}

#[test]
fn three_tcp_packets_scenario() {
    let service = service(
        SyntheticBackend::new(vec![tcp_packet(50), tcp_packet(170), tcp_packet(999)]).hold_open(),
    );
    let session = service.create_session(Some("test"));
    service.start_session(session.id).unwrap();
    wait_until(|| service.snapshot().total_packets == 3);

    let view = service.snapshot();
    assert_eq!(view.total_bytes, 1219);
    assert_eq!(view.anomaly_count, 1);
    assert_eq!(view.unique_endpoints, 2);
    assert_eq!(view.protocol_histogram.get("TCP"), Some(&3));
    assert_eq!(view.protocol_histogram.len(), 1);

    let stopped = service.stop_session(session.id).unwrap();
    assert!(stopped.ended_at.is_some());
    assert_eq!(stopped.state(), SessionState::Ended);
}

#[test]
fn second_session_cannot_start_while_first_is_active() {
    let service = service(SyntheticBackend::new(vec![]).hold_open());
    let first = service.create_session(Some("first"));
    let second = service.create_session(Some("second"));
    assert_eq!(second.id, first.id + 1);

    service.start_session(first.id).unwrap();
    assert!(matches!(
        service.start_session(second.id),
        Err(EngineError::AlreadyRunning)
    ));
    assert_eq!(service.active_session().map(|s| s.id), Some(first.id));
    assert_eq!(
        service.session(second.id).map(|s| s.state()),
        Some(SessionState::Idle)
    );

    service.stop_session(first.id).unwrap();
    service.start_session(second.id).unwrap();
    service.stop_session(second.id).unwrap();
}

#[test]
fn stop_rules() {
    let service = service(SyntheticBackend::new(vec![]).hold_open());
    let session = service.create_session(None);
    assert_eq!(session.name, format!("Session {}", session.id));

    assert!(matches!(
        service.stop_session(session.id),
        Err(EngineError::NotRunning)
    ));
    assert!(matches!(
        service.stop_session(99),
        Err(EngineError::UnknownSession(99))
    ));

    service.start_session(session.id).unwrap();
    let first = service.stop_session(session.id).unwrap();
    let second = service.stop_session(session.id).unwrap();
    assert_eq!(first.ended_at, second.ended_at);
    assert!(!service.is_capturing());

    assert!(matches!(
        service.start_session(session.id),
        Err(EngineError::SessionEnded(_))
    ));
}

#[test]
fn unknown_session_cannot_start() {
    let service = service(SyntheticBackend::new(vec![]));
    let response = ControlResponse::started(service.start_session(7));
    assert!(response.is_error());
}

#[test]
fn open_failure_is_surfaced_and_session_stays_idle() {
    let service = service(MissingDevice);
    let session = service.create_session(Some("lab"));

    let error = service.start_session(session.id).unwrap_err();
    assert!(matches!(
        error,
        EngineError::Capture(CaptureError::DeviceNotFound(_))
    ));
    assert!(!service.is_capturing());
    assert_eq!(
        service.session(session.id).map(|s| s.state()),
        Some(SessionState::Idle)
    );
}

#[test]
fn facility_failure_ends_the_session() {
    let service = service(FailingBackend(vec![tcp_packet(60)]));
    let session = service.create_session(Some("flaky"));
    service.start_session(session.id).unwrap();

    wait_until(|| !service.is_capturing());
    assert_eq!(
        service.last_capture_error().as_deref(),
        Some("Capture source failed: link down")
    );
    let ended = service.session(session.id).unwrap();
    assert!(ended.ended_at.is_some());
    assert!(service.active_session().is_none());
    assert_eq!(service.snapshot().total_packets, 1);

    let retry = service.create_session(Some("retry"));
    service.start_session(retry.id).unwrap();
    service.stop_session(retry.id).unwrap();
}

#[test]
fn savefile_replay_ends_the_session_cleanly() {
    let path = std::env::temp_dir().join(format!("sleuth-sessions-{}.pcap", std::process::id()));
    write_savefile(&path, &[tcp_packet(50), tcp_packet(170), tcp_packet(999)]).unwrap();

    let service = AnalyticsService::replay(SleuthConfig::default(), &path).unwrap();
    let session = service.create_session(Some("replay"));
    service.start_session(session.id).unwrap();
    wait_until(|| {
        service
            .session(session.id)
            .is_some_and(|s| s.state() == SessionState::Ended)
    });
    std::fs::remove_file(&path).ok();

    let view = service.snapshot();
    assert_eq!(view.total_packets, 3);
    assert_eq!(view.total_bytes, 1219);
    assert!(service.last_capture_error().is_none());
    assert!(service.active_session().is_none());
    assert!(!service.is_capturing());
}

#[test]
fn non_ip_frames_use_sentinels() {
    let arp = RawPacket::new(non_ip_frame(0x0806, 42));
    let service = service(SyntheticBackend::new(vec![arp]).hold_open());
    let session = service.create_session(None);
    service.start_session(session.id).unwrap();
    wait_until(|| service.snapshot().total_packets == 1);
    service.stop_session(session.id).unwrap();

    let view = service.snapshot();
    assert_eq!(view.protocol_histogram.get("Other"), Some(&1));
    assert_eq!(view.unique_endpoints, 1);
    assert_eq!(view.recent_sources[0].ip, "?");
}

#[test]
fn metrics_follow_the_capture() {
    let service = service(SyntheticBackend::new(vec![tcp_packet(50), tcp_packet(199)]).hold_open());
    let session = service.create_session(None);
    service.start_session(session.id).unwrap();
    wait_until(|| service.snapshot().total_packets == 2);
    service.stop_session(session.id).unwrap();

    let metrics = service.metrics();
    assert_eq!(metrics.packets.get(), 2);
    assert_eq!(metrics.bytes.get(), 249);
    assert_eq!(metrics.anomalies.get(), 1);
}

#[test]
fn custom_scorer_drives_anomaly_counts() {
    let backend = SyntheticBackend::new(vec![tcp_packet(50), tcp_packet(60)]).hold_open();
    let service = AnalyticsService::with_scorer(
        SleuthConfig::default(),
        Arc::new(backend),
        Arc::new(|_: &RawPacket| 0.9),
    )
    .unwrap();
    let session = service.create_session(None);
    service.start_session(session.id).unwrap();
    wait_until(|| service.snapshot().total_packets == 2);
    service.stop_session(session.id).unwrap();

    assert_eq!(service.snapshot().anomaly_count, 2);
}
