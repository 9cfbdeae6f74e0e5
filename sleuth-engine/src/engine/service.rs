//! The analytics service: the one owner of capture, session and stats state.
//!
//! Constructed once from a [`SleuthConfig`] and a capture backend, then
//! handed to whatever transport serves collaborators.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument};

use sleuth_capture::{CaptureBackend, FileBackend, LiveBackend, LiveSettings};
use sleuth_config::{OverflowMode, SleuthConfig};
use sleuth_core::classify::{AnomalyScorer, Classifier, SizeModuloScorer};
use sleuth_core::events::{Broadcaster, OverflowPolicy};
use sleuth_core::stats::{StatsAggregator, StatsView};
use sleuth_telemetry::metrics::MetricsRecorder;

use super::capture::CaptureEngine;
use super::error::EngineError;
use super::publisher::{ObserverSubscription, StreamPublisher};
use super::session::{CaptureSession, SessionManager};

/// Structured result of a session control operation.
///
/// Serializes as `{"result": "started", "session": {...}}`,
/// `{"result": "stopped", "session": {...}}` or
/// `{"result": "error", "error": "..."}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum ControlResponse {
    Started { session: CaptureSession },
    Stopped { session: CaptureSession },
    Error { error: String },
}

impl ControlResponse {
    pub fn started(outcome: Result<CaptureSession, EngineError>) -> Self {
        match outcome {
            Ok(session) => Self::Started { session },
            Err(e) => Self::Error {
                error: e.to_string(),
            },
        }
    }

    pub fn stopped(outcome: Result<CaptureSession, EngineError>) -> Self {
        match outcome {
            Ok(session) => Self::Stopped { session },
            Err(e) => Self::Error {
                error: e.to_string(),
            },
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

fn overflow_policy(mode: OverflowMode) -> OverflowPolicy {
    match mode {
        OverflowMode::DropOldest => OverflowPolicy::DropOldest,
        OverflowMode::DropNewest => OverflowPolicy::DropNewest,
    }
}

pub struct AnalyticsService {
    config: SleuthConfig,
    engine: Arc<CaptureEngine>,
    sessions: SessionManager,
    stats: Arc<StatsAggregator>,
    broadcaster: Arc<Broadcaster>,
    metrics: MetricsRecorder,
    observer_ids: AtomicU64,
}

impl AnalyticsService {
    /// Service with the default size-based anomaly scorer.
    pub fn new(
        config: SleuthConfig,
        backend: Arc<dyn CaptureBackend>,
    ) -> Result<Self, EngineError> {
        Self::with_scorer(config, backend, Arc::new(SizeModuloScorer))
    }

    pub fn with_scorer(
        config: SleuthConfig,
        backend: Arc<dyn CaptureBackend>,
        scorer: Arc<dyn AnomalyScorer>,
    ) -> Result<Self, EngineError> {
        let metrics = MetricsRecorder::new()?;
        let stats = Arc::new(StatsAggregator::new(
            config.pipeline.stats.anomaly_threshold,
            config.pipeline.stats.recent_sources,
        ));
        let broadcaster = Arc::new(Broadcaster::new(
            config.pipeline.queue.capacity,
            overflow_policy(config.pipeline.queue.overflow),
        )?);
        let engine = Arc::new(CaptureEngine::new(
            backend,
            Classifier::new(scorer),
            stats.clone(),
            broadcaster.clone(),
            metrics.clone(),
        ));

        Ok(Self {
            sessions: SessionManager::new(engine.clone()),
            config,
            engine,
            stats,
            broadcaster,
            metrics,
            observer_ids: AtomicU64::new(0),
        })
    }

    /// Service capturing from live interfaces with the configured settings.
    pub fn live(config: SleuthConfig) -> Result<Self, EngineError> {
        let settings = LiveSettings {
            promiscuous: config.capture.promiscuous,
            snaplen: i32::try_from(config.capture.snaplen).unwrap_or(i32::MAX),
            read_timeout_ms: i32::try_from(config.capture.read_timeout_ms).unwrap_or(i32::MAX),
            immediate_mode: config.capture.immediate_mode,
        };
        Self::new(config, Arc::new(LiveBackend::new(settings)))
    }

    /// Service replaying a pcap savefile.
    pub fn replay(config: SleuthConfig, path: impl Into<PathBuf>) -> Result<Self, EngineError> {
        Self::new(config, Arc::new(FileBackend::new(path)))
    }

    pub fn config(&self) -> &SleuthConfig {
        &self.config
    }

    pub fn create_session(&self, name: Option<&str>) -> CaptureSession {
        self.sessions.create(name)
    }

    /// Starts session `id` on the configured interface.
    pub fn start_session(&self, id: u64) -> Result<CaptureSession, EngineError> {
        let interface = self.config.capture.interface.clone();
        self.start_session_on(id, interface.as_deref())
    }

    #[instrument(level = "info", skip(self))]
    pub fn start_session_on(
        &self,
        id: u64,
        interface: Option<&str>,
    ) -> Result<CaptureSession, EngineError> {
        self.sessions.start(id, interface)
    }

    #[instrument(level = "info", skip(self))]
    pub fn stop_session(&self, id: u64) -> Result<CaptureSession, EngineError> {
        self.sessions.stop(id)
    }

    pub fn session(&self, id: u64) -> Option<CaptureSession> {
        self.sessions.get(id)
    }

    pub fn sessions(&self) -> Vec<CaptureSession> {
        self.sessions.list()
    }

    pub fn active_session(&self) -> Option<CaptureSession> {
        self.sessions.active()
    }

    /// Connects a new observer. Must be called within a tokio runtime.
    pub fn subscribe(&self) -> ObserverSubscription {
        let id = self.observer_ids.fetch_add(1, Ordering::Relaxed) + 1;
        let publisher = StreamPublisher::new(
            self.broadcaster.subscribe(),
            self.stats.clone(),
            self.engine.clone(),
            self.config.stream.interval(),
        );
        info!(observer = id, "Observer connected");
        ObserverSubscription::spawn(
            id,
            publisher,
            self.config.stream.channel_capacity,
            self.metrics.observers.clone(),
        )
    }

    pub fn observer_count(&self) -> usize {
        self.broadcaster.subscriber_count()
    }

    pub fn snapshot(&self) -> StatsView {
        self.stats.snapshot()
    }

    pub fn is_capturing(&self) -> bool {
        self.engine.is_running()
    }

    /// Error that ended the most recent capture, if any.
    pub fn last_capture_error(&self) -> Option<String> {
        self.engine.last_error()
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sleuth_capture::simulate::SyntheticBackend;

    #[test]
    fn control_responses_serialize_with_result_tag() {
        let error = ControlResponse::started(Err(EngineError::AlreadyRunning));
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["result"], "error");
        assert_eq!(json["error"], "Capture already running");
        assert!(error.is_error());
    }

    #[test]
    fn stopped_response_carries_session() {
        let service =
            AnalyticsService::new(SleuthConfig::default(), Arc::new(SyntheticBackend::new(vec![])))
                .unwrap();
        let session = service.create_session(Some("lab"));
        let json = serde_json::to_value(ControlResponse::stopped(Ok(session))).unwrap();
        assert_eq!(json["result"], "stopped");
        assert_eq!(json["session"]["name"], "lab");
        assert!(json["session"]["endedAt"].is_null());
    }

    #[test]
    fn overflow_mode_maps_to_policy() {
        assert_eq!(
            overflow_policy(OverflowMode::DropNewest),
            OverflowPolicy::DropNewest
        );
    }
}
