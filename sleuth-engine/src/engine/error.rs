use thiserror::Error;

use sleuth_capture::CaptureError;
use sleuth_core::EventError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Capture already running")]
    AlreadyRunning,

    #[error("No capture is running")]
    NotRunning,

    #[error("Unknown session {0}")]
    UnknownSession(u64),

    #[error("Session {0} has already ended")]
    SessionEnded(u64),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Capture worker terminated abnormally")]
    WorkerPanicked,

    #[error("Failed to spawn capture worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Event pipeline error: {0}")]
    Event(#[from] EventError),

    #[error("Metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),
}
