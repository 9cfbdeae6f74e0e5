use thiserror::Error;

/// Event queue error conditions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("Invalid capacity (must be at least 1)")]
    InvalidCapacity,
}

/// Failures delivering to a single observer. Never fatal for the capture.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("Observer disconnected")]
    ObserverDisconnected,
}
