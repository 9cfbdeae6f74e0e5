use thiserror::Error;

/// Failures of the underlying capture facility. All of them are fatal for the
/// capture they occur in.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Device '{0}' not found")]
    DeviceNotFound(String),

    #[error("No default capture device available")]
    NoDefaultDevice,

    #[error("Capture facility error: {0}")]
    Facility(#[from] pcap::Error),

    #[error("Capture source failed: {0}")]
    Source(String),
}
