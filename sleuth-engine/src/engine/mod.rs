mod capture;
mod error;
mod publisher;
mod service;
mod session;

pub use self::{
    capture::{CaptureEngine, CaptureEpoch},
    error::EngineError,
    publisher::{ObserverSubscription, RateMeter, StreamPublisher},
    service::{AnalyticsService, ControlResponse},
    session::{CaptureSession, SessionManager, SessionState},
};

pub mod prelude {
    pub use super::{AnalyticsService, CaptureSession, ControlResponse, EngineError};
}
