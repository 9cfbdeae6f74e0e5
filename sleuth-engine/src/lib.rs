//! ## sleuth-engine
//! **Capture lifecycle, sessions and observer streaming**
//!
//! Frontends build one [`AnalyticsService`] and drive it through session
//! control calls and observer subscriptions.

pub mod engine;

pub use engine::{
    AnalyticsService, CaptureEngine, CaptureSession, ControlResponse, EngineError,
    ObserverSubscription, SessionState,
};
