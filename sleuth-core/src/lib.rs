//! # sleuth-core
//!
//! Packet classification and the shared state of the analytics pipeline.
//!
//! ### Key Submodules:
//! - `classify`: raw frame → `PacketRecord`, with a pluggable anomaly scorer
//! - `events`: per-observer event queues, fan-out broadcaster, stream messages
//! - `stats`: running aggregate statistics since the last capture start

pub mod classify;
pub mod error;
pub mod events;
pub mod record;
pub mod stats;

pub mod prelude {
    pub use crate::classify::*;
    pub use crate::error::*;
    pub use crate::events::*;
    pub use crate::record::*;
    pub use crate::stats::*;
}

pub use error::{EventError, StreamError};
