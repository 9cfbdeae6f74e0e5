//! ## sleuth-core::events
//! **Hand-off between the capture thread and stream publishers**
//!
//! - `queue`: bounded, mutex-guarded FIFO with an overflow policy
//! - `broadcast`: fan-out of each record to one queue per observer
//! - `message`: the `packet` / `stats` messages observers receive

pub mod broadcast;
pub mod message;
pub mod queue;

pub use broadcast::{Broadcaster, PublishReport};
pub use message::{format_volume, StatsSnapshot, StreamMessage};
pub use queue::{EventQueue, OverflowPolicy};
