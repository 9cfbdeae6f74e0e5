//! sleuth-capture
//!
//! Provides a unified capture interface for Sleuth.
//! Live capture and savefile replay go through libpcap; the `simulate`
//! module feeds hand-built frames through the same interface.

pub mod capture;
pub mod error;
pub mod packet;
pub mod simulate;

pub use capture::{
    list_interfaces, run_capture_loop, write_savefile, CaptureBackend, CaptureExit, Fetch,
    FileBackend, InterfaceInfo, LiveBackend, LiveSettings, PacketSource,
};
pub use error::CaptureError;
pub use packet::{LinkKind, RawPacket};
