// sleuth-config/src/capture.rs
//! Packet capture configuration.
//!
//! Parameters handed to libpcap when a live capture is opened.

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

/// Packet capture configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct CaptureConfig {
    /// Network interface; the system default device when unset.
    #[validate(custom(function = validation::validate_interface))]
    #[serde(default)]
    pub interface: Option<String>,

    /// Run in promiscuous mode?
    #[serde(default = "default_promiscuous")]
    pub promiscuous: bool,

    /// Bytes captured per packet.
    #[validate(range(min = 64, max = 262144))]
    #[serde(default = "default_snaplen")]
    pub snaplen: u32,

    /// Read timeout; bounds how long a stop request waits for the capture
    /// loop to notice it.
    #[validate(range(min = 1, max = 5000))]
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u32,

    /// Deliver packets as soon as they arrive instead of buffering.
    #[serde(default = "default_immediate_mode")]
    pub immediate_mode: bool,
}

fn default_promiscuous() -> bool {
    true
}

fn default_snaplen() -> u32 {
    65535
}

fn default_read_timeout() -> u32 {
    250
}

fn default_immediate_mode() -> bool {
    true
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interface: None,
            promiscuous: default_promiscuous(),
            snaplen: default_snaplen(),
            read_timeout_ms: default_read_timeout(),
            immediate_mode: default_immediate_mode(),
        }
    }
}
