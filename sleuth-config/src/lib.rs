//! # Sleuth Configuration System
//!
//! Hierarchical configuration for the capture and streaming pipeline.
//!
//! ## Features
//! - **Unified Configuration**: one `SleuthConfig` for every crate
//! - **Validation**: ranges and formats checked after every load
//! - **Environment Awareness**: per-environment YAML overlays and `SLEUTH_*` overrides

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod capture;
mod error;
mod pipeline;
mod stream;
mod telemetry;
mod validation;

pub use capture::CaptureConfig;
pub use error::ConfigError;
pub use pipeline::{OverflowMode, PipelineConfig, QueueConfig, StatsConfig};
pub use stream::StreamConfig;
pub use telemetry::TelemetryConfig;

const BASE_FILE: &str = "config/sleuth.yaml";
const ENV_PREFIX: &str = "SLEUTH_";

/// Top‑level configuration container for all Sleuth components.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct SleuthConfig {
    /// Capture facility parameters.
    #[serde(default)]
    #[validate(nested)]
    pub capture: CaptureConfig,

    /// Event queues and aggregate statistics.
    #[serde(default)]
    #[validate(nested)]
    pub pipeline: PipelineConfig,

    /// Observer streaming cadence and buffering.
    #[serde(default)]
    #[validate(nested)]
    pub stream: StreamConfig,

    /// Logging.
    #[serde(default)]
    #[validate(nested)]
    pub telemetry: TelemetryConfig,
}

impl SleuthConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default Values
    /// 2. `config/sleuth.yaml` - Base settings, skipped when missing.
    /// 3. `config/<SLEUTH_ENV>.yaml` - Environment‑specific overrides.
    /// 4. `SLEUTH_*` environment variables, `__` separating nested keys.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(SleuthConfig::default()));

        if Path::new(BASE_FILE).exists() {
            figment = figment.merge(Yaml::file(BASE_FILE));
        }

        if let Ok(env) = std::env::var("SLEUTH_ENV") {
            let env_file = format!("config/{}.yaml", env);
            if Path::new(&env_file).exists() {
                figment = figment.merge(Yaml::file(env_file));
            }
        }

        Self::finish(figment)
    }

    /// Load configuration from a specific file, on top of the defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let figment =
            Figment::from(Serialized::defaults(SleuthConfig::default())).merge(Yaml::file(path));
        Self::finish(figment)
    }

    fn finish(figment: Figment) -> Result<Self, ConfigError> {
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }
}
