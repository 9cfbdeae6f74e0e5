//! ## sleuth-telemetry::logging
//! **Structured logging with tracing**
//!
//! `EventLogger::init` installs the process-wide subscriber;
//! `EventLogger::log_event` records control-plane events (session lifecycle,
//! capture failures) with OpenTelemetry-style key/value metadata.

use opentelemetry::KeyValue;
use tracing::info_span;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Installs the global subscriber. `RUST_LOG` overrides `default_level`.
    /// Returns an error if a subscriber is already installed.
    pub fn init(
        default_level: &str,
        json: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        let builder = fmt()
            .with_env_filter(filter)
            .with_thread_names(true)
            .with_span_events(FmtSpan::NONE)
            .with_writer(std::io::stderr);

        if json {
            builder.json().try_init()
        } else {
            builder.try_init()
        }
    }

    pub fn log_event(event_type: &str, metadata: Vec<KeyValue>) {
        let span = info_span!(
            "capture_event",
            event_type = event_type,
            otel.kind = "INTERNAL"
        );
        let _entered = span.enter();

        let fields: Vec<String> = metadata
            .iter()
            .map(|kv| format!("{}={}", kv.key, kv.value))
            .collect();
        tracing::info!(metadata = %fields.join(" "), "{event_type}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn logs_event_with_metadata() {
        EventLogger::log_event(
            "session_started",
            vec![
                KeyValue::new("session_id", 1_i64),
                KeyValue::new("name", "lab"),
            ],
        );
        assert!(logs_contain("session_started"));
        assert!(logs_contain("session_id=1"));
    }
}
