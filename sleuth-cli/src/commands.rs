use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio::time;
use tracing::{info, warn};

use sleuth_capture::list_interfaces;
use sleuth_config::SleuthConfig;
use sleuth_core::events::StreamMessage;
use sleuth_engine::{AnalyticsService, ControlResponse};
use sleuth_telemetry::logging::EventLogger;

const COMPLETION_POLL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(name = "sleuth", version, about)]
pub struct Cli {
    /// Configuration file layered over the defaults
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Capture live traffic and stream packet and stats messages as JSON lines
    Run(RunArgs),
    /// Stream a pcap savefile through the pipeline
    Replay(ReplayArgs),
    /// List capture interfaces
    Interfaces,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Interface to capture on; the default device when omitted
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Session name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Print Prometheus metrics to stderr on exit
    #[arg(long)]
    pub metrics: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ReplayArgs {
    #[arg(short, long)]
    pub file: PathBuf,

    #[arg(short, long)]
    pub name: Option<String>,

    #[arg(long)]
    pub metrics: bool,
}

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let mut config = load_config(cli.config.as_deref())?;
    EventLogger::init(&config.telemetry.log_level, config.telemetry.json_logs)
        .map_err(|e| anyhow::anyhow!("failed to initialise logging: {e}"))?;

    match cli.command {
        Commands::Run(args) => {
            if args.interface.is_some() {
                config.capture.interface = args.interface;
            }
            let service = AnalyticsService::live(config)?;
            stream_session(&service, args.name.as_deref(), false).await?;
            dump_metrics(&service, args.metrics)
        }
        Commands::Replay(args) => {
            if !args.file.exists() {
                bail!("capture file {} does not exist", args.file.display());
            }
            let service = AnalyticsService::replay(config, &args.file)?;
            stream_session(&service, args.name.as_deref(), true).await?;
            dump_metrics(&service, args.metrics)
        }
        Commands::Interfaces => {
            for interface in list_interfaces()? {
                match interface.description {
                    Some(description) => println!("{}\t{}", interface.name, description),
                    None => println!("{}", interface.name),
                }
            }
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SleuthConfig> {
    let config = match path {
        Some(path) => SleuthConfig::load_from_path(path),
        None => SleuthConfig::load(),
    };
    config.context("failed to load configuration")
}

/// Runs one session and prints every control response and stream message as
/// a JSON line. Ends on Ctrl-C, or once the source is exhausted and fully
/// streamed when `until_exhausted` is set.
async fn stream_session(
    service: &AnalyticsService,
    name: Option<&str>,
    until_exhausted: bool,
) -> anyhow::Result<()> {
    let mut observer = service.subscribe();
    let session = service.create_session(name);

    let response = ControlResponse::started(service.start_session(session.id));
    print_line(&response)?;
    if let ControlResponse::Error { error } = &response {
        bail!("failed to start capture: {error}");
    }

    let mut streamed_packets = 0u64;
    let mut last_reported_total = 0u64;
    let mut poll = time::interval(COMPLETION_POLL);
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            message = observer.recv() => {
                let Some(message) = message else {
                    warn!("Stream publisher stopped");
                    break;
                };
                match &message {
                    StreamMessage::Packet(_) => streamed_packets += 1,
                    StreamMessage::Stats(stats) => last_reported_total = stats.total_packets,
                }
                print_line(&message)?;
            }
            _ = poll.tick(), if until_exhausted => {
                if !service.is_capturing() {
                    let total = service.snapshot().total_packets;
                    let dropped = service.metrics().queue_dropped.get();
                    if last_reported_total == total && streamed_packets + dropped >= total {
                        info!(packets = total, "Replay complete");
                        break;
                    }
                }
            }
            _ = &mut interrupted => {
                info!("Interrupted");
                break;
            }
        }
    }

    print_line(&ControlResponse::stopped(service.stop_session(session.id)))?;
    if let Some(error) = service.last_capture_error() {
        bail!("capture failed: {error}");
    }
    Ok(())
}

fn print_line<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn dump_metrics(service: &AnalyticsService, enabled: bool) -> anyhow::Result<()> {
    if enabled {
        eprint!("{}", service.metrics().gather_metrics()?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_interface() {
        let cli =
            Cli::try_parse_from(["sleuth", "run", "--interface", "eth0", "--metrics"]).unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.interface.as_deref(), Some("eth0"));
                assert!(args.metrics);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn replay_requires_a_file() {
        assert!(Cli::try_parse_from(["sleuth", "replay"]).is_err());
        let cli =
            Cli::try_parse_from(["sleuth", "--config", "lab.yaml", "replay", "-f", "trace.pcap"])
                .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("lab.yaml")));
        assert!(matches!(
            cli.command,
            Commands::Replay(ref args) if args.file == PathBuf::from("trace.pcap")
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn replay_stream_ends_once_the_source_is_drained() {
        use sleuth_capture::simulate::{ipv4_frame, SyntheticBackend};
        use sleuth_capture::RawPacket;
        use std::net::Ipv4Addr;
        use std::sync::Arc;

        let frames = (0..3)
            .map(|i| {
                RawPacket::new(ipv4_frame(
                    Ipv4Addr::new(10, 0, 0, 1),
                    Ipv4Addr::new(10, 0, 0, 2),
                    17,
                    60 + i,
                ))
            })
            .collect();
        let mut config = SleuthConfig::default();
        config.stream.interval_ms = 50;
        let service =
            AnalyticsService::new(config, Arc::new(SyntheticBackend::new(frames))).unwrap();

        time::timeout(Duration::from_secs(5), stream_session(&service, Some("replay"), true))
            .await
            .expect("replay stream did not finish")
            .unwrap();
        assert_eq!(service.snapshot().total_packets, 3);
        assert!(service.active_session().is_none());
    }

    #[test]
    fn clap_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
