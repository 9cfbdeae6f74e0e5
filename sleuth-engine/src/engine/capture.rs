//! Capture engine: owns the single capture worker thread.
//!
//! The worker reads frames from the backend, classifies them, folds them
//! into the aggregate stats and fans them out to the observer queues. Only
//! one worker exists at a time; `stop` joins it before returning so a
//! following `start` can never overlap an exiting loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam::channel;
use opentelemetry::KeyValue;
use parking_lot::Mutex;
use tracing::{debug, error, info, info_span};

use sleuth_capture::{
    run_capture_loop, CaptureBackend, CaptureError, CaptureExit, PacketSource, RawPacket,
};
use sleuth_core::classify::Classifier;
use sleuth_core::events::Broadcaster;
use sleuth_core::stats::StatsAggregator;
use sleuth_telemetry::{logging::EventLogger, metrics::MetricsRecorder};

use super::error::EngineError;

struct CaptureWorker {
    terminate: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Identifies one capture run. `generation` advances with every start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureEpoch {
    pub generation: u64,
    pub started_at: Instant,
}

/// Holds the running flag up for the lifetime of the worker loop, panics
/// included.
struct RunningFlag(Arc<AtomicBool>);

impl RunningFlag {
    fn raise(flag: Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for RunningFlag {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Everything the worker thread needs, detached from the engine.
#[derive(Clone)]
struct Pipeline {
    classifier: Classifier,
    stats: Arc<StatsAggregator>,
    broadcaster: Arc<Broadcaster>,
    metrics: MetricsRecorder,
}

impl Pipeline {
    fn process(&self, id: u64, packet: &RawPacket) {
        let started = Instant::now();
        let record = self.classifier.classify(id, packet);

        if self.stats.record(&record) {
            self.metrics.anomalies.inc();
        }
        self.metrics.packets.inc();
        self.metrics.bytes.inc_by(u64::from(record.size_bytes));

        let report = self.broadcaster.publish(record);
        if report.dropped > 0 {
            self.metrics.queue_dropped.inc_by(report.dropped as u64);
        }
        self.metrics
            .classify_latency
            .observe(started.elapsed().as_nanos() as f64);
    }

    fn run(
        &self,
        source: &mut dyn PacketSource,
        terminate: &AtomicBool,
        last_error: &Mutex<Option<String>>,
    ) {
        // Record ids restart at 1 with every capture.
        let mut sequence = 0u64;
        let outcome = run_capture_loop(source, terminate, |packet| {
            sequence += 1;
            self.process(sequence, &packet);
        });

        match outcome {
            Ok(CaptureExit::Stopped) => debug!(packets = sequence, "Capture loop stopped"),
            Ok(CaptureExit::Exhausted) => info!(packets = sequence, "Capture source exhausted"),
            Err(e) => {
                error!(error = %e, packets = sequence, "Capture facility failed");
                EventLogger::log_event(
                    "capture_failed",
                    vec![
                        KeyValue::new("error", e.to_string()),
                        KeyValue::new("packets", sequence as i64),
                    ],
                );
                *last_error.lock() = Some(e.to_string());
            }
        }
    }
}

pub struct CaptureEngine {
    backend: Arc<dyn CaptureBackend>,
    pipeline: Pipeline,
    worker: Mutex<Option<CaptureWorker>>,
    running: Arc<AtomicBool>,
    epoch: Mutex<Option<CaptureEpoch>>,
    started_once: AtomicBool,
    last_error: Arc<Mutex<Option<String>>>,
}

impl CaptureEngine {
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        classifier: Classifier,
        stats: Arc<StatsAggregator>,
        broadcaster: Arc<Broadcaster>,
        metrics: MetricsRecorder,
    ) -> Self {
        Self {
            backend,
            pipeline: Pipeline {
                classifier,
                stats,
                broadcaster,
                metrics,
            },
            worker: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
            epoch: Mutex::new(None),
            started_once: AtomicBool::new(false),
            last_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Opens the capture facility and starts the worker.
    ///
    /// Resets the aggregate stats and empties every observer queue first.
    /// Facility errors at open time are returned here; later ones end the
    /// worker and are kept in [`CaptureEngine::last_error`].
    pub fn start(&self, interface: Option<&str>) -> Result<(), EngineError> {
        let mut slot = self.worker.lock();
        if slot.is_some() && self.is_running() {
            return Err(EngineError::AlreadyRunning);
        }
        // A worker whose flag is down has left its loop; joining is brief.
        if let Some(finished) = slot.take() {
            if finished.handle.join().is_err() {
                error!("Previous capture worker panicked");
            }
        }

        self.pipeline.stats.reset();
        self.pipeline.broadcaster.clear_all();
        *self.last_error.lock() = None;
        {
            let mut epoch = self.epoch.lock();
            let generation = epoch.map_or(1, |e| e.generation + 1);
            *epoch = Some(CaptureEpoch {
                generation,
                started_at: Instant::now(),
            });
        }

        let terminate = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = channel::bounded::<Result<(), CaptureError>>(1);
        let backend = self.backend.clone();
        let pipeline = self.pipeline.clone();
        let last_error = self.last_error.clone();
        let worker_terminate = terminate.clone();
        let running = self.running.clone();
        let interface_name = interface.map(str::to_owned);

        let handle = thread::Builder::new()
            .name("sleuth-capture".into())
            .spawn(move || {
                let span = info_span!("capture_worker", interface = ?interface_name);
                let _entered = span.enter();

                let mut source = match backend.open(interface_name.as_deref()) {
                    Ok(source) => source,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _running = RunningFlag::raise(running);
                let _ = ready_tx.send(Ok(()));
                info!(link = ?source.link_kind(), "Capture started");
                pipeline.run(source.as_mut(), &worker_terminate, &last_error);
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                *slot = Some(CaptureWorker { terminate, handle });
                self.started_once.store(true, Ordering::Release);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                error!(error = %e, "Failed to open capture facility");
                Err(EngineError::Capture(e))
            }
            Err(_) => {
                let _ = handle.join();
                Err(EngineError::WorkerPanicked)
            }
        }
    }

    /// Signals the worker and blocks until it has exited.
    ///
    /// Also reaps a worker that already ended on its own (exhausted source or
    /// facility error). Fails with `NotRunning` only if no capture was ever
    /// started; repeated stops are no-ops.
    pub fn stop(&self) -> Result<(), EngineError> {
        let mut slot = self.worker.lock();
        let Some(worker) = slot.take() else {
            return if self.started_once.load(Ordering::Acquire) {
                Ok(())
            } else {
                Err(EngineError::NotRunning)
            };
        };
        worker.terminate.store(true, Ordering::Release);
        worker
            .handle
            .join()
            .map_err(|_| EngineError::WorkerPanicked)?;
        debug!("Capture worker joined");
        Ok(())
    }

    /// Whether the worker is inside its capture loop. Lock-free, so async
    /// tasks may poll it while `start` or `stop` blocks.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// The most recent capture start, if any.
    pub fn epoch(&self) -> Option<CaptureEpoch> {
        *self.epoch.lock()
    }

    /// The error that ended the most recent capture, if it failed.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.terminate.store(true, Ordering::Release);
            let _ = worker.handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sleuth_capture::simulate::{ipv4_frame, SyntheticBackend};
    use sleuth_core::events::OverflowPolicy;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    fn engine(backend: SyntheticBackend) -> (CaptureEngine, Arc<StatsAggregator>, Arc<Broadcaster>) {
        let stats = Arc::new(StatsAggregator::default());
        let broadcaster = Arc::new(Broadcaster::new(64, OverflowPolicy::DropOldest).unwrap());
        let engine = CaptureEngine::new(
            Arc::new(backend),
            Classifier::default(),
            stats.clone(),
            broadcaster.clone(),
            MetricsRecorder::new().unwrap(),
        );
        (engine, stats, broadcaster)
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..400 {
            if condition() {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("condition not reached");
    }

    fn frame(len: usize) -> RawPacket {
        RawPacket::new(ipv4_frame(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
            6,
            len,
        ))
    }

    #[test]
    fn stop_without_start_is_not_running() {
        let (engine, _, _) = engine(SyntheticBackend::new(vec![]));
        assert!(matches!(engine.stop(), Err(EngineError::NotRunning)));
    }

    #[test]
    fn second_start_while_running_is_rejected() {
        let (engine, _, _) = engine(SyntheticBackend::new(vec![]).hold_open());
        engine.start(None).unwrap();
        assert!(engine.is_running());
        assert!(matches!(engine.start(None), Err(EngineError::AlreadyRunning)));
        engine.stop().unwrap();
        assert!(!engine.is_running());
        engine.stop().unwrap();
    }

    #[test]
    fn worker_feeds_stats_and_queues() {
        let frames = vec![frame(50), frame(170), frame(999)];
        let (engine, stats, broadcaster) = engine(SyntheticBackend::new(frames).hold_open());
        let queue = broadcaster.subscribe();

        engine.start(None).unwrap();
        wait_until(|| stats.snapshot().total_packets == 3);
        engine.stop().unwrap();

        let ids: Vec<u64> = queue.drain_all().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(stats.snapshot().anomaly_count, 1);
    }

    #[test]
    fn every_start_opens_a_new_epoch() {
        let (engine, _, _) = engine(SyntheticBackend::new(vec![]).hold_open());
        assert!(engine.epoch().is_none());

        engine.start(None).unwrap();
        let first = engine.epoch().unwrap();
        engine.stop().unwrap();
        engine.start(None).unwrap();
        let second = engine.epoch().unwrap();
        engine.stop().unwrap();

        assert_eq!(first.generation, 1);
        assert_eq!(second.generation, 2);
        assert!(second.started_at >= first.started_at);
    }

    #[test]
    fn running_flag_is_readable_while_start_blocks() {
        struct SlowOpen(SyntheticBackend);

        impl CaptureBackend for SlowOpen {
            fn open(&self, interface: Option<&str>) -> Result<Box<dyn PacketSource>, CaptureError> {
                thread::sleep(Duration::from_millis(300));
                self.0.open(interface)
            }
        }

        let stats = Arc::new(StatsAggregator::default());
        let broadcaster = Arc::new(Broadcaster::new(8, OverflowPolicy::DropOldest).unwrap());
        let engine = Arc::new(CaptureEngine::new(
            Arc::new(SlowOpen(SyntheticBackend::new(vec![]).hold_open())),
            Classifier::default(),
            stats,
            broadcaster,
            MetricsRecorder::new().unwrap(),
        ));

        let starter = {
            let engine = engine.clone();
            thread::spawn(move || engine.start(None).is_ok())
        };
        thread::sleep(Duration::from_millis(50));
        let asked = Instant::now();
        assert!(!engine.is_running());
        assert!(asked.elapsed() < Duration::from_millis(100));

        assert!(starter.join().unwrap());
        assert!(engine.is_running());
        engine.stop().unwrap();
        assert!(!engine.is_running());
    }

    #[test]
    fn restart_resets_stats_and_sequence() {
        let (engine, stats, broadcaster) = engine(SyntheticBackend::new(vec![frame(60)]));
        let queue = broadcaster.subscribe();

        engine.start(None).unwrap();
        wait_until(|| !engine.is_running());
        engine.start(None).unwrap();
        wait_until(|| !engine.is_running());

        assert_eq!(stats.snapshot().total_packets, 1);
        let ids: Vec<u64> = queue.drain_all().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1]);
        engine.stop().unwrap();
    }
}
