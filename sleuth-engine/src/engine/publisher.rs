//! Per-observer stream publisher.
//!
//! Each observer gets its own event queue from the broadcaster and its own
//! tokio task. Every interval the task drains the queue, sends one `packet`
//! message per record in arrival order and then one `stats` message. A slow
//! observer only backs up its own channel and queue.

use std::sync::Arc;
use std::time::{Duration, Instant};

use prometheus::IntGauge;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, Instrument};

use sleuth_core::events::{EventQueue, StatsSnapshot, StreamMessage};
use sleuth_core::stats::StatsAggregator;
use sleuth_core::StreamError;

use super::capture::CaptureEngine;

/// Packets-per-second over the window between two stats messages.
#[derive(Debug, Default)]
pub struct RateMeter {
    last: Option<(Instant, u64)>,
}

impl RateMeter {
    /// Rate since the previous observation (or since the last
    /// [`rebase`](Self::rebase)), rounded to two decimals. Without either the
    /// result is 0. A total below the previous one means the stats were
    /// reset, so the whole total counts as the delta.
    pub fn observe(&mut self, total_packets: u64, now: Instant) -> f64 {
        let rate = match self.last {
            Some((at, previous)) => {
                let elapsed = now.saturating_duration_since(at).as_secs_f64();
                let delta = if total_packets >= previous {
                    total_packets - previous
                } else {
                    total_packets
                };
                if elapsed > 0.0 {
                    delta as f64 / elapsed
                } else {
                    0.0
                }
            }
            None => 0.0,
        };
        self.last = Some((now, total_packets));
        (rate * 100.0).round() / 100.0
    }

    /// Starts the next window at a capture start, where the total is zero.
    pub fn rebase(&mut self, started_at: Instant) {
        self.last = Some((started_at, 0));
    }
}

/// Decrements the observer gauge however the task ends, abort included.
struct ObserverGuard(IntGauge);

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        self.0.dec();
    }
}

pub struct StreamPublisher {
    queue: Arc<EventQueue>,
    stats: Arc<StatsAggregator>,
    engine: Arc<CaptureEngine>,
    interval: Duration,
    rate: RateMeter,
    generation: Option<u64>,
}

impl StreamPublisher {
    pub fn new(
        queue: Arc<EventQueue>,
        stats: Arc<StatsAggregator>,
        engine: Arc<CaptureEngine>,
        interval: Duration,
    ) -> Self {
        Self {
            queue,
            stats,
            engine,
            interval,
            rate: RateMeter::default(),
            generation: None,
        }
    }

    /// Serves one observer until its channel closes.
    pub async fn run(mut self, sink: mpsc::Sender<StreamMessage>) -> StreamError {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.cycle(&sink).await {
                        return e;
                    }
                }
                _ = sink.closed() => return StreamError::ObserverDisconnected,
            }
        }
    }

    /// One drain-and-emit cycle. Nothing is sent while capture is inactive
    /// and the queue is empty.
    pub async fn cycle(&mut self, sink: &mpsc::Sender<StreamMessage>) -> Result<(), StreamError> {
        let records = self.queue.drain_all();
        if records.is_empty() && !self.engine.is_running() {
            return Ok(());
        }

        let drained = records.len();
        for record in records {
            sink.send(StreamMessage::Packet(record))
                .await
                .map_err(|_| StreamError::ObserverDisconnected)?;
        }

        if let Some(epoch) = self.engine.epoch() {
            if self.generation != Some(epoch.generation) {
                self.generation = Some(epoch.generation);
                self.rate.rebase(epoch.started_at);
            }
        }
        let view = self.stats.snapshot();
        let packets_per_second = self.rate.observe(view.total_packets, Instant::now());
        sink.send(StreamMessage::Stats(StatsSnapshot::from_view(
            view,
            packets_per_second,
        )))
        .await
        .map_err(|_| StreamError::ObserverDisconnected)?;

        debug!(packets = drained, "Stream cycle emitted");
        Ok(())
    }
}

/// An observer's end of the stream. Dropping it stops the publisher task
/// and releases the observer's queue.
pub struct ObserverSubscription {
    id: u64,
    messages: mpsc::Receiver<StreamMessage>,
    task: JoinHandle<StreamError>,
}

impl ObserverSubscription {
    /// Spawns the publisher task on the current tokio runtime.
    pub(crate) fn spawn(
        id: u64,
        publisher: StreamPublisher,
        channel_capacity: usize,
        observers: IntGauge,
    ) -> Self {
        let (tx, rx) = mpsc::channel(channel_capacity.max(1));
        observers.inc();
        let guard = ObserverGuard(observers);
        let task = tokio::spawn(
            async move {
                let _guard = guard;
                let reason = publisher.run(tx).await;
                debug!(observer = id, %reason, "Stream publisher finished");
                reason
            }
            .instrument(tracing::info_span!("stream_publisher", observer = id)),
        );

        Self {
            id,
            messages: rx,
            task,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next message, or `None` once the publisher has stopped.
    pub async fn recv(&mut self) -> Option<StreamMessage> {
        self.messages.recv().await
    }

    pub fn try_recv(&mut self) -> Option<StreamMessage> {
        self.messages.try_recv().ok()
    }
}

impl Drop for ObserverSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_has_no_rate() {
        let mut meter = RateMeter::default();
        assert_eq!(meter.observe(10, Instant::now()), 0.0);
    }

    #[test]
    fn rate_is_delta_over_window() {
        let start = Instant::now();
        let mut meter = RateMeter::default();
        meter.observe(10, start);
        assert_eq!(meter.observe(30, start + Duration::from_secs(2)), 10.0);
        assert_eq!(meter.observe(31, start + Duration::from_secs(5)), 0.33);
    }

    #[test]
    fn rebase_measures_from_capture_start() {
        let start = Instant::now();
        let mut meter = RateMeter::default();
        meter.observe(3, start);

        let restarted = start + Duration::from_secs(60);
        meter.rebase(restarted);
        assert_eq!(meter.observe(3, restarted + Duration::from_millis(500)), 6.0);
        assert_eq!(meter.observe(3, restarted + Duration::from_secs(1)), 0.0);
    }

    #[test]
    fn reset_totals_count_from_zero() {
        let start = Instant::now();
        let mut meter = RateMeter::default();
        meter.observe(500, start);
        assert_eq!(meter.observe(4, start + Duration::from_secs(2)), 2.0);
    }
}
