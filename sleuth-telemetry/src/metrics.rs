//! ## sleuth-telemetry::metrics
//! **Prometheus registry for the capture pipeline**

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub packets: IntCounter,
    pub bytes: IntCounter,
    pub anomalies: IntCounter,
    /// Records discarded by full observer queues.
    pub queue_dropped: IntCounter,
    pub observers: IntGauge,
    pub classify_latency: Histogram,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let packets = IntCounter::new("sleuth_packets_total", "Packets classified")?;
        let bytes = IntCounter::new("sleuth_bytes_total", "Wire bytes classified")?;
        let anomalies = IntCounter::new(
            "sleuth_anomalies_total",
            "Packets scored above the anomaly threshold",
        )?;
        let queue_dropped = IntCounter::new(
            "sleuth_queue_dropped_total",
            "Records discarded by full observer queues",
        )?;
        let observers = IntGauge::new("sleuth_observers", "Connected stream observers")?;
        let classify_latency = Histogram::with_opts(
            HistogramOpts::new(
                "sleuth_classify_latency_ns",
                "Classification and fan-out time per packet",
            )
            .buckets(vec![1_000.0, 10_000.0, 100_000.0, 1_000_000.0]),
        )?;

        registry.register(Box::new(packets.clone()))?;
        registry.register(Box::new(bytes.clone()))?;
        registry.register(Box::new(anomalies.clone()))?;
        registry.register(Box::new(queue_dropped.clone()))?;
        registry.register(Box::new(observers.clone()))?;
        registry.register(Box::new(classify_latency.clone()))?;

        Ok(Self {
            registry,
            packets,
            bytes,
            anomalies,
            queue_dropped,
            observers,
            classify_latency,
        })
    }

    /// Text exposition format.
    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
