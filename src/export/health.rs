use anyhow::{Context, Result};
use prometheus::{
    Counter, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};

/// Prometheus metrics for profiler health and overhead tracking.
///
/// All metrics use the "flameprof" namespace. Served from the API server's
/// `/metrics` route.
pub struct HealthMetrics {
    registry: Registry,

    /// Total sampling ticks executed (including gated no-op ticks).
    pub ticks_total: Counter,
    /// Total thread samples recorded into the store.
    pub samples_captured: Counter,
    /// Total samples dropped by the store's cardinality bound.
    pub samples_dropped: Counter,
    /// Total snapshot failures swallowed by the sampler.
    pub snapshot_errors: Counter,
    /// Distinct signatures currently stored.
    pub distinct_signatures: Gauge,
    /// Whether sampling is active (1=yes, 0=no).
    pub sampling: Gauge,
    /// Duration of one sampling tick body (10us-100ms buckets).
    pub tick_duration: Histogram,
}

impl HealthMetrics {
    /// Creates a new health metrics instance with all metrics registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let ticks_total = Counter::with_opts(
            Opts::new("ticks_total", "Total sampling ticks executed.").namespace("flameprof"),
        )?;
        let samples_captured = Counter::with_opts(
            Opts::new(
                "samples_captured_total",
                "Total thread samples recorded into the store.",
            )
            .namespace("flameprof"),
        )?;
        let samples_dropped = Counter::with_opts(
            Opts::new(
                "samples_dropped_total",
                "Total samples dropped by the cardinality bound.",
            )
            .namespace("flameprof"),
        )?;
        let snapshot_errors = Counter::with_opts(
            Opts::new(
                "snapshot_errors_total",
                "Total snapshot failures swallowed by the sampler.",
            )
            .namespace("flameprof"),
        )?;
        let distinct_signatures = Gauge::with_opts(
            Opts::new(
                "distinct_signatures",
                "Distinct stack signatures currently stored.",
            )
            .namespace("flameprof"),
        )?;
        let sampling = Gauge::with_opts(
            Opts::new("sampling", "Whether sampling is active (1=yes, 0=no).")
                .namespace("flameprof"),
        )?;
        let tick_duration = Histogram::with_opts(
            HistogramOpts::new("tick_duration_seconds", "Duration of one sampling tick body.")
                .namespace("flameprof")
                .buckets(vec![
                    0.00001, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1,
                ]),
        )?;

        registry.register(Box::new(ticks_total.clone()))?;
        registry.register(Box::new(samples_captured.clone()))?;
        registry.register(Box::new(samples_dropped.clone()))?;
        registry.register(Box::new(snapshot_errors.clone()))?;
        registry.register(Box::new(distinct_signatures.clone()))?;
        registry.register(Box::new(sampling.clone()))?;
        registry.register(Box::new(tick_duration.clone()))?;

        Ok(Self {
            registry,
            ticks_total,
            samples_captured,
            samples_dropped,
            snapshot_errors,
            distinct_signatures,
            sampling,
            tick_duration,
        })
    }

    /// Encodes the registry in Prometheus text exposition format.
    pub fn encode(&self) -> Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buf)
            .context("encoding prometheus metrics")?;
        String::from_utf8(buf).context("metrics output is not valid utf-8")
    }
}
