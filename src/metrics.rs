//! Metrics collection and export module

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder};
use std::time::Instant;

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Bundle counters
    pub bundles_submitted: IntCounter,
    pub bundles_landed: IntCounter,
    pub bundles_rejected: IntCounter,

    // Registry
    pub registry_extend_attempts: IntCounter,

    // Sweep counters
    pub sell_attempts: IntCounter,
    pub sell_failures: IntCounter,
    pub wallets_swept: IntCounter,
    pub wallets_failed: IntCounter,

    pub lamports_distributed: IntCounter,

    // Histograms
    pub bundle_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let bundles_submitted = IntCounter::with_opts(Opts::new(
            "bundles_submitted_total",
            "Bundles handed to the block-builder",
        ))?;

        let bundles_landed =
            IntCounter::with_opts(Opts::new("bundles_landed_total", "Bundles that landed"))?;

        let bundles_rejected = IntCounter::with_opts(Opts::new(
            "bundles_rejected_total",
            "Bundles rejected or timed out",
        ))?;

        let registry_extend_attempts = IntCounter::with_opts(Opts::new(
            "registry_extend_attempts_total",
            "Lookup registry create/extend attempts",
        ))?;

        let sell_attempts = IntCounter::with_opts(Opts::new(
            "sell_attempts_total",
            "Quote-and-swap attempts during sweeps",
        ))?;

        let sell_failures = IntCounter::with_opts(Opts::new(
            "sell_failures_total",
            "Token accounts whose sell loop was exhausted",
        ))?;

        let wallets_swept =
            IntCounter::with_opts(Opts::new("wallets_swept_total", "Wallets swept"))?;

        let wallets_failed = IntCounter::with_opts(Opts::new(
            "wallets_failed_total",
            "Wallets whose sweep failed",
        ))?;

        let lamports_distributed = IntCounter::with_opts(Opts::new(
            "lamports_distributed_total",
            "Lamports fanned out to buyer wallets",
        ))?;

        let bundle_latency = Histogram::with_opts(
            HistogramOpts::new(
                "bundle_landing_latency_seconds",
                "Time from submission to a terminal bundle status",
            )
            .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 40.0, 60.0]),
        )?;

        // Register all metrics
        registry.register(Box::new(bundles_submitted.clone()))?;
        registry.register(Box::new(bundles_landed.clone()))?;
        registry.register(Box::new(bundles_rejected.clone()))?;
        registry.register(Box::new(registry_extend_attempts.clone()))?;
        registry.register(Box::new(sell_attempts.clone()))?;
        registry.register(Box::new(sell_failures.clone()))?;
        registry.register(Box::new(wallets_swept.clone()))?;
        registry.register(Box::new(wallets_failed.clone()))?;
        registry.register(Box::new(lamports_distributed.clone()))?;
        registry.register(Box::new(bundle_latency.clone()))?;

        Ok(Self {
            registry,
            bundles_submitted,
            bundles_landed,
            bundles_rejected,
            registry_extend_attempts,
            sell_attempts,
            sell_failures,
            wallets_swept,
            wallets_failed,
            lamports_distributed,
            bundle_latency,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Prometheus text exposition of every registered metric
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::debug!("Failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.elapsed_secs());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_registered_metrics() {
        let m = Metrics::new().unwrap();
        m.bundles_submitted.inc();
        m.lamports_distributed.inc_by(42);
        let text = m.render();
        assert!(text.contains("bundles_submitted_total 1"));
        assert!(text.contains("lamports_distributed_total 42"));
        assert!(text.contains("bundle_landing_latency_seconds"));
    }

    #[test]
    fn test_timer_observes() {
        let m = Metrics::new().unwrap();
        Timer::new().observe_duration(&m.bundle_latency);
        assert_eq!(m.bundle_latency.get_sample_count(), 1);
    }
}
