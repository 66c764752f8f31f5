//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `transactions_submitted_total` - Transactions accepted at intake
//! - `deliveries_completed_total` - Distributions delivered successfully
//! - `deliveries_failed_total` - Distributions terminally failed
//! - `delivery_retries_total` - Requeued delivery attempts
//! - `delivery_duration_seconds` - Histogram of collaborator latencies

use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Transactions accepted at intake
    pub transactions_submitted: IntCounter,

    /// Distributions delivered successfully
    pub deliveries_completed: IntCounter,

    /// Distributions terminally failed
    pub deliveries_failed: IntCounter,

    /// Requeued delivery attempts
    pub delivery_retries: IntCounter,

    /// Collaborator latency histogram
    pub delivery_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    ///
    /// Counters are registered only in the local registry, never the
    /// process-global default, so multiple collectors can coexist.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let transactions_submitted = IntCounter::with_opts(Opts::new(
            "transactions_submitted_total",
            "Transactions accepted at intake",
        ))?;
        registry.register(Box::new(transactions_submitted.clone()))?;

        let deliveries_completed = IntCounter::with_opts(Opts::new(
            "deliveries_completed_total",
            "Distributions delivered successfully",
        ))?;
        registry.register(Box::new(deliveries_completed.clone()))?;

        let deliveries_failed = IntCounter::with_opts(Opts::new(
            "deliveries_failed_total",
            "Distributions terminally failed",
        ))?;
        registry.register(Box::new(deliveries_failed.clone()))?;

        let delivery_retries = IntCounter::with_opts(Opts::new(
            "delivery_retries_total",
            "Requeued delivery attempts",
        ))?;
        registry.register(Box::new(delivery_retries.clone()))?;

        let delivery_duration = Histogram::with_opts(
            HistogramOpts::new(
                "delivery_duration_seconds",
                "Histogram of collaborator latencies",
            )
            .buckets(vec![0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0]),
        )?;
        registry.register(Box::new(delivery_duration.clone()))?;

        Ok(Self {
            transactions_submitted,
            deliveries_completed,
            deliveries_failed,
            delivery_retries,
            delivery_duration,
            registry,
        })
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.transactions_submitted.get(), 0);
        assert_eq!(metrics.deliveries_completed.get(), 0);
    }

    #[test]
    fn test_multiple_collectors_coexist() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.transactions_submitted.inc();
        assert_eq!(a.transactions_submitted.get(), 1);
        assert_eq!(b.transactions_submitted.get(), 0);
    }

    #[test]
    fn test_counters_increment() {
        let metrics = Metrics::new().unwrap();
        metrics.deliveries_completed.inc();
        metrics.deliveries_failed.inc();
        metrics.delivery_retries.inc();
        metrics.delivery_duration.observe(0.02);

        assert_eq!(metrics.deliveries_completed.get(), 1);
        assert_eq!(metrics.deliveries_failed.get(), 1);
        assert_eq!(metrics.delivery_retries.get(), 1);
    }
}
