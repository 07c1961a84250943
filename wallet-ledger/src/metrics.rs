//! Metrics collection for observability
//!
//! Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `ledger_deposits_total` - Completed deposits
//! - `ledger_withdrawals_total` - Completed withdrawals
//! - `ledger_escrow_holds_total` - Escrow holds created
//! - `ledger_escrow_releases_total` - Escrow holds released
//! - `ledger_escrow_refunds_total` - Escrow holds refunded
//! - `ledger_failed_operations_total` - Operations that aborted
//! - `ledger_version_conflicts_total` - Concurrent-modification retries
//! - `ledger_operation_duration_seconds` - Histogram of operation latencies

use prometheus::{Histogram, HistogramOpts, IntCounter, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Completed deposits
    pub deposits_total: IntCounter,

    /// Completed withdrawals
    pub withdrawals_total: IntCounter,

    /// Escrow holds created
    pub escrow_holds_total: IntCounter,

    /// Escrow holds released
    pub escrow_releases_total: IntCounter,

    /// Escrow holds refunded
    pub escrow_refunds_total: IntCounter,

    /// Operations that aborted with a failed transaction
    pub failed_operations_total: IntCounter,

    /// Concurrent-modification retries
    pub version_conflicts_total: IntCounter,

    /// Operation duration histogram
    pub operation_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let deposits_total =
            IntCounter::new("ledger_deposits_total", "Completed deposits")?;
        registry.register(Box::new(deposits_total.clone()))?;

        let withdrawals_total =
            IntCounter::new("ledger_withdrawals_total", "Completed withdrawals")?;
        registry.register(Box::new(withdrawals_total.clone()))?;

        let escrow_holds_total =
            IntCounter::new("ledger_escrow_holds_total", "Escrow holds created")?;
        registry.register(Box::new(escrow_holds_total.clone()))?;

        let escrow_releases_total =
            IntCounter::new("ledger_escrow_releases_total", "Escrow holds released")?;
        registry.register(Box::new(escrow_releases_total.clone()))?;

        let escrow_refunds_total =
            IntCounter::new("ledger_escrow_refunds_total", "Escrow holds refunded")?;
        registry.register(Box::new(escrow_refunds_total.clone()))?;

        let failed_operations_total = IntCounter::new(
            "ledger_failed_operations_total",
            "Operations that aborted with a failed transaction",
        )?;
        registry.register(Box::new(failed_operations_total.clone()))?;

        let version_conflicts_total = IntCounter::new(
            "ledger_version_conflicts_total",
            "Concurrent-modification retries",
        )?;
        registry.register(Box::new(version_conflicts_total.clone()))?;

        let operation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ledger_operation_duration_seconds",
                "Histogram of operation latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        Ok(Self {
            deposits_total,
            withdrawals_total,
            escrow_holds_total,
            escrow_releases_total,
            escrow_refunds_total,
            failed_operations_total,
            version_conflicts_total,
            operation_duration,
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
        assert_eq!(metrics.deposits_total.get(), 0);
        assert_eq!(metrics.escrow_holds_total.get(), 0);
    }

    #[test]
    fn test_counters_increment() {
        let metrics = Metrics::new().unwrap();
        metrics.deposits_total.inc();
        metrics.deposits_total.inc();
        metrics.failed_operations_total.inc();

        assert_eq!(metrics.deposits_total.get(), 2);
        assert_eq!(metrics.failed_operations_total.get(), 1);
    }

    #[test]
    fn test_registries_are_independent() {
        // Two collectors can coexist in one process
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.deposits_total.inc();
        assert_eq!(b.deposits_total.get(), 0);
    }
}
