//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `wave_reconciliations_total` - Total number of reconciliations
//! - `wave_reconciliation_errors_total` - Reconciliation errors by error kind
//! - `wave_reconciliation_duration_seconds` - Duration of reconciliation operations
//! - `wave_config_hash_updates_total` - Workloads whose configuration hash was rewritten
//! - `wave_owner_reference_updates_total` - Owner references added to or removed from children
//! - `wave_conflict_retries_total` - Child writes retried after a version conflict
//! - `wave_finalizer_cleanups_total` - Cleanups run before dropping the finalizer, by reason

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("wave_reconciliations_total", "Total number of reconciliations")
        .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "wave_reconciliation_errors_total",
            "Total number of reconciliation errors by error kind",
        ),
        &["error"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "wave_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static CONFIG_HASH_UPDATES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "wave_config_hash_updates_total",
        "Total number of configuration hash updates written to workloads",
    )
    .expect("Failed to create CONFIG_HASH_UPDATES_TOTAL metric - this should never happen")
});

static OWNER_REFERENCE_UPDATES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "wave_owner_reference_updates_total",
            "Total number of owner reference changes on ConfigMaps and Secrets",
        ),
        &["operation"],
    )
    .expect("Failed to create OWNER_REFERENCE_UPDATES_TOTAL metric - this should never happen")
});

static CONFLICT_RETRIES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "wave_conflict_retries_total",
        "Total number of child writes retried after a resource version conflict",
    )
    .expect("Failed to create CONFLICT_RETRIES_TOTAL metric - this should never happen")
});

static FINALIZER_CLEANUPS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "wave_finalizer_cleanups_total",
            "Total number of owner reference cleanups completed before removing the finalizer",
        ),
        &["reason"],
    )
    .expect("Failed to create FINALIZER_CLEANUPS_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(CONFIG_HASH_UPDATES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(OWNER_REFERENCE_UPDATES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CONFLICT_RETRIES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(FINALIZER_CLEANUPS_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors(error: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[error]).inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_config_hash_updates() {
    CONFIG_HASH_UPDATES_TOTAL.inc();
}

/// `operation` is `add` or `remove`
pub fn increment_owner_reference_updates(operation: &str) {
    OWNER_REFERENCE_UPDATES_TOTAL
        .with_label_values(&[operation])
        .inc();
}

pub fn increment_conflict_retries() {
    CONFLICT_RETRIES_TOTAL.inc();
}

/// `reason` is `deleted` or `disabled`
pub fn increment_finalizer_cleanups(reason: &str) {
    FINALIZER_CLEANUPS_TOTAL.with_label_values(&[reason]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics() {
        // This should not panic - metrics should register successfully
        assert!(register_metrics().is_ok());
    }

    #[test]
    fn test_increment_reconciliations() {
        let before = RECONCILIATIONS_TOTAL.get();
        increment_reconciliations();
        let after = RECONCILIATIONS_TOTAL.get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_errors_are_labelled_by_kind() {
        let before = RECONCILIATION_ERRORS_TOTAL
            .with_label_values(&["conflict"])
            .get();
        increment_reconciliation_errors("conflict");
        let after = RECONCILIATION_ERRORS_TOTAL
            .with_label_values(&["conflict"])
            .get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_owner_reference_operations_are_separate() {
        let adds = OWNER_REFERENCE_UPDATES_TOTAL.with_label_values(&["add"]).get();
        let removes = OWNER_REFERENCE_UPDATES_TOTAL
            .with_label_values(&["remove"])
            .get();
        increment_owner_reference_updates("add");
        assert_eq!(
            OWNER_REFERENCE_UPDATES_TOTAL.with_label_values(&["add"]).get(),
            adds + 1
        );
        assert!(OWNER_REFERENCE_UPDATES_TOTAL.with_label_values(&["remove"]).get() >= removes);
    }

    #[test]
    fn test_observe_reconciliation_duration() {
        let before = RECONCILIATION_DURATION.get_sample_count();
        observe_reconciliation_duration(0.25);
        assert!(RECONCILIATION_DURATION.get_sample_count() > before);
    }
}
