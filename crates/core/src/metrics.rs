//! Prometheus metrics for the packaging pipeline.
//!
//! This module provides metrics for:
//! - Rendition encodes (outcome, duration)
//! - Batches (outcome, duration)
//!
//! Nothing is registered by default. Call [`register_metrics`] with the
//! registry the embedding process exports.

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry};

// =============================================================================
// Renditions
// =============================================================================

/// Rendition encodes total by result.
pub static RENDITIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ladder_renditions_total", "Total rendition encodes"),
        &["result"], // "success", "failed"
    )
    .expect("valid metric definition")
});

/// Rendition encode duration in seconds.
pub static RENDITION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "ladder_rendition_duration_seconds",
            "Duration of a single rendition encode",
        )
        .buckets(vec![
            1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0,
        ]),
        &["rendition"],
    )
    .expect("valid metric definition")
});

/// Encodes currently running.
pub static ENCODES_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "ladder_encodes_in_flight",
        "Rendition encodes dispatched but not yet reported",
    )
    .expect("valid metric definition")
});

// =============================================================================
// Batches
// =============================================================================

/// Batches total by result.
pub static BATCHES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ladder_batches_total", "Total packaging batches"),
        &["result"], // "success", "rendition_failed", "rejected", "error"
    )
    .expect("valid metric definition")
});

/// Batch duration in seconds, from dispatch to manifest.
pub static BATCH_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("ladder_batch_duration_seconds", "Duration of packaging batches")
            .buckets(vec![5.0, 30.0, 60.0, 300.0, 600.0, 1800.0, 3600.0, 7200.0]),
        &["result"],
    )
    .expect("valid metric definition")
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all pipeline metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(RENDITIONS_TOTAL.clone()),
        Box::new(RENDITION_DURATION.clone()),
        Box::new(ENCODES_IN_FLIGHT.clone()),
        Box::new(BATCHES_TOTAL.clone()),
        Box::new(BATCH_DURATION.clone()),
    ]
}

/// Registers every pipeline metric with `registry`.
pub fn register_metrics(registry: &Registry) -> prometheus::Result<()> {
    for metric in all_metrics() {
        registry.register(metric)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics() {
        let registry = Registry::new();
        register_metrics(&registry).unwrap();

        RENDITIONS_TOTAL.with_label_values(&["success"]).inc();
        BATCHES_TOTAL.with_label_values(&["success"]).inc();
        RENDITION_DURATION.with_label_values(&["720p"]).observe(1.5);

        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"ladder_renditions_total".to_string()));
        assert!(names.contains(&"ladder_batches_total".to_string()));
        assert!(names.contains(&"ladder_rendition_duration_seconds".to_string()));
    }

    #[test]
    fn test_register_twice_fails() {
        let registry = Registry::new();
        register_metrics(&registry).unwrap();
        assert!(register_metrics(&registry).is_err());
    }
}
