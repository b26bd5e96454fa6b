//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Routing (plans found, unroutable requests)
//! - Pipeline execution (plans, steps, temp file cleanup)
//! - Task queue (terminal task statuses)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Routing Metrics
// =============================================================================

/// Routing requests by result.
pub static ROUTES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("omniconvert_routes_total", "Total routing requests"),
        &["result"], // "found", "unknown_format", "no_path"
    )
    .unwrap()
});

/// Number of steps in the plans that were found.
pub static PLAN_LENGTH: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("omniconvert_plan_steps", "Number of steps per plan")
            .buckets(vec![1.0, 2.0, 3.0, 4.0, 5.0]),
        &[],
    )
    .unwrap()
});

// =============================================================================
// Pipeline Metrics
// =============================================================================

/// Plans executed by result.
pub static PLANS_EXECUTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("omniconvert_plans_executed_total", "Total plans executed"),
        &["result"], // "completed", "failed", "cancelled"
    )
    .unwrap()
});

/// Step duration in seconds by engine.
pub static STEP_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "omniconvert_step_duration_seconds",
            "Duration of single conversion steps",
        )
        .buckets(vec![
            0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0, 3600.0,
        ]),
        &["engine"],
    )
    .unwrap()
});

/// Failed steps by engine.
pub static STEP_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("omniconvert_step_failures_total", "Total failed conversion steps"),
        &["engine"],
    )
    .unwrap()
});

/// Temp or staging files that could not be removed.
pub static CLEANUP_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "omniconvert_cleanup_failures_total",
        "Total intermediate files that could not be deleted",
    )
    .unwrap()
});

// =============================================================================
// Queue Metrics
// =============================================================================

/// Tasks by terminal status.
pub static TASKS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("omniconvert_tasks_finished_total", "Total finished tasks"),
        &["status"], // "done", "failed", "cancelled"
    )
    .unwrap()
});

/// Tasks currently holding a worker slot.
pub static TASKS_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("omniconvert_tasks_running", "Tasks currently running").unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Routing
        Box::new(ROUTES_TOTAL.clone()),
        Box::new(PLAN_LENGTH.clone()),
        // Pipeline
        Box::new(PLANS_EXECUTED.clone()),
        Box::new(STEP_DURATION.clone()),
        Box::new(STEP_FAILURES.clone()),
        Box::new(CLEANUP_FAILURES.clone()),
        // Queue
        Box::new(TASKS_FINISHED.clone()),
        Box::new(TASKS_RUNNING.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_metrics_register() {
        let registry = prometheus::Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }

        PLANS_EXECUTED.with_label_values(&["completed"]).inc();
        let families = registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "omniconvert_plans_executed_total"));
    }
}
