//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Order transitions (committed, rejected, hook failures)
//! - Pipeline generation and task lifecycle
//! - Assignment passes and escalations

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// State machine
// =============================================================================

/// Committed order transitions by edge.
pub static TRANSITIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "fulfillment_transitions_total",
            "Total committed order status transitions",
        ),
        &["from", "to"],
    )
    .unwrap()
});

/// Rejected transition requests by reason.
pub static TRANSITIONS_REJECTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "fulfillment_transitions_rejected_total",
            "Total rejected order status transitions",
        ),
        &["reason"], // "invalid_transition", "permission_denied", "validation_failed", "concurrent_modification"
    )
    .unwrap()
});

/// Post-commit hook failures by hook.
pub static HOOK_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "fulfillment_hook_failures_total",
            "Total post-transition hook failures",
        ),
        &["hook"],
    )
    .unwrap()
});

// =============================================================================
// Pipeline and tasks
// =============================================================================

/// Pipelines generated by production method.
pub static PIPELINES_GENERATED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "fulfillment_pipelines_generated_total",
            "Total pipeline generations",
        ),
        &["method"],
    )
    .unwrap()
});

/// Tasks created, by origin.
pub static TASKS_CREATED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("fulfillment_tasks_created_total", "Total tasks created"),
        &["kind"], // "pipeline_step", "triggered"
    )
    .unwrap()
});

/// Tasks completed total.
pub static TASKS_COMPLETED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("fulfillment_tasks_completed_total", "Total tasks completed").unwrap()
});

// =============================================================================
// Assignment
// =============================================================================

/// Assignment attempts by role and outcome.
pub static ASSIGNMENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "fulfillment_assignments_total",
            "Total assignment attempts",
        ),
        &["role", "outcome"], // outcome: "assigned", "no_operator", "blocked", "already_assigned"
    )
    .unwrap()
});

/// Assignment pass duration in seconds.
pub static ASSIGNMENT_PASS_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "fulfillment_assignment_pass_duration_seconds",
            "Duration of batch assignment passes",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        &[],
    )
    .unwrap()
});

// =============================================================================
// Escalation
// =============================================================================

/// Escalations executed by action.
pub static ESCALATIONS_FIRED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "fulfillment_escalations_fired_total",
            "Total escalations executed",
        ),
        &["action", "result"], // result: "success", "error"
    )
    .unwrap()
});

/// Escalations skipped because the order had moved on.
pub static ESCALATIONS_STALE: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "fulfillment_escalations_stale_total",
        "Total escalations dropped because the order left the status",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // State machine
        Box::new(TRANSITIONS_TOTAL.clone()),
        Box::new(TRANSITIONS_REJECTED.clone()),
        Box::new(HOOK_FAILURES.clone()),
        // Pipeline
        Box::new(PIPELINES_GENERATED.clone()),
        Box::new(TASKS_CREATED.clone()),
        Box::new(TASKS_COMPLETED.clone()),
        // Assignment
        Box::new(ASSIGNMENTS_TOTAL.clone()),
        Box::new(ASSIGNMENT_PASS_DURATION.clone()),
        // Escalation
        Box::new(ESCALATIONS_FIRED.clone()),
        Box::new(ESCALATIONS_STALE.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_metrics_register_once() {
        let registry = prometheus::Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }
        TRANSITIONS_TOTAL
            .with_label_values(&["intake", "design_pending"])
            .inc();
        let families = registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "fulfillment_transitions_total"));
    }
}
