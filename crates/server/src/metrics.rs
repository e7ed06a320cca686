//! Prometheus registry for the daemon.
//!
//! The core defines its counters as statics; the daemon registers them once
//! and renders the text exposition format on shutdown and on demand.

use prometheus::{Encoder, IntGauge, Registry, TextEncoder};

use fulfillment_core::metrics::all_metrics;
use fulfillment_core::orchestrator::EngineStatus;

/// Registry with every core metric plus the engine status gauges.
pub struct DaemonMetrics {
    registry: Registry,
    unassigned_tasks: IntGauge,
    pending_escalations: IntGauge,
}

impl DaemonMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        for metric in all_metrics() {
            registry.register(metric)?;
        }

        let unassigned_tasks = IntGauge::new(
            "fulfillment_unassigned_tasks",
            "Pending tasks without an operator",
        )?;
        let pending_escalations = IntGauge::new(
            "fulfillment_pending_escalations",
            "Escalation jobs waiting to fire",
        )?;
        registry.register(Box::new(unassigned_tasks.clone()))?;
        registry.register(Box::new(pending_escalations.clone()))?;

        Ok(Self {
            registry,
            unassigned_tasks,
            pending_escalations,
        })
    }

    /// Copy the engine's point-in-time counts into the gauges.
    pub fn observe(&self, status: &EngineStatus) {
        self.unassigned_tasks.set(status.unassigned_tasks as i64);
        self.pending_escalations
            .set(status.pending_escalations as i64);
    }

    /// Render all metrics in Prometheus text format.
    pub fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!("Failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_includes_status_gauges() {
        let metrics = DaemonMetrics::new().unwrap();
        metrics.observe(&EngineStatus {
            unassigned_tasks: 3,
            pending_escalations: 1,
            ..Default::default()
        });

        let text = metrics.encode();
        assert!(text.contains("fulfillment_unassigned_tasks 3"));
        assert!(text.contains("fulfillment_pending_escalations 1"));
    }
}
