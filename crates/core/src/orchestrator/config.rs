//! Orchestrator configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the fulfillment engine's background work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Run the assignment and escalation sweeps.
    /// When disabled, tasks are only assigned as they are released and
    /// escalations only fire on an explicit sweep.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// How often to scan for unassigned tasks (milliseconds).
    #[serde(default = "default_assignment_interval")]
    pub assignment_poll_interval_ms: u64,

    /// How often to execute due escalations (milliseconds).
    #[serde(default = "default_escalation_interval")]
    pub escalation_poll_interval_ms: u64,

    /// Let task events move orders forward (as the system role).
    #[serde(default = "default_enabled")]
    pub auto_advance: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_assignment_interval() -> u64 {
    5000 // 5 seconds
}

fn default_escalation_interval() -> u64 {
    60_000 // 1 minute
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            assignment_poll_interval_ms: default_assignment_interval(),
            escalation_poll_interval_ms: default_escalation_interval(),
            auto_advance: default_enabled(),
        }
    }
}
