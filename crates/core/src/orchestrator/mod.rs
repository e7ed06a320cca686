//! The fulfillment engine.
//!
//! Wires the stores, the state machine with its hooks, the scheduler and the
//! assignment engine together, and runs two background sweeps:
//! - **Assignment**: assigns unblocked, unassigned pending tasks
//! - **Escalation**: executes due escalation jobs

mod config;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use runner::{EngineStores, EscalationSweeper, FulfillmentEngine};
pub use types::{EngineStatus, EscalationSweepSummary, OrchestratorError, TaskCompletion};
