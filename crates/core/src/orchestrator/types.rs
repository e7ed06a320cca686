//! Types for the fulfillment engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::order::OrderStatus;
use crate::task::{Task, TaskStatus};

/// Errors that can occur during orchestration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// A task with unfinished dependencies cannot start or complete.
    #[error("task {task_id} has unfinished dependencies: {}", .missing.join(", "))]
    DependencyNotSatisfied {
        task_id: String,
        missing: Vec<String>,
    },

    /// The order's status does not allow work on its tasks.
    #[error("task {task_id} cannot change while its order is {status}")]
    OrderNotActive {
        task_id: String,
        status: OrderStatus,
    },

    #[error("task {task_id} is {status}")]
    TaskNotActionable { task_id: String, status: TaskStatus },

    #[error("transition error: {0}")]
    Transition(#[from] crate::state_machine::TransitionError),

    #[error("order store error: {0}")]
    OrderStore(#[from] crate::order::OrderError),

    #[error("task store error: {0}")]
    TaskStore(#[from] crate::task::TaskError),

    #[error("operator store error: {0}")]
    OperatorStore(#[from] crate::assignment::OperatorError),

    #[error("escalation store error: {0}")]
    EscalationStore(#[from] crate::escalation::EscalationError),

    #[error("assignment error: {0}")]
    Assignment(#[from] crate::assignment::AssignmentError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] crate::pipeline::SchedulerError),

    #[error("catalog error: {0}")]
    Catalog(#[from] crate::pipeline::CatalogError),
}

/// What a task completion changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCompletion {
    pub task: Task,
    /// Steps whose last outstanding dependency was this task.
    pub unblocked: Vec<String>,
    /// Deferred trigger tasks instantiated by this completion.
    pub triggered: Vec<String>,
    /// Order status after any auto-advance.
    pub order_status: OrderStatus,
}

/// Counters from one escalation sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EscalationSweepSummary {
    pub fired: usize,
    /// Jobs whose order had already left the scheduled status.
    pub stale: usize,
    pub failed: usize,
}

/// Current status of the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineStatus {
    /// Whether the background sweeps are running.
    pub running: bool,
    /// Order counts for every status with at least one order.
    pub orders_by_status: BTreeMap<OrderStatus, usize>,
    /// Pending tasks with no operator.
    pub unassigned_tasks: usize,
    /// Escalation jobs not yet fired or cancelled.
    pub pending_escalations: usize,
}
