//! Task storage trait.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::{NewTask, OperatorWorkload, Task, TaskStatus};
use crate::order::Role;

/// Error type for task storage operations.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Task not found: {0}")]
    NotFound(String),

    /// Completed tasks are immutable.
    #[error("Task {0} is already completed")]
    AlreadyCompleted(String),

    #[error("Task {task_id} cannot move from {from} to {to}")]
    InvalidStatusChange {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for TaskError {
    fn from(e: rusqlite::Error) -> Self {
        TaskError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for TaskError {
    fn from(e: serde_json::Error) -> Self {
        TaskError::Serialization(e.to_string())
    }
}

/// Trait for task storage backends.
pub trait TaskStore: Send + Sync {
    /// Delete the order's pipeline tasks and insert `tasks` in one
    /// transaction. Triggered tasks are left alone.
    fn replace_pipeline(
        &self,
        order_id: &str,
        tasks: Vec<NewTask>,
        at: DateTime<Utc>,
    ) -> Result<Vec<Task>, TaskError>;

    /// Insert a triggered task unless the order already has a task with the
    /// same step name. Returns `None` when it already existed.
    fn insert_triggered(&self, task: NewTask, at: DateTime<Utc>)
        -> Result<Option<Task>, TaskError>;

    fn get(&self, id: &str) -> Result<Option<Task>, TaskError>;

    /// All tasks of an order, by pipeline position.
    fn list_for_order(&self, order_id: &str) -> Result<Vec<Task>, TaskError>;

    /// Unassigned pending tasks whose dependencies are all completed.
    ///
    /// Tasks never attempted come first, then the least recently attempted,
    /// each group by highest priority then earliest due.
    fn list_assignable(&self, limit: usize) -> Result<Vec<Task>, TaskError>;

    /// Record that the assignment pass looked at a task and left it
    /// unassigned, sending it to the back of the next scan.
    fn mark_attempted(&self, task_id: &str, at: DateTime<Utc>) -> Result<(), TaskError>;

    fn count_unassigned_pending(&self) -> Result<i64, TaskError>;

    /// Set the operator only if the task is still unassigned.
    /// Returns false when another writer got there first.
    fn assign_if_unassigned(
        &self,
        task_id: &str,
        operator_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, TaskError>;

    /// Change a task's status. Fails with `AlreadyCompleted` for completed tasks.
    fn set_status(&self, task_id: &str, status: TaskStatus, at: DateTime<Utc>)
        -> Result<Task, TaskError>;

    /// Put every open task of the order on hold, remembering its status.
    fn pause_open_for_order(&self, order_id: &str, at: DateTime<Utc>) -> Result<usize, TaskError>;

    /// Restore every held task of the order to the status it was paused from.
    fn resume_for_order(&self, order_id: &str, at: DateTime<Utc>) -> Result<usize, TaskError>;

    /// Move the order's pending tasks from one role to another, clearing the
    /// operator so the assignment pass picks them up again.
    fn reassign_role(
        &self,
        order_id: &str,
        from: Role,
        to: Role,
        at: DateTime<Utc>,
    ) -> Result<usize, TaskError>;

    /// Open workload and recent completions for an operator.
    fn operator_workload(
        &self,
        operator_id: &str,
        completed_since: DateTime<Utc>,
    ) -> Result<OperatorWorkload, TaskError>;
}
