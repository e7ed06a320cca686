//! Escalation job storage.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::{EscalationJob, JobState, NewEscalationJob};
use crate::order::OrderStatus;

#[derive(Debug, Error)]
pub enum EscalationError {
    #[error("Escalation job not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for EscalationError {
    fn from(e: rusqlite::Error) -> Self {
        EscalationError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for EscalationError {
    fn from(e: serde_json::Error) -> Self {
        EscalationError::Serialization(e.to_string())
    }
}

/// Trait for escalation job storage backends.
pub trait EscalationStore: Send + Sync {
    /// Record a pending job, created at `at`.
    fn schedule(
        &self,
        job: NewEscalationJob,
        at: DateTime<Utc>,
    ) -> Result<EscalationJob, EscalationError>;

    fn get(&self, id: &str) -> Result<Option<EscalationJob>, EscalationError>;

    /// Pending jobs due at or before `now`, earliest first.
    fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<EscalationJob>, EscalationError>;

    /// Cancel the order's pending jobs scheduled for `status` that are not
    /// yet due. Due jobs are left for the sweep, which drops stale ones.
    fn cancel_pending(
        &self,
        order_id: &str,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<usize, EscalationError>;

    /// Move a pending job to a final state.
    fn resolve(
        &self,
        id: &str,
        state: JobState,
        error: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), EscalationError>;

    fn list_for_order(&self, order_id: &str) -> Result<Vec<EscalationJob>, EscalationError>;

    fn count_pending(&self) -> Result<i64, EscalationError>;
}
