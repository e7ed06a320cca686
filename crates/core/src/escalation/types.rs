//! Escalation data types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::order::{OrderStatus, Role};

/// What happens when an order has sat in a status for too long.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EscalationAction {
    /// Notify every operator of a role.
    Notify { role: Role },
    /// Move the order's pending tasks from one role to another.
    ReassignRole { from: Role, to: Role },
    /// Transition the order forward as the system.
    AutoApprove { to: OrderStatus },
    /// Transition the order back as the system.
    AutoReject { to: OrderStatus },
}

impl EscalationAction {
    pub fn kind(&self) -> &'static str {
        match self {
            EscalationAction::Notify { .. } => "notify",
            EscalationAction::ReassignRole { .. } => "reassign_role",
            EscalationAction::AutoApprove { .. } => "auto_approve",
            EscalationAction::AutoReject { .. } => "auto_reject",
        }
    }
}

impl fmt::Display for EscalationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EscalationAction::Notify { role } => write!(f, "notify {}", role),
            EscalationAction::ReassignRole { from, to } => {
                write!(f, "reassign {} tasks to {}", from, to)
            }
            EscalationAction::AutoApprove { to } => write!(f, "auto-approve to {}", to),
            EscalationAction::AutoReject { to } => write!(f, "auto-reject to {}", to),
        }
    }
}

/// Schedule `action` `after_hours` after an order enters `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationRule {
    pub status: OrderStatus,
    pub after_hours: f64,
    pub action: EscalationAction,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Fired,
    /// The order left the status before the job was due.
    Cancelled,
    Failed,
}

impl JobState {
    pub const ALL: [JobState; 4] = [
        JobState::Pending,
        JobState::Fired,
        JobState::Cancelled,
        JobState::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Fired => "fired",
            JobState::Cancelled => "cancelled",
            JobState::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobState::ALL
            .iter()
            .copied()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| format!("unknown job state: {}", s))
    }
}

/// A durable delayed escalation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationJob {
    pub id: String,
    pub order_id: String,
    /// Status the order was in when the job was scheduled.
    pub status: OrderStatus,
    pub action: EscalationAction,
    pub due_at: DateTime<Utc>,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// A job about to be scheduled.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEscalationJob {
    pub order_id: String,
    pub status: OrderStatus,
    pub action: EscalationAction,
    pub due_at: DateTime<Utc>,
}
