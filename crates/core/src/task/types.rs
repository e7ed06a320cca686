//! Task data types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::order::{OrderStatus, Role};
use crate::pipeline::ProductionMethod;

/// Status of a task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    OnHold,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::OnHold,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::OnHold => "on_hold",
        }
    }

    /// Open tasks count toward an operator's workload.
    pub fn is_open(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::InProgress)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .iter()
            .copied()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| format!("unknown task status: {}", s))
    }
}

/// Where a task came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskDetails {
    /// Generated with the order's production pipeline.
    PipelineStep { method: ProductionMethod },

    /// Instantiated when the order entered a trigger status.
    Triggered { trigger_status: OrderStatus },
}

impl TaskDetails {
    pub fn kind(&self) -> &'static str {
        match self {
            TaskDetails::PipelineStep { .. } => "pipeline_step",
            TaskDetails::Triggered { .. } => "triggered",
        }
    }
}

/// A concrete unit of work for one order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Unique identifier (UUID).
    pub id: String,
    pub order_id: String,
    pub step_name: String,
    /// Index of the step within its pipeline.
    pub position: u32,
    pub assigned_role: Role,
    pub assigned_operator: Option<String>,
    pub status: TaskStatus,
    /// Status to restore when the order resumes from hold.
    pub paused_from: Option<TaskStatus>,
    pub due_at: DateTime<Utc>,
    pub start_at: DateTime<Utc>,
    pub estimated_hours: f64,
    /// 1 (lowest) to 10 (highest).
    pub priority: u8,
    /// Step names of same-order tasks that must complete first.
    pub dependencies: Vec<String>,
    pub required_skills: Vec<String>,
    /// Optional tasks do not block closing the order.
    pub required: bool,
    pub details: TaskDetails,
    pub assigned_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A task about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub order_id: String,
    pub step_name: String,
    pub position: u32,
    pub assigned_role: Role,
    pub due_at: DateTime<Utc>,
    pub start_at: DateTime<Utc>,
    pub estimated_hours: f64,
    pub priority: u8,
    pub dependencies: Vec<String>,
    pub required_skills: Vec<String>,
    pub required: bool,
    pub details: TaskDetails,
}

/// Live workload figures for one operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OperatorWorkload {
    /// Pending or in-progress tasks assigned to the operator.
    pub open_tasks: u32,
    /// Sum of estimated hours across open tasks.
    pub open_hours: f64,
    /// Tasks completed inside the efficiency window.
    pub completed_recent: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_statuses() {
        assert!(TaskStatus::Pending.is_open());
        assert!(TaskStatus::InProgress.is_open());
        assert!(!TaskStatus::Completed.is_open());
        assert!(!TaskStatus::OnHold.is_open());
    }

    #[test]
    fn test_details_serialization() {
        let details = TaskDetails::Triggered {
            trigger_status: OrderStatus::Delivered,
        };
        let json = serde_json::to_string(&details).unwrap();
        assert_eq!(json, r#"{"type":"triggered","trigger_status":"delivered"}"#);

        let parsed: TaskDetails =
            serde_json::from_str(r#"{"type":"pipeline_step","method":"dtf"}"#).unwrap();
        assert_eq!(
            parsed,
            TaskDetails::PipelineStep {
                method: ProductionMethod::Dtf
            }
        );
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("on_hold".parse::<TaskStatus>().unwrap(), TaskStatus::OnHold);
        assert!("done".parse::<TaskStatus>().is_err());
    }
}
