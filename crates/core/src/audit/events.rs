use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assignment::StrategyKind;
use crate::order::{OrderStatus, Role};
use crate::pipeline::ProductionMethod;

/// Audit event types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    // System events
    ServiceStarted {
        version: String,
        config_hash: String,
    },
    ServiceStopped {
        reason: String,
    },

    // Order lifecycle
    OrderTransitioned {
        order_id: String,
        from: OrderStatus,
        to: OrderStatus,
        actor_id: String,
        role: Role,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        notes: Option<String>,
    },
    TransitionRejected {
        order_id: String,
        to: OrderStatus,
        actor_id: String,
        role: Role,
        reason: String,
    },
    /// A post-commit hook failed; the status change stands.
    TransitionHookFailed {
        order_id: String,
        hook: String,
        error: String,
    },

    // Pipeline and tasks
    PipelineGenerated {
        order_id: String,
        method: ProductionMethod,
        task_count: usize,
    },
    TriggerTasksCreated {
        order_id: String,
        status: OrderStatus,
        steps: Vec<String>,
    },
    TaskAssigned {
        task_id: String,
        order_id: String,
        step_name: String,
        operator_id: String,
        role: Role,
        strategy: StrategyKind,
    },
    TaskStarted {
        task_id: String,
        order_id: String,
        actor_id: String,
    },
    TaskCompleted {
        task_id: String,
        order_id: String,
        actor_id: String,
        /// Steps whose dependencies this completion satisfied.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        unblocked: Vec<String>,
    },
    TasksPaused {
        order_id: String,
        count: usize,
    },
    TasksResumed {
        order_id: String,
        count: usize,
    },
    AssignmentPassCompleted {
        scanned: usize,
        assigned: usize,
        no_operator: usize,
        blocked: usize,
    },

    // Escalations
    EscalationScheduled {
        job_id: String,
        order_id: String,
        status: OrderStatus,
        due_at: DateTime<Utc>,
    },
    EscalationFired {
        job_id: String,
        order_id: String,
        action: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl AuditEvent {
    /// Returns the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ServiceStarted { .. } => "service_started",
            Self::ServiceStopped { .. } => "service_stopped",
            Self::OrderTransitioned { .. } => "order_transitioned",
            Self::TransitionRejected { .. } => "transition_rejected",
            Self::TransitionHookFailed { .. } => "transition_hook_failed",
            Self::PipelineGenerated { .. } => "pipeline_generated",
            Self::TriggerTasksCreated { .. } => "trigger_tasks_created",
            Self::TaskAssigned { .. } => "task_assigned",
            Self::TaskStarted { .. } => "task_started",
            Self::TaskCompleted { .. } => "task_completed",
            Self::TasksPaused { .. } => "tasks_paused",
            Self::TasksResumed { .. } => "tasks_resumed",
            Self::AssignmentPassCompleted { .. } => "assignment_pass_completed",
            Self::EscalationScheduled { .. } => "escalation_scheduled",
            Self::EscalationFired { .. } => "escalation_fired",
        }
    }

    /// Extract order_id if this event concerns one order
    pub fn order_id(&self) -> Option<&str> {
        match self {
            Self::OrderTransitioned { order_id, .. }
            | Self::TransitionRejected { order_id, .. }
            | Self::TransitionHookFailed { order_id, .. }
            | Self::PipelineGenerated { order_id, .. }
            | Self::TriggerTasksCreated { order_id, .. }
            | Self::TaskAssigned { order_id, .. }
            | Self::TaskStarted { order_id, .. }
            | Self::TaskCompleted { order_id, .. }
            | Self::TasksPaused { order_id, .. }
            | Self::TasksResumed { order_id, .. }
            | Self::EscalationScheduled { order_id, .. }
            | Self::EscalationFired { order_id, .. } => Some(order_id),
            Self::ServiceStarted { .. }
            | Self::ServiceStopped { .. }
            | Self::AssignmentPassCompleted { .. } => None,
        }
    }

    /// Extract the acting user if this event was triggered by a user action
    pub fn actor_id(&self) -> Option<&str> {
        match self {
            Self::OrderTransitioned { actor_id, .. }
            | Self::TransitionRejected { actor_id, .. }
            | Self::TaskStarted { actor_id, .. }
            | Self::TaskCompleted { actor_id, .. } => Some(actor_id),
            _ => None,
        }
    }
}

/// A stored/forwarded audit record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    pub data: AuditEvent,
}

impl AuditRecord {
    pub fn new(timestamp: DateTime<Utc>, event: AuditEvent) -> Self {
        Self {
            timestamp,
            event_type: event.event_type().to_string(),
            order_id: event.order_id().map(String::from),
            actor_id: event.actor_id().map(String::from),
            data: event,
        }
    }
}
