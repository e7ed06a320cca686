//! Post-commit transition hooks.
//!
//! Hooks run after the status change is committed and are not part of its
//! transaction. Each one is idempotent so a retried transition or a rerun
//! leaves the same result.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::assignment::AssignmentEngine;
use crate::audit::{AuditEvent, AuditHandle};
use crate::clock::Clock;
use crate::escalation::{EscalationError, EscalationRule, EscalationStore, NewEscalationJob};
use crate::notifier::{Notification, NotificationPriority, Notifier};
use crate::order::{Order, OrderStatus, Role};
use crate::pipeline::{hours, SchedulerError, TaskScheduler};
use crate::task::{TaskError, TaskStatus, TaskStore};

/// What a hook sees about the committed transition.
#[derive(Debug, Clone)]
pub struct HookContext {
    /// The order as committed, already in its new status.
    pub order: Order,
    pub from: OrderStatus,
    pub actor_id: String,
    pub role: Role,
}

#[derive(Debug, Error)]
pub enum HookError {
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Escalation(#[from] EscalationError),
}

#[async_trait]
pub trait TransitionHook: Send + Sync {
    /// Label for logs, metrics and audit events.
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: &HookContext) -> Result<(), HookError>;
}

/// Generates the production pipeline when the order is planned.
pub struct GeneratePipelineHook {
    scheduler: Arc<TaskScheduler>,
    audit: Option<AuditHandle>,
}

impl GeneratePipelineHook {
    pub fn new(scheduler: Arc<TaskScheduler>, audit: Option<AuditHandle>) -> Self {
        Self { scheduler, audit }
    }
}

#[async_trait]
impl TransitionHook for GeneratePipelineHook {
    fn name(&self) -> &'static str {
        "generate_pipeline"
    }

    async fn run(&self, ctx: &HookContext) -> Result<(), HookError> {
        let created = self.scheduler.generate_order_tasks(&ctx.order.id)?;
        if let Some(ref audit) = self.audit {
            audit
                .emit(AuditEvent::PipelineGenerated {
                    order_id: ctx.order.id.clone(),
                    method: ctx.order.production_method,
                    task_count: created.len(),
                })
                .await;
        }
        Ok(())
    }
}

/// Puts the order's open tasks on hold.
pub struct PauseTasksHook {
    tasks: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    audit: Option<AuditHandle>,
}

impl PauseTasksHook {
    pub fn new(tasks: Arc<dyn TaskStore>, clock: Arc<dyn Clock>, audit: Option<AuditHandle>) -> Self {
        Self { tasks, clock, audit }
    }
}

#[async_trait]
impl TransitionHook for PauseTasksHook {
    fn name(&self) -> &'static str {
        "pause_tasks"
    }

    async fn run(&self, ctx: &HookContext) -> Result<(), HookError> {
        let count = self
            .tasks
            .pause_open_for_order(&ctx.order.id, self.clock.now())?;
        info!("Paused {} tasks of order {}", count, ctx.order.id);
        if let Some(ref audit) = self.audit {
            audit
                .emit(AuditEvent::TasksPaused {
                    order_id: ctx.order.id.clone(),
                    count,
                })
                .await;
        }
        Ok(())
    }
}

/// Restores held tasks to the status they were paused from.
pub struct ResumeTasksHook {
    tasks: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    audit: Option<AuditHandle>,
}

impl ResumeTasksHook {
    pub fn new(tasks: Arc<dyn TaskStore>, clock: Arc<dyn Clock>, audit: Option<AuditHandle>) -> Self {
        Self { tasks, clock, audit }
    }
}

#[async_trait]
impl TransitionHook for ResumeTasksHook {
    fn name(&self) -> &'static str {
        "resume_tasks"
    }

    async fn run(&self, ctx: &HookContext) -> Result<(), HookError> {
        let count = self
            .tasks
            .resume_for_order(&ctx.order.id, self.clock.now())?;
        info!("Resumed {} tasks of order {}", count, ctx.order.id);
        if let Some(ref audit) = self.audit {
            audit
                .emit(AuditEvent::TasksResumed {
                    order_id: ctx.order.id.clone(),
                    count,
                })
                .await;
        }
        Ok(())
    }
}

/// Instantiates trigger templates for the status just entered.
pub struct TriggerTasksHook {
    scheduler: Arc<TaskScheduler>,
    audit: Option<AuditHandle>,
}

impl TriggerTasksHook {
    pub fn new(scheduler: Arc<TaskScheduler>, audit: Option<AuditHandle>) -> Self {
        Self { scheduler, audit }
    }
}

#[async_trait]
impl TransitionHook for TriggerTasksHook {
    fn name(&self) -> &'static str {
        "trigger_tasks"
    }

    async fn run(&self, ctx: &HookContext) -> Result<(), HookError> {
        let created = self.scheduler.instantiate_triggers(&ctx.order)?;
        if created.is_empty() {
            return Ok(());
        }
        if let Some(ref audit) = self.audit {
            audit
                .emit(AuditEvent::TriggerTasksCreated {
                    order_id: ctx.order.id.clone(),
                    status: ctx.order.status,
                    steps: created.into_iter().map(|t| t.step_name).collect(),
                })
                .await;
        }
        Ok(())
    }
}

/// Cancels escalations of the status left and schedules those of the
/// status entered.
pub struct EscalationHook {
    store: Arc<dyn EscalationStore>,
    rules: Vec<EscalationRule>,
    clock: Arc<dyn Clock>,
    audit: Option<AuditHandle>,
}

impl EscalationHook {
    pub fn new(
        store: Arc<dyn EscalationStore>,
        rules: Vec<EscalationRule>,
        clock: Arc<dyn Clock>,
        audit: Option<AuditHandle>,
    ) -> Self {
        Self {
            store,
            rules,
            clock,
            audit,
        }
    }
}

#[async_trait]
impl TransitionHook for EscalationHook {
    fn name(&self) -> &'static str {
        "escalations"
    }

    async fn run(&self, ctx: &HookContext) -> Result<(), HookError> {
        let now = self.clock.now();
        let cancelled = self.store.cancel_pending(&ctx.order.id, ctx.from, now)?;
        if cancelled > 0 {
            debug!(
                "Cancelled {} escalations of order {} on leaving {}",
                cancelled, ctx.order.id, ctx.from
            );
        }

        for rule in self.rules.iter().filter(|r| r.status == ctx.order.status) {
            let job = self.store.schedule(
                NewEscalationJob {
                    order_id: ctx.order.id.clone(),
                    status: rule.status,
                    action: rule.action.clone(),
                    due_at: now + hours(rule.after_hours),
                },
                now,
            )?;
            debug!(
                "Scheduled escalation {} ({}) for order {} at {}",
                job.id, job.action, job.order_id, job.due_at
            );
            if let Some(ref audit) = self.audit {
                audit
                    .emit(AuditEvent::EscalationScheduled {
                        job_id: job.id,
                        order_id: job.order_id,
                        status: job.status,
                        due_at: job.due_at,
                    })
                    .await;
            }
        }
        Ok(())
    }
}

/// Tells a role group that an order reached a status.
pub struct RoleNotificationHook {
    notifier: Arc<dyn Notifier>,
    routes: Vec<(OrderStatus, Role)>,
}

impl RoleNotificationHook {
    pub fn new(notifier: Arc<dyn Notifier>, routes: Vec<(OrderStatus, Role)>) -> Self {
        Self { notifier, routes }
    }

    /// Default routing of status entries to the roles that act next.
    pub fn standard_routes() -> Vec<(OrderStatus, Role)> {
        vec![
            (OrderStatus::DesignPending, Role::GraphicArtist),
            (OrderStatus::DesignApproval, Role::CsrAgent),
            (OrderStatus::Confirmed, Role::Manager),
            (OrderStatus::OnHold, Role::Manager),
            (OrderStatus::Qc, Role::QcInspector),
            (OrderStatus::Packing, Role::WarehouseStaff),
            (OrderStatus::ReadyForDelivery, Role::Driver),
        ]
    }
}

#[async_trait]
impl TransitionHook for RoleNotificationHook {
    fn name(&self) -> &'static str {
        "role_notifications"
    }

    async fn run(&self, ctx: &HookContext) -> Result<(), HookError> {
        let priority = if ctx.order.status == OrderStatus::OnHold {
            NotificationPriority::High
        } else {
            NotificationPriority::Normal
        };
        for (_, role) in self.routes.iter().filter(|(s, _)| *s == ctx.order.status) {
            self.notifier.notify(
                Notification::role(
                    *role,
                    format!("Order {} is now {}", ctx.order.id, ctx.order.status),
                )
                .with_priority(priority),
            );
        }
        Ok(())
    }
}

/// Assigns the order's unassigned pending tasks right away instead of
/// waiting for the next sweep.
pub struct AssignTasksHook {
    tasks: Arc<dyn TaskStore>,
    engine: Arc<AssignmentEngine>,
}

impl AssignTasksHook {
    pub fn new(tasks: Arc<dyn TaskStore>, engine: Arc<AssignmentEngine>) -> Self {
        Self { tasks, engine }
    }
}

#[async_trait]
impl TransitionHook for AssignTasksHook {
    fn name(&self) -> &'static str {
        "assign_tasks"
    }

    async fn run(&self, ctx: &HookContext) -> Result<(), HookError> {
        let waiting: Vec<_> = self
            .tasks
            .list_for_order(&ctx.order.id)?
            .into_iter()
            .filter(|t| t.status == TaskStatus::Pending && t.assigned_operator.is_none())
            .collect();
        if !waiting.is_empty() {
            self.engine.assign_released(&waiting).await;
        }
        Ok(())
    }
}
