//! Fulfillment engine implementation.
//!
//! Request-driven operations (transitions, task start/complete, manual
//! assignment) run inline. Two background loops poll on their own
//! intervals:
//! - Assignment sweep: one batch of unassigned pending tasks per tick
//! - Escalation sweep: due escalation jobs, earliest first

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::assignment::{
    AssignmentEngine, AssignmentOutcome, AssignmentPassSummary, OperatorStore,
    SqliteOperatorStore,
};
use crate::audit::{AuditEvent, AuditHandle};
use crate::clock::Clock;
use crate::config::Config;
use crate::escalation::{
    EscalationAction, EscalationJob, EscalationStore, JobState, SqliteEscalationStore,
};
use crate::metrics;
use crate::notifier::{Notification, NotificationPriority, Notifier};
use crate::order::{
    CreateOrderRequest, DesignAsset, Order, OrderFilter, OrderStatus, OrderStore, Role,
    SqliteOrderStore,
};
use crate::pipeline::{steps, DependencyResolver, PipelineCatalog, TaskScheduler};
use crate::state_machine::{
    AssignTasksHook, EdgeHook, EscalationHook, GeneratePipelineHook, OrderStateMachine,
    PauseTasksHook, ResumeTasksHook, RoleNotificationHook, TriggerTasksHook,
};
use crate::task::{SqliteTaskStore, Task, TaskStatus, TaskStore};

use super::config::OrchestratorConfig;
use super::types::{EngineStatus, EscalationSweepSummary, OrchestratorError, TaskCompletion};

/// Actor id recorded for transitions the engine drives itself.
const SYSTEM_ACTOR: &str = "system";

/// Actor id recorded for escalation transitions.
const ESCALATION_ACTOR: &str = "system:escalation";

/// Upper bound on chained auto-advances after one task event.
const AUTO_ADVANCE_LIMIT: usize = 4;

/// The persistence backends the engine runs on.
#[derive(Clone)]
pub struct EngineStores {
    pub orders: Arc<dyn OrderStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub operators: Arc<dyn OperatorStore>,
    pub escalations: Arc<dyn EscalationStore>,
}

impl EngineStores {
    /// SQLite stores sharing one database file.
    pub fn open(path: &Path) -> Result<Self, OrchestratorError> {
        Ok(Self {
            orders: Arc::new(SqliteOrderStore::new(path)?),
            tasks: Arc::new(SqliteTaskStore::new(path)?),
            operators: Arc::new(SqliteOperatorStore::new(path)?),
            escalations: Arc::new(SqliteEscalationStore::new(path)?),
        })
    }

    /// In-memory SQLite stores (useful for testing).
    pub fn in_memory() -> Result<Self, OrchestratorError> {
        Ok(Self {
            orders: Arc::new(SqliteOrderStore::in_memory()?),
            tasks: Arc::new(SqliteTaskStore::in_memory()?),
            operators: Arc::new(SqliteOperatorStore::in_memory()?),
            escalations: Arc::new(SqliteEscalationStore::in_memory()?),
        })
    }
}

/// Executes due escalation jobs.
#[derive(Clone)]
pub struct EscalationSweeper {
    orders: Arc<dyn OrderStore>,
    tasks: Arc<dyn TaskStore>,
    escalations: Arc<dyn EscalationStore>,
    state_machine: Arc<OrderStateMachine>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    audit: Option<AuditHandle>,
    batch_size: usize,
}

impl EscalationSweeper {
    /// Run every job due now. A job whose order has left the scheduled
    /// status is dropped without running.
    pub async fn sweep(&self) -> Result<EscalationSweepSummary, OrchestratorError> {
        let now = self.clock.now();
        let due = self.escalations.due(now, self.batch_size)?;
        let mut summary = EscalationSweepSummary::default();

        for job in due {
            let Some(order) = self.orders.get(&job.order_id)? else {
                self.escalations
                    .resolve(&job.id, JobState::Failed, Some("order not found"), now)?;
                summary.failed += 1;
                continue;
            };

            if order.status != job.status {
                debug!(
                    "Dropping escalation {} for order {}: now {} (scheduled for {})",
                    job.id, order.id, order.status, job.status
                );
                self.escalations
                    .resolve(&job.id, JobState::Cancelled, None, now)?;
                metrics::ESCALATIONS_STALE.inc();
                summary.stale += 1;
                continue;
            }

            let result = self.execute(&job, &order).await;
            let error = result.as_ref().err().map(|e| e.to_string());
            let (state, label) = match &error {
                None => (JobState::Fired, "success"),
                Some(_) => (JobState::Failed, "error"),
            };
            self.escalations
                .resolve(&job.id, state, error.as_deref(), self.clock.now())?;
            metrics::ESCALATIONS_FIRED
                .with_label_values(&[job.action.kind(), label])
                .inc();

            match &error {
                None => {
                    info!("Escalation {} fired for order {}: {}", job.id, order.id, job.action);
                    summary.fired += 1;
                }
                Some(e) => {
                    warn!("Escalation {} for order {} failed: {}", job.id, order.id, e);
                    summary.failed += 1;
                }
            }

            if let Some(ref audit) = self.audit {
                audit
                    .emit(AuditEvent::EscalationFired {
                        job_id: job.id.clone(),
                        order_id: job.order_id.clone(),
                        action: job.action.kind().to_string(),
                        success: error.is_none(),
                        error,
                    })
                    .await;
            }
        }

        Ok(summary)
    }

    async fn execute(&self, job: &EscalationJob, order: &Order) -> Result<(), OrchestratorError> {
        match &job.action {
            EscalationAction::Notify { role } => {
                self.notifier.notify(
                    Notification::role(
                        *role,
                        format!(
                            "Order {} has been {} since {}",
                            order.id,
                            order.status,
                            job.created_at.to_rfc3339()
                        ),
                    )
                    .with_priority(NotificationPriority::High),
                );
            }
            EscalationAction::ReassignRole { from, to } => {
                let moved = self
                    .tasks
                    .reassign_role(&order.id, *from, *to, self.clock.now())?;
                info!(
                    "Moved {} pending {} tasks of order {} to {}",
                    moved, from, order.id, to
                );
            }
            EscalationAction::AutoApprove { to } | EscalationAction::AutoReject { to } => {
                self.state_machine
                    .transition_order(
                        &order.id,
                        *to,
                        ESCALATION_ACTOR,
                        Role::System,
                        Some(format!("escalation {}", job.id)),
                    )
                    .await?;
            }
        }
        Ok(())
    }
}

/// The fulfillment engine: one per process, shared by `Arc`.
pub struct FulfillmentEngine {
    config: OrchestratorConfig,
    orders: Arc<dyn OrderStore>,
    tasks: Arc<dyn TaskStore>,
    operators: Arc<dyn OperatorStore>,
    escalations: Arc<dyn EscalationStore>,
    scheduler: Arc<TaskScheduler>,
    state_machine: Arc<OrderStateMachine>,
    assignment: Arc<AssignmentEngine>,
    sweeper: EscalationSweeper,
    clock: Arc<dyn Clock>,
    audit: Option<AuditHandle>,

    // Runtime state
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl FulfillmentEngine {
    /// Build the engine and register the configured operators and rules.
    pub fn new(
        config: &Config,
        stores: EngineStores,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        audit: Option<AuditHandle>,
    ) -> Result<Self, OrchestratorError> {
        let catalog = Arc::new(PipelineCatalog::with_overrides(config.pipelines.clone())?);
        let scheduler = Arc::new(TaskScheduler::new(
            catalog,
            Arc::clone(&stores.orders),
            Arc::clone(&stores.tasks),
            Arc::clone(&clock),
            config.scheduling.buffer_hours,
        ));
        let assignment = Arc::new(AssignmentEngine::new(
            Arc::clone(&stores.operators),
            Arc::clone(&stores.tasks),
            Arc::clone(&notifier),
            audit.clone(),
            Arc::clone(&clock),
            config.assignment.settings(),
        ));

        let state_machine = Arc::new(
            OrderStateMachine::new(
                Arc::clone(&stores.orders),
                Arc::clone(&stores.tasks),
                Arc::clone(&clock),
                audit.clone(),
            )
            .with_edge_hook(
                EdgeHook::GeneratePipeline,
                Arc::new(GeneratePipelineHook::new(
                    Arc::clone(&scheduler),
                    audit.clone(),
                )),
            )
            .with_edge_hook(
                EdgeHook::PauseTasks,
                Arc::new(PauseTasksHook::new(
                    Arc::clone(&stores.tasks),
                    Arc::clone(&clock),
                    audit.clone(),
                )),
            )
            .with_edge_hook(
                EdgeHook::ResumeTasks,
                Arc::new(ResumeTasksHook::new(
                    Arc::clone(&stores.tasks),
                    Arc::clone(&clock),
                    audit.clone(),
                )),
            )
            .with_entry_hook(Arc::new(TriggerTasksHook::new(
                Arc::clone(&scheduler),
                audit.clone(),
            )))
            .with_entry_hook(Arc::new(EscalationHook::new(
                Arc::clone(&stores.escalations),
                config.escalation.rules.clone(),
                Arc::clone(&clock),
                audit.clone(),
            )))
            .with_entry_hook(Arc::new(RoleNotificationHook::new(
                Arc::clone(&notifier),
                config.notifications.route_pairs(),
            )))
            .with_entry_hook(Arc::new(AssignTasksHook::new(
                Arc::clone(&stores.tasks),
                Arc::clone(&assignment),
            ))),
        );

        for operator in &config.assignment.operators {
            stores.operators.upsert_operator(operator)?;
        }
        for rule in &config.assignment.rules {
            stores.operators.upsert_rule(rule)?;
        }
        if !config.assignment.operators.is_empty() {
            info!(
                "Registered {} operators and {} assignment rules",
                config.assignment.operators.len(),
                config.assignment.rules.len()
            );
        }

        let sweeper = EscalationSweeper {
            orders: Arc::clone(&stores.orders),
            tasks: Arc::clone(&stores.tasks),
            escalations: Arc::clone(&stores.escalations),
            state_machine: Arc::clone(&state_machine),
            notifier,
            clock: Arc::clone(&clock),
            audit: audit.clone(),
            batch_size: config.escalation.batch_size,
        };

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config: config.orchestrator.clone(),
            orders: stores.orders,
            tasks: stores.tasks,
            operators: stores.operators,
            escalations: stores.escalations,
            scheduler,
            state_machine,
            assignment,
            sweeper,
            clock,
            audit,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        })
    }

    pub fn orders(&self) -> &Arc<dyn OrderStore> {
        &self.orders
    }

    pub fn tasks(&self) -> &Arc<dyn TaskStore> {
        &self.tasks
    }

    pub fn operators(&self) -> &Arc<dyn OperatorStore> {
        &self.operators
    }

    pub fn escalations(&self) -> &Arc<dyn EscalationStore> {
        &self.escalations
    }

    pub fn state_machine(&self) -> &OrderStateMachine {
        &self.state_machine
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    pub fn assignment(&self) -> &AssignmentEngine {
        &self.assignment
    }

    /// Start the background sweeps.
    pub async fn start(&self) {
        if !self.config.enabled {
            info!("Background sweeps disabled");
            return;
        }
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Fulfillment engine already running");
            return;
        }

        info!("Starting fulfillment engine");
        self.spawn_assignment_loop();
        self.spawn_escalation_loop();
        info!("Fulfillment engine started");
    }

    /// Stop the background sweeps.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        info!("Stopping fulfillment engine");

        // Signal shutdown to all workers
        let _ = self.shutdown_tx.send(());

        // Give workers a moment to finish current work
        tokio::time::sleep(Duration::from_millis(200)).await;

        info!("Fulfillment engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    fn spawn_assignment_loop(&self) {
        let running = Arc::clone(&self.running);
        let assignment = Arc::clone(&self.assignment);
        let interval = Duration::from_millis(self.config.assignment_poll_interval_ms);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Assignment loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Assignment loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        if let Err(e) = assignment.run_assignment_pass().await {
                            warn!("Assignment pass error: {}", e);
                        }
                    }
                }
            }
            info!("Assignment loop stopped");
        });
    }

    fn spawn_escalation_loop(&self) {
        let running = Arc::clone(&self.running);
        let sweeper = self.sweeper.clone();
        let interval = Duration::from_millis(self.config.escalation_poll_interval_ms);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Escalation loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Escalation loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        match sweeper.sweep().await {
                            Ok(summary) if summary != EscalationSweepSummary::default() => {
                                debug!("Escalation sweep: {:?}", summary);
                            }
                            Ok(_) => {}
                            Err(e) => warn!("Escalation sweep error: {}", e),
                        }
                    }
                }
            }
            info!("Escalation loop stopped");
        });
    }

    /// Record a new order in INTAKE.
    pub fn create_order(&self, request: CreateOrderRequest) -> Result<Order, OrchestratorError> {
        let order = self.orders.create(request, self.clock.now())?;
        info!(
            "Created order {} ({}, due {})",
            order.id, order.production_method, order.deadline
        );
        Ok(order)
    }

    pub fn add_design_asset(
        &self,
        order_id: &str,
        file_name: &str,
        uploaded_by: &str,
    ) -> Result<DesignAsset, OrchestratorError> {
        Ok(self.orders.add_design_asset(
            order_id,
            file_name,
            uploaded_by,
            self.clock.now(),
        )?)
    }

    /// Move an order to another status.
    pub async fn transition_order(
        &self,
        order_id: &str,
        to: OrderStatus,
        user_id: &str,
        role: Role,
        notes: Option<String>,
    ) -> Result<Order, OrchestratorError> {
        Ok(self
            .state_machine
            .transition_order(order_id, to, user_id, role, notes)
            .await?)
    }

    /// Put an in-progress order on hold, pausing its open tasks.
    pub async fn hold_order(
        &self,
        order_id: &str,
        user_id: &str,
        role: Role,
        notes: Option<String>,
    ) -> Result<Order, OrchestratorError> {
        self.transition_order(order_id, OrderStatus::OnHold, user_id, role, notes)
            .await
    }

    /// Resume a held order, restoring its tasks.
    pub async fn resume_order(
        &self,
        order_id: &str,
        user_id: &str,
        role: Role,
        notes: Option<String>,
    ) -> Result<Order, OrchestratorError> {
        self.transition_order(order_id, OrderStatus::InProgress, user_id, role, notes)
            .await
    }

    /// Load a task and its order, rejecting orders that are on hold or closed.
    fn load_actionable(&self, task_id: &str) -> Result<(Task, Order), OrchestratorError> {
        let task = self
            .tasks
            .get(task_id)?
            .ok_or_else(|| OrchestratorError::TaskNotFound(task_id.to_string()))?;
        let order = self
            .orders
            .get(&task.order_id)?
            .ok_or_else(|| OrchestratorError::OrderNotFound(task.order_id.clone()))?;

        if matches!(order.status, OrderStatus::OnHold | OrderStatus::Closed) {
            return Err(OrchestratorError::OrderNotActive {
                task_id: task.id,
                status: order.status,
            });
        }
        Ok((task, order))
    }

    fn ensure_dependencies(&self, task: &Task) -> Result<(), OrchestratorError> {
        let same_order = self.tasks.list_for_order(&task.order_id)?;
        let missing = DependencyResolver::missing_dependencies(task, &same_order);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(OrchestratorError::DependencyNotSatisfied {
                task_id: task.id.clone(),
                missing: missing.into_iter().map(String::from).collect(),
            })
        }
    }

    /// Start work on a pending task.
    pub async fn start_task(&self, task_id: &str, actor_id: &str) -> Result<Task, OrchestratorError> {
        let (task, order) = self.load_actionable(task_id)?;
        if task.status != TaskStatus::Pending {
            return Err(OrchestratorError::TaskNotActionable {
                task_id: task.id,
                status: task.status,
            });
        }
        self.ensure_dependencies(&task)?;

        let started = self
            .tasks
            .set_status(&task.id, TaskStatus::InProgress, self.clock.now())?;
        info!(
            "Task {} ({}) of order {} started by {}",
            started.id, started.step_name, started.order_id, actor_id
        );

        if let Some(ref audit) = self.audit {
            audit
                .emit(AuditEvent::TaskStarted {
                    task_id: started.id.clone(),
                    order_id: started.order_id.clone(),
                    actor_id: actor_id.to_string(),
                })
                .await;
        }

        if self.config.auto_advance && order.status == OrderStatus::ProductionPlanned {
            self.try_advance(&order.id, OrderStatus::InProgress).await;
        }

        Ok(started)
    }

    /// Complete a task, releasing its dependents and any deferred trigger
    /// tasks, then advance the order if the completion allows it.
    pub async fn complete_task(
        &self,
        task_id: &str,
        actor_id: &str,
    ) -> Result<TaskCompletion, OrchestratorError> {
        let (task, order) = self.load_actionable(task_id)?;
        if task.status == TaskStatus::OnHold {
            return Err(OrchestratorError::TaskNotActionable {
                task_id: task.id,
                status: task.status,
            });
        }
        if task.status == TaskStatus::Pending {
            self.ensure_dependencies(&task)?;
        }

        let completed = self
            .tasks
            .set_status(&task.id, TaskStatus::Completed, self.clock.now())?;
        metrics::TASKS_COMPLETED.inc();
        info!(
            "Task {} ({}) of order {} completed by {}",
            completed.id, completed.step_name, completed.order_id, actor_id
        );

        let same_order = self.tasks.list_for_order(&order.id)?;
        let released: Vec<Task> =
            DependencyResolver::newly_unblocked(&completed.step_name, &same_order)
                .into_iter()
                .cloned()
                .collect();
        let unblocked: Vec<String> = released.iter().map(|t| t.step_name.clone()).collect();
        if !released.is_empty() {
            debug!(
                "Completion of {} released {:?} on order {}",
                completed.step_name, unblocked, order.id
            );
            self.assign_all(&released).await;
        }

        let current = self
            .orders
            .get(&order.id)?
            .ok_or_else(|| OrchestratorError::OrderNotFound(order.id.clone()))?;
        let triggered = self.scheduler.instantiate_triggers(&current)?;
        if !triggered.is_empty() {
            self.assign_all(&triggered).await;
            if let Some(ref audit) = self.audit {
                audit
                    .emit(AuditEvent::TriggerTasksCreated {
                        order_id: current.id.clone(),
                        status: current.status,
                        steps: triggered.iter().map(|t| t.step_name.clone()).collect(),
                    })
                    .await;
            }
        }

        if let Some(ref audit) = self.audit {
            audit
                .emit(AuditEvent::TaskCompleted {
                    task_id: completed.id.clone(),
                    order_id: completed.order_id.clone(),
                    actor_id: actor_id.to_string(),
                    unblocked: unblocked.clone(),
                })
                .await;
        }

        let order_status = if self.config.auto_advance {
            self.advance_after_completion(&current.id).await?
        } else {
            current.status
        };

        Ok(TaskCompletion {
            task: completed,
            unblocked,
            triggered: triggered.into_iter().map(|t| t.step_name).collect(),
            order_status,
        })
    }

    async fn assign_all(&self, tasks: &[Task]) {
        for (task_id, outcome) in self.assignment.assign_released(tasks).await {
            if let AssignmentOutcome::Assigned { operator_id, .. } = outcome {
                debug!("Released task {} went to {}", task_id, operator_id);
            }
        }
    }

    /// Follow the auto-advance chain from the order's current status.
    async fn advance_after_completion(&self, order_id: &str) -> Result<OrderStatus, OrchestratorError> {
        let mut status = self
            .orders
            .get(order_id)?
            .ok_or_else(|| OrchestratorError::OrderNotFound(order_id.to_string()))?
            .status;
        for _ in 0..AUTO_ADVANCE_LIMIT {
            let tasks = self.tasks.list_for_order(order_id)?;
            let Some(target) = next_status(status, &tasks) else {
                break;
            };
            if !self.try_advance(order_id, target).await {
                break;
            }
            status = target;
        }
        Ok(status)
    }

    /// Take a system transition if the table and its guard allow it now.
    async fn try_advance(&self, order_id: &str, to: OrderStatus) -> bool {
        if let Err(e) = self
            .state_machine
            .check_transition(order_id, to, Role::System)
        {
            debug!("Order {} not advancing to {}: {}", order_id, to, e);
            return false;
        }
        match self
            .state_machine
            .transition_order(
                order_id,
                to,
                SYSTEM_ACTOR,
                Role::System,
                Some("auto-advance".to_string()),
            )
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!("Auto-advance of order {} to {} failed: {}", order_id, to, e);
                false
            }
        }
    }

    /// Assign one task now.
    pub async fn assign_task(&self, task_id: &str) -> Result<AssignmentOutcome, OrchestratorError> {
        Ok(self.assignment.assign_task(task_id).await?)
    }

    /// Assign a task to a chosen operator.
    pub async fn assign_manually(
        &self,
        task_id: &str,
        operator_id: &str,
    ) -> Result<Task, OrchestratorError> {
        Ok(self.assignment.assign_manually(task_id, operator_id).await?)
    }

    /// Run one assignment pass now.
    pub async fn run_assignment_pass(&self) -> Result<AssignmentPassSummary, OrchestratorError> {
        Ok(self.assignment.run_assignment_pass().await?)
    }

    /// Run one escalation sweep now.
    pub async fn run_escalation_sweep(&self) -> Result<EscalationSweepSummary, OrchestratorError> {
        self.sweeper.sweep().await
    }

    /// Get current engine status.
    ///
    /// A store failure is returned rather than reported as an empty backlog.
    pub fn status(&self) -> Result<EngineStatus, OrchestratorError> {
        let mut status = EngineStatus {
            running: self.is_running(),
            ..Default::default()
        };

        for order_status in OrderStatus::ALL {
            let count = self
                .orders
                .count(&OrderFilter::new().with_status(order_status))? as usize;
            if count > 0 {
                status.orders_by_status.insert(order_status, count);
            }
        }

        status.unassigned_tasks = self.tasks.count_unassigned_pending()? as usize;
        status.pending_escalations = self.escalations.count_pending()? as usize;
        Ok(status)
    }
}

/// The status a task event may move an order to; guards decide.
fn next_status(current: OrderStatus, tasks: &[Task]) -> Option<OrderStatus> {
    let done = |step: &str| {
        tasks
            .iter()
            .any(|t| t.step_name == step && t.status == TaskStatus::Completed)
    };
    match current {
        OrderStatus::InProgress => Some(OrderStatus::Qc),
        OrderStatus::Qc if done(steps::QUALITY_CONTROL) => Some(OrderStatus::Packing),
        OrderStatus::Packing if done(steps::PACKING) => Some(OrderStatus::ReadyForDelivery),
        OrderStatus::ReadyForDelivery if done(steps::DELIVERY) => Some(OrderStatus::Delivered),
        _ => None,
    }
}
