//! Assigns operators to unblocked tasks.

use std::sync::Arc;
use std::time::Instant;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::strategy::StrategyRegistry;
use super::types::{AssignmentRule, Availability, Candidate, StrategyKind};
use super::{OperatorError, OperatorStore};
use crate::audit::{AuditEvent, AuditHandle};
use crate::clock::Clock;
use crate::metrics;
use crate::notifier::{Notification, NotificationPriority, Notifier};
use crate::order::Role;
use crate::pipeline::DependencyResolver;
use crate::task::{Task, TaskError, TaskStatus, TaskStore};

#[derive(Debug, Error)]
pub enum AssignmentError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Operator not found: {0}")]
    OperatorNotFound(String),

    /// No operator of the role is currently eligible.
    #[error("No eligible {role} operator for task {task_id}")]
    Unavailable { task_id: String, role: Role },

    #[error("Task {task_id} has unfinished dependencies: {}", .missing.join(", "))]
    DependencyNotSatisfied {
        task_id: String,
        missing: Vec<String>,
    },

    #[error("Operator {operator_id} is a {operator_role}, task {task_id} needs a {task_role}")]
    RoleMismatch {
        task_id: String,
        operator_id: String,
        operator_role: Role,
        task_role: Role,
    },

    #[error("Task {0} is already assigned")]
    AlreadyAssigned(String),

    #[error("Task {task_id} is {status}, only pending tasks can be assigned")]
    NotPending { task_id: String, status: TaskStatus },

    #[error("No strategy registered for {0}")]
    StrategyMissing(StrategyKind),

    #[error(transparent)]
    Operator(#[from] OperatorError),

    #[error(transparent)]
    Task(#[from] TaskError),
}

/// Tunables for candidate evaluation and the batch pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssignmentSettings {
    /// Open-task count at which an operator becomes busy.
    pub busy_threshold: u32,
    /// Trailing window for efficiency scoring.
    pub efficiency_window_days: i64,
    /// Maximum tasks examined per pass.
    pub batch_size: usize,
}

impl Default for AssignmentSettings {
    fn default() -> Self {
        Self {
            busy_threshold: 5,
            efficiency_window_days: 30,
            batch_size: 20,
        }
    }
}

/// Result of trying to assign one task.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignmentOutcome {
    Assigned {
        operator_id: String,
        strategy: StrategyKind,
    },
    /// Someone else assigned it first.
    AlreadyAssigned,
    /// Left unassigned for the next pass.
    NoEligibleOperator,
    /// Dependencies are not completed yet.
    Blocked { missing: Vec<String> },
    /// Task is in progress, completed or on hold.
    NotPending,
}

impl AssignmentOutcome {
    fn label(&self) -> &'static str {
        match self {
            AssignmentOutcome::Assigned { .. } => "assigned",
            AssignmentOutcome::AlreadyAssigned => "already_assigned",
            AssignmentOutcome::NoEligibleOperator => "no_operator",
            AssignmentOutcome::Blocked { .. } => "blocked",
            AssignmentOutcome::NotPending => "not_pending",
        }
    }
}

/// Counters from one batch pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssignmentPassSummary {
    pub scanned: usize,
    pub assigned: usize,
    pub no_operator: usize,
    pub blocked: usize,
    pub errors: usize,
}

/// Picks operators for tasks using the per-role rule and strategy.
pub struct AssignmentEngine {
    operators: Arc<dyn OperatorStore>,
    tasks: Arc<dyn TaskStore>,
    notifier: Arc<dyn Notifier>,
    audit: Option<AuditHandle>,
    clock: Arc<dyn Clock>,
    strategies: StrategyRegistry,
    settings: AssignmentSettings,
}

impl AssignmentEngine {
    pub fn new(
        operators: Arc<dyn OperatorStore>,
        tasks: Arc<dyn TaskStore>,
        notifier: Arc<dyn Notifier>,
        audit: Option<AuditHandle>,
        clock: Arc<dyn Clock>,
        settings: AssignmentSettings,
    ) -> Self {
        Self {
            operators,
            tasks,
            notifier,
            audit,
            clock,
            strategies: StrategyRegistry::standard(),
            settings,
        }
    }

    /// Replace the strategy registry.
    pub fn with_strategies(mut self, strategies: StrategyRegistry) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn settings(&self) -> &AssignmentSettings {
        &self.settings
    }

    /// The configured rule for a role, or the default one.
    pub fn rule_for(&self, role: Role) -> Result<AssignmentRule, AssignmentError> {
        Ok(self
            .operators
            .get_rule(role)?
            .unwrap_or_else(|| AssignmentRule::default_for(role)))
    }

    /// Eligible candidates for a task, filtered and ordered per the rule.
    pub fn candidates_for(
        &self,
        task: &Task,
        rule: &AssignmentRule,
    ) -> Result<Vec<Candidate>, AssignmentError> {
        let window_start = self.clock.now() - Duration::days(self.settings.efficiency_window_days);

        let mut pool = Vec::new();
        for operator in self.operators.list_by_role(task.assigned_role)? {
            if !operator.active {
                continue;
            }
            let workload = self.tasks.operator_workload(&operator.id, window_start)?;
            let candidate = Candidate::evaluate(operator, workload, self.settings.busy_threshold);
            if rule.consider_availability && candidate.availability != Availability::Available {
                continue;
            }
            pool.push(candidate);
        }

        if rule.consider_skills && !task.required_skills.is_empty() {
            let skilled: Vec<Candidate> = pool
                .iter()
                .filter(|c| c.operator.has_all_skills(&task.required_skills))
                .cloned()
                .collect();
            if skilled.is_empty() {
                debug!(
                    "No {} operator holds all of {:?}, using full pool for task {}",
                    task.assigned_role, task.required_skills, task.id
                );
            } else {
                pool = skilled;
            }
        }

        if rule.consider_workload || rule.consider_efficiency {
            pool.sort_by(|a, b| {
                let by_hours = if rule.consider_workload {
                    a.workload.open_hours.total_cmp(&b.workload.open_hours)
                } else {
                    std::cmp::Ordering::Equal
                };
                let by_efficiency = if rule.consider_efficiency {
                    b.efficiency.cmp(&a.efficiency)
                } else {
                    std::cmp::Ordering::Equal
                };
                by_hours.then(by_efficiency)
            });
        }

        Ok(pool)
    }

    /// Choose the operator for a task without assigning it.
    pub fn select_operator(
        &self,
        task: &Task,
    ) -> Result<(Candidate, StrategyKind), AssignmentError> {
        let rule = self.rule_for(task.assigned_role)?;
        let strategy = self
            .strategies
            .get(rule.strategy)
            .ok_or(AssignmentError::StrategyMissing(rule.strategy))?;

        let pool = self.candidates_for(task, &rule)?;
        strategy
            .select(&pool, &task.required_skills)
            .cloned()
            .map(|c| (c, rule.strategy))
            .ok_or_else(|| AssignmentError::Unavailable {
                task_id: task.id.clone(),
                role: task.assigned_role,
            })
    }

    /// Try to assign a task. Only storage failures are errors; every
    /// business reason for not assigning is an outcome.
    pub async fn assign_task(&self, task_id: &str) -> Result<AssignmentOutcome, AssignmentError> {
        let task = self
            .tasks
            .get(task_id)?
            .ok_or_else(|| AssignmentError::TaskNotFound(task_id.to_string()))?;

        let outcome = self.try_assign(&task).await?;
        metrics::ASSIGNMENTS_TOTAL
            .with_label_values(&[task.assigned_role.as_str(), outcome.label()])
            .inc();
        Ok(outcome)
    }

    async fn try_assign(&self, task: &Task) -> Result<AssignmentOutcome, AssignmentError> {
        if task.assigned_operator.is_some() {
            return Ok(AssignmentOutcome::AlreadyAssigned);
        }
        if task.status != TaskStatus::Pending {
            return Ok(AssignmentOutcome::NotPending);
        }

        let same_order = self.tasks.list_for_order(&task.order_id)?;
        let missing: Vec<String> = DependencyResolver::missing_dependencies(task, &same_order)
            .into_iter()
            .map(String::from)
            .collect();
        if !missing.is_empty() {
            return Ok(AssignmentOutcome::Blocked { missing });
        }

        let (candidate, strategy) = match self.select_operator(task) {
            Ok(selected) => selected,
            Err(AssignmentError::Unavailable { .. }) => {
                debug!(
                    "No eligible {} for task {} ({}), leaving unassigned",
                    task.assigned_role, task.id, task.step_name
                );
                return Ok(AssignmentOutcome::NoEligibleOperator);
            }
            Err(e) => return Err(e),
        };

        let now = self.clock.now();
        if !self
            .tasks
            .assign_if_unassigned(&task.id, &candidate.operator.id, now)?
        {
            return Ok(AssignmentOutcome::AlreadyAssigned);
        }

        self.after_assignment(task, &candidate.operator.id, strategy)
            .await;

        Ok(AssignmentOutcome::Assigned {
            operator_id: candidate.operator.id,
            strategy,
        })
    }

    async fn after_assignment(&self, task: &Task, operator_id: &str, strategy: StrategyKind) {
        if let Err(e) = self.operators.touch_last_assigned(operator_id, self.clock.now()) {
            warn!("Failed to stamp last assignment for {}: {}", operator_id, e);
        }

        let priority = if task.priority >= 8 {
            NotificationPriority::High
        } else {
            NotificationPriority::Normal
        };
        self.notifier.notify(
            Notification::operator(
                operator_id,
                format!(
                    "New task {} for order {} due {}",
                    task.step_name,
                    task.order_id,
                    task.due_at.to_rfc3339()
                ),
            )
            .with_priority(priority),
        );

        if let Some(ref audit) = self.audit {
            audit
                .emit(AuditEvent::TaskAssigned {
                    task_id: task.id.clone(),
                    order_id: task.order_id.clone(),
                    step_name: task.step_name.clone(),
                    operator_id: operator_id.to_string(),
                    role: task.assigned_role,
                    strategy,
                })
                .await;
        }

        info!(
            "Assigned {} task {} (order {}) to {} via {}",
            task.step_name, task.id, task.order_id, operator_id, strategy
        );
    }

    /// Assign a specific operator, bypassing strategy selection.
    pub async fn assign_manually(
        &self,
        task_id: &str,
        operator_id: &str,
    ) -> Result<Task, AssignmentError> {
        let task = self
            .tasks
            .get(task_id)?
            .ok_or_else(|| AssignmentError::TaskNotFound(task_id.to_string()))?;
        let operator = self
            .operators
            .get_operator(operator_id)?
            .ok_or_else(|| AssignmentError::OperatorNotFound(operator_id.to_string()))?;

        if operator.role != task.assigned_role {
            return Err(AssignmentError::RoleMismatch {
                task_id: task.id,
                operator_id: operator.id,
                operator_role: operator.role,
                task_role: task.assigned_role,
            });
        }
        if task.status != TaskStatus::Pending {
            return Err(AssignmentError::NotPending {
                task_id: task.id,
                status: task.status,
            });
        }

        let same_order = self.tasks.list_for_order(&task.order_id)?;
        let missing = DependencyResolver::missing_dependencies(&task, &same_order);
        if !missing.is_empty() {
            return Err(AssignmentError::DependencyNotSatisfied {
                task_id: task.id.clone(),
                missing: missing.into_iter().map(String::from).collect(),
            });
        }

        if !self
            .tasks
            .assign_if_unassigned(&task.id, operator_id, self.clock.now())?
        {
            return Err(AssignmentError::AlreadyAssigned(task.id));
        }

        self.after_assignment(&task, operator_id, StrategyKind::RoundRobin)
            .await;

        self.tasks
            .get(task_id)?
            .ok_or_else(|| AssignmentError::TaskNotFound(task_id.to_string()))
    }

    /// Assign every unblocked task among the released ones.
    pub async fn assign_released(&self, tasks: &[Task]) -> Vec<(String, AssignmentOutcome)> {
        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            match self.assign_task(&task.id).await {
                Ok(outcome) => results.push((task.id.clone(), outcome)),
                Err(e) => warn!("Failed to assign task {}: {}", task.id, e),
            }
        }
        results
    }

    /// Scan one batch of assignable tasks and assign what can be.
    ///
    /// Tasks left unassigned are stamped so the next pass starts with ones it
    /// has not looked at yet.
    pub async fn run_assignment_pass(&self) -> Result<AssignmentPassSummary, AssignmentError> {
        let started = Instant::now();
        let batch = self.tasks.list_assignable(self.settings.batch_size)?;

        let mut summary = AssignmentPassSummary {
            scanned: batch.len(),
            ..Default::default()
        };

        for task in &batch {
            let left_unassigned = match self.assign_task(&task.id).await {
                Ok(AssignmentOutcome::Assigned { .. }) => {
                    summary.assigned += 1;
                    false
                }
                Ok(AssignmentOutcome::NoEligibleOperator) => {
                    summary.no_operator += 1;
                    true
                }
                // Dependencies changed since the batch was read.
                Ok(AssignmentOutcome::Blocked { .. }) => {
                    summary.blocked += 1;
                    true
                }
                Ok(_) => false,
                Err(e) => {
                    warn!("Assignment of task {} failed: {}", task.id, e);
                    summary.errors += 1;
                    true
                }
            };

            if left_unassigned {
                if let Err(e) = self.tasks.mark_attempted(&task.id, self.clock.now()) {
                    warn!("Failed to stamp assignment attempt for {}: {}", task.id, e);
                }
            }
        }

        metrics::ASSIGNMENT_PASS_DURATION
            .with_label_values(&[])
            .observe(started.elapsed().as_secs_f64());

        if summary.scanned > 0 {
            debug!(
                "Assignment pass: scanned {}, assigned {}, no operator {}, blocked {}",
                summary.scanned, summary.assigned, summary.no_operator, summary.blocked
            );
            if let Some(ref audit) = self.audit {
                audit
                    .emit(AuditEvent::AssignmentPassCompleted {
                        scanned: summary.scanned,
                        assigned: summary.assigned,
                        no_operator: summary.no_operator,
                        blocked: summary.blocked,
                    })
                    .await;
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::{Operator, SqliteOperatorStore};
    use crate::order::OrderStatus;
    use crate::pipeline::ProductionMethod;
    use crate::task::{NewTask, SqliteTaskStore, TaskDetails};
    use crate::testing::{ManualClock, MockNotifier};
    use chrono::{DateTime, Utc};

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-06-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    struct Fixture {
        engine: AssignmentEngine,
        operators: Arc<SqliteOperatorStore>,
        tasks: Arc<SqliteTaskStore>,
        notifier: Arc<MockNotifier>,
    }

    fn fixture() -> Fixture {
        let operators = Arc::new(SqliteOperatorStore::in_memory().unwrap());
        let tasks = Arc::new(SqliteTaskStore::in_memory().unwrap());
        let notifier = Arc::new(MockNotifier::new());
        let engine = AssignmentEngine::new(
            operators.clone(),
            tasks.clone(),
            notifier.clone(),
            None,
            Arc::new(ManualClock::new(now())),
            AssignmentSettings::default(),
        );
        Fixture {
            engine,
            operators,
            tasks,
            notifier,
        }
    }

    fn new_task(order_id: &str, step: &str, role: Role, hours: f64, deps: &[&str]) -> NewTask {
        NewTask {
            order_id: order_id.to_string(),
            step_name: step.to_string(),
            position: 0,
            assigned_role: role,
            due_at: now() + Duration::days(3),
            start_at: now(),
            estimated_hours: hours,
            priority: 5,
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            required_skills: vec![],
            required: true,
            details: TaskDetails::PipelineStep {
                method: ProductionMethod::Dtf,
            },
        }
    }

    fn triggered(order_id: &str, step: &str, role: Role, hours: f64) -> NewTask {
        NewTask {
            details: TaskDetails::Triggered {
                trigger_status: OrderStatus::InProgress,
            },
            ..new_task(order_id, step, role, hours, &[])
        }
    }

    /// Give an operator `hours` of open work on a throwaway order.
    fn load_operator(f: &Fixture, operator_id: &str, role: Role, hours: &[f64]) {
        for (i, h) in hours.iter().enumerate() {
            let task = f
                .tasks
                .insert_triggered(
                    triggered(
                        &format!("load-{}", operator_id),
                        &format!("LOAD_{}", i),
                        role,
                        *h,
                    ),
                    now(),
                )
                .unwrap()
                .unwrap();
            f.tasks
                .assign_if_unassigned(&task.id, operator_id, now())
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_default_rule_picks_least_loaded_and_notifies() {
        let f = fixture();
        f.operators
            .upsert_operator(&Operator::new("c1", "Cy", Role::Cutter))
            .unwrap();
        f.operators
            .upsert_operator(&Operator::new("c2", "Di", Role::Cutter))
            .unwrap();
        load_operator(&f, "c1", Role::Cutter, &[4.0]);

        let task = f
            .tasks
            .replace_pipeline("o1", vec![new_task("o1", "CUTTING", Role::Cutter, 6.0, &[])], now())
            .unwrap()
            .remove(0);

        let outcome = f.engine.assign_task(&task.id).await.unwrap();
        assert_eq!(
            outcome,
            AssignmentOutcome::Assigned {
                operator_id: "c2".to_string(),
                strategy: StrategyKind::LeastLoaded
            }
        );

        let stored = f.tasks.get(&task.id).unwrap().unwrap();
        assert_eq!(stored.assigned_operator.as_deref(), Some("c2"));
        assert!(f
            .operators
            .get_operator("c2")
            .unwrap()
            .unwrap()
            .last_assigned_at
            .is_some());
        assert_eq!(f.notifier.notifications_for_operator("c2").len(), 1);
    }

    #[tokio::test]
    async fn test_blocked_task_is_not_assigned() {
        let f = fixture();
        f.operators
            .upsert_operator(&Operator::new("s1", "Sy", Role::Sewer))
            .unwrap();
        let tasks = f
            .tasks
            .replace_pipeline(
                "o1",
                vec![
                    new_task("o1", "CUTTING", Role::Cutter, 6.0, &[]),
                    NewTask {
                        position: 1,
                        ..new_task("o1", "SEWING", Role::Sewer, 8.0, &["CUTTING"])
                    },
                ],
                now(),
            )
            .unwrap();

        let outcome = f.engine.assign_task(&tasks[1].id).await.unwrap();
        assert_eq!(
            outcome,
            AssignmentOutcome::Blocked {
                missing: vec!["CUTTING".to_string()]
            }
        );
        assert!(f.tasks.get(&tasks[1].id).unwrap().unwrap().assigned_operator.is_none());

        let err = f.engine.assign_manually(&tasks[1].id, "s1").await.unwrap_err();
        assert!(matches!(err, AssignmentError::DependencyNotSatisfied { .. }));
    }

    #[tokio::test]
    async fn test_busy_operators_are_skipped() {
        let f = fixture();
        f.operators
            .upsert_operator(&Operator::new("p1", "Pa", Role::Printer))
            .unwrap();
        load_operator(&f, "p1", Role::Printer, &[1.0, 1.0, 1.0, 1.0, 1.0]);

        let task = f
            .tasks
            .replace_pipeline(
                "o1",
                vec![new_task("o1", "PRINTING", Role::Printer, 8.0, &[])],
                now(),
            )
            .unwrap()
            .remove(0);

        let outcome = f.engine.assign_task(&task.id).await.unwrap();
        assert_eq!(outcome, AssignmentOutcome::NoEligibleOperator);

        let err = f.engine.select_operator(&task).unwrap_err();
        assert!(matches!(err, AssignmentError::Unavailable { role: Role::Printer, .. }));
    }

    #[tokio::test]
    async fn test_inactive_operators_never_chosen() {
        let f = fixture();
        let mut op = Operator::new("d1", "Dee", Role::Driver);
        op.active = false;
        f.operators.upsert_operator(&op).unwrap();
        f.operators
            .upsert_rule(&AssignmentRule {
                consider_availability: false,
                ..AssignmentRule::default_for(Role::Driver)
            })
            .unwrap();

        let task = f
            .tasks
            .replace_pipeline("o1", vec![new_task("o1", "DELIVERY", Role::Driver, 4.0, &[])], now())
            .unwrap()
            .remove(0);

        assert_eq!(
            f.engine.assign_task(&task.id).await.unwrap(),
            AssignmentOutcome::NoEligibleOperator
        );
    }

    #[tokio::test]
    async fn test_skill_filter_falls_back_to_full_pool() {
        let f = fixture();
        f.operators
            .upsert_operator(&Operator::new("e1", "Em", Role::Embroiderer).with_skills(&["applique"]))
            .unwrap();
        f.operators
            .upsert_rule(&AssignmentRule {
                role: Role::Embroiderer,
                strategy: StrategyKind::SkillBased,
                consider_workload: false,
                consider_skills: true,
                consider_efficiency: false,
                consider_availability: true,
            })
            .unwrap();

        let mut new = new_task("o1", "EMBROIDERY", Role::Embroiderer, 10.0, &[]);
        new.required_skills = vec!["embroidery".to_string()];
        let task = f.tasks.replace_pipeline("o1", vec![new], now()).unwrap().remove(0);

        let rule = f.engine.rule_for(Role::Embroiderer).unwrap();
        assert_eq!(f.engine.candidates_for(&task, &rule).unwrap().len(), 1);

        let outcome = f.engine.assign_task(&task.id).await.unwrap();
        assert!(matches!(
            outcome,
            AssignmentOutcome::Assigned { ref operator_id, .. } if operator_id == "e1"
        ));
    }

    #[tokio::test]
    async fn test_skill_filter_narrows_pool() {
        let f = fixture();
        f.operators
            .upsert_operator(&Operator::new("p1", "Pa", Role::Printer))
            .unwrap();
        f.operators
            .upsert_operator(&Operator::new("p2", "Pe", Role::Printer).with_skills(&["dtf"]))
            .unwrap();
        f.operators
            .upsert_rule(&AssignmentRule {
                consider_skills: true,
                ..AssignmentRule::default_for(Role::Printer)
            })
            .unwrap();

        let mut new = new_task("o1", "DTF_PRINTING", Role::Printer, 4.0, &[]);
        new.required_skills = vec!["dtf".to_string()];
        let task = f.tasks.replace_pipeline("o1", vec![new], now()).unwrap().remove(0);

        let (chosen, _) = f.engine.select_operator(&task).unwrap();
        assert_eq!(chosen.operator.id, "p2");
    }

    #[tokio::test]
    async fn test_workload_flag_orders_round_robin_ties() {
        let f = fixture();
        f.operators
            .upsert_operator(&Operator::new("w1", "Wa", Role::WarehouseStaff))
            .unwrap();
        f.operators
            .upsert_operator(&Operator::new("w2", "Wo", Role::WarehouseStaff))
            .unwrap();
        load_operator(&f, "w1", Role::WarehouseStaff, &[3.0]);
        f.operators
            .upsert_rule(&AssignmentRule {
                role: Role::WarehouseStaff,
                strategy: StrategyKind::RoundRobin,
                consider_workload: true,
                consider_skills: false,
                consider_efficiency: false,
                consider_availability: true,
            })
            .unwrap();

        let task = f
            .tasks
            .replace_pipeline(
                "o1",
                vec![new_task("o1", "PACKING", Role::WarehouseStaff, 3.0, &[])],
                now(),
            )
            .unwrap()
            .remove(0);

        // Neither was ever assigned by the engine; lower load breaks the tie.
        let (chosen, strategy) = f.engine.select_operator(&task).unwrap();
        assert_eq!(strategy, StrategyKind::RoundRobin);
        assert_eq!(chosen.operator.id, "w2");
    }

    #[tokio::test]
    async fn test_conditional_assignment_prevents_double_assign() {
        let f = fixture();
        f.operators
            .upsert_operator(&Operator::new("c1", "Cy", Role::Cutter))
            .unwrap();
        let task = f
            .tasks
            .replace_pipeline("o1", vec![new_task("o1", "CUTTING", Role::Cutter, 6.0, &[])], now())
            .unwrap()
            .remove(0);

        f.tasks.assign_if_unassigned(&task.id, "someone", now()).unwrap();

        assert_eq!(
            f.engine.assign_task(&task.id).await.unwrap(),
            AssignmentOutcome::AlreadyAssigned
        );
        assert!(f.notifier.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_manual_assignment_checks_role() {
        let f = fixture();
        f.operators
            .upsert_operator(&Operator::new("d1", "Dee", Role::Driver))
            .unwrap();
        let task = f
            .tasks
            .replace_pipeline("o1", vec![new_task("o1", "CUTTING", Role::Cutter, 6.0, &[])], now())
            .unwrap()
            .remove(0);

        let err = f.engine.assign_manually(&task.id, "d1").await.unwrap_err();
        assert!(matches!(err, AssignmentError::RoleMismatch { .. }));
    }

    #[tokio::test]
    async fn test_assignment_pass_counts_outcomes() {
        let f = fixture();
        f.operators
            .upsert_operator(&Operator::new("c1", "Cy", Role::Cutter))
            .unwrap();
        f.tasks
            .replace_pipeline(
                "o1",
                vec![
                    new_task("o1", "CUTTING", Role::Cutter, 6.0, &[]),
                    NewTask {
                        position: 1,
                        ..new_task("o1", "SEWING", Role::Sewer, 8.0, &["CUTTING"])
                    },
                    NewTask {
                        position: 2,
                        ..new_task("o1", "GRAPHIC_DESIGN", Role::GraphicArtist, 4.0, &[])
                    },
                ],
                now(),
            )
            .unwrap();

        // Sewing waits on cutting and never enters the batch.
        let summary = f.engine.run_assignment_pass().await.unwrap();
        assert_eq!(
            summary,
            AssignmentPassSummary {
                scanned: 2,
                assigned: 1,
                no_operator: 1,
                blocked: 0,
                errors: 0,
            }
        );

        // The assigned task drops out of the next scan.
        let again = f.engine.run_assignment_pass().await.unwrap();
        assert_eq!(again.scanned, 1);
        assert_eq!(again.no_operator, 1);
        assert_eq!(again.assigned, 0);
    }

    #[tokio::test]
    async fn test_blocked_backlog_does_not_starve_assignable_task() {
        let f = fixture();
        f.operators
            .upsert_operator(&Operator::new("c1", "Cy", Role::Cutter))
            .unwrap();

        // More urgent sewing work than one batch holds, all waiting on
        // cutting that has not happened yet.
        for i in 0..25 {
            let order_id = format!("o{}", i);
            f.tasks
                .replace_pipeline(
                    &order_id,
                    vec![NewTask {
                        priority: 10,
                        ..new_task(&order_id, "SEWING", Role::Sewer, 2.0, &["CUTTING"])
                    }],
                    now(),
                )
                .unwrap();
        }
        let cutting = f
            .tasks
            .replace_pipeline(
                "cut",
                vec![new_task("cut", "CUTTING", Role::Cutter, 2.0, &[])],
                now(),
            )
            .unwrap()
            .remove(0);

        for _ in 0..3 {
            let summary = f.engine.run_assignment_pass().await.unwrap();
            assert_eq!(summary.blocked, 0);
        }

        let cutting = f.tasks.get(&cutting.id).unwrap().unwrap();
        assert_eq!(cutting.assigned_operator.as_deref(), Some("c1"));
        assert_eq!(f.tasks.count_unassigned_pending().unwrap(), 25);
    }

    #[tokio::test]
    async fn test_passes_keep_progressing_through_large_backlog() {
        let f = fixture();
        f.operators
            .upsert_operator(&Operator::new("g1", "Gus", Role::GraphicArtist))
            .unwrap();
        f.operators
            .upsert_rule(&AssignmentRule {
                consider_availability: false,
                ..AssignmentRule::default_for(Role::GraphicArtist)
            })
            .unwrap();

        // 12 orders: a blocked sewing step, an unstaffed cutting step and an
        // assignable design step. 24 unassigned tasks outrank the design work.
        for i in 0..12 {
            let order_id = format!("o{:02}", i);
            f.tasks
                .replace_pipeline(
                    &order_id,
                    vec![
                        NewTask {
                            priority: 9,
                            ..new_task(&order_id, "CUTTING", Role::Cutter, 1.0, &[])
                        },
                        NewTask {
                            position: 1,
                            priority: 9,
                            ..new_task(&order_id, "SEWING", Role::Sewer, 1.0, &["CUTTING"])
                        },
                        NewTask {
                            position: 2,
                            priority: 1,
                            ..new_task(&order_id, "GRAPHIC_DESIGN", Role::GraphicArtist, 0.5, &[])
                        },
                    ],
                    now(),
                )
                .unwrap();
        }
        assert_eq!(f.tasks.count_unassigned_pending().unwrap(), 36);

        let first = f.engine.run_assignment_pass().await.unwrap();
        assert_eq!(first.scanned, 20);
        assert_eq!(first.no_operator, 12);
        assert_eq!(first.assigned, 8);
        assert_eq!(first.blocked, 0);

        // The unstaffed cutting tasks were already tried, so the remaining
        // design work goes first.
        let second = f.engine.run_assignment_pass().await.unwrap();
        assert_eq!(second.assigned, 4);

        let designs_left = (0..12)
            .flat_map(|i| f.tasks.list_for_order(&format!("o{:02}", i)).unwrap())
            .filter(|t| t.step_name == "GRAPHIC_DESIGN" && t.assigned_operator.is_none())
            .count();
        assert_eq!(designs_left, 0);
        assert_eq!(f.notifier.notifications_for_operator("g1").len(), 12);
    }
}
