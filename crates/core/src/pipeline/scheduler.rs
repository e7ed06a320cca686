//! Backward scheduling and priority scoring for order tasks.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, info};

use super::catalog::{steps, PipelineCatalog, ProductionMethod, StepTemplate};
use super::dependency::DependencyResolver;
use crate::clock::Clock;
use crate::metrics;
use crate::order::{Order, OrderError, OrderStore};
use crate::task::{NewTask, Task, TaskDetails, TaskError, TaskStore};

/// Default margin between consecutive steps.
pub const DEFAULT_BUFFER_HOURS: f64 = 2.0;

const BASE_PRIORITY: i32 = 5;
const MIN_PRIORITY: i32 = 1;
const MAX_PRIORITY: i32 = 10;

/// Errors from task generation.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("No pipeline defined for production method {0}")]
    NoPipeline(ProductionMethod),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Task(#[from] TaskError),
}

/// Convert fractional hours to a duration with millisecond precision.
pub fn hours(value: f64) -> Duration {
    Duration::milliseconds((value * 3_600_000.0).round() as i64)
}

/// Start and due time of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepWindow {
    pub start_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
}

/// Walk the steps backward from `deadline`.
///
/// The last step is due at the deadline; each earlier step is due one
/// `buffer` before the next step starts. Windows are returned in pipeline order.
pub fn schedule_backward(
    steps: &[StepTemplate],
    deadline: DateTime<Utc>,
    buffer: Duration,
) -> Vec<StepWindow> {
    let mut windows = Vec::with_capacity(steps.len());
    let mut due_at = deadline;

    for step in steps.iter().rev() {
        let start_at = due_at - hours(step.estimated_hours);
        windows.push(StepWindow { start_at, due_at });
        due_at = start_at - buffer;
    }

    windows.reverse();
    windows
}

/// Priority score in 1..=10 for a task due at `due_at`.
pub fn compute_priority(
    step_name: &str,
    due_at: DateTime<Utc>,
    now: DateTime<Utc>,
    modifier: i32,
) -> u8 {
    let days_to_due = (due_at - now).num_milliseconds() as f64 / 86_400_000.0;

    let mut score = BASE_PRIORITY;
    if days_to_due <= 1.0 {
        score += 3;
    } else if days_to_due <= 3.0 {
        score += 2;
    } else if days_to_due <= 7.0 {
        score += 1;
    }

    if step_name == steps::QUALITY_CONTROL || step_name == steps::DELIVERY {
        score += 1;
    }

    score.saturating_add(modifier).clamp(MIN_PRIORITY, MAX_PRIORITY) as u8
}

/// Build the full task set for an order's pipeline.
pub fn plan_pipeline(
    order: &Order,
    steps: &[StepTemplate],
    now: DateTime<Utc>,
    buffer: Duration,
) -> Vec<NewTask> {
    schedule_backward(steps, order.deadline, buffer)
        .into_iter()
        .zip(steps)
        .enumerate()
        .map(|(position, (window, step))| NewTask {
            order_id: order.id.clone(),
            step_name: step.name.clone(),
            position: position as u32,
            assigned_role: step.role,
            due_at: window.due_at,
            start_at: window.start_at,
            estimated_hours: step.estimated_hours,
            priority: compute_priority(&step.name, window.due_at, now, order.priority_modifier),
            dependencies: step.dependencies.clone(),
            required_skills: step.required_skills.clone(),
            required: step.required,
            details: TaskDetails::PipelineStep {
                method: order.production_method,
            },
        })
        .collect()
}

/// Build a task for a trigger template. Triggered work starts now.
pub fn plan_trigger(
    order: &Order,
    template: &StepTemplate,
    position: u32,
    now: DateTime<Utc>,
) -> NewTask {
    let due_at = now + hours(template.estimated_hours);
    NewTask {
        order_id: order.id.clone(),
        step_name: template.name.clone(),
        position,
        assigned_role: template.role,
        due_at,
        start_at: now,
        estimated_hours: template.estimated_hours,
        priority: compute_priority(&template.name, due_at, now, order.priority_modifier),
        dependencies: template.dependencies.clone(),
        required_skills: template.required_skills.clone(),
        required: template.required,
        details: TaskDetails::Triggered {
            trigger_status: order.status,
        },
    }
}

/// Turns catalog entries into stored tasks.
pub struct TaskScheduler {
    catalog: Arc<PipelineCatalog>,
    orders: Arc<dyn OrderStore>,
    tasks: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    buffer: Duration,
}

impl TaskScheduler {
    pub fn new(
        catalog: Arc<PipelineCatalog>,
        orders: Arc<dyn OrderStore>,
        tasks: Arc<dyn TaskStore>,
        clock: Arc<dyn Clock>,
        buffer_hours: f64,
    ) -> Self {
        Self {
            catalog,
            orders,
            tasks,
            clock,
            buffer: hours(buffer_hours),
        }
    }

    pub fn catalog(&self) -> &PipelineCatalog {
        &self.catalog
    }

    /// (Re)generate the production pipeline for an order.
    ///
    /// Any previous pipeline tasks of the order are replaced in one transaction.
    pub fn generate_order_tasks(&self, order_id: &str) -> Result<Vec<Task>, SchedulerError> {
        let order = self
            .orders
            .get(order_id)?
            .ok_or_else(|| SchedulerError::OrderNotFound(order_id.to_string()))?;

        let steps = self
            .catalog
            .steps_for(order.production_method)
            .ok_or(SchedulerError::NoPipeline(order.production_method))?;

        let now = self.clock.now();
        let planned = plan_pipeline(&order, steps, now, self.buffer);
        let created = self.tasks.replace_pipeline(&order.id, planned, now)?;

        metrics::PIPELINES_GENERATED
            .with_label_values(&[order.production_method.as_str()])
            .inc();
        metrics::TASKS_CREATED
            .with_label_values(&["pipeline_step"])
            .inc_by(created.len() as u64);

        info!(
            "Generated {} pipeline tasks for order {} ({})",
            created.len(),
            order.id,
            order.production_method
        );

        Ok(created)
    }

    /// Instantiate the trigger templates for the order's current status whose
    /// dependencies are satisfied. Templates already instantiated for the
    /// order are skipped; blocked ones stay deferred.
    pub fn instantiate_triggers(&self, order: &Order) -> Result<Vec<Task>, SchedulerError> {
        let templates: Vec<_> = self.catalog.triggers_for(order.status).collect();
        if templates.is_empty() {
            return Ok(Vec::new());
        }

        let existing = self.tasks.list_for_order(&order.id)?;
        let now = self.clock.now();
        let mut created = Vec::new();

        for (position, template) in templates.into_iter().enumerate() {
            if existing.iter().any(|t| t.step_name == template.name) {
                continue;
            }
            if !DependencyResolver::is_satisfied(&template.dependencies, &existing) {
                debug!(
                    "Deferring trigger template {} for order {}: dependencies outstanding",
                    template.name, order.id
                );
                continue;
            }

            let new_task = plan_trigger(order, template, position as u32, now);
            if let Some(task) = self.tasks.insert_triggered(new_task, now)? {
                info!(
                    "Instantiated {} for order {} on {}",
                    task.step_name, order.id, order.status
                );
                created.push(task);
            }
        }

        metrics::TASKS_CREATED
            .with_label_values(&["triggered"])
            .inc_by(created.len() as u64);

        Ok(created)
    }
}
