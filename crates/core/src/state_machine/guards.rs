//! Transition guards.

use std::collections::HashMap;
use std::sync::Arc;

use super::rules::GuardKind;
use super::TransitionError;
use crate::order::{Order, OrderStore};
use crate::pipeline::{steps, DependencyResolver};
use crate::task::{TaskStatus, TaskStore};

/// Stores a guard may read.
pub struct GuardContext<'a> {
    pub orders: &'a dyn OrderStore,
    pub tasks: &'a dyn TaskStore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardVerdict {
    Allow,
    Deny(String),
}

/// A synchronous precondition on an edge.
pub trait Guard: Send + Sync {
    fn check(&self, order: &Order, ctx: &GuardContext<'_>) -> Result<GuardVerdict, TransitionError>;
}

pub struct DesignAssetsPresent;

impl Guard for DesignAssetsPresent {
    fn check(&self, order: &Order, ctx: &GuardContext<'_>) -> Result<GuardVerdict, TransitionError> {
        if ctx.orders.count_design_assets(&order.id)? > 0 {
            Ok(GuardVerdict::Allow)
        } else {
            Ok(GuardVerdict::Deny(
                "at least one design asset must be uploaded".to_string(),
            ))
        }
    }
}

pub struct QcTaskUnblocked;

impl Guard for QcTaskUnblocked {
    fn check(&self, order: &Order, ctx: &GuardContext<'_>) -> Result<GuardVerdict, TransitionError> {
        let tasks = ctx.tasks.list_for_order(&order.id)?;
        let Some(qc) = tasks.iter().find(|t| t.step_name == steps::QUALITY_CONTROL) else {
            return Ok(GuardVerdict::Deny(format!(
                "order has no {} task",
                steps::QUALITY_CONTROL
            )));
        };
        let missing = DependencyResolver::missing_dependencies(qc, &tasks);
        if missing.is_empty() {
            Ok(GuardVerdict::Allow)
        } else {
            Ok(GuardVerdict::Deny(format!(
                "waiting on {}",
                missing.join(", ")
            )))
        }
    }
}

pub struct QcTaskCompleted;

impl Guard for QcTaskCompleted {
    fn check(&self, order: &Order, ctx: &GuardContext<'_>) -> Result<GuardVerdict, TransitionError> {
        let tasks = ctx.tasks.list_for_order(&order.id)?;
        let done = tasks
            .iter()
            .any(|t| t.step_name == steps::QUALITY_CONTROL && t.status == TaskStatus::Completed);
        if done {
            Ok(GuardVerdict::Allow)
        } else {
            Ok(GuardVerdict::Deny(format!(
                "{} is not completed",
                steps::QUALITY_CONTROL
            )))
        }
    }
}

pub struct AllRequiredTasksCompleted;

impl Guard for AllRequiredTasksCompleted {
    fn check(&self, order: &Order, ctx: &GuardContext<'_>) -> Result<GuardVerdict, TransitionError> {
        let open: Vec<String> = ctx
            .tasks
            .list_for_order(&order.id)?
            .into_iter()
            .filter(|t| t.required && t.status != TaskStatus::Completed)
            .map(|t| t.step_name)
            .collect();
        if open.is_empty() {
            Ok(GuardVerdict::Allow)
        } else {
            Ok(GuardVerdict::Deny(format!(
                "required tasks still open: {}",
                open.join(", ")
            )))
        }
    }
}

/// Guards keyed by kind.
#[derive(Clone)]
pub struct GuardRegistry {
    guards: HashMap<GuardKind, Arc<dyn Guard>>,
}

impl GuardRegistry {
    pub fn empty() -> Self {
        Self {
            guards: HashMap::new(),
        }
    }

    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(GuardKind::DesignAssetsPresent, Arc::new(DesignAssetsPresent));
        registry.register(GuardKind::QcTaskUnblocked, Arc::new(QcTaskUnblocked));
        registry.register(GuardKind::QcTaskCompleted, Arc::new(QcTaskCompleted));
        registry.register(
            GuardKind::AllRequiredTasksCompleted,
            Arc::new(AllRequiredTasksCompleted),
        );
        registry
    }

    pub fn register(&mut self, kind: GuardKind, guard: Arc<dyn Guard>) {
        self.guards.insert(kind, guard);
    }

    /// Run a guard. An unregistered guard denies.
    pub fn check(
        &self,
        kind: GuardKind,
        order: &Order,
        ctx: &GuardContext<'_>,
    ) -> Result<GuardVerdict, TransitionError> {
        match self.guards.get(&kind) {
            Some(guard) => guard.check(order, ctx),
            None => Ok(GuardVerdict::Deny(format!("no guard registered for {:?}", kind))),
        }
    }
}

impl Default for GuardRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
