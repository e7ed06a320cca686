//! Table-driven order transitions.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::guards::{GuardContext, GuardRegistry, GuardVerdict};
use super::hooks::{HookContext, TransitionHook};
use super::rules::{find_rule, EdgeHook, TransitionRule};
use crate::audit::{AuditEvent, AuditHandle};
use crate::clock::Clock;
use crate::metrics;
use crate::order::{Order, OrderError, OrderStatus, OrderStore, Role, TransitionCommit};
use crate::task::{TaskError, TaskStore};

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Role {role} may not move an order from {from} to {to}")]
    PermissionDenied {
        role: Role,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("Transition rejected: {reason}")]
    ValidationFailed { reason: String },

    /// The order changed between read and commit.
    #[error("Order {0} was modified concurrently")]
    ConcurrentModification(String),

    #[error(transparent)]
    Store(OrderError),

    #[error(transparent)]
    Task(#[from] TaskError),
}

impl TransitionError {
    /// Metric label for the rejection reason.
    pub fn reason(&self) -> &'static str {
        match self {
            TransitionError::NotFound(_) => "not_found",
            TransitionError::InvalidTransition { .. } => "invalid_transition",
            TransitionError::PermissionDenied { .. } => "permission_denied",
            TransitionError::ValidationFailed { .. } => "validation_failed",
            TransitionError::ConcurrentModification(_) => "concurrent_modification",
            TransitionError::Store(_) | TransitionError::Task(_) => "store",
        }
    }
}

impl From<OrderError> for TransitionError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::NotFound(id) => TransitionError::NotFound(id),
            OrderError::VersionConflict { order_id, .. } => {
                TransitionError::ConcurrentModification(order_id)
            }
            other => TransitionError::Store(other),
        }
    }
}

/// Validates and commits order status changes, then runs hooks.
pub struct OrderStateMachine {
    orders: Arc<dyn OrderStore>,
    tasks: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    audit: Option<AuditHandle>,
    guards: GuardRegistry,
    edge_hooks: HashMap<EdgeHook, Arc<dyn TransitionHook>>,
    entry_hooks: Vec<Arc<dyn TransitionHook>>,
}

impl OrderStateMachine {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        tasks: Arc<dyn TaskStore>,
        clock: Arc<dyn Clock>,
        audit: Option<AuditHandle>,
    ) -> Self {
        Self {
            orders,
            tasks,
            clock,
            audit,
            guards: GuardRegistry::standard(),
            edge_hooks: HashMap::new(),
            entry_hooks: Vec::new(),
        }
    }

    pub fn with_guards(mut self, guards: GuardRegistry) -> Self {
        self.guards = guards;
        self
    }

    /// Bind a hook to every edge declaring `kind`.
    pub fn with_edge_hook(mut self, kind: EdgeHook, hook: Arc<dyn TransitionHook>) -> Self {
        self.edge_hooks.insert(kind, hook);
        self
    }

    /// Add a hook run after every committed transition, after the edge hook.
    pub fn with_entry_hook(mut self, hook: Arc<dyn TransitionHook>) -> Self {
        self.entry_hooks.push(hook);
        self
    }

    /// Move an order to `to` on behalf of `user_id` acting as `role`.
    ///
    /// The status change, audit row and history row commit together. Hooks
    /// run afterwards; their failures are reported but never undo the
    /// change.
    pub async fn transition_order(
        &self,
        order_id: &str,
        to: OrderStatus,
        user_id: &str,
        role: Role,
        notes: Option<String>,
    ) -> Result<Order, TransitionError> {
        let committed = self.validate_and_commit(order_id, to, user_id, role, notes.clone());
        let (order, from, rule) = match committed {
            Ok(committed) => committed,
            Err(e) => {
                self.record_rejection(order_id, to, user_id, role, &e).await;
                return Err(e);
            }
        };

        metrics::TRANSITIONS_TOTAL
            .with_label_values(&[from.as_str(), to.as_str()])
            .inc();
        info!(
            "Order {} moved {} -> {} by {} ({})",
            order.id, from, to, user_id, role
        );

        if let Some(ref audit) = self.audit {
            audit
                .emit(AuditEvent::OrderTransitioned {
                    order_id: order.id.clone(),
                    from,
                    to,
                    actor_id: user_id.to_string(),
                    role,
                    notes,
                })
                .await;
        }

        let ctx = HookContext {
            order: order.clone(),
            from,
            actor_id: user_id.to_string(),
            role,
        };
        self.run_hooks(rule, &ctx).await;

        Ok(order)
    }

    /// Check whether `role` could move the order to `to` right now,
    /// including the edge guard. Nothing is written.
    pub fn check_transition(
        &self,
        order_id: &str,
        to: OrderStatus,
        role: Role,
    ) -> Result<(), TransitionError> {
        let order = self.load(order_id)?;
        let rule = Self::authorize(&order, to, role)?;
        self.run_guard(rule, &order)
    }

    fn load(&self, order_id: &str) -> Result<Order, TransitionError> {
        self.orders
            .get(order_id)?
            .ok_or_else(|| TransitionError::NotFound(order_id.to_string()))
    }

    fn authorize(
        order: &Order,
        to: OrderStatus,
        role: Role,
    ) -> Result<&'static TransitionRule, TransitionError> {
        let rule = find_rule(order.status, to).ok_or(TransitionError::InvalidTransition {
            from: order.status,
            to,
        })?;
        if !rule.allows(role) {
            return Err(TransitionError::PermissionDenied {
                role,
                from: order.status,
                to,
            });
        }
        Ok(rule)
    }

    fn run_guard(&self, rule: &TransitionRule, order: &Order) -> Result<(), TransitionError> {
        let Some(kind) = rule.guard else {
            return Ok(());
        };
        let ctx = GuardContext {
            orders: self.orders.as_ref(),
            tasks: self.tasks.as_ref(),
        };
        match self.guards.check(kind, order, &ctx)? {
            GuardVerdict::Allow => Ok(()),
            GuardVerdict::Deny(reason) => Err(TransitionError::ValidationFailed { reason }),
        }
    }

    fn validate_and_commit(
        &self,
        order_id: &str,
        to: OrderStatus,
        user_id: &str,
        role: Role,
        notes: Option<String>,
    ) -> Result<(Order, OrderStatus, &'static TransitionRule), TransitionError> {
        let order = self.load(order_id)?;
        let rule = Self::authorize(&order, to, role)?;
        self.run_guard(rule, &order)?;

        let committed = self.orders.commit_transition(&TransitionCommit {
            order_id: order.id.clone(),
            expected_version: order.version,
            from: order.status,
            to,
            actor_id: user_id.to_string(),
            role,
            notes,
            at: self.clock.now(),
        })?;
        Ok((committed, order.status, rule))
    }

    async fn record_rejection(
        &self,
        order_id: &str,
        to: OrderStatus,
        user_id: &str,
        role: Role,
        error: &TransitionError,
    ) {
        metrics::TRANSITIONS_REJECTED
            .with_label_values(&[error.reason()])
            .inc();
        debug!(
            "Rejected transition of order {} to {} by {} ({}): {}",
            order_id, to, user_id, role, error
        );
        if let Some(ref audit) = self.audit {
            audit
                .emit(AuditEvent::TransitionRejected {
                    order_id: order_id.to_string(),
                    to,
                    actor_id: user_id.to_string(),
                    role,
                    reason: error.to_string(),
                })
                .await;
        }
    }

    async fn run_hooks(&self, rule: &TransitionRule, ctx: &HookContext) {
        let edge = rule.hook.and_then(|kind| self.edge_hooks.get(&kind));
        for hook in edge.into_iter().chain(self.entry_hooks.iter()) {
            if let Err(e) = hook.run(ctx).await {
                warn!(
                    "Hook {} failed after order {} entered {}: {}",
                    hook.name(),
                    ctx.order.id,
                    ctx.order.status,
                    e
                );
                metrics::HOOK_FAILURES
                    .with_label_values(&[hook.name()])
                    .inc();
                if let Some(ref audit) = self.audit {
                    audit
                        .emit(AuditEvent::TransitionHookFailed {
                            order_id: ctx.order.id.clone(),
                            hook: hook.name().to_string(),
                            error: e.to_string(),
                        })
                        .await;
                }
            }
        }
    }
}
