//! Order storage trait and types.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::{DesignAsset, Order, OrderAuditRow, OrderStatus, Role, StatusHistoryEntry};
use crate::pipeline::ProductionMethod;

/// Error type for order storage operations.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    NotFound(String),

    /// Another writer committed a transition since the order was read.
    #[error("Order {order_id} was modified concurrently (expected version {expected}, found {actual})")]
    VersionConflict {
        order_id: String,
        expected: i64,
        actual: i64,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for OrderError {
    fn from(e: rusqlite::Error) -> Self {
        OrderError::Database(e.to_string())
    }
}

/// Request to create a new order (intake).
#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub workspace_id: String,
    pub production_method: ProductionMethod,
    pub deadline: DateTime<Utc>,
    pub priority_modifier: i32,
}

/// Everything written atomically when an order changes status.
#[derive(Debug, Clone)]
pub struct TransitionCommit {
    pub order_id: String,
    /// Version read before validation; the update only applies if unchanged.
    pub expected_version: i64,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub actor_id: String,
    pub role: Role,
    pub notes: Option<String>,
    pub at: DateTime<Utc>,
}

/// Filter for querying orders.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub workspace_id: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl OrderFilter {
    pub fn new() -> Self {
        Self {
            status: None,
            workspace_id: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_workspace(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }
}

/// Trait for order storage backends.
pub trait OrderStore: Send + Sync {
    /// Create a new order in `Intake`, stamped at `at`.
    fn create(&self, request: CreateOrderRequest, at: DateTime<Utc>) -> Result<Order, OrderError>;

    /// Get an order by ID.
    fn get(&self, id: &str) -> Result<Option<Order>, OrderError>;

    /// List orders matching the filter, earliest deadline first.
    fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, OrderError>;

    /// Count orders matching the filter.
    fn count(&self, filter: &OrderFilter) -> Result<i64, OrderError>;

    /// Update the status, append the audit snapshot and the history row in one
    /// transaction. Fails with `VersionConflict` if the order changed since it
    /// was read.
    fn commit_transition(&self, commit: &TransitionCommit) -> Result<Order, OrderError>;

    /// Status history for an order, oldest first.
    fn status_history(&self, order_id: &str) -> Result<Vec<StatusHistoryEntry>, OrderError>;

    /// Audit snapshots for an order, oldest first.
    fn audit_rows(&self, order_id: &str) -> Result<Vec<OrderAuditRow>, OrderError>;

    /// Attach a design asset to an order.
    fn add_design_asset(
        &self,
        order_id: &str,
        file_name: &str,
        uploaded_by: &str,
        at: DateTime<Utc>,
    ) -> Result<DesignAsset, OrderError>;

    /// Number of design assets attached to an order.
    fn count_design_assets(&self, order_id: &str) -> Result<i64, OrderError>;
}
