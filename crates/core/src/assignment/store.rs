//! Operator and assignment-rule storage.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::{AssignmentRule, Operator};
use crate::order::Role;

#[derive(Debug, Error)]
pub enum OperatorError {
    #[error("Operator not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for OperatorError {
    fn from(e: rusqlite::Error) -> Self {
        OperatorError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for OperatorError {
    fn from(e: serde_json::Error) -> Self {
        OperatorError::Serialization(e.to_string())
    }
}

/// Trait for operator storage backends.
pub trait OperatorStore: Send + Sync {
    /// Insert or update an operator. `last_assigned_at` of an existing
    /// operator is preserved.
    fn upsert_operator(&self, operator: &Operator) -> Result<(), OperatorError>;

    fn get_operator(&self, id: &str) -> Result<Option<Operator>, OperatorError>;

    /// Operators of a role in registration order, active or not.
    fn list_by_role(&self, role: Role) -> Result<Vec<Operator>, OperatorError>;

    fn set_active(&self, id: &str, active: bool) -> Result<(), OperatorError>;

    fn touch_last_assigned(&self, id: &str, at: DateTime<Utc>) -> Result<(), OperatorError>;

    /// Insert or replace the rule for `rule.role`.
    fn upsert_rule(&self, rule: &AssignmentRule) -> Result<(), OperatorError>;

    fn get_rule(&self, role: Role) -> Result<Option<AssignmentRule>, OperatorError>;

    fn list_rules(&self) -> Result<Vec<AssignmentRule>, OperatorError>;
}
