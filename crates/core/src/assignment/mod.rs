//! Auto-assignment of operators to unblocked tasks.
//!
//! Each role has an [`AssignmentRule`] naming a strategy and which factors
//! to honor. The engine builds the candidate pool (active operators of the
//! role, optionally only available ones, optionally narrowed by skills),
//! orders it, and lets the strategy pick.

mod engine;
mod sqlite_store;
mod store;
mod strategy;
mod types;

pub use engine::{
    AssignmentEngine, AssignmentError, AssignmentOutcome, AssignmentPassSummary,
    AssignmentSettings,
};
pub use sqlite_store::SqliteOperatorStore;
pub use store::{OperatorError, OperatorStore};
pub use strategy::{
    AssignmentStrategy, EfficiencyBased, LeastLoaded, RoundRobin, SkillBased, StrategyRegistry,
};
pub use types::{
    availability_for, efficiency_score, AssignmentRule, Availability, Candidate, Operator,
    StrategyKind,
};
