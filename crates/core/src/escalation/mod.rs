//! Durable delayed escalations.
//!
//! Jobs are scheduled when an order enters a status with configured rules,
//! cancelled when it leaves, and executed by the engine's sweep. Being rows
//! rather than timers, they survive restarts.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteEscalationStore;
pub use store::{EscalationError, EscalationStore};
pub use types::{EscalationAction, EscalationJob, EscalationRule, JobState, NewEscalationJob};
