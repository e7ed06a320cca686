//! Orders, their status trail and design assets.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteOrderStore;
pub use store::{CreateOrderRequest, OrderError, OrderFilter, OrderStore, TransitionCommit};
pub use types::{DesignAsset, Order, OrderAuditRow, OrderStatus, Role, StatusHistoryEntry};
