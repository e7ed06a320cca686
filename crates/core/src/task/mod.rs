//! Tasks: concrete units of work instantiated from step templates.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteTaskStore;
pub use store::{TaskError, TaskStore};
pub use types::{NewTask, OperatorWorkload, Task, TaskDetails, TaskStatus};
