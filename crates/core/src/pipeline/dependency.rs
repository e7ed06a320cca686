//! Dependency gating between tasks of the same order.

use crate::task::{Task, TaskStatus};

/// Decides whether tasks (or templates) may proceed given the state of
/// their order's other tasks.
pub struct DependencyResolver;

impl DependencyResolver {
    /// Dependency names with no COMPLETED same-order task of that step name.
    pub fn missing<'a>(dependencies: &'a [String], same_order: &[Task]) -> Vec<&'a str> {
        dependencies
            .iter()
            .filter(|name| {
                !same_order
                    .iter()
                    .any(|t| &t.step_name == *name && t.status == TaskStatus::Completed)
            })
            .map(|name| name.as_str())
            .collect()
    }

    /// True when every named dependency is completed.
    pub fn is_satisfied(dependencies: &[String], same_order: &[Task]) -> bool {
        Self::missing(dependencies, same_order).is_empty()
    }

    /// True when every dependency of `task` is completed.
    pub fn is_unblocked(task: &Task, same_order: &[Task]) -> bool {
        Self::is_satisfied(&task.dependencies, same_order)
    }

    /// Dependencies of `task` that are still outstanding.
    pub fn missing_dependencies<'a>(task: &'a Task, same_order: &[Task]) -> Vec<&'a str> {
        Self::missing(&task.dependencies, same_order)
    }

    /// Pending tasks that depend on `completed_step` and have nothing else
    /// outstanding. `same_order` must already reflect the completion.
    pub fn newly_unblocked<'a>(completed_step: &str, same_order: &'a [Task]) -> Vec<&'a Task> {
        same_order
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .filter(|t| t.dependencies.iter().any(|d| d == completed_step))
            .filter(|t| Self::is_unblocked(t, same_order))
            .collect()
    }
}
