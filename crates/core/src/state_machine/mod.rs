//! Order state machine.
//!
//! Every status change goes through [`OrderStateMachine::transition_order`]:
//! the edge must exist in [`TRANSITIONS`], the acting role must be allowed
//! on it, and its guard (if any) must pass. The change commits with
//! optimistic concurrency, then the edge hook and the status-entry hooks run.
//!
//! ```text
//! Intake -> DesignPending <-> DesignApproval -> Confirmed -> ProductionPlanned
//!   -> InProgress <-> OnHold
//!   InProgress <-> Qc -> Packing -> ReadyForDelivery -> Delivered -> Closed
//! ```

mod guards;
mod hooks;
mod machine;
mod rules;

pub use guards::{
    AllRequiredTasksCompleted, DesignAssetsPresent, Guard, GuardContext, GuardRegistry,
    GuardVerdict, QcTaskCompleted, QcTaskUnblocked,
};
pub use hooks::{
    AssignTasksHook, EscalationHook, GeneratePipelineHook, HookContext, HookError,
    PauseTasksHook, ResumeTasksHook, RoleNotificationHook, TransitionHook, TriggerTasksHook,
};
pub use machine::{OrderStateMachine, TransitionError};
pub use rules::{allowed_targets, find_rule, EdgeHook, GuardKind, TransitionRule, TRANSITIONS};
