//! The order transition table.

use serde::{Deserialize, Serialize};

use crate::order::{OrderStatus, Role};

/// A precondition checked before an edge is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardKind {
    /// At least one design asset is uploaded.
    DesignAssetsPresent,
    /// Every dependency of the QUALITY_CONTROL task is completed.
    QcTaskUnblocked,
    /// The QUALITY_CONTROL task is completed.
    QcTaskCompleted,
    /// Every required task of the order is completed.
    AllRequiredTasksCompleted,
}

/// Work bound to one edge, run after the edge commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeHook {
    GeneratePipeline,
    PauseTasks,
    ResumeTasks,
}

#[derive(Debug, Clone, Copy)]
pub struct TransitionRule {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub roles: &'static [Role],
    pub guard: Option<GuardKind>,
    pub hook: Option<EdgeHook>,
}

impl TransitionRule {
    pub fn allows(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

const MANAGEMENT: &[Role] = &[Role::Admin, Role::Manager];
const INTAKE_STAFF: &[Role] = &[Role::Admin, Role::Manager, Role::CsrAgent];
const DESIGN_STAFF: &[Role] = &[Role::Admin, Role::Manager, Role::GraphicArtist];
const APPROVERS: &[Role] = &[Role::Admin, Role::Manager, Role::Client, Role::System];
const AUTOMATED: &[Role] = &[Role::Admin, Role::Manager, Role::System];
const QC_STAFF: &[Role] = &[Role::Admin, Role::Manager, Role::QcInspector, Role::System];
const WAREHOUSE: &[Role] = &[Role::Admin, Role::Manager, Role::WarehouseStaff, Role::System];
const DRIVERS: &[Role] = &[Role::Admin, Role::Manager, Role::Driver, Role::System];

const fn rule(
    from: OrderStatus,
    to: OrderStatus,
    roles: &'static [Role],
    guard: Option<GuardKind>,
    hook: Option<EdgeHook>,
) -> TransitionRule {
    TransitionRule {
        from,
        to,
        roles,
        guard,
        hook,
    }
}

use OrderStatus::*;

pub static TRANSITIONS: &[TransitionRule] = &[
    rule(Intake, DesignPending, INTAKE_STAFF, None, None),
    rule(
        DesignPending,
        DesignApproval,
        DESIGN_STAFF,
        Some(GuardKind::DesignAssetsPresent),
        None,
    ),
    rule(DesignApproval, Confirmed, APPROVERS, None, None),
    rule(DesignApproval, DesignPending, APPROVERS, None, None),
    rule(
        Confirmed,
        ProductionPlanned,
        MANAGEMENT,
        None,
        Some(EdgeHook::GeneratePipeline),
    ),
    rule(ProductionPlanned, InProgress, AUTOMATED, None, None),
    rule(InProgress, OnHold, MANAGEMENT, None, Some(EdgeHook::PauseTasks)),
    rule(OnHold, InProgress, MANAGEMENT, None, Some(EdgeHook::ResumeTasks)),
    rule(InProgress, Qc, QC_STAFF, Some(GuardKind::QcTaskUnblocked), None),
    rule(Qc, InProgress, QC_STAFF, None, None),
    rule(Qc, Packing, QC_STAFF, Some(GuardKind::QcTaskCompleted), None),
    rule(Packing, ReadyForDelivery, WAREHOUSE, None, None),
    rule(ReadyForDelivery, Delivered, DRIVERS, None, None),
    rule(
        Delivered,
        Closed,
        MANAGEMENT,
        Some(GuardKind::AllRequiredTasksCompleted),
        None,
    ),
];

/// The edge from `from` to `to`, if one exists.
pub fn find_rule(from: OrderStatus, to: OrderStatus) -> Option<&'static TransitionRule> {
    TRANSITIONS.iter().find(|r| r.from == from && r.to == to)
}

/// Statuses reachable from `from` by `role`.
pub fn allowed_targets(from: OrderStatus, role: Role) -> Vec<OrderStatus> {
    TRANSITIONS
        .iter()
        .filter(|r| r.from == from && r.allows(role))
        .map(|r| r.to)
        .collect()
}
