//! Core order data types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::ProductionMethod;

/// Staff roles that act on orders and perform tasks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    CsrAgent,
    GraphicArtist,
    Client,
    ScreenMaker,
    Cutter,
    Printer,
    Sewer,
    Embroiderer,
    QcInspector,
    WarehouseStaff,
    Driver,
    /// The orchestrator itself (auto-advance, escalations).
    System,
}

impl Role {
    pub const ALL: [Role; 14] = [
        Role::Admin,
        Role::Manager,
        Role::CsrAgent,
        Role::GraphicArtist,
        Role::Client,
        Role::ScreenMaker,
        Role::Cutter,
        Role::Printer,
        Role::Sewer,
        Role::Embroiderer,
        Role::QcInspector,
        Role::WarehouseStaff,
        Role::Driver,
        Role::System,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::CsrAgent => "csr_agent",
            Role::GraphicArtist => "graphic_artist",
            Role::Client => "client",
            Role::ScreenMaker => "screen_maker",
            Role::Cutter => "cutter",
            Role::Printer => "printer",
            Role::Sewer => "sewer",
            Role::Embroiderer => "embroiderer",
            Role::QcInspector => "qc_inspector",
            Role::WarehouseStaff => "warehouse_staff",
            Role::Driver => "driver",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown role: {}", s))
    }
}

/// Lifecycle status of an order.
///
/// ```text
/// Intake -> DesignPending -> DesignApproval -> Confirmed -> ProductionPlanned
///                 ^               |
///                 +---revision----+
///
/// ProductionPlanned -> InProgress -> Qc -> Packing -> ReadyForDelivery
///                        ^    |      |
///                        |    v      v
///                        OnHold    (rework back to InProgress)
///
/// ReadyForDelivery -> Delivered -> Closed
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Intake,
    DesignPending,
    DesignApproval,
    Confirmed,
    ProductionPlanned,
    InProgress,
    OnHold,
    Qc,
    Packing,
    ReadyForDelivery,
    Delivered,
    Closed,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 12] = [
        OrderStatus::Intake,
        OrderStatus::DesignPending,
        OrderStatus::DesignApproval,
        OrderStatus::Confirmed,
        OrderStatus::ProductionPlanned,
        OrderStatus::InProgress,
        OrderStatus::OnHold,
        OrderStatus::Qc,
        OrderStatus::Packing,
        OrderStatus::ReadyForDelivery,
        OrderStatus::Delivered,
        OrderStatus::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Intake => "intake",
            OrderStatus::DesignPending => "design_pending",
            OrderStatus::DesignApproval => "design_approval",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::ProductionPlanned => "production_planned",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::OnHold => "on_hold",
            OrderStatus::Qc => "qc",
            OrderStatus::Packing => "packing",
            OrderStatus::ReadyForDelivery => "ready_for_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Closed => "closed",
        }
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Closed)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .iter()
            .copied()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| format!("unknown order status: {}", s))
    }
}

/// A manufacturing order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    /// Unique identifier (UUID).
    pub id: String,

    /// Workspace (tenant) owning the order.
    pub workspace_id: String,

    /// How the goods are produced; selects the pipeline.
    pub production_method: ProductionMethod,

    /// Current status. Only the state machine changes it.
    pub status: OrderStatus,

    /// When the order must be delivered.
    pub deadline: DateTime<Utc>,

    /// Added to every task priority of this order before clamping.
    pub priority_modifier: i32,

    /// Incremented on every committed transition.
    pub version: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row of the status-history trail, written with each transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusHistoryEntry {
    pub id: i64,
    pub order_id: String,
    pub from_status: OrderStatus,
    pub to_status: OrderStatus,
    pub changed_by: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub changed_at: DateTime<Utc>,
}

/// Before/after snapshot of an order, written with each transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderAuditRow {
    pub id: i64,
    pub order_id: String,
    pub actor_id: String,
    pub action: String,
    pub before: serde_json::Value,
    pub after: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A design file attached to an order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DesignAsset {
    pub id: String,
    pub order_id: String,
    pub file_name: String,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
}
