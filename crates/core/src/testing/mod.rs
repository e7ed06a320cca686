//! Testing utilities and in-memory doubles for the engine's seams.
//!
//! # Example
//!
//! ```rust,ignore
//! use fulfillment_core::testing::{ManualClock, MockNotifier, RecordingAuditSink};
//!
//! let clock = Arc::new(ManualClock::new(Utc::now()));
//! let notifier = Arc::new(MockNotifier::new());
//!
//! // Drive the engine, then move time forward for escalations
//! clock.advance(Duration::hours(25));
//! assert_eq!(notifier.notifications_for_role(Role::Manager).len(), 1);
//! ```

mod manual_clock;
mod mock_notifier;
mod recording_sink;

pub use manual_clock::ManualClock;
pub use mock_notifier::MockNotifier;
pub use recording_sink::RecordingAuditSink;

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::{DateTime, Duration, Utc};

    use crate::assignment::Operator;
    use crate::order::{CreateOrderRequest, Role};
    use crate::pipeline::ProductionMethod;

    /// A fixed instant so scheduled dates are reproducible.
    pub fn fixed_now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-02T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    /// An order request due `days` after [`fixed_now`].
    pub fn order_request(method: ProductionMethod, days: i64) -> CreateOrderRequest {
        CreateOrderRequest {
            workspace_id: "ws-test".to_string(),
            production_method: method,
            deadline: fixed_now() + Duration::days(days),
            priority_modifier: 0,
        }
    }

    /// One active operator per production role, ids `<role>-1`.
    pub fn crew() -> Vec<Operator> {
        [
            Role::Manager,
            Role::CsrAgent,
            Role::GraphicArtist,
            Role::ScreenMaker,
            Role::Cutter,
            Role::Printer,
            Role::Sewer,
            Role::Embroiderer,
            Role::QcInspector,
            Role::WarehouseStaff,
            Role::Driver,
        ]
        .into_iter()
        .map(|role| Operator::new(format!("{}-1", role), format!("{} one", role), role))
        .collect()
    }
}
