pub mod assignment;
pub mod audit;
pub mod clock;
pub mod config;
mod db;
pub mod escalation;
pub mod metrics;
pub mod notifier;
pub mod orchestrator;
pub mod order;
pub mod pipeline;
pub mod state_machine;
pub mod task;
pub mod testing;

pub use assignment::{
    AssignmentEngine, AssignmentError, AssignmentOutcome, AssignmentRule, Operator,
    OperatorStore, SqliteOperatorStore, StrategyKind,
};
pub use audit::{create_audit_system, AuditEvent, AuditHandle, AuditSink, TracingAuditSink};
pub use clock::{Clock, SystemClock};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use escalation::{EscalationAction, EscalationRule, EscalationStore, SqliteEscalationStore};
pub use notifier::{LogNotifier, Notification, Notifier};
pub use orchestrator::{
    EngineStatus, EngineStores, FulfillmentEngine, OrchestratorConfig, OrchestratorError,
    TaskCompletion,
};
pub use order::{CreateOrderRequest, Order, OrderStatus, OrderStore, Role, SqliteOrderStore};
pub use pipeline::{DependencyResolver, PipelineCatalog, ProductionMethod, TaskScheduler};
pub use state_machine::{OrderStateMachine, TransitionError};
pub use task::{SqliteTaskStore, Task, TaskStatus, TaskStore};
