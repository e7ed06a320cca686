use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::assignment::{AssignmentRule, AssignmentSettings, Operator};
use crate::escalation::{EscalationAction, EscalationRule};
use crate::order::{OrderStatus, Role};
use crate::orchestrator::OrchestratorConfig;
use crate::pipeline::{PipelineDefinition, DEFAULT_BUFFER_HOURS};
use crate::state_machine::RoleNotificationHook;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub assignment: AssignmentConfig,
    #[serde(default)]
    pub escalation: EscalationConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    /// Replacements for built-in pipelines, keyed by method.
    #[serde(default)]
    pub pipelines: Vec<PipelineDefinition>,
    #[serde(default)]
    pub audit: AuditConfig,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("fulfillment.db")
}

/// Backward-scheduling configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulingConfig {
    /// Gap between consecutive steps, in hours.
    #[serde(default = "default_buffer_hours")]
    pub buffer_hours: f64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            buffer_hours: default_buffer_hours(),
        }
    }
}

fn default_buffer_hours() -> f64 {
    DEFAULT_BUFFER_HOURS
}

/// Assignment configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssignmentConfig {
    /// Open tasks at which an operator counts as busy.
    #[serde(default = "default_busy_threshold")]
    pub busy_threshold: u32,
    #[serde(default = "default_efficiency_window_days")]
    pub efficiency_window_days: i64,
    /// Tasks examined per assignment pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Per-role rules stored at startup. Roles without one use the default.
    #[serde(default)]
    pub rules: Vec<AssignmentRule>,
    /// Operators registered at startup.
    #[serde(default)]
    pub operators: Vec<Operator>,
}

impl AssignmentConfig {
    pub fn settings(&self) -> AssignmentSettings {
        AssignmentSettings {
            busy_threshold: self.busy_threshold,
            efficiency_window_days: self.efficiency_window_days,
            batch_size: self.batch_size,
        }
    }
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            busy_threshold: default_busy_threshold(),
            efficiency_window_days: default_efficiency_window_days(),
            batch_size: default_batch_size(),
            rules: Vec::new(),
            operators: Vec::new(),
        }
    }
}

fn default_busy_threshold() -> u32 {
    5
}

fn default_efficiency_window_days() -> i64 {
    30
}

fn default_batch_size() -> usize {
    20
}

/// Escalation configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EscalationConfig {
    #[serde(default = "default_escalation_rules")]
    pub rules: Vec<EscalationRule>,
    /// Due jobs executed per sweep.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            rules: default_escalation_rules(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_escalation_rules() -> Vec<EscalationRule> {
    vec![
        EscalationRule {
            status: OrderStatus::DesignApproval,
            after_hours: 48.0,
            action: EscalationAction::Notify {
                role: Role::CsrAgent,
            },
        },
        EscalationRule {
            status: OrderStatus::Qc,
            after_hours: 24.0,
            action: EscalationAction::Notify {
                role: Role::Manager,
            },
        },
        EscalationRule {
            status: OrderStatus::ReadyForDelivery,
            after_hours: 24.0,
            action: EscalationAction::Notify {
                role: Role::Manager,
            },
        },
    ]
}

/// A role group told when an order enters a status.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StatusRoute {
    pub status: OrderStatus,
    pub role: Role,
}

/// Notification routing configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    #[serde(default = "default_routes")]
    pub routes: Vec<StatusRoute>,
}

impl NotificationConfig {
    pub fn route_pairs(&self) -> Vec<(OrderStatus, Role)> {
        self.routes.iter().map(|r| (r.status, r.role)).collect()
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            routes: default_routes(),
        }
    }
}

fn default_routes() -> Vec<StatusRoute> {
    RoleNotificationHook::standard_routes()
        .into_iter()
        .map(|(status, role)| StatusRoute { status, role })
        .collect()
}

/// Audit channel configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditConfig {
    #[serde(default = "default_audit_buffer")]
    pub buffer_size: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_audit_buffer(),
        }
    }
}

fn default_audit_buffer() -> usize {
    1000
}

/// Config summary for startup logs
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub database: DatabaseConfig,
    pub scheduling: SchedulingConfig,
    pub orchestrator: OrchestratorConfig,
    pub assignment: SanitizedAssignmentConfig,
    pub escalation_rules: usize,
    pub notification_routes: usize,
    /// Methods whose built-in pipeline is replaced.
    pub pipeline_overrides: Vec<String>,
    pub audit: AuditConfig,
}

/// Assignment config with rosters reduced to counts
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAssignmentConfig {
    pub busy_threshold: u32,
    pub efficiency_window_days: i64,
    pub batch_size: usize,
    pub rules: Vec<AssignmentRule>,
    pub operator_count: usize,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            database: config.database.clone(),
            scheduling: config.scheduling.clone(),
            orchestrator: config.orchestrator.clone(),
            assignment: SanitizedAssignmentConfig {
                busy_threshold: config.assignment.busy_threshold,
                efficiency_window_days: config.assignment.efficiency_window_days,
                batch_size: config.assignment.batch_size,
                rules: config.assignment.rules.clone(),
                operator_count: config.assignment.operators.len(),
            },
            escalation_rules: config.escalation.rules.len(),
            notification_routes: config.notifications.routes.len(),
            pipeline_overrides: config
                .pipelines
                .iter()
                .map(|p| p.method.to_string())
                .collect(),
            audit: config.audit.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::StrategyKind;
    use crate::pipeline::ProductionMethod;

    #[test]
    fn test_deserialize_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.database.path.to_str().unwrap(), "fulfillment.db");
        assert_eq!(config.scheduling.buffer_hours, 2.0);
        assert_eq!(config.assignment.busy_threshold, 5);
        assert_eq!(config.assignment.efficiency_window_days, 30);
        assert_eq!(config.assignment.batch_size, 20);
        assert_eq!(config.escalation.rules.len(), 3);
        assert!(config
            .notifications
            .routes
            .contains(&StatusRoute {
                status: OrderStatus::Qc,
                role: Role::QcInspector
            }));
        assert!(config.pipelines.is_empty());
        assert_eq!(config.audit.buffer_size, 1000);
    }

    #[test]
    fn test_deserialize_with_custom_database_path() {
        let toml = r#"
[database]
path = "/data/shop.sqlite"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.database.path.to_str().unwrap(), "/data/shop.sqlite");
    }

    #[test]
    fn test_deserialize_assignment_rules_and_operators() {
        let toml = r#"
[assignment]
busy_threshold = 3

[[assignment.rules]]
role = "printer"
strategy = "skill_based"
consider_skills = true

[[assignment.operators]]
id = "p-1"
name = "Pat"
role = "printer"
skills = ["dtf", "silkscreen"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.assignment.busy_threshold, 3);
        assert_eq!(config.assignment.batch_size, 20);

        let rule = &config.assignment.rules[0];
        assert_eq!(rule.role, Role::Printer);
        assert_eq!(rule.strategy, StrategyKind::SkillBased);
        assert!(rule.consider_skills);
        assert!(!rule.consider_workload);
        assert!(rule.consider_availability);

        let op = &config.assignment.operators[0];
        assert!(op.active);
        assert_eq!(op.skills, vec!["dtf", "silkscreen"]);

        assert_eq!(config.assignment.settings().busy_threshold, 3);
    }

    #[test]
    fn test_deserialize_escalation_rules_replace_defaults() {
        let toml = r#"
[[escalation.rules]]
status = "design_approval"
after_hours = 72
action = { type = "auto_approve", to = "confirmed" }
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.escalation.rules.len(), 1);
        assert_eq!(
            config.escalation.rules[0].action,
            EscalationAction::AutoApprove {
                to: OrderStatus::Confirmed
            }
        );
    }

    #[test]
    fn test_deserialize_pipeline_override() {
        let toml = r#"
[[pipelines]]
method = "dtf"

[[pipelines.steps]]
name = "DTF_PRINTING"
role = "printer"
estimated_hours = 3

[[pipelines.steps]]
name = "PACKING"
role = "warehouse_staff"
estimated_hours = 1
dependencies = ["DTF_PRINTING"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.pipelines[0].method, ProductionMethod::Dtf);
        assert_eq!(config.pipelines[0].steps.len(), 2);
        assert!(config.pipelines[0].steps[1].required);
    }

    #[test]
    fn test_sanitized_config() {
        let mut config = Config::default();
        config
            .assignment
            .operators
            .push(Operator::new("c-1", "Cy", Role::Cutter));
        let sanitized = SanitizedConfig::from(&config);
        assert_eq!(sanitized.assignment.operator_count, 1);
        assert_eq!(sanitized.escalation_rules, 3);
        assert!(sanitized.pipeline_overrides.is_empty());
        assert_eq!(sanitized.database.path.to_str().unwrap(), "fulfillment.db");
    }
}
