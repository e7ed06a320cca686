use std::collections::HashSet;

use super::{types::Config, ConfigError};
use crate::escalation::EscalationAction;
use crate::order::Role;
use crate::pipeline::PipelineCatalog;
use crate::state_machine::find_rule;

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

/// Validate configuration
///
/// Checks numeric bounds, duplicate rules and operators, escalation
/// actions against the transition table, and pipeline overrides against
/// the catalog rules.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let buffer = config.scheduling.buffer_hours;
    if !buffer.is_finite() || buffer < 0.0 {
        return Err(invalid(format!(
            "scheduling.buffer_hours must be a non-negative number (got {})",
            buffer
        )));
    }

    if config.assignment.busy_threshold == 0 {
        return Err(invalid("assignment.busy_threshold cannot be 0"));
    }
    if config.assignment.efficiency_window_days <= 0 {
        return Err(invalid("assignment.efficiency_window_days must be positive"));
    }
    if config.assignment.batch_size == 0 {
        return Err(invalid("assignment.batch_size cannot be 0"));
    }
    if config.escalation.batch_size == 0 {
        return Err(invalid("escalation.batch_size cannot be 0"));
    }
    if config.audit.buffer_size == 0 {
        return Err(invalid("audit.buffer_size cannot be 0"));
    }
    if config.orchestrator.assignment_poll_interval_ms == 0
        || config.orchestrator.escalation_poll_interval_ms == 0
    {
        return Err(invalid("orchestrator poll intervals cannot be 0"));
    }

    let mut roles = HashSet::new();
    for rule in &config.assignment.rules {
        if !roles.insert(rule.role) {
            return Err(invalid(format!(
                "duplicate assignment rule for role {}",
                rule.role
            )));
        }
    }

    let mut ids = HashSet::new();
    for op in &config.assignment.operators {
        if op.id.is_empty() {
            return Err(invalid("operator id cannot be empty"));
        }
        if !ids.insert(op.id.as_str()) {
            return Err(invalid(format!("duplicate operator id {}", op.id)));
        }
    }

    for rule in &config.escalation.rules {
        if !rule.after_hours.is_finite() || rule.after_hours <= 0.0 {
            return Err(invalid(format!(
                "escalation for {} must have positive after_hours",
                rule.status
            )));
        }
        match rule.action {
            EscalationAction::AutoApprove { to } | EscalationAction::AutoReject { to } => {
                let allowed = find_rule(rule.status, to).is_some_and(|r| r.allows(Role::System));
                if !allowed {
                    return Err(invalid(format!(
                        "escalation {} from {} is not a transition the system may take",
                        rule.action, rule.status
                    )));
                }
            }
            EscalationAction::ReassignRole { from, to } if from == to => {
                return Err(invalid(format!(
                    "escalation for {} reassigns {} to itself",
                    rule.status, from
                )));
            }
            _ => {}
        }
    }

    PipelineCatalog::with_overrides(config.pipelines.clone())
        .map_err(|e| invalid(format!("pipelines: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::{AssignmentRule, Operator};
    use crate::escalation::EscalationRule;
    use crate::order::OrderStatus;
    use crate::pipeline::{PipelineDefinition, ProductionMethod, StepTemplate};

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_zero_batch_fails() {
        let mut config = Config::default();
        config.assignment.batch_size = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_negative_buffer_fails() {
        let mut config = Config::default();
        config.scheduling.buffer_hours = -1.0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_duplicate_rule_role() {
        let mut config = Config::default();
        config.assignment.rules = vec![
            AssignmentRule::default_for(Role::Cutter),
            AssignmentRule::default_for(Role::Cutter),
        ];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_duplicate_operator() {
        let mut config = Config::default();
        config.assignment.operators = vec![
            Operator::new("x", "A", Role::Cutter),
            Operator::new("x", "B", Role::Sewer),
        ];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_auto_approve_must_be_system_edge() {
        let mut config = Config::default();
        config.escalation.rules = vec![EscalationRule {
            status: OrderStatus::DesignApproval,
            after_hours: 48.0,
            action: EscalationAction::AutoApprove {
                to: OrderStatus::Confirmed,
            },
        }];
        assert!(validate_config(&config).is_ok());

        // CONFIRMED -> PRODUCTION_PLANNED is management only.
        config.escalation.rules[0] = EscalationRule {
            status: OrderStatus::Confirmed,
            after_hours: 1.0,
            action: EscalationAction::AutoApprove {
                to: OrderStatus::ProductionPlanned,
            },
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_bad_pipeline_override() {
        let mut config = Config::default();
        config.pipelines = vec![PipelineDefinition {
            method: ProductionMethod::Dtf,
            steps: vec![StepTemplate::new("PRINT", Role::Printer, 2.0).depends_on(&["LATER"])],
        }];
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("pipelines"));
    }
}
