//! Operators, assignment rules and candidate scoring inputs.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::order::Role;
use crate::task::OperatorWorkload;

/// Efficiency points per task completed inside the window.
const EFFICIENCY_PER_TASK: u32 = 10;
const MAX_EFFICIENCY: u32 = 100;

/// How an operator is picked among candidates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    RoundRobin,
    LeastLoaded,
    EfficiencyBased,
    SkillBased,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::RoundRobin,
        StrategyKind::LeastLoaded,
        StrategyKind::EfficiencyBased,
        StrategyKind::SkillBased,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::RoundRobin => "round_robin",
            StrategyKind::LeastLoaded => "least_loaded",
            StrategyKind::EfficiencyBased => "efficiency_based",
            StrategyKind::SkillBased => "skill_based",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StrategyKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown assignment strategy: {}", s))
    }
}

/// Derived from the operator's active flag and open-task count.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Available,
    Busy,
    Unavailable,
}

/// A person who performs tasks for one role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Operator {
    pub id: String,
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_assigned_at: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

impl Operator {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role,
            skills: Vec::new(),
            active: true,
            last_assigned_at: None,
        }
    }

    pub fn with_skills(mut self, skills: &[&str]) -> Self {
        self.skills = skills.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn has_all_skills(&self, required: &[String]) -> bool {
        required.iter().all(|r| self.skills.contains(r))
    }

    pub fn skill_overlap(&self, required: &[String]) -> usize {
        required.iter().filter(|r| self.skills.contains(r)).count()
    }
}

/// Strategy and factor flags for one role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssignmentRule {
    pub role: Role,
    pub strategy: StrategyKind,
    /// Prefer lower open hours when ordering candidates.
    #[serde(default)]
    pub consider_workload: bool,
    /// Narrow the pool to operators holding every required skill.
    #[serde(default)]
    pub consider_skills: bool,
    /// Prefer higher efficiency when ordering candidates.
    #[serde(default)]
    pub consider_efficiency: bool,
    /// Only consider `Available` operators.
    #[serde(default = "default_active")]
    pub consider_availability: bool,
}

impl AssignmentRule {
    /// Rule used for roles without a configured one.
    pub fn default_for(role: Role) -> Self {
        Self {
            role,
            strategy: StrategyKind::LeastLoaded,
            consider_workload: false,
            consider_skills: false,
            consider_efficiency: false,
            consider_availability: true,
        }
    }
}

/// An operator with the figures the strategies score on.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub operator: Operator,
    pub workload: OperatorWorkload,
    pub efficiency: u32,
    pub availability: Availability,
}

impl Candidate {
    pub fn evaluate(operator: Operator, workload: OperatorWorkload, busy_threshold: u32) -> Self {
        let availability = availability_for(&operator, &workload, busy_threshold);
        Self {
            efficiency: efficiency_score(workload.completed_recent),
            availability,
            operator,
            workload,
        }
    }
}

/// Efficiency score from recent completions, capped at 100.
pub fn efficiency_score(completed_recent: u32) -> u32 {
    completed_recent
        .saturating_mul(EFFICIENCY_PER_TASK)
        .min(MAX_EFFICIENCY)
}

/// Inactive operators are unavailable; `busy_threshold` or more open tasks
/// makes an operator busy.
pub fn availability_for(
    operator: &Operator,
    workload: &OperatorWorkload,
    busy_threshold: u32,
) -> Availability {
    if !operator.active {
        Availability::Unavailable
    } else if workload.open_tasks >= busy_threshold {
        Availability::Busy
    } else {
        Availability::Available
    }
}
