//! Operator selection strategies.
//!
//! Candidates arrive already filtered and ordered by the engine; on a tie
//! each strategy keeps the earliest candidate.

use std::collections::HashMap;
use std::sync::Arc;

use super::types::{Candidate, StrategyKind};

/// Picks one candidate for a task.
pub trait AssignmentStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn select<'a>(
        &self,
        candidates: &'a [Candidate],
        required_skills: &[String],
    ) -> Option<&'a Candidate>;
}

/// Oldest (or missing) last-assignment time wins.
pub struct RoundRobin;

impl AssignmentStrategy for RoundRobin {
    fn kind(&self) -> StrategyKind {
        StrategyKind::RoundRobin
    }

    fn select<'a>(
        &self,
        candidates: &'a [Candidate],
        _required_skills: &[String],
    ) -> Option<&'a Candidate> {
        // None sorts before Some, so never-assigned operators go first.
        candidates
            .iter()
            .min_by_key(|c| c.operator.last_assigned_at)
    }
}

/// Fewest open hours wins.
pub struct LeastLoaded;

impl AssignmentStrategy for LeastLoaded {
    fn kind(&self) -> StrategyKind {
        StrategyKind::LeastLoaded
    }

    fn select<'a>(
        &self,
        candidates: &'a [Candidate],
        _required_skills: &[String],
    ) -> Option<&'a Candidate> {
        let mut best: Option<&Candidate> = None;
        for candidate in candidates {
            match best {
                Some(b) if candidate.workload.open_hours >= b.workload.open_hours => {}
                _ => best = Some(candidate),
            }
        }
        best
    }
}

/// Highest efficiency score wins.
pub struct EfficiencyBased;

impl AssignmentStrategy for EfficiencyBased {
    fn kind(&self) -> StrategyKind {
        StrategyKind::EfficiencyBased
    }

    fn select<'a>(
        &self,
        candidates: &'a [Candidate],
        _required_skills: &[String],
    ) -> Option<&'a Candidate> {
        let mut best: Option<&Candidate> = None;
        for candidate in candidates {
            match best {
                Some(b) if candidate.efficiency <= b.efficiency => {}
                _ => best = Some(candidate),
            }
        }
        best
    }
}

/// Most required skills held wins.
pub struct SkillBased;

impl AssignmentStrategy for SkillBased {
    fn kind(&self) -> StrategyKind {
        StrategyKind::SkillBased
    }

    fn select<'a>(
        &self,
        candidates: &'a [Candidate],
        required_skills: &[String],
    ) -> Option<&'a Candidate> {
        let mut best: Option<(&Candidate, usize)> = None;
        for candidate in candidates {
            let overlap = candidate.operator.skill_overlap(required_skills);
            match best {
                Some((_, best_overlap)) if overlap <= best_overlap => {}
                _ => best = Some((candidate, overlap)),
            }
        }
        best.map(|(c, _)| c)
    }
}

/// Strategies keyed by kind.
#[derive(Clone)]
pub struct StrategyRegistry {
    strategies: HashMap<StrategyKind, Arc<dyn AssignmentStrategy>>,
}

impl StrategyRegistry {
    pub fn empty() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// Registry with every built-in strategy.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(RoundRobin));
        registry.register(Arc::new(LeastLoaded));
        registry.register(Arc::new(EfficiencyBased));
        registry.register(Arc::new(SkillBased));
        registry
    }

    /// Add or replace the strategy for its kind.
    pub fn register(&mut self, strategy: Arc<dyn AssignmentStrategy>) {
        self.strategies.insert(strategy.kind(), strategy);
    }

    pub fn get(&self, kind: StrategyKind) -> Option<&Arc<dyn AssignmentStrategy>> {
        self.strategies.get(&kind)
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::{Availability, Operator};
    use crate::order::Role;
    use crate::task::OperatorWorkload;
    use chrono::{Duration, Utc};

    fn candidate(id: &str, open_hours: f64, efficiency: u32, skills: &[&str]) -> Candidate {
        Candidate {
            operator: Operator::new(id, id, Role::Printer).with_skills(skills),
            workload: OperatorWorkload {
                open_tasks: (open_hours / 2.0) as u32,
                open_hours,
                completed_recent: efficiency / 10,
            },
            efficiency,
            availability: Availability::Available,
        }
    }

    fn skills(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_pool_selects_nothing() {
        let registry = StrategyRegistry::standard();
        for kind in StrategyKind::ALL {
            assert!(registry.get(kind).unwrap().select(&[], &[]).is_none());
        }
    }

    #[test]
    fn test_round_robin_prefers_never_assigned_then_oldest() {
        let now = Utc::now();
        let mut a = candidate("a", 0.0, 0, &[]);
        a.operator.last_assigned_at = Some(now - Duration::hours(1));
        let mut b = candidate("b", 0.0, 0, &[]);
        b.operator.last_assigned_at = Some(now - Duration::hours(5));
        let c = candidate("c", 0.0, 0, &[]);

        let pool = vec![a.clone(), b.clone(), c];
        assert_eq!(RoundRobin.select(&pool, &[]).unwrap().operator.id, "c");

        let pool = vec![a, b];
        assert_eq!(RoundRobin.select(&pool, &[]).unwrap().operator.id, "b");
    }

    #[test]
    fn test_least_loaded_picks_global_minimum() {
        let pool = vec![
            candidate("a", 9.0, 0, &[]),
            candidate("b", 2.5, 0, &[]),
            candidate("c", 7.0, 0, &[]),
            candidate("d", 2.5, 0, &[]),
        ];
        let chosen = LeastLoaded.select(&pool, &[]).unwrap();
        let min = pool
            .iter()
            .map(|c| c.workload.open_hours)
            .fold(f64::INFINITY, f64::min);
        assert_eq!(chosen.workload.open_hours, min);
        assert_eq!(chosen.operator.id, "b");
    }

    #[test]
    fn test_efficiency_based_first_maximum() {
        let pool = vec![
            candidate("a", 0.0, 40, &[]),
            candidate("b", 0.0, 90, &[]),
            candidate("c", 0.0, 90, &[]),
        ];
        assert_eq!(EfficiencyBased.select(&pool, &[]).unwrap().operator.id, "b");
    }

    #[test]
    fn test_skill_based_maximum_overlap() {
        let pool = vec![
            candidate("a", 0.0, 0, &["dtf"]),
            candidate("b", 0.0, 0, &["dtf", "heat_press"]),
            candidate("c", 0.0, 0, &["heat_press", "dtf"]),
        ];
        let required = skills(&["dtf", "heat_press"]);
        assert_eq!(SkillBased.select(&pool, &required).unwrap().operator.id, "b");
    }

    #[test]
    fn test_skill_based_without_matches_picks_first() {
        let pool = vec![
            candidate("a", 0.0, 0, &["sewing"]),
            candidate("b", 0.0, 0, &[]),
        ];
        let required = skills(&["embroidery"]);
        assert_eq!(SkillBased.select(&pool, &required).unwrap().operator.id, "a");
    }

    #[test]
    fn test_register_replaces_by_kind() {
        struct AlwaysLast;
        impl AssignmentStrategy for AlwaysLast {
            fn kind(&self) -> StrategyKind {
                StrategyKind::RoundRobin
            }
            fn select<'a>(&self, c: &'a [Candidate], _: &[String]) -> Option<&'a Candidate> {
                c.last()
            }
        }

        let mut registry = StrategyRegistry::standard();
        registry.register(Arc::new(AlwaysLast));
        let pool = vec![candidate("a", 0.0, 0, &[]), candidate("b", 0.0, 0, &[])];
        let chosen = registry
            .get(StrategyKind::RoundRobin)
            .unwrap()
            .select(&pool, &[]);
        assert_eq!(chosen.unwrap().operator.id, "b");
    }
}
