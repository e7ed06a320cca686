//! Assignment strategies and escalation sweeps through the engine.

use std::path::Path;
use std::sync::Arc;

use chrono::Duration;
use tempfile::TempDir;

use fulfillment_core::{
    notifier::NotificationPriority,
    pipeline::steps,
    testing::{fixtures, ManualClock, MockNotifier},
    AssignmentRule, Config, EngineStores, FulfillmentEngine, Operator, Order, OrderStatus,
    ProductionMethod, Role, StrategyKind, Task,
};

struct Setup {
    engine: FulfillmentEngine,
    clock: Arc<ManualClock>,
    notifier: Arc<MockNotifier>,
}

fn engine_at(config: &Config, db_path: &Path, clock: Arc<ManualClock>) -> Setup {
    let notifier = Arc::new(MockNotifier::new());
    let engine = FulfillmentEngine::new(
        config,
        EngineStores::open(db_path).expect("Failed to open stores"),
        notifier.clone(),
        clock.clone(),
        None,
    )
    .expect("Failed to create engine");
    Setup {
        engine,
        clock,
        notifier,
    }
}

fn rule(role: Role, strategy: StrategyKind) -> AssignmentRule {
    AssignmentRule {
        role,
        strategy,
        consider_workload: false,
        consider_skills: strategy == StrategyKind::SkillBased,
        consider_efficiency: false,
        consider_availability: true,
    }
}

async fn plan(s: &Setup, method: ProductionMethod) -> Order {
    let order = s
        .engine
        .create_order(fixtures::order_request(method, 14))
        .unwrap();
    let e = &s.engine;
    e.transition_order(&order.id, OrderStatus::DesignPending, "csr", Role::CsrAgent, None)
        .await
        .unwrap();
    e.add_design_asset(&order.id, "art.png", "ga").unwrap();
    e.transition_order(&order.id, OrderStatus::DesignApproval, "ga", Role::GraphicArtist, None)
        .await
        .unwrap();
    e.transition_order(&order.id, OrderStatus::Confirmed, "client", Role::Client, None)
        .await
        .unwrap();
    e.transition_order(&order.id, OrderStatus::ProductionPlanned, "mgr", Role::Manager, None)
        .await
        .unwrap()
}

fn task(s: &Setup, order_id: &str, step: &str) -> Task {
    s.engine
        .tasks()
        .list_for_order(order_id)
        .unwrap()
        .into_iter()
        .find(|t| t.step_name == step)
        .unwrap()
}

fn crew_without(roles: &[Role]) -> Vec<Operator> {
    fixtures::crew()
        .into_iter()
        .filter(|o| !roles.contains(&o.role))
        .collect()
}

#[tokio::test]
async fn test_round_robin_rotates_cutters() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.assignment.operators = crew_without(&[Role::Cutter]);
    config
        .assignment
        .operators
        .push(Operator::new("cut-a", "Ana", Role::Cutter));
    config
        .assignment
        .operators
        .push(Operator::new("cut-b", "Ben", Role::Cutter));
    config.assignment.rules = vec![rule(Role::Cutter, StrategyKind::RoundRobin)];

    let clock = Arc::new(ManualClock::new(fixtures::fixed_now()));
    let s = engine_at(&config, &temp_dir.path().join("rr.db"), clock);

    let mut cutters = Vec::new();
    for _ in 0..3 {
        let order = plan(&s, ProductionMethod::Silkscreen).await;
        cutters.push(task(&s, &order.id, steps::CUTTING).assigned_operator.unwrap());
        s.clock.advance(Duration::hours(1));
    }

    assert_eq!(cutters, vec!["cut-a", "cut-b", "cut-a"]);
}

#[tokio::test]
async fn test_skill_based_picks_qualified_printer() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.assignment.operators = crew_without(&[Role::Printer]);
    config
        .assignment
        .operators
        .push(Operator::new("prn-a", "Al", Role::Printer).with_skills(&["dtf"]));
    config
        .assignment
        .operators
        .push(Operator::new("prn-b", "Bea", Role::Printer).with_skills(&["silkscreen"]));
    config.assignment.rules = vec![rule(Role::Printer, StrategyKind::SkillBased)];

    let clock = Arc::new(ManualClock::new(fixtures::fixed_now()));
    let s = engine_at(&config, &temp_dir.path().join("skills.db"), clock);
    let order = plan(&s, ProductionMethod::Silkscreen).await;

    for step in [steps::GRAPHIC_DESIGN, steps::SCREEN_MAKING, steps::CUTTING] {
        let t = task(&s, &order.id, step);
        s.engine.complete_task(&t.id, "x").await.unwrap();
    }

    let printing = task(&s, &order.id, steps::PRINTING);
    assert_eq!(printing.assigned_operator.as_deref(), Some("prn-b"));
    assert_eq!(s.notifier.notifications_for_operator("prn-b").len(), 1);
    assert!(s.notifier.notifications_for_operator("prn-a").is_empty());
}

#[tokio::test]
async fn test_assignment_pass_picks_up_late_operators() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::default();
    let clock = Arc::new(ManualClock::new(fixtures::fixed_now()));
    let s = engine_at(&config, &temp_dir.path().join("late.db"), clock);

    let order = plan(&s, ProductionMethod::Silkscreen).await;
    let unassigned = s.engine.status().unwrap().unassigned_tasks;
    assert_eq!(unassigned, 9);

    for operator in fixtures::crew() {
        s.engine.operators().upsert_operator(&operator).unwrap();
    }

    // Graphic design, cutting and the two design-phase trigger tasks. The
    // five tasks still waiting on them stay out of the batch.
    let summary = s.engine.run_assignment_pass().await.unwrap();
    assert_eq!(summary.scanned, 4);
    assert_eq!(summary.assigned, 4);
    assert_eq!(summary.blocked, 0);
    assert_eq!(summary.errors, 0);

    let gd = task(&s, &order.id, steps::GRAPHIC_DESIGN);
    assert_eq!(gd.assigned_operator.as_deref(), Some("graphic_artist-1"));
    // Every stamp comes from the engine clock.
    assert_eq!(order.created_at, fixtures::fixed_now());
    assert_eq!(gd.created_at, fixtures::fixed_now());
    assert_eq!(gd.assigned_at, Some(fixtures::fixed_now()));
    assert_eq!(s.engine.status().unwrap().unassigned_tasks, 5);

    let again = s.engine.run_assignment_pass().await.unwrap();
    assert_eq!(again.assigned, 0);
    assert_eq!(again.scanned, 0);
}

#[tokio::test]
async fn test_busy_operator_is_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.assignment.busy_threshold = 1;
    config.assignment.operators = crew_without(&[Role::Cutter]);
    config
        .assignment
        .operators
        .push(Operator::new("cut-a", "Ana", Role::Cutter));

    let clock = Arc::new(ManualClock::new(fixtures::fixed_now()));
    let s = engine_at(&config, &temp_dir.path().join("busy.db"), clock);

    let first = plan(&s, ProductionMethod::Dtf).await;
    assert_eq!(
        task(&s, &first.id, steps::CUTTING).assigned_operator.as_deref(),
        Some("cut-a")
    );

    let second = plan(&s, ProductionMethod::Dtf).await;
    assert!(task(&s, &second.id, steps::CUTTING).assigned_operator.is_none());

    // Finishing the first cut frees the operator for the next pass.
    let cut = task(&s, &first.id, steps::CUTTING);
    s.engine.complete_task(&cut.id, "cut-a").await.unwrap();
    s.engine.run_assignment_pass().await.unwrap();
    assert_eq!(
        task(&s, &second.id, steps::CUTTING).assigned_operator.as_deref(),
        Some("cut-a")
    );
}

#[tokio::test]
async fn test_pending_escalation_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("escalations.db");
    let config = Config::default();

    let order_id = {
        let clock = Arc::new(ManualClock::new(fixtures::fixed_now()));
        let s = engine_at(&config, &db_path, clock);
        let order = s
            .engine
            .create_order(fixtures::order_request(ProductionMethod::Sublimation, 10))
            .unwrap();
        s.engine
            .transition_order(&order.id, OrderStatus::DesignPending, "csr", Role::CsrAgent, None)
            .await
            .unwrap();
        s.engine.add_design_asset(&order.id, "a.png", "ga").unwrap();
        s.engine
            .transition_order(&order.id, OrderStatus::DesignApproval, "ga", Role::GraphicArtist, None)
            .await
            .unwrap();
        assert_eq!(s.engine.status().unwrap().pending_escalations, 1);
        order.id
    };

    // A new process, two days later.
    let clock = Arc::new(ManualClock::new(fixtures::fixed_now() + Duration::hours(49)));
    let s = engine_at(&config, &db_path, clock);
    let summary = s.engine.run_escalation_sweep().await.unwrap();
    assert_eq!(summary.fired, 1);

    let reminders = s.notifier.notifications_for_role(Role::CsrAgent);
    assert_eq!(reminders.len(), 1);
    assert_eq!(reminders[0].priority, NotificationPriority::High);
    assert!(reminders[0].message.contains(&order_id));

    // Fired jobs do not fire twice.
    let summary = s.engine.run_escalation_sweep().await.unwrap();
    assert_eq!(summary.fired, 0);
}
