//! Clearing across DAG boundaries through External Task Markers.

mod common;

use common::*;
use dagflow_core::clearing::{ClearError, ClearOptions, ClearingService};
use dagflow_core::config::ClearingConfig;
use dagflow_core::constants::events;
use dagflow_core::events::EventPublisher;
use dagflow_core::models::{DagRegistry, TaskInstanceKey};
use dagflow_core::persistence::{InMemoryRunStore, RunStore};
use dagflow_core::state_machine::{DagRunState, TaskInstanceState};
use std::sync::Arc;

struct Scenario {
    registry: Arc<DagRegistry>,
    store: Arc<InMemoryRunStore>,
    service: ClearingService,
    publisher: EventPublisher,
}

impl Scenario {
    fn new(dags: Vec<dagflow_core::models::Dag>) -> Self {
        init_test_logging();
        let registry = registry_of(dags);
        let store = Arc::new(InMemoryRunStore::new());
        let publisher = EventPublisher::default();
        let service = ClearingService::new(
            Arc::clone(&registry),
            Arc::clone(&store) as Arc<dyn RunStore>,
            ClearingConfig::default(),
            publisher.clone(),
        );
        Self {
            registry,
            store,
            service,
            publisher,
        }
    }

    fn run_tasks(&self, date: chrono::DateTime<chrono::Utc>) {
        run_all_tasks(&self.registry, &self.store, date);
    }

    fn state(&self, dag_id: &str, task_id: &str, date: chrono::DateTime<chrono::Utc>) -> TaskInstanceState {
        self.store
            .task_instance(&TaskInstanceKey::new(dag_id, task_id, date))
            .expect("instance exists")
            .state
    }
}

#[tokio::test]
async fn test_external_task_marker_transitive() {
    let scenario = Scenario::new(marker_chain(3));
    let date = default_date();
    scenario.run_tasks(date);

    let outcome = scenario
        .service
        .clear("dag_0", "task_a_0", date, Some(date), ClearOptions::default())
        .await
        .unwrap();

    // Both tasks of all four DAGs
    assert_eq!(outcome.count(), 8);
    assert_eq!(scenario.state("dag_0", "task_a_0", date), TaskInstanceState::None);
    assert_eq!(scenario.state("dag_3", "task_b_3", date), TaskInstanceState::None);

    // Touched runs go back to RUNNING
    assert_eq!(outcome.reset_runs.len(), 4);
    let run = scenario.store.dag_run("dag_3", date).unwrap();
    assert_eq!(run.state, DagRunState::Running);
}

#[tokio::test]
async fn test_external_task_marker_future() {
    let scenario = Scenario::new(marker_chain(3));
    let date_0 = default_date();
    let date_1 = days_after(date_0, 1);
    scenario.run_tasks(date_0);
    scenario.run_tasks(date_1);

    let outcome = scenario
        .service
        .clear("dag_0", "task_a_0", date_0, None, ClearOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.count(), 16);
    assert_eq!(scenario.state("dag_0", "task_a_0", date_0), TaskInstanceState::None);
    assert_eq!(scenario.state("dag_3", "task_b_3", date_0), TaskInstanceState::None);
    assert_eq!(scenario.state("dag_3", "task_b_3", date_1), TaskInstanceState::None);
}

#[tokio::test]
async fn test_external_task_marker_exception() {
    let scenario = Scenario::new(marker_chain(2));
    let date = default_date();
    scenario.run_tasks(date);

    let err = scenario
        .service
        .clear("dag_0", "task_a_0", date, Some(date), ClearOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ClearError::MaxRecursionDepthExceeded { max_depth: 2, .. }));
    assert!(err.to_string().contains("Maximum recursion depth 2"));

    // Resolution failed before anything was written
    assert_eq!(scenario.state("dag_0", "task_a_0", date), TaskInstanceState::Success);
    assert_eq!(scenario.state("dag_3", "task_b_3", date), TaskInstanceState::Success);
    assert_eq!(
        scenario.store.dag_run("dag_0", date).unwrap().state,
        DagRunState::Success
    );
}

#[tokio::test]
async fn test_external_task_marker_cyclic() {
    let scenario = Scenario::new(marker_cycle());
    let date = default_date();
    scenario.run_tasks(date);

    let err = scenario
        .service
        .clear("dag_0", "task_a_0", date, Some(date), ClearOptions::default())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("Maximum recursion depth 3"));
}

#[tokio::test]
async fn test_clear_multiple_external_task_marker() {
    let scenario = Scenario::new(marker_fan_out());
    let agg_task_count = scenario.registry.get("agg_dag").unwrap().task_count();
    assert_eq!(agg_task_count, 26);

    let mut last = default_date();
    for delta in 0..agg_task_count as i64 {
        last = days_after(default_date(), delta);
        scenario.run_tasks(last);
    }

    let outcome = scenario
        .service
        .clear("agg_dag", "start", last, Some(last), ClearOptions::default())
        .await
        .unwrap();

    // 26 agg_dag instances plus one daily_dag instance per marker offset
    assert_eq!(outcome.count(), 51);
    assert_eq!(
        scenario.state("daily_dag", "daily_tas", days_after(last, -24)),
        TaskInstanceState::None
    );
    // Earlier than the furthest offset: untouched
    assert_eq!(
        scenario.state("daily_dag", "daily_tas", days_after(last, -25)),
        TaskInstanceState::Success
    );
}

#[tokio::test]
async fn test_dry_run_reports_without_writing() {
    let scenario = Scenario::new(marker_chain(3));
    let date = default_date();
    scenario.run_tasks(date);

    let outcome = scenario
        .service
        .clear("dag_0", "task_a_0", date, Some(date), ClearOptions { dry_run: true })
        .await
        .unwrap();

    assert_eq!(outcome.count(), 8);
    assert!(outcome.reset_runs.is_empty());
    assert!(outcome
        .cleared
        .iter()
        .all(|ti| ti.state == TaskInstanceState::Success));
    assert_eq!(scenario.state("dag_3", "task_b_3", date), TaskInstanceState::Success);
}

#[tokio::test]
async fn test_clear_extends_retry_budget_and_publishes() {
    let scenario = Scenario::new(marker_chain(3));
    let date = default_date();
    scenario.run_tasks(date);
    let mut events_rx = scenario.publisher.subscribe();

    scenario
        .service
        .clear("dag_3", "task_b_3", date, Some(date), ClearOptions::default())
        .await
        .unwrap();

    let cleared = scenario
        .store
        .task_instance(&TaskInstanceKey::new("dag_3", "task_b_3", date))
        .unwrap();
    assert_eq!(cleared.state, TaskInstanceState::None);
    assert_eq!(cleared.max_tries, cleared.try_number);
    // Upstream of the cleared task is left alone
    assert_eq!(scenario.state("dag_3", "task_a_3", date), TaskInstanceState::Success);

    let event = events_rx.recv().await.unwrap();
    assert_eq!(event.name, events::TASK_INSTANCES_CLEARED);
    assert_eq!(event.context["count"], 1);
}

#[tokio::test]
async fn test_unknown_task_is_rejected() {
    let scenario = Scenario::new(marker_chain(3));
    let err = scenario
        .service
        .clear("dag_0", "missing", default_date(), None, ClearOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ClearError::TaskNotFound { .. }));
}
