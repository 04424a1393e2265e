//! Transport encoding of DAG definitions.

mod common;

use chrono::Duration;
use common::*;
use dagflow_core::config::SerializationConfig;
use dagflow_core::models::{
    Dag, ExecutionDateFn, ExternalTaskSensor, RelativeDelta, ScheduleInterval, Task, TaskKind, TriggerRule,
};
use dagflow_core::serialization::{
    first_difference, normalize_for_comparison, DagSerializer, OperatorRegistry, SerializationError,
};
use serde_json::{json, Value};

fn rich_dag() -> Dag {
    let sensor = ExternalTaskSensor::new(
        "wait_upstream",
        "upstream_dag",
        Some("publish".into()),
        Some(vec!["success".into(), "skipped".into()]),
        None,
        Some(ExecutionDateFn::new("previous_day", |d| d - Duration::days(1))),
    )
    .unwrap();

    let mut dag = DagBuilder::new("rich_dag")
        .schedule(ScheduleInterval::Every(Duration::days(1)))
        .task(Task::external_sensor("wait_upstream", sensor))
        .task(
            Task::new("transform")
                .with_retries(3)
                .with_trigger_rule(TriggerRule::NoneFailed)
                .with_param("target", json!({"table": "events", "partitions": [1, 2]}))
                .with_queue("heavy"),
        )
        .marker("notify_downstream", "downstream_dag", "ingest", 4)
        .edge("wait_upstream", "transform")
        .edge("transform", "notify_downstream")
        .build();
    dag.description = Some("Résumé of the day".to_string());
    dag.tags.insert("etl".to_string());
    dag.tags.insert("daily".to_string());
    dag.fileloc = Some("/dags/rich_dag.py".to_string());
    dag
}

#[test]
fn test_round_trip_preserves_structure() {
    let serializer = DagSerializer::default();
    let dag = rich_dag();

    let restored = serializer.from_json(&serializer.to_json(&dag).unwrap()).unwrap();

    assert_eq!(restored.dag_id, dag.dag_id);
    assert_eq!(restored.schedule_interval, dag.schedule_interval);
    assert_eq!(restored.description, dag.description);
    assert_eq!(restored.tags, dag.tags);
    assert_eq!(restored.task_count(), 3);
    for task in dag.tasks() {
        let other = restored.task(&task.task_id).unwrap();
        assert_eq!(other.task_type, task.task_type);
        assert_eq!(other.trigger_rule, task.trigger_rule);
        assert_eq!(other.retries, task.retries);
        assert_eq!(other.params, task.params);
        assert_eq!(other.upstream_task_ids, task.upstream_task_ids);
        assert_eq!(other.downstream_task_ids, task.downstream_task_ids);
    }
    assert_eq!(
        restored.task("notify_downstream").unwrap().marker(),
        dag.task("notify_downstream").unwrap().marker()
    );

    // The callable does not travel, its name does
    let sensor = restored.task("wait_upstream").unwrap().sensor().unwrap();
    let func = sensor.execution_date_fn.as_ref().unwrap();
    assert_eq!(func.name, "previous_day");
    assert!(func.func.is_none());
}

#[test]
fn test_serialization_is_deterministic_and_ascii() {
    let serializer = DagSerializer::default();
    let first = serializer.to_json(&rich_dag()).unwrap();
    let second = serializer.to_json(&rich_dag()).unwrap();

    assert_eq!(first, second);
    assert!(first.is_ascii());
    assert!(first.contains("R\\u00e9sum\\u00e9"));
}

#[test]
fn test_reserialization_is_stable() {
    let serializer = DagSerializer::default();
    let payload = serializer.serialize(&rich_dag()).unwrap();
    let again = serializer.serialize(&serializer.deserialize(&payload).unwrap()).unwrap();

    assert_eq!(first_difference(&payload, &again), None);
}

#[test]
fn test_unknown_operator_is_tolerated() {
    let serializer = DagSerializer::default();
    let mut payload = serializer.serialize(&rich_dag()).unwrap();
    let transform = &mut payload["__var"]["task_dict"]["__var"]["transform"]["__var"];
    transform["task_type"] = json!("SparkSubmitOperator");
    transform["ui_color"] = json!("#ff8800");
    transform["application"] = json!("/jobs/transform.py");

    let restored = serializer.deserialize(&payload).unwrap();
    let task = restored.task("transform").unwrap();
    assert_eq!(task.task_type, "SparkSubmitOperator");
    assert_eq!(task.ui_color, "#ff8800");
    assert_eq!(task.kind, TaskKind::Standard);
}

#[test]
fn test_receiver_without_marker_support_degrades() {
    let payload = DagSerializer::default().serialize(&rich_dag()).unwrap();
    let receiver = DagSerializer::default().with_operator_registry(OperatorRegistry::empty());

    let restored = receiver.deserialize(&payload).unwrap();
    let task = restored.task("notify_downstream").unwrap();
    assert_eq!(task.task_type, "ExternalTaskMarker");
    assert!(task.marker().is_none());
}

#[test]
fn test_schema_violations_are_reported() {
    let serializer = DagSerializer::default();
    let mut payload = serializer.serialize(&rich_dag()).unwrap();
    payload["__var"]["unexpected"] = json!(true);
    payload["__var"]["task_dict"]["__var"]["transform"]["__var"]["retries"] = json!(-1);

    match serializer.deserialize(&payload).unwrap_err() {
        SerializationError::SchemaValidation { errors } => {
            assert!(errors.len() >= 2, "{errors:?}");
            assert!(errors.iter().all(|e| e.starts_with("Property '")));
        }
        other => panic!("expected schema validation failure, got {other:?}"),
    }
}

#[test]
fn test_out_of_range_durations_are_rejected() {
    let serializer = DagSerializer::default();
    let payload = serializer.serialize(&rich_dag()).unwrap();

    let mut huge_delta = payload.clone();
    huge_delta["__var"]["schedule_interval"] =
        json!({"__type": "relativedelta", "__var": {"days": 1_000_000_000_000_000_i64}});
    assert!(matches!(
        serializer.deserialize(&huge_delta).unwrap_err(),
        SerializationError::SchemaValidation { .. }
    ));

    let mut huge_retry = payload;
    huge_retry["__var"]["task_dict"]["__var"]["transform"]["__var"]["retry_delay"] =
        json!({"__type": "timedelta", "__var": 1e18});
    assert!(matches!(
        serializer.deserialize(&huge_retry).unwrap_err(),
        SerializationError::SchemaValidation { .. }
    ));
}

#[test]
fn test_schedule_interval_forms_round_trip() {
    let serializer = DagSerializer::default();
    for schedule in [
        ScheduleInterval::None,
        ScheduleInterval::Once,
        ScheduleInterval::Every(Duration::hours(6)),
        ScheduleInterval::Relative(RelativeDelta::months(1)),
        ScheduleInterval::parse("0 3 * * *").unwrap(),
    ] {
        let dag = DagBuilder::new("scheduled").schedule(schedule.clone()).dummy("a").build();
        let restored = serializer.deserialize(&serializer.serialize(&dag).unwrap()).unwrap();
        assert_eq!(restored.schedule_interval, schedule);
    }
}

#[test]
fn test_comparison_ignores_load_time_fields() {
    let serializer = DagSerializer::default();
    let mut first = rich_dag();
    first.last_loaded = Some(default_date());
    let mut second = rich_dag();
    second.fileloc = Some("/elsewhere/rich_dag.py".to_string());

    let a: Value = serializer.serialize(&first).unwrap();
    let b: Value = serializer.serialize(&second).unwrap();
    assert!(first_difference(&a, &b).is_some());
    assert_eq!(
        first_difference(&normalize_for_comparison(&a), &normalize_for_comparison(&b)),
        None
    );
}

#[test]
fn test_outgoing_validation_can_be_disabled() {
    let serializer = DagSerializer::new(&SerializationConfig {
        validate_on_serialize: false,
    });
    assert!(serializer.serialize(&rich_dag()).is_ok());
}
