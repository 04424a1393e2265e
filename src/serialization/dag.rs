//! DAG-level encoding.

use super::encoding::{
    decode_datetime, decode_strings, decode_timedelta, encode_datetime, encode_set, encode_timedelta,
    tag_of, unwrap, wrap, TypeTag,
};
use super::operator::{decode_params, deserialize_task, encode_params, serialize_task, OperatorRegistry};
use super::{SerializationError, SerializationResult};
use crate::models::{Dag, RelativeDelta, ScheduleInterval};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub fn encode_schedule(schedule: &ScheduleInterval) -> SerializationResult<Value> {
    Ok(match schedule {
        ScheduleInterval::None => Value::Null,
        ScheduleInterval::Once => Value::from("@once"),
        ScheduleInterval::Cron(cron) => Value::from(cron.expression()),
        ScheduleInterval::Every(duration) => encode_timedelta(*duration),
        ScheduleInterval::Relative(delta) => wrap(TypeTag::RelativeDelta, serde_json::to_value(delta)?),
    })
}

pub fn decode_schedule(value: &Value) -> SerializationResult<ScheduleInterval> {
    match value {
        Value::Null => Ok(ScheduleInterval::None),
        Value::String(expression) => Ok(ScheduleInterval::parse(expression)?),
        _ => match tag_of(value) {
            Some(TypeTag::Timedelta) => Ok(ScheduleInterval::Every(decode_timedelta(value)?)),
            Some(TypeTag::RelativeDelta) => {
                let delta: RelativeDelta =
                    serde_json::from_value(unwrap(value, TypeTag::RelativeDelta)?.clone())?;
                Ok(ScheduleInterval::Relative(delta))
            }
            _ => Err(SerializationError::malformed(format!(
                "unsupported schedule_interval {value}"
            ))),
        },
    }
}

/// Allow-listed DAG fields and every task, as a tagged `dag` node
pub fn serialize_dag(dag: &Dag) -> SerializationResult<Value> {
    let mut fields = Map::new();
    fields.insert("dag_id".into(), Value::from(dag.dag_id.as_str()));
    if let Some(description) = &dag.description {
        fields.insert("description".into(), Value::from(description.as_str()));
    }
    if let Some(fileloc) = &dag.fileloc {
        fields.insert("fileloc".into(), Value::from(fileloc.as_str()));
    }
    fields.insert("schedule_interval".into(), encode_schedule(&dag.schedule_interval)?);
    if let Some(start_date) = dag.start_date {
        fields.insert("start_date".into(), encode_datetime(start_date));
    }
    if let Some(end_date) = dag.end_date {
        fields.insert("end_date".into(), encode_datetime(end_date));
    }
    fields.insert(
        "timezone".into(),
        wrap(TypeTag::Timezone, Value::from(dag.timezone.as_str())),
    );
    fields.insert("catchup".into(), Value::from(dag.catchup));
    fields.insert("concurrency".into(), Value::from(dag.concurrency));
    fields.insert("max_active_runs".into(), Value::from(dag.max_active_runs));
    fields.insert("tags".into(), encode_set(&dag.tags));
    fields.insert("params".into(), encode_params(&dag.params));
    if let Some(last_loaded) = dag.last_loaded {
        fields.insert("last_loaded".into(), encode_datetime(last_loaded));
    }

    let tasks: Map<String, Value> = dag
        .tasks()
        .map(|task| (task.task_id.clone(), serialize_task(task)))
        .collect();
    fields.insert("task_dict".into(), wrap(TypeTag::Dict, Value::Object(tasks)));

    Ok(wrap(TypeTag::Dag, Value::Object(fields)))
}

/// Rebuild a DAG from a `dag` node.
///
/// Upstream edges are reconstructed from each task's `downstream_task_ids`; the result is
/// validated as a whole graph.
pub fn deserialize_dag(value: &Value, registry: &OperatorRegistry) -> SerializationResult<Dag> {
    let fields = unwrap(value, TypeTag::Dag)?
        .as_object()
        .ok_or_else(|| SerializationError::malformed("dag payload must be an object"))?;
    let get = |key: &str| fields.get(key).filter(|v| !v.is_null());

    let dag_id = get("dag_id")
        .and_then(Value::as_str)
        .ok_or_else(|| SerializationError::malformed("dag without dag_id"))?;
    let mut dag = Dag::new(dag_id)?;

    dag.description = get("description").and_then(Value::as_str).map(str::to_string);
    dag.fileloc = get("fileloc").and_then(Value::as_str).map(str::to_string);
    dag.schedule_interval = decode_schedule(fields.get("schedule_interval").unwrap_or(&Value::Null))?;
    dag.start_date = get("start_date").map(decode_datetime).transpose()?;
    dag.end_date = get("end_date").map(decode_datetime).transpose()?;
    if let Some(timezone) = get("timezone") {
        dag.timezone = unwrap(timezone, TypeTag::Timezone)?
            .as_str()
            .ok_or_else(|| SerializationError::malformed("timezone payload must be a string"))?
            .to_string();
    }
    if let Some(catchup) = get("catchup").and_then(Value::as_bool) {
        dag.catchup = catchup;
    }
    if let Some(concurrency) = get("concurrency").and_then(Value::as_u64) {
        dag.concurrency = u32::try_from(concurrency)
            .map_err(|_| SerializationError::malformed("concurrency out of range"))?;
    }
    if let Some(max_active_runs) = get("max_active_runs").and_then(Value::as_u64) {
        dag.max_active_runs = u32::try_from(max_active_runs)
            .map_err(|_| SerializationError::malformed("max_active_runs out of range"))?;
    }
    if let Some(tags) = get("tags") {
        dag.tags = decode_strings(tags)?.into_iter().collect();
    }
    dag.params = decode_params(get("params"))?;
    dag.last_loaded = get("last_loaded").map(decode_datetime).transpose()?;

    let task_dict = get("task_dict")
        .ok_or_else(|| SerializationError::malformed("dag without task_dict"))
        .and_then(|v| unwrap(v, TypeTag::Dict))?
        .as_object()
        .ok_or_else(|| SerializationError::malformed("task_dict payload must be an object"))?;

    let mut upstream: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut tasks = Vec::with_capacity(task_dict.len());
    for (key, node) in task_dict {
        let (mut task, downstream) = deserialize_task(node, registry)?;
        if &task.task_id != key {
            return Err(SerializationError::malformed(format!(
                "task_dict key '{key}' does not match task_id '{}'",
                task.task_id
            )));
        }
        for child in &downstream {
            upstream
                .entry(child.clone())
                .or_default()
                .push(task.task_id.clone());
        }
        task.dag_id = dag.dag_id.clone();
        if task.start_date.is_none() {
            task.start_date = dag.start_date;
        }
        task.downstream_task_ids = downstream;
        tasks.push(task);
    }
    for mut task in tasks {
        if let Some(parents) = upstream.remove(&task.task_id) {
            task.upstream_task_ids.extend(parents);
        }
        dag.insert_task_unchecked(task);
    }

    dag.validate()?;
    Ok(dag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Task;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn test_schedule_forms() {
        assert_eq!(encode_schedule(&ScheduleInterval::None).unwrap(), Value::Null);
        assert_eq!(encode_schedule(&ScheduleInterval::Once).unwrap(), Value::from("@once"));

        let daily = encode_schedule(&ScheduleInterval::Every(Duration::days(1))).unwrap();
        assert_eq!(tag_of(&daily), Some(TypeTag::Timedelta));
        assert_eq!(decode_schedule(&daily).unwrap(), ScheduleInterval::Every(Duration::days(1)));

        let monthly = ScheduleInterval::Relative(RelativeDelta::months(1));
        assert_eq!(decode_schedule(&encode_schedule(&monthly).unwrap()).unwrap(), monthly);
    }

    #[test]
    fn test_edges_are_rebuilt_from_downstream_ids() {
        let mut dag = Dag::new("edges")
            .unwrap()
            .with_start_date(Utc.with_ymd_and_hms(2019, 8, 1, 0, 0, 0).unwrap());
        for id in ["a", "b", "c"] {
            dag.add_task(Task::new(id)).unwrap();
        }
        dag.chain(&["a", "b", "c"]).unwrap();

        let decoded = deserialize_dag(&serialize_dag(&dag).unwrap(), &OperatorRegistry::default()).unwrap();
        let b = decoded.task("b").unwrap();
        assert!(b.upstream_task_ids.contains("a"));
        assert!(b.downstream_task_ids.contains("c"));
        assert_eq!(b.dag_id, "edges");
        assert_eq!(b.start_date, dag.start_date);
    }

    #[test]
    fn test_dangling_downstream_id_is_rejected() {
        let mut dag = Dag::new("dangling").unwrap();
        dag.add_task(Task::new("a")).unwrap();
        let mut payload = serialize_dag(&dag).unwrap();
        payload["__var"]["task_dict"]["__var"]["a"]["__var"]["downstream_task_ids"]["__var"] =
            serde_json::json!(["ghost"]);

        let err = deserialize_dag(&payload, &OperatorRegistry::default()).unwrap_err();
        assert!(matches!(err, SerializationError::Configuration(_)));
    }
}
