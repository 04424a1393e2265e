//! Operator (task) encoding and the registry of operator types a process understands.

use super::encoding::{
    decode_datetime, decode_strings, decode_timedelta, decode_value, encode_datetime, encode_set,
    encode_timedelta, encode_value, tag_of, unwrap, wrap, TypeTag,
};
use super::{SerializationError, SerializationResult};
use crate::constants::operators;
use crate::models::{
    ExecutionDateFn, ExecutionDateSpec, ExternalTaskMarker, ExternalTaskSensor, Task, TaskKind,
    TriggerRule,
};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// How a registered operator type is rebuilt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorKind {
    /// Only the common task fields matter
    Standard,
    ExternalMarker,
    ExternalSensor,
}

/// Operator types the receiving process can reconstruct.
///
/// Types missing from the registry still deserialize, as base tasks that keep their
/// `task_type` and UI colours.
#[derive(Debug, Clone)]
pub struct OperatorRegistry {
    kinds: BTreeMap<String, OperatorKind>,
}

impl OperatorRegistry {
    /// Registry with nothing registered; every operator degrades to a base task
    pub fn empty() -> Self {
        Self {
            kinds: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, task_type: impl Into<String>, kind: OperatorKind) -> &mut Self {
        self.kinds.insert(task_type.into(), kind);
        self
    }

    pub fn kind_of(&self, task_type: &str) -> Option<OperatorKind> {
        self.kinds.get(task_type).copied()
    }

    pub fn is_known(&self, task_type: &str) -> bool {
        self.kinds.contains_key(task_type)
    }
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register(operators::BASE_OPERATOR, OperatorKind::Standard)
            .register(operators::DUMMY_OPERATOR, OperatorKind::Standard)
            .register(operators::EXTERNAL_TASK_MARKER, OperatorKind::ExternalMarker)
            .register(operators::EXTERNAL_TASK_SENSOR, OperatorKind::ExternalSensor);
        registry
    }
}

/// Allow-listed fields of a task, as a tagged `operator` node. Absent optionals are omitted.
pub fn serialize_task(task: &Task) -> Value {
    let mut fields = Map::new();
    let mut put = |key: &str, value: Value| {
        fields.insert(key.to_string(), value);
    };

    put("task_id", Value::from(task.task_id.as_str()));
    put("task_type", Value::from(task.task_type.as_str()));
    put("trigger_rule", Value::from(task.trigger_rule.as_str()));
    put("depends_on_past", Value::from(task.depends_on_past));
    put("wait_for_downstream", Value::from(task.wait_for_downstream));
    put("retries", Value::from(task.retries));
    put("retry_delay", encode_timedelta(task.retry_delay));
    if let Some(cap) = task.task_concurrency {
        put("task_concurrency", Value::from(cap));
    }
    if let Some(start_date) = task.start_date {
        put("start_date", encode_datetime(start_date));
    }
    if let Some(end_date) = task.end_date {
        put("end_date", encode_datetime(end_date));
    }
    put("owner", Value::from(task.owner.as_str()));
    put("queue", Value::from(task.queue.as_str()));
    put("pool", Value::from(task.pool.as_str()));
    put("priority_weight", Value::from(task.priority_weight));
    if let Some(timeout) = task.execution_timeout {
        put("execution_timeout", encode_timedelta(timeout));
    }
    put("ui_color", Value::from(task.ui_color.as_str()));
    put("ui_fgcolor", Value::from(task.ui_fgcolor.as_str()));
    put(
        "template_fields",
        wrap(
            TypeTag::List,
            Value::Array(task.template_fields.iter().map(|f| Value::from(f.as_str())).collect()),
        ),
    );
    put("params", encode_params(&task.params));
    put("downstream_task_ids", encode_set(&task.downstream_task_ids));

    match &task.kind {
        TaskKind::Standard => {}
        TaskKind::ExternalMarker(marker) => {
            put("external_dag_id", Value::from(marker.external_dag_id.as_str()));
            put("external_task_id", Value::from(marker.external_task_id.as_str()));
            match marker.execution_date {
                ExecutionDateSpec::SameAsRun => {}
                ExecutionDateSpec::Offset(offset) => put("execution_date", encode_timedelta(offset)),
                ExecutionDateSpec::Absolute(date) => put("execution_date", encode_datetime(date)),
            }
            put("recursion_depth", Value::from(marker.recursion_depth));
        }
        TaskKind::ExternalSensor(sensor) => {
            put("external_dag_id", Value::from(sensor.external_dag_id.as_str()));
            if let Some(task_id) = &sensor.external_task_id {
                put("external_task_id", Value::from(task_id.as_str()));
            }
            put(
                "allowed_states",
                wrap(
                    TypeTag::List,
                    Value::Array(sensor.allowed_states.iter().map(|s| Value::from(s.as_str())).collect()),
                ),
            );
            if let Some(delta) = sensor.execution_delta {
                put("execution_delta", encode_timedelta(delta));
            }
            // Callables do not travel; only their name does
            if let Some(func) = &sensor.execution_date_fn {
                put("execution_date_fn", Value::from(func.name.as_str()));
            }
        }
    }

    wrap(TypeTag::Operator, Value::Object(fields))
}

pub(crate) fn encode_params(params: &BTreeMap<String, Value>) -> Value {
    wrap(
        TypeTag::Dict,
        Value::Object(params.iter().map(|(k, v)| (k.clone(), encode_value(v))).collect()),
    )
}

pub(crate) fn decode_params(value: Option<&Value>) -> SerializationResult<BTreeMap<String, Value>> {
    let Some(value) = value else {
        return Ok(BTreeMap::new());
    };
    match decode_value(value)? {
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => Err(SerializationError::malformed(format!("params must be a dict, found {other}"))),
    }
}

/// Typed accessors over an operator's field map
struct Fields<'a> {
    task_id: String,
    map: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key).filter(|v| !v.is_null())
    }

    fn invalid(&self, key: &str, expected: &str) -> SerializationError {
        SerializationError::malformed(format!(
            "operator '{}': field '{key}' must be {expected}",
            self.task_id
        ))
    }

    fn string(&self, key: &str) -> SerializationResult<Option<String>> {
        self.get(key)
            .map(|v| v.as_str().map(str::to_string).ok_or_else(|| self.invalid(key, "a string")))
            .transpose()
    }

    fn boolean(&self, key: &str) -> SerializationResult<Option<bool>> {
        self.get(key)
            .map(|v| v.as_bool().ok_or_else(|| self.invalid(key, "a boolean")))
            .transpose()
    }

    fn unsigned(&self, key: &str) -> SerializationResult<Option<u32>> {
        self.get(key)
            .map(|v| {
                v.as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| self.invalid(key, "a non-negative integer"))
            })
            .transpose()
    }

    fn signed(&self, key: &str) -> SerializationResult<Option<i32>> {
        self.get(key)
            .map(|v| {
                v.as_i64()
                    .and_then(|n| i32::try_from(n).ok())
                    .ok_or_else(|| self.invalid(key, "an integer"))
            })
            .transpose()
    }
}

/// Rebuild a task from an `operator` node.
///
/// Edges are left for the DAG to wire up; `downstream_task_ids` is returned alongside.
pub fn deserialize_task(
    value: &Value,
    registry: &OperatorRegistry,
) -> SerializationResult<(Task, BTreeSet<String>)> {
    let map = unwrap(value, TypeTag::Operator)?
        .as_object()
        .ok_or_else(|| SerializationError::malformed("operator payload must be an object"))?;
    let task_id = map
        .get("task_id")
        .and_then(Value::as_str)
        .ok_or_else(|| SerializationError::malformed("operator without task_id"))?
        .to_string();
    let fields = Fields {
        task_id: task_id.clone(),
        map,
    };
    let task_type = fields
        .string("task_type")?
        .unwrap_or_else(|| operators::BASE_OPERATOR.to_string());

    let kind = match registry.kind_of(&task_type) {
        Some(OperatorKind::ExternalMarker) => TaskKind::ExternalMarker(decode_marker(&fields)?),
        Some(OperatorKind::ExternalSensor) => TaskKind::ExternalSensor(decode_sensor(&fields)?),
        Some(OperatorKind::Standard) => TaskKind::Standard,
        None => {
            debug!(
                task_id = %task_id,
                task_type = %task_type,
                "Unknown operator type; deserializing as base task"
            );
            TaskKind::Standard
        }
    };

    let mut task = Task::new(task_id);
    task.task_type = task_type;
    task.kind = kind;
    if let Some(rule) = fields.string("trigger_rule")? {
        task.trigger_rule = TriggerRule::parse(&rule);
    }
    if let Some(flag) = fields.boolean("depends_on_past")? {
        task.depends_on_past = flag;
    }
    if let Some(flag) = fields.boolean("wait_for_downstream")? {
        task.wait_for_downstream = flag;
    }
    if let Some(retries) = fields.unsigned("retries")? {
        task.retries = retries;
    }
    if let Some(delay) = fields.get("retry_delay") {
        task.retry_delay = decode_timedelta(delay)?;
    }
    task.task_concurrency = fields.unsigned("task_concurrency")?;
    task.start_date = fields.get("start_date").map(decode_datetime).transpose()?;
    task.end_date = fields.get("end_date").map(decode_datetime).transpose()?;
    if let Some(owner) = fields.string("owner")? {
        task.owner = owner;
    }
    if let Some(queue) = fields.string("queue")? {
        task.queue = queue;
    }
    if let Some(pool) = fields.string("pool")? {
        task.pool = pool;
    }
    if let Some(weight) = fields.signed("priority_weight")? {
        task.priority_weight = weight;
    }
    task.execution_timeout = fields.get("execution_timeout").map(decode_timedelta).transpose()?;
    if let Some(color) = fields.string("ui_color")? {
        task.ui_color = color;
    }
    if let Some(color) = fields.string("ui_fgcolor")? {
        task.ui_fgcolor = color;
    }
    if let Some(template_fields) = fields.get("template_fields") {
        task.template_fields = decode_strings(template_fields)?;
    }
    task.params = decode_params(fields.get("params"))?;

    let downstream = match fields.get("downstream_task_ids") {
        Some(ids) => decode_strings(ids)?.into_iter().collect(),
        None => BTreeSet::new(),
    };
    Ok((task, downstream))
}

fn decode_marker(fields: &Fields<'_>) -> SerializationResult<ExternalTaskMarker> {
    let external_dag_id = fields
        .string("external_dag_id")?
        .ok_or_else(|| fields.invalid("external_dag_id", "present on an ExternalTaskMarker"))?;
    let external_task_id = fields
        .string("external_task_id")?
        .ok_or_else(|| fields.invalid("external_task_id", "present on an ExternalTaskMarker"))?;

    let execution_date = match fields.get("execution_date") {
        None => ExecutionDateSpec::SameAsRun,
        Some(value) => match tag_of(value) {
            Some(TypeTag::Timedelta) => ExecutionDateSpec::Offset(decode_timedelta(value)?),
            _ => ExecutionDateSpec::Absolute(decode_datetime(value)?),
        },
    };

    let mut marker =
        ExternalTaskMarker::new(external_dag_id, external_task_id).with_execution_date(execution_date);
    if let Some(depth) = fields.unsigned("recursion_depth")? {
        marker = marker.with_recursion_depth(&fields.task_id, depth)?;
    }
    Ok(marker)
}

fn decode_sensor(fields: &Fields<'_>) -> SerializationResult<ExternalTaskSensor> {
    let external_dag_id = fields
        .string("external_dag_id")?
        .ok_or_else(|| fields.invalid("external_dag_id", "present on an ExternalTaskSensor"))?;
    let allowed_states = fields.get("allowed_states").map(decode_strings).transpose()?;
    let execution_delta = fields.get("execution_delta").map(decode_timedelta).transpose()?;
    let execution_date_fn = fields.string("execution_date_fn")?.map(ExecutionDateFn::degraded);

    Ok(ExternalTaskSensor::new(
        &fields.task_id,
        external_dag_id,
        fields.string("external_task_id")?,
        allowed_states,
        execution_delta,
        execution_date_fn,
    )?)
}
