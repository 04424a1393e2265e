use super::external::{ExternalTaskMarker, ExternalTaskSensor};
use super::TriggerRule;
use crate::constants::{operators, MAX_KEY_LENGTH};
use crate::error::ConfigurationError;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Operator-specific behaviour carried by a task
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TaskKind {
    #[default]
    Standard,
    ExternalMarker(ExternalTaskMarker),
    ExternalSensor(ExternalTaskSensor),
}

/// A node of a DAG.
///
/// Tasks reference their DAG and neighbours by id only; the owning [`crate::models::Dag`]
/// keeps `upstream_task_ids`/`downstream_task_ids` mutually consistent.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub task_id: String,
    pub dag_id: String,
    /// Operator class name; kept for display when the operator is unknown to a process
    pub task_type: String,
    pub trigger_rule: TriggerRule,
    pub depends_on_past: bool,
    pub wait_for_downstream: bool,
    pub retries: u32,
    pub retry_delay: Duration,
    /// Cap on concurrently running instances of this task across runs
    pub task_concurrency: Option<u32>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub owner: String,
    pub queue: String,
    pub pool: String,
    pub priority_weight: i32,
    pub execution_timeout: Option<Duration>,
    pub ui_color: String,
    pub ui_fgcolor: String,
    pub template_fields: Vec<String>,
    pub params: BTreeMap<String, Value>,
    pub upstream_task_ids: BTreeSet<String>,
    pub downstream_task_ids: BTreeSet<String>,
    pub kind: TaskKind,
}

impl Task {
    /// A plain task with operator defaults. The DAG id is filled in when it is added.
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            dag_id: String::new(),
            task_type: operators::BASE_OPERATOR.to_string(),
            trigger_rule: TriggerRule::AllSuccess,
            depends_on_past: false,
            wait_for_downstream: false,
            retries: 0,
            retry_delay: Duration::seconds(300),
            task_concurrency: None,
            start_date: None,
            end_date: None,
            owner: "dagflow".to_string(),
            queue: "default".to_string(),
            pool: "default_pool".to_string(),
            priority_weight: 1,
            execution_timeout: None,
            ui_color: "#fff".to_string(),
            ui_fgcolor: "#000".to_string(),
            template_fields: Vec::new(),
            params: BTreeMap::new(),
            upstream_task_ids: BTreeSet::new(),
            downstream_task_ids: BTreeSet::new(),
            kind: TaskKind::Standard,
        }
    }

    /// No-op placeholder task
    pub fn dummy(task_id: impl Into<String>) -> Self {
        let mut task = Self::new(task_id);
        task.task_type = operators::DUMMY_OPERATOR.to_string();
        task.ui_color = "#e8f7e4".to_string();
        task
    }

    pub fn external_marker(task_id: impl Into<String>, marker: ExternalTaskMarker) -> Self {
        let mut task = Self::new(task_id);
        task.task_type = operators::EXTERNAL_TASK_MARKER.to_string();
        task.ui_color = "#19647e".to_string();
        task.template_fields = vec!["external_dag_id".into(), "external_task_id".into(), "execution_date".into()];
        task.kind = TaskKind::ExternalMarker(marker);
        task
    }

    pub fn external_sensor(task_id: impl Into<String>, sensor: ExternalTaskSensor) -> Self {
        let mut task = Self::new(task_id);
        task.task_type = operators::EXTERNAL_TASK_SENSOR.to_string();
        task.ui_color = "#19647e".to_string();
        task.template_fields = vec!["external_dag_id".into(), "external_task_id".into()];
        task.kind = TaskKind::ExternalSensor(sensor);
        task
    }

    pub fn with_trigger_rule(mut self, trigger_rule: TriggerRule) -> Self {
        self.trigger_rule = trigger_rule;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_depends_on_past(mut self, depends_on_past: bool) -> Self {
        self.depends_on_past = depends_on_past;
        self
    }

    /// `wait_for_downstream` implies `depends_on_past`
    pub fn with_wait_for_downstream(mut self, wait_for_downstream: bool) -> Self {
        self.wait_for_downstream = wait_for_downstream;
        if wait_for_downstream {
            self.depends_on_past = true;
        }
        self
    }

    pub fn with_task_concurrency(mut self, task_concurrency: u32) -> Self {
        self.task_concurrency = Some(task_concurrency);
        self
    }

    pub fn with_start_date(mut self, start_date: DateTime<Utc>) -> Self {
        self.start_date = Some(start_date);
        self
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn marker(&self) -> Option<&ExternalTaskMarker> {
        match &self.kind {
            TaskKind::ExternalMarker(marker) => Some(marker),
            _ => None,
        }
    }

    pub fn sensor(&self) -> Option<&ExternalTaskSensor> {
        match &self.kind {
            TaskKind::ExternalSensor(sensor) => Some(sensor),
            _ => None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.upstream_task_ids.is_empty()
    }

    pub fn is_leaf(&self) -> bool {
        self.downstream_task_ids.is_empty()
    }

    /// Authoring-time checks that do not need the rest of the DAG
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        validate_key(&self.task_id)?;
        if let TriggerRule::Invalid(rule) = &self.trigger_rule {
            return Err(ConfigurationError::InvalidTriggerRule {
                task_id: self.task_id.clone(),
                rule: rule.clone(),
            });
        }
        if let TaskKind::ExternalMarker(marker) = &self.kind {
            if marker.recursion_depth == 0 {
                return Err(ConfigurationError::InvalidRecursionDepth {
                    task_id: self.task_id.clone(),
                });
            }
        }
        Ok(())
    }
}

/// DAG and task ids: alphanumerics, dashes, dots and underscores
pub fn validate_key(key: &str) -> Result<(), ConfigurationError> {
    if key.is_empty() || key.len() > MAX_KEY_LENGTH {
        return Err(ConfigurationError::InvalidKey {
            key: key.to_string(),
            reason: format!("length must be between 1 and {MAX_KEY_LENGTH}"),
        });
    }
    if let Some(c) = key
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_')))
    {
        return Err(ConfigurationError::InvalidKey {
            key: key.to_string(),
            reason: format!("character '{c}' is not allowed"),
        });
    }
    Ok(())
}
