//! Cross-DAG pointers: markers that propagate clears and sensors that wait on other DAGs.

use crate::error::ConfigurationError;
use crate::models::TaskInstance;
use crate::state_machine::{DagRunState, TaskInstanceState};
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::Arc;

/// Default hop budget for transitive clearing through markers
pub const DEFAULT_RECURSION_DEPTH: u32 = 10;

/// Which run of the external DAG a marker points at
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExecutionDateSpec {
    /// Same logical date as the marker's own run
    #[default]
    SameAsRun,
    /// Marker's run date shifted by a fixed offset
    Offset(Duration),
    /// A fixed logical date
    Absolute(DateTime<Utc>),
}

impl ExecutionDateSpec {
    pub fn resolve(&self, run_date: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::SameAsRun => run_date,
            Self::Offset(offset) => saturating_shift(run_date, *offset),
            Self::Absolute(date) => *date,
        }
    }
}

/// `date + delta`, pinned to the representable range instead of overflowing
fn saturating_shift(date: DateTime<Utc>, delta: Duration) -> DateTime<Utc> {
    date.checked_add_signed(delta).unwrap_or(if delta < Duration::zero() {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

/// Points at a task in another DAG whose downstream must be cleared with this one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalTaskMarker {
    pub external_dag_id: String,
    pub external_task_id: String,
    pub execution_date: ExecutionDateSpec,
    pub recursion_depth: u32,
}

impl ExternalTaskMarker {
    pub fn new(external_dag_id: impl Into<String>, external_task_id: impl Into<String>) -> Self {
        Self {
            external_dag_id: external_dag_id.into(),
            external_task_id: external_task_id.into(),
            execution_date: ExecutionDateSpec::SameAsRun,
            recursion_depth: DEFAULT_RECURSION_DEPTH,
        }
    }

    pub fn with_execution_date(mut self, execution_date: ExecutionDateSpec) -> Self {
        self.execution_date = execution_date;
        self
    }

    /// Set the hop budget. Zero is rejected: a marker must allow at least one hop.
    pub fn with_recursion_depth(
        mut self,
        task_id: &str,
        recursion_depth: u32,
    ) -> Result<Self, ConfigurationError> {
        if recursion_depth == 0 {
            return Err(ConfigurationError::InvalidRecursionDepth {
                task_id: task_id.to_string(),
            });
        }
        self.recursion_depth = recursion_depth;
        Ok(self)
    }
}

/// A named function mapping the sensor's run date to the external run date.
///
/// Deserialized sensors keep only the name; the function itself does not travel.
#[derive(Clone)]
pub struct ExecutionDateFn {
    pub name: String,
    pub func: Option<Arc<dyn Fn(DateTime<Utc>) -> DateTime<Utc> + Send + Sync>>,
}

impl ExecutionDateFn {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(DateTime<Utc>) -> DateTime<Utc> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Some(Arc::new(func)),
        }
    }

    pub fn degraded(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            func: None,
        }
    }
}

impl fmt::Debug for ExecutionDateFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionDateFn")
            .field("name", &self.name)
            .field("callable", &self.func.is_some())
            .finish()
    }
}

impl PartialEq for ExecutionDateFn {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// Waits for a task (or a whole run) in another DAG to reach one of `allowed_states`
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalTaskSensor {
    pub external_dag_id: String,
    /// `None` waits on the external DAG run itself
    pub external_task_id: Option<String>,
    pub allowed_states: Vec<String>,
    pub execution_delta: Option<Duration>,
    pub execution_date_fn: Option<ExecutionDateFn>,
}

impl ExternalTaskSensor {
    /// Validated constructor.
    ///
    /// `allowed_states` must name task instance states when `external_task_id` is set and
    /// DAG run states otherwise; at most one of `execution_delta` and `execution_date_fn`.
    pub fn new(
        task_id: &str,
        external_dag_id: impl Into<String>,
        external_task_id: Option<String>,
        allowed_states: Option<Vec<String>>,
        execution_delta: Option<Duration>,
        execution_date_fn: Option<ExecutionDateFn>,
    ) -> Result<Self, ConfigurationError> {
        if execution_delta.is_some() && execution_date_fn.is_some() {
            return Err(ConfigurationError::ConflictingExecutionDateArgs {
                task_id: task_id.to_string(),
            });
        }

        let allowed_states =
            allowed_states.unwrap_or_else(|| vec![TaskInstanceState::Success.to_string()]);

        let (kind, invalid): (&'static str, Vec<String>) = if external_task_id.is_some() {
            (
                "task instance",
                allowed_states
                    .iter()
                    .filter(|s| s.parse::<TaskInstanceState>().is_err())
                    .cloned()
                    .collect(),
            )
        } else {
            (
                "DAG run",
                allowed_states
                    .iter()
                    .filter(|s| s.parse::<DagRunState>().is_err())
                    .cloned()
                    .collect(),
            )
        };
        if !invalid.is_empty() {
            return Err(ConfigurationError::InvalidAllowedStates {
                task_id: task_id.to_string(),
                kind,
                states: invalid,
            });
        }

        Ok(Self {
            external_dag_id: external_dag_id.into(),
            external_task_id,
            allowed_states,
            execution_delta,
            execution_date_fn,
        })
    }

    /// The external run date this sensor waits on for a run at `run_date`
    pub fn target_execution_date(&self, run_date: DateTime<Utc>) -> DateTime<Utc> {
        if let Some(delta) = self.execution_delta {
            return saturating_shift(run_date, -delta);
        }
        match self.execution_date_fn.as_ref().and_then(|f| f.func.as_ref()) {
            Some(func) => func(run_date),
            None => run_date,
        }
    }

    /// Whether the external task instances satisfy the sensor
    pub fn is_satisfied_by(&self, instances: &[TaskInstance]) -> bool {
        let Some(task_id) = self.external_task_id.as_deref() else {
            return false;
        };
        let matching: Vec<&TaskInstance> = instances
            .iter()
            .filter(|ti| ti.dag_id == self.external_dag_id && ti.task_id == task_id)
            .collect();
        !matching.is_empty()
            && matching
                .iter()
                .all(|ti| self.allowed_states.iter().any(|s| s == ti.state.as_str()))
    }

    /// Whether the external DAG run satisfies a run-level sensor
    pub fn is_satisfied_by_run(&self, state: DagRunState) -> bool {
        self.external_task_id.is_none() && self.allowed_states.iter().any(|s| s == state.as_str())
    }
}
