//! Gating predicates layered on top of the trigger-rule decision.

use crate::models::{DagRun, Task, TaskInstance};
use crate::state_machine::{DagRunState, TaskInstanceState};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Result of a gate check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStatus {
    Open,
    /// Closed for now; may open without outside intervention
    Pending,
    /// Closed until someone clears the prerequisite
    Blocked,
}

/// States of the previous scheduled run's instances, keyed by task id
#[derive(Debug, Clone, Default)]
pub struct PreviousRunView {
    pub run: Option<DagRun>,
    pub states: HashMap<String, TaskInstanceState>,
}

impl PreviousRunView {
    pub fn new(run: Option<DagRun>, states: HashMap<String, TaskInstanceState>) -> Self {
        Self { run, states }
    }
}

/// `depends_on_past` / `wait_for_downstream` check against the previous run.
///
/// Open when the task does not depend on the past, this is its first scheduled run, or the
/// previous instance does not exist. A previous instance that did not finish successfully
/// blocks the gate only when the previous run itself FAILED; otherwise the gate stays
/// Pending until the instance is cleared or re-run.
pub fn depends_on_past_gate(
    task: &Task,
    execution_date: DateTime<Utc>,
    previous: &PreviousRunView,
) -> GateStatus {
    if !task.depends_on_past {
        return GateStatus::Open;
    }
    if task.start_date == Some(execution_date) {
        return GateStatus::Open;
    }
    let Some(previous_run) = previous.run.as_ref() else {
        return GateStatus::Open;
    };
    let Some(previous_state) = previous.states.get(&task.task_id) else {
        return GateStatus::Open;
    };

    let mut satisfied = previous_state.is_successful();
    if satisfied && task.wait_for_downstream {
        satisfied = task.downstream_task_ids.iter().all(|downstream| {
            previous
                .states
                .get(downstream)
                .map_or(true, |state| state.is_successful())
        });
    }

    if satisfied {
        GateStatus::Open
    } else if previous_run.state == DagRunState::Failed {
        GateStatus::Blocked
    } else {
        GateStatus::Pending
    }
}

/// `task_concurrency` check: Pending while the cap is saturated
pub fn concurrency_gate(task: &Task, running_count: usize) -> GateStatus {
    match task.task_concurrency {
        Some(cap) if running_count >= cap as usize => GateStatus::Pending,
        _ => GateStatus::Open,
    }
}

/// Instances waiting for a retry stay Pending until `retry_delay` has passed since the
/// failed attempt ended. A delay that overflows the calendar leaves the gate Open.
pub fn retry_period_gate(task: &Task, instance: &TaskInstance, now: DateTime<Utc>) -> GateStatus {
    if instance.state != TaskInstanceState::Retry {
        return GateStatus::Open;
    }
    match instance
        .end_date
        .and_then(|ended| ended.checked_add_signed(task.retry_delay))
    {
        Some(retry_at) if retry_at > now => GateStatus::Pending,
        _ => GateStatus::Open,
    }
}
