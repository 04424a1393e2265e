//! Turning a set of cleared task instances into mutations.

use crate::models::{DagRegistry, TaskInstance};
use crate::state_machine::{TaskInstanceEvent, TaskInstanceState, TaskInstanceStateMachine};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tracing::warn;

/// Mutations for one clear
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClearPlan {
    /// Instances with their post-clear state and retry budget
    pub instances: Vec<TaskInstance>,
    /// Runs touched by the clear, as `(dag_id, execution_date)`
    pub dag_runs: BTreeSet<(String, DateTime<Utc>)>,
}

/// Reset `instances` so they run again.
///
/// Running instances are asked to shut down; everything else goes back to NONE. The retry
/// budget is extended by the task's `retries` past the attempts already started. An
/// instance whose task has left its DAG keeps at least the budget it already used.
pub fn plan_clear(instances: Vec<TaskInstance>, registry: &DagRegistry, now: DateTime<Utc>) -> ClearPlan {
    let state_machine = TaskInstanceStateMachine::new();
    let mut plan = ClearPlan::default();

    for mut instance in instances {
        plan.dag_runs
            .insert((instance.dag_id.clone(), instance.execution_date));

        let event = if instance.state == TaskInstanceState::Running {
            TaskInstanceEvent::Shutdown
        } else {
            let retries = registry
                .get(&instance.dag_id)
                .and_then(|dag| dag.task(&instance.task_id).map(|task| task.retries));
            instance.max_tries = match retries {
                Some(retries) => instance.try_number + retries,
                None => instance.max_tries.max(instance.try_number),
            };
            TaskInstanceEvent::Clear
        };

        if let Err(error) = state_machine.transition(&mut instance, &event, now) {
            warn!(
                dag_id = %instance.dag_id,
                task_id = %instance.task_id,
                error = %error,
                "Task instance could not be cleared; leaving it as is"
            );
            continue;
        }
        plan.instances.push(instance);
    }

    plan
}
