//! # System Constants
//!
//! Event names, metric names, operator class names and state groupings shared by the
//! scheduling core.

// Re-export state types for convenience
pub use crate::state_machine::{DagRunState, TaskInstanceState};

/// Maximum length of a DAG or task id
pub const MAX_KEY_LENGTH: usize = 250;

/// Events emitted towards the executor and other observers
pub mod events {
    // Task instance events
    pub const TASK_INSTANCE_READY: &str = "task_instance.ready";
    pub const TASK_INSTANCE_STATE_CHANGED: &str = "task_instance.state_changed";

    // DAG run events
    pub const DAG_RUN_SUCCESS: &str = "dag_run.success";
    pub const DAG_RUN_FAILED: &str = "dag_run.failed";
    pub const DAG_RUN_DEADLOCKED: &str = "dag_run.deadlocked";
    pub const DAG_RUN_RESET: &str = "dag_run.reset";

    // Clearing events
    pub const TASK_INSTANCES_CLEARED: &str = "task_instances.cleared";
}

/// Metric names. Per-DAG metrics are built with the helpers.
pub mod metrics {
    pub fn first_task_scheduling_delay(dag_id: &str) -> String {
        format!("dagrun.{dag_id}.first_task_scheduling_delay")
    }

    pub fn dependency_check(dag_id: &str) -> String {
        format!("dagrun.dependency-check.{dag_id}")
    }

    pub const DEADLOCK_DETECTED: &str = "dagrun.deadlock";
    pub const CALLBACK_FAILURES: &str = "dagrun.callback_failures";
}

/// Operator class names recorded in `task_type`
pub mod operators {
    pub const BASE_OPERATOR: &str = "BaseOperator";
    pub const DUMMY_OPERATOR: &str = "DummyOperator";
    pub const EXTERNAL_TASK_MARKER: &str = "ExternalTaskMarker";
    pub const EXTERNAL_TASK_SENSOR: &str = "ExternalTaskSensor";
}

/// Run id prefixes encoding the run type
pub mod run_id_prefixes {
    pub const SCHEDULED: &str = "scheduled__";
    pub const MANUAL: &str = "manual__";
    pub const BACKFILL: &str = "backfill_";
}

/// Common state groupings used for orchestration decisions
pub mod status_groups {
    use super::TaskInstanceState;

    /// States that need no further work
    pub const FINISHED_STATES: &[TaskInstanceState] = &[
        TaskInstanceState::Success,
        TaskInstanceState::Failed,
        TaskInstanceState::Skipped,
        TaskInstanceState::UpstreamFailed,
    ];

    pub const UNFINISHED_STATES: &[TaskInstanceState] = &[
        TaskInstanceState::None,
        TaskInstanceState::Scheduled,
        TaskInstanceState::Queued,
        TaskInstanceState::Running,
        TaskInstanceState::Shutdown,
        TaskInstanceState::Retry,
    ];

    /// States the scheduler evaluates against trigger rules
    pub const SCHEDULABLE_STATES: &[TaskInstanceState] =
        &[TaskInstanceState::None, TaskInstanceState::Retry];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_groups_partition_all_states() {
        for state in TaskInstanceState::ALL {
            let finished = status_groups::FINISHED_STATES.contains(&state);
            let unfinished = status_groups::UNFINISHED_STATES.contains(&state);
            assert!(finished ^ unfinished, "{state} must be in exactly one group");
            assert_eq!(finished, state.is_finished());
        }
    }

    #[test]
    fn test_metric_names() {
        assert_eq!(
            metrics::first_task_scheduling_delay("example"),
            "dagrun.example.first_task_scheduling_delay"
        );
        assert_eq!(metrics::dependency_check("example"), "dagrun.dependency-check.example");
    }
}
