use super::{
    errors::{StateMachineError, StateMachineResult},
    events::TaskInstanceEvent,
    states::TaskInstanceState,
};
use crate::models::TaskInstance;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Applies executor-reported events to a task instance.
///
/// The machine is stateless; the instance record carries all state. Guards enforce the
/// `try_number <= max_tries + 1` invariant and retry routing on failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskInstanceStateMachine;

impl TaskInstanceStateMachine {
    pub fn new() -> Self {
        Self
    }

    /// Apply `event` to `instance`, stamping dates with `now`. Returns the new state.
    pub fn transition(
        &self,
        instance: &mut TaskInstance,
        event: &TaskInstanceEvent,
        now: DateTime<Utc>,
    ) -> StateMachineResult<TaskInstanceState> {
        let current = instance.state;
        let target = self.determine_target_state(instance, event)?;

        if let TaskInstanceEvent::Start = event {
            let next_try = instance.try_number + 1;
            if next_try > instance.max_tries + 1 {
                return Err(StateMachineError::TryNumberExceeded {
                    task_id: instance.task_id.clone(),
                    try_number: next_try,
                    max_tries: instance.max_tries,
                });
            }
            instance.try_number = next_try;
            instance.start_date = Some(now);
            instance.end_date = None;
        }

        if target.is_finished() || target == TaskInstanceState::Retry {
            instance.end_date = Some(now);
        }
        if target == TaskInstanceState::None {
            instance.start_date = None;
            instance.end_date = None;
        }

        instance.state = target;

        debug!(
            dag_id = %instance.dag_id,
            task_id = %instance.task_id,
            execution_date = %instance.execution_date,
            from_state = %current,
            to_state = %target,
            event = event.event_type(),
            try_number = instance.try_number,
            "Task instance transition"
        );

        Ok(target)
    }

    /// Determine the target state based on current state and event
    fn determine_target_state(
        &self,
        instance: &TaskInstance,
        event: &TaskInstanceEvent,
    ) -> StateMachineResult<TaskInstanceState> {
        use TaskInstanceState as S;

        let target = match (instance.state, event) {
            (S::None | S::Retry, TaskInstanceEvent::Schedule) => S::Scheduled,
            (S::None | S::Scheduled | S::Retry, TaskInstanceEvent::Queue) => S::Queued,
            (S::None | S::Scheduled | S::Queued | S::Retry, TaskInstanceEvent::Start) => S::Running,

            (S::Running, TaskInstanceEvent::Succeed) => S::Success,

            // A failed attempt with retries left goes back to the scheduler
            (
                S::Scheduled | S::Queued | S::Running | S::Shutdown,
                TaskInstanceEvent::Fail(_),
            ) => {
                if instance.try_number <= instance.max_tries {
                    S::Retry
                } else {
                    S::Failed
                }
            }

            (S::None | S::Scheduled | S::Queued | S::Running | S::Retry, TaskInstanceEvent::Skip) => {
                S::Skipped
            }
            (S::None | S::Scheduled | S::Retry, TaskInstanceEvent::UpstreamFail) => {
                S::UpstreamFailed
            }
            (S::Scheduled | S::Queued | S::Running, TaskInstanceEvent::Shutdown) => S::Shutdown,

            (_, TaskInstanceEvent::Clear) => S::None,

            (from_state, _) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from_state.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn instance(retries: u32) -> TaskInstance {
        let execution_date = Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap();
        let mut ti = TaskInstance::bare("test_dag", "op1", execution_date);
        ti.max_tries = retries;
        ti
    }

    #[test]
    fn test_start_increments_try_number_and_stamps_start() {
        let sm = TaskInstanceStateMachine::new();
        let mut ti = instance(0);
        let now = Utc::now();

        let state = sm.transition(&mut ti, &TaskInstanceEvent::Start, now).unwrap();
        assert_eq!(state, TaskInstanceState::Running);
        assert_eq!(ti.try_number, 1);
        assert_eq!(ti.start_date, Some(now));
        assert!(ti.end_date.is_none());
    }

    #[test]
    fn test_failure_with_retries_left_goes_to_retry() {
        let sm = TaskInstanceStateMachine::new();
        let mut ti = instance(1);
        let now = Utc::now();

        sm.transition(&mut ti, &TaskInstanceEvent::Start, now).unwrap();
        let state = sm
            .transition(&mut ti, &TaskInstanceEvent::Fail("boom".into()), now)
            .unwrap();
        assert_eq!(state, TaskInstanceState::Retry);

        sm.transition(&mut ti, &TaskInstanceEvent::Start, now).unwrap();
        let state = sm
            .transition(&mut ti, &TaskInstanceEvent::Fail("boom".into()), now)
            .unwrap();
        assert_eq!(state, TaskInstanceState::Failed);
        assert_eq!(ti.try_number, 2);
        assert_eq!(ti.end_date, Some(now));
    }

    #[test]
    fn test_try_number_never_exceeds_max_tries_plus_one() {
        let sm = TaskInstanceStateMachine::new();
        let mut ti = instance(0);
        ti.try_number = 1;
        ti.state = TaskInstanceState::Retry;

        let err = sm
            .transition(&mut ti, &TaskInstanceEvent::Start, Utc::now())
            .unwrap_err();
        assert!(matches!(err, StateMachineError::TryNumberExceeded { try_number: 2, .. }));
        assert_eq!(ti.try_number, 1);
        assert_eq!(ti.state, TaskInstanceState::Retry);
    }

    #[test]
    fn test_invalid_transitions() {
        let sm = TaskInstanceStateMachine::new();
        let mut ti = instance(0);
        ti.state = TaskInstanceState::Success;

        assert!(sm
            .transition(&mut ti, &TaskInstanceEvent::Start, Utc::now())
            .is_err());
        assert!(sm
            .transition(&mut ti, &TaskInstanceEvent::Succeed, Utc::now())
            .is_err());

        let state = sm
            .transition(&mut ti, &TaskInstanceEvent::Clear, Utc::now())
            .unwrap();
        assert_eq!(state, TaskInstanceState::None);
        assert!(ti.end_date.is_none());
    }
}
