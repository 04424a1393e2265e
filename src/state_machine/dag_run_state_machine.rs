use super::{events::DagRunEvent, states::DagRunState};
use crate::models::DagRun;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// DAG run lifecycle: RUNNING until it completes or fails.
///
/// Terminal states absorb every event except an explicit [`DagRunEvent::Reset`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DagRunStateMachine;

impl DagRunStateMachine {
    pub fn new() -> Self {
        Self
    }

    /// Apply `event` to `run`. Returns the new state when the run changed state.
    pub fn transition(
        &self,
        run: &mut DagRun,
        event: &DagRunEvent,
        now: DateTime<Utc>,
    ) -> Option<DagRunState> {
        let target = match (run.state, event) {
            (DagRunState::Running, DagRunEvent::Complete) => DagRunState::Success,
            (DagRunState::Running, DagRunEvent::Fail(_)) => DagRunState::Failed,
            (DagRunState::Success | DagRunState::Failed, DagRunEvent::Reset) => {
                DagRunState::Running
            }
            (current, _) => {
                debug!(
                    dag_id = %run.dag_id,
                    run_id = %run.run_id,
                    state = %current,
                    event = event.event_type(),
                    "DAG run transition ignored"
                );
                return None;
            }
        };

        let from = run.state;
        run.set_state(target, now);
        if target == DagRunState::Running {
            run.start_date = Some(now);
        }

        info!(
            dag_id = %run.dag_id,
            run_id = %run.run_id,
            from_state = %from,
            to_state = %target,
            event = event.event_type(),
            "DAG run transition"
        );

        Some(target)
    }
}
