//! # Run-State Aggregator
//!
//! Decides a DAG run's state from its task instances and which instances move next.
//!
//! ## Overview
//!
//! [`decide_run_state`] is a pure function over a [`RunSnapshot`]: it reconciles the snapshot
//! with the DAG, evaluates every schedulable instance, and returns the mutations for the
//! caller to apply. [`RunStateAggregator`] wraps it with the side effects of finishing a run:
//! the state transition, the user callback, events and metrics.
//!
//! ## Decision order
//!
//! 1. A terminal run is left alone.
//! 2. An unfinished instance whose task carries an unknown trigger rule fails the run.
//! 3. With nothing unfinished the leaves decide: any failed leaf fails the run, otherwise
//!    it succeeds (vacuously so for an empty DAG).
//! 4. Otherwise the run keeps RUNNING while anything can still move; when nothing can, the
//!    run is deadlocked and fails.

use super::callbacks::{invoke_callback, CallbackContext};
use super::reconciliation::{plan_integrity, IntegrityReport, TaskInstanceMutationHook};
use super::snapshot::{InstanceTransition, RunSnapshot, RunStateDecision};
use crate::config::SchedulerConfig;
use crate::constants::{events, metrics, status_groups};
use crate::dependencies::{
    combine, concurrency_gate, depends_on_past_gate, evaluate, retry_period_gate, DependencyError,
    Readiness,
};
use crate::events::EventPublisher;
use crate::metrics::{MetricsRecorder, NoopMetrics};
use crate::models::{Dag, DagRun, TaskInstance, TaskInstanceKey, TriggerRule};
use crate::state_machine::{
    DagRunEvent, DagRunState, DagRunStateMachine, RunStateReason, TaskInstanceState,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Decide the run state and the instance mutations for one snapshot. Pure.
pub fn decide_run_state(
    dag: &Dag,
    snapshot: &RunSnapshot,
    hook: &dyn TaskInstanceMutationHook,
    now: DateTime<Utc>,
) -> RunStateDecision {
    let run = &snapshot.dag_run;
    if run.state.is_terminal() {
        return RunStateDecision::unchanged(run.state);
    }

    let IntegrityReport { created, orphaned } =
        plan_integrity(dag, run, &snapshot.task_instances, hook);

    let assessment = {
        // Instances of removed tasks take no part in the decision
        let current: BTreeMap<&str, &TaskInstance> = snapshot
            .task_instances
            .iter()
            .filter(|ti| dag.has_task(&ti.task_id))
            .chain(created.iter())
            .map(|ti| (ti.task_id.as_str(), ti))
            .collect();
        assess(dag, snapshot, &current, now)
    };

    RunStateDecision {
        state: assessment.state,
        reason: assessment.reason,
        created,
        orphaned,
        ready: assessment.ready,
        transitions: assessment.transitions,
        unfinished: assessment.unfinished,
    }
}

struct Assessment {
    state: DagRunState,
    reason: Option<RunStateReason>,
    ready: Vec<TaskInstanceKey>,
    transitions: Vec<InstanceTransition>,
    unfinished: usize,
}

impl Assessment {
    fn terminal(state: DagRunState, reason: RunStateReason, unfinished: usize) -> Self {
        Self {
            state,
            reason: Some(reason),
            ready: Vec::new(),
            transitions: Vec::new(),
            unfinished,
        }
    }
}

fn assess(
    dag: &Dag,
    snapshot: &RunSnapshot,
    current: &BTreeMap<&str, &TaskInstance>,
    now: DateTime<Utc>,
) -> Assessment {
    let run = &snapshot.dag_run;
    let unfinished: Vec<&TaskInstance> = current
        .values()
        .copied()
        .filter(|ti| ti.state.is_unfinished())
        .collect();

    if unfinished.is_empty() {
        let leaf_failed = dag.leaves().iter().any(|leaf| {
            current
                .get(leaf.task_id.as_str())
                .map_or(false, |ti| ti.state.is_failure())
        });
        return if leaf_failed {
            Assessment::terminal(DagRunState::Failed, RunStateReason::TaskFailure, 0)
        } else {
            Assessment::terminal(DagRunState::Success, RunStateReason::Success, 0)
        };
    }

    let invalid_rule = |task_id: &str, rule: &str| {
        Assessment::terminal(
            DagRunState::Failed,
            RunStateReason::InvalidTriggerRule {
                task_id: task_id.to_string(),
                rule: rule.to_string(),
            },
            unfinished.len(),
        )
    };

    let mut ready = Vec::new();
    let mut transitions = Vec::new();
    let mut progress = false;

    for ti in &unfinished {
        let Some(task) = dag.task(&ti.task_id) else {
            continue;
        };
        if let TriggerRule::Invalid(rule) = &task.trigger_rule {
            return invalid_rule(&task.task_id, rule);
        }

        // Scheduled, queued, running and shut-down instances are moving on their own
        if !status_groups::SCHEDULABLE_STATES.contains(&ti.state) {
            progress = true;
            continue;
        }

        let upstream_states: Vec<TaskInstanceState> = task
            .upstream_task_ids
            .iter()
            .map(|id| {
                current
                    .get(id.as_str())
                    .map_or(TaskInstanceState::None, |upstream| upstream.state)
            })
            .collect();

        let trigger = match evaluate(&task.trigger_rule, &upstream_states, &task.upstream_task_ids) {
            Ok(decision) => decision,
            Err(DependencyError::InvalidTriggerRule { rule }) => {
                return invalid_rule(&task.task_id, &rule)
            }
        };
        let running = snapshot
            .running_counts
            .get(&task.task_id)
            .copied()
            .unwrap_or(0);
        let gates = [
            depends_on_past_gate(task, run.execution_date, &snapshot.previous),
            concurrency_gate(task, running),
            retry_period_gate(task, ti, now),
        ];
        let readiness = combine(trigger, &gates);

        debug!(
            dag_id = %run.dag_id,
            task_id = %task.task_id,
            state = %ti.state,
            trigger_rule = %task.trigger_rule.as_str(),
            readiness = ?readiness,
            "Evaluated task instance dependencies"
        );

        match readiness {
            Readiness::Ready => ready.push(ti.key()),
            Readiness::Skip => transitions.push(InstanceTransition {
                key: ti.key(),
                from: ti.state,
                to: TaskInstanceState::Skipped,
            }),
            Readiness::UpstreamFailed => transitions.push(InstanceTransition {
                key: ti.key(),
                from: ti.state,
                to: TaskInstanceState::UpstreamFailed,
            }),
            Readiness::Pending | Readiness::Waiting | Readiness::Blocked => {}
        }
        progress |= readiness.is_progress();
    }

    if !progress {
        return Assessment::terminal(
            DagRunState::Failed,
            RunStateReason::AllTasksDeadlocked,
            unfinished.len(),
        );
    }

    Assessment {
        state: DagRunState::Running,
        reason: None,
        ready,
        transitions,
        unfinished: unfinished.len(),
    }
}

/// Applies the consequences of a run-state decision to the run itself
pub struct RunStateAggregator {
    config: SchedulerConfig,
    metrics: Arc<dyn MetricsRecorder>,
    publisher: EventPublisher,
    state_machine: DagRunStateMachine,
}

impl RunStateAggregator {
    pub fn new(config: SchedulerConfig, metrics: Arc<dyn MetricsRecorder>, publisher: EventPublisher) -> Self {
        Self {
            config,
            metrics,
            publisher,
            state_machine: DagRunStateMachine::new(),
        }
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    /// [`decide_run_state`] timed under `dagrun.dependency-check.{dag_id}`
    pub fn evaluate(
        &self,
        dag: &Dag,
        snapshot: &RunSnapshot,
        hook: &dyn TaskInstanceMutationHook,
        now: DateTime<Utc>,
    ) -> RunStateDecision {
        let started = Instant::now();
        let decision = decide_run_state(dag, snapshot, hook, now);
        self.metrics
            .timing(&metrics::dependency_check(&dag.dag_id), started.elapsed());
        decision
    }

    /// Move `run` into the decided terminal state.
    ///
    /// Returns the new state when the run changed. Callbacks, events and the scheduling
    /// delay metric fire only on that change, so a run already terminal is a no-op.
    pub fn finalize(
        &self,
        dag: &Dag,
        run: &mut DagRun,
        decision: &RunStateDecision,
        instances: &[TaskInstance],
        now: DateTime<Utc>,
    ) -> Option<DagRunState> {
        let reason = decision.reason.clone()?;
        let event = match decision.state {
            DagRunState::Success => DagRunEvent::Complete,
            DagRunState::Failed => DagRunEvent::Fail(reason.clone()),
            DagRunState::Running => return None,
        };
        let new_state = self.state_machine.transition(run, &event, now)?;

        if decision.is_deadlock() {
            warn!(
                dag_id = %run.dag_id,
                run_id = %run.run_id,
                unfinished = decision.unfinished,
                "Deadlock; marking run failed"
            );
            self.metrics.incr(metrics::DEADLOCK_DETECTED);
            self.publisher.publish(
                events::DAG_RUN_DEADLOCKED,
                json!({
                    "dag_id": run.dag_id,
                    "run_id": run.run_id,
                    "unfinished": decision.unfinished,
                }),
            );
        } else {
            info!(
                dag_id = %run.dag_id,
                run_id = %run.run_id,
                state = %new_state,
                reason = reason.as_str(),
                "Marking run finished"
            );
        }

        let (event_name, callback, kind) = match new_state {
            DagRunState::Success => (
                events::DAG_RUN_SUCCESS,
                dag.callbacks.on_success.as_ref(),
                "on_success_callback",
            ),
            _ => (
                events::DAG_RUN_FAILED,
                dag.callbacks.on_failure.as_ref(),
                "on_failure_callback",
            ),
        };

        if let Some(callback) = callback {
            let context = CallbackContext {
                dag_id: dag.dag_id.clone(),
                dag_run: run.clone(),
                reason: reason.clone(),
            };
            if !invoke_callback(kind, callback.as_ref(), &context) {
                self.metrics.incr(metrics::CALLBACK_FAILURES);
            }
        }

        self.publisher.publish(
            event_name,
            json!({
                "dag_id": run.dag_id,
                "run_id": run.run_id,
                "execution_date": run.execution_date,
                "reason": reason.as_str(),
            }),
        );

        self.emit_scheduling_delay(dag, run, instances);
        Some(new_state)
    }

    /// Time between the expected start of a scheduled run and its first task actually
    /// starting. Skipped for manual runs and for DAGs without a concrete cadence.
    fn emit_scheduling_delay(&self, dag: &Dag, run: &DagRun, instances: &[TaskInstance]) {
        if !self.config.emit_scheduling_delay
            || run.external_trigger
            || !dag.schedule_interval.is_concrete_cadence()
        {
            return;
        }
        let Some(first_start) = instances.iter().filter_map(|ti| ti.start_date).min() else {
            return;
        };
        let Some(expected) = dag.schedule_interval.following(run.execution_date) else {
            return;
        };

        if let Ok(delay) = (first_start - expected).to_std() {
            if !delay.is_zero() {
                self.metrics
                    .timing(&metrics::first_task_scheduling_delay(&dag.dag_id), delay);
            }
        }
    }
}

impl Default for RunStateAggregator {
    fn default() -> Self {
        Self::new(
            SchedulerConfig::default(),
            Arc::new(NoopMetrics),
            EventPublisher::default(),
        )
    }
}
