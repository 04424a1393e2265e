//! # Run-State Service
//!
//! Reads a run through the injected [`RunStore`], hands the snapshot to the pure
//! aggregator, and writes the resulting mutations back.
//!
//! Every write is an idempotent per-row operation, so a pass interrupted halfway can simply
//! be repeated: creates report existing rows as success and transitions are re-derived from
//! the next snapshot.

use super::reconciliation::{self, IntegrityReport, NoopMutationHook, TaskInstanceMutationHook};
use super::run_state_aggregator::RunStateAggregator;
use super::snapshot::{RunSnapshot, RunStateDecision};
use crate::constants::events;
use crate::dependencies::PreviousRunView;
use crate::error::{DagflowError, Result};
use crate::models::{Dag, DagRegistry, DagRun, DagRunType, TaskInstance, TaskInstanceKey};
use crate::persistence::{PersistenceError, RunStore};
use crate::state_machine::{
    DagRunEvent, DagRunState, DagRunStateMachine, TaskInstanceEvent, TaskInstanceState,
    TaskInstanceStateMachine,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Drives DAG runs forward against shared persistent state
pub struct RunStateService {
    store: Arc<dyn RunStore>,
    registry: Arc<DagRegistry>,
    aggregator: RunStateAggregator,
    hook: Arc<dyn TaskInstanceMutationHook>,
    task_state_machine: TaskInstanceStateMachine,
    run_state_machine: DagRunStateMachine,
}

impl RunStateService {
    pub fn new(store: Arc<dyn RunStore>, registry: Arc<DagRegistry>, aggregator: RunStateAggregator) -> Self {
        Self {
            store,
            registry,
            aggregator,
            hook: Arc::new(NoopMutationHook),
            task_state_machine: TaskInstanceStateMachine::new(),
            run_state_machine: DagRunStateMachine::new(),
        }
    }

    /// Install the hook applied to instances before they are first created
    pub fn with_mutation_hook(mut self, hook: Arc<dyn TaskInstanceMutationHook>) -> Self {
        self.hook = hook;
        self
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }

    pub fn aggregator(&self) -> &RunStateAggregator {
        &self.aggregator
    }

    fn dag(&self, dag_id: &str) -> Result<Arc<Dag>> {
        self.registry
            .get(dag_id)
            .ok_or_else(|| DagflowError::DagNotFound(dag_id.to_string()))
    }

    async fn load_run(&self, dag_id: &str, execution_date: DateTime<Utc>) -> Result<DagRun> {
        self.store
            .get_dag_run(dag_id, execution_date)
            .await?
            .ok_or_else(|| DagflowError::DagRunNotFound {
                dag_id: dag_id.to_string(),
                execution_date,
            })
    }

    /// Materialize a run and its task instances. Returns the existing run if one is
    /// already recorded for the date.
    #[instrument(skip(self), fields(dag_id = %dag_id))]
    pub async fn create_dag_run(
        &self,
        dag_id: &str,
        execution_date: DateTime<Utc>,
        run_type: DagRunType,
    ) -> Result<DagRun> {
        let dag = self.dag(dag_id)?;
        if let Some(existing) = self.store.get_dag_run(dag_id, execution_date).await? {
            debug!(run_id = %existing.run_id, "DAG run already exists");
            return Ok(existing);
        }

        let run = DagRun::new(dag_id, execution_date, run_type);
        self.store.save_dag_run(&run).await?;
        let report =
            reconciliation::verify_integrity(self.store.as_ref(), &dag, &run, self.hook.as_ref())
                .await?;

        info!(
            run_id = %run.run_id,
            task_instances = report.created.len(),
            "DAG run created"
        );
        Ok(run)
    }

    /// Create instances for tasks added to the DAG since the run was materialized
    #[instrument(skip(self), fields(dag_id = %dag_id))]
    pub async fn verify_integrity(
        &self,
        dag_id: &str,
        execution_date: DateTime<Utc>,
    ) -> Result<IntegrityReport> {
        let dag = self.dag(dag_id)?;
        let run = self.load_run(dag_id, execution_date).await?;
        Ok(
            reconciliation::verify_integrity(self.store.as_ref(), &dag, &run, self.hook.as_ref())
                .await?,
        )
    }

    /// One aggregation pass: reconcile, propagate skips and upstream failures, hand ready
    /// instances to the executor and finish the run when nothing is left.
    #[instrument(skip(self), fields(dag_id = %dag_id))]
    pub async fn update_state(
        &self,
        dag_id: &str,
        execution_date: DateTime<Utc>,
    ) -> Result<RunStateDecision> {
        let dag = self.dag(dag_id)?;
        let mut run = self.load_run(dag_id, execution_date).await?;
        if run.state.is_terminal() {
            return Ok(RunStateDecision::unchanged(run.state));
        }

        let snapshot = self.snapshot(&dag, run.clone()).await?;
        let now = Utc::now();
        let decision = self
            .aggregator
            .evaluate(&dag, &snapshot, self.hook.as_ref(), now);

        self.apply(&decision, now).await?;

        if decision.is_terminal()
            && self
                .aggregator
                .finalize(&dag, &mut run, &decision, &snapshot.task_instances, now)
                .is_some()
        {
            self.store.save_dag_run(&run).await?;
        }

        debug!(
            state = %decision.state,
            ready = decision.ready.len(),
            transitions = decision.transitions.len(),
            unfinished = decision.unfinished,
            "DAG run state updated"
        );
        Ok(decision)
    }

    async fn snapshot(&self, dag: &Dag, run: DagRun) -> Result<RunSnapshot> {
        let instances = self
            .store
            .list_task_instances(&run.dag_id, run.execution_date)
            .await?;

        let previous = if dag.tasks().any(|task| task.depends_on_past) {
            self.previous_run_view(&run).await?
        } else {
            PreviousRunView::default()
        };

        let mut running_counts = HashMap::new();
        for task in dag.tasks().filter(|task| task.task_concurrency.is_some()) {
            let count = self.store.running_count(&dag.dag_id, &task.task_id).await?;
            running_counts.insert(task.task_id.clone(), count);
        }

        Ok(RunSnapshot::new(run, instances)
            .with_previous(previous)
            .with_running_counts(running_counts))
    }

    async fn previous_run_view(&self, run: &DagRun) -> Result<PreviousRunView> {
        let Some(previous) = self
            .store
            .get_previous_dag_run(&run.dag_id, run.execution_date)
            .await?
        else {
            return Ok(PreviousRunView::default());
        };
        let states = self
            .store
            .list_task_instances(&previous.dag_id, previous.execution_date)
            .await?
            .into_iter()
            .map(|ti| (ti.task_id, ti.state))
            .collect();
        Ok(PreviousRunView::new(Some(previous), states))
    }

    async fn apply(&self, decision: &RunStateDecision, now: DateTime<Utc>) -> Result<()> {
        for instance in &decision.created {
            self.store.create_task_instance(instance).await?;
        }

        for transition in &decision.transitions {
            let event = match transition.to {
                TaskInstanceState::Skipped => TaskInstanceEvent::Skip,
                _ => TaskInstanceEvent::UpstreamFail,
            };
            self.transition_if_present(&transition.key, &event, now).await?;
        }

        for key in &decision.ready {
            if self
                .transition_if_present(key, &TaskInstanceEvent::Schedule, now)
                .await?
            {
                self.aggregator.publisher().publish(
                    events::TASK_INSTANCE_READY,
                    json!({
                        "dag_id": key.dag_id,
                        "task_id": key.task_id,
                        "execution_date": key.execution_date,
                    }),
                );
            }
        }
        Ok(())
    }

    /// Re-read the instance and apply `event`; a concurrent writer that moved it first wins
    async fn transition_if_present(
        &self,
        key: &TaskInstanceKey,
        event: &TaskInstanceEvent,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(mut instance) = self.store.get_task_instance(key).await? else {
            debug!(task_id = %key.task_id, "Task instance vanished before update");
            return Ok(false);
        };
        match self.task_state_machine.transition(&mut instance, event, now) {
            Ok(_) => {
                self.store.save_task_instance(&instance).await?;
                Ok(true)
            }
            Err(error) => {
                warn!(
                    task_id = %key.task_id,
                    error = %error,
                    "Skipping stale task instance decision"
                );
                Ok(false)
            }
        }
    }

    /// Apply an executor-reported event to one instance
    #[instrument(skip(self), fields(dag_id = %key.dag_id, task_id = %key.task_id))]
    pub async fn apply_task_event(
        &self,
        key: &TaskInstanceKey,
        event: TaskInstanceEvent,
    ) -> Result<TaskInstance> {
        let mut instance = self
            .store
            .get_task_instance(key)
            .await?
            .ok_or_else(|| PersistenceError::NotFound(key.to_string()))?;

        let from = instance.state;
        let to = self
            .task_state_machine
            .transition(&mut instance, &event, Utc::now())?;
        self.store.save_task_instance(&instance).await?;

        self.aggregator.publisher().publish(
            events::TASK_INSTANCE_STATE_CHANGED,
            json!({
                "dag_id": key.dag_id,
                "task_id": key.task_id,
                "execution_date": key.execution_date,
                "from_state": from,
                "to_state": to,
                "try_number": instance.try_number,
            }),
        );
        Ok(instance)
    }

    /// Explicitly put a terminal run back into RUNNING
    #[instrument(skip(self), fields(dag_id = %dag_id))]
    pub async fn reset_dag_run(
        &self,
        dag_id: &str,
        execution_date: DateTime<Utc>,
    ) -> Result<Option<DagRunState>> {
        let mut run = self.load_run(dag_id, execution_date).await?;
        let changed = self
            .run_state_machine
            .transition(&mut run, &DagRunEvent::Reset, Utc::now());
        if changed.is_some() {
            self.store.save_dag_run(&run).await?;
            self.aggregator.publisher().publish(
                events::DAG_RUN_RESET,
                json!({"dag_id": run.dag_id, "run_id": run.run_id}),
            );
        }
        Ok(changed)
    }
}
