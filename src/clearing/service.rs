//! Applying a cross-DAG clear: resolve markers, write the cleared instances, reopen their runs.

use super::clear::plan_clear;
use super::resolver::CrossDagResolver;
use super::ClearResult;
use crate::config::ClearingConfig;
use crate::constants::events;
use crate::events::EventPublisher;
use crate::models::{DagRegistry, TaskInstance};
use crate::persistence::RunStore;
use crate::state_machine::{DagRunEvent, DagRunStateMachine};
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Per-call switches for a clear
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearOptions {
    /// Resolve the affected instances without writing anything
    pub dry_run: bool,
}

/// What a clear touched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClearOutcome {
    /// Instances in their post-clear state, or as found for a dry run
    pub cleared: Vec<TaskInstance>,
    /// Runs moved back to RUNNING
    pub reset_runs: Vec<(String, DateTime<Utc>)>,
}

impl ClearOutcome {
    pub fn count(&self) -> usize {
        self.cleared.len()
    }
}

/// Resolves and applies clears against the run store
pub struct ClearingService {
    resolver: CrossDagResolver,
    registry: Arc<DagRegistry>,
    store: Arc<dyn RunStore>,
    config: ClearingConfig,
    publisher: EventPublisher,
    run_state_machine: DagRunStateMachine,
}

impl ClearingService {
    pub fn new(
        registry: Arc<DagRegistry>,
        store: Arc<dyn RunStore>,
        config: ClearingConfig,
        publisher: EventPublisher,
    ) -> Self {
        Self {
            resolver: CrossDagResolver::new(Arc::clone(&registry), Arc::clone(&store)),
            registry,
            store,
            config,
            publisher,
            run_state_machine: DagRunStateMachine::new(),
        }
    }

    pub fn resolver(&self) -> &CrossDagResolver {
        &self.resolver
    }

    /// Clear `task_id` and everything downstream of it, in this DAG and through markers.
    ///
    /// Nothing is written when resolution fails, so a recursion-budget error leaves every
    /// instance as it was.
    #[instrument(skip(self))]
    pub async fn clear(
        &self,
        dag_id: &str,
        task_id: &str,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        options: ClearOptions,
    ) -> ClearResult<ClearOutcome> {
        let found = self
            .resolver
            .propagate_clear(dag_id, task_id, start, end)
            .await?;

        if options.dry_run {
            debug!(count = found.len(), "Dry run; nothing cleared");
            return Ok(ClearOutcome {
                cleared: found,
                reset_runs: Vec::new(),
            });
        }

        let now = Utc::now();
        let plan = plan_clear(found, &self.registry, now);
        // Row writes are independent of each other
        try_join_all(
            plan.instances
                .iter()
                .map(|instance| self.store.save_task_instance(instance)),
        )
        .await?;

        let mut reset_runs = Vec::new();
        if self.config.activate_dag_runs {
            for (run_dag_id, execution_date) in &plan.dag_runs {
                let Some(mut run) = self.store.get_dag_run(run_dag_id, *execution_date).await? else {
                    continue;
                };
                if self
                    .run_state_machine
                    .transition(&mut run, &DagRunEvent::Reset, now)
                    .is_some()
                {
                    self.store.save_dag_run(&run).await?;
                    reset_runs.push((run_dag_id.clone(), *execution_date));
                }
            }
        }

        info!(
            cleared = plan.instances.len(),
            reset_runs = reset_runs.len(),
            "Cleared task instances"
        );
        self.publisher.publish(
            events::TASK_INSTANCES_CLEARED,
            json!({
                "dag_id": dag_id,
                "task_id": task_id,
                "count": plan.instances.len(),
                "reset_runs": reset_runs.len(),
            }),
        );

        Ok(ClearOutcome {
            cleared: plan.instances,
            reset_runs,
        })
    }
}
