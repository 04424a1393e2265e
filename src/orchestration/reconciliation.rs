//! Reconciliation of a run's task instances with the DAG's current task set.
//!
//! Only creates: missing instances are added in NONE state, existing ones are never
//! rewritten, and instances of removed tasks are left as they are so they can be
//! recovered if the task comes back.

use crate::models::{Dag, DagRun, TaskInstance, TaskInstanceKey};
use crate::persistence::{PersistenceResult, RunStore};
use std::collections::HashSet;
use tracing::{debug, info};

/// Adjusts an about-to-be-created instance (queue, pool, priority)
pub trait TaskInstanceMutationHook: Send + Sync {
    fn mutate(&self, instance: &mut TaskInstance);
}

/// Default hook: leaves instances alone
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMutationHook;

impl TaskInstanceMutationHook for NoopMutationHook {
    fn mutate(&self, _instance: &mut TaskInstance) {}
}

impl<F> TaskInstanceMutationHook for F
where
    F: Fn(&mut TaskInstance) + Send + Sync,
{
    fn mutate(&self, instance: &mut TaskInstance) {
        self(instance)
    }
}

/// Outcome of reconciling one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntegrityReport {
    /// Instances created for tasks that had none
    pub created: Vec<TaskInstance>,
    /// Instances whose task is no longer in the DAG; left untouched
    pub orphaned: Vec<TaskInstanceKey>,
}

/// Decide which instances are missing. Pure.
pub fn plan_integrity(
    dag: &Dag,
    run: &DagRun,
    existing: &[TaskInstance],
    hook: &dyn TaskInstanceMutationHook,
) -> IntegrityReport {
    let present: HashSet<&str> = existing.iter().map(|ti| ti.task_id.as_str()).collect();

    let orphaned = existing
        .iter()
        .filter(|ti| !dag.has_task(&ti.task_id))
        .map(TaskInstance::key)
        .collect();

    let created = dag
        .tasks()
        .filter(|task| !present.contains(task.task_id.as_str()))
        .map(|task| {
            let mut instance = TaskInstance::new(task, run.execution_date);
            hook.mutate(&mut instance);
            instance
        })
        .collect();

    IntegrityReport { created, orphaned }
}

/// Ensure exactly one instance per current task exists for `run`.
///
/// Safe to race with itself: an instance created concurrently by someone else is
/// treated as present and dropped from `created`.
pub async fn verify_integrity(
    store: &dyn RunStore,
    dag: &Dag,
    run: &DagRun,
    hook: &dyn TaskInstanceMutationHook,
) -> PersistenceResult<IntegrityReport> {
    let existing = store
        .list_task_instances(&run.dag_id, run.execution_date)
        .await?;
    let mut report = plan_integrity(dag, run, &existing, hook);

    let mut created = Vec::with_capacity(report.created.len());
    for instance in report.created.drain(..) {
        if store.create_task_instance(&instance).await? {
            created.push(instance);
        } else {
            debug!(
                dag_id = %instance.dag_id,
                task_id = %instance.task_id,
                "Task instance created concurrently; keeping existing"
            );
        }
    }
    report.created = created;

    if !report.created.is_empty() || !report.orphaned.is_empty() {
        info!(
            dag_id = %run.dag_id,
            run_id = %run.run_id,
            created = report.created.len(),
            orphaned = report.orphaned.len(),
            "Reconciled task instances with DAG definition"
        );
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DagRunType, Task};
    use chrono::Utc;

    fn dag(task_ids: &[&str]) -> Dag {
        let mut dag = Dag::new("reconcile").unwrap();
        for id in task_ids {
            dag.add_task(Task::new(*id)).unwrap();
        }
        dag
    }

    #[test]
    fn test_plan_creates_only_missing() {
        let dag = dag(&["a", "b"]);
        let run = DagRun::new("reconcile", Utc::now(), DagRunType::Manual);
        let existing = vec![TaskInstance::new(dag.task("a").unwrap(), run.execution_date)];

        let report = plan_integrity(&dag, &run, &existing, &NoopMutationHook);
        assert_eq!(report.created.len(), 1);
        assert_eq!(report.created[0].task_id, "b");
        assert!(report.orphaned.is_empty());
    }

    #[test]
    fn test_hook_applies_to_new_instances_only() {
        let dag = dag(&["a"]);
        let run = DagRun::new("reconcile", Utc::now(), DagRunType::Manual);
        let hook = |ti: &mut TaskInstance| ti.queue = "mutated".to_string();

        let report = plan_integrity(&dag, &run, &[], &hook);
        assert_eq!(report.created[0].queue, "mutated");
    }

    #[test]
    fn test_removed_tasks_are_reported_not_touched() {
        let dag = dag(&["a"]);
        let run = DagRun::new("reconcile", Utc::now(), DagRunType::Manual);
        let stale = TaskInstance::bare("reconcile", "gone", run.execution_date);

        let report = plan_integrity(&dag, &run, &[stale.clone()], &NoopMutationHook);
        assert_eq!(report.orphaned, vec![stale.key()]);
        assert_eq!(report.created.len(), 1);
    }
}
