//! Cross-DAG dependency resolution for clears.
//!
//! Clearing a task clears its downstream closure; every External Task Marker among the
//! cleared instances points into another DAG whose target task and downstream closure are
//! cleared as well, one hop further away from the origin.
//!
//! The first marker followed sets the hop ceiling from its `recursion_depth`. A later
//! marker with less budget than the hops remaining tightens it. Following a marker past the
//! ceiling is an error, which also ends traversal of cyclic marker graphs.

use super::{ClearError, ClearResult};
use crate::models::{Dag, DagRegistry, Task, TaskInstance, TaskInstanceKey};
use crate::persistence::RunStore;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// One query's worth of work: a task set in one DAG over a date range
#[derive(Debug, Clone)]
struct Frame {
    dag_id: String,
    task_ids: BTreeSet<String>,
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    /// Markers followed to get here
    hop: u32,
    ceiling: Option<u32>,
}

/// Hop ceiling after reaching a marker with `depth` at `hop`
pub(crate) fn tightened_ceiling(ceiling: Option<u32>, hop: u32, depth: u32) -> u32 {
    match ceiling {
        Some(ceiling) if depth >= ceiling.saturating_sub(hop) => ceiling,
        _ => hop.saturating_add(depth),
    }
}

/// Collects the task instances a clear affects, across DAG boundaries
pub struct CrossDagResolver {
    registry: Arc<DagRegistry>,
    store: Arc<dyn RunStore>,
}

impl CrossDagResolver {
    pub fn new(registry: Arc<DagRegistry>, store: Arc<dyn RunStore>) -> Self {
        Self { registry, store }
    }

    /// Instances of `origin_task` and its downstream closure between `start` and `end`
    /// (`None`: every later date), plus everything reachable through markers.
    #[instrument(skip(self))]
    pub async fn propagate_clear(
        &self,
        origin_dag: &str,
        origin_task: &str,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> ClearResult<Vec<TaskInstance>> {
        let dag = self
            .registry
            .get(origin_dag)
            .ok_or_else(|| ClearError::DagNotFound(origin_dag.to_string()))?;
        let task_ids = closure_including(dag.as_ref(), origin_dag, origin_task)?;
        self.resolve(origin_dag, task_ids, start, end).await
    }

    /// Like [`propagate_clear`](Self::propagate_clear) for an explicit task selection
    pub async fn resolve(
        &self,
        dag_id: &str,
        task_ids: BTreeSet<String>,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> ClearResult<Vec<TaskInstance>> {
        let mut cleared: BTreeMap<TaskInstanceKey, TaskInstance> = BTreeMap::new();
        let mut visited: HashSet<(String, String, DateTime<Utc>, u32)> = HashSet::new();
        let mut frames = VecDeque::from([Frame {
            dag_id: dag_id.to_string(),
            task_ids,
            start,
            end,
            hop: 0,
            ceiling: None,
        }]);
        let mut queries = 0usize;

        while let Some(frame) = frames.pop_front() {
            let dag = self
                .registry
                .get(&frame.dag_id)
                .ok_or_else(|| ClearError::DagNotFound(frame.dag_id.clone()))?;
            let instances = self
                .store
                .find_task_instances(&frame.dag_id, Some(&frame.task_ids), frame.start, frame.end)
                .await?;
            queries += 1;

            debug!(
                dag_id = %frame.dag_id,
                hop = frame.hop,
                instances = instances.len(),
                "Collected task instances to clear"
            );

            for instance in instances {
                if let Some(marker) = dag.task(&instance.task_id).and_then(Task::marker) {
                    let ceiling = tightened_ceiling(frame.ceiling, frame.hop, marker.recursion_depth);
                    if frame.hop + 1 > ceiling {
                        return Err(ClearError::MaxRecursionDepthExceeded {
                            max_depth: ceiling,
                            task_id: instance.task_id.clone(),
                        });
                    }

                    let target_date = marker.execution_date.resolve(instance.execution_date);
                    let visit = (
                        marker.external_dag_id.clone(),
                        marker.external_task_id.clone(),
                        target_date,
                        frame.hop + 1,
                    );
                    if visited.insert(visit) {
                        let target = self
                            .registry
                            .get(&marker.external_dag_id)
                            .ok_or_else(|| ClearError::DagNotFound(marker.external_dag_id.clone()))?;
                        frames.push_back(Frame {
                            dag_id: marker.external_dag_id.clone(),
                            task_ids: closure_including(
                                target.as_ref(),
                                &marker.external_dag_id,
                                &marker.external_task_id,
                            )?,
                            start: target_date,
                            end: Some(target_date),
                            hop: frame.hop + 1,
                            ceiling: Some(ceiling),
                        });
                    }
                }
                cleared.entry(instance.key()).or_insert(instance);
            }
        }

        info!(
            dag_id = %dag_id,
            cleared = cleared.len(),
            queries = queries,
            "Resolved task instances to clear"
        );
        Ok(cleared.into_values().collect())
    }
}

fn closure_including(
    dag: &Dag,
    dag_id: &str,
    task_id: &str,
) -> ClearResult<BTreeSet<String>> {
    if !dag.has_task(task_id) {
        return Err(ClearError::TaskNotFound {
            dag_id: dag_id.to_string(),
            task_id: task_id.to_string(),
        });
    }
    let mut task_ids = dag.downstream_closure(task_id);
    task_ids.insert(task_id.to_string());
    Ok(task_ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_marker_sets_ceiling() {
        assert_eq!(tightened_ceiling(None, 0, 3), 3);
    }

    #[test]
    fn test_later_markers_only_tighten() {
        // Enough budget left: ceiling unchanged
        assert_eq!(tightened_ceiling(Some(3), 1, 2), 3);
        assert_eq!(tightened_ceiling(Some(3), 1, 10), 3);
        // Less budget than the hops remaining: new, tighter ceiling
        assert_eq!(tightened_ceiling(Some(10), 2, 1), 3);
    }
}
