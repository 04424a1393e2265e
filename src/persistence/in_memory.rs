use super::{PersistenceResult, RunStore};
use crate::models::{DagRun, TaskInstance, TaskInstanceKey};
use crate::state_machine::TaskInstanceState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

type RunKey = (String, DateTime<Utc>);

/// `RunStore` backed by ordered maps behind `parking_lot` locks.
///
/// Instances are keyed by `(dag_id, task_id, execution_date)` so date-range lookups for
/// one task are a single range scan.
#[derive(Debug, Default)]
pub struct InMemoryRunStore {
    runs: RwLock<BTreeMap<RunKey, DagRun>>,
    instances: RwLock<BTreeMap<TaskInstanceKey, TaskInstance>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed helpers for tests and embedding
    pub fn insert_dag_run(&self, run: DagRun) {
        self.runs
            .write()
            .insert((run.dag_id.clone(), run.execution_date), run);
    }

    pub fn insert_task_instance(&self, instance: TaskInstance) {
        self.instances.write().insert(instance.key(), instance);
    }

    pub fn dag_run(&self, dag_id: &str, execution_date: DateTime<Utc>) -> Option<DagRun> {
        self.runs
            .read()
            .get(&(dag_id.to_string(), execution_date))
            .cloned()
    }

    pub fn task_instance(&self, key: &TaskInstanceKey) -> Option<TaskInstance> {
        self.instances.read().get(key).cloned()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.read().len()
    }

    fn range_for_task(
        instances: &BTreeMap<TaskInstanceKey, TaskInstance>,
        dag_id: &str,
        task_id: &str,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        out: &mut Vec<TaskInstance>,
    ) {
        let lower = TaskInstanceKey::new(dag_id, task_id, start);
        let upper = match end {
            Some(end) => Bound::Included(TaskInstanceKey::new(dag_id, task_id, end)),
            None => Bound::Included(TaskInstanceKey::new(dag_id, task_id, DateTime::<Utc>::MAX_UTC)),
        };
        out.extend(
            instances
                .range((Bound::Included(lower), upper))
                .map(|(_, ti)| ti.clone()),
        );
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn get_dag_run(
        &self,
        dag_id: &str,
        execution_date: DateTime<Utc>,
    ) -> PersistenceResult<Option<DagRun>> {
        Ok(self.dag_run(dag_id, execution_date))
    }

    async fn get_previous_dag_run(
        &self,
        dag_id: &str,
        execution_date: DateTime<Utc>,
    ) -> PersistenceResult<Option<DagRun>> {
        let runs = self.runs.read();
        let lower = (dag_id.to_string(), DateTime::<Utc>::MIN_UTC);
        let upper = (dag_id.to_string(), execution_date);
        Ok(runs
            .range((Bound::Included(lower), Bound::Excluded(upper)))
            .next_back()
            .map(|(_, run)| run.clone()))
    }

    async fn save_dag_run(&self, run: &DagRun) -> PersistenceResult<()> {
        self.insert_dag_run(run.clone());
        Ok(())
    }

    async fn list_task_instances(
        &self,
        dag_id: &str,
        execution_date: DateTime<Utc>,
    ) -> PersistenceResult<Vec<TaskInstance>> {
        Ok(self
            .instances
            .read()
            .values()
            .filter(|ti| ti.dag_id == dag_id && ti.execution_date == execution_date)
            .cloned()
            .collect())
    }

    async fn get_task_instance(&self, key: &TaskInstanceKey) -> PersistenceResult<Option<TaskInstance>> {
        Ok(self.task_instance(key))
    }

    async fn find_task_instances(
        &self,
        dag_id: &str,
        task_ids: Option<&BTreeSet<String>>,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> PersistenceResult<Vec<TaskInstance>> {
        let instances = self.instances.read();
        let mut found = Vec::new();
        match task_ids {
            Some(task_ids) => {
                for task_id in task_ids {
                    Self::range_for_task(&instances, dag_id, task_id, start, end, &mut found);
                }
            }
            None => found.extend(
                instances
                    .values()
                    .filter(|ti| {
                        ti.dag_id == dag_id
                            && ti.execution_date >= start
                            && end.map_or(true, |end| ti.execution_date <= end)
                    })
                    .cloned(),
            ),
        }
        Ok(found)
    }

    async fn running_count(&self, dag_id: &str, task_id: &str) -> PersistenceResult<usize> {
        Ok(self
            .instances
            .read()
            .values()
            .filter(|ti| {
                ti.dag_id == dag_id
                    && ti.task_id == task_id
                    && matches!(ti.state, TaskInstanceState::Running | TaskInstanceState::Queued)
            })
            .count())
    }

    async fn create_task_instance(&self, instance: &TaskInstance) -> PersistenceResult<bool> {
        let mut instances = self.instances.write();
        let key = instance.key();
        if instances.contains_key(&key) {
            return Ok(false);
        }
        instances.insert(key, instance.clone());
        Ok(true)
    }

    async fn save_task_instance(&self, instance: &TaskInstance) -> PersistenceResult<()> {
        self.insert_task_instance(instance.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DagRunType;
    use chrono::{Duration, TimeZone};

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
    }

    #[tokio::test]
    async fn test_duplicate_create_is_not_an_error() {
        let store = InMemoryRunStore::new();
        let ti = TaskInstance::bare("dag", "op1", day(0));

        assert!(store.create_task_instance(&ti).await.unwrap());
        assert!(!store.create_task_instance(&ti).await.unwrap());
        assert_eq!(store.instance_count(), 1);
    }

    #[test]
    fn test_racing_creates_materialize_once() {
        let store = InMemoryRunStore::new();
        let ti = TaskInstance::bare("dag", "op1", day(0));

        let created = tokio_test::block_on(futures::future::join_all(
            (0..4).map(|_| store.create_task_instance(&ti)),
        ));
        let winners = created.into_iter().filter(|r| matches!(r, Ok(true))).count();
        assert_eq!(winners, 1);
        assert_eq!(store.instance_count(), 1);
    }

    #[tokio::test]
    async fn test_find_with_unbounded_end() {
        let store = InMemoryRunStore::new();
        for n in 0..5 {
            store.insert_task_instance(TaskInstance::bare("dag", "op1", day(n)));
            store.insert_task_instance(TaskInstance::bare("dag", "op2", day(n)));
        }
        let ids = BTreeSet::from(["op1".to_string()]);

        let found = store
            .find_task_instances("dag", Some(&ids), day(2), None)
            .await
            .unwrap();
        assert_eq!(found.len(), 3);
        assert!(found.iter().all(|ti| ti.task_id == "op1"));

        let bounded = store
            .find_task_instances("dag", None, day(1), Some(day(2)))
            .await
            .unwrap();
        assert_eq!(bounded.len(), 4);
    }

    #[tokio::test]
    async fn test_previous_dag_run() {
        let store = InMemoryRunStore::new();
        store.insert_dag_run(DagRun::new("dag", day(0), DagRunType::Scheduled));
        store.insert_dag_run(DagRun::new("dag", day(1), DagRunType::Scheduled));
        store.insert_dag_run(DagRun::new("other", day(1), DagRunType::Scheduled));

        let previous = store.get_previous_dag_run("dag", day(2)).await.unwrap().unwrap();
        assert_eq!(previous.execution_date, day(1));
        assert!(store.get_previous_dag_run("dag", day(0)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_running_count() {
        let store = InMemoryRunStore::new();
        store.insert_task_instance(
            TaskInstance::bare("dag", "op1", day(0)).with_state(TaskInstanceState::Running),
        );
        store.insert_task_instance(
            TaskInstance::bare("dag", "op1", day(1)).with_state(TaskInstanceState::Success),
        );
        assert_eq!(store.running_count("dag", "op1").await.unwrap(), 1);
    }
}
