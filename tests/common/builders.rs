//! Scenario builders shared by the integration tests.

use super::default_date;
use chrono::{DateTime, Duration, Utc};
use dagflow_core::models::{
    Dag, DagRegistry, DagRun, DagRunType, ExecutionDateSpec, ExternalTaskMarker, ExternalTaskSensor,
    ScheduleInterval, Task, TaskInstance, TriggerRule,
};
use dagflow_core::persistence::InMemoryRunStore;
use dagflow_core::state_machine::{DagRunState, TaskInstanceState};
use std::sync::Arc;

/// Fluent construction of a DAG from task ids and edges
pub struct DagBuilder {
    dag: Dag,
}

impl DagBuilder {
    pub fn new(dag_id: &str) -> Self {
        let dag = Dag::new(dag_id)
            .expect("valid dag id")
            .with_schedule(ScheduleInterval::None)
            .with_start_date(default_date());
        Self { dag }
    }

    pub fn schedule(mut self, schedule: ScheduleInterval) -> Self {
        self.dag.schedule_interval = schedule;
        self
    }

    pub fn task(mut self, task: Task) -> Self {
        self.dag.add_task(task).expect("task accepted");
        self
    }

    pub fn dummy(self, task_id: &str) -> Self {
        self.task(Task::dummy(task_id))
    }

    pub fn with_rule(self, task_id: &str, rule: TriggerRule) -> Self {
        self.task(Task::new(task_id).with_trigger_rule(rule))
    }

    /// Marker into `external_dag_id.external_task_id` at the same date
    pub fn marker(self, task_id: &str, external_dag_id: &str, external_task_id: &str, depth: u32) -> Self {
        let marker = ExternalTaskMarker::new(external_dag_id, external_task_id)
            .with_recursion_depth(task_id, depth)
            .expect("positive recursion depth");
        self.task(Task::external_marker(task_id, marker))
    }

    pub fn offset_marker(
        self,
        task_id: &str,
        external_dag_id: &str,
        external_task_id: &str,
        offset: Duration,
    ) -> Self {
        let marker = ExternalTaskMarker::new(external_dag_id, external_task_id)
            .with_execution_date(ExecutionDateSpec::Offset(offset));
        self.task(Task::external_marker(task_id, marker))
    }

    pub fn sensor(self, task_id: &str, external_dag_id: &str, external_task_id: &str) -> Self {
        let sensor = ExternalTaskSensor::new(
            task_id,
            external_dag_id,
            Some(external_task_id.to_string()),
            None,
            None,
            None,
        )
        .expect("valid sensor");
        self.task(Task::external_sensor(task_id, sensor))
    }

    pub fn edge(mut self, upstream: &str, downstream: &str) -> Self {
        self.dag
            .set_dependency(upstream, downstream)
            .expect("edge accepted");
        self
    }

    pub fn build(self) -> Dag {
        self.dag
    }
}

/// Four DAGs chained by markers with recursion depths 3, 2 and 1:
/// `dag_0.task_b_0 -> dag_1.task_a_1`, `dag_1.task_b_1 -> dag_2.task_a_2`,
/// `dag_2.task_b_2 -> dag_3.task_a_3`.
pub fn marker_chain(first_depth: u32) -> Vec<Dag> {
    vec![
        DagBuilder::new("dag_0")
            .dummy("task_a_0")
            .marker("task_b_0", "dag_1", "task_a_1", first_depth)
            .edge("task_a_0", "task_b_0")
            .build(),
        DagBuilder::new("dag_1")
            .sensor("task_a_1", "dag_0", "task_b_0")
            .marker("task_b_1", "dag_2", "task_a_2", 2)
            .edge("task_a_1", "task_b_1")
            .build(),
        DagBuilder::new("dag_2")
            .sensor("task_a_2", "dag_1", "task_b_1")
            .marker("task_b_2", "dag_3", "task_a_3", 1)
            .edge("task_a_2", "task_b_2")
            .build(),
        DagBuilder::new("dag_3")
            .sensor("task_a_3", "dag_2", "task_b_2")
            .dummy("task_b_3")
            .edge("task_a_3", "task_b_3")
            .build(),
    ]
}

/// Two DAGs whose markers point at each other
pub fn marker_cycle() -> Vec<Dag> {
    vec![
        DagBuilder::new("dag_0")
            .dummy("task_a_0")
            .marker("task_b_0", "dag_1", "task_a_1", 3)
            .edge("task_a_0", "task_b_0")
            .build(),
        DagBuilder::new("dag_1")
            .sensor("task_a_1", "dag_0", "task_b_0")
            .marker("task_b_1", "dag_0", "task_a_0", 2)
            .edge("task_a_1", "task_b_1")
            .build(),
    ]
}

/// `agg_dag` fans out from `start` to 25 markers, marker `i` pointing at `daily_dag`
/// `i` days earlier
pub fn marker_fan_out() -> Vec<Dag> {
    let daily = DagBuilder::new("daily_dag")
        .schedule(ScheduleInterval::Every(Duration::days(1)))
        .dummy("daily_tas")
        .build();

    let mut agg = DagBuilder::new("agg_dag")
        .schedule(ScheduleInterval::Every(Duration::days(1)))
        .dummy("start");
    for i in 0..25 {
        let task_id = format!("daily_tas_{i}");
        agg = agg
            .offset_marker(&task_id, "daily_dag", "daily_tas", Duration::days(-i))
            .edge("start", &task_id);
    }
    vec![daily, agg.build()]
}

pub fn registry_of(dags: Vec<Dag>) -> Arc<DagRegistry> {
    let registry = DagRegistry::new();
    for dag in dags {
        registry.register(dag).expect("dag registers");
    }
    Arc::new(registry)
}

/// Record a finished, fully successful run of every registered DAG at `date`
pub fn run_all_tasks(registry: &DagRegistry, store: &InMemoryRunStore, date: DateTime<Utc>) {
    for dag_id in registry.dag_ids() {
        let dag = registry.get(&dag_id).expect("registered");
        let mut run = DagRun::new(dag_id.as_str(), date, DagRunType::Scheduled);
        run.set_state(DagRunState::Success, date);
        store.insert_dag_run(run);
        for task in dag.tasks() {
            let mut instance = TaskInstance::new(task, date).with_state(TaskInstanceState::Success);
            instance.try_number = 1;
            store.insert_task_instance(instance);
        }
    }
}
