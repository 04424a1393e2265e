use super::task::validate_key;
use super::{ScheduleInterval, Task};
use crate::error::ConfigurationError;
use crate::orchestration::callbacks::DagRunCallback;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;

/// Success/failure hooks invoked when a run reaches a terminal state
#[derive(Clone, Default)]
pub struct DagCallbacks {
    pub on_success: Option<Arc<dyn DagRunCallback>>,
    pub on_failure: Option<Arc<dyn DagRunCallback>>,
}

impl fmt::Debug for DagCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DagCallbacks")
            .field("on_success", &self.on_success.is_some())
            .field("on_failure", &self.on_failure.is_some())
            .finish()
    }
}

/// A named, acyclic graph of tasks keyed by `task_id`
#[derive(Debug, Clone)]
pub struct Dag {
    pub dag_id: String,
    pub description: Option<String>,
    pub schedule_interval: ScheduleInterval,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub timezone: String,
    pub catchup: bool,
    pub concurrency: u32,
    pub max_active_runs: u32,
    pub tags: BTreeSet<String>,
    pub params: BTreeMap<String, Value>,
    /// Source file the definition was loaded from
    pub fileloc: Option<String>,
    /// When the definition was last loaded; time-varying, normalized for comparisons
    pub last_loaded: Option<DateTime<Utc>>,
    pub callbacks: DagCallbacks,
    tasks: BTreeMap<String, Task>,
}

impl Dag {
    pub fn new(dag_id: impl Into<String>) -> Result<Self, ConfigurationError> {
        let dag_id = dag_id.into();
        validate_key(&dag_id)?;
        Ok(Self {
            dag_id,
            description: None,
            schedule_interval: ScheduleInterval::default(),
            start_date: None,
            end_date: None,
            timezone: "UTC".to_string(),
            catchup: true,
            concurrency: 16,
            max_active_runs: 16,
            tags: BTreeSet::new(),
            params: BTreeMap::new(),
            fileloc: None,
            last_loaded: None,
            callbacks: DagCallbacks::default(),
            tasks: BTreeMap::new(),
        })
    }

    pub fn with_schedule(mut self, schedule_interval: ScheduleInterval) -> Self {
        self.schedule_interval = schedule_interval;
        self
    }

    pub fn with_start_date(mut self, start_date: DateTime<Utc>) -> Self {
        self.start_date = Some(start_date);
        self
    }

    pub fn with_on_success_callback(mut self, callback: Arc<dyn DagRunCallback>) -> Self {
        self.callbacks.on_success = Some(callback);
        self
    }

    pub fn with_on_failure_callback(mut self, callback: Arc<dyn DagRunCallback>) -> Self {
        self.callbacks.on_failure = Some(callback);
        self
    }

    /// Add a task, validating it and binding it to this DAG.
    ///
    /// Tasks without a start date inherit the DAG's.
    pub fn add_task(&mut self, mut task: Task) -> Result<(), ConfigurationError> {
        task.validate()?;
        if self.tasks.contains_key(&task.task_id) {
            return Err(ConfigurationError::DuplicateTask {
                dag_id: self.dag_id.clone(),
                task_id: task.task_id,
            });
        }
        task.dag_id = self.dag_id.clone();
        if task.start_date.is_none() {
            task.start_date = self.start_date;
        }
        // Edges are owned by the DAG; stale ids from another graph are dropped
        task.upstream_task_ids.clear();
        task.downstream_task_ids.clear();
        self.tasks.insert(task.task_id.clone(), task);
        Ok(())
    }

    /// Add an edge `upstream -> downstream`, rejecting unknown tasks and cycles
    pub fn set_dependency(&mut self, upstream: &str, downstream: &str) -> Result<(), ConfigurationError> {
        for task_id in [upstream, downstream] {
            if !self.tasks.contains_key(task_id) {
                return Err(ConfigurationError::UnknownTask {
                    dag_id: self.dag_id.clone(),
                    task_id: task_id.to_string(),
                });
            }
        }
        if upstream == downstream {
            return Err(ConfigurationError::SelfDependency {
                task_id: upstream.to_string(),
            });
        }
        if self.downstream_closure(downstream).contains(upstream) {
            return Err(ConfigurationError::CycleDetected {
                dag_id: self.dag_id.clone(),
                task_id: downstream.to_string(),
            });
        }

        if let Some(task) = self.tasks.get_mut(upstream) {
            task.downstream_task_ids.insert(downstream.to_string());
        }
        if let Some(task) = self.tasks.get_mut(downstream) {
            task.upstream_task_ids.insert(upstream.to_string());
        }
        Ok(())
    }

    /// Chain tasks in order: `chain(&["a", "b", "c"])` is `a -> b -> c`
    pub fn chain(&mut self, task_ids: &[&str]) -> Result<(), ConfigurationError> {
        for pair in task_ids.windows(2) {
            self.set_dependency(pair[0], pair[1])?;
        }
        Ok(())
    }

    /// Remove a task and its edges. Existing task instances are untouched.
    pub fn remove_task(&mut self, task_id: &str) -> Option<Task> {
        let removed = self.tasks.remove(task_id)?;
        for task in self.tasks.values_mut() {
            task.upstream_task_ids.remove(task_id);
            task.downstream_task_ids.remove(task_id);
        }
        Some(removed)
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    /// Mutable access for definition-time adjustments. Edges should go through
    /// [`Dag::set_dependency`].
    pub fn task_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.tasks.get_mut(task_id)
    }

    pub fn has_task(&self, task_id: &str) -> bool {
        self.tasks.contains_key(task_id)
    }

    /// Tasks in task-id order
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn task_ids(&self) -> impl Iterator<Item = &String> {
        self.tasks.keys()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn roots(&self) -> Vec<&Task> {
        self.tasks.values().filter(|t| t.is_root()).collect()
    }

    pub fn leaves(&self) -> Vec<&Task> {
        self.tasks.values().filter(|t| t.is_leaf()).collect()
    }

    /// Every task reachable downstream of `task_id`, excluding itself
    pub fn downstream_closure(&self, task_id: &str) -> BTreeSet<String> {
        self.closure(task_id, |t| &t.downstream_task_ids)
    }

    /// Every task reachable upstream of `task_id`, excluding itself
    pub fn upstream_closure(&self, task_id: &str) -> BTreeSet<String> {
        self.closure(task_id, |t| &t.upstream_task_ids)
    }

    fn closure<F>(&self, task_id: &str, edges: F) -> BTreeSet<String>
    where
        F: Fn(&Task) -> &BTreeSet<String>,
    {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([task_id.to_string()]);
        while let Some(current) = queue.pop_front() {
            if let Some(task) = self.tasks.get(&current) {
                for next in edges(task) {
                    if seen.insert(next.clone()) {
                        queue.push_back(next.clone());
                    }
                }
            }
        }
        seen.remove(task_id);
        seen
    }

    /// Kahn ordering; `None` if the graph has a cycle
    pub fn topological_order(&self) -> Option<Vec<String>> {
        let mut in_degree: BTreeMap<&str, usize> = self
            .tasks
            .values()
            .map(|t| (t.task_id.as_str(), t.upstream_task_ids.len()))
            .collect();
        let mut ready: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut order = Vec::with_capacity(self.tasks.len());
        while let Some(task_id) = ready.pop_front() {
            order.push(task_id.to_string());
            if let Some(task) = self.tasks.get(task_id) {
                for downstream in &task.downstream_task_ids {
                    if let Some(degree) = in_degree.get_mut(downstream.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.push_back(downstream.as_str());
                        }
                    }
                }
            }
        }

        (order.len() == self.tasks.len()).then_some(order)
    }

    /// Whole-graph checks for definitions assembled outside `set_dependency`
    /// (e.g. deserialized ones)
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        validate_key(&self.dag_id)?;
        for task in self.tasks.values() {
            task.validate()?;
            for other in task.upstream_task_ids.iter().chain(&task.downstream_task_ids) {
                if !self.tasks.contains_key(other) {
                    return Err(ConfigurationError::UnknownTask {
                        dag_id: self.dag_id.clone(),
                        task_id: other.clone(),
                    });
                }
            }
        }
        if self.topological_order().is_none() {
            let task_id = self
                .tasks
                .values()
                .find(|t| !t.upstream_task_ids.is_empty() && !t.downstream_task_ids.is_empty())
                .map(|t| t.task_id.clone())
                .unwrap_or_default();
            return Err(ConfigurationError::CycleDetected {
                dag_id: self.dag_id.clone(),
                task_id,
            });
        }
        Ok(())
    }

    /// Copy of this DAG restricted to `task_ids` plus, optionally, their upstream and
    /// downstream closures. Edges leaving the selection are dropped.
    pub fn sub_dag<S: AsRef<str>>(
        &self,
        task_ids: &[S],
        include_upstream: bool,
        include_downstream: bool,
    ) -> Dag {
        let mut selected = BTreeSet::new();
        for task_id in task_ids.iter().map(AsRef::as_ref) {
            if !self.tasks.contains_key(task_id) {
                continue;
            }
            selected.insert(task_id.to_string());
            if include_upstream {
                selected.extend(self.upstream_closure(task_id));
            }
            if include_downstream {
                selected.extend(self.downstream_closure(task_id));
            }
        }

        let tasks = self
            .tasks
            .iter()
            .filter(|(id, _)| selected.contains(*id))
            .map(|(id, task)| {
                let mut task = task.clone();
                task.upstream_task_ids.retain(|t| selected.contains(t));
                task.downstream_task_ids.retain(|t| selected.contains(t));
                (id.clone(), task)
            })
            .collect();

        Dag {
            tasks,
            ..self.clone_without_tasks()
        }
    }

    fn clone_without_tasks(&self) -> Dag {
        Dag {
            dag_id: self.dag_id.clone(),
            description: self.description.clone(),
            schedule_interval: self.schedule_interval.clone(),
            start_date: self.start_date,
            end_date: self.end_date,
            timezone: self.timezone.clone(),
            catchup: self.catchup,
            concurrency: self.concurrency,
            max_active_runs: self.max_active_runs,
            tags: self.tags.clone(),
            params: self.params.clone(),
            fileloc: self.fileloc.clone(),
            last_loaded: self.last_loaded,
            callbacks: self.callbacks.clone(),
            tasks: BTreeMap::new(),
        }
    }

    /// Insert a task with edges already set, bypassing edge checks.
    /// Callers must run [`Dag::validate`] afterwards.
    pub(crate) fn insert_task_unchecked(&mut self, task: Task) {
        self.tasks.insert(task.task_id.clone(), task);
    }
}
