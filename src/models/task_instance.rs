use super::Task;
use crate::state_machine::TaskInstanceState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Primary key of a task instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskInstanceKey {
    pub dag_id: String,
    pub task_id: String,
    pub execution_date: DateTime<Utc>,
}

impl TaskInstanceKey {
    pub fn new(dag_id: impl Into<String>, task_id: impl Into<String>, execution_date: DateTime<Utc>) -> Self {
        Self {
            dag_id: dag_id.into(),
            task_id: task_id.into(),
            execution_date,
        }
    }
}

impl fmt::Display for TaskInstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}@{}", self.dag_id, self.task_id, self.execution_date.to_rfc3339())
    }
}

/// State of one task within one DAG run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInstance {
    pub dag_id: String,
    pub task_id: String,
    pub execution_date: DateTime<Utc>,
    pub state: TaskInstanceState,
    /// Attempts started so far
    pub try_number: u32,
    pub max_tries: u32,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub queue: String,
    pub pool: String,
    pub priority_weight: i32,
    /// Operator class name of the task when the instance was created
    pub operator: String,
}

impl TaskInstance {
    /// Fresh NONE-state instance derived from the task definition
    pub fn new(task: &Task, execution_date: DateTime<Utc>) -> Self {
        Self {
            dag_id: task.dag_id.clone(),
            task_id: task.task_id.clone(),
            execution_date,
            state: TaskInstanceState::None,
            try_number: 0,
            max_tries: task.retries,
            start_date: None,
            end_date: None,
            queue: task.queue.clone(),
            pool: task.pool.clone(),
            priority_weight: task.priority_weight,
            operator: task.task_type.clone(),
        }
    }

    /// Instance without a task definition at hand, with operator defaults
    pub fn bare(dag_id: impl Into<String>, task_id: impl Into<String>, execution_date: DateTime<Utc>) -> Self {
        let task_id = task_id.into();
        let mut task = Task::new(task_id);
        task.dag_id = dag_id.into();
        Self::new(&task, execution_date)
    }

    pub fn with_state(mut self, state: TaskInstanceState) -> Self {
        self.state = state;
        self
    }

    pub fn key(&self) -> TaskInstanceKey {
        TaskInstanceKey::new(self.dag_id.clone(), self.task_id.clone(), self.execution_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_instance_follows_task_definition() {
        let mut task = Task::new("op1").with_retries(3).with_queue("gpu");
        task.dag_id = "dag".into();
        let date = Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap();

        let ti = TaskInstance::new(&task, date);
        assert_eq!(ti.state, TaskInstanceState::None);
        assert_eq!(ti.max_tries, 3);
        assert_eq!(ti.try_number, 0);
        assert_eq!(ti.queue, "gpu");
        assert_eq!(ti.key(), TaskInstanceKey::new("dag", "op1", date));
    }
}
