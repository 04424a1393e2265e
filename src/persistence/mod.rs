//! # Persistence collaborator
//!
//! The scheduling core never owns storage. Services receive a [`RunStore`] handle at
//! construction time; the pure decision functions work on snapshots read through it.

pub mod in_memory;

pub use in_memory::InMemoryRunStore;

use crate::models::{DagRun, TaskInstance, TaskInstanceKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Storage operations the core consumes.
///
/// Implementations provide per-row atomicity only. Writes are last-writer-wins; creating an
/// instance that already exists reports `Ok(false)` instead of an error.
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn get_dag_run(
        &self,
        dag_id: &str,
        execution_date: DateTime<Utc>,
    ) -> PersistenceResult<Option<DagRun>>;

    /// Latest run of `dag_id` strictly before `execution_date`
    async fn get_previous_dag_run(
        &self,
        dag_id: &str,
        execution_date: DateTime<Utc>,
    ) -> PersistenceResult<Option<DagRun>>;

    async fn save_dag_run(&self, run: &DagRun) -> PersistenceResult<()>;

    /// All instances of one run
    async fn list_task_instances(
        &self,
        dag_id: &str,
        execution_date: DateTime<Utc>,
    ) -> PersistenceResult<Vec<TaskInstance>>;

    async fn get_task_instance(&self, key: &TaskInstanceKey) -> PersistenceResult<Option<TaskInstance>>;

    /// Instances of `task_ids` (all tasks when `None`) with
    /// `start <= execution_date <= end`; `end: None` is unbounded.
    async fn find_task_instances(
        &self,
        dag_id: &str,
        task_ids: Option<&BTreeSet<String>>,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> PersistenceResult<Vec<TaskInstance>>;

    /// Instances of the task currently RUNNING or QUEUED across all runs
    async fn running_count(&self, dag_id: &str, task_id: &str) -> PersistenceResult<usize>;

    /// Insert if absent. Returns `false` when the instance already existed.
    async fn create_task_instance(&self, instance: &TaskInstance) -> PersistenceResult<bool>;

    /// Upsert
    async fn save_task_instance(&self, instance: &TaskInstance) -> PersistenceResult<()>;
}
