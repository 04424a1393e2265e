//! # Clearing
//!
//! Resetting task instances so they run again, following External Task Markers into other
//! DAGs under a finite hop budget.
//!
//! - [`CrossDagResolver`] walks markers and collects every instance to clear
//! - [`plan_clear`] turns that set into per-instance mutations and runs to reactivate
//! - [`ClearingService`] applies the plan through the `RunStore`

pub mod clear;
pub mod resolver;
pub mod service;

pub use clear::{plan_clear, ClearPlan};
pub use resolver::CrossDagResolver;
pub use service::{ClearOptions, ClearOutcome, ClearingService};

use crate::persistence::PersistenceError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClearError {
    #[error(
        "Maximum recursion depth {max_depth} reached for ExternalTaskMarker {task_id}. \
         Attempted to clear too many tasks or there may be a cyclic dependency."
    )]
    MaxRecursionDepthExceeded { max_depth: u32, task_id: String },

    #[error("DAG '{0}' referenced while clearing is not registered")]
    DagNotFound(String),

    #[error("Task '{task_id}' is not defined in DAG '{dag_id}'")]
    TaskNotFound { dag_id: String, task_id: String },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

pub type ClearResult<T> = Result<T, ClearError>;
