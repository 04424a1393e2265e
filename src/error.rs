//! Error types for the dagflow core.
//!
//! Each subsystem owns a focused error enum; all of them fold into [`DagflowError`]
//! so service-level callers can use a single [`Result`] alias.

use thiserror::Error;

pub use crate::clearing::ClearError;
pub use crate::config::ConfigError;
pub use crate::dependencies::DependencyError;
pub use crate::persistence::PersistenceError;
pub use crate::serialization::SerializationError;
pub use crate::state_machine::StateMachineError;

/// DAG authoring errors. Raised when a DAG or task is defined, never deferred to run time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("Invalid trigger rule '{rule}' on task '{task_id}'")]
    InvalidTriggerRule { task_id: String, rule: String },

    #[error("Task '{task_id}' already exists in DAG '{dag_id}'")]
    DuplicateTask { dag_id: String, task_id: String },

    #[error("Task '{task_id}' is not defined in DAG '{dag_id}'")]
    UnknownTask { dag_id: String, task_id: String },

    #[error("Task '{task_id}' cannot depend on itself")]
    SelfDependency { task_id: String },

    #[error("Cycle detected in DAG '{dag_id}' involving task '{task_id}'")]
    CycleDetected { dag_id: String, task_id: String },

    #[error("Invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Task '{task_id}': only one of execution_delta or execution_date_fn may be provided")]
    ConflictingExecutionDateArgs { task_id: String },

    #[error("Task '{task_id}': allowed_states {states:?} are not valid {kind} states")]
    InvalidAllowedStates {
        task_id: String,
        kind: &'static str,
        states: Vec<String>,
    },

    #[error("Task '{task_id}': recursion_depth must be a positive integer")]
    InvalidRecursionDepth { task_id: String },

    #[error("Invalid schedule interval '{expression}': {reason}")]
    InvalidSchedule { expression: String, reason: String },
}

/// Top-level error for service entry points
#[derive(Debug, Error)]
pub enum DagflowError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Dependency evaluation error: {0}")]
    Dependency(#[from] DependencyError),

    #[error("Clear error: {0}")]
    Clear(#[from] ClearError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("State machine error: {0}")]
    StateMachine(#[from] StateMachineError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("DAG '{0}' is not registered")]
    DagNotFound(String),

    #[error("DAG run for '{dag_id}' at {execution_date} not found")]
    DagRunNotFound {
        dag_id: String,
        execution_date: chrono::DateTime<chrono::Utc>,
    },
}

pub type Result<T> = std::result::Result<T, DagflowError>;
