use thiserror::Error;

/// Errors raised while applying a state transition
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateMachineError {
    #[error("Invalid state transition from {from} on event '{event}'")]
    InvalidTransition { from: String, event: String },

    #[error("Task '{task_id}' cannot start attempt {try_number}: max_tries is {max_tries}")]
    TryNumberExceeded {
        task_id: String,
        try_number: u32,
        max_tries: u32,
    },
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
