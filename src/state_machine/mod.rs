// State machines for DAG runs and task instances
//
// Both machines are stateless transition tables over the records in `crate::models`;
// persistence of the resulting records is the caller's concern.

pub mod dag_run_state_machine;
pub mod errors;
pub mod events;
pub mod states;
pub mod task_instance_state_machine;

// Re-export main types for convenient access
pub use dag_run_state_machine::DagRunStateMachine;
pub use errors::{StateMachineError, StateMachineResult};
pub use events::{DagRunEvent, RunStateReason, TaskInstanceEvent};
pub use states::{DagRunState, TaskInstanceState};
pub use task_instance_state_machine::TaskInstanceStateMachine;
