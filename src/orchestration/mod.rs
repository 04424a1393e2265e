//! # Orchestration
//!
//! Run-level scheduling: reconciling runs with their DAG, aggregating task instance
//! states into a run state, and the side effects of finishing a run.
//!
//! ## Core Components
//!
//! - **decide_run_state**: pure decision over a [`RunSnapshot`]
//! - **RunStateAggregator**: finishes runs (transition, callbacks, events, metrics)
//! - **RunStateService**: async driver over an injected `RunStore`
//! - **verify_integrity**: create-only reconciliation with a mutation hook

pub mod callbacks;
pub mod reconciliation;
pub mod run_state_aggregator;
pub mod run_state_service;
pub mod snapshot;

pub use callbacks::{invoke_callback, CallbackContext, DagRunCallback};
pub use reconciliation::{
    plan_integrity, verify_integrity, IntegrityReport, NoopMutationHook, TaskInstanceMutationHook,
};
pub use run_state_aggregator::{decide_run_state, RunStateAggregator};
pub use run_state_service::RunStateService;
pub use snapshot::{InstanceTransition, RunSnapshot, RunStateDecision};
