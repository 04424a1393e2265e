#![allow(clippy::doc_markdown)] // Allow technical terms like DAG, ExternalTaskMarker in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Dagflow Core
//!
//! The scheduling core of a DAG-based workflow engine.
//!
//! ## Overview
//!
//! A DAG run is a set of task instances, one per task, for one logical execution date. This
//! crate decides what those instances and runs should become: which task instances are
//! ready under their trigger rules, when a run has succeeded, failed or deadlocked, which
//! instances a clear must reset across DAG boundaries, and how DAG definitions travel
//! between processes.
//!
//! ## Architecture
//!
//! Decisions are pure functions over snapshots ([`dependencies`],
//! [`orchestration::decide_run_state`], [`clearing::plan_clear`]); services apply them
//! through an injected [`persistence::RunStore`]. State changes go through the
//! [`state_machine`] so every mutation is a named event.
//!
//! ## Module Organization
//!
//! - [`models`] - DAGs, tasks, runs, task instances and the DAG registry
//! - [`state_machine`] - Task instance and DAG run states and transitions
//! - [`dependencies`] - Trigger rule evaluation and scheduling gates
//! - [`orchestration`] - Run-state aggregation, integrity checks, callbacks
//! - [`clearing`] - Cross-DAG clearing through External Task Markers
//! - [`serialization`] - Schema-checked transport encoding of DAGs
//! - [`persistence`] - Run store abstraction and the in-memory store
//! - [`config`] - Layered configuration
//! - [`events`] - Lifecycle event publishing
//! - [`metrics`] - Metric recording seam
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dagflow_core::models::{Dag, DagRegistry, DagRunType, Task};
//! use dagflow_core::orchestration::RunStateService;
//! use dagflow_core::persistence::InMemoryRunStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut dag = Dag::new("example")?;
//! dag.add_task(Task::new("extract"))?;
//! dag.add_task(Task::new("load"))?;
//! dag.set_dependency("extract", "load")?;
//!
//! let registry = Arc::new(DagRegistry::new());
//! registry.register(dag)?;
//!
//! let service = RunStateService::new(Arc::new(InMemoryRunStore::new()), registry, Default::default());
//! let run = service.create_dag_run("example", chrono::Utc::now(), DagRunType::Manual).await?;
//! println!("run {} is {}", run.run_id, run.state);
//! # Ok(())
//! # }
//! ```

pub mod clearing;
pub mod config;
pub mod constants;
pub mod dependencies;
pub mod error;
pub mod events;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod orchestration;
pub mod persistence;
pub mod serialization;
pub mod state_machine;

pub use clearing::{ClearOptions, ClearOutcome, ClearingService, CrossDagResolver};
pub use config::{ConfigManager, DagflowConfig};
pub use constants::{events as lifecycle_events, status_groups};
pub use error::{DagflowError, Result};
pub use models::{Dag, DagRegistry, DagRun, Task, TaskInstance, TriggerRule};
pub use orchestration::{RunStateAggregator, RunStateDecision, RunStateService};
pub use serialization::DagSerializer;
pub use state_machine::{DagRunState, TaskInstanceState};
