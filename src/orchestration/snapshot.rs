//! Point-in-time views handed to the pure run-state decision.

use crate::dependencies::PreviousRunView;
use crate::models::{DagRun, TaskInstance, TaskInstanceKey};
use crate::state_machine::{DagRunState, RunStateReason, TaskInstanceState};
use std::collections::HashMap;

/// Everything `decide_run_state` reads about one run
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    pub dag_run: DagRun,
    pub task_instances: Vec<TaskInstance>,
    /// Previous run's instance states; only consulted by `depends_on_past` tasks
    pub previous: PreviousRunView,
    /// Running/queued instances per task across all runs, for `task_concurrency`
    pub running_counts: HashMap<String, usize>,
}

impl RunSnapshot {
    pub fn new(dag_run: DagRun, task_instances: Vec<TaskInstance>) -> Self {
        Self {
            dag_run,
            task_instances,
            previous: PreviousRunView::default(),
            running_counts: HashMap::new(),
        }
    }

    pub fn with_previous(mut self, previous: PreviousRunView) -> Self {
        self.previous = previous;
        self
    }

    pub fn with_running_counts(mut self, running_counts: HashMap<String, usize>) -> Self {
        self.running_counts = running_counts;
        self
    }
}

/// A task instance state change decided during evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceTransition {
    pub key: TaskInstanceKey,
    pub from: TaskInstanceState,
    pub to: TaskInstanceState,
}

/// Mutations and run state produced by one evaluation pass
#[derive(Debug, Clone, PartialEq)]
pub struct RunStateDecision {
    pub state: DagRunState,
    /// Set when `state` is terminal
    pub reason: Option<RunStateReason>,
    /// Instances to create for tasks that had none
    pub created: Vec<TaskInstance>,
    /// Instances whose task left the DAG; reported, never touched
    pub orphaned: Vec<TaskInstanceKey>,
    /// Instances whose dependencies are met, to be handed to the executor
    pub ready: Vec<TaskInstanceKey>,
    /// Skip and upstream-failed propagation
    pub transitions: Vec<InstanceTransition>,
    pub unfinished: usize,
}

impl RunStateDecision {
    /// Decision for a run that is already terminal
    pub fn unchanged(state: DagRunState) -> Self {
        Self {
            state,
            reason: None,
            created: Vec::new(),
            orphaned: Vec::new(),
            ready: Vec::new(),
            transitions: Vec::new(),
            unfinished: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_deadlock(&self) -> bool {
        matches!(self.reason, Some(RunStateReason::AllTasksDeadlocked))
    }

    /// Whether applying this decision writes anything
    pub fn has_mutations(&self) -> bool {
        !self.created.is_empty() || !self.ready.is_empty() || !self.transitions.is_empty()
    }
}
