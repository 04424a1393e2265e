use serde::{Deserialize, Serialize};

/// Why a DAG run reached a terminal state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RunStateReason {
    /// Every leaf finished without failing
    Success,
    /// A leaf failed once nothing was left to run
    TaskFailure,
    /// No unfinished instance could ever become ready
    AllTasksDeadlocked,
    /// An instance carried a trigger rule the evaluator does not know
    InvalidTriggerRule { task_id: String, rule: String },
}

impl RunStateReason {
    /// Short name used for callback contexts and log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::TaskFailure => "task_failure",
            Self::AllTasksDeadlocked => "all_tasks_deadlocked",
            Self::InvalidTriggerRule { .. } => "invalid_trigger_rule",
        }
    }
}

/// Events that can trigger DAG run state transitions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum DagRunEvent {
    /// All leaves finished without failing
    Complete,
    /// The run failed for the given reason
    Fail(RunStateReason),
    /// Explicit external reset back to running (e.g. after clearing)
    Reset,
}

impl DagRunEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Fail(_) => "fail",
            Self::Reset => "reset",
        }
    }
}

/// Events reported for a task instance, mostly by the executor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TaskInstanceEvent {
    /// Scheduler decided the instance may run
    Schedule,
    /// Executor accepted the instance
    Queue,
    /// Executor started an attempt
    Start,
    /// Attempt succeeded
    Succeed,
    /// Attempt failed with the given message
    Fail(String),
    /// Instance was skipped
    Skip,
    /// An upstream failure made the instance unrunnable
    UpstreamFail,
    /// Instance was asked to stop
    Shutdown,
    /// Instance was cleared for a re-run
    Clear,
}

impl TaskInstanceEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Schedule => "schedule",
            Self::Queue => "queue",
            Self::Start => "start",
            Self::Succeed => "succeed",
            Self::Fail(_) => "fail",
            Self::Skip => "skip",
            Self::UpstreamFail => "upstream_fail",
            Self::Shutdown => "shutdown",
            Self::Clear => "clear",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }
}
