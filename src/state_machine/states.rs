use serde::{Deserialize, Serialize};
use std::fmt;

/// Task instance state as persisted for one task within one DAG run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskInstanceState {
    /// Instance exists but has not been considered by the scheduler yet
    None,
    /// Dependencies were met and the instance was handed to the executor
    Scheduled,
    /// Executor accepted the instance
    Queued,
    /// Instance is executing
    Running,
    /// Instance finished successfully
    Success,
    /// Instance failed and exhausted its retries
    Failed,
    /// Instance was skipped by its trigger rule or a branching upstream
    Skipped,
    /// An upstream failure made this instance unrunnable
    UpstreamFailed,
    /// Instance was externally asked to stop
    Shutdown,
    /// Instance failed but has retries left
    #[serde(rename = "up_for_retry")]
    Retry,
}

impl TaskInstanceState {
    pub const ALL: [TaskInstanceState; 10] = [
        Self::None,
        Self::Scheduled,
        Self::Queued,
        Self::Running,
        Self::Success,
        Self::Failed,
        Self::Skipped,
        Self::UpstreamFailed,
        Self::Shutdown,
        Self::Retry,
    ];

    /// Terminal states: no further transition without an explicit clear
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            Self::Success | Self::Failed | Self::Skipped | Self::UpstreamFailed
        )
    }

    pub fn is_unfinished(&self) -> bool {
        !self.is_finished()
    }

    /// Failure states that propagate through `ALL_SUCCESS`/`NONE_FAILED` rules
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::UpstreamFailed)
    }

    /// States that always count as forward progress for a run
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            Self::Scheduled | Self::Queued | Self::Running | Self::Shutdown | Self::Retry
        )
    }

    /// Finished without failing
    pub fn is_successful(&self) -> bool {
        matches!(self, Self::Success | Self::Skipped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Scheduled => "scheduled",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::UpstreamFailed => "upstream_failed",
            Self::Shutdown => "shutdown",
            Self::Retry => "up_for_retry",
        }
    }
}

impl fmt::Display for TaskInstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskInstanceState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|state| state.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Invalid task instance state: {s}"))
    }
}

/// DAG run state. `Success` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DagRunState {
    Running,
    Success,
    Failed,
}

impl DagRunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DagRunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DagRunState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid DAG run state: {s}")),
        }
    }
}

/// Default state for new task instances
impl Default for TaskInstanceState {
    fn default() -> Self {
        Self::None
    }
}

/// Default state for new DAG runs
impl Default for DagRunState {
    fn default() -> Self {
        Self::Running
    }
}
