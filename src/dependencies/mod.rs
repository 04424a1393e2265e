//! # Dependency evaluation
//!
//! Decides whether a task instance may run: the trigger rule over upstream states first,
//! then the past-run and concurrency gates on top of a READY trigger decision.

pub mod gates;
pub mod trigger_rule_dep;

pub use gates::{
    concurrency_gate, depends_on_past_gate, retry_period_gate, GateStatus, PreviousRunView,
};
pub use trigger_rule_dep::{evaluate, TriggerDecision, UpstreamSummary};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DependencyError {
    #[error("Invalid trigger rule '{rule}'")]
    InvalidTriggerRule { rule: String },
}

/// Combined readiness of one schedulable task instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Skip,
    UpstreamFailed,
    /// Upstream instances are not finished
    Waiting,
    /// A gate is closed but may open on its own
    Pending,
    /// A gate is closed until the prerequisite is cleared
    Blocked,
}

impl Readiness {
    /// Whether this outcome moves the run forward or may do so without intervention
    pub fn is_progress(&self) -> bool {
        matches!(self, Self::Ready | Self::Skip | Self::UpstreamFailed | Self::Pending)
    }
}

/// Layer the gates over the trigger decision. Skip and upstream-failed decisions apply
/// regardless of gates.
pub fn combine(trigger: TriggerDecision, gates: &[GateStatus]) -> Readiness {
    match trigger {
        TriggerDecision::Skip => Readiness::Skip,
        TriggerDecision::UpstreamFailed => Readiness::UpstreamFailed,
        TriggerDecision::Wait => Readiness::Waiting,
        TriggerDecision::Ready => {
            if gates.contains(&GateStatus::Blocked) {
                Readiness::Blocked
            } else if gates.contains(&GateStatus::Pending) {
                Readiness::Pending
            } else {
                Readiness::Ready
            }
        }
    }
}
