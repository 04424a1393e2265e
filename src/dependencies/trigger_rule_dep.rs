//! Trigger-rule evaluation over a snapshot of upstream states.

use super::DependencyError;
use crate::models::TriggerRule;
use crate::state_machine::TaskInstanceState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Outcome of evaluating one task instance's trigger rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerDecision {
    Ready,
    Skip,
    UpstreamFailed,
    Wait,
}

/// Counts of upstream states. Upstream tasks without an instance count as unfinished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpstreamSummary {
    pub total: usize,
    pub successes: usize,
    pub skipped: usize,
    pub failed: usize,
    pub upstream_failed: usize,
}

impl UpstreamSummary {
    pub fn from_states(upstream_states: &[TaskInstanceState], upstream_count: usize) -> Self {
        let mut summary = Self {
            total: upstream_count.max(upstream_states.len()),
            ..Self::default()
        };
        for state in upstream_states {
            match state {
                TaskInstanceState::Success => summary.successes += 1,
                TaskInstanceState::Skipped => summary.skipped += 1,
                TaskInstanceState::Failed => summary.failed += 1,
                TaskInstanceState::UpstreamFailed => summary.upstream_failed += 1,
                _ => {}
            }
        }
        summary
    }

    pub fn done(&self) -> usize {
        self.successes + self.skipped + self.failed + self.upstream_failed
    }

    pub fn all_done(&self) -> bool {
        self.done() >= self.total
    }

    pub fn any_failed(&self) -> bool {
        self.failed + self.upstream_failed > 0
    }
}

/// Decide readiness of an instance from its upstream states.
///
/// `upstream_states` holds the states of the upstream instances that exist;
/// `upstream_task_ids` is the full upstream set, so missing instances count as NONE.
/// Pure: no I/O, no clock.
pub fn evaluate(
    rule: &TriggerRule,
    upstream_states: &[TaskInstanceState],
    upstream_task_ids: &BTreeSet<String>,
) -> Result<TriggerDecision, DependencyError> {
    if let TriggerRule::Invalid(raw) = rule {
        return Err(DependencyError::InvalidTriggerRule { rule: raw.clone() });
    }

    // Roots are ready under every rule
    if upstream_task_ids.is_empty() && upstream_states.is_empty() {
        return Ok(TriggerDecision::Ready);
    }

    let s = UpstreamSummary::from_states(upstream_states, upstream_task_ids.len());
    Ok(decide(rule, &s))
}

fn decide(rule: &TriggerRule, s: &UpstreamSummary) -> TriggerDecision {
    use TriggerDecision::*;

    match rule {
        TriggerRule::AllSuccess => {
            if s.any_failed() {
                UpstreamFailed
            } else if s.skipped > 0 {
                Skip
            } else if s.successes == s.total {
                Ready
            } else {
                Wait
            }
        }
        TriggerRule::AllFailed => {
            if s.successes > 0 || s.skipped > 0 {
                Skip
            } else if s.failed + s.upstream_failed == s.total {
                Ready
            } else {
                Wait
            }
        }
        TriggerRule::AllDone => {
            if s.all_done() {
                Ready
            } else {
                Wait
            }
        }
        TriggerRule::OneSuccess => {
            if s.successes > 0 {
                Ready
            } else if s.all_done() {
                if s.any_failed() {
                    UpstreamFailed
                } else {
                    Skip
                }
            } else {
                Wait
            }
        }
        TriggerRule::OneFailed => {
            if s.any_failed() {
                Ready
            } else if s.all_done() {
                Skip
            } else {
                Wait
            }
        }
        TriggerRule::NoneFailed => {
            if s.any_failed() {
                UpstreamFailed
            } else if s.all_done() {
                Ready
            } else {
                Wait
            }
        }
        TriggerRule::NoneSkipped => {
            if s.skipped > 0 {
                Skip
            } else if s.all_done() {
                Ready
            } else {
                Wait
            }
        }
        TriggerRule::NoneFailedOrSkipped => {
            if s.any_failed() {
                UpstreamFailed
            } else if s.all_done() {
                if s.successes > 0 {
                    Ready
                } else {
                    Skip
                }
            } else {
                Wait
            }
        }
        TriggerRule::Dummy => Ready,
        // Filtered out by `evaluate`
        TriggerRule::Invalid(_) => Wait,
    }
}
