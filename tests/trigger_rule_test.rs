//! Trigger rules as seen by run-state aggregation.

mod common;

use common::*;
use dagflow_core::dependencies::{evaluate, TriggerDecision};
use dagflow_core::models::{Dag, DagRun, DagRunType, TaskInstance, TriggerRule};
use dagflow_core::orchestration::reconciliation::NoopMutationHook;
use dagflow_core::orchestration::{decide_run_state, RunSnapshot, RunStateDecision};
use dagflow_core::state_machine::{DagRunState, RunStateReason, TaskInstanceState};
use std::collections::BTreeSet;

fn snapshot(dag: &Dag, states: &[(&str, TaskInstanceState)]) -> RunSnapshot {
    let run = DagRun::new(dag.dag_id.as_str(), default_date(), DagRunType::Scheduled);
    let instances = states
        .iter()
        .map(|(task_id, state)| TaskInstance::new(dag.task(task_id).unwrap(), default_date()).with_state(*state))
        .collect();
    RunSnapshot::new(run, instances)
}

fn decide(dag: &Dag, states: &[(&str, TaskInstanceState)]) -> RunStateDecision {
    decide_run_state(dag, &snapshot(dag, states), &NoopMutationHook, default_date())
}

#[test]
fn test_one_failed_downstream_of_success_is_skipped_not_deadlocked() {
    use TaskInstanceState::*;
    let dag = DagBuilder::new("one_failed")
        .dummy("op1")
        .with_rule("op2", TriggerRule::OneFailed)
        .edge("op1", "op2")
        .build();

    let decision = decide(&dag, &[("op1", Success), ("op2", None)]);
    assert_eq!(decision.state, DagRunState::Running);
    assert_eq!(decision.transitions.len(), 1);
    assert_eq!(decision.transitions[0].to, Skipped);

    // Once the skip is recorded the run completes
    let decision = decide(&dag, &[("op1", Success), ("op2", Skipped)]);
    assert_eq!(decision.state, DagRunState::Success);
}

#[test]
fn test_all_failed_waits_while_upstream_runs() {
    use TaskInstanceState::*;
    let dag = DagBuilder::new("all_failed")
        .dummy("a")
        .dummy("b")
        .with_rule("handler", TriggerRule::AllFailed)
        .edge("a", "handler")
        .edge("b", "handler")
        .build();

    let decision = decide(&dag, &[("a", Failed), ("b", Running), ("handler", None)]);
    assert_eq!(decision.state, DagRunState::Running);
    assert!(decision.ready.is_empty());
    assert!(decision.transitions.is_empty());

    let decision = decide(&dag, &[("a", Failed), ("b", Failed), ("handler", None)]);
    assert_eq!(decision.ready.len(), 1);
    assert_eq!(decision.ready[0].task_id, "handler");
}

#[test]
fn test_none_failed_or_skipped_join_after_branching() {
    use TaskInstanceState::*;
    let dag = DagBuilder::new("branching")
        .dummy("branch_a")
        .dummy("branch_b")
        .with_rule("join", TriggerRule::NoneFailedOrSkipped)
        .edge("branch_a", "join")
        .edge("branch_b", "join")
        .build();

    let decision = decide(&dag, &[("branch_a", Success), ("branch_b", Skipped), ("join", None)]);
    assert_eq!(decision.ready.len(), 1);

    let decision = decide(&dag, &[("branch_a", Skipped), ("branch_b", Skipped), ("join", None)]);
    assert_eq!(decision.transitions[0].to, Skipped);
}

#[test]
fn test_upstream_failed_cascades_one_level_per_pass() {
    use TaskInstanceState::*;
    let dag = DagBuilder::new("cascade")
        .dummy("a")
        .dummy("b")
        .dummy("c")
        .edge("a", "b")
        .edge("b", "c")
        .build();

    let decision = decide(&dag, &[("a", Failed), ("b", None), ("c", None)]);
    assert_eq!(decision.transitions.len(), 1);
    assert_eq!(decision.transitions[0].key.task_id, "b");
    assert_eq!(decision.state, DagRunState::Running);

    let decision = decide(&dag, &[("a", Failed), ("b", UpstreamFailed), ("c", None)]);
    assert_eq!(decision.transitions[0].key.task_id, "c");

    let decision = decide(&dag, &[("a", Failed), ("b", UpstreamFailed), ("c", UpstreamFailed)]);
    assert_eq!(decision.state, DagRunState::Failed);
    assert_eq!(decision.reason, Some(RunStateReason::TaskFailure));
}

#[test]
fn test_invalid_rule_only_surfaces_at_evaluation() {
    let upstream = BTreeSet::from(["a".to_string()]);
    let rule = TriggerRule::parse("all_the_things");
    assert!(!rule.is_valid());
    assert!(evaluate(&rule, &[TaskInstanceState::Success], &upstream).is_err());
    assert_eq!(
        evaluate(&TriggerRule::Dummy, &[TaskInstanceState::Failed], &upstream).unwrap(),
        TriggerDecision::Ready
    );
}
