use dagflow_core::models::TriggerRule;
use dagflow_core::state_machine::TaskInstanceState;
use proptest::prelude::*;

/// Strategy for generating valid trigger rules
pub fn trigger_rule_strategy() -> impl Strategy<Value = TriggerRule> {
    prop::sample::select(TriggerRule::VALID.to_vec())
}

/// Strategy for generating any task instance state
pub fn task_state_strategy() -> impl Strategy<Value = TaskInstanceState> {
    prop::sample::select(vec![
        TaskInstanceState::None,
        TaskInstanceState::Scheduled,
        TaskInstanceState::Queued,
        TaskInstanceState::Running,
        TaskInstanceState::Success,
        TaskInstanceState::Failed,
        TaskInstanceState::Skipped,
        TaskInstanceState::UpstreamFailed,
        TaskInstanceState::Shutdown,
        TaskInstanceState::Retry,
    ])
}

/// Strategy for generating finished task instance states
pub fn finished_state_strategy() -> impl Strategy<Value = TaskInstanceState> {
    prop::sample::select(vec![
        TaskInstanceState::Success,
        TaskInstanceState::Failed,
        TaskInstanceState::Skipped,
        TaskInstanceState::UpstreamFailed,
    ])
}

/// Strategy for generating upstream state lists
pub fn upstream_states_strategy() -> impl Strategy<Value = Vec<TaskInstanceState>> {
    prop::collection::vec(task_state_strategy(), 1..8)
}

/// Strategy for generating task ids
pub fn task_id_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,15}"
}

/// Strategy for generating acyclic edge lists over `n` nodes: edges only go from lower to
/// higher index
pub fn forward_edges_strategy(n: usize) -> impl Strategy<Value = Vec<(usize, usize)>> {
    prop::collection::vec((0..n, 0..n), 0..(n * 2))
        .prop_map(|pairs| pairs.into_iter().filter(|(a, b)| a < b).collect())
}

/// Strategy for generating JSON parameter values
pub fn param_value_strategy() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        Just(serde_json::json!(null)),
        any::<bool>().prop_map(serde_json::Value::from),
        any::<i32>().prop_map(serde_json::Value::from),
        "[a-zA-Z0-9 ]{0,12}".prop_map(serde_json::Value::from),
        Just(serde_json::json!({"nested": {"data": [1, 2, 3]}})),
        Just(serde_json::json!(["a", {"b": "ü"}])),
    ]
}
