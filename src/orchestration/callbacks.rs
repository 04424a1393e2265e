//! DAG run success/failure callbacks.

use crate::models::DagRun;
use crate::state_machine::RunStateReason;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::error;

/// What a callback sees when a run reaches a terminal state
#[derive(Debug, Clone)]
pub struct CallbackContext {
    pub dag_id: String,
    pub dag_run: DagRun,
    pub reason: RunStateReason,
}

/// User hook invoked synchronously when a run finishes
pub trait DagRunCallback: Send + Sync {
    fn call(&self, context: &CallbackContext) -> anyhow::Result<()>;
}

impl<F> DagRunCallback for F
where
    F: Fn(&CallbackContext) -> anyhow::Result<()> + Send + Sync,
{
    fn call(&self, context: &CallbackContext) -> anyhow::Result<()> {
        self(context)
    }
}

/// Run a callback, containing both errors and panics. Returns whether it succeeded.
pub fn invoke_callback(kind: &str, callback: &dyn DagRunCallback, context: &CallbackContext) -> bool {
    match catch_unwind(AssertUnwindSafe(|| callback.call(context))) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            error!(
                dag_id = %context.dag_id,
                run_id = %context.dag_run.run_id,
                callback = kind,
                error = %e,
                "DAG run callback failed"
            );
            false
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            error!(
                dag_id = %context.dag_id,
                run_id = %context.dag_run.run_id,
                callback = kind,
                panic = %message,
                "DAG run callback panicked"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DagRunType;
    use chrono::Utc;

    fn context() -> CallbackContext {
        CallbackContext {
            dag_id: "dag".into(),
            dag_run: DagRun::new("dag", Utc::now(), DagRunType::Manual),
            reason: RunStateReason::Success,
        }
    }

    #[test]
    fn test_errors_and_panics_are_contained() {
        let failing = |_: &CallbackContext| -> anyhow::Result<()> { anyhow::bail!("boom") };
        assert!(!invoke_callback("on_success", &failing, &context()));

        let panicking = |_: &CallbackContext| -> anyhow::Result<()> { panic!("callback exploded") };
        assert!(!invoke_callback("on_failure", &panicking, &context()));

        let fine = |ctx: &CallbackContext| -> anyhow::Result<()> {
            assert_eq!(ctx.dag_id, "dag");
            Ok(())
        };
        assert!(invoke_callback("on_success", &fine, &context()));
    }
}
