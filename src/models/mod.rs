pub mod dag;
pub mod dag_run;
pub mod external;
pub mod registry;
pub mod schedule;
pub mod task;
pub mod task_instance;
pub mod trigger_rule;

// Re-export core models for easy access
pub use dag::{Dag, DagCallbacks};
pub use dag_run::{DagRun, DagRunType};
pub use external::{
    ExecutionDateFn, ExecutionDateSpec, ExternalTaskMarker, ExternalTaskSensor, DEFAULT_RECURSION_DEPTH,
};
pub use registry::DagRegistry;
pub use schedule::{CronSchedule, RelativeDelta, ScheduleInterval};
pub use task::{Task, TaskKind};
pub use task_instance::{TaskInstance, TaskInstanceKey};
pub use trigger_rule::TriggerRule;
