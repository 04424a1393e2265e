use crate::constants::run_id_prefixes;
use crate::state_machine::DagRunState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a run was triggered; encoded as the `run_id` prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DagRunType {
    Scheduled,
    Manual,
    Backfill,
}

impl DagRunType {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Scheduled => run_id_prefixes::SCHEDULED,
            Self::Manual => run_id_prefixes::MANUAL,
            Self::Backfill => run_id_prefixes::BACKFILL,
        }
    }

    /// Recover the run type from a run id; ids without a known prefix are manual
    pub fn from_run_id(run_id: &str) -> Self {
        if run_id.starts_with(run_id_prefixes::SCHEDULED) {
            Self::Scheduled
        } else if run_id.starts_with(run_id_prefixes::BACKFILL) {
            Self::Backfill
        } else {
            Self::Manual
        }
    }
}

/// One materialized execution of a DAG for a logical `execution_date`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagRun {
    pub dag_id: String,
    pub run_id: String,
    pub execution_date: DateTime<Utc>,
    pub state: DagRunState,
    pub start_date: Option<DateTime<Utc>>,
    /// Set iff the run is terminal
    pub end_date: Option<DateTime<Utc>>,
    pub external_trigger: bool,
}

impl DagRun {
    /// A RUNNING run whose id encodes `run_type`. Manual runs are externally triggered.
    pub fn new(dag_id: impl Into<String>, execution_date: DateTime<Utc>, run_type: DagRunType) -> Self {
        Self {
            dag_id: dag_id.into(),
            run_id: format!("{}{}", run_type.prefix(), format_run_date(execution_date)),
            execution_date,
            state: DagRunState::Running,
            start_date: Some(Utc::now()),
            end_date: None,
            external_trigger: run_type == DagRunType::Manual,
        }
    }

    /// Run id a scheduler assigns to the run at `execution_date`
    pub fn id_for_date(execution_date: DateTime<Utc>) -> String {
        format!("{}{}", run_id_prefixes::SCHEDULED, format_run_date(execution_date))
    }

    pub fn run_type(&self) -> DagRunType {
        DagRunType::from_run_id(&self.run_id)
    }

    pub fn is_backfill(&self) -> bool {
        self.run_id.starts_with(run_id_prefixes::BACKFILL)
    }

    /// Set the state; terminal states stamp `end_date`, RUNNING clears it
    pub fn set_state(&mut self, state: DagRunState, now: DateTime<Utc>) {
        if self.state != state {
            self.state = state;
            self.end_date = state.is_terminal().then_some(now);
        }
    }
}

fn format_run_date(date: DateTime<Utc>) -> String {
    date.format("%Y-%m-%dT%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_id_for_date() {
        let date = Utc.with_ymd_and_hms(2015, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(DagRun::id_for_date(date), "scheduled__2015-01-02T03:04:05");
    }

    #[test]
    fn test_run_type_prefixes() {
        let date = Utc.with_ymd_and_hms(2015, 1, 2, 0, 0, 0).unwrap();
        let backfill = DagRun::new("dag", date, DagRunType::Backfill);
        assert!(backfill.is_backfill());
        assert!(!backfill.external_trigger);

        let manual = DagRun::new("dag", date, DagRunType::Manual);
        assert_eq!(manual.run_type(), DagRunType::Manual);
        assert!(manual.external_trigger);
        assert!(!manual.is_backfill());
    }

    #[test]
    fn test_set_state_manages_end_date() {
        let date = Utc.with_ymd_and_hms(2015, 1, 2, 0, 0, 0).unwrap();
        let mut run = DagRun::new("dag", date, DagRunType::Scheduled);
        let now = Utc::now();

        run.set_state(DagRunState::Success, now);
        assert_eq!(run.end_date, Some(now));

        run.set_state(DagRunState::Running, now);
        assert!(run.end_date.is_none());

        run.set_state(DagRunState::Failed, now);
        assert_eq!(run.end_date, Some(now));
    }
}
