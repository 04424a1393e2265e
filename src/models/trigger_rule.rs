use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Predicate over upstream task instance states controlling readiness.
///
/// Unknown rule strings parse into [`TriggerRule::Invalid`] instead of failing so that a
/// corrupted definition can still be loaded and then routed to the fatal path: DAG
/// authoring rejects it, and the run-state aggregator fails the run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TriggerRule {
    AllSuccess,
    AllFailed,
    AllDone,
    OneSuccess,
    OneFailed,
    NoneFailed,
    NoneSkipped,
    NoneFailedOrSkipped,
    Dummy,
    Invalid(String),
}

impl TriggerRule {
    pub const VALID: [TriggerRule; 9] = [
        Self::AllSuccess,
        Self::AllFailed,
        Self::AllDone,
        Self::OneSuccess,
        Self::OneFailed,
        Self::NoneFailed,
        Self::NoneSkipped,
        Self::NoneFailedOrSkipped,
        Self::Dummy,
    ];

    /// Parse a rule name. Never fails; unknown names become `Invalid`.
    pub fn parse(value: &str) -> Self {
        match value {
            "all_success" => Self::AllSuccess,
            "all_failed" => Self::AllFailed,
            "all_done" => Self::AllDone,
            "one_success" => Self::OneSuccess,
            "one_failed" => Self::OneFailed,
            "none_failed" => Self::NoneFailed,
            "none_skipped" => Self::NoneSkipped,
            "none_failed_or_skipped" => Self::NoneFailedOrSkipped,
            "dummy" => Self::Dummy,
            other => Self::Invalid(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::AllSuccess => "all_success",
            Self::AllFailed => "all_failed",
            Self::AllDone => "all_done",
            Self::OneSuccess => "one_success",
            Self::OneFailed => "one_failed",
            Self::NoneFailed => "none_failed",
            Self::NoneSkipped => "none_skipped",
            Self::NoneFailedOrSkipped => "none_failed_or_skipped",
            Self::Dummy => "dummy",
            Self::Invalid(raw) => raw,
        }
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Invalid(_))
    }
}

impl Default for TriggerRule {
    fn default() -> Self {
        Self::AllSuccess
    }
}

impl fmt::Display for TriggerRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TriggerRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TriggerRule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}
