//! # Configuration
//!
//! Layered configuration for the scheduling core: built-in defaults, an optional TOML file,
//! then `DAGFLOW__SECTION__KEY` environment variables.

pub mod error;
pub mod loader;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigManager;

use serde::{Deserialize, Serialize};

/// Root configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DagflowConfig {
    pub scheduler: SchedulerConfig,
    pub serialization: SerializationConfig,
    pub clearing: ClearingConfig,
    pub telemetry: TelemetryConfig,
}

/// Run-state aggregation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Emit `dagrun.{dag_id}.first_task_scheduling_delay` when runs finish
    pub emit_scheduling_delay: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            emit_scheduling_delay: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializationConfig {
    /// Check outgoing payloads against the schema as well as incoming ones
    pub validate_on_serialize: bool,
}

impl Default for SerializationConfig {
    fn default() -> Self {
        Self {
            validate_on_serialize: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClearingConfig {
    /// Reset DAG runs touched by a clear back to RUNNING
    pub activate_dag_runs: bool,
}

impl Default for ClearingConfig {
    fn default() -> Self {
        Self {
            activate_dag_runs: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub json_logs: bool,
    /// Capacity of the broadcast channel behind the event publisher
    pub event_channel_capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            event_channel_capacity: 1000,
        }
    }
}

impl DagflowConfig {
    /// Reject values that parse but cannot work
    pub fn validate(&self) -> ConfigResult<()> {
        if self.telemetry.event_channel_capacity == 0 {
            return Err(ConfigError::invalid_value(
                "telemetry.event_channel_capacity",
                "must be greater than 0",
            ));
        }
        if self.telemetry.log_level.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "telemetry.log_level",
                "must not be empty",
            ));
        }
        Ok(())
    }
}
