//! # Structured Logging Module
//!
//! Environment-aware structured logging for scheduling decisions. Console output is
//! human-readable by default and JSON when configured.

use crate::config::loader::ENVIRONMENT_ENV;
use crate::config::TelemetryConfig;
use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with an environment-derived level
pub fn init_structured_logging() {
    let environment = get_environment();
    install(get_log_level(&environment), false, &environment);
}

/// Initialize structured logging from the telemetry section of the configuration
pub fn init_structured_logging_with(telemetry: &TelemetryConfig) {
    install(telemetry.log_level.clone(), telemetry.json_logs, &get_environment());
}

fn install(log_level: String, json: bool, environment: &str) {
    LOGGER_INITIALIZED.get_or_init(|| {
        // RUST_LOG wins over the configured level
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

        let layer = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed()
        };

        // A global subscriber may already be installed by the embedding process
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            log_level = %log_level,
            json = json,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var(ENVIRONMENT_ENV)
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "test" => "debug".to_string(),
        "development" => "debug".to_string(),
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for DAG run operations
pub fn log_run_operation(
    operation: &str,
    dag_id: &str,
    run_id: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        dag_id = %dag_id,
        run_id = run_id,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📋 RUN_OPERATION"
    );
}

/// Log structured data for task instance operations
pub fn log_task_instance_operation(
    operation: &str,
    dag_id: &str,
    task_id: &str,
    execution_date: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        dag_id = %dag_id,
        task_id = %task_id,
        execution_date = execution_date,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🔧 TASK_INSTANCE_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(get_log_level("test"), "debug");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("unknown"), "debug");
    }

    #[test]
    fn test_initialization_is_idempotent() {
        init_structured_logging_with(&TelemetryConfig::default());
        init_structured_logging();
        log_run_operation("update_state", "example", None, "running", None);
    }
}
