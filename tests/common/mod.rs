#![allow(dead_code)] // Each integration test binary uses a different subset

pub mod builders;
pub mod strategies;

pub use builders::*;
pub use strategies::*;

use chrono::{DateTime, Duration, TimeZone, Utc};

/// Logical date used throughout the scenario tests
pub fn default_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2015, 1, 1, 0, 0, 0).unwrap()
}

pub fn days_after(date: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    date + Duration::days(days)
}

/// Install a test subscriber once; honours RUST_LOG
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
