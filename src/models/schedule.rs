//! Schedule intervals: manual-only, one-shot, fixed durations, calendar deltas and cron.

use crate::error::ConfigurationError;
use chrono::{DateTime, Datelike, Duration, Months, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound on cron search steps.
///
/// Month and day misses skip whole months and days, so even a leap-day expression resolves in
/// a few hundred steps. A day/month pair that never exists (`0 0 31 2 *`) exhausts the budget
/// and `next_after` returns `None`; callers then have no following date, and the
/// scheduling-delay metric is skipped for such DAGs.
const MAX_CRON_SEARCH_STEPS: usize = 100_000;

/// Calendar-aware delta, applied months first then the fixed part
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RelativeDelta {
    #[serde(default)]
    pub years: i32,
    #[serde(default)]
    pub months: i32,
    #[serde(default)]
    pub days: i64,
    #[serde(default)]
    pub hours: i64,
    #[serde(default)]
    pub minutes: i64,
    #[serde(default)]
    pub seconds: i64,
}

impl RelativeDelta {
    pub fn months(months: i32) -> Self {
        Self {
            months,
            ..Self::default()
        }
    }

    /// `None` when any component, or the result, leaves chrono's representable range
    pub fn apply(&self, date: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let total_months = self.years.checked_mul(12)?.checked_add(self.months)?;
        let shifted = if total_months >= 0 {
            date.checked_add_months(Months::new(total_months.unsigned_abs()))?
        } else {
            date.checked_sub_months(Months::new(total_months.unsigned_abs()))?
        };
        let fixed = Duration::try_days(self.days)?
            .checked_add(&Duration::try_hours(self.hours)?)?
            .checked_add(&Duration::try_minutes(self.minutes)?)?
            .checked_add(&Duration::try_seconds(self.seconds)?)?;
        shifted.checked_add_signed(fixed)
    }
}

/// How often a DAG produces scheduled runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleInterval {
    /// Manually triggered only
    None,
    /// A single scheduled run
    Once,
    Every(Duration),
    Relative(RelativeDelta),
    Cron(CronSchedule),
}

impl ScheduleInterval {
    /// Parse `@once`, a preset or a five-field cron expression
    pub fn parse(expression: &str) -> Result<Self, ConfigurationError> {
        let trimmed = expression.trim();
        match trimmed {
            "" | "None" | "none" => Ok(Self::None),
            "@once" => Ok(Self::Once),
            _ => CronSchedule::parse(trimmed).map(Self::Cron),
        }
    }

    pub fn every(duration: Duration) -> Self {
        Self::Every(duration)
    }

    /// A repeating cadence, as opposed to manual-only or one-shot
    pub fn is_concrete_cadence(&self) -> bool {
        !matches!(self, Self::None | Self::Once)
    }

    /// The next schedule point strictly after `date`
    pub fn following(&self, date: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::None | Self::Once => None,
            Self::Every(duration) => date.checked_add_signed(*duration),
            Self::Relative(delta) => delta.apply(date),
            Self::Cron(cron) => cron.next_after(date),
        }
    }
}

impl Default for ScheduleInterval {
    fn default() -> Self {
        Self::Every(Duration::days(1))
    }
}

impl fmt::Display for ScheduleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Once => f.write_str("@once"),
            Self::Every(duration) => write!(f, "every {}s", duration.num_seconds()),
            Self::Relative(delta) => write!(f, "{delta:?}"),
            Self::Cron(cron) => f.write_str(cron.expression()),
        }
    }
}

/// One cron field as a bitset of allowed values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CronField {
    allowed: u64,
    restricted: bool,
}

impl CronField {
    fn parse(raw: &str, min: u32, max: u32, expression: &str) -> Result<Self, ConfigurationError> {
        let invalid = |reason: String| ConfigurationError::InvalidSchedule {
            expression: expression.to_string(),
            reason,
        };

        let mut allowed = 0u64;
        for part in raw.split(',') {
            let (range, step) = match part.split_once('/') {
                Some((range, step)) => {
                    let step: u32 = step
                        .parse()
                        .map_err(|_| invalid(format!("invalid step '{step}'")))?;
                    if step == 0 {
                        return Err(invalid("step must be positive".to_string()));
                    }
                    (range, step)
                }
                None => (part, 1),
            };

            let (start, end) = if range == "*" {
                (min, max)
            } else if let Some((lo, hi)) = range.split_once('-') {
                let lo = parse_bounded(lo, min, max).ok_or_else(|| invalid(format!("'{lo}' out of range")))?;
                let hi = parse_bounded(hi, min, max).ok_or_else(|| invalid(format!("'{hi}' out of range")))?;
                if lo > hi {
                    return Err(invalid(format!("empty range '{range}'")));
                }
                (lo, hi)
            } else {
                let value = parse_bounded(range, min, max)
                    .ok_or_else(|| invalid(format!("'{range}' out of range")))?;
                // `5/15` means every 15 starting at 5
                if step > 1 { (value, max) } else { (value, value) }
            };

            let mut value = start;
            while value <= end {
                allowed |= 1 << value;
                value += step;
            }
        }

        Ok(Self {
            allowed,
            restricted: raw != "*",
        })
    }

    fn matches(&self, value: u32) -> bool {
        self.allowed & (1 << value) != 0
    }
}

fn parse_bounded(raw: &str, min: u32, max: u32) -> Option<u32> {
    raw.parse::<u32>().ok().filter(|v| (min..=max).contains(v))
}

/// Five-field cron expression evaluated in UTC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    minute: CronField,
    hour: CronField,
    day_of_month: CronField,
    month: CronField,
    day_of_week: CronField,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, ConfigurationError> {
        let expanded = match expression {
            "@hourly" => "0 * * * *",
            "@daily" => "0 0 * * *",
            "@weekly" => "0 0 * * 0",
            "@monthly" => "0 0 1 * *",
            "@yearly" | "@annually" => "0 0 1 1 *",
            other => other,
        };

        let fields: Vec<&str> = expanded.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(ConfigurationError::InvalidSchedule {
                expression: expression.to_string(),
                reason: format!("expected 5 fields, found {}", fields.len()),
            });
        }

        let mut day_of_week = CronField::parse(fields[4], 0, 7, expression)?;
        // 7 is an alias for Sunday
        if day_of_week.matches(7) {
            day_of_week.allowed |= 1;
        }

        Ok(Self {
            expression: expression.to_string(),
            minute: CronField::parse(fields[0], 0, 59, expression)?,
            hour: CronField::parse(fields[1], 0, 23, expression)?,
            day_of_month: CronField::parse(fields[2], 1, 31, expression)?,
            month: CronField::parse(fields[3], 1, 12, expression)?,
            day_of_week,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    fn day_matches(&self, date: &DateTime<Utc>) -> bool {
        let dom = self.day_of_month.matches(date.day());
        let dow = self
            .day_of_week
            .matches(date.weekday().num_days_from_sunday());
        // Vixie cron: when both day fields are restricted either may match
        if self.day_of_month.restricted && self.day_of_week.restricted {
            dom || dow
        } else {
            dom && dow
        }
    }

    /// First matching minute strictly after `date`
    pub fn next_after(&self, date: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut candidate = Utc
            .with_ymd_and_hms(date.year(), date.month(), date.day(), date.hour(), date.minute(), 0)
            .single()?
            .checked_add_signed(Duration::minutes(1))?;

        for _ in 0..MAX_CRON_SEARCH_STEPS {
            if !self.month.matches(candidate.month()) {
                let first_of_month = Utc
                    .with_ymd_and_hms(candidate.year(), candidate.month(), 1, 0, 0, 0)
                    .single()?;
                candidate = first_of_month.checked_add_months(Months::new(1))?;
                continue;
            }
            if !self.day_matches(&candidate) {
                candidate = Utc
                    .with_ymd_and_hms(candidate.year(), candidate.month(), candidate.day(), 0, 0, 0)
                    .single()?
                    .checked_add_signed(Duration::days(1))?;
                continue;
            }
            if !self.hour.matches(candidate.hour()) {
                candidate = Utc
                    .with_ymd_and_hms(
                        candidate.year(),
                        candidate.month(),
                        candidate.day(),
                        candidate.hour(),
                        0,
                        0,
                    )
                    .single()?
                    .checked_add_signed(Duration::hours(1))?;
                continue;
            }
            if !self.minute.matches(candidate.minute()) {
                candidate = candidate.checked_add_signed(Duration::minutes(1))?;
                continue;
            }
            return Some(candidate);
        }

        None
    }
}
