//! Cron expression engine.
//! Supports: "MIN HOUR DOM MON DOW" (5-field, no seconds)
//! Each field is `*`, a single integer, or a comma list of integers.
//! Ranges (`1-5`) and steps (`*/5`) are deliberately not supported — the
//! desktop UI only ever produces wildcards, values, and lists, and rejecting
//! the rest keeps validation honest.
//!
//! Pure functions only: no state, no I/O, no clock reads.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use deskclaw_core::{DeskclawError, Result};

/// Upper bound on the forward scan, in minutes (~4 years). An impossible
/// field combination (e.g. day 31 of February) returns None instead of
/// spinning forever.
const SEARCH_LIMIT_MINUTES: i64 = 4 * 366 * 24 * 60;

const WEEKDAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

/// One parsed cron column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CronField {
    /// Wildcard `*` — matches every value.
    Any,
    /// A single value, e.g. `30`.
    Value(u32),
    /// A comma list, e.g. `1,3,5`. Kept in written order.
    List(Vec<u32>),
}

impl CronField {
    /// Test whether a calendar value satisfies this field.
    pub fn matches(&self, value: u32) -> bool {
        match self {
            CronField::Any => true,
            CronField::Value(n) => *n == value,
            CronField::List(ns) => ns.contains(&value),
        }
    }
}

/// A parsed 5-field cron expression.
///
/// Field ranges: minute 0-59, hour 0-23, day-of-month 1-31, month 1-12,
/// day-of-week 0-6 with 0 = Sunday. Every value is range-checked at parse
/// time; one bad value invalidates the whole expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpression {
    raw: String,
    pub minute: CronField,
    pub hour: CronField,
    pub day_of_month: CronField,
    pub month: CronField,
    pub day_of_week: CronField,
}

impl CronExpression {
    /// Parse a cron string. Fails unless exactly five whitespace-separated
    /// fields parse cleanly with every integer in range.
    pub fn parse(text: &str) -> Result<Self> {
        let parts: Vec<&str> = text.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(DeskclawError::Cron(format!(
                "'{text}' has {} fields, need 5 (MIN HOUR DOM MON DOW)",
                parts.len()
            )));
        }

        Ok(Self {
            raw: text.to_string(),
            minute: parse_field(parts[0], 0, 59, "minute")?,
            hour: parse_field(parts[1], 0, 23, "hour")?,
            day_of_month: parse_field(parts[2], 1, 31, "day-of-month")?,
            month: parse_field(parts[3], 1, 12, "month")?,
            day_of_week: parse_field(parts[4], 0, 6, "day-of-week")?,
        })
    }

    /// The original expression text.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Test whether an instant satisfies all five fields.
    pub fn matches_instant(&self, t: DateTime<Utc>) -> bool {
        self.minute.matches(t.minute())
            && self.hour.matches(t.hour())
            && self.day_of_month.matches(t.day())
            && self.month.matches(t.month())
            && self.day_of_week.matches(t.weekday().num_days_from_sunday())
    }

    /// Compute the first matching instant strictly after `after`.
    ///
    /// The scan starts at the minute following `after` (seconds zeroed), so
    /// the result is never the input instant even when it matches — callers
    /// pass "now" and expect a future trigger. Returns None when nothing
    /// matches within [`SEARCH_LIMIT_MINUTES`].
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut candidate = (after + Duration::minutes(1))
            .with_second(0)?
            .with_nanosecond(0)?;

        for _ in 0..SEARCH_LIMIT_MINUTES {
            if self.matches_instant(candidate) {
                return Some(candidate);
            }
            candidate += Duration::minutes(1);
        }
        None
    }

    /// Render a human-readable description of the common shapes.
    /// Anything irregular falls back to echoing the raw string.
    pub fn describe(&self) -> String {
        let (CronField::Value(h), CronField::Value(m)) = (&self.hour, &self.minute) else {
            return self.raw.clone();
        };
        let time = format!("{h:02}:{m:02}");

        match (&self.day_of_month, &self.month, &self.day_of_week) {
            (CronField::Any, CronField::Any, CronField::Any) => {
                format!("every day at {time}")
            }
            (CronField::Any, CronField::Any, CronField::Value(d)) => {
                format!("every {} at {time}", weekday_name(*d))
            }
            (CronField::Any, CronField::Any, CronField::List(days)) => {
                let names: Vec<&str> = days.iter().map(|d| weekday_name(*d)).collect();
                format!("every {} at {time}", names.join(", "))
            }
            (CronField::Value(day), CronField::Any, CronField::Any) => {
                format!("every month on day {day} at {time}")
            }
            _ => self.raw.clone(),
        }
    }
}

fn weekday_name(day: u32) -> &'static str {
    WEEKDAY_NAMES.get(day as usize).copied().unwrap_or("?")
}

/// Parse one cron column. `*` → Any, `N` → Value, `N,M,…` → List.
/// Every integer is checked against [min, max]; no clamping, no partial
/// results.
fn parse_field(field: &str, min: u32, max: u32, name: &str) -> Result<CronField> {
    if field == "*" {
        return Ok(CronField::Any);
    }

    let parse_one = |s: &str| -> Result<u32> {
        let n: u32 = s
            .trim()
            .parse()
            .map_err(|_| DeskclawError::Cron(format!("{name} field '{field}' is not numeric")))?;
        if n < min || n > max {
            return Err(DeskclawError::Cron(format!(
                "{name} value {n} out of range {min}-{max}"
            )));
        }
        Ok(n)
    };

    if field.contains(',') {
        let values: Vec<u32> = field
            .split(',')
            .map(parse_one)
            .collect::<Result<Vec<_>>>()?;
        Ok(CronField::List(values))
    } else {
        Ok(CronField::Value(parse_one(field)?))
    }
}
