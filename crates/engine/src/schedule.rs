//! Six-field cron schedules: `second minute hour day month weekday`.
//!
//! Fields accept `*`, values, ranges (`1-5`), lists (`1,15`), and steps (`*/5`,
//! `10-40/10`). Months and weekdays also accept three-letter names. Weekdays run
//! `0-6` from Sunday, with `7` as an alias for Sunday. When both day and weekday
//! are restricted, a time matches if either does. Schedules are evaluated in UTC.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeDelta, Timelike, Utc};
use thiserror::Error;

/// How far ahead `next_after` searches before concluding a schedule never fires.
const SEARCH_HORIZON_YEARS: i32 = 8;

const MONTH_NAMES: &[&str] = &["JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC"];
const WEEKDAY_NAMES: &[&str] = &["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid schedule '{expression}': {reason}")]
pub struct ScheduleError {
    pub expression: String,
    pub reason: String,
}

impl ScheduleError {
    fn new(expression: &str, reason: impl Into<String>) -> Self {
        Self {
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSet {
    bits: u64,
    restricted: bool,
}

impl FieldSet {
    fn contains(&self, value: u32) -> bool {
        value < 64 && self.bits & (1u64 << value) != 0
    }
}

#[derive(Debug, Clone, Copy)]
struct FieldSpec {
    label: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
    names_start: u32,
}

const SECOND: FieldSpec = FieldSpec { label: "second", min: 0, max: 59, names: &[], names_start: 0 };
const MINUTE: FieldSpec = FieldSpec { label: "minute", min: 0, max: 59, names: &[], names_start: 0 };
const HOUR: FieldSpec = FieldSpec { label: "hour", min: 0, max: 23, names: &[], names_start: 0 };
const DAY: FieldSpec = FieldSpec { label: "day", min: 1, max: 31, names: &[], names_start: 0 };
const MONTH: FieldSpec = FieldSpec { label: "month", min: 1, max: 12, names: MONTH_NAMES, names_start: 1 };
// 7 is accepted on input and folded onto Sunday.
const WEEKDAY: FieldSpec = FieldSpec { label: "weekday", min: 0, max: 7, names: WEEKDAY_NAMES, names_start: 0 };

/// A parsed cron schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    seconds: FieldSet,
    minutes: FieldSet,
    hours: FieldSet,
    days: FieldSet,
    months: FieldSet,
    weekdays: FieldSet,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, ScheduleError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 6 {
            return Err(ScheduleError::new(
                expression,
                format!("expected 6 fields (second minute hour day month weekday), found {}", fields.len()),
            ));
        }

        let mut weekdays = parse_field(expression, fields[5], WEEKDAY)?;
        if weekdays.contains(7) {
            weekdays.bits = (weekdays.bits & !(1u64 << 7)) | 1;
        }

        Ok(Self {
            expression: fields.join(" "),
            seconds: parse_field(expression, fields[0], SECOND)?,
            minutes: parse_field(expression, fields[1], MINUTE)?,
            hours: parse_field(expression, fields[2], HOUR)?,
            days: parse_field(expression, fields[3], DAY)?,
            months: parse_field(expression, fields[4], MONTH)?,
            weekdays,
        })
    }

    /// The expression with whitespace normalised to single spaces.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Whether `time` (to the second) is an occurrence of this schedule.
    pub fn matches(&self, time: &DateTime<Utc>) -> bool {
        let naive = time.naive_utc();
        self.months.contains(naive.month())
            && self.day_matches(naive.date())
            && self.hours.contains(naive.hour())
            && self.minutes.contains(naive.minute())
            && self.seconds.contains(naive.second())
    }

    /// The first occurrence strictly after `after`, or `None` if the schedule never fires.
    pub fn next_after(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = after.naive_utc().with_nanosecond(0)? + TimeDelta::seconds(1);
        let horizon = start.year() + SEARCH_HORIZON_YEARS;
        let mut candidate = start;

        while candidate.year() <= horizon {
            if !self.months.contains(candidate.month()) {
                candidate = first_of_next_month(candidate.date())?;
                continue;
            }
            if !self.day_matches(candidate.date()) {
                candidate = candidate.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.hours.contains(candidate.hour()) {
                candidate = truncate(candidate, 3600)? + TimeDelta::hours(1);
                continue;
            }
            if !self.minutes.contains(candidate.minute()) {
                candidate = truncate(candidate, 60)? + TimeDelta::minutes(1);
                continue;
            }
            if !self.seconds.contains(candidate.second()) {
                candidate += TimeDelta::seconds(1);
                continue;
            }
            return Some(candidate.and_utc());
        }
        None
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let day_hit = self.days.contains(date.day());
        let weekday_hit = self.weekdays.contains(date.weekday().num_days_from_sunday());
        match (self.days.restricted, self.weekdays.restricted) {
            (true, true) => day_hit || weekday_hit,
            (true, false) => day_hit,
            (false, true) => weekday_hit,
            (false, false) => true,
        }
    }
}

impl FromStr for CronSchedule {
    type Err = ScheduleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        CronSchedule::parse(value)
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDateTime> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}

fn truncate(time: NaiveDateTime, unit_seconds: u32) -> Option<NaiveDateTime> {
    let seconds_of_day = time.num_seconds_from_midnight();
    let truncated = seconds_of_day - seconds_of_day % unit_seconds;
    time.date()
        .and_hms_opt(truncated / 3600, (truncated % 3600) / 60, truncated % 60)
}

fn parse_field(expression: &str, field: &str, spec: FieldSpec) -> Result<FieldSet, ScheduleError> {
    let mut bits = 0u64;
    for part in field.split(',') {
        if part.is_empty() {
            return Err(ScheduleError::new(expression, format!("empty list item in {} field", spec.label)));
        }
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| ScheduleError::new(expression, format!("invalid step '{step}' in {} field", spec.label)))?;
                if step == 0 {
                    return Err(ScheduleError::new(expression, format!("step must be positive in {} field", spec.label)));
                }
                (range, step)
            }
            None => (part, 1),
        };

        let (low, high) = if range == "*" {
            (spec.min, spec.max)
        } else if let Some((low, high)) = range.split_once('-') {
            (parse_value(expression, low, spec)?, parse_value(expression, high, spec)?)
        } else {
            let value = parse_value(expression, range, spec)?;
            // `5/15` means "from 5 to the end, every 15".
            if part.contains('/') { (value, spec.max) } else { (value, value) }
        };
        if low > high {
            return Err(ScheduleError::new(
                expression,
                format!("range {low}-{high} is reversed in {} field", spec.label),
            ));
        }

        let mut value = low;
        while value <= high {
            bits |= 1u64 << value;
            let Some(next) = value.checked_add(step) else {
                break;
            };
            value = next;
        }
    }

    Ok(FieldSet {
        bits,
        // `*` and `*/n` leave the field unrestricted for the day/weekday rule.
        restricted: !field.starts_with('*'),
    })
}

fn parse_value(expression: &str, raw: &str, spec: FieldSpec) -> Result<u32, ScheduleError> {
    let value = match raw.parse::<u32>() {
        Ok(value) => value,
        Err(_) => spec
            .names
            .iter()
            .position(|name| name.eq_ignore_ascii_case(raw))
            .map(|index| index as u32 + spec.names_start)
            .ok_or_else(|| ScheduleError::new(expression, format!("invalid value '{raw}' in {} field", spec.label)))?,
    };
    if value < spec.min || value > spec.max {
        return Err(ScheduleError::new(
            expression,
            format!("{} value {value} is outside {}-{}", spec.label, spec.min, spec.max),
        ));
    }
    Ok(value)
}
