//! Recurrence expressions for the sweep scheduler.
//!
//! Accepted forms:
//! - cron: `min hour dom mon dow` (5 fields, standard cron: day of week
//!   `0`-`7` with both `0` and `7` meaning Sunday), or with a leading seconds
//!   field and optional trailing year (6 or 7 fields, passed to the `cron`
//!   crate as-is, where day of week runs `1`-`7` from Sunday)
//! - interval: `every <n><s|m|h|d>`, e.g. `every 8h`
//! - `manual`: never fires on its own; sweeps run only when triggered

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::ValidationError;

/// Default recurrence: every 8 hours, on the hour.
pub const DEFAULT_SCHEDULE: &str = "0 */8 * * *";

#[derive(Debug, Clone)]
enum Recurrence {
    Cron(Box<cron::Schedule>),
    Every(Duration),
    Manual,
}

/// A parsed recurrence expression.
#[derive(Debug, Clone)]
pub struct Schedule {
    expression: String,
    recurrence: Recurrence,
}

fn invalid(expression: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidSchedule {
        expression: expression.to_string(),
        reason: reason.into(),
    }
}

fn parse_interval(expression: &str, interval: &str) -> Result<Duration, ValidationError> {
    let interval = interval.trim();
    let split = interval
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| invalid(expression, "interval needs a unit (s, m, h or d)"))?;
    let (count, unit) = interval.split_at(split);

    let count: u64 = count
        .parse()
        .map_err(|_| invalid(expression, "interval needs a whole number before the unit"))?;
    if count == 0 {
        return Err(invalid(expression, "interval must be greater than zero"));
    }

    let seconds_per_unit = match unit.trim() {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        other => return Err(invalid(expression, format!("unknown interval unit '{other}'"))),
    };

    count
        .checked_mul(seconds_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| invalid(expression, "interval is too large"))
}

/// Day-of-week names indexed by standard cron number (`7` wraps to Sunday).
const DAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

fn is_number(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn day_number(expression: &str, token: &str) -> Result<usize, ValidationError> {
    token
        .parse::<usize>()
        .ok()
        .filter(|n| *n <= 7)
        .ok_or_else(|| invalid(expression, format!("day of week '{token}' is not in 0-7")))
}

/// Rewrites a standard-cron day-of-week field with day names, which the
/// `cron` crate reads the same way regardless of its own numbering.
fn translate_day_of_week(expression: &str, field: &str) -> Result<String, ValidationError> {
    let mut days: Vec<String> = Vec::new();
    let mut push = |day: String| {
        if !days.contains(&day) {
            days.push(day);
        }
    };

    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => (range, Some(step)),
            None => (item, None),
        };

        let bounds = if range == "*" {
            step.map(|_| (0, 6))
        } else if let Some((lo, hi)) = range.split_once('-') {
            if is_number(lo) && is_number(hi) {
                Some((day_number(expression, lo)?, day_number(expression, hi)?))
            } else {
                None
            }
        } else if is_number(range) {
            let day = day_number(expression, range)?;
            Some((day, if step.is_some() { day.max(6) } else { day }))
        } else {
            None
        };

        // Names and plain `*` mean the same thing to both numberings.
        let Some((lo, hi)) = bounds else {
            push(item.to_string());
            continue;
        };
        if lo > hi {
            return Err(invalid(expression, format!("day-of-week range '{range}' is descending")));
        }
        let step = match step {
            None => 1,
            Some(step) => step
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| invalid(expression, format!("day-of-week step '{step}' is not a positive number")))?,
        };
        for day in (lo..=hi).step_by(step) {
            push(DAY_NAMES[day % 7].to_string());
        }
    }

    Ok(days.join(","))
}

fn parse_cron(expression: &str) -> Result<cron::Schedule, ValidationError> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    let normalized = match fields.as_slice() {
        [minute, hour, day_of_month, month, day_of_week] => {
            let day_of_week = translate_day_of_week(expression, day_of_week)?;
            format!("0 {minute} {hour} {day_of_month} {month} {day_of_week}")
        }
        fields if fields.len() == 6 || fields.len() == 7 => expression.to_string(),
        fields => {
            return Err(invalid(
                expression,
                format!("expected 5, 6 or 7 cron fields, got {}", fields.len()),
            ))
        }
    };
    cron::Schedule::from_str(&normalized).map_err(|e| invalid(expression, e.to_string()))
}

impl Schedule {
    /// Parses a recurrence expression.
    ///
    /// # Errors
    /// `InvalidSchedule` if the expression is neither a valid cron
    /// expression, an `every` interval, nor `manual`.
    pub fn parse(expression: &str) -> Result<Self, ValidationError> {
        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Err(invalid(expression, "expression is empty"));
        }

        let recurrence = if trimmed.eq_ignore_ascii_case("manual") {
            Recurrence::Manual
        } else if let Some(interval) = trimmed.strip_prefix("every ") {
            Recurrence::Every(parse_interval(trimmed, interval)?)
        } else {
            Recurrence::Cron(Box::new(parse_cron(trimmed)?))
        };

        Ok(Self {
            expression: trimmed.to_string(),
            recurrence,
        })
    }

    /// A fixed interval, measured from the end of the previous check.
    ///
    /// # Errors
    /// `InvalidSchedule` if `interval` is zero.
    pub fn every(interval: Duration) -> Result<Self, ValidationError> {
        let expression = format!("every {}ms", interval.as_millis());
        if interval.is_zero() {
            return Err(invalid(&expression, "interval must be greater than zero"));
        }
        Ok(Self {
            expression,
            recurrence: Recurrence::Every(interval),
        })
    }

    /// A schedule that never fires; sweeps run only when triggered.
    #[must_use]
    pub fn manual() -> Self {
        Self {
            expression: "manual".to_string(),
            recurrence: Recurrence::Manual,
        }
    }

    /// The expression as given (trimmed).
    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Returns true if the schedule never fires on its own.
    #[must_use]
    pub const fn is_manual(&self) -> bool {
        matches!(self.recurrence, Recurrence::Manual)
    }

    /// The first fire time strictly after `after`, if any.
    #[must_use]
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match &self.recurrence {
            Recurrence::Cron(schedule) => schedule.after(&after).next(),
            Recurrence::Every(interval) => {
                let step = chrono::Duration::from_std(*interval).ok()?;
                after.checked_add_signed(step)
            }
            Recurrence::Manual => None,
        }
    }
}

impl FromStr for Schedule {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_default_fires_every_eight_hours() {
        let schedule = Schedule::parse(DEFAULT_SCHEDULE).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 1, 30, 0).unwrap();

        let first = schedule.next_after(start).unwrap();
        assert_eq!(first, Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap());

        let second = schedule.next_after(first).unwrap();
        assert_eq!(second, Utc.with_ymd_and_hms(2024, 3, 1, 16, 0, 0).unwrap());

        let third = schedule.next_after(second).unwrap();
        assert_eq!(third, Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_five_field_cron() {
        let schedule = Schedule::parse(DEFAULT_SCHEDULE).unwrap();
        assert_eq!(schedule.expression(), DEFAULT_SCHEDULE);

        let start = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let next = schedule.next_after(start).unwrap();
        assert_eq!(next.hour(), 16);
        assert_eq!(next.minute(), 0);
        assert_eq!(next.second(), 0);
    }

    #[test]
    fn test_parse_six_field_cron_keeps_seconds() {
        let schedule = Schedule::parse("*/15 * * * * *").unwrap();
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 1).unwrap();
        assert_eq!(schedule.next_after(start).unwrap().second(), 15);
    }

    #[test]
    fn test_parse_interval() {
        let schedule: Schedule = "every 8h".parse().unwrap();
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 1, 30, 0).unwrap();
        assert_eq!(
            schedule.next_after(start).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()
        );

        assert!(Schedule::parse("every 90s").is_ok());
        assert!(Schedule::parse("every 2d").is_ok());
    }

    #[test]
    fn test_rejects_bad_expressions() {
        for bad in ["", "   ", "every 0h", "every h", "every 5w", "* * *", "61 * * * *"] {
            let err = Schedule::parse(bad).unwrap_err();
            assert!(
                matches!(err, ValidationError::InvalidSchedule { .. }),
                "expected InvalidSchedule for {bad:?}, got {err:?}"
            );
        }
    }

    #[test]
    fn test_manual_never_fires() {
        let schedule = Schedule::parse("manual").unwrap();
        assert!(schedule.is_manual());
        assert!(schedule.next_after(Utc::now()).is_none());
        assert!(Schedule::manual().is_manual());
    }

    #[test]
    fn test_every_constructor() {
        let schedule = Schedule::every(Duration::from_secs(30)).unwrap();
        assert_eq!(schedule.to_string(), "every 30000ms");
        let now = Utc::now();
        assert_eq!(schedule.next_after(now).unwrap(), now + chrono::Duration::seconds(30));
    }

    #[test]
    fn test_every_rejects_zero_interval() {
        let err = Schedule::every(Duration::ZERO).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidSchedule { .. }));
        assert!(Schedule::every(Duration::from_millis(1)).is_ok());
    }

    #[test]
    fn test_weekday_range_uses_standard_numbering() {
        // 2024-03-01 is a Friday; 1-5 is Monday through Friday.
        let schedule = Schedule::parse("0 9 * * 1-5").unwrap();
        let friday = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(
            schedule.next_after(friday).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_zero_and_seven_are_sunday() {
        let friday = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let sunday = Utc.with_ymd_and_hms(2024, 3, 3, 0, 0, 0).unwrap();
        for expression in ["0 0 * * 0", "0 0 * * 7", "0 0 * * Sun"] {
            let schedule = Schedule::parse(expression).unwrap();
            assert_eq!(schedule.next_after(friday).unwrap(), sunday, "{expression}");
        }
    }

    #[test]
    fn test_day_of_week_lists_and_steps() {
        let friday = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();

        // Sunday, Tuesday, Thursday, Saturday.
        let every_other = Schedule::parse("0 0 * * */2").unwrap();
        assert_eq!(
            every_other.next_after(friday).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap()
        );

        let list = Schedule::parse("0 0 * * 1,3").unwrap();
        assert_eq!(
            list.next_after(friday).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap()
        );

        assert_eq!(translate_day_of_week("x", "0-7").unwrap(), "Sun,Mon,Tue,Wed,Thu,Fri,Sat");
        assert_eq!(translate_day_of_week("x", "Mon-Fri").unwrap(), "Mon-Fri");
        assert_eq!(translate_day_of_week("x", "*").unwrap(), "*");
    }

    #[test]
    fn test_rejects_bad_day_of_week() {
        for bad in ["0 0 * * 8", "0 0 * * 5-1", "0 0 * * 1-5/0"] {
            let err = Schedule::parse(bad).unwrap_err();
            assert!(
                matches!(err, ValidationError::InvalidSchedule { .. }),
                "expected InvalidSchedule for {bad:?}, got {err:?}"
            );
        }
    }
}
