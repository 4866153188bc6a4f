//! Five-field cron expressions: validation, minute matching and next-run hints.
//!
//! Field grammar, in precedence order: comma-list, step (`base/step`), range
//! (`a-b`), wildcard (`*`), literal. The weekday field accepts both 0 and 7
//! for Sunday and matching treats them as the same day.

use crate::error::ValidationError;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use std::fmt;
use std::str::FromStr;

/// How far ahead `next_after` searches before giving up (covers Feb 29 rules).
const NEXT_SEARCH_DAYS: i64 = 366 * 5;

#[derive(Debug, Clone, Copy)]
struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
}

const MINUTE: FieldSpec = FieldSpec { name: "minute", min: 0, max: 59 };
const HOUR: FieldSpec = FieldSpec { name: "hour", min: 0, max: 23 };
const DAY: FieldSpec = FieldSpec { name: "day", min: 1, max: 31 };
const MONTH: FieldSpec = FieldSpec { name: "month", min: 1, max: 12 };
const WEEKDAY: FieldSpec = FieldSpec { name: "day_of_week", min: 0, max: 7 };

/// Set of allowed values for one field; bit `n` set means value `n` matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct FieldSet(u64);

impl FieldSet {
    fn stepped(start: u32, end: u32, step: u32) -> Self {
        let mut bits = 0u64;
        let mut v = start;
        while v <= end {
            bits |= 1 << v;
            match v.checked_add(step) {
                Some(next) => v = next,
                None => break,
            }
        }
        FieldSet(bits)
    }

    fn contains(&self, value: u32) -> bool {
        value < 64 && self.0 & (1 << value) != 0
    }

    fn union(self, other: FieldSet) -> FieldSet {
        FieldSet(self.0 | other.0)
    }

    /// Smallest allowed value `>= from`, if any.
    fn first_at_or_after(&self, from: u32) -> Option<u32> {
        (from..64).find(|&v| self.contains(v))
    }
}

/// A validated cron expression. Keeps its original text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    text: String,
    minute: FieldSet,
    hour: FieldSet,
    day: FieldSet,
    month: FieldSet,
    weekday: FieldSet,
}

/// Validate a cron expression, returning the parsed rule on success.
pub fn validate(expr: &str) -> Result<CronExpr, ValidationError> {
    CronExpr::parse(expr)
}

impl CronExpr {
    /// Parse and validate `minute hour day month day_of_week`.
    pub fn parse(expr: &str) -> Result<Self, ValidationError> {
        let parts: Vec<&str> = expr.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(ValidationError::FieldCount { found: parts.len() });
        }
        Ok(CronExpr {
            text: expr.to_string(),
            minute: parse_field(&MINUTE, parts[0])?,
            hour: parse_field(&HOUR, parts[1])?,
            day: parse_field(&DAY, parts[2])?,
            month: parse_field(&MONTH, parts[3])?,
            weekday: parse_field(&WEEKDAY, parts[4])?,
        })
    }

    /// The expression exactly as it was supplied.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// True when every field matches the given wall-clock minute.
    pub fn matches(&self, at: NaiveDateTime) -> bool {
        self.minute.contains(at.minute())
            && self.hour.contains(at.hour())
            && self.date_matches(at.date())
    }

    fn date_matches(&self, date: NaiveDate) -> bool {
        let dow = date.weekday().num_days_from_sunday();
        let weekday_ok = self.weekday.contains(dow) || (dow == 0 && self.weekday.contains(7));
        weekday_ok && self.day.contains(date.day()) && self.month.contains(date.month())
    }

    /// Next matching minute strictly after `after`, searching a few years ahead.
    pub fn next_after(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        let start = truncate_to_minute(after) + Duration::minutes(1);
        let first_date = start.date();

        for offset in 0..NEXT_SEARCH_DAYS {
            let date = first_date + Duration::days(offset);
            if !self.date_matches(date) {
                continue;
            }
            let (min_hour, min_minute) = if offset == 0 {
                (start.hour(), start.minute())
            } else {
                (0, 0)
            };

            let mut hour = self.hour.first_at_or_after(min_hour);
            while let Some(h) = hour.filter(|&h| h <= HOUR.max) {
                let from_minute = if h == min_hour { min_minute } else { 0 };
                if let Some(m) = self.minute.first_at_or_after(from_minute).filter(|&m| m <= MINUTE.max)
                {
                    return date.and_hms_opt(h, m, 0);
                }
                hour = self.hour.first_at_or_after(h + 1);
            }
        }
        None
    }
}

impl FromStr for CronExpr {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CronExpr::parse(s)
    }
}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Drop seconds and sub-second precision.
pub fn truncate_to_minute(at: NaiveDateTime) -> NaiveDateTime {
    at.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at)
}

fn parse_field(spec: &FieldSpec, value: &str) -> Result<FieldSet, ValidationError> {
    if value.contains(',') {
        let mut set = FieldSet::default();
        for part in value.split(',') {
            set = set.union(parse_field(spec, part.trim())?);
        }
        return Ok(set);
    }

    if let Some((base, step)) = value.split_once('/') {
        let step = match parse_number(step) {
            Some(n) if n > 0 => n,
            _ => {
                return Err(ValidationError::InvalidStep {
                    field: spec.name,
                    value: value.to_string(),
                })
            }
        };
        let (start, end) = if base == "*" {
            (spec.min, spec.max)
        } else if let Some((a, b)) = base.split_once('-') {
            parse_range(spec, a, b, value)?
        } else {
            (parse_value(spec, base, value)?, spec.max)
        };
        return Ok(FieldSet::stepped(start, end, step));
    }

    if let Some((a, b)) = value.split_once('-') {
        let (start, end) = parse_range(spec, a, b, value)?;
        return Ok(FieldSet::stepped(start, end, 1));
    }

    if value == "*" {
        return Ok(FieldSet::stepped(spec.min, spec.max, 1));
    }

    let v = parse_value(spec, value, value)?;
    Ok(FieldSet::stepped(v, v, 1))
}

fn parse_range(
    spec: &FieldSpec,
    start: &str,
    end: &str,
    field_text: &str,
) -> Result<(u32, u32), ValidationError> {
    let start = parse_value(spec, start, field_text)?;
    let end = parse_value(spec, end, field_text)?;
    if start > end {
        return Err(ValidationError::FieldSyntax {
            field: spec.name,
            value: field_text.to_string(),
        });
    }
    Ok((start, end))
}

fn parse_value(spec: &FieldSpec, raw: &str, field_text: &str) -> Result<u32, ValidationError> {
    let value = parse_number(raw).ok_or_else(|| ValidationError::FieldSyntax {
        field: spec.name,
        value: field_text.to_string(),
    })?;
    if value < spec.min || value > spec.max {
        return Err(ValidationError::OutOfRange {
            field: spec.name,
            value,
            min: spec.min,
            max: spec.max,
        });
    }
    Ok(value)
}

/// Plain decimal digits only (no sign, no whitespace).
fn parse_number(raw: &str) -> Option<u32> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}
