//! Date, time, duration and interval support
//!
//! `DateTime`, `Duration` and `Interval` follow the Luxon API shape that
//! workflow expressions are written against. Values carry a fixed UTC offset;
//! naive inputs take the offset of the evaluation clock. Durations are exact
//! millisecond spans, so `months` and `years` inside a duration are
//! approximated as 30 and 365 days. Adding months or years directly to a
//! datetime is calendar-aware.

use super::CallArgs;
use crate::error::{ExpressionError, ExpressionResult};
use crate::eval::value::{format_iso, format_iso_duration};
use crate::eval::{Evaluator, RuntimeValue};
use chrono::{
    DateTime, Datelike, Days, FixedOffset, Months, NaiveDate, NaiveDateTime, TimeDelta, TimeZone,
    Timelike, Utc,
};
use serde_json::{Map, Value};
use std::fmt::Write as _;

/// Calendar units accepted by `plus`, `startOf`, `Duration.as`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    /// Calendar years
    Years,
    /// Calendar months
    Months,
    /// Seven days
    Weeks,
    /// Calendar days
    Days,
    /// Hours
    Hours,
    /// Minutes
    Minutes,
    /// Seconds
    Seconds,
    /// Milliseconds
    Milliseconds,
}

impl Unit {
    /// Parse singular, plural or short unit names
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "year" | "years" | "y" => Self::Years,
            "month" | "months" | "M" => Self::Months,
            "week" | "weeks" | "w" => Self::Weeks,
            "day" | "days" | "d" => Self::Days,
            "hour" | "hours" | "h" => Self::Hours,
            "minute" | "minutes" | "m" => Self::Minutes,
            "second" | "seconds" | "s" => Self::Seconds,
            "millisecond" | "milliseconds" | "ms" => Self::Milliseconds,
            _ => return None,
        })
    }

    /// Length in milliseconds; months and years are approximate
    pub fn millis(self) -> i64 {
        match self {
            Self::Years => 365 * 86_400_000,
            Self::Months => 30 * 86_400_000,
            Self::Weeks => 7 * 86_400_000,
            Self::Days => 86_400_000,
            Self::Hours => 3_600_000,
            Self::Minutes => 60_000,
            Self::Seconds => 1_000,
            Self::Milliseconds => 1,
        }
    }
}

// ==================== Entry points ====================

/// `DateTime.*`, `Duration.*`, `Interval.*` and `Date.now`
pub fn call_namespace(
    ev: &mut Evaluator<'_>,
    name: &str,
    args: &CallArgs<'_>,
) -> ExpressionResult<RuntimeValue> {
    let offset = *ev.now().offset();
    match name {
        "Date.now" => Ok(RuntimeValue::Json(Value::from(ev.now().timestamp_millis()))),
        "DateTime.now" => Ok(RuntimeValue::DateTime(ev.now())),
        "DateTime.fromISO" => {
            let text = args.get_string(0)?;
            parse_iso(&text, &offset)
                .map(RuntimeValue::DateTime)
                .ok_or_else(|| args.invalid(format!("'{text}' is not an ISO-8601 date")))
        }
        "DateTime.fromMillis" => {
            let millis = args.get_number(0, "millis")?;
            from_millis(millis as i64, &offset)
                .map(RuntimeValue::DateTime)
                .ok_or_else(|| args.invalid(format!("{millis} is out of range")))
        }
        "DateTime.fromSeconds" => {
            let seconds = args.get_number(0, "seconds")?;
            from_millis((seconds * 1000.0) as i64, &offset)
                .map(RuntimeValue::DateTime)
                .ok_or_else(|| args.invalid(format!("{seconds} is out of range")))
        }
        "DateTime.fromFormat" => {
            let text = args.get_string(0)?;
            let format = args.get_string(1)?;
            parse_with_format(&text, &format, &offset)
                .map(RuntimeValue::DateTime)
                .ok_or_else(|| args.invalid(format!("'{text}' does not match format '{format}'")))
        }
        "Duration.fromMillis" => {
            let millis = args.get_number(0, "millis")?;
            millis_delta(millis, args).map(RuntimeValue::Duration)
        }
        "Duration.fromObject" => {
            let units = args.get_object(0, "units")?;
            duration_from_object(&units, args).map(RuntimeValue::Duration)
        }
        "Interval.fromDateTimes" => {
            let start = to_datetime(&args.value(0)?, &offset)
                .ok_or_else(|| args.invalid("start must be a DateTime, ISO string or millis"))?;
            let end = to_datetime(&args.value(1)?, &offset)
                .ok_or_else(|| args.invalid("end must be a DateTime, ISO string or millis"))?;
            if end < start {
                return Err(args.invalid("Interval end is before its start"));
            }
            Ok(RuntimeValue::Interval(start, end))
        }
        _ => Err(ExpressionError::function_not_found(name)),
    }
}

/// Methods on `DateTime`, `Duration` and `Interval` receivers
pub fn call_method(
    ev: &mut Evaluator<'_>,
    receiver: RuntimeValue,
    method: &str,
    args: &CallArgs<'_>,
) -> ExpressionResult<RuntimeValue> {
    match receiver {
        RuntimeValue::DateTime(dt) => datetime_method(ev, dt, method, args),
        RuntimeValue::Duration(d) => duration_method(d, method, args),
        RuntimeValue::Interval(start, end) => interval_method(ev, start, end, method, args),
        other => Err(ExpressionError::function_not_found(format!(
            "{}.{method}",
            other.kind_name()
        ))),
    }
}

/// Properties of `DateTime` and `Interval` receivers
pub fn get_property(receiver: &RuntimeValue, name: &str) -> Option<RuntimeValue> {
    let number = |n: i64| Some(RuntimeValue::Json(Value::from(n)));
    match receiver {
        RuntimeValue::DateTime(dt) => match name {
            "year" => number(i64::from(dt.year())),
            "month" => number(i64::from(dt.month())),
            "day" => number(i64::from(dt.day())),
            "hour" => number(i64::from(dt.hour())),
            "minute" => number(i64::from(dt.minute())),
            "second" => number(i64::from(dt.second())),
            "millisecond" => number(i64::from(dt.timestamp_subsec_millis())),
            "weekday" => number(i64::from(dt.weekday().number_from_monday())),
            _ => None,
        },
        RuntimeValue::Interval(start, end) => match name {
            "start" => Some(RuntimeValue::DateTime(*start)),
            "end" => Some(RuntimeValue::DateTime(*end)),
            _ => None,
        },
        _ => None,
    }
}

// ==================== DateTime ====================

fn datetime_method(
    ev: &mut Evaluator<'_>,
    dt: DateTime<FixedOffset>,
    method: &str,
    args: &CallArgs<'_>,
) -> ExpressionResult<RuntimeValue> {
    let offset = *ev.now().offset();
    match method {
        "toISO" | "toString" => Ok(RuntimeValue::string(format_iso(&dt))),
        "toISODate" => Ok(RuntimeValue::string(dt.format("%Y-%m-%d").to_string())),
        "toFormat" => {
            let format = args.get_string(0)?;
            format_luxon(&dt, &format)
                .map(RuntimeValue::string)
                .ok_or_else(|| args.invalid(format!("Invalid format '{format}'")))
        }
        "toMillis" => Ok(RuntimeValue::Json(Value::from(dt.timestamp_millis()))),
        "toSeconds" => super::number(method, dt.timestamp_millis() as f64 / 1000.0),
        "plus" | "minus" => {
            let sign = if method == "plus" { 1 } else { -1 };
            shift_datetime(dt, &args.value(0)?, sign, args).map(RuntimeValue::DateTime)
        }
        "diff" => {
            let other = to_datetime(&args.value(0)?, &offset)
                .ok_or_else(|| args.invalid("Expected a DateTime to diff against"))?;
            Ok(RuntimeValue::Duration(dt - other))
        }
        "startOf" | "endOf" => {
            let name = args.get_string(0)?;
            let unit = Unit::parse(&name)
                .ok_or_else(|| args.invalid(format!("Unknown unit '{name}'")))?;
            let result = if method == "startOf" {
                start_of(dt, unit)
            } else {
                end_of(dt, unit)
            };
            result
                .map(RuntimeValue::DateTime)
                .ok_or_else(|| args.invalid(format!("Cannot compute {method}('{name}')")))
        }
        "toUTC" => Ok(RuntimeValue::DateTime(dt.with_timezone(&Utc).fixed_offset())),
        "equals" => Ok(RuntimeValue::bool(
            to_datetime(&args.value(0)?, &offset).is_some_and(|other| other == dt),
        )),
        _ => Err(ExpressionError::function_not_found(format!("datetime.{method}"))),
    }
}

fn shift_datetime(
    dt: DateTime<FixedOffset>,
    amount: &RuntimeValue,
    sign: i64,
    args: &CallArgs<'_>,
) -> ExpressionResult<DateTime<FixedOffset>> {
    let out_of_range = || args.invalid("Resulting date is out of range");
    match amount {
        RuntimeValue::Duration(d) => dt
            .checked_add_signed(*d * sign as i32)
            .ok_or_else(out_of_range),
        RuntimeValue::Json(Value::Number(_)) => {
            let delta = millis_delta(amount.to_number() * sign as f64, args)?;
            dt.checked_add_signed(delta).ok_or_else(out_of_range)
        }
        RuntimeValue::Json(Value::Object(units)) => {
            let mut result = dt;
            for (name, value) in units {
                let unit = Unit::parse(name)
                    .ok_or_else(|| args.invalid(format!("Unknown unit '{name}'")))?;
                let n = crate::value_utils::to_number(value);
                if n.is_nan() {
                    return Err(args.invalid(format!("Amount for '{name}' must be a number")));
                }
                let n = n * sign as f64;
                result = match unit {
                    Unit::Years | Unit::Months => {
                        let months = if unit == Unit::Years { n * 12.0 } else { n };
                        if months.fract() != 0.0 {
                            return Err(args.invalid("Months and years must be whole numbers"));
                        }
                        add_months(result, months as i64).ok_or_else(out_of_range)?
                    }
                    _ => result
                        .checked_add_signed(millis_delta(n * unit.millis() as f64, args)?)
                        .ok_or_else(out_of_range)?,
                };
            }
            Ok(result)
        }
        other => Err(args.invalid(format!(
            "Expected a Duration, an object of units or milliseconds, got {}",
            other.kind_name()
        ))),
    }
}

fn add_months(dt: DateTime<FixedOffset>, months: i64) -> Option<DateTime<FixedOffset>> {
    let count = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        dt.checked_add_months(count)
    } else {
        dt.checked_sub_months(count)
    }
}

fn start_of(dt: DateTime<FixedOffset>, unit: Unit) -> Option<DateTime<FixedOffset>> {
    let naive = dt.naive_local();
    let date = naive.date();
    let truncated: NaiveDateTime = match unit {
        Unit::Years => NaiveDate::from_ymd_opt(date.year(), 1, 1)?.and_hms_opt(0, 0, 0)?,
        Unit::Months => date.with_day(1)?.and_hms_opt(0, 0, 0)?,
        Unit::Weeks => {
            let back = Days::new(u64::from(date.weekday().num_days_from_monday()));
            date.checked_sub_days(back)?.and_hms_opt(0, 0, 0)?
        }
        Unit::Days => date.and_hms_opt(0, 0, 0)?,
        Unit::Hours => date.and_hms_opt(naive.hour(), 0, 0)?,
        Unit::Minutes => date.and_hms_opt(naive.hour(), naive.minute(), 0)?,
        Unit::Seconds => date.and_hms_opt(naive.hour(), naive.minute(), naive.second())?,
        Unit::Milliseconds => date.and_hms_milli_opt(
            naive.hour(),
            naive.minute(),
            naive.second(),
            naive.nanosecond() / 1_000_000,
        )?,
    };
    dt.offset().from_local_datetime(&truncated).single()
}

fn end_of(dt: DateTime<FixedOffset>, unit: Unit) -> Option<DateTime<FixedOffset>> {
    let start = start_of(dt, unit)?;
    let next = match unit {
        Unit::Years => start.checked_add_months(Months::new(12))?,
        Unit::Months => start.checked_add_months(Months::new(1))?,
        _ => start.checked_add_signed(TimeDelta::try_milliseconds(unit.millis())?)?,
    };
    next.checked_sub_signed(TimeDelta::milliseconds(1))
}

// ==================== Duration ====================

fn duration_method(
    d: TimeDelta,
    method: &str,
    args: &CallArgs<'_>,
) -> ExpressionResult<RuntimeValue> {
    match method {
        "as" => {
            let name = args.get_string(0)?;
            let unit = Unit::parse(&name)
                .ok_or_else(|| args.invalid(format!("Unknown unit '{name}'")))?;
            super::number(method, d.num_milliseconds() as f64 / unit.millis() as f64)
        }
        "toMillis" => Ok(RuntimeValue::Json(Value::from(d.num_milliseconds()))),
        "toISO" | "toString" => Ok(RuntimeValue::string(format_iso_duration(d))),
        "plus" | "minus" => {
            let other = to_duration(&args.value(0)?, args)?;
            let result = if method == "plus" {
                d.checked_add(&other)
            } else {
                d.checked_sub(&other)
            };
            result
                .map(RuntimeValue::Duration)
                .ok_or_else(|| args.invalid("Duration overflow"))
        }
        _ => Err(ExpressionError::function_not_found(format!("duration.{method}"))),
    }
}

fn to_duration(value: &RuntimeValue, args: &CallArgs<'_>) -> ExpressionResult<TimeDelta> {
    match value {
        RuntimeValue::Duration(d) => Ok(*d),
        RuntimeValue::Json(Value::Object(units)) => duration_from_object(units, args),
        RuntimeValue::Json(Value::Number(_)) => millis_delta(value.to_number(), args),
        other => Err(args.invalid(format!(
            "Expected a Duration, an object of units or milliseconds, got {}",
            other.kind_name()
        ))),
    }
}

fn duration_from_object(units: &Map<String, Value>, args: &CallArgs<'_>) -> ExpressionResult<TimeDelta> {
    let mut total = 0.0;
    for (name, value) in units {
        let unit = Unit::parse(name).ok_or_else(|| args.invalid(format!("Unknown unit '{name}'")))?;
        let n = crate::value_utils::to_number(value);
        if n.is_nan() {
            return Err(args.invalid(format!("Amount for '{name}' must be a number")));
        }
        total += n * unit.millis() as f64;
    }
    millis_delta(total, args)
}

fn millis_delta(millis: f64, args: &CallArgs<'_>) -> ExpressionResult<TimeDelta> {
    if !millis.is_finite() {
        return Err(args.invalid("Duration must be finite"));
    }
    TimeDelta::try_milliseconds(millis.round() as i64)
        .ok_or_else(|| args.invalid(format!("Duration of {millis}ms is out of range")))
}

// ==================== Interval ====================

fn interval_method(
    ev: &mut Evaluator<'_>,
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
    method: &str,
    args: &CallArgs<'_>,
) -> ExpressionResult<RuntimeValue> {
    let offset = *ev.now().offset();
    match method {
        "length" => {
            let unit = if args.is_absent(0) {
                Unit::Milliseconds
            } else {
                let name = args.get_string(0)?;
                Unit::parse(&name).ok_or_else(|| args.invalid(format!("Unknown unit '{name}'")))?
            };
            super::number(
                method,
                (end - start).num_milliseconds() as f64 / unit.millis() as f64,
            )
        }
        "contains" => {
            let dt = to_datetime(&args.value(0)?, &offset)
                .ok_or_else(|| args.invalid("Expected a DateTime"))?;
            Ok(RuntimeValue::bool(start <= dt && dt < end))
        }
        "toDuration" => Ok(RuntimeValue::Duration(end - start)),
        "toString" => Ok(RuntimeValue::string(
            RuntimeValue::Interval(start, end).to_js_string(),
        )),
        _ => Err(ExpressionError::function_not_found(format!("interval.{method}"))),
    }
}

// ==================== Parsing and formatting ====================

/// Coerce a runtime value to a datetime: datetimes, ISO strings and epoch millis
pub fn to_datetime(value: &RuntimeValue, offset: &FixedOffset) -> Option<DateTime<FixedOffset>> {
    match value {
        RuntimeValue::DateTime(dt) => Some(*dt),
        RuntimeValue::Json(Value::String(s)) => parse_iso(s, offset),
        RuntimeValue::Json(Value::Number(_)) => from_millis(value.to_number() as i64, offset),
        _ => None,
    }
}

/// Parse an ISO-8601 datetime or date; naive values take `offset`
pub fn parse_iso(text: &str, offset: &FixedOffset) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt);
    }
    let naive = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })?;
    offset.from_local_datetime(&naive).single()
}

fn from_millis(millis: i64, offset: &FixedOffset) -> Option<DateTime<FixedOffset>> {
    DateTime::from_timestamp_millis(millis).map(|dt| dt.with_timezone(offset))
}

/// Parse with a Luxon-style format (`dd/MM/yyyy HH:mm`)
pub fn parse_with_format(
    text: &str,
    format: &str,
    offset: &FixedOffset,
) -> Option<DateTime<FixedOffset>> {
    let pattern = luxon_to_strftime(format, true);
    if format.contains("ZZ") {
        return DateTime::parse_from_str(text, &pattern).ok();
    }
    let naive = NaiveDateTime::parse_from_str(text, &pattern).ok().or_else(|| {
        NaiveDate::parse_from_str(text, &pattern)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
    })?;
    offset.from_local_datetime(&naive).single()
}

/// Format with a Luxon-style format; `None` when chrono rejects the pattern
pub fn format_luxon(dt: &DateTime<FixedOffset>, format: &str) -> Option<String> {
    let pattern = luxon_to_strftime(format, false);
    let mut out = String::new();
    write!(out, "{}", dt.format(&pattern)).ok()?;
    Some(out)
}

/// Luxon tokens, longest first, with their strftime equivalents for
/// formatting and parsing
const TOKENS: &[(&str, &str, &str)] = &[
    ("yyyy", "%Y", "%Y"),
    ("yy", "%y", "%y"),
    ("MMMM", "%B", "%B"),
    ("MMM", "%b", "%b"),
    ("MM", "%m", "%m"),
    ("M", "%-m", "%m"),
    ("dd", "%d", "%d"),
    ("d", "%-d", "%d"),
    ("HH", "%H", "%H"),
    ("H", "%-H", "%H"),
    ("hh", "%I", "%I"),
    ("h", "%-I", "%I"),
    ("mm", "%M", "%M"),
    ("m", "%-M", "%M"),
    ("ss", "%S", "%S"),
    ("s", "%-S", "%S"),
    ("SSS", "%3f", "%3f"),
    ("EEEE", "%A", "%A"),
    ("EEE", "%a", "%a"),
    ("a", "%p", "%p"),
    ("ZZ", "%:z", "%:z"),
];

/// Translate a Luxon format string to strftime
///
/// Text in single quotes is literal (`''` is a quote); other characters that
/// are not tokens pass through.
pub fn luxon_to_strftime(format: &str, for_parse: bool) -> String {
    let mut out = String::with_capacity(format.len() * 2);
    let mut rest = format;
    while let Some(c) = rest.chars().next() {
        if c == '\'' {
            let body = &rest[1..];
            match body.find('\'') {
                Some(0) => {
                    out.push('\'');
                    rest = &body[1..];
                }
                Some(end) => {
                    push_literal(&mut out, &body[..end]);
                    rest = &body[end + 1..];
                }
                None => {
                    push_literal(&mut out, body);
                    rest = "";
                }
            }
            continue;
        }
        if let Some((token, fmt, parse)) = TOKENS.iter().find(|(token, ..)| rest.starts_with(token)) {
            out.push_str(if for_parse { parse } else { fmt });
            rest = &rest[token.len()..];
            continue;
        }
        push_literal(&mut out, &rest[..c.len_utf8()]);
        rest = &rest[c.len_utf8()..];
    }
    out
}

fn push_literal(out: &mut String, text: &str) {
    out.push_str(&text.replace('%', "%%"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{Limits, Namespace, Scope};
    use crate::parser::parse_expression;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    fn eval(source: &str) -> ExpressionResult<Value> {
        let now = DateTime::parse_from_rfc3339("2024-03-15T10:30:45.123+01:00").unwrap();
        let mut scope = Scope::new(now);
        scope.insert("$now", RuntimeValue::DateTime(now));
        for ns in [Namespace::DateTime, Namespace::Duration, Namespace::Interval, Namespace::Date] {
            scope.insert(ns.name(), RuntimeValue::Namespace(ns));
        }
        let limits = Limits::default();
        let ast = parse_expression(source)?;
        Evaluator::new(&scope, &limits)
            .evaluate(&ast)
            .map(RuntimeValue::into_json)
    }

    #[rstest]
    #[case("$now.year", json!(2024))]
    #[case("$now.weekday", json!(5))]
    #[case("$now.millisecond", json!(123))]
    #[case("$now.toISO()", json!("2024-03-15T10:30:45.123+01:00"))]
    #[case("$now.toISODate()", json!("2024-03-15"))]
    #[case("$now.toFormat('dd/MM/yyyy HH:mm')", json!("15/03/2024 10:30"))]
    #[case("$now.toFormat(\"d MMM yy 'at' h:mm a\")", json!("15 Mar 24 at 10:30 AM"))]
    #[case("$now.toFormat('EEEE, MMMM d')", json!("Friday, March 15"))]
    #[case("$now.plus({days: 20}).toISODate()", json!("2024-04-04"))]
    #[case("$now.plus({months: 1}).toISODate()", json!("2024-04-15"))]
    #[case("$now.minus({years: 1, hours: 11}).toISO()", json!("2023-03-14T23:30:45.123+01:00"))]
    #[case("$now.plus(Duration.fromObject({minutes: 90})).hour", json!(12))]
    #[case("$now.startOf('month').toISO()", json!("2024-03-01T00:00:00.000+01:00"))]
    #[case("$now.startOf('week').toISODate()", json!("2024-03-11"))]
    #[case("$now.endOf('day').toISO()", json!("2024-03-15T23:59:59.999+01:00"))]
    #[case("$now.endOf('year').toISODate()", json!("2024-12-31"))]
    #[case("$now.toUTC().hour", json!(9))]
    #[case("DateTime.fromISO('2024-01-01').toISO()", json!("2024-01-01T00:00:00.000+01:00"))]
    #[case("DateTime.fromISO('2024-01-01T12:00:00Z').toMillis()", json!(1_704_110_400_000_i64))]
    #[case("DateTime.fromMillis(0).toUTC().toISO()", json!("1970-01-01T00:00:00.000+00:00"))]
    #[case("DateTime.fromFormat('05/02/2024', 'dd/MM/yyyy').month", json!(2))]
    #[case("$now.diff(DateTime.fromISO('2024-03-15T09:30:45.123+01:00')).as('minutes')", json!(60))]
    #[case("$now > DateTime.fromISO('2024-01-01')", json!(true))]
    #[case("$now.equals(DateTime.fromISO('2024-03-15T09:30:45.123Z'))", json!(true))]
    #[case("Duration.fromObject({hours: 1, minutes: 30}).toISO()", json!("PT1H30M"))]
    #[case("Duration.fromMillis(1500).plus({seconds: 1}).toMillis()", json!(2500))]
    #[case("Duration.fromObject({days: 3}).as('hours')", json!(72))]
    #[case("Interval.fromDateTimes('2024-01-01', '2024-01-03').length('days')", json!(2))]
    #[case("Interval.fromDateTimes('2024-01-01', '2024-01-03').contains($now)", json!(false))]
    #[case("Interval.fromDateTimes('2024-03-01', '2024-04-01').contains($now)", json!(true))]
    #[case("Interval.fromDateTimes('2024-01-01', '2024-01-02').toDuration().toISO()", json!("P1D"))]
    #[case("Date.now()", json!(1_710_495_045_123_i64))]
    fn test_datetime(#[case] source: &str, #[case] expected: Value) {
        assert_eq!(eval(source).unwrap(), expected);
    }

    #[test]
    fn test_invalid_inputs() {
        assert_eq!(eval("DateTime.fromISO('nope')").unwrap_err().code(), "INVALID_ARGUMENT");
        assert_eq!(eval("$now.startOf('fortnight')").unwrap_err().code(), "INVALID_ARGUMENT");
        assert_eq!(eval("$now.plus('soon')").unwrap_err().code(), "INVALID_ARGUMENT");
        assert_eq!(eval("$now.plus({months: 1.5})").unwrap_err().code(), "INVALID_ARGUMENT");
        assert_eq!(
            eval("Interval.fromDateTimes('2024-02-01', '2024-01-01')").unwrap_err().code(),
            "INVALID_ARGUMENT"
        );
    }

    #[test]
    fn test_luxon_translation() {
        assert_eq!(luxon_to_strftime("yyyy-MM-dd", false), "%Y-%m-%d");
        assert_eq!(luxon_to_strftime("d 'of' MMMM", false), "%-d of %B");
        assert_eq!(luxon_to_strftime("HH:mm '100%'", true), "%H:%M 100%%");
        assert_eq!(luxon_to_strftime("HH''mm", false), "%H'%M");
    }

    #[test]
    fn test_month_end_clamps() {
        let dt = DateTime::parse_from_rfc3339("2024-01-31T00:00:00Z").unwrap();
        let shifted = add_months(dt, 1).unwrap();
        assert_eq!(format_iso(&shifted), "2024-02-29T00:00:00.000+00:00");
    }
}
