//! Runtime values produced by the interpreter
//!
//! Most values are plain JSON. Date/time values, namespaces and function
//! references only exist while an expression runs and are converted to JSON
//! when the result leaves the interpreter.

use crate::registry::ValueType;
use crate::value_utils::{self, format_number};
use chrono::{DateTime, FixedOffset, SecondsFormat, TimeDelta};
use serde_json::Value;
use std::fmt;

/// Capability namespaces reachable from expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// `Math`
    Math,
    /// `Object`
    Object,
    /// `String`; also callable as a conversion
    String,
    /// `Number`; also callable as a conversion
    Number,
    /// `Array`
    Array,
    /// `Date`
    Date,
    /// `JSON`
    Json,
    /// `DateTime`
    DateTime,
    /// `Duration`
    Duration,
    /// `Interval`
    Interval,
}

impl Namespace {
    /// Namespace for a global name
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "Math" => Self::Math,
            "Object" => Self::Object,
            "String" => Self::String,
            "Number" => Self::Number,
            "Array" => Self::Array,
            "Date" => Self::Date,
            "JSON" => Self::Json,
            "DateTime" => Self::DateTime,
            "Duration" => Self::Duration,
            "Interval" => Self::Interval,
            _ => return None,
        })
    }

    /// Global name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Math => "Math",
            Self::Object => "Object",
            Self::String => "String",
            Self::Number => "Number",
            Self::Array => "Array",
            Self::Date => "Date",
            Self::Json => "JSON",
            Self::DateTime => "DateTime",
            Self::Duration => "Duration",
            Self::Interval => "Interval",
        }
    }
}

/// A value during evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeValue {
    /// `undefined`
    Undefined,
    /// Any JSON value, `null` included
    Json(Value),
    /// Date and time with a fixed offset
    DateTime(DateTime<FixedOffset>),
    /// Signed length of time
    Duration(TimeDelta),
    /// Half-open span between two datetimes
    Interval(DateTime<FixedOffset>, DateTime<FixedOffset>),
    /// Capability namespace (`Math`, `DateTime`, ...)
    Namespace(Namespace),
    /// Reference to a global or namespace function (`$if`, `Math.max`)
    Function(String),
}

impl RuntimeValue {
    /// `null`
    pub const NULL: RuntimeValue = RuntimeValue::Json(Value::Null);

    /// Wrap a string
    pub fn string(s: impl Into<String>) -> Self {
        Self::Json(Value::String(s.into()))
    }

    /// Wrap a boolean
    pub fn bool(b: bool) -> Self {
        Self::Json(Value::Bool(b))
    }

    /// JSON view, when the value is JSON
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// String contents, when the value is a JSON string
    pub fn as_str(&self) -> Option<&str> {
        self.as_json().and_then(Value::as_str)
    }

    /// Whether the value is `null` or `undefined`
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Json(Value::Null))
    }

    /// JavaScript `typeof`
    pub fn type_of(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Json(value) => value_utils::value_type_name(value),
            Self::DateTime(_) | Self::Duration(_) | Self::Interval(..) | Self::Namespace(_) => {
                "object"
            }
            Self::Function(_) => "function",
        }
    }

    /// Descriptive kind for error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Json(value) => value_utils::value_kind_name(value),
            Self::DateTime(_) => "DateTime",
            Self::Duration(_) => "Duration",
            Self::Interval(..) => "Interval",
            Self::Namespace(_) => "namespace",
            Self::Function(_) => "function",
        }
    }

    /// Member-bearing type of the value, if any
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Self::Json(Value::String(_)) => Some(ValueType::String),
            Self::Json(Value::Number(_)) => Some(ValueType::Number),
            Self::Json(Value::Bool(_)) => Some(ValueType::Boolean),
            Self::Json(Value::Array(_)) => Some(ValueType::Array),
            Self::Json(Value::Object(_)) => Some(ValueType::Object),
            Self::DateTime(_) => Some(ValueType::DateTime),
            Self::Duration(_) => Some(ValueType::Duration),
            Self::Interval(..) => Some(ValueType::Interval),
            Self::Undefined | Self::Json(Value::Null) | Self::Namespace(_) | Self::Function(_) => {
                None
            }
        }
    }

    /// JavaScript truthiness
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Undefined => false,
            Self::Json(value) => value_utils::is_truthy(value),
            _ => true,
        }
    }

    /// JavaScript `ToNumber`
    pub fn to_number(&self) -> f64 {
        match self {
            Self::Undefined => f64::NAN,
            Self::Json(value) => value_utils::to_number(value),
            Self::DateTime(dt) => dt.timestamp_millis() as f64,
            Self::Duration(d) => d.num_milliseconds() as f64,
            _ => f64::NAN,
        }
    }

    /// JavaScript `String(value)`
    pub fn to_js_string(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::Json(value) => value_utils::to_js_string(value),
            _ => self.display_text(),
        }
    }

    /// Text interpolated into template output
    pub fn to_template_string(&self) -> String {
        match self {
            Self::Undefined => String::new(),
            Self::Json(value) => value_utils::to_template_string(value),
            _ => self.display_text(),
        }
    }

    /// Convert to JSON for results and JSON-typed builtins
    ///
    /// `undefined` and functions become `null`; date/time values become
    /// ISO-8601 strings.
    pub fn into_json(self) -> Value {
        match self {
            Self::Json(value) => value,
            Self::Undefined | Self::Function(_) => Value::Null,
            Self::Namespace(_) => Value::Object(serde_json::Map::new()),
            other => Value::String(other.display_text()),
        }
    }

    /// JSON copy of the value
    pub fn to_json(&self) -> Value {
        self.clone().into_json()
    }

    fn display_text(&self) -> String {
        match self {
            Self::DateTime(dt) => format_iso(dt),
            Self::Duration(d) => format_iso_duration(*d),
            Self::Interval(start, end) => format!("{}/{}", format_iso(start), format_iso(end)),
            Self::Namespace(ns) => format!("[object {}]", ns.name()),
            Self::Function(name) => format!("function {name}() {{ [native code] }}"),
            Self::Undefined => "undefined".to_string(),
            Self::Json(value) => value_utils::to_js_string(value),
        }
    }
}

impl From<Value> for RuntimeValue {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl fmt::Display for RuntimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_js_string())
    }
}

/// ISO-8601 with milliseconds and offset (`2024-01-02T03:04:05.000+00:00`)
pub fn format_iso(dt: &DateTime<FixedOffset>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, false)
}

/// ISO-8601 duration (`PT1H30M`, `-PT0.5S`)
pub fn format_iso_duration(duration: TimeDelta) -> String {
    let negative = duration < TimeDelta::zero();
    let total_ms = duration.num_milliseconds().unsigned_abs();
    if total_ms == 0 {
        return "PT0S".to_string();
    }

    let days = total_ms / 86_400_000;
    let hours = total_ms / 3_600_000 % 24;
    let minutes = total_ms / 60_000 % 60;
    let millis = total_ms % 60_000;

    let mut out = String::from(if negative { "-P" } else { "P" });
    if days > 0 {
        out.push_str(&format!("{days}D"));
    }
    if hours > 0 || minutes > 0 || millis > 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{hours}H"));
        }
        if minutes > 0 {
            out.push_str(&format!("{minutes}M"));
        }
        if millis > 0 {
            out.push_str(&format_number(millis as f64 / 1000.0));
            out.push('S');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_of() {
        assert_eq!(RuntimeValue::Undefined.type_of(), "undefined");
        assert_eq!(RuntimeValue::from(json!([1])).type_of(), "object");
        assert_eq!(RuntimeValue::Function("$if".into()).type_of(), "function");
        assert_eq!(RuntimeValue::Namespace(Namespace::Math).type_of(), "object");
    }

    #[test]
    fn test_into_json() {
        let dt = DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z").unwrap();
        assert_eq!(
            RuntimeValue::DateTime(dt).into_json(),
            json!("2024-01-02T03:04:05.000+00:00")
        );
        assert_eq!(RuntimeValue::Undefined.into_json(), Value::Null);
    }

    #[test]
    fn test_iso_duration() {
        assert_eq!(format_iso_duration(TimeDelta::minutes(90)), "PT1H30M");
        assert_eq!(format_iso_duration(TimeDelta::days(2)), "P2D");
        assert_eq!(format_iso_duration(TimeDelta::milliseconds(-1500)), "-PT1.5S");
        assert_eq!(format_iso_duration(TimeDelta::zero()), "PT0S");
    }

    #[test]
    fn test_template_string_of_undefined_is_empty() {
        assert_eq!(RuntimeValue::Undefined.to_template_string(), "");
        assert_eq!(RuntimeValue::Undefined.to_js_string(), "undefined");
    }
}
