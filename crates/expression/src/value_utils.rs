//! JavaScript-style coercions over serde_json::Value

use crate::error::{ExpressionError, ExpressionResult};
use serde_json::{Number, Value};

/// Largest integer an f64 represents exactly (2^53)
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// `typeof` for a JSON value
pub fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null | Value::Array(_) | Value::Object(_) => "object",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
    }
}

/// Descriptive kind for error messages, distinguishing arrays and null
pub fn value_kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Extract f64 from Number, trying both f64 and i64 representations
#[inline]
pub fn number_as_f64(num: &Number) -> f64 {
    num.as_f64()
        .or_else(|| num.as_i64().map(|i| i as f64))
        .unwrap_or(f64::NAN)
}

/// Build a JSON number, normalizing integral values to integers
///
/// Non-finite results have no JSON representation and are rejected.
pub fn number_value(n: f64) -> ExpressionResult<Value> {
    if !n.is_finite() {
        return Err(ExpressionError::eval(format!(
            "Arithmetic result is not a finite number ({n})"
        )));
    }
    if n.fract() == 0.0 && n.abs() < MAX_SAFE_INTEGER {
        // -0 normalizes to 0
        return Ok(Value::from(n as i64));
    }
    Number::from_f64(n)
        .map(Value::Number)
        .ok_or_else(|| ExpressionError::eval("Invalid number"))
}

/// JS truthiness: `null`, `false`, `0`, `NaN` and `""` are falsy
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => {
            let f = number_as_f64(n);
            f != 0.0 && !f.is_nan()
        }
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// JS `ToNumber`; returns NaN for values with no numeric meaning
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => number_as_f64(n),
        Value::String(s) => parse_numeric_string(s),
        Value::Array(items) => match items.as_slice() {
            [] => 0.0,
            [single] => to_number(single),
            _ => f64::NAN,
        },
        Value::Object(_) => f64::NAN,
    }
}

/// JS string-to-number conversion (`Number("12")`)
pub fn parse_numeric_string(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return u64::from_str_radix(hex, 16).map_or(f64::NAN, |n| n as f64);
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        // Rust accepts "inf" and "nan", JavaScript does not
        _ if trimmed.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => f64::NAN,
        _ => trimmed.parse::<f64>().unwrap_or(f64::NAN),
    }
}

/// JS number formatting (`String(1.0) == "1"`)
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        (if n > 0.0 { "Infinity" } else { "-Infinity" }).to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.abs() >= 1e21 || n.abs() < 1e-6 {
        // `1e+21`, `1.5e-7`
        let formatted = format!("{n:e}");
        match formatted.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => {
                format!("{mantissa}e+{exponent}")
            }
            _ => formatted,
        }
    } else {
        format!("{n}")
    }
}

/// JS `String(value)`
pub fn to_js_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(number_as_f64(n)),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => to_js_string(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

/// Text used when a value is interpolated into template output
///
/// `null` renders as nothing, arrays and objects as JSON.
pub fn to_template_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
        other => to_js_string(other),
    }
}

/// `===`; arrays and objects compare structurally
pub fn strict_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => number_as_f64(a) == number_as_f64(b),
        _ => left == right,
    }
}

/// `==` with JS coercion between primitives
pub fn loose_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Number(_), Value::String(_))
        | (Value::String(_), Value::Number(_))
        | (Value::Bool(_), _)
        | (_, Value::Bool(_)) => to_number(left) == to_number(right),
        (Value::Array(_) | Value::Object(_), Value::String(_) | Value::Number(_)) => {
            loose_equals(&Value::String(to_js_string(left)), right)
        }
        (Value::String(_) | Value::Number(_), Value::Array(_) | Value::Object(_)) => {
            loose_equals(left, &Value::String(to_js_string(right)))
        }
        _ => strict_equals(left, right),
    }
}

/// Emptiness as used by `$isEmpty`: null, `""`, `[]` and `{}` are empty
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn test_value_type_name() {
        assert_eq!(value_type_name(&Value::Null), "object");
        assert_eq!(value_type_name(&json!(true)), "boolean");
        assert_eq!(value_type_name(&json!(42)), "number");
        assert_eq!(value_type_name(&json!("x")), "string");
        assert_eq!(value_type_name(&json!([])), "object");
        assert_eq!(value_kind_name(&json!([])), "array");
    }

    #[test]
    fn test_is_truthy() {
        assert!(!is_truthy(&Value::Null));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!("0")));
        assert!(is_truthy(&json!([])));
        assert!(is_truthy(&json!({})));
    }

    #[test]
    fn test_number_value_normalizes_integers() {
        assert_eq!(number_value(2.0).unwrap(), json!(2));
        assert_eq!(number_value(-0.0).unwrap(), json!(0));
        assert_eq!(number_value(0.5).unwrap(), json!(0.5));
        assert!(number_value(f64::NAN).is_err());
        assert!(number_value(f64::INFINITY).is_err());
    }

    #[rstest]
    #[case(json!(null), 0.0)]
    #[case(json!(true), 1.0)]
    #[case(json!(" 12 "), 12.0)]
    #[case(json!(""), 0.0)]
    #[case(json!("0x10"), 16.0)]
    #[case(json!([7]), 7.0)]
    fn test_to_number(#[case] value: Value, #[case] expected: f64) {
        assert_eq!(to_number(&value), expected);
    }

    #[test]
    fn test_to_number_nan() {
        assert!(to_number(&json!("abc")).is_nan());
        assert!(to_number(&json!("inf")).is_nan());
        assert!(to_number(&json!({})).is_nan());
    }

    #[rstest]
    #[case(1.0, "1")]
    #[case(0.1 + 0.2, "0.30000000000000004")]
    #[case(-2.5, "-2.5")]
    #[case(f64::NAN, "NaN")]
    #[case(1e21, "1e+21")]
    #[case(-1.5e300, "-1.5e+300")]
    #[case(999_999_999_999_999_900_000.0, "999999999999999900000")]
    #[case(0.000001, "0.000001")]
    #[case(1.5e-7, "1.5e-7")]
    #[case(-0.0, "0")]
    fn test_format_number(#[case] n: f64, #[case] expected: &str) {
        assert_eq!(format_number(n), expected);
    }

    #[test]
    fn test_string_conversions() {
        assert_eq!(to_js_string(&json!([1, null, "a"])), "1,,a");
        assert_eq!(to_js_string(&json!({"a": 1})), "[object Object]");
        assert_eq!(to_template_string(&json!({"a": 1})), r#"{"a":1}"#);
        assert_eq!(to_template_string(&Value::Null), "");
    }

    #[test]
    fn test_equality() {
        assert!(loose_equals(&json!(1), &json!("1")));
        assert!(!strict_equals(&json!(1), &json!("1")));
        assert!(strict_equals(&json!(1), &json!(1.0)));
        assert!(loose_equals(&json!(true), &json!(1)));
        assert!(!loose_equals(&json!(null), &json!(0)));
    }
}
