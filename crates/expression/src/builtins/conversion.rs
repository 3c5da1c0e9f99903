//! Type conversion and JSON functions
//!
//! `String`, `Number`, `Boolean`, `parseInt`, `parseFloat`, `isNaN`,
//! `isFinite`, the `Number.*` and `String.*` statics and `JSON.*`.

use super::{CallArgs, number};
use crate::error::{ExpressionError, ExpressionResult};
use crate::eval::RuntimeValue;
use serde::Serialize;
use serde_json::Value;
use serde_json::ser::PrettyFormatter;

/// Dispatch a conversion function by qualified name
pub fn call(name: &str, args: &CallArgs<'_>) -> ExpressionResult<RuntimeValue> {
    match name {
        "String" => Ok(RuntimeValue::string(if args.is_empty() {
            String::new()
        } else {
            args.get_string(0)?
        })),
        "Number" => {
            if args.is_empty() {
                return Ok(RuntimeValue::Json(Value::from(0)));
            }
            let value = args.value(0)?;
            let n = value.to_number();
            if n.is_nan() {
                return Err(ExpressionError::type_error(format!(
                    "Cannot convert {} '{}' to a number",
                    value.kind_name(),
                    value.to_js_string()
                )));
            }
            number(name, n)
        }
        "Boolean" => Ok(RuntimeValue::bool(args.value(0)?.is_truthy())),
        "parseInt" | "Number.parseInt" => {
            let text = args.get_string(0)?;
            let radix = args.get_opt_int(1, "radix")?;
            let n = parse_int(&text, radix).ok_or_else(|| {
                ExpressionError::type_error(format!("parseInt could not parse '{text}'"))
            })?;
            number(name, n)
        }
        "parseFloat" | "Number.parseFloat" => {
            let text = args.get_string(0)?;
            let n = parse_float(&text).ok_or_else(|| {
                ExpressionError::type_error(format!("parseFloat could not parse '{text}'"))
            })?;
            number(name, n)
        }
        "isNaN" => Ok(RuntimeValue::bool(args.value(0)?.to_number().is_nan())),
        "isFinite" => Ok(RuntimeValue::bool(args.value(0)?.to_number().is_finite())),
        // JSON numbers are always finite, so only the type matters
        "Number.isFinite" => Ok(RuntimeValue::bool(matches!(
            args.value(0)?,
            RuntimeValue::Json(Value::Number(_))
        ))),
        "Number.isNaN" => Ok(RuntimeValue::bool(false)),
        "Number.isInteger" => Ok(RuntimeValue::bool(match args.value(0)? {
            RuntimeValue::Json(Value::Number(n)) => {
                crate::value_utils::number_as_f64(&n).fract() == 0.0
            }
            _ => false,
        })),
        "String.fromCharCode" => {
            let mut out = String::with_capacity(args.len());
            for i in 0..args.len() {
                let code = args.get_number(i, "code")? as u32;
                out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            Ok(RuntimeValue::string(out))
        }
        "JSON.stringify" => stringify(args),
        "JSON.parse" => {
            let text = args.get_string(0)?;
            serde_json::from_str::<Value>(&text)
                .map(RuntimeValue::Json)
                .map_err(|err| args.invalid(err.to_string()))
        }
        _ => Err(ExpressionError::function_not_found(name)),
    }
}

/// `JSON.stringify(value, replacer?, indent?)`
///
/// The replacer argument is accepted for compatibility and ignored.
fn stringify(args: &CallArgs<'_>) -> ExpressionResult<RuntimeValue> {
    let value = args.value(0)?;
    if matches!(value, RuntimeValue::Undefined | RuntimeValue::Function(_)) {
        return Ok(RuntimeValue::Undefined);
    }
    let value = value.into_json();

    let indent = match args.value(2)? {
        RuntimeValue::Json(Value::Number(n)) => {
            let width = crate::value_utils::number_as_f64(&n).clamp(0.0, 10.0) as usize;
            " ".repeat(width)
        }
        RuntimeValue::Json(Value::String(s)) => s.chars().take(10).collect(),
        _ => String::new(),
    };
    if indent.is_empty() {
        return Ok(RuntimeValue::string(serde_json::to_string(&value)?));
    }

    let mut out = Vec::new();
    let formatter = PrettyFormatter::with_indent(indent.as_bytes());
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    String::from_utf8(out)
        .map(RuntimeValue::string)
        .map_err(|err| ExpressionError::internal(err.to_string()))
}

/// JavaScript `parseInt`: leading sign, optional `0x`, longest digit prefix
pub fn parse_int(text: &str, radix: Option<i64>) -> Option<f64> {
    let trimmed = text.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let mut radix = match radix {
        None | Some(0) => 10,
        Some(r) if (2..=36).contains(&r) => r as u32,
        Some(_) => return None,
    };
    let mut digits = rest;
    if radix == 10 || radix == 16 {
        if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
            digits = hex;
            radix = 16;
        }
    }

    let mut result: Option<f64> = None;
    for ch in digits.chars() {
        let Some(digit) = ch.to_digit(radix) else {
            break;
        };
        result = Some(result.unwrap_or(0.0) * f64::from(radix) + f64::from(digit));
    }
    result.map(|n| if negative { -n } else { n })
}

/// JavaScript `parseFloat`: longest decimal prefix, `Infinity` allowed
pub fn parse_float(text: &str) -> Option<f64> {
    let trimmed = text.trim_start();
    let unsigned = trimmed.trim_start_matches(['+', '-']);
    if unsigned.starts_with("Infinity") {
        return Some(if trimmed.starts_with('-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        });
    }

    let bytes = trimmed.as_bytes();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    let mut seen_exp = false;
    while end < bytes.len() {
        match bytes[end] {
            b'+' | b'-' if end == 0 || matches!(bytes[end - 1], b'e' | b'E') => {}
            b'0'..=b'9' => seen_digit = true,
            b'.' if !seen_dot && !seen_exp => seen_dot = true,
            b'e' | b'E' if seen_digit && !seen_exp => seen_exp = true,
            _ => break,
        }
        end += 1;
    }

    // back off a dangling exponent ("1e", "1e+")
    let mut candidate = &trimmed[..end];
    while !candidate.is_empty() {
        if let Ok(n) = candidate.parse::<f64>() {
            return Some(n);
        }
        candidate = &candidate[..candidate.len() - 1];
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::Arg;
    use rstest::rstest;
    use serde_json::json;

    fn call_with(name: &str, values: Vec<Value>) -> ExpressionResult<Value> {
        let args = values
            .into_iter()
            .map(|v| Arg::Value(RuntimeValue::Json(v)))
            .collect();
        call(name, &CallArgs::new(name, args)).map(RuntimeValue::into_json)
    }

    #[rstest]
    #[case("42", None, Some(42.0))]
    #[case("  -17px", None, Some(-17.0))]
    #[case("0x1F", None, Some(31.0))]
    #[case("ff", Some(16), Some(255.0))]
    #[case("101", Some(2), Some(5.0))]
    #[case("3.9", None, Some(3.0))]
    #[case("abc", None, None)]
    #[case("12", Some(1), None)]
    fn test_parse_int(#[case] text: &str, #[case] radix: Option<i64>, #[case] expected: Option<f64>) {
        assert_eq!(parse_int(text, radix), expected);
    }

    #[rstest]
    #[case("3.14abc", Some(3.14))]
    #[case("  .5", Some(0.5))]
    #[case("1e3", Some(1000.0))]
    #[case("1e", Some(1.0))]
    #[case("-2.5e-1x", Some(-0.25))]
    #[case("x1", None)]
    fn test_parse_float(#[case] text: &str, #[case] expected: Option<f64>) {
        assert_eq!(parse_float(text), expected);
    }

    #[test]
    fn test_conversions() {
        assert_eq!(call_with("String", vec![json!(1.5)]).unwrap(), json!("1.5"));
        assert_eq!(call_with("String", vec![json!([1, null])]).unwrap(), json!("1,"));
        assert_eq!(call_with("Number", vec![json!(" 12 ")]).unwrap(), json!(12));
        assert_eq!(call_with("Number", vec![]).unwrap(), json!(0));
        assert_eq!(call_with("Boolean", vec![json!("")]).unwrap(), json!(false));
        assert_eq!(call_with("isNaN", vec![json!("abc")]).unwrap(), json!(true));

        let err = call_with("Number", vec![json!("abc")]).unwrap_err();
        assert_eq!(err.code(), "TYPE_ERROR");
    }

    #[test]
    fn test_number_statics() {
        assert_eq!(call_with("Number.isInteger", vec![json!(5)]).unwrap(), json!(true));
        assert_eq!(call_with("Number.isInteger", vec![json!(5.5)]).unwrap(), json!(false));
        assert_eq!(call_with("Number.isFinite", vec![json!("5")]).unwrap(), json!(false));
        assert_eq!(call_with("String.fromCharCode", vec![json!(72), json!(105)]).unwrap(), json!("Hi"));
    }

    #[test]
    fn test_json_functions() {
        assert_eq!(
            call_with("JSON.stringify", vec![json!({"a": [1, 2]})]).unwrap(),
            json!(r#"{"a":[1,2]}"#)
        );
        assert_eq!(
            call_with("JSON.stringify", vec![json!({"a": 1}), Value::Null, json!(2)]).unwrap(),
            json!("{\n  \"a\": 1\n}")
        );
        assert_eq!(call_with("JSON.parse", vec![json!("[1, true]")]).unwrap(), json!([1, true]));
        let err = call_with("JSON.parse", vec![json!("{oops")]).unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT");
    }
}
