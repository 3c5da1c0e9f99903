//! String methods
//!
//! Positions and lengths count Unicode scalar values, not bytes.

use super::{CallArgs, relative_index};
use crate::builtins::datetime;
use crate::error::{ExpressionError, ExpressionResult};
use crate::eval::{Evaluator, RuntimeValue};
use serde_json::Value;

/// Call `method` on the string `s`
pub fn call_method(
    ev: &mut Evaluator<'_>,
    s: &str,
    method: &str,
    args: &CallArgs<'_>,
) -> ExpressionResult<RuntimeValue> {
    let text = |value: String| -> ExpressionResult<RuntimeValue> { Ok(RuntimeValue::string(value)) };
    let flag = |value: bool| -> ExpressionResult<RuntimeValue> { Ok(RuntimeValue::bool(value)) };

    match method {
        "toUpperCase" => text(s.to_uppercase()),
        "toLowerCase" => text(s.to_lowercase()),
        "trim" => text(s.trim().to_string()),
        "trimStart" => text(s.trim_start().to_string()),
        "trimEnd" => text(s.trim_end().to_string()),
        "toString" => text(s.to_string()),
        "includes" => {
            let search = args.get_string(0)?;
            let from = args.get_opt_number(1, "position")?.unwrap_or(0.0);
            flag(tail(s, from).contains(search.as_str()))
        }
        "startsWith" => {
            let search = args.get_string(0)?;
            let from = args.get_opt_number(1, "position")?.unwrap_or(0.0);
            flag(tail(s, from).starts_with(search.as_str()))
        }
        "endsWith" => {
            let search = args.get_string(0)?;
            let len = char_len(s);
            let end = args
                .get_opt_number(1, "length")?
                .map_or(len, |n| clamp_index(n, len));
            flag(char_slice(s, 0, end).ends_with(search.as_str()))
        }
        "indexOf" => {
            let search = args.get_string(0)?;
            let from = clamp_index(args.get_opt_number(1, "from")?.unwrap_or(0.0), char_len(s));
            let found = tail_chars(s, from)
                .find(search.as_str())
                .map(|byte| from + s[byte_offset(s, from)..][..byte].chars().count());
            Ok(index_result(found))
        }
        "lastIndexOf" => {
            let search = args.get_string(0)?;
            let found = s.rfind(search.as_str()).map(|byte| s[..byte].chars().count());
            Ok(index_result(found))
        }
        "slice" => {
            let len = char_len(s);
            let start = relative_index(args.get_opt_number(0, "start")?.unwrap_or(0.0), len);
            let end = args
                .get_opt_number(1, "end")?
                .map_or(len, |n| relative_index(n, len));
            text(char_slice(s, start, end.max(start)).to_string())
        }
        "substring" => {
            let len = char_len(s);
            let start = clamp_index(args.get_number(0, "start")?, len);
            let end = args
                .get_opt_number(1, "end")?
                .map_or(len, |n| clamp_index(n, len));
            text(char_slice(s, start.min(end), start.max(end)).to_string())
        }
        "split" => split(s, args),
        "replace" => {
            let search = args.get_string(0)?;
            let replacement = args.get_string(1)?;
            text(s.replacen(search.as_str(), &replacement, 1))
        }
        "replaceAll" => {
            let search = args.get_string(0)?;
            let replacement = args.get_string(1)?;
            if search.is_empty() {
                return Err(args.invalid("Search string must not be empty"));
            }
            text(s.replace(search.as_str(), &replacement))
        }
        "repeat" => {
            let count = args.get_number(0, "count")?;
            if count < 0.0 || count.is_infinite() {
                return Err(args.invalid(format!("Invalid count value: {count}")));
            }
            let count = count as usize;
            let limit = ev.limits().max_string_length;
            if s.len().saturating_mul(count) > limit {
                return Err(ExpressionError::resource_limit(format!(
                    "repeat() result exceeds the string length limit of {limit}"
                )));
            }
            text(s.repeat(count))
        }
        "padStart" | "padEnd" => {
            let target = args.get_number(0, "length")?.max(0.0) as usize;
            let limit = ev.limits().max_string_length;
            if target > limit {
                return Err(ExpressionError::resource_limit(format!(
                    "{method}() target length exceeds the string length limit of {limit}"
                )));
            }
            let fill = if args.is_absent(1) {
                " ".to_string()
            } else {
                args.get_string(1)?
            };
            text(pad(s, target, &fill, method == "padStart"))
        }
        "charAt" => {
            let index = args.get_number(0, "index")?;
            let c = (index >= 0.0)
                .then(|| s.chars().nth(index as usize))
                .flatten();
            text(c.map(String::from).unwrap_or_default())
        }
        "at" => {
            let index = args.get_number(0, "index")?.trunc();
            let len = char_len(s);
            let resolved = if index < 0.0 { len as f64 + index } else { index };
            Ok(if resolved < 0.0 {
                RuntimeValue::Undefined
            } else {
                s.chars()
                    .nth(resolved as usize)
                    .map_or(RuntimeValue::Undefined, RuntimeValue::string)
            })
        }
        "concat" => {
            let mut out = s.to_string();
            for value in args.rest(0)? {
                out.push_str(&value.to_js_string());
            }
            text(out)
        }
        "isEmpty" => flag(s.is_empty()),
        "isNotEmpty" => flag(!s.is_empty()),
        "toNumber" => {
            let n = crate::value_utils::parse_numeric_string(s);
            if n.is_nan() {
                return Err(ExpressionError::type_error(format!(
                    "Cannot convert '{s}' to a number"
                )));
            }
            super::number(method, n)
        }
        "toTitleCase" => text(title_case(s)),
        "toDateTime" => datetime::parse_iso(s, ev.now().offset())
            .map(RuntimeValue::DateTime)
            .ok_or_else(|| args.invalid(format!("'{s}' is not an ISO-8601 date"))),
        _ => Err(ExpressionError::function_not_found(format!("string.{method}"))),
    }
}

fn split(s: &str, args: &CallArgs<'_>) -> ExpressionResult<RuntimeValue> {
    let limit = args
        .get_opt_number(1, "limit")?
        .map_or(usize::MAX, |n| n.max(0.0) as usize);
    let parts: Vec<Value> = if args.is_absent(0) {
        vec![Value::String(s.to_string())]
    } else {
        let separator = args.get_string(0)?;
        if separator.is_empty() {
            s.chars().map(|c| Value::String(c.to_string())).collect()
        } else {
            s.split(separator.as_str())
                .map(|part| Value::String(part.to_string()))
                .collect()
        }
    };
    Ok(RuntimeValue::Json(Value::Array(
        parts.into_iter().take(limit).collect(),
    )))
}

fn pad(s: &str, target: usize, fill: &str, at_start: bool) -> String {
    let len = char_len(s);
    if target <= len || fill.is_empty() {
        return s.to_string();
    }
    let padding: String = fill.chars().cycle().take(target - len).collect();
    if at_start {
        padding + s
    } else {
        format!("{s}{padding}")
    }
}

/// Capitalize the first letter of every whitespace-separated word
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut word_start = true;
    for c in s.chars() {
        if c.is_whitespace() {
            word_start = true;
            out.push(c);
        } else if word_start {
            word_start = false;
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

fn index_result(found: Option<usize>) -> RuntimeValue {
    RuntimeValue::Json(match found {
        Some(index) => Value::from(index),
        None => Value::from(-1),
    })
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Clamp a position into `0..=len`
fn clamp_index(n: f64, len: usize) -> usize {
    if n.is_nan() || n <= 0.0 {
        0
    } else {
        (n.trunc() as usize).min(len)
    }
}

fn byte_offset(s: &str, chars: usize) -> usize {
    s.char_indices().nth(chars).map_or(s.len(), |(i, _)| i)
}

fn char_slice(s: &str, start: usize, end: usize) -> &str {
    &s[byte_offset(s, start)..byte_offset(s, end)]
}

fn tail(s: &str, from: f64) -> &str {
    tail_chars(s, clamp_index(from, char_len(s)))
}

fn tail_chars(s: &str, from: usize) -> &str {
    &s[byte_offset(s, from)..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{Arg, Limits, Scope};
    use chrono::DateTime;
    use rstest::rstest;
    use serde_json::json;

    fn call(s: &str, method: &str, values: &[Value]) -> ExpressionResult<Value> {
        let scope = Scope::new(DateTime::parse_from_rfc3339("2024-01-01T00:00:00+02:00").unwrap());
        let limits = Limits {
            max_string_length: 100,
            ..Limits::default()
        };
        let mut ev = Evaluator::new(&scope, &limits);
        let args = CallArgs::new(
            method,
            values
                .iter()
                .map(|v| Arg::Value(RuntimeValue::Json(v.clone())))
                .collect(),
        );
        call_method(&mut ev, s, method, &args).map(RuntimeValue::into_json)
    }

    #[rstest]
    #[case("Hello", "toUpperCase", &[], json!("HELLO"))]
    #[case("  x ", "trimStart", &[], json!("x "))]
    #[case("hello", "includes", &[json!("ell")], json!(true))]
    #[case("hello", "includes", &[json!("he"), json!(1)], json!(false))]
    #[case("hello", "endsWith", &[json!("ll"), json!(4)], json!(true))]
    #[case("héllo wörld", "indexOf", &[json!("wö")], json!(6))]
    #[case("abcabc", "indexOf", &[json!("c"), json!(3)], json!(5))]
    #[case("abcabc", "lastIndexOf", &[json!("b")], json!(4))]
    #[case("abc", "indexOf", &[json!("z")], json!(-1))]
    #[case("hello", "slice", &[json!(-3)], json!("llo"))]
    #[case("hello", "slice", &[json!(1), json!(-1)], json!("ell"))]
    #[case("hello", "substring", &[json!(3), json!(1)], json!("el"))]
    #[case("a,b,c", "split", &[json!(",")], json!(["a", "b", "c"]))]
    #[case("a,b,c", "split", &[json!(","), json!(2)], json!(["a", "b"]))]
    #[case("abc", "split", &[json!("")], json!(["a", "b", "c"]))]
    #[case("aXbX", "replace", &[json!("X"), json!("-")], json!("a-bX"))]
    #[case("aXbX", "replaceAll", &[json!("X"), json!("-")], json!("a-b-"))]
    #[case("ab", "repeat", &[json!(3)], json!("ababab"))]
    #[case("5", "padStart", &[json!(3), json!("0")], json!("005"))]
    #[case("5", "padEnd", &[json!(4), json!("ab")], json!("5aba"))]
    #[case("héllo", "charAt", &[json!(1)], json!("é"))]
    #[case("hello", "at", &[json!(-1)], json!("o"))]
    #[case("a", "concat", &[json!("b"), json!(1)], json!("ab1"))]
    #[case("hello wORLD", "toTitleCase", &[], json!("Hello World"))]
    #[case(" 42 ", "toNumber", &[], json!(42))]
    #[case("", "isEmpty", &[], json!(true))]
    fn test_string_methods(
        #[case] s: &str,
        #[case] method: &str,
        #[case] values: &[Value],
        #[case] expected: Value,
    ) {
        assert_eq!(call(s, method, values).unwrap(), expected);
    }

    #[test]
    fn test_out_of_range() {
        assert_eq!(call("abc", "at", &[json!(5)]).unwrap(), Value::Null);
        assert_eq!(call("abc", "charAt", &[json!(5)]).unwrap(), json!(""));
    }

    #[test]
    fn test_repeat_respects_string_limit() {
        let err = call("abcdefghij", "repeat", &[json!(11)]).unwrap_err();
        assert_eq!(err.code(), "RESOURCE_LIMIT_EXCEEDED");
        let err = call("x", "repeat", &[json!(-1)]).unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT");
    }

    #[test]
    fn test_to_date_time_uses_clock_offset_for_naive_dates() {
        assert_eq!(
            call("2024-06-01", "toDateTime", &[]).unwrap(),
            json!("2024-06-01T00:00:00.000+02:00")
        );
        assert!(call("not a date", "toDateTime", &[]).is_err());
    }
}
