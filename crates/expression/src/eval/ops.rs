//! Operator semantics
//!
//! JavaScript coercion rules over [`RuntimeValue`], except that division by
//! zero and non-finite results are errors instead of `Infinity`/`NaN`.

use super::value::RuntimeValue;
use crate::core::ast::{BinaryOperator, UnaryOperator};
use crate::error::{ExpressionError, ExpressionResult};
use crate::value_utils::{loose_equals, number_value, strict_equals};
use serde_json::Value;
use std::cmp::Ordering;

/// Apply a non-short-circuiting binary operator
pub fn binary(
    op: BinaryOperator,
    left: &RuntimeValue,
    right: &RuntimeValue,
) -> ExpressionResult<RuntimeValue> {
    match op {
        BinaryOperator::Add => add(left, right),
        BinaryOperator::Subtract
        | BinaryOperator::Multiply
        | BinaryOperator::Divide
        | BinaryOperator::Modulo
        | BinaryOperator::Power => arithmetic(op, left.to_number(), right.to_number()),
        BinaryOperator::Equal => Ok(RuntimeValue::bool(equals(left, right, false))),
        BinaryOperator::NotEqual => Ok(RuntimeValue::bool(!equals(left, right, false))),
        BinaryOperator::StrictEqual => Ok(RuntimeValue::bool(equals(left, right, true))),
        BinaryOperator::StrictNotEqual => Ok(RuntimeValue::bool(!equals(left, right, true))),
        BinaryOperator::LessThan => Ok(RuntimeValue::bool(compare(left, right) == Some(Ordering::Less))),
        BinaryOperator::LessEqual => Ok(RuntimeValue::bool(matches!(
            compare(left, right),
            Some(Ordering::Less | Ordering::Equal)
        ))),
        BinaryOperator::GreaterThan => Ok(RuntimeValue::bool(
            compare(left, right) == Some(Ordering::Greater),
        )),
        BinaryOperator::GreaterEqual => Ok(RuntimeValue::bool(matches!(
            compare(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        ))),
        BinaryOperator::And | BinaryOperator::Or | BinaryOperator::Nullish => Err(
            ExpressionError::internal(format!("'{op}' must be evaluated lazily")),
        ),
    }
}

/// Apply a unary operator other than `typeof`
pub fn unary(op: UnaryOperator, value: &RuntimeValue) -> ExpressionResult<RuntimeValue> {
    match op {
        UnaryOperator::Not => Ok(RuntimeValue::bool(!value.is_truthy())),
        UnaryOperator::Negate => number(-value.to_number(), "-", value),
        UnaryOperator::Plus => number(value.to_number(), "+", value),
        UnaryOperator::Typeof => Ok(RuntimeValue::string(value.type_of())),
    }
}

/// `==` (`strict == false`) and `===`
pub fn equals(left: &RuntimeValue, right: &RuntimeValue, strict: bool) -> bool {
    use RuntimeValue as V;
    match (left, right) {
        (V::Undefined, V::Undefined) => true,
        (V::Undefined, V::Json(Value::Null)) | (V::Json(Value::Null), V::Undefined) => !strict,
        (V::Json(a), V::Json(b)) => {
            if strict {
                strict_equals(a, b)
            } else {
                loose_equals(a, b)
            }
        }
        (V::DateTime(a), V::DateTime(b)) => a == b,
        (V::Duration(a), V::Duration(b)) => a == b,
        (V::Interval(a1, a2), V::Interval(b1, b2)) => a1 == b1 && a2 == b2,
        (V::Namespace(a), V::Namespace(b)) => a == b,
        (V::Function(a), V::Function(b)) => a == b,
        _ => false,
    }
}

/// Ordering used by relational operators; `None` when incomparable
pub fn compare(left: &RuntimeValue, right: &RuntimeValue) -> Option<Ordering> {
    match (left, right) {
        (RuntimeValue::DateTime(a), RuntimeValue::DateTime(b)) => Some(a.cmp(b)),
        (RuntimeValue::Duration(a), RuntimeValue::Duration(b)) => Some(a.cmp(b)),
        (RuntimeValue::Json(Value::String(a)), RuntimeValue::Json(Value::String(b))) => {
            Some(a.cmp(b))
        }
        _ => left.to_number().partial_cmp(&right.to_number()),
    }
}

fn add(left: &RuntimeValue, right: &RuntimeValue) -> ExpressionResult<RuntimeValue> {
    if concatenates(left) || concatenates(right) {
        let mut out = left.to_js_string();
        out.push_str(&right.to_js_string());
        return Ok(RuntimeValue::string(out));
    }
    arithmetic(BinaryOperator::Add, left.to_number(), right.to_number())
}

/// Operands whose primitive form is a string
fn concatenates(value: &RuntimeValue) -> bool {
    matches!(
        value,
        RuntimeValue::Json(Value::String(_) | Value::Array(_) | Value::Object(_))
            | RuntimeValue::Interval(..)
            | RuntimeValue::Namespace(_)
            | RuntimeValue::Function(_)
    )
}

fn arithmetic(op: BinaryOperator, l: f64, r: f64) -> ExpressionResult<RuntimeValue> {
    let result = match op {
        BinaryOperator::Add => l + r,
        BinaryOperator::Subtract => l - r,
        BinaryOperator::Multiply => l * r,
        BinaryOperator::Divide | BinaryOperator::Modulo if r == 0.0 => {
            return Err(ExpressionError::DivisionByZero);
        }
        BinaryOperator::Divide => l / r,
        BinaryOperator::Modulo => l % r,
        BinaryOperator::Power => l.powf(r),
        other => {
            return Err(ExpressionError::internal(format!(
                "'{other}' is not an arithmetic operator"
            )));
        }
    };
    if result.is_nan() {
        return Err(ExpressionError::type_error(format!(
            "'{op}' produced NaN from {l} and {r}"
        )));
    }
    Ok(RuntimeValue::Json(number_value(result)?))
}

fn number(n: f64, op: &str, operand: &RuntimeValue) -> ExpressionResult<RuntimeValue> {
    if n.is_nan() {
        return Err(ExpressionError::type_error(format!(
            "Unary '{op}' cannot convert {} to a number",
            operand.kind_name()
        )));
    }
    Ok(RuntimeValue::Json(number_value(n)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn v(value: Value) -> RuntimeValue {
        RuntimeValue::Json(value)
    }

    #[rstest]
    #[case(json!(1), json!(1), json!(2))]
    #[case(json!("a"), json!(1), json!("a1"))]
    #[case(json!(1), json!("a"), json!("1a"))]
    #[case(json!(true), json!(1), json!(2))]
    #[case(json!([1, 2]), json!("x"), json!("1,2x"))]
    #[case(json!(0.1), json!(0.2), json!(0.30000000000000004))]
    fn test_add(#[case] l: Value, #[case] r: Value, #[case] expected: Value) {
        assert_eq!(binary(BinaryOperator::Add, &v(l), &v(r)).unwrap(), v(expected));
    }

    #[test]
    fn test_division_by_zero() {
        let err = binary(BinaryOperator::Divide, &v(json!(1)), &v(json!(0))).unwrap_err();
        assert_eq!(err.code(), "DIVISION_BY_ZERO");
        let err = binary(BinaryOperator::Modulo, &v(json!(1)), &v(json!(0))).unwrap_err();
        assert_eq!(err.code(), "DIVISION_BY_ZERO");
    }

    #[test]
    fn test_nan_is_an_error() {
        let err = binary(BinaryOperator::Multiply, &v(json!("abc")), &v(json!(2))).unwrap_err();
        assert_eq!(err.code(), "TYPE_ERROR");
        assert!(binary(BinaryOperator::Add, &RuntimeValue::Undefined, &v(json!(1))).is_err());
    }

    #[test]
    fn test_equality() {
        assert!(equals(&RuntimeValue::Undefined, &RuntimeValue::NULL, false));
        assert!(!equals(&RuntimeValue::Undefined, &RuntimeValue::NULL, true));
        assert!(equals(&v(json!("1")), &v(json!(1)), false));
        assert!(!equals(&v(json!("1")), &v(json!(1)), true));
    }

    #[test]
    fn test_compare() {
        assert_eq!(compare(&v(json!("a")), &v(json!("b"))), Some(Ordering::Less));
        assert_eq!(compare(&v(json!(2)), &v(json!("10"))), Some(Ordering::Less));
        assert_eq!(compare(&v(json!("x")), &v(json!(1))), None);
    }

    #[test]
    fn test_unary() {
        assert_eq!(unary(UnaryOperator::Negate, &v(json!("5"))).unwrap(), v(json!(-5)));
        assert_eq!(unary(UnaryOperator::Not, &v(json!(""))).unwrap(), v(json!(true)));
        assert_eq!(
            unary(UnaryOperator::Typeof, &RuntimeValue::Undefined).unwrap(),
            v(json!("undefined"))
        );
    }
}
