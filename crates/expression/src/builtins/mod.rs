//! Built-in functions, methods and properties
//!
//! Dispatch happens on the qualified name (`Math.max`, `$if`) for global and
//! namespace functions and on the receiver's runtime type for methods. Every
//! call is checked against the arity recorded in [`Registry::builtin`] before
//! it reaches the implementation, so the catalog and the runtime cannot drift
//! apart silently.

pub mod array;
pub mod conversion;
pub mod datetime;
pub mod math;
pub mod object;
pub mod query;
pub mod string;
pub mod workflow;

use crate::error::{ExpressionError, ExpressionResult};
use crate::eval::{Arg, Callback, Evaluator, Namespace, RuntimeValue};
use crate::registry::{EntryKind, MethodInfo, Registry};
use crate::value_utils::{self, number_value};
use serde_json::{Map, Value};

/// Call a global or namespace function by qualified name
pub fn call_function(
    ev: &mut Evaluator<'_>,
    name: &str,
    args: Vec<Arg<'_>>,
) -> ExpressionResult<RuntimeValue> {
    let info = Registry::builtin()
        .function(name)
        .filter(|info| info.kind == EntryKind::Function)
        .ok_or_else(|| ExpressionError::function_not_found(name))?;
    let args = CallArgs::checked(name, info, args)?;

    match name.split_once('.') {
        Some(("Math", function)) => math::call_namespace(function, &args),
        Some(("Object", function)) => object::call_namespace(function, &args),
        Some(("Array", function)) => array::call_namespace(ev, function, &args),
        Some(("Date" | "DateTime" | "Duration" | "Interval", _)) => {
            datetime::call_namespace(ev, name, &args)
        }
        Some(("String" | "Number" | "JSON", _)) => conversion::call(name, &args),
        _ => match name {
            "$jmespath" | "search" => query::call(name, &args),
            "$if" | "$isEmpty" | "$isNotEmpty" | "$ifEmpty" | "$min" | "$max" | "$" => {
                workflow::call(ev, name, &args)
            }
            _ => conversion::call(name, &args),
        },
    }
}

/// Call a method on a receiver
pub fn call_method(
    ev: &mut Evaluator<'_>,
    receiver: RuntimeValue,
    name: &str,
    args: Vec<Arg<'_>>,
) -> ExpressionResult<RuntimeValue> {
    let ty = receiver
        .value_type()
        .ok_or_else(|| ExpressionError::function_not_found(format!("{}.{name}", receiver.kind_name())))?;
    let info = Registry::builtin()
        .member(ty, name)
        .filter(|info| info.is_callable())
        .ok_or_else(|| ExpressionError::function_not_found(format!("{ty}.{name}")))?;
    let args = CallArgs::checked(name, info, args)?;

    match receiver {
        RuntimeValue::Json(Value::String(s)) => string::call_method(ev, &s, name, &args),
        RuntimeValue::Json(Value::Number(n)) => {
            math::call_method(value_utils::number_as_f64(&n), name, &args)
        }
        RuntimeValue::Json(Value::Bool(b)) => Ok(RuntimeValue::string(b.to_string())),
        RuntimeValue::Json(Value::Array(items)) => array::call_method(ev, items, name, &args),
        RuntimeValue::Json(Value::Object(map)) => object::call_method(map, name, &args),
        other => datetime::call_method(ev, other, name, &args),
    }
}

/// Whether `name` is a callable global or namespace function
pub fn has_function(name: &str) -> bool {
    Registry::builtin()
        .function(name)
        .is_some_and(|info| info.kind == EntryKind::Function)
}

/// Whether the receiver has a callable method `name`
pub fn has_method(receiver: &RuntimeValue, name: &str) -> bool {
    receiver.value_type().is_some_and(|ty| {
        Registry::builtin()
            .member(ty, name)
            .is_some_and(MethodInfo::is_callable)
    })
}

/// Read a non-index property (`length`, `year`, `start`, ...)
///
/// Unknown properties are `undefined`.
pub fn get_property(receiver: &RuntimeValue, name: &str) -> RuntimeValue {
    match (receiver, name) {
        (RuntimeValue::Json(Value::String(s)), "length") => {
            RuntimeValue::Json(Value::from(s.chars().count()))
        }
        (RuntimeValue::Json(Value::Array(items)), "length") => {
            RuntimeValue::Json(Value::from(items.len()))
        }
        (RuntimeValue::DateTime(_) | RuntimeValue::Interval(..), _) => {
            datetime::get_property(receiver, name).unwrap_or(RuntimeValue::Undefined)
        }
        _ => RuntimeValue::Undefined,
    }
}

/// Member of a namespace: a constant, a function reference or `undefined`
pub fn namespace_member(namespace: Namespace, name: &str) -> RuntimeValue {
    let qualified = format!("{}.{name}", namespace.name());
    let constant = match qualified.as_str() {
        "Math.PI" => Some(std::f64::consts::PI),
        "Math.E" => Some(std::f64::consts::E),
        "Number.MAX_SAFE_INTEGER" => Some(9_007_199_254_740_991.0),
        "Number.MIN_SAFE_INTEGER" => Some(-9_007_199_254_740_991.0),
        "Number.EPSILON" => Some(f64::EPSILON),
        _ => None,
    };
    match constant {
        Some(n) => number_value(n).map_or(RuntimeValue::Undefined, RuntimeValue::Json),
        None if has_function(&qualified) => RuntimeValue::Function(qualified),
        None => RuntimeValue::Undefined,
    }
}

/// Wrap a numeric result; `NaN` is a type error, infinities an evaluation error
pub(crate) fn number(function: &str, n: f64) -> ExpressionResult<RuntimeValue> {
    if n.is_nan() {
        return Err(ExpressionError::type_error(format!(
            "{function} produced NaN"
        )));
    }
    Ok(RuntimeValue::Json(number_value(n)?))
}

/// Arguments of one builtin call, with typed accessors
///
/// Accessors report failures as `INVALID_ARGUMENT` naming the function and
/// the parameter.
pub struct CallArgs<'n> {
    function: String,
    args: Vec<Arg<'n>>,
}

impl<'n> CallArgs<'n> {
    /// Wrap arguments without an arity check
    pub fn new(function: impl Into<String>, args: Vec<Arg<'n>>) -> Self {
        Self {
            function: function.into(),
            args,
        }
    }

    fn checked(function: &str, info: &MethodInfo, args: Vec<Arg<'n>>) -> ExpressionResult<Self> {
        if let Some(signature) = &info.signature {
            if !signature.accepts(args.len()) {
                return Err(ExpressionError::invalid_argument(
                    function,
                    format!(
                        "Expected {} arguments, got {}",
                        signature.expected_args(),
                        args.len()
                    ),
                ));
            }
        }
        Ok(Self::new(function, args))
    }

    /// Function name used in error messages
    pub fn function(&self) -> &str {
        &self.function
    }

    /// Number of arguments
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Whether no arguments were passed
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Build an invalid-argument error for this call
    pub fn invalid(&self, message: impl Into<String>) -> ExpressionError {
        ExpressionError::invalid_argument(self.function.clone(), message)
    }

    /// Argument value; missing arguments are `undefined`
    pub fn value(&self, index: usize) -> ExpressionResult<RuntimeValue> {
        match self.args.get(index) {
            None => Ok(RuntimeValue::Undefined),
            Some(Arg::Value(value)) => Ok(value.clone()),
            Some(Arg::Callback(_)) => Err(self.invalid(format!(
                "Argument {} cannot be an arrow function",
                index + 1
            ))),
        }
    }

    /// Whether the argument is missing or `undefined`
    pub fn is_absent(&self, index: usize) -> bool {
        matches!(
            self.args.get(index),
            None | Some(Arg::Value(RuntimeValue::Undefined))
        )
    }

    /// Argument converted to JSON
    pub fn json(&self, index: usize) -> ExpressionResult<Value> {
        Ok(self.value(index)?.into_json())
    }

    /// Every argument from `start` on
    pub fn rest(&self, start: usize) -> ExpressionResult<Vec<RuntimeValue>> {
        (start..self.len()).map(|i| self.value(i)).collect()
    }

    /// Argument coerced to a string
    pub fn get_string(&self, index: usize) -> ExpressionResult<String> {
        Ok(self.value(index)?.to_js_string())
    }

    /// Argument that must already be a string
    pub fn get_strict_string(&self, index: usize, arg_name: &str) -> ExpressionResult<String> {
        match self.value(index)? {
            RuntimeValue::Json(Value::String(s)) => Ok(s),
            other => Err(self.invalid(format!(
                "Argument '{arg_name}' must be a string, got {}",
                other.kind_name()
            ))),
        }
    }

    /// Argument coerced to a number; `NaN` is rejected
    pub fn get_number(&self, index: usize, arg_name: &str) -> ExpressionResult<f64> {
        let value = self.value(index)?;
        let n = value.to_number();
        if n.is_nan() {
            return Err(self.invalid(format!(
                "Argument '{arg_name}' must be a number, got {}",
                value.kind_name()
            )));
        }
        Ok(n)
    }

    /// Optional numeric argument
    pub fn get_opt_number(&self, index: usize, arg_name: &str) -> ExpressionResult<Option<f64>> {
        if self.is_absent(index) {
            return Ok(None);
        }
        self.get_number(index, arg_name).map(Some)
    }

    /// Optional integer argument, truncated toward zero (saturating)
    pub fn get_opt_int(&self, index: usize, arg_name: &str) -> ExpressionResult<Option<i64>> {
        Ok(self.get_opt_number(index, arg_name)?.map(|n| n as i64))
    }

    /// Argument that must be an array
    pub fn get_array(&self, index: usize, arg_name: &str) -> ExpressionResult<Vec<Value>> {
        match self.value(index)? {
            RuntimeValue::Json(Value::Array(items)) => Ok(items),
            other => Err(self.invalid(format!(
                "Argument '{arg_name}' must be an array, got {}",
                other.kind_name()
            ))),
        }
    }

    /// Argument that must be an object
    pub fn get_object(&self, index: usize, arg_name: &str) -> ExpressionResult<Map<String, Value>> {
        match self.value(index)? {
            RuntimeValue::Json(Value::Object(map)) => Ok(map),
            other => Err(self.invalid(format!(
                "Argument '{arg_name}' must be an object, got {}",
                other.kind_name()
            ))),
        }
    }

    /// Argument that must be an arrow function
    pub fn get_callback(&self, index: usize, arg_name: &str) -> ExpressionResult<Callback<'n>> {
        match self.args.get(index) {
            Some(Arg::Callback(callback)) => Ok(*callback),
            Some(Arg::Value(value)) => Err(self.invalid(format!(
                "Argument '{arg_name}' must be an arrow function, got {}",
                value.kind_name()
            ))),
            None => Err(self.invalid(format!(
                "Missing argument '{arg_name}' at position {index}"
            ))),
        }
    }

    /// Optional arrow function argument
    pub fn get_opt_callback(&self, index: usize, arg_name: &str) -> ExpressionResult<Option<Callback<'n>>> {
        if self.is_absent(index) {
            return Ok(None);
        }
        self.get_callback(index, arg_name).map(Some)
    }
}

/// Resolve a possibly negative index against a length (`at(-1)`, `slice(-2)`)
pub(crate) fn relative_index(index: f64, len: usize) -> usize {
    let len_f = len as f64;
    let resolved = if index < 0.0 {
        (len_f + index.trunc()).max(0.0)
    } else {
        index.trunc().min(len_f)
    };
    resolved as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{Limits, Scope};
    use crate::registry::ValueType;
    use chrono::DateTime;
    use serde_json::json;

    fn scope() -> Scope {
        let now = DateTime::parse_from_rfc3339("2024-03-15T10:30:00+00:00").unwrap();
        Scope::new(now)
    }

    fn sample(ty: ValueType, now: chrono::DateTime<chrono::FixedOffset>) -> RuntimeValue {
        match ty {
            ValueType::String => RuntimeValue::string("hello"),
            ValueType::Number => RuntimeValue::Json(json!(4)),
            ValueType::Boolean => RuntimeValue::bool(true),
            ValueType::Array => RuntimeValue::Json(json!([3, 1, 2])),
            ValueType::Object => RuntimeValue::Json(json!({"a": 1})),
            ValueType::DateTime => RuntimeValue::DateTime(now),
            ValueType::Duration => RuntimeValue::Duration(chrono::TimeDelta::minutes(5)),
            ValueType::Interval => RuntimeValue::Interval(now, now + chrono::TimeDelta::hours(1)),
        }
    }

    #[test]
    fn test_every_cataloged_member_is_implemented() {
        let scope = scope();
        let limits = Limits::default();
        let registry = Registry::builtin();

        for ty in ValueType::ALL {
            for info in registry.members(ty) {
                let receiver = sample(ty, scope.now());
                if info.kind == EntryKind::Property {
                    assert_ne!(
                        get_property(&receiver, &info.name),
                        RuntimeValue::Undefined,
                        "{ty}.{}",
                        info.name
                    );
                    continue;
                }
                let Some(signature) = &info.signature else {
                    continue;
                };
                let args = (0..signature.min_args)
                    .map(|_| Arg::Value(RuntimeValue::Json(json!(1))))
                    .collect();
                let mut ev = Evaluator::new(&scope, &limits);
                if let Err(err) = call_method(&mut ev, receiver, &info.name, args) {
                    assert_ne!(err.code(), "UNKNOWN_FUNCTION", "{ty}.{}: {err}", info.name);
                }
            }
        }
    }

    #[test]
    fn test_every_cataloged_function_is_implemented() {
        let scope = scope();
        let limits = Limits::default();
        for info in Registry::builtin().functions() {
            let Some(signature) = &info.signature else {
                continue;
            };
            let args = (0..signature.min_args)
                .map(|_| Arg::Value(RuntimeValue::Json(json!(1))))
                .collect();
            let mut ev = Evaluator::new(&scope, &limits);
            if let Err(err) = call_function(&mut ev, &info.name, args) {
                assert_ne!(err.code(), "UNKNOWN_FUNCTION", "{}: {err}", info.name);
            }
        }
    }

    #[test]
    fn test_arity_is_checked() {
        let scope = scope();
        let limits = Limits::default();
        let mut ev = Evaluator::new(&scope, &limits);
        let err = call_function(&mut ev, "$if", vec![Arg::Value(RuntimeValue::bool(true))]).unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT");
        assert_eq!(
            err.to_string(),
            "Invalid argument for $if: Expected 2 to 3 arguments, got 1"
        );
    }

    #[test]
    fn test_unknown_names() {
        let scope = scope();
        let limits = Limits::default();
        let mut ev = Evaluator::new(&scope, &limits);
        let err = call_function(&mut ev, "Math.nope", Vec::new()).unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_FUNCTION");
        let err = call_method(&mut ev, RuntimeValue::string("x"), "nope", Vec::new()).unwrap_err();
        assert_eq!(err.to_string(), "string.nope is not a function");
        // namespaces are not callable functions
        assert!(call_function(&mut ev, "Math", Vec::new()).is_err());
    }

    #[test]
    fn test_namespace_members() {
        assert_eq!(
            namespace_member(Namespace::Math, "max"),
            RuntimeValue::Function("Math.max".to_string())
        );
        assert_eq!(namespace_member(Namespace::Math, "PI").to_number(), std::f64::consts::PI);
        assert_eq!(namespace_member(Namespace::Math, "nope"), RuntimeValue::Undefined);
    }

    #[test]
    fn test_get_number_rejects_nan() {
        let args = CallArgs::new("test_func", vec![Arg::Value(RuntimeValue::string("abc"))]);
        let err = args.get_number(0, "value").unwrap_err();
        assert!(err.to_string().contains("Argument 'value' must be a number"));
    }

    #[test]
    fn test_relative_index() {
        assert_eq!(relative_index(-1.0, 5), 4);
        assert_eq!(relative_index(-10.0, 5), 0);
        assert_eq!(relative_index(10.0, 5), 5);
        assert_eq!(relative_index(2.7, 5), 2);
    }
}
