//! Workflow helpers: `$if`, `$isEmpty`, `$ifEmpty`, `$min`, `$max` and `$()`

use super::{CallArgs, number};
use crate::error::{ExpressionError, ExpressionResult};
use crate::eval::{Evaluator, RuntimeValue};
use crate::value_utils::is_empty_value;
use serde_json::Value;

/// Call a `$` helper by name
pub fn call(
    ev: &mut Evaluator<'_>,
    name: &str,
    args: &CallArgs<'_>,
) -> ExpressionResult<RuntimeValue> {
    match name {
        "$if" => {
            if args.value(0)?.is_truthy() {
                args.value(1)
            } else {
                args.value(2)
            }
        }
        "$isEmpty" => Ok(RuntimeValue::bool(is_empty(&args.value(0)?))),
        "$isNotEmpty" => Ok(RuntimeValue::bool(!is_empty(&args.value(0)?))),
        "$ifEmpty" => {
            let value = args.value(0)?;
            if is_empty(&value) { args.value(1) } else { Ok(value) }
        }
        "$min" | "$max" => {
            let mut acc = args.get_number(0, "value")?;
            for i in 1..args.len() {
                let n = args.get_number(i, "value")?;
                acc = if name == "$min" { acc.min(n) } else { acc.max(n) };
            }
            number(name, acc)
        }
        "$" => node_output(ev, &args.get_string(0)?),
        _ => Err(ExpressionError::function_not_found(name)),
    }
}

/// Nullish values and empty strings, arrays and objects
fn is_empty(value: &RuntimeValue) -> bool {
    match value {
        RuntimeValue::Undefined => true,
        RuntimeValue::Json(json) => is_empty_value(json),
        _ => false,
    }
}

/// `$("Node")` reads the named entry of `$node`
fn node_output(ev: &Evaluator<'_>, node: &str) -> ExpressionResult<RuntimeValue> {
    match ev.scope().get("$node") {
        Some(RuntimeValue::Json(Value::Object(nodes))) => nodes
            .get(node)
            .cloned()
            .map(RuntimeValue::Json)
            .ok_or_else(|| ExpressionError::variable_not_found(format!("$('{node}')"))),
        _ => Err(ExpressionError::variable_not_found(format!("$('{node}')"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{Limits, Namespace, Scope};
    use crate::parser::parse_expression;
    use chrono::DateTime;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    fn scope() -> Scope {
        let now = DateTime::parse_from_rfc3339("2024-03-15T10:30:00+00:00").unwrap();
        let mut scope = Scope::new(now);
        scope.insert(
            "$json",
            RuntimeValue::Json(json!({"name": "", "tags": [], "count": 0, "user": {"id": 7}})),
        );
        scope.insert(
            "$node",
            RuntimeValue::Json(json!({"Fetch": {"json": {"status": 200}}})),
        );
        for function in ["$if", "$isEmpty", "$isNotEmpty", "$ifEmpty", "$min", "$max", "$"] {
            scope.insert(function, RuntimeValue::Function(function.to_string()));
        }
        scope.insert("DateTime", RuntimeValue::Namespace(Namespace::DateTime));
        scope
    }

    fn eval(source: &str) -> ExpressionResult<Value> {
        let scope = scope();
        let limits = Limits::default();
        let ast = parse_expression(source)?;
        Ok(Evaluator::new(&scope, &limits).evaluate(&ast)?.into_json())
    }

    #[rstest]
    #[case("$if($json.count > 0, 'some', 'none')", json!("none"))]
    #[case("$if(true, 1)", json!(1))]
    #[case("$if(false, 1)", Value::Null)]
    #[case("$isEmpty($json.name)", json!(true))]
    #[case("$isEmpty($json.tags)", json!(true))]
    #[case("$isEmpty($json.missing)", json!(true))]
    #[case("$isEmpty($json.count)", json!(false))]
    #[case("$isEmpty(DateTime.now())", json!(false))]
    #[case("$isNotEmpty($json.user)", json!(true))]
    #[case("$ifEmpty($json.name, 'anonymous')", json!("anonymous"))]
    #[case("$ifEmpty($json.user.id, 0)", json!(7))]
    #[case("$min(4, '2', 9)", json!(2))]
    #[case("$max(4, 2.5, 9)", json!(9))]
    #[case("$('Fetch').json.status", json!(200))]
    fn test_workflow_helpers(#[case] source: &str, #[case] expected: Value) {
        assert_eq!(eval(source).unwrap(), expected);
    }

    #[test]
    fn test_missing_node() {
        let err = eval("$('Nope')").unwrap_err();
        assert_eq!(err.code(), "UNDEFINED_VARIABLE");
        assert_eq!(err.to_string(), "$('Nope') is not defined");
    }

    #[test]
    fn test_min_rejects_non_numbers() {
        let err = eval("$min(1, 'x')").unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT");
    }
}
