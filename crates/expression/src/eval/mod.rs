//! AST evaluation module
//!
//! A tree-walking interpreter over [`AstNode`]. Only the node kinds matched
//! here can execute. Every node evaluation consumes one step of a budget and
//! the wall-clock deadline is checked every [`DEADLINE_CHECK_INTERVAL`] steps,
//! so a runaway expression is stopped mid-flight.

pub mod ops;
pub mod value;

pub use value::{Namespace, RuntimeValue};

use crate::builtins;
use crate::context::FORBIDDEN_KEYS;
use crate::core::ast::{AstNode, BinaryOperator, NodeKind, TemplatePart, UnaryOperator};
use crate::error::{ExpressionError, ExpressionResult};
use crate::value_utils::number_value;
use chrono::{DateTime, FixedOffset};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::trace;

/// How often, in steps, the deadline is checked
pub const DEADLINE_CHECK_INTERVAL: u64 = 64;

/// Execution ceilings for a single evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Node evaluations allowed
    pub max_steps: u64,
    /// Wall-clock budget
    pub timeout: Duration,
    /// Maximum evaluation nesting, callbacks included
    pub max_call_stack: usize,
    /// Longest array a builtin or literal may produce
    pub max_array_length: usize,
    /// Most properties an object may have
    pub max_object_properties: usize,
    /// Longest string, in bytes
    pub max_string_length: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_steps: 100_000,
            timeout: Duration::from_millis(1_000),
            max_call_stack: 256,
            max_array_length: 10_000,
            max_object_properties: 1_000,
            max_string_length: 1_000_000,
        }
    }
}

/// Names visible to an expression
#[derive(Debug, Clone)]
pub struct Scope {
    bindings: HashMap<String, RuntimeValue>,
    now: DateTime<FixedOffset>,
}

impl Scope {
    /// Empty scope with a fixed clock
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self {
            bindings: HashMap::new(),
            now,
        }
    }

    /// Bind a name
    pub fn insert(&mut self, name: impl Into<String>, value: RuntimeValue) {
        self.bindings.insert(name.into(), value);
    }

    /// Look up a name
    pub fn get(&self, name: &str) -> Option<&RuntimeValue> {
        self.bindings.get(name)
    }

    /// Whether a name is bound
    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Bound names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.bindings.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// The clock behind `$now`, `DateTime.now()` and `Date.now()`
    pub fn now(&self) -> DateTime<FixedOffset> {
        self.now
    }
}

/// Arrow function passed to a builtin
#[derive(Debug, Clone, Copy)]
pub struct Callback<'n> {
    /// Parameter names
    pub params: &'n [String],
    /// Expression body
    pub body: &'n AstNode,
}

/// An evaluated call argument
#[derive(Debug, Clone)]
pub enum Arg<'n> {
    /// Plain value
    Value(RuntimeValue),
    /// Arrow function, evaluated lazily by the callee
    Callback(Callback<'n>),
}

/// Evaluator for expression ASTs
///
/// One evaluator runs one expression; the step counter and deadline are not
/// reset between calls to [`Evaluator::evaluate`].
pub struct Evaluator<'s> {
    scope: &'s Scope,
    limits: &'s Limits,
    started: Instant,
    steps: u64,
    depth: usize,
    frames: Vec<Vec<(String, RuntimeValue)>>,
}

impl<'s> Evaluator<'s> {
    /// Create an evaluator; the deadline starts now
    pub fn new(scope: &'s Scope, limits: &'s Limits) -> Self {
        Self {
            scope,
            limits,
            started: Instant::now(),
            steps: 0,
            depth: 0,
            frames: Vec::new(),
        }
    }

    /// Evaluate an expression
    pub fn evaluate(&mut self, node: &AstNode) -> ExpressionResult<RuntimeValue> {
        let result = self.eval(node);
        trace!(steps = self.steps, ok = result.is_ok(), "Evaluated expression");
        result
    }

    /// Steps consumed so far
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Time since the evaluator was created
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Clock for date/time builtins
    pub fn now(&self) -> DateTime<FixedOffset> {
        self.scope.now()
    }

    /// Active limits
    pub fn limits(&self) -> &Limits {
        self.limits
    }

    /// Bindings the expression runs against
    pub fn scope(&self) -> &Scope {
        self.scope
    }

    /// Invoke an arrow function with positional arguments
    ///
    /// Missing arguments are `undefined`; extra ones are ignored.
    pub fn call_callback(
        &mut self,
        callback: &Callback<'_>,
        args: &[RuntimeValue],
    ) -> ExpressionResult<RuntimeValue> {
        let frame = callback
            .params
            .iter()
            .enumerate()
            .map(|(i, name)| {
                (
                    name.clone(),
                    args.get(i).cloned().unwrap_or(RuntimeValue::Undefined),
                )
            })
            .collect();
        self.frames.push(frame);
        let result = self.eval(callback.body);
        self.frames.pop();
        result
    }

    /// Reject values above the configured size ceilings
    pub fn check_size(&self, value: &RuntimeValue) -> ExpressionResult<()> {
        match value {
            RuntimeValue::Json(Value::Array(items)) if items.len() > self.limits.max_array_length => {
                Err(ExpressionError::resource_limit(format!(
                    "Array length {} exceeds the limit of {}",
                    items.len(),
                    self.limits.max_array_length
                )))
            }
            RuntimeValue::Json(Value::Object(map)) if map.len() > self.limits.max_object_properties => {
                Err(ExpressionError::resource_limit(format!(
                    "Object with {} properties exceeds the limit of {}",
                    map.len(),
                    self.limits.max_object_properties
                )))
            }
            RuntimeValue::Json(Value::String(s)) if s.len() > self.limits.max_string_length => {
                Err(ExpressionError::resource_limit(format!(
                    "String length {} exceeds the limit of {}",
                    s.len(),
                    self.limits.max_string_length
                )))
            }
            _ => Ok(()),
        }
    }

    // ==================== Core walk ====================

    fn eval(&mut self, node: &AstNode) -> ExpressionResult<RuntimeValue> {
        self.enter()?;
        let result = self.eval_node(node);
        self.depth -= 1;
        result
    }

    fn enter(&mut self) -> ExpressionResult<()> {
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            return Err(ExpressionError::StepBudget {
                limit: self.limits.max_steps,
            });
        }
        if self.steps % DEADLINE_CHECK_INTERVAL == 0 {
            self.check_deadline()?;
        }
        if self.depth >= self.limits.max_call_stack {
            return Err(ExpressionError::resource_limit(format!(
                "Maximum call stack size exceeded ({})",
                self.limits.max_call_stack
            )));
        }
        self.depth += 1;
        Ok(())
    }

    /// Fail when the wall-clock budget is spent
    pub fn check_deadline(&self) -> ExpressionResult<()> {
        let elapsed = self.started.elapsed();
        if elapsed > self.limits.timeout {
            return Err(ExpressionError::Timeout {
                elapsed_ms: elapsed.as_millis() as u64,
                limit_ms: self.limits.timeout.as_millis() as u64,
            });
        }
        Ok(())
    }

    fn eval_node(&mut self, node: &AstNode) -> ExpressionResult<RuntimeValue> {
        match &node.kind {
            NodeKind::Program { body } => {
                let mut last = RuntimeValue::Undefined;
                for statement in body {
                    last = self.eval(statement)?;
                }
                Ok(last)
            }
            NodeKind::Template { parts } => self.eval_template(parts),
            NodeKind::Expression { expression } | NodeKind::ExpressionStatement { expression } => {
                self.eval(expression)
            }
            NodeKind::StringLiteral { value } => Ok(RuntimeValue::string(value.clone())),
            NodeKind::NumericLiteral { value } => Ok(RuntimeValue::Json(number_value(*value)?)),
            NodeKind::BooleanLiteral { value } => Ok(RuntimeValue::bool(*value)),
            NodeKind::NullLiteral => Ok(RuntimeValue::NULL),
            NodeKind::Identifier { name } => self.lookup(name),
            NodeKind::MemberExpression { .. } | NodeKind::CallExpression { .. } => {
                Ok(self.eval_chain(node)?.unwrap_or(RuntimeValue::Undefined))
            }
            NodeKind::ArrayExpression { elements } => {
                let mut items = Vec::with_capacity(elements.len());
                for element in elements {
                    items.push(self.eval(element)?.into_json());
                }
                self.sized(RuntimeValue::Json(Value::Array(items)))
            }
            NodeKind::ObjectExpression { properties } => {
                let mut map = Map::with_capacity(properties.len());
                for property in properties {
                    if FORBIDDEN_KEYS.contains(&property.key.as_str()) {
                        return Err(ExpressionError::security(format!(
                            "Object key '{}' is not allowed",
                            property.key
                        )));
                    }
                    let value = self.eval(&property.value)?.into_json();
                    map.insert(property.key.clone(), value);
                }
                self.sized(RuntimeValue::Json(Value::Object(map)))
            }
            NodeKind::BinaryExpression {
                operator,
                left,
                right,
            } => self.eval_binary(*operator, left, right),
            NodeKind::UnaryExpression { operator, argument } => {
                if *operator == UnaryOperator::Typeof {
                    if let Some(name) = argument.as_identifier() {
                        if self.resolve(name).is_none() {
                            return Ok(RuntimeValue::string("undefined"));
                        }
                    }
                }
                let value = self.eval(argument)?;
                ops::unary(*operator, &value)
            }
            NodeKind::ConditionalExpression {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test)?.is_truthy() {
                    self.eval(consequent)
                } else {
                    self.eval(alternate)
                }
            }
            NodeKind::ArrowFunctionExpression { .. } => Err(ExpressionError::type_error(
                "Arrow functions can only be passed as call arguments",
            )),
        }
    }

    fn eval_template(&mut self, parts: &[TemplatePart]) -> ExpressionResult<RuntimeValue> {
        let mut out = String::new();
        for part in parts {
            match part {
                TemplatePart::TemplateText { value, .. } => out.push_str(value),
                TemplatePart::TemplateExpression { expression } => {
                    out.push_str(&self.eval(expression)?.to_template_string());
                }
            }
        }
        self.sized(RuntimeValue::string(out))
    }

    fn eval_binary(
        &mut self,
        op: BinaryOperator,
        left: &AstNode,
        right: &AstNode,
    ) -> ExpressionResult<RuntimeValue> {
        let left = self.eval(left)?;
        match op {
            BinaryOperator::And if !left.is_truthy() => Ok(left),
            BinaryOperator::Or if left.is_truthy() => Ok(left),
            BinaryOperator::Nullish if !left.is_nullish() => Ok(left),
            BinaryOperator::And | BinaryOperator::Or | BinaryOperator::Nullish => self.eval(right),
            _ => {
                let right = self.eval(right)?;
                let result = ops::binary(op, &left, &right)?;
                self.sized(result)
            }
        }
    }

    // ==================== Names ====================

    fn resolve(&self, name: &str) -> Option<RuntimeValue> {
        for frame in self.frames.iter().rev() {
            if let Some((_, value)) = frame.iter().find(|(n, _)| n == name) {
                return Some(value.clone());
            }
        }
        if let Some(value) = self.scope.get(name) {
            return Some(value.clone());
        }
        (name == "undefined").then_some(RuntimeValue::Undefined)
    }

    fn lookup(&self, name: &str) -> ExpressionResult<RuntimeValue> {
        self.resolve(name)
            .ok_or_else(|| ExpressionError::variable_not_found(name))
    }

    // ==================== Member access and calls ====================

    /// Evaluate a member/call chain; `None` when an optional link short-circuits
    fn eval_chain(&mut self, node: &AstNode) -> ExpressionResult<Option<RuntimeValue>> {
        match &node.kind {
            NodeKind::MemberExpression {
                object,
                property,
                computed,
                optional,
            } => {
                let Some(object) = self.chain_link(object)? else {
                    return Ok(None);
                };
                if *optional && object.is_nullish() {
                    return Ok(None);
                }
                let key = self.property_key(property, *computed)?;
                self.get_member(&object, &key).map(Some)
            }
            NodeKind::CallExpression {
                callee,
                arguments,
                optional,
            } => self.eval_call(callee, arguments, *optional),
            _ => self.eval(node).map(Some),
        }
    }

    fn chain_link(&mut self, node: &AstNode) -> ExpressionResult<Option<RuntimeValue>> {
        if matches!(
            node.kind,
            NodeKind::MemberExpression { .. } | NodeKind::CallExpression { .. }
        ) {
            self.enter()?;
            let result = self.eval_chain(node);
            self.depth -= 1;
            result
        } else {
            self.eval(node).map(Some)
        }
    }

    fn property_key(&mut self, property: &AstNode, computed: bool) -> ExpressionResult<RuntimeValue> {
        if computed {
            return self.eval(property);
        }
        match property.as_identifier() {
            Some(name) => Ok(RuntimeValue::string(name)),
            None => Err(ExpressionError::internal("Non-computed property is not an identifier")),
        }
    }

    fn get_member(&self, object: &RuntimeValue, key: &RuntimeValue) -> ExpressionResult<RuntimeValue> {
        let name = key.to_js_string();
        if FORBIDDEN_KEYS.contains(&name.as_str()) {
            return Err(ExpressionError::security(format!(
                "Access to '{name}' is not allowed"
            )));
        }
        if object.is_nullish() {
            return Err(ExpressionError::type_error(format!(
                "Cannot read properties of {} (reading '{name}')",
                object.kind_name()
            )));
        }

        Ok(match object {
            RuntimeValue::Json(Value::Object(map)) => map
                .get(&name)
                .cloned()
                .map_or(RuntimeValue::Undefined, RuntimeValue::Json),
            RuntimeValue::Json(Value::Array(items)) => match array_index(key) {
                Some(index) => items
                    .get(index)
                    .cloned()
                    .map_or(RuntimeValue::Undefined, RuntimeValue::Json),
                None => builtins::get_property(object, &name),
            },
            RuntimeValue::Json(Value::String(s)) => match array_index(key) {
                Some(index) => s
                    .chars()
                    .nth(index)
                    .map_or(RuntimeValue::Undefined, |c| RuntimeValue::string(c)),
                None => builtins::get_property(object, &name),
            },
            RuntimeValue::Namespace(namespace) => builtins::namespace_member(*namespace, &name),
            _ => builtins::get_property(object, &name),
        })
    }

    fn eval_call(
        &mut self,
        callee: &AstNode,
        arguments: &[AstNode],
        optional: bool,
    ) -> ExpressionResult<Option<RuntimeValue>> {
        // `receiver.method(args)` dispatches on the receiver's runtime type
        if let NodeKind::MemberExpression {
            object,
            property,
            computed,
            optional: optional_member,
        } = &callee.kind
        {
            let Some(receiver) = self.chain_link(object)? else {
                return Ok(None);
            };
            if *optional_member && receiver.is_nullish() {
                return Ok(None);
            }
            let name = self.property_key(property, *computed)?.to_js_string();
            if optional && !self.has_method(&receiver, &name) {
                return Ok(None);
            }
            let args = self.eval_args(arguments)?;
            let result = self.call_method(receiver, &name, args)?;
            return self.sized(result).map(Some);
        }

        let function = match callee.as_identifier() {
            Some(name) => match self.resolve(name) {
                Some(function) => function,
                None if optional => return Ok(None),
                None => return Err(ExpressionError::function_not_found(name)),
            },
            None => match self.chain_link(callee)? {
                Some(function) => function,
                None => return Ok(None),
            },
        };
        if optional && function.is_nullish() {
            return Ok(None);
        }

        let args = self.eval_args(arguments)?;
        let result = match function {
            RuntimeValue::Function(name) => builtins::call_function(self, &name, args)?,
            RuntimeValue::Namespace(namespace @ (Namespace::String | Namespace::Number)) => {
                builtins::call_function(self, namespace.name(), args)?
            }
            other => {
                let name = callee.dotted_name().unwrap_or_else(|| callee.raw.clone());
                return Err(ExpressionError::type_error(format!(
                    "{name} is not a function (got {})",
                    other.kind_name()
                )));
            }
        };
        self.sized(result).map(Some)
    }

    fn eval_args<'n>(&mut self, arguments: &'n [AstNode]) -> ExpressionResult<Vec<Arg<'n>>> {
        let mut args = Vec::with_capacity(arguments.len());
        for argument in arguments {
            args.push(match &argument.kind {
                NodeKind::ArrowFunctionExpression { params, body } => Arg::Callback(Callback {
                    params,
                    body,
                }),
                _ => Arg::Value(self.eval(argument)?),
            });
        }
        Ok(args)
    }

    fn has_method(&self, receiver: &RuntimeValue, name: &str) -> bool {
        match receiver {
            RuntimeValue::Namespace(namespace) => {
                builtins::has_function(&format!("{}.{name}", namespace.name()))
            }
            other => builtins::has_method(other, name),
        }
    }

    fn call_method(
        &mut self,
        receiver: RuntimeValue,
        name: &str,
        args: Vec<Arg<'_>>,
    ) -> ExpressionResult<RuntimeValue> {
        if FORBIDDEN_KEYS.contains(&name) {
            return Err(ExpressionError::security(format!(
                "Access to '{name}' is not allowed"
            )));
        }
        match &receiver {
            _ if receiver.is_nullish() => Err(ExpressionError::type_error(format!(
                "Cannot read properties of {} (reading '{name}')",
                receiver.kind_name()
            ))),
            RuntimeValue::Namespace(namespace) => {
                builtins::call_function(self, &format!("{}.{name}", namespace.name()), args)
            }
            RuntimeValue::Json(Value::Object(map)) if map.contains_key(name) => Err(
                ExpressionError::type_error(format!("'{name}' is a field, not a function")),
            ),
            _ => builtins::call_method(self, receiver, name, args),
        }
    }

    fn sized(&self, value: RuntimeValue) -> ExpressionResult<RuntimeValue> {
        self.check_size(&value)?;
        Ok(value)
    }
}

/// Array index for a computed key (`items[0]`, `items["1"]`)
fn array_index(key: &RuntimeValue) -> Option<usize> {
    match key {
        RuntimeValue::Json(Value::Number(n)) => n.as_u64().map(|i| i as usize),
        RuntimeValue::Json(Value::String(s)) => s.parse::<usize>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn scope() -> Scope {
        let now = DateTime::parse_from_rfc3339("2024-05-06T07:08:09+00:00").unwrap();
        let mut scope = Scope::new(now);
        scope.insert(
            "$json",
            RuntimeValue::Json(json!({
                "name": "Ada",
                "items": [1, 2, 3],
                "nested": {"value": null},
            })),
        );
        scope.insert("$if", RuntimeValue::Function("$if".to_string()));
        scope.insert("Math", RuntimeValue::Namespace(Namespace::Math));
        scope
    }

    fn eval_with(source: &str, limits: &Limits) -> ExpressionResult<RuntimeValue> {
        let scope = scope();
        let ast = parse_expression(source)?;
        Evaluator::new(&scope, limits).evaluate(&ast)
    }

    fn eval(source: &str) -> ExpressionResult<RuntimeValue> {
        eval_with(source, &Limits::default())
    }

    fn json(source: &str) -> Value {
        eval(source).unwrap().into_json()
    }

    #[test]
    fn test_eval_literals_and_arithmetic() {
        assert_eq!(json("1 + 1"), json!(2));
        assert_eq!(json("2 ** 3 ** 2"), json!(512));
        assert_eq!(json("7 % 4 * 2"), json!(6));
        assert_eq!(json("'a' + 1 + 2"), json!("a12"));
        assert_eq!(json("[1, 'x', null]"), json!([1, "x", null]));
        assert_eq!(json("{a: 1, 'b c': [2]}"), json!({"a": 1, "b c": [2]}));
    }

    #[test]
    fn test_short_circuit() {
        assert_eq!(json("false && 1 / 0"), json!(false));
        assert_eq!(json("'x' || 1 / 0"), json!("x"));
        assert_eq!(json("null ?? 'fallback'"), json!("fallback"));
        assert_eq!(json("0 ?? 'fallback'"), json!(0));
    }

    #[test]
    fn test_member_access() {
        assert_eq!(json("$json.name"), json!("Ada"));
        assert_eq!(json("$json.items[1]"), json!(2));
        assert_eq!(json("$json['items'].length"), json!(3));
        assert_eq!(json("$json.name[0]"), json!("A"));
        assert_eq!(eval("$json.missing").unwrap(), RuntimeValue::Undefined);
    }

    #[test]
    fn test_optional_chaining_short_circuits_whole_chain() {
        assert_eq!(eval("$json.nested.value?.a.b").unwrap(), RuntimeValue::Undefined);
        assert_eq!(eval("$json.missing?.toUpperCase()").unwrap(), RuntimeValue::Undefined);

        let err = eval("$json.nested.value.a").unwrap_err();
        assert_eq!(err.code(), "TYPE_ERROR");
        assert_eq!(err.to_string(), "Type error: Cannot read properties of null (reading 'a')");
    }

    #[test]
    fn test_unknown_identifier() {
        let err = eval("$nope + 1").unwrap_err();
        assert_eq!(err.code(), "UNDEFINED_VARIABLE");
        assert_eq!(err.name(), "ReferenceError");
        assert_eq!(json("typeof $nope"), json!("undefined"));
    }

    #[test]
    fn test_forbidden_members() {
        for source in ["$json.constructor", "$json['__proto__']", "$json.items.prototype"] {
            let err = eval(source).unwrap_err();
            assert_eq!(err.code(), "SECURITY_VIOLATION", "{source}");
        }
    }

    #[test]
    fn test_calls() {
        assert_eq!(json("$if($json.items.length > 2, 'many', 'few')"), json!("many"));
        assert_eq!(json("Math.max(1, 5, 3)"), json!(5));
        assert_eq!(json("$json.items.map(x => x * 2)"), json!([2, 4, 6]));
        assert_eq!(json("$json.name.toUpperCase()"), json!("ADA"));

        let err = eval("nope(1)").unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_FUNCTION");
        let err = eval("$json.name()").unwrap_err();
        assert_eq!(err.code(), "TYPE_ERROR");
    }

    #[test]
    fn test_callback_scoping() {
        assert_eq!(
            json("$json.items.map(x => $json.items.filter(y => y > x).length)"),
            json!([2, 1, 0])
        );
    }

    #[test]
    fn test_step_budget_stops_runaway_chain() {
        let limits = Limits {
            max_steps: 100,
            ..Limits::default()
        };
        let err = eval_with(
            "$json.items.map(a => $json.items.map(b => $json.items.map(c => [a, b, c].map(d => d * 2))))",
            &limits,
        )
        .unwrap_err();
        assert_eq!(err.code(), "EXECUTION_TIMEOUT");
    }

    #[test]
    fn test_array_size_limit() {
        let limits = Limits {
            max_array_length: 2,
            ..Limits::default()
        };
        let err = eval_with("[1, 2, 3]", &limits).unwrap_err();
        assert_eq!(err.code(), "RESOURCE_LIMIT_EXCEEDED");
        // context values are read without a size check
        assert!(eval_with("$json.items", &limits).is_ok());
    }

    #[test]
    fn test_call_stack_limit() {
        let limits = Limits {
            max_call_stack: 8,
            ..Limits::default()
        };
        let err = eval_with("((((((((((1))))))))))+ [[[[[[[[1]]]]]]]]", &limits).unwrap_err();
        assert_eq!(err.code(), "RESOURCE_LIMIT_EXCEEDED");
    }
}
