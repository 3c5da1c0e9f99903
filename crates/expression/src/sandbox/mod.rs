//! Security sandbox for expression execution
//!
//! Evaluation runs behind three gates:
//!
//! 1. [`Sandbox::check`] rejects source text that names dangerous globals or
//!    prototype machinery before anything is parsed.
//! 2. [`Sandbox::scope`] builds the only names an expression can see from a
//!    sanitized copy of the context.
//! 3. [`Sandbox::execute`] runs the interpreter under the configured step,
//!    time, depth and size limits.

use crate::builtins;
use crate::context::EvaluationContext;
use crate::core::ast::AstNode;
use crate::error::{ExpressionError, ExpressionResult};
use crate::eval::{Evaluator, Limits, Namespace, RuntimeValue, Scope};
use crate::lexer::is_valid_identifier;
use crate::registry::{EntryKind, EntrySource, Registry};
use chrono::{NaiveTime, TimeZone};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{trace, warn};

/// Capability globals an expression may reference by default
pub const DEFAULT_GLOBALS: [&str; 15] = [
    "Math",
    "Object",
    "String",
    "Number",
    "Array",
    "Date",
    "JSON",
    "DateTime",
    "Duration",
    "Interval",
    "parseInt",
    "parseFloat",
    "isNaN",
    "isFinite",
    "Boolean",
];

/// Host globals that are explicitly `undefined` inside expressions
pub const SHADOWED_GLOBALS: [&str; 8] = [
    "window",
    "global",
    "globalThis",
    "process",
    "require",
    "eval",
    "Function",
    "console",
];

/// Globals that execute code or schedule work; allowed only when listed
const DANGEROUS_GLOBALS: [&str; 4] = ["Function", "eval", "setTimeout", "setInterval"];

static DANGEROUS_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(Function|eval|setTimeout|setInterval)\b").expect("valid dangerous-token regex")
});

static PROTOTYPE_ACCESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\.prototype\b|__proto__|\bconstructor\b|\bimport\b|\brequire\b")
        .expect("valid prototype-access regex")
});

/// Sandbox configuration
///
/// `blocked_patterns` are not serialized; add them in code after loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Capability globals exposed to expressions
    pub allowed_globals: BTreeSet<String>,
    /// Source patterns that are rejected outright
    #[serde(skip)]
    pub blocked_patterns: Vec<Regex>,
    /// Wall-clock budget per evaluation
    #[serde(with = "duration_ms", rename = "timeout_ms")]
    pub timeout: Duration,
    /// Longest array an expression may produce
    pub max_array_length: usize,
    /// Most properties an object may have
    pub max_object_properties: usize,
    /// Longest string an expression may produce, in bytes
    pub max_string_length: usize,
    /// Maximum evaluation nesting
    pub max_call_stack: usize,
    /// Node evaluations allowed per run
    pub max_steps: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        let limits = Limits::default();
        Self {
            allowed_globals: DEFAULT_GLOBALS.iter().map(ToString::to_string).collect(),
            blocked_patterns: Vec::new(),
            timeout: limits.timeout,
            max_array_length: limits.max_array_length,
            max_object_properties: limits.max_object_properties,
            max_string_length: limits.max_string_length,
            max_call_stack: limits.max_call_stack,
            max_steps: limits.max_steps,
        }
    }
}

impl SecurityConfig {
    /// Default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow an extra global
    #[must_use = "builder methods must be chained or built"]
    pub fn with_allowed_global(mut self, name: impl Into<String>) -> Self {
        self.allowed_globals.insert(name.into());
        self
    }

    /// Remove a global from the allow list
    #[must_use = "builder methods must be chained or built"]
    pub fn without_global(mut self, name: &str) -> Self {
        self.allowed_globals.remove(name);
        self
    }

    /// Reject expressions matching `pattern`
    #[must_use = "builder methods must be chained or built"]
    pub fn with_blocked_pattern(mut self, pattern: Regex) -> Self {
        self.blocked_patterns.push(pattern);
        self
    }

    /// Set the wall-clock budget
    #[must_use = "builder methods must be chained or built"]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the step budget
    #[must_use = "builder methods must be chained or built"]
    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Set the nesting limit
    #[must_use = "builder methods must be chained or built"]
    pub fn with_max_call_stack(mut self, depth: usize) -> Self {
        self.max_call_stack = depth;
        self
    }

    /// Set the produced-array length limit
    #[must_use = "builder methods must be chained or built"]
    pub fn with_max_array_length(mut self, len: usize) -> Self {
        self.max_array_length = len;
        self
    }

    /// Set the produced-object size limit
    #[must_use = "builder methods must be chained or built"]
    pub fn with_max_object_properties(mut self, count: usize) -> Self {
        self.max_object_properties = count;
        self
    }

    /// Set the produced-string length limit
    #[must_use = "builder methods must be chained or built"]
    pub fn with_max_string_length(mut self, len: usize) -> Self {
        self.max_string_length = len;
        self
    }

    /// Interpreter limits derived from this configuration
    pub fn limits(&self) -> Limits {
        Limits {
            max_steps: self.max_steps,
            timeout: self.timeout,
            max_call_stack: self.max_call_stack,
            max_array_length: self.max_array_length,
            max_object_properties: self.max_object_properties,
            max_string_length: self.max_string_length,
        }
    }
}

/// Gatekeeper around the interpreter
#[derive(Debug, Clone, Default)]
pub struct Sandbox {
    config: SecurityConfig,
    limits: Limits,
}

impl Sandbox {
    /// Sandbox with the given configuration
    pub fn new(config: SecurityConfig) -> Self {
        let limits = config.limits();
        Self { config, limits }
    }

    /// Active configuration
    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    /// Reject dangerous source text before it is parsed
    pub fn check(&self, source: &str) -> ExpressionResult<()> {
        if let Some(pattern) = self
            .config
            .blocked_patterns
            .iter()
            .find(|pattern| pattern.is_match(source))
        {
            return Err(violation(source, format!(
                "Expression matches blocked pattern '{}'",
                pattern.as_str()
            )));
        }

        for found in DANGEROUS_TOKEN.find_iter(source) {
            let token = found.as_str();
            if !self.config.allowed_globals.contains(token) {
                return Err(violation(source, format!("'{token}' is not allowed")));
            }
        }

        if let Some(found) = PROTOTYPE_ACCESS.find(source) {
            return Err(violation(source, format!(
                "Access to '{}' is not allowed",
                found.as_str().trim_start_matches('.')
            )));
        }
        Ok(())
    }

    /// Names visible to an expression evaluated against `ctx`
    ///
    /// Context bindings are sanitized and filtered to valid `$` identifiers.
    /// `$now` and `$today` come from the context clock.
    pub fn scope(&self, ctx: &EvaluationContext) -> Scope {
        let ctx = ctx.sanitized();
        let now = ctx.now();
        let mut scope = Scope::new(now);

        for (name, value) in ctx.bindings() {
            if name.starts_with('$') && is_valid_identifier(name) {
                scope.insert(name, RuntimeValue::Json(value.clone()));
            }
        }

        scope.insert("$now", RuntimeValue::DateTime(now));
        let today = now
            .offset()
            .from_local_datetime(&now.date_naive().and_time(NaiveTime::MIN))
            .single()
            .unwrap_or(now);
        scope.insert("$today", RuntimeValue::DateTime(today));

        for info in Registry::builtin().functions() {
            if info.kind == EntryKind::Function
                && info.source == EntrySource::Extension
                && !info.name.contains('.')
            {
                scope.insert(&info.name, RuntimeValue::Function(info.name.clone()));
            }
        }

        for name in &self.config.allowed_globals {
            if DANGEROUS_GLOBALS.contains(&name.as_str()) {
                continue;
            }
            if let Some(namespace) = Namespace::from_name(name) {
                scope.insert(name, RuntimeValue::Namespace(namespace));
            } else if builtins::has_function(name) {
                scope.insert(name, RuntimeValue::Function(name.clone()));
            }
        }

        for name in SHADOWED_GLOBALS {
            scope.insert(name, RuntimeValue::Undefined);
        }
        scope
    }

    /// Run a parsed expression under the configured limits
    pub fn execute(&self, ast: &AstNode, scope: &Scope) -> ExpressionResult<RuntimeValue> {
        let mut evaluator = Evaluator::new(scope, &self.limits);
        let value = evaluator.evaluate(ast)?;
        evaluator.check_deadline()?;
        trace!(
            steps = evaluator.steps(),
            elapsed_us = evaluator.elapsed().as_micros() as u64,
            "Sandboxed evaluation finished"
        );
        Ok(value)
    }
}

fn violation(source: &str, message: String) -> ExpressionError {
    warn!(expression = %source, reason = %message, "Rejected expression");
    ExpressionError::security(message)
}

/// `Duration` as whole milliseconds
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    fn context() -> EvaluationContext {
        EvaluationContext::from_value(json!({
            "$json": {"name": "Ada", "__proto__": {"admin": true}},
            "$now": "2024-03-15T10:30:00+02:00",
        }))
        .unwrap()
    }

    #[rstest]
    #[case("eval('1')")]
    #[case("Function('return 1')()")]
    #[case("setTimeout(x, 1)")]
    #[case("$json.__proto__")]
    #[case("$json.constructor")]
    #[case("Object.prototype")]
    #[case("require('fs')")]
    #[case("import('x')")]
    fn test_check_rejects(#[case] source: &str) {
        let err = Sandbox::default().check(source).unwrap_err();
        assert_eq!(err.code(), "SECURITY_VIOLATION", "{source}");
    }

    #[rstest]
    #[case("$json.evaluation + $json.functional")]
    #[case("'prototypes'.length")]
    #[case("Math.max(1, 2)")]
    fn test_check_accepts(#[case] source: &str) {
        assert!(Sandbox::default().check(source).is_ok(), "{source}");
    }

    #[test]
    fn test_blocked_patterns_and_allow_list() {
        let sandbox = Sandbox::new(
            SecurityConfig::new().with_blocked_pattern(Regex::new(r"\$vars\.secret").unwrap()),
        );
        assert!(sandbox.check("$vars.secret").is_err());

        let sandbox = Sandbox::new(SecurityConfig::new().with_allowed_global("setTimeout"));
        assert!(sandbox.check("setTimeout").is_ok());
    }

    #[test]
    fn test_scope_contents() {
        let scope = Sandbox::default().scope(&context());
        assert_eq!(
            scope.get("$json"),
            Some(&RuntimeValue::Json(json!({"name": "Ada"})))
        );
        assert_eq!(scope.get("window"), Some(&RuntimeValue::Undefined));
        assert_eq!(scope.get("eval"), Some(&RuntimeValue::Undefined));
        assert_eq!(scope.get("Math"), Some(&RuntimeValue::Namespace(Namespace::Math)));
        assert_eq!(
            scope.get("parseInt"),
            Some(&RuntimeValue::Function("parseInt".to_string()))
        );
        assert!(scope.contains("$if"));
        assert!(scope.contains("$"));

        let Some(RuntimeValue::DateTime(today)) = scope.get("$today") else {
            panic!("$today is not a datetime");
        };
        assert_eq!(today.to_rfc3339(), "2024-03-15T00:00:00+02:00");
    }

    #[test]
    fn test_disallowed_global_is_absent() {
        let sandbox = Sandbox::new(SecurityConfig::new().without_global("Math"));
        let scope = sandbox.scope(&context());
        assert!(!scope.contains("Math"));
        let ast = parse_expression("Math.max(1, 2)").unwrap();
        let err = sandbox.execute(&ast, &scope).unwrap_err();
        assert_eq!(err.code(), "UNDEFINED_VARIABLE");
    }

    #[test]
    fn test_step_budget_stops_long_callback_chains() {
        let sandbox = Sandbox::new(SecurityConfig::new().with_max_steps(1_000));
        let ctx = EvaluationContext::from_value(json!({"$json": {"items": (0..500).collect::<Vec<_>>()}}))
            .unwrap();
        let scope = sandbox.scope(&ctx);
        let ast = parse_expression("$json.items.map(x => x * 2).filter(x => x > 3).length").unwrap();
        let err = sandbox.execute(&ast, &scope).unwrap_err();
        assert_eq!(err.code(), "EXECUTION_TIMEOUT");
    }

    #[test]
    fn test_config_serializes_timeout_as_millis() {
        let config = SecurityConfig::new().with_timeout(Duration::from_millis(250));
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["timeout_ms"], 250);
        let back: SecurityConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back.timeout, Duration::from_millis(250));
    }
}
