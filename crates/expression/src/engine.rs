//! Expression engine with result and AST caching
//!
//! [`ExpressionEngine`] is the facade over the template parser, the AST
//! generator, the sandboxed interpreter, the validation engine and
//! completion. Every operation returns a value; failures are reported inside
//! [`EvaluationResult`] and [`ValidationResult`], never as panics.

use crate::builtins::query;
use crate::completion::{self, CompletionItem, CompletionRequest};
use crate::context::EvaluationContext;
use crate::core::ast::AstNode;
use crate::error::{ExpressionError, ExpressionResult};
use crate::eval::{RuntimeValue, Scope};
use crate::generator::generate_program;
use crate::parser::parse_expression;
use crate::registry::Registry;
use crate::sandbox::{Sandbox, SecurityConfig, duration_ms};
use crate::template::{ExpressionType, ParsedExpression, ParsedTemplate, parse_template, validate_template};
use crate::validation::{ValidationConfig, ValidationEngine, ValidationResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

#[cfg(feature = "cache")]
use {
    moka::sync::Cache,
    regex::Regex,
    std::sync::LazyLock,
};

/// `$` names read by an expression; `$(` reads `$node`
#[cfg(feature = "cache")]
static DOLLAR_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$[A-Za-z_$][\w$]*|\$\s*\(").expect("valid dollar-name regex"));

/// Clock reads that make a result time-dependent
#[cfg(feature = "cache")]
const CLOCK_READS: [&str; 4] = ["$now", "$today", "DateTime.now", "Date.now"];

// ==================== Configuration ====================

/// Result and AST cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether results and ASTs are cached at all
    pub enabled: bool,
    /// Maximum number of cached results
    pub max_capacity: u64,
    /// Maximum number of cached ASTs
    pub ast_capacity: u64,
    /// How long a cached result stays valid
    #[serde(with = "duration_ms", rename = "ttl_ms")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_capacity: 1000,
            ast_capacity: 1000,
            ttl: Duration::from_secs(300),
        }
    }
}

impl CacheConfig {
    /// Caching switched off
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sandbox settings
    pub security: SecurityConfig,
    /// Validation settings for [`ExpressionEngine::validate_full`]
    pub validation: ValidationConfig,
    /// Cache settings
    pub cache: CacheConfig,
}

impl EngineConfig {
    /// Default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the sandbox settings
    #[must_use = "builder methods must be chained or built"]
    pub fn with_security(mut self, security: SecurityConfig) -> Self {
        self.security = security;
        self
    }

    /// Replace the validation settings
    #[must_use = "builder methods must be chained or built"]
    pub fn with_validation(mut self, validation: ValidationConfig) -> Self {
        self.validation = validation;
        self
    }

    /// Replace the cache settings
    #[must_use = "builder methods must be chained or built"]
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }
}

// ==================== Results ====================

/// Error details of a failed evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationError {
    /// JavaScript-style error class (`SyntaxError`, `SecurityError`, ...)
    pub name: String,
    /// Human-readable message
    pub message: String,
    /// Stable error code
    pub code: String,
    /// The expression or template that failed
    pub expression: String,
}

impl EvaluationError {
    /// Error details for `err` raised while evaluating `expression`
    pub fn new(err: &ExpressionError, expression: &str) -> Self {
        Self {
            name: err.name().to_string(),
            message: err.to_string(),
            code: err.code().to_string(),
            expression: expression.to_string(),
        }
    }
}

/// Outcome of an engine operation
///
/// Exactly one of `value`, `ast` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationResult {
    /// Whether the operation succeeded
    pub success: bool,
    /// `typeof` of the value, `"ast"` or `"error"`
    #[serde(rename = "type")]
    pub value_type: String,
    /// The evaluated value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// The generated syntax tree
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ast: Option<AstNode>,
    /// What went wrong
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EvaluationError>,
    /// Wall-clock time spent
    #[serde(with = "duration_ms", rename = "execution_time_ms")]
    pub execution_time: Duration,
}

impl EvaluationResult {
    fn value(value: Value, value_type: &str, execution_time: Duration) -> Self {
        Self {
            success: true,
            value_type: value_type.to_string(),
            value: Some(value),
            ast: None,
            error: None,
            execution_time,
        }
    }

    fn ast(ast: AstNode, execution_time: Duration) -> Self {
        Self {
            success: true,
            value_type: "ast".to_string(),
            value: None,
            ast: Some(ast),
            error: None,
            execution_time,
        }
    }

    fn failure(err: &ExpressionError, expression: &str, execution_time: Duration) -> Self {
        Self {
            success: false,
            value_type: "error".to_string(),
            value: None,
            ast: None,
            error: Some(EvaluationError::new(err, expression)),
            execution_time,
        }
    }

    /// Error code of a failed result
    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().map(|err| err.code.as_str())
    }
}

/// A value together with its `typeof`
#[derive(Debug, Clone)]
struct Evaluated {
    value: Value,
    value_type: &'static str,
}

impl Evaluated {
    fn new(value: RuntimeValue) -> Self {
        let value_type = value.type_of();
        Self {
            value: value.into_json(),
            value_type,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Mode {
    Template,
    Expression,
}

/// Result cache key; the source is stored so distinct templates never share a slot
#[cfg(feature = "cache")]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ResultKey {
    mode: Mode,
    source: String,
    bindings: u64,
}

// ==================== Engine ====================

/// Expression engine with parsing, evaluation, validation and completion
pub struct ExpressionEngine {
    config: EngineConfig,
    registry: Arc<Registry>,
    sandbox: Sandbox,
    validation: ValidationEngine,
    #[cfg(feature = "cache")]
    results: Option<Cache<ResultKey, Arc<Evaluated>>>,
    #[cfg(feature = "cache")]
    asts: Option<Cache<String, Arc<AstNode>>>,
}

impl std::fmt::Debug for ExpressionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpressionEngine")
            .field("config", &self.config)
            .field("cached_results", &self.cache_entry_count())
            .finish_non_exhaustive()
    }
}

impl Default for ExpressionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionEngine {
    /// Engine with the default configuration
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Engine with a custom configuration
    pub fn with_config(config: EngineConfig) -> Self {
        Self::with_registry(config, Arc::new(Registry::standard()))
    }

    /// Engine validating against a custom registry
    pub fn with_registry(config: EngineConfig, registry: Arc<Registry>) -> Self {
        let sandbox = Sandbox::new(config.security.clone());
        let validation = ValidationEngine::with_registry(config.validation.clone(), Arc::clone(&registry));

        #[cfg(feature = "cache")]
        let (results, asts) = if config.cache.enabled {
            let results = Cache::builder()
                .max_capacity(config.cache.max_capacity)
                .time_to_live(config.cache.ttl)
                .build();
            let asts = Cache::builder().max_capacity(config.cache.ast_capacity).build();
            (Some(results), Some(asts))
        } else {
            (None, None)
        };

        debug!(
            cache_enabled = config.cache.enabled,
            cache_capacity = config.cache.max_capacity,
            "Created expression engine"
        );

        Self {
            config,
            registry,
            sandbox,
            validation,
            #[cfg(feature = "cache")]
            results,
            #[cfg(feature = "cache")]
            asts,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Registry used for validation and completion
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Validation engine used by [`validate_full`](Self::validate_full)
    ///
    /// Add custom validators here before sharing the engine.
    pub fn validation_engine_mut(&mut self) -> &mut ValidationEngine {
        &mut self.validation
    }

    // ==================== Evaluation ====================

    /// Evaluate a template against a context
    ///
    /// A template made of exactly one expression returns the raw value; any
    /// other template renders to a string. Text without expressions is
    /// returned as is.
    pub fn evaluate(&self, template: &str, ctx: &EvaluationContext) -> EvaluationResult {
        trace!(template = template, "Evaluating template");
        self.run(template, ctx, Mode::Template)
    }

    /// Evaluate a bare expression such as `$json.total * 2`
    pub fn evaluate_expression(&self, expression: &str, ctx: &EvaluationContext) -> EvaluationResult {
        trace!(expression = expression, "Evaluating expression");
        self.run(expression, ctx, Mode::Expression)
    }

    fn run(&self, source: &str, ctx: &EvaluationContext, mode: Mode) -> EvaluationResult {
        let started = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| self.evaluate_cached(source, ctx, mode)))
            .unwrap_or_else(|payload| {
                Err(ExpressionError::internal(format!(
                    "evaluation panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });

        match outcome {
            Ok(evaluated) => {
                EvaluationResult::value(evaluated.value.clone(), evaluated.value_type, started.elapsed())
            }
            Err(err) => {
                trace!(code = err.code(), error = %err, "Evaluation failed");
                EvaluationResult::failure(&err, source, started.elapsed())
            }
        }
    }

    fn evaluate_cached(
        &self,
        source: &str,
        ctx: &EvaluationContext,
        mode: Mode,
    ) -> ExpressionResult<Arc<Evaluated>> {
        #[cfg(feature = "cache")]
        if let Some((results, key)) = self.results.as_ref().zip(cache_key(source, ctx, mode)) {
            if let Some(hit) = results.get(&key) {
                trace!(bindings = key.bindings, "Result cache hit");
                return Ok(hit);
            }
            let evaluated = Arc::new(self.evaluate_uncached(source, ctx, mode)?);
            results.insert(key, Arc::clone(&evaluated));
            return Ok(evaluated);
        }

        self.evaluate_uncached(source, ctx, mode).map(Arc::new)
    }

    fn evaluate_uncached(
        &self,
        source: &str,
        ctx: &EvaluationContext,
        mode: Mode,
    ) -> ExpressionResult<Evaluated> {
        match mode {
            Mode::Expression => {
                self.sandbox.check(source)?;
                let ast = self.parse_cached(source)?;
                let scope = self.sandbox.scope(ctx);
                self.sandbox.execute(&ast, &scope).map(Evaluated::new)
            }
            Mode::Template => {
                let structural = validate_template(source);
                if let Some(issue) = structural.errors.first() {
                    return Err(ExpressionError::template(
                        structural_code(&issue.code),
                        issue.message.clone(),
                    ));
                }

                let parsed = parse_template(source);
                if !parsed.is_template {
                    return Ok(Evaluated {
                        value: Value::String(source.to_string()),
                        value_type: "string",
                    });
                }
                self.render(&parsed, ctx)
            }
        }
    }

    /// Gate, parse, scope and execute every expression of `parsed`
    fn render(&self, parsed: &ParsedTemplate, ctx: &EvaluationContext) -> ExpressionResult<Evaluated> {
        for expression in &parsed.expressions {
            self.sandbox.check(&expression.cleaned)?;
        }

        let mut asts = Vec::with_capacity(parsed.expressions.len());
        for expression in &parsed.expressions {
            asts.push(match expression.expression_type {
                ExpressionType::Jmespath => None,
                _ => Some(self.parse_cached(&expression.cleaned)?),
            });
        }

        let scope = self.sandbox.scope(ctx);

        if parsed.is_single_expression() {
            let value = self.execute(&parsed.expressions[0], asts[0].as_deref(), &scope)?;
            return Ok(Evaluated::new(value));
        }

        let mut out = String::new();
        for (index, expression) in parsed.expressions.iter().enumerate() {
            out.push_str(&parsed.static_parts[index]);
            let value = self.execute(expression, asts[index].as_deref(), &scope)?;
            out.push_str(&value.to_template_string());
        }
        if let Some(tail) = parsed.static_parts.last() {
            out.push_str(tail);
        }
        Ok(Evaluated {
            value: Value::String(out),
            value_type: "string",
        })
    }

    fn execute(
        &self,
        expression: &ParsedExpression,
        ast: Option<&AstNode>,
        scope: &Scope,
    ) -> ExpressionResult<RuntimeValue> {
        match ast {
            Some(ast) => self.sandbox.execute(ast, scope),
            // pure JMESPath spans query the current item
            None => {
                let data = scope.get("$json").map(RuntimeValue::to_json).unwrap_or(Value::Null);
                query::search(&expression.cleaned, data).map(RuntimeValue::Json)
            }
        }
    }

    fn parse_cached(&self, source: &str) -> ExpressionResult<Arc<AstNode>> {
        #[cfg(feature = "cache")]
        if let Some(asts) = &self.asts {
            if let Some(ast) = asts.get(source) {
                return Ok(ast);
            }
            let ast = Arc::new(parse_expression(source)?);
            asts.insert(source.to_string(), Arc::clone(&ast));
            return Ok(ast);
        }

        parse_expression(source).map(Arc::new)
    }

    // ==================== Parsing ====================

    /// Split a template into static parts and expressions
    pub fn parse(&self, template: &str) -> ParsedTemplate {
        parse_template(template)
    }

    /// Build the `Program` AST of a template or bare expression
    pub fn generate_ast(&self, template: &str) -> EvaluationResult {
        let started = Instant::now();
        let parsed = parse_template(template);
        match generate_program(template, &parsed) {
            Ok(ast) => EvaluationResult::ast(ast, started.elapsed()),
            Err(err) => {
                let err = ExpressionError::ast_generation(err.to_string());
                EvaluationResult::failure(&err, template, started.elapsed())
            }
        }
    }

    // ==================== Validation ====================

    /// Structural checks only: brace parity, nesting and empty spans
    pub fn validate(&self, template: &str) -> ValidationResult {
        validate_template(template)
    }

    /// All enabled validation layers
    pub fn validate_full(
        &self,
        template: &str,
        ctx: Option<&EvaluationContext>,
        parsed: Option<&ParsedTemplate>,
    ) -> ValidationResult {
        self.validation.validate(template, ctx, parsed)
    }

    // ==================== Completion ====================

    /// Suggestions at the cursor
    pub fn complete(&self, request: &CompletionRequest) -> Vec<CompletionItem> {
        completion::complete(&self.registry, request)
    }

    // ==================== Cache ====================

    /// Drop every cached result and AST
    pub fn clear_cache(&self) {
        #[cfg(feature = "cache")]
        {
            if let Some(results) = &self.results {
                results.invalidate_all();
                results.run_pending_tasks();
            }
            if let Some(asts) = &self.asts {
                asts.invalidate_all();
                asts.run_pending_tasks();
            }
        }
        debug!("Expression cache cleared");
    }

    /// Number of cached results
    pub fn cache_entry_count(&self) -> u64 {
        #[cfg(feature = "cache")]
        if let Some(results) = &self.results {
            results.run_pending_tasks();
            return results.entry_count();
        }
        0
    }
}

/// Cache key over the source, the bindings it reads and the mode
///
/// `None` when the result depends on an unpinned clock.
#[cfg(feature = "cache")]
fn cache_key(source: &str, ctx: &EvaluationContext, mode: Mode) -> Option<ResultKey> {
    if ctx.pinned_now().is_none() && CLOCK_READS.iter().any(|read| source.contains(read)) {
        return None;
    }

    // JMESPath spans read `$json` without naming it
    let names = std::iter::once("$json").chain(DOLLAR_NAME.find_iter(source).map(|found| {
        let name = found.as_str();
        if name.ends_with('(') { "$node" } else { name }
    }));

    Some(ResultKey {
        mode,
        source: source.to_string(),
        bindings: ctx.hash_bindings(names),
    })
}

/// Static code for a structural template issue
fn structural_code(code: &str) -> &'static str {
    match code {
        "UNMATCHED_BRACES" => "UNMATCHED_BRACES",
        "NESTED_TEMPLATES" => "NESTED_TEMPLATES",
        "EMPTY_EXPRESSION" => "EMPTY_EXPRESSION",
        _ => "TEMPLATE_ERROR",
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ResourceLimits;
    use chrono::DateTime;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    fn ctx() -> EvaluationContext {
        EvaluationContext::builder()
            .json(json!({
                "name": "Ada",
                "total": 21,
                "items": [{"id": 1, "price": 5}, {"id": 2, "price": 7}],
                "tags": ["a", "b"]
            }))
            .node("Fetch", json!({"json": {"status": 200}}))
            .now(DateTime::parse_from_rfc3339("2024-03-15T10:30:00+00:00").unwrap())
            .build()
    }

    #[test]
    fn test_single_expression_keeps_type() {
        let engine = ExpressionEngine::new();
        let result = engine.evaluate("{{ 1+1 }}", &EvaluationContext::new());
        assert!(result.success);
        assert_eq!(result.value, Some(json!(2)));
        assert_eq!(result.value_type, "number");
    }

    #[test]
    fn test_template_interpolation() {
        let engine = ExpressionEngine::new();
        let template = r#"Hello {{ "World" }} and {{ 2+3 }}!"#;

        let parsed = engine.parse(template);
        assert_eq!(parsed.static_parts, ["Hello ", " and ", "!"]);
        assert_eq!(parsed.expressions.len(), 2);

        let result = engine.evaluate(template, &EvaluationContext::new());
        assert_eq!(result.value, Some(json!("Hello World and 5!")));
        assert_eq!(result.value_type, "string");
    }

    #[rstest]
    #[case("{{ $json.name }}", json!("Ada"), "string")]
    #[case("{{ $json.items.map(i => i.price).reduce((a, b) => a + b, 0) }}", json!(12), "number")]
    #[case("{{ $json.missing }}", Value::Null, "undefined")]
    #[case("{{ $json.tags }}", json!(["a", "b"]), "object")]
    #[case("Tags: {{ $json.tags }}", json!(r#"Tags: ["a","b"]"#), "string")]
    #[case("Missing: [{{ $json.missing }}]", json!("Missing: []"), "string")]
    #[case("{{ $('Fetch').json.status }}", json!(200), "number")]
    #[case("{{ $if($json.total > 20, 'big', 'small') }}", json!("big"), "string")]
    #[case("{{ $now.toISODate() }}", json!("2024-03-15"), "string")]
    #[case("{{ items[*].id }}", json!([1, 2]), "object")]
    #[case("plain text", json!("plain text"), "string")]
    #[case("big: {{ 1e21 }}", json!("big: 1e+21"), "string")]
    fn test_evaluate(#[case] template: &str, #[case] expected: Value, #[case] value_type: &str) {
        let engine = ExpressionEngine::new();
        let result = engine.evaluate(template, &ctx());
        assert!(result.success, "{template}: {:?}", result.error);
        assert_eq!(result.value, Some(expected));
        assert_eq!(result.value_type, value_type);
    }

    #[test]
    fn test_jmespath_span_queries_json() {
        let engine = ExpressionEngine::new();
        let result = engine.evaluate("{{ items[?price > `5`].id }}", &ctx());
        assert_eq!(result.value, Some(json!([2])));
    }

    #[rstest]
    #[case(r#"{{ eval("x") }}"#, "SECURITY_VIOLATION")]
    #[case("{{ $json.constructor }}", "SECURITY_VIOLATION")]
    #[case("{{ 1 + }}", "SYNTAX_ERROR")]
    #[case("{{ $nope }}", "UNDEFINED_VARIABLE")]
    #[case("{{ 1 / 0 }}", "DIVISION_BY_ZERO")]
    #[case("{{ a }", "UNMATCHED_BRACES")]
    #[case("{{ }}", "EMPTY_EXPRESSION")]
    fn test_failures(#[case] template: &str, #[case] code: &str) {
        let engine = ExpressionEngine::new();
        let result = engine.evaluate(template, &ctx());
        assert!(!result.success);
        assert_eq!(result.value_type, "error");
        assert_eq!(result.value, None);
        assert_eq!(result.error_code(), Some(code));
        assert_eq!(result.error.unwrap().expression, template);
    }

    #[test]
    fn test_security_gate_runs_before_evaluation() {
        let engine = ExpressionEngine::new();
        let result = engine.evaluate("{{ $nope }} {{ eval('1') }}", &ctx());
        assert_eq!(result.error_code(), Some("SECURITY_VIOLATION"));
    }

    #[test]
    fn test_evaluate_expression() {
        let engine = ExpressionEngine::new();
        let result = engine.evaluate_expression("$json.total * 2", &ctx());
        assert_eq!(result.value, Some(json!(42)));

        let result = engine.evaluate_expression("require('fs')", &ctx());
        assert_eq!(result.error_code(), Some("SECURITY_VIOLATION"));
    }

    #[test]
    fn test_result_cache_tracks_context() {
        let engine = ExpressionEngine::new();
        let template = "{{ $json.total + 1 }}";

        let first = engine.evaluate(template, &ctx());
        let second = engine.evaluate(template, &ctx());
        assert_eq!(first.value, second.value);
        assert_eq!(engine.cache_entry_count(), 1);

        let changed = EvaluationContext::builder().json(json!({"total": 1})).build();
        assert_eq!(engine.evaluate(template, &changed).value, Some(json!(2)));
        assert_eq!(engine.cache_entry_count(), 2);

        engine.clear_cache();
        assert_eq!(engine.cache_entry_count(), 0);
    }

    #[test]
    fn test_unrelated_bindings_share_a_cache_entry() {
        let engine = ExpressionEngine::new();
        let a = EvaluationContext::builder()
            .json(json!({"x": 1}))
            .workflow(json!({"id": "a"}))
            .build();
        let b = EvaluationContext::builder()
            .json(json!({"x": 1}))
            .workflow(json!({"id": "b"}))
            .build();
        engine.evaluate("{{ $json.x }}", &a);
        engine.evaluate("{{ $json.x }}", &b);
        assert_eq!(engine.cache_entry_count(), 1);
    }

    #[cfg(feature = "cache")]
    #[test]
    fn test_result_cache_keys_keep_the_source() {
        let data = ctx();
        let a = cache_key("{{ $json.total }}", &data, Mode::Template).unwrap();
        let b = cache_key("{{ $json.name }}", &data, Mode::Template).unwrap();
        assert_eq!(a.source, "{{ $json.total }}");
        assert_ne!(a, b);
        assert_ne!(a, cache_key("{{ $json.total }}", &data, Mode::Expression).unwrap());

        let engine = ExpressionEngine::new();
        assert_eq!(engine.evaluate("{{ $json.total }}", &data).value, Some(json!(21)));
        assert_eq!(engine.evaluate("{{ $json.name }}", &data).value, Some(json!("Ada")));
        assert_eq!(engine.cache_entry_count(), 2);
    }

    #[test]
    fn test_clock_reads_need_a_pinned_now() {
        let engine = ExpressionEngine::new();
        let unpinned = EvaluationContext::new();
        assert!(engine.evaluate("{{ $now.year }}", &unpinned).success);
        assert_eq!(engine.cache_entry_count(), 0);

        assert!(engine.evaluate("{{ $now.year }}", &ctx()).success);
        assert_eq!(engine.cache_entry_count(), 1);
    }

    #[test]
    fn test_disabled_cache() {
        let engine = ExpressionEngine::with_config(EngineConfig::new().with_cache(CacheConfig::disabled()));
        engine.evaluate("{{ 1 }}", &ctx());
        assert_eq!(engine.cache_entry_count(), 0);
    }

    #[test]
    fn test_step_budget_from_config() {
        let config = EngineConfig::new().with_security(SecurityConfig::default().with_max_steps(200));
        let engine = ExpressionEngine::with_config(config);
        let result = engine.evaluate(
            "{{ $json.items.map(i => $json.items.map(j => $json.items.map(k => i.id + j.id + k.id))) }}",
            &EvaluationContext::builder()
                .json(json!({"items": (0..20).map(|id| json!({"id": id})).collect::<Vec<_>>()}))
                .build(),
        );
        assert_eq!(result.error_code(), Some("EXECUTION_TIMEOUT"));
    }

    #[test]
    fn test_generate_ast() {
        let engine = ExpressionEngine::new();
        let result = engine.generate_ast("Total: {{ $json.total }}");
        assert!(result.success);
        assert_eq!(result.value_type, "ast");
        assert_eq!(result.ast.unwrap().type_name(), "Program");

        let result = engine.generate_ast("{{ items[*].id }}");
        assert!(result.success);
        assert!(engine.evaluate("{{ items[*].id }}", &ctx()).success);

        let result = engine.generate_ast("{{ (1 + }}");
        assert_eq!(result.error_code(), Some("AST_GENERATION_ERROR"));
        assert!(result.ast.is_none());
    }

    #[test]
    fn test_long_operator_chains_fail_without_crashing() {
        let engine = ExpressionEngine::new();
        let template = format!("{{{{ 1{} }}}}", "+1".repeat(59_999));

        let result = engine.evaluate(&template, &EvaluationContext::new());
        assert_eq!(result.error_code(), Some("SYNTAX_ERROR"));
        assert_eq!(engine.cache_entry_count(), 0);

        let result = engine.generate_ast(&template);
        assert_eq!(result.error_code(), Some("AST_GENERATION_ERROR"));

        let result = engine.validate_full(&template, None, None);
        assert!(!result.is_valid);
        assert!(result.has_code("EXPRESSION_TOO_LONG"));

        let relaxed = ExpressionEngine::with_config(EngineConfig::new().with_validation(
            ValidationConfig::default().with_limits(ResourceLimits {
                max_template_length: usize::MAX,
                max_expression_length: usize::MAX,
                ..ResourceLimits::default()
            }),
        ));
        let result = relaxed.validate_full(&template, None, None);
        assert!(result.has_code("SYNTAX_ERROR"));
    }

    #[test]
    fn test_validate_paths() {
        let engine = ExpressionEngine::new();
        assert!(engine.validate("{{ $if(true) }}").is_valid);

        let result = engine.validate_full("{{ $if(true) }}", None, None);
        assert!(result.has_code("INSUFFICIENT_ARGUMENTS"));
        assert!(!result.is_valid);

        let data = EvaluationContext::builder().json(json!({"a": {}})).build();
        let result = engine.validate_full("{{ $json.a.b }}", Some(&data), None);
        assert!(result.has_code("UNDEFINED_PROPERTY"));

        let data = EvaluationContext::builder().json(json!({"a": {"b": 1}})).build();
        assert!(engine.validate_full("{{ $json.a.b }}", Some(&data), None).is_valid);
    }

    #[test]
    fn test_result_serialization() {
        let engine = ExpressionEngine::new();
        let result = engine.evaluate("{{ 'a' + 1 }}", &EvaluationContext::new());
        insta::assert_json_snapshot!(result, { ".execution_time_ms" => "[ms]" }, @r#"
        {
          "success": true,
          "type": "string",
          "value": "a1",
          "execution_time_ms": "[ms]"
        }
        "#);

        let result = engine.evaluate("{{ eval('1') }}", &EvaluationContext::new());
        insta::assert_json_snapshot!(result, { ".execution_time_ms" => "[ms]" }, @r#"
        {
          "success": false,
          "type": "error",
          "error": {
            "name": "SecurityError",
            "message": "Security violation: 'eval' is not allowed",
            "code": "SECURITY_VIOLATION",
            "expression": "{{ eval('1') }}"
          },
          "execution_time_ms": "[ms]"
        }
        "#);
    }

    #[test]
    fn test_engine_config_serde() {
        let config: EngineConfig = serde_json::from_value(json!({
            "security": {"max_steps": 10},
            "cache": {"enabled": false, "ttl_ms": 1500}
        }))
        .unwrap();
        assert_eq!(config.security.max_steps, 10);
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.ttl, Duration::from_millis(1500));
        assert_eq!(config.cache.max_capacity, 1000);
    }
}
