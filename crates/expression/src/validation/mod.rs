//! Layered validation of templates
//!
//! Validators are grouped into five layers that always run in the same
//! order: syntax, semantic, security, performance, business. Each validator
//! sees every expression of the template; positions in the issues it returns
//! are template offsets.
//!
//! ```
//! use weft_expression::validation::{ValidationConfig, ValidationEngine};
//!
//! let engine = ValidationEngine::new(ValidationConfig::default());
//! let result = engine.validate("Hello {{ $if(true) }}", None, None);
//! assert!(result.has_code("INSUFFICIENT_ARGUMENTS"));
//! ```

mod issue;

pub mod business;
pub mod performance;
pub mod scan;
pub mod security;
pub mod semantic;
pub mod syntax;

pub use issue::*;

use crate::context::EvaluationContext;
use crate::core::ast::AstNode;
use crate::error::{ExpressionError, ExpressionResult};
use crate::parser::parse_expression;
use crate::registry::Registry;
use crate::template::{ExpressionType, ParsedTemplate, parse_template};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Validation layers in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLayer {
    /// Parsing, brackets, quotes, template structure
    Syntax,
    /// Variables, property paths, call arity, operand types
    Semantic,
    /// Dangerous code patterns
    Security,
    /// Size and cost limits
    Performance,
    /// Application rules
    Business,
}

impl ValidationLayer {
    /// Every layer in execution order
    pub const ALL: [ValidationLayer; 5] = [
        ValidationLayer::Syntax,
        ValidationLayer::Semantic,
        ValidationLayer::Security,
        ValidationLayer::Performance,
        ValidationLayer::Business,
    ];

    /// Lowercase layer name
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationLayer::Syntax => "syntax",
            ValidationLayer::Semantic => "semantic",
            ValidationLayer::Security => "security",
            ValidationLayer::Performance => "performance",
            ValidationLayer::Business => "business",
        }
    }
}

impl fmt::Display for ValidationLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==================== Configuration ====================

/// Thresholds for the performance layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Longest template, in bytes
    pub max_template_length: usize,
    /// Longest single expression, in bytes
    pub max_expression_length: usize,
    /// Deepest bracket nesting inside an expression
    pub max_nesting_depth: usize,
    /// Calls per expression before a warning
    pub max_function_calls: usize,
    /// Iteration-method calls per expression before a warning
    pub max_iteration_calls: usize,
    /// Estimated literal memory per expression before a warning, in bytes
    pub max_memory_estimate: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_template_length: 100_000,
            max_expression_length: 10_000,
            max_nesting_depth: 20,
            max_function_calls: 25,
            max_iteration_calls: 5,
            max_memory_estimate: 1024 * 1024,
        }
    }
}

/// Validation engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Run every layer even after errors
    pub strict: bool,
    /// Errors collected before validation stops with `TOO_MANY_ERRORS`
    pub max_errors: usize,
    /// Layers that run
    pub enabled_layers: BTreeSet<ValidationLayer>,
    /// Performance thresholds
    pub limits: ResourceLimits,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            strict: false,
            max_errors: 50,
            enabled_layers: ValidationLayer::ALL.into_iter().collect(),
            limits: ResourceLimits::default(),
        }
    }
}

impl ValidationConfig {
    /// Default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every layer even after errors
    #[must_use = "builder methods must be chained or built"]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Set the error cap
    #[must_use = "builder methods must be chained or built"]
    pub fn with_max_errors(mut self, max_errors: usize) -> Self {
        self.max_errors = max_errors;
        self
    }

    /// Enable exactly these layers
    #[must_use = "builder methods must be chained or built"]
    pub fn with_layers(mut self, layers: impl IntoIterator<Item = ValidationLayer>) -> Self {
        self.enabled_layers = layers.into_iter().collect();
        self
    }

    /// Disable one layer
    #[must_use = "builder methods must be chained or built"]
    pub fn without_layer(mut self, layer: ValidationLayer) -> Self {
        self.enabled_layers.remove(&layer);
        self
    }

    /// Set the performance thresholds
    #[must_use = "builder methods must be chained or built"]
    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }
}

// ==================== Validator API ====================

/// A pluggable check run by [`ValidationEngine`]
///
/// Returning `Err` or panicking does not abort validation; the engine
/// records a `VALIDATOR_ERROR` issue instead.
pub trait Validator: Send + Sync + fmt::Debug {
    /// Name used in logs and `VALIDATOR_ERROR` messages
    fn name(&self) -> &str;

    /// Layer the validator belongs to
    fn layer(&self) -> ValidationLayer;

    /// Check the template
    fn validate(&self, ctx: &ValidationContext<'_>) -> ExpressionResult<Vec<ValidationIssue>>;
}

/// One `{{ … }}` expression, parsed once for every validator
#[derive(Debug, Clone)]
pub struct ExpressionUnit {
    /// Index of the expression in the template
    pub index: usize,
    /// Trimmed source, without a trailing `;`
    pub source: String,
    /// Offset of `source` in the template
    pub offset: usize,
    /// Classification from the template parser
    pub expression_type: ExpressionType,
    /// Parsed expression; positions are relative to `source`
    pub ast: Option<AstNode>,
    /// Why parsing failed
    pub parse_error: Option<ExpressionError>,
}

impl ExpressionUnit {
    fn new(
        index: usize,
        cleaned: &str,
        offset: usize,
        expression_type: ExpressionType,
        max_length: usize,
    ) -> Self {
        let source = cleaned.strip_suffix(';').unwrap_or(cleaned).trim_end().to_string();
        let (ast, parse_error) = if source.is_empty()
            || source.len() > max_length
            || expression_type == ExpressionType::Jmespath
        {
            (None, None)
        } else {
            match parse_expression(&source) {
                Ok(ast) => (Some(ast), None),
                Err(err) => (None, Some(err)),
            }
        };
        Self {
            index,
            source,
            offset,
            expression_type,
            ast,
            parse_error,
        }
    }

    /// Whether there is anything to check
    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }
}

/// Everything a validator can look at
pub struct ValidationContext<'a> {
    /// Full template text
    pub template: &'a str,
    /// Template split into expressions
    pub parsed: &'a ParsedTemplate,
    /// Data the template will run against, when known
    pub context: Option<&'a EvaluationContext>,
    /// Catalog of variables, functions and members
    pub registry: &'a Registry,
    /// Active configuration
    pub config: &'a ValidationConfig,
    units: Vec<ExpressionUnit>,
    context_hash: u64,
}

impl<'a> ValidationContext<'a> {
    /// Parse every expression of `parsed` once
    ///
    /// Expressions longer than `limits.max_expression_length` are not parsed;
    /// the performance layer reports them.
    pub fn new(
        template: &'a str,
        parsed: &'a ParsedTemplate,
        context: Option<&'a EvaluationContext>,
        registry: &'a Registry,
        config: &'a ValidationConfig,
    ) -> Self {
        let units = parsed
            .expressions
            .iter()
            .enumerate()
            .map(|(i, expr)| {
                ExpressionUnit::new(
                    i,
                    &expr.cleaned,
                    expr.content_offset,
                    expr.expression_type,
                    config.limits.max_expression_length,
                )
            })
            .collect();
        Self {
            template,
            parsed,
            context,
            registry,
            config,
            units,
            context_hash: context.map_or(0, EvaluationContext::content_hash),
        }
    }

    /// Non-empty expressions in template order
    pub fn units(&self) -> impl Iterator<Item = &ExpressionUnit> {
        self.units.iter().filter(|unit| !unit.is_empty())
    }

    /// Structural hash of the supplied context; `0` without one
    pub fn context_hash(&self) -> u64 {
        self.context_hash
    }

    /// Template position of `start..end` inside `unit`
    pub fn position(&self, unit: &ExpressionUnit, start: usize, end: usize) -> IssuePosition {
        IssuePosition::at(self.template, unit.offset + start, unit.offset + end)
    }

    /// Template position of a whole expression
    pub fn unit_position(&self, unit: &ExpressionUnit) -> IssuePosition {
        self.position(unit, 0, unit.source.len())
    }
}

// ==================== Engine ====================

/// Runs validators layer by layer
#[derive(Debug)]
pub struct ValidationEngine {
    config: ValidationConfig,
    registry: Arc<Registry>,
    validators: Vec<Box<dyn Validator>>,
}

impl Default for ValidationEngine {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

impl ValidationEngine {
    /// Engine with the standard validators and catalog
    pub fn new(config: ValidationConfig) -> Self {
        Self::with_registry(config, Arc::new(Registry::standard()))
    }

    /// Engine with the standard validators and a custom catalog
    pub fn with_registry(config: ValidationConfig, registry: Arc<Registry>) -> Self {
        let mut engine = Self::empty(config, registry);
        engine.add_validator(syntax::JavaScriptSyntaxValidator);
        engine.add_validator(syntax::TemplateSyntaxValidator);
        engine.add_validator(semantic::VariableDependencyValidator::new());
        engine.add_validator(semantic::FunctionParameterValidator);
        engine.add_validator(semantic::TypeCompatibilityValidator);
        engine.add_validator(security::DangerousCodeValidator);
        engine.add_validator(performance::ResourceLimitValidator);
        engine.add_validator(business::BusinessRuleValidator::new());
        debug!(
            validators = engine.validators.len(),
            strict = engine.config.strict,
            "Validation engine created"
        );
        engine
    }

    /// Engine without any validators
    pub fn empty(config: ValidationConfig, registry: Arc<Registry>) -> Self {
        Self {
            config,
            registry,
            validators: Vec::new(),
        }
    }

    /// Register a validator; it runs in its layer after those added earlier
    pub fn add_validator(&mut self, validator: impl Validator + 'static) {
        self.validators.push(Box::new(validator));
    }

    /// Active configuration
    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Catalog used by the validators
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Validate a template
    ///
    /// `parsed` is reused when the caller already has it.
    pub fn validate(
        &self,
        template: &str,
        context: Option<&EvaluationContext>,
        parsed: Option<&ParsedTemplate>,
    ) -> ValidationResult {
        let owned;
        let parsed = match parsed {
            Some(parsed) => parsed,
            None => {
                owned = parse_template(template);
                &owned
            }
        };
        let ctx = ValidationContext::new(template, parsed, context, &self.registry, &self.config);
        let mut result = ValidationResult::default();

        'layers: for layer in ValidationLayer::ALL {
            if !self.config.enabled_layers.contains(&layer) {
                continue;
            }
            if !self.config.strict && !result.errors.is_empty() {
                trace!(layer = %layer, "Skipping layer after errors");
                break;
            }

            for validator in self.validators.iter().filter(|v| v.layer() == layer) {
                let issues = run_validator(validator.as_ref(), &ctx);
                trace!(
                    validator = validator.name(),
                    issues = issues.len(),
                    "Validator finished"
                );
                for issue in issues {
                    if issue.is_error() && result.errors.len() >= self.config.max_errors {
                        result.push(ValidationIssue::error(
                            "TOO_MANY_ERRORS",
                            format!(
                                "Validation stopped after {} errors",
                                self.config.max_errors
                            ),
                            IssuePosition::at(template, 0, template.len()),
                        ));
                        break 'layers;
                    }
                    result.push(issue);
                }
            }
        }

        result
    }
}

fn run_validator(validator: &dyn Validator, ctx: &ValidationContext<'_>) -> Vec<ValidationIssue> {
    let whole = IssuePosition::at(ctx.template, 0, ctx.template.len());
    match catch_unwind(AssertUnwindSafe(|| validator.validate(ctx))) {
        Ok(Ok(issues)) => issues,
        Ok(Err(err)) => {
            warn!(validator = validator.name(), error = %err, "Validator failed");
            vec![ValidationIssue::error(
                "VALIDATOR_ERROR",
                format!("Validator '{}' failed: {err}", validator.name()),
                whole,
            )]
        }
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            warn!(validator = validator.name(), reason = %reason, "Validator panicked");
            vec![ValidationIssue::error(
                "VALIDATOR_ERROR",
                format!("Validator '{}' panicked: {reason}", validator.name()),
                whole,
            )]
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug)]
    struct Panicking;

    impl Validator for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        fn layer(&self) -> ValidationLayer {
            ValidationLayer::Syntax
        }

        fn validate(&self, _ctx: &ValidationContext<'_>) -> ExpressionResult<Vec<ValidationIssue>> {
            panic!("boom");
        }
    }

    #[derive(Debug)]
    struct Failing;

    impl Validator for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn layer(&self) -> ValidationLayer {
            ValidationLayer::Business
        }

        fn validate(&self, _ctx: &ValidationContext<'_>) -> ExpressionResult<Vec<ValidationIssue>> {
            Err(ExpressionError::internal("lookup table missing"))
        }
    }

    /// One error per expression
    #[derive(Debug)]
    struct EveryExpression;

    impl Validator for EveryExpression {
        fn name(&self) -> &str {
            "every-expression"
        }

        fn layer(&self) -> ValidationLayer {
            ValidationLayer::Semantic
        }

        fn validate(&self, ctx: &ValidationContext<'_>) -> ExpressionResult<Vec<ValidationIssue>> {
            Ok(ctx
                .units()
                .map(|unit| ValidationIssue::error("FLAGGED", "flagged", ctx.unit_position(unit)))
                .collect())
        }
    }

    fn engine_with(config: ValidationConfig, validator: impl Validator + 'static) -> ValidationEngine {
        let mut engine = ValidationEngine::empty(config, Arc::new(Registry::standard()));
        engine.add_validator(validator);
        engine
    }

    #[test]
    fn test_panicking_validator_becomes_issue() {
        let result = engine_with(ValidationConfig::default(), Panicking).validate("{{ 1 }}", None, None);
        assert!(!result.is_valid);
        assert_eq!(result.errors[0].code, "VALIDATOR_ERROR");
        assert!(result.errors[0].message.contains("boom"));
    }

    #[test]
    fn test_failing_validator_becomes_issue() {
        let result = engine_with(ValidationConfig::default(), Failing).validate("{{ 1 }}", None, None);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("lookup table missing"));
    }

    #[test]
    fn test_error_cap_appends_too_many_errors() {
        let config = ValidationConfig::default().with_max_errors(2);
        let result = engine_with(config, EveryExpression).validate("{{ a }}{{ b }}{{ c }}{{ d }}", None, None);
        let codes: Vec<&str> = result.errors.iter().map(|e| e.code.as_str()).collect();
        assert_eq!(codes, ["FLAGGED", "FLAGGED", "TOO_MANY_ERRORS"]);
    }

    #[test]
    fn test_non_strict_mode_stops_after_failing_layer() {
        let mut engine = engine_with(ValidationConfig::default(), Panicking);
        engine.add_validator(EveryExpression);
        let result = engine.validate("{{ 1 }}", None, None);
        assert!(!result.has_code("FLAGGED"));

        let mut engine = engine_with(ValidationConfig::default().strict(true), Panicking);
        engine.add_validator(EveryExpression);
        let result = engine.validate("{{ 1 }}", None, None);
        assert!(result.has_code("FLAGGED"));
    }

    #[test]
    fn test_disabled_layers_are_skipped() {
        let config = ValidationConfig::default().without_layer(ValidationLayer::Semantic);
        let engine = ValidationEngine::new(config);
        let result = engine.validate("{{ $if(true) }}", None, None);
        assert!(result.is_valid);
    }

    #[test]
    fn test_units_strip_statement_semicolon() {
        let parsed = parse_template("a {{ $json.x; }} b {{ }}");
        let registry = Registry::standard();
        let config = ValidationConfig::default();
        let ctx = ValidationContext::new("a {{ $json.x; }} b {{ }}", &parsed, None, &registry, &config);
        let units: Vec<_> = ctx.units().collect();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].source, "$json.x");
        assert!(units[0].ast.is_some());
        assert_eq!(units[0].offset, 5);
    }

    #[test]
    fn test_oversized_expressions_are_left_unparsed() {
        let template = "{{ 1 + 2 + 3 }}";
        let parsed = parse_template(template);
        let registry = Registry::standard();
        let config = ValidationConfig::default().with_limits(ResourceLimits {
            max_expression_length: 5,
            ..ResourceLimits::default()
        });
        let ctx = ValidationContext::new(template, &parsed, None, &registry, &config);
        let unit = ctx.units().next().unwrap();
        assert!(unit.ast.is_none());
        assert!(unit.parse_error.is_none());

        let result = ValidationEngine::new(config).validate(template, None, None);
        assert!(result.has_code("EXPRESSION_TOO_LONG"));
        assert!(!result.has_code("SYNTAX_ERROR"));
    }

    #[test]
    fn test_config_roundtrips_through_serde() {
        let config = ValidationConfig::default()
            .strict(true)
            .with_layers([ValidationLayer::Syntax, ValidationLayer::Security]);
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["enabled_layers"], serde_json::json!(["syntax", "security"]));
        let back: ValidationConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }
}
