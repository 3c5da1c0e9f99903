//! Semantic layer: variables, property paths, call arity and literal types

use super::scan::call_sites;
use super::{ExpressionUnit, ValidationContext, ValidationIssue, ValidationLayer, Validator};
use crate::core::ast::{AstNode, BinaryOperator, NodeKind};
use crate::error::ExpressionResult;
use crate::registry::{FunctionSignature, ValueType};
use crate::template::ExpressionType;
use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;
use std::num::NonZeroUsize;

const PATH_CACHE_CAPACITY: NonZeroUsize = NonZeroUsize::new(256).unwrap();

// ==================== Variables and properties ====================

/// A static member chain rooted at an identifier (`$json.user?.name`)
#[derive(Debug)]
struct MemberPath<'a> {
    root: &'a AstNode,
    root_name: &'a str,
    segments: Vec<Segment>,
}

#[derive(Debug)]
struct Segment {
    name: String,
    optional: bool,
    start: usize,
    end: usize,
}

impl MemberPath<'_> {
    fn cache_key(&self) -> String {
        let mut key = self.root_name.to_string();
        for segment in &self.segments {
            key.push_str(if segment.optional { "?." } else { "." });
            key.push_str(&segment.name);
        }
        key
    }
}

/// Failed property lookup: segment index and message
type PathFailure = Option<(usize, String)>;

/// Checks `$` variables against the registry and the context, and walks
/// static property paths over the context data
///
/// Path results are cached per context content.
#[derive(Debug)]
pub struct VariableDependencyValidator {
    paths: Mutex<LruCache<(String, u64), PathFailure>>,
}

impl Default for VariableDependencyValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableDependencyValidator {
    /// Validator with an empty path cache
    pub fn new() -> Self {
        Self {
            paths: Mutex::new(LruCache::new(PATH_CACHE_CAPACITY)),
        }
    }

    fn visit(
        &self,
        ctx: &ValidationContext<'_>,
        unit: &ExpressionUnit,
        node: &AstNode,
        bound: &mut Vec<String>,
        issues: &mut Vec<ValidationIssue>,
    ) {
        match &node.kind {
            NodeKind::Identifier { name } => {
                self.check_variable(ctx, unit, node, name, bound, issues);
            }
            NodeKind::MemberExpression { .. } => match member_path(node) {
                Some(path) => {
                    if self.check_variable(ctx, unit, path.root, path.root_name, bound, issues) {
                        self.check_path(ctx, unit, &path, issues);
                    }
                }
                None => {
                    for child in node.children() {
                        self.visit(ctx, unit, child, bound, issues);
                    }
                }
            },
            NodeKind::ArrowFunctionExpression { params, body } => {
                let depth = bound.len();
                bound.extend(params.iter().cloned());
                self.visit(ctx, unit, body, bound, issues);
                bound.truncate(depth);
            }
            _ => {
                for child in node.children() {
                    self.visit(ctx, unit, child, bound, issues);
                }
            }
        }
    }

    /// Report unknown or deprecated `$` names; true when the name resolves
    /// to context data worth walking
    fn check_variable(
        &self,
        ctx: &ValidationContext<'_>,
        unit: &ExpressionUnit,
        node: &AstNode,
        name: &str,
        bound: &[String],
        issues: &mut Vec<ValidationIssue>,
    ) -> bool {
        if !name.starts_with('$') || bound.iter().any(|b| b == name) {
            return false;
        }

        if let Some(info) = ctx.registry.variable(name) {
            if info.deprecated {
                let mut issue = ValidationIssue::warning(
                    "DEPRECATED_VARIABLE",
                    format!("'{name}' is deprecated"),
                    ctx.position(unit, node.start, node.end),
                );
                if let Some(replacement) = &info.replacement {
                    issue = issue.with_suggestion(format!("Use '{replacement}' instead"));
                }
                issues.push(issue);
            }
            return ctx.context.is_some_and(|c| c.contains(name));
        }

        if ctx.registry.function(name).is_some() {
            return false;
        }

        if ctx.context.is_some_and(|c| c.contains(name)) {
            return true;
        }
        issues.push(undefined_variable(ctx, unit, node, name));
        false
    }

    fn check_path(
        &self,
        ctx: &ValidationContext<'_>,
        unit: &ExpressionUnit,
        path: &MemberPath<'_>,
        issues: &mut Vec<ValidationIssue>,
    ) {
        let Some(root) = ctx.context.and_then(|c| c.get(path.root_name)) else {
            return;
        };

        let key = (path.cache_key(), ctx.context_hash());
        let cached = self.paths.lock().get(&key).cloned();
        let failure = match cached {
            Some(failure) => failure,
            None => {
                let failure = walk_path(ctx, root, path);
                self.paths.lock().put(key, failure.clone());
                failure
            }
        };

        if let Some((index, message)) = failure {
            let segment = &path.segments[index];
            issues.push(ValidationIssue::error(
                "UNDEFINED_PROPERTY",
                message,
                ctx.position(unit, segment.start, segment.end),
            ));
        }
    }
}

impl Validator for VariableDependencyValidator {
    fn name(&self) -> &str {
        "variable-dependency"
    }

    fn layer(&self) -> ValidationLayer {
        ValidationLayer::Semantic
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> ExpressionResult<Vec<ValidationIssue>> {
        let mut issues = Vec::new();
        for unit in ctx.units() {
            if let Some(ast) = &unit.ast {
                self.visit(ctx, unit, ast, &mut Vec::new(), &mut issues);
            }
        }
        Ok(issues)
    }
}

fn undefined_variable(
    ctx: &ValidationContext<'_>,
    unit: &ExpressionUnit,
    node: &AstNode,
    name: &str,
) -> ValidationIssue {
    let issue = ValidationIssue::error(
        "UNDEFINED_VARIABLE",
        format!("Variable '{name}' is not defined"),
        ctx.position(unit, node.start, node.end),
    );
    let lowered = name.to_lowercase();
    match ctx
        .registry
        .variables()
        .find(|v| v.name.to_lowercase() == lowered)
    {
        Some(close) => issue.with_suggestion(format!("Did you mean '{}'?", close.name)),
        None => issue,
    }
}

/// Static chain of `node`, or `None` when any link is computed from a
/// non-literal
fn member_path(node: &AstNode) -> Option<MemberPath<'_>> {
    match &node.kind {
        NodeKind::Identifier { name } => Some(MemberPath {
            root: node,
            root_name: name,
            segments: Vec::new(),
        }),
        NodeKind::MemberExpression {
            object,
            property,
            computed,
            optional,
        } => {
            let mut path = member_path(object)?;
            let name = match (&property.kind, computed) {
                (NodeKind::Identifier { name }, false) => name.clone(),
                (NodeKind::StringLiteral { value }, true) => value.clone(),
                (NodeKind::NumericLiteral { value }, true)
                    if value.fract() == 0.0 && *value >= 0.0 =>
                {
                    format!("{value}")
                }
                _ => return None,
            };
            path.segments.push(Segment {
                name,
                optional: *optional,
                start: property.start,
                end: property.end,
            });
            Some(path)
        }
        _ => None,
    }
}

fn walk_path(ctx: &ValidationContext<'_>, root: &Value, path: &MemberPath<'_>) -> PathFailure {
    let mut current = root;
    let mut walked = path.root_name.to_string();

    for (index, segment) in path.segments.iter().enumerate() {
        let next = match current {
            Value::Null => {
                if segment.optional {
                    return None;
                }
                return Some((
                    index,
                    format!("Cannot read property '{}' of null ({walked})", segment.name),
                ));
            }
            Value::Object(map) => map.get(&segment.name),
            Value::Array(items) => segment
                .name
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i)),
            // a character; nothing further to check
            Value::String(text)
                if segment
                    .name
                    .parse::<usize>()
                    .is_ok_and(|i| i < text.chars().count()) =>
            {
                return None;
            }
            Value::String(_) | Value::Bool(_) | Value::Number(_) => None,
        };

        match next {
            Some(value) => current = value,
            None => {
                let is_member = json_type(current)
                    .is_some_and(|ty| ctx.registry.member(ty, &segment.name).is_some());
                if is_member {
                    return None;
                }
                return Some((
                    index,
                    format!("Property '{}' does not exist on {walked}", segment.name),
                ));
            }
        }

        walked.push('.');
        walked.push_str(&segment.name);
    }
    None
}

fn json_type(value: &Value) -> Option<ValueType> {
    match value {
        Value::Null => None,
        Value::Bool(_) => Some(ValueType::Boolean),
        Value::Number(_) => Some(ValueType::Number),
        Value::String(_) => Some(ValueType::String),
        Value::Array(_) => Some(ValueType::Array),
        Value::Object(_) => Some(ValueType::Object),
    }
}

// ==================== Call arity ====================

const CONTROL_KEYWORDS: [&str; 6] = ["if", "while", "for", "switch", "catch", "function"];

/// Checks call arity against registry signatures
#[derive(Debug, Clone, Copy, Default)]
pub struct FunctionParameterValidator;

impl Validator for FunctionParameterValidator {
    fn name(&self) -> &str {
        "function-parameter"
    }

    fn layer(&self) -> ValidationLayer {
        ValidationLayer::Semantic
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> ExpressionResult<Vec<ValidationIssue>> {
        let mut issues = Vec::new();

        for unit in ctx.units() {
            if unit.expression_type == ExpressionType::Jmespath {
                continue;
            }
            for site in call_sites(&unit.source) {
                if CONTROL_KEYWORDS.contains(&site.callee.as_str()) {
                    continue;
                }
                let position = ctx.position(unit, site.start, site.end);

                let candidates: Vec<&FunctionSignature> = match ctx.registry.function(&site.callee) {
                    Some(info) => match &info.signature {
                        Some(signature) => vec![signature],
                        None => continue,
                    },
                    None if site.is_member() => ctx
                        .registry
                        .find_method(site.method_name())
                        .into_iter()
                        .filter_map(|(_, info)| info.signature.as_ref())
                        .collect(),
                    None => Vec::new(),
                };

                let Some(first) = candidates.first() else {
                    issues.push(ValidationIssue::warning(
                        "UNKNOWN_FUNCTION",
                        format!("'{}' is not a known function", site.callee),
                        position,
                    ));
                    continue;
                };
                if candidates.iter().any(|sig| sig.accepts(site.arg_count)) {
                    continue;
                }

                let name = site.method_name();
                let code = if site.arg_count < first.min_args {
                    "INSUFFICIENT_ARGUMENTS"
                } else {
                    "TOO_MANY_ARGUMENTS"
                };
                issues.push(
                    ValidationIssue::error(
                        code,
                        format!(
                            "{} expects {} argument(s), got {}",
                            site.callee,
                            first.expected_args(),
                            site.arg_count
                        ),
                        position,
                    )
                    .with_suggestion(first.render(name)),
                );
            }
        }

        Ok(issues)
    }
}

// ==================== Literal types ====================

/// Flags arithmetic between literals of different types and literal
/// division by zero
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeCompatibilityValidator;

impl Validator for TypeCompatibilityValidator {
    fn name(&self) -> &str {
        "type-compatibility"
    }

    fn layer(&self) -> ValidationLayer {
        ValidationLayer::Semantic
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> ExpressionResult<Vec<ValidationIssue>> {
        let mut issues = Vec::new();

        for unit in ctx.units() {
            let Some(ast) = &unit.ast else { continue };
            ast.walk(&mut |node| {
                let NodeKind::BinaryExpression {
                    operator,
                    left,
                    right,
                } = &node.kind
                else {
                    return;
                };
                let position = ctx.position(unit, node.start, node.end);

                let mixed = matches!(
                    (&left.kind, &right.kind),
                    (NodeKind::StringLiteral { .. }, NodeKind::NumericLiteral { .. })
                        | (NodeKind::NumericLiteral { .. }, NodeKind::StringLiteral { .. })
                );
                if mixed {
                    match operator {
                        BinaryOperator::Add => issues.push(
                            ValidationIssue::warning(
                                "IMPLICIT_TYPE_COERCION",
                                format!("'{}' concatenates a string and a number", node.raw),
                                position,
                            )
                            .with_suggestion("Convert explicitly with String() or Number()"),
                        ),
                        BinaryOperator::Subtract
                        | BinaryOperator::Multiply
                        | BinaryOperator::Divide
                        | BinaryOperator::Modulo => issues.push(ValidationIssue::warning(
                            "TYPE_MISMATCH",
                            format!("'{operator}' applied to a string and a number"),
                            position,
                        )),
                        _ => {}
                    }
                }

                if matches!(operator, BinaryOperator::Divide | BinaryOperator::Modulo)
                    && matches!(right.kind, NodeKind::NumericLiteral { value } if value == 0.0)
                {
                    issues.push(ValidationIssue::warning(
                        "DIVISION_BY_ZERO",
                        format!("'{}' divides by zero", node.raw),
                        position,
                    ));
                }
            });
        }

        Ok(issues)
    }
}
