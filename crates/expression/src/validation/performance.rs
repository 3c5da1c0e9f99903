//! Performance layer: size, nesting, call count and memory estimates

use super::scan::{call_sites, max_nesting};
use super::{IssuePosition, ValidationContext, ValidationIssue, ValidationLayer, Validator};
use crate::core::ast::{AstNode, NodeKind};
use crate::error::ExpressionResult;

/// Array methods that iterate their receiver
const ITERATION_METHODS: [&str; 12] = [
    "map", "filter", "reduce", "forEach", "find", "findIndex", "some", "every", "flatMap", "sort",
    "pluck", "unique",
];

/// Bytes charged per array element and object property
const ELEMENT_COST: usize = 16;
const PROPERTY_COST: usize = 48;

/// Enforces [`ResourceLimits`](super::ResourceLimits)
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceLimitValidator;

impl Validator for ResourceLimitValidator {
    fn name(&self) -> &str {
        "resource-limit"
    }

    fn layer(&self) -> ValidationLayer {
        ValidationLayer::Performance
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> ExpressionResult<Vec<ValidationIssue>> {
        let limits = &ctx.config.limits;
        let mut issues = Vec::new();

        if ctx.template.len() > limits.max_template_length {
            issues.push(ValidationIssue::error(
                "TEMPLATE_TOO_LONG",
                format!(
                    "Template is {} bytes, the limit is {}",
                    ctx.template.len(),
                    limits.max_template_length
                ),
                IssuePosition::at(ctx.template, 0, ctx.template.len()),
            ));
        }

        for unit in ctx.units() {
            let position = ctx.unit_position(unit);

            if unit.source.len() > limits.max_expression_length {
                issues.push(ValidationIssue::error(
                    "EXPRESSION_TOO_LONG",
                    format!(
                        "Expression is {} bytes, the limit is {}",
                        unit.source.len(),
                        limits.max_expression_length
                    ),
                    position,
                ));
            }

            let depth = max_nesting(&unit.source);
            if depth > limits.max_nesting_depth {
                issues.push(
                    ValidationIssue::error(
                        "NESTING_TOO_DEEP",
                        format!("Nesting depth {depth} exceeds {}", limits.max_nesting_depth),
                        position,
                    )
                    .with_suggestion("Split the expression into smaller parts"),
                );
            }

            let sites = call_sites(&unit.source);
            if sites.len() > limits.max_function_calls {
                issues.push(ValidationIssue::warning(
                    "TOO_MANY_FUNCTION_CALLS",
                    format!(
                        "{} function calls, more than {}",
                        sites.len(),
                        limits.max_function_calls
                    ),
                    position,
                ));
            }

            let iterations = sites
                .iter()
                .filter(|site| site.is_member() && ITERATION_METHODS.contains(&site.method_name()))
                .count();
            if iterations > limits.max_iteration_calls {
                issues.push(
                    ValidationIssue::warning(
                        "EXCESSIVE_ITERATION",
                        format!(
                            "{iterations} iterating calls, more than {}",
                            limits.max_iteration_calls
                        ),
                        position,
                    )
                    .with_suggestion("Combine passes with a single reduce"),
                );
            }

            if let Some(ast) = &unit.ast {
                let estimate = memory_estimate(ast);
                if estimate > limits.max_memory_estimate {
                    issues.push(ValidationIssue::warning(
                        "HIGH_MEMORY_USAGE",
                        format!(
                            "Estimated {estimate} bytes of literal data, more than {}",
                            limits.max_memory_estimate
                        ),
                        position,
                    ));
                }
            }
        }

        Ok(issues)
    }
}

/// Rough byte count of the data an expression builds from literals
pub fn memory_estimate(ast: &AstNode) -> usize {
    let mut total = 0usize;
    ast.walk(&mut |node| {
        let cost = match &node.kind {
            NodeKind::StringLiteral { value } => value.len(),
            NodeKind::ArrayExpression { elements } => elements.len() * ELEMENT_COST,
            NodeKind::ObjectExpression { properties } => properties.len() * PROPERTY_COST,
            NodeKind::CallExpression {
                callee, arguments, ..
            } => string_growth(callee, arguments),
            _ => 0,
        };
        total = total.saturating_add(cost);
    });
    total
}

/// `'ab'.repeat(n)` and `padStart(n)` style growth with literal arguments
fn string_growth(callee: &AstNode, arguments: &[AstNode]) -> usize {
    let NodeKind::MemberExpression {
        object, property, ..
    } = &callee.kind
    else {
        return 0;
    };
    let NodeKind::Identifier { name } = &property.kind else {
        return 0;
    };
    let Some(NodeKind::NumericLiteral { value }) = arguments.first().map(|a| &a.kind) else {
        return 0;
    };
    if !value.is_finite() || *value <= 0.0 {
        return 0;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let count = *value as usize;

    match name.as_str() {
        "repeat" => match &object.kind {
            NodeKind::StringLiteral { value } => value.len().saturating_mul(count),
            _ => count,
        },
        "padStart" | "padEnd" => count,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression;
    use crate::registry::Registry;
    use crate::template::parse_template;
    use crate::validation::{ResourceLimits, Severity, ValidationConfig};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn run(template: &str, limits: ResourceLimits) -> Vec<ValidationIssue> {
        let parsed = parse_template(template);
        let registry = Registry::standard();
        let config = ValidationConfig::default().with_limits(limits);
        let ctx = ValidationContext::new(template, &parsed, None, &registry, &config);
        ResourceLimitValidator.validate(&ctx).unwrap()
    }

    fn codes(issues: &[ValidationIssue]) -> Vec<&str> {
        issues.iter().map(|issue| issue.code.as_str()).collect()
    }

    #[test]
    fn test_defaults_accept_ordinary_templates() {
        let issues = run(
            "Hello {{ $json.name.toUpperCase() }}, {{ $json.items.map(i => i.id).join(', ') }}",
            ResourceLimits::default(),
        );
        assert_eq!(issues, vec![]);
    }

    #[rstest]
    #[case(ResourceLimits { max_template_length: 10, ..ResourceLimits::default() }, "TEMPLATE_TOO_LONG")]
    #[case(ResourceLimits { max_expression_length: 5, ..ResourceLimits::default() }, "EXPRESSION_TOO_LONG")]
    #[case(ResourceLimits { max_nesting_depth: 1, ..ResourceLimits::default() }, "NESTING_TOO_DEEP")]
    #[case(ResourceLimits { max_function_calls: 2, ..ResourceLimits::default() }, "TOO_MANY_FUNCTION_CALLS")]
    #[case(ResourceLimits { max_iteration_calls: 1, ..ResourceLimits::default() }, "EXCESSIVE_ITERATION")]
    fn test_each_limit(#[case] limits: ResourceLimits, #[case] expected: &str) {
        let issues = run(
            "{{ $json.items.filter(i => i.ok).map(i => Math.max(i.a, 1)) }}",
            limits,
        );
        assert_eq!(codes(&issues), [expected]);
    }

    #[test]
    fn test_length_and_depth_are_errors() {
        let limits = ResourceLimits {
            max_nesting_depth: 1,
            max_function_calls: 0,
            ..ResourceLimits::default()
        };
        let issues = run("{{ f(g(1)) }}", limits);
        let severities: Vec<(&str, Severity)> = issues
            .iter()
            .map(|issue| (issue.code.as_str(), issue.severity))
            .collect();
        assert_eq!(
            severities,
            [
                ("NESTING_TOO_DEEP", Severity::Error),
                ("TOO_MANY_FUNCTION_CALLS", Severity::Warning)
            ]
        );
    }

    #[test]
    fn test_memory_estimate() {
        let ast = parse_expression("'abc'.repeat(1000) + [1, 2].join('-')").unwrap();
        assert_eq!(memory_estimate(&ast), 3 + 3000 + 2 * ELEMENT_COST + 1);

        let issues = run("{{ 'abc'.repeat(1000000) }}", ResourceLimits::default());
        assert_eq!(codes(&issues), ["HIGH_MEMORY_USAGE"]);
    }
}
