//! Syntax layer: parse errors, bracket and quote balance, template structure

use super::scan::{bracket_imbalance, call_sites, mask_strings, quote_imbalance};
use super::{ValidationContext, ValidationIssue, ValidationLayer, Validator};
use crate::error::ExpressionResult;
use crate::template::validate_template;
use regex::Regex;
use std::sync::LazyLock;

/// Words that cannot name a function
const RESERVED_WORDS: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete", "do",
    "else", "export", "extends", "finally", "for", "function", "if", "import", "instanceof", "let",
    "new", "super", "switch", "this", "throw", "try", "var", "while", "with", "yield",
];

/// Common misspellings and their fixes
const TYPOS: &[(&str, &str)] = &[
    ("lenght", "length"),
    ("lengh", "length"),
    ("$JSON", "$json"),
    ("$Json", "$json"),
    ("$NODE", "$node"),
    ("$Node", "$node"),
    ("$itme", "$item"),
    ("toUppercase", "toUpperCase"),
    ("toLowercase", "toLowerCase"),
    ("indexof", "indexOf"),
    ("tostring", "toString"),
    ("udefined", "undefined"),
];

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_$][\w$]*").expect("valid identifier regex"));

/// Digit-led words such as `2abc` or `$1x`
static MALFORMED_IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^\w$.])(\$?\d+[A-Za-z_$][\w$]*)").expect("valid malformed-identifier regex")
});

/// Numeric literals the malformed-identifier pattern would otherwise catch
static NUMBER_LIKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:0[xX][0-9a-fA-F]+|0[bB][01]+|0[oO][0-7]+|\d+[eE][+-]?\d*)$")
        .expect("valid number regex")
});

/// Parses every expression and checks delimiters and identifiers
#[derive(Debug, Clone, Copy, Default)]
pub struct JavaScriptSyntaxValidator;

impl Validator for JavaScriptSyntaxValidator {
    fn name(&self) -> &str {
        "javascript-syntax"
    }

    fn layer(&self) -> ValidationLayer {
        ValidationLayer::Syntax
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> ExpressionResult<Vec<ValidationIssue>> {
        let mut issues = Vec::new();

        for unit in ctx.units() {
            if let Some(err) = &unit.parse_error {
                let span = err.span().unwrap_or_default();
                let start = (span.start as usize).min(unit.source.len());
                let end = (span.end as usize).clamp(start, unit.source.len());
                issues.push(ValidationIssue::error(
                    "SYNTAX_ERROR",
                    err.to_string(),
                    ctx.position(unit, start, end),
                ));
            }

            if let Some(imbalance) = bracket_imbalance(&unit.source) {
                issues.push(ValidationIssue::error(
                    "BRACKET_MISMATCH",
                    imbalance.message,
                    ctx.position(unit, imbalance.offset, imbalance.offset + 1),
                ));
            }
            if let Some(imbalance) = quote_imbalance(&unit.source) {
                issues.push(ValidationIssue::error(
                    "QUOTE_MISMATCH",
                    imbalance.message,
                    ctx.position(unit, imbalance.offset, imbalance.offset + 1),
                ));
            }

            for site in call_sites(&unit.source) {
                if RESERVED_WORDS.contains(&site.callee.as_str()) {
                    issues.push(
                        ValidationIssue::warning(
                            "RESERVED_WORD",
                            format!("'{}' is a reserved word and cannot be called", site.callee),
                            ctx.position(unit, site.start, site.start + site.callee.len()),
                        )
                        .with_suggestion(format!("Use $if(...) or a ternary instead of '{}'", site.callee)),
                    );
                }
            }

            let masked = mask_strings(&unit.source);
            for caps in MALFORMED_IDENTIFIER.captures_iter(&masked) {
                let Some(word) = caps.get(1) else { continue };
                if NUMBER_LIKE.is_match(word.as_str()) {
                    continue;
                }
                issues.push(ValidationIssue::warning(
                    "INVALID_IDENTIFIER",
                    format!("'{}' is not a valid identifier", word.as_str()),
                    ctx.position(unit, word.start(), word.end()),
                ));
            }

            for word in IDENTIFIER.find_iter(&masked) {
                if let Some((_, fix)) = TYPOS.iter().find(|(typo, _)| *typo == word.as_str()) {
                    issues.push(
                        ValidationIssue::warning(
                            "POSSIBLE_TYPO",
                            format!("'{}' looks like a typo", word.as_str()),
                            ctx.position(unit, word.start(), word.end()),
                        )
                        .with_suggestion(format!("Did you mean '{fix}'?")),
                    );
                }
            }
        }

        Ok(issues)
    }
}

/// Template-level brace structure
///
/// Brace parity and nesting are errors; an empty `{{ }}` is only a warning.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateSyntaxValidator;

impl Validator for TemplateSyntaxValidator {
    fn name(&self) -> &str {
        "template-syntax"
    }

    fn layer(&self) -> ValidationLayer {
        ValidationLayer::Syntax
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> ExpressionResult<Vec<ValidationIssue>> {
        let structural = validate_template(ctx.template);
        Ok(structural
            .issues()
            .map(|issue| match issue.code.as_str() {
                "UNMATCHED_BRACES" => {
                    ValidationIssue::error("TEMPLATE_MISMATCH", issue.message.clone(), issue.position)
                }
                "EMPTY_EXPRESSION" => {
                    ValidationIssue::warning(issue.code.clone(), issue.message.clone(), issue.position)
                }
                _ => issue.clone(),
            })
            .collect())
    }
}
