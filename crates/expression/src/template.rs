//! Template parsing
//!
//! Splits text into static segments and `{{ … }}` expression spans, classifies
//! each expression and collects the context variables the template reads.
//! Parsing never fails: structural problems (unbalanced or nested braces,
//! empty spans) are reported by [`validate_template`].

use crate::validation::{IssuePosition, ValidationIssue, ValidationResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;
use tracing::trace;

/// Context variables recognised as template dependencies
static DEPENDENCY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\$(?:json|item|node|vars|workflow|execution|now|today|if|isEmpty|isNotEmpty)\b",
    )
    .expect("dependency pattern is valid")
});

/// `$node["Name"]` / `$node['Name']`
static NODE_REFERENCE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\$node\[\s*(?:"([^"]*)"|'([^']*)')\s*\]"#).expect("node pattern is valid")
});

/// Expression flavour, decided by the operators it contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpressionType {
    /// Plain JavaScript-like expression
    Javascript,
    /// JMESPath query syntax only
    Jmespath,
    /// Both JMESPath operators and JavaScript syntax
    Mixed,
}

impl fmt::Display for ExpressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExpressionType::Javascript => "javascript",
            ExpressionType::Jmespath => "jmespath",
            ExpressionType::Mixed => "mixed",
        })
    }
}

/// Byte range of a `{{ … }}` span in the template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Offset of the opening `{{`
    pub start: usize,
    /// Offset just past the closing `}}`
    pub end: usize,
}

/// One `{{ … }}` expression of a template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedExpression {
    /// Text between the delimiters, untrimmed
    pub raw: String,
    /// Trimmed expression text
    pub cleaned: String,
    /// Expression flavour
    #[serde(rename = "type")]
    pub expression_type: ExpressionType,
    /// Span of the delimiters and content
    pub position: Position,
    /// Offset of `cleaned` in the template
    pub content_offset: usize,
}

/// A template split into static parts and expressions
///
/// `static_parts.len() == expressions.len() + 1` always holds; boundary
/// parts are empty strings when the template starts or ends with a span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedTemplate {
    /// Whether the text contains at least one expression
    pub is_template: bool,
    /// Expressions in source order
    pub expressions: Vec<ParsedExpression>,
    /// Text around the expressions
    pub static_parts: Vec<String>,
    /// Context variables and node references the template reads
    pub dependencies: BTreeSet<String>,
}

impl ParsedTemplate {
    /// Interleave static parts with one rendered string per expression
    pub fn reassemble<S: AsRef<str>>(&self, rendered: &[S]) -> String {
        let mut out = String::new();
        for (i, part) in self.static_parts.iter().enumerate() {
            out.push_str(part);
            if let Some(value) = rendered.get(i) {
                out.push_str(value.as_ref());
            }
        }
        out
    }

    /// Whether the template is exactly one expression with no surrounding text
    pub fn is_single_expression(&self) -> bool {
        self.expressions.len() == 1 && self.static_parts.iter().all(String::is_empty)
    }
}

/// Parse a template into static parts and expressions
pub fn parse_template(text: &str) -> ParsedTemplate {
    let spans = find_expression_spans(text);

    let mut expressions = Vec::with_capacity(spans.len());
    let mut static_parts = Vec::with_capacity(spans.len() + 1);
    let mut dependencies = BTreeSet::new();
    let mut cursor = 0;

    for (start, end) in spans {
        static_parts.push(text[cursor..start].to_string());

        let raw = &text[start + 2..end - 2];
        let leading = raw.len() - raw.trim_start().len();
        let cleaned = raw.trim();

        collect_dependencies(cleaned, &mut dependencies);
        expressions.push(ParsedExpression {
            raw: raw.to_string(),
            cleaned: cleaned.to_string(),
            expression_type: classify_expression(cleaned),
            position: Position { start, end },
            content_offset: start + 2 + leading,
        });

        cursor = end;
    }
    static_parts.push(text[cursor..].to_string());

    trace!(
        expressions = expressions.len(),
        dependencies = dependencies.len(),
        "Parsed template"
    );

    ParsedTemplate {
        is_template: !expressions.is_empty(),
        expressions,
        static_parts,
        dependencies,
    }
}

/// Classify an expression by the query operators it contains
pub fn classify_expression(expression: &str) -> ExpressionType {
    let without_or = expression.replace("||", "");
    let has_jmespath = without_or.contains('|')
        || expression.contains("[?")
        || expression.contains("[*")
        || expression.contains("[]");
    if !has_jmespath {
        return ExpressionType::Javascript;
    }

    let has_javascript = expression.contains("=>")
        || expression.contains("&&")
        || expression.contains("||")
        || expression.contains("===")
        || expression.contains('$')
        || expression.contains('(');
    if has_javascript {
        ExpressionType::Mixed
    } else {
        ExpressionType::Jmespath
    }
}

/// Cheap structural checks: brace parity, nesting and empty spans
pub fn validate_template(text: &str) -> ValidationResult {
    let mut result = ValidationResult::default();

    let opens = text.matches("{{").count();
    let closes = text.matches("}}").count();
    if opens != closes {
        result.push(ValidationIssue::error(
            "UNMATCHED_BRACES",
            format!("Template has {opens} opening '{{{{' and {closes} closing '}}}}'"),
            IssuePosition::at(text, 0, text.len()),
        ));
    }

    for offset in find_nested_openings(text) {
        result.push(ValidationIssue::error(
            "NESTED_TEMPLATES",
            "Templates cannot be nested inside another '{{ }}' expression",
            IssuePosition::at(text, offset, offset + 2),
        ));
    }

    for expression in parse_template(text).expressions {
        if expression.cleaned.is_empty() {
            result.push(ValidationIssue::error(
                "EMPTY_EXPRESSION",
                "Expression between '{{' and '}}' is empty",
                IssuePosition::at(text, expression.position.start, expression.position.end),
            ));
        }
    }

    result
}

/// Offsets of `{{` that appear inside an already open span
pub fn find_nested_openings(text: &str) -> Vec<usize> {
    let bytes = text.as_bytes();
    let mut nested = Vec::new();
    let mut open = false;
    let mut i = 0;

    while i + 1 < bytes.len() {
        match (bytes[i], bytes[i + 1]) {
            (b'{', b'{') => {
                if open {
                    nested.push(i);
                }
                open = true;
                i += 2;
            }
            (b'}', b'}') => {
                open = false;
                i += 2;
            }
            _ => i += 1,
        }
    }

    nested
}

fn collect_dependencies(expression: &str, dependencies: &mut BTreeSet<String>) {
    for found in DEPENDENCY_REGEX.find_iter(expression) {
        dependencies.insert(found.as_str().to_string());
    }
    for captures in NODE_REFERENCE_REGEX.captures_iter(expression) {
        if let Some(name) = captures.get(1).or_else(|| captures.get(2)) {
            dependencies.insert("$node".to_string());
            dependencies.insert(format!("$node[\"{}\"]", name.as_str()));
        }
    }
}

enum Close {
    Found(usize),
    Nested,
    Unclosed,
}

/// Byte ranges (`{{` to past `}}`) of every well-formed expression span
fn find_expression_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut cursor = 0;

    while let Some(relative) = text[cursor..].find("{{") {
        let open = cursor + relative;
        let close = match find_close(text, open + 2, true) {
            // An unterminated quote may be part of a broken expression;
            // fall back to plain brace matching so it still surfaces as a span.
            Close::Unclosed => find_close(text, open + 2, false),
            other => other,
        };

        match close {
            Close::Found(close) => {
                spans.push((open, close + 2));
                cursor = close + 2;
            }
            Close::Nested | Close::Unclosed => cursor = open + 1,
        }
    }

    spans
}

/// Find the `}}` closing a span whose content starts at `from`
fn find_close(text: &str, from: usize, quote_aware: bool) -> Close {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = from;

    while i < bytes.len() {
        let byte = bytes[i];
        let next = bytes.get(i + 1).copied();

        if let Some(q) = quote {
            if byte == b'\\' {
                i += 2;
                continue;
            }
            if byte == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        match byte {
            b'"' | b'\'' | b'`' if quote_aware => quote = Some(byte),
            b'{' if depth == 0 && next == Some(b'{') => return Close::Nested,
            b'{' => depth += 1,
            b'}' if depth == 0 && next == Some(b'}') => return Close::Found(i),
            b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
        i += 1;
    }

    Close::Unclosed
}
