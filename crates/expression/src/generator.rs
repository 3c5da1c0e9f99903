//! AST generation for expressions, templates and programs
//!
//! Expressions are parsed with the recursive-descent [`Parser`]; template
//! nodes mirror a [`ParsedTemplate`] part for part, with every offset in
//! template coordinates. Pure JMESPath spans are not JavaScript and keep
//! their query text as a `StringLiteral`.
//!
//! [`Parser`]: crate::parser::Parser

use crate::core::ast::{AstNode, NodeKind, TemplatePart};
use crate::error::{ExpressionError, ExpressionResult};
use crate::parser::parse_expression;
use crate::template::{ExpressionType, ParsedExpression, ParsedTemplate};
use tracing::trace;

/// Parse a single expression; offsets are relative to `expression`
pub fn generate_from_expression(expression: &str) -> ExpressionResult<AstNode> {
    parse_expression(expression)
}

/// Build a `Template` node from a parsed template
///
/// Parse errors are reported with spans in template coordinates.
pub fn generate_from_template(text: &str, parsed: &ParsedTemplate) -> ExpressionResult<AstNode> {
    let mut parts = Vec::with_capacity(parsed.static_parts.len() + parsed.expressions.len());
    let mut cursor = 0;

    for (index, expression) in parsed.expressions.iter().enumerate() {
        parts.push(TemplatePart::TemplateText {
            value: parsed.static_parts[index].clone(),
            start: cursor,
            end: expression.position.start,
        });

        let inner = span_expression(expression)?;
        let (start, end) = (expression.position.start, expression.position.end);
        parts.push(TemplatePart::TemplateExpression {
            expression: AstNode::new(
                NodeKind::Expression {
                    expression: Box::new(inner),
                },
                start,
                end,
                &text[start..end],
            ),
        });
        cursor = end;
    }

    parts.push(TemplatePart::TemplateText {
        value: parsed.static_parts.last().cloned().unwrap_or_default(),
        start: cursor,
        end: text.len(),
    });

    let node = AstNode::new(NodeKind::Template { parts }, 0, text.len(), text);
    trace!(complexity = node.complexity, "Generated template AST");
    Ok(node)
}

fn span_expression(expression: &ParsedExpression) -> ExpressionResult<AstNode> {
    let offset = expression.content_offset;
    if expression.expression_type == ExpressionType::Jmespath {
        let query = &expression.cleaned;
        return Ok(AstNode::new(
            NodeKind::StringLiteral {
                value: query.clone(),
            },
            offset,
            offset + query.len(),
            query.as_str(),
        ));
    }

    let mut inner =
        parse_expression(&expression.cleaned).map_err(|err| shift_error(err, offset))?;
    inner.shift(offset);
    Ok(inner)
}

/// Build a `Program` node
///
/// A template becomes a single `Template` statement; any other text must be
/// a bare expression and becomes an `ExpressionStatement`.
pub fn generate_program(text: &str, parsed: &ParsedTemplate) -> ExpressionResult<AstNode> {
    let statement = if parsed.is_template {
        generate_from_template(text, parsed)?
    } else {
        let leading = text.len() - text.trim_start().len();
        let mut expression =
            parse_expression(text.trim()).map_err(|err| shift_error(err, leading))?;
        expression.shift(leading);
        let (start, end) = (expression.start, expression.end);
        AstNode::new(
            NodeKind::ExpressionStatement {
                expression: Box::new(expression),
            },
            start,
            end,
            &text[start..end],
        )
    };

    Ok(AstNode::new(
        NodeKind::Program {
            body: vec![statement],
        },
        0,
        text.len(),
        text,
    ))
}

fn shift_error(err: ExpressionError, offset: usize) -> ExpressionError {
    match err {
        ExpressionError::Syntax { message, span } => ExpressionError::Syntax {
            message,
            span: span.map(|s| s.shift(offset)),
        },
        ExpressionError::Parse { message, span } => ExpressionError::Parse {
            message,
            span: span.map(|s| s.shift(offset)),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::span::Span;
    use crate::template::parse_template;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_template_mirrors_parsed_parts() {
        let text = "Hello {{ $json.name }}, you are {{ $json.age + 1 }}";
        let parsed = parse_template(text);
        let node = generate_from_template(text, &parsed).unwrap();

        let NodeKind::Template { parts } = &node.kind else {
            panic!("expected template");
        };
        assert_eq!(parts.len(), parsed.static_parts.len() + parsed.expressions.len());

        let TemplatePart::TemplateExpression { expression } = &parts[3] else {
            panic!("expected expression part");
        };
        assert_eq!(expression.raw, "{{ $json.age + 1 }}");
        let NodeKind::Expression { expression: inner } = &expression.kind else {
            panic!("expected expression node");
        };
        assert_eq!(&text[inner.start..inner.end], "$json.age + 1");
        assert_eq!(node.complexity, 2 + 4);
    }

    #[test]
    fn test_template_text_offsets() {
        let text = "a{{ 1 }}bc";
        let node = generate_from_template(text, &parse_template(text)).unwrap();
        let NodeKind::Template { parts } = &node.kind else {
            panic!("expected template");
        };
        assert_eq!(
            parts[2],
            TemplatePart::TemplateText {
                value: "bc".to_string(),
                start: 8,
                end: 10,
            }
        );
    }

    #[test]
    fn test_jmespath_span_keeps_query_text() {
        let text = "ids: {{ items[*].id }}";
        let parsed = parse_template(text);
        let node = generate_from_template(text, &parsed).unwrap();

        let NodeKind::Template { parts } = &node.kind else {
            panic!("expected template");
        };
        assert_eq!(parts.len(), 3);
        let TemplatePart::TemplateExpression { expression } = &parts[1] else {
            panic!("expected expression part");
        };
        let NodeKind::Expression { expression: inner } = &expression.kind else {
            panic!("expected expression node");
        };
        assert_eq!(
            inner.kind,
            NodeKind::StringLiteral {
                value: "items[*].id".to_string()
            }
        );
        assert_eq!(&text[inner.start..inner.end], "items[*].id");
    }

    #[test]
    fn test_parse_error_in_template_coordinates() {
        let text = "ok {{ 1 }} then {{ 1 + }}";
        let err = generate_from_template(text, &parse_template(text)).unwrap_err();
        assert_eq!(err.span(), Some(Span::new(22, 22)));
    }

    #[test]
    fn test_program_for_bare_expression() {
        let text = "  $json.a * 2";
        let program = generate_program(text, &parse_template(text)).unwrap();
        let NodeKind::Program { body } = &program.kind else {
            panic!("expected program");
        };
        assert_eq!(body[0].type_name(), "ExpressionStatement");
        assert_eq!(body[0].start, 2);
        assert_eq!(program.complexity, 4);
    }

    #[test]
    fn test_program_for_template() {
        let text = "{{ 1 }}";
        let program = generate_program(text, &parse_template(text)).unwrap();
        let NodeKind::Program { body } = &program.kind else {
            panic!("expected program");
        };
        assert_eq!(body[0].type_name(), "Template");
    }

    #[test]
    fn test_string_with_conditional_characters_is_literal() {
        let node = generate_from_expression("'a ? b : c'").unwrap();
        assert_eq!(node.type_name(), "StringLiteral");
    }
}
