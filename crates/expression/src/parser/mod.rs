//! Parser for converting tokens into an AST
//!
//! Recursive descent with precedence climbing for binary operators. Every
//! node produced carries its byte range in the parsed text.

use crate::core::ast::{AstNode, BinaryOperator, NodeKind, ObjectProperty, UnaryOperator};
use crate::core::span::Span;
use crate::core::token::{Token, TokenKind};
use crate::error::{ExpressionError, ExpressionResult};
use crate::lexer::Lexer;

/// Maximum nesting of unary operators, groups and postfix chains
const MAX_PARSE_DEPTH: usize = 64;

/// Maximum height of a parsed tree
///
/// Operator and member chains deepen the tree without recursing in the
/// parser, so they are bounded separately. Dropping, walking and evaluating
/// a tree all recurse once per level.
const MAX_TREE_HEIGHT: u32 = 200;

/// Parse a complete expression string into an AST
pub fn parse_expression(source: &str) -> ExpressionResult<AstNode> {
    Parser::new(source)?.parse()
}

/// Parser for converting tokens into an AST
pub struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token<'a>>,
    position: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    /// Tokenize `source` and prepare to parse it
    pub fn new(source: &'a str) -> ExpressionResult<Self> {
        let tokens = Lexer::new(source).tokenize()?;
        Ok(Self {
            source,
            tokens,
            position: 0,
            depth: 0,
        })
    }

    /// Parse the whole input as one expression
    ///
    /// A single trailing `;` is accepted so statement-style input parses.
    pub fn parse(&mut self) -> ExpressionResult<AstNode> {
        if self.current_kind() == &TokenKind::Eof {
            return Err(ExpressionError::parse(
                "Empty expression",
                self.current_token().span,
            ));
        }

        let expr = self.parse_expression()?;
        self.match_token(&TokenKind::Semicolon);

        if self.current_kind() != &TokenKind::Eof {
            return Err(self.unexpected());
        }

        Ok(expr)
    }

    fn parse_expression(&mut self) -> ExpressionResult<AstNode> {
        self.parse_conditional()
    }

    /// `test ? consequent : alternate`, right-associative
    fn parse_conditional(&mut self) -> ExpressionResult<AstNode> {
        let test = self.parse_binary_expression(1)?;

        if !self.match_token(&TokenKind::Question) {
            return Ok(test);
        }

        self.enter()?;
        let consequent = self.parse_conditional()?;
        self.expect_token(&TokenKind::Colon)?;
        let alternate = self.parse_conditional()?;
        self.leave();

        let (start, end) = (test.start, alternate.end);
        Ok(self.node(
            NodeKind::ConditionalExpression {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            },
            start,
            end,
        ))
    }

    /// Precedence climbing over binary operators
    fn parse_binary_expression(&mut self, min_precedence: u8) -> ExpressionResult<AstNode> {
        let mut left = self.parse_unary_expression()?;

        loop {
            let kind = self.current_kind().clone();
            let Some(precedence) = kind.precedence() else {
                break;
            };
            if precedence < min_precedence {
                break;
            }
            let Some(operator) = binary_operator(&kind) else {
                break;
            };
            self.advance();

            let next_min = if kind.is_right_associative() {
                precedence
            } else {
                precedence + 1
            };
            self.enter()?;
            let right = self.parse_binary_expression(next_min)?;
            self.leave();

            let (start, end) = (left.start, right.end);
            left = self.node(
                NodeKind::BinaryExpression {
                    operator,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                start,
                end,
            );
            check_height(&left)?;
        }

        Ok(left)
    }

    fn parse_unary_expression(&mut self) -> ExpressionResult<AstNode> {
        let operator = match self.current_kind() {
            TokenKind::Not => UnaryOperator::Not,
            TokenKind::Minus => UnaryOperator::Negate,
            TokenKind::Plus => UnaryOperator::Plus,
            TokenKind::Typeof => UnaryOperator::Typeof,
            TokenKind::Increment | TokenKind::Decrement => {
                return Err(ExpressionError::parse(
                    "Update operators are not allowed in expressions",
                    self.current_token().span,
                ));
            }
            _ => return self.parse_postfix_expression(),
        };

        let start = self.current_token().span.start as usize;
        self.advance();
        self.enter()?;
        let argument = self.parse_unary_expression()?;
        self.leave();

        let end = argument.end;
        Ok(self.node(
            NodeKind::UnaryExpression {
                operator,
                argument: Box::new(argument),
            },
            start,
            end,
        ))
    }

    /// Member access, computed access, calls and optional chaining
    fn parse_postfix_expression(&mut self) -> ExpressionResult<AstNode> {
        let mut expr = self.parse_primary_expression()?;

        loop {
            match self.current_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let property = self.parse_property_name()?;
                    expr = self.member(expr, property, false, false);
                }
                TokenKind::OptionalDot => {
                    self.advance();
                    match self.current_kind() {
                        TokenKind::LeftParen => expr = self.parse_call(expr, true)?,
                        TokenKind::LeftBracket => {
                            let property = self.parse_computed_property()?;
                            expr = self.member(expr, property, true, true);
                        }
                        _ => {
                            let property = self.parse_property_name()?;
                            expr = self.member(expr, property, false, true);
                        }
                    }
                }
                TokenKind::LeftBracket => {
                    let property = self.parse_computed_property()?;
                    expr = self.member(expr, property, true, false);
                }
                TokenKind::LeftParen => expr = self.parse_call(expr, false)?,
                _ => break,
            }
            check_height(&expr)?;
        }

        Ok(expr)
    }

    fn parse_primary_expression(&mut self) -> ExpressionResult<AstNode> {
        let token = self.current_token().clone();
        let (start, end) = (token.span.start as usize, token.span.end as usize);

        match token.kind {
            TokenKind::Number(value) => {
                self.advance();
                Ok(self.node(NodeKind::NumericLiteral { value }, start, end))
            }
            TokenKind::String(value) => {
                self.advance();
                Ok(self.node(
                    NodeKind::StringLiteral {
                        value: value.into_owned(),
                    },
                    start,
                    end,
                ))
            }
            TokenKind::True | TokenKind::False => {
                self.advance();
                Ok(self.node(
                    NodeKind::BooleanLiteral {
                        value: token.kind == TokenKind::True,
                    },
                    start,
                    end,
                ))
            }
            TokenKind::Null => {
                self.advance();
                Ok(self.node(NodeKind::NullLiteral, start, end))
            }
            TokenKind::Undefined => {
                self.advance();
                Ok(self.identifier("undefined", start, end))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                if self.current_kind() == &TokenKind::Arrow {
                    return self.parse_arrow_body(vec![name.to_string()], start);
                }
                Ok(self.identifier(name, start, end))
            }
            TokenKind::LeftParen => {
                if let Some(params) = self.arrow_params() {
                    return self.parse_arrow_body(params, start);
                }
                self.advance();
                self.enter()?;
                let inner = self.parse_expression()?;
                self.leave();
                self.expect_token(&TokenKind::RightParen)?;
                Ok(inner)
            }
            TokenKind::LeftBracket => self.parse_array(),
            TokenKind::LeftBrace => self.parse_object(),
            _ => Err(self.unexpected()),
        }
    }

    fn parse_array(&mut self) -> ExpressionResult<AstNode> {
        let start = self.current_token().span.start as usize;
        self.advance(); // [
        self.enter()?;

        let mut elements = Vec::new();
        while self.current_kind() != &TokenKind::RightBracket {
            elements.push(self.parse_expression()?);
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }

        let end = self.expect_token(&TokenKind::RightBracket)?.end as usize;
        self.leave();
        Ok(self.node(NodeKind::ArrayExpression { elements }, start, end))
    }

    fn parse_object(&mut self) -> ExpressionResult<AstNode> {
        let start = self.current_token().span.start as usize;
        self.advance(); // {
        self.enter()?;

        let mut properties = Vec::new();
        while self.current_kind() != &TokenKind::RightBrace {
            let key_token = self.current_token().clone();
            let key = match &key_token.kind {
                TokenKind::Identifier(name) => (*name).to_string(),
                TokenKind::String(value) => value.to_string(),
                TokenKind::Number(n) => crate::value_utils::format_number(*n),
                TokenKind::True
                | TokenKind::False
                | TokenKind::Null
                | TokenKind::Undefined
                | TokenKind::Typeof => key_token.kind.to_string(),
                _ => return Err(self.unexpected()),
            };
            self.advance();

            let value = if self.match_token(&TokenKind::Colon) {
                self.parse_expression()?
            } else if let TokenKind::Identifier(name) = key_token.kind {
                // `{ a }` shorthand
                let span = key_token.span;
                self.identifier(name, span.start as usize, span.end as usize)
            } else {
                return Err(ExpressionError::parse(
                    format!("Expected ':' after property '{key}'"),
                    self.current_token().span,
                ));
            };

            properties.push(ObjectProperty { key, value });
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }

        let end = self.expect_token(&TokenKind::RightBrace)?.end as usize;
        self.leave();
        Ok(self.node(NodeKind::ObjectExpression { properties }, start, end))
    }

    fn parse_call(&mut self, callee: AstNode, optional: bool) -> ExpressionResult<AstNode> {
        self.advance(); // (
        self.enter()?;

        let mut arguments = Vec::new();
        while self.current_kind() != &TokenKind::RightParen {
            arguments.push(self.parse_expression()?);
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }

        let end = self.expect_token(&TokenKind::RightParen)?.end as usize;
        self.leave();

        let start = callee.start;
        Ok(self.node(
            NodeKind::CallExpression {
                callee: Box::new(callee),
                arguments,
                optional,
            },
            start,
            end,
        ))
    }

    /// `.name` after a dot; keywords are valid property names
    fn parse_property_name(&mut self) -> ExpressionResult<AstNode> {
        let token = self.current_token().clone();
        let (start, end) = (token.span.start as usize, token.span.end as usize);
        let name = match token.kind {
            TokenKind::Identifier(name) => name.to_string(),
            TokenKind::True
            | TokenKind::False
            | TokenKind::Null
            | TokenKind::Undefined
            | TokenKind::Typeof => token.kind.to_string(),
            _ => {
                return Err(ExpressionError::parse(
                    format!("Expected property name, found '{}'", token.kind),
                    token.span,
                ));
            }
        };
        self.advance();
        Ok(self.identifier(&name, start, end))
    }

    fn parse_computed_property(&mut self) -> ExpressionResult<AstNode> {
        self.advance(); // [
        self.enter()?;
        let property = self.parse_expression()?;
        self.leave();
        self.expect_token(&TokenKind::RightBracket)?;
        Ok(property)
    }

    /// Lookahead for `(a, b) =>` and `() =>`; consumes the list on success
    fn arrow_params(&mut self) -> Option<Vec<String>> {
        let mut index = self.position + 1;
        let mut params = Vec::new();

        loop {
            match &self.tokens.get(index)?.kind {
                TokenKind::RightParen if params.is_empty() => break,
                TokenKind::Identifier(name) => {
                    params.push((*name).to_string());
                    index += 1;
                    match &self.tokens.get(index)?.kind {
                        TokenKind::Comma => index += 1,
                        TokenKind::RightParen => break,
                        _ => return None,
                    }
                }
                _ => return None,
            }
        }

        if self.tokens.get(index + 1)?.kind != TokenKind::Arrow {
            return None;
        }

        self.position = index + 1;
        Some(params)
    }

    /// Parse `=> body`; the current token must be the arrow
    fn parse_arrow_body(&mut self, params: Vec<String>, start: usize) -> ExpressionResult<AstNode> {
        self.expect_token(&TokenKind::Arrow)?;
        if self.current_kind() == &TokenKind::LeftBrace
            && !matches!(
                self.tokens.get(self.position + 2).map(|t| &t.kind),
                Some(TokenKind::Colon | TokenKind::Comma | TokenKind::RightBrace)
            )
        {
            return Err(ExpressionError::parse(
                "Arrow function bodies must be expressions",
                self.current_token().span,
            ));
        }

        self.enter()?;
        let body = self.parse_conditional()?;
        self.leave();

        let end = body.end;
        Ok(self.node(
            NodeKind::ArrowFunctionExpression {
                params,
                body: Box::new(body),
            },
            start,
            end,
        ))
    }

    // ==================== Helpers ====================

    fn node(&self, kind: NodeKind, start: usize, end: usize) -> AstNode {
        let raw = self.source.get(start..end).unwrap_or("");
        AstNode::new(kind, start, end, raw)
    }

    fn identifier(&self, name: &str, start: usize, end: usize) -> AstNode {
        self.node(
            NodeKind::Identifier {
                name: name.to_string(),
            },
            start,
            end,
        )
    }

    fn member(
        &self,
        object: AstNode,
        property: AstNode,
        computed: bool,
        optional: bool,
    ) -> AstNode {
        let start = object.start;
        let end = self.previous_end().max(property.end);
        self.node(
            NodeKind::MemberExpression {
                object: Box::new(object),
                property: Box::new(property),
                computed,
                optional,
            },
            start,
            end,
        )
    }

    fn current_token(&self) -> &Token<'a> {
        // tokenize() always ends with Eof and advance() never moves past it
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn current_kind(&self) -> &TokenKind<'a> {
        &self.current_token().kind
    }

    fn previous_end(&self) -> usize {
        self.position
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(0, |t| t.span.end as usize)
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
    }

    fn match_token(&mut self, expected: &TokenKind<'_>) -> bool {
        if self.current_kind() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_token(&mut self, expected: &TokenKind<'_>) -> ExpressionResult<Span> {
        let token = self.current_token();
        if &token.kind == expected {
            let span = token.span;
            self.advance();
            Ok(span)
        } else {
            Err(ExpressionError::parse(
                format!("Expected '{expected}', found '{}'", token.kind),
                token.span,
            ))
        }
    }

    fn unexpected(&self) -> ExpressionError {
        let token = self.current_token();
        let message = match token.kind {
            TokenKind::Eof => "Unexpected end of expression".to_string(),
            TokenKind::Assign => "Assignment is not allowed in expressions".to_string(),
            TokenKind::Increment | TokenKind::Decrement => {
                "Update operators are not allowed in expressions".to_string()
            }
            TokenKind::Pipe => {
                "The '|' operator is not supported; use $jmespath() for JSON queries".to_string()
            }
            TokenKind::Ampersand => "Bitwise operators are not supported".to_string(),
            TokenKind::Arrow => "Arrow functions are only allowed as call arguments".to_string(),
            ref kind => format!("Unexpected token '{kind}'"),
        };
        ExpressionError::parse(message, token.span)
    }

    fn enter(&mut self) -> ExpressionResult<()> {
        self.depth += 1;
        if self.depth > MAX_PARSE_DEPTH {
            return Err(ExpressionError::parse(
                format!("Expression nesting exceeds {MAX_PARSE_DEPTH} levels"),
                self.current_token().span,
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}

fn check_height(node: &AstNode) -> ExpressionResult<()> {
    if node.height() > MAX_TREE_HEIGHT {
        return Err(ExpressionError::parse(
            format!("Expression is nested deeper than {MAX_TREE_HEIGHT} levels"),
            Span::new(node.start, node.end),
        ));
    }
    Ok(())
}

fn binary_operator(kind: &TokenKind<'_>) -> Option<BinaryOperator> {
    Some(match kind {
        TokenKind::Plus => BinaryOperator::Add,
        TokenKind::Minus => BinaryOperator::Subtract,
        TokenKind::Star => BinaryOperator::Multiply,
        TokenKind::Slash => BinaryOperator::Divide,
        TokenKind::Percent => BinaryOperator::Modulo,
        TokenKind::Power => BinaryOperator::Power,
        TokenKind::Equal => BinaryOperator::Equal,
        TokenKind::NotEqual => BinaryOperator::NotEqual,
        TokenKind::StrictEqual => BinaryOperator::StrictEqual,
        TokenKind::StrictNotEqual => BinaryOperator::StrictNotEqual,
        TokenKind::Less => BinaryOperator::LessThan,
        TokenKind::LessEqual => BinaryOperator::LessEqual,
        TokenKind::Greater => BinaryOperator::GreaterThan,
        TokenKind::GreaterEqual => BinaryOperator::GreaterEqual,
        TokenKind::And => BinaryOperator::And,
        TokenKind::Or => BinaryOperator::Or,
        TokenKind::Nullish => BinaryOperator::Nullish,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn parse(input: &str) -> AstNode {
        parse_expression(input).unwrap()
    }

    #[test]
    fn test_parse_literals() {
        assert_eq!(parse("42").kind, NodeKind::NumericLiteral { value: 42.0 });
        assert_eq!(parse("null").kind, NodeKind::NullLiteral);
        assert_eq!(
            parse("'a ? b : c'").kind,
            NodeKind::StringLiteral {
                value: "a ? b : c".to_string()
            }
        );
    }

    #[test]
    fn test_precedence() {
        let node = parse("1 + 2 * 3");
        let NodeKind::BinaryExpression {
            operator, right, ..
        } = &node.kind
        else {
            panic!("expected binary, got {}", node.type_name());
        };
        assert_eq!(*operator, BinaryOperator::Add);
        assert_eq!(right.raw, "2 * 3");
        assert_eq!(node.complexity, 5);
    }

    #[test]
    fn test_power_is_right_associative() {
        let node = parse("2 ** 3 ** 2");
        let NodeKind::BinaryExpression { left, right, .. } = &node.kind else {
            panic!("expected binary");
        };
        assert_eq!(left.raw, "2");
        assert_eq!(right.raw, "3 ** 2");
    }

    #[test]
    fn test_member_chain_and_call() {
        let node = parse("$json.items[0].name.toUpperCase()");
        assert_eq!(node.type_name(), "CallExpression");
        assert_eq!((node.start, node.end), (0, 33));
        let NodeKind::CallExpression { callee, .. } = &node.kind else {
            panic!("expected call");
        };
        assert_eq!(callee.raw, "$json.items[0].name.toUpperCase");
        assert_eq!(callee.complexity, 5);
    }

    #[test]
    fn test_conditional() {
        let node = parse("$json.a ? 'yes' : 'no'");
        assert_eq!(node.type_name(), "ConditionalExpression");
        assert_eq!(node.complexity, 2 + 2 + 1 + 1);
    }

    #[test]
    fn test_arrow_functions() {
        let node = parse("items.map(x => x * 2)");
        let NodeKind::CallExpression { arguments, .. } = &node.kind else {
            panic!("expected call");
        };
        let NodeKind::ArrowFunctionExpression { params, body } = &arguments[0].kind else {
            panic!("expected arrow");
        };
        assert_eq!(params, &vec!["x".to_string()]);
        assert_eq!(body.raw, "x * 2");

        let node = parse("items.reduce((acc, x) => acc + x, 0)");
        let NodeKind::CallExpression { arguments, .. } = &node.kind else {
            panic!("expected call");
        };
        assert_eq!(arguments.len(), 2);
        assert_eq!(arguments[0].type_name(), "ArrowFunctionExpression");
    }

    #[test]
    fn test_parenthesized_expression_is_not_arrow() {
        let node = parse("(a + b) * c");
        assert_eq!(node.type_name(), "BinaryExpression");
    }

    #[test]
    fn test_object_and_array_literals() {
        let node = parse("{ a: 1, 'b c': [1, 2,], d }");
        let NodeKind::ObjectExpression { properties } = &node.kind else {
            panic!("expected object");
        };
        let keys: Vec<&str> = properties.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b c", "d"]);
        assert_eq!(node.complexity, 1 + 1 + 3 + 1);
    }

    #[test]
    fn test_optional_chaining() {
        let node = parse("$json?.a?.[0]");
        let NodeKind::MemberExpression {
            optional, computed, ..
        } = &node.kind
        else {
            panic!("expected member");
        };
        assert!(*optional);
        assert!(*computed);
    }

    #[test]
    fn test_trailing_semicolon() {
        assert_eq!(parse("1 + 1;").type_name(), "BinaryExpression");
    }

    #[rstest]
    #[case("", "Empty expression")]
    #[case("1 +", "Unexpected end of expression")]
    #[case("a = 1", "Assignment is not allowed in expressions")]
    #[case("a++", "Update operators are not allowed in expressions")]
    #[case("a | b", "The '|' operator is not supported; use $jmespath() for JSON queries")]
    #[case("(1 + 2", "Expected ')', found 'end of input'")]
    fn test_parse_errors(#[case] input: &str, #[case] message: &str) {
        let err = parse_expression(input).unwrap_err();
        assert_eq!(
            err,
            ExpressionError::Parse {
                message: message.to_string(),
                span: err.span(),
            }
        );
    }

    #[test]
    fn test_error_span_points_at_token() {
        let err = parse_expression("$json.a )").unwrap_err();
        assert_eq!(err.span(), Some(Span::new(8, 9)));
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        assert!(parse_expression(&deep).is_err());
    }

    #[rstest]
    #[case(format!("1{}", "+1".repeat(60_000)))]
    #[case(format!("a{}", ".b".repeat(60_000)))]
    #[case(format!("f{}", "()".repeat(60_000)))]
    #[case(format!("(1{}){}", "+1".repeat(150), "*2".repeat(150)))]
    fn test_long_chains_are_rejected(#[case] input: String) {
        let err = parse_expression(&input).unwrap_err();
        assert_eq!(err.code(), "SYNTAX_ERROR");
        assert!(err.to_string().contains("nested deeper than 200 levels"), "{err}");
    }

    #[test]
    fn test_chains_within_limit_parse() {
        let node = parse(&format!("1{}", "+1".repeat(150)));
        assert_eq!(node.height(), 151);
        assert_eq!(parse(&format!("a{}", ".b".repeat(150))).height(), 151);
    }
}
