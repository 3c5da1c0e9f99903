//! Lexer for tokenizing expression strings
//!
//! Converts the text between `{{` and `}}` into tokens of the JavaScript-like
//! expression grammar.

use crate::core::span::Span;
use crate::core::token::{Token, TokenKind};
use crate::error::{ExpressionError, ExpressionResult};
use std::borrow::Cow;

/// Lexer for tokenizing expression strings
pub struct Lexer<'a> {
    input: &'a str,
    position: usize,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer from an input string
    pub fn new(input: &'a str) -> Self {
        Self { input, position: 0 }
    }

    /// Tokenize the entire input, ending with an `Eof` token
    pub fn tokenize(&mut self) -> ExpressionResult<Vec<Token<'a>>> {
        // Typical expressions have about one token per five characters
        let mut tokens = Vec::with_capacity((self.input.len() / 5).max(8));

        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }

        Ok(tokens)
    }

    /// Get the next token from the input
    pub fn next_token(&mut self) -> ExpressionResult<Token<'a>> {
        self.skip_whitespace();

        let start = self.position;

        let Some(ch) = self.current_char() else {
            return Ok(Token::new(TokenKind::Eof, Span::new(start, start)));
        };

        let kind = match ch {
            '(' => self.single(TokenKind::LeftParen),
            ')' => self.single(TokenKind::RightParen),
            '[' => self.single(TokenKind::LeftBracket),
            ']' => self.single(TokenKind::RightBracket),
            '{' => self.single(TokenKind::LeftBrace),
            '}' => self.single(TokenKind::RightBrace),
            ',' => self.single(TokenKind::Comma),
            ':' => self.single(TokenKind::Colon),
            ';' => self.single(TokenKind::Semicolon),
            '%' => self.single(TokenKind::Percent),
            '/' => self.single(TokenKind::Slash),

            '.' if self.peek().is_some_and(|c| c.is_ascii_digit()) => self.read_number()?,
            '.' if self.input[start..].starts_with("...") => {
                return Err(ExpressionError::syntax(
                    "Spread syntax is not supported",
                    Span::new(start, start + 3),
                ));
            }
            '.' => self.single(TokenKind::Dot),

            // `a?.5:1` is a conditional, not optional chaining
            '?' if self.peek() == Some('.')
                && !self.peek_nth(2).is_some_and(|c| c.is_ascii_digit()) =>
            {
                self.multi(2, TokenKind::OptionalDot)
            }
            '?' if self.peek() == Some('?') => self.multi(2, TokenKind::Nullish),
            '?' => self.single(TokenKind::Question),

            '+' if self.peek() == Some('+') => self.multi(2, TokenKind::Increment),
            '+' => self.single(TokenKind::Plus),
            '-' if self.peek() == Some('-') => self.multi(2, TokenKind::Decrement),
            '-' => self.single(TokenKind::Minus),
            '*' if self.peek() == Some('*') => self.multi(2, TokenKind::Power),
            '*' => self.single(TokenKind::Star),

            '=' if self.input[start..].starts_with("===") => self.multi(3, TokenKind::StrictEqual),
            '=' if self.peek() == Some('=') => self.multi(2, TokenKind::Equal),
            '=' if self.peek() == Some('>') => self.multi(2, TokenKind::Arrow),
            '=' => self.single(TokenKind::Assign),
            '!' if self.input[start..].starts_with("!==") => {
                self.multi(3, TokenKind::StrictNotEqual)
            }
            '!' if self.peek() == Some('=') => self.multi(2, TokenKind::NotEqual),
            '!' => self.single(TokenKind::Not),
            '<' if self.peek() == Some('=') => self.multi(2, TokenKind::LessEqual),
            '<' => self.single(TokenKind::Less),
            '>' if self.peek() == Some('=') => self.multi(2, TokenKind::GreaterEqual),
            '>' => self.single(TokenKind::Greater),
            '&' if self.peek() == Some('&') => self.multi(2, TokenKind::And),
            '&' => self.single(TokenKind::Ampersand),
            '|' if self.peek() == Some('|') => self.multi(2, TokenKind::Or),
            '|' => self.single(TokenKind::Pipe),

            '"' | '\'' => self.read_string(ch)?,
            '`' => {
                return Err(ExpressionError::syntax(
                    "Template literals are not supported",
                    Span::single(start),
                ));
            }

            ch if ch.is_ascii_digit() => self.read_number()?,
            ch if is_identifier_start(ch) => self.read_identifier_or_keyword(),

            _ => {
                return Err(ExpressionError::syntax(
                    format!("Unexpected character '{ch}' at position {start}"),
                    Span::new(start, start + ch.len_utf8()),
                ));
            }
        };

        Ok(Token::new(kind, Span::new(start, self.position)))
    }

    fn single(&mut self, kind: TokenKind<'a>) -> TokenKind<'a> {
        self.advance();
        kind
    }

    fn multi(&mut self, count: usize, kind: TokenKind<'a>) -> TokenKind<'a> {
        for _ in 0..count {
            self.advance();
        }
        kind
    }

    /// Get the current character at position
    fn current_char(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    /// Peek at the next character without advancing
    fn peek(&self) -> Option<char> {
        self.peek_nth(1)
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.input[self.position..].chars().nth(n)
    }

    /// Advance position by the current character's UTF-8 byte length
    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.position += ch.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Read a string literal, borrowing from the input when it has no escapes
    fn read_string(&mut self, quote: char) -> ExpressionResult<TokenKind<'a>> {
        let start = self.position;
        self.advance(); // opening quote

        let mut has_escapes = false;

        while let Some(ch) = self.current_char() {
            if ch == quote {
                let end = self.position;
                self.advance(); // closing quote
                let body = &self.input[start + 1..end];
                return if has_escapes {
                    Ok(TokenKind::String(Cow::Owned(unescape(body, start + 1)?)))
                } else {
                    Ok(TokenKind::String(Cow::Borrowed(body)))
                };
            } else if ch == '\\' {
                has_escapes = true;
                self.advance();
                self.advance();
            } else if ch == '\n' {
                break;
            } else {
                self.advance();
            }
        }

        Err(ExpressionError::syntax(
            "Unterminated string literal",
            Span::new(start, self.position),
        ))
    }

    /// Read a decimal, fractional, exponent or hex number
    fn read_number(&mut self) -> ExpressionResult<TokenKind<'a>> {
        let start = self.position;

        if self.input[start..].starts_with("0x") || self.input[start..].starts_with("0X") {
            self.advance();
            self.advance();
            let digits_start = self.position;
            while self.current_char().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.advance();
            }
            let digits = &self.input[digits_start..self.position];
            return u64::from_str_radix(digits, 16)
                .map(|n| TokenKind::Number(n as f64))
                .map_err(|_| {
                    ExpressionError::syntax(
                        "Invalid hexadecimal literal",
                        Span::new(start, self.position),
                    )
                });
        }

        let mut seen_dot = false;
        let mut seen_exp = false;

        while let Some(ch) = self.current_char() {
            if ch.is_ascii_digit() {
                self.advance();
            } else if ch == '.' && !seen_dot && !seen_exp {
                // `1.toFixed` is not a number followed by a member
                if self.peek().is_some_and(|c| c.is_ascii_digit()) || self.position == start {
                    seen_dot = true;
                    self.advance();
                } else {
                    break;
                }
            } else if (ch == 'e' || ch == 'E') && !seen_exp {
                let sign_or_digit = self.peek();
                let valid = match sign_or_digit {
                    Some(c) if c.is_ascii_digit() => true,
                    Some('+' | '-') => self.peek_nth(2).is_some_and(|c| c.is_ascii_digit()),
                    _ => false,
                };
                if !valid {
                    break;
                }
                seen_exp = true;
                self.advance();
                if matches!(self.current_char(), Some('+' | '-')) {
                    self.advance();
                }
            } else {
                break;
            }
        }

        let span = Span::new(start, self.position);

        if self.current_char().is_some_and(is_identifier_start) {
            return Err(ExpressionError::syntax(
                "Identifier directly after number",
                Span::new(start, self.position + 1),
            ));
        }

        span.slice(self.input)
            .parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| ExpressionError::syntax("Invalid number literal", span))
    }

    /// Read an identifier (including `$`-prefixed names) or keyword
    fn read_identifier_or_keyword(&mut self) -> TokenKind<'a> {
        let start = self.position;

        while self.current_char().is_some_and(is_identifier_part) {
            self.advance();
        }

        match &self.input[start..self.position] {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            "undefined" => TokenKind::Undefined,
            "typeof" => TokenKind::Typeof,
            name => TokenKind::Identifier(name),
        }
    }
}

/// Whether `ch` can start an identifier
pub fn is_identifier_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || ch == '$'
}

/// Whether `ch` can continue an identifier
pub fn is_identifier_part(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$'
}

/// Whether `name` is a syntactically valid identifier
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(is_identifier_start) && chars.all(is_identifier_part)
}

fn unescape(body: &str, offset: usize) -> ExpressionResult<String> {
    let mut result = String::with_capacity(body.len());
    let mut chars = body.char_indices();

    while let Some((i, ch)) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }
        let Some((_, escaped)) = chars.next() else {
            break;
        };
        match escaped {
            'n' => result.push('\n'),
            't' => result.push('\t'),
            'r' => result.push('\r'),
            'b' => result.push('\u{8}'),
            'f' => result.push('\u{c}'),
            'v' => result.push('\u{b}'),
            '0' => result.push('\0'),
            'u' => {
                let hex: String = chars.by_ref().take(4).map(|(_, c)| c).collect();
                let decoded = u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| {
                        ExpressionError::syntax(
                            "Invalid unicode escape",
                            Span::new(offset + i, offset + i + 6),
                        )
                    })?;
                result.push(decoded);
            }
            other => result.push(other),
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(input: &str) -> Vec<TokenKind<'_>> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("42 3.5 .5 1e3 0x1f"),
            vec![
                TokenKind::Number(42.0),
                TokenKind::Number(3.5),
                TokenKind::Number(0.5),
                TokenKind::Number(1000.0),
                TokenKind::Number(31.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            kinds(r#""hello" 'it\'s' "a\nb""#),
            vec![
                TokenKind::String(Cow::Borrowed("hello")),
                TokenKind::String(Cow::Owned("it's".to_string())),
                TokenKind::String(Cow::Owned("a\nb".to_string())),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_variables_are_identifiers() {
        assert_eq!(
            kinds("$json.name $('Node')"),
            vec![
                TokenKind::Identifier("$json"),
                TokenKind::Dot,
                TokenKind::Identifier("name"),
                TokenKind::Identifier("$"),
                TokenKind::LeftParen,
                TokenKind::String(Cow::Borrowed("Node")),
                TokenKind::RightParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("=== !== == != <= >= && || ?? ?. ** => !"),
            vec![
                TokenKind::StrictEqual,
                TokenKind::StrictNotEqual,
                TokenKind::Equal,
                TokenKind::NotEqual,
                TokenKind::LessEqual,
                TokenKind::GreaterEqual,
                TokenKind::And,
                TokenKind::Or,
                TokenKind::Nullish,
                TokenKind::OptionalDot,
                TokenKind::Power,
                TokenKind::Arrow,
                TokenKind::Not,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_conditional_with_fraction_is_not_optional_chain() {
        assert_eq!(
            kinds("a?.5:1"),
            vec![
                TokenKind::Identifier("a"),
                TokenKind::Question,
                TokenKind::Number(0.5),
                TokenKind::Colon,
                TokenKind::Number(1.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_keywords() {
        assert_eq!(
            kinds("true false null undefined typeof"),
            vec![
                TokenKind::True,
                TokenKind::False,
                TokenKind::Null,
                TokenKind::Undefined,
                TokenKind::Typeof,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_spans() {
        let tokens = Lexer::new("a + 'bc'").tokenize().unwrap();
        assert_eq!(tokens[0].span, Span::new(0, 1));
        assert_eq!(tokens[1].span, Span::new(2, 3));
        assert_eq!(tokens[2].span, Span::new(4, 8));
    }

    #[test]
    fn test_errors() {
        let err = Lexer::new("'open").tokenize().unwrap_err();
        assert_eq!(err.code(), "SYNTAX_ERROR");
        assert_eq!(err.span(), Some(Span::new(0, 5)));

        assert!(Lexer::new("a # b").tokenize().is_err());
        assert!(Lexer::new("2abc").tokenize().is_err());
        assert!(Lexer::new("`x`").tokenize().is_err());
    }

    #[test]
    fn test_identifier_validity() {
        assert!(is_valid_identifier("$json"));
        assert!(is_valid_identifier("_x1"));
        assert!(!is_valid_identifier("1x"));
        assert!(!is_valid_identifier(""));
    }
}
