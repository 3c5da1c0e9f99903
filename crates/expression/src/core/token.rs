//! Token types for the expression lexer
//!
//! This module defines all tokens that can appear in an expression.

use super::span::Span;
use std::borrow::Cow;

/// A token with position information
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    /// The token kind
    pub kind: TokenKind<'a>,
    /// Source span for this token
    pub span: Span,
}

impl<'a> Token<'a> {
    /// Create a new token with span
    pub fn new(kind: TokenKind<'a>, span: Span) -> Self {
        Self { kind, span }
    }
}

/// The kind of token
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'a> {
    // Literals
    /// Numeric literal (`42`, `3.14`, `1e3`, `0xff`)
    Number(f64),
    /// String literal; borrowed when it contains no escapes
    String(Cow<'a, str>),
    /// `true`
    True,
    /// `false`
    False,
    /// `null`
    Null,
    /// `undefined`
    Undefined,
    /// `typeof`
    Typeof,

    /// Identifier, including `$`-prefixed names (`$json`, `$`, `Math`)
    Identifier(&'a str),

    // Arithmetic
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,
    /// `**`
    Power,

    // Comparison
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `===`
    StrictEqual,
    /// `!==`
    StrictNotEqual,
    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterEqual,

    // Logical
    /// `&&`
    And,
    /// `||`
    Or,
    /// `??`
    Nullish,
    /// `!`
    Not,

    // Delimiters
    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// `[`
    LeftBracket,
    /// `]`
    RightBracket,
    /// `{`
    LeftBrace,
    /// `}`
    RightBrace,
    /// `,`
    Comma,
    /// `.`
    Dot,
    /// `?.`
    OptionalDot,
    /// `:`
    Colon,
    /// `?`
    Question,
    /// `=>`
    Arrow,
    /// `;`
    Semicolon,

    // Lexed so the parser can reject them with a useful message
    /// `=`
    Assign,
    /// `++`
    Increment,
    /// `--`
    Decrement,
    /// `|` (JMESPath pipe)
    Pipe,
    /// `&`
    Ampersand,

    /// End of input
    Eof,
}

impl TokenKind<'_> {
    /// Binding power of a binary operator, higher binds tighter
    pub fn precedence(&self) -> Option<u8> {
        match self {
            TokenKind::Nullish => Some(1),
            TokenKind::Or => Some(2),
            TokenKind::And => Some(3),
            TokenKind::Equal
            | TokenKind::NotEqual
            | TokenKind::StrictEqual
            | TokenKind::StrictNotEqual => Some(4),
            TokenKind::Less
            | TokenKind::LessEqual
            | TokenKind::Greater
            | TokenKind::GreaterEqual => Some(5),
            TokenKind::Plus | TokenKind::Minus => Some(6),
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Some(7),
            TokenKind::Power => Some(8),
            _ => None,
        }
    }

    /// Whether the operator groups right-to-left
    pub fn is_right_associative(&self) -> bool {
        matches!(self, TokenKind::Power)
    }

    /// Whether this token is a binary operator
    pub fn is_binary_operator(&self) -> bool {
        self.precedence().is_some()
    }
}

impl std::fmt::Display for TokenKind<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Number(n) => write!(f, "{n}"),
            TokenKind::String(s) => write!(f, "\"{s}\""),
            TokenKind::True => write!(f, "true"),
            TokenKind::False => write!(f, "false"),
            TokenKind::Null => write!(f, "null"),
            TokenKind::Undefined => write!(f, "undefined"),
            TokenKind::Typeof => write!(f, "typeof"),
            TokenKind::Identifier(name) => write!(f, "{name}"),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::Percent => write!(f, "%"),
            TokenKind::Power => write!(f, "**"),
            TokenKind::Equal => write!(f, "=="),
            TokenKind::NotEqual => write!(f, "!="),
            TokenKind::StrictEqual => write!(f, "==="),
            TokenKind::StrictNotEqual => write!(f, "!=="),
            TokenKind::Less => write!(f, "<"),
            TokenKind::LessEqual => write!(f, "<="),
            TokenKind::Greater => write!(f, ">"),
            TokenKind::GreaterEqual => write!(f, ">="),
            TokenKind::And => write!(f, "&&"),
            TokenKind::Or => write!(f, "||"),
            TokenKind::Nullish => write!(f, "??"),
            TokenKind::Not => write!(f, "!"),
            TokenKind::LeftParen => write!(f, "("),
            TokenKind::RightParen => write!(f, ")"),
            TokenKind::LeftBracket => write!(f, "["),
            TokenKind::RightBracket => write!(f, "]"),
            TokenKind::LeftBrace => write!(f, "{{"),
            TokenKind::RightBrace => write!(f, "}}"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Dot => write!(f, "."),
            TokenKind::OptionalDot => write!(f, "?."),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::Question => write!(f, "?"),
            TokenKind::Arrow => write!(f, "=>"),
            TokenKind::Semicolon => write!(f, ";"),
            TokenKind::Assign => write!(f, "="),
            TokenKind::Increment => write!(f, "++"),
            TokenKind::Decrement => write!(f, "--"),
            TokenKind::Pipe => write!(f, "|"),
            TokenKind::Ampersand => write!(f, "&"),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_ordering() {
        assert!(TokenKind::Star.precedence() > TokenKind::Plus.precedence());
        assert!(TokenKind::And.precedence() > TokenKind::Or.precedence());
        assert!(TokenKind::Or.precedence() > TokenKind::Nullish.precedence());
        assert_eq!(TokenKind::Comma.precedence(), None);
    }

    #[test]
    fn test_right_associativity() {
        assert!(TokenKind::Power.is_right_associative());
        assert!(!TokenKind::Minus.is_right_associative());
    }

    #[test]
    fn test_display() {
        assert_eq!(TokenKind::StrictEqual.to_string(), "===");
        assert_eq!(TokenKind::LeftBrace.to_string(), "{");
        assert_eq!(TokenKind::Identifier("$json").to_string(), "$json");
    }
}
