//! Source span tracking
//!
//! Byte ranges into an expression or template, plus line/column resolution
//! for error reporting.

use serde::{Deserialize, Serialize};

/// A byte range in the source
///
/// Uses u32 offsets; templates larger than 4GB are rejected long before
/// they reach the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    /// Start byte offset (inclusive)
    pub start: u32,
    /// End byte offset (exclusive)
    pub end: u32,
}

impl Span {
    /// Create a new span
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start: start as u32,
            end: end as u32,
        }
    }

    /// Create a span covering a single byte
    pub fn single(pos: usize) -> Self {
        Self::new(pos, pos + 1)
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start) as usize
    }

    /// Whether the span covers nothing
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Smallest span covering both
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Move the span right by `offset` bytes
    pub fn shift(self, offset: usize) -> Span {
        Span::new(self.start as usize + offset, self.end as usize + offset)
    }

    /// Extract the text for this span from the source
    pub fn slice<'a>(&self, source: &'a str) -> &'a str {
        source
            .get(self.start as usize..self.end as usize)
            .unwrap_or("")
    }

    /// 1-based line and column of the span start
    pub fn line_col(&self, source: &str) -> (usize, usize) {
        line_col_at(source, self.start as usize)
    }
}

/// 1-based line and column (in characters) of a byte offset
pub fn line_col_at(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;

    for (i, ch) in source.char_indices() {
        if i >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }

    (line, col)
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}
