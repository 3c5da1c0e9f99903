//! Error formatting with source code context and visual highlighting
//!
//! Output shows the line and column of the problem, a few surrounding
//! lines, and `^^^` under the offending range:
//!
//! ```text
//! error[UNDEFINED_VARIABLE] at line 2, column 12: Variable '$usr' is not defined
//!  1 | Dear customer,
//!  2 | Welcome {{ $usr.name }}
//!    |            ^^^^
//!    = help: Did you mean '$user'?
//! ```

use crate::core::span::{Span, line_col_at};
use crate::error::ExpressionError;
use crate::validation::{Severity, ValidationIssue};
use std::fmt::Write as _;

/// Renders a message against the source it refers to
#[derive(Debug, Clone)]
pub struct ErrorFormatter<'a> {
    source: &'a str,
    start: usize,
    end: usize,
    label: String,
    message: String,
    help: Vec<String>,
    /// Number of lines to show before the error line
    context_before: usize,
    /// Number of lines to show after the error line
    context_after: usize,
}

impl<'a> ErrorFormatter<'a> {
    /// Formatter for `start..end` (byte offsets) in `source`
    pub fn new(source: &'a str, start: usize, end: usize, message: impl Into<String>) -> Self {
        let start = floor_char_boundary(source, start);
        let end = floor_char_boundary(source, end.max(start));
        Self {
            source,
            start,
            end,
            label: "error".to_string(),
            message: message.into(),
            help: Vec::new(),
            context_before: 2,
            context_after: 1,
        }
    }

    /// Formatter for an evaluation or parse error
    ///
    /// Errors without a span highlight the whole source.
    pub fn for_error(source: &'a str, error: &ExpressionError) -> Self {
        let span = error.span().unwrap_or_else(|| Span::new(0, source.len()));
        Self::new(source, span.start as usize, span.end as usize, error.to_string())
            .with_label(format!("error[{}]", error.code()))
    }

    /// Formatter for a validation issue, with its suggestions as help lines
    pub fn for_issue(source: &'a str, issue: &ValidationIssue) -> Self {
        let severity = match issue.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        let mut formatter = Self::new(source, issue.position.start, issue.position.end, &issue.message)
            .with_label(format!("{severity}[{}]", issue.code));
        formatter.help.clone_from(&issue.suggestions);
        formatter
    }

    /// Replace the `error` label in the header
    #[must_use = "builder methods must be chained or built"]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Add a help line below the snippet
    #[must_use = "builder methods must be chained or built"]
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help.push(help.into());
        self
    }

    /// Set the number of context lines to show
    #[must_use = "builder methods must be chained or built"]
    pub fn with_context(mut self, before: usize, after: usize) -> Self {
        self.context_before = before;
        self.context_after = after;
        self
    }

    /// Format the message with source context
    pub fn format(&self) -> String {
        let (line, column) = line_col_at(self.source, self.start);
        let lines: Vec<&str> = self.source.split('\n').collect();
        let error_idx = (line - 1).min(lines.len().saturating_sub(1));

        let first = error_idx.saturating_sub(self.context_before);
        let last = (error_idx + self.context_after).min(lines.len().saturating_sub(1));
        let width = (last + 1).to_string().len();
        let gutter = " ".repeat(width);

        let mut output = String::with_capacity(128 + (last - first + 2) * 80);
        let _ = writeln!(
            output,
            "{} at line {line}, column {column}: {}",
            self.label, self.message
        );

        for (idx, text) in lines.iter().enumerate().take(last + 1).skip(first) {
            let _ = writeln!(output, " {:>width$} | {}", idx + 1, text.trim_end_matches('\r'));
            if idx == error_idx {
                let underline = self.underline_width(text, column);
                let _ = writeln!(
                    output,
                    " {gutter} | {}{}",
                    " ".repeat(column - 1),
                    "^".repeat(underline)
                );
            }
        }

        for help in &self.help {
            let _ = writeln!(output, " {gutter} = help: {help}");
        }

        output
    }

    /// Characters to underline on the error line, at least one
    fn underline_width(&self, line_text: &str, column: usize) -> usize {
        let rest: usize = line_text.chars().count().saturating_sub(column - 1);
        let span_chars = self.source[self.start..self.end].chars().take_while(|&c| c != '\n').count();
        span_chars.min(rest).max(1)
    }
}

/// Format an evaluation or parse error against its source
pub fn format_error(source: &str, error: &ExpressionError) -> String {
    ErrorFormatter::for_error(source, error).format()
}

/// Format every issue against the template, one block per issue
pub fn format_issues(template: &str, issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|issue| ErrorFormatter::for_issue(template, issue).format())
        .collect::<Vec<_>>()
        .join("\n")
}

fn floor_char_boundary(source: &str, offset: usize) -> usize {
    let mut offset = offset.min(source.len());
    while !source.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}
