//! Validation issues and results

use crate::core::span::line_col_at;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Location of an issue in template coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct IssuePosition {
    /// Start byte offset (inclusive)
    pub start: usize,
    /// End byte offset (exclusive)
    pub end: usize,
    /// 1-based line of `start`
    pub line: usize,
    /// 1-based column of `start`
    pub column: usize,
}

impl IssuePosition {
    /// Position of `start..end` in `text`, with line and column resolved
    pub fn at(text: &str, start: usize, end: usize) -> Self {
        let (line, column) = line_col_at(text, start);
        Self {
            start,
            end,
            line,
            column,
        }
    }
}

/// Severity of a validation issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Makes the result invalid
    #[default]
    Error,
    /// Reported but never blocks
    Warning,
}

/// A single validation finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Stable issue code (`SYNTAX_ERROR`, `UNDEFINED_PROPERTY`, ...)
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Error or warning
    pub severity: Severity,
    /// Where the issue was found
    pub position: IssuePosition,
    /// Possible fixes, most likely first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl ValidationIssue {
    /// Create an issue with the given severity
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
        position: IssuePosition,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            severity,
            position,
            suggestions: Vec::new(),
        }
    }

    /// Create an error
    pub fn error(code: impl Into<String>, message: impl Into<String>, position: IssuePosition) -> Self {
        Self::new(code, message, Severity::Error, position)
    }

    /// Create a warning
    pub fn warning(
        code: impl Into<String>,
        message: impl Into<String>,
        position: IssuePosition,
    ) -> Self {
        Self::new(code, message, Severity::Warning, position)
    }

    /// Add a suggested fix
    #[must_use = "builder methods must be chained or built"]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Whether this issue is an error
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} at line {}, column {}",
            self.code, self.message, self.position.line, self.position.column
        )
    }
}

/// Outcome of validating a template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// `true` when `errors` is empty
    pub is_valid: bool,
    /// Blocking issues
    pub errors: Vec<ValidationIssue>,
    /// Non-blocking issues
    pub warnings: Vec<ValidationIssue>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

impl ValidationResult {
    /// Record an issue under `errors` or `warnings` by severity
    pub fn push(&mut self, issue: ValidationIssue) {
        match issue.severity {
            Severity::Error => {
                self.errors.push(issue);
                self.is_valid = false;
            }
            Severity::Warning => self.warnings.push(issue),
        }
    }

    /// Record every issue in order
    pub fn extend(&mut self, issues: impl IntoIterator<Item = ValidationIssue>) {
        for issue in issues {
            self.push(issue);
        }
    }

    /// Whether any issue with `code` was recorded
    pub fn has_code(&self, code: &str) -> bool {
        self.issues().any(|issue| issue.code == code)
    }

    /// Errors followed by warnings
    pub fn issues(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.errors.iter().chain(&self.warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warnings_keep_result_valid() {
        let mut result = ValidationResult::default();
        result.push(ValidationIssue::warning("W", "warn", IssuePosition::default()));
        assert!(result.is_valid);
        result.push(ValidationIssue::error("E", "err", IssuePosition::default()));
        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.has_code("W"));
    }

    #[test]
    fn test_position_line_and_column() {
        let position = IssuePosition::at("ab\ncd{{ x }}", 5, 12);
        assert_eq!((position.line, position.column), (2, 3));
    }

    #[test]
    fn test_issue_serialization() {
        let issue = ValidationIssue::warning("DEPRECATED_VARIABLE", "old", IssuePosition::default())
            .with_suggestion("$json");
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["severity"], "warning");
        assert_eq!(json["suggestions"][0], "$json");
    }
}
