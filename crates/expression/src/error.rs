//! Error types for expression parsing, evaluation and validation
//!
//! Every failure inside the crate is an [`ExpressionError`]. The engine facade
//! converts them into structured results, so callers only see these values
//! through [`ExpressionError::code`] and the message.

use crate::core::span::Span;
use thiserror::Error;

/// Errors produced while parsing or evaluating expressions
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    /// Tokenizer failure (bad character, unterminated string)
    #[error("Syntax error: {message}")]
    Syntax {
        /// Error message
        message: String,
        /// Location of the offending input, relative to the expression
        span: Option<Span>,
    },

    /// Parser failure (unexpected token, missing delimiter)
    #[error("Parse error: {message}")]
    Parse {
        /// Error message
        message: String,
        /// Location of the offending token, relative to the expression
        span: Option<Span>,
    },

    /// Structural template error (`UNMATCHED_BRACES`, `NESTED_TEMPLATES`, `EMPTY_EXPRESSION`)
    #[error("Template error: {message}")]
    Template {
        /// Stable error code
        code: &'static str,
        /// Error message
        message: String,
    },

    /// Generic runtime failure
    #[error("Evaluation error: {message}")]
    Eval {
        /// Error message
        message: String,
    },

    /// Operand or receiver of the wrong type
    #[error("Type error: {message}")]
    Type {
        /// Error message
        message: String,
    },

    /// Reference to a name that is not in scope
    #[error("{name} is not defined")]
    VariableNotFound {
        /// Variable name
        name: String,
    },

    /// Call to a function or method that does not exist
    #[error("{name} is not a function")]
    FunctionNotFound {
        /// Function name
        name: String,
    },

    /// Builtin called with a bad argument
    #[error("Invalid argument for {function}: {message}")]
    InvalidArgument {
        /// Function name
        function: String,
        /// Error message
        message: String,
    },

    /// Division or modulo by zero
    #[error("Division by zero")]
    DivisionByZero,

    /// Expression rejected by the sandbox before or during execution
    #[error("Security violation: {message}")]
    SecurityViolation {
        /// Error message
        message: String,
    },

    /// Step budget or deadline exhausted
    #[error("Expression timed out after {elapsed_ms}ms (limit {limit_ms}ms)")]
    Timeout {
        /// Elapsed wall-clock time
        elapsed_ms: u64,
        /// Configured limit
        limit_ms: u64,
    },

    /// Operation budget exhausted before the expression finished
    #[error("Expression exceeded its budget of {limit} evaluation steps")]
    StepBudget {
        /// Configured step budget
        limit: u64,
    },

    /// A produced value exceeded a configured ceiling
    #[error("Resource limit exceeded: {message}")]
    ResourceLimit {
        /// Error message
        message: String,
    },

    /// JMESPath compilation or search failure
    #[error("Query error: {message}")]
    Query {
        /// Error message
        message: String,
    },

    /// AST generation failure
    #[error("AST generation failed: {message}")]
    AstGeneration {
        /// Error message
        message: String,
    },

    /// Internal invariant failure
    #[error("Internal error: {message}")]
    Internal {
        /// Error message
        message: String,
    },

    /// JSON serialization failure
    #[error("JSON error: {message}")]
    Json {
        /// Error message
        message: String,
    },
}

impl ExpressionError {
    /// Stable error code used in evaluation and validation results
    pub fn code(&self) -> &'static str {
        match self {
            Self::Syntax { .. } | Self::Parse { .. } => "SYNTAX_ERROR",
            Self::Template { code, .. } => code,
            Self::Eval { .. } => "EVALUATION_ERROR",
            Self::Type { .. } => "TYPE_ERROR",
            Self::VariableNotFound { .. } => "UNDEFINED_VARIABLE",
            Self::FunctionNotFound { .. } => "UNKNOWN_FUNCTION",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::DivisionByZero => "DIVISION_BY_ZERO",
            Self::SecurityViolation { .. } => "SECURITY_VIOLATION",
            Self::Timeout { .. } | Self::StepBudget { .. } => "EXECUTION_TIMEOUT",
            Self::ResourceLimit { .. } => "RESOURCE_LIMIT_EXCEEDED",
            Self::Query { .. } => "QUERY_ERROR",
            Self::AstGeneration { .. } => "AST_GENERATION_ERROR",
            Self::Internal { .. } | Self::Json { .. } => "ENGINE_ERROR",
        }
    }

    /// JavaScript-style error class name reported in evaluation results
    pub fn name(&self) -> &'static str {
        match self {
            Self::Syntax { .. } | Self::Parse { .. } | Self::Template { .. } => "SyntaxError",
            Self::Type { .. } | Self::FunctionNotFound { .. } => "TypeError",
            Self::VariableNotFound { .. } => "ReferenceError",
            Self::SecurityViolation { .. } => "SecurityError",
            Self::Timeout { .. } | Self::StepBudget { .. } => "TimeoutError",
            Self::ResourceLimit { .. } | Self::DivisionByZero => "RangeError",
            _ => "Error",
        }
    }

    /// Source span of a syntax or parse error
    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Syntax { span, .. } | Self::Parse { span, .. } => *span,
            _ => None,
        }
    }

    /// Whether this error was raised by the sandbox
    pub fn is_security(&self) -> bool {
        matches!(self, Self::SecurityViolation { .. })
    }

    // ==================== Convenience constructors ====================

    /// Create a syntax error with a location
    pub fn syntax(message: impl Into<String>, span: Span) -> Self {
        Self::Syntax {
            message: message.into(),
            span: Some(span),
        }
    }

    /// Create a parse error with a location
    pub fn parse(message: impl Into<String>, span: Span) -> Self {
        Self::Parse {
            message: message.into(),
            span: Some(span),
        }
    }

    /// Create a structural template error
    pub fn template(code: &'static str, message: impl Into<String>) -> Self {
        Self::Template {
            code,
            message: message.into(),
        }
    }

    /// Create an evaluation error
    pub fn eval(message: impl Into<String>) -> Self {
        Self::Eval {
            message: message.into(),
        }
    }

    /// Create a type error
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Type {
            message: message.into(),
        }
    }

    /// Create a type error from expected and actual type names
    pub fn type_mismatch(expected: &str, actual: &str) -> Self {
        Self::Type {
            message: format!("expected {expected}, got {actual}"),
        }
    }

    /// Create a variable-not-found error
    pub fn variable_not_found(name: impl Into<String>) -> Self {
        Self::VariableNotFound { name: name.into() }
    }

    /// Create a function-not-found error
    pub fn function_not_found(name: impl Into<String>) -> Self {
        Self::FunctionNotFound { name: name.into() }
    }

    /// Create an invalid-argument error
    pub fn invalid_argument(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            function: function.into(),
            message: message.into(),
        }
    }

    /// Create a security violation
    pub fn security(message: impl Into<String>) -> Self {
        Self::SecurityViolation {
            message: message.into(),
        }
    }

    /// Create a resource-limit error
    pub fn resource_limit(message: impl Into<String>) -> Self {
        Self::ResourceLimit {
            message: message.into(),
        }
    }

    /// Create a query error
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    /// Create an AST generation error
    pub fn ast_generation(message: impl Into<String>) -> Self {
        Self::AstGeneration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ExpressionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

/// Result type for expression operations
pub type ExpressionResult<T> = Result<T, ExpressionError>;
