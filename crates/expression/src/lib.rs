#![warn(missing_docs)]
//! # weft-expression
//!
//! Template expressions for workflow automation. Text such as
//! `Hello {{ $json.name.toUpperCase() }}!` is split into literal text and
//! `{{ }}` spans; each span is a JavaScript-like expression evaluated by a
//! sandboxed interpreter against the workflow data.
//!
//! The crate covers:
//!
//! - Template scanning and structural checks (`{{ }}` parity, nesting)
//! - A lexer and parser producing a typed syntax tree
//! - A tree-walking interpreter with a whitelist of globals and a step budget
//! - `$if`, `$isEmpty`, `Math`, `DateTime`, `Duration` and JMESPath helpers
//! - Layered validation (syntax, semantic, security, performance, business)
//! - Result and AST caching, and cursor-aware completion
//!
//! ## Quick Start
//!
//! ```rust
//! use serde_json::json;
//! use weft_expression::{EvaluationContext, ExpressionEngine};
//!
//! let engine = ExpressionEngine::new();
//! let ctx = EvaluationContext::builder()
//!     .json(json!({"name": "ada", "items": [1, 2, 3]}))
//!     .build();
//!
//! let result = engine.evaluate("Hello {{ $json.name.toUpperCase() }}!", &ctx);
//! assert_eq!(result.value, Some(json!("Hello ADA!")));
//!
//! // A single expression keeps its type
//! let result = engine.evaluate("{{ $json.items.map(x => x * 2) }}", &ctx);
//! assert_eq!(result.value, Some(json!([2, 4, 6])));
//! ```
//!
//! ## Validation
//!
//! ```rust
//! use weft_expression::ExpressionEngine;
//!
//! let engine = ExpressionEngine::new();
//! let result = engine.validate_full("{{ eval('1') }}", None, None);
//! assert!(!result.is_valid);
//! assert!(result.has_code("SECURITY_THREAT"));
//! ```

pub mod builtins;
pub mod completion;
pub mod context;
pub mod core;
pub mod engine;
pub mod error;
pub mod error_formatter;
pub mod eval;
pub mod generator;
pub mod lexer;
pub mod parser;
pub mod registry;
pub mod sandbox;
pub mod template;
pub mod validation;
pub mod value_utils;

// Re-exports
pub use completion::{CompletionItem, CompletionKind, CompletionRequest};
pub use context::{EvaluationContext, EvaluationContextBuilder};
pub use crate::core::ast::{AstNode, NodeKind};
pub use engine::{CacheConfig, EngineConfig, EvaluationError, EvaluationResult, ExpressionEngine};
pub use error::{ExpressionError, ExpressionResult};
pub use error_formatter::ErrorFormatter;
pub use registry::Registry;
pub use sandbox::SecurityConfig;
pub use template::{ParsedExpression, ParsedTemplate, parse_template, validate_template};
pub use validation::{
    Severity, ValidationConfig, ValidationEngine, ValidationIssue, ValidationLayer, ValidationResult,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        CompletionItem, CompletionRequest, EngineConfig, EvaluationContext,
        EvaluationContextBuilder, EvaluationResult, ExpressionEngine, ExpressionError,
        ExpressionResult, ParsedTemplate, Registry, Severity, ValidationIssue, ValidationResult,
    };
}
