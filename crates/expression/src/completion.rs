//! Cursor-aware completion over the registry and context data
//!
//! The cursor context decides what is offered:
//!
//! - outside `{{ }}`: nothing
//! - a partial `$` token: variables and `$` helpers
//! - after a namespace (`Math.`): its members
//! - after a `$` path (`$json.user.`): keys at the path and members of the
//!   value's runtime type, or every runtime member without a context
//! - a bare word: globals and namespaces

use crate::context::EvaluationContext;
use crate::lexer::is_identifier_part;
use crate::registry::{EntryKind, MethodInfo, Registry, ValueType};
use crate::value_utils::value_type_name;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::trace;

/// Where completion was requested
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// Full template text
    pub template: String,
    /// Cursor byte offset
    pub position: usize,
    /// Data used to suggest keys along `$` paths
    pub context: Option<EvaluationContext>,
}

impl CompletionRequest {
    /// Request at `position` in `template`
    pub fn new(template: impl Into<String>, position: usize) -> Self {
        Self {
            template: template.into(),
            position,
            context: None,
        }
    }

    /// Request with the cursor at the end of `template`
    pub fn at_end(template: impl Into<String>) -> Self {
        let template = template.into();
        let position = template.len();
        Self::new(template, position)
    }

    /// Attach context data
    #[must_use = "builder methods must be chained or built"]
    pub fn with_context(mut self, context: EvaluationContext) -> Self {
        self.context = Some(context);
        self
    }
}

/// What a suggestion inserts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionKind {
    /// `$` variable
    Variable,
    /// Global or namespace function
    Function,
    /// Capability namespace
    Namespace,
    /// Namespace constant
    Constant,
    /// Method of a runtime type
    Method,
    /// Property of a runtime type
    Property,
    /// Key found in the context data
    Field,
}

impl From<EntryKind> for CompletionKind {
    fn from(kind: EntryKind) -> Self {
        match kind {
            EntryKind::Variable => Self::Variable,
            EntryKind::Function => Self::Function,
            EntryKind::Namespace => Self::Namespace,
            EntryKind::Constant => Self::Constant,
            EntryKind::Method => Self::Method,
            EntryKind::Property => Self::Property,
        }
    }
}

/// A single suggestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionItem {
    /// Text shown in the list
    pub label: String,
    /// Kind of entry
    pub kind: CompletionKind,
    /// Signature, type or description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Text inserted in place of the partial word
    pub insert_text: String,
}

impl CompletionItem {
    fn from_entry(label: &str, info: &MethodInfo) -> Self {
        let kind = CompletionKind::from(info.kind);
        let detail = match &info.signature {
            Some(signature) => Some(signature.render(label)),
            None if !info.description.is_empty() => Some(info.description.clone()),
            None => None,
        };
        let insert_text = if info.is_callable() {
            format!("{label}()")
        } else {
            label.to_string()
        };
        Self {
            label: label.to_string(),
            kind,
            detail,
            insert_text,
        }
    }

    fn field(key: &str, value: &Value) -> Self {
        Self {
            label: key.to_string(),
            kind: CompletionKind::Field,
            detail: Some(value_type_name(value).to_string()),
            insert_text: key.to_string(),
        }
    }
}

/// Cursor position analysis
#[derive(Debug, PartialEq, Eq)]
struct CursorContext<'a> {
    /// Dotted receiver before the last `.`, with `?.` folded
    receiver: Option<String>,
    /// Word being typed
    partial: &'a str,
}

impl<'a> CursorContext<'a> {
    /// Analyze `template` at `position`; `None` outside `{{ }}`
    fn analyze(template: &'a str, position: usize) -> Option<Self> {
        let mut position = position.min(template.len());
        while !template.is_char_boundary(position) {
            position -= 1;
        }
        let prefix = &template[..position];
        let open = prefix.rfind("{{")?;
        let inside = &prefix[open + 2..];
        if inside.contains("}}") {
            return None;
        }

        let chain_start = inside
            .char_indices()
            .rev()
            .take_while(|&(_, c)| is_identifier_part(c) || c == '.' || c == '?')
            .last()
            .map_or(inside.len(), |(i, _)| i);
        let chain = inside[chain_start..].trim_start_matches(['.', '?']);

        Some(match chain.rfind('.') {
            Some(dot) => Self {
                receiver: Some(chain[..dot].trim_end_matches('?').replace("?.", ".")),
                partial: &chain[dot + 1..],
            },
            None => Self {
                receiver: None,
                partial: chain,
            },
        })
    }
}

/// Suggestions for `request`, sorted by label
pub fn complete(registry: &Registry, request: &CompletionRequest) -> Vec<CompletionItem> {
    let Some(cursor) = CursorContext::analyze(&request.template, request.position) else {
        return Vec::new();
    };
    trace!(receiver = ?cursor.receiver, partial = cursor.partial, "Completing");

    let mut items: BTreeMap<String, CompletionItem> = BTreeMap::new();
    let mut offer = |item: CompletionItem| {
        if item.label.starts_with(cursor.partial) {
            items.entry(item.label.clone()).or_insert(item);
        }
    };

    match cursor.receiver.as_deref() {
        Some(receiver) if is_namespace(registry, receiver) => {
            let prefix = format!("{receiver}.");
            for info in registry.namespace_members(receiver) {
                let label = info.name.strip_prefix(&prefix).unwrap_or(&info.name);
                offer(CompletionItem::from_entry(label, info));
            }
        }
        Some(receiver) => {
            let resolved = receiver
                .starts_with('$')
                .then(|| request.context.as_ref().and_then(|ctx| resolve_path(ctx, receiver)))
                .flatten();
            match resolved {
                Some(value) => {
                    if let Value::Object(map) = value {
                        for (key, field) in map {
                            offer(CompletionItem::field(key, field));
                        }
                    }
                    if let Some(ty) = json_type(value) {
                        for info in registry.members(ty) {
                            offer(CompletionItem::from_entry(&info.name, info));
                        }
                    }
                }
                None => {
                    for ty in ValueType::ALL {
                        for info in registry.members(ty) {
                            offer(CompletionItem::from_entry(&info.name, info));
                        }
                    }
                }
            }
        }
        None if cursor.partial.starts_with('$') => {
            for info in registry.variables() {
                let mut item = CompletionItem {
                    label: info.name.clone(),
                    kind: CompletionKind::Variable,
                    detail: Some(info.description.clone()),
                    insert_text: info.name.clone(),
                };
                if let Some(replacement) = &info.replacement {
                    item.detail = Some(format!("Deprecated, use {replacement}"));
                }
                offer(item);
            }
            for info in registry.functions() {
                if info.name.starts_with('$') && info.is_callable() {
                    offer(CompletionItem::from_entry(&info.name, info));
                }
            }
        }
        None => {
            for info in registry.functions() {
                if !info.name.starts_with('$') && !info.name.contains('.') {
                    offer(CompletionItem::from_entry(&info.name, info));
                }
            }
        }
    }

    items.into_values().collect()
}

/// Whether `name` has namespace members (`Math`, `String`)
fn is_namespace(registry: &Registry, name: &str) -> bool {
    registry.namespace_members(name).next().is_some()
}

/// Context value at a dotted `$` path
fn resolve_path<'c>(ctx: &'c EvaluationContext, path: &str) -> Option<&'c Value> {
    let mut segments = path.split('.');
    let mut current = ctx.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn json_type(value: &Value) -> Option<ValueType> {
    match value {
        Value::Null => None,
        Value::Bool(_) => Some(ValueType::Boolean),
        Value::Number(_) => Some(ValueType::Number),
        Value::String(_) => Some(ValueType::String),
        Value::Array(_) => Some(ValueType::Array),
        Value::Object(_) => Some(ValueType::Object),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    fn labels(items: &[CompletionItem]) -> Vec<&str> {
        items.iter().map(|item| item.label.as_str()).collect()
    }

    fn complete_at_end(template: &str) -> Vec<CompletionItem> {
        complete(&Registry::standard(), &CompletionRequest::at_end(template))
    }

    #[rstest]
    #[case("Hello {{ $j", None, Some("$j"))]
    #[case("{{ Math.ma", Some("Math"), Some("ma"))]
    #[case("{{ $json?.user?.", Some("$json.user"), Some(""))]
    #[case("{{ 1 + pars", None, Some("pars"))]
    #[case("{{ a }} tail", None, None)]
    #[case("plain", None, None)]
    fn test_cursor_analysis(
        #[case] template: &str,
        #[case] receiver: Option<&str>,
        #[case] partial: Option<&str>,
    ) {
        let cursor = CursorContext::analyze(template, template.len());
        assert_eq!(
            cursor.as_ref().map(|c| c.partial),
            partial,
            "partial of {template:?}"
        );
        assert_eq!(cursor.and_then(|c| c.receiver).as_deref(), receiver);
    }

    #[test]
    fn test_outside_expression() {
        assert_eq!(complete_at_end("Hello $js"), vec![]);
        let request = CompletionRequest::new("{{ $json }} and $", 17);
        assert_eq!(complete(&Registry::standard(), &request), vec![]);
    }

    #[test]
    fn test_dollar_prefix() {
        let items = complete_at_end("{{ $i");
        assert_eq!(
            labels(&items),
            ["$if", "$ifEmpty", "$input", "$isEmpty", "$isNotEmpty", "$item", "$itemIndex", "$items"]
        );
        let deprecated = items.iter().find(|item| item.label == "$items").unwrap();
        assert_eq!(deprecated.detail.as_deref(), Some("Deprecated, use $input"));
    }

    #[test]
    fn test_namespace_members() {
        let items = complete_at_end("{{ Math.ro");
        assert_eq!(labels(&items), ["round"]);
        assert_eq!(items[0].kind, CompletionKind::Function);
        assert_eq!(items[0].insert_text, "round()");
        assert_eq!(items[0].detail.as_deref(), Some("round(x) -> number"));

        let items = complete_at_end("{{ Math.P");
        assert_eq!(labels(&items), ["PI"]);
        assert_eq!(items[0].insert_text, "PI");
    }

    #[test]
    fn test_context_path() {
        let ctx = EvaluationContext::builder()
            .json(json!({"user": {"name": "Ada", "email": "a@b.c"}}))
            .build();
        let request = CompletionRequest::at_end("{{ $json.user.").with_context(ctx.clone());
        let items = complete(&Registry::standard(), &request);
        let fields: Vec<&str> = items
            .iter()
            .filter(|item| item.kind == CompletionKind::Field)
            .map(|item| item.label.as_str())
            .collect();
        assert_eq!(fields, ["email", "name"]);
        assert!(items.iter().any(|item| item.kind == CompletionKind::Method));

        let request = CompletionRequest::at_end("{{ $json.user.name.toUp").with_context(ctx);
        let items = complete(&Registry::standard(), &request);
        assert_eq!(labels(&items), ["toUpperCase"]);
    }

    #[test]
    fn test_path_without_context_offers_generic_members() {
        let items = complete_at_end("{{ $json.anything.len");
        assert_eq!(labels(&items), ["length"]);
    }

    #[test]
    fn test_bare_word() {
        let items = complete_at_end("{{ 1 + parse");
        assert_eq!(labels(&items), ["parseFloat", "parseInt"]);

        let items = complete_at_end("{{ Dat");
        assert_eq!(labels(&items), ["Date", "DateTime"]);
        assert!(items.iter().all(|item| item.kind == CompletionKind::Namespace));
    }

    #[test]
    fn test_item_serialization() {
        let items = complete_at_end("{{ Math.abs");
        insta::assert_json_snapshot!(items, @r#"
        [
          {
            "label": "abs",
            "kind": "function",
            "detail": "abs(x) -> number",
            "insert_text": "abs()"
          }
        ]
        "#);
    }
}
