//! Evaluation context for expression execution
//!
//! A context is a set of `$`-prefixed bindings (`$json`, `$node`, `$vars`,
//! `$workflow`, `$execution`, `$input`, ...) plus an optional pinned clock
//! that fixes `$now` and `$today`.

use crate::error::{ExpressionError, ExpressionResult};
use chrono::{DateTime, FixedOffset, Local};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

/// Object keys that could address prototype machinery
pub const FORBIDDEN_KEYS: [&str; 3] = ["__proto__", "constructor", "prototype"];

/// Evaluation context containing variables and workflow data
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    bindings: HashMap<Arc<str>, Arc<Value>>,
    now: Option<DateTime<FixedOffset>>,
}

impl EvaluationContext {
    /// Create a new empty evaluation context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder for constructing contexts
    pub fn builder() -> EvaluationContextBuilder {
        EvaluationContextBuilder::new()
    }

    /// Build a context from an object of bindings
    ///
    /// Keys without a leading `$` get one. A `$now` string is parsed as an
    /// RFC 3339 timestamp and pins the clock instead of becoming a binding.
    pub fn from_value(value: Value) -> ExpressionResult<Self> {
        let Value::Object(map) = value else {
            return Err(ExpressionError::type_mismatch("object", "non-object context"));
        };

        let mut ctx = Self::new();
        for (key, value) in map {
            let name = binding_name(&key);
            if name == "$now" {
                let text = value.as_str().ok_or_else(|| {
                    ExpressionError::invalid_argument("$now", "expected an ISO-8601 string")
                })?;
                let now = DateTime::parse_from_rfc3339(text).map_err(|e| {
                    ExpressionError::invalid_argument("$now", format!("invalid timestamp: {e}"))
                })?;
                ctx.now = Some(now);
            } else {
                ctx.bindings.insert(Arc::from(name.as_str()), Arc::new(value));
            }
        }
        Ok(ctx)
    }

    /// Set a binding; a missing `$` prefix is added
    pub fn set(&mut self, name: impl AsRef<str>, value: Value) {
        let name = binding_name(name.as_ref());
        self.bindings.insert(Arc::from(name.as_str()), Arc::new(value));
    }

    /// Get a binding by its `$` name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name).map(AsRef::as_ref)
    }

    /// Whether a binding exists
    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Set the current item payload (`$json`)
    pub fn set_json(&mut self, data: Value) {
        self.set("$json", data);
    }

    /// Set the output of another node (`$node["name"]`, `$("name")`)
    pub fn set_node_data(&mut self, node: impl Into<String>, data: Value) {
        self.insert_into_object("$node", node.into(), data);
    }

    /// Output of another node
    pub fn get_node_data(&self, node: &str) -> Option<&Value> {
        self.get("$node")?.get(node)
    }

    /// Set an execution variable (`$execution.name`)
    pub fn set_execution_var(&mut self, name: impl Into<String>, value: Value) {
        self.insert_into_object("$execution", name.into(), value);
    }

    /// Set the workflow metadata (`$workflow`)
    pub fn set_workflow(&mut self, workflow: Value) {
        self.set("$workflow", workflow);
    }

    /// Set the input data (`$input`)
    pub fn set_input(&mut self, input: Value) {
        self.set("$input", input);
    }

    /// Pin the clock used for `$now` and `$today`
    pub fn set_now(&mut self, now: DateTime<FixedOffset>) {
        self.now = Some(now);
    }

    /// The pinned clock, if any
    pub fn pinned_now(&self) -> Option<DateTime<FixedOffset>> {
        self.now
    }

    /// Current time: the pinned clock or the local wall clock
    pub fn now(&self) -> DateTime<FixedOffset> {
        self.now.unwrap_or_else(|| Local::now().fixed_offset())
    }

    /// Iterate over all bindings in arbitrary order
    pub fn bindings(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.bindings.iter().map(|(k, v)| (k.as_ref(), v.as_ref()))
    }

    /// Binding names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.bindings.keys().map(AsRef::as_ref).collect();
        names.sort_unstable();
        names
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether the context has no bindings
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Copy of the context with prototype-addressing keys stripped everywhere
    pub fn sanitized(&self) -> Self {
        Self {
            bindings: self
                .bindings
                .iter()
                .map(|(k, v)| (Arc::clone(k), Arc::new(sanitize_value(v))))
                .collect(),
            now: self.now,
        }
    }

    /// Structural hash of every binding and the pinned clock
    ///
    /// Independent of insertion order and of object key order.
    pub fn content_hash(&self) -> u64 {
        let names = self.names();
        self.hash_bindings(names.into_iter())
    }

    /// Structural hash of the named bindings only
    ///
    /// Missing bindings hash differently from bindings set to `null`.
    pub fn hash_bindings<'n>(&self, names: impl Iterator<Item = &'n str>) -> u64 {
        let mut names: Vec<&str> = names.collect();
        names.sort_unstable();
        names.dedup();

        let mut hasher = DefaultHasher::new();
        for name in names {
            name.hash(&mut hasher);
            match self.get(name) {
                Some(value) => {
                    1u8.hash(&mut hasher);
                    hash_value(value, &mut hasher);
                }
                None => 0u8.hash(&mut hasher),
            }
        }
        self.now.map(|now| now.to_rfc3339()).hash(&mut hasher);
        hasher.finish()
    }

    fn insert_into_object(&mut self, binding: &str, key: String, value: Value) {
        let mut map = match self.get(binding) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        map.insert(key, value);
        self.set(binding, Value::Object(map));
    }
}

/// Builder for creating evaluation contexts
#[derive(Debug, Clone, Default)]
pub struct EvaluationContextBuilder {
    ctx: EvaluationContext,
}

impl EvaluationContextBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binding
    #[must_use = "builder methods must be chained or built"]
    pub fn binding(mut self, name: impl AsRef<str>, value: Value) -> Self {
        self.ctx.set(name, value);
        self
    }

    /// Set the current item payload (`$json`)
    #[must_use = "builder methods must be chained or built"]
    pub fn json(mut self, data: Value) -> Self {
        self.ctx.set_json(data);
        self
    }

    /// Add node output
    #[must_use = "builder methods must be chained or built"]
    pub fn node(mut self, node: impl Into<String>, data: Value) -> Self {
        self.ctx.set_node_data(node, data);
        self
    }

    /// Add an execution variable
    #[must_use = "builder methods must be chained or built"]
    pub fn execution_var(mut self, name: impl Into<String>, value: Value) -> Self {
        self.ctx.set_execution_var(name, value);
        self
    }

    /// Set workflow metadata
    #[must_use = "builder methods must be chained or built"]
    pub fn workflow(mut self, workflow: Value) -> Self {
        self.ctx.set_workflow(workflow);
        self
    }

    /// Set input data
    #[must_use = "builder methods must be chained or built"]
    pub fn input(mut self, input: Value) -> Self {
        self.ctx.set_input(input);
        self
    }

    /// Pin the clock
    #[must_use = "builder methods must be chained or built"]
    pub fn now(mut self, now: DateTime<FixedOffset>) -> Self {
        self.ctx.set_now(now);
        self
    }

    /// Build the evaluation context
    pub fn build(self) -> EvaluationContext {
        self.ctx
    }
}

/// Deep copy of `value` without prototype-addressing object keys
pub fn sanitize_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| !FORBIDDEN_KEYS.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), sanitize_value(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_value).collect()),
        other => other.clone(),
    }
}

/// Feed a JSON value into a hasher with object keys in sorted order
pub fn hash_value<H: Hasher>(value: &Value, state: &mut H) {
    match value {
        Value::Null => 0u8.hash(state),
        Value::Bool(b) => {
            1u8.hash(state);
            b.hash(state);
        }
        Value::Number(n) => {
            2u8.hash(state);
            // 1 and 1.0 hash alike
            crate::value_utils::number_as_f64(n).to_bits().hash(state);
        }
        Value::String(s) => {
            3u8.hash(state);
            s.hash(state);
        }
        Value::Array(items) => {
            4u8.hash(state);
            items.len().hash(state);
            for item in items {
                hash_value(item, state);
            }
        }
        Value::Object(map) => {
            5u8.hash(state);
            map.len().hash(state);
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
            for (key, value) in entries {
                key.hash(state);
                hash_value(value, state);
            }
        }
    }
}

fn binding_name(name: &str) -> String {
    if name.starts_with('$') {
        name.to_string()
    } else {
        format!("${name}")
    }
}
