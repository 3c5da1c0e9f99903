//! Catalog of known variables, functions and runtime-type members
//!
//! Validators, completion and tooling use the registry to decide whether a
//! name exists and how many arguments a call takes. Build one with
//! [`Registry::standard`], register extra entries, then share it as
//! `Arc<Registry>`. The interpreter checks call arity against the unmodified
//! standard catalog ([`Registry::builtin`]).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

static BUILTIN: LazyLock<Registry> = LazyLock::new(Registry::standard);

/// Runtime value types that carry members
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// JSON string
    String,
    /// JSON number
    Number,
    /// JSON boolean
    Boolean,
    /// JSON array
    Array,
    /// JSON object
    Object,
    /// Date and time with a fixed offset
    DateTime,
    /// Signed length of time
    Duration,
    /// Span between two datetimes
    Interval,
}

impl ValueType {
    /// Every member-bearing type
    pub const ALL: [ValueType; 8] = [
        ValueType::String,
        ValueType::Number,
        ValueType::Boolean,
        ValueType::Array,
        ValueType::Object,
        ValueType::DateTime,
        ValueType::Duration,
        ValueType::Interval,
    ];

    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Number => "number",
            ValueType::Boolean => "boolean",
            ValueType::Array => "array",
            ValueType::Object => "object",
            ValueType::DateTime => "datetime",
            ValueType::Duration => "duration",
            ValueType::Interval => "interval",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a registry entry names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Context binding (`$json`)
    Variable,
    /// Callable global or namespace function (`$if`, `Math.max`)
    Function,
    /// Capability namespace (`Math`, `DateTime`)
    Namespace,
    /// Constant inside a namespace (`Math.PI`)
    Constant,
    /// Method of a runtime type (`"a".toUpperCase()`)
    Method,
    /// Property of a runtime type (`"a".length`)
    Property,
}

/// Where an entry comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySource {
    /// JavaScript standard library behaviour
    Builtin,
    /// Workflow helpers and date/time library
    Extension,
    /// Registered by the embedding application
    Custom,
}

/// Arity and types of a callable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSignature {
    /// Required arguments
    pub min_args: usize,
    /// Maximum arguments; `None` for variadic functions
    pub max_args: Option<usize>,
    /// Parameter names, optional ones suffixed with `?`
    pub params: Vec<String>,
    /// Return type name
    pub returns: String,
}

impl FunctionSignature {
    /// Create a signature
    pub fn new(min_args: usize, max_args: Option<usize>, params: &[&str], returns: &str) -> Self {
        Self {
            min_args,
            max_args,
            params: params.iter().map(|p| (*p).to_string()).collect(),
            returns: returns.to_string(),
        }
    }

    /// Whether `count` arguments are accepted
    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min_args && self.max_args.is_none_or(|max| count <= max)
    }

    /// Human-readable expected argument count ("2", "1 to 3", "at least 1")
    pub fn expected_args(&self) -> String {
        match self.max_args {
            Some(max) if max == self.min_args => max.to_string(),
            Some(max) => format!("{} to {max}", self.min_args),
            None => format!("at least {}", self.min_args),
        }
    }

    /// `(a, b?)` rendering for completion details
    pub fn render(&self, name: &str) -> String {
        format!("{name}({}) -> {}", self.params.join(", "), self.returns)
    }
}

/// A function, method, property, namespace or constant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodInfo {
    /// Name; namespace functions are qualified (`Math.max`)
    pub name: String,
    /// Entry kind
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Origin
    pub source: EntrySource,
    /// Call signature for functions and methods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<FunctionSignature>,
    /// One-line description
    #[serde(default)]
    pub description: String,
}

impl MethodInfo {
    /// Create an entry without a signature
    pub fn new(name: impl Into<String>, kind: EntryKind, source: EntrySource) -> Self {
        Self {
            name: name.into(),
            kind,
            source,
            signature: None,
            description: String::new(),
        }
    }

    /// Attach a signature
    #[must_use = "builder methods must be chained or built"]
    pub fn with_signature(mut self, signature: FunctionSignature) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Attach a description
    #[must_use = "builder methods must be chained or built"]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Whether the entry can be called
    pub fn is_callable(&self) -> bool {
        self.signature.is_some()
    }
}

/// A known context variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableInfo {
    /// `$`-prefixed name
    pub name: String,
    /// Always [`EntryKind::Variable`]
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Origin
    pub source: EntrySource,
    /// Whether new expressions should avoid it
    #[serde(default)]
    pub deprecated: bool,
    /// What to use instead of a deprecated variable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
    /// One-line description
    #[serde(default)]
    pub description: String,
}

impl VariableInfo {
    /// Create a variable entry
    pub fn new(name: impl Into<String>, source: EntrySource, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Variable,
            source,
            deprecated: false,
            replacement: None,
            description: description.into(),
        }
    }

    /// Mark deprecated with a replacement
    #[must_use = "builder methods must be chained or built"]
    pub fn deprecated_for(mut self, replacement: impl Into<String>) -> Self {
        self.deprecated = true;
        self.replacement = Some(replacement.into());
        self
    }
}

/// Lookup table of variables, functions and members
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    variables: BTreeMap<String, VariableInfo>,
    functions: BTreeMap<String, MethodInfo>,
    members: BTreeMap<ValueType, BTreeMap<String, MethodInfo>>,
}

impl Registry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared, read-only standard catalog
    pub fn builtin() -> &'static Registry {
        &BUILTIN
    }

    /// Registry with the standard catalog
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register_variables();
        registry.register_globals();
        registry.register_namespaces();
        registry.register_string_members();
        registry.register_number_members();
        registry.register_boolean_members();
        registry.register_array_members();
        registry.register_object_members();
        registry.register_datetime_members();
        registry.register_duration_members();
        registry.register_interval_members();
        registry
    }

    // ==================== Registration ====================

    /// Add or replace a variable
    pub fn register_variable(&mut self, info: VariableInfo) {
        self.variables.insert(info.name.clone(), info);
    }

    /// Add or replace a global function, namespace or namespace member
    pub fn register_method(&mut self, info: MethodInfo) {
        self.functions.insert(info.name.clone(), info);
    }

    /// Add or replace a member of a runtime type
    pub fn register_member(&mut self, ty: ValueType, info: MethodInfo) {
        self.members
            .entry(ty)
            .or_default()
            .insert(info.name.clone(), info);
    }

    // ==================== Queries ====================

    /// Variable by `$` name
    pub fn variable(&self, name: &str) -> Option<&VariableInfo> {
        self.variables.get(name)
    }

    /// Global or namespaced entry (`$if`, `Math`, `Math.max`)
    pub fn function(&self, name: &str) -> Option<&MethodInfo> {
        self.functions.get(name)
    }

    /// Member of a runtime type
    pub fn member(&self, ty: ValueType, name: &str) -> Option<&MethodInfo> {
        self.members.get(&ty)?.get(name)
    }

    /// Members of a runtime type, sorted by name
    pub fn members(&self, ty: ValueType) -> impl Iterator<Item = &MethodInfo> {
        self.members.get(&ty).into_iter().flat_map(BTreeMap::values)
    }

    /// Members of a namespace (`Math` -> `Math.abs`, `Math.PI`, ...)
    pub fn namespace_members<'a>(&'a self, namespace: &str) -> impl Iterator<Item = &'a MethodInfo> {
        let prefix = format!("{namespace}.");
        self.functions
            .range(prefix.clone()..)
            .take_while(move |(name, _)| name.starts_with(&prefix))
            .map(|(_, info)| info)
    }

    /// Every runtime type that has a member called `name`
    pub fn find_method(&self, name: &str) -> Vec<(ValueType, &MethodInfo)> {
        self.members
            .iter()
            .filter_map(|(ty, members)| members.get(name).map(|info| (*ty, info)))
            .collect()
    }

    /// Whether `name` is a registered variable or top-level function/namespace
    pub fn is_known_identifier(&self, name: &str) -> bool {
        self.variables.contains_key(name) || self.functions.contains_key(name)
    }

    /// All variables, sorted by name
    pub fn variables(&self) -> impl Iterator<Item = &VariableInfo> {
        self.variables.values()
    }

    /// All functions, namespaces and constants, sorted by name
    pub fn functions(&self) -> impl Iterator<Item = &MethodInfo> {
        self.functions.values()
    }

    // ==================== Standard catalog ====================

    fn register_variables(&mut self) {
        use EntrySource::Extension;
        for (name, description) in [
            ("$json", "JSON payload of the current item"),
            ("$item", "The current item"),
            ("$node", "Outputs of other nodes by name"),
            ("$vars", "Workflow variables"),
            ("$workflow", "Workflow metadata (id, name, active)"),
            ("$execution", "Execution metadata (id, mode)"),
            ("$input", "Input items of the current node"),
            ("$now", "Current date and time"),
            ("$today", "Start of the current day"),
            ("$itemIndex", "Index of the current item"),
            ("$runIndex", "Index of the current run"),
            ("$prevNode", "The node that produced the input"),
            ("$parameter", "Parameters of the current node"),
            ("$env", "Environment variables exposed to expressions"),
        ] {
            self.register_variable(VariableInfo::new(name, Extension, description));
        }

        self.register_variable(
            VariableInfo::new("$data", Extension, "Legacy alias of the current payload")
                .deprecated_for("$json"),
        );
        self.register_variable(
            VariableInfo::new("$position", Extension, "Legacy item index").deprecated_for("$itemIndex"),
        );
        self.register_variable(
            VariableInfo::new("$items", Extension, "Legacy input item list").deprecated_for("$input"),
        );
    }

    fn register_globals(&mut self) {
        use EntrySource::{Builtin, Extension};
        let globals: &[(&str, EntrySource, usize, Option<usize>, &[&str], &str, &str)] = &[
            ("$if", Extension, 2, Some(3), &["condition", "then", "else?"], "any", "Pick a value by condition"),
            ("$isEmpty", Extension, 1, Some(1), &["value"], "boolean", "Null, empty string, array or object"),
            ("$isNotEmpty", Extension, 1, Some(1), &["value"], "boolean", "Negation of $isEmpty"),
            ("$ifEmpty", Extension, 2, Some(2), &["value", "fallback"], "any", "Fallback when the value is empty"),
            ("$jmespath", Extension, 2, Some(2), &["data", "query"], "any", "Run a JMESPath query"),
            ("search", Extension, 2, Some(2), &["data", "query"], "any", "Run a JMESPath query"),
            ("$min", Extension, 1, None, &["...numbers"], "number", "Smallest argument"),
            ("$max", Extension, 1, None, &["...numbers"], "number", "Largest argument"),
            ("$", Extension, 1, Some(1), &["nodeName"], "object", "Output of another node"),
            ("parseInt", Builtin, 1, Some(2), &["string", "radix?"], "number", "Parse an integer"),
            ("parseFloat", Builtin, 1, Some(1), &["string"], "number", "Parse a floating point number"),
            ("isNaN", Builtin, 1, Some(1), &["value"], "boolean", "Whether the value is not a number"),
            ("isFinite", Builtin, 1, Some(1), &["value"], "boolean", "Whether the value is a finite number"),
            ("String", Builtin, 0, Some(1), &["value?"], "string", "Convert to string"),
            ("Number", Builtin, 0, Some(1), &["value?"], "number", "Convert to number"),
            ("Boolean", Builtin, 0, Some(1), &["value?"], "boolean", "Convert to boolean"),
        ];
        for (name, source, min, max, params, returns, description) in globals {
            self.register_method(
                MethodInfo::new(*name, EntryKind::Function, *source)
                    .with_signature(FunctionSignature::new(*min, *max, params, returns))
                    .with_description(*description),
            );
        }
    }

    fn register_namespaces(&mut self) {
        use EntrySource::{Builtin, Extension};
        for (name, source) in [
            ("Math", Builtin),
            ("Object", Builtin),
            ("Array", Builtin),
            ("Date", Builtin),
            ("JSON", Builtin),
            ("DateTime", Extension),
            ("Duration", Extension),
            ("Interval", Extension),
        ] {
            self.register_method(MethodInfo::new(name, EntryKind::Namespace, source));
        }

        let functions: &[(&str, usize, Option<usize>, &[&str], &str)] = &[
            ("Math.abs", 1, Some(1), &["x"], "number"),
            ("Math.ceil", 1, Some(1), &["x"], "number"),
            ("Math.floor", 1, Some(1), &["x"], "number"),
            ("Math.round", 1, Some(1), &["x"], "number"),
            ("Math.trunc", 1, Some(1), &["x"], "number"),
            ("Math.sign", 1, Some(1), &["x"], "number"),
            ("Math.sqrt", 1, Some(1), &["x"], "number"),
            ("Math.cbrt", 1, Some(1), &["x"], "number"),
            ("Math.pow", 2, Some(2), &["base", "exponent"], "number"),
            ("Math.min", 0, None, &["...numbers"], "number"),
            ("Math.max", 0, None, &["...numbers"], "number"),
            ("Math.log", 1, Some(1), &["x"], "number"),
            ("Math.log10", 1, Some(1), &["x"], "number"),
            ("Math.log2", 1, Some(1), &["x"], "number"),
            ("Math.exp", 1, Some(1), &["x"], "number"),
            ("Object.keys", 1, Some(1), &["object"], "array"),
            ("Object.values", 1, Some(1), &["object"], "array"),
            ("Object.entries", 1, Some(1), &["object"], "array"),
            ("Object.assign", 1, None, &["target", "...sources"], "object"),
            ("Object.fromEntries", 1, Some(1), &["entries"], "object"),
            ("String.fromCharCode", 0, None, &["...codes"], "string"),
            ("Number.isInteger", 1, Some(1), &["value"], "boolean"),
            ("Number.isFinite", 1, Some(1), &["value"], "boolean"),
            ("Number.isNaN", 1, Some(1), &["value"], "boolean"),
            ("Number.parseFloat", 1, Some(1), &["string"], "number"),
            ("Number.parseInt", 1, Some(2), &["string", "radix?"], "number"),
            ("Array.isArray", 1, Some(1), &["value"], "boolean"),
            ("Array.from", 1, Some(2), &["items", "mapFn?"], "array"),
            ("Date.now", 0, Some(0), &[], "number"),
            ("JSON.stringify", 1, Some(3), &["value", "replacer?", "indent?"], "string"),
            ("JSON.parse", 1, Some(1), &["text"], "any"),
            ("DateTime.now", 0, Some(0), &[], "datetime"),
            ("DateTime.fromISO", 1, Some(1), &["text"], "datetime"),
            ("DateTime.fromMillis", 1, Some(1), &["millis"], "datetime"),
            ("DateTime.fromSeconds", 1, Some(1), &["seconds"], "datetime"),
            ("DateTime.fromFormat", 2, Some(2), &["text", "format"], "datetime"),
            ("Duration.fromObject", 1, Some(1), &["units"], "duration"),
            ("Duration.fromMillis", 1, Some(1), &["millis"], "duration"),
            ("Interval.fromDateTimes", 2, Some(2), &["start", "end"], "interval"),
        ];
        for (name, min, max, params, returns) in functions {
            let source = if name.starts_with("DateTime.")
                || name.starts_with("Duration.")
                || name.starts_with("Interval.")
            {
                Extension
            } else {
                Builtin
            };
            self.register_method(
                MethodInfo::new(*name, EntryKind::Function, source)
                    .with_signature(FunctionSignature::new(*min, *max, params, returns)),
            );
        }

        for name in [
            "Math.PI",
            "Math.E",
            "Number.MAX_SAFE_INTEGER",
            "Number.MIN_SAFE_INTEGER",
            "Number.EPSILON",
        ] {
            self.register_method(MethodInfo::new(name, EntryKind::Constant, Builtin));
        }
    }

    fn register_string_members(&mut self) {
        self.add_properties(ValueType::String, EntrySource::Builtin, &["length"]);
        self.add_methods(
            ValueType::String,
            EntrySource::Builtin,
            &[
                ("toUpperCase", 0, Some(0), &[], "string"),
                ("toLowerCase", 0, Some(0), &[], "string"),
                ("trim", 0, Some(0), &[], "string"),
                ("trimStart", 0, Some(0), &[], "string"),
                ("trimEnd", 0, Some(0), &[], "string"),
                ("includes", 1, Some(2), &["search", "position?"], "boolean"),
                ("startsWith", 1, Some(2), &["search", "position?"], "boolean"),
                ("endsWith", 1, Some(2), &["search", "length?"], "boolean"),
                ("indexOf", 1, Some(2), &["search", "from?"], "number"),
                ("lastIndexOf", 1, Some(1), &["search"], "number"),
                ("slice", 0, Some(2), &["start?", "end?"], "string"),
                ("substring", 1, Some(2), &["start", "end?"], "string"),
                ("split", 0, Some(2), &["separator?", "limit?"], "array"),
                ("replace", 2, Some(2), &["search", "replacement"], "string"),
                ("replaceAll", 2, Some(2), &["search", "replacement"], "string"),
                ("repeat", 1, Some(1), &["count"], "string"),
                ("padStart", 1, Some(2), &["length", "fill?"], "string"),
                ("padEnd", 1, Some(2), &["length", "fill?"], "string"),
                ("charAt", 1, Some(1), &["index"], "string"),
                ("at", 1, Some(1), &["index"], "string"),
                ("concat", 0, None, &["...strings"], "string"),
                ("toString", 0, Some(0), &[], "string"),
            ],
        );
        self.add_methods(
            ValueType::String,
            EntrySource::Extension,
            &[
                ("isEmpty", 0, Some(0), &[], "boolean"),
                ("isNotEmpty", 0, Some(0), &[], "boolean"),
                ("toNumber", 0, Some(0), &[], "number"),
                ("toTitleCase", 0, Some(0), &[], "string"),
                ("toDateTime", 0, Some(0), &[], "datetime"),
            ],
        );
    }

    fn register_number_members(&mut self) {
        self.add_methods(
            ValueType::Number,
            EntrySource::Builtin,
            &[
                ("toFixed", 0, Some(1), &["digits?"], "string"),
                ("toString", 0, Some(1), &["radix?"], "string"),
            ],
        );
        self.add_methods(
            ValueType::Number,
            EntrySource::Extension,
            &[
                ("round", 0, Some(1), &["decimals?"], "number"),
                ("floor", 0, Some(0), &[], "number"),
                ("ceil", 0, Some(0), &[], "number"),
                ("abs", 0, Some(0), &[], "number"),
                ("isEven", 0, Some(0), &[], "boolean"),
                ("isOdd", 0, Some(0), &[], "boolean"),
            ],
        );
    }

    fn register_boolean_members(&mut self) {
        self.add_methods(
            ValueType::Boolean,
            EntrySource::Builtin,
            &[("toString", 0, Some(0), &[], "string")],
        );
    }

    fn register_array_members(&mut self) {
        self.add_properties(ValueType::Array, EntrySource::Builtin, &["length"]);
        self.add_methods(
            ValueType::Array,
            EntrySource::Builtin,
            &[
                ("map", 1, Some(1), &["callback"], "array"),
                ("filter", 1, Some(1), &["callback"], "array"),
                ("find", 1, Some(1), &["callback"], "any"),
                ("findIndex", 1, Some(1), &["callback"], "number"),
                ("some", 1, Some(1), &["callback"], "boolean"),
                ("every", 1, Some(1), &["callback"], "boolean"),
                ("reduce", 1, Some(2), &["callback", "initial?"], "any"),
                ("includes", 1, Some(1), &["value"], "boolean"),
                ("indexOf", 1, Some(1), &["value"], "number"),
                ("join", 0, Some(1), &["separator?"], "string"),
                ("slice", 0, Some(2), &["start?", "end?"], "array"),
                ("concat", 0, None, &["...arrays"], "array"),
                ("reverse", 0, Some(0), &[], "array"),
                ("sort", 0, Some(1), &["compare?"], "array"),
                ("flat", 0, Some(1), &["depth?"], "array"),
                ("at", 1, Some(1), &["index"], "any"),
                ("toString", 0, Some(0), &[], "string"),
            ],
        );
        self.add_methods(
            ValueType::Array,
            EntrySource::Extension,
            &[
                ("first", 0, Some(0), &[], "any"),
                ("last", 0, Some(0), &[], "any"),
                ("isEmpty", 0, Some(0), &[], "boolean"),
                ("isNotEmpty", 0, Some(0), &[], "boolean"),
                ("sum", 0, Some(0), &[], "number"),
                ("average", 0, Some(0), &[], "number"),
                ("min", 0, Some(0), &[], "number"),
                ("max", 0, Some(0), &[], "number"),
                ("unique", 0, Some(0), &[], "array"),
                ("compact", 0, Some(0), &[], "array"),
                ("pluck", 1, None, &["...fields"], "array"),
            ],
        );
    }

    fn register_object_members(&mut self) {
        self.add_methods(
            ValueType::Object,
            EntrySource::Builtin,
            &[("hasOwnProperty", 1, Some(1), &["key"], "boolean")],
        );
        self.add_methods(
            ValueType::Object,
            EntrySource::Extension,
            &[
                ("keys", 0, Some(0), &[], "array"),
                ("values", 0, Some(0), &[], "array"),
                ("entries", 0, Some(0), &[], "array"),
                ("hasField", 1, Some(1), &["key"], "boolean"),
                ("removeField", 1, Some(1), &["key"], "object"),
                ("isEmpty", 0, Some(0), &[], "boolean"),
                ("isNotEmpty", 0, Some(0), &[], "boolean"),
                ("compact", 0, Some(0), &[], "object"),
                ("toJsonString", 0, Some(0), &[], "string"),
            ],
        );
    }

    fn register_datetime_members(&mut self) {
        self.add_properties(
            ValueType::DateTime,
            EntrySource::Extension,
            &[
                "year",
                "month",
                "day",
                "hour",
                "minute",
                "second",
                "millisecond",
                "weekday",
            ],
        );
        self.add_methods(
            ValueType::DateTime,
            EntrySource::Extension,
            &[
                ("toISO", 0, Some(0), &[], "string"),
                ("toISODate", 0, Some(0), &[], "string"),
                ("toFormat", 1, Some(1), &["format"], "string"),
                ("toMillis", 0, Some(0), &[], "number"),
                ("toSeconds", 0, Some(0), &[], "number"),
                ("plus", 1, Some(1), &["duration"], "datetime"),
                ("minus", 1, Some(1), &["duration"], "datetime"),
                ("diff", 1, Some(1), &["other"], "duration"),
                ("startOf", 1, Some(1), &["unit"], "datetime"),
                ("endOf", 1, Some(1), &["unit"], "datetime"),
                ("toUTC", 0, Some(0), &[], "datetime"),
                ("equals", 1, Some(1), &["other"], "boolean"),
                ("toString", 0, Some(0), &[], "string"),
            ],
        );
    }

    fn register_duration_members(&mut self) {
        self.add_methods(
            ValueType::Duration,
            EntrySource::Extension,
            &[
                ("as", 1, Some(1), &["unit"], "number"),
                ("toMillis", 0, Some(0), &[], "number"),
                ("toISO", 0, Some(0), &[], "string"),
                ("plus", 1, Some(1), &["duration"], "duration"),
                ("minus", 1, Some(1), &["duration"], "duration"),
                ("toString", 0, Some(0), &[], "string"),
            ],
        );
    }

    fn register_interval_members(&mut self) {
        self.add_properties(ValueType::Interval, EntrySource::Extension, &["start", "end"]);
        self.add_methods(
            ValueType::Interval,
            EntrySource::Extension,
            &[
                ("length", 0, Some(1), &["unit?"], "number"),
                ("contains", 1, Some(1), &["datetime"], "boolean"),
                ("toDuration", 0, Some(0), &[], "duration"),
                ("toString", 0, Some(0), &[], "string"),
            ],
        );
    }

    // ==================== Helpers ====================

    fn add_properties(&mut self, ty: ValueType, source: EntrySource, names: &[&str]) {
        for name in names {
            self.register_member(ty, MethodInfo::new(*name, EntryKind::Property, source));
        }
    }

    #[allow(clippy::type_complexity)]
    fn add_methods(
        &mut self,
        ty: ValueType,
        source: EntrySource,
        methods: &[(&str, usize, Option<usize>, &[&str], &str)],
    ) {
        for (name, min, max, params, returns) in methods {
            self.register_member(
                ty,
                MethodInfo::new(*name, EntryKind::Method, source)
                    .with_signature(FunctionSignature::new(*min, *max, params, returns)),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_if_signature() {
        let registry = Registry::standard();
        let signature = registry.function("$if").unwrap().signature.clone().unwrap();
        assert_eq!((signature.min_args, signature.max_args), (2, Some(3)));
        assert!(!signature.accepts(1));
        assert!(signature.accepts(3));
        assert!(!signature.accepts(4));
        assert_eq!(signature.render("$if"), "$if(condition, then, else?) -> any");
        assert_eq!(signature.expected_args(), "2 to 3");
        assert_eq!(
            Registry::builtin().function("$min").unwrap().signature.as_ref().unwrap().expected_args(),
            "at least 1"
        );
    }

    #[test]
    fn test_deprecated_variables() {
        let registry = Registry::standard();
        let data = registry.variable("$data").unwrap();
        assert!(data.deprecated);
        assert_eq!(data.replacement.as_deref(), Some("$json"));
        assert!(!registry.variable("$json").unwrap().deprecated);
    }

    #[test]
    fn test_namespace_members() {
        let registry = Registry::standard();
        let names: Vec<&str> = registry
            .namespace_members("Duration")
            .map(|info| info.name.as_str())
            .collect();
        assert_eq!(names, vec!["Duration.fromMillis", "Duration.fromObject"]);
        assert_eq!(
            registry.function("Math.PI").map(|info| info.kind),
            Some(EntryKind::Constant)
        );
    }

    #[test]
    fn test_find_method_across_types() {
        let registry = Registry::standard();
        let types: Vec<ValueType> = registry
            .find_method("isEmpty")
            .into_iter()
            .map(|(ty, _)| ty)
            .collect();
        assert_eq!(
            types,
            vec![ValueType::String, ValueType::Array, ValueType::Object]
        );
        assert!(registry.find_method("nope").is_empty());
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = Registry::standard();
        registry.register_method(
            MethodInfo::new("$slugify", EntryKind::Function, EntrySource::Custom)
                .with_signature(FunctionSignature::new(1, Some(1), &["text"], "string")),
        );
        registry.register_variable(VariableInfo::new("$tenant", EntrySource::Custom, "Tenant"));

        assert!(registry.is_known_identifier("$slugify"));
        assert!(registry.is_known_identifier("$tenant"));
        assert!(!registry.is_known_identifier("$other"));
    }

    #[test]
    fn test_members_are_sorted() {
        let registry = Registry::standard();
        let names: Vec<&str> = registry
            .members(ValueType::Interval)
            .map(|info| info.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec!["contains", "end", "length", "start", "toDuration", "toString"]
        );
    }
}
