//! Abstract syntax tree
//!
//! Every node records its byte range, the source text it was parsed from and
//! a structural complexity score. Serialized nodes are a `type`-tagged union.

use serde::Serialize;
use std::fmt;

/// A node of the syntax tree
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AstNode {
    /// Node payload
    #[serde(flatten)]
    pub kind: NodeKind,
    /// Start byte offset (inclusive)
    pub start: usize,
    /// End byte offset (exclusive)
    pub end: usize,
    /// Source text of the node
    pub raw: String,
    /// Heuristic structural cost
    pub complexity: u32,
    #[serde(skip)]
    height: u32,
}

/// Node payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum NodeKind {
    /// Root node
    Program {
        /// `ExpressionStatement` or `Template` nodes
        body: Vec<AstNode>,
    },
    /// A template with interleaved text and expressions
    Template {
        /// Text, expression, text, …, text
        parts: Vec<TemplatePart>,
    },
    /// One `{{ … }}` span inside a template
    Expression {
        /// The parsed expression
        expression: Box<AstNode>,
    },
    /// A bare expression as a program statement
    ExpressionStatement {
        /// The parsed expression
        expression: Box<AstNode>,
    },
    /// `"text"` or `'text'`
    StringLiteral {
        /// Unescaped value
        value: String,
    },
    /// `42`, `3.5`
    NumericLiteral {
        /// Numeric value
        value: f64,
    },
    /// `true` / `false`
    BooleanLiteral {
        /// Boolean value
        value: bool,
    },
    /// `null`
    NullLiteral,
    /// A name (`$json`, `Math`, `undefined`)
    Identifier {
        /// Identifier text
        name: String,
    },
    /// `object.property`, `object[expr]`, `object?.property`
    MemberExpression {
        /// Receiver
        object: Box<AstNode>,
        /// `Identifier` when not computed, any expression otherwise
        property: Box<AstNode>,
        /// `[ ]` access
        computed: bool,
        /// `?.` access
        optional: bool,
    },
    /// `callee(args)`
    CallExpression {
        /// Called expression
        callee: Box<AstNode>,
        /// Arguments in order
        arguments: Vec<AstNode>,
        /// `callee?.(args)`
        optional: bool,
    },
    /// `[a, b]`
    ArrayExpression {
        /// Elements in order
        elements: Vec<AstNode>,
    },
    /// `{ key: value }`
    ObjectExpression {
        /// Properties in source order
        properties: Vec<ObjectProperty>,
    },
    /// `left op right`
    BinaryExpression {
        /// Operator
        operator: BinaryOperator,
        /// Left operand
        left: Box<AstNode>,
        /// Right operand
        right: Box<AstNode>,
    },
    /// `op argument`
    UnaryExpression {
        /// Operator
        operator: UnaryOperator,
        /// Operand
        argument: Box<AstNode>,
    },
    /// `test ? consequent : alternate`
    ConditionalExpression {
        /// Condition
        test: Box<AstNode>,
        /// Value when truthy
        consequent: Box<AstNode>,
        /// Value when falsy
        alternate: Box<AstNode>,
    },
    /// `x => body`, `(a, b) => body`; only valid as a call argument
    ArrowFunctionExpression {
        /// Parameter names
        params: Vec<String>,
        /// Expression body
        body: Box<AstNode>,
    },
}

/// A `key: value` entry of an object literal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectProperty {
    /// Property name
    pub key: String,
    /// Property value
    pub value: AstNode,
}

/// A segment of a `Template` node
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum TemplatePart {
    /// Literal text between expressions
    TemplateText {
        /// Text content
        value: String,
        /// Start byte offset in the template
        start: usize,
        /// End byte offset in the template
        end: usize,
    },
    /// A `{{ … }}` span
    TemplateExpression {
        /// `Expression` node
        expression: AstNode,
    },
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BinaryOperator {
    /// `+`
    #[serde(rename = "+")]
    Add,
    /// `-`
    #[serde(rename = "-")]
    Subtract,
    /// `*`
    #[serde(rename = "*")]
    Multiply,
    /// `/`
    #[serde(rename = "/")]
    Divide,
    /// `%`
    #[serde(rename = "%")]
    Modulo,
    /// `**`
    #[serde(rename = "**")]
    Power,
    /// `==`
    #[serde(rename = "==")]
    Equal,
    /// `!=`
    #[serde(rename = "!=")]
    NotEqual,
    /// `===`
    #[serde(rename = "===")]
    StrictEqual,
    /// `!==`
    #[serde(rename = "!==")]
    StrictNotEqual,
    /// `<`
    #[serde(rename = "<")]
    LessThan,
    /// `<=`
    #[serde(rename = "<=")]
    LessEqual,
    /// `>`
    #[serde(rename = ">")]
    GreaterThan,
    /// `>=`
    #[serde(rename = ">=")]
    GreaterEqual,
    /// `&&`
    #[serde(rename = "&&")]
    And,
    /// `||`
    #[serde(rename = "||")]
    Or,
    /// `??`
    #[serde(rename = "??")]
    Nullish,
}

impl BinaryOperator {
    /// Operator symbol
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Power => "**",
            BinaryOperator::Equal => "==",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::StrictEqual => "===",
            BinaryOperator::StrictNotEqual => "!==",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterEqual => ">=",
            BinaryOperator::And => "&&",
            BinaryOperator::Or => "||",
            BinaryOperator::Nullish => "??",
        }
    }

    /// Whether the operator is numeric arithmetic
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Add
                | BinaryOperator::Subtract
                | BinaryOperator::Multiply
                | BinaryOperator::Divide
                | BinaryOperator::Modulo
                | BinaryOperator::Power
        )
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UnaryOperator {
    /// `!`
    #[serde(rename = "!")]
    Not,
    /// `-`
    #[serde(rename = "-")]
    Negate,
    /// `+`
    #[serde(rename = "+")]
    Plus,
    /// `typeof`
    #[serde(rename = "typeof")]
    Typeof,
}

impl UnaryOperator {
    /// Operator symbol
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOperator::Not => "!",
            UnaryOperator::Negate => "-",
            UnaryOperator::Plus => "+",
            UnaryOperator::Typeof => "typeof",
        }
    }
}

impl fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AstNode {
    /// Build a node, scoring its complexity from the children
    pub fn new(kind: NodeKind, start: usize, end: usize, raw: impl Into<String>) -> Self {
        let complexity = complexity_of(&kind);
        let height = 1 + children_of(&kind).iter().map(|child| child.height).max().unwrap_or(0);
        Self {
            kind,
            start,
            end,
            raw: raw.into(),
            complexity,
            height,
        }
    }

    /// Levels from this node down to its deepest leaf, counting itself
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Node type name as serialized
    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Program { .. } => "Program",
            NodeKind::Template { .. } => "Template",
            NodeKind::Expression { .. } => "Expression",
            NodeKind::ExpressionStatement { .. } => "ExpressionStatement",
            NodeKind::StringLiteral { .. } => "StringLiteral",
            NodeKind::NumericLiteral { .. } => "NumericLiteral",
            NodeKind::BooleanLiteral { .. } => "BooleanLiteral",
            NodeKind::NullLiteral => "NullLiteral",
            NodeKind::Identifier { .. } => "Identifier",
            NodeKind::MemberExpression { .. } => "MemberExpression",
            NodeKind::CallExpression { .. } => "CallExpression",
            NodeKind::ArrayExpression { .. } => "ArrayExpression",
            NodeKind::ObjectExpression { .. } => "ObjectExpression",
            NodeKind::BinaryExpression { .. } => "BinaryExpression",
            NodeKind::UnaryExpression { .. } => "UnaryExpression",
            NodeKind::ConditionalExpression { .. } => "ConditionalExpression",
            NodeKind::ArrowFunctionExpression { .. } => "ArrowFunctionExpression",
        }
    }

    /// Identifier name, if this node is an identifier
    pub fn as_identifier(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Identifier { name } => Some(name),
            _ => None,
        }
    }

    /// Direct children in source order
    pub fn children(&self) -> Vec<&AstNode> {
        children_of(&self.kind)
    }

    /// Visit this node and every descendant, parents first
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a AstNode)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }

    /// Move every offset in the subtree right by `offset` bytes
    pub fn shift(&mut self, offset: usize) {
        if offset == 0 {
            return;
        }
        self.start += offset;
        self.end += offset;
        match &mut self.kind {
            NodeKind::Program { body } => body.iter_mut().for_each(|n| n.shift(offset)),
            NodeKind::Template { parts } => {
                for part in parts {
                    match part {
                        TemplatePart::TemplateText { start, end, .. } => {
                            *start += offset;
                            *end += offset;
                        }
                        TemplatePart::TemplateExpression { expression } => {
                            expression.shift(offset);
                        }
                    }
                }
            }
            NodeKind::Expression { expression } | NodeKind::ExpressionStatement { expression } => {
                expression.shift(offset);
            }
            NodeKind::MemberExpression {
                object, property, ..
            } => {
                object.shift(offset);
                property.shift(offset);
            }
            NodeKind::CallExpression {
                callee, arguments, ..
            } => {
                callee.shift(offset);
                arguments.iter_mut().for_each(|n| n.shift(offset));
            }
            NodeKind::ArrayExpression { elements } => {
                elements.iter_mut().for_each(|n| n.shift(offset));
            }
            NodeKind::ObjectExpression { properties } => {
                properties.iter_mut().for_each(|p| p.value.shift(offset));
            }
            NodeKind::BinaryExpression { left, right, .. } => {
                left.shift(offset);
                right.shift(offset);
            }
            NodeKind::UnaryExpression { argument, .. } => argument.shift(offset),
            NodeKind::ConditionalExpression {
                test,
                consequent,
                alternate,
            } => {
                test.shift(offset);
                consequent.shift(offset);
                alternate.shift(offset);
            }
            NodeKind::ArrowFunctionExpression { body, .. } => body.shift(offset),
            NodeKind::StringLiteral { .. }
            | NodeKind::NumericLiteral { .. }
            | NodeKind::BooleanLiteral { .. }
            | NodeKind::NullLiteral
            | NodeKind::Identifier { .. } => {}
        }
    }

    /// Dotted name of a static member chain (`Math.max`, `$json.a.b`)
    ///
    /// Returns `None` as soon as the chain contains a computed access, a call
    /// or anything other than identifiers.
    pub fn dotted_name(&self) -> Option<String> {
        match &self.kind {
            NodeKind::Identifier { name } => Some(name.clone()),
            NodeKind::MemberExpression {
                object,
                property,
                computed: false,
                ..
            } => {
                let base = object.dotted_name()?;
                let prop = property.as_identifier()?;
                Some(format!("{base}.{prop}"))
            }
            _ => None,
        }
    }
}

fn children_of(kind: &NodeKind) -> Vec<&AstNode> {
    match kind {
        NodeKind::Program { body } => body.iter().collect(),
        NodeKind::Template { parts } => parts
            .iter()
            .filter_map(|part| match part {
                TemplatePart::TemplateExpression { expression } => Some(expression),
                TemplatePart::TemplateText { .. } => None,
            })
            .collect(),
        NodeKind::Expression { expression } | NodeKind::ExpressionStatement { expression } => {
            vec![&**expression]
        }
        NodeKind::MemberExpression {
            object, property, ..
        } => vec![&**object, &**property],
        NodeKind::CallExpression {
            callee, arguments, ..
        } => std::iter::once(&**callee).chain(arguments).collect(),
        NodeKind::ArrayExpression { elements } => elements.iter().collect(),
        NodeKind::ObjectExpression { properties } => {
            properties.iter().map(|p| &p.value).collect()
        }
        NodeKind::BinaryExpression { left, right, .. } => vec![&**left, &**right],
        NodeKind::UnaryExpression { argument, .. } => vec![&**argument],
        NodeKind::ConditionalExpression {
            test,
            consequent,
            alternate,
        } => vec![&**test, &**consequent, &**alternate],
        NodeKind::ArrowFunctionExpression { body, .. } => vec![&**body],
        NodeKind::StringLiteral { .. }
        | NodeKind::NumericLiteral { .. }
        | NodeKind::BooleanLiteral { .. }
        | NodeKind::NullLiteral
        | NodeKind::Identifier { .. } => Vec::new(),
    }
}

fn complexity_of(kind: &NodeKind) -> u32 {
    match kind {
        NodeKind::StringLiteral { .. }
        | NodeKind::NumericLiteral { .. }
        | NodeKind::BooleanLiteral { .. }
        | NodeKind::NullLiteral
        | NodeKind::Identifier { .. } => 1,
        NodeKind::BinaryExpression { left, right, .. } => 1 + left.complexity + right.complexity,
        NodeKind::ConditionalExpression {
            test,
            consequent,
            alternate,
        } => 2 + test.complexity + consequent.complexity + alternate.complexity,
        NodeKind::CallExpression { arguments, .. } => {
            1 + arguments.iter().map(|a| a.complexity).sum::<u32>()
        }
        NodeKind::MemberExpression { object, .. } => 1 + object.complexity,
        NodeKind::ArrayExpression { elements } => {
            1 + elements.iter().map(|e| e.complexity).sum::<u32>()
        }
        NodeKind::ObjectExpression { properties } => {
            1 + properties.iter().map(|p| p.value.complexity).sum::<u32>()
        }
        NodeKind::UnaryExpression { argument, .. } => 1 + argument.complexity,
        NodeKind::ArrowFunctionExpression { body, .. } => 1 + body.complexity,
        NodeKind::Expression { expression } | NodeKind::ExpressionStatement { expression } => {
            expression.complexity
        }
        NodeKind::Template { parts } => parts
            .iter()
            .map(|part| match part {
                TemplatePart::TemplateExpression { expression } => expression.complexity,
                TemplatePart::TemplateText { .. } => 0,
            })
            .sum(),
        NodeKind::Program { body } => body.iter().map(|n| n.complexity).sum(),
    }
}
