//! The parse tree consumed by the compiler.
//!
//! A parser front end produces these nodes; the compiler never sees source
//! text. Children the grammar requires are still `Option` here so that a
//! malformed tree surfaces as a compile error rather than a panic. Every
//! node is serde-deserializable (externally tagged enums), which lets a
//! tree be handed over as JSON.

use serde::{Deserialize, Serialize};

pub use whistle_ir::{SourcePosition, SourceSpan as Span};

// ──────────────────────────────────────────────
// Program structure
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Root {
    #[serde(default)]
    pub span: Span,
    #[serde(default)]
    pub items: Vec<RootItem>,
    #[serde(default)]
    pub post_process: Option<PostProcessNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum RootItem {
    Mapping(Mapping),
    ProjectorDef(ProjectorDef),
    Conditional(ConditionBlock),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum PostProcessNode {
    /// `post someProjector`
    Name {
        #[serde(default)]
        span: Span,
        name: String,
    },
    /// `post def name() { ... }`
    Inline(ProjectorDef),
}

/// `def name(args...) { block }`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProjectorDef {
    #[serde(default)]
    pub span: Span,
    pub name: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    pub block: Option<Block>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Block {
    #[serde(default)]
    pub span: Span,
    #[serde(default)]
    pub items: Vec<BlockItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum BlockItem {
    Mapping(Mapping),
    Conditional(ConditionBlock),
}

/// `if cond { ... } else { ... }`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConditionBlock {
    #[serde(default)]
    pub span: Span,
    pub condition: Option<Expression>,
    pub then: Option<Block>,
    #[serde(default)]
    pub otherwise: Option<Block>,
}

/// `target (if condition): expression`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Mapping {
    #[serde(default)]
    pub span: Span,
    pub target: Option<TargetNode>,
    #[serde(default)]
    pub condition: Option<Expression>,
    pub expression: Option<Expression>,
}

// ──────────────────────────────────────────────
// Targets and paths
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum TargetNode {
    /// `var name.sub`
    Var {
        #[serde(default)]
        span: Span,
        path: Option<Path>,
    },
    /// `out name`
    Obj {
        #[serde(default)]
        span: Span,
        name: String,
    },
    /// `root name.sub`
    RootField {
        #[serde(default)]
        span: Span,
        path: Option<Path>,
    },
    /// `$this`
    This {
        #[serde(default)]
        span: Span,
    },
    /// `name.sub`
    Field {
        #[serde(default)]
        span: Span,
        path: Option<Path>,
    },
}

impl TargetNode {
    pub fn span(&self) -> Span {
        match self {
            TargetNode::Var { span, .. }
            | TargetNode::Obj { span, .. }
            | TargetNode::RootField { span, .. }
            | TargetNode::This { span }
            | TargetNode::Field { span, .. } => *span,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Path {
    #[serde(default)]
    pub span: Span,
    pub head: Option<PathHead>,
    #[serde(default)]
    pub segments: Vec<PathSegment>,
    /// Trailing `[]`.
    #[serde(default)]
    pub array_mod: bool,
    /// Trailing `!`.
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum PathHead {
    /// An identifier, possibly single-quoted.
    Token(String),
    /// `$root`
    RootInput,
    Index(usize),
    Wildcard,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum PathSegment {
    Field(String),
    Index(usize),
    Wildcard,
}

impl Path {
    /// `a.b.c`
    pub fn dotted(text: &str) -> Path {
        let mut parts = text.split('.');
        let head = parts.next().map(|h| PathHead::Token(h.to_string()));
        Path {
            head,
            segments: parts.map(|p| PathSegment::Field(p.to_string())).collect(),
            ..Path::default()
        }
    }

    pub fn with_array_mod(mut self) -> Path {
        self.array_mod = true;
        self
    }
}

// ──────────────────────────────────────────────
// Expressions and sources
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Expression {
    /// `~x`
    PreOp {
        #[serde(default)]
        span: Span,
        op: String,
        operand: Option<Box<Expression>>,
    },
    /// `x?`
    PostOp {
        #[serde(default)]
        span: Span,
        op: String,
        operand: Option<Box<Expression>>,
    },
    BiOp {
        #[serde(default)]
        span: Span,
        op: String,
        lhs: Option<Box<Expression>>,
        rhs: Option<Box<Expression>>,
    },
    /// `name(args...)` or `name[](args...)`
    Projection {
        #[serde(default)]
        span: Span,
        name: String,
        #[serde(default)]
        array_mod: bool,
        #[serde(default)]
        args: Vec<SourceNode>,
    },
    /// `name()`
    NoArg {
        #[serde(default)]
        span: Span,
        name: String,
    },
    /// `{ mappings... }` used as a value.
    AnonBlock {
        #[serde(default)]
        span: Span,
        block: Option<Block>,
    },
    Source(SourceNode),
}

impl Expression {
    pub fn span(&self) -> Span {
        match self {
            Expression::PreOp { span, .. }
            | Expression::PostOp { span, .. }
            | Expression::BiOp { span, .. }
            | Expression::Projection { span, .. }
            | Expression::NoArg { span, .. }
            | Expression::AnonBlock { span, .. } => *span,
            Expression::Source(source) => source.span(),
        }
    }

    pub fn binary(op: &str, lhs: Expression, rhs: Expression) -> Expression {
        Expression::BiOp {
            span: Span::default(),
            op: op.to_string(),
            lhs: Some(Box::new(lhs)),
            rhs: Some(Box::new(rhs)),
        }
    }

    pub fn call(name: &str, args: Vec<SourceNode>) -> Expression {
        Expression::Projection {
            span: Span::default(),
            name: name.to_string(),
            array_mod: false,
            args,
        }
    }

    pub fn num(text: &str) -> Expression {
        Expression::Source(SourceNode::num(text))
    }

    pub fn string(quoted: &str) -> Expression {
        Expression::Source(SourceNode::ConstStr {
            span: Span::default(),
            text: quoted.to_string(),
        })
    }

    pub fn boolean(value: bool) -> Expression {
        Expression::Source(SourceNode::ConstBool {
            span: Span::default(),
            value,
        })
    }

    pub fn input(path: &str) -> Expression {
        Expression::Source(SourceNode::input(path))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SourceNode {
    ConstNum {
        #[serde(default)]
        span: Span,
        text: String,
    },
    /// The literal including its surrounding double quotes.
    ConstStr {
        #[serde(default)]
        span: Span,
        text: String,
    },
    ConstBool {
        #[serde(default)]
        span: Span,
        value: bool,
    },
    Input(InputNode),
    /// `(expression)`
    Projection {
        #[serde(default)]
        span: Span,
        expression: Option<Box<Expression>>,
        #[serde(default)]
        array_mod: bool,
    },
}

impl SourceNode {
    pub fn span(&self) -> Span {
        match self {
            SourceNode::ConstNum { span, .. }
            | SourceNode::ConstStr { span, .. }
            | SourceNode::ConstBool { span, .. }
            | SourceNode::Projection { span, .. } => *span,
            SourceNode::Input(input) => input.span,
        }
    }

    pub fn num(text: &str) -> SourceNode {
        SourceNode::ConstNum {
            span: Span::default(),
            text: text.to_string(),
        }
    }

    pub fn input(path: &str) -> SourceNode {
        SourceNode::Input(InputNode {
            path: Some(Path::dotted(path)),
            ..InputNode::default()
        })
    }

    /// `(expression)`
    pub fn nested(expression: Expression) -> SourceNode {
        SourceNode::Projection {
            span: Span::default(),
            expression: Some(Box::new(expression)),
            array_mod: false,
        }
    }
}

/// A read of an argument, variable or already written field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InputNode {
    #[serde(default)]
    pub span: Span,
    pub path: Option<Path>,
    /// `var x`: must resolve to a local variable.
    #[serde(default)]
    pub var: bool,
    /// `dest x`: read back the projector's own output.
    #[serde(default)]
    pub dest: bool,
    /// `x[]`: iterate over the selected array.
    #[serde(default)]
    pub array_mod: bool,
    /// `x[where predicate]`
    #[serde(default)]
    pub filter: Option<Box<Expression>>,
}
