//! The parse tree of a template family.
//!
//! A [`Forest`] is what the parser produces and what the compiler consumes.
//! It is never modified after parsing.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::types::span::Span;

/// A root template together with every template it can invoke by name.
#[derive(Debug, Clone)]
pub struct Forest {
    pub root: String,
    pub trees: BTreeMap<String, Tree>,
}

/// A single named template body.
#[derive(Debug, Clone)]
pub struct Tree {
    pub name: String,
    pub source: Arc<str>,
    pub root: ListNode,
}

#[derive(Debug, Clone, Default)]
pub struct ListNode {
    pub span: Span,
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone)]
pub enum Node {
    Text(TextNode),
    Action(PipeNode),
    If(BranchNode),
    With(BranchNode),
    Range(BranchNode),
    Template(TemplateNode),
    Comment(Span),
    Break(Span),
    Continue(Span),
}

#[derive(Debug, Clone)]
pub struct TextNode {
    pub span: Span,
    pub text: String,
}

/// The shared shape of `if`, `with` and `range`.
#[derive(Debug, Clone)]
pub struct BranchNode {
    pub span: Span,
    pub pipe: PipeNode,
    pub list: ListNode,
    pub else_list: Option<ListNode>,
}

/// A `{{template "name" pipeline}}` invocation.
#[derive(Debug, Clone)]
pub struct TemplateNode {
    pub span: Span,
    pub name: String,
    pub pipe: Option<PipeNode>,
}

/// A pipeline with optional variable declarations, e.g.
///
///   $x := .Items | len
///
#[derive(Debug, Clone)]
pub struct PipeNode {
    pub span: Span,
    pub is_assign: bool,
    pub decl: Vec<VariableNode>,
    pub cmds: Vec<CommandNode>,
}

/// A declared variable, the name keeps its `$` prefix.
#[derive(Debug, Clone)]
pub struct VariableNode {
    pub span: Span,
    pub name: String,
}

/// A single pipeline stage, the first argument is the operation.
#[derive(Debug, Clone)]
pub struct CommandNode {
    pub span: Span,
    pub args: Vec<Arg>,
}

#[derive(Debug, Clone)]
pub struct Arg {
    pub span: Span,
    pub kind: ArgKind,
}

#[derive(Debug, Clone)]
pub enum ArgKind {
    /// `.`
    Dot,
    /// `nil`
    Nil,
    /// `.A.B`
    Field(Vec<String>),
    /// `$x.A.B`, the first ident is the variable name with its `$` prefix.
    Variable(Vec<String>),
    /// A function name.
    Identifier(String),
    /// `(pipeline).A.B` or `ident.A`
    Chain(Box<Arg>, Vec<String>),
    /// `(pipeline)`
    Pipe(Box<PipeNode>),
    Bool(bool),
    Number(Number),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Arg {
    /// Whether this argument is a constant that needs no evaluation.
    pub fn is_literal(&self) -> bool {
        matches!(
            self.kind,
            ArgKind::Nil | ArgKind::Bool(_) | ArgKind::Number(_) | ArgKind::String(_)
        )
    }
}

impl PipeNode {
    pub fn new(span: Span, cmds: Vec<CommandNode>) -> Self {
        Self {
            span,
            is_assign: false,
            decl: Vec::new(),
            cmds,
        }
    }
}

impl ListNode {
    /// Appends a node and grows the span to cover it.
    pub fn push(&mut self, node: Node) {
        let span = node.span();
        self.span = match self.nodes.is_empty() {
            true => span,
            false => self.span.combine(span),
        };
        self.nodes.push(node);
    }
}

impl Node {
    pub fn span(&self) -> Span {
        match self {
            Self::Text(n) => n.span,
            Self::Action(n) => n.span,
            Self::If(n) | Self::With(n) | Self::Range(n) => n.span,
            Self::Template(n) => n.span,
            Self::Comment(span) | Self::Break(span) | Self::Continue(span) => *span,
        }
    }
}
