//! The syntax tree handed over by the parser.
//!
//! The tree is deliberately untyped: every node is a kind tag, an optional leaf value and an
//! ordered list of children. The set of kinds is closed, so the generator can match on it
//! exhaustively.

use std::{fmt, str::FromStr};

use educe::Educe;
use serde::Deserialize;
use thiserror::Error;

pub mod common;

pub use common::Span;

/// Every node kind the parser can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    TranslationUnit,
    FunctionDefinition,
    FunctionDeclarator,
    ParameterList,
    ParameterDeclaration,
    DeclarationSpecifiers,
    TypeSpecifier,
    TypeQualifier,
    StorageClassSpecifier,
    Pointer,
    CompoundStatement,
    StatementList,
    DeclarationList,
    Declaration,
    InitDeclaratorList,
    InitDeclarator,
    IfElseStatement,
    ReturnExpr,
    AssignmentExpression,
    FunctionCall,
    ArgumentExpressionList,
    Expression,
    Int,
    Float,
    Char,
    Identifier,
}

impl NodeKind {
    pub const ALL: [NodeKind; 26] = [
        NodeKind::TranslationUnit,
        NodeKind::FunctionDefinition,
        NodeKind::FunctionDeclarator,
        NodeKind::ParameterList,
        NodeKind::ParameterDeclaration,
        NodeKind::DeclarationSpecifiers,
        NodeKind::TypeSpecifier,
        NodeKind::TypeQualifier,
        NodeKind::StorageClassSpecifier,
        NodeKind::Pointer,
        NodeKind::CompoundStatement,
        NodeKind::StatementList,
        NodeKind::DeclarationList,
        NodeKind::Declaration,
        NodeKind::InitDeclaratorList,
        NodeKind::InitDeclarator,
        NodeKind::IfElseStatement,
        NodeKind::ReturnExpr,
        NodeKind::AssignmentExpression,
        NodeKind::FunctionCall,
        NodeKind::ArgumentExpressionList,
        NodeKind::Expression,
        NodeKind::Int,
        NodeKind::Float,
        NodeKind::Char,
        NodeKind::Identifier,
    ];

    /// The tag the parser uses for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::TranslationUnit => "translation_unit",
            NodeKind::FunctionDefinition => "function_definition",
            NodeKind::FunctionDeclarator => "function_declarator",
            NodeKind::ParameterList => "parameter_list",
            NodeKind::ParameterDeclaration => "parameter_declaration",
            NodeKind::DeclarationSpecifiers => "declaration_specifiers",
            NodeKind::TypeSpecifier => "type_specifier",
            NodeKind::TypeQualifier => "type_qualifier",
            NodeKind::StorageClassSpecifier => "storage_class_specifier",
            NodeKind::Pointer => "pointer",
            NodeKind::CompoundStatement => "compound_statement",
            NodeKind::StatementList => "statement_list",
            NodeKind::DeclarationList => "declaration_list",
            NodeKind::Declaration => "declaration",
            NodeKind::InitDeclaratorList => "init_declarator_list",
            NodeKind::InitDeclarator => "init_declarator",
            NodeKind::IfElseStatement => "if_else_statement",
            NodeKind::ReturnExpr => "return_expr",
            NodeKind::AssignmentExpression => "assignment_expression",
            NodeKind::FunctionCall => "function_call",
            NodeKind::ArgumentExpressionList => "argument_expression_list",
            NodeKind::Expression => "expression",
            NodeKind::Int => "int",
            NodeKind::Float => "float",
            NodeKind::Char => "char",
            NodeKind::Identifier => "identifier",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown syntax node kind {0:?}")]
pub struct UnknownNodeKind(pub String);

impl FromStr for NodeKind {
    type Err = UnknownNodeKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownNodeKind(s.to_string()))
    }
}

/// A node of the parsed tree.
///
/// Spans are ignored when comparing nodes, two trees are equal if they have the same shape.
#[derive(Debug, Clone, Educe, Deserialize)]
#[educe(PartialEq, Eq, Hash)]
pub struct SyntaxNode {
    pub kind: NodeKind,
    /// The literal text of a leaf (identifier name, number, type name).
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    #[educe(PartialEq(ignore), Hash(ignore))]
    pub span: Option<Span>,
    #[serde(default)]
    pub children: Vec<SyntaxNode>,
}

impl SyntaxNode {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            value: None,
            span: None,
            children: Vec::new(),
        }
    }

    /// Creates a leaf node carrying the given text.
    pub fn leaf(kind: NodeKind, value: impl Into<String>) -> Self {
        Self::new(kind).with_value(value)
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_child(mut self, child: SyntaxNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = SyntaxNode>) -> Self {
        self.children.extend(children);
        self
    }

    /// The leaf text, or an empty string for interior nodes.
    pub fn text(&self) -> &str {
        self.value.as_deref().unwrap_or_default()
    }

    /// Returns the first direct child of the given kind.
    pub fn child(&self, kind: NodeKind) -> Option<&SyntaxNode> {
        self.children.iter().find(|x| x.kind == kind)
    }

    pub fn nth(&self, idx: usize) -> Option<&SyntaxNode> {
        self.children.get(idx)
    }

    /// Loads a tree from its TOML representation.
    ///
    /// ```toml
    /// kind = "translation_unit"
    ///
    /// [[children]]
    /// kind = "declaration"
    /// ```
    pub fn from_toml_str(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }
}
