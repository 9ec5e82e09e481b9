use crate::{
    ast::{NodeKind, Span},
    ir::verify::VerifyError,
};
use thiserror::Error;

/// What kind of symbol a duplicate definition refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Function,
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SymbolKind::Variable => write!(f, "variable"),
            SymbolKind::Function => write!(f, "function"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LoweringError {
    #[error("unknown type {name:?}")]
    UnknownType { span: Option<Span>, name: String },
    #[error("type mismatch in {context}: expected {expected}, found {found}")]
    TypeMismatch {
        span: Option<Span>,
        expected: String,
        found: String,
        context: &'static str,
    },
    #[error("function {function:?} takes {needs} arguments, {found} given")]
    ArityMismatch {
        span: Option<Span>,
        function: String,
        found: usize,
        needs: usize,
    },
    #[error("cannot find identifier {name:?}")]
    UndefinedIdentifier { span: Option<Span>, name: String },
    #[error("function {name:?} is not defined")]
    UndefinedFunction { span: Option<Span>, name: String },
    #[error("{what} {name:?} is already defined")]
    DuplicateDefinition {
        span: Option<Span>,
        name: String,
        what: SymbolKind,
    },
    #[error("function {name:?} redefined with a different type: previous {previous}, now {found}")]
    SignatureConflict {
        span: Option<Span>,
        name: String,
        previous: String,
        found: String,
    },
    #[error("assignee should be an lvalue, found {found}")]
    InvalidLValue { span: Option<Span>, found: NodeKind },
    #[error("malformed tree: {message}")]
    StructuralPrecondition {
        span: Option<Span>,
        message: String,
    },
    #[error("global {name:?} must be initialized with a constant")]
    NonConstantInitializer { span: Option<Span>, name: String },
    #[error("verification failed: {0}")]
    Verification(#[from] VerifyError),
}

impl LoweringError {
    /// A short stable tag for the error, used as the diagnostic code.
    pub fn code(&self) -> &'static str {
        match self {
            LoweringError::UnknownType { .. } => "UnknownType",
            LoweringError::TypeMismatch { .. } => "TypeMismatch",
            LoweringError::ArityMismatch { .. } => "ArityMismatch",
            LoweringError::UndefinedIdentifier { .. } => "UndefinedIdentifier",
            LoweringError::UndefinedFunction { .. } => "UndefinedFunction",
            LoweringError::DuplicateDefinition { .. } => "DuplicateDefinition",
            LoweringError::SignatureConflict { .. } => "SignatureConflict",
            LoweringError::InvalidLValue { .. } => "InvalidLValue",
            LoweringError::StructuralPrecondition { .. } => "StructuralPrecondition",
            LoweringError::NonConstantInitializer { .. } => "NonConstantInitializer",
            LoweringError::Verification(_) => "Verification",
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            LoweringError::UnknownType { span, .. }
            | LoweringError::TypeMismatch { span, .. }
            | LoweringError::ArityMismatch { span, .. }
            | LoweringError::UndefinedIdentifier { span, .. }
            | LoweringError::UndefinedFunction { span, .. }
            | LoweringError::DuplicateDefinition { span, .. }
            | LoweringError::SignatureConflict { span, .. }
            | LoweringError::InvalidLValue { span, .. }
            | LoweringError::StructuralPrecondition { span, .. }
            | LoweringError::NonConstantInitializer { span, .. } => *span,
            LoweringError::Verification(_) => None,
        }
    }

    pub(crate) fn structural(span: Option<Span>, message: impl Into<String>) -> Self {
        LoweringError::StructuralPrecondition {
            span,
            message: message.into(),
        }
    }
}
