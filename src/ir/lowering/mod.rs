//! Lowers the syntax tree to IR.
//!
//! The entry point is [`generate`]. Every node is handled by [`translate`], which threads the
//! scope it is lowered in; the [`IRBuilder`] holds the module being built and the position new
//! instructions go to.

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::{
    ast::{NodeKind, SyntaxNode},
    ir::{FnIndex, Module, Value, verify::verify_module},
};

mod builder;
mod errors;
mod expressions;
mod functions;
mod scope;
mod statements;
mod types;

pub use builder::{IRBuilder, InsertPoint};
pub use errors::{LoweringError, SymbolKind};
pub use expressions::{parse_c_float, parse_c_int, parse_char_literal};
pub use scope::{Scope, ScopeChain, ScopeIndex};
pub use types::{function_type, lower_specifiers, resolve_primitive};

/// What lowering a node produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Lowered {
    /// Statements and calls to void functions.
    Unit,
    Value(Value),
    Function(FnIndex),
}

/// The first error found while generating a module, along with everything built before it.
#[derive(Debug, Clone, Error)]
#[error("{}: {error}", .error.code())]
pub struct GenerateError {
    #[source]
    pub error: LoweringError,
    /// The partially built module, only useful for debugging.
    pub module: Module,
}

#[derive(Debug, Clone)]
pub struct Generator {
    module_name: String,
}

impl Default for Generator {
    fn default() -> Self {
        Self::new("main")
    }
}

impl Generator {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
        }
    }

    /// Generates and verifies the module for a translation unit. Every call starts from a fresh
    /// builder.
    #[instrument(level = "debug", skip_all, fields(module = %self.module_name))]
    pub fn generate(&self, root: &SyntaxNode) -> Result<Module, GenerateError> {
        let mut builder = IRBuilder::new(&self.module_name);

        if root.kind != NodeKind::TranslationUnit {
            return Err(GenerateError {
                error: LoweringError::structural(
                    root.span,
                    format!("expected a translation_unit root, found {}", root.kind),
                ),
                module: builder.into_module(),
            });
        }

        let root_scope = builder.scopes.push(None);
        if let Err(error) = translate(&mut builder, root, root_scope) {
            debug!("generation failed: {error}");
            return Err(GenerateError {
                error,
                module: builder.into_module(),
            });
        }

        let module = builder.into_module();
        if let Err(error) = verify_module(&module) {
            return Err(GenerateError {
                error: error.into(),
                module,
            });
        }

        info!(
            "module {:?} verified, {} functions",
            module.name,
            module.functions.len()
        );
        Ok(module)
    }
}

/// Generates a module named `main` from a translation unit.
pub fn generate(root: &SyntaxNode) -> Result<Module, GenerateError> {
    Generator::default().generate(root)
}

/// Lowers a node in `scope`.
pub fn translate(
    builder: &mut IRBuilder,
    node: &SyntaxNode,
    scope: ScopeIndex,
) -> Result<Lowered, LoweringError> {
    debug!(kind = %node.kind, "translate");

    match node.kind {
        NodeKind::TranslationUnit
        | NodeKind::StatementList
        | NodeKind::CompoundStatement
        | NodeKind::DeclarationList => statements::lower_sequence(builder, node, scope),
        NodeKind::FunctionDefinition => {
            functions::lower_function_definition(builder, node, scope)
        }
        NodeKind::Declaration => statements::lower_declaration(builder, node, scope),
        NodeKind::IfElseStatement => statements::lower_if(builder, node, scope),
        NodeKind::ReturnExpr => statements::lower_return(builder, node, scope),
        NodeKind::AssignmentExpression => statements::lower_assignment(builder, node, scope),
        NodeKind::FunctionCall => functions::lower_call(builder, node, scope),
        NodeKind::Expression => match node.children.as_slice() {
            [inner] => translate(builder, inner, scope),
            _ => Err(LoweringError::structural(
                node.span,
                "expression must have exactly one child",
            )),
        },
        NodeKind::Int | NodeKind::Float | NodeKind::Char => {
            Ok(Lowered::Value(expressions::lower_literal(node)?))
        }
        NodeKind::Identifier => Ok(Lowered::Value(expressions::lower_identifier(
            builder, node, scope,
        )?)),
        NodeKind::FunctionDeclarator
        | NodeKind::ParameterList
        | NodeKind::ParameterDeclaration
        | NodeKind::DeclarationSpecifiers
        | NodeKind::TypeSpecifier
        | NodeKind::TypeQualifier
        | NodeKind::StorageClassSpecifier
        | NodeKind::Pointer
        | NodeKind::InitDeclaratorList
        | NodeKind::InitDeclarator
        | NodeKind::ArgumentExpressionList => Err(LoweringError::structural(
            node.span,
            format!("{} can only appear inside another construct", node.kind),
        )),
    }
}

/// Finds the identifier a declarator names: the node itself, a direct child, or the identifier
/// of its first child.
pub(crate) fn find_identifier(node: &SyntaxNode) -> Option<&SyntaxNode> {
    if node.kind == NodeKind::Identifier {
        return Some(node);
    }

    node.child(NodeKind::Identifier)
        .or_else(|| node.nth(0).and_then(find_identifier))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ConstValue, InstKind, Operand, Terminator, Type};

    fn int(value: &str) -> SyntaxNode {
        SyntaxNode::leaf(NodeKind::Int, value)
    }

    fn ident(name: &str) -> SyntaxNode {
        SyntaxNode::leaf(NodeKind::Identifier, name)
    }

    fn specifiers(ty: &str) -> SyntaxNode {
        SyntaxNode::new(NodeKind::DeclarationSpecifiers)
            .with_child(SyntaxNode::leaf(NodeKind::TypeSpecifier, ty))
    }

    fn function(ret: &str, name: &str, body: Vec<SyntaxNode>) -> SyntaxNode {
        SyntaxNode::new(NodeKind::FunctionDefinition)
            .with_child(specifiers(ret))
            .with_child(
                SyntaxNode::new(NodeKind::FunctionDeclarator)
                    .with_child(ident(name))
                    .with_child(SyntaxNode::new(NodeKind::ParameterList)),
            )
            .with_child(SyntaxNode::new(NodeKind::CompoundStatement).with_children(body))
    }

    fn unit(children: Vec<SyntaxNode>) -> SyntaxNode {
        SyntaxNode::new(NodeKind::TranslationUnit).with_children(children)
    }

    fn ret(value: SyntaxNode) -> SyntaxNode {
        SyntaxNode::new(NodeKind::ReturnExpr).with_child(value)
    }

    #[test]
    fn wrong_root_kind() {
        let err = generate(&SyntaxNode::new(NodeKind::CompoundStatement)).unwrap_err();
        assert!(matches!(
            err.error,
            LoweringError::StructuralPrecondition { .. }
        ));
        assert!(err.to_string().starts_with("StructuralPrecondition: "));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn structural_kind_in_statement_position() {
        let tree = unit(vec![function(
            "int",
            "main",
            vec![SyntaxNode::leaf(NodeKind::TypeSpecifier, "int"), ret(int("0"))],
        )]);
        let err = generate(&tree).unwrap_err();
        assert_eq!(err.error.code(), "StructuralPrecondition");
        // The function was registered before the failure.
        assert!(err.module.get_function("main").is_some());
    }

    #[test]
    fn return_converts_to_the_declared_type() {
        let tree = unit(vec![function(
            "float",
            "f",
            vec![ret(int("3"))],
        )]);
        let module = generate(&tree).unwrap();
        let func = module.function(module.get_function("f").unwrap());
        let entry = &func.blocks[func.entry().unwrap()];

        assert!(matches!(
            &entry.instructions[0].kind,
            InstKind::Cast { value: Operand::Const(ConstValue::I32(3)), .. }
        ));
        assert_eq!(entry.instructions[0].ty, Type::Float32);
        assert_eq!(
            entry.terminator,
            Some(Terminator::Return(Some(Operand::Temp(0))))
        );
    }

    #[test]
    fn void_function_gets_implicit_return() {
        let module = generate(&unit(vec![function("void", "f", vec![])])).unwrap();
        let func = module.function(module.get_function("f").unwrap());
        assert_eq!(
            func.blocks[func.entry().unwrap()].terminator,
            Some(Terminator::Return(None))
        );
    }

    #[test]
    fn missing_return_fails_verification() {
        let err = generate(&unit(vec![function("int", "f", vec![])])).unwrap_err();
        assert!(matches!(err.error, LoweringError::Verification(_)));
        assert!(err.module.get_function("f").is_some());
    }

    #[test]
    fn find_identifier_in_nested_declarator() {
        let node = SyntaxNode::new(NodeKind::FunctionDeclarator)
            .with_child(SyntaxNode::new(NodeKind::Pointer).with_child(ident("f")));
        assert_eq!(find_identifier(&node).map(|x| x.text()), Some("f"));
    }
}
