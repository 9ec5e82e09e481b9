use crate::{
    ast::{NodeKind, Span, SyntaxNode},
    ir::{FunctionType, Type},
};

use super::errors::LoweringError;

/// Maps a primitive type name to its IR type.
pub fn resolve_primitive(name: &str, span: Option<Span>) -> Result<Type, LoweringError> {
    Ok(match name {
        "int" => Type::Int32,
        "float" => Type::Float32,
        "char" => Type::Char8,
        "void" => Type::Void,
        _ => {
            return Err(LoweringError::UnknownType {
                span,
                name: name.to_string(),
            });
        }
    })
}

/// Resolves the type named by a node carrying specifiers.
///
/// The node may be a `type_specifier` itself, hold one directly, or hold it inside a
/// `declaration_specifiers` child. Qualifiers and storage classes are ignored.
pub fn lower_specifiers(node: &SyntaxNode) -> Result<Type, LoweringError> {
    let specifier = match node.kind {
        NodeKind::TypeSpecifier => Some(node),
        _ => node.child(NodeKind::TypeSpecifier).or_else(|| {
            node.child(NodeKind::DeclarationSpecifiers)
                .and_then(|x| x.child(NodeKind::TypeSpecifier))
        }),
    };

    let specifier = specifier.ok_or_else(|| {
        LoweringError::structural(node.span, format!("{} without a type specifier", node.kind))
    })?;

    resolve_primitive(specifier.text(), specifier.span.or(node.span))
}

pub fn function_type(params: Vec<Type>, ret: Type) -> Type {
    Type::Function(FunctionType::new(params, ret))
}
