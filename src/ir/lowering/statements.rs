use tracing::{debug, instrument};

use crate::{
    ast::{NodeKind, SyntaxNode},
    ir::{ConstValue, Global, LocalKind, Operand, Type, Value},
};

use super::{
    IRBuilder, Lowered, find_identifier,
    errors::{LoweringError, SymbolKind},
    expressions::{convert, lower_address, lower_condition, lower_expression, lower_literal},
    functions::lower_prototype,
    scope::ScopeIndex,
    translate,
    types::lower_specifiers,
};

/// Translates every child in order, stopping at the first failure.
pub(crate) fn lower_sequence(
    builder: &mut IRBuilder,
    node: &SyntaxNode,
    scope: ScopeIndex,
) -> Result<Lowered, LoweringError> {
    for child in &node.children {
        translate(builder, child, scope)?;
    }
    Ok(Lowered::Unit)
}

/// Skips `expression` wrappers.
fn unwrap_expression(mut node: &SyntaxNode) -> &SyntaxNode {
    while node.kind == NodeKind::Expression {
        match node.children.as_slice() {
            [inner] => node = inner,
            _ => break,
        }
    }
    node
}

#[instrument(level = "debug", skip_all)]
pub(crate) fn lower_declaration(
    builder: &mut IRBuilder,
    node: &SyntaxNode,
    scope: ScopeIndex,
) -> Result<Lowered, LoweringError> {
    let ty = lower_specifiers(node)?;

    let declarators = match node.child(NodeKind::InitDeclaratorList) {
        Some(list) => list.children.iter().collect::<Vec<_>>(),
        None => node
            .children
            .iter()
            .filter(|x| {
                matches!(
                    x.kind,
                    NodeKind::Identifier | NodeKind::InitDeclarator | NodeKind::FunctionDeclarator
                )
            })
            .collect(),
    };

    for declarator in declarators {
        if declarator.kind == NodeKind::FunctionDeclarator {
            lower_prototype(builder, ty.clone(), declarator)?;
            continue;
        }

        let name = find_identifier(declarator).ok_or_else(|| {
            LoweringError::structural(declarator.span, "declarator without a name")
        })?;
        let init = match declarator.kind {
            NodeKind::InitDeclarator => declarator.nth(1),
            _ => None,
        };

        if ty == Type::Void {
            return Err(LoweringError::TypeMismatch {
                span: name.span,
                expected: "an object type".to_string(),
                found: ty.to_string(),
                context: "declaration",
            });
        }

        if builder.insert_point().is_none() {
            lower_global(builder, name, ty.clone(), init, scope)?;
        } else {
            lower_local(builder, name, ty.clone(), init, scope)?;
        }
    }

    Ok(Lowered::Unit)
}

fn duplicate_variable(name: &SyntaxNode) -> LoweringError {
    LoweringError::DuplicateDefinition {
        span: name.span,
        name: name.text().to_string(),
        what: SymbolKind::Variable,
    }
}

fn lower_local(
    builder: &mut IRBuilder,
    name: &SyntaxNode,
    ty: Type,
    init: Option<&SyntaxNode>,
    scope: ScopeIndex,
) -> Result<(), LoweringError> {
    debug!("declaring local {:?}", name.text());

    if builder
        .scopes
        .get(scope)
        .is_some_and(|x| x.symbols.contains_key(name.text()))
    {
        return Err(duplicate_variable(name));
    }

    let slot = builder.add_local(Some(name.text()), ty.clone(), LocalKind::Var)?;

    if let Some(init) = init {
        let value = lower_expression(builder, init, scope)?;
        if value.ty != ty {
            return Err(LoweringError::TypeMismatch {
                span: init.span.or(name.span),
                expected: ty.to_string(),
                found: value.ty.to_string(),
                context: "initializer",
            });
        }
        builder.build_store(&slot, &value)?;
    }

    if !builder.scopes.define(scope, name.text(), slot) {
        return Err(duplicate_variable(name));
    }

    Ok(())
}

fn lower_global(
    builder: &mut IRBuilder,
    name: &SyntaxNode,
    ty: Type,
    init: Option<&SyntaxNode>,
    scope: ScopeIndex,
) -> Result<(), LoweringError> {
    debug!("declaring global {:?}", name.text());

    if builder.module.global_names.contains_key(name.text())
        || builder.module.get_function(name.text()).is_some()
    {
        return Err(duplicate_variable(name));
    }

    let init = match init.map(unwrap_expression) {
        None => ConstValue::zero(&ty).ok_or_else(|| LoweringError::TypeMismatch {
            span: name.span,
            expected: "an arithmetic type".to_string(),
            found: ty.to_string(),
            context: "global",
        })?,
        Some(node) if matches!(node.kind, NodeKind::Int | NodeKind::Float | NodeKind::Char) => {
            let value = lower_literal(node)?;
            match value.operand {
                Operand::Const(constant) if value.ty == ty => constant,
                _ => {
                    return Err(LoweringError::TypeMismatch {
                        span: node.span.or(name.span),
                        expected: ty.to_string(),
                        found: value.ty.to_string(),
                        context: "initializer",
                    });
                }
            }
        }
        Some(_) => {
            return Err(LoweringError::NonConstantInitializer {
                span: name.span,
                name: name.text().to_string(),
            });
        }
    };

    let idx = builder.module.add_global(Global {
        name: name.text().to_string(),
        ty: ty.clone(),
        init,
    });

    let address = Value::new(Operand::Global(idx), Type::ptr_to(ty));
    if !builder.scopes.define(scope, name.text(), address) {
        return Err(duplicate_variable(name));
    }

    Ok(())
}

#[instrument(level = "debug", skip_all)]
pub(crate) fn lower_if(
    builder: &mut IRBuilder,
    node: &SyntaxNode,
    scope: ScopeIndex,
) -> Result<Lowered, LoweringError> {
    let (Some(cond_node), Some(then_node)) = (node.nth(0), node.nth(1)) else {
        return Err(LoweringError::structural(
            node.span,
            "if statement needs a condition and a body",
        ));
    };
    let else_node = node.nth(2);
    debug!(has_else = else_node.is_some(), "lowering if");

    let value = lower_expression(builder, cond_node, scope)?;
    let cond = lower_condition(builder, value, cond_node.span.or(node.span))?;

    let then_block = builder.append_block("then")?;
    let else_block = else_node.map(|_| builder.create_block("else")).transpose()?;
    let merge_block = builder.create_block("merge")?;

    builder.build_cond_br(&cond, then_block, else_block.unwrap_or(merge_block))?;

    builder.position_at_end(then_block)?;
    builder.with_child_scope(scope, |builder, arm| translate(builder, then_node, arm))?;
    // The arm may have moved the cursor, branch from wherever it ended.
    if !builder.is_terminated() {
        builder.build_br(merge_block)?;
    }

    if let (Some(else_node), Some(else_block)) = (else_node, else_block) {
        builder.attach_block(else_block)?;
        builder.position_at_end(else_block)?;
        builder.with_child_scope(scope, |builder, arm| translate(builder, else_node, arm))?;
        if !builder.is_terminated() {
            builder.build_br(merge_block)?;
        }
    }

    builder.attach_block(merge_block)?;
    builder.position_at_end(merge_block)?;

    Ok(Lowered::Unit)
}

#[instrument(level = "debug", skip_all)]
pub(crate) fn lower_return(
    builder: &mut IRBuilder,
    node: &SyntaxNode,
    scope: ScopeIndex,
) -> Result<Lowered, LoweringError> {
    let func = builder
        .current_function()
        .ok_or_else(|| LoweringError::structural(node.span, "return outside of a function"))?;
    let ret = builder.module.function(func).signature.ret.as_ref().clone();

    match (node.nth(0), &ret) {
        (None, Type::Void) => builder.build_ret(None)?,
        (None, _) => {
            return Err(LoweringError::TypeMismatch {
                span: node.span,
                expected: ret.to_string(),
                found: Type::Void.to_string(),
                context: "return",
            });
        }
        (Some(expr), Type::Void) => {
            let value = lower_expression(builder, expr, scope)?;
            return Err(LoweringError::TypeMismatch {
                span: expr.span.or(node.span),
                expected: ret.to_string(),
                found: value.ty.to_string(),
                context: "return",
            });
        }
        (Some(expr), _) => {
            let value = lower_expression(builder, expr, scope)?;
            let value = convert(builder, value, &ret, "return", expr.span.or(node.span))?;
            builder.build_ret(Some(&value))?;
        }
    }

    Ok(Lowered::Unit)
}

#[instrument(level = "debug", skip_all)]
pub(crate) fn lower_assignment(
    builder: &mut IRBuilder,
    node: &SyntaxNode,
    scope: ScopeIndex,
) -> Result<Lowered, LoweringError> {
    let (Some(target), Some(expr)) = (node.nth(0), node.nth(1)) else {
        return Err(LoweringError::structural(
            node.span,
            "assignment needs a target and a value",
        ));
    };

    let target = unwrap_expression(target);
    if target.kind != NodeKind::Identifier {
        return Err(LoweringError::InvalidLValue {
            span: target.span.or(node.span),
            found: target.kind,
        });
    }
    debug!("assigning to {:?}", target.text());

    let address = lower_address(builder, target, scope)?;
    let value = lower_expression(builder, expr, scope)?;

    let storage = address.ty.pointee().cloned().unwrap_or(Type::Void);
    if value.ty != storage {
        return Err(LoweringError::TypeMismatch {
            span: expr.span.or(node.span),
            expected: storage.to_string(),
            found: value.ty.to_string(),
            context: "assignment",
        });
    }

    builder.build_store(&address, &value)?;
    Ok(Lowered::Value(value))
}
