use tracing::{debug, error, instrument};

use crate::{
    ast::{NodeKind, Span, SyntaxNode},
    ir::{FnIndex, FunctionType, LocalKind, Operand, Type, Value, verify::verify_function},
};

use super::{
    IRBuilder, Lowered, find_identifier,
    errors::{LoweringError, SymbolKind},
    expressions::lower_expression,
    scope::ScopeIndex,
    translate,
    types::lower_specifiers,
};

/// A parsed `function_declarator`.
#[derive(Debug)]
pub(crate) struct Declarator<'a> {
    pub name: &'a SyntaxNode,
    pub params: Vec<Param<'a>>,
}

#[derive(Debug)]
pub(crate) struct Param<'a> {
    pub name: Option<&'a SyntaxNode>,
    pub ty: Type,
}

impl Declarator<'_> {
    pub fn signature(&self, ret: Type) -> FunctionType {
        FunctionType::new(self.params.iter().map(|x| x.ty.clone()).collect(), ret)
    }
}

pub(crate) fn lower_declarator(node: &SyntaxNode) -> Result<Declarator<'_>, LoweringError> {
    let name = node
        .nth(0)
        .and_then(find_identifier)
        .ok_or_else(|| LoweringError::structural(node.span, "function declarator without a name"))?;

    let mut params = Vec::new();
    if let Some(list) = node.child(NodeKind::ParameterList) {
        for param in &list.children {
            params.push(Param {
                name: param.child(NodeKind::Identifier),
                ty: lower_specifiers(param)?,
            });
        }
    }

    // `f(void)` takes no arguments.
    if matches!(
        params.as_slice(),
        [Param {
            name: None,
            ty: Type::Void
        }]
    ) {
        params.clear();
    }

    if let Some(param) = params.iter().find(|x| x.ty == Type::Void) {
        return Err(LoweringError::TypeMismatch {
            span: param.name.and_then(|x| x.span).or(node.span),
            expected: "a parameter type".to_string(),
            found: Type::Void.to_string(),
            context: "parameter",
        });
    }

    Ok(Declarator { name, params })
}

/// Registers a function signature, or finds the matching existing declaration.
pub(crate) fn declare_function(
    builder: &mut IRBuilder,
    name: &str,
    span: Option<Span>,
    signature: FunctionType,
) -> Result<FnIndex, LoweringError> {
    if builder.module.global_names.contains_key(name) {
        return Err(LoweringError::DuplicateDefinition {
            span,
            name: name.to_string(),
            what: SymbolKind::Function,
        });
    }

    if let Some(idx) = builder.module.get_function(name) {
        let previous = &builder.module.function(idx).signature;
        if *previous != signature {
            return Err(LoweringError::SignatureConflict {
                span,
                name: name.to_string(),
                previous: Type::Function(previous.clone()).to_string(),
                found: Type::Function(signature).to_string(),
            });
        }
        return Ok(idx);
    }

    debug!("declaring function {name:?}");
    Ok(builder.module.add_function(name, signature))
}

/// A declaration naming a function, without a body.
pub(crate) fn lower_prototype(
    builder: &mut IRBuilder,
    ret: Type,
    node: &SyntaxNode,
) -> Result<FnIndex, LoweringError> {
    let declarator = lower_declarator(node)?;
    let signature = declarator.signature(ret);
    declare_function(builder, declarator.name.text(), declarator.name.span, signature)
}

#[instrument(level = "debug", skip_all, fields(name))]
pub(crate) fn lower_function_definition(
    builder: &mut IRBuilder,
    node: &SyntaxNode,
    scope: ScopeIndex,
) -> Result<Lowered, LoweringError> {
    let (Some(specifiers), Some(declarator), Some(body)) = (
        node.nth(0),
        node.child(NodeKind::FunctionDeclarator),
        node.child(NodeKind::CompoundStatement),
    ) else {
        return Err(LoweringError::structural(
            node.span,
            "function definition needs specifiers, a declarator and a body",
        ));
    };

    let ret = lower_specifiers(specifiers)?;
    let declarator = lower_declarator(declarator)?;
    let name = declarator.name.text();
    tracing::Span::current().record("name", name);
    debug!("lowering function {name:?}");

    // Locals of the enclosing function live in its frame, not in this one.
    if let Some(outer) = builder.insert_point() {
        return Err(LoweringError::structural(
            node.span,
            format!(
                "function {name:?} defined inside {:?}",
                builder.module.function(outer.func).name
            ),
        ));
    }

    let mut params = Vec::with_capacity(declarator.params.len());
    for param in &declarator.params {
        let Some(param_name) = param.name else {
            return Err(LoweringError::structural(
                node.span,
                format!("parameter of {name:?} without a name"),
            ));
        };
        params.push((param_name, param.ty.clone()));
    }

    let idx = declare_function(
        builder,
        name,
        declarator.name.span,
        declarator.signature(ret.clone()),
    )?;

    if builder.module.function(idx).has_body() {
        return Err(LoweringError::DuplicateDefinition {
            span: declarator.name.span,
            name: name.to_string(),
            what: SymbolKind::Function,
        });
    }

    builder.module.function_mut(idx).param_names =
        params.iter().map(|(x, _)| x.text().to_string()).collect();

    let previous = builder.enter_function(idx, &format!("{name}_block"));
    let result = builder.with_child_scope(scope, |builder, body_scope| {
        for (i, (param_name, ty)) in params.iter().enumerate() {
            let slot = builder.add_local(Some(param_name.text()), ty.clone(), LocalKind::Arg(i))?;
            builder.build_store(&slot, &Value::new(Operand::Arg(i), ty.clone()))?;

            if !builder.scopes.define(body_scope, param_name.text(), slot) {
                return Err(LoweringError::DuplicateDefinition {
                    span: param_name.span,
                    name: param_name.text().to_string(),
                    what: SymbolKind::Variable,
                });
            }
        }

        translate(builder, body, body_scope)?;
        close_body(builder, &ret)
    });
    builder.set_insert_point(previous);
    result?;

    if let Err(err) = verify_function(&builder.module, idx) {
        error!("function {name:?} failed verification: {err}");
        error!("\n{}", builder.module);
        return Err(err.into());
    }
    debug!("function {name:?} verified");

    Ok(Lowered::Function(idx))
}

/// Terminates the block the body ended in, when that can be done without changing the meaning of
/// the function. A non-void function falling off its end is left for verification to report.
fn close_body(builder: &mut IRBuilder, ret: &Type) -> Result<(), LoweringError> {
    if builder.is_terminated() {
        return Ok(());
    }

    if *ret == Type::Void {
        return builder.build_ret(None);
    }

    let Some(point) = builder.insert_point() else {
        return Ok(());
    };
    let func = builder.module.function(point.func);
    if func.entry() != Some(point.block) && func.predecessors(point.block).is_empty() {
        builder.build_unreachable()?;
    }

    Ok(())
}

#[instrument(level = "debug", skip_all)]
pub(crate) fn lower_call(
    builder: &mut IRBuilder,
    node: &SyntaxNode,
    scope: ScopeIndex,
) -> Result<Lowered, LoweringError> {
    let callee = node
        .nth(0)
        .and_then(find_identifier)
        .ok_or_else(|| LoweringError::structural(node.span, "call without a callee"))?;
    let name = callee.text();
    debug!("lowering call to {name:?}");

    let idx = builder
        .module
        .get_function(name)
        .ok_or_else(|| LoweringError::UndefinedFunction {
            span: callee.span,
            name: name.to_string(),
        })?;

    let arg_nodes = node
        .child(NodeKind::ArgumentExpressionList)
        .map(|x| x.children.as_slice())
        .unwrap_or_default();

    let mut args = Vec::with_capacity(arg_nodes.len());
    for arg in arg_nodes {
        args.push(lower_expression(builder, arg, scope)?);
    }

    let signature = builder.module.function(idx).signature.clone();
    if args.len() != signature.params.len() {
        return Err(LoweringError::ArityMismatch {
            span: node.span,
            function: name.to_string(),
            found: args.len(),
            needs: signature.params.len(),
        });
    }

    for ((arg, ty), arg_node) in args.iter().zip(&signature.params).zip(arg_nodes) {
        if arg.ty != *ty {
            return Err(LoweringError::TypeMismatch {
                span: arg_node.span.or(node.span),
                expected: ty.to_string(),
                found: arg.ty.to_string(),
                context: "call argument",
            });
        }
    }

    let result = builder.build_call(idx, args.into_iter().map(|x| x.operand).collect())?;
    Ok(match result {
        Some(value) => Lowered::Value(value),
        None => Lowered::Unit,
    })
}
