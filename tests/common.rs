#![allow(unused)] // each test crate uses a different part of this module

use cirgen::{
    ast::{NodeKind, SyntaxNode},
    ir::{
        Module,
        eval::{RuntimeValue, run_function},
        lowering::{LoweringError, generate},
    },
};

/// Loads a tree fixture and generates its module, panicking on failure.
#[track_caller]
pub fn generate_program(tree: &str) -> Module {
    let tree = SyntaxNode::from_toml_str(tree).expect("invalid tree fixture");
    match generate(&tree) {
        Ok(module) => module,
        Err(err) => panic!("{err}\n{}", err.module),
    }
}

/// Loads a tree fixture that must be rejected and returns the error.
#[track_caller]
pub fn check_invalid_program(tree: &str) -> LoweringError {
    let tree = SyntaxNode::from_toml_str(tree).expect("invalid tree fixture");
    generate(&tree).expect_err("expected error").error
}

/// Generates `tree` and runs `main` with the interpreter.
#[track_caller]
pub fn run_main(tree: &SyntaxNode) -> Option<RuntimeValue> {
    let module = generate(tree).unwrap_or_else(|err| panic!("{err}\n{}", err.module));
    run_function(&module, "main", &[]).expect("failed to run")
}

pub fn ident(name: &str) -> SyntaxNode {
    SyntaxNode::leaf(NodeKind::Identifier, name)
}

pub fn int(value: &str) -> SyntaxNode {
    SyntaxNode::leaf(NodeKind::Int, value)
}

pub fn float(value: &str) -> SyntaxNode {
    SyntaxNode::leaf(NodeKind::Float, value)
}

pub fn char_lit(value: &str) -> SyntaxNode {
    SyntaxNode::leaf(NodeKind::Char, value)
}

pub fn expr(inner: SyntaxNode) -> SyntaxNode {
    SyntaxNode::new(NodeKind::Expression).with_child(inner)
}

pub fn specifiers(ty: &str) -> SyntaxNode {
    SyntaxNode::new(NodeKind::DeclarationSpecifiers)
        .with_child(SyntaxNode::leaf(NodeKind::TypeSpecifier, ty))
}

pub fn param(ty: &str, name: &str) -> SyntaxNode {
    SyntaxNode::new(NodeKind::ParameterDeclaration)
        .with_child(specifiers(ty))
        .with_child(ident(name))
}

pub fn declarator(name: &str, params: Vec<SyntaxNode>) -> SyntaxNode {
    SyntaxNode::new(NodeKind::FunctionDeclarator)
        .with_child(ident(name))
        .with_child(SyntaxNode::new(NodeKind::ParameterList).with_children(params))
}

pub fn block(statements: Vec<SyntaxNode>) -> SyntaxNode {
    SyntaxNode::new(NodeKind::CompoundStatement).with_children(statements)
}

/// `ret name(params) { body }`
pub fn function(
    ret: &str,
    name: &str,
    params: Vec<SyntaxNode>,
    body: Vec<SyntaxNode>,
) -> SyntaxNode {
    SyntaxNode::new(NodeKind::FunctionDefinition)
        .with_child(specifiers(ret))
        .with_child(declarator(name, params))
        .with_child(block(body))
}

/// `ret name(params);`
pub fn prototype(ret: &str, name: &str, params: Vec<SyntaxNode>) -> SyntaxNode {
    SyntaxNode::new(NodeKind::Declaration)
        .with_child(specifiers(ret))
        .with_child(
            SyntaxNode::new(NodeKind::InitDeclaratorList).with_child(declarator(name, params)),
        )
}

/// `ty name = init;`
pub fn declare(ty: &str, name: &str, init: Option<SyntaxNode>) -> SyntaxNode {
    let declarator = match init {
        Some(init) => SyntaxNode::new(NodeKind::InitDeclarator)
            .with_child(ident(name))
            .with_child(init),
        None => ident(name),
    };

    SyntaxNode::new(NodeKind::Declaration)
        .with_child(specifiers(ty))
        .with_child(SyntaxNode::new(NodeKind::InitDeclaratorList).with_child(declarator))
}

pub fn assign(target: SyntaxNode, value: SyntaxNode) -> SyntaxNode {
    SyntaxNode::new(NodeKind::AssignmentExpression)
        .with_child(target)
        .with_child(value)
}

pub fn ret(value: Option<SyntaxNode>) -> SyntaxNode {
    let node = SyntaxNode::new(NodeKind::ReturnExpr);
    match value {
        Some(value) => node.with_child(value),
        None => node,
    }
}

pub fn call(name: &str, args: Vec<SyntaxNode>) -> SyntaxNode {
    SyntaxNode::new(NodeKind::FunctionCall)
        .with_child(ident(name))
        .with_child(SyntaxNode::new(NodeKind::ArgumentExpressionList).with_children(args))
}

pub fn if_else(
    cond: SyntaxNode,
    then_body: Vec<SyntaxNode>,
    else_body: Option<Vec<SyntaxNode>>,
) -> SyntaxNode {
    let node = SyntaxNode::new(NodeKind::IfElseStatement)
        .with_child(expr(cond))
        .with_child(block(then_body));
    match else_body {
        Some(body) => node.with_child(block(body)),
        None => node,
    }
}

pub fn unit(children: Vec<SyntaxNode>) -> SyntaxNode {
    SyntaxNode::new(NodeKind::TranslationUnit).with_children(children)
}
