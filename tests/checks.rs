use cirgen::{
    ast::{NodeKind, Span},
    ir::{
        lowering::{LoweringError, SymbolKind, generate},
        verify::VerifyError,
    },
};

mod common;

use crate::common::{
    assign, call, check_invalid_program, declare, float, function, ident, int, param, prototype,
    ret, unit,
};

#[test]
fn duplicate_variable() {
    let error = check_invalid_program(include_str!("invalid_programs/duplicate_variable.toml"));

    assert!(
        matches!(
            &error,
            LoweringError::DuplicateDefinition { name, what: SymbolKind::Variable, span }
                if name == "x" && *span == Some(Span::new(36, 37))
        ),
        "{:#?}",
        error
    );
}

#[test]
fn signature_conflict() {
    let error = check_invalid_program(include_str!("invalid_programs/signature_conflict.toml"));

    assert!(
        matches!(
            &error,
            LoweringError::SignatureConflict { name, previous, found, .. }
                if name == "f" && previous == "i32 (i32)" && found == "i32 (float)"
        ),
        "{:#?}",
        error
    );
}

#[test]
fn missing_return() {
    let error = check_invalid_program(include_str!("invalid_programs/missing_return.toml"));

    assert!(
        matches!(
            &error,
            LoweringError::Verification(VerifyError::MissingTerminator { function, .. })
                if function == "main"
        ),
        "{:#?}",
        error
    );
}

#[test]
fn non_constant_global() {
    let error = check_invalid_program(include_str!("invalid_programs/non_constant_global.toml"));

    assert!(
        matches!(
            &error,
            LoweringError::NonConstantInitializer { name, span }
                if name == "b" && span.is_some()
        ),
        "{:#?}",
        error
    );
}

#[test]
fn function_redefinition() {
    // int f(int a) { return a; }
    // int f(int b) { return b; }
    let tree = unit(vec![
        function("int", "f", vec![param("int", "a")], vec![ret(Some(ident("a")))]),
        function("int", "f", vec![param("int", "b")], vec![ret(Some(ident("b")))]),
    ]);
    let error = generate(&tree).unwrap_err().error;

    assert!(
        matches!(
            &error,
            LoweringError::DuplicateDefinition { name, what: SymbolKind::Function, .. }
                if name == "f"
        ),
        "{:#?}",
        error
    );
}

#[test]
fn global_and_function_share_a_name() {
    // int f = 1;
    // int f();
    let tree = unit(vec![
        declare("int", "f", Some(int("1"))),
        prototype("int", "f", vec![]),
    ]);
    let error = generate(&tree).unwrap_err().error;

    assert!(
        matches!(
            &error,
            LoweringError::DuplicateDefinition { name, what: SymbolKind::Function, .. }
                if name == "f"
        ),
        "{:#?}",
        error
    );
}

#[test]
fn call_arity() {
    // int f(int a) { return a; }
    // int main() { return f(1, 2); }
    let tree = unit(vec![
        function("int", "f", vec![param("int", "a")], vec![ret(Some(ident("a")))]),
        function(
            "int",
            "main",
            vec![],
            vec![ret(Some(call("f", vec![int("1"), int("2")])))],
        ),
    ]);
    let error = generate(&tree).unwrap_err().error;

    assert!(
        matches!(
            &error,
            LoweringError::ArityMismatch { function, found: 2, needs: 1, .. } if function == "f"
        ),
        "{:#?}",
        error
    );
}

#[test]
fn call_argument_type() {
    // int f(int a) { return a; }
    // int main() { return f(3.0); }
    let tree = unit(vec![
        function("int", "f", vec![param("int", "a")], vec![ret(Some(ident("a")))]),
        function(
            "int",
            "main",
            vec![],
            vec![ret(Some(call("f", vec![float("3.0")])))],
        ),
    ]);
    let error = generate(&tree).unwrap_err().error;

    assert!(
        matches!(
            &error,
            LoweringError::TypeMismatch { expected, found, context: "call argument", .. }
                if expected == "i32" && found == "float"
        ),
        "{:#?}",
        error
    );
}

#[test]
fn undefined_identifier() {
    // int main() { return y; }
    let tree = unit(vec![function(
        "int",
        "main",
        vec![],
        vec![ret(Some(ident("y")))],
    )]);
    let error = generate(&tree).unwrap_err().error;

    assert!(
        matches!(&error, LoweringError::UndefinedIdentifier { name, .. } if name == "y"),
        "{:#?}",
        error
    );
}

#[test]
fn variable_out_of_scope() {
    // int main() { if (1) { int y = 1; } return y; }
    let tree = unit(vec![function(
        "int",
        "main",
        vec![],
        vec![
            common::if_else(int("1"), vec![declare("int", "y", Some(int("1")))], None),
            ret(Some(ident("y"))),
        ],
    )]);
    let error = generate(&tree).unwrap_err().error;

    assert!(
        matches!(&error, LoweringError::UndefinedIdentifier { name, .. } if name == "y"),
        "{:#?}",
        error
    );
}

#[test]
fn undefined_function() {
    // int main() { return g(); }
    let tree = unit(vec![function(
        "int",
        "main",
        vec![],
        vec![ret(Some(call("g", vec![])))],
    )]);
    let error = generate(&tree).unwrap_err().error;

    assert!(
        matches!(&error, LoweringError::UndefinedFunction { name, .. } if name == "g"),
        "{:#?}",
        error
    );
}

#[test]
fn assign_to_literal() {
    // int main() { 1 = 2; return 0; }
    let tree = unit(vec![function(
        "int",
        "main",
        vec![],
        vec![assign(int("1"), int("2")), ret(Some(int("0")))],
    )]);
    let error = generate(&tree).unwrap_err().error;

    assert!(
        matches!(
            &error,
            LoweringError::InvalidLValue {
                found: NodeKind::Int,
                ..
            }
        ),
        "{:#?}",
        error
    );
}

#[test]
fn assignment_type() {
    // int main() { int x = 1; x = 2.5; return x; }
    let tree = unit(vec![function(
        "int",
        "main",
        vec![],
        vec![
            declare("int", "x", Some(int("1"))),
            assign(ident("x"), float("2.5")),
            ret(Some(ident("x"))),
        ],
    )]);
    let error = generate(&tree).unwrap_err().error;

    assert!(
        matches!(
            &error,
            LoweringError::TypeMismatch { context: "assignment", .. }
        ),
        "{:#?}",
        error
    );
}

#[test]
fn initializer_type() {
    // int main() { char c = 1; return c; }
    let tree = unit(vec![function(
        "int",
        "main",
        vec![],
        vec![declare("char", "c", Some(int("1"))), ret(Some(ident("c")))],
    )]);
    let error = generate(&tree).unwrap_err().error;

    assert!(
        matches!(
            &error,
            LoweringError::TypeMismatch { expected, found, context: "initializer", .. }
                if expected == "i8" && found == "i32"
        ),
        "{:#?}",
        error
    );
}

#[test]
fn unknown_type() {
    // double main() { return 0; }
    let tree = unit(vec![function(
        "double",
        "main",
        vec![],
        vec![ret(Some(int("0")))],
    )]);
    let error = generate(&tree).unwrap_err().error;

    assert!(
        matches!(&error, LoweringError::UnknownType { name, .. } if name == "double"),
        "{:#?}",
        error
    );
}

#[test]
fn value_returned_from_void_function() {
    // void f() { return 1; }
    let tree = unit(vec![function("void", "f", vec![], vec![ret(Some(int("1")))])]);
    let error = generate(&tree).unwrap_err().error;

    assert!(
        matches!(
            &error,
            LoweringError::TypeMismatch { expected, context: "return", .. } if expected == "void"
        ),
        "{:#?}",
        error
    );
}

#[test]
fn void_call_used_as_value() {
    // void f() {}
    // int main() { int x = f(); return x; }
    let tree = unit(vec![
        function("void", "f", vec![], vec![]),
        function(
            "int",
            "main",
            vec![],
            vec![
                declare("int", "x", Some(call("f", vec![]))),
                ret(Some(ident("x"))),
            ],
        ),
    ]);
    let error = generate(&tree).unwrap_err().error;

    assert_eq!(error.code(), "TypeMismatch", "{:#?}", error);
}

#[test]
fn void_variable() {
    // int main() { void v; return 0; }
    let tree = unit(vec![function(
        "int",
        "main",
        vec![],
        vec![declare("void", "v", None), ret(Some(int("0")))],
    )]);
    let error = generate(&tree).unwrap_err().error;

    assert!(
        matches!(&error, LoweringError::TypeMismatch { context: "declaration", .. }),
        "{:#?}",
        error
    );
}

#[test]
fn nested_function_definition() {
    // int main() {
    //     int x = 1;
    //     int g() { int y = 7; return x; }
    //     return g();
    // }
    let tree = unit(vec![function(
        "int",
        "main",
        vec![],
        vec![
            declare("int", "x", Some(int("1"))),
            function(
                "int",
                "g",
                vec![],
                vec![declare("int", "y", Some(int("7"))), ret(Some(ident("x")))],
            ),
            ret(Some(call("g", vec![]))),
        ],
    )]);
    let err = generate(&tree).unwrap_err();

    assert!(
        matches!(
            &err.error,
            LoweringError::StructuralPrecondition { message, .. }
                if message.contains("\"g\"") && message.contains("\"main\"")
        ),
        "{:#?}",
        err.error
    );
    assert!(err.module.get_function("g").is_none());
}
