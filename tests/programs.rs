use cirgen::ir::{
    InstKind, LocalKind, Operand, Terminator, Type,
    eval::{Interpreter, RuntimeValue, run_function},
};
use test_case::test_case;

mod common;

use crate::common::{
    assign, call, char_lit, declare, float, function, generate_program, ident, if_else, int,
    param, ret, run_main, unit,
};

#[test_case(include_str!("programs/main_returns_x.toml"), RuntimeValue::Int(5) ; "main_returns_x.toml")]
#[test_case(include_str!("programs/if_zero_else.toml"), RuntimeValue::Int(2) ; "if_zero_else.toml")]
#[test_case(include_str!("programs/shadowing.toml"), RuntimeValue::Int(2) ; "shadowing.toml")]
#[test_case(include_str!("programs/calls_and_globals.toml"), RuntimeValue::Int(7) ; "calls_and_globals.toml")]
#[test_case(include_str!("programs/nested_if.toml"), RuntimeValue::Int(2) ; "nested_if.toml")]
fn program_result(tree: &str, expected: RuntimeValue) {
    let module = generate_program(tree);
    let result = run_function(&module, "main", &[]).unwrap();
    assert_eq!(result, Some(expected), "\n{module}");
}

#[test_case(include_str!("programs/main_returns_x.toml") ; "main_returns_x.toml")]
#[test_case(include_str!("programs/if_zero_else.toml") ; "if_zero_else.toml")]
#[test_case(include_str!("programs/calls_and_globals.toml") ; "calls_and_globals.toml")]
fn generation_is_deterministic(tree: &str) {
    let first = generate_program(tree).to_string();
    let second = generate_program(tree).to_string();
    assert_eq!(first, second);
}

#[test]
fn main_returns_x_text() {
    let module = generate_program(include_str!("programs/main_returns_x.toml"));
    let expected = "\
; ModuleID = 'main'

define i32 @main() {
main_block.0:
  %l0 = alloca i32 ; x
  store i32 5, ptr %l0
  %t0 = load i32, ptr %l0
  store i32 %t0, ptr %l0
  %t1 = load i32, ptr %l0
  ret i32 %t1
}
";
    assert_eq!(module.to_string(), expected);
}

#[test]
fn main_returns_x_structure() {
    let module = generate_program(include_str!("programs/main_returns_x.toml"));
    let func = module.function(module.get_function("main").unwrap());

    assert!(func.signature.params.is_empty());
    assert_eq!(*func.signature.ret, Type::Int32);
    assert_eq!(func.locals.len(), 1);
    assert_eq!(func.locals[0].debug_name.as_deref(), Some("x"));
    assert_eq!(func.locals[0].kind, LocalKind::Var);
    assert_eq!(func.layout.len(), 1);

    let entry = &func.blocks[func.entry().unwrap()];
    assert!(matches!(
        &entry.instructions[0].kind,
        InstKind::Store {
            ptr: Operand::Local(0),
            value: Operand::Const(_)
        }
    ));
    assert!(matches!(
        entry.terminator,
        Some(Terminator::Return(Some(Operand::Temp(_))))
    ));
}

#[test]
fn if_with_both_arms_returning_leaves_merge_unreachable() {
    let module = generate_program(include_str!("programs/if_zero_else.toml"));
    let func = module.function(module.get_function("main").unwrap());

    assert_eq!(func.layout.len(), 4);
    let names = func
        .layout
        .iter()
        .map(|x| func.blocks[*x].name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, ["main_block", "then", "else", "merge"]);

    let merge = &func.blocks[*func.layout.last().unwrap()];
    assert!(merge.instructions.is_empty());
    assert_eq!(merge.terminator, Some(Terminator::Unreachable));
}

#[test]
fn nested_if_block_order() {
    let module = generate_program(include_str!("programs/nested_if.toml"));
    let func = module.function(module.get_function("main").unwrap());

    let names = func
        .layout
        .iter()
        .map(|x| func.blocks[*x].name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(
        names,
        ["main_block", "then", "then", "else", "merge", "else", "merge"]
    );

    // The inner if is emitted inside the outer then arm, before the outer else.
    let labels = func
        .layout
        .iter()
        .map(|x| format!("{}.{}", func.blocks[*x].name, x))
        .collect::<Vec<_>>();
    assert_eq!(
        labels,
        [
            "main_block.0",
            "then.1",
            "then.4",
            "else.5",
            "merge.6",
            "else.2",
            "merge.3"
        ]
    );
    assert!(func.layout.iter().skip(1).all(|x| !func.predecessors(*x).is_empty()));
}

#[test]
fn shadowed_variable_gets_its_own_slot() {
    let module = generate_program(include_str!("programs/shadowing.toml"));
    let func = module.function(module.get_function("main").unwrap());

    let names = func
        .locals
        .iter()
        .map(|x| x.debug_name.as_deref())
        .collect::<Vec<_>>();
    assert_eq!(names, [Some("x"), Some("x")]);
}

#[test]
fn prototype_is_completed_by_definition() {
    let module = generate_program(include_str!("programs/calls_and_globals.toml"));

    let bump = module.function(module.get_function("bump").unwrap());
    assert!(bump.has_body());
    assert_eq!(bump.param_names, ["v"]);
    assert_eq!(*bump.signature.ret, Type::Void);

    let pick = module.function(module.get_function("pick").unwrap());
    assert_eq!(
        pick.signature.params,
        vec![Type::Int32, Type::Int32, Type::Char8]
    );
    let spilled = pick.locals.iter().map(|x| x.kind).collect::<Vec<_>>();
    assert_eq!(
        spilled,
        [LocalKind::Arg(0), LocalKind::Arg(1), LocalKind::Arg(2)]
    );

    assert!(!module.to_string().contains("declare"));
}

#[test]
fn calls_update_globals() {
    let module = generate_program(include_str!("programs/calls_and_globals.toml"));
    let mut interpreter = Interpreter::new(&module);

    assert_eq!(interpreter.global("counter"), Some(RuntimeValue::Int(3)));
    interpreter.run_function("main", &[]).unwrap();
    assert_eq!(interpreter.global("counter"), Some(RuntimeValue::Int(7)));
}

#[test]
fn pick_with_zero_char_keeps_first_argument() {
    let module = generate_program(include_str!("programs/calls_and_globals.toml"));
    let result = run_function(
        &module,
        "pick",
        &[
            RuntimeValue::Int(1),
            RuntimeValue::Int(9),
            RuntimeValue::Char(0),
        ],
    )
    .unwrap();
    assert_eq!(result, Some(RuntimeValue::Int(1)));
}

#[test]
fn returns_convert_between_char_and_float() {
    // char to_char(float f) { return f; }
    // int main() { float f = 65.7; char c = to_char(f); return c; }
    let tree = unit(vec![
        function(
            "char",
            "to_char",
            vec![param("float", "f")],
            vec![ret(Some(ident("f")))],
        ),
        function(
            "int",
            "main",
            vec![],
            vec![
                declare("float", "f", Some(float("65.7"))),
                declare("char", "c", Some(call("to_char", vec![ident("f")]))),
                ret(Some(ident("c"))),
            ],
        ),
    ]);

    assert_eq!(run_main(&tree), Some(RuntimeValue::Int(65)));
}

#[test]
fn float_condition_and_assignment_result() {
    // int main() {
    //     int x = 0;
    //     if (0.5) { x = 3; } else { x = 4; }
    //     return x;
    // }
    let tree = unit(vec![function(
        "int",
        "main",
        vec![],
        vec![
            declare("int", "x", Some(int("0"))),
            if_else(
                float("0.5"),
                vec![assign(ident("x"), int("3"))],
                Some(vec![assign(ident("x"), int("4"))]),
            ),
            ret(Some(ident("x"))),
        ],
    )]);

    assert_eq!(run_main(&tree), Some(RuntimeValue::Int(3)));
}

#[test]
fn char_literal_widens_on_return() {
    // int main() { return 266; } with 266 written as a char leaf, which keeps the low byte
    let tree = unit(vec![function(
        "int",
        "main",
        vec![],
        vec![ret(Some(char_lit("266")))],
    )]);

    assert_eq!(run_main(&tree), Some(RuntimeValue::Int(10)));
}

#[test]
fn quoted_char_leaf_reads_as_zero() {
    // char main() { return 'a'; }
    let tree = unit(vec![function(
        "char",
        "main",
        vec![],
        vec![ret(Some(char_lit("'a'")))],
    )]);

    assert_eq!(run_main(&tree), Some(RuntimeValue::Char(0)));
}

#[test]
fn void_function_without_return() {
    // int g = 1;
    // void reset() { g = 0; }
    // int main() { reset(); return g; }
    let tree = unit(vec![
        declare("int", "g", Some(int("1"))),
        function("void", "reset", vec![], vec![assign(ident("g"), int("0"))]),
        function(
            "int",
            "main",
            vec![],
            vec![call("reset", vec![]), ret(Some(ident("g")))],
        ),
    ]);

    assert_eq!(run_main(&tree), Some(RuntimeValue::Int(0)));
}

#[test]
fn uninitialized_global_is_zero() {
    // float g;
    // float main() { return g; }
    let tree = unit(vec![
        declare("float", "g", None),
        function("float", "main", vec![], vec![ret(Some(ident("g")))]),
    ]);

    assert_eq!(run_main(&tree), Some(RuntimeValue::Float(0.0)));
}

#[test]
fn statements_after_return_go_to_a_dead_block() {
    // int main() { return 1; int y = 2; return y; }
    let tree = unit(vec![function(
        "int",
        "main",
        vec![],
        vec![
            ret(Some(int("1"))),
            declare("int", "y", Some(int("2"))),
            ret(Some(ident("y"))),
        ],
    )]);

    let module = cirgen::ir::lowering::generate(&tree).unwrap();
    let func = module.function(module.get_function("main").unwrap());
    assert_eq!(func.layout.len(), 2);
    assert!(func.predecessors(func.layout[1]).is_empty());
    assert_eq!(
        run_function(&module, "main", &[]).unwrap(),
        Some(RuntimeValue::Int(1))
    );
}
