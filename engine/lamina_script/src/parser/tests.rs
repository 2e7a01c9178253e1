#![expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]

use super::*;
use crate::ErrorKind;
use pretty_assertions::assert_eq;

fn syntax_error(source: &str) -> ScriptError {
    match compile(source) {
        Ok(_) => panic!("expected a syntax error for {source:?}"),
        Err(err) => err,
    }
}

#[test]
fn functions_are_listed_in_source_order() {
    let program = compile(
        "fn first(a, b) { return a + b; }
         fn second() { return 1; }",
    )
    .unwrap();
    assert_eq!(
        program.functions().collect::<Vec<_>>(),
        vec![("first", 2), ("second", 0)]
    );
    let second = program.lookup("second").unwrap();
    assert_eq!(program.arity(second), 0);
    assert_eq!(program.name(second), "second");
    assert!(program.lookup("third").is_none());
}

#[test]
fn locals_share_one_slot_per_name() {
    let program = compile(
        "fn f(a) {
             let x = a;
             if a > 0 { let x = 2; let y = 3; }
             for i in 0..3 { x = x + i; }
             return x;
         }",
    )
    .unwrap();
    let f = program.function(program.lookup("f").unwrap());
    // a, x, y, i
    assert_eq!(f.slots, 4);
}

#[test]
fn calls_bind_ahead_of_definition() {
    let program = compile(
        "fn outer(x) { return inner(x) * 2; }
         fn inner(x) { return x + 1; }",
    );
    assert!(program.is_ok());
}

#[test]
fn precedence_binds_multiplication_tighter() {
    let program = compile("fn f() { return 1 + 2 * 3; }").unwrap();
    let f = program.function(program.lookup("f").unwrap());
    let Stmt::Return(Some(root)) = &f.body[0] else {
        panic!("expected return");
    };
    let Expr::Binary { op, right, .. } = program.arena.get(*root) else {
        panic!("expected binary");
    };
    assert_eq!(*op, BinaryOp::Add);
    assert!(matches!(
        program.arena.get(*right),
        Expr::Binary {
            op: BinaryOp::Mul,
            ..
        }
    ));
}

#[test]
fn undefined_variable() {
    let err = syntax_error("fn f() {\n  return y;\n}");
    assert_eq!(err.kind, ErrorKind::Syntax);
    assert_eq!(err.line, Some(2));
    assert!(err.message.contains("undefined variable `y`"));
}

#[test]
fn unknown_function_and_wrong_arity() {
    assert!(syntax_error("fn f() { return g(1); }")
        .message
        .contains("unknown function `g`"));
    assert!(syntax_error("fn f() { return sqrt(1, 2); }")
        .message
        .contains("takes 1 argument(s), got 2"));
    assert!(syntax_error("fn f(a) { return f(); }")
        .message
        .contains("takes 1 argument(s), got 0"));
}

#[test]
fn duplicate_definitions() {
    assert!(syntax_error("fn f() {} fn f() {}")
        .message
        .contains("defined twice"));
    assert!(syntax_error("fn f(a, a) {}")
        .message
        .contains("duplicate parameter"));
}

#[test]
fn malformed_source() {
    assert!(syntax_error("fn f( { }").message.contains("expected"));
    assert!(syntax_error("let x = 1;").message.contains("expected `fn`"));
    assert!(syntax_error("fn f() { return 1 }")
        .message
        .contains("expected `;`, found `}`"));
    assert!(syntax_error("fn f() { 1 = 2; }")
        .message
        .contains("invalid assignment target"));
    assert!(syntax_error("fn f() {").message.contains("end of input"));
}

#[test]
fn trailing_commas_are_accepted() {
    assert!(compile("fn f(a) { let xs = [a, 2,]; return max(xs[0], 1,); }").is_ok());
}

#[test]
fn deeply_nested_expression_compiles() {
    let depth = 2_000;
    let source = format!(
        "fn f() {{ return {}1{}; }}",
        "(".repeat(depth),
        ")".repeat(depth)
    );
    assert!(compile(&source).is_ok());
}
