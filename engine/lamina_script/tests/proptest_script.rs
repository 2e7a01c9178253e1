//! Property-based tests for the script language.
//!
//! Generated expressions are compiled and run, then checked against the same
//! arithmetic done directly in Rust.

#![expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]

use lamina_script::{compile, Interpreter, Value};
use proptest::prelude::*;

/// Expression tree mirrored in Rust.
#[derive(Clone, Debug)]
enum Arith {
    Lit(i32),
    Param(usize),
    Neg(Box<Arith>),
    Bin(Box<Arith>, char, Box<Arith>),
}

impl Arith {
    fn render(&self) -> String {
        match self {
            Arith::Lit(n) if *n < 0 => format!("({n})"),
            Arith::Lit(n) => n.to_string(),
            Arith::Param(i) => format!("p[{i}]"),
            Arith::Neg(inner) => format!("-({})", inner.render()),
            Arith::Bin(l, op, r) => format!("({} {op} {})", l.render(), r.render()),
        }
    }

    fn eval(&self, params: &[f64]) -> f64 {
        match self {
            Arith::Lit(n) => f64::from(*n),
            Arith::Param(i) => params[*i],
            Arith::Neg(inner) => -inner.eval(params),
            Arith::Bin(l, op, r) => {
                let (a, b) = (l.eval(params), r.eval(params));
                match op {
                    '+' => a + b,
                    '-' => a - b,
                    _ => a * b,
                }
            }
        }
    }
}

const PARAMS: usize = 3;

fn arb_arith() -> impl Strategy<Value = Arith> {
    let leaf = prop_oneof![
        (-50i32..=50).prop_map(Arith::Lit),
        (0..PARAMS).prop_map(Arith::Param),
    ];
    leaf.prop_recursive(4, 32, 2, |inner| {
        prop_oneof![
            inner.clone().prop_map(|e| Arith::Neg(Box::new(e))),
            (inner.clone(), prop_oneof![Just('+'), Just('-'), Just('*')], inner)
                .prop_map(|(l, op, r)| Arith::Bin(Box::new(l), op, Box::new(r))),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Compilation never panics, whatever the input.
    #[test]
    fn compile_no_panic(input in ".{0,100}") {
        let _result = compile(&input);
    }

    /// Compilation of a function body never panics either.
    #[test]
    fn body_no_panic(body in "[a-z0-9+*/(){};=\\[\\], -]{0,60}") {
        let _result = compile(&format!("fn f(p) {{ {body} }}"));
    }

    /// Interpreted arithmetic matches Rust arithmetic bit for bit.
    #[test]
    fn arithmetic_matches_rust(
        expr in arb_arith(),
        params in prop::collection::vec(-10.0f64..10.0, PARAMS),
    ) {
        let source = format!("fn f(p) {{ return {}; }}", expr.render());
        let program = compile(&source).unwrap();
        let f = program.lookup("f").unwrap();
        let mut interpreter = Interpreter::new();

        let got = interpreter.call(&program, f, vec![Value::numbers(&params)]).unwrap();
        let expected = expr.eval(&params);
        prop_assert_eq!(got.as_number().map(f64::to_bits), Some(expected.to_bits()), "{}", source);

        // Same inputs, same output.
        let again = interpreter.call(&program, f, vec![Value::numbers(&params)]).unwrap();
        prop_assert_eq!(again, got);
    }
}
