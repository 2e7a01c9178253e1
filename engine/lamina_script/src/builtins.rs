//! Built-in functions.

use std::sync::Arc;

use crate::Value;

/// Longest list `zeros` will build.
pub(crate) const MAX_LIST_LEN: usize = 1 << 24;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Builtin {
    Sin,
    Cos,
    Tan,
    Tanh,
    Exp,
    Ln,
    Log10,
    Sqrt,
    Abs,
    Floor,
    Ceil,
    Min,
    Max,
    Pow,
    Pi,
    Len,
    Sum,
    Zeros,
    Push,
}

impl Builtin {
    pub(crate) fn lookup(name: &str) -> Option<Builtin> {
        Some(match name {
            "sin" => Builtin::Sin,
            "cos" => Builtin::Cos,
            "tan" => Builtin::Tan,
            "tanh" => Builtin::Tanh,
            "exp" => Builtin::Exp,
            "ln" => Builtin::Ln,
            "log10" => Builtin::Log10,
            "sqrt" => Builtin::Sqrt,
            "abs" => Builtin::Abs,
            "floor" => Builtin::Floor,
            "ceil" => Builtin::Ceil,
            "min" => Builtin::Min,
            "max" => Builtin::Max,
            "pow" => Builtin::Pow,
            "pi" => Builtin::Pi,
            "len" => Builtin::Len,
            "sum" => Builtin::Sum,
            "zeros" => Builtin::Zeros,
            "push" => Builtin::Push,
            _ => return None,
        })
    }

    pub(crate) fn arity(self) -> usize {
        match self {
            Builtin::Pi => 0,
            Builtin::Min | Builtin::Max | Builtin::Pow | Builtin::Push => 2,
            _ => 1,
        }
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            Builtin::Sin => "sin",
            Builtin::Cos => "cos",
            Builtin::Tan => "tan",
            Builtin::Tanh => "tanh",
            Builtin::Exp => "exp",
            Builtin::Ln => "ln",
            Builtin::Log10 => "log10",
            Builtin::Sqrt => "sqrt",
            Builtin::Abs => "abs",
            Builtin::Floor => "floor",
            Builtin::Ceil => "ceil",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Pow => "pow",
            Builtin::Pi => "pi",
            Builtin::Len => "len",
            Builtin::Sum => "sum",
            Builtin::Zeros => "zeros",
            Builtin::Push => "push",
        }
    }

    /// Apply to already-evaluated arguments; arity was checked at compile time.
    pub(crate) fn call(self, args: Vec<Value>) -> Result<Value, String> {
        let mut args = args.into_iter();
        let mut next = || args.next().unwrap_or(Value::Void);
        match self {
            Builtin::Pi => Ok(Value::Number(std::f64::consts::PI)),
            Builtin::Min => binary(self, &next(), &next(), f64::min),
            Builtin::Max => binary(self, &next(), &next(), f64::max),
            Builtin::Pow => binary(self, &next(), &next(), f64::powf),
            Builtin::Len => match next() {
                #[expect(clippy::cast_precision_loss, reason = "list lengths are small")]
                Value::List(items) => Ok(Value::Number(items.len() as f64)),
                other => Err(type_error(self, &other)),
            },
            Builtin::Sum => {
                let list = next();
                let mut values = Vec::new();
                if list.as_list().is_some() && list.flatten_numbers(&mut values) {
                    Ok(Value::Number(values.iter().sum()))
                } else {
                    Err(type_error(self, &list))
                }
            }
            Builtin::Zeros => {
                let n = next();
                let count = n
                    .as_number()
                    .filter(|c| *c >= 0.0 && c.fract() == 0.0)
                    .ok_or_else(|| format!("zeros: expected a non-negative whole number, got {n}"))?;
                #[expect(clippy::cast_precision_loss, reason = "the limit is a power of two")]
                let limit = MAX_LIST_LEN as f64;
                if count > limit {
                    return Err(format!("zeros: {n} exceeds the list limit of {MAX_LIST_LEN}"));
                }
                #[expect(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    reason = "checked whole number within the list limit"
                )]
                let count = count as usize;
                Ok(Value::List(Arc::new(vec![Value::Number(0.0); count])))
            }
            Builtin::Push => match next() {
                Value::List(mut items) => {
                    Arc::make_mut(&mut items).push(next());
                    Ok(Value::List(items))
                }
                other => Err(type_error(self, &other)),
            },
            _ => {
                let arg = next();
                let x = arg.as_number().ok_or_else(|| type_error(self, &arg))?;
                Ok(Value::Number(self.unary(x)))
            }
        }
    }

    fn unary(self, x: f64) -> f64 {
        match self {
            Builtin::Sin => x.sin(),
            Builtin::Cos => x.cos(),
            Builtin::Tan => x.tan(),
            Builtin::Tanh => x.tanh(),
            Builtin::Exp => x.exp(),
            Builtin::Ln => x.ln(),
            Builtin::Log10 => x.log10(),
            Builtin::Sqrt => x.sqrt(),
            Builtin::Abs => x.abs(),
            Builtin::Floor => x.floor(),
            Builtin::Ceil => x.ceil(),
            _ => f64::NAN,
        }
    }
}

fn binary(builtin: Builtin, a: &Value, b: &Value, f: fn(f64, f64) -> f64) -> Result<Value, String> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(f(*a, *b))),
        (Value::Number(_), other) | (other, _) => Err(type_error(builtin, other)),
    }
}

fn type_error(builtin: Builtin, got: &Value) -> String {
    format!("{}: unexpected {} argument", builtin.name(), got.type_name())
}
