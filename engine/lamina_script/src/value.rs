//! Runtime values.

use std::fmt;
use std::sync::Arc;

/// Runtime value of the script language.
///
/// Lists are shared and copied on write, so passing them around is cheap
/// and values can cross threads.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Number(f64),
    Bool(bool),
    List(Arc<Vec<Value>>),
    Void,
}

impl Value {
    /// Build a list of numbers.
    pub fn numbers(values: &[f64]) -> Self {
        Value::List(Arc::new(values.iter().copied().map(Value::Number).collect()))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Arc::new(items))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Flatten a list of numbers, or nested lists of numbers, row-major.
    pub fn flatten_numbers(&self, out: &mut Vec<f64>) -> bool {
        match self {
            Value::Number(n) => {
                out.push(*n);
                true
            }
            Value::List(items) => items.iter().all(|item| item.flatten_numbers(out)),
            Value::Bool(_) | Value::Void => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Bool(_) => "bool",
            Value::List(_) => "list",
            Value::Void => "void",
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Void => f.write_str("void"),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}
