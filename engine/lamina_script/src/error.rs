//! Script errors.

use std::fmt;

/// Phase in which a script error was raised.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unrecognized character sequence.
    Lex,
    /// Malformed source or unresolved name.
    Syntax,
    /// Failure while executing a function.
    Runtime,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Lex => "lex",
            ErrorKind::Syntax => "syntax",
            ErrorKind::Runtime => "runtime",
        })
    }
}

/// Error raised while compiling or running a script.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind} error{}: {message}", at_line(.line))]
pub struct ScriptError {
    pub kind: ErrorKind,
    /// 1-based source line, when known.
    pub line: Option<u32>,
    pub message: String,
}

// thiserror hands format arguments over by reference.
fn at_line(line: &Option<u32>) -> String {
    line.map(|line| format!(" at line {line}")).unwrap_or_default()
}

impl ScriptError {
    pub fn lex(line: u32, message: impl Into<String>) -> Self {
        ScriptError {
            kind: ErrorKind::Lex,
            line: Some(line),
            message: message.into(),
        }
    }

    pub fn syntax(line: u32, message: impl Into<String>) -> Self {
        ScriptError {
            kind: ErrorKind::Syntax,
            line: Some(line),
            message: message.into(),
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        ScriptError {
            kind: ErrorKind::Runtime,
            line: None,
            message: message.into(),
        }
    }
}
