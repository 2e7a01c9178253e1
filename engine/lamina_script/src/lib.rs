//! Lamina script - the embedded language for interpreted custom functions.
//!
//! A small numeric language: top-level `fn` items, `let`, `if`/`else`,
//! `while`, `for x in a..b` and `for x in list`, numbers, booleans and lists.
//!
//! ```text
//! fn slab(params, bulk_in, bulk_out, contrast) {
//!     let rows = [[params[0], params[1], params[2]]];
//!     return [rows, params[3]];
//! }
//! ```
//!
//! Compilation resolves every local to a frame slot and every call to its
//! target, so a compiled [`Program`] is immutable and can be shared across
//! threads. Execution state lives in an [`Interpreter`], which runs one call
//! at a time.

mod ast;
mod builtins;
mod error;
mod eval;
mod lexer;
mod parser;
mod stack;
mod value;

pub use ast::{FunctionRef, Program};
pub use error::{ErrorKind, ScriptError};
pub use eval::Interpreter;
pub use parser::compile;
pub use value::Value;
