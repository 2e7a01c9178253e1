//! Compiled program representation.
//!
//! Expressions live in a flat arena and refer to each other by [`ExprId`].
//! Local variables are resolved to frame slots during parsing, so the
//! evaluator never looks names up.

use rustc_hash::FxHashMap;

use crate::builtins::Builtin;

/// Index into [`ExprArena`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct ExprId(u32);

/// Range of ids in the arena's list storage.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct ExprRange {
    start: u32,
    len: u32,
}

/// Frame slot of a local variable.
pub(crate) type Slot = u32;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    /// Binding strength; lower binds tighter.
    pub(crate) fn precedence(self) -> u8 {
        match self {
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 3,
            BinaryOp::Add | BinaryOp::Sub => 4,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 6,
            BinaryOp::Eq | BinaryOp::Ne => 7,
            BinaryOp::And => 11,
            BinaryOp::Or => 12,
        }
    }

    pub(crate) fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Neg,
    Not,
}

/// Call target, resolved at compile time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Callee {
    Function(FunctionRef),
    Builtin(Builtin),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Expr {
    Number(f64),
    Bool(bool),
    Local(Slot),
    List(ExprRange),
    Index { base: ExprId, index: ExprId },
    Unary { op: UnaryOp, operand: ExprId },
    Binary { op: BinaryOp, left: ExprId, right: ExprId },
    Call { callee: Callee, args: ExprRange },
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Stmt {
    /// `let x = e;` and `x = e;` both store into a slot.
    Assign { slot: Slot, value: ExprId },
    /// `x[i] = e;`
    AssignIndex { slot: Slot, index: ExprId, value: ExprId },
    If { cond: ExprId, then_branch: Vec<Stmt>, else_branch: Vec<Stmt> },
    While { cond: ExprId, body: Vec<Stmt> },
    /// `for x in a..b` counts from `a` up to, excluding, `b`.
    ForRange { slot: Slot, start: ExprId, end: ExprId, body: Vec<Stmt> },
    /// `for x in list`
    ForEach { slot: Slot, iter: ExprId, body: Vec<Stmt> },
    Return(Option<ExprId>),
    Expr(ExprId),
}

/// Expression storage for one program.
#[derive(Clone, Debug, Default)]
pub(crate) struct ExprArena {
    exprs: Vec<Expr>,
    lists: Vec<ExprId>,
}

impl ExprArena {
    pub(crate) fn alloc(&mut self, expr: Expr) -> ExprId {
        let id = ExprId(index_u32(self.exprs.len()));
        self.exprs.push(expr);
        id
    }

    pub(crate) fn alloc_list(&mut self, ids: &[ExprId]) -> ExprRange {
        let start = index_u32(self.lists.len());
        self.lists.extend_from_slice(ids);
        ExprRange {
            start,
            len: index_u32(ids.len()),
        }
    }

    #[inline]
    pub(crate) fn get(&self, id: ExprId) -> &Expr {
        &self.exprs[id.0 as usize]
    }

    #[inline]
    pub(crate) fn list(&self, range: ExprRange) -> &[ExprId] {
        let start = range.start as usize;
        &self.lists[start..start + range.len as usize]
    }
}

fn index_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Handle to a function inside a [`Program`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FunctionRef(pub(crate) u32);

#[derive(Clone, Debug)]
pub(crate) struct Function {
    pub name: String,
    pub arity: usize,
    /// Parameters plus every local declared in the body.
    pub slots: usize,
    pub body: Vec<Stmt>,
}

/// A compiled script.
///
/// Immutable after compilation; share it behind an `Arc` and run it with
/// any [`Interpreter`](crate::Interpreter).
#[derive(Clone, Debug)]
pub struct Program {
    pub(crate) arena: ExprArena,
    pub(crate) functions: Vec<Function>,
    pub(crate) by_name: FxHashMap<String, FunctionRef>,
}

impl Program {
    /// Find a top-level function by name.
    pub fn lookup(&self, name: &str) -> Option<FunctionRef> {
        self.by_name.get(name).copied()
    }

    /// Declared parameter count of `function`.
    pub fn arity(&self, function: FunctionRef) -> usize {
        self.function(function).arity
    }

    pub fn name(&self, function: FunctionRef) -> &str {
        &self.function(function).name
    }

    /// Names and arities of all functions, in source order.
    pub fn functions(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.functions.iter().map(|f| (f.name.as_str(), f.arity))
    }

    #[inline]
    pub(crate) fn function(&self, function: FunctionRef) -> &Function {
        &self.functions[function.0 as usize]
    }
}
