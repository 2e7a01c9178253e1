//! Tree-walking evaluator.

use std::sync::Arc;

use crate::ast::{BinaryOp, Callee, Expr, ExprId, FunctionRef, Program, Slot, Stmt, UnaryOp};
use crate::stack::ensure_sufficient_stack;
use crate::{ScriptError, Value};

/// Largest magnitude at which `i + 1` is still exact.
const MAX_RANGE_BOUND: f64 = 9_007_199_254_740_992.0;

type EvalResult<T = Value> = Result<T, ScriptError>;

/// Outcome of executing a statement.
enum Flow {
    Next,
    Return(Value),
}

/// Executes functions of compiled programs.
///
/// Holds the frame stack, so one interpreter runs one call at a time. Callers
/// that share an interpreter across threads put it behind a lock.
#[derive(Debug)]
pub struct Interpreter {
    stack: Vec<Value>,
    depth: usize,
    max_depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Default nesting limit for script function calls.
    pub const DEFAULT_MAX_DEPTH: usize = 256;

    pub fn new() -> Self {
        Self::with_max_depth(Self::DEFAULT_MAX_DEPTH)
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Interpreter {
            stack: Vec::new(),
            depth: 0,
            max_depth,
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Call `function` of `program` with `args`.
    ///
    /// A function that finishes without `return` yields [`Value::Void`].
    pub fn call(
        &mut self,
        program: &Program,
        function: FunctionRef,
        args: Vec<Value>,
    ) -> EvalResult {
        let arity = program.arity(function);
        if args.len() != arity {
            return Err(ScriptError::runtime(format!(
                "`{}` takes {arity} argument(s), got {}",
                program.name(function),
                args.len()
            )));
        }
        self.stack.clear();
        self.depth = 0;
        let result = self.invoke(program, function, args);
        self.stack.clear();
        self.depth = 0;
        result
    }

    fn invoke(&mut self, program: &Program, function: FunctionRef, args: Vec<Value>) -> EvalResult {
        let f = program.function(function);
        if self.depth >= self.max_depth {
            return Err(ScriptError::runtime(format!(
                "call depth limit of {} exceeded in `{}`",
                self.max_depth, f.name
            )));
        }
        let base = self.stack.len();
        self.stack.extend(args);
        self.stack.resize(base + f.slots, Value::Void);
        self.depth += 1;
        let flow = ensure_sufficient_stack(|| self.exec_block(program, base, &f.body));
        self.depth -= 1;
        self.stack.truncate(base);
        match flow? {
            Flow::Return(value) => Ok(value),
            Flow::Next => Ok(Value::Void),
        }
    }

    fn exec_block(&mut self, program: &Program, base: usize, stmts: &[Stmt]) -> EvalResult<Flow> {
        for stmt in stmts {
            if let Flow::Return(value) = self.exec(program, base, stmt)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Next)
    }

    fn exec(&mut self, program: &Program, base: usize, stmt: &Stmt) -> EvalResult<Flow> {
        match stmt {
            Stmt::Assign { slot, value } => {
                let value = self.eval(program, base, *value)?;
                *self.local_mut(base, *slot) = value;
            }
            Stmt::AssignIndex { slot, index, value } => {
                let index = self.eval(program, base, *index)?;
                let index = to_index(&index)?;
                let value = self.eval(program, base, *value)?;
                match self.local_mut(base, *slot) {
                    Value::List(items) => {
                        let len = items.len();
                        match Arc::make_mut(items).get_mut(index) {
                            Some(item) => *item = value,
                            None => return Err(out_of_bounds(index, len)),
                        }
                    }
                    other => {
                        return Err(ScriptError::runtime(format!(
                            "cannot index into a {}",
                            other.type_name()
                        )))
                    }
                }
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let branch = if self.condition(program, base, *cond)? {
                    then_branch
                } else {
                    else_branch
                };
                return self.exec_block(program, base, branch);
            }
            Stmt::While { cond, body } => {
                while self.condition(program, base, *cond)? {
                    if let Flow::Return(value) = self.exec_block(program, base, body)? {
                        return Ok(Flow::Return(value));
                    }
                }
            }
            Stmt::ForRange {
                slot,
                start,
                end,
                body,
            } => {
                let start = self.number(program, base, *start, "range start")?;
                let end = self.number(program, base, *end, "range end")?;
                let outside = |b: &f64| !b.is_finite() || b.abs() > MAX_RANGE_BOUND;
                if let Some(bound) = [start, end].into_iter().find(outside) {
                    return Err(ScriptError::runtime(format!(
                        "range bound {bound} is outside +/-2^53, where counting stops"
                    )));
                }
                let mut i = start;
                while i < end {
                    *self.local_mut(base, *slot) = Value::Number(i);
                    if let Flow::Return(value) = self.exec_block(program, base, body)? {
                        return Ok(Flow::Return(value));
                    }
                    i += 1.0;
                }
            }
            Stmt::ForEach { slot, iter, body } => {
                let items = match self.eval(program, base, *iter)? {
                    Value::List(items) => items,
                    other => {
                        return Err(ScriptError::runtime(format!(
                            "cannot iterate over a {}",
                            other.type_name()
                        )))
                    }
                };
                for item in items.iter() {
                    *self.local_mut(base, *slot) = item.clone();
                    if let Flow::Return(value) = self.exec_block(program, base, body)? {
                        return Ok(Flow::Return(value));
                    }
                }
            }
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(program, base, *expr)?,
                    None => Value::Void,
                };
                return Ok(Flow::Return(value));
            }
            Stmt::Expr(expr) => {
                self.eval(program, base, *expr)?;
            }
        }
        Ok(Flow::Next)
    }

    fn eval(&mut self, program: &Program, base: usize, id: ExprId) -> EvalResult {
        ensure_sufficient_stack(|| match program.arena.get(id) {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Local(slot) => Ok(self.local(base, *slot).clone()),
            Expr::List(range) => {
                let items = program
                    .arena
                    .list(*range)
                    .iter()
                    .map(|item| self.eval(program, base, *item))
                    .collect::<EvalResult<Vec<_>>>()?;
                Ok(Value::list(items))
            }
            Expr::Index { base: list, index } => {
                let list = self.eval(program, base, *list)?;
                let index = to_index(&self.eval(program, base, *index)?)?;
                match list {
                    Value::List(items) => items
                        .get(index)
                        .cloned()
                        .ok_or_else(|| out_of_bounds(index, items.len())),
                    other => Err(ScriptError::runtime(format!(
                        "cannot index into a {}",
                        other.type_name()
                    ))),
                }
            }
            Expr::Unary { op, operand } => {
                let value = self.eval(program, base, *operand)?;
                match (op, value) {
                    (UnaryOp::Neg, Value::Number(n)) => Ok(Value::Number(-n)),
                    (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                    (UnaryOp::Neg, other) => Err(operand_error("-", &other)),
                    (UnaryOp::Not, other) => Err(operand_error("!", &other)),
                }
            }
            Expr::Binary { op, left, right } => self.eval_binary(program, base, *op, *left, *right),
            Expr::Call { callee, args } => {
                let args = program
                    .arena
                    .list(*args)
                    .iter()
                    .map(|arg| self.eval(program, base, *arg))
                    .collect::<EvalResult<Vec<_>>>()?;
                match callee {
                    Callee::Function(function) => self.invoke(program, *function, args),
                    Callee::Builtin(builtin) => builtin.call(args).map_err(ScriptError::runtime),
                }
            }
        })
    }

    fn eval_binary(
        &mut self,
        program: &Program,
        base: usize,
        op: BinaryOp,
        left: ExprId,
        right: ExprId,
    ) -> EvalResult {
        // Logical operators short-circuit.
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            let lhs = self.boolean(program, base, left, op.symbol())?;
            if lhs == matches!(op, BinaryOp::Or) {
                return Ok(Value::Bool(lhs));
            }
            return self.boolean(program, base, right, op.symbol()).map(Value::Bool);
        }

        let lhs = self.eval(program, base, left)?;
        let rhs = self.eval(program, base, right)?;
        match op {
            BinaryOp::Eq => return Ok(Value::Bool(lhs == rhs)),
            BinaryOp::Ne => return Ok(Value::Bool(lhs != rhs)),
            _ => {}
        }
        let (Value::Number(a), Value::Number(b)) = (&lhs, &rhs) else {
            let bad = if lhs.as_number().is_some() { &rhs } else { &lhs };
            return Err(operand_error(op.symbol(), bad));
        };
        let (a, b) = (*a, *b);
        Ok(match op {
            BinaryOp::Add => Value::Number(a + b),
            BinaryOp::Sub => Value::Number(a - b),
            BinaryOp::Mul => Value::Number(a * b),
            BinaryOp::Div => Value::Number(a / b),
            BinaryOp::Mod => Value::Number(a % b),
            BinaryOp::Lt => Value::Bool(a < b),
            BinaryOp::Le => Value::Bool(a <= b),
            BinaryOp::Gt => Value::Bool(a > b),
            BinaryOp::Ge => Value::Bool(a >= b),
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::And | BinaryOp::Or => Value::Void,
        })
    }

    fn condition(&mut self, program: &Program, base: usize, cond: ExprId) -> EvalResult<bool> {
        self.boolean(program, base, cond, "condition")
    }

    fn boolean(&mut self, program: &Program, base: usize, id: ExprId, what: &str) -> EvalResult<bool> {
        match self.eval(program, base, id)? {
            Value::Bool(b) => Ok(b),
            other => Err(operand_error(what, &other)),
        }
    }

    fn number(&mut self, program: &Program, base: usize, id: ExprId, what: &str) -> EvalResult<f64> {
        match self.eval(program, base, id)? {
            Value::Number(n) => Ok(n),
            other => Err(operand_error(what, &other)),
        }
    }

    #[inline]
    fn local(&self, base: usize, slot: Slot) -> &Value {
        &self.stack[base + slot as usize]
    }

    #[inline]
    fn local_mut(&mut self, base: usize, slot: Slot) -> &mut Value {
        &mut self.stack[base + slot as usize]
    }
}

fn to_index(value: &Value) -> EvalResult<usize> {
    match value {
        Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 => {
            #[expect(
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss,
                reason = "checked non-negative whole number"
            )]
            let index = *n as usize;
            Ok(index)
        }
        other => Err(ScriptError::runtime(format!("invalid list index {other}"))),
    }
}

fn out_of_bounds(index: usize, len: usize) -> ScriptError {
    ScriptError::runtime(format!("index {index} out of bounds for list of length {len}"))
}

fn operand_error(what: &str, got: &Value) -> ScriptError {
    ScriptError::runtime(format!("unexpected {} operand for {what}", got.type_name()))
}
