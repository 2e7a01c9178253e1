//! Recursive descent parser and name resolver.
//!
//! Produces a [`Program`] directly: expressions go into the arena, locals are
//! bound to frame slots and calls are bound to their target as they are
//! parsed. Scoping is per function: every name declared anywhere in a
//! function body shares one slot for the whole body.
//!
//! Grammar:
//!
//! ```text
//! program := item*
//! item    := "fn" IDENT "(" (IDENT ("," IDENT)*)? ")" block
//! block   := "{" stmt* "}"
//! stmt    := "let" IDENT "=" expr ";"
//!          | expr ("=" expr)? ";"
//!          | "if" expr block ("else" (if-stmt | block))?
//!          | "while" expr block
//!          | "for" IDENT "in" expr (".." expr)? block
//!          | "return" expr? ";"
//! expr    := binary expression over unary / postfix / primary
//! ```

use rustc_hash::FxHashMap;

use crate::ast::{
    BinaryOp, Callee, Expr, ExprArena, ExprId, Function, FunctionRef, Program, Slot, Stmt,
    UnaryOp,
};
use crate::builtins::Builtin;
use crate::lexer::{lex, Lexeme, LineIndex, Token};
use crate::stack::ensure_sufficient_stack;
use crate::ScriptError;

type ParseResult<T> = Result<T, ScriptError>;

/// Loosest binding level; see [`BinaryOp::precedence`].
const LOWEST_PRECEDENCE: u8 = 12;

/// Compile a source file.
pub fn compile(source: &str) -> Result<Program, ScriptError> {
    let lines = LineIndex::new(source);
    let tokens = lex(source, &lines)?;
    let mut parser = Parser::new(source, lines, tokens);
    parser.collect_signatures()?;
    let program = parser.parse_program()?;
    tracing::debug!(functions = program.functions.len(), "compiled script");
    Ok(program)
}

struct Signature {
    function: FunctionRef,
    arity: usize,
}

struct Parser<'src> {
    source: &'src str,
    lines: LineIndex,
    tokens: Vec<Lexeme>,
    pos: usize,
    arena: ExprArena,
    signatures: FxHashMap<&'src str, Signature>,
    /// Locals of the function being parsed.
    scope: FxHashMap<&'src str, Slot>,
}

impl<'src> Parser<'src> {
    fn new(source: &'src str, lines: LineIndex, tokens: Vec<Lexeme>) -> Self {
        Parser {
            source,
            lines,
            tokens,
            pos: 0,
            arena: ExprArena::default(),
            signatures: FxHashMap::default(),
            scope: FxHashMap::default(),
        }
    }

    // ===== Token access =====

    fn current(&self) -> Option<Token> {
        self.tokens.get(self.pos).map(|l| l.token)
    }

    fn peek(&self, offset: usize) -> Option<Token> {
        self.tokens.get(self.pos + offset).map(|l| l.token)
    }

    fn check(&self, token: Token) -> bool {
        self.current() == Some(token)
    }

    fn eat(&mut self, token: Token) -> bool {
        if self.check(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> ParseResult<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.unexpected(token.describe()))
        }
    }

    fn slice_at(&self, index: usize) -> &'src str {
        let source: &'src str = self.source;
        self.tokens
            .get(index)
            .and_then(|l| source.get(l.start as usize..l.end as usize))
            .unwrap_or("")
    }

    fn expect_ident(&mut self) -> ParseResult<&'src str> {
        if self.check(Token::Ident) {
            let name = self.slice_at(self.pos);
            self.pos += 1;
            Ok(name)
        } else {
            Err(self.unexpected("identifier"))
        }
    }

    fn line(&self) -> u32 {
        let offset = match self.tokens.get(self.pos) {
            Some(lexeme) => lexeme.start,
            None => u32::try_from(self.source.len()).unwrap_or(u32::MAX),
        };
        self.lines.line(offset)
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::syntax(self.line(), message)
    }

    fn unexpected(&self, expected: &str) -> ScriptError {
        let found = match self.current() {
            Some(Token::Ident) => format!("`{}`", self.slice_at(self.pos)),
            Some(token) => token.describe().to_string(),
            None => "end of input".to_string(),
        };
        self.error(format!("expected {expected}, found {found}"))
    }

    // ===== Items =====

    /// Record every top-level function so calls can bind ahead of definition.
    fn collect_signatures(&mut self) -> ParseResult<()> {
        let mut index = 0u32;
        let mut i = 0;
        while i + 2 < self.tokens.len() {
            let is_header = self.tokens[i].token == Token::Fn
                && self.tokens[i + 1].token == Token::Ident
                && self.tokens[i + 2].token == Token::LParen;
            if !is_header {
                i += 1;
                continue;
            }
            let name = self.slice_at(i + 1);
            let mut arity = 0;
            let mut j = i + 3;
            while let Some(lexeme) = self.tokens.get(j) {
                match lexeme.token {
                    Token::Ident => arity += 1,
                    Token::RParen => break,
                    _ => {}
                }
                j += 1;
            }
            let signature = Signature {
                function: FunctionRef(index),
                arity,
            };
            if self.signatures.insert(name, signature).is_some() {
                return Err(ScriptError::syntax(
                    self.lines.line(self.tokens[i].start),
                    format!("function `{name}` is defined twice"),
                ));
            }
            index += 1;
            i = j;
        }
        Ok(())
    }

    fn parse_program(mut self) -> ParseResult<Program> {
        let mut functions = Vec::new();
        while self.current().is_some() {
            functions.push(self.parse_function()?);
        }
        let by_name = self
            .signatures
            .iter()
            .map(|(name, sig)| ((*name).to_string(), sig.function))
            .collect();
        Ok(Program {
            arena: self.arena,
            functions,
            by_name,
        })
    }

    fn parse_function(&mut self) -> ParseResult<Function> {
        self.expect(Token::Fn)?;
        let name = self.expect_ident()?;
        self.expect(Token::LParen)?;
        self.scope.clear();
        let mut arity = 0;
        if !self.check(Token::RParen) {
            loop {
                let param = self.expect_ident()?;
                if self.scope.contains_key(param) {
                    return Err(self.error(format!("duplicate parameter `{param}`")));
                }
                self.declare(param);
                arity += 1;
                if !self.eat(Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::RParen)?;
        let body = self.block()?;
        Ok(Function {
            name: name.to_string(),
            arity,
            slots: self.scope.len(),
            body,
        })
    }

    /// Slot of `name`, allocating one on first declaration.
    fn declare(&mut self, name: &'src str) -> Slot {
        let next = u32::try_from(self.scope.len()).unwrap_or(u32::MAX);
        *self.scope.entry(name).or_insert(next)
    }

    // ===== Statements =====

    fn block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.expect(Token::LBrace)?;
        let mut stmts = Vec::new();
        while !self.eat(Token::RBrace) {
            if self.current().is_none() {
                return Err(self.unexpected("`}`"));
            }
            stmts.push(self.statement()?);
        }
        Ok(stmts)
    }

    fn statement(&mut self) -> ParseResult<Stmt> {
        ensure_sufficient_stack(|| match self.current() {
            Some(Token::Let) => self.let_statement(),
            Some(Token::If) => self.if_statement(),
            Some(Token::While) => {
                self.pos += 1;
                let cond = self.expression()?;
                let body = self.block()?;
                Ok(Stmt::While { cond, body })
            }
            Some(Token::For) => self.for_statement(),
            Some(Token::Return) => {
                self.pos += 1;
                let value = if self.check(Token::Semicolon) {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.expect(Token::Semicolon)?;
                Ok(Stmt::Return(value))
            }
            _ => self.expression_statement(),
        })
    }

    fn let_statement(&mut self) -> ParseResult<Stmt> {
        self.expect(Token::Let)?;
        let name = self.expect_ident()?;
        self.expect(Token::Eq)?;
        let value = self.expression()?;
        self.expect(Token::Semicolon)?;
        let slot = self.declare(name);
        Ok(Stmt::Assign { slot, value })
    }

    fn if_statement(&mut self) -> ParseResult<Stmt> {
        self.expect(Token::If)?;
        let cond = self.expression()?;
        let then_branch = self.block()?;
        let else_branch = if self.eat(Token::Else) {
            if self.check(Token::If) {
                vec![self.if_statement()?]
            } else {
                self.block()?
            }
        } else {
            Vec::new()
        };
        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn for_statement(&mut self) -> ParseResult<Stmt> {
        self.expect(Token::For)?;
        let name = self.expect_ident()?;
        self.expect(Token::In)?;
        let start = self.expression()?;
        let end = if self.eat(Token::DotDot) {
            Some(self.expression()?)
        } else {
            None
        };
        let slot = self.declare(name);
        let body = self.block()?;
        Ok(match end {
            Some(end) => Stmt::ForRange {
                slot,
                start,
                end,
                body,
            },
            None => Stmt::ForEach {
                slot,
                iter: start,
                body,
            },
        })
    }

    fn expression_statement(&mut self) -> ParseResult<Stmt> {
        let target = self.expression()?;
        if !self.eat(Token::Eq) {
            self.expect(Token::Semicolon)?;
            return Ok(Stmt::Expr(target));
        }
        let value = self.expression()?;
        self.expect(Token::Semicolon)?;
        match *self.arena.get(target) {
            Expr::Local(slot) => Ok(Stmt::Assign { slot, value }),
            Expr::Index { base, index } => match *self.arena.get(base) {
                Expr::Local(slot) => Ok(Stmt::AssignIndex { slot, index, value }),
                _ => Err(self.error("only variables can be indexed on assignment")),
            },
            _ => Err(self.error("invalid assignment target")),
        }
    }

    // ===== Expressions =====

    fn expression(&mut self) -> ParseResult<ExprId> {
        self.binary(LOWEST_PRECEDENCE)
    }

    fn binary(&mut self, level: u8) -> ParseResult<ExprId> {
        ensure_sufficient_stack(|| {
            let mut left = self.unary()?;
            while let Some(op) = self.match_binary_op() {
                let precedence = op.precedence();
                if precedence > level {
                    break;
                }
                self.pos += 1;
                let right = self.binary(precedence - 1)?;
                left = self.arena.alloc(Expr::Binary { op, left, right });
            }
            Ok(left)
        })
    }

    fn match_binary_op(&self) -> Option<BinaryOp> {
        Some(match self.current()? {
            Token::Plus => BinaryOp::Add,
            Token::Minus => BinaryOp::Sub,
            Token::Star => BinaryOp::Mul,
            Token::Slash => BinaryOp::Div,
            Token::Percent => BinaryOp::Mod,
            Token::EqEq => BinaryOp::Eq,
            Token::NotEq => BinaryOp::Ne,
            Token::Lt => BinaryOp::Lt,
            Token::LtEq => BinaryOp::Le,
            Token::Gt => BinaryOp::Gt,
            Token::GtEq => BinaryOp::Ge,
            Token::AmpAmp => BinaryOp::And,
            Token::PipePipe => BinaryOp::Or,
            _ => return None,
        })
    }

    fn match_unary_op(&self) -> Option<UnaryOp> {
        match self.current()? {
            Token::Minus => Some(UnaryOp::Neg),
            Token::Bang => Some(UnaryOp::Not),
            _ => None,
        }
    }

    fn unary(&mut self) -> ParseResult<ExprId> {
        if let Some(op) = self.match_unary_op() {
            self.pos += 1;
            let operand = ensure_sufficient_stack(|| self.unary())?;
            return Ok(self.arena.alloc(Expr::Unary { op, operand }));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> ParseResult<ExprId> {
        let mut expr = self.primary()?;
        while self.eat(Token::LBracket) {
            let index = self.expression()?;
            self.expect(Token::RBracket)?;
            expr = self.arena.alloc(Expr::Index { base: expr, index });
        }
        Ok(expr)
    }

    fn primary(&mut self) -> ParseResult<ExprId> {
        let expr = match self.current() {
            Some(Token::Number(n)) => {
                self.pos += 1;
                Expr::Number(n)
            }
            Some(Token::True) => {
                self.pos += 1;
                Expr::Bool(true)
            }
            Some(Token::False) => {
                self.pos += 1;
                Expr::Bool(false)
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.expression()?;
                self.expect(Token::RParen)?;
                return Ok(inner);
            }
            Some(Token::LBracket) => {
                self.pos += 1;
                let items = self.arguments(Token::RBracket)?;
                Expr::List(self.arena.alloc_list(&items))
            }
            Some(Token::Ident) if self.peek(1) == Some(Token::LParen) => return self.call(),
            Some(Token::Ident) => {
                let name = self.expect_ident()?;
                match self.scope.get(name) {
                    Some(&slot) => Expr::Local(slot),
                    None => return Err(self.error(format!("undefined variable `{name}`"))),
                }
            }
            _ => return Err(self.unexpected("expression")),
        };
        Ok(self.arena.alloc(expr))
    }

    fn call(&mut self) -> ParseResult<ExprId> {
        let line = self.line();
        let name = self.expect_ident()?;
        self.expect(Token::LParen)?;
        let args = self.arguments(Token::RParen)?;

        let (callee, arity) = if let Some(sig) = self.signatures.get(name) {
            (Callee::Function(sig.function), sig.arity)
        } else if let Some(builtin) = Builtin::lookup(name) {
            (Callee::Builtin(builtin), builtin.arity())
        } else {
            return Err(ScriptError::syntax(line, format!("unknown function `{name}`")));
        };
        if args.len() != arity {
            return Err(ScriptError::syntax(
                line,
                format!("`{name}` takes {arity} argument(s), got {}", args.len()),
            ));
        }
        let args = self.arena.alloc_list(&args);
        Ok(self.arena.alloc(Expr::Call { callee, args }))
    }

    /// Comma separated expressions up to and including `close`.
    fn arguments(&mut self, close: Token) -> ParseResult<Vec<ExprId>> {
        let mut items = Vec::new();
        if self.eat(close) {
            return Ok(items);
        }
        loop {
            items.push(self.expression()?);
            if self.eat(close) {
                return Ok(items);
            }
            self.expect(Token::Comma)?;
            // trailing comma
            if self.eat(close) {
                return Ok(items);
            }
        }
    }
}

#[cfg(test)]
mod tests;
