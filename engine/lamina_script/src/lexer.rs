//! Tokenizer built on logos.

use logos::Logos;

use crate::ScriptError;

/// Token produced by the lexer.
#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r"//[^\n]*")]
pub(crate) enum Token {
    #[token("fn")]
    Fn,
    #[token("let")]
    Let,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("return")]
    Return,
    #[token("true")]
    True,
    #[token("false")]
    False,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token("..")]
    DotDot,

    #[token("==")]
    EqEq,
    #[token("=")]
    Eq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    LtEq,
    #[token("<")]
    Lt,
    #[token(">=")]
    GtEq,
    #[token(">")]
    Gt,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("!")]
    Bang,
    #[token("&&")]
    AmpAmp,
    #[token("||")]
    PipePipe,

    // Integers, decimals and exponent forms all lex to one numeric token.
    #[regex(r"[0-9][0-9_]*", parse_number)]
    #[regex(r"[0-9][0-9_]*\.[0-9][0-9_]*([eE][+-]?[0-9]+)?", parse_number)]
    #[regex(r"[0-9][0-9_]*[eE][+-]?[0-9]+", parse_number)]
    Number(f64),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,
}

fn parse_number(lex: &mut logos::Lexer<'_, Token>) -> Option<f64> {
    lex.slice().replace('_', "").parse::<f64>().ok()
}

impl Token {
    /// Human-readable form used in diagnostics.
    pub(crate) fn describe(self) -> &'static str {
        match self {
            Token::Fn => "`fn`",
            Token::Let => "`let`",
            Token::If => "`if`",
            Token::Else => "`else`",
            Token::While => "`while`",
            Token::For => "`for`",
            Token::In => "`in`",
            Token::Return => "`return`",
            Token::True => "`true`",
            Token::False => "`false`",
            Token::LParen => "`(`",
            Token::RParen => "`)`",
            Token::LBrace => "`{`",
            Token::RBrace => "`}`",
            Token::LBracket => "`[`",
            Token::RBracket => "`]`",
            Token::Comma => "`,`",
            Token::Semicolon => "`;`",
            Token::DotDot => "`..`",
            Token::EqEq => "`==`",
            Token::Eq => "`=`",
            Token::NotEq => "`!=`",
            Token::LtEq => "`<=`",
            Token::Lt => "`<`",
            Token::GtEq => "`>=`",
            Token::Gt => "`>`",
            Token::Plus => "`+`",
            Token::Minus => "`-`",
            Token::Star => "`*`",
            Token::Slash => "`/`",
            Token::Percent => "`%`",
            Token::Bang => "`!`",
            Token::AmpAmp => "`&&`",
            Token::PipePipe => "`||`",
            Token::Number(_) => "number",
            Token::Ident => "identifier",
        }
    }
}

/// A token with its byte range in the source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Lexeme {
    pub token: Token,
    pub start: u32,
    pub end: u32,
}

/// Byte offset to line number lookup.
pub(crate) struct LineIndex {
    starts: Vec<u32>,
}

impl LineIndex {
    pub(crate) fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|&(_, b)| b == b'\n')
                .map(|(i, _)| to_u32(i + 1)),
        );
        LineIndex { starts }
    }

    /// 1-based line containing `offset`.
    pub(crate) fn line(&self, offset: u32) -> u32 {
        let line = match self.starts.binary_search(&offset) {
            Ok(i) => i + 1,
            Err(i) => i,
        };
        to_u32(line)
    }
}

fn to_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Tokenize a whole source file.
pub(crate) fn lex(source: &str, lines: &LineIndex) -> Result<Vec<Lexeme>, ScriptError> {
    let mut lexer = Token::lexer(source);
    let mut lexemes = Vec::new();
    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let start = to_u32(span.start);
        match result {
            Ok(token) => lexemes.push(Lexeme {
                token,
                start,
                end: to_u32(span.end),
            }),
            Err(()) => {
                return Err(ScriptError::lex(
                    lines.line(start),
                    format!("unexpected input `{}`", lexer.slice()),
                ));
            }
        }
    }
    Ok(lexemes)
}
