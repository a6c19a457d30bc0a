use std::io::{self, Write};

use crate::frontend::lexer::Spanned;
use crate::frontend::token::Token;

/// Prints a lexed token stream, one token per line, for `--tokens`.
pub struct TokenDumper {
    pub color: bool,
    pub show_debug_repr: bool, // if false, prints source spelling instead of Debug
}

impl Default for TokenDumper {
    fn default() -> Self {
        Self {
            color: true,
            show_debug_repr: true,
        }
    }
}

impl TokenDumper {
    // ANSI colors
    const RESET: &'static str = "\x1b[0m";
    const DIM: &'static str = "\x1b[2m";
    const GRN: &'static str = "\x1b[32m";
    const YEL: &'static str = "\x1b[33m";
    const CYN: &'static str = "\x1b[36m";
    const MAG: &'static str = "\x1b[35m";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_color(mut self) -> Self {
        self.color = false;
        self
    }

    pub fn pretty(mut self) -> Self {
        self.show_debug_repr = false;
        self
    }

    pub fn dump(&self, tokens: &[Spanned], out: &mut impl Write) -> io::Result<()> {
        for s in tokens {
            self.write_one(s, out)?;
        }
        Ok(())
    }

    fn write_one(&self, s: &Spanned, out: &mut impl Write) -> io::Result<()> {
        let kind = Self::kind(&s.token);
        let colr = if self.color { Self::color(&s.token) } else { "" };
        let reset = if self.color { Self::RESET } else { "" };

        let text = match &s.token {
            _ if self.show_debug_repr => format!("{:?}", s.token),
            Token::Comment(c) => format!("COMMENT: {}", c.trim()),
            other => other.to_string(),
        };

        writeln!(
            out,
            "[{:02}:{:02}] {}{:<8} {}{}",
            s.span.line, s.span.col, colr, kind, text, reset
        )
    }

    fn kind(t: &Token) -> &'static str {
        use Token::*;
        match t {
            Comment(_) => "COMMENT",
            Eof => "EOF",

            Integer(_) => "INT",
            Float(_) => "FLOAT",
            String(_) => "STRING",
            Bool(_) => "BOOL",

            Ident(_) => "IDENT",

            LParen | RParen => "PAREN",
            LBracket | RBracket => "BRACKET",
            LBrace | RBrace => "BRACE",

            EqEq | NotEq | Lt | LtEq | Gt | GtEq => "CMP",
            t if t.is_binary_operator() => "OP",

            Assign | Semicolon | Comma => "PUNCT",
            Print => "KEYWORD",
            _ => "OTHER",
        }
    }

    fn color(t: &Token) -> &'static str {
        use Token::*;
        match t {
            Comment(_) | Eof => Self::DIM,
            String(_) => Self::GRN,
            Integer(_) | Float(_) | Bool(_) => Self::CYN,
            Ident(_) => Self::YEL,
            t if t.is_binary_operator() => Self::MAG,
            _ => Self::RESET,
        }
    }
}
