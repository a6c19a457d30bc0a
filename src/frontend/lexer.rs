use serde::{Deserialize, Serialize};

use crate::frontend::token::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub line: usize,
    pub col: usize,
}

#[derive(Debug, Clone)]
pub struct Spanned {
    pub token: Token,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct LexerError {
    pub message: String,
    pub line: usize,
    pub col: usize,
}

impl std::fmt::Display for LexerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.col, self.message)
    }
}

pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn current(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current();
        if ch == Some('\n') {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        self.pos += 1;
        ch
    }

    fn span(&self) -> Span {
        Span {
            line: self.line,
            col: self.col,
        }
    }

    fn error_at(&self, message: impl Into<String>, span: Span) -> LexerError {
        LexerError {
            message: message.into(),
            line: span.line,
            col: span.col,
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_line_comment(&mut self) -> Token {
        self.advance(); // '/'
        self.advance(); // '/'
        let mut comment = String::new();
        while let Some(ch) = self.current() {
            if ch == '\n' {
                break;
            }
            comment.push(ch);
            self.advance();
        }
        Token::Comment(comment.trim().to_string())
    }

    fn read_block_comment(&mut self) -> Result<Token, LexerError> {
        let start = self.span();
        self.advance(); // '/'
        self.advance(); // '*'

        let mut comment = String::new();
        loop {
            match (self.current(), self.peek()) {
                (Some('*'), Some('/')) => {
                    self.advance();
                    self.advance();
                    return Ok(Token::Comment(comment.trim().to_string()));
                }
                (Some(ch), _) => {
                    comment.push(ch);
                    self.advance();
                }
                (None, _) => {
                    return Err(self.error_at("unterminated block comment", start));
                }
            }
        }
    }

    fn read_string(&mut self) -> Result<Token, LexerError> {
        let start = self.span();
        self.advance();

        let mut string = String::new();
        loop {
            match self.current() {
                Some('"') => {
                    self.advance();
                    return Ok(Token::String(string));
                }
                Some('\\') => {
                    self.advance();
                    match self.current() {
                        Some('n') => string.push('\n'),
                        Some('t') => string.push('\t'),
                        Some('r') => string.push('\r'),
                        Some('\\') => string.push('\\'),
                        Some('"') => string.push('"'),
                        Some(ch) => {
                            return Err(self.error_at(
                                format!("unknown escape sequence: \\{}", ch),
                                self.span(),
                            ));
                        }
                        None => {
                            return Err(
                                self.error_at("unexpected EOF in escape sequence", self.span())
                            );
                        }
                    }
                    self.advance();
                }
                Some('\n') => {
                    return Err(self.error_at(
                        "unterminated string (newline before closing quote)",
                        start,
                    ));
                }
                Some(ch) => {
                    string.push(ch);
                    self.advance();
                }
                None => {
                    return Err(self.error_at("unterminated string literal", start));
                }
            }
        }
    }

    fn read_number(&mut self) -> Result<Token, LexerError> {
        let start = self.span();

        // Hex: 0x... or 0X...
        if self.current() == Some('0') && matches!(self.peek(), Some('x') | Some('X')) {
            self.advance(); // '0'
            self.advance(); // 'x' or 'X'

            let mut hex = String::new();
            while let Some(ch) = self.current() {
                if ch.is_ascii_hexdigit() {
                    hex.push(ch);
                    self.advance();
                } else {
                    break;
                }
            }

            if hex.is_empty() {
                return Err(self.error_at("expected hex digits after 0x", start));
            }

            let value = i64::from_str_radix(&hex, 16)
                .map_err(|_| self.error_at(format!("invalid hex number: 0x{}", hex), start))?;

            return Ok(Token::Integer(value));
        }

        let mut digits = String::new();
        let mut is_float = false;

        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() {
                digits.push(ch);
                self.advance();
            } else if ch == '.' && !is_float {
                is_float = true;
                digits.push('.');
                self.advance();
            } else {
                break;
            }
        }

        // Exponent: only if followed by digits (optionally signed)
        if matches!(self.current(), Some('e') | Some('E')) {
            let after = self.peek();
            let signed = matches!(after, Some('+') | Some('-'));
            let digit_at = if signed { self.pos + 2 } else { self.pos + 1 };
            let has_digit = self
                .source
                .get(digit_at)
                .map(|c| c.is_ascii_digit())
                .unwrap_or(false);

            if has_digit {
                is_float = true;
                digits.push('e');
                self.advance();
                if signed {
                    if let Some(sign) = self.advance() {
                        digits.push(sign);
                    }
                }
                while let Some(ch) = self.current() {
                    if ch.is_ascii_digit() {
                        digits.push(ch);
                        self.advance();
                    } else {
                        break;
                    }
                }
            }
        }

        if digits.is_empty() || digits == "." {
            return Err(self.error_at("expected digits", start));
        }

        if is_float {
            let value: f64 = digits
                .parse()
                .map_err(|_| self.error_at(format!("invalid float: {}", digits), start))?;
            if !value.is_finite() {
                return Err(self.error_at(format!("float out of range: {}", digits), start));
            }
            Ok(Token::Float(value))
        } else {
            let value: i64 = digits
                .parse()
                .map_err(|_| self.error_at(format!("invalid integer: {}", digits), start))?;
            Ok(Token::Integer(value))
        }
    }

    fn read_identifier(&mut self) -> Token {
        let mut ident = String::new();
        while let Some(ch) = self.current() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        match ident.as_str() {
            "true" => Token::Bool(true),
            "false" => Token::Bool(false),
            "print" => Token::Print,
            _ => Token::Ident(ident),
        }
    }

    fn read_operator(&mut self) -> Option<Token> {
        let ch = self.current()?;
        let next = self.peek();

        let (token, width) = match (ch, next) {
            ('=', Some('=')) => (Token::EqEq, 2),
            ('!', Some('=')) => (Token::NotEq, 2),
            ('<', Some('=')) => (Token::LtEq, 2),
            ('>', Some('=')) => (Token::GtEq, 2),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('^', _) => (Token::Caret, 1),
            ('=', _) => (Token::Assign, 1),
            ('<', _) => (Token::Lt, 1),
            ('>', _) => (Token::Gt, 1),
            (';', _) => (Token::Semicolon, 1),
            (',', _) => (Token::Comma, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('[', _) => (Token::LBracket, 1),
            (']', _) => (Token::RBracket, 1),
            ('{', _) => (Token::LBrace, 1),
            ('}', _) => (Token::RBrace, 1),
            _ => return None,
        };

        for _ in 0..width {
            self.advance();
        }

        Some(token)
    }

    pub fn tokenize(&mut self) -> Result<Vec<Spanned>, LexerError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();
            let span = self.span();

            match self.current() {
                None => {
                    tokens.push(Spanned {
                        token: Token::Eof,
                        span,
                    });
                    break;
                }
                Some('/') if self.peek() == Some('/') => {
                    let token = self.read_line_comment();
                    tokens.push(Spanned { token, span });
                }
                Some('/') if self.peek() == Some('*') => {
                    let token = self.read_block_comment()?;
                    tokens.push(Spanned { token, span });
                }
                Some('"') => {
                    let token = self.read_string()?;
                    tokens.push(Spanned { token, span });
                }
                Some('.') if self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) => {
                    let token = self.read_number()?;
                    tokens.push(Spanned { token, span });
                }
                Some(ch) if ch.is_ascii_digit() => {
                    let token = self.read_number()?;
                    tokens.push(Spanned { token, span });
                }
                Some(ch) if ch.is_ascii_alphabetic() || ch == '_' => {
                    let token = self.read_identifier();
                    tokens.push(Spanned { token, span });
                }
                Some(ch) => match self.read_operator() {
                    Some(token) => tokens.push(Spanned { token, span }),
                    None => {
                        return Err(self.error_at(format!("unexpected character: '{}'", ch), span));
                    }
                },
            }
        }

        Ok(tokens)
    }

    pub fn tokenize_clean(&mut self) -> Result<Vec<Spanned>, LexerError> {
        let tokens = self.tokenize()?;
        Ok(tokens
            .into_iter()
            .filter(|t| !matches!(t.token, Token::Comment(_)))
            .collect())
    }
}

/// Quotes `s` as a string literal the lexer reads back unchanged.
///
/// Only the escapes `read_string` understands are produced; other
/// characters, control characters included, are written as-is.
pub fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}
