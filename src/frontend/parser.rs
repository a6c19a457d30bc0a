use crate::frontend::lexer::{Span, Spanned};
use crate::frontend::parser_error::ParserError;
use crate::frontend::token::Token;
use crate::lang::node::{BinaryOp, Expr, ExprKind, Stmt, StmtKind};
use crate::lang::program::Program;

/// Recursive-descent parser for the config language.
///
/// The parser consumes a stream of lexed `Spanned` tokens and produces a
/// `Program`, one `Stmt` per `;`-terminated statement, in source order.
/// Name resolution is not done here; the compiler does it once the whole
/// fragment is known so forward references work.
///
/// Expression precedence, lowest first:
///
/// ```text
/// comparison   < <= > >= == !=     (non-associative)
/// additive     + -                 (left)
/// term         * /                 (left)
/// power        ^                   (right)
/// unary        -
/// primary      literal | name | name(args) | name[i][j] | ( expr )
/// ```
///
/// Unary minus binds tighter than `^`, so `-2^2` is `(-2)^2`.
pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    /// Span of the most recently consumed token.
    ///
    /// Used to provide stable source locations for errors that occur after
    /// advancing past the last token or at end-of-file.
    last_span: Option<Span>,
}

impl Parser {
    /// Creates a new parser from lexer output.
    ///
    /// Comments are filtered out here; spans come from the original tokens so
    /// line/col information stays intact.
    pub fn new(tokens: Vec<Spanned>) -> Self {
        let tokens: Vec<Spanned> = tokens
            .into_iter()
            .filter(|t| !matches!(t.token, Token::Comment(_)))
            .collect();
        Parser {
            tokens,
            pos: 0,
            last_span: None,
        }
    }

    /// Returns the current token without consuming it.
    fn current(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    /// Advances the token stream by one and returns the consumed token.
    fn advance(&mut self) -> Option<&Spanned> {
        let token = self.tokens.get(self.pos);
        if let Some(s) = token {
            self.last_span = Some(s.span);
        }
        self.pos += 1;
        token
    }

    /// Peeks the current token kind without consuming it.
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    /// Span of the current token, or the last consumed one at EOF.
    fn here(&self) -> Span {
        self.current()
            .map(|s| s.span)
            .or(self.last_span)
            .unwrap_or(Span { line: 1, col: 1 })
    }

    /// Constructs a `ParserError` at the most relevant location.
    ///
    /// Priority:
    /// 1. If `current()` exists and is not EOF, use its span.
    /// 2. Else, use `last_span` (after consuming the last real token).
    /// 3. Else, default to (1,1) for truly empty input.
    fn error(&self, message: &str) -> ParserError {
        let span = match self.current() {
            Some(spanned) if !matches!(spanned.token, Token::Eof) => spanned.span,
            _ => self.last_span.unwrap_or(Span { line: 1, col: 1 }),
        };
        ParserError {
            message: message.to_string(),
            line: span.line,
            col: span.col,
        }
    }

    fn unexpected(&self, expected: &str) -> ParserError {
        match self.peek() {
            Some(Token::Eof) | None => self.error(&format!("unexpected EOF, expected {}", expected)),
            Some(token) => self.error(&format!(
                "unexpected token '{}', expected {}",
                token, expected
            )),
        }
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<(), ParserError> {
        if self.check(&token) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, ParserError> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    /// Parses a complete config source.
    ///
    /// Stray `;` between statements are ignored. The parser stops at
    /// `Token::Eof`.
    pub fn parse(&mut self) -> Result<Program, ParserError> {
        let mut statements = Vec::new();

        while let Some(spanned) = self.current() {
            match spanned.token {
                Token::Eof => break,
                Token::Semicolon => {
                    self.advance();
                }
                _ => statements.push(self.parse_statement()?),
            }
        }

        Ok(Program { statements })
    }

    /// Parses a single standalone expression, used by `Machine::eval`.
    ///
    /// A trailing `;` is tolerated; anything else after the expression is an
    /// error.
    pub fn parse_standalone_expression(&mut self) -> Result<Expr, ParserError> {
        let expr = self.parse_expression()?;
        if self.check(&Token::Semicolon) {
            self.advance();
        }
        if !self.check(&Token::Eof) {
            return Err(self.unexpected("end of expression"));
        }
        Ok(expr)
    }

    /// Parses one statement:
    ///
    /// ```text
    /// print expr ;
    /// name = expr ;
    /// name = { (x, y) (x, y) .. } ;
    /// name = [ e, e, .. ] ;          name = { e, e, .. } ;
    /// name ( p, .. ) = expr ;
    /// name [n][m] = [ e, .. ] ;
    /// name [i][j] = expr ;
    /// ```
    fn parse_statement(&mut self) -> Result<Stmt, ParserError> {
        let span = self.here();

        if self.check(&Token::Print) {
            self.advance(); // consume 'print'
            let expr = self.parse_expression()?;
            self.expect(Token::Semicolon, "';' after print statement")?;
            return Ok(Stmt {
                kind: StmtKind::Print(expr),
                span,
            });
        }

        let name = self.expect_ident("a name at the start of a statement")?;

        let kind = match self.peek() {
            Some(Token::Assign) => {
                self.advance(); // consume '='
                match self.peek() {
                    Some(Token::LBrace) => self.parse_brace_initializer(name)?,
                    Some(Token::LBracket) => StmtKind::Array {
                        name,
                        sizes: None,
                        elements: self.parse_bracket_initializer()?,
                    },
                    _ => StmtKind::Scalar {
                        name,
                        value: self.parse_expression()?,
                    },
                }
            }
            Some(Token::LParen) => {
                let params = self.parse_parameters()?;
                self.expect(Token::Assign, "'=' after function parameters")?;
                let body = self.parse_expression()?;
                StmtKind::Function { name, params, body }
            }
            Some(Token::LBracket) => {
                let indices = self.parse_index_groups()?;
                self.expect(Token::Assign, "'=' after array subscript")?;
                match self.peek() {
                    Some(Token::LBracket) => StmtKind::Array {
                        name,
                        sizes: Some(indices),
                        elements: self.parse_bracket_initializer()?,
                    },
                    Some(Token::LBrace) => match self.parse_brace_initializer(name)? {
                        StmtKind::Array { name, elements, .. } => StmtKind::Array {
                            name,
                            sizes: Some(indices),
                            elements,
                        },
                        _ => {
                            return Err(ParserError {
                                message: "a sized array cannot be initialized with points"
                                    .to_string(),
                                line: span.line,
                                col: span.col,
                            });
                        }
                    },
                    _ => StmtKind::ElementAssign {
                        name,
                        indices,
                        value: self.parse_expression()?,
                    },
                }
            }
            _ => return Err(self.unexpected("'=', '(' or '[' after name")),
        };

        self.expect(Token::Semicolon, "';' at end of statement")?;
        Ok(Stmt { kind, span })
    }

    /// Parses a formal parameter list: `( a, b, c )`. At least one name.
    fn parse_parameters(&mut self) -> Result<Vec<String>, ParserError> {
        self.advance(); // consume '('

        let mut params = vec![self.expect_ident("a parameter name")?];
        while self.check(&Token::Comma) {
            self.advance();
            params.push(self.expect_ident("a parameter name")?);
        }

        self.expect(Token::RParen, "')' after parameters")?;
        Ok(params)
    }

    /// Parses one or more subscript groups and flattens them:
    /// `[i][j]`, `[i, j]` and `[i, j][k]` are all accepted.
    fn parse_index_groups(&mut self) -> Result<Vec<Expr>, ParserError> {
        let mut indices = Vec::new();

        while self.check(&Token::LBracket) {
            self.advance(); // consume '['
            indices.push(self.parse_expression()?);
            while self.check(&Token::Comma) {
                self.advance();
                indices.push(self.parse_expression()?);
            }
            self.expect(Token::RBracket, "']' after subscript")?;
        }

        Ok(indices)
    }

    /// Parses `[ e, e, .. ]`. A trailing comma is allowed; the list may not
    /// be empty.
    fn parse_bracket_initializer(&mut self) -> Result<Vec<Expr>, ParserError> {
        self.advance(); // consume '['
        self.parse_element_list(Token::RBracket, "']'")
    }

    fn parse_element_list(
        &mut self,
        close: Token,
        close_name: &str,
    ) -> Result<Vec<Expr>, ParserError> {
        if self.check(&close) {
            return Err(self.error("array initializer must have at least one element"));
        }

        let mut elements = Vec::new();
        loop {
            elements.push(self.parse_expression()?);

            if self.check(&Token::Comma) {
                self.advance();
                if self.check(&close) {
                    break;
                }
            } else {
                break;
            }
        }

        if !self.check(&close) {
            return Err(self.unexpected(&format!("',' or {}", close_name)));
        }
        self.advance();
        Ok(elements)
    }

    /// Parses the right-hand side starting at `{`.
    ///
    /// `{ (x, y) .. }` is a piecewise-linear table; anything else is an array
    /// initializer. The two are told apart by looking for a comma directly
    /// inside the first parenthesis: `{ (1 + 2), 3 }` is an array.
    fn parse_brace_initializer(&mut self, name: String) -> Result<StmtKind, ParserError> {
        self.advance(); // consume '{'

        if self.looks_like_point() {
            let points = self.parse_points()?;
            Ok(StmtKind::Pwl { name, points })
        } else {
            let elements = self.parse_element_list(Token::RBrace, "'}'")?;
            Ok(StmtKind::Array {
                name,
                sizes: None,
                elements,
            })
        }
    }

    fn looks_like_point(&mut self) -> bool {
        if !self.check(&Token::LParen) {
            return false;
        }

        let saved_pos = self.pos;
        let saved_span = self.last_span;

        self.advance(); // consume '('
        let is_point = self.parse_expression().is_ok() && self.check(&Token::Comma);

        self.pos = saved_pos;
        self.last_span = saved_span;
        is_point
    }

    /// Parses `(x, y) (x, y) .. }` with optional commas between points.
    fn parse_points(&mut self) -> Result<Vec<(Expr, Expr)>, ParserError> {
        let mut points = Vec::new();

        loop {
            self.expect(Token::LParen, "'(' to start a point")?;
            let x = self.parse_expression()?;
            self.expect(Token::Comma, "',' between point coordinates")?;
            let y = self.parse_expression()?;
            self.expect(Token::RParen, "')' to close a point")?;
            points.push((x, y));

            if self.check(&Token::Comma) {
                self.advance();
            }
            if self.check(&Token::RBrace) {
                self.advance();
                return Ok(points);
            }
            if !self.check(&Token::LParen) {
                return Err(self.unexpected("'(' or '}'"));
            }
        }
    }

    pub fn parse_expression(&mut self) -> Result<Expr, ParserError> {
        self.parse_comparison()
    }

    fn comparison_op(&self) -> Option<BinaryOp> {
        match self.peek()? {
            Token::Lt => Some(BinaryOp::Lt),
            Token::LtEq => Some(BinaryOp::Le),
            Token::Gt => Some(BinaryOp::Gt),
            Token::GtEq => Some(BinaryOp::Ge),
            Token::EqEq => Some(BinaryOp::Eq),
            Token::NotEq => Some(BinaryOp::Ne),
            _ => None,
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParserError> {
        let lhs = self.parse_additive()?;

        let Some(op) = self.comparison_op() else {
            return Ok(lhs);
        };
        self.advance();
        let rhs = self.parse_additive()?;

        if self.comparison_op().is_some() {
            return Err(self.error("comparison operators cannot be chained"));
        }

        let span = lhs.span;
        Ok(Expr::new(
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            span,
        ))
    }

    fn parse_additive(&mut self) -> Result<Expr, ParserError> {
        let mut lhs = self.parse_term()?;

        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_term()?;
            let span = lhs.span;
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
    }

    fn parse_term(&mut self) -> Result<Expr, ParserError> {
        let mut lhs = self.parse_power()?;

        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_power()?;
            let span = lhs.span;
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
    }

    fn parse_power(&mut self) -> Result<Expr, ParserError> {
        let base = self.parse_unary()?;

        if !self.check(&Token::Caret) {
            return Ok(base);
        }
        self.advance(); // consume '^'
        let exponent = self.parse_power()?;

        let span = base.span;
        Ok(Expr::new(
            ExprKind::Binary {
                op: BinaryOp::Pow,
                lhs: Box::new(base),
                rhs: Box::new(exponent),
            },
            span,
        ))
    }

    fn parse_unary(&mut self) -> Result<Expr, ParserError> {
        if self.check(&Token::Minus) {
            let span = self.here();
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::new(ExprKind::Negate(Box::new(operand)), span));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ParserError> {
        let span = self.here();

        let kind = match self.peek() {
            Some(Token::Integer(n)) => {
                let n = *n;
                self.advance();
                ExprKind::Int(n)
            }
            Some(Token::Float(x)) => {
                let x = *x;
                self.advance();
                ExprKind::Double(x)
            }
            Some(Token::String(s)) => {
                let s = s.clone();
                self.advance();
                ExprKind::Str(s)
            }
            Some(Token::Bool(b)) => {
                let b = *b;
                self.advance();
                ExprKind::Bool(b)
            }
            Some(Token::LParen) => {
                self.advance(); // consume '('
                let inner = self.parse_expression()?;
                self.expect(Token::RParen, "')'")?;
                return Ok(inner);
            }
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.advance();
                match self.peek() {
                    Some(Token::LParen) => ExprKind::Call {
                        name,
                        args: self.parse_arguments()?,
                    },
                    Some(Token::LBracket) => ExprKind::Index {
                        name,
                        indices: self.parse_index_groups()?,
                    },
                    _ => ExprKind::Name(name),
                }
            }
            _ => return Err(self.unexpected("an expression")),
        };

        Ok(Expr::new(kind, span))
    }

    /// Parses `( e, e, .. )`; an empty list is syntactically fine and
    /// rejected later by the arity check.
    fn parse_arguments(&mut self) -> Result<Vec<Expr>, ParserError> {
        self.advance(); // consume '('

        let mut args = Vec::new();
        if self.check(&Token::RParen) {
            self.advance();
            return Ok(args);
        }

        args.push(self.parse_expression()?);
        while self.check(&Token::Comma) {
            self.advance();
            args.push(self.parse_expression()?);
        }

        self.expect(Token::RParen, "')' after arguments")?;
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;

    fn parse(source: &str) -> Program {
        let mut lexer = Lexer::new(source);
        let tokens = lexer.tokenize().unwrap();
        let mut parser = Parser::new(tokens);
        parser.parse().unwrap()
    }

    fn parse_err(source: &str) -> ParserError {
        let mut lexer = Lexer::new(source);
        let tokens = lexer.tokenize().unwrap();
        let mut parser = Parser::new(tokens);
        parser.parse().unwrap_err()
    }

    fn expr(source: &str) -> Expr {
        let tokens = Lexer::new(source).tokenize().unwrap();
        Parser::new(tokens).parse_standalone_expression().unwrap()
    }

    /// Renders an expression fully parenthesized, to make precedence visible.
    fn shape(e: &Expr) -> String {
        match &e.kind {
            ExprKind::Int(n) => n.to_string(),
            ExprKind::Double(x) => x.to_string(),
            ExprKind::Str(s) => format!("{:?}", s),
            ExprKind::Bool(b) => b.to_string(),
            ExprKind::Name(n) => n.clone(),
            ExprKind::Call { name, args } => format!(
                "{}({})",
                name,
                args.iter().map(shape).collect::<Vec<_>>().join(", ")
            ),
            ExprKind::Index { name, indices } => format!(
                "{}[{}]",
                name,
                indices.iter().map(shape).collect::<Vec<_>>().join(", ")
            ),
            ExprKind::Negate(inner) => format!("(-{})", shape(inner)),
            ExprKind::Binary { op, lhs, rhs } => {
                format!("({} {} {})", shape(lhs), op.symbol(), shape(rhs))
            }
        }
    }

    #[test]
    fn test_scalar_statement() {
        let program = parse(r#"model = "GFS";"#);
        assert_eq!(program.statements.len(), 1);
        assert!(matches!(
            &program.statements[0].kind,
            StmtKind::Scalar { name, value } if name == "model"
                && matches!(&value.kind, ExprKind::Str(s) if s == "GFS")
        ));
    }

    #[test]
    fn test_function_statement() {
        let program = parse("f(x, y) = x * y + 1;");
        match &program.statements[0].kind {
            StmtKind::Function { name, params, body } => {
                assert_eq!(name, "f");
                assert_eq!(params, &vec!["x".to_string(), "y".to_string()]);
                assert_eq!(shape(body), "((x * y) + 1)");
            }
            other => panic!("expected function, got {:?}", other),
        }
    }

    #[test]
    fn test_pwl_with_and_without_commas() {
        for src in ["p = {(0,0)(10,100)};", "p = { (0, 0), (10, 100), };"] {
            let program = parse(src);
            match &program.statements[0].kind {
                StmtKind::Pwl { name, points } => {
                    assert_eq!(name, "p");
                    assert_eq!(points.len(), 2);
                }
                other => panic!("expected pwl for {}, got {:?}", src, other),
            }
        }
    }

    #[test]
    fn test_brace_array_starting_with_parenthesis() {
        let program = parse("a = { (1 + 2), 3 };");
        assert!(matches!(
            &program.statements[0].kind,
            StmtKind::Array { sizes: None, elements, .. } if elements.len() == 2
        ));
    }

    #[test]
    fn test_bracket_array_trailing_comma() {
        let program = parse(r#"fields = [ "TMP", "RH", ];"#);
        assert!(matches!(
            &program.statements[0].kind,
            StmtKind::Array { sizes: None, elements, .. } if elements.len() == 2
        ));
    }

    #[test]
    fn test_sized_array_both_subscript_styles() {
        for src in ["m[2][3] = [1, 2];", "m[2, 3] = [1, 2];"] {
            let program = parse(src);
            match &program.statements[0].kind {
                StmtKind::Array {
                    sizes: Some(sizes),
                    elements,
                    ..
                } => {
                    assert_eq!(sizes.len(), 2);
                    assert_eq!(elements.len(), 2);
                }
                other => panic!("expected sized array for {}, got {:?}", src, other),
            }
        }
    }

    #[test]
    fn test_element_assignment() {
        let program = parse("m[1][2] = 7.5;");
        assert!(matches!(
            &program.statements[0].kind,
            StmtKind::ElementAssign { name, indices, .. } if name == "m" && indices.len() == 2
        ));
    }

    #[test]
    fn test_print_statement() {
        let program = parse("print 1 + 2;");
        assert!(matches!(&program.statements[0].kind, StmtKind::Print(_)));
    }

    #[test]
    fn test_stray_semicolons_ignored() {
        let program = parse(";; a = 1;; b = 2;");
        assert_eq!(program.statements.len(), 2);
    }

    #[test]
    fn test_comments_are_skipped() {
        let program = parse("// header\na = 1; /* between */ b = a;");
        assert_eq!(program.statements.len(), 2);
    }

    #[test]
    fn test_precedence() {
        assert_eq!(shape(&expr("1 + 2 * 3")), "(1 + (2 * 3))");
        assert_eq!(shape(&expr("(1 + 2) * 3")), "((1 + 2) * 3)");
        assert_eq!(shape(&expr("8 / 4 / 2")), "((8 / 4) / 2)");
        assert_eq!(shape(&expr("2 ^ 3 ^ 2")), "(2 ^ (3 ^ 2))");
        assert_eq!(shape(&expr("-2 ^ 2")), "((-2) ^ 2)");
        assert_eq!(shape(&expr("2 ^ -1")), "(2 ^ (-1))");
        assert_eq!(shape(&expr("a + 1 > b * 2")), "((a + 1) > (b * 2))");
    }

    #[test]
    fn test_calls_and_indexing() {
        assert_eq!(shape(&expr("max(a, b[1][2])")), "max(a, b[1, 2])");
        assert_eq!(shape(&expr("g[i, j + 1]")), "g[i, (j + 1)]");
        assert_eq!(shape(&expr("f()")), "f()");
    }

    #[test]
    fn test_chained_comparison_is_an_error() {
        let tokens = Lexer::new("1 < 2 < 3").tokenize().unwrap();
        let err = Parser::new(tokens)
            .parse_standalone_expression()
            .unwrap_err();
        assert!(err.message.contains("cannot be chained"));
    }

    #[test]
    fn test_statement_spans() {
        let program = parse("a = 1;\n  b = 2;");
        assert_eq!(program.statements[1].span, Span { line: 2, col: 3 });
    }

    #[test]
    fn test_missing_semicolon() {
        let err = parse_err("a = 1\nb = 2;");
        assert!(err.message.contains("expected ';'"), "msg = {}", err.message);
        assert_eq!((err.line, err.col), (2, 1));
    }

    #[test]
    fn test_missing_semicolon_at_eof_points_at_last_token() {
        let err = parse_err("a = 1 +\n  2");
        assert!(err.message.contains("unexpected EOF"), "msg = {}", err.message);
        assert_eq!((err.line, err.col), (2, 3));
    }

    #[test]
    fn test_empty_array_initializer() {
        let err = parse_err("a = [];");
        assert!(err.message.contains("at least one element"));
    }

    #[test]
    fn test_bad_statement_start() {
        let err = parse_err("42 = x;");
        assert!(err.message.contains("expected a name"));
        assert_eq!((err.line, err.col), (1, 1));
    }

    #[test]
    fn test_name_without_assignment() {
        let err = parse_err("a;");
        assert!(err.message.contains("'=', '(' or '['"));
    }

    #[test]
    fn test_function_needs_parameters() {
        let err = parse_err("f() = 1;");
        assert!(err.message.contains("parameter name"));
    }

    #[test]
    fn test_sized_array_with_points_is_an_error() {
        let err = parse_err("a[2] = { (0, 1) (1, 2) };");
        assert!(err.message.contains("cannot be initialized with points"));
    }

    #[test]
    fn test_unterminated_point_list() {
        let err = parse_err("p = { (0, 1) (1, 2)");
        assert!(err.message.contains("unexpected EOF"));
    }

    #[test]
    fn test_trailing_garbage_after_expression() {
        let tokens = Lexer::new("1 + 2 3").tokenize().unwrap();
        let err = Parser::new(tokens)
            .parse_standalone_expression()
            .unwrap_err();
        assert!(err.message.contains("end of expression"));
    }
}
