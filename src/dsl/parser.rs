use super::ast::*;
use super::error::CompileError;
use super::lexer::{SpannedToken, Token};

pub fn parse(tokens: Vec<SpannedToken>) -> Result<Program, Vec<CompileError>> {
    let mut parser = Parser::new(tokens);
    parser.parse_program()
}

/// Deepest recursion of statements and sub-expressions the parser enters.
const MAX_DEPTH: usize = 64;

/// Tallest expression tree the parser builds. The compiler walks trees
/// recursively, so this bounds its stack use.
const MAX_HEIGHT: usize = 256;

struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
    errors: Vec<CompileError>,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<SpannedToken>) -> Self {
        Self {
            tokens,
            pos: 0,
            errors: Vec::new(),
            depth: 0,
        }
    }

    fn parse_program(&mut self) -> Result<Program, Vec<CompileError>> {
        let mut body = Vec::new();

        self.skip_terminators();

        while !self.at_eof() {
            match self.parse_stmt() {
                Ok(s) => body.push(s),
                Err(e) => {
                    self.errors.push(e);
                    self.recover(false);
                }
            }
            self.skip_terminators();
        }

        if self.errors.is_empty() {
            Ok(Program { body })
        } else {
            Err(std::mem::take(&mut self.errors))
        }
    }

    // ── Helpers ────────────────────────────────────────────────────

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).map_or(&Token::Eof, |t| &t.token)
    }

    fn span(&self) -> Span {
        self.tokens.get(self.pos).map_or(
            Span::new(0, 0),
            |t| t.span,
        )
    }

    /// Span of the most recently consumed token.
    fn prev_span(&self) -> Span {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(Span::new(0, 0), |t| t.span)
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    fn advance(&mut self) -> &SpannedToken {
        let tok = &self.tokens[self.pos];
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: &Token) -> Result<Span, CompileError> {
        if self.peek() == expected {
            let sp = self.span();
            self.advance();
            Ok(sp)
        } else {
            Err(CompileError::parser(
                format!("Expected {expected:?}, got {:?}", self.peek()),
                self.span(),
            ))
        }
    }

    fn expect_ident(&mut self) -> Result<(String, Span), CompileError> {
        if let Token::Ident(name) = self.peek().clone() {
            let sp = self.span();
            self.advance();
            Ok((name, sp))
        } else {
            Err(CompileError::parser(
                format!("Expected identifier, got {:?}", self.peek()),
                self.span(),
            ))
        }
    }

    fn skip_terminators(&mut self) {
        while matches!(self.peek(), Token::Semicolon | Token::Newline) {
            self.advance();
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), Token::Newline) {
            self.advance();
        }
    }

    /// A statement ends at `;`, a line break, a closing brace or end of input.
    /// Only `;` and line breaks are consumed.
    fn expect_terminator(&mut self) -> Result<(), CompileError> {
        match self.peek() {
            Token::Semicolon | Token::Newline => {
                self.advance();
                Ok(())
            }
            Token::RBrace | Token::Eof => Ok(()),
            other => Err(CompileError::parser(
                format!("Expected ';' or end of line, got {other:?}"),
                self.span(),
            )),
        }
    }

    fn at_terminator(&self) -> bool {
        matches!(
            self.peek(),
            Token::Semicolon | Token::Newline | Token::RBrace | Token::Eof
        )
    }

    /// Skip to the end of the broken statement. Inside a block, stop in front
    /// of the closing brace so the block itself still closes.
    fn recover(&mut self, in_block: bool) {
        loop {
            match self.peek() {
                Token::Semicolon | Token::Newline => {
                    self.advance();
                    break;
                }
                Token::Eof => break,
                Token::RBrace if in_block => break,
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// Run `f` one level deeper, failing past `MAX_DEPTH`.
    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, CompileError>,
    ) -> Result<T, CompileError> {
        if self.depth >= MAX_DEPTH {
            return Err(CompileError::parser(
                format!("Expression nested too deeply (max {MAX_DEPTH})"),
                self.span(),
            ));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    /// Height of a new node whose tallest child has height `below`.
    fn node_height(&self, below: usize) -> Result<usize, CompileError> {
        let height = below + 1;
        if height > MAX_HEIGHT {
            return Err(CompileError::parser(
                format!("Expression too long (max depth {MAX_HEIGHT})"),
                self.prev_span(),
            ));
        }
        Ok(height)
    }

    // ── Statements ────────────────────────────────────────────────

    fn parse_block(&mut self) -> Result<Stmt, CompileError> {
        let start = self.expect(&Token::LBrace)?;
        let mut stmts = Vec::new();
        self.skip_terminators();
        while !matches!(self.peek(), Token::RBrace | Token::Eof) {
            match self.parse_stmt() {
                Ok(s) => stmts.push(s),
                Err(e) => {
                    self.errors.push(e);
                    self.recover(true);
                }
            }
            self.skip_terminators();
        }
        let end = self.expect(&Token::RBrace)?;
        Ok(Stmt::Block {
            stmts,
            span: start.merge(end),
        })
    }

    fn parse_stmt(&mut self) -> Result<Stmt, CompileError> {
        self.nested(Self::parse_stmt_kind)
    }

    fn parse_stmt_kind(&mut self) -> Result<Stmt, CompileError> {
        match self.peek() {
            Token::LBrace => self.parse_block(),
            Token::If => self.parse_if(),
            Token::While => self.parse_while(),
            Token::For => self.parse_for(),
            Token::Return => {
                let start = self.span();
                self.advance();
                let value = if self.at_terminator() {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                let span = value.as_ref().map_or(start, |v| start.merge(v.span));
                self.expect_terminator()?;
                Ok(Stmt::Return { value, span })
            }
            _ => {
                let stmt = self.parse_simple_stmt()?;
                self.expect_terminator()?;
                Ok(stmt)
            }
        }
    }

    /// Declarations, assignments, updates and expression statements, without
    /// the trailing terminator. These are also the statements allowed in the
    /// init and update clauses of a `for` header.
    fn parse_simple_stmt(&mut self) -> Result<Stmt, CompileError> {
        let start = self.span();
        match self.peek() {
            Token::Let | Token::Const | Token::Var => {
                let kind = match self.peek() {
                    Token::Const => DeclKind::Const,
                    Token::Var => DeclKind::Var,
                    _ => DeclKind::Let,
                };
                self.advance();
                let (name, name_span) = self.expect_ident()?;
                let value = if matches!(self.peek(), Token::Eq) {
                    self.advance();
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                if kind == DeclKind::Const && value.is_none() {
                    return Err(CompileError::parser(
                        format!("Missing initializer in const declaration of '{name}'"),
                        name_span,
                    ));
                }
                let end = value.as_ref().map_or(name_span, |v| v.span);
                Ok(Stmt::Decl {
                    kind,
                    name,
                    value,
                    span: start.merge(end),
                })
            }
            Token::PlusPlus | Token::MinusMinus => {
                let delta = if matches!(self.peek(), Token::PlusPlus) { 1.0 } else { -1.0 };
                self.advance();
                let target = self.parse_postfix()?;
                Self::check_target(&target)?;
                let span = start.merge(target.span);
                Ok(Stmt::Update { target, delta, span })
            }
            _ => {
                let expr = self.parse_expr()?;
                let op = match self.peek() {
                    Token::Eq => Some(AssignOp::Set),
                    Token::PlusEq => Some(AssignOp::Add),
                    Token::MinusEq => Some(AssignOp::Sub),
                    Token::StarEq => Some(AssignOp::Mul),
                    Token::SlashEq => Some(AssignOp::Div),
                    Token::PercentEq => Some(AssignOp::Mod),
                    Token::PlusPlus | Token::MinusMinus => {
                        let delta = if matches!(self.peek(), Token::PlusPlus) { 1.0 } else { -1.0 };
                        Self::check_target(&expr)?;
                        self.advance();
                        let span = expr.span.merge(self.prev_span());
                        return Ok(Stmt::Update { target: expr, delta, span });
                    }
                    _ => None,
                };
                let Some(op) = op else {
                    return Ok(Stmt::Expr(expr));
                };
                Self::check_target(&expr)?;
                self.advance();
                let value = self.parse_expr()?;
                let span = expr.span.merge(value.span);
                Ok(Stmt::Assign {
                    target: expr,
                    op,
                    value,
                    span,
                })
            }
        }
    }

    fn check_target(target: &Expr) -> Result<(), CompileError> {
        match target.kind {
            ExprKind::Ident(_) | ExprKind::Field { .. } => Ok(()),
            _ => Err(CompileError::parser(
                "Invalid assignment target",
                target.span,
            )),
        }
    }

    /// `( condition )` followed by any line breaks before the body.
    fn parse_condition(&mut self) -> Result<Expr, CompileError> {
        self.expect(&Token::LParen)?;
        let condition = self.parse_expr()?;
        self.expect(&Token::RParen)?;
        self.skip_newlines();
        Ok(condition)
    }

    fn parse_if(&mut self) -> Result<Stmt, CompileError> {
        let start = self.span();
        self.advance(); // skip 'if'
        let condition = self.parse_condition()?;
        let then_branch = Box::new(self.parse_stmt()?);
        let mut end = then_branch.span();

        // `else` may sit on the line after the closing brace.
        let mark = self.pos;
        self.skip_newlines();
        let else_branch = if matches!(self.peek(), Token::Else) {
            self.advance();
            self.skip_newlines();
            let stmt = self.parse_stmt()?;
            end = stmt.span();
            Some(Box::new(stmt))
        } else {
            self.pos = mark;
            None
        };

        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
            span: start.merge(end),
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, CompileError> {
        let start = self.span();
        self.advance(); // skip 'while'
        let condition = self.parse_condition()?;
        let body = Box::new(self.parse_stmt()?);
        let span = start.merge(body.span());
        Ok(Stmt::While { condition, body, span })
    }

    fn parse_for(&mut self) -> Result<Stmt, CompileError> {
        let start = self.span();
        self.advance(); // skip 'for'
        self.expect(&Token::LParen)?;

        let init = if matches!(self.peek(), Token::Semicolon) {
            None
        } else {
            Some(Box::new(self.parse_simple_stmt()?))
        };
        self.expect(&Token::Semicolon)?;

        let condition = if matches!(self.peek(), Token::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(&Token::Semicolon)?;

        let update = if matches!(self.peek(), Token::RParen) {
            None
        } else {
            Some(Box::new(self.parse_simple_stmt()?))
        };
        self.expect(&Token::RParen)?;
        self.skip_newlines();

        let body = Box::new(self.parse_stmt()?);
        let span = start.merge(body.span());
        Ok(Stmt::For {
            init,
            condition,
            update,
            body,
            span,
        })
    }

    // ── Expression parsing (precedence climbing) ──────────────────

    fn parse_expr(&mut self) -> Result<Expr, CompileError> {
        self.nested(Self::parse_ternary)
    }

    fn parse_ternary(&mut self) -> Result<Expr, CompileError> {
        let expr = self.parse_or()?;

        // Ternary operator: condition ? then_expr : else_expr
        if matches!(self.peek(), Token::Question) {
            self.advance(); // skip ?
            let then_expr = self.parse_expr()?;
            self.expect(&Token::Colon)?;
            // Use parse_expr for right-associativity: a ? b : c ? d : e
            let else_expr = self.parse_expr()?;
            self.node_height(expr.height().max(then_expr.height()).max(else_expr.height()))?;
            let span = expr.span.merge(else_expr.span);
            return Ok(Expr {
                kind: ExprKind::Conditional {
                    condition: Box::new(expr),
                    then_expr: Box::new(then_expr),
                    else_expr: Box::new(else_expr),
                },
                span,
            });
        }

        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_and()?;
        let mut height = left.height();
        while matches!(self.peek(), Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            height = self.node_height(height.max(right.height()))?;
            left = Self::logical(LogicalOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_equality()?;
        let mut height = left.height();
        while matches!(self.peek(), Token::And) {
            self.advance();
            let right = self.parse_equality()?;
            height = self.node_height(height.max(right.height()))?;
            left = Self::logical(LogicalOp::And, left, right);
        }
        Ok(left)
    }

    fn logical(op: LogicalOp, left: Expr, right: Expr) -> Expr {
        let span = left.span.merge(right.span);
        Expr {
            kind: ExprKind::Logical {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            span,
        }
    }

    fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
        let span = left.span.merge(right.span);
        Expr {
            kind: ExprKind::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            span,
        }
    }

    fn parse_equality(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_comparison()?;
        let mut height = left.height();
        loop {
            let op = match self.peek() {
                Token::EqEq => BinOp::Eq,
                Token::Ne => BinOp::Ne,
                Token::EqEqEq => BinOp::StrictEq,
                Token::NeEq => BinOp::StrictNe,
                _ => break,
            };
            self.advance();
            let right = self.parse_comparison()?;
            height = self.node_height(height.max(right.height()))?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_add()?;
        let mut height = left.height();
        loop {
            let op = match self.peek() {
                Token::Lt => BinOp::Lt,
                Token::Gt => BinOp::Gt,
                Token::Le => BinOp::Le,
                Token::Ge => BinOp::Ge,
                _ => break,
            };
            self.advance();
            let right = self.parse_add()?;
            height = self.node_height(height.max(right.height()))?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_add(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_mul()?;
        let mut height = left.height();
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_mul()?;
            height = self.node_height(height.max(right.height()))?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_mul(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_power()?;
        let mut height = left.height();
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_power()?;
            height = self.node_height(height.max(right.height()))?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    /// Power operator `**`: right-associative, higher precedence than mul.
    fn parse_power(&mut self) -> Result<Expr, CompileError> {
        let left = self.parse_unary()?;
        if matches!(self.peek(), Token::StarStar) {
            self.advance();
            // Right-associative: recurse into parse_power (not parse_unary)
            let right = self.nested(Self::parse_power)?;
            self.node_height(left.height().max(right.height()))?;
            Ok(Self::binary(BinOp::Pow, left, right))
        } else {
            Ok(left)
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        let op = match self.peek() {
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Plus,
            Token::Bang => UnaryOp::Not,
            _ => return self.parse_postfix(),
        };
        let start = self.span();
        self.advance();
        let operand = self.nested(Self::parse_unary)?;
        self.node_height(operand.height())?;
        let span = start.merge(operand.span);
        Ok(Expr {
            kind: ExprKind::UnaryOp {
                op,
                operand: Box::new(operand),
            },
            span,
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.parse_primary()?;
        let mut height = expr.height();

        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    let (field, field_span) = self.expect_ident()?;
                    height = self.node_height(height)?;
                    let span = expr.span.merge(field_span);
                    expr = Expr {
                        kind: ExprKind::Field {
                            object: Box::new(expr),
                            field,
                        },
                        span,
                    };
                }
                Token::LParen => {
                    self.advance();
                    let args = self.parse_args()?;
                    let below = args.iter().map(Expr::height).fold(height, usize::max);
                    height = self.node_height(below)?;
                    let span = expr.span.merge(self.prev_span());
                    expr = Expr {
                        kind: ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        span,
                    };
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, CompileError> {
        let mut args = Vec::new();
        while !matches!(self.peek(), Token::RParen) {
            args.push(self.parse_expr()?);
            if matches!(self.peek(), Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(&Token::RParen)?;
        Ok(args)
    }

    fn parse_object(&mut self) -> Result<Expr, CompileError> {
        let start = self.expect(&Token::LBrace)?;
        let mut fields = Vec::new();
        self.skip_newlines();
        while !matches!(self.peek(), Token::RBrace) {
            let key_span = self.span();
            let (key, shorthand) = match self.peek().clone() {
                Token::Ident(name) => (name, true),
                Token::String(s) => (s, false),
                other => {
                    return Err(CompileError::parser(
                        format!("Expected property name, got {other:?}"),
                        key_span,
                    ));
                }
            };
            self.advance();
            let value = if matches!(self.peek(), Token::Colon) {
                self.advance();
                self.parse_expr()?
            } else if shorthand {
                // `{ r }` is `{ r: r }`
                Expr {
                    kind: ExprKind::Ident(key.clone()),
                    span: key_span,
                }
            } else {
                return Err(CompileError::parser(
                    format!("Expected ':' after property name, got {:?}", self.peek()),
                    self.span(),
                ));
            };
            fields.push((key, value));
            self.skip_newlines();
            if matches!(self.peek(), Token::Comma) {
                self.advance();
                self.skip_newlines();
            } else {
                break;
            }
        }
        self.skip_newlines();
        let end = self.expect(&Token::RBrace)?;
        self.node_height(fields.iter().map(|(_, v)| v.height()).max().unwrap_or(0))?;
        Ok(Expr {
            kind: ExprKind::Object(fields),
            span: start.merge(end),
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        let span = self.span();
        match self.peek().clone() {
            Token::Number(v) => {
                self.advance();
                Ok(Expr { kind: ExprKind::Number(v), span })
            }
            Token::True => {
                self.advance();
                Ok(Expr { kind: ExprKind::Bool(true), span })
            }
            Token::False => {
                self.advance();
                Ok(Expr { kind: ExprKind::Bool(false), span })
            }
            Token::Null => {
                self.advance();
                Ok(Expr { kind: ExprKind::Null, span })
            }
            Token::Undefined => {
                self.advance();
                Ok(Expr { kind: ExprKind::Undefined, span })
            }
            Token::Ident(name) => {
                self.advance();
                Ok(Expr { kind: ExprKind::Ident(name), span })
            }
            Token::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Token::LBrace => self.parse_object(),
            Token::String(_) => Err(CompileError::parser(
                "String values are not supported; strings may only name object properties",
                span,
            )),
            _ => Err(CompileError::parser(
                format!("Unexpected token: {:?}", self.peek()),
                span,
            )),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dsl::lexer::lex;

    fn parse_str(src: &str) -> Program {
        let tokens = lex(src).unwrap();
        parse(tokens).unwrap()
    }

    fn parse_err(src: &str) -> Vec<CompileError> {
        let tokens = lex(src).unwrap();
        parse(tokens).unwrap_err()
    }

    fn ret_value(program: &Program, idx: usize) -> &Expr {
        match &program.body[idx] {
            Stmt::Return { value: Some(v), .. } => v,
            other => panic!("expected return with value, got {other:?}"),
        }
    }

    #[test]
    fn parse_declarations() {
        let program = parse_str("let a = 1; const b = 2\nvar c");
        assert_eq!(program.body.len(), 3);
        assert!(matches!(program.body[0], Stmt::Decl { kind: DeclKind::Let, .. }));
        assert!(matches!(program.body[1], Stmt::Decl { kind: DeclKind::Const, .. }));
        assert!(matches!(program.body[2], Stmt::Decl { kind: DeclKind::Var, value: None, .. }));
    }

    #[test]
    fn const_requires_initializer() {
        let errs = parse_err("const a;");
        assert!(errs[0].message.contains("Missing initializer"));
    }

    #[test]
    fn parse_field_assignment_ops() {
        let program = parse_str("v.n = 1\nv.n += 2\nv.c.r *= 0.5");
        assert!(matches!(program.body[0], Stmt::Assign { op: AssignOp::Set, .. }));
        assert!(matches!(program.body[1], Stmt::Assign { op: AssignOp::Add, .. }));
        if let Stmt::Assign { target, op, .. } = &program.body[2] {
            assert_eq!(*op, AssignOp::Mul);
            assert!(matches!(target.kind, ExprKind::Field { .. }));
        } else {
            panic!("expected assignment");
        }
    }

    #[test]
    fn parse_updates() {
        let program = parse_str("i++; --j");
        assert!(matches!(program.body[0], Stmt::Update { delta, .. } if delta > 0.0));
        assert!(matches!(program.body[1], Stmt::Update { delta, .. } if delta < 0.0));
    }

    #[test]
    fn invalid_assignment_target() {
        let errs = parse_err("1 = 2");
        assert!(errs[0].message.contains("Invalid assignment target"));
    }

    #[test]
    fn parse_if_else_across_lines() {
        let program = parse_str("if (x > 1)\n{\n return 1\n}\nelse\n{\n return 0\n}");
        assert_eq!(program.body.len(), 1);
        assert!(matches!(program.body[0], Stmt::If { else_branch: Some(_), .. }));
    }

    #[test]
    fn if_without_else_leaves_next_statement() {
        let program = parse_str("if (x) return 1\nreturn 2");
        assert_eq!(program.body.len(), 2);
        assert!(matches!(program.body[0], Stmt::If { else_branch: None, .. }));
    }

    #[test]
    fn parse_for_loop() {
        let program = parse_str("for (let i = 0; i < 4; i++) { v.n += i }");
        if let Stmt::For { init, condition, update, .. } = &program.body[0] {
            assert!(init.is_some());
            assert!(condition.is_some());
            assert!(matches!(update.as_deref(), Some(Stmt::Update { .. })));
        } else {
            panic!("expected for loop");
        }
    }

    #[test]
    fn parse_empty_for_header() {
        let program = parse_str("for (;;) { return 1 }");
        assert!(matches!(
            program.body[0],
            Stmt::For { init: None, condition: None, update: None, .. }
        ));
    }

    #[test]
    fn parse_while_loop() {
        let program = parse_str("while (x < 10) x += 1");
        assert!(matches!(program.body[0], Stmt::While { .. }));
    }

    #[test]
    fn bare_return() {
        let program = parse_str("return\nreturn;");
        assert!(matches!(program.body[0], Stmt::Return { value: None, .. }));
        assert!(matches!(program.body[1], Stmt::Return { value: None, .. }));
    }

    #[test]
    fn parse_object_literal() {
        let program = parse_str("return {\n r: 1,\n \"g\": 0.5,\n b,\n}");
        if let ExprKind::Object(fields) = &ret_value(&program, 0).kind {
            let keys: Vec<&str> = fields.iter().map(|(k, _)| k.as_str()).collect();
            assert_eq!(keys, vec!["r", "g", "b"]);
            assert!(matches!(fields[2].1.kind, ExprKind::Ident(ref n) if n == "b"));
        } else {
            panic!("expected object literal");
        }
    }

    #[test]
    fn brace_at_statement_start_is_block() {
        let program = parse_str("{ let a = 1 }");
        assert!(matches!(program.body[0], Stmt::Block { .. }));
    }

    #[test]
    fn parse_multiline_ternary() {
        let program = parse_str("return v.n < 0.3\n ? 1\n : v.n < 0.6\n ? 0.5\n : 0");
        if let ExprKind::Conditional { else_expr, .. } = &ret_value(&program, 0).kind {
            assert!(matches!(else_expr.kind, ExprKind::Conditional { .. }));
        } else {
            panic!("expected conditional");
        }
    }

    #[test]
    fn parse_multiline_logical() {
        let program = parse_str("return a > 1\n && b < 2\n || c");
        assert!(matches!(
            ret_value(&program, 0).kind,
            ExprKind::Logical { op: LogicalOp::Or, .. }
        ));
    }

    #[test]
    fn parse_call_on_namespace() {
        let program = parse_str("return math.floor(x / 8)");
        if let ExprKind::Call { callee, args } = &ret_value(&program, 0).kind {
            assert_eq!(args.len(), 1);
            assert!(matches!(callee.kind, ExprKind::Field { ref field, .. } if field == "floor"));
        } else {
            panic!("expected call");
        }
    }

    #[test]
    fn parse_power_right_associative() {
        // 2 ** 3 ** 2 should parse as 2 ** (3 ** 2)
        let program = parse_str("return 2 ** 3 ** 2");
        if let ExprKind::BinOp { op: BinOp::Pow, right, .. } = &ret_value(&program, 0).kind {
            assert!(matches!(right.kind, ExprKind::BinOp { op: BinOp::Pow, .. }));
        } else {
            panic!("expected Pow at top level");
        }
    }

    #[test]
    fn parse_mul_binds_tighter_than_add() {
        let program = parse_str("return 1 + 2 * 3");
        if let ExprKind::BinOp { op: BinOp::Add, right, .. } = &ret_value(&program, 0).kind {
            assert!(matches!(right.kind, ExprKind::BinOp { op: BinOp::Mul, .. }));
        } else {
            panic!("expected Add at top level");
        }
    }

    #[test]
    fn parse_strict_equality() {
        let program = parse_str("return a === b");
        assert!(matches!(
            ret_value(&program, 0).kind,
            ExprKind::BinOp { op: BinOp::StrictEq, .. }
        ));
    }

    #[test]
    fn parse_unary_not() {
        let program = parse_str("return !v.in_room");
        assert!(matches!(
            ret_value(&program, 0).kind,
            ExprKind::UnaryOp { op: UnaryOp::Not, .. }
        ));
    }

    #[test]
    fn string_value_rejected() {
        let errs = parse_err("let s = \"hi\"");
        assert!(errs[0].message.contains("String"));
    }

    #[test]
    fn missing_terminator_rejected() {
        let errs = parse_err("let a = 1 let b = 2");
        assert!(errs[0].message.contains("Expected ';'"));
    }

    #[test]
    fn errors_are_collected_across_statements() {
        let errs = parse_err("let = 1\nlet b = )\nreturn 1");
        assert_eq!(errs.len(), 2);
    }

    #[test]
    fn errors_inside_block_recover_to_closing_brace() {
        let errs = parse_err("if (x) {\n let = 1\n}\nreturn 1");
        assert_eq!(errs.len(), 1);
    }

    #[test]
    fn deep_parentheses_rejected() {
        let src = format!("return {}1{}", "(".repeat(10_000), ")".repeat(10_000));
        let errs = parse_err(&src);
        assert_eq!(errs.len(), 1);
        assert!(errs[0].message.contains("nested too deeply"));
    }

    #[test]
    fn deep_unary_chains_rejected() {
        for op in ["- ", "!", "+ "] {
            let errs = parse_err(&format!("return {}1", op.repeat(10_000)));
            assert!(errs[0].message.contains("nested too deeply"), "{op}");
        }
    }

    #[test]
    fn deep_blocks_and_objects_rejected() {
        let errs = parse_err(&format!("{}return 1", "{ ".repeat(10_000)));
        assert!(errs.iter().any(|e| e.message.contains("nested too deeply")));
        let errs = parse_err(&format!("return {}1{}", "{ r: ".repeat(10_000), " }".repeat(10_000)));
        assert!(errs[0].message.contains("nested too deeply"));
    }

    #[test]
    fn long_operator_chains_rejected() {
        let errs = parse_err(&format!("return 1{}", " + 1".repeat(100_000)));
        assert!(errs[0].message.contains("Expression too long"));
        let errs = parse_err(&format!("return v{}", ".r".repeat(100_000)));
        assert!(errs[0].message.contains("Expression too long"));
    }

    #[test]
    fn parenthesized_chains_count_toward_height() {
        // Each group adds a level below the chain that follows it.
        let group = format!("({})", ["1"; 40].join(" + "));
        let src = format!("return {}", [group.as_str(); 10].join(" * "));
        parse_str(&src);
        let nested = (0..10).fold("1".to_string(), |inner, _| format!("({inner}{})", " + 1".repeat(40)));
        let errs = parse_err(&format!("return {nested}"));
        assert!(errs[0].message.contains("Expression too long"));
    }

    #[test]
    fn moderate_nesting_still_parses() {
        let src = format!("return {}x{}", "(".repeat(40), ")".repeat(40));
        assert!(matches!(ret_value(&parse_str(&src), 0).kind, ExprKind::Ident(_)));
        parse_str(&format!("return {}1", "- ".repeat(30)));
        parse_str(&format!("return 1{}", " + 1".repeat(200)));
    }

    #[test]
    fn depth_resets_after_error() {
        let deep = format!("return {}1{}", "(".repeat(100), ")".repeat(100));
        let errs = parse_err(&format!("{deep}\nlet a = ((((1))))\n{deep}"));
        assert_eq!(errs.len(), 2);
    }
}
