//! Recursive-descent parser.

use super::ast::{Block, Expr, ExprKind, FnLiteral, Param, Stmt, TypeExpr};
use super::lexer::tokenize;
use super::token::Token;
use super::ParseError;

/// Parse a whole program into its top-level block.
pub fn parse_program(source: &str) -> Result<Block, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        self.tokens.get(self.pos + ahead).unwrap_or(&Token::Eof)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, expected: &str) -> Result<(), ParseError> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        ParseError::UnexpectedToken {
            found: self.peek().to_string(),
            expected: expected.to_owned(),
        }
    }

    fn identifier(&mut self, expected: &str) -> Result<String, ParseError> {
        match self.peek().clone() {
            Token::Ident(name) => {
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn skip_newlines(&mut self) {
        while self.eat(&Token::Newline) {}
    }

    fn program(&mut self) -> Result<Block, ParseError> {
        let mut stmts = Vec::new();
        self.skip_newlines();
        while !matches!(self.peek(), Token::Eof) {
            stmts.push(self.statement()?);
            self.terminator()?;
            self.skip_newlines();
        }
        Ok(Block { stmts })
    }

    /// Consume the end of a top-level statement.
    fn terminator(&mut self) -> Result<(), ParseError> {
        match self.peek() {
            Token::Newline | Token::Semicolon => {
                self.pos += 1;
                Ok(())
            }
            Token::Eof => Ok(()),
            _ => Err(self.unexpected("end of statement")),
        }
    }

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        match self.peek().clone() {
            Token::Let => {
                self.pos += 1;
                let name = self.identifier("variable name")?;
                self.expect(Token::Eq, "'='")?;
                let value = self.expression()?;
                Ok(Stmt::Let { name, value })
            }
            Token::If => self.if_statement(),
            Token::While => {
                self.pos += 1;
                let cond = self.expression()?;
                self.expect(Token::Colon, "':'")?;
                let body = self.block()?;
                Ok(Stmt::While { cond, body })
            }
            Token::Return => {
                self.pos += 1;
                Ok(Stmt::Return(self.expression()?))
            }
            Token::Ident(name) if matches!(self.peek_at(1), Token::Eq) => {
                self.pos += 2;
                let value = self.expression()?;
                Ok(Stmt::Set { name, value })
            }
            _ => Ok(Stmt::Expr(self.expression()?)),
        }
    }

    fn if_statement(&mut self) -> Result<Stmt, ParseError> {
        self.pos += 1; // 'if'
        let cond = self.expression()?;
        self.expect(Token::Colon, "':'")?;
        let then_block = self.block()?;
        let else_block = if self.else_follows() {
            self.pos += 1; // 'else'
            if matches!(self.peek(), Token::If) {
                // `else if` chains as an else block holding one if.
                Some(Block {
                    stmts: vec![self.if_statement()?],
                })
            } else {
                self.expect(Token::Colon, "':'")?;
                Some(self.block()?)
            }
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_block,
            else_block,
        })
    }

    /// True when an `else` clause follows, consuming the newline that
    /// may separate it from the then-block.
    fn else_follows(&mut self) -> bool {
        if matches!(self.peek(), Token::Else) {
            return true;
        }
        if matches!(self.peek(), Token::Newline) && matches!(self.peek_at(1), Token::Else) {
            self.pos += 1;
            return true;
        }
        false
    }

    /// A block after `:` — indented, or inline on the same line.
    fn block(&mut self) -> Result<Block, ParseError> {
        let mut stmts = Vec::new();
        if self.eat(&Token::Indent) {
            loop {
                stmts.push(self.statement()?);
                match self.peek() {
                    Token::Newline | Token::Semicolon => {
                        self.pos += 1;
                    }
                    Token::Dedent => {
                        self.pos += 1;
                        break;
                    }
                    Token::Eof => break,
                    _ => return Err(self.unexpected("end of statement")),
                }
            }
        } else {
            loop {
                stmts.push(self.statement()?);
                if self.eat(&Token::Semicolon) {
                    if matches!(
                        self.peek(),
                        Token::Newline | Token::Dedent | Token::Eof | Token::Else
                    ) {
                        break;
                    }
                    continue;
                }
                break;
            }
        }
        Ok(Block { stmts })
    }

    // ── Expressions ─────────────────────────────────────────────────

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.and_expr()?;
        while self.eat(&Token::Or) {
            let rhs = self.and_expr()?;
            lhs = binary("or", lhs, rhs);
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.not_expr()?;
        while self.eat(&Token::And) {
            let rhs = self.not_expr()?;
            lhs = binary("and", lhs, rhs);
        }
        Ok(lhs)
    }

    fn not_expr(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&Token::Not) {
            let operand = self.not_expr()?;
            Ok(Expr::new(ExprKind::Unary {
                op: "not".to_owned(),
                expr: Box::new(operand),
            }))
        } else {
            self.comparison()
        }
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.additive()?;
        let op = match self.peek() {
            Token::EqEq => "==",
            Token::BangEq => "!=",
            Token::Lt => "<",
            Token::Gt => ">",
            Token::Le => "<=",
            Token::Ge => ">=",
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.additive()?;
        Ok(binary(op, lhs, rhs))
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => "+",
                Token::Minus => "-",
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.power()?;
        loop {
            let op = match self.peek() {
                Token::Star => "*",
                Token::Slash => "/",
                Token::Percent => "%",
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.power()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn power(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.unary()?;
        if self.eat(&Token::Caret) {
            let rhs = self.power()?; // right-associative
            Ok(binary("^", lhs, rhs))
        } else {
            Ok(lhs)
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&Token::Minus) {
            let operand = self.unary()?;
            Ok(Expr::new(ExprKind::Unary {
                op: "-".to_owned(),
                expr: Box::new(operand),
            }))
        } else {
            self.postfix()
        }
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Token::LParen) {
                let mut args = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.expression()?);
                        if self.eat(&Token::Comma) {
                            continue;
                        }
                        self.expect(Token::RParen, "')'")?;
                        break;
                    }
                }
                expr = Expr::new(ExprKind::Call {
                    callee: Box::new(expr),
                    args,
                });
            } else if self.eat(&Token::LBracket) {
                let index = self.expression()?;
                self.expect(Token::RBracket, "']'")?;
                expr = binary("index", expr, index);
            } else if self.eat(&Token::Dot) {
                let name = self.identifier("method name")?;
                expr = Expr::new(ExprKind::Prop {
                    object: Box::new(expr),
                    name,
                });
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        match self.peek().clone() {
            Token::Int(value) => {
                self.pos += 1;
                Ok(Expr::new(ExprKind::Int(value)))
            }
            Token::Real(value) => {
                self.pos += 1;
                Ok(Expr::new(ExprKind::Real(value)))
            }
            Token::Str(value) => {
                self.pos += 1;
                Ok(Expr::new(ExprKind::Str(value)))
            }
            Token::Nil => {
                self.pos += 1;
                Ok(Expr::new(ExprKind::Sym("nil".to_owned())))
            }
            Token::True => {
                self.pos += 1;
                Ok(Expr::new(ExprKind::Sym("true".to_owned())))
            }
            Token::False => {
                self.pos += 1;
                Ok(Expr::new(ExprKind::Sym("false".to_owned())))
            }
            Token::Ident(name) => {
                self.pos += 1;
                Ok(Expr::new(ExprKind::Id(name)))
            }
            Token::LParen => {
                self.pos += 1;
                let expr = self.expression()?;
                self.expect(Token::RParen, "')'")?;
                Ok(expr)
            }
            Token::LBracket => {
                self.pos += 1;
                let mut items = Vec::new();
                if !self.eat(&Token::RBracket) {
                    loop {
                        items.push(self.expression()?);
                        if self.eat(&Token::Comma) {
                            continue;
                        }
                        self.expect(Token::RBracket, "']'")?;
                        break;
                    }
                }
                Ok(Expr::new(ExprKind::List(items)))
            }
            Token::Fn => {
                self.pos += 1;
                self.function_literal()
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    fn function_literal(&mut self) -> Result<Expr, ParseError> {
        self.expect(Token::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                let name = self.identifier("parameter name")?;
                self.expect(Token::Colon, "':'")?;
                let ty = self.type_expr()?;
                params.push(Param { name, ty });
                if self.eat(&Token::Comma) {
                    continue;
                }
                self.expect(Token::RParen, "')'")?;
                break;
            }
        }
        self.expect(Token::Arrow, "'->'")?;
        let result = self.type_expr()?;
        self.expect(Token::Colon, "':'")?;
        let body = self.block()?;
        Ok(Expr::new(ExprKind::Function(FnLiteral {
            params,
            result,
            body,
            proto: None,
        })))
    }

    fn type_expr(&mut self) -> Result<TypeExpr, ParseError> {
        Ok(TypeExpr::Name(self.identifier("type name")?))
    }
}

fn binary(op: &str, lhs: Expr, rhs: Expr) -> Expr {
    Expr::new(ExprKind::Binary {
        op: op.to_owned(),
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    })
}
