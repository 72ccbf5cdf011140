//! Pratt parser
//!
//! Statements are dispatched on the leading token (with one token of
//! lookahead to tell assignments and postfix statements from expression
//! statements); expressions use precedence climbing. Semicolons after
//! statements are optional.

use crate::ast::{
    AssignOp, Block, Expr, FunctionLit, InfixOp, PostfixOp, PrefixOp, Program, Span, Stmt,
};
use crate::error::{CompileError, Result};
use crate::lexer::Token;
use std::collections::HashMap;


/// Parse tokens into AST
pub fn parse(_filename: &str, _source: &str, tokens: Vec<(Token, Span)>) -> Result<Program> {
    Parser { tokens, pos: 0 }.parse_program()
}

/// Binding strength, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    Or,
    And,
    Equals,
    LessGreater,
    Sum,
    Product,
    Prefix,
    Call,
    Index,
}

fn token_precedence(token: &Token) -> Precedence {
    match token {
        Token::PipePipe => Precedence::Or,
        Token::AmpAmp => Precedence::And,
        Token::EqEq | Token::NotEq => Precedence::Equals,
        Token::Lt | Token::Gt | Token::LtEq | Token::GtEq => Precedence::LessGreater,
        Token::Plus | Token::Minus => Precedence::Sum,
        Token::Star | Token::Slash => Precedence::Product,
        Token::LParen => Precedence::Call,
        Token::LBracket => Precedence::Index,
        _ => Precedence::Lowest,
    }
}

struct Parser {
    tokens: Vec<(Token, Span)>,
    pos: usize,
}

impl Parser {
    fn parse_program(&mut self) -> Result<Program> {
        let mut statements = Vec::new();
        while self.pos < self.tokens.len() {
            statements.push(self.parse_statement()?);
        }
        Ok(Program { statements })
    }

    /*
     * Statements
     */

    fn parse_statement(&mut self) -> Result<Stmt> {
        match (self.current(), self.peek()) {
            (Some(Token::Let), _) => self.parse_binding(false),
            (Some(Token::Const), _) => self.parse_binding(true),
            (Some(Token::Return), _) => self.parse_return(),

            (Some(Token::PlusPlus), _) | (Some(Token::MinusMinus), _) => {
                self.parse_prefix_increment()
            }

            (Some(Token::Ident(_)), Some(peek)) if assign_op(peek).is_some() => {
                self.parse_assign()
            }
            (Some(Token::Ident(_)), Some(Token::PlusPlus | Token::MinusMinus)) => {
                self.parse_postfix()
            }

            // `function name (...) { ... }` at statement position defines
            // the name in the surrounding scope
            (Some(Token::Function), Some(Token::Ident(_))) => {
                let mut lit = self.parse_function_literal()?;
                lit.define = true;
                self.eat_optional_semi();
                Ok(Stmt::Expr(Expr::Function(lit)))
            }

            _ => {
                let expression = self.parse_expression(Precedence::Lowest)?;
                self.eat_optional_semi();
                Ok(Stmt::Expr(expression))
            }
        }
    }

    fn parse_binding(&mut self, constant: bool) -> Result<Stmt> {
        self.advance();
        let name = self.eat_ident()?;
        self.eat(&Token::Assign)?;

        let mut value = self.parse_expression(Precedence::Lowest)?;

        // Give anonymous function values their binding name, enabling
        // self-recursion through the current closure.
        if let Expr::Function(lit) = &mut value {
            if lit.name.is_none() {
                lit.name = Some(name.clone());
            }
        }

        self.eat_optional_semi();

        if constant {
            Ok(Stmt::Const { name, value })
        } else {
            Ok(Stmt::Let { name, value })
        }
    }

    fn parse_return(&mut self) -> Result<Stmt> {
        self.advance();

        let value = match self.current() {
            None | Some(Token::Semi) | Some(Token::RBrace) => None,
            _ => Some(self.parse_expression(Precedence::Lowest)?),
        };

        self.eat_optional_semi();
        Ok(Stmt::Return(value))
    }

    fn parse_prefix_increment(&mut self) -> Result<Stmt> {
        let op = if self.current() == Some(&Token::PlusPlus) {
            AssignOp::Incr
        } else {
            AssignOp::Decr
        };
        self.advance();

        let name = self.eat_ident()?;
        self.eat_optional_semi();

        Ok(Stmt::Assign {
            name,
            op,
            value: Expr::IntLit(1),
        })
    }

    fn parse_assign(&mut self) -> Result<Stmt> {
        let name = self.eat_ident()?;

        let op = match self.current().and_then(assign_op) {
            Some(op) => op,
            None => return Err(self.unexpected("assignment operator")),
        };
        self.advance();

        let value = self.parse_expression(Precedence::Lowest)?;
        self.eat_optional_semi();

        Ok(Stmt::Assign { name, op, value })
    }

    fn parse_postfix(&mut self) -> Result<Stmt> {
        let name = self.eat_ident()?;

        let op = if self.current() == Some(&Token::PlusPlus) {
            PostfixOp::Incr
        } else {
            PostfixOp::Decr
        };
        self.advance();
        self.eat_optional_semi();

        Ok(Stmt::Postfix { name, op })
    }

    fn parse_block(&mut self) -> Result<Block> {
        self.eat(&Token::LBrace)?;

        let mut statements = Vec::new();
        while !matches!(self.current(), Some(Token::RBrace) | None) {
            statements.push(self.parse_statement()?);
        }

        self.eat(&Token::RBrace)?;
        Ok(Block { statements })
    }

    /*
     * Expressions
     */

    fn parse_expression(&mut self, precedence: Precedence) -> Result<Expr> {
        let mut left = self.parse_prefix_expression()?;

        while let Some(token) = self.current() {
            if precedence >= token_precedence(token) {
                break;
            }

            left = match token {
                Token::LParen => self.parse_call(left)?,
                Token::LBracket => self.parse_index(left)?,
                _ => self.parse_infix(left)?,
            };
        }

        Ok(left)
    }

    fn parse_prefix_expression(&mut self) -> Result<Expr> {
        let Some(token) = self.current() else {
            return Err(self.unexpected("expression"));
        };

        match token.clone() {
            Token::IntLit(value) => {
                self.advance();
                Ok(Expr::IntLit(value))
            }
            Token::StringLit(value) => {
                self.advance();
                Ok(Expr::StringLit(value))
            }
            Token::True => {
                self.advance();
                Ok(Expr::BoolLit(true))
            }
            Token::False => {
                self.advance();
                Ok(Expr::BoolLit(false))
            }
            Token::Ident(name) => {
                self.advance();
                Ok(Expr::Ident(name))
            }

            Token::Bang => {
                self.advance();
                let right = self.parse_expression(Precedence::Prefix)?;
                Ok(Expr::Prefix {
                    op: PrefixOp::Bang,
                    right: Box::new(right),
                })
            }
            Token::Minus => {
                self.advance();
                let right = self.parse_expression(Precedence::Prefix)?;
                Ok(Expr::Prefix {
                    op: PrefixOp::Minus,
                    right: Box::new(right),
                })
            }

            Token::LParen => {
                self.advance();
                let expression = self.parse_expression(Precedence::Lowest)?;
                self.eat(&Token::RParen)?;
                Ok(expression)
            }

            Token::If => self.parse_if(),
            Token::While => self.parse_while(),
            Token::Function => Ok(Expr::Function(self.parse_function_literal()?)),
            Token::LBracket => self.parse_array(),
            Token::LBrace => self.parse_hash(),

            other => Err(CompileError::parser(
                format!("unexpected token `{other}`"),
                self.current_span(),
            )),
        }
    }

    fn parse_if(&mut self) -> Result<Expr> {
        self.advance();
        self.eat(&Token::LParen)?;
        let condition = self.parse_expression(Precedence::Lowest)?;
        self.eat(&Token::RParen)?;

        let consequence = self.parse_block()?;

        let alternative = if self.current() == Some(&Token::Else) {
            self.advance();
            Some(self.parse_block()?)
        } else {
            None
        };

        Ok(Expr::If {
            condition: Box::new(condition),
            consequence,
            alternative,
        })
    }

    fn parse_while(&mut self) -> Result<Expr> {
        self.advance();
        self.eat(&Token::LParen)?;
        let condition = self.parse_expression(Precedence::Lowest)?;
        self.eat(&Token::RParen)?;

        let body = self.parse_block()?;

        Ok(Expr::While {
            condition: Box::new(condition),
            body,
        })
    }

    fn parse_function_literal(&mut self) -> Result<FunctionLit> {
        self.advance();

        let name = match self.current() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.advance();
                Some(name)
            }
            _ => None,
        };

        self.eat(&Token::LParen)?;

        let mut parameters = Vec::new();
        let mut defaults = HashMap::new();
        while self.current() != Some(&Token::RParen) {
            let parameter = self.eat_ident()?;

            if self.current() == Some(&Token::Assign) {
                self.advance();
                let default = self.parse_expression(Precedence::Lowest)?;
                defaults.insert(parameter.clone(), default);
            }

            parameters.push(parameter);

            if self.current() == Some(&Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.eat(&Token::RParen)?;

        let body = self.parse_block()?;

        Ok(FunctionLit {
            name,
            define: false,
            parameters,
            defaults,
            body,
        })
    }

    fn parse_array(&mut self) -> Result<Expr> {
        self.advance();

        let mut elements = Vec::new();
        while self.current() != Some(&Token::RBracket) {
            elements.push(self.parse_expression(Precedence::Lowest)?);

            if self.current() == Some(&Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.eat(&Token::RBracket)?;

        Ok(Expr::Array(elements))
    }

    fn parse_hash(&mut self) -> Result<Expr> {
        self.advance();

        let mut pairs = Vec::new();
        while self.current() != Some(&Token::RBrace) {
            let key = self.parse_expression(Precedence::Lowest)?;
            self.eat(&Token::Colon)?;
            let value = self.parse_expression(Precedence::Lowest)?;
            pairs.push((key, value));

            if self.current() == Some(&Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.eat(&Token::RBrace)?;

        Ok(Expr::Hash(pairs))
    }

    fn parse_call(&mut self, function: Expr) -> Result<Expr> {
        self.advance();

        let mut arguments = Vec::new();
        while self.current() != Some(&Token::RParen) {
            arguments.push(self.parse_expression(Precedence::Lowest)?);

            if self.current() == Some(&Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.eat(&Token::RParen)?;

        Ok(Expr::Call {
            function: Box::new(function),
            arguments,
        })
    }

    fn parse_index(&mut self, left: Expr) -> Result<Expr> {
        self.advance();
        let index = self.parse_expression(Precedence::Lowest)?;
        self.eat(&Token::RBracket)?;

        Ok(Expr::Index {
            left: Box::new(left),
            index: Box::new(index),
        })
    }

    fn parse_infix(&mut self, left: Expr) -> Result<Expr> {
        let Some(token) = self.current() else {
            return Err(self.unexpected("operator"));
        };

        let op = match token {
            Token::Plus => InfixOp::Add,
            Token::Minus => InfixOp::Sub,
            Token::Star => InfixOp::Mul,
            Token::Slash => InfixOp::Div,
            Token::EqEq => InfixOp::Eq,
            Token::NotEq => InfixOp::NotEq,
            Token::Lt => InfixOp::Lt,
            Token::Gt => InfixOp::Gt,
            Token::LtEq => InfixOp::LtEq,
            Token::GtEq => InfixOp::GtEq,
            Token::AmpAmp => InfixOp::And,
            Token::PipePipe => InfixOp::Or,
            _ => return Err(self.unexpected("operator")),
        };
        let precedence = token_precedence(token);
        self.advance();

        let right = self.parse_expression(precedence)?;

        Ok(Expr::Infix {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    /*
     * Token stream helpers
     */

    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1).map(|(token, _)| token)
    }

    fn current_span(&self) -> Span {
        match self.tokens.get(self.pos) {
            Some((_, span)) => *span,
            None => self
                .tokens
                .last()
                .map(|(_, span)| Span::new(span.end, span.end))
                .unwrap_or(Span::new(0, 0)),
        }
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn eat(&mut self, expected: &Token) -> Result<()> {
        match self.current() {
            Some(token) if token == expected => {
                self.advance();
                Ok(())
            }
            Some(token) => Err(CompileError::parser(
                format!("expected `{expected}`, found `{token}`"),
                self.current_span(),
            )),
            None => Err(CompileError::parser(
                format!("expected `{expected}`, found end of input"),
                self.current_span(),
            )),
        }
    }

    fn eat_ident(&mut self) -> Result<String> {
        match self.current() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            Some(token) => Err(CompileError::parser(
                format!("expected identifier, found `{token}`"),
                self.current_span(),
            )),
            None => Err(CompileError::parser(
                "expected identifier, found end of input",
                self.current_span(),
            )),
        }
    }

    fn eat_optional_semi(&mut self) {
        if self.current() == Some(&Token::Semi) {
            self.advance();
        }
    }

    fn unexpected(&self, wanted: &str) -> CompileError {
        match self.current() {
            Some(token) => CompileError::parser(
                format!("expected {wanted}, found `{token}`"),
                self.current_span(),
            ),
            None => CompileError::parser(
                format!("expected {wanted}, found end of input"),
                self.current_span(),
            ),
        }
    }
}

fn assign_op(token: &Token) -> Option<AssignOp> {
    match token {
        Token::Assign => Some(AssignOp::Assign),
        Token::PlusAssign => Some(AssignOp::AddAssign),
        Token::MinusAssign => Some(AssignOp::SubAssign),
        Token::StarAssign => Some(AssignOp::MulAssign),
        Token::SlashAssign => Some(AssignOp::DivAssign),
        _ => None,
    }
}
