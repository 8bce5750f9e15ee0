use tracing::debug;

use crate::ast::{
    AssignTarget, BinaryOperator, Expression, Function, Number, Param, Program, Statement,
    TypeTag,
};
use crate::lexer::{Lexer, TokenSource, TokenStream};
use crate::token::{Token, TokenKind, classify_word};
use crate::value::MAX_ARRAY_LEN;

mod error;

pub use error::{ParseError, ParseResult};

/// Recursive-descent parser over any [`TokenSource`].
///
/// Grammar, lowest precedence first:
/// `equality (== !=) < relational (> < >= <=) < additive (+ -) < multiplicative (* /)`,
/// all left-associative.
pub struct Parser<'a, S: TokenSource<'a>> {
    source: S,
    current: Token<'a>,
    peeked: Option<Token<'a>>,
    /// Open expressions, blocks and operator links around the current token.
    depth: usize,
}

/// Deepest nesting the parser accepts. Keeps the recursive backends within a
/// default thread stack.
pub const MAX_NESTING_DEPTH: usize = 64;

impl<'a> Parser<'a, Lexer<'a>> {
    /// Pull-mode parser reading tokens from the lexer on demand.
    pub fn from_source(input: &'a str) -> ParseResult<Self> {
        Self::new(Lexer::new(input))
    }
}

impl<'a, S: TokenSource<'a>> Parser<'a, S> {
    pub fn new(mut source: S) -> ParseResult<Self> {
        let current = source.pull()?;
        Ok(Self {
            source,
            current,
            peeked: None,
            depth: 0,
        })
    }

    pub fn parse_program(mut self) -> ParseResult<Program> {
        let mut declarations = Vec::new();
        while !matches!(self.current.kind, TokenKind::EOF) {
            let declaration = if matches!(self.current.kind, TokenKind::Function) {
                self.parse_function()?
            } else {
                self.parse_statement()?
            };
            declarations.push(declaration);
        }
        debug!(count = declarations.len(), "parsed program");
        Ok(Program { declarations })
    }

    fn parse_function(&mut self) -> ParseResult<Statement> {
        self.expect(TokenKind::Function)?;
        let name = self.expect_identifier()?;
        self.expect(TokenKind::LParen)?;

        let mut params = Vec::new();
        if !matches!(self.current.kind, TokenKind::RParen) {
            loop {
                let ty = self.expect_type()?;
                let name = self.expect_identifier()?;
                params.push(Param { ty, name });
                if matches!(self.current.kind, TokenKind::Comma) {
                    self.advance()?;
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        let return_type = self.expect_type()?;
        let body = self.parse_block()?;

        Ok(Statement::Function(Function {
            name,
            params,
            return_type,
            body,
        }))
    }

    /// `{ statement* }`
    fn parse_block(&mut self) -> ParseResult<Vec<Statement>> {
        self.nested(Self::block)
    }

    fn block(&mut self) -> ParseResult<Vec<Statement>> {
        self.expect(TokenKind::LBrace)?;
        let mut body = Vec::new();
        while !matches!(self.current.kind, TokenKind::RBrace) {
            if matches!(self.current.kind, TokenKind::EOF) {
                return Err(self.error("'}'"));
            }
            body.push(self.parse_statement()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(body)
    }

    /// Body of an `if` branch: a brace block, or statements up to `else`/`end`.
    fn parse_branch(&mut self) -> ParseResult<Vec<Statement>> {
        if matches!(self.current.kind, TokenKind::LBrace) {
            return self.parse_block();
        }
        self.nested(Self::keyword_branch)
    }

    /// Statements up to `else` or `end`.
    fn keyword_branch(&mut self) -> ParseResult<Vec<Statement>> {
        let mut body = Vec::new();
        while !matches!(
            self.current.kind,
            TokenKind::Else | TokenKind::End | TokenKind::EOF
        ) {
            body.push(self.parse_statement()?);
        }
        Ok(body)
    }

    fn parse_statement(&mut self) -> ParseResult<Statement> {
        let kind = self.current.kind;
        match kind {
            TokenKind::Type(_) => self.parse_declaration(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Return => {
                self.advance()?;
                let value = if matches!(self.current.kind, TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.expect(TokenKind::Semicolon)?;
                Ok(Statement::Return(value))
            }
            TokenKind::Output => {
                self.advance()?;
                let value = self.parse_expression()?;
                self.expect(TokenKind::Semicolon)?;
                Ok(Statement::Output(value))
            }
            TokenKind::Identifier(_) => {
                if !matches!(self.peek()?.kind, TokenKind::LParen) {
                    return self.parse_assignment();
                }
                let call = self.parse_factor()?;
                self.expect(TokenKind::Semicolon)?;
                Ok(Statement::Expr(call))
            }
            _ => Err(self.error("statement")),
        }
    }

    /// `TYPE ID = expr ;` or `TYPE ID [ NUMBER ] ;`
    fn parse_declaration(&mut self) -> ParseResult<Statement> {
        let ty = self.expect_type()?;
        let name = self.expect_identifier()?;

        if matches!(self.current.kind, TokenKind::LBracket) {
            self.advance()?;
            let size = match self.current.kind {
                TokenKind::Number(Number::Int(size)) => usize::try_from(size)
                    .ok()
                    .filter(|size| *size <= MAX_ARRAY_LEN),
                TokenKind::EOF => return Err(self.error("array size")),
                _ => None,
            };
            let Some(size) = size else {
                return Err(ParseError::InvalidArraySize {
                    found: self.current.kind.to_string(),
                    line: self.current.span.line,
                });
            };
            self.advance()?;
            self.expect(TokenKind::RBracket)?;
            self.expect(TokenKind::Semicolon)?;
            return Ok(Statement::ArrayDeclaration { ty, name, size });
        }

        self.expect(TokenKind::Assign)?;
        let value = self.parse_expression()?;
        self.expect(TokenKind::Semicolon)?;
        Ok(Statement::VarDeclaration {
            ty,
            name,
            value: Some(value),
        })
    }

    /// `ID = expr ;` or `ID [ expr ] = expr ;`
    fn parse_assignment(&mut self) -> ParseResult<Statement> {
        let name = self.expect_identifier()?;
        let target = if matches!(self.current.kind, TokenKind::LBracket) {
            self.advance()?;
            let index = self.parse_expression()?;
            self.expect(TokenKind::RBracket)?;
            AssignTarget::Index { name, index }
        } else {
            AssignTarget::Name(name)
        };
        self.expect(TokenKind::Assign)?;
        let value = self.parse_expression()?;
        self.expect(TokenKind::Semicolon)?;
        Ok(Statement::Assignment { target, value })
    }

    fn parse_if(&mut self) -> ParseResult<Statement> {
        self.expect(TokenKind::If)?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::Then)?;
        let then_body = self.parse_branch()?;
        let else_body = if matches!(self.current.kind, TokenKind::Else) {
            self.advance()?;
            Some(self.parse_branch()?)
        } else {
            None
        };
        self.expect(TokenKind::End)?;
        Ok(Statement::If {
            condition,
            then_body,
            else_body,
        })
    }

    fn parse_while(&mut self) -> ParseResult<Statement> {
        self.expect(TokenKind::While)?;
        let condition = self.parse_expression()?;
        let body = self.parse_block()?;
        Ok(Statement::While { condition, body })
    }

    /// `for ( init condition ; update ) block` where `init` and `update` carry
    /// their own `;`.
    fn parse_for(&mut self) -> ParseResult<Statement> {
        self.expect(TokenKind::For)?;
        self.expect(TokenKind::LParen)?;
        let init = if matches!(self.current.kind, TokenKind::Type(_)) {
            self.parse_declaration()?
        } else {
            self.parse_assignment()?
        };
        let condition = self.parse_expression()?;
        self.expect(TokenKind::Semicolon)?;
        let update = self.parse_assignment()?;
        self.expect(TokenKind::RParen)?;
        let body = self.parse_block()?;
        Ok(Statement::For {
            init: Box::new(init),
            condition,
            update: Box::new(update),
            body,
        })
    }

    fn parse_expression(&mut self) -> ParseResult<Expression> {
        self.nested(Self::parse_equality)
    }

    fn parse_equality(&mut self) -> ParseResult<Expression> {
        self.parse_chain(Self::parse_relational, |kind| match kind {
            TokenKind::EqualEqual => Some(BinaryOperator::Equal),
            TokenKind::BangEqual => Some(BinaryOperator::NotEqual),
            _ => None,
        })
    }

    fn parse_relational(&mut self) -> ParseResult<Expression> {
        self.parse_chain(Self::parse_additive, |kind| match kind {
            TokenKind::Greater => Some(BinaryOperator::Greater),
            TokenKind::Less => Some(BinaryOperator::Less),
            TokenKind::GreaterEqual => Some(BinaryOperator::GreaterEqual),
            TokenKind::LessEqual => Some(BinaryOperator::LessEqual),
            _ => None,
        })
    }

    fn parse_additive(&mut self) -> ParseResult<Expression> {
        self.parse_chain(Self::parse_multiplicative, |kind| match kind {
            TokenKind::Plus => Some(BinaryOperator::Add),
            TokenKind::Minus => Some(BinaryOperator::Sub),
            _ => None,
        })
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expression> {
        self.parse_chain(Self::parse_factor, |kind| match kind {
            TokenKind::Star => Some(BinaryOperator::Mul),
            TokenKind::Slash => Some(BinaryOperator::Div),
            _ => None,
        })
    }

    /// Left-associative `operand (op operand)*`. Every link deepens the tree,
    /// so it counts against the nesting limit until the chain ends.
    fn parse_chain(
        &mut self,
        operand: fn(&mut Self) -> ParseResult<Expression>,
        operator: fn(TokenKind<'a>) -> Option<BinaryOperator>,
    ) -> ParseResult<Expression> {
        let base = self.depth;
        let result = self.chain_links(operand, operator);
        self.depth = base;
        result
    }

    fn chain_links(
        &mut self,
        operand: fn(&mut Self) -> ParseResult<Expression>,
        operator: fn(TokenKind<'a>) -> Option<BinaryOperator>,
    ) -> ParseResult<Expression> {
        let mut expr = operand(self)?;
        while let Some(op) = operator(self.current.kind) {
            self.descend()?;
            self.advance()?;
            let right = operand(self)?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn parse_factor(&mut self) -> ParseResult<Expression> {
        match self.current.kind {
            TokenKind::Number(value) => {
                self.advance()?;
                Ok(Expression::Number(value))
            }
            TokenKind::String(value) => {
                self.advance()?;
                Ok(Expression::String(value.to_string()))
            }
            TokenKind::Boolean(value) => {
                self.advance()?;
                Ok(Expression::Boolean(value))
            }
            TokenKind::Identifier(name) => {
                self.advance()?;
                if let Some(literal) = reclassify_word(name) {
                    return Ok(literal);
                }
                match self.current.kind {
                    TokenKind::LBracket => {
                        self.advance()?;
                        let index = self.parse_expression()?;
                        self.expect(TokenKind::RBracket)?;
                        Ok(Expression::ArrayAccess {
                            name: name.to_string(),
                            index: Box::new(index),
                        })
                    }
                    TokenKind::LParen => {
                        self.advance()?;
                        let args = self.parse_arguments()?;
                        Ok(Expression::Call {
                            name: name.to_string(),
                            args,
                        })
                    }
                    _ => Ok(Expression::Identifier(name.to_string())),
                }
            }
            TokenKind::LParen => {
                self.advance()?;
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            _ => Err(self.error("expression")),
        }
    }

    /// Comma-separated arguments after the opening `(`, including the `)`.
    fn parse_arguments(&mut self) -> ParseResult<Vec<Expression>> {
        let mut args = Vec::new();
        if !matches!(self.current.kind, TokenKind::RParen) {
            args.push(self.parse_expression()?);
            while matches!(self.current.kind, TokenKind::Comma) {
                self.advance()?;
                args.push(self.parse_expression()?);
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    fn nested<T>(&mut self, parse: fn(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        let base = self.depth;
        let result = self.descend().and_then(|()| parse(self));
        self.depth = base;
        result
    }

    fn descend(&mut self) -> ParseResult<()> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(ParseError::NestingTooDeep {
                limit: MAX_NESTING_DEPTH,
                line: self.current.span.line,
            });
        }
        self.depth += 1;
        Ok(())
    }

    fn expect(&mut self, kind: TokenKind<'a>) -> ParseResult<()> {
        if self.current.kind == kind {
            self.advance()?;
            Ok(())
        } else {
            Err(self.error(&kind.to_string()))
        }
    }

    fn expect_identifier(&mut self) -> ParseResult<String> {
        if let TokenKind::Identifier(name) = self.current.kind {
            self.advance()?;
            Ok(name.to_string())
        } else {
            Err(self.error("identifier"))
        }
    }

    fn expect_type(&mut self) -> ParseResult<TypeTag> {
        if let TokenKind::Type(tag) = self.current.kind {
            self.advance()?;
            Ok(tag)
        } else {
            Err(self.error("type"))
        }
    }

    fn advance(&mut self) -> ParseResult<Token<'a>> {
        let next = self.next_token()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn next_token(&mut self) -> ParseResult<Token<'a>> {
        if let Some(token) = self.peeked.take() {
            Ok(token)
        } else {
            Ok(self.source.pull()?)
        }
    }

    fn peek(&mut self) -> ParseResult<&Token<'a>> {
        let token = match self.peeked.take() {
            Some(token) => token,
            None => self.source.pull()?,
        };
        Ok(&*self.peeked.insert(token))
    }

    fn error(&self, expected: &str) -> ParseError {
        match self.current.kind {
            TokenKind::EOF => ParseError::UnexpectedEof {
                expected: expected.to_string(),
            },
            found => ParseError::UnexpectedToken {
                expected: expected.to_string(),
                found: found.to_string(),
                line: self.current.span.line,
            },
        }
    }
}

fn binary(left: Expression, op: BinaryOperator, right: Expression) -> Expression {
    Expression::BinaryOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

/// Literal spelled like an identifier: a boolean word, or text still wrapped
/// in quotes. Token lists built outside the lexer can carry either.
fn reclassify_word(word: &str) -> Option<Expression> {
    if let TokenKind::Boolean(value) = classify_word(word) {
        return Some(Expression::Boolean(value));
    }
    if word.len() >= 2 && word.starts_with('"') && word.ends_with('"') {
        return Some(Expression::String(word[1..word.len() - 1].to_string()));
    }
    None
}

/// Parses source text, pulling tokens from the lexer as needed.
pub fn parse(input: &str) -> ParseResult<Program> {
    Parser::from_source(input)?.parse_program()
}

/// Parses an already tokenized program.
pub fn parse_tokens(tokens: Vec<Token<'_>>) -> ParseResult<Program> {
    Parser::new(TokenStream::new(tokens))?.parse_program()
}
