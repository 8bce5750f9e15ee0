use std::{iter::Peekable, str::CharIndices};

use tracing::{debug, trace};

use crate::ast::TypeTag;
use crate::token::{Number, Span, Token, TokenKind, classify_word};

mod error;

pub use error::{LexError, LexResult};

pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
    /// Last three emitted token kinds, oldest first.
    recent: [Option<TokenKind<'a>>; 3],
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
            recent: [None; 3],
            line: 1,
            column: 0,
        }
    }

    /// Produces the next token, or `EOF` forever once the input is exhausted.
    ///
    /// An illegal character is consumed before its error is returned, so the
    /// caller may keep pulling to collect later diagnostics.
    pub fn next_token(&mut self) -> LexResult<Token<'a>> {
        let token = self.scan_token()?;
        trace!(kind = ?token.kind, line = token.span.line, "token");
        self.remember(token.kind);
        Ok(token)
    }

    fn scan_token(&mut self) -> LexResult<Token<'a>> {
        self.skip_trivia();

        let (start_idx, ch) = match self.chars.peek() {
            Some(&(idx, c)) => (idx, c),
            None => {
                let index = self.input.len();
                return Ok(Token::new(
                    TokenKind::EOF,
                    Span {
                        start: index,
                        end: index,
                        line: self.line,
                        column: self.column,
                    },
                ));
            }
        };

        let line = self.line;
        let column = self.column;
        match ch {
            '=' => Ok(self.operator(
                start_idx,
                line,
                column,
                TokenKind::Assign,
                TokenKind::EqualEqual,
            )),
            '>' => Ok(self.operator(
                start_idx,
                line,
                column,
                TokenKind::Greater,
                TokenKind::GreaterEqual,
            )),
            '<' => Ok(self.operator(
                start_idx,
                line,
                column,
                TokenKind::Less,
                TokenKind::LessEqual,
            )),
            '!' => {
                if self.peek_second() == Some('=') {
                    self.advance_char();
                    self.advance_char();
                    Ok(self.token_from(TokenKind::BangEqual, start_idx, line, column))
                } else {
                    self.advance_char();
                    Err(LexError::IllegalCharacter {
                        character: ch,
                        line,
                        column,
                    })
                }
            }
            '+' => Ok(self.single(TokenKind::Plus, start_idx, line, column)),
            '-' => Ok(self.single(TokenKind::Minus, start_idx, line, column)),
            '*' => Ok(self.single(TokenKind::Star, start_idx, line, column)),
            '/' => Ok(self.single(TokenKind::Slash, start_idx, line, column)),
            '(' => Ok(self.single(TokenKind::LParen, start_idx, line, column)),
            ')' => Ok(self.single(TokenKind::RParen, start_idx, line, column)),
            '{' => Ok(self.single(TokenKind::LBrace, start_idx, line, column)),
            '}' => Ok(self.single(TokenKind::RBrace, start_idx, line, column)),
            '[' => Ok(self.single(TokenKind::LBracket, start_idx, line, column)),
            ']' => Ok(self.single(TokenKind::RBracket, start_idx, line, column)),
            ';' => Ok(self.single(TokenKind::Semicolon, start_idx, line, column)),
            ',' => Ok(self.single(TokenKind::Comma, start_idx, line, column)),
            '"' => self.read_string(start_idx, line, column),
            c if c.is_ascii_alphabetic() || c == '_' => {
                Ok(self.read_identifier(start_idx, line, column))
            }
            c if c.is_ascii_digit() => self.read_number(start_idx, line, column),
            '.' if self.peek_second().is_some_and(|c| c.is_ascii_digit()) => {
                self.read_number(start_idx, line, column)
            }
            _ => {
                self.advance_char();
                Err(LexError::IllegalCharacter {
                    character: ch,
                    line,
                    column,
                })
            }
        }
    }

    /// Skips blanks, newlines and `//` comments.
    fn skip_trivia(&mut self) {
        while let Some(&(_, c)) = self.chars.peek() {
            match c {
                ' ' | '\t' | '\r' | '\n' => {
                    self.advance_char();
                }
                '/' if self.peek_second() == Some('/') => {
                    while let Some(&(_, c)) = self.chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance_char();
                    }
                }
                _ => break,
            }
        }
    }

    fn single(
        &mut self,
        kind: TokenKind<'a>,
        start: usize,
        line: usize,
        column: usize,
    ) -> Token<'a> {
        self.advance_char();
        self.token_from(kind, start, line, column)
    }

    /// Longest match: `short` alone, `long` when followed by `=`.
    fn operator(
        &mut self,
        start: usize,
        line: usize,
        column: usize,
        short: TokenKind<'a>,
        long: TokenKind<'a>,
    ) -> Token<'a> {
        self.advance_char();
        if matches!(self.chars.peek(), Some(&(_, '='))) {
            self.advance_char();
            return self.token_from(long, start, line, column);
        }
        self.token_from(short, start, line, column)
    }

    fn token_from(
        &mut self,
        kind: TokenKind<'a>,
        start: usize,
        line: usize,
        column: usize,
    ) -> Token<'a> {
        Token::new(
            kind,
            Span {
                start,
                end: self.current_index(),
                line,
                column,
            },
        )
    }

    fn read_identifier(&mut self, start: usize, line: usize, column: usize) -> Token<'a> {
        self.advance_char(); // Consume first char
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.advance_char();
            } else {
                break;
            }
        }

        let input = self.input;
        let end_idx = self.current_index();
        let word = &input[start..end_idx];
        self.token_from(classify_word(word), start, line, column)
    }

    fn read_number(&mut self, start: usize, line: usize, column: usize) -> LexResult<Token<'a>> {
        self.consume_digits();
        let mut is_float = false;
        if matches!(self.chars.peek(), Some(&(_, '.')))
            && self.peek_second().is_some_and(|c| c.is_ascii_digit())
        {
            is_float = true;
            self.advance_char(); // Consume '.'
            self.consume_digits();
        }

        let input = self.input;
        let end_idx = self.current_index();
        let literal = &input[start..end_idx];
        let invalid = || LexError::InvalidNumber {
            literal: literal.to_string(),
            line,
            column,
        };

        let kind = if is_float {
            TokenKind::Number(Number::Float(literal.parse().map_err(|_| invalid())?))
        } else if matches!(literal, "0" | "1")
            && self.expects_binary_literal()
            && self.next_significant_char() == Some(';')
        {
            TokenKind::Boolean(literal == "1")
        } else {
            TokenKind::Number(Number::Int(literal.parse().map_err(|_| invalid())?))
        };
        Ok(self.token_from(kind, start, line, column))
    }

    fn consume_digits(&mut self) {
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_ascii_digit() {
                self.advance_char();
            } else {
                break;
            }
        }
    }

    fn read_string(&mut self, start: usize, line: usize, column: usize) -> LexResult<Token<'a>> {
        self.advance_char(); // Consume opening quote
        let content_start = start + 1;
        while let Some(&(idx, c)) = self.chars.peek() {
            match c {
                '"' => {
                    self.advance_char(); // Consume closing quote
                    let input = self.input;
                    let kind = TokenKind::String(&input[content_start..idx]);
                    return Ok(self.token_from(kind, start, line, column));
                }
                '\\' => {
                    self.advance_char();
                    self.advance_char();
                }
                _ => {
                    self.advance_char();
                }
            }
        }
        Err(LexError::UnterminatedString { line, column })
    }

    /// `0`/`1` read as booleans right after `BINARY name =`.
    fn expects_binary_literal(&self) -> bool {
        matches!(
            self.recent,
            [
                Some(TokenKind::Type(TypeTag::Binary)),
                Some(TokenKind::Identifier(_)),
                Some(TokenKind::Assign)
            ]
        )
    }

    fn remember(&mut self, kind: TokenKind<'a>) {
        self.recent.rotate_left(1);
        self.recent[2] = Some(kind);
    }

    fn next_significant_char(&self) -> Option<char> {
        self.chars
            .clone()
            .map(|(_, c)| c)
            .find(|c| !matches!(c, ' ' | '\t' | '\r' | '\n'))
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.chars.clone();
        chars.next();
        chars.next().map(|(_, c)| c)
    }

    fn advance_char(&mut self) -> Option<(usize, char)> {
        let next = self.chars.next();
        if let Some((_, c)) = next {
            if c == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
        next
    }

    fn current_index(&mut self) -> usize {
        self.chars
            .peek()
            .map(|(idx, _)| *idx)
            .unwrap_or(self.input.len())
    }
}

/// Yields tokens up to and including the first `EOF`.
pub struct Tokens<'a> {
    lexer: Lexer<'a>,
    finished: bool,
}

impl<'a> Iterator for Tokens<'a> {
    type Item = LexResult<Token<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let result = self.lexer.next_token();
        if matches!(&result, Ok(token) if token.kind == TokenKind::EOF) {
            self.finished = true;
        }
        Some(result)
    }
}

impl<'a> IntoIterator for Lexer<'a> {
    type Item = LexResult<Token<'a>>;
    type IntoIter = Tokens<'a>;

    fn into_iter(self) -> Self::IntoIter {
        Tokens {
            lexer: self,
            finished: false,
        }
    }
}

/// Anything the parser can pull tokens from.
pub trait TokenSource<'a> {
    fn pull(&mut self) -> LexResult<Token<'a>>;
}

impl<'a> TokenSource<'a> for Lexer<'a> {
    fn pull(&mut self) -> LexResult<Token<'a>> {
        self.next_token()
    }
}

/// Pre-tokenized input. Keeps answering `EOF` once the list runs out, even if
/// the list itself carried no `EOF`.
pub struct TokenStream<'a> {
    tokens: std::vec::IntoIter<Token<'a>>,
    last_span: Span,
}

impl<'a> TokenStream<'a> {
    pub fn new(tokens: Vec<Token<'a>>) -> Self {
        Self {
            tokens: tokens.into_iter(),
            last_span: Span::default(),
        }
    }
}

impl<'a> TokenSource<'a> for TokenStream<'a> {
    fn pull(&mut self) -> LexResult<Token<'a>> {
        match self.tokens.next() {
            Some(token) => {
                self.last_span = token.span;
                Ok(token)
            }
            None => Ok(Token::new(TokenKind::EOF, self.last_span)),
        }
    }
}

pub fn tokenize(input: &str) -> LexResult<Vec<Token<'_>>> {
    let tokens = Lexer::new(input).into_iter().collect::<LexResult<Vec<_>>>()?;
    debug!(count = tokens.len(), "tokenized source");
    Ok(tokens)
}

/// Lexes the whole input, collecting every diagnostic instead of stopping at
/// the first one.
pub fn scan(input: &str) -> (Vec<Token<'_>>, Vec<LexError>) {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    for result in Lexer::new(input) {
        match result {
            Ok(token) => tokens.push(token),
            Err(error) => errors.push(error),
        }
    }
    (tokens, errors)
}
