use std::fmt;

use crate::ast::TypeTag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

/// Numeric literal as written in the source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(value) => write!(f, "{value}"),
            Number::Float(value) => write!(f, "{value:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TokenKind<'a> {
    Identifier(&'a str),
    Number(Number),
    String(&'a str),
    Boolean(bool),
    Type(TypeTag),

    // Keywords
    If,
    Then,
    Else,
    End,
    While,
    For,
    Function,
    Return,
    Output,

    // Operators
    Assign,       // =
    Plus,         // +
    Minus,        // -
    Star,         // *
    Slash,        // /
    Greater,      // >
    Less,         // <
    GreaterEqual, // >=
    LessEqual,    // <=
    EqualEqual,   // ==
    BangEqual,    // !=

    // Delimiters
    LParen,    // (
    RParen,    // )
    LBrace,    // {
    RBrace,    // }
    LBracket,  // [
    RBracket,  // ]
    Semicolon, // ;
    Comma,     // ,

    EOF,
}

impl fmt::Display for TokenKind<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::Identifier(name) => return write!(f, "identifier '{name}'"),
            TokenKind::Number(value) => return write!(f, "number {value}"),
            TokenKind::String(value) => return write!(f, "string \"{value}\""),
            TokenKind::Boolean(value) => return write!(f, "boolean {value}"),
            TokenKind::Type(tag) => return write!(f, "type {tag}"),
            TokenKind::If => "'if'",
            TokenKind::Then => "'then'",
            TokenKind::Else => "'else'",
            TokenKind::End => "'end'",
            TokenKind::While => "'while'",
            TokenKind::For => "'for'",
            TokenKind::Function => "'function'",
            TokenKind::Return => "'return'",
            TokenKind::Output => "'output'",
            TokenKind::Assign => "'='",
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Star => "'*'",
            TokenKind::Slash => "'/'",
            TokenKind::Greater => "'>'",
            TokenKind::Less => "'<'",
            TokenKind::GreaterEqual => "'>='",
            TokenKind::LessEqual => "'<='",
            TokenKind::EqualEqual => "'=='",
            TokenKind::BangEqual => "'!='",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::Semicolon => "';'",
            TokenKind::Comma => "','",
            TokenKind::EOF => "end of input",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    pub span: Span,
}

impl<'a> Token<'a> {
    pub fn new(kind: TokenKind<'a>, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Reserved-word table shared by the lexer and the parser's literal fallback.
///
/// Returns the keyword, type tag or boolean literal spelled by `word`, or a
/// plain identifier when the word is not reserved.
pub fn classify_word(word: &str) -> TokenKind<'_> {
    match word {
        "if" => TokenKind::If,
        "then" => TokenKind::Then,
        "else" => TokenKind::Else,
        "end" => TokenKind::End,
        "while" => TokenKind::While,
        "for" => TokenKind::For,
        "function" => TokenKind::Function,
        "return" => TokenKind::Return,
        "output" => TokenKind::Output,
        "IN" => TokenKind::Type(TypeTag::In),
        "IR" => TokenKind::Type(TypeTag::Ir),
        "STR" => TokenKind::Type(TypeTag::Str),
        "BINARY" => TokenKind::Type(TypeTag::Binary),
        "TAB" => TokenKind::Type(TypeTag::Tab),
        "YES" | "true" => TokenKind::Boolean(true),
        "NO" | "false" => TokenKind::Boolean(false),
        _ => TokenKind::Identifier(word),
    }
}
