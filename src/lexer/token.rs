//! Tokens of the JSON data-file lexer

use std::fmt;

use crate::error::Span;

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Colon,
    Comma,
    Null,
    True,
    False,
    String(String),
    Number(f64),
    Eof,
}

// Wording used in "expected X, found Y" messages
impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LeftBrace => f.write_str("'{'"),
            Self::RightBrace => f.write_str("'}'"),
            Self::LeftBracket => f.write_str("'['"),
            Self::RightBracket => f.write_str("']'"),
            Self::Colon => f.write_str("':'"),
            Self::Comma => f.write_str("','"),
            Self::Null | Self::True | Self::False => f.write_str("literal"),
            Self::String(s) => write!(f, "string {s:?}"),
            Self::Number(n) => write!(f, "number {n}"),
            Self::Eof => f.write_str("end of file"),
        }
    }
}

/// A token and where it came from; the script lexer reuses this with its
/// own kind type
#[derive(Clone, Debug, PartialEq)]
pub struct Token<K = TokenKind> {
    pub kind: K,
    pub span: Span,
}

impl<K> Token<K> {
    pub const fn new(kind: K, span: Span) -> Self {
        Self { kind, span }
    }
}
