//! Minimal JSON reader for the catalogue and master-schema data files
//!
//! Objects keep key order (`IndexMap`), which matters: the catalogue's field
//! order defines positional binding.

use indexmap::IndexMap;

use crate::error::{Error, Result, SecurityError, Span, SyntaxError};
use crate::lexer::json::JsonLexer;
use crate::lexer::{Token, TokenKind};

/// Object type with insertion order preserved
pub type Object = IndexMap<String, Value>;

/// Parsed JSON value
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(Object),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Look up `key` when this is an object
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|o| o.get(key))
    }

    /// Short description used in error messages
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }
}

/// Limits for data files
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// Maximum nesting depth (0 means unlimited)
    pub max_depth: usize,
    /// Maximum input size in bytes (0 means unlimited)
    pub max_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_depth: 64,
            max_size: 8 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Create a config with unlimited depth and size
    pub const fn unlimited() -> Self {
        Self {
            max_depth: 0,
            max_size: 0,
        }
    }

    /// Create a config with specific limits
    pub const fn new(max_depth: usize, max_size: usize) -> Self {
        Self {
            max_depth,
            max_size,
        }
    }
}

/// Recursive-descent JSON parser with depth and size limits
#[derive(Debug)]
pub struct Parser<'a> {
    lexer: JsonLexer<'a>,
    config: Config,
    depth: usize,
    current: Option<Token>,
}

impl<'a> Parser<'a> {
    /// Create a parser with default limits; `//` comments are permitted
    pub fn new(input: &'a [u8]) -> Self {
        Self::with_config(input, Config::default())
    }

    pub fn with_config(input: &'a [u8], config: Config) -> Self {
        Self {
            lexer: JsonLexer::with_comments(input),
            config,
            depth: 0,
            current: None,
        }
    }

    /// Parse the complete input into a single value
    pub fn parse(mut self, input_len: usize) -> Result<Value> {
        if self.config.max_size > 0 && input_len > self.config.max_size {
            return Err(Error::bare(SecurityError::MaxSizeExceeded {
                max: self.config.max_size,
            }));
        }
        let token = self.next()?;
        let value = self.parse_value(token)?;
        let trailing = self.next()?;
        if trailing.kind != TokenKind::Eof {
            return Err(expected("end of input", &trailing));
        }
        Ok(value)
    }

    fn next(&mut self) -> Result<Token> {
        match self.current.take() {
            Some(token) => Ok(token),
            None => self.lexer.next_token(),
        }
    }

    fn parse_value(&mut self, token: Token) -> Result<Value> {
        match token.kind {
            TokenKind::LeftBrace => self.nested(token.span, Self::parse_object),
            TokenKind::LeftBracket => self.nested(token.span, Self::parse_array),
            TokenKind::Null => Ok(Value::Null),
            TokenKind::True => Ok(Value::Bool(true)),
            TokenKind::False => Ok(Value::Bool(false)),
            TokenKind::String(s) => Ok(Value::String(s)),
            TokenKind::Number(n) => Ok(Value::Number(n)),
            _ => Err(expected("value", &token)),
        }
    }

    fn nested(&mut self, span: Span, parse: fn(&mut Self) -> Result<Value>) -> Result<Value> {
        self.depth += 1;
        if self.config.max_depth > 0 && self.depth > self.config.max_depth {
            return Err(Error::new(
                SecurityError::MaxDepthExceeded {
                    max: self.config.max_depth,
                },
                span,
            ));
        }
        let value = parse(self);
        self.depth -= 1;
        value
    }

    fn parse_object(&mut self) -> Result<Value> {
        let mut object = Object::new();
        let mut token = self.next()?;
        if token.kind == TokenKind::RightBrace {
            return Ok(Value::Object(object));
        }
        loop {
            let TokenKind::String(key) = token.kind else {
                return Err(expected("string key", &token));
            };
            let colon = self.next()?;
            if colon.kind != TokenKind::Colon {
                return Err(expected("':'", &colon));
            }
            let value_token = self.next()?;
            let value = self.parse_value(value_token)?;
            if object.contains_key(&key) {
                return Err(Error::new(SyntaxError::DuplicateKey(key), token.span));
            }
            object.insert(key, value);

            let separator = self.next()?;
            match separator.kind {
                TokenKind::RightBrace => return Ok(Value::Object(object)),
                TokenKind::Comma => {
                    token = self.next()?;
                    if token.kind == TokenKind::RightBrace {
                        return Err(Error::new(SyntaxError::TrailingComma, separator.span));
                    }
                }
                _ => return Err(expected("',' or '}'", &separator)),
            }
        }
    }

    fn parse_array(&mut self) -> Result<Value> {
        let mut array = Vec::new();
        let mut token = self.next()?;
        if token.kind == TokenKind::RightBracket {
            return Ok(Value::Array(array));
        }
        loop {
            array.push(self.parse_value(token)?);
            let separator = self.next()?;
            match separator.kind {
                TokenKind::RightBracket => return Ok(Value::Array(array)),
                TokenKind::Comma => {
                    token = self.next()?;
                    if token.kind == TokenKind::RightBracket {
                        return Err(Error::new(SyntaxError::TrailingComma, separator.span));
                    }
                }
                _ => return Err(expected("',' or ']'", &separator)),
            }
        }
    }
}

fn expected(what: &str, found: &Token) -> Error {
    Error::new(
        SyntaxError::Expected {
            expected: what.to_string(),
            found: found.kind.to_string(),
        },
        found.span,
    )
}

/// Parse JSON text with default limits
pub fn parse(input: &str) -> Result<Value> {
    parse_with_config(input, Config::default())
}

/// Parse JSON text with custom limits
pub fn parse_with_config(input: &str, config: Config) -> Result<Value> {
    Parser::with_config(input.as_bytes(), config).parse(input.len())
}
