//! Error types for zscore
//!
//! Every failure carries a [`Span`] pointing into the script (or data file)
//! that caused it. Errors are grouped by category so callers can match on the
//! broad class (`Rejected`, `Usage`, ...) without caring about the detail.

use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

use crate::script::NodeKind;

/// Position in source text
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pos {
    pub offset: usize,
    pub line: u32,
    pub col: u32,
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

impl Pos {
    pub const fn new(offset: usize, line: u32, col: u32) -> Self {
        Self { offset, line, col }
    }
}

/// Span representing a range in source text
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: Pos,
    pub end: Pos,
}

impl Span {
    pub const fn new(start: Pos, end: Pos) -> Self {
        Self { start, end }
    }

    pub const fn empty() -> Self {
        Self {
            start: Pos::new(0, 0, 0),
            end: Pos::new(0, 0, 0),
        }
    }

    /// Smallest span covering both `self` and `other`
    pub fn to(self, other: Self) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.start.line == 0 && self.end.line == 0
    }
}

/// Errors raised while turning characters into tokens
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LexicalError {
    #[error("invalid character {0:?}")]
    InvalidCharacter(char),
    #[error("invalid escape sequence")]
    InvalidEscape,
    #[error("invalid number {0:?}")]
    InvalidNumber(String),
    #[error("unterminated string")]
    UnterminatedString,
    #[error("inconsistent indentation")]
    InconsistentIndent,
    #[error("invalid utf-8")]
    InvalidUtf8,
}

/// Errors raised while assembling tokens into a tree
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SyntaxError {
    #[error("expected {expected}, found {found}")]
    Expected { expected: String, found: String },
    #[error("keyword argument repeated: {0}")]
    DuplicateKeyword(String),
    #[error("positional argument follows keyword argument")]
    PositionalAfterKeyword,
    #[error("cannot assign to {0}")]
    InvalidTarget(String),
    #[error("duplicate key: {0}")]
    DuplicateKey(String),
    #[error("trailing comma")]
    TrailingComma,
    #[error("malformed markup: {0}")]
    Markup(String),
    #[error("f-string format spec nested too deeply")]
    FormatSpecTooDeep,
}

/// Configured limits that protect the process from hostile input
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SecurityError {
    #[error("max depth exceeded: {max}")]
    MaxDepthExceeded { max: usize },
    #[error("max size exceeded: {max}")]
    MaxSizeExceeded { max: usize },
}

/// A script refused by the sandbox before anything ran
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Rejection {
    pub node_kinds: BTreeSet<NodeKind>,
    pub calls: BTreeSet<String>,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "script rejected by sandbox")?;
        if !self.node_kinds.is_empty() {
            let kinds: Vec<&str> = self.node_kinds.iter().map(|k| k.name()).collect();
            write!(f, "; disallowed syntax: {}", kinds.join(", "))?;
        }
        if !self.calls.is_empty() {
            let calls: Vec<&str> = self.calls.iter().map(String::as_str).collect();
            write!(f, "; disallowed calls: {}", calls.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for Rejection {}

/// Script misuse of the element constructors
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("{element} has no field named {field}")]
    UnknownField { element: String, field: String },
    #[error("{element}({field}=...) was given an element that is already built; use _(...) to pass arguments instead")]
    PrebuiltChild { element: String, field: String },
    #[error("name {0} is not defined")]
    UnknownName(String),
    #[error("{0} is not callable")]
    NotCallable(String),
    #[error("{element} takes at most {max} positional arguments, {given} given")]
    TooManyArguments {
        element: String,
        max: usize,
        given: usize,
    },
    #[error("{element} got multiple values for field {field}")]
    DuplicateArgument { element: String, field: String },
    #[error("bad operand for unary minus: {0}")]
    BadOperand(String),
    #[error("only element constructors can open a scope, found {0}")]
    NotAScope(String),
    #[error("scope {0} is not the innermost open scope")]
    ScopeMismatch(String),
    #[error("scope {0} was never closed")]
    UnclosedScope(String),
    #[error("script did not produce any element")]
    EmptyDocument,
    #[error("{0} is not supported at run time")]
    Unsupported(String),
}

/// Strict validation failure escalated at the document boundary
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{tag} failed validation with {count} violation(s); first: {first}")]
pub struct ValidationError {
    pub tag: String,
    pub count: usize,
    pub first: String,
}

/// Catalogue or master-schema data that cannot be used
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("malformed data: {0}")]
    Malformed(String),
    #[error("type {ty} field {field} does not name a known element type")]
    UnresolvedType { ty: String, field: String },
    #[error("type {ty} has unknown base {base}")]
    UnknownBase { ty: String, base: String },
    #[error("type {0} inherits from itself")]
    CyclicBase(String),
    #[error("element {0} is not declared in the master schema")]
    UndeclaredElement(String),
    #[error("master schema is not loaded")]
    Unavailable,
}

/// Error category
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error(transparent)]
    Lexical(#[from] LexicalError),
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Security(#[from] SecurityError),
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error(transparent)]
    Usage(#[from] UsageError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("io error: {0}")]
    Io(String),
}

/// Main error type for zscore
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    span: Span,
    message: String,
}

impl Error {
    pub fn new(kind: impl Into<ErrorKind>, span: Span) -> Self {
        let kind = kind.into();
        let message = kind.to_string();
        Self {
            kind,
            span,
            message,
        }
    }

    pub fn with_message(kind: impl Into<ErrorKind>, span: Span, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            span,
            message: message.into(),
        }
    }

    /// Error without a meaningful source location
    pub fn bare(kind: impl Into<ErrorKind>) -> Self {
        Self::new(kind, Span::empty())
    }

    /// Create error at specific position
    pub fn at(kind: impl Into<ErrorKind>, pos: Pos) -> Self {
        Self::new(kind, Span::new(pos, pos))
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Attach a span if the error does not carry one yet
    pub fn or_span(mut self, span: Span) -> Self {
        if self.span.is_empty() {
            self.span = span;
        }
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.span.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "error at {}: {}", self.span.start, self.message)
        }
    }
}

// no source: `message` already renders `kind`
impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::bare(ErrorKind::Io(err.to_string()))
    }
}

/// Result type alias for zscore
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pos_display() {
        let pos = Pos::new(42, 10, 5);
        assert_eq!(pos.to_string(), "10:5");
    }

    #[test]
    fn test_error_display_with_span() {
        let err = Error::at(LexicalError::InvalidEscape, Pos::new(10, 2, 5));
        let display = err.to_string();
        assert!(display.contains("error at 2:5"));
        assert!(display.contains("invalid escape sequence"));
    }

    #[test]
    fn test_bare_error_display() {
        let err = Error::bare(UsageError::EmptyDocument);
        assert_eq!(err.to_string(), "script did not produce any element");
        assert!(matches!(
            err.kind(),
            ErrorKind::Usage(UsageError::EmptyDocument)
        ));
    }

    #[test]
    fn test_error_chain_prints_message_once() {
        let err = anyhow::Error::new(Error::bare(UsageError::EmptyDocument));
        assert_eq!(format!("{err:#}"), "script did not produce any element");
        assert_eq!(err.chain().count(), 1);
    }

    #[test]
    fn test_or_span_keeps_existing() {
        let span = Span::new(Pos::new(0, 1, 1), Pos::new(3, 1, 4));
        let other = Span::new(Pos::new(5, 2, 1), Pos::new(6, 2, 2));
        let err = Error::new(UsageError::EmptyDocument, span).or_span(other);
        assert_eq!(err.span(), span);
        let err = Error::bare(UsageError::EmptyDocument).or_span(other);
        assert_eq!(err.span(), other);
    }

    #[test]
    fn test_rejection_display_lists_both_sets() {
        let mut rejection = Rejection::default();
        rejection.node_kinds.insert(NodeKind::For);
        rejection.calls.insert("print".to_string());
        let text = rejection.to_string();
        assert!(text.contains("for"));
        assert!(text.contains("print"));
    }
}
