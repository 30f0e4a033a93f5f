//! Lexer for the indentation-based script language
//!
//! Produces the whole token stream up front, including synthetic
//! `Newline`, `Indent` and `Dedent` tokens. Line breaks inside brackets and
//! after a trailing backslash do not end a logical line.

use std::fmt;

use crate::error::{Error, LexicalError, Result, Span};
use crate::lexer::cursor::Cursor;
use crate::lexer::token::Token;

/// Reserved words of the script language
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Keyword {
    False,
    None,
    True,
    And,
    As,
    Assert,
    Await,
    Break,
    Class,
    Continue,
    Def,
    Del,
    Elif,
    Else,
    Except,
    Finally,
    For,
    From,
    Global,
    If,
    Import,
    In,
    Is,
    Lambda,
    Nonlocal,
    Not,
    Or,
    Pass,
    Raise,
    Return,
    Try,
    While,
    With,
    Yield,
}

impl Keyword {
    const ALL: [Self; 34] = [
        Self::False,
        Self::None,
        Self::True,
        Self::And,
        Self::As,
        Self::Assert,
        Self::Await,
        Self::Break,
        Self::Class,
        Self::Continue,
        Self::Def,
        Self::Del,
        Self::Elif,
        Self::Else,
        Self::Except,
        Self::Finally,
        Self::For,
        Self::From,
        Self::Global,
        Self::If,
        Self::Import,
        Self::In,
        Self::Is,
        Self::Lambda,
        Self::Nonlocal,
        Self::Not,
        Self::Or,
        Self::Pass,
        Self::Raise,
        Self::Return,
        Self::Try,
        Self::While,
        Self::With,
        Self::Yield,
    ];

    pub fn from_ident(ident: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kw| kw.as_str() == ident)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::False => "False",
            Self::None => "None",
            Self::True => "True",
            Self::And => "and",
            Self::As => "as",
            Self::Assert => "assert",
            Self::Await => "await",
            Self::Break => "break",
            Self::Class => "class",
            Self::Continue => "continue",
            Self::Def => "def",
            Self::Del => "del",
            Self::Elif => "elif",
            Self::Else => "else",
            Self::Except => "except",
            Self::Finally => "finally",
            Self::For => "for",
            Self::From => "from",
            Self::Global => "global",
            Self::If => "if",
            Self::Import => "import",
            Self::In => "in",
            Self::Is => "is",
            Self::Lambda => "lambda",
            Self::Nonlocal => "nonlocal",
            Self::Not => "not",
            Self::Or => "or",
            Self::Pass => "pass",
            Self::Raise => "raise",
            Self::Return => "return",
            Self::Try => "try",
            Self::While => "while",
            Self::With => "with",
            Self::Yield => "yield",
        }
    }
}

/// Flavour of a string literal, chosen by its prefix
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrKind {
    Text,
    Bytes,
    Format,
}

/// Script token types
#[derive(Clone, Debug, PartialEq)]
pub enum ScriptTokenKind {
    Name(String),
    Keyword(Keyword),
    Int(i64),
    Float(f64),
    Str { value: String, kind: StrKind },
    Op(&'static str),
    Newline,
    Indent,
    Dedent,
    Eof,
}

impl fmt::Display for ScriptTokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "name {name:?}"),
            Self::Keyword(kw) => write!(f, "'{}'", kw.as_str()),
            Self::Int(_) | Self::Float(_) => write!(f, "number"),
            Self::Str { .. } => write!(f, "string"),
            Self::Op(op) => write!(f, "'{op}'"),
            Self::Newline => write!(f, "end of line"),
            Self::Indent => write!(f, "indent"),
            Self::Dedent => write!(f, "dedent"),
            Self::Eof => write!(f, "end of input"),
        }
    }
}

pub type ScriptToken = Token<ScriptTokenKind>;

// Longest operators first so that matching is greedy
const OPERATORS: [&str; 47] = [
    "**=", "//=", ">>=", "<<=", "...", "**", "//", "<<", ">>", "<=", ">=", "==", "!=", "->", "+=",
    "-=", "*=", "/=", "%=", "&=", "|=", "^=", "@=", ":=", "+", "-", "*", "/", "%", "@", "&", "|",
    "^", "~", "<", ">", "(", ")", "[", "]", "{", "}", ",", ":", ";", ".", "=",
];

const STRING_PREFIXES: [&str; 8] = ["r", "b", "f", "u", "rb", "br", "fr", "rf"];

const TAB_WIDTH: usize = 8;

/// Tokenizer for script text
#[derive(Debug)]
pub struct ScriptLexer<'a> {
    cursor: Cursor<'a>,
    indents: Vec<usize>,
    brackets: usize,
    at_line_start: bool,
    tokens: Vec<ScriptToken>,
}

impl<'a> ScriptLexer<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(input),
            indents: vec![0],
            brackets: 0,
            at_line_start: true,
            tokens: Vec::new(),
        }
    }

    /// Tokenize the complete input
    pub fn tokenize(mut self) -> Result<Vec<ScriptToken>> {
        loop {
            if self.at_line_start && self.brackets == 0 && !self.indentation()? {
                continue;
            }
            self.cursor.skip_blanks();
            let start = self.cursor.position();

            let Some(b) = self.cursor.current() else {
                break;
            };

            let kind = match b {
                b'#' => {
                    self.skip_comment();
                    continue;
                }
                b'\\' => {
                    self.cursor.advance();
                    self.cursor.consume(b'\r');
                    if !self.cursor.consume(b'\n') {
                        return Err(Error::at(LexicalError::InvalidCharacter('\\'), start));
                    }
                    continue;
                }
                b'\n' | b'\r' => {
                    self.cursor.advance();
                    if b == b'\r' {
                        self.cursor.consume(b'\n');
                    }
                    if self.brackets == 0 {
                        self.at_line_start = true;
                        if self.needs_newline() {
                            ScriptTokenKind::Newline
                        } else {
                            continue;
                        }
                    } else {
                        continue;
                    }
                }
                b'"' | b'\'' => self.lex_string("")?,
                b'0'..=b'9' => self.lex_number()?,
                b'.' if matches!(self.cursor.peek(1), Some(b'0'..=b'9')) => self.lex_number()?,
                b if is_ident_start(b) => self.lex_name()?,
                _ => self.lex_operator()?,
            };

            let span = Span::new(start, self.cursor.position());
            self.tokens.push(Token::new(kind, span));
        }

        let end = self.cursor.position();
        let eof = Span::new(end, end);
        if self.needs_newline() {
            self.tokens.push(Token::new(ScriptTokenKind::Newline, eof));
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.tokens.push(Token::new(ScriptTokenKind::Dedent, eof));
        }
        self.tokens.push(Token::new(ScriptTokenKind::Eof, eof));
        Ok(self.tokens)
    }

    fn needs_newline(&self) -> bool {
        self.tokens.last().is_some_and(|t| {
            !matches!(
                t.kind,
                ScriptTokenKind::Newline | ScriptTokenKind::Indent | ScriptTokenKind::Dedent
            )
        })
    }

    /// Measure leading whitespace and emit indent/dedent tokens.
    /// Returns `false` when the line was blank and has been consumed.
    fn indentation(&mut self) -> Result<bool> {
        let start = self.cursor.position();
        let mut width = 0usize;
        loop {
            match self.cursor.current() {
                Some(b' ') => width += 1,
                Some(b'\t') => width = (width / TAB_WIDTH + 1) * TAB_WIDTH,
                Some(b'\x0C') => width = 0,
                _ => break,
            }
            self.cursor.advance();
        }

        match self.cursor.current() {
            None => {
                self.at_line_start = false;
                return Ok(true);
            }
            Some(b'#') => {
                self.skip_comment();
                self.skip_line_break();
                return Ok(false);
            }
            Some(b'\n' | b'\r') => {
                self.skip_line_break();
                return Ok(false);
            }
            Some(b'\\') => {
                // a continuation on a blank line joins with the next one
                return Ok(true);
            }
            Some(_) => {}
        }

        self.at_line_start = false;
        let here = self.cursor.position();
        let span = Span::new(start, here);
        let current = self.indents.last().copied().unwrap_or(0);

        if width > current {
            self.indents.push(width);
            self.tokens.push(Token::new(ScriptTokenKind::Indent, span));
        } else if width < current {
            while self.indents.last().is_some_and(|&level| level > width) {
                self.indents.pop();
                self.tokens.push(Token::new(ScriptTokenKind::Dedent, span));
            }
            if self.indents.last().copied() != Some(width) {
                return Err(Error::at(LexicalError::InconsistentIndent, here));
            }
        }
        Ok(true)
    }

    fn skip_comment(&mut self) {
        while let Some(b) = self.cursor.current() {
            if b == b'\n' || b == b'\r' {
                break;
            }
            self.cursor.advance();
        }
    }

    fn skip_line_break(&mut self) {
        if self.cursor.consume(b'\r') {
            self.cursor.consume(b'\n');
        } else {
            self.cursor.consume(b'\n');
        }
    }

    fn lex_name(&mut self) -> Result<ScriptTokenKind> {
        let start = self.cursor.pos();
        let start_pos = self.cursor.position();
        while self.cursor.current().is_some_and(is_ident_continue) {
            self.cursor.advance();
        }
        let ident = std::str::from_utf8(self.cursor.slice_from(start))
            .map_err(|_| Error::at(LexicalError::InvalidUtf8, start_pos))?
            .to_string();

        if matches!(self.cursor.current(), Some(b'"' | b'\'')) {
            let prefix = ident.to_ascii_lowercase();
            if STRING_PREFIXES.contains(&prefix.as_str()) {
                return self.lex_string(&prefix);
            }
        }

        Ok(Keyword::from_ident(&ident).map_or(ScriptTokenKind::Name(ident), ScriptTokenKind::Keyword))
    }

    fn lex_operator(&mut self) -> Result<ScriptTokenKind> {
        let start = self.cursor.position();
        for op in OPERATORS {
            if self.cursor.peek_bytes(op.len()) == Some(op.as_bytes()) {
                self.cursor.advance_by(op.len());
                match op {
                    "(" | "[" | "{" => self.brackets += 1,
                    ")" | "]" | "}" => self.brackets = self.brackets.saturating_sub(1),
                    _ => {}
                }
                return Ok(ScriptTokenKind::Op(op));
            }
        }
        let found = self.cursor.current().map_or('?', char::from);
        Err(Error::at(LexicalError::InvalidCharacter(found), start))
    }

    fn lex_number(&mut self) -> Result<ScriptTokenKind> {
        let start = self.cursor.pos();
        let start_pos = self.cursor.position();

        let radix = match (self.cursor.current(), self.cursor.peek(1)) {
            (Some(b'0'), Some(b'x' | b'X')) => 16,
            (Some(b'0'), Some(b'o' | b'O')) => 8,
            (Some(b'0'), Some(b'b' | b'B')) => 2,
            _ => 10,
        };

        let mut is_float = false;
        if radix == 10 {
            self.skip_digits();
            if self.cursor.current() == Some(b'.') {
                is_float = true;
                self.cursor.advance();
                self.skip_digits();
            }
            if matches!(self.cursor.current(), Some(b'e' | b'E')) {
                is_float = true;
                self.cursor.advance();
                if matches!(self.cursor.current(), Some(b'+' | b'-')) {
                    self.cursor.advance();
                }
                if !matches!(self.cursor.current(), Some(b'0'..=b'9')) {
                    return Err(self.invalid_number(start, start_pos));
                }
                self.skip_digits();
            }
        } else {
            self.cursor.advance_by(2);
            while self
                .cursor
                .current()
                .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_')
            {
                self.cursor.advance();
            }
        }

        if self.cursor.current().is_some_and(is_ident_continue) {
            return Err(self.invalid_number(start, start_pos));
        }

        let raw = String::from_utf8_lossy(self.cursor.slice_from(start)).replace('_', "");
        let parsed = if is_float {
            raw.parse::<f64>().ok().map(ScriptTokenKind::Float)
        } else if radix == 10 {
            raw.parse::<i64>().ok().map(ScriptTokenKind::Int)
        } else {
            raw.get(2..)
                .and_then(|digits| i64::from_str_radix(digits, radix).ok())
                .map(ScriptTokenKind::Int)
        };
        parsed.ok_or_else(|| self.invalid_number(start, start_pos))
    }

    fn skip_digits(&mut self) {
        while let Some(b'0'..=b'9' | b'_') = self.cursor.current() {
            self.cursor.advance();
        }
    }

    fn invalid_number(&self, start: usize, pos: crate::error::Pos) -> Error {
        let text = String::from_utf8_lossy(self.cursor.slice_from(start)).into_owned();
        Error::at(LexicalError::InvalidNumber(text), pos)
    }

    fn lex_string(&mut self, prefix: &str) -> Result<ScriptTokenKind> {
        let start_pos = self.cursor.position();
        let raw = prefix.contains('r');
        let kind = if prefix.contains('b') {
            StrKind::Bytes
        } else if prefix.contains('f') {
            StrKind::Format
        } else {
            StrKind::Text
        };

        let Some(quote) = self.cursor.current() else {
            return Err(Error::at(LexicalError::UnterminatedString, start_pos));
        };
        let triple = self.cursor.peek_bytes(3) == Some(&[quote, quote, quote][..]);
        self.cursor.advance_by(if triple { 3 } else { 1 });

        let mut bytes = Vec::new();
        loop {
            let Some(b) = self.cursor.current() else {
                return Err(Error::at(LexicalError::UnterminatedString, start_pos));
            };
            match b {
                _ if b == quote => {
                    if !triple {
                        self.cursor.advance();
                        break;
                    }
                    if self.cursor.peek_bytes(3) == Some(&[quote, quote, quote][..]) {
                        self.cursor.advance_by(3);
                        break;
                    }
                    bytes.push(b);
                    self.cursor.advance();
                }
                b'\n' | b'\r' if !triple => {
                    return Err(Error::at(LexicalError::UnterminatedString, start_pos));
                }
                b'\\' if raw => {
                    bytes.push(b);
                    self.cursor.advance();
                    if let Some(next) = self.cursor.current() {
                        bytes.push(next);
                        self.cursor.advance();
                    }
                }
                b'\\' => {
                    self.cursor.advance();
                    self.lex_escape(&mut bytes)?;
                }
                _ => {
                    bytes.push(b);
                    self.cursor.advance();
                }
            }
        }

        let value = String::from_utf8(bytes)
            .map_err(|_| Error::at(LexicalError::InvalidUtf8, start_pos))?;
        Ok(ScriptTokenKind::Str { value, kind })
    }

    fn lex_escape(&mut self, out: &mut Vec<u8>) -> Result<()> {
        let pos = self.cursor.position();
        let Some(b) = self.cursor.current() else {
            return Err(Error::at(LexicalError::UnterminatedString, pos));
        };
        let simple = match b {
            b'\n' => Some(None),
            b'\r' => {
                self.cursor.advance();
                self.cursor.consume(b'\n');
                return Ok(());
            }
            b'n' => Some(Some('\n')),
            b't' => Some(Some('\t')),
            b'r' => Some(Some('\r')),
            b'a' => Some(Some('\x07')),
            b'b' => Some(Some('\x08')),
            b'f' => Some(Some('\x0C')),
            b'v' => Some(Some('\x0B')),
            b'\\' => Some(Some('\\')),
            b'\'' => Some(Some('\'')),
            b'"' => Some(Some('"')),
            _ => None,
        };
        if let Some(ch) = simple {
            self.cursor.advance();
            if let Some(ch) = ch {
                push_char(out, ch);
            }
            return Ok(());
        }

        match b {
            b'0'..=b'7' => {
                let mut code = 0u32;
                for _ in 0..3 {
                    match self.cursor.current() {
                        Some(d @ b'0'..=b'7') => {
                            code = code * 8 + u32::from(d - b'0');
                            self.cursor.advance();
                        }
                        _ => break,
                    }
                }
                let ch = char::from_u32(code).ok_or_else(|| Error::at(LexicalError::InvalidEscape, pos))?;
                push_char(out, ch);
            }
            b'x' | b'u' | b'U' => {
                let digits = match b {
                    b'x' => 2,
                    b'u' => 4,
                    _ => 8,
                };
                self.cursor.advance();
                let mut code = 0u32;
                for _ in 0..digits {
                    let digit = self
                        .cursor
                        .current()
                        .and_then(|d| char::from(d).to_digit(16))
                        .ok_or_else(|| Error::at(LexicalError::InvalidEscape, pos))?;
                    code = code.saturating_mul(16).saturating_add(digit);
                    self.cursor.advance();
                }
                let ch = char::from_u32(code).ok_or_else(|| Error::at(LexicalError::InvalidEscape, pos))?;
                push_char(out, ch);
            }
            b'N' => return Err(Error::at(LexicalError::InvalidEscape, pos)),
            _ => {
                // unknown escapes are kept verbatim
                out.push(b'\\');
            }
        }
        Ok(())
    }
}

fn push_char(out: &mut Vec<u8>, ch: char) {
    let mut buf = [0; 4];
    out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
}

const fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
}

const fn is_ident_continue(b: u8) -> bool {
    is_ident_start(b) || b.is_ascii_digit()
}

/// Tokenize script text
pub fn tokenize(input: &str) -> Result<Vec<ScriptToken>> {
    ScriptLexer::new(input.as_bytes()).tokenize()
}
