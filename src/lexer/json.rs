//! JSON lexer for catalogue and schema data files

use crate::error::{Error, LexicalError, Result, Span};
use crate::lexer::cursor::Cursor;
use crate::lexer::token::{Token, TokenKind};

/// JSON lexer that tokenizes JSON input
#[derive(Clone, Debug)]
pub struct JsonLexer<'a> {
    cursor: Cursor<'a>,
    allow_comments: bool,
}

impl<'a> JsonLexer<'a> {
    /// Create a new JSON lexer from input bytes
    pub const fn new(input: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(input),
            allow_comments: false,
        }
    }

    /// Create a new JSON lexer that skips `//` and `/* */` comments
    pub const fn with_comments(input: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(input),
            allow_comments: true,
        }
    }

    /// Get the next token from the input
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_ignorable()?;

        let start = self.cursor.position();

        let kind = match self.cursor.current() {
            None => TokenKind::Eof,
            Some(b) => match b {
                b'{' => self.single(TokenKind::LeftBrace),
                b'}' => self.single(TokenKind::RightBrace),
                b'[' => self.single(TokenKind::LeftBracket),
                b']' => self.single(TokenKind::RightBracket),
                b':' => self.single(TokenKind::Colon),
                b',' => self.single(TokenKind::Comma),
                b'"' => self.lex_string()?,
                b'n' => self.lex_keyword(b"null", TokenKind::Null)?,
                b't' => self.lex_keyword(b"true", TokenKind::True)?,
                b'f' => self.lex_keyword(b"false", TokenKind::False)?,
                b'-' | b'0'..=b'9' => self.lex_number()?,
                other => {
                    return Err(Error::at(
                        LexicalError::InvalidCharacter(char::from(other)),
                        start,
                    ));
                }
            },
        };

        let end = self.cursor.position();
        Ok(Token::new(kind, Span::new(start, end)))
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.cursor.advance();
        kind
    }

    /// Lex a string literal
    fn lex_string(&mut self) -> Result<TokenKind> {
        // Consume opening quote
        self.cursor.advance();

        let mut bytes = Vec::new();

        loop {
            match self.cursor.current() {
                None => {
                    return Err(Error::at(
                        LexicalError::UnterminatedString,
                        self.cursor.position(),
                    ));
                }
                Some(b'"') => {
                    self.cursor.advance();
                    break;
                }
                Some(b'\\') => {
                    self.cursor.advance();
                    let escaped = match self.cursor.current() {
                        Some(b'"') => '"',
                        Some(b'\\') => '\\',
                        Some(b'/') => '/',
                        Some(b'b') => '\x08',
                        Some(b'f') => '\x0C',
                        Some(b'n') => '\n',
                        Some(b'r') => '\r',
                        Some(b't') => '\t',
                        Some(b'u') => {
                            self.cursor.advance();
                            let ch = self.lex_unicode_escape()?;
                            let mut buf = [0; 4];
                            bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                            continue;
                        }
                        _ => {
                            return Err(Error::at(
                                LexicalError::InvalidEscape,
                                self.cursor.position(),
                            ));
                        }
                    };
                    let mut buf = [0; 4];
                    bytes.extend_from_slice(escaped.encode_utf8(&mut buf).as_bytes());
                    self.cursor.advance();
                }
                Some(b) => {
                    // JSON strings cannot contain control characters
                    if b < 0x20 {
                        return Err(Error::at(
                            LexicalError::InvalidCharacter(char::from(b)),
                            self.cursor.position(),
                        ));
                    }
                    bytes.push(b);
                    self.cursor.advance();
                }
            }
        }

        String::from_utf8(bytes)
            .map(TokenKind::String)
            .map_err(|_| Error::at(LexicalError::InvalidUtf8, self.cursor.position()))
    }

    fn skip_ignorable(&mut self) -> Result<()> {
        loop {
            self.cursor.skip_whitespace();
            if self.allow_comments && self.cursor.current() == Some(b'/') {
                self.skip_comment()?;
                continue;
            }
            break;
        }
        Ok(())
    }

    fn skip_comment(&mut self) -> Result<()> {
        match self.cursor.peek(1) {
            Some(b'/') => {
                self.cursor.advance_by(2);
                while let Some(b) = self.cursor.current() {
                    self.cursor.advance();
                    if b == b'\n' {
                        break;
                    }
                }
                Ok(())
            }
            Some(b'*') => {
                self.cursor.advance_by(2);
                while self.cursor.current().is_some() {
                    if self.cursor.peek_bytes(2) == Some(b"*/") {
                        self.cursor.advance_by(2);
                        return Ok(());
                    }
                    self.cursor.advance();
                }
                Err(Error::at(
                    LexicalError::UnterminatedString,
                    self.cursor.position(),
                ))
            }
            _ => Err(Error::at(
                LexicalError::InvalidCharacter('/'),
                self.cursor.position(),
            )),
        }
    }

    /// Lex a unicode escape sequence (\uXXXX)
    fn lex_unicode_escape(&mut self) -> Result<char> {
        let start_pos = self.cursor.position();
        let mut code: u32 = 0;

        for _ in 0..4 {
            let digit = self
                .cursor
                .current()
                .and_then(|b| char::from(b).to_digit(16))
                .ok_or_else(|| Error::at(LexicalError::InvalidEscape, self.cursor.position()))?;
            code = code * 16 + digit;
            self.cursor.advance();
        }

        char::from_u32(code).ok_or_else(|| Error::at(LexicalError::InvalidEscape, start_pos))
    }

    fn lex_keyword(&mut self, word: &[u8], kind: TokenKind) -> Result<TokenKind> {
        if self.cursor.peek_bytes(word.len()) == Some(word) {
            self.cursor.advance_by(word.len());
            Ok(kind)
        } else {
            let found = self.cursor.current().map_or('?', char::from);
            Err(Error::at(
                LexicalError::InvalidCharacter(found),
                self.cursor.position(),
            ))
        }
    }

    /// Lex a number literal
    fn lex_number(&mut self) -> Result<TokenKind> {
        let start = self.cursor.pos();

        self.cursor.consume(b'-');

        // Integer part
        match self.cursor.current() {
            Some(b'0') => self.cursor.advance(),
            Some(b'1'..=b'9') => self.skip_digits(),
            _ => return Err(self.invalid_number(start)),
        }

        // Optional fraction part
        if self.cursor.consume(b'.') {
            if !matches!(self.cursor.current(), Some(b'0'..=b'9')) {
                return Err(self.invalid_number(start));
            }
            self.skip_digits();
        }

        // Optional exponent part
        if matches!(self.cursor.current(), Some(b'e' | b'E')) {
            self.cursor.advance();
            if matches!(self.cursor.current(), Some(b'+' | b'-')) {
                self.cursor.advance();
            }
            if !matches!(self.cursor.current(), Some(b'0'..=b'9')) {
                return Err(self.invalid_number(start));
            }
            self.skip_digits();
        }

        let text = String::from_utf8_lossy(self.cursor.slice_from(start));
        text.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| self.invalid_number(start))
    }

    fn skip_digits(&mut self) {
        while let Some(b'0'..=b'9') = self.cursor.current() {
            self.cursor.advance();
        }
    }

    fn invalid_number(&self, start: usize) -> Error {
        let text = String::from_utf8_lossy(self.cursor.slice_from(start)).into_owned();
        Error::at(LexicalError::InvalidNumber(text), self.cursor.position())
    }
}
