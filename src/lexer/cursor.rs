//! Byte cursor shared by the script, JSON and XML readers

use crate::error::Pos;

/// Forward-only view over input bytes that tracks line and column.
/// Columns count characters, not bytes.
#[derive(Clone, Debug)]
pub struct Cursor<'a> {
    input: &'a [u8],
    pos: usize,
    line: u32,
    col: u32,
}

impl<'a> Cursor<'a> {
    pub const fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    pub fn current(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    /// Byte `ahead` positions past the current one
    pub fn peek(&self, ahead: usize) -> Option<u8> {
        self.input.get(self.pos.saturating_add(ahead)).copied()
    }

    /// The next `len` bytes, or `None` near the end of input
    pub fn peek_bytes(&self, len: usize) -> Option<&'a [u8]> {
        self.input.get(self.pos..self.pos.saturating_add(len))
    }

    pub fn advance(&mut self) {
        let Some(b) = self.current() else {
            return;
        };
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.col = 1;
        } else if b & 0xC0 != 0x80 {
            // continuation bytes of a multi-byte char share its column
            self.col += 1;
        }
    }

    pub fn advance_by(&mut self, count: usize) {
        for _ in 0..count {
            self.advance();
        }
    }

    /// Skip spaces, tabs and line breaks
    pub fn skip_whitespace(&mut self) {
        while let Some(b' ' | b'\t' | b'\n' | b'\r') = self.current() {
            self.advance();
        }
    }

    /// Skip spaces, tabs and form feeds; line breaks are significant in scripts
    pub fn skip_blanks(&mut self) {
        while let Some(b' ' | b'\t' | b'\x0C') = self.current() {
            self.advance();
        }
    }

    /// Advance past `expected` if it is next
    pub fn consume(&mut self, expected: u8) -> bool {
        let matched = self.current() == Some(expected);
        if matched {
            self.advance();
        }
        matched
    }

    pub const fn position(&self) -> Pos {
        Pos::new(self.pos, self.line, self.col)
    }

    pub const fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// Byte offset into the input
    pub const fn pos(&self) -> usize {
        self.pos
    }

    /// Bytes consumed since offset `start`
    pub fn slice_from(&self, start: usize) -> &'a [u8] {
        self.input.get(start..self.pos).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_and_columns() {
        let mut cursor = Cursor::new(b"with Note():\n    pass\n");
        cursor.advance_by(12);
        assert_eq!(cursor.current(), Some(b'\n'));
        assert_eq!(cursor.position(), Pos::new(12, 1, 13));
        cursor.advance();
        cursor.skip_blanks();
        assert_eq!(cursor.position(), Pos::new(17, 2, 5));
        assert_eq!(cursor.peek_bytes(4), Some(&b"pass"[..]));
    }

    #[test]
    fn test_blanks_stop_at_line_break() {
        let mut cursor = Cursor::new(b" \t\x0C\n<a/>");
        cursor.skip_blanks();
        assert_eq!(cursor.current(), Some(b'\n'));
        cursor.skip_whitespace();
        assert_eq!(cursor.current(), Some(b'<'));
        assert_eq!(cursor.peek(1), Some(b'a'));
    }

    #[test]
    fn test_consume_and_slice() {
        let mut cursor = Cursor::new(b"<?xml?>");
        assert!(!cursor.consume(b'?'));
        assert!(cursor.consume(b'<'));
        let start = cursor.pos();
        cursor.advance_by(4);
        assert_eq!(cursor.slice_from(start), b"?xml");
        assert_eq!(cursor.peek_bytes(10), None);
    }

    #[test]
    fn test_end_of_input() {
        let mut cursor = Cursor::new(b"");
        assert!(cursor.is_eof());
        cursor.advance();
        assert_eq!(cursor.current(), None);
        assert_eq!(cursor.position(), Pos::new(0, 1, 1));
    }

    #[test]
    fn test_columns_count_chars() {
        let mut cursor = Cursor::new("Step('é')".as_bytes());
        cursor.advance_by(8);
        assert_eq!(cursor.current(), Some(b'\''));
        assert_eq!(cursor.position().col, 8);
    }
}
