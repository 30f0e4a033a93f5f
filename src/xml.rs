//! XML reader and the document-to-script translator
//!
//! The reader understands the subset of XML that score documents use:
//! elements, attributes, text and entity references. Declarations,
//! DOCTYPEs, comments and processing instructions are skipped; CDATA
//! sections contribute their content as text.

use std::fmt::Write as _;

use tracing::debug;

use crate::error::{Error, Result, SecurityError, Span, SyntaxError};
use crate::lexer::Cursor;
use crate::naming;
use crate::node::ElementNode;
use crate::value::quote;

/// Nesting limit for documents read from disk
pub const MAX_DEPTH: usize = 256;

/// Read a document and return its root element
pub fn parse(text: &str) -> Result<ElementNode> {
    let mut parser = Parser::new(text.as_bytes());
    let root = parser.parse()?;
    debug!(tag = root.tag(), nodes = root.node_count(), "read xml document");
    Ok(root)
}

/// Translate a document into a script that rebuilds it
pub fn to_script(text: &str) -> Result<String> {
    let root = parse(text)?;
    let mut out = String::new();
    write_statement(&mut out, &root, 0);
    Ok(out)
}

fn write_statement(out: &mut String, node: &ElementNode, depth: usize) {
    let indent = "    ".repeat(depth);
    let call = constructor_call(node);
    if node.children().is_empty() {
        let _ = writeln!(out, "{indent}{call}");
        return;
    }
    let _ = writeln!(out, "{indent}with {call}:");
    for child in node.children() {
        write_statement(out, child, depth + 1);
    }
}

fn constructor_call(node: &ElementNode) -> String {
    let mut args = Vec::with_capacity(node.attributes().len() + 1);
    if let Some(text) = node.text() {
        args.push(quote(text));
    }
    for (name, value) in node.attributes() {
        args.push(format!("{}={}", naming::to_field_name(name), quote(value)));
    }
    format!("{}({})", naming::to_type_name(node.tag()), args.join(", "))
}

/// An element whose closing tag has not been read yet
#[derive(Debug)]
struct OpenElement {
    name: String,
    node: ElementNode,
    text: String,
}

impl OpenElement {
    fn finish(mut self) -> ElementNode {
        if !self.text.trim().is_empty() {
            self.node.set_text(self.text);
        }
        self.node
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Content {
    ChildStart,
    Closed,
}

/// XML reader over a byte cursor
#[derive(Debug)]
pub struct Parser<'a> {
    cursor: Cursor<'a>,
}

impl<'a> Parser<'a> {
    pub const fn new(input: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(input),
        }
    }

    pub fn parse(&mut self) -> Result<ElementNode> {
        self.skip_prolog()?;
        let root = self.parse_element()?;
        self.skip_misc()?;

        if !self.cursor.is_eof() {
            return Err(self.error_here("content after the root element"));
        }
        Ok(root)
    }

    /// Declaration, DOCTYPE, comments and processing instructions before
    /// the root
    fn skip_prolog(&mut self) -> Result<()> {
        self.skip_misc()?;
        if self.cursor.peek_bytes(9) == Some(b"<!DOCTYPE") {
            self.skip_doctype()?;
            self.skip_misc()?;
        }
        Ok(())
    }

    fn skip_misc(&mut self) -> Result<()> {
        loop {
            self.cursor.skip_whitespace();
            if self.cursor.peek_bytes(2) == Some(b"<?") {
                self.cursor.advance_by(2);
                self.skip_until(b"?>")?;
            } else if self.cursor.peek_bytes(4) == Some(b"<!--") {
                self.cursor.advance_by(4);
                self.skip_until(b"-->")?;
            } else {
                return Ok(());
            }
        }
    }

    fn skip_doctype(&mut self) -> Result<()> {
        // an internal subset may contain '>' inside brackets
        let mut brackets = 0usize;
        while let Some(b) = self.cursor.current() {
            self.cursor.advance();
            match b {
                b'[' => brackets += 1,
                b']' => brackets = brackets.saturating_sub(1),
                b'>' if brackets == 0 => return Ok(()),
                _ => {}
            }
        }
        Err(self.error_here("unterminated DOCTYPE"))
    }

    /// Read the element at the cursor. Open ancestors live on an explicit
    /// stack, so document depth never grows the call stack.
    fn parse_element(&mut self) -> Result<ElementNode> {
        let mut open: Vec<OpenElement> = Vec::new();
        loop {
            if open.len() >= MAX_DEPTH {
                return Err(Error::at(
                    SecurityError::MaxDepthExceeded { max: MAX_DEPTH },
                    self.cursor.position(),
                ));
            }
            let (element, empty) = self.start_tag()?;
            if empty {
                match open.last_mut() {
                    Some(parent) => parent.node.push_child(element.node),
                    None => return Ok(element.node),
                }
            } else {
                open.push(element);
            }

            while let Some(current) = open.last_mut() {
                if self.content(current)? == Content::ChildStart {
                    break;
                }
                let Some(closed) = open.pop() else {
                    break;
                };
                let node = closed.finish();
                match open.last_mut() {
                    Some(parent) => parent.node.push_child(node),
                    None => return Ok(node),
                }
            }
        }
    }

    /// `<name attr="...">` or `<name ... />`; the flag is set for the latter
    fn start_tag(&mut self) -> Result<(OpenElement, bool)> {
        self.expect_byte(b'<')?;
        if self.cursor.current() == Some(b'/') {
            return Err(self.error_here("unexpected closing tag"));
        }

        let name = self.parse_name()?;
        let mut node = ElementNode::new(name.as_str());
        self.parse_attributes(&mut node)?;

        let empty = self.cursor.consume(b'/');
        self.expect_byte(b'>')?;
        Ok((
            OpenElement {
                name,
                node,
                text: String::new(),
            },
            empty,
        ))
    }

    /// Collect text into `element` until its closing tag (consumed) or the
    /// start of a child (left in place)
    fn content(&mut self, element: &mut OpenElement) -> Result<Content> {
        loop {
            if self.cursor.peek_bytes(2) == Some(b"</") {
                self.cursor.advance_by(2);
                let close_name = self.parse_name()?;
                if close_name != element.name {
                    return Err(self.error_here("mismatched closing tag"));
                }
                self.cursor.skip_whitespace();
                self.expect_byte(b'>')?;
                return Ok(Content::Closed);
            }
            if self.cursor.peek_bytes(4) == Some(b"<!--") {
                self.cursor.advance_by(4);
                self.skip_until(b"-->")?;
                continue;
            }
            if self.cursor.peek_bytes(9) == Some(b"<![CDATA[") {
                self.cursor.advance_by(9);
                let start = self.cursor.pos();
                self.skip_until(b"]]>")?;
                let raw = self.cursor.slice_from(start);
                let raw = raw.get(..raw.len().saturating_sub(3)).unwrap_or_default();
                element.text.push_str(&bytes_to_string(raw)?);
                continue;
            }
            if self.cursor.peek_bytes(2) == Some(b"<?") {
                self.cursor.advance_by(2);
                self.skip_until(b"?>")?;
                continue;
            }
            if self.cursor.current() == Some(b'<') {
                return Ok(Content::ChildStart);
            }
            if self.cursor.is_eof() {
                return Err(self.error_here("unterminated element"));
            }
            element.text.push_str(&self.parse_text()?);
        }
    }

    fn parse_attributes(&mut self, node: &mut ElementNode) -> Result<()> {
        loop {
            self.cursor.skip_whitespace();
            match self.cursor.current() {
                Some(b'/' | b'>') => return Ok(()),
                Some(_) => {}
                None => return Err(self.error_here("unexpected end of input")),
            }

            let name = self.parse_name()?;
            self.cursor.skip_whitespace();
            self.expect_byte(b'=')?;
            self.cursor.skip_whitespace();
            let value = self.parse_attribute_value()?;

            if node.attribute(&name).is_some() {
                return Err(self.error_here("duplicate attribute"));
            }
            node.set_attribute(name, value);
        }
    }

    fn parse_attribute_value(&mut self) -> Result<String> {
        let quote = match self.cursor.current() {
            Some(q @ (b'"' | b'\'')) => q,
            _ => return Err(self.error_here("expected quoted attribute value")),
        };
        self.cursor.advance();

        let start = self.cursor.pos();
        while let Some(b) = self.cursor.current() {
            if b == quote {
                let raw = self.cursor.slice_from(start);
                self.cursor.advance();
                return decode_entities(&bytes_to_string(raw)?);
            }
            self.cursor.advance();
        }
        Err(self.error_here("unterminated attribute value"))
    }

    fn parse_text(&mut self) -> Result<String> {
        let start = self.cursor.pos();
        while let Some(b) = self.cursor.current() {
            if b == b'<' {
                break;
            }
            self.cursor.advance();
        }
        decode_entities(&bytes_to_string(self.cursor.slice_from(start))?)
    }

    fn parse_name(&mut self) -> Result<String> {
        let start = self.cursor.pos();
        match self.cursor.current() {
            Some(b) if is_name_start(b) => self.cursor.advance(),
            _ => return Err(self.error_here("expected name")),
        }
        while self.cursor.current().is_some_and(is_name_char) {
            self.cursor.advance();
        }
        bytes_to_string(self.cursor.slice_from(start))
    }

    fn skip_until(&mut self, pattern: &[u8]) -> Result<()> {
        while self.cursor.current().is_some() {
            if self.cursor.peek_bytes(pattern.len()) == Some(pattern) {
                self.cursor.advance_by(pattern.len());
                return Ok(());
            }
            self.cursor.advance();
        }
        Err(self.error_here("unterminated markup"))
    }

    fn expect_byte(&mut self, expected: u8) -> Result<()> {
        if self.cursor.consume(expected) {
            Ok(())
        } else {
            Err(self.error_here(&format!("expected {:?}", char::from(expected))))
        }
    }

    fn error_here(&self, message: &str) -> Error {
        let pos = self.cursor.position();
        Error::new(SyntaxError::Markup(message.to_string()), Span::new(pos, pos))
    }
}

fn bytes_to_string(bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|_| Error::bare(SyntaxError::Markup("invalid utf-8".to_string())))
}

const fn is_name_start(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'_' | b':') || b >= 0x80
}

const fn is_name_char(b: u8) -> bool {
    is_name_start(b) || matches!(b, b'0'..=b'9' | b'-' | b'.')
}

fn decode_entities(input: &str) -> Result<String> {
    if !input.contains('&') {
        return Ok(input.to_string());
    }
    let mut result = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        result.push_str(rest.get(..amp).unwrap_or_default());
        let after = rest.get(amp + 1..).unwrap_or_default();
        let Some(semi) = after.find(';') else {
            return Err(invalid_entity(after));
        };
        let entity = after.get(..semi).unwrap_or_default();
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => decode_numeric_entity(entity),
        };
        result.push(decoded.ok_or_else(|| invalid_entity(entity))?);
        rest = after.get(semi + 1..).unwrap_or_default();
    }
    result.push_str(rest);
    Ok(result)
}

fn invalid_entity(entity: &str) -> Error {
    Error::with_message(
        SyntaxError::Markup("invalid entity".to_string()),
        Span::empty(),
        format!("invalid xml entity &{entity}"),
    )
}

fn decode_numeric_entity(entity: &str) -> Option<char> {
    if let Some(hex) = entity.strip_prefix("#x") {
        u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
    } else if let Some(dec) = entity.strip_prefix('#') {
        dec.parse::<u32>().ok().and_then(char::from_u32)
    } else {
        None
    }
}
