//! Lexers for script text and JSON data files

pub mod cursor;
pub mod json;
pub mod script;
pub mod token;

pub use cursor::Cursor;
pub use json::JsonLexer;
pub use script::{Keyword, ScriptLexer, ScriptToken, ScriptTokenKind, StrKind};
pub use token::{Token, TokenKind};
