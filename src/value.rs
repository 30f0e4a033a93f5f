//! Runtime values passed to element constructors

use std::fmt::{self, Write as _};

use crate::catalogue::TypeId;

/// Arguments gathered by the `_` helper, resolved later by the parent
/// constructor into a child element
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ArgumentBundle {
    pub args: Vec<Value>,
    pub kwargs: Vec<(String, Value)>,
}

impl ArgumentBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional(args: impl IntoIterator<Item = Value>) -> Self {
        Self {
            args: args.into_iter().collect(),
            kwargs: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    #[must_use]
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.push((name.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }
}

/// A script value
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Tuple(Vec<Value>),
    /// Keyword arguments for a child; only reachable from Rust callers
    Map(Vec<(String, Value)>),
    Bundle(ArgumentBundle),
    /// An element that was already constructed, identified by its tag
    Element(String),
    /// An element constructor
    Type(TypeId),
    /// The `_` bundle helper
    Helper,
}

impl Value {
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Name of the value's kind, for error messages
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Bytes(_) => "bytes",
            Self::Tuple(_) => "tuple",
            Self::Map(_) => "mapping",
            Self::Bundle(_) => "argument bundle",
            Self::Element(_) => "element",
            Self::Type(_) => "element type",
            Self::Helper => "helper",
        }
    }

    /// Text written into attributes and element content
    pub fn stringify(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Quoted form used inside containers
    fn repr(&self) -> String {
        match self {
            Self::Str(s) => quote(s),
            other => other.to_string(),
        }
    }
}

/// Single-quoted literal, or double-quoted when that avoids escaping
pub(crate) fn quote(text: &str) -> String {
    let delimiter = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(text.len() + 2);
    out.push(delimiter);
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == delimiter => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(delimiter);
    out
}

/// Shortest round-trip digits, in scientific form when the decimal
/// exponent is below -4 or at least 16 (`1e-05`, `1e+16`)
fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let scientific = format!("{value:e}");
    let exponent = scientific
        .split_once('e')
        .and_then(|(_, exp)| exp.parse::<i32>().ok())
        .unwrap_or_default();
    if value == 0.0 || (-4..16).contains(&exponent) {
        let plain = value.to_string();
        return if plain.contains('.') {
            plain
        } else {
            format!("{plain}.0")
        };
    }

    let mantissa = scientific.split_once('e').map_or(scientific.as_str(), |(m, _)| m);
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{mantissa}e{sign}{:02}", exponent.unsigned_abs())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => f.write_str(&format_float(*x)),
            Self::Str(s) => f.write_str(s),
            Self::Bytes(bytes) => {
                f.write_str("b'")?;
                for &b in bytes {
                    match b {
                        b'\\' => f.write_str("\\\\")?,
                        b'\'' => f.write_str("\\'")?,
                        0x20..=0x7e => f.write_char(char::from(b))?,
                        _ => write!(f, "\\x{b:02x}")?,
                    }
                }
                f.write_str("'")
            }
            Self::Tuple(items) => {
                let parts: Vec<String> = items.iter().map(Self::repr).collect();
                if let [only] = parts.as_slice() {
                    write!(f, "({only},)")
                } else {
                    write!(f, "({})", parts.join(", "))
                }
            }
            Self::Map(entries) => {
                let parts: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", quote(k), v.repr()))
                    .collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            Self::Bundle(bundle) => {
                let mut parts: Vec<String> = bundle.args.iter().map(Self::repr).collect();
                parts.extend(bundle.kwargs.iter().map(|(k, v)| format!("{k}={}", v.repr())));
                write!(f, "_({})", parts.join(", "))
            }
            Self::Element(tag) => write!(f, "<{tag}>"),
            Self::Type(id) => write!(f, "<element type {}>", id.index()),
            Self::Helper => f.write_str("_"),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<ArgumentBundle> for Value {
    fn from(value: ArgumentBundle) -> Self {
        Self::Bundle(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::None, Into::into)
    }
}
