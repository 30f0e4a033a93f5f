//! Master schema: the document grammar used for incremental validation
//!
//! The grammar is a simplified, tag-keyed rendition of the MusicXML schema.
//! Each element declares its attributes and either a text rule or a
//! sequence of particles. [`SchemaRegistry`] compiles a per-tag
//! [`CompiledSchema`] from it on demand.

mod registry;
mod validate;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::info;

use crate::error::{Error, Result, SchemaError};
use crate::json::{self, Object, Value};

pub use registry::SchemaRegistry;
pub use validate::{CompiledSchema, ValidationMode, Violation, ViolationKind};

const DEFAULT_SCHEMA: &str = include_str!("../schema/musicxml.json");

/// Lexical type of a text or attribute value
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ValueKind {
    #[default]
    String,
    Integer,
    Decimal,
}

/// Constraint on a text or attribute value
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValueRule {
    pub kind: ValueKind,
    /// Allowed values; empty means any value of `kind`
    pub values: Vec<String>,
    /// Inclusive numeric bounds
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ValueRule {
    pub fn accepts(&self, value: &str) -> bool {
        if !self.values.is_empty() && !self.values.iter().any(|v| v == value) {
            return false;
        }
        let text = value.trim();
        match self.kind {
            ValueKind::String => return true,
            ValueKind::Integer if text.parse::<i64>().is_err() => return false,
            ValueKind::Integer | ValueKind::Decimal => {}
        }
        let Some(number) = text.parse::<f64>().ok().filter(|n| n.is_finite()) else {
            return false;
        };
        self.min.map_or(true, |min| number >= min) && self.max.map_or(true, |max| number <= max)
    }
}

impl fmt::Display for ValueRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.values.is_empty() {
            let quoted: Vec<String> = self.values.iter().map(|v| format!("{v:?}")).collect();
            return write!(f, "one of {}", quoted.join(", "));
        }
        match self.kind {
            ValueKind::String => return f.write_str("any text"),
            ValueKind::Integer => f.write_str("an integer")?,
            ValueKind::Decimal => f.write_str("a decimal")?,
        }
        match (self.min, self.max) {
            (Some(min), Some(max)) => write!(f, " in {min}..={max}"),
            (Some(min), None) => write!(f, " >= {min}"),
            (None, Some(max)) => write!(f, " <= {max}"),
            (None, None) => Ok(()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AttributeRule {
    pub required: bool,
    pub value: ValueRule,
}

/// What a particle matches
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Term {
    Element(String),
    Choice(Vec<String>),
}

impl Term {
    pub fn matches(&self, tag: &str) -> bool {
        match self {
            Self::Element(name) => name == tag,
            Self::Choice(names) => names.iter().any(|n| n == tag),
        }
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        let names: &[String] = match self {
            Self::Element(name) => std::slice::from_ref(name),
            Self::Choice(names) => names,
        };
        names.iter().map(String::as_str)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Element(name) => f.write_str(name),
            Self::Choice(names) => write!(f, "one of ({})", names.join(" | ")),
        }
    }
}

/// One step of a content sequence
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Particle {
    pub term: Term,
    pub min: usize,
    /// `None` means unbounded
    pub max: Option<usize>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum Content {
    #[default]
    Empty,
    Text(ValueRule),
    Sequence(Vec<Particle>),
}

/// Grammar for a single tag
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ElementRule {
    pub attributes: IndexMap<String, AttributeRule>,
    pub content: Content,
}

/// Parsed master schema
#[derive(Clone, Debug, Default)]
pub struct MasterSchema {
    format: String,
    version: String,
    elements: HashMap<String, Arc<ElementRule>>,
}

impl MasterSchema {
    /// Schema embedded in the crate
    pub fn load_default() -> Result<Self> {
        Self::from_json(DEFAULT_SCHEMA)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let root = json::parse(text)?;
        let root = root
            .as_object()
            .ok_or_else(|| malformed("master schema must be an object"))?;

        let mut reader = Reader::default();
        if let Some(types) = root.get("simple_types") {
            for (name, body) in object(types, "simple_types")? {
                let rule = reader.value_rule(body, name)?;
                reader.simple_types.insert(name.clone(), rule);
            }
        }
        if let Some(groups) = root.get("attribute_groups") {
            for (name, body) in object(groups, "attribute_groups")? {
                let attributes = reader.attributes(body, name)?;
                reader.attribute_groups.insert(name.clone(), attributes);
            }
        }

        let declared = root
            .get("elements")
            .ok_or_else(|| malformed("missing \"elements\" object"))?;
        let mut elements = HashMap::new();
        for (tag, body) in object(declared, "elements")? {
            let rule = reader.element(body, tag)?;
            elements.insert(tag.clone(), Arc::new(rule));
        }

        let schema = Self {
            format: text_field(root, "format"),
            version: text_field(root, "version"),
            elements,
        };
        info!(
            format = %schema.format,
            version = %schema.version,
            elements = schema.elements.len(),
            "loaded master schema"
        );
        Ok(schema)
    }

    pub fn rule(&self, tag: &str) -> Option<&Arc<ElementRule>> {
        self.elements.get(tag)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.elements.contains_key(tag)
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

fn malformed(message: impl Into<String>) -> Error {
    Error::bare(SchemaError::Malformed(message.into()))
}

fn object<'v>(value: &'v Value, what: &str) -> Result<&'v Object> {
    value
        .as_object()
        .ok_or_else(|| malformed(format!("{what} must be an object")))
}

fn text_field(object: &Object, key: &str) -> String {
    object
        .get(key)
        .and_then(Value::as_string)
        .unwrap_or_default()
        .to_string()
}

fn check_keys(object: &Object, allowed: &[&str], what: &str) -> Result<()> {
    match object.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(key) => Err(malformed(format!("{what} has unknown key {key:?}"))),
        None => Ok(()),
    }
}

/// Occurrence count; whole non-negative numbers only
fn count(value: &Value, what: &str) -> Result<usize> {
    let n = value
        .as_number()
        .filter(|n| n.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(n))
        .ok_or_else(|| malformed(format!("{what} must be a whole number")))?;
    #[allow(clippy::as_conversions)]
    Ok(n as usize)
}

#[derive(Default)]
struct Reader {
    simple_types: HashMap<String, ValueRule>,
    attribute_groups: HashMap<String, IndexMap<String, AttributeRule>>,
}

impl Reader {
    fn value_rule(&self, value: &Value, what: &str) -> Result<ValueRule> {
        if let Some(name) = value.as_string() {
            return self.simple_type(name, what);
        }
        let object = object(value, what)?;
        check_keys(object, &["type", "kind", "values", "min", "max", "required"], what)?;

        let mut rule = match object.get("type") {
            Some(name) => {
                let name = name
                    .as_string()
                    .ok_or_else(|| malformed(format!("{what}.type must be a string")))?;
                self.simple_type(name, what)?
            }
            None => ValueRule::default(),
        };
        if let Some(kind) = object.get("kind") {
            rule.kind = match kind.as_string() {
                Some("string") => ValueKind::String,
                Some("integer") => ValueKind::Integer,
                Some("decimal") => ValueKind::Decimal,
                _ => return Err(malformed(format!("{what}.kind is not a known value kind"))),
            };
        }
        if let Some(values) = object.get("values") {
            let values = values
                .as_array()
                .ok_or_else(|| malformed(format!("{what}.values must be an array")))?;
            rule.values = values
                .iter()
                .map(|v| {
                    v.as_string()
                        .map(str::to_string)
                        .ok_or_else(|| malformed(format!("{what}.values must contain strings")))
                })
                .collect::<Result<_>>()?;
        }
        if let Some(min) = object.get("min") {
            rule.min = Some(
                min.as_number()
                    .ok_or_else(|| malformed(format!("{what}.min must be a number")))?,
            );
        }
        if let Some(max) = object.get("max") {
            rule.max = Some(
                max.as_number()
                    .ok_or_else(|| malformed(format!("{what}.max must be a number")))?,
            );
        }
        Ok(rule)
    }

    fn simple_type(&self, name: &str, what: &str) -> Result<ValueRule> {
        self.simple_types
            .get(name)
            .cloned()
            .ok_or_else(|| malformed(format!("{what} refers to unknown simple type {name:?}")))
    }

    fn attributes(&self, value: &Value, what: &str) -> Result<IndexMap<String, AttributeRule>> {
        let mut attributes = IndexMap::new();
        for (name, body) in object(value, what)? {
            let context = format!("{what}.{name}");
            let required = body
                .get("required")
                .map(|r| {
                    r.as_bool()
                        .ok_or_else(|| malformed(format!("{context}.required must be a boolean")))
                })
                .transpose()?
                .unwrap_or(false);
            let value = self.value_rule(body, &context)?;
            attributes.insert(name.clone(), AttributeRule { required, value });
        }
        Ok(attributes)
    }

    fn element(&self, value: &Value, tag: &str) -> Result<ElementRule> {
        let body = object(value, tag)?;
        check_keys(body, &["attributes", "attribute_groups", "sequence", "text"], tag)?;

        let mut attributes = IndexMap::new();
        if let Some(groups) = body.get("attribute_groups") {
            let groups = groups
                .as_array()
                .ok_or_else(|| malformed(format!("{tag}.attribute_groups must be an array")))?;
            for group in groups {
                let rules = group
                    .as_string()
                    .and_then(|name| self.attribute_groups.get(name))
                    .ok_or_else(|| malformed(format!("{tag} refers to an unknown attribute group")))?;
                attributes.extend(rules.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        if let Some(own) = body.get("attributes") {
            attributes.extend(self.attributes(own, &format!("{tag}.attributes"))?);
        }

        let content = match (body.get("sequence"), body.get("text")) {
            (Some(_), Some(_)) => {
                return Err(malformed(format!("{tag} declares both text and a sequence")))
            }
            (Some(sequence), None) => Content::Sequence(particles(sequence, tag)?),
            (None, Some(text)) => Content::Text(self.value_rule(text, &format!("{tag}.text"))?),
            (None, None) => Content::Empty,
        };
        Ok(ElementRule {
            attributes,
            content,
        })
    }
}

fn particles(value: &Value, tag: &str) -> Result<Vec<Particle>> {
    let items = value
        .as_array()
        .ok_or_else(|| malformed(format!("{tag}.sequence must be an array")))?;
    items
        .iter()
        .map(|item| {
            let body = object(item, tag)?;
            check_keys(body, &["element", "choice", "min", "max"], tag)?;
            let term = match (body.get("element"), body.get("choice")) {
                (Some(name), None) => Term::Element(
                    name.as_string()
                        .ok_or_else(|| malformed(format!("{tag}: particle element must be a string")))?
                        .to_string(),
                ),
                (None, Some(choice)) => Term::Choice(
                    choice
                        .as_array()
                        .ok_or_else(|| malformed(format!("{tag}: choice must be an array")))?
                        .iter()
                        .map(|v| {
                            v.as_string()
                                .map(str::to_string)
                                .ok_or_else(|| malformed(format!("{tag}: choice must contain strings")))
                        })
                        .collect::<Result<_>>()?,
                ),
                _ => {
                    return Err(malformed(format!(
                        "{tag}: particle needs exactly one of element or choice"
                    )))
                }
            };
            let min = body.get("min").map(|v| count(v, tag)).transpose()?.unwrap_or(1);
            let max = match body.get("max") {
                None => Some(1),
                Some(Value::String(s)) if s == "unbounded" => None,
                Some(v) => Some(count(v, tag)?),
            };
            if max.is_some_and(|max| max < min) {
                return Err(malformed(format!("{tag}: particle max is below min")));
            }
            Ok(Particle { term, min, max })
        })
        .collect()
}
