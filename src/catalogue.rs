//! Static registration table of element types
//!
//! Element types are declared in a JSON data file. Each declaration lists
//! its fields in constructor order, may derive from a `base` type, and may
//! declare `nested` types that become visible inside its `with` block.
//! Loading flattens all of this once: every type ends up with its own
//! field table (children pre-resolved to a [`TypeId`]), canonical child
//! order and scope names, so nothing is searched at construction time.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::error::{Error, Result, SchemaError};
use crate::json::{self, Value};
use crate::naming;

/// Field name reserved for literal text content
pub const TEXT_FIELD: &str = "content";

const DEFAULT_CATALOGUE: &str = include_str!("../schema/catalogue.json");

/// Index of an element type inside its [`Catalogue`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(usize);

impl TypeId {
    pub const fn index(self) -> usize {
        self.0
    }
}

/// How a declared field is applied to a node
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Field {
    /// Attribute; `name` is the converted attribute name, already prefixed
    Attribute {
        name: String,
        namespace: Option<String>,
    },
    /// Child element of a pre-resolved type
    Child(TypeId),
    /// Literal text content
    Text,
}

/// Flattened element type
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementType {
    pub name: String,
    pub tag: String,
    pub fields: IndexMap<String, Field>,
    pub order: Vec<String>,
    /// Nested types of this type and its bases, bound inside a `with` block
    pub scope: IndexMap<String, TypeId>,
    pub base: Option<TypeId>,
    pub is_abstract: bool,
}

impl ElementType {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// Field bound by the positional argument at `index`
    pub fn positional(&self, index: usize) -> Option<(&str, &Field)> {
        self.fields
            .get_index(index)
            .map(|(name, field)| (name.as_str(), field))
    }

    pub fn child_slots(&self) -> impl Iterator<Item = (&str, TypeId)> {
        self.fields.iter().filter_map(|(name, field)| match field {
            Field::Child(ty) => Some((name.as_str(), *ty)),
            _ => None,
        })
    }

    /// Position of `tag` in the canonical child order
    pub fn order_of(&self, tag: &str) -> Option<usize> {
        self.order.iter().position(|t| t == tag)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// All element types plus the fixed document header
#[derive(Clone, Debug, Default)]
pub struct Catalogue {
    types: Vec<ElementType>,
    globals: IndexMap<String, TypeId>,
    declaration: String,
    doctypes: HashMap<String, String>,
}

// Declaration as written in the data file, before flattening
#[derive(Debug)]
struct Declared {
    name: String,
    parent: Option<usize>,
    fields: Option<Vec<String>>,
    namespaces: IndexMap<String, String>,
    order: Option<Vec<String>>,
    nested: IndexMap<String, usize>,
    base: Option<String>,
    is_abstract: bool,
}

impl Catalogue {
    /// Catalogue embedded in the crate
    pub fn load_default() -> Result<Self> {
        Self::from_json(DEFAULT_CATALOGUE)
    }

    /// Build a catalogue from its JSON description
    pub fn from_json(text: &str) -> Result<Self> {
        let root = json::parse(text)?;
        let declaration = root
            .get("declaration")
            .and_then(Value::as_string)
            .unwrap_or_default()
            .to_string();

        let mut doctypes = HashMap::new();
        if let Some(entries) = root.get("doctypes").and_then(Value::as_object) {
            for (tag, doctype) in entries {
                let doctype = doctype
                    .as_string()
                    .ok_or_else(|| malformed(format!("doctype for {tag} must be a string")))?;
                doctypes.insert(tag.clone(), doctype.to_string());
            }
        }

        let types = root
            .get("types")
            .and_then(Value::as_object)
            .ok_or_else(|| malformed("missing \"types\" object"))?;

        let mut declared = Vec::new();
        let mut global_decls = IndexMap::new();
        for (name, body) in types {
            let index = declare(&mut declared, name, body, None)?;
            global_decls.insert(name.clone(), index);
        }

        let catalogue = flatten(&declared, &global_decls, declaration, doctypes)?;
        info!(types = catalogue.types.len(), "loaded element catalogue");
        Ok(catalogue)
    }

    pub fn get(&self, id: TypeId) -> Option<&ElementType> {
        self.types.get(id.0)
    }

    /// Like [`Catalogue::get`], for ids that must come from this catalogue
    pub fn element(&self, id: TypeId) -> Result<&ElementType> {
        self.get(id)
            .ok_or_else(|| malformed(format!("unknown type id {}", id.0)))
    }

    /// Global (top-level, non-abstract) type by script name
    pub fn global(&self, name: &str) -> Option<TypeId> {
        self.globals.get(name).copied()
    }

    pub fn globals(&self) -> impl Iterator<Item = (&str, TypeId)> {
        self.globals.iter().map(|(name, id)| (name.as_str(), *id))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &ElementType)> {
        self.types.iter().enumerate().map(|(i, ty)| (TypeId(i), ty))
    }

    /// XML declaration line
    pub fn declaration(&self) -> &str {
        &self.declaration
    }

    /// DOCTYPE line for documents rooted at `tag`, when one is declared
    pub fn doctype(&self, tag: &str) -> Option<&str> {
        self.doctypes.get(tag).map(String::as_str)
    }

    /// Fixed preamble written before a document rooted at `tag`
    pub fn header(&self, tag: &str) -> String {
        let mut header = String::new();
        if !self.declaration.is_empty() {
            header.push_str(&self.declaration);
            header.push('\n');
        }
        if let Some(doctype) = self.doctype(tag) {
            header.push_str(doctype);
            header.push('\n');
        }
        header
    }
}

fn malformed(message: impl Into<String>) -> Error {
    Error::bare(SchemaError::Malformed(message.into()))
}

fn string_list(value: &Value, what: &str, ty: &str) -> Result<Vec<String>> {
    let items = value
        .as_array()
        .ok_or_else(|| malformed(format!("{ty}.{what} must be an array")))?;
    items
        .iter()
        .map(|item| {
            item.as_string()
                .map(str::to_string)
                .ok_or_else(|| malformed(format!("{ty}.{what} must contain strings")))
        })
        .collect()
}

fn declare(
    declared: &mut Vec<Declared>,
    name: &str,
    body: &Value,
    parent: Option<usize>,
) -> Result<usize> {
    let object = body
        .as_object()
        .ok_or_else(|| malformed(format!("type {name} must be an object")))?;

    for key in object.keys() {
        if !matches!(
            key.as_str(),
            "fields" | "namespaces" | "order" | "nested" | "base" | "abstract"
        ) {
            return Err(malformed(format!("type {name} has unknown key {key:?}")));
        }
    }

    let fields = object
        .get("fields")
        .map(|v| string_list(v, "fields", name))
        .transpose()?;
    let order = object
        .get("order")
        .map(|v| string_list(v, "order", name))
        .transpose()?;

    let mut namespaces = IndexMap::new();
    if let Some(entries) = object.get("namespaces") {
        let entries = entries
            .as_object()
            .ok_or_else(|| malformed(format!("{name}.namespaces must be an object")))?;
        for (field, ns) in entries {
            let ns = ns
                .as_string()
                .ok_or_else(|| malformed(format!("{name}.namespaces.{field} must be a string")))?;
            namespaces.insert(field.clone(), ns.to_string());
        }
    }

    let base = match object.get("base") {
        None => None,
        Some(value) => Some(
            value
                .as_string()
                .ok_or_else(|| malformed(format!("{name}.base must be a string")))?
                .to_string(),
        ),
    };
    let is_abstract = object
        .get("abstract")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let index = declared.len();
    declared.push(Declared {
        name: name.to_string(),
        parent,
        fields,
        namespaces,
        order,
        nested: IndexMap::new(),
        base,
        is_abstract,
    });

    if let Some(nested) = object.get("nested") {
        let nested = nested
            .as_object()
            .ok_or_else(|| malformed(format!("{name}.nested must be an object")))?;
        for (child_name, child_body) in nested {
            let child = declare(declared, child_name, child_body, Some(index))?;
            if let Some(decl) = declared.get_mut(index) {
                decl.nested.insert(child_name.clone(), child);
            }
        }
    }
    Ok(index)
}

fn decl(declared: &[Declared], index: usize) -> Result<&Declared> {
    declared
        .get(index)
        .ok_or_else(|| malformed(format!("dangling declaration {index}")))
}

/// Resolve `base` lexically: enclosing types' nested declarations first,
/// then the top level
fn resolve_base(
    declared: &[Declared],
    globals: &IndexMap<String, usize>,
    index: usize,
    base: &str,
) -> Option<usize> {
    let mut scope = declared.get(index).and_then(|d| d.parent);
    while let Some(enclosing) = scope {
        let outer = declared.get(enclosing)?;
        if let Some(&found) = outer.nested.get(base) {
            if found != index {
                return Some(found);
            }
        }
        scope = outer.parent;
    }
    globals.get(base).copied().filter(|&found| found != index)
}

/// `[index, base, base of base, ...]`
fn base_chain(bases: &[Option<usize>], declared: &[Declared], index: usize) -> Result<Vec<usize>> {
    let mut chain = vec![index];
    let mut current = index;
    while let Some(next) = bases.get(current).copied().flatten() {
        if chain.contains(&next) {
            let name = decl(declared, index)?.name.clone();
            return Err(Error::bare(SchemaError::CyclicBase(name)));
        }
        chain.push(next);
        current = next;
    }
    Ok(chain)
}

fn flatten(
    declared: &[Declared],
    globals: &IndexMap<String, usize>,
    declaration: String,
    doctypes: HashMap<String, String>,
) -> Result<Catalogue> {
    let mut bases = Vec::with_capacity(declared.len());
    for (index, d) in declared.iter().enumerate() {
        let base = match &d.base {
            None => None,
            Some(base) => Some(resolve_base(declared, globals, index, base).ok_or_else(|| {
                Error::bare(SchemaError::UnknownBase {
                    ty: d.name.clone(),
                    base: base.clone(),
                })
            })?),
        };
        bases.push(base);
    }

    let concrete_globals: IndexMap<String, usize> = globals
        .iter()
        .filter(|(_, &index)| declared.get(index).is_some_and(|d| !d.is_abstract))
        .map(|(name, &index)| (name.clone(), index))
        .collect();

    let mut types = Vec::with_capacity(declared.len());
    for (index, d) in declared.iter().enumerate() {
        let chain = base_chain(&bases, declared, index)?;
        let chain: Vec<&Declared> = chain
            .iter()
            .map(|&i| decl(declared, i))
            .collect::<Result<_>>()?;

        let field_names = chain
            .iter()
            .find_map(|c| c.fields.as_ref())
            .cloned()
            .unwrap_or_default();
        let order = chain
            .iter()
            .find_map(|c| c.order.as_ref())
            .cloned()
            .unwrap_or_default();

        // most-derived declaration wins
        let mut namespaces: IndexMap<&str, &str> = IndexMap::new();
        for c in chain.iter().rev() {
            for (field, ns) in &c.namespaces {
                namespaces.insert(field.as_str(), ns.as_str());
            }
        }

        let mut scope = IndexMap::new();
        for c in &chain {
            for (name, &nested) in &c.nested {
                scope.entry(name.clone()).or_insert(TypeId(nested));
            }
        }

        let mut fields = IndexMap::new();
        for field_name in field_names {
            let field = if field_name == TEXT_FIELD {
                Field::Text
            } else if field_name.starts_with(|c: char| c.is_lowercase()) {
                let namespace = namespaces.get(field_name.as_str()).map(|ns| (*ns).to_string());
                Field::Attribute {
                    name: naming::to_attribute_name(&field_name, namespace.as_deref()),
                    namespace,
                }
            } else {
                let child = scope
                    .get(&field_name)
                    .copied()
                    .or_else(|| concrete_globals.get(&field_name).map(|&i| TypeId(i)))
                    .ok_or_else(|| {
                        Error::bare(SchemaError::UnresolvedType {
                            ty: d.name.clone(),
                            field: field_name.clone(),
                        })
                    })?;
                Field::Child(child)
            };
            fields.insert(field_name, field);
        }

        types.push(ElementType {
            name: d.name.clone(),
            tag: naming::to_tag_name(&d.name),
            fields,
            order,
            scope,
            base: bases.get(index).copied().flatten().map(TypeId),
            is_abstract: d.is_abstract,
        });
    }

    let globals = concrete_globals
        .into_iter()
        .map(|(name, index)| (name, TypeId(index)))
        .collect();
    debug!(count = types.len(), "flattened element types");

    Ok(Catalogue {
        types,
        globals,
        declaration,
        doctypes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const SMALL: &str = r#"{
        "declaration": "<?xml version=\"1.0\"?>",
        "doctypes": { "score": "<!DOCTYPE score>" },
        "types": {
            "Text": { "abstract": true, "fields": ["content"] },
            "Score": {
                "fields": ["version", "Title", "Part"],
                "order": ["title", "part"],
                "nested": {
                    "Title": { "base": "Text" },
                    "Part": { "fields": ["id", "Note"] }
                }
            },
            "Note": {
                "fields": ["href", "Duration", "Pitch"],
                "namespaces": { "href": "xlink" },
                "nested": { "Duration": { "base": "Text" } }
            },
            "Pitch": { "fields": ["Step", "Octave"], "nested": { "Step": { "base": "Text" }, "Octave": { "base": "Text" } } },
            "Rest": { "base": "Note" }
        }
    }"#;

    fn small() -> Result<Catalogue> {
        Catalogue::from_json(SMALL)
    }

    fn ty<'a>(catalogue: &'a Catalogue, name: &str) -> &'a ElementType {
        let id = catalogue.global(name);
        assert!(id.is_some(), "missing global {name}");
        id.and_then(|id| catalogue.get(id)).unwrap_or_else(|| unreachable!())
    }

    #[test]
    fn test_fields_are_classified() -> Result<()> {
        let catalogue = small()?;
        let note = ty(&catalogue, "Note");
        assert_eq!(note.tag, "note");
        assert_eq!(
            note.field("href"),
            Some(&Field::Attribute {
                name: "xlink:href".to_string(),
                namespace: Some("xlink".to_string())
            })
        );
        let Some(Field::Child(duration)) = note.field("Duration") else {
            panic!("Duration should be a child slot");
        };
        let duration = catalogue.element(*duration)?;
        assert_eq!(duration.tag, "duration");
        assert_eq!(duration.field(TEXT_FIELD), Some(&Field::Text));
        Ok(())
    }

    #[test]
    fn test_positional_order_follows_declaration() -> Result<()> {
        let catalogue = small()?;
        let pitch = ty(&catalogue, "Pitch");
        assert_eq!(pitch.positional(0).map(|(n, _)| n), Some("Step"));
        assert_eq!(pitch.positional(1).map(|(n, _)| n), Some("Octave"));
        assert!(pitch.positional(2).is_none());
        Ok(())
    }

    #[test]
    fn test_derived_type_inherits_fields_and_scope() -> Result<()> {
        let catalogue = small()?;
        let rest = ty(&catalogue, "Rest");
        assert_eq!(rest.tag, "rest");
        assert!(rest.field("Duration").is_some());
        assert!(rest.scope.contains_key("Duration"));
        assert_eq!(rest.base, catalogue.global("Note"));
        Ok(())
    }

    #[test]
    fn test_nested_types_are_scoped_not_global() -> Result<()> {
        let catalogue = small()?;
        assert!(catalogue.global("Part").is_none());
        assert!(catalogue.global("Text").is_none(), "abstract types are hidden");
        let score = ty(&catalogue, "Score");
        assert!(score.scope.contains_key("Part"));
        assert!(score.scope.contains_key("Title"));
        assert_eq!(score.order_of("part"), Some(1));
        Ok(())
    }

    #[test]
    fn test_header() -> Result<()> {
        let catalogue = small()?;
        assert_eq!(
            catalogue.header("score"),
            "<?xml version=\"1.0\"?>\n<!DOCTYPE score>\n"
        );
        assert_eq!(catalogue.header("other"), "<?xml version=\"1.0\"?>\n");
        Ok(())
    }

    #[test]
    fn test_unresolved_child_type() {
        let err = Catalogue::from_json(r#"{"types": {"A": {"fields": ["Missing"]}}}"#).err();
        assert!(matches!(
            err.as_ref().map(Error::kind),
            Some(ErrorKind::Schema(SchemaError::UnresolvedType { .. }))
        ));
    }

    #[test]
    fn test_unknown_and_cyclic_bases() {
        let err = Catalogue::from_json(r#"{"types": {"A": {"base": "Nope"}}}"#).err();
        assert!(matches!(
            err.as_ref().map(Error::kind),
            Some(ErrorKind::Schema(SchemaError::UnknownBase { .. }))
        ));
        let err = Catalogue::from_json(r#"{"types": {"A": {"base": "B"}, "B": {"base": "A"}}}"#).err();
        assert!(matches!(
            err.as_ref().map(Error::kind),
            Some(ErrorKind::Schema(SchemaError::CyclicBase(_)))
        ));
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(Catalogue::from_json(r#"{"types": {"A": {"feilds": []}}}"#).is_err());
    }

    #[test]
    fn test_default_catalogue_loads() -> Result<()> {
        let catalogue = Catalogue::load_default()?;
        assert!(catalogue.global("ScorePartwise").is_some());
        assert!(catalogue.global("Note").is_some());
        assert!(catalogue.global("_").is_none());
        assert!(catalogue.declaration().starts_with("<?xml"));
        assert!(catalogue.doctype("score-partwise").is_some());
        Ok(())
    }
}
