//! Per-tag validators and structured violations

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result, SchemaError};
use crate::node::ElementNode;
use crate::schema::{Content, ElementRule, MasterSchema, Particle};

/// What went wrong at one place in a tree
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViolationKind {
    MissingElement { expected: String },
    UnexpectedElement { tag: String },
    MissingAttribute { name: String },
    UnexpectedAttribute { name: String },
    InvalidValue {
        target: String,
        value: String,
        expected: String,
    },
    UnexpectedText,
    WrongRoot { expected: String, found: String },
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingElement { expected } => write!(f, "missing child element, expected {expected}"),
            Self::UnexpectedElement { tag } => write!(f, "unexpected child element {tag}"),
            Self::MissingAttribute { name } => write!(f, "required attribute {name} is missing"),
            Self::UnexpectedAttribute { name } => write!(f, "attribute {name} is not allowed"),
            Self::InvalidValue {
                target,
                value,
                expected,
            } => write!(f, "{target} has invalid value {value:?}, expected {expected}"),
            Self::UnexpectedText => f.write_str("text content is not allowed"),
            Self::WrongRoot { expected, found } => {
                write!(f, "root element is {found}, expected {expected}")
            }
        }
    }
}

/// A violation plus the path of the offending element, relative to the
/// validated node (`measure/note[2]/pitch[0]`)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    pub kind: ViolationKind,
    pub path: String,
}

impl Violation {
    pub fn is_missing_element(&self) -> bool {
        matches!(self.kind, ViolationKind::MissingElement { .. })
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.kind)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationMode {
    /// Mid-construction: missing required children are expected
    Tolerant,
    /// Scope close: everything counts
    Strict,
}

impl ValidationMode {
    pub fn keeps(self, violation: &Violation) -> bool {
        match self {
            Self::Strict => true,
            Self::Tolerant => !violation.is_missing_element(),
        }
    }
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tolerant => "tolerant",
            Self::Strict => "strict",
        })
    }
}

/// Validator for documents rooted at one tag
#[derive(Debug)]
pub struct CompiledSchema {
    root: String,
    master: Arc<MasterSchema>,
}

impl CompiledSchema {
    /// Validator whose single root is `root`; descendants are checked
    /// against whatever the master declares for their tags
    pub fn compile(master: &Arc<MasterSchema>, root: &str) -> Result<Self> {
        if !master.contains(root) {
            return Err(Error::bare(SchemaError::UndeclaredElement(root.to_string())));
        }
        Ok(Self {
            root: root.to_string(),
            master: Arc::clone(master),
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    fn rule(&self, tag: &str) -> Option<&ElementRule> {
        self.master.rule(tag).map(Arc::as_ref)
    }

    /// Full check of a finished subtree
    pub fn validate(&self, node: &ElementNode) -> Vec<Violation> {
        let mut out = Vec::new();
        if node.tag() != self.root {
            out.push(Violation {
                kind: ViolationKind::WrongRoot {
                    expected: self.root.clone(),
                    found: node.tag().to_string(),
                },
                path: node.tag().to_string(),
            });
            return out;
        }
        self.walk(node, node.tag(), &mut out);
        out
    }

    pub fn validate_mode(&self, node: &ElementNode, mode: ValidationMode) -> Vec<Violation> {
        let mut violations = self.validate(node);
        violations.retain(|v| mode.keeps(v));
        violations
    }

    /// Check a subtree under construction. Sealed subtrees are skipped;
    /// nodes whose content was already checked only contribute what the
    /// earlier check held back. A strict pass seals the subtree.
    pub(crate) fn validate_incremental(
        &self,
        node: &mut ElementNode,
        mode: ValidationMode,
    ) -> Vec<Violation> {
        let mut out = Vec::new();
        let path = node.tag().to_string();
        self.walk_incremental(node, &path, mode, &mut out);
        out
    }

    fn walk(&self, node: &ElementNode, path: &str, out: &mut Vec<Violation>) {
        if let Some(rule) = self.rule(node.tag()) {
            check_element(rule, node, path, out);
        }
        for (index, child) in node.children().iter().enumerate() {
            self.walk(child, &child_path(path, child, index), out);
        }
    }

    fn walk_incremental(
        &self,
        node: &mut ElementNode,
        path: &str,
        mode: ValidationMode,
        out: &mut Vec<Violation>,
    ) {
        if node.is_sealed() {
            return;
        }
        if let Some(rule) = self.rule(node.tag()) {
            let mut own = Vec::new();
            check_element(rule, node, path, &mut own);
            let already_checked = node.is_checked();
            out.extend(own.into_iter().filter(|v| match mode {
                ValidationMode::Tolerant => !already_checked && !v.is_missing_element(),
                ValidationMode::Strict => !already_checked || v.is_missing_element(),
            }));
        }
        node.mark_checked();
        for (index, child) in node.children_mut().iter_mut().enumerate() {
            let path = child_path(path, child, index);
            self.walk_incremental(child, &path, mode, out);
        }
        if mode == ValidationMode::Strict {
            node.seal();
        }
    }
}

fn child_path(parent: &str, child: &ElementNode, index: usize) -> String {
    format!("{parent}/{}[{index}]", child.tag())
}

fn check_element(rule: &ElementRule, node: &ElementNode, path: &str, out: &mut Vec<Violation>) {
    let mut push = |kind| {
        out.push(Violation {
            kind,
            path: path.to_string(),
        });
    };

    for (name, value) in node.attributes() {
        match rule.attributes.get(name) {
            None => push(ViolationKind::UnexpectedAttribute { name: name.clone() }),
            Some(attr) if !attr.value.accepts(value) => push(ViolationKind::InvalidValue {
                target: format!("attribute {name}"),
                value: value.clone(),
                expected: attr.value.to_string(),
            }),
            Some(_) => {}
        }
    }
    for (name, attr) in &rule.attributes {
        if attr.required && node.attribute(name).is_none() {
            push(ViolationKind::MissingAttribute { name: name.clone() });
        }
    }

    let has_text = node.text().is_some_and(|t| !t.trim().is_empty());
    match &rule.content {
        Content::Empty => {
            if has_text {
                push(ViolationKind::UnexpectedText);
            }
            for child in node.children() {
                push(ViolationKind::UnexpectedElement {
                    tag: child.tag().to_string(),
                });
            }
        }
        Content::Text(value_rule) => {
            for child in node.children() {
                push(ViolationKind::UnexpectedElement {
                    tag: child.tag().to_string(),
                });
            }
            let text = node.text().unwrap_or_default();
            if !value_rule.accepts(text) {
                push(ViolationKind::InvalidValue {
                    target: "text".to_string(),
                    value: text.to_string(),
                    expected: value_rule.to_string(),
                });
            }
        }
        Content::Sequence(particles) => {
            if has_text {
                push(ViolationKind::UnexpectedText);
            }
            match_sequence(particles, node.children(), &mut push);
        }
    }
}

/// Greedy match: each particle takes as many consecutive children as it
/// can, up to its maximum
fn match_sequence(
    particles: &[Particle],
    children: &[ElementNode],
    push: &mut impl FnMut(ViolationKind),
) {
    let mut remaining = children.iter().peekable();
    for particle in particles {
        let mut matched = 0;
        while particle.max.map_or(true, |max| matched < max) {
            match remaining.peek() {
                Some(child) if particle.term.matches(child.tag()) => {
                    remaining.next();
                    matched += 1;
                }
                _ => break,
            }
        }
        if matched < particle.min {
            push(ViolationKind::MissingElement {
                expected: particle.term.to_string(),
            });
        }
    }
    for child in remaining {
        push(ViolationKind::UnexpectedElement {
            tag: child.tag().to_string(),
        });
    }
}
