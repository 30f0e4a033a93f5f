//! Element tree built by scripts and its XML rendering

use std::fmt::{self, Write as _};

use indexmap::IndexMap;

/// One tagged element with ordered attributes, children and optional text
///
/// Children are owned, so a node can only ever sit under one parent.
/// Outside the crate the tree is read-only apart from reordering.
#[derive(Clone, Debug, Default)]
pub struct ElementNode {
    tag: String,
    attributes: IndexMap<String, String>,
    children: Vec<ElementNode>,
    text: Option<String>,
    // own content already checked since the last mutation
    checked: bool,
    // whole subtree passed strict validation; frozen
    sealed: bool,
}

impl PartialEq for ElementNode {
    fn eq(&self, other: &Self) -> bool {
        self.tag == other.tag
            && self.attributes == other.attributes
            && self.text == other.text
            && self.children == other.children
    }
}

impl Eq for ElementNode {}

impl ElementNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn attributes(&self) -> &IndexMap<String, String> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn children(&self) -> &[Self] {
        &self.children
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// First child with the given tag
    pub fn child(&self, tag: &str) -> Option<&Self> {
        self.children.iter().find(|c| c.tag == tag)
    }

    pub fn children_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Self> + 'a {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    /// Number of nodes in this subtree, including `self`
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Self::node_count).sum::<usize>()
    }

    /// Stable re-sort of the children by position of their tag in `order`.
    /// Unlisted tags trail all listed ones and keep their relative order.
    pub fn sort_children(&mut self, order: &[String]) {
        if order.is_empty() || self.children.len() < 2 {
            return;
        }
        let rank = |tag: &str| order.iter().position(|t| t == tag).unwrap_or(order.len());
        let sorted = self
            .children
            .windows(2)
            .all(|pair| match pair {
                [a, b] => rank(&a.tag) <= rank(&b.tag),
                _ => true,
            });
        if !sorted {
            self.children.sort_by_key(|c| rank(&c.tag));
            self.checked = false;
        }
    }

    pub(crate) fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
        self.checked = false;
    }

    pub(crate) fn set_text(&mut self, text: impl Into<String>) {
        self.text = Some(text.into());
        self.checked = false;
    }

    pub(crate) fn push_child(&mut self, child: Self) {
        self.children.push(child);
        self.checked = false;
    }

    pub(crate) fn children_mut(&mut self) -> &mut [Self] {
        &mut self.children
    }

    pub(crate) const fn is_checked(&self) -> bool {
        self.checked
    }

    pub(crate) fn mark_checked(&mut self) {
        self.checked = true;
    }

    pub(crate) const fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub(crate) fn seal(&mut self) {
        self.sealed = true;
    }

    /// Indented XML, two spaces per level, one element per line
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out, 0);
        out
    }

    fn write_xml(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        out.push_str(&indent);
        out.push('<');
        out.push_str(&self.tag);
        for (name, value) in &self.attributes {
            let _ = write!(out, " {name}=\"{}\"", escape(value, true));
        }

        let text = self.text.as_deref().filter(|t| !t.is_empty());
        match (text, self.children.is_empty()) {
            (None, true) => out.push_str(" />\n"),
            (Some(text), true) => {
                let _ = writeln!(out, ">{}</{}>", escape(text, false), self.tag);
            }
            (text, false) => {
                out.push('>');
                if let Some(text) = text {
                    out.push_str(&escape(text, false));
                }
                out.push('\n');
                for child in &self.children {
                    child.write_xml(out, depth + 1);
                }
                let _ = writeln!(out, "{indent}</{}>", self.tag);
            }
        }
    }
}

impl fmt::Display for ElementNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_xml().trim_end())
    }
}

/// Escape markup characters; quotes too inside attribute values
pub fn escape(text: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\n' if attribute => out.push_str("&#10;"),
            _ => out.push(ch),
        }
    }
    out
}
