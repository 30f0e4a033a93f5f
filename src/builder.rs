//! Document builder: turns constructor calls into an element tree
//!
//! Every constructor call pushes a transient frame on the [`ContextStack`],
//! applies its arguments (building child elements into that frame), pops
//! it, and appends the finished node to whatever frame is now on top.
//! Scopes keep their frame open until [`Builder::close`]. After each append
//! the parent's children are put in canonical order and the parent is
//! validated tolerantly; a closing scope is validated strictly.

mod context;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::catalogue::{Catalogue, ElementType, Field, TypeId};
use crate::error::{Error, Result, Span, UsageError, ValidationError};
use crate::node::ElementNode;
use crate::schema::{SchemaRegistry, ValidationMode, Violation};
use crate::value::{ArgumentBundle, Value};

pub use context::ContextStack;
use context::{Frame, FrameKind};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BuilderConfig {
    /// Turn validation warnings into an error when the document is complete
    pub escalate_warnings: bool,
}

/// Non-fatal validation finding, attributed to the script call site
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub span: Span,
    pub mode: ValidationMode,
    pub violation: Violation,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.span.is_empty() {
            write!(f, "{}: ", self.span.start)?;
        }
        write!(f, "{} validation: {}", self.mode, self.violation)
    }
}

/// Finished document: fixed header plus the root element
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    header: String,
    root: ElementNode,
}

impl Document {
    pub fn new(header: impl Into<String>, root: ElementNode) -> Self {
        Self {
            header: header.into(),
            root,
        }
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn root(&self) -> &ElementNode {
        &self.root
    }

    pub fn into_root(self) -> ElementNode {
        self.root
    }

    pub fn to_xml(&self) -> String {
        let mut out = self.header.clone();
        out.push_str(&self.root.to_xml());
        out
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_xml().trim_end())
    }
}

/// Handle for an open scope, consumed by [`Builder::close`]
#[derive(Debug, PartialEq, Eq)]
pub struct ScopeToken {
    id: u64,
    ty: TypeId,
}

impl ScopeToken {
    pub const fn ty(&self) -> TypeId {
        self.ty
    }
}

/// Builds one document. Not shared; create one per run.
#[derive(Debug)]
pub struct Builder {
    catalogue: Arc<Catalogue>,
    registry: Arc<SchemaRegistry>,
    config: BuilderConfig,
    stack: ContextStack,
    root: Option<ElementNode>,
    diagnostics: Vec<Diagnostic>,
    next_scope: u64,
}

impl Builder {
    pub fn new(
        catalogue: Arc<Catalogue>,
        registry: Arc<SchemaRegistry>,
        config: BuilderConfig,
    ) -> Self {
        Self {
            catalogue,
            registry,
            config,
            stack: ContextStack::new(),
            root: None,
            diagnostics: Vec::new(),
            next_scope: 0,
        }
    }

    pub fn catalogue(&self) -> &Arc<Catalogue> {
        &self.catalogue
    }

    pub fn stack(&self) -> &ContextStack {
        &self.stack
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Construct an element and append it to the current parent, or make
    /// it the document root when nothing is open
    pub fn create(&mut self, ty: TypeId, args: ArgumentBundle, span: Span) -> Result<()> {
        let node = self.construct(ty, args, span)?;
        self.attach(node, span)
    }

    /// Construct an element and keep it open as the current parent
    pub fn open(&mut self, ty: TypeId, args: ArgumentBundle, span: Span) -> Result<ScopeToken> {
        let node = self.construct(ty, args, span)?;
        let id = self.next_scope;
        self.next_scope += 1;
        debug!(tag = node.tag(), depth = self.stack.len(), "open scope");
        self.stack
            .push(Frame::new(node, ty, FrameKind::Scope(id), span));
        Ok(ScopeToken { id, ty })
    }

    /// Nested types made visible by an open scope
    pub fn scope_names(&self, token: &ScopeToken) -> Result<Vec<(String, TypeId)>> {
        let element = self.catalogue.element(token.ty)?;
        Ok(element
            .scope
            .iter()
            .map(|(name, ty)| (name.clone(), *ty))
            .collect())
    }

    /// Close the innermost scope: validate it strictly and hand it to its
    /// parent, or make it the document when it was the outermost scope
    pub fn close(&mut self, token: ScopeToken) -> Result<()> {
        let is_innermost = self
            .stack
            .top()
            .is_some_and(|frame| frame.kind == FrameKind::Scope(token.id));
        if !is_innermost {
            let name = self.type_name(token.ty);
            return Err(Error::bare(UsageError::ScopeMismatch(name)));
        }
        let Some(frame) = self.stack.pop() else {
            return Err(Error::bare(UsageError::ScopeMismatch(self.type_name(token.ty))));
        };

        let Frame {
            mut node,
            span,
            mut reported,
            ..
        } = frame;
        let found = self.validate(&mut node, ValidationMode::Strict, span, &mut reported);
        info!(tag = node.tag(), violations = found, "validated scope");

        let outermost = self.stack.is_empty();
        let tag = node.tag().to_string();
        self.attach(node, span)?;
        if outermost {
            self.escalate(&tag)?;
        }
        Ok(())
    }

    /// Finish the run and hand out the document
    pub fn finish(mut self) -> Result<(Document, Vec<Diagnostic>)> {
        if let Some(frame) = self.stack.innermost_scope() {
            let name = self.type_name(frame.ty);
            return Err(Error::new(UsageError::UnclosedScope(name), frame.span));
        }
        let Some(mut root) = self.root.take() else {
            return Err(Error::bare(UsageError::EmptyDocument));
        };
        if !root.is_sealed() {
            // built by a plain call, never closed as a scope
            self.validate(&mut root, ValidationMode::Strict, Span::empty(), &mut HashSet::new());
        }
        self.escalate(root.tag())?;

        let header = self.catalogue.header(root.tag());
        info!(
            tag = root.tag(),
            nodes = root.node_count(),
            diagnostics = self.diagnostics.len(),
            "document finished"
        );
        Ok((Document::new(header, root), self.diagnostics))
    }

    fn type_name(&self, ty: TypeId) -> String {
        self.catalogue
            .get(ty)
            .map_or_else(|| format!("#{}", ty.index()), |e| e.name.clone())
    }

    fn construct(&mut self, ty: TypeId, args: ArgumentBundle, span: Span) -> Result<ElementNode> {
        let catalogue = Arc::clone(&self.catalogue);
        let element = catalogue.element(ty)?;
        debug!(element = %element, "construct");

        self.stack.push(Frame::new(
            ElementNode::new(element.tag.as_str()),
            ty,
            FrameKind::Constructor,
            span,
        ));
        // the frame comes off again whether or not the arguments applied
        let applied = self.apply_arguments(element, args, span);
        let frame = self.stack.pop();
        applied?;
        frame
            .map(|f| f.node)
            .ok_or_else(|| Error::new(UsageError::ScopeMismatch(element.name.clone()), span))
    }

    fn apply_arguments(
        &mut self,
        element: &ElementType,
        args: ArgumentBundle,
        span: Span,
    ) -> Result<()> {
        let ArgumentBundle { args, kwargs } = args;
        if args.len() > element.fields.len() {
            return Err(Error::new(
                UsageError::TooManyArguments {
                    element: element.name.clone(),
                    max: element.fields.len(),
                    given: args.len(),
                },
                span,
            ));
        }

        let mut bound: Vec<(String, Value)> = Vec::with_capacity(args.len() + kwargs.len());
        for (index, value) in args.into_iter().enumerate() {
            if let Some((name, _)) = element.positional(index) {
                bound.push((name.to_string(), value));
            }
        }
        for (name, value) in kwargs {
            if bound.iter().any(|(bound_name, _)| *bound_name == name) {
                return Err(Error::new(
                    UsageError::DuplicateArgument {
                        element: element.name.clone(),
                        field: name,
                    },
                    span,
                ));
            }
            bound.push((name, value));
        }

        for (name, value) in bound {
            self.apply_field(element, &name, value, span)?;
        }
        Ok(())
    }

    fn apply_field(
        &mut self,
        element: &ElementType,
        name: &str,
        value: Value,
        span: Span,
    ) -> Result<()> {
        if value.is_none() {
            return Ok(());
        }
        let field = element.field(name).ok_or_else(|| {
            Error::new(
                UsageError::UnknownField {
                    element: element.name.clone(),
                    field: name.to_string(),
                },
                span,
            )
        })?;

        match field {
            Field::Text => {
                if let Some(frame) = self.stack.top_mut() {
                    frame.node.set_text(value.stringify());
                }
            }
            Field::Attribute { name, .. } => {
                if let Some(frame) = self.stack.top_mut() {
                    frame.node.set_attribute(name.as_str(), value.stringify());
                }
            }
            Field::Child(child) => {
                let args = match value {
                    Value::Bundle(bundle) => bundle,
                    Value::Tuple(items) => ArgumentBundle::positional(items),
                    Value::Map(kwargs) => ArgumentBundle {
                        args: Vec::new(),
                        kwargs,
                    },
                    Value::Element(_) => {
                        return Err(Error::new(
                            UsageError::PrebuiltChild {
                                element: element.name.clone(),
                                field: name.to_string(),
                            },
                            span,
                        ))
                    }
                    other => ArgumentBundle::positional([other]),
                };
                let node = self.construct(*child, args, span)?;
                self.attach(node, span)?;
            }
        }
        Ok(())
    }

    /// Append to the current parent with ordering and tolerant validation
    fn attach(&mut self, node: ElementNode, span: Span) -> Result<()> {
        let catalogue = Arc::clone(&self.catalogue);
        let Self {
            stack,
            registry,
            diagnostics,
            root,
            ..
        } = self;

        let Some(frame) = stack.top_mut() else {
            if let Some(previous) = root.replace(node) {
                warn!(
                    previous = previous.tag(),
                    "several top-level elements; keeping the last one"
                );
            }
            return Ok(());
        };

        let parent = catalogue.element(frame.ty)?;
        frame.node.push_child(node);
        frame.node.sort_children(&parent.order);
        record(
            registry,
            diagnostics,
            &mut frame.node,
            ValidationMode::Tolerant,
            span,
            &mut frame.reported,
        );
        Ok(())
    }

    fn validate(
        &mut self,
        node: &mut ElementNode,
        mode: ValidationMode,
        span: Span,
        reported: &mut HashSet<String>,
    ) -> usize {
        record(&self.registry, &mut self.diagnostics, node, mode, span, reported)
    }

    /// With escalation on, any recorded diagnostic fails the document
    fn escalate(&self, tag: &str) -> Result<()> {
        if !self.config.escalate_warnings {
            return Ok(());
        }
        match self.diagnostics.first() {
            Some(first) => Err(Error::new(
                ValidationError {
                    tag: tag.to_string(),
                    count: self.diagnostics.len(),
                    first: first.violation.to_string(),
                },
                first.span,
            )),
            None => Ok(()),
        }
    }
}

/// Validate `node` and keep every violation not reported before
fn record(
    registry: &SchemaRegistry,
    diagnostics: &mut Vec<Diagnostic>,
    node: &mut ElementNode,
    mode: ValidationMode,
    span: Span,
    reported: &mut HashSet<String>,
) -> usize {
    let Some(schema) = registry.get(node.tag()) else {
        return 0;
    };
    let mut count = 0;
    for violation in schema.validate_incremental(node, mode) {
        if !reported.insert(violation.to_string()) {
            continue;
        }
        let diagnostic = Diagnostic {
            span,
            mode,
            violation,
        };
        warn!("{diagnostic}");
        diagnostics.push(diagnostic);
        count += 1;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::schema::MasterSchema;

    const CATALOGUE: &str = r#"{
        "declaration": "<?xml version=\"1.0\"?>",
        "types": {
            "Text": { "abstract": true, "fields": ["content"] },
            "Measure": { "fields": ["number", "Note", "Time"] },
            "Note": {
                "fields": ["Pitch", "Duration", "default_x"],
                "order": ["pitch", "duration"],
                "nested": { "Duration": { "base": "Text" } }
            },
            "Pitch": {
                "fields": ["Step", "Octave"],
                "order": ["step", "octave"],
                "nested": { "Step": { "base": "Text" }, "Octave": { "base": "Text" } }
            },
            "Time": {
                "fields": ["Beats", "BeatType"],
                "order": ["beats", "beat-type"],
                "nested": { "Beats": { "base": "Text" }, "BeatType": { "base": "Text" } }
            }
        }
    }"#;

    const MASTER: &str = r#"{
        "elements": {
            "measure": {
                "attributes": { "number": { "required": true } },
                "sequence": [ { "choice": ["note", "time"], "min": 0, "max": "unbounded" } ] },
            "note": {
                "attributes": { "default-x": { "kind": "decimal" } },
                "sequence": [ { "element": "pitch" }, { "element": "duration", "min": 0 } ] },
            "pitch": { "sequence": [ { "element": "step" }, { "element": "octave" } ] },
            "step": { "text": { "values": ["A", "B", "C", "D", "E", "F", "G"] } },
            "octave": { "text": { "kind": "integer" } },
            "duration": { "text": {} },
            "time": { "sequence": [ { "element": "beats" }, { "element": "beat-type" } ] },
            "beats": { "text": {} },
            "beat-type": { "text": {} }
        }
    }"#;

    fn builder(config: BuilderConfig) -> Result<Builder> {
        let catalogue = Arc::new(Catalogue::from_json(CATALOGUE)?);
        let registry = Arc::new(SchemaRegistry::new(MasterSchema::from_json(MASTER)?));
        Ok(Builder::new(catalogue, registry, config))
    }

    fn ty(builder: &Builder, name: &str) -> TypeId {
        builder.catalogue().global(name).unwrap_or_else(|| unreachable!())
    }

    fn bundle() -> ArgumentBundle {
        ArgumentBundle::new()
    }

    #[test]
    fn test_create_builds_children_in_order() -> Result<()> {
        let mut b = builder(BuilderConfig::default())?;
        let note = ty(&b, "Note");
        let args = bundle()
            .kwarg("Duration", 4)
            .kwarg("Pitch", ArgumentBundle::positional([Value::from("C"), Value::from(4)]));
        b.create(note, args, Span::empty())?;
        let (document, diagnostics) = b.finish()?;

        assert_eq!(
            document.root().to_xml(),
            "<note>\n  <pitch>\n    <step>C</step>\n    <octave>4</octave>\n  </pitch>\n  <duration>4</duration>\n</note>\n"
        );
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        assert_eq!(document.header(), "<?xml version=\"1.0\"?>\n");
        Ok(())
    }

    #[test]
    fn test_tuple_and_map_arguments() -> Result<()> {
        let mut b = builder(BuilderConfig::default())?;
        let note = ty(&b, "Note");
        let args = bundle().arg(Value::Tuple(vec![Value::from("D"), Value::from(5)])).kwarg(
            "Duration",
            Value::Map(vec![("content".to_string(), "2".into())]),
        );
        b.create(note, args, Span::empty())?;
        let (document, _) = b.finish()?;
        let pitch = document.root().child("pitch");
        assert_eq!(pitch.and_then(|p| p.child("step")).and_then(ElementNode::text), Some("D"));
        assert_eq!(
            document.root().child("duration").and_then(ElementNode::text),
            Some("2")
        );
        Ok(())
    }

    #[test]
    fn test_none_arguments_are_skipped() -> Result<()> {
        let mut b = builder(BuilderConfig::default())?;
        let note = ty(&b, "Note");
        let args = bundle()
            .kwarg("Pitch", ArgumentBundle::positional([Value::from("E"), Value::None]))
            .kwarg("default_x", Value::None);
        b.create(note, args, Span::empty())?;
        let (document, _) = b.finish()?;
        assert!(document.root().attributes().is_empty());
        assert!(document
            .root()
            .child("pitch")
            .is_some_and(|p| p.child("octave").is_none()));
        Ok(())
    }

    #[test]
    fn test_unknown_field() -> Result<()> {
        let mut b = builder(BuilderConfig::default())?;
        let note = ty(&b, "Note");
        let err = b.create(note, bundle().kwarg("Lyric", "la"), Span::empty()).err();
        assert!(matches!(
            err.as_ref().map(Error::kind),
            Some(ErrorKind::Usage(UsageError::UnknownField { field, .. })) if field == "Lyric"
        ));
        assert!(b.stack().is_empty(), "constructor frame must be popped on error");
        Ok(())
    }

    #[test]
    fn test_prebuilt_child_rejected() -> Result<()> {
        let mut b = builder(BuilderConfig::default())?;
        let note = ty(&b, "Note");
        let err = b
            .create(note, bundle().kwarg("Pitch", Value::Element("pitch".into())), Span::empty())
            .err();
        assert!(matches!(
            err.as_ref().map(Error::kind),
            Some(ErrorKind::Usage(UsageError::PrebuiltChild { .. }))
        ));
        Ok(())
    }

    #[test]
    fn test_argument_count_and_duplicates() -> Result<()> {
        let mut b = builder(BuilderConfig::default())?;
        let pitch = ty(&b, "Pitch");
        let err = b
            .create(pitch, ArgumentBundle::positional([Value::from("C"), Value::from(4), Value::from(1)]), Span::empty())
            .err();
        assert!(matches!(
            err.as_ref().map(Error::kind),
            Some(ErrorKind::Usage(UsageError::TooManyArguments { max: 2, given: 3, .. }))
        ));
        let err = b
            .create(pitch, bundle().arg("C").kwarg("Step", "D"), Span::empty())
            .err();
        assert!(matches!(
            err.as_ref().map(Error::kind),
            Some(ErrorKind::Usage(UsageError::DuplicateArgument { .. }))
        ));
        Ok(())
    }

    #[test]
    fn test_missing_element_tolerated_until_close() -> Result<()> {
        let mut b = builder(BuilderConfig::default())?;
        let time = ty(&b, "Time");
        let token = b.open(time, bundle(), Span::empty())?;
        let names = b.scope_names(&token)?;
        let beats = names
            .iter()
            .find(|(name, _)| name == "Beats")
            .map(|(_, ty)| *ty)
            .unwrap_or_else(|| unreachable!());
        b.create(beats, bundle().arg("3"), Span::empty())?;
        assert!(b.diagnostics().is_empty());

        b.close(token)?;
        let diagnostics = b.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics.first().map(|d| d.mode), Some(ValidationMode::Strict));
        assert!(diagnostics.iter().all(|d| d.violation.is_missing_element()));
        Ok(())
    }

    #[test]
    fn test_tolerant_warning_reported_once() -> Result<()> {
        let mut b = builder(BuilderConfig::default())?;
        let measure = ty(&b, "Measure");
        let note = ty(&b, "Note");
        let token = b.open(measure, bundle().kwarg("number", 1), Span::empty())?;
        let bad = bundle()
            .kwarg("Pitch", ArgumentBundle::positional([Value::from("H"), Value::from(4)]))
            .kwarg("default_x", "left");
        b.create(note, bad, Span::empty())?;
        let after_first = b.diagnostics().len();
        assert_eq!(after_first, 2, "{:?}", b.diagnostics());
        b.create(note, bundle().kwarg("Pitch", ArgumentBundle::positional([Value::from("C"), Value::from(4)])), Span::empty())?;
        b.close(token)?;
        assert_eq!(b.diagnostics().len(), after_first);
        Ok(())
    }

    #[test]
    fn test_escalation_at_document_boundary() -> Result<()> {
        let mut b = builder(BuilderConfig {
            escalate_warnings: true,
        })?;
        let measure = ty(&b, "Measure");
        let token = b.open(measure, bundle(), Span::empty())?;
        let err = b.close(token).err();
        assert!(matches!(
            err.as_ref().map(Error::kind),
            Some(ErrorKind::Validation(ValidationError { count: 1, .. }))
        ));
        Ok(())
    }

    #[test]
    fn test_scope_state_errors() -> Result<()> {
        let mut b = builder(BuilderConfig::default())?;
        let measure = ty(&b, "Measure");
        let time = ty(&b, "Time");
        let outer = b.open(measure, bundle().kwarg("number", "1"), Span::empty())?;
        let inner = b.open(time, bundle(), Span::empty())?;
        let err = b.close(outer).err();
        assert!(matches!(
            err.as_ref().map(Error::kind),
            Some(ErrorKind::Usage(UsageError::ScopeMismatch(name))) if name == "Measure"
        ));
        b.close(inner)?;
        let err = b.finish().err();
        assert!(matches!(
            err.as_ref().map(Error::kind),
            Some(ErrorKind::Usage(UsageError::UnclosedScope(name))) if name == "Measure"
        ));
        Ok(())
    }

    #[test]
    fn test_empty_document() -> Result<()> {
        let err = builder(BuilderConfig::default())?.finish().err();
        assert!(matches!(
            err.as_ref().map(Error::kind),
            Some(ErrorKind::Usage(UsageError::EmptyDocument))
        ));
        Ok(())
    }

    #[test]
    fn test_last_top_level_element_wins() -> Result<()> {
        let mut b = builder(BuilderConfig::default())?;
        let pitch = ty(&b, "Pitch");
        b.create(pitch, bundle().arg("C").arg(4), Span::empty())?;
        b.create(pitch, bundle().arg("D").arg(5), Span::empty())?;
        let (document, _) = b.finish()?;
        assert_eq!(
            document.root().child("step").and_then(ElementNode::text),
            Some("D")
        );
        Ok(())
    }
}
