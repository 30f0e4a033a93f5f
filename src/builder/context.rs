//! Stack of open elements owned by one builder

use std::collections::HashSet;

use crate::catalogue::TypeId;
use crate::error::Span;
use crate::node::ElementNode;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FrameKind {
    /// Open for the duration of one constructor call
    Constructor,
    /// Open until the matching `close`
    Scope(u64),
}

#[derive(Debug)]
pub(crate) struct Frame {
    pub node: ElementNode,
    pub ty: TypeId,
    pub kind: FrameKind,
    /// Call site that opened the frame
    pub span: Span,
    /// Violations already reported against this node
    pub reported: HashSet<String>,
}

impl Frame {
    pub fn new(node: ElementNode, ty: TypeId, kind: FrameKind, span: Span) -> Self {
        Self {
            node,
            ty,
            kind,
            span,
            reported: HashSet::new(),
        }
    }

    pub fn is_scope(&self) -> bool {
        matches!(self.kind, FrameKind::Scope(_))
    }
}

/// Open elements, innermost last. The top frame is where new elements go.
#[derive(Debug, Default)]
pub struct ContextStack {
    frames: Vec<Frame>,
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Tags of the open elements, outermost first
    pub fn path(&self) -> Vec<&str> {
        self.frames.iter().map(|f| f.node.tag()).collect()
    }

    /// Number of open scopes (constructor frames excluded)
    pub fn scope_depth(&self) -> usize {
        self.frames.iter().filter(|f| f.is_scope()).count()
    }

    pub(crate) fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub(crate) fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub(crate) fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub(crate) fn top_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    pub(crate) fn innermost_scope(&self) -> Option<&Frame> {
        self.frames.iter().rev().find(|f| f.is_scope())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::Catalogue;
    use crate::error::Result;

    fn some_type() -> Result<TypeId> {
        let catalogue = Catalogue::from_json(r#"{"types": {"Note": {}}}"#)?;
        Ok(catalogue.global("Note").unwrap_or_else(|| unreachable!()))
    }

    #[test]
    fn test_push_pop_order() -> Result<()> {
        let ty = some_type()?;
        let mut stack = ContextStack::new();
        assert!(stack.top().is_none());
        stack.push(Frame::new(ElementNode::new("part"), ty, FrameKind::Scope(0), Span::empty()));
        stack.push(Frame::new(ElementNode::new("measure"), ty, FrameKind::Scope(1), Span::empty()));
        stack.push(Frame::new(ElementNode::new("note"), ty, FrameKind::Constructor, Span::empty()));

        assert_eq!(stack.path(), ["part", "measure", "note"]);
        assert_eq!(stack.scope_depth(), 2);
        assert_eq!(stack.innermost_scope().map(|f| f.kind), Some(FrameKind::Scope(1)));
        assert_eq!(stack.pop().map(|f| f.node.tag().to_string()).as_deref(), Some("note"));
        assert_eq!(stack.top().map(|f| f.node.tag()), Some("measure"));
        assert_eq!(stack.len(), 2);
        Ok(())
    }
}
