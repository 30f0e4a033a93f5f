//! Static allow-list check run on every script before it executes
//!
//! A script is accepted only when every syntax node it contains is one of
//! [`ALLOWED_NODE_KINDS`] and no call targets a name starting with a
//! lower-case letter. Element constructors are capitalised; host functions
//! are not.

use std::collections::BTreeSet;

use tracing::debug;

use crate::error::{Error, Rejection, Result, Span};
use crate::script::{self, Expr, ExprKind, Module, NodeKind, ScriptConfig, Visitor};

/// Syntax permitted in scripts: constructor calls, literals, names and
/// nested `with` blocks
pub const ALLOWED_NODE_KINDS: [NodeKind; 14] = [
    NodeKind::Module,
    NodeKind::ExprStmt,
    NodeKind::Call,
    NodeKind::Keyword,
    NodeKind::Name,
    NodeKind::Load,
    NodeKind::Store,
    NodeKind::Tuple,
    NodeKind::Constant,
    NodeKind::UnaryOp,
    NodeKind::Negate,
    NodeKind::With,
    NodeKind::WithItem,
    NodeKind::Pass,
];

/// Outcome of a sandbox check
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Verdict {
    pub accepted: bool,
    pub disallowed_node_kinds: BTreeSet<NodeKind>,
    pub disallowed_calls: BTreeSet<String>,
}

impl Verdict {
    /// Turn a rejection into an error, keeping both diagnostic sets
    pub fn into_result(self) -> Result<()> {
        if self.accepted {
            return Ok(());
        }
        Err(Error::bare(Rejection {
            node_kinds: self.disallowed_node_kinds,
            calls: self.disallowed_calls,
        }))
    }
}

#[derive(Default)]
struct Inspector {
    kinds: BTreeSet<NodeKind>,
    calls: BTreeSet<String>,
}

impl Visitor for Inspector {
    fn visit_kind(&mut self, kind: NodeKind, _span: Span) {
        self.kinds.insert(kind);
    }

    fn visit_call(&mut self, func: &Expr, _span: Span) {
        self.calls.insert(callable_name(func));
    }
}

/// Name reported for a call target: `Note`, `os.system`, or `<kind>`
pub fn callable_name(func: &Expr) -> String {
    match &func.kind {
        ExprKind::Name { id, .. } => id.clone(),
        ExprKind::Attribute { value, attr, .. } => format!("{}.{attr}", callable_name(value)),
        _ => format!("<{}>", func.node_kind().name()),
    }
}

fn is_host_call(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_lowercase)
}

/// Inspect an already parsed script
pub fn check_module(module: &Module) -> Verdict {
    let mut inspector = Inspector::default();
    script::walk_module(&mut inspector, module);

    let disallowed_node_kinds: BTreeSet<NodeKind> = inspector
        .kinds
        .into_iter()
        .filter(|kind| !ALLOWED_NODE_KINDS.contains(kind))
        .collect();
    let disallowed_calls: BTreeSet<String> = inspector
        .calls
        .into_iter()
        .filter(|name| is_host_call(name))
        .collect();

    let accepted = disallowed_node_kinds.is_empty() && disallowed_calls.is_empty();
    debug!(
        accepted,
        kinds = disallowed_node_kinds.len(),
        calls = disallowed_calls.len(),
        "sandbox verdict"
    );
    Verdict {
        accepted,
        disallowed_node_kinds,
        disallowed_calls,
    }
}

/// Parse and inspect script text with default limits.
/// Syntax errors are returned as `Err`, never as a verdict.
pub fn check(script: &str) -> Result<Verdict> {
    check_with_config(script, ScriptConfig::default())
}

pub fn check_with_config(script: &str, config: ScriptConfig) -> Result<Verdict> {
    let module = script::parse_with_config(script, config)?;
    Ok(check_module(&module))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_declarative_script_accepted() -> Result<()> {
        let verdict = check(
            "with ScorePartwise(version='4.0'):\n    with Part(id='P1') as part:\n        Note(Pitch('C', None, 4), duration=-1)\n        pass\n",
        )?;
        assert!(verdict.accepted, "{verdict:?}");
        assert!(verdict.disallowed_node_kinds.is_empty());
        assert!(verdict.disallowed_calls.is_empty());
        Ok(())
    }

    #[test]
    fn test_bundle_helper_is_not_a_host_call() -> Result<()> {
        assert!(check("Time(_(beats=3))")?.accepted);
        Ok(())
    }

    #[test]
    fn test_loop_rejected_with_kind() -> Result<()> {
        let verdict = check("for i in Range(3):\n    Note()\n")?;
        assert!(!verdict.accepted);
        assert!(verdict.disallowed_node_kinds.contains(&NodeKind::For));
        Ok(())
    }

    #[test]
    fn test_lowercase_call_rejected() -> Result<()> {
        let verdict = check("print('hi')")?;
        assert!(!verdict.accepted);
        assert!(verdict.disallowed_node_kinds.is_empty());
        assert_eq!(
            verdict.disallowed_calls.into_iter().collect::<Vec<_>>(),
            ["print"]
        );
        Ok(())
    }

    #[test]
    fn test_dotted_call_reported_by_dotted_name() -> Result<()> {
        let verdict = check("os.system('ls')")?;
        assert!(verdict.disallowed_calls.contains("os.system"));
        assert!(verdict.disallowed_node_kinds.contains(&NodeKind::Attribute));
        Ok(())
    }

    #[test]
    fn test_other_call_targets_use_kind_name() -> Result<()> {
        let verdict = check("Note()()")?;
        assert!(verdict.accepted);
        let verdict = check("Things[0]()")?;
        assert!(verdict.disallowed_node_kinds.contains(&NodeKind::Subscript));
        assert!(!verdict.disallowed_calls.contains("<subscript>"));
        Ok(())
    }

    #[test]
    fn test_calls_hidden_in_fstrings_are_found() -> Result<()> {
        let verdict = check("Words(f'{open(1)}')")?;
        assert!(verdict.disallowed_calls.contains("open"));
        assert!(verdict.disallowed_node_kinds.contains(&NodeKind::JoinedStr));
        Ok(())
    }

    #[test]
    fn test_calls_after_fstring_not_equal_are_found() -> Result<()> {
        let verdict = check("Note(X=f\"{A != b()}\")")?;
        assert!(!verdict.accepted);
        assert_eq!(
            verdict.disallowed_calls.into_iter().collect::<Vec<_>>(),
            ["b"]
        );
        assert!(verdict.disallowed_node_kinds.contains(&NodeKind::Compare));
        assert!(verdict.disallowed_node_kinds.contains(&NodeKind::FormattedValue));
        Ok(())
    }

    #[test]
    fn test_calls_in_fstring_format_specs_are_found() -> Result<()> {
        let verdict = check("Note(X=f\"{A:{g()}}\")")?;
        assert_eq!(
            verdict.disallowed_calls.into_iter().collect::<Vec<_>>(),
            ["g"]
        );
        assert!(verdict.disallowed_node_kinds.contains(&NodeKind::JoinedStr));

        let verdict = check("Note(X=f\"{A!r:>{Width()}}\")")?;
        assert!(verdict.disallowed_calls.is_empty());
        assert!(!verdict.accepted);
        Ok(())
    }

    #[test]
    fn test_unary_plus_and_not_rejected() -> Result<()> {
        assert!(check("Alter(+1)")?
            .disallowed_node_kinds
            .contains(&NodeKind::UnaryPlus));
        assert!(check("Alter(not 1)")?
            .disallowed_node_kinds
            .contains(&NodeKind::Not));
        Ok(())
    }

    #[test]
    fn test_assignment_rejected() -> Result<()> {
        let verdict = check("x = Note()")?;
        assert!(verdict.disallowed_node_kinds.contains(&NodeKind::Assign));
        Ok(())
    }

    #[test]
    fn test_syntax_error_is_err() {
        assert!(check("Note(").is_err());
    }

    #[test]
    fn test_into_result_carries_sets() -> Result<()> {
        let err = check("import os")?.into_result().err();
        let Some(ErrorKind::Rejected(rejection)) = err.as_ref().map(Error::kind) else {
            panic!("expected rejection, got {err:?}");
        };
        assert!(rejection.node_kinds.contains(&NodeKind::Import));
        assert!(rejection.node_kinds.contains(&NodeKind::Alias));
        Ok(())
    }
}
