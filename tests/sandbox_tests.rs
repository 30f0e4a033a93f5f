#![allow(clippy::panic_in_result_fn)]
#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]

use zscore::sandbox::{self, ALLOWED_NODE_KINDS};
use zscore::script::NodeKind;
use zscore::{ErrorKind, Result};

const HOSTILE: &str = include_str!("fixtures/hostile.score");
const TWINKLE: &str = include_str!("fixtures/twinkle.score");

#[test]
fn test_declarative_fixture_is_accepted() -> Result<()> {
    let verdict = sandbox::check(TWINKLE)?;
    assert!(verdict.accepted, "{verdict:?}");
    Ok(())
}

#[test]
fn test_every_allowed_form_is_accepted() -> Result<()> {
    let script = "\
with Measure(number='1') as m, Attributes():
    pass
Note(Pitch=_('C', None, 4), Duration=-1, Tie=(True, 1.5))
";
    let verdict = sandbox::check(script)?;
    assert!(verdict.accepted, "{verdict:?}");
    Ok(())
}

#[test]
fn test_loop_and_import_are_reported() -> Result<()> {
    let verdict = sandbox::check("import os\nfor i in X:\n    Note()\n")?;
    assert!(!verdict.accepted);
    assert!(verdict.disallowed_node_kinds.contains(&NodeKind::Import));
    assert!(verdict.disallowed_node_kinds.contains(&NodeKind::For));
    assert!(verdict.disallowed_calls.is_empty());
    Ok(())
}

#[test]
fn test_capitalisation_gate() -> Result<()> {
    let verdict = sandbox::check("print('x')\n")?;
    assert!(!verdict.accepted);
    assert!(verdict.disallowed_node_kinds.is_empty());
    assert_eq!(
        verdict.disallowed_calls.iter().collect::<Vec<_>>(),
        ["print"]
    );

    assert!(sandbox::check("Print('x')\n")?.accepted);
    Ok(())
}

#[test]
fn test_hostile_fixture_reports_everything() -> Result<()> {
    let verdict = sandbox::check(HOSTILE)?;
    assert!(!verdict.accepted);
    for kind in [NodeKind::Import, NodeKind::For, NodeKind::Attribute, NodeKind::Alias] {
        assert!(verdict.disallowed_node_kinds.contains(&kind), "{kind}");
    }
    for call in ["range", "print", "os.system", "eval"] {
        assert!(verdict.disallowed_calls.contains(call), "{call}");
    }
    Ok(())
}

#[test]
fn test_disallowed_kinds_never_overlap_allow_list() -> Result<()> {
    let scripts = [
        "x = Note()\n",
        "Note()[0]\n",
        "Note(lambda: 1)\n",
        "Note(1 + 2)\n",
        "Note([1, 2])\n",
        "Note({'a': 1})\n",
        "def Foo():\n    pass\n",
        "class Foo:\n    pass\n",
        "try:\n    Note()\nexcept E:\n    pass\n",
        "while True:\n    pass\n",
        "if X:\n    pass\n",
        "Note(*args)\n",
        "Note(f'{X}')\n",
        "Note(X if Y else Z)\n",
        "Note(not X)\n",
        "Note(~X)\n",
        "del X\n",
        "assert X\n",
        "raise X\n",
        "global X\n",
    ];
    for script in scripts {
        let verdict = sandbox::check(script)?;
        assert!(!verdict.accepted, "{script:?} should be rejected");
        assert!(!verdict.disallowed_node_kinds.is_empty(), "{script:?}");
        assert!(verdict
            .disallowed_node_kinds
            .iter()
            .all(|kind| !ALLOWED_NODE_KINDS.contains(kind)));
    }
    Ok(())
}

#[test]
fn test_rejection_error_keeps_both_sets() -> Result<()> {
    let err = sandbox::check(HOSTILE)?.into_result().unwrap_err();
    let ErrorKind::Rejected(rejection) = err.kind() else {
        panic!("expected a rejection, got {err}");
    };
    assert!(rejection.node_kinds.contains(&NodeKind::For));
    assert!(rejection.calls.contains("print"));
    let message = err.to_string();
    assert!(message.contains("for"));
    assert!(message.contains("os.system"));
    Ok(())
}

#[test]
fn test_syntax_errors_are_not_verdicts() {
    for script in ["Note(", "with Note()\n    pass\n", "Note(a=1, a=2)\n"] {
        let err = sandbox::check(script).unwrap_err();
        assert!(
            matches!(err.kind(), ErrorKind::Syntax(_) | ErrorKind::Lexical(_)),
            "{script:?}: {err}"
        );
    }
}
