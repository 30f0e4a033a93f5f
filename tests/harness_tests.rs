#![allow(clippy::panic_in_result_fn)]
#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use zscore::error::{UsageError, ValidationError};
use zscore::script::NodeKind;
use zscore::{
    BuilderConfig, Catalogue, ElementNode, ErrorKind, Harness, HarnessConfig, Output, Result,
    SchemaRegistry,
};

const TWINKLE: &str = include_str!("fixtures/twinkle.score");
const HOSTILE: &str = include_str!("fixtures/hostile.score");

fn tags(node: &ElementNode) -> Vec<&str> {
    node.children().iter().map(ElementNode::tag).collect()
}

fn usage_error(result: Result<Output>) -> UsageError {
    let err = result.unwrap_err();
    match err.kind() {
        ErrorKind::Usage(usage) => usage.clone(),
        _ => panic!("expected a usage error, got {err}"),
    }
}

#[test]
fn test_twinkle_end_to_end() -> Result<()> {
    let output = Harness::with_defaults()?.run(TWINKLE)?;
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);

    let xml = output.to_xml();
    assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\""));
    assert!(xml.contains("<!DOCTYPE score-partwise PUBLIC"));

    let root = output.document.root();
    assert_eq!(root.tag(), "score-partwise");
    assert_eq!(root.attribute("version"), Some("4.0"));
    assert_eq!(tags(root), ["movement-title", "part-list", "part"]);

    let part = root.child("part").unwrap();
    assert_eq!(part.attribute("id"), Some("P1"));
    let measures: Vec<&ElementNode> = part.children_named("measure").collect();
    assert_eq!(measures.len(), 2);
    assert_eq!(tags(measures[0]), ["attributes", "note", "note", "note", "note"]);
    assert_eq!(tags(measures[0].child("attributes").unwrap()), ["divisions", "time"]);

    for note in measures.iter().flat_map(|m| m.children_named("note")) {
        assert_eq!(tags(note), ["pitch", "duration", "type"]);
    }
    let third = measures[0].children_named("note").nth(2).unwrap();
    let step = third.child("pitch").and_then(|p| p.child("step")).unwrap();
    assert_eq!(step.text(), Some("G"));

    let last = measures[1].children_named("note").last().unwrap();
    assert_eq!(tags(last.child("pitch").unwrap()), ["step", "octave"]);
    assert_eq!(last.child("type").and_then(ElementNode::text), Some("half"));

    let score_part = root.child("part-list").and_then(|l| l.child("score-part")).unwrap();
    assert_eq!(score_part.attribute("id"), Some("P1"));
    assert_eq!(tags(score_part), ["part-name"]);
    Ok(())
}

#[test]
fn test_runs_are_independent() -> Result<()> {
    let harness = Harness::with_defaults()?;
    let first = harness.run(TWINKLE)?;
    let second = harness.run(TWINKLE)?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn test_nested_names_leave_with_their_scope() {
    let script = "\
with Pitch():
    Step('C')
    Octave(4)
Step('D')
";
    let err = Harness::with_defaults().unwrap().run(script).unwrap_err();
    assert_eq!(
        err.kind(),
        &ErrorKind::Usage(UsageError::UnknownName("Step".to_string()))
    );
    assert_eq!(err.span().start.line, 4);
}

#[test]
fn test_with_target_survives_scope_exit() -> Result<()> {
    let script = "\
with Pitch() as Step:
    Octave(4)
Step()
";
    let err = usage_error(Harness::with_defaults()?.run(script));
    assert_eq!(err, UsageError::NotCallable("Step".to_string()));
    Ok(())
}

#[test]
fn test_scope_names_never_shadow_existing_bindings() -> Result<()> {
    let script = "\
with Note() as Duration:
    with Forward():
        Duration(2)
";
    let err = usage_error(Harness::with_defaults()?.run(script));
    assert_eq!(err, UsageError::NotCallable("Duration".to_string()));
    Ok(())
}

#[test]
fn test_accepted_but_unsupported_forms() -> Result<()> {
    let harness = Harness::with_defaults()?;
    assert_eq!(
        usage_error(harness.run("Pitch(**_())\n")),
        UsageError::Unsupported("** arguments".to_string())
    );
    assert_eq!(
        usage_error(harness.run("Pitch(...)\n")),
        UsageError::Unsupported("...".to_string())
    );
    assert_eq!(
        usage_error(harness.run("__import__('os')\n")),
        UsageError::UnknownName("__import__".to_string())
    );
    assert_eq!(
        usage_error(harness.run("Pitch()()\n")),
        UsageError::NotCallable("<call>".to_string())
    );
    Ok(())
}

#[test]
fn test_strict_mode_escalates_warnings() -> Result<()> {
    let script = "Time(Beats='4')\n";

    let output = Harness::with_defaults()?.run(script)?;
    assert_eq!(output.diagnostics.len(), 1);
    assert!(output.diagnostics[0].to_string().contains("beat-type"));

    let strict = Harness::with_defaults()?.with_config(HarnessConfig {
        builder: BuilderConfig {
            escalate_warnings: true,
        },
        ..HarnessConfig::default()
    });
    let err = strict.run(script).unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::Validation(ValidationError { count: 1, .. })
    ));
    Ok(())
}

#[test]
fn test_missing_schema_skips_validation() -> Result<()> {
    let script = "with Pitch():\n    Step('H')\n";
    assert!(!Harness::with_defaults()?.run(script)?.diagnostics.is_empty());

    let harness = Harness::new(
        Arc::new(Catalogue::load_default()?),
        Arc::new(SchemaRegistry::unavailable()),
        HarnessConfig {
            builder: BuilderConfig {
                escalate_warnings: true,
            },
            ..HarnessConfig::default()
        },
    );
    let output = harness.run(script)?;
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
    let pitch = output.document.root();
    assert_eq!(pitch.tag(), "pitch");
    assert_eq!(tags(pitch), ["step"]);
    assert_eq!(pitch.child("step").and_then(ElementNode::text), Some("H"));

    assert!(harness.run("Time(Beats='4')\n")?.diagnostics.is_empty());
    Ok(())
}

#[test]
fn test_rejected_script_never_runs() -> Result<()> {
    let err = Harness::with_defaults()?.run(HOSTILE).unwrap_err();
    let ErrorKind::Rejected(rejection) = err.kind() else {
        panic!("expected a rejection, got {err}");
    };
    assert!(rejection.node_kinds.contains(&NodeKind::Import));
    assert!(rejection.calls.contains("os.system"));
    Ok(())
}

#[test]
fn test_second_top_level_element_replaces_first() -> Result<()> {
    let output = Harness::with_defaults()?.run("Pitch('C', None, 4)\nPitch('D', None, 5)\n")?;
    let step = output.document.root().child("step").unwrap();
    assert_eq!(step.text(), Some("D"));
    Ok(())
}

#[test]
fn test_empty_script_has_no_document() -> Result<()> {
    let err = Harness::with_defaults()?.run("# nothing here\n").unwrap_err();
    assert_eq!(err.kind(), &ErrorKind::Usage(UsageError::EmptyDocument));
    Ok(())
}

#[test]
fn test_siblings_written_out_of_order_are_serialized_canonically() -> Result<()> {
    let script = "\
with Attributes():
    Time(number='2', Beats='3', BeatType='4')
    Key(number='1', Fifths='0')
";
    let xml = Harness::with_defaults()?.run(script)?.to_xml();
    assert!(xml.starts_with("<?xml "), "{xml}");
    let key = xml.find("<key number=\"1\">").unwrap();
    let time = xml.find("<time number=\"2\">").unwrap();
    assert!(key < time, "{xml}");
    Ok(())
}
