#![allow(clippy::panic_in_result_fn)]
#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]

use zscore::{sandbox, xml, ElementNode, ErrorKind, Harness, Result};

const TWINKLE: &str = include_str!("fixtures/twinkle.score");

#[test]
fn test_rendered_document_reads_back() -> Result<()> {
    let output = Harness::with_defaults()?.run(TWINKLE)?;
    let root = xml::parse(&output.to_xml())?;
    assert_eq!(&root, output.document.root());
    Ok(())
}

#[test]
fn test_translated_script_rebuilds_document() -> Result<()> {
    let harness = Harness::with_defaults()?;
    let original = harness.run(TWINKLE)?;

    let script = xml::to_script(&original.to_xml())?;
    assert!(script.starts_with("with ScorePartwise(version='4.0'):\n"), "{script}");
    assert!(sandbox::check(&script)?.accepted, "{script}");

    let rebuilt = harness.run(&script)?;
    assert_eq!(rebuilt.document, original.document);
    assert!(rebuilt.diagnostics.is_empty(), "{:?}", rebuilt.diagnostics);
    Ok(())
}

#[test]
fn test_translation_quotes_awkward_text() -> Result<()> {
    let script = xml::to_script("<work><work-title>It's \"fine\" &amp; done</work-title></work>")?;
    assert!(sandbox::check(&script)?.accepted, "{script}");
    let output = Harness::with_defaults()?.run(&script)?;
    let title = output.document.root().child("work-title").unwrap();
    assert_eq!(title.text(), Some("It's \"fine\" & done"));
    Ok(())
}

#[test]
fn test_foreign_documents_translate_but_do_not_run() -> Result<()> {
    let script = xml::to_script("<banana ripe=\"yes\"><peel/></banana>")?;
    assert_eq!(script, "with Banana(ripe='yes'):\n    Peel()\n");
    let err = Harness::with_defaults()?.run(&script).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Usage(_)), "{err}");
    Ok(())
}

#[test]
fn test_escaped_output_is_well_formed() -> Result<()> {
    let output = Harness::with_defaults()?.run("Work(WorkTitle='a < b & c')\n")?;
    let root: ElementNode = xml::parse(&output.to_xml())?;
    assert_eq!(
        root.child("work-title").and_then(ElementNode::text),
        Some("a < b & c")
    );
    Ok(())
}
