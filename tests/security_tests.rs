#![allow(clippy::panic_in_result_fn)]
#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]

use zscore::error::SecurityError;
use zscore::script::parser::{DEFAULT_MAX_DEPTH, DEFAULT_MAX_SIZE};
use zscore::script::ScriptConfig;
use zscore::{sandbox, xml, ErrorKind, Harness, HarnessConfig, Result};

fn harness_with(script: ScriptConfig) -> Result<Harness> {
    Ok(Harness::with_defaults()?.with_config(HarnessConfig {
        script,
        ..HarnessConfig::default()
    }))
}

fn nested_with_blocks(levels: usize) -> String {
    let mut script = String::new();
    for level in 0..levels {
        script.push_str(&"    ".repeat(level));
        script.push_str("with Measure():\n");
    }
    script.push_str(&"    ".repeat(levels));
    script.push_str("pass\n");
    script
}

// Test harness threads and most hosts' worker threads get this much stack
const SMALL_STACK: usize = 2 * 1024 * 1024;

fn on_small_stack<T: Send + 'static>(work: impl FnOnce() -> T + Send + 'static) -> T {
    std::thread::Builder::new()
        .stack_size(SMALL_STACK)
        .spawn(work)
        .unwrap()
        .join()
        .unwrap()
}

fn is_security_error<T>(result: &Result<T>) -> bool {
    matches!(result, Err(err) if matches!(err.kind(), ErrorKind::Security(_)))
}

#[test]
fn test_max_script_size() {
    let script = "Pitch()\n".repeat(DEFAULT_MAX_SIZE / 8 + 1);
    let err = sandbox::check(&script).unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::Security(SecurityError::MaxSizeExceeded { .. })
    ));
}

#[test]
fn test_configured_size_limit_applies_to_runs() -> Result<()> {
    let harness = harness_with(ScriptConfig::new(DEFAULT_MAX_DEPTH, 16))?;
    let err = harness.run("Pitch('C', None, 4)\n").unwrap_err();
    assert_eq!(
        err.kind(),
        &ErrorKind::Security(SecurityError::MaxSizeExceeded { max: 16 })
    );
    assert!(harness.run("Pitch('C')\n").is_ok());
    Ok(())
}

#[test]
fn test_max_call_depth() {
    let depth = DEFAULT_MAX_DEPTH + 1;
    let script = format!("{}{}\n", "Note(".repeat(depth), ")".repeat(depth));
    let err = sandbox::check(&script).unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::Security(SecurityError::MaxDepthExceeded { .. })
    ));
}

#[test]
fn test_call_depth_at_limit_fits_small_stack() {
    let (accepted, run_hit_limit) = on_small_stack(|| {
        let depth = DEFAULT_MAX_DEPTH;
        let script = format!("{}{}\n", "Note(".repeat(depth), ")".repeat(depth));
        let accepted = sandbox::check(&script).map(|verdict| verdict.accepted);
        let run = Harness::with_defaults().and_then(|harness| harness.run(&script));
        (accepted.unwrap_or(false), is_security_error(&run))
    });
    assert!(accepted);
    assert!(!run_hit_limit);
}

#[test]
fn test_call_depth_over_limit_on_small_stack() {
    let hit_limit = on_small_stack(|| {
        let depth = DEFAULT_MAX_DEPTH * 4;
        let script = format!("{}{}\n", "Note(".repeat(depth), ")".repeat(depth));
        is_security_error(&sandbox::check(&script))
    });
    assert!(hit_limit);
}

#[test]
fn test_block_depth_at_limit_fits_small_stack() {
    let (accepted, run_hit_limit) = on_small_stack(|| {
        let script = nested_with_blocks(DEFAULT_MAX_DEPTH);
        let accepted = sandbox::check(&script).map(|verdict| verdict.accepted);
        let run = Harness::with_defaults().and_then(|harness| harness.run(&script));
        (accepted.unwrap_or(false), is_security_error(&run))
    });
    assert!(accepted);
    assert!(!run_hit_limit);
}

#[test]
fn test_max_block_depth() -> Result<()> {
    assert!(sandbox::check(&nested_with_blocks(4))?.accepted);

    let err = sandbox::check(&nested_with_blocks(DEFAULT_MAX_DEPTH + 1)).unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::Security(SecurityError::MaxDepthExceeded { .. })
    ));

    let harness = harness_with(ScriptConfig::new(3, 0))?;
    let err = harness.run(&nested_with_blocks(5)).unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::Security(SecurityError::MaxDepthExceeded { max: 3 })
    ));
    Ok(())
}

#[test]
fn test_unlimited_config() -> Result<()> {
    let script = "Pitch()\n".repeat(DEFAULT_MAX_SIZE / 8 + 1);
    assert!(sandbox::check_with_config(&script, ScriptConfig::unlimited())?.accepted);
    Ok(())
}

#[test]
fn test_escape_hatches_are_rejected() -> Result<()> {
    let attempts = [
        "Note.__class__\n",
        "Note(Pitch=getattr(Note, 'x'))\n",
        "Note(Type=open('/etc/passwd'))\n",
        "Note(Type=exec('1'))\n",
        "Note(Type=Note.__init__.__globals__)\n",
        "from os import system\n",
        "Note(Type=[x for x in X])\n",
    ];
    for script in attempts {
        let verdict = sandbox::check(script)?;
        assert!(!verdict.accepted, "{script:?} was accepted");
    }
    Ok(())
}

#[test]
fn test_xml_depth_limit() {
    let depth = xml::MAX_DEPTH + 1;
    let document = format!("{}{}", "<a>".repeat(depth), "</a>".repeat(depth));
    let err = xml::parse(&document).unwrap_err();
    assert_eq!(
        err.kind(),
        &ErrorKind::Security(SecurityError::MaxDepthExceeded {
            max: xml::MAX_DEPTH
        })
    );
    assert!(xml::to_script(&document).is_err());

    let shallow = format!("{}{}", "<a>".repeat(8), "</a>".repeat(8));
    assert!(xml::parse(&shallow).is_ok());
}

#[test]
fn test_xml_depth_at_limit_fits_small_stack() {
    let (parsed, translated) = on_small_stack(|| {
        let depth = xml::MAX_DEPTH;
        let document = format!("{}x{}", "<a>".repeat(depth), "</a>".repeat(depth));
        (xml::parse(&document).is_ok(), xml::to_script(&document).is_ok())
    });
    assert!(parsed);
    assert!(translated);
}
