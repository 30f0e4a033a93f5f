#![no_main]
use libfuzzer_sys::fuzz_target;
use zscore::Harness;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(harness) = Harness::with_defaults() {
            if matches!(harness.check(s), Ok(verdict) if verdict.accepted) {
                let _ = harness.run(s);
            }
        }
    }
});
