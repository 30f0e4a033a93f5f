#![no_main]
use libfuzzer_sys::fuzz_target;
use zscore::xml;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = xml::to_script(s);
    }
});
