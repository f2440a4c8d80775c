#![no_main]

use libfuzzer_sys::fuzz_target;
use modship_types::RuntimeVersion;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(version) = text.parse::<RuntimeVersion>() {
        // Spelling survives a reparse and compares equal to itself.
        let again: RuntimeVersion = version.as_str().parse().expect("reparse");
        assert_eq!(version, again);
        assert_eq!(version.as_str(), again.as_str());
    }
});
