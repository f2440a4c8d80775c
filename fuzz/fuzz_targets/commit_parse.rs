#![no_main]

use libfuzzer_sys::fuzz_target;
use modship_changelog::{Changelog, CommitLinker, parse_commit};

fuzz_target!(|data: &[u8]| {
    let Ok(message) = std::str::from_utf8(data) else {
        return;
    };

    if let Some(entry) = parse_commit("0123456789abcdef", message) {
        assert!(!entry.description.is_empty());
        assert_eq!(entry.description, entry.description.trim());
    }

    // Rendering must never panic, whatever the subjects look like.
    let commits = message.split('\0').enumerate().map(|(i, m)| (format!("{i:07x}"), m));
    let changelog = Changelog::from_commits(commits);
    let _ = changelog.render(&CommitLinker::new("https://github.com/o/r"));
});
