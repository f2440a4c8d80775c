#![no_main]

use std::path::Path;

use libfuzzer_sys::fuzz_target;
use modship::config::ModshipConfig;
use modship::engine::Project;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(config) = toml::from_str::<ModshipConfig>(text) else {
        return;
    };

    // A config that parses either builds an acyclic project or is rejected.
    if let Ok(project) = Project::from_config(Path::new("/fuzz"), config) {
        let levels = project
            .plan(modship::graph::Stages::RELEASE)
            .expect("release graph is acyclic");
        let total: usize = levels.iter().map(Vec::len).sum();
        assert_eq!(total, project.graph(modship::graph::Stages::RELEASE).len());
    }
});
