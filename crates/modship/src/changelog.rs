//! Changelog generation against the source-control host.
//!
//! The previous release is the first tag the host lists; the range ends at
//! the local `HEAD` (or the configured commitish outside a checkout).
//! Fetch failures are fatal, a missing tag or repository is not.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use modship_changelog::{Changelog, CommitLinker};
use modship_registry::GithubClient;
use modship_types::{ChangelogStatus, ReleaseError};

use crate::config::ModshipConfig;
use crate::engine::Reporter;
use crate::git;

/// Result of changelog generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangelogDoc {
    Generated {
        from: String,
        to: String,
        text: String,
        entries: usize,
    },
    Unavailable {
        reason: String,
    },
}

impl ChangelogDoc {
    /// Rendered Markdown; empty when unavailable.
    pub fn text(&self) -> &str {
        match self {
            ChangelogDoc::Generated { text, .. } => text,
            ChangelogDoc::Unavailable { .. } => "",
        }
    }

    pub fn status(&self) -> ChangelogStatus {
        match self {
            ChangelogDoc::Generated {
                from, to, entries, ..
            } => ChangelogStatus::Generated {
                from: from.clone(),
                to: to.clone(),
                entries: *entries,
            },
            ChangelogDoc::Unavailable { reason } => ChangelogStatus::Unavailable {
                reason: reason.clone(),
            },
        }
    }
}

fn fetch_error(err: anyhow::Error) -> anyhow::Error {
    ReleaseError::Fetch(format!("{err:#}")).into()
}

/// Revision the changelog range ends at.
pub fn target_revision(config: &ModshipConfig, project_root: &Path) -> String {
    git::head_commit(project_root).unwrap_or_else(|| {
        config
            .publish
            .github
            .as_ref()
            .map(|g| g.commitish.clone())
            .unwrap_or_else(|| "main".to_string())
    })
}

/// Fetch, classify and render the commits since the previous tag.
pub fn generate_changelog(
    config: &ModshipConfig,
    project_root: &Path,
    github_token: Option<String>,
    reporter: &mut dyn Reporter,
) -> Result<ChangelogDoc> {
    if !config.changelog.enabled {
        reporter.info("changelog disabled in config");
        return Ok(ChangelogDoc::Unavailable {
            reason: "changelog disabled".to_string(),
        });
    }

    let Some(repo) = config.changelog_repository() else {
        reporter.warn("no repository configured for the changelog; skipping");
        return Ok(ChangelogDoc::Unavailable {
            reason: "no repository configured".to_string(),
        });
    };

    let client = GithubClient::new(config.github_api())
        .with_token(github_token)
        .with_timeout(config.publish.timeout);

    let Some(from) = client.latest_tag(repo).map_err(fetch_error)? else {
        reporter.warn(&format!("{repo} has no tags; changelog unavailable"));
        return Ok(ChangelogDoc::Unavailable {
            reason: "no previous tag".to_string(),
        });
    };
    reporter.info(&format!(
        "previous release tag: {from} (first tag listed by the host, not verified)"
    ));

    let to = target_revision(config, project_root);
    let commits = client.compare(repo, &from, &to).map_err(fetch_error)?;
    let changelog = Changelog::from_commits(
        commits
            .iter()
            .map(|c| (c.sha.as_str(), c.commit.message.as_str())),
    );
    reporter.info(&format!(
        "{} of {} commits in {from}...{to} are conventional",
        changelog.entries().len(),
        commits.len()
    ));

    let linker = CommitLinker::new(&format!(
        "{}/{}",
        config.github_web().trim_end_matches('/'),
        repo
    ));

    Ok(ChangelogDoc::Generated {
        from,
        to,
        text: changelog.render(&linker),
        entries: changelog.entries().len(),
    })
}

/// Write a generated changelog to `changelog.path`. Unavailable docs write nothing.
pub fn write_changelog(
    config: &ModshipConfig,
    project_root: &Path,
    doc: &ChangelogDoc,
) -> Result<Option<std::path::PathBuf>> {
    let ChangelogDoc::Generated { text, .. } = doc else {
        return Ok(None);
    };
    let path = project_root.join(&config.changelog.path);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    crate::report::atomic_write_bytes(&path, text.as_bytes())?;
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;
    use crate::test_support::{CollectingReporter, routes, spawn};

    fn config_for(api: &str) -> ModshipConfig {
        toml::from_str(&format!(
            r#"
[mod]
id = "demo"
name = "Demo"
version = "1.0.0"
group = "com.example"

[publish.github]
repository = "o/r"
commitish = "release"
api = "{api}"
uploads = "{api}"
web = "https://github.example"
"#
        ))
        .expect("config")
    }

    #[test]
    #[serial]
    fn generates_grouped_changelog_since_latest_tag() {
        let server = spawn(routes([
            ("GET /repos/o/r/tags", 200, r#"[{"name":"v0.9.0"},{"name":"v0.8.0"}]"#),
            (
                "GET /repos/o/r/compare/v0.9.0...release",
                200,
                r#"{"commits":[
                    {"sha":"1111111aaaa","commit":{"message":"feat(api): add thing\n\nbody"}},
                    {"sha":"2222222bbbb","commit":{"message":"Merge branch 'x'"}},
                    {"sha":"3333333cccc","commit":{"message":"fix: crash"}}
                ]}"#,
            ),
        ]));
        let td = tempfile::tempdir().expect("tempdir");
        let mut reporter = CollectingReporter::default();

        let doc = temp_env::with_var("MODSHIP_GIT_BIN", Some("modship-no-such-git"), || {
            generate_changelog(&config_for(&server.base_url), td.path(), None, &mut reporter)
        })
        .expect("changelog");
        server.join();

        let ChangelogDoc::Generated {
            from,
            to,
            text,
            entries,
        } = &doc
        else {
            panic!("expected generated changelog, got {doc:?}");
        };
        assert_eq!(from, "v0.9.0");
        assert_eq!(to, "release");
        assert_eq!(*entries, 2);
        assert!(text.contains(
            "- **api** add thing ([1111111](https://github.example/o/r/commit/1111111aaaa))"
        ));
        assert!(text.find("Features") < text.find("Bug Fixes"));
        assert!(reporter.infos.iter().any(|m| m.contains("not verified")));

        fs::write(td.path().join("CHANGELOG.md"), "stale").expect("seed");
        let written = write_changelog(&config_for("http://unused"), td.path(), &doc)
            .expect("write")
            .expect("path");
        assert_eq!(written, td.path().join("CHANGELOG.md"));
        assert_eq!(fs::read_to_string(&written).expect("read"), *text);
        assert!(!td.path().join("CHANGELOG.md.tmp").exists());
    }

    #[test]
    fn no_tags_is_unavailable() {
        let server = spawn(routes([("GET /repos/o/r/tags", 200, "[]")]));
        let td = tempfile::tempdir().expect("tempdir");
        let mut reporter = CollectingReporter::default();

        let doc = generate_changelog(&config_for(&server.base_url), td.path(), None, &mut reporter)
            .expect("changelog");
        server.join();

        assert_eq!(
            doc.status(),
            ChangelogStatus::Unavailable {
                reason: "no previous tag".to_string()
            }
        );
        assert_eq!(doc.text(), "");
        assert!(
            write_changelog(&config_for("x"), td.path(), &doc)
                .expect("write")
                .is_none()
        );
    }

    #[test]
    fn fetch_failure_is_fatal_and_classified() {
        let server = spawn(routes([("GET /repos/o/r/tags", 500, "boom")]));
        let td = tempfile::tempdir().expect("tempdir");
        let mut reporter = CollectingReporter::default();

        let err = generate_changelog(&config_for(&server.base_url), td.path(), None, &mut reporter)
            .expect_err("fetch failure");
        server.join();

        assert!(matches!(
            err.downcast_ref::<ReleaseError>(),
            Some(ReleaseError::Fetch(_))
        ));
    }

    #[test]
    fn disabled_changelog_makes_no_requests() {
        let mut config = config_for("http://127.0.0.1:9");
        config.changelog.enabled = false;
        let td = tempfile::tempdir().expect("tempdir");
        let mut reporter = CollectingReporter::default();

        let doc = generate_changelog(&config, td.path(), None, &mut reporter).expect("changelog");
        assert!(matches!(doc, ChangelogDoc::Unavailable { .. }));
    }

    #[test]
    fn missing_repository_warns() {
        let mut config = config_for("http://127.0.0.1:9");
        config.publish.github = None;
        let td = tempfile::tempdir().expect("tempdir");
        let mut reporter = CollectingReporter::default();

        let doc = generate_changelog(&config, td.path(), None, &mut reporter).expect("changelog");
        assert!(matches!(doc, ChangelogDoc::Unavailable { .. }));
        assert_eq!(reporter.warns.len(), 1);
    }
}
