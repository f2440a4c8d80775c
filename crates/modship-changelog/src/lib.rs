//! Conventional-commit changelog for modship.
//!
//! Parses commit subjects of the form `type(scope)!: description`, groups
//! them by type in a fixed order and renders a Markdown document. Commits
//! whose subject does not carry a recognised type are dropped, never
//! reported as errors.
//!
//! # Example
//!
//! ```
//! use modship_changelog::{Changelog, CommitLinker};
//!
//! let changelog = Changelog::from_commits([
//!     ("a1b2c3d4e5", "fix(render): clip overlay"),
//!     ("0f9e8d7c6b", "feat: add config screen"),
//!     ("1234567890", "merge branch 'main'"),
//! ]);
//!
//! let linker = CommitLinker::new("https://github.com/owner/repo");
//! let md = changelog.render(&linker);
//! assert!(md.find("Features").unwrap() < md.find("Bug Fixes").unwrap());
//! assert!(!md.contains("merge branch"));
//! ```

use modship_types::{ChangelogEntry, CommitType};

/// Number of hash characters shown in rendered links.
pub const SHORT_HASH_LEN: usize = 7;

/// Parse a single commit into a changelog entry.
///
/// Only the first line of `message` is considered. Returns `None` for
/// messages without a recognised conventional type or with an empty
/// description.
pub fn parse_commit(hash: &str, message: &str) -> Option<ChangelogEntry> {
    let subject = message.lines().next()?.trim();
    let (header, description) = subject.split_once(':')?;
    let description = description.trim();
    if description.is_empty() {
        return None;
    }

    let header = header.trim_end();
    let header = header.strip_suffix('!').unwrap_or(header);

    let (token, scope) = match header.split_once('(') {
        Some((token, rest)) => {
            let scope = rest.strip_suffix(')')?.trim();
            let scope = (!scope.is_empty()).then(|| scope.to_string());
            (token, scope)
        }
        None => (header, None),
    };

    let kind = CommitType::from_token(token)?;

    Some(ChangelogEntry {
        hash: hash.to_string(),
        kind,
        scope,
        description: description.to_string(),
    })
}

/// Builds commit URLs for rendered entries.
#[derive(Debug, Clone)]
pub struct CommitLinker {
    repo_url: String,
}

impl CommitLinker {
    /// `repo_url` is the web URL of the repository, e.g. `https://github.com/owner/repo`.
    pub fn new(repo_url: &str) -> Self {
        Self {
            repo_url: repo_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn commit_url(&self, hash: &str) -> String {
        format!("{}/commit/{}", self.repo_url, hash)
    }
}

/// Classified commits in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changelog {
    entries: Vec<ChangelogEntry>,
}

impl Changelog {
    /// Classify `(hash, message)` pairs, keeping their order and dropping
    /// anything that is not a conventional commit.
    pub fn from_commits<I, H, M>(commits: I) -> Self
    where
        I: IntoIterator<Item = (H, M)>,
        H: AsRef<str>,
        M: AsRef<str>,
    {
        let entries = commits
            .into_iter()
            .filter_map(|(hash, message)| parse_commit(hash.as_ref(), message.as_ref()))
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[ChangelogEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Non-empty groups in rendering order; entries keep source order.
    pub fn groups(&self) -> Vec<(CommitType, Vec<&ChangelogEntry>)> {
        CommitType::ALL
            .iter()
            .filter_map(|kind| {
                let members: Vec<&ChangelogEntry> =
                    self.entries.iter().filter(|e| e.kind == *kind).collect();
                (!members.is_empty()).then_some((*kind, members))
            })
            .collect()
    }

    /// Render the grouped Markdown document.
    pub fn render(&self, linker: &CommitLinker) -> String {
        let sections: Vec<String> = self
            .groups()
            .into_iter()
            .map(|(kind, members)| {
                let mut section = format!("### {}\n", kind.heading());
                for entry in members {
                    section.push_str(&render_entry(entry, linker));
                    section.push('\n');
                }
                section
            })
            .collect();

        sections.join("\n")
    }
}

fn render_entry(entry: &ChangelogEntry, linker: &CommitLinker) -> String {
    let short: String = entry.hash.chars().take(SHORT_HASH_LEN).collect();
    let scope = entry
        .scope
        .as_deref()
        .map(|s| format!("**{s}** "))
        .unwrap_or_default();

    format!(
        "- {scope}{} ([{short}]({}))",
        entry.description,
        linker.commit_url(&entry.hash)
    )
}
