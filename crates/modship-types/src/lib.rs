//! Core domain types for modship.
//!
//! This crate provides the fundamental types shared across the modship
//! workspace: variant descriptors, runtime versions, conventional commit
//! kinds, run phases, per-target outcomes and the classified
//! [`ReleaseError`].

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classified release failures.
///
/// Plumbing code propagates `anyhow::Error`; these variants are attached at
/// the point where the failure class is known so callers can `downcast_ref`
/// and decide whether a failure is fatal, per-target, or cosmetic.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReleaseError {
    /// Malformed variant tree or task graph. Aborts before any build.
    #[error("structural error: {0}")]
    Structural(String),

    /// A target that is actually invoked lacks a required identifier or credential.
    #[error("configuration error for {target}: {message}")]
    Configuration { target: String, message: String },

    /// A source-control or distribution metadata request failed.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// One target rejected or failed a publish call.
    #[error("publish to {target} failed: {message}")]
    Publish { target: String, message: String },

    /// The webhook did not accept the announcement.
    #[error("notification failed: {0}")]
    Notify(String),

    /// A relocated artifact would clobber a file with different provenance.
    #[error("refusing to overwrite {path}: {message}")]
    RelocationConflict { path: String, message: String },
}

/// Error returned when a runtime version string cannot be parsed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid runtime version '{input}': {reason}")]
pub struct RuntimeVersionError {
    pub input: String,
    pub reason: String,
}

/// A target runtime version such as `1.20.6` or `1.21`.
///
/// Ordering is semantic, never lexical: missing components are treated as
/// zero (`1.21 == 1.21.0` for comparison purposes) and `1.9 < 1.17`. The
/// original spelling is kept for display and artifact naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RuntimeVersion {
    raw: String,
    parsed: semver::Version,
}

impl RuntimeVersion {
    /// The version exactly as declared.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The normalized semantic version used for ordering.
    pub fn semver(&self) -> &semver::Version {
        &self.parsed
    }

    /// `self >= threshold` using semantic ordering.
    pub fn at_least(&self, threshold: &RuntimeVersion) -> bool {
        self.parsed >= threshold.parsed
    }
}

impl FromStr for RuntimeVersion {
    type Err = RuntimeVersionError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let fail = |reason: &str| RuntimeVersionError {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(fail("empty version"));
        }

        let (core, pre) = match trimmed.split_once('-') {
            Some((core, pre)) => (core, Some(pre)),
            None => (trimmed, None),
        };

        let parts: Vec<&str> = core.split('.').collect();
        if parts.len() > 3 {
            return Err(fail("expected at most three numeric components"));
        }

        let mut numbers = [0u64; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            *slot = part
                .parse::<u64>()
                .map_err(|_| fail("components must be non-negative integers"))?;
        }

        let mut parsed = semver::Version::new(numbers[0], numbers[1], numbers[2]);
        if let Some(pre) = pre {
            parsed.pre =
                semver::Prerelease::new(pre).map_err(|_| fail("invalid pre-release suffix"))?;
        }

        Ok(Self {
            raw: trimmed.to_string(),
            parsed,
        })
    }
}

impl TryFrom<String> for RuntimeVersion {
    type Error = RuntimeVersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RuntimeVersion> for String {
    fn from(value: RuntimeVersion) -> Self {
        value.raw
    }
}

impl fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq for RuntimeVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RuntimeVersion {}

impl PartialOrd for RuntimeVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RuntimeVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        // Spelling breaks ties so `1.21` and `1.21.0` stay distinct keys.
        self.parsed
            .cmp(&other.parsed)
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl std::hash::Hash for RuntimeVersion {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.parsed.hash(state);
        self.raw.hash(state);
    }
}

/// Label used wherever the common node needs a loader-shaped name.
pub const COMMON_LABEL: &str = "common";

/// Identifies one build target: a runtime version plus a loader.
///
/// An empty loader denotes the shared "common" node of that runtime version.
/// Field order matters: derived ordering sorts by runtime first, and the
/// common node (empty loader) sorts before every loader of its runtime.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VariantDescriptor {
    pub runtime: RuntimeVersion,
    #[serde(default)]
    pub loader: String,
}

impl VariantDescriptor {
    pub fn new(runtime: RuntimeVersion, loader: impl Into<String>) -> Self {
        Self {
            runtime,
            loader: loader.into(),
        }
    }

    pub fn common(runtime: RuntimeVersion) -> Self {
        Self::new(runtime, "")
    }

    pub fn is_common(&self) -> bool {
        self.loader.is_empty()
    }

    /// Loader name, or `common` for the common node.
    pub fn loader_label(&self) -> &str {
        if self.is_common() {
            COMMON_LABEL
        } else {
            &self.loader
        }
    }

    /// The common node this descriptor depends on (itself for a common node).
    pub fn common_sibling(&self) -> Self {
        Self::common(self.runtime.clone())
    }
}

impl fmt::Display for VariantDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.runtime, self.loader_label())
    }
}

/// Conventional commit types recognised by the changelog, in rendering order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitType {
    Feat,
    Fix,
    Chore,
    Docs,
    Refactor,
    Perf,
    Test,
    Ci,
    Revert,
}

impl CommitType {
    /// Every type in the fixed order groups are rendered in.
    pub const ALL: [CommitType; 9] = [
        CommitType::Feat,
        CommitType::Fix,
        CommitType::Chore,
        CommitType::Docs,
        CommitType::Refactor,
        CommitType::Perf,
        CommitType::Test,
        CommitType::Ci,
        CommitType::Revert,
    ];

    /// Parse a type token such as `feat`. Unknown tokens yield `None`.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "feat" => Some(CommitType::Feat),
            "fix" => Some(CommitType::Fix),
            "chore" => Some(CommitType::Chore),
            "docs" => Some(CommitType::Docs),
            "refactor" => Some(CommitType::Refactor),
            "perf" => Some(CommitType::Perf),
            "test" => Some(CommitType::Test),
            "ci" => Some(CommitType::Ci),
            "revert" => Some(CommitType::Revert),
            _ => None,
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            CommitType::Feat => "feat",
            CommitType::Fix => "fix",
            CommitType::Chore => "chore",
            CommitType::Docs => "docs",
            CommitType::Refactor => "refactor",
            CommitType::Perf => "perf",
            CommitType::Test => "test",
            CommitType::Ci => "ci",
            CommitType::Revert => "revert",
        }
    }

    /// Markdown heading text for this group.
    pub fn heading(self) -> &'static str {
        match self {
            CommitType::Feat => "✨ Features",
            CommitType::Fix => "🐛 Bug Fixes",
            CommitType::Chore => "🧹 Chores",
            CommitType::Docs => "📚 Documentation",
            CommitType::Refactor => "♻️ Refactors",
            CommitType::Perf => "⚡ Performance",
            CommitType::Test => "🧪 Tests",
            CommitType::Ci => "🤖 CI",
            CommitType::Revert => "⏪ Reverts",
        }
    }
}

impl fmt::Display for CommitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// One classified commit between two revisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogEntry {
    pub hash: String,
    pub kind: CommitType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub description: String,
}

/// Distribution endpoints a node can publish to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Modrinth,
    Curseforge,
    Github,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Modrinth => write!(f, "modrinth"),
            TargetKind::Curseforge => write!(f, "curseforge"),
            TargetKind::Github => write!(f, "github"),
        }
    }
}

/// Release channel advertised to distribution endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseType {
    #[default]
    Stable,
    Beta,
    Alpha,
}

impl ReleaseType {
    /// The channel name Modrinth and CurseForge both accept.
    pub fn api_name(self) -> &'static str {
        match self {
            ReleaseType::Stable => "release",
            ReleaseType::Beta => "beta",
            ReleaseType::Alpha => "alpha",
        }
    }
}

/// Phases of one publish run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Idle,
    ChangelogReady,
    PerNodePublishing,
    Notifying,
    Done,
    Failed,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Done | RunPhase::Failed)
    }

    /// Move to `next`, rejecting anything but the forward edge or `Failed`.
    pub fn advance(self, next: RunPhase) -> Result<RunPhase, ReleaseError> {
        let allowed = match (self, next) {
            (from, RunPhase::Failed) => !from.is_terminal(),
            (RunPhase::Idle, RunPhase::ChangelogReady) => true,
            (RunPhase::ChangelogReady, RunPhase::PerNodePublishing) => true,
            (RunPhase::PerNodePublishing, RunPhase::Notifying) => true,
            (RunPhase::Notifying, RunPhase::Done) => true,
            _ => false,
        };

        if allowed {
            Ok(next)
        } else {
            Err(ReleaseError::Structural(format!(
                "illegal run transition {self:?} -> {next:?}"
            )))
        }
    }
}

/// Why a target did not publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    Configuration,
    Publish,
}

/// Result of invoking one target for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TargetOutcome {
    Published {
        #[serde(skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    DryRun,
    Skipped {
        reason: String,
    },
    Failed {
        class: FailureClass,
        message: String,
    },
}

impl TargetOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            TargetOutcome::Published { .. } | TargetOutcome::DryRun | TargetOutcome::Skipped { .. }
        )
    }

    pub fn short(&self) -> &'static str {
        match self {
            TargetOutcome::Published { .. } => "published",
            TargetOutcome::DryRun => "dry-run",
            TargetOutcome::Skipped { .. } => "skipped",
            TargetOutcome::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetReport {
    pub target: TargetKind,
    pub outcome: TargetOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeReport {
    pub node: VariantDescriptor,
    pub targets: Vec<TargetReport>,
}

impl NodeReport {
    pub fn succeeded(&self) -> bool {
        self.targets.iter().all(|t| t.outcome.is_success())
    }
}

/// Changelog state a publish run started from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ChangelogStatus {
    Generated { from: String, to: String, entries: usize },
    Unavailable { reason: String },
}

/// What happened to the release announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NotifyStatus {
    Sent,
    Skipped { reason: String },
    Warned { message: String },
}

/// Per-run evidence: which node/target succeeded and which failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub report_version: String,
    pub mod_version: String,
    pub dry_run: bool,
    pub phase: RunPhase,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changelog: Option<ChangelogStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_release: Option<TargetOutcome>,
    pub nodes: Vec<NodeReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotifyStatus>,
}

impl RunReport {
    pub fn failed_nodes(&self) -> impl Iterator<Item = &NodeReport> {
        self.nodes.iter().filter(|n| !n.succeeded())
    }
}
