//! Configuration file support for modship (`modship.toml`).
//!
//! The file lives in the project root and describes the mod, the variant
//! tree, the external build command and the distribution targets.
//! Credentials never appear here; they are read from the environment (see
//! [`crate::auth`]).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use modship_registry::{CURSEFORGE_API, GITHUB_API, GITHUB_UPLOADS, GITHUB_WEB, MODRINTH_API};
use modship_types::{ReleaseType, RuntimeVersion};

/// Default config file name, looked up in the project root.
pub const CONFIG_FILE: &str = "modship.toml";

/// Mod metadata shared by every node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModMetadata {
    pub id: String,
    pub name: String,
    pub version: String,
    pub group: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub license: String,
}

/// One loader branch of the variant tree. The empty loader is the common branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchConfig {
    pub loader: String,
    /// Restrict the branch to these runtimes; all declared runtimes when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtimes: Option<Vec<RuntimeVersion>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TreeConfig {
    #[serde(default)]
    pub runtimes: Vec<RuntimeVersion>,
    #[serde(default, rename = "branch")]
    pub branches: Vec<BranchConfig>,
}

/// Per-runtime overrides, keyed by the runtime spelling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeOverride {
    /// Runtime versions the artifact is advertised for.
    #[serde(default)]
    pub targets: Vec<String>,
}

/// `runtime >= min` selects `level`; the highest matching `min` wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelThreshold {
    pub min: RuntimeVersion,
    pub level: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetLevelConfig {
    #[serde(default = "default_thresholds")]
    pub thresholds: Vec<LevelThreshold>,
    #[serde(default = "default_level")]
    pub default: u32,
}

impl Default for TargetLevelConfig {
    fn default() -> Self {
        Self {
            thresholds: default_thresholds(),
            default: default_level(),
        }
    }
}

fn default_thresholds() -> Vec<LevelThreshold> {
    [("1.20.5", 21), ("1.17", 17)]
        .into_iter()
        .filter_map(|(min, level)| {
            min.parse()
                .ok()
                .map(|min| LevelThreshold { min, level })
        })
        .collect()
}

fn default_level() -> u32 {
    8
}

/// External build command, run once per node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Program to run; `MODSHIP_BUILD_BIN` overrides it.
    #[serde(default)]
    pub program: Option<String>,
    /// Arguments; `{runtime}`, `{loader}`, `{archive_name}`, `{version}` (mod version) and
    /// `{project_version}` (`<version>+<runtime>`) are expanded per node.
    #[serde(default)]
    pub args: Vec<String>,
    /// Where the build leaves its outputs, relative to the project root.
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: String,
    /// Artifact file extension.
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Kill the build after this long.
    #[serde(default, with = "humantime_opt", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    /// Builds of one dependency level that may run at the same time.
    #[serde(default = "default_jobs")]
    pub jobs: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            artifact_dir: default_artifact_dir(),
            extension: default_extension(),
            timeout: None,
            jobs: default_jobs(),
        }
    }
}

fn default_jobs() -> usize {
    1
}

fn default_artifact_dir() -> String {
    "versions/{runtime}-{loader}/build/libs".to_string()
}

fn default_extension() -> String {
    "jar".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root of the relocated artifact tree, relative to the project root.
    #[serde(default = "default_output_root")]
    pub root: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: default_output_root(),
        }
    }
}

fn default_output_root() -> PathBuf {
    PathBuf::from("output")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangelogConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Where the rendered changelog is written, relative to the project root.
    #[serde(default = "default_changelog_path")]
    pub path: PathBuf,
    /// Repository to read tags and commits from; defaults to `publish.github.repository`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
}

impl Default for ChangelogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_changelog_path(),
            repository: None,
        }
    }
}

fn default_changelog_path() -> PathBuf {
    PathBuf::from("CHANGELOG.md")
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModrinthConfig {
    /// Project id uploads go to.
    #[serde(default)]
    pub id: String,
    /// Slug used for links and icon lookup; falls back to `id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default = "default_modrinth_api")]
    pub api: String,
    /// Push the README as project description once per run.
    #[serde(default = "default_true")]
    pub sync_body: bool,
    /// Only publish nodes of these runtimes; all when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtimes: Option<Vec<RuntimeVersion>>,
}

fn default_modrinth_api() -> String {
    MODRINTH_API.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurseforgeConfig {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default = "default_curseforge_api")]
    pub api: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtimes: Option<Vec<RuntimeVersion>>,
}

fn default_curseforge_api() -> String {
    CURSEFORGE_API.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    /// `owner/repo`.
    #[serde(default)]
    pub repository: String,
    #[serde(default = "default_commitish")]
    pub commitish: String,
    #[serde(default = "default_github_api")]
    pub api: String,
    #[serde(default = "default_github_uploads")]
    pub uploads: String,
    #[serde(default = "default_github_web")]
    pub web: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtimes: Option<Vec<RuntimeVersion>>,
}

impl GithubConfig {
    pub fn for_repository(repository: &str) -> Self {
        Self {
            repository: repository.to_string(),
            commitish: default_commitish(),
            api: default_github_api(),
            uploads: default_github_uploads(),
            web: default_github_web(),
            runtimes: None,
        }
    }
}

fn default_commitish() -> String {
    "main".to_string()
}

fn default_github_api() -> String {
    GITHUB_API.to_string()
}

fn default_github_uploads() -> String {
    GITHUB_UPLOADS.to_string()
}

fn default_github_web() -> String {
    GITHUB_WEB.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default)]
    pub release_type: ReleaseType,
    /// README used for the Modrinth project description.
    #[serde(default = "default_readme")]
    pub readme: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modrinth: Option<ModrinthConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curseforge: Option<CurseforgeConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<GithubConfig>,
    /// Per-request timeout for distribution APIs.
    #[serde(default = "default_http_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            release_type: ReleaseType::default(),
            readme: default_readme(),
            modrinth: None,
            curseforge: None,
            github: None,
            timeout: default_http_timeout(),
        }
    }
}

fn default_readme() -> PathBuf {
    PathBuf::from("README.md")
}

fn default_http_timeout() -> Duration {
    Duration::from_secs(30)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_http_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: default_http_timeout(),
        }
    }
}

/// Top-level `modship.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModshipConfig {
    #[serde(rename = "mod")]
    pub mod_meta: ModMetadata,
    #[serde(default)]
    pub tree: TreeConfig,
    /// Per-runtime overrides keyed by runtime spelling.
    #[serde(default, rename = "runtime")]
    pub runtimes: BTreeMap<String, RuntimeOverride>,
    #[serde(default)]
    pub target_level: TargetLevelConfig,
    /// Dependency coordinate templates shared by every node.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub changelog: ChangelogConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

impl ModshipConfig {
    /// Load `modship.toml` from the project root.
    pub fn load_from_project(project_root: &Path) -> Result<Self> {
        Self::load_from_file(&project_root.join(CONFIG_FILE))
    }

    /// Load configuration from a specific file path
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        let config: ModshipConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot produce a sensible release.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("mod.id", &self.mod_meta.id),
            ("mod.name", &self.mod_meta.name),
            ("mod.version", &self.mod_meta.version),
            ("mod.group", &self.mod_meta.group),
        ] {
            if value.trim().is_empty() {
                bail!("{field} must not be empty");
            }
        }

        if self.build.extension.trim().is_empty() {
            bail!("build.extension must not be empty");
        }

        if self.publish.timeout.is_zero() {
            bail!("publish.timeout must be greater than 0");
        }

        for key in self.runtimes.keys() {
            key.parse::<RuntimeVersion>()
                .with_context(|| format!("invalid [runtime.\"{key}\"] section"))?;
        }

        Ok(())
    }

    /// Absolute output root for a project rooted at `project_root`.
    pub fn output_root(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.output.root)
    }

    /// Repository the changelog reads from, if any.
    pub fn changelog_repository(&self) -> Option<&str> {
        self.changelog
            .repository
            .as_deref()
            .or_else(|| self.publish.github.as_ref().map(|g| g.repository.as_str()))
            .filter(|r| !r.trim().is_empty())
    }

    /// GitHub REST base, from `[publish.github]` when present.
    pub fn github_api(&self) -> &str {
        self.publish
            .github
            .as_ref()
            .map(|g| g.api.as_str())
            .unwrap_or(GITHUB_API)
    }

    /// GitHub web base used for commit and repository links.
    pub fn github_web(&self) -> &str {
        self.publish
            .github
            .as_ref()
            .map(|g| g.web.as_str())
            .unwrap_or(GITHUB_WEB)
    }

    /// Template written by `modship config --template`.
    pub fn default_toml_template() -> &'static str {
        r#"# modship configuration file
# Place this file in the project root as modship.toml

# Shared dependencies; {loader}, {runtime} and {version} (the mod version) are
# expanded per node.
dependencies = ["io.github.llamalad7:mixinextras-{loader}:0.4.1"]

[mod]
id = "examplemod"
name = "Example Mod"
version = "1.0.0"
group = "com.example"
description = "An example mod"
author = "Example"
license = "MIT"

[tree]
runtimes = ["1.20.1", "1.21.1"]

# The common branch (empty loader) is required for every runtime a loader uses.
[[tree.branch]]
loader = ""

[[tree.branch]]
loader = "forge"
runtimes = ["1.20.1"]

[[tree.branch]]
loader = "neoforge"

# [runtime."1.20.1"]
# targets = ["1.20", "1.20.1"]

[build]
program = "./gradlew"
args = ["{runtime}-{loader}:build"]
artifact_dir = "versions/{runtime}-{loader}/build/libs"
# timeout = "15m"
# jobs = 2

[output]
root = "output"

[changelog]
enabled = true
path = "CHANGELOG.md"

[publish]
release_type = "stable"
readme = "README.md"

[publish.modrinth]
id = "AABBCCDD"
slug = "examplemod"

[publish.curseforge]
id = "123456"
slug = "examplemod"

[publish.github]
repository = "owner/examplemod"
commitish = "main"

[notify]
enabled = true
"#
    }
}

mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

mod humantime_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => super::humantime_serde::serialize(d, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|r| humantime::parse_duration(&r).map_err(serde::de::Error::custom))
            .transpose()
    }
}
