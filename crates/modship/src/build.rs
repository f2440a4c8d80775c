//! Runs the external build command for one node.
//!
//! The node's configuration is handed to the command twice: as `{...}`
//! placeholders in the configured arguments and as `MODSHIP_*` environment
//! variables.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail};

use crate::config::BuildConfig;
use crate::process::{CommandOutput, run_command};
use crate::propagate::NodeConfig;

/// Overrides `build.program`.
pub const BUILD_BIN_ENV: &str = "MODSHIP_BUILD_BIN";

#[derive(Debug, Clone)]
pub struct BuildResult {
    pub output: CommandOutput,
    /// Directory the build leaves its artifacts in.
    pub artifact_dir: PathBuf,
}

/// Program used for builds: `MODSHIP_BUILD_BIN`, else `build.program`.
pub fn build_program(build: &BuildConfig) -> Option<String> {
    env::var(BUILD_BIN_ENV)
        .ok()
        .filter(|p| !p.trim().is_empty())
        .or_else(|| build.program.clone().filter(|p| !p.trim().is_empty()))
}

/// Expand node placeholders in one template string. `{version}` is the mod
/// version, `{project_version}` the per-runtime `<version>+<runtime>`.
pub fn expand(template: &str, config: &NodeConfig) -> String {
    template
        .replace("{runtime}", config.node.runtime.as_str())
        .replace("{loader_label}", config.node.loader_label())
        .replace("{loader}", config.node.loader_label())
        .replace("{project_version}", &config.project_version)
        .replace("{archive_name}", &config.archive_name)
        .replace("{version}", &config.mod_version)
}

/// Environment exported to the build command.
pub fn build_env(config: &NodeConfig) -> Vec<(String, String)> {
    vec![
        (
            "MODSHIP_RUNTIME".to_string(),
            config.node.runtime.to_string(),
        ),
        ("MODSHIP_LOADER".to_string(), config.node.loader.clone()),
        (
            "MODSHIP_MOD_VERSION".to_string(),
            config.mod_version.clone(),
        ),
        (
            "MODSHIP_PROJECT_VERSION".to_string(),
            config.project_version.clone(),
        ),
        ("MODSHIP_GROUP".to_string(), config.group.clone()),
        (
            "MODSHIP_ARCHIVE_NAME".to_string(),
            config.archive_name.clone(),
        ),
        (
            "MODSHIP_TARGET_LEVEL".to_string(),
            config.target_level.to_string(),
        ),
        (
            "MODSHIP_DEPENDENCIES".to_string(),
            config.dependencies.join(","),
        ),
        (
            "MODSHIP_GAME_VERSIONS".to_string(),
            config.game_versions.join(","),
        ),
    ]
}

/// Where the build of `config` leaves its outputs.
pub fn artifact_dir(build: &BuildConfig, config: &NodeConfig, project_root: &Path) -> PathBuf {
    project_root.join(expand(&build.artifact_dir, config))
}

/// Build one node. A non-zero exit or timeout is an error.
pub fn run_build(
    build: &BuildConfig,
    config: &NodeConfig,
    project_root: &Path,
) -> Result<BuildResult> {
    let Some(program) = build_program(build) else {
        bail!("no build program configured; set build.program or {BUILD_BIN_ENV}");
    };

    let args: Vec<String> = build.args.iter().map(|a| expand(a, config)).collect();
    let output = run_command(
        &program,
        &args,
        &build_env(config),
        project_root,
        build.timeout,
    )?;

    if !output.success() {
        let status = if output.timed_out {
            format!(
                "timed out after {}",
                humantime::format_duration(build.timeout.unwrap_or(Duration::ZERO))
            )
        } else {
            format!("exited with code {}", output.exit_code)
        };
        bail!(
            "build of {} {status}:\n{}",
            config.node,
            output.tail(20)
        );
    }

    Ok(BuildResult {
        artifact_dir: artifact_dir(build, config, project_root),
        output,
    })
}
