//! Copies built artifacts into `<output root>/<mod version>/<loader>/`.
//!
//! Every relocated file gets a provenance sidecar recording the project
//! version and sha256 it was written with. A file is only replaced when the
//! recorded project version matches; anything else is a
//! [`ReleaseError::RelocationConflict`].

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use modship_types::ReleaseError;

use crate::propagate::NodeConfig;
use crate::report::{atomic_write_bytes, atomic_write_json};

/// Sidecar written next to every relocated file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub project_version: String,
    pub sha256: String,
    pub node: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationOutcome {
    /// No file existed at the destination.
    Written,
    /// The destination already held identical bytes; nothing was touched.
    Unchanged,
    /// Replaced a file recorded for the same project version.
    Overwritten,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocatedArtifact {
    pub path: PathBuf,
    pub sources: Option<PathBuf>,
    pub outcome: RelocationOutcome,
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// `.<file name>.provenance.json` next to `file`.
pub fn provenance_path(file: &Path) -> PathBuf {
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    file.with_file_name(format!(".{name}.provenance.json"))
}

pub fn read_provenance(file: &Path) -> Option<Provenance> {
    let raw = fs::read(provenance_path(file)).ok()?;
    serde_json::from_slice(&raw).ok()
}

/// Copy `src` to `dest_dir/file_name` under provenance rules.
pub fn relocate_file(
    src: &Path,
    dest_dir: &Path,
    file_name: &str,
    project_version: &str,
    node: &str,
) -> Result<RelocationOutcome> {
    let bytes = fs::read(src).with_context(|| format!("failed to read {}", src.display()))?;
    let digest = sha256_hex(&bytes);
    let dest = dest_dir.join(file_name);

    let outcome = if dest.exists() {
        let existing =
            fs::read(&dest).with_context(|| format!("failed to read {}", dest.display()))?;
        if sha256_hex(&existing) == digest {
            return Ok(RelocationOutcome::Unchanged);
        }

        match read_provenance(&dest) {
            Some(recorded) if recorded.project_version == project_version => {
                RelocationOutcome::Overwritten
            }
            Some(recorded) => {
                return Err(ReleaseError::RelocationConflict {
                    path: dest.display().to_string(),
                    message: format!(
                        "recorded for project version {}, not {project_version}",
                        recorded.project_version
                    ),
                }
                .into());
            }
            None => {
                return Err(ReleaseError::RelocationConflict {
                    path: dest.display().to_string(),
                    message: "existing file has no provenance record".to_string(),
                }
                .into());
            }
        }
    } else {
        RelocationOutcome::Written
    };

    fs::create_dir_all(dest_dir)
        .with_context(|| format!("failed to create {}", dest_dir.display()))?;
    atomic_write_bytes(&dest, &bytes)?;
    atomic_write_json(
        &provenance_path(&dest),
        &Provenance {
            project_version: project_version.to_string(),
            sha256: digest,
            node: node.to_string(),
        },
    )?;

    Ok(outcome)
}

/// Relocate a loader node's artifact (and sources artifact, when built).
pub fn relocate_node(config: &NodeConfig, build_dir: &Path) -> Result<RelocatedArtifact> {
    if !config.publishable {
        bail!("{} is a common node and is not relocated", config.node);
    }

    let artifact = build_dir.join(&config.artifact_name);
    if !artifact.is_file() {
        bail!(
            "build of {} produced no {} in {}",
            config.node,
            config.artifact_name,
            build_dir.display()
        );
    }

    let node = config.node.to_string();
    let outcome = relocate_file(
        &artifact,
        &config.output_dir,
        &config.artifact_name,
        &config.project_version,
        &node,
    )?;

    let sources_src = build_dir.join(&config.sources_name);
    let sources = if sources_src.is_file() {
        relocate_file(
            &sources_src,
            &config.output_dir,
            &config.sources_name,
            &config.project_version,
            &node,
        )?;
        Some(config.output_dir.join(&config.sources_name))
    } else {
        None
    };

    Ok(RelocatedArtifact {
        path: config.output_dir.join(&config.artifact_name),
        sources,
        outcome,
    })
}

/// A previously relocated artifact for `config`, if present.
pub fn relocated_artifact(config: &NodeConfig) -> Option<RelocatedArtifact> {
    let path = config.output_dir.join(&config.artifact_name);
    if !path.is_file() {
        return None;
    }
    let sources = Some(config.output_dir.join(&config.sources_name)).filter(|p| p.is_file());
    Some(RelocatedArtifact {
        path,
        sources,
        outcome: RelocationOutcome::Unchanged,
    })
}
