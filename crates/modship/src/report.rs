//! Run report persistence and atomic file writes.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use modship_types::{ChangelogStatus, NotifyStatus, RunReport, TargetOutcome};

pub const REPORT_VERSION: &str = "modship.report.v1";
pub const REPORT_FILE: &str = "report.json";

/// `<output root>/<mod version>/report.json`.
pub fn report_path(output_root: &Path, mod_version: &str) -> PathBuf {
    output_root.join(mod_version).join(REPORT_FILE)
}

pub fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create report dir {}", parent.display()))?;
    }
    atomic_write_json(path, report)
}

pub fn load_report(path: &Path) -> Result<Option<RunReport>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read report file {}", path.display()))?;
    let report: RunReport = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse report JSON {}", path.display()))?;
    Ok(Some(report))
}

/// Human-readable lines summarising a run.
pub fn summary_lines(report: &RunReport) -> Vec<String> {
    let mut lines = Vec::new();

    match &report.changelog {
        Some(ChangelogStatus::Generated { from, to, entries }) => {
            lines.push(format!("changelog: {entries} entries ({from}...{to})"));
        }
        Some(ChangelogStatus::Unavailable { reason }) => {
            lines.push(format!("changelog: unavailable ({reason})"));
        }
        None => {}
    }

    if let Some(outcome) = &report.parent_release {
        lines.push(format!("parent release: {}", describe(outcome)));
    }

    for node in &report.nodes {
        for target in &node.targets {
            lines.push(format!(
                "{} -> {}: {}",
                node.node,
                target.target,
                describe(&target.outcome)
            ));
        }
    }

    match &report.notification {
        Some(NotifyStatus::Sent) => lines.push("notification: sent".to_string()),
        Some(NotifyStatus::Skipped { reason }) => {
            lines.push(format!("notification: skipped ({reason})"))
        }
        Some(NotifyStatus::Warned { message }) => {
            lines.push(format!("notification: warning ({message})"))
        }
        None => {}
    }

    lines.push(format!("phase: {:?}", report.phase));
    lines
}

fn describe(outcome: &TargetOutcome) -> String {
    match outcome {
        TargetOutcome::Published { url: Some(url) } => format!("published {url}"),
        TargetOutcome::Published { url: None } => "published".to_string(),
        TargetOutcome::DryRun => "dry-run".to_string(),
        TargetOutcome::Skipped { reason } => format!("skipped ({reason})"),
        TargetOutcome::Failed { class, message } => format!("failed [{class:?}] {message}"),
    }
}

/// Best-effort fsync of the parent directory after a rename.
pub(crate) fn fsync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent()
        && let Ok(dir) = fs::File::open(parent)
    {
        let _ = dir.sync_all();
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

pub(crate) fn atomic_write_bytes(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = tmp_path(path);

    {
        let mut f = fs::File::create(&tmp)
            .with_context(|| format!("failed to create tmp file {}", tmp.display()))?;
        f.write_all(data)
            .with_context(|| format!("failed to write tmp file {}", tmp.display()))?;
        f.sync_all().ok();
    }

    fs::rename(&tmp, path).with_context(|| {
        format!(
            "failed to rename tmp file {} to {}",
            tmp.display(),
            path.display()
        )
    })?;

    fsync_parent_dir(path);

    Ok(())
}

pub(crate) fn atomic_write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(value).context("failed to serialize JSON")?;
    atomic_write_bytes(path, &data)
}
