//! Publish orchestration.
//!
//! The orchestrator owns the run phase machine, the ordered target list
//! and the per-node outcomes. Target failures are recorded and never stop
//! sibling targets or nodes; only a fully successful run reaches
//! `Notifying`.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};

use modship_types::{
    FailureClass, NodeReport, NotifyStatus, ReleaseError, ReleaseType, RunPhase, RunReport,
    TargetKind, TargetOutcome, TargetReport, VariantDescriptor,
};

use crate::changelog::ChangelogDoc;
use crate::engine::Reporter;
use crate::propagate::NodeConfig;
use crate::relocate::RelocatedArtifact;
use crate::report::REPORT_VERSION;
use crate::targets::{PublishRequest, PublishTarget, RunContext};

pub struct Orchestrator {
    phase: RunPhase,
    dry_run: bool,
    mod_version: String,
    release_type: ReleaseType,
    targets: Vec<Box<dyn PublishTarget>>,
    attempted: BTreeSet<(VariantDescriptor, TargetKind)>,
    changelog: Option<ChangelogDoc>,
    parent_release: Option<TargetOutcome>,
    nodes: Vec<NodeReport>,
    notification: Option<NotifyStatus>,
    started_at: DateTime<Utc>,
}

/// Failure class of a target error: configuration when classified so, else publish.
pub fn failure_class(err: &anyhow::Error) -> FailureClass {
    match err.downcast_ref::<ReleaseError>() {
        Some(ReleaseError::Configuration { .. }) => FailureClass::Configuration,
        _ => FailureClass::Publish,
    }
}

fn failed(err: &anyhow::Error) -> TargetOutcome {
    TargetOutcome::Failed {
        class: failure_class(err),
        message: format!("{err:#}"),
    }
}

impl Orchestrator {
    pub fn new(
        targets: Vec<Box<dyn PublishTarget>>,
        mod_version: impl Into<String>,
        release_type: ReleaseType,
        dry_run: bool,
    ) -> Self {
        Self {
            phase: RunPhase::Idle,
            dry_run,
            mod_version: mod_version.into(),
            release_type,
            targets,
            attempted: BTreeSet::new(),
            changelog: None,
            parent_release: None,
            nodes: Vec::new(),
            notification: None,
            started_at: Utc::now(),
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    fn advance(&mut self, next: RunPhase) -> Result<(), ReleaseError> {
        self.phase = self.phase.advance(next)?;
        Ok(())
    }

    /// Changelog text, empty until the changelog is ready or when unavailable.
    pub fn changelog_text(&self) -> &str {
        self.changelog.as_ref().map(ChangelogDoc::text).unwrap_or("")
    }

    /// `Idle -> ChangelogReady`.
    pub fn changelog_ready(&mut self, doc: ChangelogDoc) -> Result<(), ReleaseError> {
        self.advance(RunPhase::ChangelogReady)?;
        self.changelog = Some(doc);
        Ok(())
    }

    /// `ChangelogReady -> PerNodePublishing`: create or reuse the parent
    /// release and run every target's once-per-run work.
    pub fn prepare_parent(
        &mut self,
        project_root: &Path,
        reporter: &mut dyn Reporter,
    ) -> Result<(), ReleaseError> {
        self.advance(RunPhase::PerNodePublishing)?;

        let changelog = self.changelog_text().to_string();
        let ctx = RunContext {
            mod_version: &self.mod_version,
            changelog: &changelog,
            release_type: self.release_type,
            project_root,
        };

        for target in &mut self.targets {
            if target.kind() == TargetKind::Github && self.dry_run {
                self.parent_release = Some(match target.validate() {
                    Ok(()) => {
                        reporter.info(&format!(
                            "dry run: would create or reuse release v{}",
                            ctx.mod_version
                        ));
                        TargetOutcome::DryRun
                    }
                    Err(err) => TargetOutcome::Failed {
                        class: FailureClass::Configuration,
                        message: err.to_string(),
                    },
                });
                continue;
            }
            if self.dry_run {
                continue;
            }

            match target.prepare_run(&ctx, reporter) {
                Ok(Some(outcome)) => self.parent_release = Some(outcome),
                Ok(None) => {}
                Err(err) if target.kind() == TargetKind::Github => {
                    reporter.error(&format!("parent release failed: {err:#}"));
                    self.parent_release = Some(failed(&err));
                }
                Err(err) => reporter.warn(&format!("{}: {err:#}", target.kind())),
            }
        }

        Ok(())
    }

    /// Invoke every target for one node, in declaration order.
    pub fn publish_node(
        &mut self,
        config: &NodeConfig,
        artifact: Option<&RelocatedArtifact>,
        reporter: &mut dyn Reporter,
    ) -> Result<(), ReleaseError> {
        if self.phase != RunPhase::PerNodePublishing {
            return Err(ReleaseError::Structural(format!(
                "cannot publish {} in phase {:?}",
                config.node, self.phase
            )));
        }
        if self.targets.is_empty() {
            reporter.warn("no publish targets configured");
        }

        let changelog = self.changelog_text().to_string();
        let mut reports = Vec::new();

        for target in &mut self.targets {
            let kind = target.kind();
            if !self.attempted.insert((config.node.clone(), kind)) {
                reporter.warn(&format!("{kind} already attempted for {}; skipping", config.node));
                continue;
            }

            let outcome = invoke(
                target.as_mut(),
                config,
                artifact,
                &changelog,
                self.release_type,
                self.dry_run,
                reporter,
            );
            match &outcome {
                TargetOutcome::Failed { message, .. } => {
                    reporter.error(&format!("{} -> {kind}: {message}", config.node))
                }
                other => reporter.info(&format!("{} -> {kind}: {}", config.node, other.short())),
            }
            reports.push(TargetReport {
                target: kind,
                outcome,
            });
        }

        match self.nodes.iter_mut().find(|n| n.node == config.node) {
            Some(existing) => existing.targets.extend(reports),
            None => self.nodes.push(NodeReport {
                node: config.node.clone(),
                targets: reports,
            }),
        }
        Ok(())
    }

    /// Whether the parent release and every node succeeded.
    pub fn succeeded(&self) -> bool {
        self.parent_release
            .as_ref()
            .is_none_or(TargetOutcome::is_success)
            && self.nodes.iter().all(NodeReport::succeeded)
    }

    /// Leave `PerNodePublishing`: `Notifying` on success, `Failed` otherwise.
    pub fn finish_publishing(&mut self, reporter: &mut dyn Reporter) -> Result<bool, ReleaseError> {
        if self.succeeded() {
            self.advance(RunPhase::Notifying)?;
            return Ok(true);
        }

        let failures = self
            .nodes
            .iter()
            .flat_map(|n| n.targets.iter().filter(|t| !t.outcome.is_success()))
            .count();
        reporter.error(&format!(
            "publishing failed ({failures} target failure(s)); skipping notification"
        ));
        self.advance(RunPhase::Failed)?;
        self.notification = Some(NotifyStatus::Skipped {
            reason: "publishing failed".to_string(),
        });
        Ok(false)
    }

    /// `Notifying -> Done`.
    pub fn record_notification(&mut self, status: NotifyStatus) -> Result<(), ReleaseError> {
        self.notification = Some(status);
        self.advance(RunPhase::Done)
    }

    /// Move to `Failed` unless the run already ended.
    pub fn abort(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = RunPhase::Failed;
        }
    }

    pub fn report(&self, finished_at: DateTime<Utc>) -> RunReport {
        RunReport {
            report_version: REPORT_VERSION.to_string(),
            mod_version: self.mod_version.clone(),
            dry_run: self.dry_run,
            phase: self.phase,
            started_at: self.started_at,
            finished_at,
            changelog: self.changelog.as_ref().map(ChangelogDoc::status),
            parent_release: self.parent_release.clone(),
            nodes: self.nodes.clone(),
            notification: self.notification.clone(),
        }
    }
}

fn invoke(
    target: &mut dyn PublishTarget,
    config: &NodeConfig,
    artifact: Option<&RelocatedArtifact>,
    changelog: &str,
    release_type: ReleaseType,
    dry_run: bool,
    reporter: &mut dyn Reporter,
) -> TargetOutcome {
    if !target.accepts(config) {
        return TargetOutcome::Skipped {
            reason: format!("runtime {} not enabled for {}", config.node.runtime, target.kind()),
        };
    }

    if let Err(err) = target.validate() {
        return TargetOutcome::Failed {
            class: FailureClass::Configuration,
            message: err.to_string(),
        };
    }

    if !target.credential_present() {
        let message = format!("{} is not set", target.credential_env());
        if !dry_run {
            return TargetOutcome::Failed {
                class: FailureClass::Configuration,
                message,
            };
        }
        reporter.warn(&format!("{}: {message}", target.kind()));
    }

    let Some(artifact) = artifact else {
        return TargetOutcome::Failed {
            class: FailureClass::Configuration,
            message: format!(
                "no relocated artifact {} in {}",
                config.artifact_name,
                config.output_dir.display()
            ),
        };
    };

    if dry_run {
        reporter.info(&format!(
            "dry run: would upload {} to {}",
            artifact.path.display(),
            target.kind()
        ));
        return TargetOutcome::DryRun;
    }

    let request = PublishRequest {
        node: config,
        artifact,
        changelog,
        release_type,
    };
    match target.publish(&request, reporter) {
        Ok(url) => TargetOutcome::Published { url },
        Err(err) => failed(&err),
    }
}
