use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;

use modship_types::{ReleaseError, RunReport, VariantDescriptor};

use crate::auth::Credentials;
use crate::build;
use crate::changelog::{self, ChangelogDoc};
use crate::config::{CONFIG_FILE, ModshipConfig};
use crate::graph::{Stages, Task, TaskGraph};
use crate::notify;
use crate::propagate::{GlobalMetadata, NodeConfig, Propagation, propagate};
use crate::publish::Orchestrator;
use crate::relocate::{self, RelocatedArtifact, RelocationOutcome};
use crate::report;
use crate::targets;
use crate::tree::VariantTree;

pub trait Reporter {
    fn info(&mut self, msg: &str);
    fn warn(&mut self, msg: &str);
    fn error(&mut self, msg: &str);
}

/// A loaded project: configuration, variant tree and propagated node configs.
#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    pub config: ModshipConfig,
    pub tree: VariantTree,
    pub propagation: Propagation,
}

impl Project {
    /// Load `config_path` (default `<root>/modship.toml`) and propagate the tree.
    pub fn load(root: &Path, config_path: Option<&Path>) -> Result<Self> {
        let path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.join(CONFIG_FILE));
        let config = ModshipConfig::load_from_file(&path)?;
        Self::from_config(root, config)
    }

    pub fn from_config(root: &Path, config: ModshipConfig) -> Result<Self> {
        let tree = VariantTree::from_config(&config.tree)?;
        let propagation = propagate(&tree, &GlobalMetadata::from_config(&config, root));
        Ok(Self {
            root: root.to_path_buf(),
            config,
            tree,
            propagation,
        })
    }

    pub fn graph(&self, stages: Stages) -> TaskGraph {
        TaskGraph::for_release(&self.propagation, stages)
    }

    /// Validated execution levels for `stages`.
    pub fn plan(&self, stages: Stages) -> Result<Vec<Vec<Task>>, ReleaseError> {
        self.graph(stages).levels()
    }

    fn node(&self, node: &VariantDescriptor) -> Result<&NodeConfig, ReleaseError> {
        self.propagation
            .get(node)
            .ok_or_else(|| ReleaseError::Structural(format!("no configuration for {node}")))
    }

    pub fn report_path(&self) -> PathBuf {
        report::report_path(
            &self.config.output_root(&self.root),
            &self.config.mod_meta.version,
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    pub credentials: Credentials,
}

/// Relocated artifacts of a build run, in tree order.
#[derive(Debug, Clone, Default)]
pub struct BuildSummary {
    pub relocated: Vec<(VariantDescriptor, RelocatedArtifact)>,
}

struct Execution<'a> {
    project: &'a Project,
    options: &'a RunOptions,
    orchestrator: Option<Orchestrator>,
    artifacts: BTreeMap<VariantDescriptor, RelocatedArtifact>,
}

impl Execution<'_> {
    fn run_levels(&mut self, levels: &[Vec<Task>], reporter: &mut dyn Reporter) -> Result<()> {
        for (idx, level) in levels.iter().enumerate() {
            let names: Vec<String> = level.iter().map(Task::to_string).collect();
            reporter.info(&format!("level {}: {}", idx + 1, names.join(", ")));

            let builds: Vec<&VariantDescriptor> = level
                .iter()
                .filter_map(|task| match task {
                    Task::Build(node) => Some(node),
                    _ => None,
                })
                .collect();
            self.run_builds(&builds, reporter)?;

            for task in level.iter().filter(|t| !matches!(t, Task::Build(_))) {
                self.run_task(task, reporter)?;
            }
        }
        Ok(())
    }

    /// Build the nodes of one level, up to `build.jobs` at a time. No new
    /// batch starts once a build has failed.
    fn run_builds(&self, nodes: &[&VariantDescriptor], reporter: &mut dyn Reporter) -> Result<()> {
        let project = self.project;
        let jobs = project.config.build.jobs.max(1);
        let mut errors = Vec::new();

        for batch in nodes.chunks(jobs) {
            let configs = batch
                .iter()
                .map(|node| project.node(node))
                .collect::<Result<Vec<_>, _>>()?;
            for node in batch {
                reporter.info(&format!("building {node}..."));
            }

            let results: Vec<Result<build::BuildResult>> = thread::scope(|scope| {
                let handles: Vec<_> = configs
                    .iter()
                    .map(|config| {
                        scope.spawn(move || {
                            build::run_build(&project.config.build, config, &project.root)
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|handle| {
                        handle
                            .join()
                            .unwrap_or_else(|_| Err(anyhow!("build thread panicked")))
                    })
                    .collect()
            });

            for (node, result) in batch.iter().zip(results) {
                match result {
                    Ok(result) => reporter.info(&format!(
                        "built {node} in {}",
                        humantime::format_duration(std::time::Duration::from_secs(
                            result.output.duration.as_secs()
                        ))
                    )),
                    Err(err) => errors.push(err.context(format!("build of {node} failed"))),
                }
            }
            if !errors.is_empty() {
                break;
            }
        }

        if errors.len() > 1 {
            let messages: Vec<String> = errors.iter().map(|e| format!("{e:#}")).collect();
            bail!("{} builds failed: {}", errors.len(), messages.join("; "));
        }
        match errors.pop() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn orchestrator(&mut self) -> Result<&mut Orchestrator, ReleaseError> {
        self.orchestrator.as_mut().ok_or_else(|| {
            ReleaseError::Structural("publish task scheduled without a publish stage".to_string())
        })
    }

    fn run_task(&mut self, task: &Task, reporter: &mut dyn Reporter) -> Result<()> {
        let project = self.project;
        match task {
            Task::Build(node) => self.run_builds(&[node], reporter)?,
            Task::Relocate(node) => {
                let config = project.node(node)?;
                let build_dir = build::artifact_dir(&project.config.build, config, &project.root);
                let relocated = relocate::relocate_node(config, &build_dir)
                    .with_context(|| format!("failed to relocate {node}"))?;
                let verb = match relocated.outcome {
                    RelocationOutcome::Written => "relocated",
                    RelocationOutcome::Unchanged => "unchanged",
                    RelocationOutcome::Overwritten => "replaced",
                };
                reporter.info(&format!("{verb} {}", relocated.path.display()));
                self.artifacts.insert(node.clone(), relocated);
            }
            Task::Changelog => {
                let doc = changelog::generate_changelog(
                    &project.config,
                    &project.root,
                    self.options.credentials.github.clone(),
                    reporter,
                )?;
                if let Some(path) =
                    changelog::write_changelog(&project.config, &project.root, &doc)?
                {
                    reporter.info(&format!("wrote {}", path.display()));
                }
                self.orchestrator()?.changelog_ready(doc)?;
            }
            Task::ParentRelease => {
                self.orchestrator()?.prepare_parent(&project.root, reporter)?;
            }
            Task::Publish(node) => {
                let config = project.node(node)?;
                let artifact = self
                    .artifacts
                    .get(node)
                    .cloned()
                    .or_else(|| relocate::relocated_artifact(config));
                self.orchestrator()?
                    .publish_node(config, artifact.as_ref(), reporter)?;
            }
            Task::Notify => {
                let dry_run = self.options.dry_run;
                let webhook = self.options.credentials.webhook_url.clone();
                let orchestrator = self.orchestrator()?;
                if orchestrator.finish_publishing(reporter)? {
                    let status = notify::notify_release(
                        &project.config,
                        webhook.as_deref(),
                        orchestrator.changelog_text(),
                        dry_run,
                        reporter,
                    );
                    orchestrator.record_notification(status)?;
                }
            }
        }
        Ok(())
    }
}

fn execute<'a>(
    project: &'a Project,
    options: &'a RunOptions,
    stages: Stages,
    reporter: &mut dyn Reporter,
) -> Result<Execution<'a>> {
    // Structural problems surface before anything runs.
    let levels = project.plan(stages)?;

    let orchestrator = stages.publish.then(|| {
        Orchestrator::new(
            targets::configured_targets(&project.config, &options.credentials),
            project.config.mod_meta.version.clone(),
            project.config.publish.release_type,
            options.dry_run,
        )
    });
    let mut execution = Execution {
        project,
        options,
        orchestrator,
        artifacts: BTreeMap::new(),
    };

    if let Err(err) = execution.run_levels(&levels, reporter) {
        reporter.error(&format!("{err:#}"));
        if let Some(orchestrator) = execution.orchestrator.as_mut() {
            orchestrator.abort();
            let report = orchestrator.report(Utc::now());
            persist_report(project, &report, reporter);
        }
        return Err(err);
    }

    Ok(execution)
}

fn persist_report(project: &Project, report: &RunReport, reporter: &mut dyn Reporter) {
    let path = project.report_path();
    match report::write_report(&path, report) {
        Ok(()) => reporter.info(&format!("report written to {}", path.display())),
        Err(err) => reporter.warn(&format!("failed to write report: {err:#}")),
    }
}

fn publish_stage(
    project: &Project,
    options: &RunOptions,
    stages: Stages,
    reporter: &mut dyn Reporter,
) -> Result<RunReport> {
    if options.dry_run {
        reporter.info("dry run: no uploads, releases or announcements will be made");
    }
    let execution = execute(project, options, stages, reporter)?;
    let orchestrator = execution.orchestrator.ok_or_else(|| {
        ReleaseError::Structural("publish run finished without an orchestrator".to_string())
    })?;
    let report = orchestrator.report(Utc::now());
    persist_report(project, &report, reporter);
    Ok(report)
}

/// Build every node in dependency order and relocate the loader artifacts.
pub fn run_build(project: &Project, reporter: &mut dyn Reporter) -> Result<BuildSummary> {
    let options = RunOptions::default();
    let execution = execute(project, &options, Stages::BUILD, reporter)?;
    Ok(BuildSummary {
        relocated: execution.artifacts.into_iter().collect(),
    })
}

/// Generate and write the changelog without publishing.
pub fn run_changelog(
    project: &Project,
    options: &RunOptions,
    reporter: &mut dyn Reporter,
) -> Result<ChangelogDoc> {
    let doc = changelog::generate_changelog(
        &project.config,
        &project.root,
        options.credentials.github.clone(),
        reporter,
    )?;
    if let Some(path) = changelog::write_changelog(&project.config, &project.root, &doc)? {
        reporter.info(&format!("wrote {}", path.display()));
    }
    Ok(doc)
}

/// Publish previously relocated artifacts.
pub fn run_publish(
    project: &Project,
    options: &RunOptions,
    reporter: &mut dyn Reporter,
) -> Result<RunReport> {
    publish_stage(project, options, Stages::PUBLISH, reporter)
}

/// Build, relocate, publish and announce in one run.
pub fn run_release(
    project: &Project,
    options: &RunOptions,
    reporter: &mut dyn Reporter,
) -> Result<RunReport> {
    publish_stage(project, options, Stages::RELEASE, reporter)
}
