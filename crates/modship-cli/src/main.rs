use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};

use modship::auth::{self, Credentials};
use modship::changelog::ChangelogDoc;
use modship::config::{CONFIG_FILE, ModshipConfig};
use modship::engine::{self, Project, Reporter, RunOptions};
use modship::graph::Stages;
use modship::report;
use modship_types::{RunPhase, RunReport};

#[derive(Parser, Debug)]
#[command(name = "modship", version)]
#[command(about = "Build, relocate and publish every variant of a multi-loader mod")]
struct Cli {
    /// Project root containing modship.toml
    #[arg(short = 'C', long, default_value = ".")]
    project_root: PathBuf,

    /// Configuration file (default: <project-root>/modship.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Validate and log instead of uploading. Also enabled by PUBLISH_DRY_RUN.
    #[arg(long)]
    dry_run: bool,

    /// Override the output root for relocated artifacts.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Override the per-node build timeout (e.g. 90s, 15m).
    #[arg(long)]
    build_timeout: Option<String>,

    /// Builds of one dependency level to run at the same time.
    #[arg(long)]
    jobs: Option<usize>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the variant tree in build order.
    Tree,
    /// Print resolved per-node configuration, or a starter modship.toml.
    Config {
        /// Print a starter configuration file instead.
        #[arg(long)]
        template: bool,
    },
    /// Print the task levels for a stage.
    Plan {
        #[arg(long, value_enum, default_value_t = Stage::Release)]
        stage: Stage,
    },
    /// Build every node and relocate loader artifacts.
    Build,
    /// Generate the changelog and write it to disk.
    Changelog,
    /// Publish previously relocated artifacts.
    Publish,
    /// Build, publish and announce in one run.
    Release,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Stage {
    Build,
    Publish,
    Release,
}

impl From<Stage> for Stages {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Build => Stages::BUILD,
            Stage::Publish => Stages::PUBLISH,
            Stage::Release => Stages::RELEASE,
        }
    }
}

struct CliReporter;

impl Reporter for CliReporter {
    fn info(&mut self, msg: &str) {
        eprintln!("[info] {msg}");
    }

    fn warn(&mut self, msg: &str) {
        eprintln!("[warn] {msg}");
    }

    fn error(&mut self, msg: &str) {
        eprintln!("[error] {msg}");
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { template: true } = cli.cmd {
        print!("{}", ModshipConfig::default_toml_template());
        return Ok(());
    }

    let project = load_project(&cli)?;
    let options = RunOptions {
        dry_run: cli.dry_run || auth::dry_run_from_env(),
        credentials: Credentials::from_env(),
    };
    let mut reporter = CliReporter;

    match cli.cmd {
        Commands::Tree => print_tree(&project),
        Commands::Config { .. } => print_node_configs(&project)?,
        Commands::Plan { stage } => print_plan(&project, stage.into())?,
        Commands::Build => {
            let summary = engine::run_build(&project, &mut reporter)?;
            for (node, artifact) in &summary.relocated {
                println!(
                    "{node}: {} ({:?})",
                    artifact.path.display(),
                    artifact.outcome
                );
            }
        }
        Commands::Changelog => {
            let doc = engine::run_changelog(&project, &options, &mut reporter)?;
            print_changelog(&doc);
        }
        Commands::Publish => {
            let report = engine::run_publish(&project, &options, &mut reporter)?;
            finish(&project, &report)?;
        }
        Commands::Release => {
            let report = engine::run_release(&project, &options, &mut reporter)?;
            finish(&project, &report)?;
        }
    }

    Ok(())
}

fn load_project(cli: &Cli) -> Result<Project> {
    let root = cli.project_root.as_path();
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| root.join(CONFIG_FILE));
    let mut config = ModshipConfig::load_from_file(&path)?;

    if let Some(output) = &cli.output {
        config.output.root = output.clone();
    }
    if let Some(timeout) = &cli.build_timeout {
        config.build.timeout = Some(parse_duration(timeout)?);
    }
    if let Some(jobs) = cli.jobs {
        config.build.jobs = jobs;
    }

    Project::from_config(root, config)
}

fn parse_duration(s: &str) -> Result<std::time::Duration> {
    humantime::parse_duration(s).with_context(|| format!("invalid duration: {s}"))
}

fn print_tree(project: &Project) {
    for (idx, node) in project.propagation.iter().enumerate() {
        let marker = if node.publishable { "" } else { " [common]" };
        println!(
            "{:>3}. {} {}{marker}",
            idx + 1,
            node.node,
            node.project_version
        );
    }
}

fn print_node_configs(project: &Project) -> Result<()> {
    let nodes: Vec<_> = project.propagation.iter().collect();
    let json = serde_json::to_string_pretty(&nodes).context("failed to serialize node configs")?;
    println!("{json}");
    Ok(())
}

fn print_plan(project: &Project, stages: Stages) -> Result<()> {
    let levels = project.plan(stages)?;
    for (idx, level) in levels.iter().enumerate() {
        println!("level {}:", idx + 1);
        for task in level {
            println!("  - {task}");
        }
    }
    Ok(())
}

fn print_changelog(doc: &ChangelogDoc) {
    match doc {
        ChangelogDoc::Generated { .. } => println!("{}", doc.text()),
        ChangelogDoc::Unavailable { reason } => println!("changelog unavailable: {reason}"),
    }
}

fn finish(project: &Project, report: &RunReport) -> Result<()> {
    for line in report::summary_lines(report) {
        println!("{line}");
    }
    println!("report: {}", project.report_path().display());

    if report.phase == RunPhase::Failed {
        bail!("release did not complete; see the report for failed targets");
    }
    Ok(())
}
