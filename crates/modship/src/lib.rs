//! # modship
//!
//! Build and release orchestration for a game mod that ships to many
//! `(runtime version, loader)` combinations at once.
//!
//! modship does not compile anything itself. It decides which variants are
//! built, runs a configured external build command for each of them, moves
//! the produced artifacts into a per-version output tree and pushes them to
//! Modrinth, CurseForge and GitHub Releases before announcing the release on
//! a Discord webhook.
//!
//! ## Pipeline
//!
//! 1. [`tree::VariantTree`] collects the declared variants; every loader
//!    node needs a common node of the same runtime.
//! 2. [`propagate::propagate`] derives every node's [`propagate::NodeConfig`]
//!    up front.
//! 3. [`graph::TaskGraph`] lays out build, relocate, changelog, publish and
//!    notify tasks and checks them for cycles.
//! 4. [`engine::run_release`] executes the graph level by level, driving the
//!    [`publish::Orchestrator`] phase machine and writing a run report.
//!
//! ## Example
//!
//! ```ignore
//! use std::path::Path;
//! use modship::engine::{self, Project, RunOptions};
//!
//! let project = Project::load(Path::new("."), None)?;
//! let options = RunOptions {
//!     dry_run: true,
//!     credentials: modship::auth::Credentials::from_env(),
//! };
//! let report = engine::run_release(&project, &options, &mut reporter)?;
//! ```
//!
//! ## CLI Usage
//!
//! For command-line usage, see the `modship-cli` crate.

/// Credentials and the dry-run switch, read from the environment.
pub mod auth;

/// External build command invocation.
pub mod build;

/// Changelog generation against the source-control host.
pub mod changelog;

/// Configuration file (`modship.toml`) loading.
pub mod config;

/// Project loading and the release task executor.
pub mod engine;

/// Local git queries.
pub mod git;

/// Release task graph and dependency levels.
pub mod graph;

/// Release announcement.
pub mod notify;

/// Process spawning with timeouts.
pub mod process;

/// Per-node configuration propagation.
pub mod propagate;

/// Publish orchestration and run phases.
pub mod publish;

/// Artifact relocation with provenance sidecars.
pub mod relocate;

/// Run report persistence.
pub mod report;

/// Distribution targets.
pub mod targets;

/// The variant tree.
pub mod tree;
