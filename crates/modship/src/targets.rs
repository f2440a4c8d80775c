//! Distribution targets.
//!
//! Each target wraps one registry client together with its project
//! identifier, credential and runtime filter. The orchestrator decides
//! whether a target is invoked at all; targets only talk to their API.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};

use modship_registry::{
    CurseforgeClient, FileMetadata, GameVersion, GithubClient, ModrinthClient, NewRelease,
    VersionUpload, resolve_game_version_ids,
};
use modship_types::{ReleaseError, ReleaseType, RuntimeVersion, TargetKind, TargetOutcome};

use crate::auth::{CURSEFORGE_TOKEN_ENV, Credentials, GITHUB_TOKEN_ENV, MODRINTH_TOKEN_ENV};
use crate::config::{CurseforgeConfig, GithubConfig, ModrinthConfig, ModshipConfig};
use crate::engine::Reporter;
use crate::propagate::{NodeConfig, loader_title};
use crate::relocate::RelocatedArtifact;

pub const MODRINTH_WEB: &str = "https://modrinth.com";
pub const CURSEFORGE_WEB: &str = "https://www.curseforge.com/minecraft/mc-mods";

/// Run-wide inputs handed to [`PublishTarget::prepare_run`].
#[derive(Debug, Clone, Copy)]
pub struct RunContext<'a> {
    pub mod_version: &'a str,
    pub changelog: &'a str,
    pub release_type: ReleaseType,
    pub project_root: &'a Path,
}

/// One node's upload.
#[derive(Debug, Clone, Copy)]
pub struct PublishRequest<'a> {
    pub node: &'a NodeConfig,
    pub artifact: &'a RelocatedArtifact,
    pub changelog: &'a str,
    pub release_type: ReleaseType,
}

pub trait PublishTarget {
    fn kind(&self) -> TargetKind;

    /// Environment variable the credential is read from.
    fn credential_env(&self) -> &'static str;

    fn credential_present(&self) -> bool;

    /// Check the configured identifiers without touching the network.
    fn validate(&self) -> Result<(), ReleaseError>;

    /// Whether this target publishes artifacts of `node`'s runtime.
    fn accepts(&self, node: &NodeConfig) -> bool;

    /// Once-per-run work before any node is published. Only called outside
    /// dry runs. A returned outcome is the parent release outcome.
    fn prepare_run(
        &mut self,
        _ctx: &RunContext<'_>,
        _reporter: &mut dyn Reporter,
    ) -> Result<Option<TargetOutcome>> {
        Ok(None)
    }

    /// Upload one node's artifact. Returns a URL for the published file when known.
    fn publish(
        &mut self,
        request: &PublishRequest<'_>,
        reporter: &mut dyn Reporter,
    ) -> Result<Option<String>>;
}

fn configuration_error(kind: TargetKind, message: impl Into<String>) -> ReleaseError {
    ReleaseError::Configuration {
        target: kind.to_string(),
        message: message.into(),
    }
}

fn runtime_allowed(filter: &Option<Vec<RuntimeVersion>>, node: &NodeConfig) -> bool {
    filter
        .as_ref()
        .is_none_or(|runtimes| runtimes.contains(&node.node.runtime))
}

fn read_artifact(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read artifact {}", path.display()))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Targets configured in `[publish]`, in invocation order.
pub fn configured_targets(
    config: &ModshipConfig,
    credentials: &Credentials,
) -> Vec<Box<dyn PublishTarget>> {
    let mut targets: Vec<Box<dyn PublishTarget>> = Vec::new();
    let publish = &config.publish;

    if let Some(modrinth) = &publish.modrinth {
        targets.push(Box::new(ModrinthTarget::new(
            modrinth,
            &publish.readme,
            credentials.modrinth.clone(),
            publish.timeout,
        )));
    }
    if let Some(curseforge) = &publish.curseforge {
        targets.push(Box::new(CurseforgeTarget::new(
            curseforge,
            credentials.curseforge.clone(),
            publish.timeout,
        )));
    }
    if let Some(github) = &publish.github {
        targets.push(Box::new(GithubTarget::new(
            github,
            credentials.github.clone(),
            publish.timeout,
        )));
    }

    targets
}

pub struct ModrinthTarget {
    config: ModrinthConfig,
    readme: std::path::PathBuf,
    client: ModrinthClient,
    token_present: bool,
}

impl ModrinthTarget {
    pub fn new(
        config: &ModrinthConfig,
        readme: &Path,
        token: Option<String>,
        timeout: std::time::Duration,
    ) -> Self {
        Self {
            token_present: token.is_some(),
            client: ModrinthClient::new(&config.api)
                .with_token(token)
                .with_timeout(timeout),
            config: config.clone(),
            readme: readme.to_path_buf(),
        }
    }

    fn page_slug(&self) -> &str {
        self.config.slug.as_deref().unwrap_or(&self.config.id)
    }
}

impl PublishTarget for ModrinthTarget {
    fn kind(&self) -> TargetKind {
        TargetKind::Modrinth
    }

    fn credential_env(&self) -> &'static str {
        MODRINTH_TOKEN_ENV
    }

    fn credential_present(&self) -> bool {
        self.token_present
    }

    fn validate(&self) -> Result<(), ReleaseError> {
        if self.config.id.trim().is_empty() {
            return Err(configuration_error(self.kind(), "publish.modrinth.id is not set"));
        }
        Ok(())
    }

    fn accepts(&self, node: &NodeConfig) -> bool {
        runtime_allowed(&self.config.runtimes, node)
    }

    fn prepare_run(
        &mut self,
        ctx: &RunContext<'_>,
        reporter: &mut dyn Reporter,
    ) -> Result<Option<TargetOutcome>> {
        if !self.config.sync_body || self.validate().is_err() || !self.token_present {
            return Ok(None);
        }

        let path = ctx.project_root.join(&self.readme);
        let body = match fs::read_to_string(&path) {
            Ok(body) => body,
            Err(err) => {
                reporter.warn(&format!(
                    "modrinth: not syncing project description, cannot read {}: {err}",
                    path.display()
                ));
                return Ok(None);
            }
        };

        match self.client.modify_project_body(&self.config.id, &body) {
            Ok(()) => reporter.info("modrinth: project description synced from README"),
            Err(err) => reporter.warn(&format!("modrinth: description sync failed: {err:#}")),
        }
        Ok(None)
    }

    fn publish(
        &mut self,
        request: &PublishRequest<'_>,
        reporter: &mut dyn Reporter,
    ) -> Result<Option<String>> {
        let node = request.node;
        let upload = VersionUpload {
            project_id: self.config.id.clone(),
            version_number: node.project_version.clone(),
            name: node.display_name.clone(),
            changelog: request.changelog.to_string(),
            game_versions: node.game_versions.clone(),
            loaders: vec![node.node.loader.clone()],
            version_type: request.release_type.api_name().to_string(),
            featured: false,
        };

        let bytes = read_artifact(&request.artifact.path)?;
        let created = self
            .client
            .create_version(&upload, &file_name(&request.artifact.path), bytes)?;
        reporter.info(&format!(
            "modrinth: created version {} for {}",
            created.id, node.node
        ));

        Ok(Some(format!(
            "{MODRINTH_WEB}/mod/{}/version/{}",
            self.page_slug(),
            created.id
        )))
    }
}

pub struct CurseforgeTarget {
    config: CurseforgeConfig,
    client: CurseforgeClient,
    token_present: bool,
    catalogue: Option<std::result::Result<Vec<GameVersion>, String>>,
}

impl CurseforgeTarget {
    pub fn new(
        config: &CurseforgeConfig,
        token: Option<String>,
        timeout: std::time::Duration,
    ) -> Self {
        Self {
            token_present: token.is_some(),
            client: CurseforgeClient::new(&config.api)
                .with_token(token)
                .with_timeout(timeout),
            config: config.clone(),
            catalogue: None,
        }
    }

    /// Game version catalogue, fetched at most once per run.
    fn catalogue(&mut self, reporter: &mut dyn Reporter) -> Result<&[GameVersion]> {
        if self.catalogue.is_none() {
            reporter.info("curseforge: fetching game version catalogue");
            self.catalogue = Some(self.client.game_versions().map_err(|e| format!("{e:#}")));
        }
        match &self.catalogue {
            Some(Ok(versions)) => Ok(versions),
            Some(Err(message)) => bail!("game version catalogue unavailable: {message}"),
            None => bail!("game version catalogue unavailable"),
        }
    }
}

impl PublishTarget for CurseforgeTarget {
    fn kind(&self) -> TargetKind {
        TargetKind::Curseforge
    }

    fn credential_env(&self) -> &'static str {
        CURSEFORGE_TOKEN_ENV
    }

    fn credential_present(&self) -> bool {
        self.token_present
    }

    fn validate(&self) -> Result<(), ReleaseError> {
        let id = self.config.id.trim();
        if id.is_empty() {
            return Err(configuration_error(self.kind(), "publish.curseforge.id is not set"));
        }
        if !id.chars().all(|c| c.is_ascii_digit()) {
            return Err(configuration_error(
                self.kind(),
                format!("publish.curseforge.id must be numeric, got '{id}'"),
            ));
        }
        Ok(())
    }

    fn accepts(&self, node: &NodeConfig) -> bool {
        runtime_allowed(&self.config.runtimes, node)
    }

    fn publish(
        &mut self,
        request: &PublishRequest<'_>,
        reporter: &mut dyn Reporter,
    ) -> Result<Option<String>> {
        let node = request.node;
        let loaders = [loader_title(&node.node.loader)];
        let game_versions =
            resolve_game_version_ids(self.catalogue(reporter)?, &node.game_versions, &loaders)?;

        let metadata = FileMetadata {
            changelog: request.changelog.to_string(),
            changelog_type: "markdown".to_string(),
            display_name: node.display_name.clone(),
            game_versions,
            release_type: request.release_type.api_name().to_string(),
        };

        let bytes = read_artifact(&request.artifact.path)?;
        let uploaded = self.client.upload_file(
            self.config.id.trim(),
            &metadata,
            &file_name(&request.artifact.path),
            bytes,
        )?;
        reporter.info(&format!(
            "curseforge: uploaded file {} for {}",
            uploaded.id, node.node
        ));

        let slug = self.config.slug.as_deref().unwrap_or(self.config.id.trim());
        Ok(Some(format!("{CURSEFORGE_WEB}/{slug}/files/{}", uploaded.id)))
    }
}

pub struct GithubTarget {
    config: GithubConfig,
    client: GithubClient,
    token_present: bool,
    release_id: Option<u64>,
}

impl GithubTarget {
    pub fn new(config: &GithubConfig, token: Option<String>, timeout: std::time::Duration) -> Self {
        Self {
            token_present: token.is_some(),
            client: GithubClient::new(&config.api)
                .with_uploads_base(&config.uploads)
                .with_token(token)
                .with_timeout(timeout),
            config: config.clone(),
            release_id: None,
        }
    }

    fn upload_replacing(
        &self,
        release_id: u64,
        path: &Path,
        existing: &[modship_registry::Asset],
        reporter: &mut dyn Reporter,
    ) -> Result<String> {
        let name = file_name(path);
        for asset in existing.iter().filter(|a| a.name == name) {
            reporter.info(&format!("github: replacing existing asset {name}"));
            self.client.delete_asset(&self.config.repository, asset.id)?;
        }
        let bytes = read_artifact(path)?;
        let asset = self
            .client
            .upload_asset(&self.config.repository, release_id, &name, bytes)?;
        Ok(asset.browser_download_url)
    }
}

/// Tag of the parent release for `mod_version`.
pub fn release_tag(mod_version: &str) -> String {
    format!("v{mod_version}")
}

impl PublishTarget for GithubTarget {
    fn kind(&self) -> TargetKind {
        TargetKind::Github
    }

    fn credential_env(&self) -> &'static str {
        GITHUB_TOKEN_ENV
    }

    fn credential_present(&self) -> bool {
        self.token_present
    }

    fn validate(&self) -> Result<(), ReleaseError> {
        let repo = self.config.repository.trim();
        match repo.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(())
            }
            _ if repo.is_empty() => Err(configuration_error(
                self.kind(),
                "publish.github.repository is not set",
            )),
            _ => Err(configuration_error(
                self.kind(),
                format!("publish.github.repository must be owner/name, got '{repo}'"),
            )),
        }
    }

    fn accepts(&self, node: &NodeConfig) -> bool {
        runtime_allowed(&self.config.runtimes, node)
    }

    fn prepare_run(
        &mut self,
        ctx: &RunContext<'_>,
        reporter: &mut dyn Reporter,
    ) -> Result<Option<TargetOutcome>> {
        self.validate()?;
        if !self.token_present {
            return Err(configuration_error(
                self.kind(),
                format!("{GITHUB_TOKEN_ENV} is not set"),
            )
            .into());
        }

        let repo = &self.config.repository;
        let tag = release_tag(ctx.mod_version);
        let release = match self.client.release_by_tag(repo, &tag)? {
            Some(existing) => {
                reporter.info(&format!("github: reusing release {tag}"));
                existing
            }
            None => {
                reporter.info(&format!("github: creating release {tag}"));
                self.client.create_release(
                    repo,
                    &NewRelease {
                        tag_name: tag,
                        target_commitish: self.config.commitish.clone(),
                        name: ctx.mod_version.to_string(),
                        body: ctx.changelog.to_string(),
                        draft: false,
                        prerelease: ctx.release_type != ReleaseType::Stable,
                    },
                )?
            }
        };

        self.release_id = Some(release.id);
        Ok(Some(TargetOutcome::Published {
            url: Some(release.html_url),
        }))
    }

    fn publish(
        &mut self,
        request: &PublishRequest<'_>,
        reporter: &mut dyn Reporter,
    ) -> Result<Option<String>> {
        let Some(release_id) = self.release_id else {
            bail!("parent release for this run is unavailable");
        };

        let existing = self
            .client
            .list_assets(&self.config.repository, release_id)?;
        let url = self.upload_replacing(release_id, &request.artifact.path, &existing, reporter)?;
        if let Some(sources) = &request.artifact.sources {
            self.upload_replacing(release_id, sources, &existing, reporter)?;
        }
        reporter.info(&format!("github: attached assets for {}", request.node.node));

        Ok(Some(url))
    }
}
