use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::blocking::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

use crate::{DEFAULT_TIMEOUT_SECS, build_client, unexpected_status};

/// Default CurseForge upload API endpoint
pub const CURSEFORGE_API: &str = "https://minecraft.curseforge.com";

/// CurseForge upload API client
#[derive(Debug, Clone)]
pub struct CurseforgeClient {
    base_url: String,
    token: Option<String>,
    timeout: Duration,
    client: reqwest::blocking::Client,
}

/// One entry of the game version catalogue. Loaders such as `Forge` appear
/// here too, under their own type id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameVersion {
    pub id: u64,
    pub name: String,
    #[serde(rename = "gameVersionTypeID", default)]
    pub game_version_type_id: u64,
}

/// The `metadata` part of a file upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub changelog: String,
    pub changelog_type: String,
    pub display_name: String,
    pub game_versions: Vec<u64>,
    pub release_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadedFile {
    pub id: u64,
}

/// Catalogue type id shared by every mod loader entry
pub const MODLOADER_VERSION_TYPE: u64 = 68441;

fn lookup<'a>(catalogue: &'a [GameVersion], name: &str, loader: bool) -> Option<&'a GameVersion> {
    catalogue.iter().find(|v| {
        (v.game_version_type_id == MODLOADER_VERSION_TYPE) == loader
            && v.name.eq_ignore_ascii_case(name)
    })
}

/// Map game version names and loader names to catalogue ids, case-insensitively.
///
/// Loader names only match modloader entries and game versions only match the
/// other types, so a name listed under both resolves per its role. Every name
/// must resolve; the first unknown name is reported.
pub fn resolve_game_version_ids(
    catalogue: &[GameVersion],
    game_versions: &[String],
    loaders: &[String],
) -> Result<Vec<u64>> {
    let names = game_versions
        .iter()
        .map(|n| (n, false))
        .chain(loaders.iter().map(|n| (n, true)));

    let mut ids = Vec::with_capacity(game_versions.len() + loaders.len());
    for (name, loader) in names {
        match lookup(catalogue, name, loader) {
            Some(version) => {
                if !ids.contains(&version.id) {
                    ids.push(version.id);
                }
            }
            None if loader => bail!("CurseForge does not know loader '{name}'"),
            None => bail!("CurseForge does not know game version '{name}'"),
        }
    }
    Ok(ids)
}

impl CurseforgeClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            client: build_client(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.client = build_client(timeout);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn authorize(
        &self,
        request: reqwest::blocking::RequestBuilder,
    ) -> reqwest::blocking::RequestBuilder {
        match &self.token {
            Some(token) => request.header("X-Api-Token", token),
            None => request,
        }
    }

    /// The full game version catalogue.
    pub fn game_versions(&self) -> Result<Vec<GameVersion>> {
        let url = format!("{}/api/game/versions", self.base_url);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .context("failed to query CurseForge game versions")?;

        if !response.status().is_success() {
            return Err(unexpected_status("listing CurseForge game versions", response));
        }
        response
            .json()
            .context("failed to parse CurseForge game versions")
    }

    pub fn upload_file(
        &self,
        project_id: &str,
        metadata: &FileMetadata,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadedFile> {
        let metadata =
            serde_json::to_string(metadata).context("failed to encode upload metadata")?;
        let file = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("application/java-archive")
            .context("invalid file mime type")?;
        let form = Form::new().text("metadata", metadata).part("file", file);

        let url = format!("{}/api/projects/{}/upload-file", self.base_url, project_id);
        let response = self
            .authorize(self.client.post(&url))
            .multipart(form)
            .send()
            .context("failed to upload file to CurseForge")?;

        if !response.status().is_success() {
            return Err(unexpected_status("uploading to CurseForge", response));
        }
        response
            .json()
            .context("failed to parse CurseForge upload response")
    }
}
