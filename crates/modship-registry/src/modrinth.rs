use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use reqwest::blocking::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{DEFAULT_TIMEOUT_SECS, build_client, unexpected_status};

/// Default Modrinth API endpoint
pub const MODRINTH_API: &str = "https://api.modrinth.com/v2";

/// Multipart field carrying the primary file.
const FILE_PART: &str = "file";

/// Modrinth API client
#[derive(Debug, Clone)]
pub struct ModrinthClient {
    base_url: String,
    token: Option<String>,
    timeout: Duration,
    client: reqwest::blocking::Client,
}

/// Metadata sent in the `data` part of a version upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionUpload {
    pub project_id: String,
    pub version_number: String,
    pub name: String,
    pub changelog: String,
    pub game_versions: Vec<String>,
    pub loaders: Vec<String>,
    pub version_type: String,
    pub featured: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedVersion {
    pub id: String,
    pub project_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub slug: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub icon_url: Option<String>,
}

impl ModrinthClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            client: build_client(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
        }
    }

    /// Modrinth expects the raw token in `Authorization`, without a scheme.
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
            Some(token) => request.header("Authorization", token),
            None => request,
        }
    }

    /// Create a new version with one primary file.
    pub fn create_version(
        &self,
        upload: &VersionUpload,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<CreatedVersion> {
        let mut data = serde_json::to_value(upload).context("failed to encode version data")?;
        data["file_parts"] = json!([FILE_PART]);
        data["primary_file"] = json!(FILE_PART);
        data["dependencies"] = json!([]);

        let file = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("application/java-archive")
            .context("invalid file mime type")?;
        let form = Form::new()
            .text("data", data.to_string())
            .part(FILE_PART, file);

        let url = format!("{}/version", self.base_url);
        let response = self
            .authorize(self.client.post(&url))
            .multipart(form)
            .send()
            .context("failed to upload version to Modrinth")?;

        if !response.status().is_success() {
            return Err(unexpected_status("creating Modrinth version", response));
        }
        response
            .json()
            .context("failed to parse Modrinth version response")
    }

    /// Replace the long description of a project.
    pub fn modify_project_body(&self, project_id: &str, body: &str) -> Result<()> {
        let url = format!("{}/project/{}", self.base_url, project_id);
        let response = self
            .authorize(self.client.patch(&url))
            .json(&json!({ "body": body }))
            .send()
            .context("failed to update Modrinth project")?;

        if !response.status().is_success() {
            return Err(unexpected_status("updating Modrinth project", response));
        }
        Ok(())
    }

    /// Project metadata by id or slug; `None` when the project does not exist.
    pub fn project(&self, id_or_slug: &str) -> Result<Option<Project>> {
        let url = format!("{}/project/{}", self.base_url, id_or_slug);
        let response = self
            .client
            .get(&url)
            .send()
            .context("failed to query Modrinth project")?;

        match response.status() {
            StatusCode::OK => Ok(Some(
                response
                    .json()
                    .context("failed to parse Modrinth project")?,
            )),
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(unexpected_status("querying Modrinth project", response)),
        }
    }
}
