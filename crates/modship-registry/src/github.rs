use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Method, StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::{DEFAULT_TIMEOUT_SECS, build_client, unexpected_status};

/// Default GitHub REST endpoint
pub const GITHUB_API: &str = "https://api.github.com";

/// Default host for release asset uploads
pub const GITHUB_UPLOADS: &str = "https://uploads.github.com";

/// Web host used for commit and repository links
pub const GITHUB_WEB: &str = "https://github.com";

/// Commits requested per compare page (the host's maximum)
const COMPARE_PAGE_SIZE: u32 = 100;

fn has_next_page(headers: &reqwest::header::HeaderMap) -> bool {
    headers
        .get_all(reqwest::header::LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|link| link.contains("rel=\"next\""))
}

/// GitHub REST client for tags, comparisons and releases.
#[derive(Debug, Clone)]
pub struct GithubClient {
    api_base: String,
    uploads_base: String,
    token: Option<String>,
    timeout: Duration,
    client: reqwest::blocking::Client,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
}

/// A commit returned by the compare endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareCommit {
    pub sha: String,
    pub commit: CommitDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitDetail {
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct CompareResponse {
    #[serde(default)]
    commits: Vec<CompareCommit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub id: u64,
    pub tag_name: String,
    #[serde(default)]
    pub html_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub browser_download_url: String,
}

/// Body of `POST /repos/{repo}/releases`.
#[derive(Debug, Clone, Serialize)]
pub struct NewRelease {
    pub tag_name: String,
    pub target_commitish: String,
    pub name: String,
    pub body: String,
    pub draft: bool,
    pub prerelease: bool,
}

impl GithubClient {
    /// Create a client for the given REST base URL
    pub fn new(api_base: &str) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            uploads_base: GITHUB_UPLOADS.to_string(),
            token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            client: build_client(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
        }
    }

    /// Override the asset upload host
    pub fn with_uploads_base(mut self, uploads_base: &str) -> Self {
        self.uploads_base = uploads_base.trim_end_matches('/').to_string();
        self
    }

    /// Authenticate requests with a bearer token
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.client = build_client(timeout);
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn uploads_base(&self) -> &str {
        &self.uploads_base
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn request(
        &self,
        method: Method,
        url: impl reqwest::IntoUrl,
    ) -> reqwest::blocking::RequestBuilder {
        let mut request = self
            .client
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        request
    }

    /// Tags in the order the host returns them.
    pub fn tags(&self, repo: &str) -> Result<Vec<Tag>> {
        let url = format!("{}/repos/{}/tags", self.api_base, repo);
        let response = self
            .request(Method::GET, &url)
            .send()
            .context("failed to query repository tags")?;

        if !response.status().is_success() {
            return Err(unexpected_status("listing tags", response));
        }
        response.json().context("failed to parse tags response")
    }

    /// Name of the first tag the host lists, if any.
    pub fn latest_tag(&self, repo: &str) -> Result<Option<String>> {
        Ok(self.tags(repo)?.into_iter().next().map(|t| t.name))
    }

    /// Commits reachable from `to` but not from `from`, oldest first.
    ///
    /// The host pages long comparisons; pages are followed until the `Link`
    /// header stops advertising `rel="next"` or a page comes back empty.
    pub fn compare(&self, repo: &str, from: &str, to: &str) -> Result<Vec<CompareCommit>> {
        let base = format!("{}/repos/{}/compare/{}...{}", self.api_base, repo, from, to);
        let mut commits = Vec::new();

        for page in 1.. {
            let url = format!("{base}?per_page={COMPARE_PAGE_SIZE}&page={page}");
            let response = self
                .request(Method::GET, &url)
                .send()
                .context("failed to compare revisions")?;

            if !response.status().is_success() {
                return Err(unexpected_status("comparing revisions", response));
            }
            let more = has_next_page(response.headers());
            let compare: CompareResponse = response
                .json()
                .with_context(|| format!("failed to parse compare response (page {page})"))?;

            let fetched = compare.commits.len();
            commits.extend(compare.commits);
            if !more || fetched == 0 {
                break;
            }
        }

        Ok(commits)
    }

    /// Look up the release for `tag`; `None` when it does not exist yet.
    pub fn release_by_tag(&self, repo: &str, tag: &str) -> Result<Option<Release>> {
        let url = format!("{}/repos/{}/releases/tags/{}", self.api_base, repo, tag);
        let response = self
            .request(Method::GET, &url)
            .send()
            .context("failed to query release")?;

        match response.status() {
            StatusCode::OK => Ok(Some(
                response.json().context("failed to parse release response")?,
            )),
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(unexpected_status("looking up release", response)),
        }
    }

    pub fn create_release(&self, repo: &str, release: &NewRelease) -> Result<Release> {
        let url = format!("{}/repos/{}/releases", self.api_base, repo);
        let response = self
            .request(Method::POST, &url)
            .json(release)
            .send()
            .context("failed to create release")?;

        if !response.status().is_success() {
            return Err(unexpected_status("creating release", response));
        }
        response.json().context("failed to parse created release")
    }

    pub fn list_assets(&self, repo: &str, release_id: u64) -> Result<Vec<Asset>> {
        let url = format!(
            "{}/repos/{}/releases/{}/assets",
            self.api_base, repo, release_id
        );
        let response = self
            .request(Method::GET, &url)
            .send()
            .context("failed to list release assets")?;

        if !response.status().is_success() {
            return Err(unexpected_status("listing release assets", response));
        }
        response.json().context("failed to parse release assets")
    }

    pub fn delete_asset(&self, repo: &str, asset_id: u64) -> Result<()> {
        let url = format!(
            "{}/repos/{}/releases/assets/{}",
            self.api_base, repo, asset_id
        );
        let response = self
            .request(Method::DELETE, &url)
            .send()
            .context("failed to delete release asset")?;

        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::OK | StatusCode::NOT_FOUND => Ok(()),
            _ => Err(unexpected_status("deleting release asset", response)),
        }
    }

    /// Upload `bytes` as asset `name` of release `release_id`.
    pub fn upload_asset(
        &self,
        repo: &str,
        release_id: u64,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<Asset> {
        let base = format!(
            "{}/repos/{}/releases/{}/assets",
            self.uploads_base, repo, release_id
        );
        let url = Url::parse_with_params(&base, &[("name", name)])
            .with_context(|| format!("invalid upload url {base}"))?;

        let response = self
            .request(Method::POST, url)
            .header("Content-Type", "application/octet-stream")
            .body(bytes)
            .send()
            .context("failed to upload release asset")?;

        if !response.status().is_success() {
            return Err(unexpected_status("uploading release asset", response));
        }
        response.json().context("failed to parse uploaded asset")
    }
}
