//! Distribution and source-control API clients for modship.
//!
//! Three blocking clients share one user agent and timeout policy:
//!
//! - [`GithubClient`]: tags, commit comparison and release assets.
//! - [`ModrinthClient`]: version upload, project body sync and project lookup.
//! - [`CurseforgeClient`]: game version catalogue and file upload.
//!
//! Every base URL is configurable so tests and self-hosted mirrors can point
//! the clients elsewhere.
//!
//! # Example
//!
//! ```
//! use modship_registry::{GithubClient, ModrinthClient};
//!
//! let github = GithubClient::new("https://api.github.com").with_token(None);
//! assert_eq!(github.api_base(), "https://api.github.com");
//!
//! let modrinth = ModrinthClient::new("https://api.modrinth.com/v2/");
//! assert_eq!(modrinth.base_url(), "https://api.modrinth.com/v2");
//! ```

use std::time::Duration;

use anyhow::anyhow;

mod curseforge;
mod github;
mod modrinth;

pub use curseforge::{
    CURSEFORGE_API, CurseforgeClient, FileMetadata, GameVersion, MODLOADER_VERSION_TYPE,
    UploadedFile, resolve_game_version_ids,
};
pub use github::{
    Asset, CommitDetail, CompareCommit, GITHUB_API, GITHUB_UPLOADS, GITHUB_WEB, GithubClient,
    NewRelease, Release, Tag,
};
pub use modrinth::{CreatedVersion, MODRINTH_API, ModrinthClient, Project, VersionUpload};

/// Default timeout for API requests
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("modship/", env!("CARGO_PKG_VERSION"));

fn build_client(timeout: Duration) -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|_| reqwest::blocking::Client::new())
}

fn unexpected_status(what: &str, response: reqwest::blocking::Response) -> anyhow::Error {
    let status = response.status();
    let body = response.text().unwrap_or_default();
    let body = body.trim();
    if body.is_empty() {
        anyhow!("unexpected status while {what}: {status}")
    } else {
        anyhow!("unexpected status while {what}: {status}: {body}")
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::BTreeMap;
    use std::io::Read;
    use std::sync::{Arc, Mutex};
    use std::thread;

    use tiny_http::{Header, Response, Server, StatusCode};

    #[derive(Debug, Clone)]
    pub struct SeenRequest {
        pub method: String,
        pub url: String,
        pub headers: Vec<(String, String)>,
        pub body: String,
    }

    impl SeenRequest {
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }
    }

    pub struct TestServer {
        pub base_url: String,
        pub seen: Arc<Mutex<Vec<SeenRequest>>>,
        handle: thread::JoinHandle<()>,
    }

    impl TestServer {
        pub fn join(self) -> Vec<SeenRequest> {
            self.handle.join().expect("join server");
            let seen = self.seen.lock().expect("lock");
            seen.clone()
        }
    }

    /// Routes are keyed by `"METHOD /path?query"`; unknown routes answer 404.
    pub fn spawn(routes: BTreeMap<String, (u16, String)>, expected_requests: usize) -> TestServer {
        spawn_with_headers(routes, BTreeMap::new(), expected_requests)
    }

    /// Like [`spawn`], with extra response headers per route key.
    pub fn spawn_with_headers(
        routes: BTreeMap<String, (u16, String)>,
        extra_headers: BTreeMap<String, Vec<(String, String)>>,
        expected_requests: usize,
    ) -> TestServer {
        let server = Server::http("127.0.0.1:0").expect("server");
        let base_url = format!("http://{}", server.server_addr());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_thread = Arc::clone(&seen);

        let handle = thread::spawn(move || {
            for _ in 0..expected_requests {
                let mut req = server.recv().expect("request");
                let mut body = String::new();
                let _ = req.as_reader().read_to_string(&mut body);
                let method = req.method().to_string();
                let url = req.url().to_string();
                let headers = req
                    .headers()
                    .iter()
                    .map(|h| (h.field.to_string(), h.value.as_str().to_string()))
                    .collect();
                seen_thread.lock().expect("lock").push(SeenRequest {
                    method: method.clone(),
                    url: url.clone(),
                    headers,
                    body,
                });

                let key = format!("{method} {url}");
                let (status, payload) = routes
                    .get(&key)
                    .cloned()
                    .unwrap_or((404, "{}".to_string()));
                let mut resp = Response::from_string(payload)
                    .with_status_code(StatusCode(status))
                    .with_header(
                        Header::from_bytes("Content-Type", "application/json").expect("header"),
                    );
                for (name, value) in extra_headers.get(&key).into_iter().flatten() {
                    resp.add_header(
                        Header::from_bytes(name.as_bytes(), value.as_bytes()).expect("header"),
                    );
                }
                req.respond(resp).expect("respond");
            }
        });

        TestServer {
            base_url,
            seen,
            handle,
        }
    }

    pub fn routes<const N: usize>(
        entries: [(&str, u16, &str); N],
    ) -> BTreeMap<String, (u16, String)> {
        entries
            .into_iter()
            .map(|(key, status, body)| (key.to_string(), (status, body.to_string())))
            .collect()
    }
}
