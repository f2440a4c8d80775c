//! Discord release announcements for modship.
//!
//! A [`ReleasePayload`] is rendered into one embed (title, changelog text,
//! colour, optional thumbnail) followed by a row of link buttons, then
//! POSTed to a Discord webhook.
//!
//! # Example
//!
//! ```
//! use modship_webhook::{ReleasePayload, discord_payload};
//!
//! let payload = ReleasePayload {
//!     title: "Demo 1.0.0 has been released!".to_string(),
//!     description: "### ✨ Features".to_string(),
//!     links: vec![("GitHub".to_string(), "https://github.com/o/r".to_string())],
//!     ..Default::default()
//! };
//!
//! let json = discord_payload(&payload);
//! assert_eq!(json["embeds"][0]["color"], 7506394);
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Embed colour used for release announcements.
pub const RELEASE_COLOR: u32 = 7_506_394;

/// Discord's limit on embed descriptions, in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 4096;

/// Discord allows at most five buttons per action row.
const MAX_BUTTONS: usize = 5;

const ACTION_ROW: u8 = 1;
const BUTTON: u8 = 2;
const LINK_STYLE: u8 = 5;

/// Webhook configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Webhook URL
    pub url: String,
    /// Timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    30
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Announcement content, independent of the wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleasePayload {
    pub title: String,
    pub description: String,
    pub color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    /// `(label, url)` pairs rendered as link buttons, in order.
    pub links: Vec<(String, String)>,
}

impl Default for ReleasePayload {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            color: RELEASE_COLOR,
            thumbnail_url: None,
            links: Vec::new(),
        }
    }
}

/// Cut `text` to at most `max_chars` characters, marking the cut with `…`.
pub fn truncate_description(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(1);
    let mut out: String = text.chars().take(keep).collect();
    out.push('…');
    out
}

/// Render the Discord webhook body.
pub fn discord_payload(payload: &ReleasePayload) -> Value {
    let mut embed = json!({
        "title": payload.title,
        "description": truncate_description(&payload.description, MAX_DESCRIPTION_CHARS),
        "color": payload.color,
    });
    if let Some(url) = &payload.thumbnail_url {
        embed["thumbnail"] = json!({ "url": url });
    }

    let buttons: Vec<Value> = payload
        .links
        .iter()
        .take(MAX_BUTTONS)
        .map(|(label, url)| {
            json!({
                "type": BUTTON,
                "style": LINK_STYLE,
                "label": label,
                "url": url,
            })
        })
        .collect();

    let mut body = json!({ "embeds": [embed] });
    if !buttons.is_empty() {
        body["components"] = json!([{ "type": ACTION_ROW, "components": buttons }]);
    }
    body
}

/// POST the announcement. Returns the HTTP status code so the caller can
/// decide how to treat anything other than `204 No Content`.
pub fn send_webhook(config: &WebhookConfig, payload: &ReleasePayload) -> Result<u16> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .context("failed to create HTTP client")?;

    let body = serde_json::to_string(&discord_payload(payload))?;

    let response = client
        .post(&config.url)
        .header("Content-Type", "application/json")
        .body(body)
        .send()
        .context("failed to send webhook request")?;

    Ok(response.status().as_u16())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Read;
    use std::thread;

    use tiny_http::{Response, Server, StatusCode};

    fn payload() -> ReleasePayload {
        ReleasePayload {
            title: "Demo 1.0.0 has been released!".to_string(),
            description: "### 🐛 Bug Fixes\n- crash on load".to_string(),
            color: RELEASE_COLOR,
            thumbnail_url: Some("https://cdn.example/icon.png".to_string()),
            links: vec![
                ("Modrinth".to_string(), "https://modrinth.com/mod/demo".to_string()),
                (
                    "CurseForge".to_string(),
                    "https://www.curseforge.com/minecraft/mc-mods/demo".to_string(),
                ),
                ("GitHub".to_string(), "https://github.com/owner/demo".to_string()),
            ],
        }
    }

    #[test]
    fn webhook_config_defaults_timeout() {
        let config: WebhookConfig =
            serde_json::from_str(r#"{"url":"https://discord.example/hook"}"#).expect("parse");
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(WebhookConfig::new("x").timeout_secs, 30);
    }

    #[test]
    fn discord_payload_snapshot() {
        let json = serde_json::to_string_pretty(&discord_payload(&payload())).expect("json");
        insta::assert_snapshot!(json, @r####"
{
  "components": [
    {
      "components": [
        {
          "label": "Modrinth",
          "style": 5,
          "type": 2,
          "url": "https://modrinth.com/mod/demo"
        },
        {
          "label": "CurseForge",
          "style": 5,
          "type": 2,
          "url": "https://www.curseforge.com/minecraft/mc-mods/demo"
        },
        {
          "label": "GitHub",
          "style": 5,
          "type": 2,
          "url": "https://github.com/owner/demo"
        }
      ],
      "type": 1
    }
  ],
  "embeds": [
    {
      "color": 7506394,
      "description": "### 🐛 Bug Fixes\n- crash on load",
      "thumbnail": {
        "url": "https://cdn.example/icon.png"
      },
      "title": "Demo 1.0.0 has been released!"
    }
  ]
}
"####);
    }

    #[test]
    fn payload_without_icon_or_links_omits_them() {
        let json = discord_payload(&ReleasePayload {
            title: "t".to_string(),
            ..Default::default()
        });
        assert!(json["embeds"][0].get("thumbnail").is_none());
        assert!(json.get("components").is_none());
        assert_eq!(json["embeds"][0]["color"], RELEASE_COLOR);
    }

    #[test]
    fn long_description_is_truncated_to_limit() {
        let long = "é".repeat(MAX_DESCRIPTION_CHARS + 10);
        let json = discord_payload(&ReleasePayload {
            description: long,
            ..Default::default()
        });
        let description = json["embeds"][0]["description"].as_str().expect("str");
        assert_eq!(description.chars().count(), MAX_DESCRIPTION_CHARS);
        assert!(description.ends_with('…'));
    }

    #[test]
    fn short_description_is_untouched() {
        assert_eq!(truncate_description("abc", 3), "abc");
        assert_eq!(truncate_description("abcd", 3), "ab…");
    }

    fn serve_once(status: u16) -> (String, thread::JoinHandle<String>) {
        let server = Server::http("127.0.0.1:0").expect("server");
        let url = format!("http://{}/api/webhooks/1/abc", server.server_addr());
        let handle = thread::spawn(move || {
            let mut req = server.recv().expect("request");
            let mut body = String::new();
            req.as_reader().read_to_string(&mut body).expect("body");
            req.respond(Response::empty(StatusCode(status)))
                .expect("respond");
            body
        });
        (url, handle)
    }

    #[test]
    fn send_webhook_reports_no_content() {
        let (url, handle) = serve_once(204);
        let status = send_webhook(&WebhookConfig::new(url), &payload()).expect("send");
        let body = handle.join().expect("join");

        assert_eq!(status, 204);
        let sent: Value = serde_json::from_str(&body).expect("json");
        assert_eq!(sent["embeds"][0]["title"], "Demo 1.0.0 has been released!");
    }

    #[test]
    fn send_webhook_passes_other_statuses_through() {
        let (url, handle) = serve_once(429);
        let status = send_webhook(&WebhookConfig::new(url), &payload()).expect("send");
        handle.join().expect("join");
        assert_eq!(status, 429);
    }

    #[test]
    fn send_webhook_fails_when_unreachable() {
        let config = WebhookConfig {
            url: "http://127.0.0.1:9/unreachable".to_string(),
            timeout_secs: 1,
        };
        assert!(send_webhook(&config, &payload()).is_err());
    }

    mod property_tests {
        use super::super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn description_never_exceeds_limit(text in ".{0,200}", max in 1usize..64) {
                let out = truncate_description(&text, max);
                prop_assert!(out.chars().count() <= max);
                if text.chars().count() <= max {
                    prop_assert_eq!(out, text);
                }
            }

            #[test]
            fn buttons_are_capped(count in 0usize..12) {
                let links = (0..count)
                    .map(|i| (format!("L{i}"), format!("https://example.test/{i}")))
                    .collect();
                let json = discord_payload(&ReleasePayload { links, ..Default::default() });
                let rendered = json["components"][0]["components"]
                    .as_array()
                    .map(|a| a.len())
                    .unwrap_or(0);
                prop_assert_eq!(rendered, count.min(5));
            }
        }
    }
}
