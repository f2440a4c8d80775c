//! Release announcement.
//!
//! Runs only after every publish succeeded. Nothing here fails the run:
//! the icon lookup is best effort and webhook problems become warnings.

use modship_registry::ModrinthClient;
use modship_types::NotifyStatus;
use modship_webhook::{ReleasePayload, WebhookConfig, discord_payload, send_webhook};

use crate::config::ModshipConfig;
use crate::engine::Reporter;
use crate::targets::{CURSEFORGE_WEB, MODRINTH_WEB};

const NO_CHANGELOG: &str = "No changelog available for this release.";

/// Link buttons for every configured target, in target order.
pub fn release_links(config: &ModshipConfig) -> Vec<(String, String)> {
    let mut links = Vec::new();
    let publish = &config.publish;

    if let Some(modrinth) = publish.modrinth.as_ref().filter(|m| !m.id.trim().is_empty()) {
        let slug = modrinth.slug.as_deref().unwrap_or(&modrinth.id);
        links.push(("Modrinth".to_string(), format!("{MODRINTH_WEB}/mod/{slug}")));
    }
    if let Some(curseforge) = publish.curseforge.as_ref().filter(|c| !c.id.trim().is_empty()) {
        let slug = curseforge.slug.as_deref().unwrap_or(&curseforge.id);
        links.push(("CurseForge".to_string(), format!("{CURSEFORGE_WEB}/{slug}")));
    }
    if let Some(github) = publish
        .github
        .as_ref()
        .filter(|g| !g.repository.trim().is_empty())
    {
        links.push((
            "GitHub".to_string(),
            format!("{}/{}", github.web.trim_end_matches('/'), github.repository),
        ));
    }

    links
}

pub fn release_payload(
    config: &ModshipConfig,
    changelog: &str,
    thumbnail_url: Option<String>,
) -> ReleasePayload {
    let meta = &config.mod_meta;
    let description = if changelog.trim().is_empty() {
        NO_CHANGELOG.to_string()
    } else {
        changelog.to_string()
    };

    ReleasePayload {
        title: format!("{} {} has been released!", meta.name, meta.version),
        description,
        thumbnail_url,
        links: release_links(config),
        ..ReleasePayload::default()
    }
}

/// Project icon from Modrinth; any failure means no thumbnail.
pub fn fetch_icon(config: &ModshipConfig, reporter: &mut dyn Reporter) -> Option<String> {
    let modrinth = config.publish.modrinth.as_ref()?;
    let key = modrinth
        .slug
        .as_deref()
        .unwrap_or(&modrinth.id)
        .trim()
        .to_string();
    if key.is_empty() {
        return None;
    }

    let client = ModrinthClient::new(&modrinth.api).with_timeout(config.notify.timeout);
    match client.project(&key) {
        Ok(Some(project)) => project.icon_url,
        Ok(None) => {
            reporter.warn(&format!("modrinth project {key} not found; no thumbnail"));
            None
        }
        Err(err) => {
            reporter.warn(&format!("icon lookup failed: {err:#}"));
            None
        }
    }
}

/// Announce the release on the webhook.
pub fn notify_release(
    config: &ModshipConfig,
    webhook_url: Option<&str>,
    changelog: &str,
    dry_run: bool,
    reporter: &mut dyn Reporter,
) -> NotifyStatus {
    if !config.notify.enabled {
        reporter.info("notification disabled in config");
        return NotifyStatus::Skipped {
            reason: "notification disabled".to_string(),
        };
    }

    let Some(url) = webhook_url.filter(|u| !u.trim().is_empty()) else {
        reporter.warn("DISCORD_WEBHOOK is not set; skipping release announcement");
        return NotifyStatus::Skipped {
            reason: "no webhook configured".to_string(),
        };
    };

    if dry_run {
        let payload = release_payload(config, changelog, None);
        reporter.info(&format!(
            "dry run: webhook payload {}",
            discord_payload(&payload)
        ));
        return NotifyStatus::Skipped {
            reason: "dry run".to_string(),
        };
    }

    let payload = release_payload(config, changelog, fetch_icon(config, reporter));
    let webhook = WebhookConfig {
        url: url.to_string(),
        timeout_secs: config.notify.timeout.as_secs().max(1),
    };

    match send_webhook(&webhook, &payload) {
        Ok(204) => {
            reporter.info("release announced");
            NotifyStatus::Sent
        }
        Ok(status) => {
            let message = format!("webhook answered HTTP {status}");
            reporter.warn(&message);
            NotifyStatus::Warned { message }
        }
        Err(err) => {
            let message = format!("{err:#}");
            reporter.warn(&format!("webhook delivery failed: {message}"));
            NotifyStatus::Warned { message }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{CollectingReporter, routes, spawn};

    fn config(modrinth_api: &str) -> ModshipConfig {
        toml::from_str(&format!(
            r#"
[mod]
id = "demo"
name = "Demo Mod"
version = "1.2.0"
group = "com.example"

[publish.modrinth]
id = "AABBCCDD"
slug = "demo"
api = "{modrinth_api}"

[publish.curseforge]
id = "123456"

[publish.github]
repository = "o/demo"
"#
        ))
        .expect("config")
    }

    #[test]
    fn links_cover_configured_targets() {
        assert_eq!(
            release_links(&config("http://unused")),
            vec![
                ("Modrinth".to_string(), "https://modrinth.com/mod/demo".to_string()),
                (
                    "CurseForge".to_string(),
                    "https://www.curseforge.com/minecraft/mc-mods/123456".to_string()
                ),
                ("GitHub".to_string(), "https://github.com/o/demo".to_string()),
            ]
        );
    }

    #[test]
    fn payload_title_and_fallback_description() {
        let payload = release_payload(&config("http://unused"), "  ", None);
        assert_eq!(payload.title, "Demo Mod 1.2.0 has been released!");
        assert_eq!(payload.description, NO_CHANGELOG);
        assert_eq!(payload.color, modship_webhook::RELEASE_COLOR);
    }

    #[test]
    fn sends_with_icon_and_reports_sent() {
        let modrinth = spawn(routes([(
            "GET /project/demo",
            200,
            r#"{"id":"AABBCCDD","slug":"demo","title":"Demo","icon_url":"https://cdn.example/i.png"}"#,
        )]));
        let hook = spawn(routes([("POST /hook", 204, "")]));
        let mut reporter = CollectingReporter::default();

        let status = notify_release(
            &config(&modrinth.base_url),
            Some(&format!("{}/hook", hook.base_url)),
            "### ✨ Features",
            false,
            &mut reporter,
        );
        modrinth.join();
        let seen = hook.join();

        assert_eq!(status, NotifyStatus::Sent);
        assert_eq!(seen.len(), 1);
        assert!(seen[0].body.contains("https://cdn.example/i.png"));
        assert!(seen[0].body.contains("Demo Mod 1.2.0 has been released!"));
    }

    #[test]
    fn icon_failure_still_sends_without_thumbnail() {
        let modrinth = spawn(routes([("GET /project/demo", 500, "down")]));
        let hook = spawn(routes([("POST /hook", 204, "")]));
        let mut reporter = CollectingReporter::default();

        let status = notify_release(
            &config(&modrinth.base_url),
            Some(&format!("{}/hook", hook.base_url)),
            "notes",
            false,
            &mut reporter,
        );
        modrinth.join();
        let seen = hook.join();

        assert_eq!(status, NotifyStatus::Sent);
        assert!(!seen[0].body.contains("thumbnail"));
        assert!(reporter.warns.iter().any(|w| w.contains("icon lookup failed")));
    }

    #[test]
    fn non_204_is_a_warning() {
        let modrinth = spawn(routes([]));
        let hook = spawn(routes([("POST /hook", 429, "slow down")]));
        let mut reporter = CollectingReporter::default();

        let status = notify_release(
            &config(&modrinth.base_url),
            Some(&format!("{}/hook", hook.base_url)),
            "notes",
            false,
            &mut reporter,
        );
        modrinth.join();
        hook.join();

        assert!(matches!(status, NotifyStatus::Warned { message } if message.contains("429")));
    }

    #[test]
    fn missing_webhook_is_skipped_with_warning() {
        let mut reporter = CollectingReporter::default();
        let status = notify_release(&config("http://unused"), None, "notes", false, &mut reporter);
        assert!(matches!(status, NotifyStatus::Skipped { .. }));
        assert_eq!(reporter.warns.len(), 1);
    }

    #[test]
    fn dry_run_logs_payload_without_posting() {
        let mut reporter = CollectingReporter::default();
        let status = notify_release(
            &config("http://127.0.0.1:9"),
            Some("http://127.0.0.1:9/hook"),
            "notes",
            true,
            &mut reporter,
        );
        assert_eq!(
            status,
            NotifyStatus::Skipped {
                reason: "dry run".to_string()
            }
        );
        assert!(reporter.infos.iter().any(|m| m.contains("\"embeds\"")));
    }

    #[test]
    fn disabled_notification_is_skipped() {
        let mut cfg = config("http://unused");
        cfg.notify.enabled = false;
        let mut reporter = CollectingReporter::default();
        let status = notify_release(&cfg, Some("http://x/hook"), "notes", false, &mut reporter);
        assert!(matches!(status, NotifyStatus::Skipped { .. }));
    }
}
