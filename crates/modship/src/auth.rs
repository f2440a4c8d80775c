use std::env;
use std::fmt;

/// Modrinth personal access token.
pub const MODRINTH_TOKEN_ENV: &str = "MODRINTH_API_KEY";
/// CurseForge upload API token.
pub const CURSEFORGE_TOKEN_ENV: &str = "CF_API_KEY";
/// GitHub token used for releases and changelog reads.
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";
/// Discord webhook URL for release announcements.
pub const WEBHOOK_URL_ENV: &str = "DISCORD_WEBHOOK";
/// Presence (any value) switches every target to dry-run.
pub const DRY_RUN_ENV: &str = "PUBLISH_DRY_RUN";

/// Secrets read once at start of a run. Never written to disk or logs.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub modrinth: Option<String>,
    pub curseforge: Option<String>,
    pub github: Option<String>,
    pub webhook_url: Option<String>,
}

impl Credentials {
    /// Read credentials from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read credentials through `lookup`; blank values count as absent.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            modrinth: read(MODRINTH_TOKEN_ENV),
            curseforge: read(CURSEFORGE_TOKEN_ENV),
            github: read(GITHUB_TOKEN_ENV),
            webhook_url: read(WEBHOOK_URL_ENV),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn shown(value: &Option<String>) -> &'static str {
            if value.is_some() { "<set>" } else { "<unset>" }
        }

        f.debug_struct("Credentials")
            .field("modrinth", &shown(&self.modrinth))
            .field("curseforge", &shown(&self.curseforge))
            .field("github", &shown(&self.github))
            .field("webhook_url", &shown(&self.webhook_url))
            .finish()
    }
}

/// True when `PUBLISH_DRY_RUN` is present in the environment, whatever its value.
pub fn dry_run_from_env() -> bool {
    dry_run_from_lookup(|key| env::var_os(key).map(|v| v.to_string_lossy().into_owned()))
}

pub fn dry_run_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> bool {
    lookup(DRY_RUN_ENV).is_some()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serial_test::serial;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn reads_all_known_variables() {
        let creds = Credentials::from_lookup(lookup(&[
            ("MODRINTH_API_KEY", "mrp"),
            ("CF_API_KEY", "cf"),
            ("GITHUB_TOKEN", "ghp"),
            ("DISCORD_WEBHOOK", "https://discord.example/hook"),
        ]));
        assert_eq!(creds.modrinth.as_deref(), Some("mrp"));
        assert_eq!(creds.curseforge.as_deref(), Some("cf"));
        assert_eq!(creds.github.as_deref(), Some("ghp"));
        assert_eq!(
            creds.webhook_url.as_deref(),
            Some("https://discord.example/hook")
        );
    }

    #[test]
    fn blank_values_are_absent() {
        let creds = Credentials::from_lookup(lookup(&[("MODRINTH_API_KEY", "   ")]));
        assert_eq!(creds, Credentials::default());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let creds = Credentials::from_lookup(lookup(&[("GITHUB_TOKEN", "ghp_secret")]));
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("ghp_secret"));
        assert!(rendered.contains("github: \"<set>\""));
        assert!(rendered.contains("modrinth: \"<unset>\""));
    }

    #[test]
    fn dry_run_is_presence_based() {
        assert!(dry_run_from_lookup(lookup(&[("PUBLISH_DRY_RUN", "")])));
        assert!(dry_run_from_lookup(lookup(&[("PUBLISH_DRY_RUN", "false")])));
        assert!(!dry_run_from_lookup(lookup(&[])));
    }

    #[test]
    #[serial]
    fn from_env_reads_process_environment() {
        temp_env::with_vars(
            [
                (MODRINTH_TOKEN_ENV, Some("env-mrp")),
                (CURSEFORGE_TOKEN_ENV, None::<&str>),
                (DRY_RUN_ENV, Some("1")),
            ],
            || {
                let creds = Credentials::from_env();
                assert_eq!(creds.modrinth.as_deref(), Some("env-mrp"));
                assert!(creds.curseforge.is_none());
                assert!(dry_run_from_env());
            },
        );
    }
}
