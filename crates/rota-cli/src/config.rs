//! TOML configuration for the `rota` binary.
//!
//! Every setting except the two sets of API credentials has a default, so a
//! minimal file only carries `[planning_center]` and `[slack]` secrets.

use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use rota_core::{
    lookahead_from_hours, AnchorWeekday, IdentityMatcher, WindowConfigError,
    LINK_ACCEPTANCE_THRESHOLD, MAX_CHANNEL_NAME_PROBES,
};
use rota_planning_center::{PlanningCenterConfig, DEFAULT_PLANNING_CENTER_API_BASE};
use rota_slack::{SlackClientConfig, DEFAULT_SLACK_API_BASE};
use rota_sync::{
    ChannelLifecycleConfig, RosterImportConfig, SyncConfig, DEFAULT_PROPAGATION_DELAY_SECONDS,
};
use serde::Deserialize;
use thiserror::Error;

const CONFIG_FILE_NAME: &str = "config.toml";
const SYSTEM_CONFIG_PATH: &str = "/etc/rota/config.toml";

const DEFAULT_DATABASE_PATH: &str = "rota.sqlite";
const DEFAULT_LOOKAHEAD_HOURS: i64 = 192;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_RETRY_MAX_ATTEMPTS: usize = 3;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 500;

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("no config file found; tried {}", display_paths(.0))]
    NotFound(Vec<PathBuf>),
    #[error("failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error(transparent)]
    Window(#[from] WindowConfigError),
    #[error("missing required setting `{0}`")]
    MissingSetting(&'static str),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RotaConfig {
    #[serde(default)]
    pub(crate) database: DatabaseSection,
    #[serde(default)]
    pub(crate) planning_center: PlanningCenterSection,
    #[serde(default)]
    pub(crate) slack: SlackSection,
    #[serde(default)]
    pub(crate) sync: SyncSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct DatabaseSection {
    #[serde(default = "default_database_path")]
    pub(crate) path: PathBuf,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct PlanningCenterSection {
    #[serde(default = "default_planning_center_api_base")]
    pub(crate) api_base: String,
    #[serde(default)]
    pub(crate) app_id: String,
    #[serde(default)]
    pub(crate) secret: String,
    /// Service types whose plans are imported. Empty means all of them.
    #[serde(default)]
    pub(crate) service_type_ids: Vec<u64>,
    #[serde(default = "default_request_timeout_ms")]
    pub(crate) request_timeout_ms: u64,
    #[serde(default = "default_retry_max_attempts")]
    pub(crate) retry_max_attempts: usize,
    #[serde(default = "default_retry_base_delay_ms")]
    pub(crate) retry_base_delay_ms: u64,
}

impl Default for PlanningCenterSection {
    fn default() -> Self {
        Self {
            api_base: default_planning_center_api_base(),
            app_id: String::new(),
            secret: String::new(),
            service_type_ids: Vec::new(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            retry_max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SlackSection {
    #[serde(default = "default_slack_api_base")]
    pub(crate) api_base: String,
    #[serde(default)]
    pub(crate) bot_token: String,
    /// Accounts invited to every channel before the assignees.
    #[serde(default)]
    pub(crate) sticky_account_ids: Vec<String>,
    #[serde(default = "default_true")]
    pub(crate) private_channels: bool,
    #[serde(default = "default_request_timeout_ms")]
    pub(crate) request_timeout_ms: u64,
    #[serde(default = "default_retry_max_attempts")]
    pub(crate) retry_max_attempts: usize,
    #[serde(default = "default_retry_base_delay_ms")]
    pub(crate) retry_base_delay_ms: u64,
}

impl Default for SlackSection {
    fn default() -> Self {
        Self {
            api_base: default_slack_api_base(),
            bot_token: String::new(),
            sticky_account_ids: Vec::new(),
            private_channels: true,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            retry_max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SyncSection {
    #[serde(default = "default_lookahead_hours")]
    pub(crate) lookahead_hours: i64,
    /// -1 disables anchoring; 0..=6 pins the window start to Sunday..Saturday.
    #[serde(default = "default_anchor_weekday")]
    pub(crate) anchor_weekday: i64,
    #[serde(default = "default_propagation_delay_seconds")]
    pub(crate) propagation_delay_seconds: u64,
    #[serde(default = "default_match_threshold")]
    pub(crate) match_threshold: u32,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            lookahead_hours: DEFAULT_LOOKAHEAD_HOURS,
            anchor_weekday: -1,
            propagation_delay_seconds: DEFAULT_PROPAGATION_DELAY_SECONDS,
            match_threshold: LINK_ACCEPTANCE_THRESHOLD,
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from(DEFAULT_DATABASE_PATH)
}

fn default_planning_center_api_base() -> String {
    DEFAULT_PLANNING_CENTER_API_BASE.to_string()
}

fn default_slack_api_base() -> String {
    DEFAULT_SLACK_API_BASE.to_string()
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_retry_max_attempts() -> usize {
    DEFAULT_RETRY_MAX_ATTEMPTS
}

fn default_retry_base_delay_ms() -> u64 {
    DEFAULT_RETRY_BASE_DELAY_MS
}

fn default_lookahead_hours() -> i64 {
    DEFAULT_LOOKAHEAD_HOURS
}

fn default_anchor_weekday() -> i64 {
    -1
}

fn default_propagation_delay_seconds() -> u64 {
    DEFAULT_PROPAGATION_DELAY_SECONDS
}

fn default_match_threshold() -> u32 {
    LINK_ACCEPTANCE_THRESHOLD
}

fn default_true() -> bool {
    true
}

impl RotaConfig {
    pub(crate) fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub(crate) fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Checks everything a sync run needs. Listing channels only needs the database.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.planning_center.app_id.trim().is_empty() {
            return Err(ConfigError::MissingSetting("planning_center.app_id"));
        }
        if self.planning_center.secret.trim().is_empty() {
            return Err(ConfigError::MissingSetting("planning_center.secret"));
        }
        if self.slack.bot_token.trim().is_empty() {
            return Err(ConfigError::MissingSetting("slack.bot_token"));
        }
        self.sync_config().map(|_| ())
    }

    pub(crate) fn sync_config(&self) -> Result<SyncConfig, ConfigError> {
        let lookahead = lookahead_from_hours(self.sync.lookahead_hours)?;
        let anchor = AnchorWeekday::from_config(self.sync.anchor_weekday)?;
        Ok(SyncConfig {
            roster: RosterImportConfig {
                service_type_ids: self.planning_center.service_type_ids.clone(),
            },
            lookahead,
            anchor,
            matcher: IdentityMatcher::new(self.sync.match_threshold),
            lifecycle: ChannelLifecycleConfig {
                sticky_account_ids: self.slack.sticky_account_ids.clone(),
                propagation_delay: StdDuration::from_secs(self.sync.propagation_delay_seconds),
                private_channels: self.slack.private_channels,
                max_name_probes: MAX_CHANNEL_NAME_PROBES,
            },
        })
    }

    pub(crate) fn planning_center_client_config(&self) -> PlanningCenterConfig {
        let section = &self.planning_center;
        PlanningCenterConfig {
            api_base: section.api_base.clone(),
            app_id: section.app_id.clone(),
            secret: section.secret.clone(),
            request_timeout_ms: section.request_timeout_ms,
            retry_max_attempts: section.retry_max_attempts,
            retry_base_delay_ms: section.retry_base_delay_ms,
        }
    }

    pub(crate) fn slack_client_config(&self) -> SlackClientConfig {
        let section = &self.slack;
        SlackClientConfig {
            api_base: section.api_base.clone(),
            bot_token: section.bot_token.clone(),
            request_timeout_ms: section.request_timeout_ms,
            retry_max_attempts: section.retry_max_attempts,
            retry_base_delay_ms: section.retry_base_delay_ms,
        }
    }
}

/// Default search order when no path is given explicitly.
pub(crate) fn default_config_candidates(home: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(home) = home {
        candidates.push(home.join(".config").join("rota").join(CONFIG_FILE_NAME));
    }
    candidates.push(PathBuf::from(SYSTEM_CONFIG_PATH));
    candidates
}

/// An explicit path wins even when it does not exist, so the read error names it.
pub(crate) fn locate_config(
    explicit: Option<&Path>,
    candidates: &[PathBuf],
) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    candidates
        .iter()
        .find(|candidate| candidate.is_file())
        .cloned()
        .ok_or_else(|| ConfigError::NotFound(candidates.to_vec()))
}

pub(crate) fn load_config(explicit: Option<&Path>) -> Result<(PathBuf, RotaConfig), ConfigError> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let candidates = default_config_candidates(home.as_deref());
    let path = locate_config(explicit, &candidates)?;
    let config = RotaConfig::from_file(&path)?;
    tracing::debug!(path = %path.display(), "loaded config");
    Ok((path, config))
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::time::Duration as StdDuration;

    use chrono::Duration;
    use rota_core::{AnchorWeekday, WindowConfigError};
    use tempfile::tempdir;

    use super::{default_config_candidates, locate_config, ConfigError, RotaConfig};

    const MINIMAL: &str = r#"
[planning_center]
app_id = "app"
secret = "shh"

[slack]
bot_token = "xoxb-test"
"#;

    #[test]
    fn unit_minimal_file_takes_documented_defaults() {
        let config = RotaConfig::from_toml(MINIMAL).expect("parse");
        config.validate().expect("valid");

        assert_eq!(config.database.path, PathBuf::from("rota.sqlite"));
        assert_eq!(config.planning_center.api_base, "https://api.planningcenteronline.com");
        assert_eq!(config.slack.api_base, "https://slack.com/api");
        assert_eq!(config.slack.request_timeout_ms, 10_000);
        assert_eq!(config.planning_center.retry_max_attempts, 3);
        assert_eq!(config.planning_center.retry_base_delay_ms, 500);
        assert!(config.slack.private_channels);

        let sync = config.sync_config().expect("sync config");
        assert_eq!(sync.lookahead, Duration::hours(192));
        assert_eq!(sync.anchor, None);
        assert_eq!(sync.matcher.threshold(), 7);
        assert_eq!(sync.lifecycle.propagation_delay, StdDuration::from_secs(120));
        assert!(sync.roster.service_type_ids.is_empty());
    }

    #[test]
    fn functional_full_file_maps_into_runtime_settings() {
        let config = RotaConfig::from_toml(
            r#"
[database]
path = "/var/lib/rota/rota.sqlite"

[planning_center]
app_id = "app"
secret = "shh"
service_type_ids = [10, 20]
retry_max_attempts = 5

[slack]
bot_token = "xoxb-test"
sticky_account_ids = ["UADMIN"]
private_channels = false

[sync]
lookahead_hours = 48
anchor_weekday = 0
propagation_delay_seconds = 0
"#,
        )
        .expect("parse");
        config.validate().expect("valid");

        let sync = config.sync_config().expect("sync config");
        assert_eq!(sync.roster.service_type_ids, vec![10, 20]);
        assert_eq!(sync.lookahead, Duration::hours(48));
        assert_eq!(sync.anchor, Some(AnchorWeekday::new(0).expect("anchor")));
        assert_eq!(sync.lifecycle.sticky_account_ids, vec!["UADMIN".to_string()]);
        assert!(!sync.lifecycle.private_channels);
        assert!(sync.lifecycle.propagation_delay.is_zero());
        assert_eq!(config.planning_center_client_config().retry_max_attempts, 5);
        assert_eq!(config.slack_client_config().bot_token, "xoxb-test");
    }

    #[test]
    fn regression_out_of_range_anchor_and_zero_lookahead_are_rejected() {
        let config = RotaConfig::from_toml(&format!("{MINIMAL}\n[sync]\nanchor_weekday = 7\n"))
            .expect("parse");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Window(WindowConfigError::AnchorWeekdayOutOfRange(7)))
        ));

        let config = RotaConfig::from_toml(&format!("{MINIMAL}\n[sync]\nlookahead_hours = 0\n"))
            .expect("parse");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Window(WindowConfigError::NonPositiveLookahead(0)))
        ));
    }

    #[test]
    fn regression_huge_lookahead_is_a_config_error() {
        for hours in ["3000000000", "9223372036854775807"] {
            let config = RotaConfig::from_toml(&format!(
                "{MINIMAL}\n[sync]\nlookahead_hours = {hours}\n"
            ))
            .expect("parse");
            let error = config.validate().expect_err("oversized lookahead");
            assert!(matches!(
                error,
                ConfigError::Window(WindowConfigError::LookaheadTooLarge(_))
            ));
            assert!(error.to_string().contains(hours));
        }
    }

    #[test]
    fn regression_missing_credentials_are_named() {
        let config = RotaConfig::from_toml("[slack]\nbot_token = \"xoxb\"\n").expect("parse");
        let error = config.validate().expect_err("missing app id");
        assert!(error.to_string().contains("planning_center.app_id"));

        let config = RotaConfig::from_toml("[planning_center]\napp_id = \"a\"\nsecret = \"b\"\n")
            .expect("parse");
        let error = config.validate().expect_err("missing token");
        assert!(error.to_string().contains("slack.bot_token"));
    }

    #[test]
    fn regression_unknown_keys_fail_to_parse() {
        assert!(matches!(
            RotaConfig::from_toml("[sync]\nlookahead = 3\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn unit_candidates_follow_local_home_system_order() {
        let candidates = default_config_candidates(Some(Path::new("/home/rota")));
        assert_eq!(
            candidates,
            vec![
                PathBuf::from("config.toml"),
                PathBuf::from("/home/rota/.config/rota/config.toml"),
                PathBuf::from("/etc/rota/config.toml"),
            ]
        );
        assert_eq!(default_config_candidates(None).len(), 2);
    }

    #[test]
    fn functional_locate_picks_first_existing_candidate() {
        let dir = tempdir().expect("tempdir");
        let missing = dir.path().join("missing.toml");
        let home = dir.path().join("home.toml");
        let system = dir.path().join("system.toml");
        std::fs::write(&home, MINIMAL).expect("write home");
        std::fs::write(&system, MINIMAL).expect("write system");

        let candidates = vec![missing.clone(), home.clone(), system];
        assert_eq!(locate_config(None, &candidates).expect("locate"), home);

        let explicit = dir.path().join("explicit.toml");
        assert_eq!(
            locate_config(Some(&explicit), &candidates).expect("explicit"),
            explicit
        );

        let error = locate_config(None, &[missing]).expect_err("nothing found");
        assert!(error.to_string().contains("missing.toml"));
    }

    #[test]
    fn regression_unreadable_explicit_path_reports_the_path() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("absent.toml");
        let error = RotaConfig::from_file(&path).expect_err("absent");
        assert!(matches!(error, ConfigError::Io { .. }));
        assert!(error.to_string().contains("absent.toml"));
    }
}
