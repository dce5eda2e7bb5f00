//! Configuration file handling.
//!
//! A single `config.toml` describes the destination calendar, the sync
//! window offsets, the daemon interval, and the list of subscriptions.
//! Source kinds are a tagged choice made here, at configuration time.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::constants::{DEFAULT_LOOKAHEAD_DAYS, DEFAULT_LOOKBACK_DAYS};
use crate::destination::RestDestination;
use crate::error::{MirrorError, MirrorResult};
use crate::source::{ApiSource, FeedSource, Source};
use crate::window::SyncWindow;

const CONFIG_DIR: &str = "calmirror";
const CONFIG_FILE: &str = "config.toml";
const DEFAULT_DAEMON_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MirrorConfig {
    pub destination: DestinationConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DestinationConfig {
    pub base_url: String,
    pub calendar_id: String,
    pub bearer_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    #[serde(default = "default_lookback")]
    pub lookback_days: i64,
    #[serde(default = "default_lookahead")]
    pub lookahead_days: i64,
    /// Daemon trigger interval, humantime syntax (`15m`, `1h 30m`).
    #[serde(default = "default_interval", deserialize_with = "parse_interval")]
    pub interval: Duration,
    /// Mapping store location; defaults to the platform data dir.
    pub state_dir: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            lookback_days: default_lookback(),
            lookahead_days: default_lookahead(),
            interval: default_interval(),
            state_dir: None,
        }
    }
}

impl SyncConfig {
    /// Fresh window from "now" with the configured offsets.
    pub fn window(&self) -> SyncWindow {
        SyncWindow::around_now(
            chrono::Duration::days(self.lookback_days),
            chrono::Duration::days(self.lookahead_days),
        )
    }

    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(CONFIG_DIR)
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionConfig {
    pub id: String,
    #[serde(flatten)]
    pub source: SourceConfig,
}

/// Tagged source selection.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    Feed { url: String },
    Api {
        events_url: String,
        bearer_token: Option<String>,
    },
}

impl SourceConfig {
    pub fn build(&self) -> MirrorResult<Source> {
        match self {
            SourceConfig::Feed { url } => Ok(Source::Feed(FeedSource::new(url.clone())?)),
            SourceConfig::Api {
                events_url,
                bearer_token,
            } => Ok(Source::Api(ApiSource::new(
                events_url.clone(),
                bearer_token.clone(),
            )?)),
        }
    }
}

impl MirrorConfig {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_DIR)
            .join(CONFIG_FILE)
    }

    pub fn load(path: &std::path::Path) -> MirrorResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            MirrorError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> MirrorResult<Self> {
        let config: MirrorConfig = toml::from_str(raw)
            .map_err(|e| MirrorError::Config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn destination(&self) -> MirrorResult<RestDestination> {
        RestDestination::new(
            self.destination.base_url.clone(),
            self.destination.calendar_id.clone(),
            self.destination.bearer_token.clone(),
        )
    }

    fn validate(&self) -> MirrorResult<()> {
        let mut seen = std::collections::HashSet::new();
        for subscription in &self.subscriptions {
            if subscription.id.trim().is_empty() {
                return Err(MirrorError::Config(
                    "subscription id must not be empty".to_string(),
                ));
            }
            if !seen.insert(subscription.id.as_str()) {
                return Err(MirrorError::Config(format!(
                    "duplicate subscription id '{}'",
                    subscription.id
                )));
            }
        }
        if self.sync.lookback_days < 0 || self.sync.lookahead_days < 0 {
            return Err(MirrorError::Config(
                "lookback/lookahead must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_lookback() -> i64 {
    DEFAULT_LOOKBACK_DAYS
}

fn default_lookahead() -> i64 {
    DEFAULT_LOOKAHEAD_DAYS
}

fn default_interval() -> Duration {
    DEFAULT_DAEMON_INTERVAL
}

fn parse_interval<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
        [destination]
        base_url = "https://calendar.example.com"
        calendar_id = "primary"
        bearer_token = "secret"

        [sync]
        lookback_days = 7
        lookahead_days = 60
        interval = "5m"

        [[subscriptions]]
        id = "team-feed"
        kind = "feed"
        url = "https://example.com/team.ics"

        [[subscriptions]]
        id = "work-api"
        kind = "api"
        events_url = "https://api.example.com/v1/events"
    "#;

    #[test]
    fn test_parse_full_config() {
        let config = MirrorConfig::parse(EXAMPLE).unwrap();
        assert_eq!(config.sync.lookback_days, 7);
        assert_eq!(config.sync.interval, Duration::from_secs(300));
        assert_eq!(config.subscriptions.len(), 2);
        assert!(matches!(
            config.subscriptions[0].source,
            SourceConfig::Feed { .. }
        ));
        assert!(matches!(
            config.subscriptions[1].source,
            SourceConfig::Api { .. }
        ));
    }

    #[test]
    fn test_defaults_apply_without_sync_section() {
        let config = MirrorConfig::parse(
            r#"
            [destination]
            base_url = "https://calendar.example.com"
            calendar_id = "primary"
            "#,
        )
        .unwrap();
        assert_eq!(config.sync.lookback_days, DEFAULT_LOOKBACK_DAYS);
        assert_eq!(config.sync.lookahead_days, DEFAULT_LOOKAHEAD_DAYS);
        assert_eq!(config.sync.interval, DEFAULT_DAEMON_INTERVAL);
        assert!(config.subscriptions.is_empty());
    }

    #[test]
    fn test_duplicate_subscription_ids_rejected() {
        let raw = r#"
            [destination]
            base_url = "https://calendar.example.com"
            calendar_id = "primary"

            [[subscriptions]]
            id = "dup"
            kind = "feed"
            url = "https://example.com/a.ics"

            [[subscriptions]]
            id = "dup"
            kind = "feed"
            url = "https://example.com/b.ics"
        "#;
        assert!(matches!(
            MirrorConfig::parse(raw),
            Err(MirrorError::Config(_))
        ));
    }

    #[test]
    fn test_bad_interval_rejected() {
        let raw = r#"
            [destination]
            base_url = "https://calendar.example.com"
            calendar_id = "primary"

            [sync]
            interval = "soon"
        "#;
        assert!(matches!(
            MirrorConfig::parse(raw),
            Err(MirrorError::Config(_))
        ));
    }

    #[test]
    fn test_window_offsets_respected() {
        let config = MirrorConfig::parse(EXAMPLE).unwrap();
        let window = config.sync.window();
        let span = window.end - window.start;
        assert_eq!(span, chrono::Duration::days(67));
    }
}
