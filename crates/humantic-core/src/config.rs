//! Humantic configuration system.
//!
//! One TOML file (`~/.humantic/config.toml` by default) with four sections:
//! `[paths]`, `[scheduler]`, `[bridge]`, `[notify]`. Every field has a default,
//! so an empty file is a valid configuration.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{HumanticError, Result};
use crate::traits::SettingsSource;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HumanticConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub scheduler: Settings,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

impl HumanticConfig {
    /// Load config from the default path (~/.humantic/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| HumanticError::Config(format!("Failed to read config: {e}")))?;
        Self::parse(&content)
    }

    /// Parse and validate TOML content.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| HumanticError::Config(format!("Failed to parse config: {e}")))?;
        config.scheduler.validate()?;
        Ok(config)
    }

    /// Save config to the given path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| HumanticError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Humantic home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".humantic")
    }
}

/// Expand `~` in a configured path.
pub fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

/// Where the checkpoint record is kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointBackend {
    /// JSON file, replaced atomically on every write.
    #[default]
    File,
    /// Single row in the scheduler database.
    Sqlite,
}

/// Filesystem locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_links_pool")]
    pub links_pool: String,
    #[serde(default = "default_checkpoint_file")]
    pub checkpoint_file: String,
    #[serde(default)]
    pub checkpoint_backend: CheckpointBackend,
}

fn default_database() -> String { "~/.humantic/humantic.db".into() }
fn default_links_pool() -> String { "~/.humantic/links_pool".into() }
fn default_checkpoint_file() -> String { "~/.humantic/humantic_state.json".into() }

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            links_pool: default_links_pool(),
            checkpoint_file: default_checkpoint_file(),
            checkpoint_backend: CheckpointBackend::default(),
        }
    }
}

impl PathsConfig {
    pub fn database_path(&self) -> PathBuf {
        expand_path(&self.database)
    }

    pub fn links_pool_dir(&self) -> PathBuf {
        expand_path(&self.links_pool)
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        expand_path(&self.checkpoint_file)
    }
}

/// Scheduler settings. Treated as read-only input and re-read at the start of every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Master switch for the periodic trigger.
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// Append leave-channel / leave-chat actions to each actor's list.
    #[serde(default = "bool_true")]
    pub include_leave: bool,
    #[serde(default = "default_run_interval_min_hours")]
    pub run_interval_min_hours: f64,
    #[serde(default = "default_run_interval_max_hours")]
    pub run_interval_max_hours: f64,
    /// How often the trigger loop checks whether a run is due.
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    /// Random pause between two actions of the same actor.
    #[serde(default = "default_delay_min_secs")]
    pub delay_min_secs: u64,
    #[serde(default = "default_delay_max_secs")]
    pub delay_max_secs: u64,
    /// Per-actor minimum spacing between actions ("grand policy").
    #[serde(default = "default_min_action_interval_ms")]
    pub min_action_interval_ms: u64,
    #[serde(default = "default_action_timeout_secs")]
    pub action_timeout_secs: u64,
    /// A checkpoint older than this starts a fresh run.
    #[serde(default = "default_checkpoint_freshness_secs")]
    pub checkpoint_freshness_secs: u64,
    /// Orchestrator pause after a flooded actor.
    #[serde(default = "default_flood_cooldown_min_secs")]
    pub flood_cooldown_min_secs: u64,
    #[serde(default = "default_flood_cooldown_max_secs")]
    pub flood_cooldown_max_secs: u64,
    /// Distinct flooded actors in one run that trigger a system-wide sleep.
    #[serde(default = "default_flood_system_sleep_threshold")]
    pub flood_system_sleep_threshold: u32,
    #[serde(default = "bool_true")]
    pub account_sleep_enabled: bool,
    #[serde(default = "default_account_sleep_min_days")]
    pub account_sleep_min_days: u32,
    #[serde(default = "default_account_sleep_max_days")]
    pub account_sleep_max_days: u32,
    #[serde(default = "bool_true")]
    pub system_sleep_enabled: bool,
    #[serde(default = "default_system_sleep_min_hours")]
    pub system_sleep_min_hours: f64,
    #[serde(default = "default_system_sleep_max_hours")]
    pub system_sleep_max_hours: f64,
    /// Send run/actor/action entries to the operator channel.
    #[serde(default)]
    pub activity_log: bool,
}

fn bool_true() -> bool { true }
fn default_run_interval_min_hours() -> f64 { 4.0 }
fn default_run_interval_max_hours() -> f64 { 6.0 }
fn default_check_interval_secs() -> u64 { 300 }
fn default_delay_min_secs() -> u64 { 15 }
fn default_delay_max_secs() -> u64 { 45 }
fn default_min_action_interval_ms() -> u64 { 1000 }
fn default_action_timeout_secs() -> u64 { 60 }
fn default_checkpoint_freshness_secs() -> u64 { 2 * 3600 }
fn default_flood_cooldown_min_secs() -> u64 { 30 }
fn default_flood_cooldown_max_secs() -> u64 { 90 }
fn default_flood_system_sleep_threshold() -> u32 { 2 }
fn default_account_sleep_min_days() -> u32 { 3 }
fn default_account_sleep_max_days() -> u32 { 5 }
fn default_system_sleep_min_hours() -> f64 { 24.0 }
fn default_system_sleep_max_hours() -> f64 { 24.0 }

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            include_leave: true,
            run_interval_min_hours: default_run_interval_min_hours(),
            run_interval_max_hours: default_run_interval_max_hours(),
            check_interval_secs: default_check_interval_secs(),
            delay_min_secs: default_delay_min_secs(),
            delay_max_secs: default_delay_max_secs(),
            min_action_interval_ms: default_min_action_interval_ms(),
            action_timeout_secs: default_action_timeout_secs(),
            checkpoint_freshness_secs: default_checkpoint_freshness_secs(),
            flood_cooldown_min_secs: default_flood_cooldown_min_secs(),
            flood_cooldown_max_secs: default_flood_cooldown_max_secs(),
            flood_system_sleep_threshold: default_flood_system_sleep_threshold(),
            account_sleep_enabled: true,
            account_sleep_min_days: default_account_sleep_min_days(),
            account_sleep_max_days: default_account_sleep_max_days(),
            system_sleep_enabled: true,
            system_sleep_min_hours: default_system_sleep_min_hours(),
            system_sleep_max_hours: default_system_sleep_max_hours(),
            activity_log: false,
        }
    }
}

/// Upper bound for hour-valued windows (run interval, system sleep): one year.
pub const MAX_WINDOW_HOURS: f64 = 8760.0;
/// Upper bound for an actor's flood sleep.
pub const MAX_ACCOUNT_SLEEP_DAYS: u32 = 365;

impl Settings {
    /// Reject inverted ranges and values that would disable the safety rails.
    pub fn validate(&self) -> Result<()> {
        let ranges = [
            (
                "run_interval_*_hours",
                self.run_interval_min_hours,
                self.run_interval_max_hours,
                MAX_WINDOW_HOURS,
            ),
            ("delay_*_secs", self.delay_min_secs as f64, self.delay_max_secs as f64, f64::MAX),
            (
                "flood_cooldown_*_secs",
                self.flood_cooldown_min_secs as f64,
                self.flood_cooldown_max_secs as f64,
                f64::MAX,
            ),
            (
                "account_sleep_*_days",
                self.account_sleep_min_days as f64,
                self.account_sleep_max_days as f64,
                MAX_ACCOUNT_SLEEP_DAYS as f64,
            ),
            (
                "system_sleep_*_hours",
                self.system_sleep_min_hours,
                self.system_sleep_max_hours,
                MAX_WINDOW_HOURS,
            ),
        ];
        for (name, min, max, limit) in ranges {
            if !(min >= 0.0 && min <= max) {
                return Err(HumanticError::Config(format!(
                    "{name}: min ({min}) must be >= 0 and <= max ({max})"
                )));
            }
            if !max.is_finite() || max > limit {
                return Err(HumanticError::Config(format!(
                    "{name}: max ({max}) must not exceed {limit}"
                )));
            }
        }
        if self.flood_system_sleep_threshold == 0 {
            return Err(HumanticError::Config(
                "flood_system_sleep_threshold must be at least 1".into(),
            ));
        }
        if self.action_timeout_secs == 0 {
            return Err(HumanticError::Config("action_timeout_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn min_action_interval(&self) -> Duration {
        Duration::from_millis(self.min_action_interval_ms)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }

    pub fn checkpoint_freshness(&self) -> Duration {
        Duration::from_secs(self.checkpoint_freshness_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(1))
    }
}

/// How actions reach the remote service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeMode {
    /// Log every action and report success. Nothing leaves the process.
    #[default]
    DryRun,
    /// Forward actions to the protocol sidecar over HTTP.
    Http,
}

/// Execution bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub mode: BridgeMode,
    #[serde(default = "default_bridge_url")]
    pub base_url: String,
    /// Bearer token sent to the sidecar, if it requires one.
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Text sent by `send_message` actions.
    #[serde(default = "default_message_text")]
    pub message_text: String,
}

fn default_bridge_url() -> String { "http://127.0.0.1:8765".into() }
fn default_request_timeout_secs() -> u64 { 30 }
fn default_message_text() -> String { "Hi".into() }

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            mode: BridgeMode::default(),
            base_url: default_bridge_url(),
            api_token: None,
            request_timeout_secs: default_request_timeout_secs(),
            message_text: default_message_text(),
        }
    }
}

/// Operator notification targets. Empty values disable a target.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub telegram_bot_token: String,
    #[serde(default)]
    pub telegram_chat_id: String,
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default)]
    pub webhook_headers: BTreeMap<String, String>,
}

/// Settings source backed by the config file. The file is re-read on every call,
/// so edits take effect at the next run without a restart.
pub struct ConfigFileSettings {
    path: PathBuf,
}

impl ConfigFileSettings {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

#[async_trait]
impl SettingsSource for ConfigFileSettings {
    async fn load_settings(&self) -> Result<Settings> {
        if !self.path.exists() {
            tracing::debug!("📄 {} missing, default run settings", self.path.display());
            return Ok(Settings::default());
        }
        let settings = HumanticConfig::load_from(&self.path)?.scheduler;
        tracing::debug!("📄 Run settings reloaded from {}", self.path.display());
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = HumanticConfig::parse("").unwrap();
        assert_eq!(config.scheduler, Settings::default());
        assert_eq!(config.scheduler.flood_system_sleep_threshold, 2);
        assert_eq!(config.scheduler.checkpoint_freshness(), Duration::from_secs(7200));
        assert_eq!(config.scheduler.min_action_interval(), Duration::from_secs(1));
        assert_eq!(config.bridge.mode, BridgeMode::DryRun);
        assert_eq!(config.paths.checkpoint_backend, CheckpointBackend::File);
    }

    #[test]
    fn test_partial_scheduler_section() {
        let config = HumanticConfig::parse(
            r#"
            [scheduler]
            include_leave = false
            delay_min_secs = 1
            delay_max_secs = 2

            [paths]
            checkpoint_backend = "sqlite"
            "#,
        )
        .unwrap();
        assert!(!config.scheduler.include_leave);
        assert_eq!(config.scheduler.delay_max_secs, 2);
        assert_eq!(config.scheduler.account_sleep_min_days, 3);
        assert_eq!(config.paths.checkpoint_backend, CheckpointBackend::Sqlite);
    }

    #[test]
    fn test_inverted_range_rejected() {
        let err = HumanticConfig::parse(
            r#"
            [scheduler]
            delay_min_secs = 50
            delay_max_secs = 10
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("delay_*_secs"));
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let settings = Settings {
            flood_system_sleep_threshold: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_oversized_windows_rejected() {
        let endless_actor_sleep = Settings {
            account_sleep_min_days: u32::MAX,
            account_sleep_max_days: u32::MAX,
            ..Settings::default()
        };
        assert!(endless_actor_sleep.validate().is_err());

        let huge_system_sleep = Settings {
            system_sleep_min_hours: 1e13,
            system_sleep_max_hours: 1e13,
            ..Settings::default()
        };
        assert!(huge_system_sleep.validate().is_err());

        let huge_interval = Settings {
            run_interval_max_hours: MAX_WINDOW_HOURS + 1.0,
            ..Settings::default()
        };
        assert!(huge_interval.validate().is_err());

        let at_limits = Settings {
            account_sleep_max_days: MAX_ACCOUNT_SLEEP_DAYS,
            system_sleep_max_hours: MAX_WINDOW_HOURS,
            run_interval_max_hours: MAX_WINDOW_HOURS,
            ..Settings::default()
        };
        assert!(at_limits.validate().is_ok());
    }

    #[test]
    fn test_infinite_window_rejected() {
        let err = HumanticConfig::parse(
            r#"
            [scheduler]
            system_sleep_max_hours = inf
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("system_sleep_*_hours"));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = HumanticConfig::default();
        config.scheduler.activity_log = true;
        config.notify.telegram_chat_id = "-100123".into();
        config.save_to(&path).unwrap();

        let loaded = HumanticConfig::load_from(&path).unwrap();
        assert!(loaded.scheduler.activity_log);
        assert_eq!(loaded.notify.telegram_chat_id, "-100123");
    }

    #[tokio::test]
    async fn test_config_file_settings_rereads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let source = ConfigFileSettings::new(&path);
        assert_eq!(source.load_settings().await.unwrap(), Settings::default());

        std::fs::write(&path, "[scheduler]\nenabled = false\n").unwrap();
        assert!(!source.load_settings().await.unwrap().enabled);
    }
}
