use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{ScheduleInterval, DEFAULT_KEEP_COUNT, MIN_KEEP_COUNT};

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 1;

/// Top-level config (userlimit.toml + USERLIMIT_* env overrides).
///
/// Only the seed values live here. The runtime settings an administrator
/// edits are kept in the options table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserLimitConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Values written to the options table on activation when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_keep_count")]
    pub keep_count: i64,
    #[serde(default)]
    pub schedule_interval: ScheduleInterval,
}

impl DefaultsConfig {
    /// Configured keep count, never below [`MIN_KEEP_COUNT`].
    pub fn keep_count(&self) -> i64 {
        self.keep_count.max(MIN_KEEP_COUNT)
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            keep_count: DEFAULT_KEEP_COUNT,
            schedule_interval: ScheduleInterval::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How often the engine checks for due jobs.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

fn default_keep_count() -> i64 {
    DEFAULT_KEEP_COUNT
}
fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.userlimit/userlimit.db", home)
}

impl UserLimitConfig {
    /// Load config from a TOML file with USERLIMIT_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. $USERLIMIT_CONFIG
    ///   3. ~/.userlimit/userlimit.toml
    ///
    /// A missing file is fine; every field has a default. Nested env keys use
    /// a double underscore, e.g. `USERLIMIT_DEFAULTS__KEEP_COUNT=50`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("USERLIMIT_CONFIG").ok())
            .unwrap_or_else(default_config_path);
        debug!(%path, "loading config");

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::UserLimitError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::from(Serialized::defaults(UserLimitConfig::default()))
            .merge(Toml::file(path))
            .merge(
                Env::prefixed("USERLIMIT_")
                    .ignore(&["CONFIG"])
                    .split("__"),
            )
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.userlimit/userlimit.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let cfg = UserLimitConfig::figment(path.to_str().unwrap())
            .extract::<UserLimitConfig>()
            .unwrap();
        assert_eq!(cfg.defaults.keep_count, DEFAULT_KEEP_COUNT);
        assert_eq!(cfg.defaults.schedule_interval, ScheduleInterval::Hourly);
        assert_eq!(cfg.scheduler.poll_interval_secs, 1);
        assert!(cfg.database.path.ends_with("userlimit.db"));
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("userlimit.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            "[database]\npath = \"/tmp/x.db\"\n\n[defaults]\nkeep_count = 25\nschedule_interval = \"weekly\""
        )
        .unwrap();

        let cfg = UserLimitConfig::load(path.to_str()).unwrap();
        assert_eq!(cfg.database.path, "/tmp/x.db");
        assert_eq!(cfg.defaults.keep_count, 25);
        assert_eq!(cfg.defaults.schedule_interval, ScheduleInterval::Weekly);
    }

    #[test]
    fn bad_interval_in_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("userlimit.toml");
        std::fs::write(&path, "[defaults]\nschedule_interval = \"monthly\"\n").unwrap();

        let err = UserLimitConfig::load(path.to_str()).unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn seed_keep_count_is_clamped() {
        let d = DefaultsConfig {
            keep_count: -4,
            schedule_interval: ScheduleInterval::Daily,
        };
        assert_eq!(d.keep_count(), 1);
    }
}
