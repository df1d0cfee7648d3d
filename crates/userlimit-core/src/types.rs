use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Option key holding the maximum number of users to keep.
pub const RETENTION_COUNT_KEY: &str = "retention_count";
/// Option key holding the eviction schedule token.
pub const SCHEDULE_INTERVAL_KEY: &str = "schedule_interval";

/// Keep count written on activation when no other default is configured.
pub const DEFAULT_KEEP_COUNT: i64 = 100;
/// Smallest keep count the settings layer will ever store.
pub const MIN_KEEP_COUNT: i64 = 1;

/// Hook name the eviction job is scheduled under. At most one job exists per hook.
pub const USER_CHECK_HOOK: &str = "user_limit_check";

/// Recurrence of the eviction job. These four are the only legal values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleInterval {
    #[serde(rename = "every_15_min")]
    Every15Min,
    #[default]
    Hourly,
    Daily,
    Weekly,
}

impl ScheduleInterval {
    /// Every legal interval, shortest first.
    pub const ALL: [ScheduleInterval; 4] = [
        ScheduleInterval::Every15Min,
        ScheduleInterval::Hourly,
        ScheduleInterval::Daily,
        ScheduleInterval::Weekly,
    ];

    pub fn as_secs(&self) -> u64 {
        match self {
            ScheduleInterval::Every15Min => 15 * 60,
            ScheduleInterval::Hourly => 60 * 60,
            ScheduleInterval::Daily => 24 * 60 * 60,
            ScheduleInterval::Weekly => 7 * 24 * 60 * 60,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.as_secs())
    }

    /// Same span as [`duration`](Self::duration), for timestamp arithmetic.
    pub fn chrono_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.as_secs() as i64)
    }

    /// Wire token, as stored in the options table and accepted on the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleInterval::Every15Min => "every_15_min",
            ScheduleInterval::Hourly => "hourly",
            ScheduleInterval::Daily => "daily",
            ScheduleInterval::Weekly => "weekly",
        }
    }

    /// Human label shown next to the token in listings.
    pub fn display_name(&self) -> &'static str {
        match self {
            ScheduleInterval::Every15Min => "Every Fifteen Minutes",
            ScheduleInterval::Hourly => "Hourly",
            ScheduleInterval::Daily => "Daily",
            ScheduleInterval::Weekly => "Weekly",
        }
    }
}

impl fmt::Display for ScheduleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ScheduleInterval {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "every_15_min" => Ok(ScheduleInterval::Every15Min),
            "hourly" => Ok(ScheduleInterval::Hourly),
            "daily" => Ok(ScheduleInterval::Daily),
            "weekly" => Ok(ScheduleInterval::Weekly),
            other => Err(format!("unknown schedule interval: {}", other)),
        }
    }
}

/// The two settings the host may change at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKey {
    RetentionCount,
    ScheduleInterval,
}

impl OptionKey {
    pub const ALL: [OptionKey; 2] = [OptionKey::RetentionCount, OptionKey::ScheduleInterval];

    pub fn as_str(&self) -> &'static str {
        match self {
            OptionKey::RetentionCount => RETENTION_COUNT_KEY,
            OptionKey::ScheduleInterval => SCHEDULE_INTERVAL_KEY,
        }
    }
}

impl fmt::Display for OptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OptionKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            RETENTION_COUNT_KEY => Ok(OptionKey::RetentionCount),
            SCHEDULE_INTERVAL_KEY => Ok(OptionKey::ScheduleInterval),
            other => Err(format!("unknown option: {}", other)),
        }
    }
}

/// Snapshot of both settings as currently stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionSettings {
    /// Raw stored count. The settings layer never writes values below 1, but
    /// an externally edited row may still read back as 0 or negative.
    pub keep_count: i64,
    pub schedule_interval: ScheduleInterval,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            keep_count: DEFAULT_KEEP_COUNT,
            schedule_interval: ScheduleInterval::default(),
        }
    }
}
