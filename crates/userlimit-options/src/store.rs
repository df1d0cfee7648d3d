use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info, instrument, warn};
use userlimit_core::time::format_ts;
use userlimit_core::types::{
    OptionKey, RetentionSettings, ScheduleInterval, DEFAULT_KEEP_COUNT, MIN_KEEP_COUNT,
};

use crate::db::init_db;
use crate::error::{OptionsError, Result};

/// Row recording that the limiter is activated. Kept apart from the two
/// settings so `clear` does not touch it, and not reachable through `set`.
const ACTIVATION_MARKER: &str = "activated_at";

/// Outcome of a successful [`OptionsStore::set`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionChange {
    pub key: OptionKey,
    /// Value stored before the write, `None` if the key was absent.
    pub old: Option<String>,
    /// Normalised value now stored.
    pub new: String,
    /// False when the write stored the same value that was already there.
    pub changed: bool,
}

/// SQLite-backed settings store.
///
/// Wraps a single connection in a `Mutex`; individual get/set calls are the
/// unit of atomicity, which is all the settings need.
pub struct OptionsStore {
    db: Mutex<Connection>,
}

impl OptionsStore {
    /// Wrap `conn`, creating the `options` table if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Raw stored value for `key`, or its documented default when unset.
    ///
    /// Never fails: a database error is logged and the default returned.
    pub fn get(&self, key: OptionKey) -> String {
        match self.raw(key) {
            Ok(Some(v)) => v,
            Ok(None) => default_value(key),
            Err(e) => {
                warn!(%key, error = %e, "option read failed, using default");
                default_value(key)
            }
        }
    }

    /// The stored keep count.
    ///
    /// Values written through [`set`](Self::set) are always >= 1, but the row
    /// may have been edited externally. A non-integer value reads as 0 so the
    /// eviction guard skips the run instead of guessing.
    pub fn keep_count(&self) -> i64 {
        let raw = self.get(OptionKey::RetentionCount);
        match raw.trim().parse::<i64>() {
            Ok(n) => n,
            Err(_) => {
                warn!(value = %raw, "stored retention count is not an integer");
                0
            }
        }
    }

    /// The stored schedule interval; an unrecognised token reads as the default.
    pub fn schedule_interval(&self) -> ScheduleInterval {
        let raw = self.get(OptionKey::ScheduleInterval);
        raw.parse().unwrap_or_else(|_| {
            warn!(value = %raw, "stored schedule interval is not recognised");
            ScheduleInterval::default()
        })
    }

    pub fn snapshot(&self) -> RetentionSettings {
        RetentionSettings {
            keep_count: self.keep_count(),
            schedule_interval: self.schedule_interval(),
        }
    }

    /// Validate and store `value` under `key`.
    ///
    /// The retention count must be an integer and is clamped to at least 1.
    /// The schedule interval must be one of the four legal tokens. On any
    /// validation failure nothing is written.
    #[instrument(skip(self))]
    pub fn set(&self, key: &str, value: &str) -> Result<OptionChange> {
        let key: OptionKey = key
            .parse()
            .map_err(|_| OptionsError::UnknownKey(key.to_string()))?;
        let new = normalise(key, value)?;

        let db = self.conn();
        let old: Option<String> = db
            .query_row(
                "SELECT value FROM options WHERE name = ?1",
                [key.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        let changed = old.as_deref() != Some(new.as_str());
        if changed {
            db.execute(
                "INSERT INTO options (name, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(name) DO UPDATE SET value = excluded.value,
                                                 updated_at = excluded.updated_at",
                rusqlite::params![key.as_str(), new, format_ts(chrono::Utc::now())],
            )?;
            info!(%key, old = ?old, new = %new, "option updated");
        } else {
            debug!(%key, "option unchanged");
        }

        Ok(OptionChange {
            key,
            old,
            new,
            changed,
        })
    }

    /// Store both settings unless already present. Existing values are kept.
    #[instrument(skip(self))]
    pub fn initialize_defaults(&self, keep_count: i64, interval: ScheduleInterval) -> Result<()> {
        let now = format_ts(chrono::Utc::now());
        let keep_count = keep_count.max(MIN_KEEP_COUNT).to_string();
        let db = self.conn();
        let mut inserted = 0;
        for (key, value) in [
            (OptionKey::RetentionCount, keep_count.as_str()),
            (OptionKey::ScheduleInterval, interval.as_str()),
        ] {
            inserted += db.execute(
                "INSERT OR IGNORE INTO options (name, value, updated_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![key.as_str(), value, now],
            )?;
        }
        if inserted > 0 {
            info!(inserted, "default options written");
        }
        Ok(())
    }

    /// Remove both settings; subsequent reads return defaults.
    #[instrument(skip(self))]
    pub fn clear(&self) -> Result<()> {
        let db = self.conn();
        let n = db.execute(
            "DELETE FROM options WHERE name IN (?1, ?2)",
            [
                OptionKey::RetentionCount.as_str(),
                OptionKey::ScheduleInterval.as_str(),
            ],
        )?;
        info!(removed = n, "options cleared");
        Ok(())
    }

    /// Record that the limiter is active. Re-activating refreshes the timestamp.
    #[instrument(skip(self))]
    pub fn mark_active(&self) -> Result<()> {
        self.conn().execute(
            "INSERT INTO options (name, value, updated_at) VALUES (?1, ?2, ?2)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value,
                                             updated_at = excluded.updated_at",
            rusqlite::params![ACTIVATION_MARKER, format_ts(chrono::Utc::now())],
        )?;
        Ok(())
    }

    /// Drop the activation marker. Returns `true` if it was present.
    #[instrument(skip(self))]
    pub fn mark_inactive(&self) -> Result<bool> {
        let n = self
            .conn()
            .execute("DELETE FROM options WHERE name = ?1", [ACTIVATION_MARKER])?;
        Ok(n > 0)
    }

    /// Whether the limiter has been activated and not since deactivated.
    pub fn is_active(&self) -> Result<bool> {
        let found = self
            .conn()
            .query_row(
                "SELECT 1 FROM options WHERE name = ?1",
                [ACTIVATION_MARKER],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn raw(&self, key: OptionKey) -> Result<Option<String>> {
        let db = self.conn();
        let value = db
            .query_row(
                "SELECT value FROM options WHERE name = ?1",
                [key.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn default_value(key: OptionKey) -> String {
    match key {
        OptionKey::RetentionCount => DEFAULT_KEEP_COUNT.to_string(),
        OptionKey::ScheduleInterval => ScheduleInterval::default().to_string(),
    }
}

/// Validate `value` for `key` and return the canonical string to store.
fn normalise(key: OptionKey, value: &str) -> Result<String> {
    let invalid = |reason: String| OptionsError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason,
    };
    match key {
        OptionKey::RetentionCount => {
            let n: i64 = value
                .trim()
                .parse()
                .map_err(|e: std::num::ParseIntError| invalid(e.to_string()))?;
            Ok(n.max(MIN_KEEP_COUNT).to_string())
        }
        OptionKey::ScheduleInterval => {
            let interval: ScheduleInterval = value.parse().map_err(invalid)?;
            Ok(interval.to_string())
        }
    }
}
