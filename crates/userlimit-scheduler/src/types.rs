use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use userlimit_core::time::parse_ts;
use userlimit_core::ScheduleInterval;

/// Column order expected by [`row_to_job`].
pub(crate) const JOB_COLUMNS: &str =
    "id, hook, interval, next_run, last_run, run_count, created_at, updated_at";

/// A persisted recurring job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// UUID v4 string, primary key. A new id is minted on every reschedule.
    pub id: String,
    /// Name of the task this job triggers; unique across the table.
    pub hook: String,
    pub interval: ScheduleInterval,
    /// Earliest instant the engine will fire this job.
    pub next_run: DateTime<Utc>,
    /// Instant of the most recent firing, if any.
    pub last_run: Option<DateTime<Utc>>,
    /// Firings since this job was (re)created.
    pub run_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Map a SELECT row (column order from [`JOB_COLUMNS`]) to a `Job`.
pub(crate) fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    let interval_str: String = row.get(2)?;
    let interval = interval_str
        .parse::<ScheduleInterval>()
        .map_err(|e| conversion_error(2, e.into()))?;
    let last_run = match row.get::<_, Option<String>>(4)? {
        Some(s) => Some(ts_column(4, &s)?),
        None => None,
    };
    Ok(Job {
        id: row.get(0)?,
        hook: row.get(1)?,
        interval,
        next_run: ts_column(3, &row.get::<_, String>(3)?)?,
        last_run,
        run_count: row.get(5)?,
        created_at: ts_column(6, &row.get::<_, String>(6)?)?,
        updated_at: ts_column(7, &row.get::<_, String>(7)?)?,
    })
}

fn ts_column(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    parse_ts(s).map_err(|e| conversion_error(idx, Box::new(e)))
}

fn conversion_error(
    idx: usize,
    err: Box<dyn std::error::Error + Send + Sync + 'static>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, err)
}
