use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info, instrument};
use userlimit_core::time::format_ts;
use userlimit_core::ScheduleInterval;
use uuid::Uuid;

use crate::{
    db::init_db,
    error::Result,
    types::{row_to_job, Job, JOB_COLUMNS},
};

/// Shared handle for job management while the engine loop runs.
///
/// Uses its own `Connection` so callers can replace or cancel jobs without
/// conflicting with the engine's polling queries.
#[derive(Clone)]
pub struct SchedulerHandle {
    conn: Arc<Mutex<Connection>>,
}

impl SchedulerHandle {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Replace whatever job exists for `hook` with a fresh one firing one
    /// `interval` from now. Never fires immediately.
    ///
    /// Always cancels and recreates, even when the interval is unchanged.
    #[instrument(skip(self))]
    pub fn reschedule(&self, hook: &str, interval: ScheduleInterval) -> Result<Job> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let removed = tx.execute("DELETE FROM jobs WHERE hook = ?1", [hook])?;
        let job = insert_job(&tx, hook, interval)?;
        tx.commit()?;

        info!(
            job_id = %job.id,
            %hook,
            %interval,
            next_run = %job.next_run,
            replaced = removed > 0,
            "job scheduled"
        );
        Ok(job)
    }

    /// Create a job for `hook` only if none exists.
    ///
    /// Returns the new job, or `None` when one was already scheduled.
    #[instrument(skip(self))]
    pub fn ensure_scheduled(&self, hook: &str, interval: ScheduleInterval) -> Result<Option<Job>> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        if find_job(&tx, hook)?.is_some() {
            debug!(%hook, "job already scheduled");
            return Ok(None);
        }
        let job = insert_job(&tx, hook, interval)?;
        tx.commit()?;
        info!(job_id = %job.id, %hook, %interval, next_run = %job.next_run, "missing job recreated");
        Ok(Some(job))
    }

    /// Remove the job for `hook`. Returns `true` if one was removed.
    #[instrument(skip(self))]
    pub fn cancel(&self, hook: &str) -> Result<bool> {
        let n = self.lock().execute("DELETE FROM jobs WHERE hook = ?1", [hook])?;
        if n > 0 {
            info!(%hook, "job cancelled");
        } else {
            debug!(%hook, "no job to cancel");
        }
        Ok(n > 0)
    }

    /// The job currently scheduled for `hook`, if any.
    pub fn job(&self, hook: &str) -> Result<Option<Job>> {
        find_job(&self.lock(), hook)
    }

    /// Return all known jobs ordered by next firing.
    pub fn list_jobs(&self) -> Result<Vec<Job>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs ORDER BY next_run"
        ))?;
        let jobs = stmt
            .query_map([], row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn find_job(conn: &Connection, hook: &str) -> Result<Option<Job>> {
    let job = conn
        .query_row(
            &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE hook = ?1"),
            [hook],
            row_to_job,
        )
        .optional()?;
    Ok(job)
}

fn insert_job(conn: &Connection, hook: &str, interval: ScheduleInterval) -> Result<Job> {
    let now = Utc::now();
    let now_str = format_ts(now);
    let next = now + interval.chrono_duration();
    let id = Uuid::new_v4().to_string();

    conn.execute(
        "INSERT INTO jobs
         (id, hook, interval, next_run, last_run, run_count, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, NULL, 0, ?5, ?5)",
        rusqlite::params![id, hook, interval.as_str(), format_ts(next), now_str],
    )?;

    // Read back so the returned timestamps carry the stored precision.
    Ok(conn.query_row(
        &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
        [&id],
        row_to_job,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const HOOK: &str = "user_limit_check";

    fn handle() -> SchedulerHandle {
        SchedulerHandle::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn reschedule_creates_job_one_interval_out() {
        let h = handle();
        let before = Utc::now();
        let job = h.reschedule(HOOK, ScheduleInterval::Hourly).unwrap();
        // stored precision is milliseconds
        assert!(job.next_run >= before + Duration::hours(1) - Duration::milliseconds(1));
        assert!(job.next_run <= Utc::now() + Duration::hours(1));
        assert_eq!(job.run_count, 0);
        assert!(job.last_run.is_none());
    }

    #[test]
    fn reschedule_twice_leaves_one_job_from_second_call() {
        let h = handle();
        let first = h.reschedule(HOOK, ScheduleInterval::Daily).unwrap();
        let before_second = Utc::now();
        let second = h.reschedule(HOOK, ScheduleInterval::Daily).unwrap();

        let jobs = h.list_jobs().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, second.id);
        assert_ne!(first.id, second.id);
        assert!(second.next_run >= before_second + Duration::hours(24) - Duration::milliseconds(1));
    }

    #[test]
    fn hourly_to_daily_replaces_job() {
        let h = handle();
        let hourly = h.reschedule(HOOK, ScheduleInterval::Hourly).unwrap();
        let before = Utc::now();
        let daily = h.reschedule(HOOK, ScheduleInterval::Daily).unwrap();

        let jobs = h.list_jobs().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].interval, ScheduleInterval::Daily);
        assert_ne!(jobs[0].id, hourly.id);
        assert!(daily.next_run >= before + Duration::hours(24) - Duration::milliseconds(1));
    }

    #[test]
    fn ensure_scheduled_twice_creates_one_job() {
        let h = handle();
        let created = h.ensure_scheduled(HOOK, ScheduleInterval::Hourly).unwrap();
        assert!(created.is_some());
        let second = h.ensure_scheduled(HOOK, ScheduleInterval::Weekly).unwrap();
        assert!(second.is_none());

        let jobs = h.list_jobs().unwrap();
        assert_eq!(jobs.len(), 1);
        // the existing job is left alone, interval included
        assert_eq!(jobs[0].interval, ScheduleInterval::Hourly);
    }

    #[test]
    fn cancel_removes_job() {
        let h = handle();
        assert!(!h.cancel(HOOK).unwrap());
        h.reschedule(HOOK, ScheduleInterval::Every15Min).unwrap();
        assert!(h.cancel(HOOK).unwrap());
        assert!(h.job(HOOK).unwrap().is_none());
        assert!(h.list_jobs().unwrap().is_empty());
    }

    #[test]
    fn hooks_are_independent() {
        let h = handle();
        h.reschedule(HOOK, ScheduleInterval::Hourly).unwrap();
        h.reschedule("other_hook", ScheduleInterval::Weekly).unwrap();
        h.cancel("other_hook").unwrap();
        assert!(h.job(HOOK).unwrap().is_some());
    }

    #[test]
    fn malformed_timestamp_is_database_error() {
        let h = handle();
        h.reschedule(HOOK, ScheduleInterval::Hourly).unwrap();
        h.lock()
            .execute("UPDATE jobs SET next_run = 'soon' WHERE hook = ?1", [HOOK])
            .unwrap();
        assert!(matches!(h.job(HOOK), Err(crate::SchedulerError::Database(_))));
    }

    #[test]
    fn missing_job_is_none() {
        let h = handle();
        assert!(h.job(HOOK).unwrap().is_none());
        assert!(!h.cancel(HOOK).unwrap());
    }
}
