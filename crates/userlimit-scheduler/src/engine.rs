use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use userlimit_core::time::format_ts;

use crate::{
    db::init_db,
    error::Result,
    types::{row_to_job, Job, JOB_COLUMNS},
};

/// Polls the `jobs` table and forwards due firings to a receiver.
pub struct SchedulerEngine {
    conn: Connection,
    /// Fired jobs are sent here. Bounded: a full channel means a firing is
    /// already waiting, and further firings are coalesced into it.
    fired_tx: mpsc::Sender<Job>,
    poll_interval: Duration,
}

impl SchedulerEngine {
    /// Create a new engine, initialising the DB schema if needed.
    ///
    /// The sender is non-blocking (`try_send`) so the tick loop is never stalled.
    pub fn new(conn: Connection, fired_tx: mpsc::Sender<Job>, poll_interval: Duration) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn,
            fired_tx,
            poll_interval,
        })
    }

    /// Main event loop. Polls every `poll_interval` until `shutdown` broadcasts `true`.
    ///
    /// Dropping the engine on exit closes the fired-job channel, which lets the
    /// receiver drain and stop.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(poll_ms = self.poll_interval.as_millis() as u64, "scheduler engine started");
        self.log_overdue_on_startup();

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.fire_due(Utc::now()) {
                        error!("scheduler tick error: {e}");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Fire every job whose `next_run` is at or before `now`.
    ///
    /// Each due job is advanced to `now + interval` before it is forwarded, so
    /// a job the receiver cannot accept is not retried on the next tick.
    /// Returns the number of jobs that came due.
    pub fn fire_due(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let now_str = format_ts(now);

        // Collect eagerly so `stmt` is dropped before the UPDATE below.
        let due: Vec<Job> = {
            let mut stmt = self.conn.prepare_cached(&format!(
                "SELECT {JOB_COLUMNS} FROM jobs WHERE next_run <= ?1 ORDER BY next_run"
            ))?;
            let rows = stmt
                .query_map([&now_str], row_to_job)?
                .filter_map(|r| match r {
                    Ok(job) => Some(job),
                    Err(e) => {
                        error!("skipping undecodable job row: {e}");
                        None
                    }
                })
                .collect();
            rows
        };

        for job in &due {
            let next = now + job.interval.chrono_duration();
            let run_count = job.run_count + 1;

            // Guarded on id: a reschedule that raced this tick already replaced the row.
            let updated = self.conn.execute(
                "UPDATE jobs SET last_run = ?1, next_run = ?2, run_count = ?3, updated_at = ?1
                 WHERE id = ?4",
                rusqlite::params![now_str, format_ts(next), run_count, job.id],
            )?;
            if updated == 0 {
                debug!(job_id = %job.id, "job replaced before firing");
                continue;
            }

            info!(job_id = %job.id, hook = %job.hook, run = run_count, next_run = %next, "firing job");

            let fired = Job {
                last_run: Some(now),
                next_run: next,
                run_count,
                updated_at: now,
                ..job.clone()
            };
            match self.fired_tx.try_send(fired) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(job_id = %job.id, "previous firing still pending, coalesced");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    warn!(job_id = %job.id, "fired-job receiver closed, firing dropped");
                }
            }
        }
        Ok(due.len())
    }

    // --- private helpers ---------------------------------------------------

    /// Jobs that came due while the service was down fire on the first tick.
    fn log_overdue_on_startup(&self) {
        let now = format_ts(Utc::now());
        match self.conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE next_run < ?1",
            [&now],
            |row| row.get::<_, i64>(0),
        ) {
            Ok(n) if n > 0 => warn!(count = n, "overdue jobs found on startup, firing now"),
            Err(e) => error!("overdue-on-startup query failed: {e}"),
            _ => {}
        }
    }
}
