use rusqlite::Connection;

use crate::error::Result;

/// Initialise the scheduler schema in `conn`.
///
/// `UNIQUE(hook)` keeps at most one job per hook even if two writers race.
/// The `next_run` index serves the engine's polling query.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            id          TEXT    NOT NULL PRIMARY KEY,
            hook        TEXT    NOT NULL UNIQUE,
            interval    TEXT    NOT NULL,   -- ScheduleInterval token
            next_run    TEXT    NOT NULL,   -- fixed-width RFC 3339 UTC
            last_run    TEXT,               -- NULL until the first firing
            run_count   INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT    NOT NULL,
            updated_at  TEXT    NOT NULL
        ) STRICT;

        -- Efficient polling: SELECT … WHERE next_run <= ?
        CREATE INDEX IF NOT EXISTS idx_jobs_next_run ON jobs (next_run);
        ",
    )?;
    Ok(())
}
