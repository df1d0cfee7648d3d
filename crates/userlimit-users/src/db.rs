use rusqlite::{Connection, Result};

/// Initialise the users table. Safe to call on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    // idx_users_registered serves the retention query: ORDER BY registered_at LIMIT n.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            login           TEXT NOT NULL UNIQUE,
            email           TEXT NOT NULL DEFAULT '',
            registered_at   TEXT NOT NULL        -- fixed-width RFC 3339 UTC
        );
        CREATE INDEX IF NOT EXISTS idx_users_registered
            ON users (registered_at);",
    )
}
