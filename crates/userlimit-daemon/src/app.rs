use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use tracing::info;
use userlimit_core::UserLimitConfig;
use userlimit_options::OptionsStore;
use userlimit_retention::UserLimiter;
use userlimit_scheduler::SchedulerHandle;
use userlimit_users::SqliteUserStore;

/// Concurrent writers (engine, handle, worker) wait this long for a lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything a command needs, built over one SQLite file.
pub struct App {
    pub config: UserLimitConfig,
    pub limiter: Arc<UserLimiter>,
    pub users: Arc<SqliteUserStore>,
}

impl App {
    /// Open the database, run schema setup and wire the subsystems together.
    pub fn open(config: UserLimitConfig) -> anyhow::Result<Self> {
        let db_path = &config.database.path;
        ensure_parent_dir(db_path);
        info!(path = %db_path, "opening SQLite database");

        let db = open_connection(db_path)?;
        db.execute_batch("PRAGMA journal_mode=WAL;")?;

        // run all schema migrations (idempotent)
        userlimit_options::db::init_db(&db)?;
        userlimit_scheduler::db::init_db(&db)?;
        userlimit_users::db::init_db(&db)?;

        // each subsystem gets its own connection
        let options = Arc::new(OptionsStore::new(open_connection(db_path)?)?);
        let scheduler = SchedulerHandle::new(open_connection(db_path)?)?;
        let users = Arc::new(SqliteUserStore::new(open_connection(db_path)?)?);
        let limiter = Arc::new(UserLimiter::new(
            options,
            scheduler,
            users.clone(),
            config.defaults.clone(),
        ));

        Ok(Self {
            config,
            limiter,
            users,
        })
    }

    /// A fresh connection for a component that runs on its own task.
    pub fn connection(&self) -> anyhow::Result<Connection> {
        open_connection(&self.config.database.path)
    }
}

fn open_connection(path: &str) -> anyhow::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

/// Ensure the parent directory for a file path exists.
fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_database_and_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = UserLimitConfig::default();
        config.database.path = dir.path().join("nested/userlimit.db").to_string_lossy().into_owned();

        let app = App::open(config).unwrap();
        app.limiter.on_activate().unwrap();
        assert!(app.limiter.status().unwrap().job.is_some());
        assert_eq!(app.users.count().unwrap(), 0);
        assert!(dir.path().join("nested/userlimit.db").exists());
    }

    #[test]
    fn reopened_database_stays_deactivated() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = UserLimitConfig::default();
        config.database.path = dir.path().join("userlimit.db").to_string_lossy().into_owned();

        let app = App::open(config.clone()).unwrap();
        app.limiter.on_activate().unwrap();
        app.limiter.on_deactivate().unwrap();
        drop(app);

        let app = App::open(config).unwrap();
        assert_eq!(
            app.limiter.ensure_scheduled().unwrap(),
            userlimit_retention::JobCheck::Inactive
        );
        assert!(app.limiter.status().unwrap().job.is_none());
    }
}
