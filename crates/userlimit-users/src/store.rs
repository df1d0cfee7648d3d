use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use rusqlite::{Connection, ErrorCode};
use tracing::{debug, info, instrument};
use userlimit_core::time::{format_ts, parse_ts};

use crate::db::init_db;
use crate::error::{Result, UserError};
use crate::types::{NewUser, User};

/// The two operations an eviction run needs from the user table.
pub trait UserStore: Send + Sync {
    /// Ids of the `n` earliest-registered users, oldest first.
    ///
    /// Ties on `registered_at` fall back to storage order. `n <= 0` yields an
    /// empty list.
    fn list_oldest(&self, n: i64) -> Result<Vec<i64>>;

    /// Delete every user whose id is not in `keep`, as one statement.
    /// Returns the number of rows removed. An empty `keep` removes nothing.
    fn delete_all_except(&self, keep: &[i64]) -> Result<usize>;
}

/// `users` table on a single SQLite connection.
pub struct SqliteUserStore {
    db: Mutex<Connection>,
}

impl SqliteUserStore {
    /// Wrap `conn`, creating the table if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    #[instrument(skip(self, new), fields(login = %new.login))]
    pub fn create_user(&self, new: NewUser) -> Result<User> {
        let registered_at = new.registered_at.unwrap_or_else(Utc::now);
        let db = self.lock();
        let res = db.execute(
            "INSERT INTO users (login, email, registered_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![new.login, new.email, format_ts(registered_at)],
        );
        match res {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                return Err(UserError::AlreadyExists(new.login));
            }
            Err(e) => return Err(e.into()),
        }
        let id = db.last_insert_rowid();
        debug!(id, "user created");
        Ok(db.query_row(
            "SELECT id, login, email, registered_at FROM users WHERE id = ?1",
            [id],
            row_to_user,
        )?)
    }

    /// All users, oldest registration first.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let db = self.lock();
        let mut stmt = db.prepare(
            "SELECT id, login, email, registered_at FROM users
             ORDER BY registered_at ASC, id ASC",
        )?;
        let users = stmt
            .query_map([], row_to_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    pub fn count(&self) -> Result<u64> {
        let n: i64 = self
            .lock()
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl UserStore for SqliteUserStore {
    #[instrument(skip(self))]
    fn list_oldest(&self, n: i64) -> Result<Vec<i64>> {
        // SQLite reads a negative LIMIT as "no limit".
        if n <= 0 {
            return Ok(Vec::new());
        }
        let db = self.lock();
        let mut stmt = db.prepare_cached(
            "SELECT id FROM users ORDER BY registered_at ASC, id ASC LIMIT ?1",
        )?;
        let ids = stmt
            .query_map([n], |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    #[instrument(skip(self, keep), fields(keep = keep.len()))]
    fn delete_all_except(&self, keep: &[i64]) -> Result<usize> {
        if keep.is_empty() {
            return Ok(0);
        }
        let mut db = self.lock();
        let tx = db.transaction()?;
        // The keep-set can exceed SQLite's bound-parameter limit, so it goes
        // through a temp table instead of an inline IN (...) list.
        tx.execute_batch(
            "CREATE TEMP TABLE IF NOT EXISTS retained_ids (id INTEGER PRIMARY KEY);
             DELETE FROM retained_ids;",
        )?;
        {
            let mut insert = tx.prepare("INSERT OR IGNORE INTO retained_ids (id) VALUES (?1)")?;
            for id in keep {
                insert.execute([id])?;
            }
        }
        let deleted = tx.execute(
            "DELETE FROM users WHERE id NOT IN (SELECT id FROM retained_ids)",
            [],
        )?;
        tx.execute("DELETE FROM retained_ids", [])?;
        tx.commit()?;

        if deleted > 0 {
            info!(deleted, retained = keep.len(), "users deleted");
        }
        Ok(deleted)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let raw: String = row.get(3)?;
    let registered_at = parse_ts(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(User {
        id: row.get(0)?,
        login: row.get(1)?,
        email: row.get(2)?,
        registered_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};

    fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn store_with(dates: &[(&str, DateTime<Utc>)]) -> SqliteUserStore {
        let store = SqliteUserStore::new(Connection::open_in_memory().unwrap()).unwrap();
        for (login, at) in dates {
            store.create_user(NewUser::new(*login).registered_at(*at)).unwrap();
        }
        store
    }

    #[test]
    fn list_oldest_orders_by_registration() {
        // inserted out of order so ids and dates disagree
        let store = store_with(&[
            ("carol", day(2023, 3, 1)),
            ("alice", day(2023, 1, 1)),
            ("bob", day(2023, 2, 1)),
        ]);
        let ids = store.list_oldest(2).unwrap();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn list_oldest_non_positive_is_empty() {
        let store = store_with(&[("alice", day(2023, 1, 1))]);
        assert!(store.list_oldest(0).unwrap().is_empty());
        assert!(store.list_oldest(-1).unwrap().is_empty());
    }

    #[test]
    fn list_oldest_more_than_exist() {
        let store = store_with(&[("alice", day(2023, 1, 1)), ("bob", day(2023, 2, 1))]);
        assert_eq!(store.list_oldest(100).unwrap(), vec![1, 2]);
    }

    #[test]
    fn delete_all_except_keeps_only_listed() {
        let store = store_with(&[
            ("alice", day(2023, 1, 1)),
            ("bob", day(2023, 2, 1)),
            ("carol", day(2023, 3, 1)),
        ]);
        assert_eq!(store.delete_all_except(&[1, 3]).unwrap(), 1);
        let logins: Vec<_> = store.list_users().unwrap().into_iter().map(|u| u.login).collect();
        assert_eq!(logins, vec!["alice", "carol"]);
    }

    #[test]
    fn delete_all_except_empty_keep_set_is_noop() {
        let store = store_with(&[("alice", day(2023, 1, 1))]);
        assert_eq!(store.delete_all_except(&[]).unwrap(), 0);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn delete_all_except_everyone_kept() {
        let store = store_with(&[("alice", day(2023, 1, 1)), ("bob", day(2023, 2, 1))]);
        assert_eq!(store.delete_all_except(&[1, 2]).unwrap(), 0);
        // repeated call reuses the temp table
        assert_eq!(store.delete_all_except(&[1, 2]).unwrap(), 0);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn keep_set_larger_than_parameter_limit() {
        let store = SqliteUserStore::new(Connection::open_in_memory().unwrap()).unwrap();
        let start = day(2020, 1, 1);
        for i in 0..33_000i64 {
            let at = start + chrono::Duration::seconds(i);
            store.create_user(NewUser::new(format!("u{i}")).registered_at(at)).unwrap();
        }
        let keep = store.list_oldest(32_900).unwrap();
        assert_eq!(store.delete_all_except(&keep).unwrap(), 100);
        assert_eq!(store.count().unwrap(), 32_900);
    }

    #[test]
    fn duplicate_login_rejected() {
        let store = store_with(&[("alice", day(2023, 1, 1))]);
        let err = store.create_user(NewUser::new("alice")).unwrap_err();
        assert!(matches!(err, UserError::AlreadyExists(_)));
    }

    #[test]
    fn registered_at_defaults_to_now() {
        let store = store_with(&[]);
        let before = Utc::now() - chrono::Duration::seconds(1);
        let user = store.create_user(NewUser::new("dave").email("d@example.com")).unwrap();
        assert!(user.registered_at >= before);
        assert_eq!(user.email, "d@example.com");
    }
}
