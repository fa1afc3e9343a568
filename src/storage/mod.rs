//! SQLite-backed storage for users, sessions and contributions
//!
//! A single connection sits behind a mutex. Every multi-step operation
//! (dedup + insert, accrual + rank recompute) runs in one transaction while
//! the lock is held, so concurrent callers serialize cleanly.

mod contributions;
mod migrations;
mod ranks;
mod sessions;
mod users;

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, Row, Transaction};
use tracing::info;

use crate::error::LedgerResult;
use crate::models::{Contribution, Session, User};

pub use migrations::Migrator;

pub struct LedgerStorage {
    conn: Mutex<Connection>,
}

impl LedgerStorage {
    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        let storage = Self::init(conn)?;
        info!("Opened ledger database at {}", path.display());
        Ok(storage)
    }

    /// Process-lifetime database, used by tests and throwaway runs
    pub fn in_memory() -> LedgerResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(mut conn: Connection) -> LedgerResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Migrator::new().run(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` inside a transaction. An error from `f` rolls everything back.
    pub(crate) fn with_tx<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Run a read against the connection
    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let conn = self.conn.lock();
        f(&conn)
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

pub(crate) fn to_millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// Current time truncated to what the database can represent
pub(crate) fn now_millis() -> DateTime<Utc> {
    from_millis(to_millis(Utc::now()))
}

pub(crate) const USER_COLUMNS: &str = "id, wallet_address, username, role, total_points, \
     total_contributions, rank, is_connected, is_approved, created_at, last_activity";

pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        wallet_address: row.get(1)?,
        username: row.get(2)?,
        role: row.get(3)?,
        total_points: row.get(4)?,
        total_contributions: row.get(5)?,
        rank: row.get(6)?,
        is_connected: row.get(7)?,
        is_approved: row.get(8)?,
        created_at: from_millis(row.get(9)?),
        last_activity: from_millis(row.get(10)?),
    })
}

pub(crate) const SESSION_COLUMNS: &str = "token_hash, user_id, created_at, expires_at";

pub(crate) fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        token_hash: row.get(0)?,
        user_id: row.get(1)?,
        created_at: from_millis(row.get(2)?),
        expires_at: from_millis(row.get(3)?),
    })
}

pub(crate) const CONTRIBUTION_COLUMNS: &str =
    "id, user_id, type, url, description, points, status, created_at, reviewed_at, reviewed_by";

pub(crate) fn contribution_from_row(row: &Row<'_>) -> rusqlite::Result<Contribution> {
    Ok(Contribution {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: row.get(2)?,
        url: row.get(3)?,
        description: row.get(4)?,
        points: row.get(5)?,
        status: row.get(6)?,
        created_at: from_millis(row.get(7)?),
        reviewed_at: row.get::<_, Option<i64>>(8)?.map(from_millis),
        reviewed_by: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_in_memory() {
        let storage = LedgerStorage::in_memory().unwrap();
        assert!(storage.list_users().unwrap().is_empty());
        assert_eq!(storage.count_contributions().unwrap(), 0);
    }

    #[test]
    fn test_storage_persists_across_reopen() {
        let path = std::env::temp_dir().join(format!(
            "ambassador-ledger-test-{}-{}.db",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));

        {
            let storage = LedgerStorage::open(&path).unwrap();
            storage
                .create_user(&crate::models::NewUser::new("QUBIC1234PERSIST"))
                .unwrap();
        }

        let storage = LedgerStorage::open(&path).unwrap();
        let user = storage.find_user_by_wallet("qubic1234persist").unwrap();
        assert!(user.is_some());

        drop(storage);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_millis_round_trip() {
        let now = now_millis();
        assert_eq!(from_millis(to_millis(now)), now);
    }
}
