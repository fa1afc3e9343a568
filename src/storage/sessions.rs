//! Session store

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::{
    from_millis, session_from_row, to_millis, user_from_row, LedgerStorage, SESSION_COLUMNS,
    USER_COLUMNS,
};
use crate::error::{is_unique_violation, LedgerError, LedgerResult};
use crate::models::{Session, User};

impl LedgerStorage {
    pub fn insert_session(&self, session: &Session) -> LedgerResult<()> {
        self.with_conn(|conn| {
            let result = conn.execute(
                "INSERT INTO sessions (token_hash, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    session.token_hash,
                    session.user_id,
                    to_millis(session.created_at),
                    to_millis(session.expires_at),
                ],
            );
            match result {
                Ok(_) => Ok(()),
                Err(e) if is_unique_violation(&e) => {
                    Err(LedgerError::conflict("Session token already issued"))
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn find_session(&self, token_hash: &str) -> LedgerResult<Option<Session>> {
        self.with_conn(|conn| {
            let session = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM sessions WHERE token_hash = ?1",
                        SESSION_COLUMNS
                    ),
                    params![token_hash],
                    session_from_row,
                )
                .optional()?;
            Ok(session)
        })
    }

    /// Session and its owner in a single indexed lookup
    pub fn find_session_with_user(&self, token_hash: &str) -> LedgerResult<Option<(Session, User)>> {
        let user_columns = USER_COLUMNS
            .split(", ")
            .map(|c| format!("u.{}", c))
            .collect::<Vec<_>>()
            .join(", ");

        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    &format!(
                        "SELECT {}, s.token_hash, s.user_id, s.created_at, s.expires_at
                         FROM sessions s JOIN users u ON u.id = s.user_id
                         WHERE s.token_hash = ?1",
                        user_columns
                    ),
                    params![token_hash],
                    |row| {
                        let user = user_from_row(row)?;
                        let session = Session {
                            token_hash: row.get(11)?,
                            user_id: row.get(12)?,
                            created_at: from_millis(row.get(13)?),
                            expires_at: from_millis(row.get(14)?),
                        };
                        Ok((session, user))
                    },
                )
                .optional()?;
            Ok(found)
        })
    }

    /// Returns whether a row was actually removed
    pub fn delete_session(&self, token_hash: &str) -> LedgerResult<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM sessions WHERE token_hash = ?1",
                params![token_hash],
            )?;
            Ok(deleted > 0)
        })
    }

    pub fn purge_expired_sessions(&self, now: DateTime<Utc>) -> LedgerResult<usize> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM sessions WHERE expires_at <= ?1",
                params![to_millis(now)],
            )?;
            Ok(deleted)
        })
    }

    pub fn count_sessions_for_user(&self, user_id: i64) -> LedgerResult<u32> {
        self.with_conn(|conn| {
            let count: u32 = conn.query_row(
                "SELECT COUNT(*) FROM sessions WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }
}
