//! Identity store

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::{now_millis, to_millis, user_from_row, LedgerStorage, USER_COLUMNS};
use crate::error::{is_unique_violation, LedgerError, LedgerResult};
use crate::models::{NewUser, User, UserUpdate};

impl LedgerStorage {
    /// Case-insensitive exact match on the wallet address
    pub fn find_user_by_wallet(&self, wallet_address: &str) -> LedgerResult<Option<User>> {
        self.with_conn(|conn| Ok(fetch_user_by_wallet(conn, wallet_address)?))
    }

    pub fn find_user_by_id(&self, id: i64) -> LedgerResult<Option<User>> {
        self.with_conn(|conn| Ok(fetch_user(conn, id)?))
    }

    pub fn create_user(&self, new_user: &NewUser) -> LedgerResult<User> {
        self.with_tx(|tx| insert_user(tx, new_user))
    }

    /// Merge the set fields into the user and refresh `last_activity`.
    /// Returns `None` when no user has this id.
    pub fn update_user(&self, id: i64, update: &UserUpdate) -> LedgerResult<Option<User>> {
        self.with_tx(|tx| Ok(apply_user_update(tx, id, update)?))
    }

    pub fn list_users(&self) -> LedgerResult<Vec<User>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS))?;
            let users = stmt
                .query_map([], user_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(users)
        })
    }

    /// Ranked users first by rank, unranked (rank 0) after them, ties by id
    pub fn users_by_rank(&self, limit: usize) -> LedgerResult<Vec<User>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM users
                 ORDER BY CASE WHEN rank = 0 THEN 1 ELSE 0 END, rank, id
                 LIMIT ?1",
                USER_COLUMNS
            ))?;
            let users = stmt
                .query_map(params![limit as i64], user_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(users)
        })
    }
}

pub(crate) fn fetch_user(conn: &Connection, id: i64) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
        params![id],
        user_from_row,
    )
    .optional()
}

pub(crate) fn fetch_user_by_wallet(
    conn: &Connection,
    wallet_address: &str,
) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM users WHERE wallet_address = ?1 COLLATE NOCASE",
            USER_COLUMNS
        ),
        params![wallet_address],
        user_from_row,
    )
    .optional()
}

pub(crate) fn insert_user(conn: &Connection, new_user: &NewUser) -> LedgerResult<User> {
    let now = to_millis(now_millis());

    let result = conn.execute(
        "INSERT INTO users (wallet_address, username, role, total_points, total_contributions, rank, is_connected, is_approved, created_at, last_activity)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        params![
            new_user.wallet_address,
            new_user.username,
            new_user.role,
            new_user.total_points,
            new_user.total_contributions,
            new_user.rank,
            new_user.is_connected,
            new_user.is_approved,
            now,
        ],
    );

    match result {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            return Err(LedgerError::conflict(format!(
                "Wallet {} is already registered",
                new_user.wallet_address
            )));
        }
        Err(e) => return Err(e.into()),
    }

    let id = conn.last_insert_rowid();
    debug!("Created user {} for wallet {}", id, new_user.wallet_address);

    fetch_user(conn, id)?
        .ok_or_else(|| LedgerError::Internal(format!("User {} vanished after insert", id)))
}

pub(crate) fn apply_user_update(
    conn: &Connection,
    id: i64,
    update: &UserUpdate,
) -> rusqlite::Result<Option<User>> {
    let Some(mut user) = fetch_user(conn, id)? else {
        return Ok(None);
    };

    if let Some(username) = &update.username {
        user.username = username.clone();
    }
    if let Some(role) = update.role {
        user.role = role;
    }
    if let Some(total_points) = update.total_points {
        user.total_points = total_points;
    }
    if let Some(total_contributions) = update.total_contributions {
        user.total_contributions = total_contributions;
    }
    if let Some(rank) = update.rank {
        user.rank = rank;
    }
    if let Some(is_connected) = update.is_connected {
        user.is_connected = is_connected;
    }
    if let Some(is_approved) = update.is_approved {
        user.is_approved = is_approved;
    }

    conn.execute(
        "UPDATE users SET username = ?1, role = ?2, total_points = ?3, total_contributions = ?4,
                rank = ?5, is_connected = ?6, is_approved = ?7, last_activity = ?8
         WHERE id = ?9",
        params![
            user.username,
            user.role,
            user.total_points,
            user.total_contributions,
            user.rank,
            user.is_connected,
            user.is_approved,
            to_millis(now_millis()),
            id,
        ],
    )?;

    fetch_user(conn, id)
}
