//! Point totals and rank recomputation

use rusqlite::{params, Connection};
use tracing::{debug, info};

use super::users::fetch_user;
use super::{now_millis, to_millis, LedgerStorage};
use crate::error::{LedgerError, LedgerResult};
use crate::models::User;
use crate::ranking::{rank_users, RankInput};

impl LedgerStorage {
    /// Re-sort every user and persist their ranks
    pub fn recompute_ranks(&self) -> LedgerResult<usize> {
        self.with_tx(|tx| Ok(recompute_ranks_in(tx)?))
    }

    /// Manual correction of a user's points, recorded in `point_adjustments`.
    /// The total never drops below zero.
    pub fn adjust_points(
        &self,
        user_id: i64,
        delta: i64,
        admin_id: i64,
        reason: Option<&str>,
    ) -> LedgerResult<User> {
        self.with_tx(|tx| {
            if fetch_user(tx, user_id)?.is_none() {
                return Err(LedgerError::not_found(format!("User {} not found", user_id)));
            }

            let now = to_millis(now_millis());
            apply_totals(tx, user_id, delta, 0)?;
            tx.execute(
                "INSERT INTO point_adjustments (user_id, admin_id, delta, reason, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![user_id, admin_id, delta, reason, now],
            )?;
            recompute_ranks_in(tx)?;

            info!(
                "Adjusted points for user {} by {} (admin {})",
                user_id, delta, admin_id
            );

            fetch_user(tx, user_id)?
                .ok_or_else(|| LedgerError::Internal(format!("User {} vanished", user_id)))
        })
    }
}

/// Add to a user's totals in place, flooring at zero. Positive deltas are
/// plain SQL increments so concurrent accruals never overwrite each other.
/// A result past `u32::MAX` leaves the row untouched and is a validation error.
pub(crate) fn apply_totals(
    conn: &Connection,
    user_id: i64,
    points_delta: i64,
    contributions_delta: i64,
) -> LedgerResult<()> {
    let updated = conn.execute(
        "UPDATE users
         SET total_points = MAX(0, total_points + ?1),
             total_contributions = MAX(0, total_contributions + ?2),
             last_activity = ?3
         WHERE id = ?4
           AND total_points + ?1 <= ?5
           AND total_contributions + ?2 <= ?5",
        params![
            points_delta,
            contributions_delta,
            to_millis(now_millis()),
            user_id,
            MAX_TOTAL,
        ],
    )?;

    if updated == 0 {
        if fetch_user(conn, user_id)?.is_none() {
            return Err(LedgerError::not_found(format!("User {} not found", user_id)));
        }
        return Err(LedgerError::validation(format!(
            "Totals for user {} would exceed {}",
            user_id, MAX_TOTAL
        )));
    }
    Ok(())
}

const MAX_TOTAL: i64 = u32::MAX as i64;

/// Rank every user and write back the ones that moved.
/// Does not touch `last_activity`: a rank shift is not activity by the user.
pub(crate) fn recompute_ranks_in(conn: &Connection) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare_cached("SELECT id, total_points FROM users")?;
    let entries = stmt
        .query_map([], |row| {
            Ok(RankInput {
                user_id: row.get(0)?,
                total_points: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let total = entries.len();
    let mut update =
        conn.prepare_cached("UPDATE users SET rank = ?1 WHERE id = ?2 AND rank != ?1")?;

    let mut changed = 0;
    for assignment in rank_users(entries) {
        changed += update.execute(params![assignment.rank, assignment.user_id])?;
    }

    debug!("Recomputed ranks for {} users ({} changed)", total, changed);
    Ok(changed)
}
