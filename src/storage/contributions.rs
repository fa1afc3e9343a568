//! Contribution ledger

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::ranks::{apply_totals, recompute_ranks_in};
use super::users::fetch_user;
use super::{contribution_from_row, now_millis, to_millis, LedgerStorage, CONTRIBUTION_COLUMNS};
use crate::error::{is_unique_violation, LedgerError, LedgerResult};
use crate::models::{Contribution, ContributionStatus, NewContribution};

/// Change to the owner's totals caused by moving a contribution between
/// statuses. Totals always mirror the set of approved contributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TotalsDelta {
    pub points: i64,
    pub contributions: i64,
}

impl TotalsDelta {
    pub fn between(
        old_status: ContributionStatus,
        old_points: u32,
        new_status: ContributionStatus,
        new_points: u32,
    ) -> Self {
        use ContributionStatus::Approved;

        match (old_status == Approved, new_status == Approved) {
            (false, true) => Self {
                points: new_points as i64,
                contributions: 1,
            },
            (true, true) => Self {
                points: new_points as i64 - old_points as i64,
                contributions: 0,
            },
            (true, false) => Self {
                points: -(old_points as i64),
                contributions: -1,
            },
            (false, false) => Self {
                points: 0,
                contributions: 0,
            },
        }
    }

    pub fn is_zero(&self) -> bool {
        self.points == 0 && self.contributions == 0
    }
}

impl LedgerStorage {
    /// Insert a contribution if its URL is new. An approved contribution
    /// credits its owner and re-ranks everyone in the same transaction.
    pub fn record_contribution(&self, new: &NewContribution) -> LedgerResult<Contribution> {
        self.with_tx(|tx| {
            if fetch_user(tx, new.user_id)?.is_none() {
                return Err(LedgerError::not_found(format!(
                    "User {} not found",
                    new.user_id
                )));
            }

            let now = to_millis(now_millis());
            let reviewed_at = (new.status != ContributionStatus::Pending).then_some(now);

            let result = tx.execute(
                "INSERT INTO contributions (user_id, type, url, description, points, status, created_at, reviewed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    new.user_id,
                    new.kind,
                    new.url,
                    new.description,
                    new.points,
                    new.status,
                    now,
                    reviewed_at,
                ],
            );

            match result {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => {
                    return Err(LedgerError::conflict(
                        "This contribution URL has already been submitted",
                    ));
                }
                Err(e) => return Err(e.into()),
            }

            let id = tx.last_insert_rowid();

            if new.status == ContributionStatus::Approved {
                apply_totals(tx, new.user_id, new.points as i64, 1)?;
                recompute_ranks_in(tx)?;
            }

            debug!(
                "Recorded {} contribution {} for user {} ({})",
                new.kind, id, new.user_id, new.status
            );

            fetch_contribution(tx, id)?.ok_or_else(|| {
                LedgerError::Internal(format!("Contribution {} vanished after insert", id))
            })
        })
    }

    /// Overwrite status and points and move the owner's totals to match
    pub fn review_contribution(
        &self,
        id: i64,
        status: ContributionStatus,
        points: u32,
        reviewer_id: i64,
    ) -> LedgerResult<Contribution> {
        self.with_tx(|tx| {
            let existing = fetch_contribution(tx, id)?
                .ok_or_else(|| LedgerError::not_found(format!("Contribution {} not found", id)))?;

            tx.execute(
                "UPDATE contributions SET status = ?1, points = ?2, reviewed_by = ?3, reviewed_at = ?4
                 WHERE id = ?5",
                params![status, points, reviewer_id, to_millis(now_millis()), id],
            )?;

            let delta = TotalsDelta::between(existing.status, existing.points, status, points);
            if !delta.is_zero() {
                apply_totals(tx, existing.user_id, delta.points, delta.contributions)?;
                recompute_ranks_in(tx)?;
            }

            info!(
                "Contribution {} reviewed by {}: {} -> {} ({} points)",
                id, reviewer_id, existing.status, status, points
            );

            fetch_contribution(tx, id)?
                .ok_or_else(|| LedgerError::Internal(format!("Contribution {} vanished", id)))
        })
    }

    pub fn find_contribution(&self, id: i64) -> LedgerResult<Option<Contribution>> {
        self.with_conn(|conn| Ok(fetch_contribution(conn, id)?))
    }

    pub fn find_contribution_by_url(&self, url: &str) -> LedgerResult<Option<Contribution>> {
        self.with_conn(|conn| {
            let contribution = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM contributions WHERE url = ?1",
                        CONTRIBUTION_COLUMNS
                    ),
                    params![url],
                    contribution_from_row,
                )
                .optional()?;
            Ok(contribution)
        })
    }

    /// Newest first
    pub fn contributions_for_user(&self, user_id: i64) -> LedgerResult<Vec<Contribution>> {
        self.query_contributions(
            "WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
            params![user_id],
        )
    }

    /// Oldest first, the order a review queue is worked through
    pub fn contributions_by_status(
        &self,
        status: ContributionStatus,
    ) -> LedgerResult<Vec<Contribution>> {
        self.query_contributions(
            "WHERE status = ?1 ORDER BY created_at ASC, id ASC",
            params![status],
        )
    }

    /// Most recent contributions, optionally for one user
    pub fn recent_contributions(
        &self,
        user_id: Option<i64>,
        limit: usize,
    ) -> LedgerResult<Vec<Contribution>> {
        let limit = limit as i64;
        match user_id {
            Some(user_id) => self.query_contributions(
                "WHERE user_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
                params![user_id, limit],
            ),
            None => self.query_contributions(
                "ORDER BY created_at DESC, id DESC LIMIT ?1",
                params![limit],
            ),
        }
    }

    pub fn count_contributions(&self) -> LedgerResult<u64> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM contributions", [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }

    fn query_contributions(
        &self,
        clause: &str,
        params: impl rusqlite::Params,
    ) -> LedgerResult<Vec<Contribution>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM contributions {}",
                CONTRIBUTION_COLUMNS, clause
            ))?;
            let contributions = stmt
                .query_map(params, contribution_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(contributions)
        })
    }
}

pub(crate) fn fetch_contribution(
    conn: &Connection,
    id: i64,
) -> rusqlite::Result<Option<Contribution>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM contributions WHERE id = ?1",
            CONTRIBUTION_COLUMNS
        ),
        params![id],
        contribution_from_row,
    )
    .optional()
}
