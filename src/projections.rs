//! Read-only views for the dashboard, leaderboard and activity feed

use std::sync::Arc;

use crate::config::DisplayConfig;
use crate::error::LedgerResult;
use crate::models::{ContributionActivity, DashboardStats, LeaderboardEntry};
use crate::storage::LedgerStorage;

pub const DEFAULT_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 100;

/// Missing limits fall back to the default, large ones are capped
pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)
}

pub struct Projections {
    storage: Arc<LedgerStorage>,
    display: DisplayConfig,
}

impl Projections {
    pub fn new(storage: Arc<LedgerStorage>, display: DisplayConfig) -> Self {
        Self { storage, display }
    }

    /// Ledger-wide count plus the per-user figures. An absent or unknown
    /// user yields zeros for the per-user fields.
    pub fn dashboard_stats(&self, user_id: Option<i64>) -> LedgerResult<DashboardStats> {
        let total = self.storage.count_contributions()?;

        let user = match user_id {
            Some(id) => self.storage.find_user_by_id(id)?,
            None => None,
        };

        Ok(DashboardStats {
            total_contributions: total + self.display.contribution_bias,
            user_contributions: user.as_ref().map_or(0, |u| u.total_contributions),
            user_rank: user.as_ref().map_or(0, |u| u.rank),
            total_points: user.as_ref().map_or(0, |u| u.total_points),
            weekly_growth: self.display.weekly_growth,
        })
    }

    pub fn leaderboard(&self, limit: Option<usize>) -> LedgerResult<Vec<LeaderboardEntry>> {
        let users = self.storage.users_by_rank(clamp_limit(limit))?;
        Ok(users
            .into_iter()
            .map(|u| LeaderboardEntry {
                rank: u.rank,
                wallet_address: u.wallet_address,
                username: u.username,
                total_points: u.total_points,
                total_contributions: u.total_contributions,
                last_activity: u.last_activity,
            })
            .collect())
    }

    /// Newest contributions first, described by type
    pub fn recent_activity(
        &self,
        user_id: Option<i64>,
        limit: Option<usize>,
    ) -> LedgerResult<Vec<ContributionActivity>> {
        let contributions = self
            .storage
            .recent_contributions(user_id, clamp_limit(limit))?;
        Ok(contributions
            .into_iter()
            .map(|c| ContributionActivity {
                id: c.id,
                kind: c.kind,
                description: c.kind.activity_description().to_string(),
                points: c.points,
                created_at: c.created_at,
                status: c.status,
            })
            .collect())
    }
}
