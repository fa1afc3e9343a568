//! Contribution service: URL validation, submission and review

use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use crate::error::{LedgerError, LedgerResult};
use crate::models::{Contribution, ContributionStatus, ContributionType, NewContribution, User};
use crate::sessions::require_admin;
use crate::storage::LedgerStorage;

lazy_static! {
    static ref TWITTER_URL: Regex =
        Regex::new(r"^https?://(www\.)?(twitter\.com|x\.com)/\w+/status/\d+").unwrap();
    static ref GITHUB_URL: Regex =
        Regex::new(r"^https?://(www\.)?github\.com/[\w\-.]+/[\w\-.]+/(commit|pull)/[\w\-.]+")
            .unwrap();
    static ref DISCORD_URL: Regex =
        Regex::new(r"^https?://(www\.)?discord\.com/channels/\d+/\d+/\d+").unwrap();
    static ref MEDIUM_URL: Regex =
        Regex::new(r"^https?://(www\.)?medium\.com/@?[\w\-.]+/[\w\-.]+-[\w\-.]+").unwrap();
}

/// Drop the query string, fragment and trailing slashes so that links to
/// the same item dedupe to one row
pub fn normalize_url(url: &str) -> &str {
    let url = url.trim();
    let end = url.find(|c| c == '?' || c == '#').unwrap_or(url.len());
    url[..end].trim_end_matches('/')
}

/// Shape a URL must have to count as a contribution of this type
pub fn url_matches_type(kind: ContributionType, url: &str) -> bool {
    let pattern: &Regex = match kind {
        ContributionType::Twitter => &TWITTER_URL,
        ContributionType::Github => &GITHUB_URL,
        ContributionType::Discord => &DISCORD_URL,
        ContributionType::Medium => &MEDIUM_URL,
    };
    pattern.is_match(url)
}

pub struct ContributionService {
    storage: Arc<LedgerStorage>,
    auto_approve: bool,
}

impl ContributionService {
    pub fn new(storage: Arc<LedgerStorage>, auto_approve: bool) -> Self {
        Self {
            storage,
            auto_approve,
        }
    }

    /// Validate and record a contribution. With auto-approval on, the
    /// owner is credited and everyone re-ranked before this returns.
    pub fn submit(
        &self,
        user_id: i64,
        kind: &str,
        url: &str,
        description: Option<String>,
    ) -> LedgerResult<Contribution> {
        let kind: ContributionType = kind.parse()?;
        let url = normalize_url(url);

        if !url_matches_type(kind, url) {
            warn!("Rejected {} submission from user {}: {}", kind, user_id, url);
            return Err(LedgerError::validation(format!(
                "Invalid {} URL format",
                kind
            )));
        }

        let status = if self.auto_approve {
            ContributionStatus::Approved
        } else {
            ContributionStatus::Pending
        };

        let contribution = self.storage.record_contribution(&NewContribution {
            user_id,
            kind,
            url: url.to_string(),
            description: description.filter(|d| !d.trim().is_empty()),
            points: kind.points(),
            status,
        })?;

        info!(
            "User {} submitted {} contribution {} ({} points, {})",
            user_id, kind, contribution.id, contribution.points, contribution.status
        );
        Ok(contribution)
    }

    /// Admin decision on a contribution; totals follow the approved set
    pub fn review(
        &self,
        reviewer: &User,
        contribution_id: i64,
        status: ContributionStatus,
        points: Option<u32>,
    ) -> LedgerResult<Contribution> {
        require_admin(reviewer)?;

        let points = match points {
            Some(points) => points,
            None => self
                .storage
                .find_contribution(contribution_id)?
                .map(|c| c.kind.points())
                .ok_or_else(|| {
                    LedgerError::not_found(format!("Contribution {} not found", contribution_id))
                })?,
        };

        self.storage
            .review_contribution(contribution_id, status, points, reviewer.id)
    }

    /// Manual point correction by an admin
    pub fn adjust_points(
        &self,
        admin: &User,
        user_id: i64,
        delta: i64,
        reason: Option<&str>,
    ) -> LedgerResult<User> {
        require_admin(admin)?;
        self.storage.adjust_points(user_id, delta, admin.id, reason)
    }

    pub fn list_for_user(&self, user_id: i64) -> LedgerResult<Vec<Contribution>> {
        self.storage.contributions_for_user(user_id)
    }

    pub fn list_by_status(
        &self,
        requester: &User,
        status: ContributionStatus,
    ) -> LedgerResult<Vec<Contribution>> {
        require_admin(requester)?;
        self.storage.contributions_by_status(status)
    }

    /// Owners see their own contributions, admins see all
    pub fn get(&self, requester: &User, id: i64) -> LedgerResult<Contribution> {
        let contribution = self
            .storage
            .find_contribution(id)?
            .ok_or_else(|| LedgerError::not_found(format!("Contribution {} not found", id)))?;

        if contribution.user_id != requester.id && !requester.is_admin() {
            return Err(LedgerError::forbidden("Not your contribution"));
        }
        Ok(contribution)
    }
}
