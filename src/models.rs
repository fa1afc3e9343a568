//! Domain records: users, sessions and contributions

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

// ============================================================================
// ENUMS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Visitor,
    Ambassador,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Visitor => "visitor",
            Role::Ambassador => "ambassador",
            Role::Admin => "admin",
        }
    }

    /// Prefix used when deriving a display name for a new wallet
    pub fn username_prefix(&self) -> &'static str {
        match self {
            Role::Visitor => "Visitor",
            Role::Ambassador => "Ambassador",
            Role::Admin => "Admin",
        }
    }

    /// Privilege order, used so a reconnect never demotes a user
    fn level(&self) -> u8 {
        match self {
            Role::Visitor => 0,
            Role::Ambassador => 1,
            Role::Admin => 2,
        }
    }

    pub fn outranks(&self, other: Role) -> bool {
        self.level() > other.level()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "visitor" => Ok(Role::Visitor),
            "ambassador" => Ok(Role::Ambassador),
            "admin" => Ok(Role::Admin),
            other => Err(LedgerError::validation(format!("Unknown role: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContributionType {
    Twitter,
    Github,
    Discord,
    Medium,
}

impl ContributionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContributionType::Twitter => "twitter",
            ContributionType::Github => "github",
            ContributionType::Discord => "discord",
            ContributionType::Medium => "medium",
        }
    }

    /// Points awarded when a contribution of this type is accepted
    pub fn points(&self) -> u32 {
        match self {
            ContributionType::Twitter => 1,
            ContributionType::Github => 2,
            ContributionType::Discord => 1,
            ContributionType::Medium => 3,
        }
    }

    /// Human-readable line shown in the activity feed
    pub fn activity_description(&self) -> &'static str {
        match self {
            ContributionType::Twitter => "Posted about Qubic on Twitter",
            ContributionType::Github => "Committed to Qubic repository",
            ContributionType::Discord => "Active discussion in Discord",
            ContributionType::Medium => "Published article on Medium",
        }
    }
}

impl fmt::Display for ContributionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContributionType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "twitter" => Ok(ContributionType::Twitter),
            "github" => Ok(ContributionType::Github),
            "discord" => Ok(ContributionType::Discord),
            "medium" => Ok(ContributionType::Medium),
            other => Err(LedgerError::validation(format!(
                "Unknown contribution type: {} (expected twitter, github, discord or medium)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContributionStatus {
    Pending,
    Approved,
    Rejected,
}

impl ContributionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContributionStatus::Pending => "pending",
            ContributionStatus::Approved => "approved",
            ContributionStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ContributionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContributionStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ContributionStatus::Pending),
            "approved" => Ok(ContributionStatus::Approved),
            "rejected" => Ok(ContributionStatus::Rejected),
            other => Err(LedgerError::validation(format!(
                "Unknown contribution status: {}",
                other
            ))),
        }
    }
}

// Enums are stored as their lowercase names.
macro_rules! text_column {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: LedgerError| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

text_column!(Role);
text_column!(ContributionType);
text_column!(ContributionStatus);

// ============================================================================
// RECORDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub wallet_address: String,
    pub username: String,
    pub role: Role,
    pub total_points: u32,
    pub total_contributions: u32,
    pub rank: u32,
    pub is_connected: bool,
    pub is_approved: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Fields for a new user. Everything except the wallet has a default.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub wallet_address: String,
    pub username: String,
    pub role: Role,
    pub total_points: u32,
    pub total_contributions: u32,
    pub rank: u32,
    pub is_connected: bool,
    pub is_approved: bool,
}

impl NewUser {
    pub fn new(wallet_address: impl Into<String>) -> Self {
        let wallet_address = wallet_address.into();
        Self {
            username: derive_username(Role::Visitor, &wallet_address),
            wallet_address,
            role: Role::Visitor,
            total_points: 0,
            total_contributions: 0,
            rank: 0,
            is_connected: false,
            is_approved: false,
        }
    }
}

/// Partial update; `None` leaves the column untouched
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub role: Option<Role>,
    pub total_points: Option<u32>,
    pub total_contributions: Option<u32>,
    pub rank: Option<u32>,
    pub is_connected: Option<bool>,
    pub is_approved: Option<bool>,
}

/// `Ambassador_AB12` style name from the role and the last four characters
pub fn derive_username(role: Role, wallet_address: &str) -> String {
    let chars: Vec<char> = wallet_address.chars().collect();
    let suffix: String = chars[chars.len().saturating_sub(4)..].iter().collect();
    format!("{}_{}", role.username_prefix(), suffix)
}

/// Session row. Only the SHA-256 digest of the token is kept.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token_hash: String,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contribution {
    pub id: i64,
    pub user_id: i64,
    #[serde(rename = "type")]
    pub kind: ContributionType,
    pub url: String,
    pub description: Option<String>,
    pub points: u32,
    pub status: ContributionStatus,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewContribution {
    pub user_id: i64,
    pub kind: ContributionType,
    pub url: String,
    pub description: Option<String>,
    pub points: u32,
    pub status: ContributionStatus,
}

// ============================================================================
// PROJECTIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_contributions: u64,
    pub user_contributions: u32,
    pub user_rank: u32,
    pub total_points: u32,
    pub weekly_growth: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub wallet_address: String,
    pub username: String,
    pub total_points: u32,
    pub total_contributions: u32,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionActivity {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: ContributionType,
    pub description: String,
    pub points: u32,
    pub created_at: DateTime<Utc>,
    pub status: ContributionStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_table() {
        assert_eq!(ContributionType::Twitter.points(), 1);
        assert_eq!(ContributionType::Github.points(), 2);
        assert_eq!(ContributionType::Discord.points(), 1);
        assert_eq!(ContributionType::Medium.points(), 3);
    }

    #[test]
    fn test_unknown_type_is_validation_error() {
        let err = "youtube".parse::<ContributionType>().unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[test]
    fn test_derive_username() {
        assert_eq!(
            derive_username(Role::Ambassador, "QUBIC1234XYZAB"),
            "Ambassador_YZAB"
        );
        assert_eq!(derive_username(Role::Visitor, "0x1"), "Visitor_0x1");
    }

    #[test]
    fn test_role_order() {
        assert!(Role::Admin.outranks(Role::Ambassador));
        assert!(Role::Ambassador.outranks(Role::Visitor));
        assert!(!Role::Visitor.outranks(Role::Visitor));
    }

    #[test]
    fn test_contribution_serializes_type_field() {
        let contribution = Contribution {
            id: 1,
            user_id: 2,
            kind: ContributionType::Github,
            url: "https://github.com/qubic/core/pull/1".to_string(),
            description: None,
            points: 2,
            status: ContributionStatus::Approved,
            created_at: Utc::now(),
            reviewed_at: None,
            reviewed_by: None,
        };
        let value = serde_json::to_value(&contribution).unwrap();
        assert_eq!(value["type"], "github");
        assert_eq!(value["status"], "approved");
        assert_eq!(value["userId"], 2);
    }
}
