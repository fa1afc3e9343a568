//! Ambassador Ledger - Reward ambassadors for verifiable contributions
//!
//! Ambassadors connect a wallet, submit links to their public work (tweets,
//! GitHub commits and pull requests, Discord messages, Medium articles) and
//! earn points. Points drive a ranked leaderboard and per-user dashboards.
//!
//! # How it works
//!
//! 1. A user proves wallet ownership with a signed login message
//! 2. The first connect creates the user; ambassador wallets are approved
//! 3. Each submission is checked against its type's URL shape and deduplicated
//! 4. Approved contributions credit their owner and re-rank everyone atomically
//! 5. Admins review contributions; totals always equal the approved points
//!
//! # Anti-abuse measures
//!
//! - Each URL can only be claimed once (first submitter wins)
//! - Session tokens are random and only their SHA-256 digest is stored
//! - Reconnecting never demotes a user, and only admins can grant roles

pub mod auth;
pub mod config;
pub mod contributions;
pub mod error;
pub mod models;
pub mod projections;
pub mod ranking;
pub mod server;
pub mod sessions;
pub mod storage;

pub use auth::{
    AmbassadorPolicy, CredentialVerifier, MockSignatureVerifier, Sr25519Verifier,
    WalletCredentials,
};
pub use config::Config;
pub use contributions::ContributionService;
pub use error::{LedgerError, LedgerResult};
pub use projections::Projections;
pub use sessions::{AuthService, IssuedSession};
pub use storage::LedgerStorage;
