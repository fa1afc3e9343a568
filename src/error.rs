//! Error taxonomy for the ledger
//!
//! Every operation reports one of these synchronously. The HTTP layer maps
//! them onto status codes in `server.rs`.

use thiserror::Error;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Malformed input or a URL that does not match its contribution type
    #[error("{0}")]
    Validation(String),

    /// Uniqueness violation (wallet address, contribution URL)
    #[error("{0}")]
    Conflict(String),

    /// Bad credentials, or a missing, expired or revoked session
    #[error("{0}")]
    Auth(String),

    /// Authenticated, but the role does not allow the operation
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        LedgerError::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        LedgerError::Conflict(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        LedgerError::Auth(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        LedgerError::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        LedgerError::NotFound(msg.into())
    }
}

/// True when a rusqlite error is a UNIQUE/PRIMARY KEY constraint failure
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == rusqlite::ErrorCode::ConstraintViolation
                && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        }
        _ => false,
    }
}
