//! Authentication service: wallet connects, session issue/validate/revoke
//!
//! Sessions expire lazily. `validate` compares `expires_at` against the
//! clock on every call and never extends it; rows are swept separately by
//! [`AuthService::purge_expired`].

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::auth::{
    generate_session_token, hash_session_token, AmbassadorPolicy, CredentialVerifier,
    WalletCredentials,
};
use crate::error::{LedgerError, LedgerResult};
use crate::models::{derive_username, NewUser, Role, Session, User, UserUpdate};
use crate::storage::LedgerStorage;

/// Returned once at login. The plain token is never stored.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

pub struct AuthService {
    storage: Arc<LedgerStorage>,
    verifier: Arc<dyn CredentialVerifier>,
    policy: AmbassadorPolicy,
    session_ttl: Duration,
}

impl AuthService {
    pub fn new(
        storage: Arc<LedgerStorage>,
        verifier: Arc<dyn CredentialVerifier>,
        policy: AmbassadorPolicy,
        session_ttl: Duration,
    ) -> Self {
        Self {
            storage,
            verifier,
            policy,
            session_ttl,
        }
    }

    /// Verify wallet ownership, connect the wallet and open a session
    pub fn login(
        &self,
        wallet_address: &str,
        credentials: &WalletCredentials,
    ) -> LedgerResult<IssuedSession> {
        let wallet_address = normalize_wallet(wallet_address)?;

        if !self.verifier.verify(wallet_address, credentials) {
            warn!("Rejected login for {}: invalid signature", wallet_address);
            return Err(LedgerError::auth("Invalid wallet signature"));
        }

        let user = self.connect_wallet(wallet_address)?;

        let token = generate_session_token();
        let created_at = Utc::now();
        let session = Session {
            token_hash: hash_session_token(&token),
            user_id: user.id,
            created_at,
            expires_at: created_at + self.session_ttl,
        };
        self.storage.insert_session(&session)?;

        info!("User {} logged in ({})", user.id, user.role);
        Ok(IssuedSession {
            token,
            expires_at: session.expires_at,
            user,
        })
    }

    /// Resolve a bearer token to its user
    pub fn validate(&self, token: &str) -> LedgerResult<User> {
        if token.is_empty() {
            return Err(LedgerError::auth("Missing session token"));
        }

        let (session, user) = self
            .storage
            .find_session_with_user(&hash_session_token(token))?
            .ok_or_else(|| LedgerError::auth("Invalid or revoked session"))?;

        if !session.is_valid_at(Utc::now()) {
            debug!("Session for user {} expired at {}", user.id, session.expires_at);
            return Err(LedgerError::auth("Session expired"));
        }

        Ok(user)
    }

    /// Revoke a session. Returns whether one existed.
    pub fn logout(&self, token: &str) -> LedgerResult<bool> {
        let removed = self.storage.delete_session(&hash_session_token(token))?;
        if removed {
            debug!("Session revoked");
        }
        Ok(removed)
    }

    /// Upsert the wallet's user and mark it connected. The first connect is
    /// the signup; later connects may promote but never demote.
    pub fn connect_wallet(&self, wallet_address: &str) -> LedgerResult<User> {
        let wallet_address = normalize_wallet(wallet_address)?;

        let existing = match self.storage.find_user_by_wallet(wallet_address)? {
            Some(user) => user,
            None => {
                let role = self.policy.role_for(wallet_address);
                match self.create_connected_user(wallet_address, role) {
                    Ok(user) => return Ok(user),
                    // Lost a race with a concurrent first connect
                    Err(LedgerError::Conflict(_)) => self
                        .storage
                        .find_user_by_wallet(wallet_address)?
                        .ok_or_else(|| {
                            LedgerError::Internal(format!("Wallet {} vanished", wallet_address))
                        })?,
                    Err(e) => return Err(e),
                }
            }
        };

        // Lookups ignore case but the predicate does not, so judge the
        // address as it was first registered.
        let role = self.policy.role_for(&existing.wallet_address);

        let mut update = UserUpdate {
            is_connected: Some(true),
            ..Default::default()
        };
        if role.outranks(existing.role) {
            info!(
                "Promoting user {} from {} to {}",
                existing.id, existing.role, role
            );
            update.role = Some(role);
            update.is_approved = Some(true);
        }

        self.storage
            .update_user(existing.id, &update)?
            .ok_or_else(|| LedgerError::not_found(format!("User {} not found", existing.id)))
    }

    fn create_connected_user(&self, wallet_address: &str, role: Role) -> LedgerResult<User> {
        let new_user = NewUser {
            username: derive_username(role, wallet_address),
            role,
            is_connected: true,
            is_approved: role != Role::Visitor,
            ..NewUser::new(wallet_address)
        };
        let user = self.storage.create_user(&new_user)?;
        self.storage.recompute_ranks()?;

        info!(
            "New {} connected: {} (user {})",
            user.role, user.wallet_address, user.id
        );

        self.storage
            .find_user_by_id(user.id)?
            .ok_or_else(|| LedgerError::Internal(format!("User {} vanished", user.id)))
    }

    /// Mark the wallet disconnected. Unknown wallets are ignored.
    pub fn disconnect_wallet(&self, wallet_address: &str) -> LedgerResult<()> {
        let Some(user) = self.storage.find_user_by_wallet(wallet_address.trim())? else {
            debug!("Disconnect for unknown wallet {}", wallet_address);
            return Ok(());
        };

        self.storage.update_user(
            user.id,
            &UserUpdate {
                is_connected: Some(false),
                ..Default::default()
            },
        )?;
        debug!("User {} disconnected", user.id);
        Ok(())
    }

    /// Admin grants a role and marks the user approved
    pub fn approve_user(&self, admin: &User, user_id: i64, role: Role) -> LedgerResult<User> {
        require_admin(admin)?;

        let user = self
            .storage
            .update_user(
                user_id,
                &UserUpdate {
                    role: Some(role),
                    is_approved: Some(true),
                    ..Default::default()
                },
            )?
            .ok_or_else(|| LedgerError::not_found(format!("User {} not found", user_id)))?;

        info!("Admin {} approved user {} as {}", admin.id, user.id, role);
        Ok(user)
    }

    /// Delete sessions whose expiry has passed
    pub fn purge_expired(&self) -> LedgerResult<usize> {
        let purged = self.storage.purge_expired_sessions(Utc::now())?;
        if purged > 0 {
            info!("Purged {} expired sessions", purged);
        }
        Ok(purged)
    }
}

pub(crate) fn require_admin(user: &User) -> LedgerResult<()> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(LedgerError::forbidden("Admin role required"))
    }
}

fn normalize_wallet(wallet_address: &str) -> LedgerResult<&str> {
    let trimmed = wallet_address.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::validation("Wallet address is required"));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MockSignatureVerifier, Sr25519Verifier};

    const AMBASSADOR_WALLET: &str =
        "QUBIC1234AMBASSADORWALLETXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXX";
    const VISITOR_WALLET: &str =
        "0xABCDEF0123456789ABCDEF0123456789ABCDEF0123456789ABCDEF0123456789";

    fn service_with(verifier: Arc<dyn CredentialVerifier>, ttl: Duration) -> AuthService {
        let storage = Arc::new(LedgerStorage::in_memory().unwrap());
        AuthService::new(storage, verifier, AmbassadorPolicy::default(), ttl)
    }

    fn service() -> AuthService {
        service_with(Arc::new(MockSignatureVerifier), Duration::days(7))
    }

    fn mock_credentials() -> WalletCredentials {
        WalletCredentials {
            public_key: "P".repeat(64),
            signature: "mock_signature_1700000000".to_string(),
            timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn test_connect_ambassador_wallet() {
        let service = service();
        let user = service.connect_wallet(AMBASSADOR_WALLET).unwrap();

        assert_eq!(user.role, Role::Ambassador);
        assert!(user.is_approved);
        assert!(user.is_connected);
        assert_eq!(user.username, "Ambassador_XXXX");
        assert_eq!(user.rank, 1);
    }

    #[test]
    fn test_connect_visitor_wallet() {
        let service = service();
        let user = service.connect_wallet(VISITOR_WALLET).unwrap();

        assert_eq!(user.role, Role::Visitor);
        assert!(!user.is_approved);
        assert_eq!(user.username, "Visitor_6789");
    }

    #[test]
    fn test_connect_rejects_blank_wallet() {
        let err = service().connect_wallet("   ").unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[test]
    fn test_reconnect_never_demotes() {
        let service = service();
        let user = service.connect_wallet(VISITOR_WALLET).unwrap();
        let admin_user = service
            .approve_user(
                &User {
                    role: Role::Admin,
                    ..user.clone()
                },
                user.id,
                Role::Ambassador,
            )
            .unwrap();
        assert_eq!(admin_user.role, Role::Ambassador);

        service.disconnect_wallet(VISITOR_WALLET).unwrap();
        let again = service.connect_wallet(VISITOR_WALLET).unwrap();
        assert_eq!(again.id, user.id);
        assert_eq!(again.role, Role::Ambassador);
        assert!(again.is_approved);
        assert!(again.is_connected);
    }

    #[test]
    fn test_recased_wallet_does_not_promote() {
        let service = service();
        let lower = "qubic1234lowercasewallet";
        let user = service.connect_wallet(lower).unwrap();
        assert_eq!(user.role, Role::Visitor);
        assert!(!user.is_approved);

        let again = service.connect_wallet(&lower.to_uppercase()).unwrap();
        assert_eq!(again.id, user.id);
        assert_eq!(again.role, Role::Visitor);
        assert!(!again.is_approved);
        assert_eq!(again.wallet_address, lower);
    }

    #[test]
    fn test_recased_ambassador_wallet_keeps_role() {
        let service = service();
        let user = service.connect_wallet(AMBASSADOR_WALLET).unwrap();

        let again = service
            .connect_wallet(&AMBASSADOR_WALLET.to_lowercase())
            .unwrap();
        assert_eq!(again.id, user.id);
        assert_eq!(again.role, Role::Ambassador);
        assert!(again.is_approved);
    }

    #[test]
    fn test_disconnect_unknown_wallet_is_noop() {
        let service = service();
        service.disconnect_wallet("0xNOBODY").unwrap();

        service.connect_wallet(VISITOR_WALLET).unwrap();
        service.disconnect_wallet(&VISITOR_WALLET.to_lowercase()).unwrap();
        let user = service
            .storage
            .find_user_by_wallet(VISITOR_WALLET)
            .unwrap()
            .unwrap();
        assert!(!user.is_connected);
    }

    #[test]
    fn test_login_validate_logout() {
        let service = service();
        let issued = service
            .login(AMBASSADOR_WALLET, &mock_credentials())
            .unwrap();
        assert_eq!(issued.token.len(), 64);
        assert!(issued.expires_at > Utc::now() + Duration::days(6));

        let user = service.validate(&issued.token).unwrap();
        assert_eq!(user.id, issued.user.id);

        assert!(service.logout(&issued.token).unwrap());
        assert!(!service.logout(&issued.token).unwrap());

        let err = service.validate(&issued.token).unwrap_err();
        assert!(matches!(err, LedgerError::Auth(_)));
    }

    #[test]
    fn test_login_rejects_bad_credentials() {
        let service = service();
        let credentials = WalletCredentials {
            signature: "forged".to_string(),
            ..mock_credentials()
        };
        let err = service.login(AMBASSADOR_WALLET, &credentials).unwrap_err();
        assert!(matches!(err, LedgerError::Auth(_)));
        assert!(service.storage.list_users().unwrap().is_empty());
    }

    #[test]
    fn test_expired_session_is_rejected() {
        let service = service_with(Arc::new(MockSignatureVerifier), Duration::zero());
        let issued = service
            .login(AMBASSADOR_WALLET, &mock_credentials())
            .unwrap();

        let err = service.validate(&issued.token).unwrap_err();
        assert!(matches!(err, LedgerError::Auth(_)));

        assert_eq!(service.purge_expired().unwrap(), 1);
        assert!(!service.logout(&issued.token).unwrap());
    }

    #[test]
    fn test_unknown_token_is_rejected() {
        let service = service();
        assert!(matches!(
            service.validate("deadbeef").unwrap_err(),
            LedgerError::Auth(_)
        ));
        assert!(matches!(service.validate("").unwrap_err(), LedgerError::Auth(_)));
    }

    #[test]
    fn test_sr25519_login() {
        use sp_core::crypto::Ss58Codec;
        use sp_core::Pair;

        let pair = sp_core::sr25519::Pair::from_string("//Alice", None).unwrap();
        let address = pair.public().to_ss58check();
        let timestamp = Utc::now().timestamp();
        let signature =
            pair.sign(crate::auth::create_login_message(&address, timestamp).as_bytes());
        let sig: &[u8] = signature.as_ref();

        let service = service_with(Arc::new(Sr25519Verifier::default()), Duration::hours(1));
        let issued = service
            .login(
                &address,
                &WalletCredentials {
                    public_key: String::new(),
                    signature: hex::encode(sig),
                    timestamp,
                },
            )
            .unwrap();
        assert_eq!(issued.user.wallet_address, address);
        assert_eq!(issued.user.role, Role::Visitor);
    }

    #[test]
    fn test_approve_requires_admin() {
        let service = service();
        let visitor = service.connect_wallet(VISITOR_WALLET).unwrap();
        let err = service
            .approve_user(&visitor, visitor.id, Role::Admin)
            .unwrap_err();
        assert!(matches!(err, LedgerError::Forbidden(_)));

        let admin = User {
            role: Role::Admin,
            ..visitor.clone()
        };
        let err = service.approve_user(&admin, 999, Role::Ambassador).unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[test]
    fn test_admin_wallet_from_policy() {
        let storage = Arc::new(LedgerStorage::in_memory().unwrap());
        let policy = AmbassadorPolicy::new(Vec::new(), Vec::new(), vec!["0xBOSS".to_string()]);
        let service = AuthService::new(
            storage,
            Arc::new(MockSignatureVerifier),
            policy,
            Duration::hours(1),
        );

        let user = service.connect_wallet("0xBOSS").unwrap();
        assert_eq!(user.role, Role::Admin);
        assert!(user.is_approved);
        assert_eq!(user.username, "Admin_BOSS");
    }
}
