//! Wallet authentication primitives
//!
//! - Credential verification (sr25519 over SS58 addresses, or the demo mock scheme)
//! - Ambassador predicate over wallet addresses
//! - Session token generation and hashing

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sp_core::crypto::Ss58Codec;
use sp_core::sr25519::{Public, Signature};
use tracing::debug;

use crate::config::AuthConfig;
use crate::models::Role;

/// Proof of wallet ownership submitted at login
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletCredentials {
    #[serde(default)]
    pub public_key: String,
    pub signature: String,
    #[serde(default)]
    pub timestamp: i64,
}

/// Decides whether a set of credentials proves control of a wallet
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, wallet_address: &str, credentials: &WalletCredentials) -> bool;
}

// ============================================================================
// SR25519
// ============================================================================

/// Wallet addresses are SS58 sr25519 keys; the signature covers
/// [`create_login_message`] and must be recent.
pub struct Sr25519Verifier {
    window_secs: i64,
}

impl Sr25519Verifier {
    pub fn new(window_secs: i64) -> Self {
        Self { window_secs }
    }
}

impl Default for Sr25519Verifier {
    fn default() -> Self {
        Self::new(DEFAULT_LOGIN_WINDOW_SECS)
    }
}

impl CredentialVerifier for Sr25519Verifier {
    fn verify(&self, wallet_address: &str, credentials: &WalletCredentials) -> bool {
        if !is_valid_ss58_address(wallet_address) {
            debug!("Not an SS58 address: {}", wallet_address);
            return false;
        }

        if !is_timestamp_valid(credentials.timestamp, self.window_secs) {
            debug!(
                "Login timestamp {} outside {}s window",
                credentials.timestamp, self.window_secs
            );
            return false;
        }

        if !public_key_matches(wallet_address, &credentials.public_key) {
            debug!("Public key does not belong to {}", wallet_address);
            return false;
        }

        let message = create_login_message(wallet_address, credentials.timestamp);
        verify_signature(wallet_address, &message, &credentials.signature)
    }
}

/// An empty public key defers to the address. Otherwise it must be the
/// address itself or the hex encoding of the key it carries.
fn public_key_matches(wallet_address: &str, public_key: &str) -> bool {
    if public_key.is_empty() || public_key == wallet_address {
        return true;
    }

    let Ok(address_key) = Public::from_ss58check(wallet_address) else {
        return false;
    };
    let key_hex = public_key.strip_prefix("0x").unwrap_or(public_key);
    match hex::decode(key_hex) {
        Ok(bytes) => bytes.as_slice() == AsRef::<[u8]>::as_ref(&address_key),
        Err(_) => false,
    }
}

/// Check if a string is a valid SS58-encoded sr25519 public key
pub fn is_valid_ss58_address(address: &str) -> bool {
    if address.len() < 40 || address.len() > 60 {
        return false;
    }
    Public::from_ss58check(address).is_ok()
}

/// Verify an sr25519 signature
pub fn verify_signature(address: &str, message: &str, signature_hex: &str) -> bool {
    let public_key = match Public::from_ss58check(address) {
        Ok(pk) => pk,
        Err(e) => {
            debug!("Failed to parse SS58 address: {}", e);
            return false;
        }
    };

    let sig_hex = signature_hex
        .strip_prefix("0x")
        .unwrap_or(signature_hex)
        .to_lowercase();

    let sig_bytes = match hex::decode(&sig_hex) {
        Ok(b) => b,
        Err(e) => {
            debug!("Failed to decode signature hex: {}", e);
            return false;
        }
    };

    let sig_array: [u8; 64] = match sig_bytes.try_into() {
        Ok(array) => array,
        Err(bytes) => {
            debug!("Invalid signature length: {} (expected 64)", bytes.len());
            return false;
        }
    };
    let signature = Signature::from_raw(sig_array);

    use sp_core::Pair;
    sp_core::sr25519::Pair::verify(&signature, message.as_bytes(), &public_key)
}

/// Message a wallet signs to log in
pub fn create_login_message(wallet_address: &str, timestamp: i64) -> String {
    format!("qubic_connect:{}:{}", wallet_address, timestamp)
}

pub const DEFAULT_LOGIN_WINDOW_SECS: i64 = 5 * 60;

/// Only past timestamps within the window are accepted
pub fn is_timestamp_valid(timestamp: i64, window_secs: i64) -> bool {
    let now = chrono::Utc::now().timestamp();
    timestamp <= now && (now - timestamp) < window_secs
}

// ============================================================================
// MOCK
// ============================================================================

pub const MOCK_SIGNATURE_PREFIX: &str = "mock_signature_";
const MOCK_MIN_KEY_LEN: usize = 60;

/// Demo scheme for local development. Any long address and key pass as
/// long as the signature carries the mock prefix.
#[derive(Default)]
pub struct MockSignatureVerifier;

impl CredentialVerifier for MockSignatureVerifier {
    fn verify(&self, wallet_address: &str, credentials: &WalletCredentials) -> bool {
        wallet_address.len() >= MOCK_MIN_KEY_LEN
            && credentials.public_key.len() >= MOCK_MIN_KEY_LEN
            && credentials.signature.starts_with(MOCK_SIGNATURE_PREFIX)
    }
}

// ============================================================================
// AMBASSADOR POLICY
// ============================================================================

/// Decides which role a freshly connected wallet receives
#[derive(Debug, Clone)]
pub struct AmbassadorPolicy {
    prefixes: Vec<String>,
    markers: Vec<String>,
    admin_wallets: Vec<String>,
}

impl AmbassadorPolicy {
    pub fn new(prefixes: Vec<String>, markers: Vec<String>, admin_wallets: Vec<String>) -> Self {
        Self {
            prefixes,
            markers,
            admin_wallets,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            config.ambassador_prefixes.clone(),
            config.ambassador_markers.clone(),
            config.admin_wallets.clone(),
        )
    }

    pub fn is_ambassador_wallet(&self, wallet_address: &str) -> bool {
        self.prefixes.iter().any(|p| wallet_address.starts_with(p.as_str()))
            || self.markers.iter().any(|m| wallet_address.contains(m.as_str()))
    }

    pub fn is_admin_wallet(&self, wallet_address: &str) -> bool {
        self.admin_wallets
            .iter()
            .any(|w| w.eq_ignore_ascii_case(wallet_address))
    }

    pub fn role_for(&self, wallet_address: &str) -> Role {
        if self.is_admin_wallet(wallet_address) {
            Role::Admin
        } else if self.is_ambassador_wallet(wallet_address) {
            Role::Ambassador
        } else {
            Role::Visitor
        }
    }
}

impl Default for AmbassadorPolicy {
    fn default() -> Self {
        Self::new(
            vec!["QUBIC1234".to_string(), "QUBIC9876".to_string()],
            vec!["AMBASSADOR".to_string()],
            Vec::new(),
        )
    }
}

// ============================================================================
// TOKENS
// ============================================================================

/// 32 random bytes, hex encoded
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Only this digest is ever persisted
pub fn hash_session_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
