//! Agent token generation and hashing.
//!
//! Tokens are random alphanumeric strings issued exactly once at agent
//! registration. Only the SHA-256 hex digest is stored; authentication
//! re-hashes the presented bearer token and compares digests in constant
//! time.

use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Length of a generated agent token.
pub const TOKEN_LENGTH: usize = 48;

/// A freshly generated agent token.
pub struct GeneratedToken {
    /// The plaintext token (returned to the agent exactly once).
    pub plaintext: String,
    /// SHA-256 hex digest stored in the database.
    pub hash: String,
}

/// Generate a new random agent token.
pub fn generate_token() -> GeneratedToken {
    let plaintext: String = rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect();
    let hash = hash_token(&plaintext);
    GeneratedToken { plaintext, hash }
}

/// Compute the SHA-256 hex digest of a token.
pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Constant-time comparison of a presented token against a stored digest.
pub fn verify_token(presented: &str, stored_hash: &str) -> bool {
    let presented_hash = hash_token(presented);
    presented_hash
        .as_bytes()
        .ct_eq(stored_hash.as_bytes())
        .into()
}
