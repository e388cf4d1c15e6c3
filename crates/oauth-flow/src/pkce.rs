//! PKCE (Proof Key for Code Exchange) implementation per RFC 7636
//!
//! Optional hardening for the consent flow: the challenge goes into the
//! authorization URL and the verifier into the token exchange, so a stolen
//! authorization code is useless without this process's verifier.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};

/// Challenge method sent alongside the challenge.
pub const CHALLENGE_METHOD: &str = "S256";

/// A verifier and the challenge derived from it.
#[derive(Debug, Clone)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    pub fn generate() -> Self {
        let verifier = generate_verifier();
        let challenge = compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

/// Generate a cryptographically random PKCE code verifier.
///
/// 96 random bytes encoded as URL-safe base64 (no padding) gives 128
/// characters, the maximum RFC 7636 allows.
pub fn generate_verifier() -> String {
    let mut bytes = [0u8; 96];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compute the S256 code challenge from a verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}
