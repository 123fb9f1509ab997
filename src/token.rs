//! Capability token signing.
//!
//! A token binds a target key to the millisecond it was issued:
//!
//! ```text
//! signature = base64url(HMAC-SHA256(secret, "{target}:{issued_at}"))
//! ```
//!
//! The encoding is unpadded base64url, so a token fits in a URL path segment
//! as-is. Verification recomputes the MAC and compares it in constant time.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// A signed, not yet redeemed capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub target: String,
    pub issued_at: u64,
    pub signature: String,
}

/// Derives and checks token signatures with a shared secret.
#[derive(Clone)]
pub struct TokenCodec {
    mac: HmacSha256,
}

impl TokenCodec {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            mac: HmacSha256::new_from_slice(secret).expect("HMAC-SHA256 accepts keys of any length"),
        }
    }

    /// Sign `target` as issued at `issued_at` (epoch ms).
    pub fn issue(&self, target: &str, issued_at: u64) -> Token {
        Token {
            target: target.to_string(),
            issued_at,
            signature: URL_SAFE_NO_PAD.encode(self.digest(target, issued_at)),
        }
    }

    /// True only if `signature` was produced for exactly this `(target, issued_at)`.
    pub fn verify_signature(&self, target: &str, issued_at: u64, signature: &str) -> bool {
        let Ok(provided) = URL_SAFE_NO_PAD.decode(signature) else {
            return false;
        };
        self.keyed(target, issued_at).verify_slice(&provided).is_ok()
    }

    fn digest(&self, target: &str, issued_at: u64) -> Vec<u8> {
        self.keyed(target, issued_at).finalize().into_bytes().to_vec()
    }

    fn keyed(&self, target: &str, issued_at: u64) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(target.as_bytes());
        mac.update(b":");
        mac.update(issued_at.to_string().as_bytes());
        mac
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}
