//! Pre-shared key challenge/response for the status-query channel.
//!
//! Each side proves knowledge of the key by returning
//! `HMAC-SHA256(key, nonce)` for a random nonce chosen by its peer. Nonces and
//! digests travel hex-encoded.

use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Length of a challenge nonce in bytes (before hex encoding)
const NONCE_BYTES: usize = 32;

/// Generate a fresh hex-encoded challenge nonce
#[must_use]
pub fn new_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

fn keyed_mac(key: &[u8], nonce: &str) -> HmacSha256 {
    // HMAC accepts keys of any length; longer keys are hashed first
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .unwrap_or_else(|_| unreachable!("HMAC-SHA256 accepts keys of any length"));
    mac.update(nonce.as_bytes());
    mac
}

/// Compute the hex-encoded answer to `nonce`
#[must_use]
pub fn digest(key: &[u8], nonce: &str) -> String {
    hex::encode(keyed_mac(key, nonce).finalize().into_bytes())
}

/// Check a hex-encoded answer in constant time
#[must_use]
pub fn verify(key: &[u8], nonce: &str, answer: &str) -> bool {
    let Ok(answer) = hex::decode(answer) else {
        return false;
    };
    keyed_mac(key, nonce).verify_slice(&answer).is_ok()
}
