//! Webhook signature verification (HMAC-SHA256).
//!
//! Providers sign the raw request body with a shared secret and send the hex
//! digest, optionally prefixed with `sha256=`. Verification must run on the
//! exact bytes received; a body that was parsed and re-serialized will not
//! match.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

fn compute_mac(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length, so construction cannot fail.
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return Vec::new(),
    };
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Hex-encoded HMAC-SHA256 of `payload` under `secret`, without prefix.
pub fn sign_hmac_sha256(payload: &[u8], secret: &[u8]) -> String {
    hex::encode(compute_mac(payload, secret))
}

/// Verify a provider signature over the raw payload.
///
/// Accepts `sha256=<hex>` or bare `<hex>`. A missing, empty or non-hex
/// signature is rejected. Digests are compared in constant time; a length
/// mismatch short-circuits since length is not secret.
pub fn verify_hmac_sha256_signature(payload: &[u8], provided: Option<&str>, secret: &[u8]) -> bool {
    let provided = match provided.map(str::trim) {
        Some(sig) if !sig.is_empty() => sig,
        _ => return false,
    };

    let hex_digest = provided.strip_prefix(SIGNATURE_PREFIX).unwrap_or(provided);
    let Ok(candidate) = hex::decode(hex_digest) else {
        return false;
    };

    let expected = compute_mac(payload, secret);
    if expected.is_empty() || candidate.len() != expected.len() {
        return false;
    }

    candidate.ct_eq(&expected).into()
}
