//! ECDSA signature verification for inbound provider events.
//!
//! Signatures arrive base64-encoded (DER or fixed-width encoding) over the
//! exact raw request bytes. Verification is fail-closed: every failure mode
//! collapses to `false`, nothing escapes to the caller.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use k256::ecdsa::signature::Verifier;
use k256::ecdsa::Signature;
use std::sync::Arc;

use super::keys::KeyCache;

pub struct SignatureVerifier {
    keys: Arc<KeyCache>,
}

impl SignatureVerifier {
    pub fn new(keys: Arc<KeyCache>) -> Self {
        Self { keys }
    }

    /// Verify `signature_b64` over `raw_body`.
    ///
    /// Candidate keys are tried newest-to-oldest among keys valid at
    /// `claimed_time`, then the rest. Returns `true` on the first key that
    /// verifies; `false` if decoding fails, parsing fails, or no key matches.
    pub fn verify(
        &self,
        raw_body: &[u8],
        signature_b64: &str,
        claimed_time: DateTime<Utc>,
    ) -> bool {
        let signature_bytes = match BASE64.decode(signature_b64.trim()) {
            Ok(b) => b,
            Err(_) => return false,
        };

        let signature = match Signature::from_der(&signature_bytes)
            .or_else(|_| Signature::from_slice(&signature_bytes))
        {
            Ok(s) => s,
            Err(_) => return false,
        };

        self.keys
            .candidates(claimed_time)
            .iter()
            .any(|key| key.verify(raw_body, &signature).is_ok())
    }
}
