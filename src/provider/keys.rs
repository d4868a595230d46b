//! Provider public-key cache.
//!
//! The provider signs webhook bodies with a rotating set of ECDSA keys and
//! publishes the current and historical public keys on a key-distribution
//! endpoint. The cache fetches the whole set, keeps it ordered newest-first,
//! and selects verification candidates by the signature's claimed time.
//!
//! Construction fails without keys: no verifier may exist that cannot verify.

use chrono::{DateTime, Utc};
use k256::ecdsa::VerifyingKey;
use k256::pkcs8::DecodePublicKey;
use serde::Deserialize;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyCacheError {
    #[error("key fetch failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("key endpoint returned status {0}")]
    Status(u16),
    #[error("key endpoint returned no keys")]
    EmptyKeySet,
    #[error("invalid public key PEM: {0}")]
    InvalidPem(String),
}

/// One published verification key with its issuance time.
#[derive(Debug, Clone)]
pub struct ProviderKey {
    pub key: VerifyingKey,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct PublicKeyListBody {
    #[serde(rename = "publicKeys")]
    public_keys: Vec<PublicKeyBody>,
}

#[derive(Debug, Deserialize)]
struct PublicKeyBody {
    content: String,
    created: DateTime<Utc>,
}

pub struct KeyCache {
    endpoint: String,
    http: reqwest::Client,
    /// Ordered by `created` descending. Never empty after construction.
    keys: RwLock<Vec<ProviderKey>>,
}

impl KeyCache {
    /// Fetch the full key set from `{base_url}/v2/public-key`.
    ///
    /// A non-success response or an empty key set is fatal.
    pub async fn fetch(base_url: &str) -> Result<Self, KeyCacheError> {
        let http = reqwest::Client::new();
        let endpoint = format!("{}/v2/public-key", base_url.trim_end_matches('/'));
        let keys = Self::fetch_keys(&http, &endpoint).await?;
        Ok(Self {
            endpoint,
            http,
            keys: RwLock::new(keys),
        })
    }

    /// Build a cache from already-parsed keys. Used by tests and by callers
    /// that source keys outside the distribution endpoint.
    pub fn from_keys(mut keys: Vec<ProviderKey>) -> Result<Self, KeyCacheError> {
        if keys.is_empty() {
            return Err(KeyCacheError::EmptyKeySet);
        }
        keys.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(Self {
            endpoint: String::new(),
            http: reqwest::Client::new(),
            keys: RwLock::new(keys),
        })
    }

    /// Re-fetch the whole set, replacing the cache on success. The previous
    /// set is kept on any failure.
    pub async fn refresh(&self) -> Result<(), KeyCacheError> {
        let keys = Self::fetch_keys(&self.http, &self.endpoint).await?;
        *self.keys.write().expect("key cache lock poisoned") = keys;
        Ok(())
    }

    async fn fetch_keys(
        http: &reqwest::Client,
        endpoint: &str,
    ) -> Result<Vec<ProviderKey>, KeyCacheError> {
        let response = http.get(endpoint).send().await?;
        if !response.status().is_success() {
            return Err(KeyCacheError::Status(response.status().as_u16()));
        }
        let body: PublicKeyListBody = response.json().await?;

        let mut keys = Vec::with_capacity(body.public_keys.len());
        for entry in body.public_keys {
            let key = VerifyingKey::from_public_key_pem(&entry.content)
                .map_err(|e| KeyCacheError::InvalidPem(e.to_string()))?;
            keys.push(ProviderKey {
                key,
                created: entry.created,
            });
        }
        if keys.is_empty() {
            return Err(KeyCacheError::EmptyKeySet);
        }
        keys.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(keys)
    }

    /// Verification candidates for a signature claiming `claimed_time`.
    ///
    /// Keys issued at or before the claimed time come first (newest first);
    /// the remaining keys follow as a fallback so an ambiguous claimed time
    /// can still verify. Extra candidates cost cycles, never correctness.
    pub fn candidates(&self, claimed_time: DateTime<Utc>) -> Vec<VerifyingKey> {
        let keys = self.keys.read().expect("key cache lock poisoned");
        let (mut eligible, rest): (Vec<_>, Vec<_>) =
            keys.iter().partition(|k| k.created <= claimed_time);
        eligible.extend(rest);
        eligible.into_iter().map(|k| k.key).collect()
    }

    pub fn len(&self) -> usize {
        self.keys.read().expect("key cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
