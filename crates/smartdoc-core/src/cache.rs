//! Cache keys, image fingerprints, and deterministic chunk identifiers.
//!
//! A vision analysis is cached under `(fingerprint, normalized query
//! context)`. Two analyses with the same key are the same analysis: the
//! registry overwrites, and the persisted chunk id derived from the key is
//! identical, so re-adding it is a no-op.
//!
//! # Normalization
//!
//! Query context is trimmed, lowercased, and internal whitespace runs are
//! collapsed to a single space. No other folding is done; `"SPI pins"` and
//! `"spi pins?"` are different keys.

use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Namespace for UUID v5 ids of reprocessed chunks.
const REPROCESSED_CHUNK_NAMESPACE: Uuid = Uuid::from_u128(0x5d0c_7a1e_9b2f_4c83_a6e4_1f0b_32d9_c7e5);

/// Strongly-typed cache key. Equality is field-wise on the normalized form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CacheKey {
    pub fingerprint: String,
    pub query_context: String,
}

impl CacheKey {
    /// Build a key, normalizing `query` on the way in.
    pub fn new(fingerprint: impl Into<String>, query: &str) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            query_context: normalize_query_context(query),
        }
    }

    /// Deterministic id for the chunk that persists this analysis.
    pub fn chunk_id(&self) -> String {
        let name = format!("{}\u{1f}{}", self.fingerprint, self.query_context);
        Uuid::new_v5(&REPROCESSED_CHUNK_NAMESPACE, name.as_bytes()).to_string()
    }
}

/// Trim, case-fold, and collapse whitespace.
pub fn normalize_query_context(query: &str) -> String {
    query
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// SHA-256 of the image bytes, lowercase hex.
pub fn fingerprint_image(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
