//! Content-addressed entry key generation.

use sha2::{Digest, Sha256};

/// Compute the primary key of a store entry from its store name and request identity.
pub fn compute_entry_hash(store_name: &str, key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(store_name.as_bytes());
    hasher.update(b"\n");
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}
