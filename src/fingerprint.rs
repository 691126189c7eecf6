//! Request fingerprints.
//!
//! A fingerprint is the lowercase hex SHA-256 of the canonical JSON encoding
//! of a request: object keys sorted, no whitespace. Two requests that
//! serialize to equal JSON get the same key on every run.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Returns the fingerprint of `request`.
pub fn fingerprint<T: Serialize + ?Sized>(request: &T) -> Result<String> {
    let canonical = serde_json::to_vec(&serde_json::to_value(request)?)?;

    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Returns `"{namespace}:{fingerprint}"`, keeping keys of different
/// operations apart.
pub fn fingerprint_with_namespace<T: Serialize + ?Sized>(
    namespace: &str,
    request: &T,
) -> Result<String> {
    Ok(format!("{}:{}", namespace, fingerprint(request)?))
}
