// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Canonical JSON Hashing
//!
//! Reproducible canonicalization and SHA-256 hashing for audit records.
//!
//! ## Canonicalization rules
//!
//! Canonical form follows RFC 8785 (JSON Canonicalization Scheme) with an
//! additional Unicode normalization pass:
//!
//! - Object keys sort lexicographically at every nesting level
//! - Arrays preserve their order
//! - Strings (keys and values) are NFC-normalized
//! - Numbers use the shortest round-trip representation
//! - No insignificant whitespace
//!
//! Two semantically equal values (same keys and values, any key order, any
//! whitespace, any Unicode normalization form, freshly reconstructed
//! objects) always canonicalize to the same byte sequence, so plan hashes
//! and config snapshot hashes are stable across processes, machines, and
//! releases. The NFC pass matters for party names and free-text config
//! values: `é` arrives precomposed from some producers and decomposed from
//! others, and both must hash identically.
//!
//! ## Usage
//!
//! ```
//! use invoice_gate_domain::services::canonical_json::canonical_hash;
//!
//! let a = canonical_hash(&serde_json::json!({"b": 1, "a": [1, 2]})).unwrap();
//! let b = canonical_hash(&serde_json::json!({"a": [1, 2], "b": 1})).unwrap();
//! assert_eq!(a, b);
//! ```

use serde::Serialize;
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

use crate::value_objects::AuditHash;
use crate::PipelineError;

/// NFC-normalizes every string (keys included) in a JSON tree.
fn normalize_strings(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => serde_json::Value::String(s.nfc().collect()),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(normalize_strings).collect())
        }
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter()
                .map(|(key, inner)| (key.nfc().collect::<String>(), normalize_strings(inner)))
                .collect(),
        ),
        other => other,
    }
}

/// Serializes a value into canonical JSON bytes (RFC 8785 + NFC strings).
///
/// # Errors
///
/// Returns `PipelineError::SerializationError` when the value contains
/// something JSON cannot represent (non-string map keys, NaN floats).
pub fn canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, PipelineError> {
    let tree = serde_json::to_value(value)
        .map_err(|e| PipelineError::SerializationError(format!("Canonicalization failed: {}", e)))?;
    serde_jcs::to_vec(&normalize_strings(tree))
        .map_err(|e| PipelineError::SerializationError(format!("Canonicalization failed: {}", e)))
}

/// Canonicalizes a value and returns its SHA-256 audit hash.
pub fn canonical_hash<T: Serialize>(value: &T) -> Result<AuditHash, PipelineError> {
    let bytes = canonical_json_bytes(value)?;
    let digest: [u8; 32] = Sha256::digest(&bytes).into();
    Ok(AuditHash::from_digest(&digest))
}
