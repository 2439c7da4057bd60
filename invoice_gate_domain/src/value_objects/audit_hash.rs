// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Audit Hash Value Object
//!
//! All audit digests in the engine are SHA-256 over canonical JSON and are
//! serialized as `"sha256:"` followed by 64 lowercase hex digits. Plan
//! hashes, config snapshot hashes, per-step config hashes, and the
//! compliance fingerprint all use this one format so audit records can be
//! compared across systems byte for byte.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

use crate::PipelineError;

/// A `sha256:<64 hex>` audit digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AuditHash(String);

impl AuditHash {
    /// Wraps a raw 32-byte SHA-256 digest.
    pub fn from_digest(digest: &[u8; 32]) -> Self {
        Self(format!("sha256:{}", hex::encode(digest)))
    }

    /// Parses a serialized hash, validating the prefix and hex body.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::ValidationError` if the prefix is missing or
    /// the body is not exactly 64 lowercase hex digits.
    pub fn parse(s: &str) -> Result<Self, PipelineError> {
        let hex_part = s.strip_prefix("sha256:").ok_or_else(|| {
            PipelineError::ValidationError(format!("Audit hash '{}' is missing the sha256: prefix", s))
        })?;
        if hex_part.len() != 64
            || !hex_part.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return Err(PipelineError::ValidationError(
                "Audit hash body must be 64 lowercase hex digits".to_string(),
            ));
        }
        Ok(Self(s.to_string()))
    }

    /// Returns the full serialized form, including the prefix.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the 64-character hex body without the prefix.
    pub fn hex(&self) -> &str {
        &self.0["sha256:".len()..]
    }
}

impl Display for AuditHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for AuditHash {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AuditHash> for String {
    fn from(hash: AuditHash) -> Self {
        hash.0
    }
}
