// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Run Identifier Value Object
//!
//! Type-safe identifier for a single validation run.
//!
//! ## Overview
//!
//! Runs are identified by ULIDs, which gives us:
//!
//! - **Type safety**: a `RunId` cannot be confused with other entity ids
//! - **Temporal ordering**: ULIDs sort by creation time, so audit trails and
//!   database range scans come for free
//! - **Cross-platform representation**: a 26-character Crockford base32
//!   string that is URL- and filename-safe
//!
//! The run id is minted by the orchestrator when a run starts and appears in
//! every step result, diagnostic source chain, temp-store key namespace, and
//! the final report.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use ulid::Ulid;

use crate::PipelineError;

/// Unique identifier for a validation run.
///
/// Immutable value object; equality is by id value. The inner ULID encodes
/// the creation timestamp, so `RunId` values created later order after
/// earlier ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Ulid);

impl RunId {
    /// Generates a new, time-ordered run id.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parses a run id from its canonical 26-character string form.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::ValidationError` if the string is not a valid
    /// ULID.
    pub fn parse(s: &str) -> Result<Self, PipelineError> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|e| PipelineError::ValidationError(format!("Invalid run id '{}': {}", s, e)))
    }

    /// Returns the creation timestamp encoded in the id, as epoch millis.
    pub fn timestamp_ms(&self) -> u64 {
        self.0.timestamp_ms()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
