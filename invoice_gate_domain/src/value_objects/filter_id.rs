// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Filter Identifier Value Object
//!
//! Stable, hyphenated identifier for a validation filter.
//!
//! Filter ids appear in execution plans, diagnostics, audit snapshots, and
//! persisted job rows. They identify the filter *implementation*, never a
//! display name, so the format is deliberately restrictive: lowercase ASCII
//! letters, digits, and single hyphens (`parser`, `kosit`, `ecb-rates`,
//! `steps-amount-validation`).

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

use crate::PipelineError;

/// Stable identifier of a validation filter.
///
/// Immutable value object; equality is by id string. Construction validates
/// the hyphenated lowercase format so an invalid id can never reach a plan
/// or an audit record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FilterId(String);

impl FilterId {
    /// Creates a filter id, validating the format.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::ValidationError` when the id is empty, longer
    /// than 64 characters, contains characters outside `[a-z0-9-]`, or has a
    /// leading/trailing/doubled hyphen.
    pub fn new(id: impl Into<String>) -> Result<Self, PipelineError> {
        let id = id.into();
        if id.is_empty() || id.len() > 64 {
            return Err(PipelineError::ValidationError(
                "Filter id must be between 1 and 64 characters".to_string(),
            ));
        }
        if !id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
            return Err(PipelineError::ValidationError(format!(
                "Filter id '{}' may only contain lowercase letters, digits, and hyphens",
                id
            )));
        }
        if id.starts_with('-') || id.ends_with('-') || id.contains("--") {
            return Err(PipelineError::ValidationError(format!(
                "Filter id '{}' has a misplaced hyphen",
                id
            )));
        }
        Ok(Self(id))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for FilterId {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FilterId> for String {
    fn from(id: FilterId) -> Self {
        id.0
    }
}

impl PartialEq<str> for FilterId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for FilterId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
