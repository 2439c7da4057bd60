// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Raw Invoice Value Objects
//!
//! The raw submission and its in-run handle.
//!
//! `RawInvoice` carries the opaque content bytes plus content-type and
//! format hints. It exists only at the enqueue boundary: the caller hands it
//! to the engine, the engine writes the bytes into the temp store, and from
//! that point on the run works exclusively with a `RawInvoiceRef` holding
//! the temp-store key. The validation context never owns invoice bytes,
//! which is what makes the zero-retention guarantee enforceable in one
//! place (the cleanup enforcer).

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

use super::run_id::RunId;

/// Content type hint for a raw submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Xml,
    Json,
    Pdf,
}

impl Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentType::Xml => write!(f, "xml"),
            ContentType::Json => write!(f, "json"),
            ContentType::Pdf => write!(f, "pdf"),
        }
    }
}

/// Optional invoice format hint supplied by the caller.
///
/// The hint narrows which validation scenarios apply; it is advisory and
/// verified by the schema filters rather than trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormatHint {
    XrechnungCii,
    XrechnungUbl,
    ZugferdFacturX,
    PeppolBis,
    Ubl,
    Cii,
}

impl Display for FormatHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FormatHint::XrechnungCii => "xrechnung-cii",
            FormatHint::XrechnungUbl => "xrechnung-ubl",
            FormatHint::ZugferdFacturX => "zugferd-factur-x",
            FormatHint::PeppolBis => "peppol-bis",
            FormatHint::Ubl => "ubl",
            FormatHint::Cii => "cii",
        };
        write!(f, "{}", s)
    }
}

/// An opaque raw invoice submission.
///
/// Lives only at the boundary between the caller and the engine; the bytes
/// are moved into the temp store before any filter runs.
#[derive(Debug, Clone)]
pub struct RawInvoice {
    pub content: Vec<u8>,
    pub content_type: ContentType,
    pub format_hint: Option<FormatHint>,
}

impl RawInvoice {
    pub fn new(content: Vec<u8>, content_type: ContentType) -> Self {
        Self {
            content,
            content_type,
            format_hint: None,
        }
    }

    pub fn with_format_hint(mut self, hint: FormatHint) -> Self {
        self.format_hint = Some(hint);
        self
    }
}

/// Namespaced temp-store key: `category:run_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TempKey(String);

impl TempKey {
    /// Builds the key for a category within a run's namespace.
    pub fn for_run(category: &str, run_id: &RunId) -> Self {
        Self(format!("{}:{}", category, run_id))
    }

    /// Wraps an already-formatted key (for filter-registered keys).
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TempKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to the raw invoice held by the validation context.
///
/// Carries the temp-store key and the hints, never the bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawInvoiceRef {
    pub temp_key: TempKey,
    pub content_type: ContentType,
    pub format_hint: Option<FormatHint>,
    pub size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_key_namespace() {
        let run = RunId::new();
        let key = TempKey::for_run("raw-invoice", &run);
        assert_eq!(key.as_str(), format!("raw-invoice:{}", run));
    }

    #[test]
    fn test_content_type_serde_form() {
        assert_eq!(serde_json::to_string(&ContentType::Xml).unwrap(), "\"xml\"");
        assert_eq!(
            serde_json::to_string(&FormatHint::ZugferdFacturX).unwrap(),
            "\"zugferd-factur-x\""
        );
    }
}
