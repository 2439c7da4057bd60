// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Diagnostic
//!
//! A structured validation finding with a stable code and severity.
//!
//! Diagnostics are the only way a filter communicates content defects.
//! A step that completes but finds problems records `ran` with error
//! diagnostics; it never throws. The decision layer derives the verdict
//! from the diagnostic stream, not from execution status.
//!
//! Message text is sanitized at construction, so a diagnostic can never
//! carry raw XML, email addresses, IBANs, VAT ids, or phone numbers into a
//! report or a persisted row, no matter how careless the emitting filter
//! was with its message formatting.

use serde::{Deserialize, Serialize};

use crate::services::masking::sanitize_text;
use crate::value_objects::FilterId;

/// Severity of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Hint,
    Info,
    Warning,
    Error,
}

/// A structured, sanitized validation finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    /// Stable rule or error code (`BR-DE-01`, `VIES-UNAVAILABLE`).
    pub code: String,
    pub severity: DiagnosticSeverity,
    /// Coarse grouping: `schema`, `business-rule`, `external`, `internal`.
    pub category: String,
    /// The filter that emitted the finding.
    pub source: FilterId,
    /// Sanitized human-readable message.
    pub message: String,
    /// Optional location hint (XPath fragment, line/column, field path).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Optional sanitized key/value context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Map<String, serde_json::Value>>,
}

impl Diagnostic {
    /// Creates a diagnostic, sanitizing the message text.
    pub fn new(
        code: impl Into<String>,
        severity: DiagnosticSeverity,
        category: impl Into<String>,
        source: FilterId,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            severity,
            category: category.into(),
            source,
            message: sanitize_text(&message.into()),
            location: None,
            context: None,
        }
    }

    /// Shorthand for an error finding.
    pub fn error(
        code: impl Into<String>,
        category: impl Into<String>,
        source: FilterId,
        message: impl Into<String>,
    ) -> Self {
        Self::new(code, DiagnosticSeverity::Error, category, source, message)
    }

    /// Shorthand for a warning finding.
    pub fn warning(
        code: impl Into<String>,
        category: impl Into<String>,
        source: FilterId,
        message: impl Into<String>,
    ) -> Self {
        Self::new(code, DiagnosticSeverity::Warning, category, source, message)
    }

    /// Shorthand for an informational finding.
    pub fn info(
        code: impl Into<String>,
        category: impl Into<String>,
        source: FilterId,
        message: impl Into<String>,
    ) -> Self {
        Self::new(code, DiagnosticSeverity::Info, category, source, message)
    }

    /// Attaches a location hint. The location is sanitized like the message.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(sanitize_text(&location.into()));
        self
    }

    /// Attaches structured context. Values are stored as given; callers must
    /// only put non-sensitive values here (rule ids, counts, flags).
    pub fn with_context(mut self, context: serde_json::Map<String, serde_json::Value>) -> Self {
        self.context = Some(context);
        self
    }

    /// Returns a copy demoted to at most the given severity.
    ///
    /// Used by the best-effort failure policy to make a step's findings
    /// non-binding for the decision layer.
    pub fn demoted_to(&self, severity: DiagnosticSeverity) -> Self {
        let mut demoted = self.clone();
        if demoted.severity > severity {
            demoted.severity = severity;
        }
        demoted
    }

    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }

    pub fn is_warning(&self) -> bool {
        self.severity == DiagnosticSeverity::Warning
    }
}
