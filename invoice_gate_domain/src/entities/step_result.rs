// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Step Result
//!
//! The execution-lifecycle fact for one plan step.
//!
//! `ExecutionStatus` records what *happened* to the step (it ran, it was
//! skipped, it errored), independent of the validation verdict. The verdict
//! is derived from the diagnostic stream by the decision layer. This
//! separation keeps "the schema check found three rule violations" (ran,
//! with error diagnostics) distinct from "the schema check crashed"
//! (errored, with a step error).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::FilterId;

use super::diagnostic::{Diagnostic, DiagnosticSeverity};

/// What happened to a step during the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Ran,
    Skipped,
    Errored,
}

/// The captured failure of a step that did not complete.
///
/// This is the engine's representation of a "thrown" error: the name slot
/// carries a machine-readable type (`TIMEOUT`, `ECONNRESET`, `PANIC`) used
/// by retry classification, and `status_code` carries an HTTP status when
/// the failure came from an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepError {
    pub name: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl StepError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            status_code: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    /// A per-attempt or whole-step timeout.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new("TIMEOUT", message)
    }

    /// Cancellation by the run-scoped token.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new("CANCELLED", message)
    }

    /// A panic captured inside a filter.
    pub fn panic(message: impl Into<String>) -> Self {
        Self::new("PANIC", message)
    }

    /// A plan step referencing a filter the registry does not know.
    pub fn filter_not_found(filter_id: &FilterId) -> Self {
        Self::new(
            "FILTER_NOT_FOUND",
            format!("No filter registered under id '{}'", filter_id),
        )
    }
}

impl std::fmt::Display for StepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status_code {
            Some(status) => write!(f, "{} ({}): {}", self.name, status, self.message),
            None => write!(f, "{}: {}", self.name, self.message),
        }
    }
}

/// The recorded outcome of one plan step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub filter_id: FilterId,
    pub filter_version: String,
    pub execution: ExecutionStatus,
    pub diagnostics: Vec<Diagnostic>,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Filter-provided metadata: parsed-invoice payloads, reason codes,
    /// decision envelopes, registered temp keys.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
}

impl StepResult {
    /// A completed step with no findings yet.
    pub fn ran(filter_id: FilterId) -> Self {
        Self::with_status(filter_id, ExecutionStatus::Ran)
    }

    /// A skipped step; attach the reason via `with_metadata_value`.
    pub fn skipped(filter_id: FilterId) -> Self {
        Self::with_status(filter_id, ExecutionStatus::Skipped)
    }

    /// A step that did not complete.
    pub fn errored(filter_id: FilterId, error: StepError) -> Self {
        let mut result = Self::with_status(filter_id, ExecutionStatus::Errored);
        result.error = Some(error);
        result
    }

    fn with_status(filter_id: FilterId, execution: ExecutionStatus) -> Self {
        let now = Utc::now();
        Self {
            filter_id,
            filter_version: String::new(),
            execution,
            diagnostics: Vec::new(),
            duration_ms: 0,
            started_at: now,
            completed_at: now,
            metadata: serde_json::Map::new(),
            error: None,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Vec<Diagnostic>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_metadata_value(
        mut self,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Stamps version and timing; called by the orchestrator harness after
    /// the filter returns.
    pub fn stamp(
        mut self,
        filter_version: impl Into<String>,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        self.filter_version = filter_version.into();
        self.started_at = started_at;
        self.completed_at = completed_at;
        self.duration_ms = (completed_at - started_at).num_milliseconds().max(0) as u64;
        self
    }

    /// True when the step ran and produced at least one error diagnostic.
    pub fn has_error_diagnostics(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    /// True when the step ran and produced at least one warning diagnostic.
    pub fn has_warning_diagnostics(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_warning)
    }

    /// The skip reason recorded in metadata, if any.
    pub fn skip_reason(&self) -> Option<&str> {
        self.metadata.get("skipReason").and_then(|v| v.as_str())
    }

    /// Demotes all diagnostics to at most `severity` (best-effort policy).
    pub fn demote_diagnostics(&mut self, severity: DiagnosticSeverity) {
        for diagnostic in &mut self.diagnostics {
            *diagnostic = diagnostic.demoted_to(severity);
        }
    }
}
