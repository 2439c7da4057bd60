// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Filter Contract
//!
//! The unified trait every validation step implements, whether built-in
//! (parser, kosit, the live verifiers, amount validation, fingerprint,
//! policy gate) or custom.
//!
//! ## Architecture
//!
//! Following the dependency-inversion split used throughout this codebase:
//! the domain defines the contract, the infrastructure layer implements
//! concrete filters, and the registry hands them to the orchestrator as
//! trait objects.
//!
//! ## Contract rules
//!
//! - A filter is an immutable value object: stable `id`, semantic
//!   `version`, descriptive metadata. The id (never the display name) is
//!   what appears in plans, diagnostics, and audit records.
//! - `execute` is a pure function of the read-only context view and the
//!   merged per-step configuration. Filters must not retain references
//!   across invocations and must be safe to call from concurrent tasks.
//! - Validation findings are diagnostics on a `ran` result; an `Err` return
//!   is reserved for execution failures (network errors, timeouts) and is
//!   what the retry harness classifies.
//!
//! ## Configuration
//!
//! `FilterConfig` is a schema-less JSON object. The orchestrator merges the
//! registry's default config under the plan step's config (step wins) and
//! passes the result to `execute`; each filter type-checks its own slice at
//! entry. This keeps the orchestrator neutral while preserving per-filter
//! type safety.

use async_trait::async_trait;

use crate::entities::step_result::{StepError, StepResult};
use crate::entities::validation_context::ValidationContext;
use crate::value_objects::FilterId;
use crate::PipelineError;

/// Schema-less per-step configuration object.
///
/// Filters extract and validate their own typed view of this map.
pub type FilterConfig = serde_json::Map<String, serde_json::Value>;

/// A pluggable validation step.
///
/// Implementations must be thread-safe (`Send + Sync`); the orchestrator
/// invokes them from concurrent tasks during parallel groups.
#[async_trait]
pub trait Filter: Send + Sync {
    /// Stable hyphenated identifier used in plans and audit records.
    fn id(&self) -> &FilterId;

    /// Human-readable display name.
    fn name(&self) -> &str;

    /// Semantic version of the filter implementation, stamped into every
    /// step result and the plan snapshot.
    fn version(&self) -> &str;

    /// Optional description for operator tooling.
    fn description(&self) -> Option<&str> {
        None
    }

    /// Optional classification tags (`external`, `schema`, `decision`).
    fn tags(&self) -> Vec<String> {
        Vec::new()
    }

    /// Called once when the filter is registered.
    fn on_init(&self) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Called once at registry shutdown.
    fn on_destroy(&self) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Executes the step against the read-only context view.
    ///
    /// Returns a `StepResult` for every completed execution, including runs
    /// that found content defects (as diagnostics). `Err` means the step
    /// did not complete; the harness decides whether to retry based on the
    /// error's name and status code.
    async fn execute(
        &self,
        ctx: &ValidationContext,
        config: &FilterConfig,
    ) -> Result<StepResult, StepError>;
}

impl From<PipelineError> for StepError {
    fn from(err: PipelineError) -> Self {
        let name = match &err {
            PipelineError::TimeoutError(_) => "TIMEOUT",
            PipelineError::Cancelled(_) => "CANCELLED",
            PipelineError::FilterPanicked(_) => "PANIC",
            PipelineError::ExternalServiceError(_) => "NETWORK_ERROR",
            PipelineError::IoError(_) => "IO_ERROR",
            PipelineError::SerializationError(_) => "SERIALIZATION_ERROR",
            _ => "INTERNAL_ERROR",
        };
        StepError::new(name, err.to_string())
    }
}
