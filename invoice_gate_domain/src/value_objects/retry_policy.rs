// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Failure Policy and Retry Configuration
//!
//! Per-step rules governing how errors and retries affect pipeline
//! progression.
//!
//! ## Failure policies
//!
//! - `FailFast` - a step that ran with error diagnostics (or errored)
//!   aborts the pipeline unless `continue_on_failure` is set
//! - `SoftFail` - errors are recorded but the pipeline continues; the usual
//!   pairing for external verifier calls with a retry configuration
//! - `BestEffort` - as `SoftFail`, but the step's error diagnostics are
//!   demoted to warnings so the decision layer treats them as non-binding
//! - `AlwaysRun` - the step executes even after an abort; used for the
//!   fingerprint and policy-gate steps
//!
//! ## Retry delays
//!
//! Delay for attempt `n` (0-indexed, counted after the first try) is
//! `min(initial_delay_ms x backoff_multiplier^n, max_delay_ms)`. The harness
//! adds uniform random jitter in `[0, delay x jitter_factor]` on top; the
//! math here is deterministic so it can be bounds-tested.

use serde::{Deserialize, Serialize};

use crate::entities::step_result::StepError;

/// How a step's failure affects pipeline progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    FailFast,
    SoftFail,
    BestEffort,
    AlwaysRun,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::FailFast
    }
}

/// Default retryable HTTP status codes.
pub const DEFAULT_RETRYABLE_STATUS_CODES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Default retryable error types.
pub const DEFAULT_RETRYABLE_ERROR_TYPES: [&str; 8] = [
    "ETIMEDOUT",
    "ECONNRESET",
    "ECONNREFUSED",
    "ENOTFOUND",
    "EAI_AGAIN",
    "NETWORK_ERROR",
    "TIMEOUT",
    "SERVICE_UNAVAILABLE",
];

/// Retry configuration for a plan step.
///
/// The harness stops retrying when `max_retries` is reached, the elapsed
/// wall clock (including waits) exceeds `total_budget_ms`, or the error does
/// not classify as retryable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_budget_ms: Option<u64>,
    pub retryable_status_codes: Vec<u16>,
    pub retryable_error_types: Vec<String>,
    /// Fraction of the delay added as uniform random jitter, in `0..=1`.
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 500,
            backoff_multiplier: 2.0,
            max_delay_ms: 10_000,
            total_budget_ms: None,
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES.to_vec(),
            retryable_error_types: DEFAULT_RETRYABLE_ERROR_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    /// Deterministic backoff delay for retry attempt `n` (0-indexed),
    /// before jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        let raw = (self.initial_delay_ms as f64) * self.backoff_multiplier.powi(attempt as i32);
        if !raw.is_finite() || raw >= self.max_delay_ms as f64 {
            self.max_delay_ms
        } else {
            raw as u64
        }
    }

    /// Classifies a step error as retryable.
    ///
    /// Matches `status_code` against `retryable_status_codes`, then the
    /// error name against `retryable_error_types`. Anything unmatched is
    /// permanent.
    pub fn is_retryable(&self, error: &StepError) -> bool {
        if let Some(status) = error.status_code {
            if self.retryable_status_codes.contains(&status) {
                return true;
            }
        }
        self.retryable_error_types.iter().any(|t| t == &error.name)
    }

    /// Clamped jitter factor; configs deserialized from untrusted input may
    /// carry out-of-range values.
    pub fn effective_jitter_factor(&self) -> f64 {
        self.jitter_factor.clamp(0.0, 1.0)
    }
}
