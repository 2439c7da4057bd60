// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Policy Gate Decision Model
//!
//! The decision layer's verdict for a run: ALLOW, ALLOW_WITH_WARNINGS, or
//! BLOCK, with machine-readable reason codes.
//!
//! The decision is produced by the policy-gate filter from step outcomes,
//! the diagnostic stream, and its thresholds; the orchestrator copies it
//! into the report. No field of the decision may contain raw invoice
//! values, party names, or file paths; the summary is a short generic
//! sentence derived from the reason set alone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The final verdict for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyDecision {
    Allow,
    AllowWithWarnings,
    Block,
}

/// Classification of a BLOCK decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockType {
    /// The invoice content violates compliance rules.
    Compliance,
    /// A tenant policy (risk threshold, verifier requirement) blocked it.
    Policy,
    /// The engine could not complete a required check.
    System,
}

/// Machine-readable reasons backing a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    RequiredCheckFailed,
    StepError,
    RequiredCheckMissing,
    HardBlockPresent,
    ErrorPresent,
    SchemaError,
    SchematronError,
    ExternalVerifierFailed,
    ExternalVerifierUnavailable,
    RiskScoreBlock,
    WarningsPresent,
    RiskScoreWarn,
    StepSkippedAborted,
    DefaultAllow,
}

/// How a step contributed to the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepContribution {
    Block,
    Warn,
    Neutral,
}

/// Per-severity diagnostic counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticCounts {
    pub errors: usize,
    pub warnings: usize,
    pub infos: usize,
    pub hints: usize,
}

/// Optional per-step analysis of the decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepAnalysisEntry {
    pub step_id: String,
    /// Execution status in its wire form (`ran`, `skipped`, `errored`).
    pub status: String,
    pub contributed_to_decision: bool,
    pub contribution: StepContribution,
    pub triggered_reasons: Vec<ReasonCode>,
    pub diagnostic_counts: DiagnosticCounts,
}

/// The policy gate's decision envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyGateDecision {
    pub decision: PolicyDecision,
    pub reason_codes: Vec<ReasonCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_type: Option<BlockType>,
    pub applied_policy_version: String,
    pub effective_at: DateTime<Utc>,
    /// Short, non-sensitive English sentence derived from the reason set.
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_analysis: Option<Vec<StepAnalysisEntry>>,
}

impl PolicyGateDecision {
    /// An unconditional ALLOW with no reasons.
    pub fn allow(applied_policy_version: impl Into<String>) -> Self {
        Self {
            decision: PolicyDecision::Allow,
            reason_codes: Vec::new(),
            block_type: None,
            applied_policy_version: applied_policy_version.into(),
            effective_at: Utc::now(),
            summary: "Invoice passed all applicable compliance checks.".to_string(),
            step_analysis: None,
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.decision == PolicyDecision::Block
    }
}
