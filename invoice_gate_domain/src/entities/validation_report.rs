// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Validation Report
//!
//! The audit-ready result of a run.
//!
//! The report owns copies of everything the caller may keep: step results,
//! the diagnostic stream, the masked invoice summary, the plan snapshot,
//! the fingerprint, and the final decision. The context and all transient
//! invoice data are dropped once the report exists; the report is the only
//! artifact that survives a run, which is why every field on it must
//! already be masked and sanitized.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{ComplianceFingerprint, PlanSnapshot, RunId};

use super::diagnostic::{Diagnostic, DiagnosticSeverity};
use super::policy_decision::{DiagnosticCounts, PolicyGateDecision};
use super::step_result::{ExecutionStatus, StepResult};

/// Completeness of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportState {
    /// Every scheduled step completed.
    Complete,
    /// The run aborted and some steps were skipped.
    Incomplete,
    /// At least one step errored.
    Errored,
}

/// Structured warning about secure-cleanup problems.
///
/// The message is always generic: it never contains keys, run ids used as
/// keys, or any invoice data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionWarning {
    pub code: RetentionWarningCode,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub affected_count: usize,
}

/// Category of a retention warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetentionWarningCode {
    /// Failed deletes were handed to the cleanup queue for retry.
    CleanupQueued,
    /// Some keys could not be processed at all.
    CleanupPartial,
    /// Cleanup infrastructure itself failed.
    CleanupError,
}

/// Masked, non-sensitive summary of the validated invoice.
///
/// Built through `from_invoice`, which applies the identifier masking
/// rules; stronger masking policies are applied by external collaborators
/// before any persistence beyond the report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seller_vat_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer_vat_id: Option<String>,
    pub line_count: usize,
}

impl InvoiceSummary {
    /// Builds the masked summary from a parsed invoice, if one exists.
    ///
    /// `format` is the caller-supplied format hint in its wire form; it is
    /// carried whether or not parsing succeeded.
    pub fn from_invoice(
        invoice: Option<&super::canonical_invoice::CanonicalInvoice>,
        format: Option<String>,
    ) -> Self {
        let Some(invoice) = invoice else {
            return Self {
                format,
                ..Default::default()
            };
        };
        Self {
            format,
            invoice_number: Some(crate::services::masking::mask_invoice_number(
                &invoice.header.invoice_number,
            )),
            issue_date: Some(invoice.header.issue_date.clone()),
            currency: Some(invoice.header.currency.clone()),
            total_amount: Some(invoice.totals.payable_amount.to_string()),
            seller_vat_id: invoice
                .seller
                .vat_id
                .as_deref()
                .map(crate::services::masking::mask_vat_id),
            buyer_vat_id: invoice
                .buyer
                .vat_id
                .as_deref()
                .map(crate::services::masking::mask_vat_id),
            line_count: invoice.lines.len(),
        }
    }
}

/// Aggregate step timing and outcome statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepStatistics {
    pub total: usize,
    pub ran: usize,
    pub skipped: usize,
    pub errored: usize,
    pub total_duration_ms: u64,
    pub max_step_duration_ms: u64,
}

/// Wall-clock timing of the run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunTiming {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// The audit-ready result of a validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub run_id: RunId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub report_state: ReportState,
    pub diagnostics: Vec<Diagnostic>,
    pub diagnostic_counts: DiagnosticCounts,
    pub steps: Vec<StepResult>,
    pub step_statistics: StepStatistics,
    pub invoice_summary: InvoiceSummary,
    pub plan_snapshot: PlanSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<ComplianceFingerprint>,
    pub timing: RunTiming,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_decision: Option<PolicyGateDecision>,
    pub applied_retention_policy: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retention_warnings: Vec<RetentionWarning>,
}

impl ValidationReport {
    /// Derives the report state from step outcomes and the abort flag.
    pub fn derive_state(steps: &[StepResult], aborted: bool) -> ReportState {
        if steps.iter().any(|s| s.execution == ExecutionStatus::Errored) {
            ReportState::Errored
        } else if aborted {
            ReportState::Incomplete
        } else {
            ReportState::Complete
        }
    }

    /// Counts diagnostics by severity.
    pub fn count_diagnostics(diagnostics: &[Diagnostic]) -> DiagnosticCounts {
        let mut counts = DiagnosticCounts::default();
        for diagnostic in diagnostics {
            match diagnostic.severity {
                DiagnosticSeverity::Error => counts.errors += 1,
                DiagnosticSeverity::Warning => counts.warnings += 1,
                DiagnosticSeverity::Info => counts.infos += 1,
                DiagnosticSeverity::Hint => counts.hints += 1,
            }
        }
        counts
    }

    /// Aggregates step statistics.
    pub fn compute_step_statistics(steps: &[StepResult]) -> StepStatistics {
        let mut stats = StepStatistics {
            total: steps.len(),
            ..Default::default()
        };
        for step in steps {
            match step.execution {
                ExecutionStatus::Ran => stats.ran += 1,
                ExecutionStatus::Skipped => stats.skipped += 1,
                ExecutionStatus::Errored => stats.errored += 1,
            }
            stats.total_duration_ms += step.duration_ms;
            stats.max_step_duration_ms = stats.max_step_duration_ms.max(step.duration_ms);
        }
        stats
    }
}
