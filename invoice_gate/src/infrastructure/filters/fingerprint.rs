// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Fingerprint Filter
//!
//! Produces the compliance fingerprint: the cryptographic summary of the
//! run that survives after all invoice data has been deleted.
//!
//! The filter runs under the always-run policy so that even aborted runs
//! leave an audit trail. Check statuses are derived from the completed
//! steps at the time the filter executes; the sealed fingerprint lands in
//! step metadata and the report assembler lifts it onto the report.

use std::collections::BTreeMap;

use async_trait::async_trait;

use invoice_gate_domain::entities::{
    ExecutionStatus, InvoiceSummary, StepError, StepResult, ValidationContext,
};
use invoice_gate_domain::services::filter::{Filter, FilterConfig};
use invoice_gate_domain::value_objects::fingerprint::{
    CheckStatus, ComplianceFingerprint, FingerprintPlanRef, FingerprintStatus,
};
use invoice_gate_domain::value_objects::FilterId;

/// Filter ids treated as live external verifications.
const LIVE_VERIFIERS: [&str; 3] = ["vies", "ecb-rates", "peppol"];

/// Always-run audit fingerprint producer.
pub struct FingerprintFilter {
    id: FilterId,
}

impl FingerprintFilter {
    pub fn new() -> Self {
        Self {
            id: FilterId::new("fingerprint").unwrap_or_else(|_| unreachable!()),
        }
    }

    fn check_status(result: &StepResult) -> CheckStatus {
        match result.execution {
            ExecutionStatus::Ran if result.has_error_diagnostics() => CheckStatus::Failed,
            ExecutionStatus::Ran => {
                if LIVE_VERIFIERS.contains(&result.filter_id.as_str()) {
                    CheckStatus::VerifiedLive
                } else {
                    CheckStatus::Verified
                }
            }
            ExecutionStatus::Skipped => CheckStatus::Skipped,
            ExecutionStatus::Errored => CheckStatus::Unverified,
        }
    }

    fn score(ctx: &ValidationContext) -> u32 {
        let mut score: i64 = 100;
        for step in ctx.completed_steps() {
            match step.execution {
                ExecutionStatus::Ran if step.has_error_diagnostics() => score -= 25,
                ExecutionStatus::Ran if step.has_warning_diagnostics() => score -= 5,
                ExecutionStatus::Errored => score -= 10,
                _ => {}
            }
        }
        score.clamp(0, 100) as u32
    }

    fn status(ctx: &ValidationContext) -> FingerprintStatus {
        let any_failed = ctx
            .completed_steps()
            .iter()
            .any(|s| s.execution == ExecutionStatus::Ran && s.has_error_diagnostics());
        if any_failed {
            FingerprintStatus::Rejected
        } else if ctx.is_aborted() {
            FingerprintStatus::Incomplete
        } else {
            FingerprintStatus::Approved
        }
    }
}

impl Default for FingerprintFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Filter for FingerprintFilter {
    fn id(&self) -> &FilterId {
        &self.id
    }

    fn name(&self) -> &str {
        "Compliance Fingerprint"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn tags(&self) -> Vec<String> {
        vec!["audit".to_string()]
    }

    async fn execute(
        &self,
        ctx: &ValidationContext,
        _config: &FilterConfig,
    ) -> Result<StepResult, StepError> {
        let mut checks = BTreeMap::new();
        let mut filter_versions = BTreeMap::new();
        let mut risk_notes = Vec::new();

        for step in ctx.completed_steps() {
            checks.insert(step.filter_id.to_string(), Self::check_status(step));
            if !step.filter_version.is_empty() {
                filter_versions.insert(step.filter_id.to_string(), step.filter_version.clone());
            }
            if let Some(score) = step.metadata.get("score").and_then(|v| v.as_u64()) {
                if score > 0 {
                    risk_notes.push(format!("risk score {} reported by {}", score, step.filter_id));
                }
            }
        }

        let format = ctx
            .raw_invoice()
            .format_hint
            .map(|h| h.to_string());
        let summary = InvoiceSummary::from_invoice(ctx.parsed_invoice(), format);
        let summary_value = serde_json::to_value(&summary)
            .map_err(|e| StepError::new("SERIALIZATION_ERROR", e.to_string()))?;

        let duration_ms = (chrono::Utc::now() - *ctx.started_at())
            .num_milliseconds()
            .max(0) as u64;

        let fingerprint = ComplianceFingerprint::seal(
            ctx.run_id(),
            Self::status(ctx),
            Self::score(ctx),
            checks,
            risk_notes,
            &summary_value,
            FingerprintPlanRef {
                id: ctx.plan().id().to_string(),
                version: ctx.plan().version().to_string(),
                config_hash: ctx.plan().config_hash().clone(),
            },
            filter_versions,
            duration_ms,
        )
        .map_err(StepError::from)?;

        let fingerprint_value = serde_json::to_value(&fingerprint)
            .map_err(|e| StepError::new("SERIALIZATION_ERROR", e.to_string()))?;

        Ok(StepResult::ran(self.id.clone())
            .with_metadata_value("fingerprint", fingerprint_value))
    }
}
