// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Report Assembler
//!
//! Builds the audit-ready `ValidationReport` from the finished context.
//!
//! The assembler owns the lift from run state to report: it copies the
//! step results and diagnostics, derives the report state, extracts the
//! policy decision and the fingerprint from their steps' metadata, builds
//! the masked invoice summary, and attaches the plan snapshot and any
//! retention warnings from cleanup.

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::warn;

use invoice_gate_domain::entities::{
    InvoiceSummary, PolicyGateDecision, RunTiming, ValidationContext, ValidationReport,
};
use invoice_gate_domain::value_objects::{
    AuditHash, ComplianceFingerprint, PlanSnapshot,
};
use invoice_gate_domain::entities::ExecutionPlan;
use invoice_gate_domain::PipelineError;

use crate::infrastructure::filters::FilterRegistry;
use crate::ENGINE_VERSION;

use super::cleanup_enforcer::CleanupOutcome;

/// Step ids accepted as the decision step.
const DECISION_STEP_IDS: [&str; 2] = ["policy-gate", "steps-policy-gate"];
/// Step id carrying the sealed fingerprint.
const FINGERPRINT_STEP_ID: &str = "fingerprint";

/// Stateless report construction.
pub struct ReportAssembler;

impl ReportAssembler {
    /// Captures the plan snapshot for a run.
    ///
    /// Filter versions come from the registry at capture time; plan steps
    /// referencing unregistered filters are recorded as `unregistered` so
    /// the snapshot still identifies what the run would have executed.
    pub fn plan_snapshot(
        plan: &ExecutionPlan,
        registry: &FilterRegistry,
        config_snapshot_hash: AuditHash,
    ) -> Result<PlanSnapshot, PipelineError> {
        let engine_versions =
            BTreeMap::from([("invoice-gate".to_string(), ENGINE_VERSION.to_string())]);

        let mut filter_versions = BTreeMap::new();
        for step in plan.iter_steps().filter(|s| !s.is_group()) {
            let version = registry
                .version_of(&step.filter_id)
                .unwrap_or_else(|| "unregistered".to_string());
            filter_versions.insert(step.filter_id.to_string(), version);
        }

        PlanSnapshot::capture(plan, engine_versions, filter_versions, config_snapshot_hash)
    }

    /// Assembles the final report from the finished context.
    pub fn assemble(
        ctx: &ValidationContext,
        plan_snapshot: PlanSnapshot,
        cleanup: &CleanupOutcome,
    ) -> ValidationReport {
        let steps = ctx.completed_steps().to_vec();
        let diagnostics = ctx.diagnostics().to_vec();
        let completed_at = Utc::now();

        let final_decision = Self::extract::<PolicyGateDecision>(ctx, &DECISION_STEP_IDS, "decision");
        let fingerprint =
            Self::extract::<ComplianceFingerprint>(ctx, &[FINGERPRINT_STEP_ID], "fingerprint");

        let format = ctx.raw_invoice().format_hint.map(|h| h.to_string());

        ValidationReport {
            run_id: ctx.run_id().clone(),
            correlation_id: ctx.correlation_id().map(|s| s.to_string()),
            report_state: ValidationReport::derive_state(&steps, ctx.is_aborted()),
            diagnostic_counts: ValidationReport::count_diagnostics(&diagnostics),
            step_statistics: ValidationReport::compute_step_statistics(&steps),
            invoice_summary: InvoiceSummary::from_invoice(ctx.parsed_invoice(), format),
            diagnostics,
            steps,
            plan_snapshot,
            fingerprint,
            timing: RunTiming {
                started_at: *ctx.started_at(),
                completed_at,
                duration_ms: (completed_at - *ctx.started_at()).num_milliseconds().max(0) as u64,
            },
            final_decision,
            applied_retention_policy: "zero-retention".to_string(),
            retention_warnings: cleanup.warnings.clone(),
        }
    }

    /// Pulls a typed value out of a step's metadata.
    fn extract<T: serde::de::DeserializeOwned>(
        ctx: &ValidationContext,
        step_ids: &[&str],
        key: &str,
    ) -> Option<T> {
        for id in step_ids {
            if let Some(result) = ctx.step_result(id) {
                if let Some(value) = result.metadata.get(key) {
                    match serde_json::from_value(value.clone()) {
                        Ok(parsed) => return Some(parsed),
                        Err(e) => {
                            warn!(step = id, key, error = %e, "malformed step metadata payload");
                        }
                    }
                }
            }
        }
        None
    }
}
