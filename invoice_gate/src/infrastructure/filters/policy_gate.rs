// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Policy Gate Filter
//!
//! The decision layer: maps step outcomes, the diagnostic stream, and the
//! configured thresholds into ALLOW / ALLOW_WITH_WARNINGS / BLOCK.
//!
//! ## Decision order
//!
//! Block rules are evaluated in a fixed order and the first match wins:
//!
//! 1. a required check errored
//! 2. a required check is missing from the completed steps
//! 3. a diagnostic carries the hard-block marker
//! 4. error diagnostics exist and `errorBehavior` is `block`
//! 5. an external verifier errored and `externalVerifierFailure` is `block`
//! 6. the risk score reached the block threshold
//!
//! All applicable warn reasons (warnings present, verifier failures under
//! `warn`, risk warn threshold, abort-skipped steps) are aggregated into
//! the reason codes; with no block and no warn reasons the decision is
//! ALLOW with an empty reason set.
//!
//! The schema/schematron distinction is read from filter-provided
//! `errorKind` metadata rather than rule-id prefixes, so the gate stays
//! agnostic of any particular rule catalog.

use async_trait::async_trait;
use serde::Deserialize;

use invoice_gate_domain::entities::{
    BlockType, DiagnosticCounts, ExecutionStatus, PolicyDecision, PolicyGateDecision, ReasonCode,
    StepAnalysisEntry, StepContribution, StepError, StepResult, ValidationContext,
    ValidationReport,
};
use invoice_gate_domain::services::filter::{Filter, FilterConfig};
use invoice_gate_domain::value_objects::FilterId;

/// Filter ids treated as external verifiers by rules 5 and 7.
const EXTERNAL_VERIFIERS: [&str; 3] = ["vies", "ecb-rates", "peppol"];

/// Behavior on a rule class: block the run or downgrade to a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Behavior {
    Block,
    Warn,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RiskThresholds {
    warn: Option<u64>,
    block: Option<u64>,
}

/// Typed view of the gate's filter config.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PolicyGateConfig {
    required_checks: Vec<String>,
    error_behavior: Behavior,
    external_verifier_failure: Behavior,
    risk_thresholds: RiskThresholds,
    include_step_analysis: bool,
    policy_version: String,
}

impl Default for PolicyGateConfig {
    fn default() -> Self {
        Self {
            required_checks: Vec::new(),
            error_behavior: Behavior::Block,
            external_verifier_failure: Behavior::Warn,
            risk_thresholds: RiskThresholds::default(),
            include_step_analysis: false,
            policy_version: "default-v1".to_string(),
        }
    }
}

/// The always-run decision layer.
pub struct PolicyGateFilter {
    id: FilterId,
}

impl PolicyGateFilter {
    /// Creates the filter under its canonical id `policy-gate`.
    pub fn new() -> Self {
        Self {
            id: FilterId::new("policy-gate").unwrap_or_else(|_| unreachable!()),
        }
    }

    /// Creates the filter under an alias id (`steps-policy-gate`).
    pub fn with_id(id: FilterId) -> Self {
        Self { id }
    }

    fn decide(&self, ctx: &ValidationContext, config: &PolicyGateConfig) -> PolicyGateDecision {
        let steps = ctx.completed_steps();

        let errored_required: Vec<&StepResult> = steps
            .iter()
            .filter(|s| {
                s.execution == ExecutionStatus::Errored
                    && config.required_checks.iter().any(|id| s.filter_id == id.as_str())
            })
            .collect();
        let missing_required: Vec<&String> = config
            .required_checks
            .iter()
            .filter(|id| !steps.iter().any(|s| s.filter_id == id.as_str()))
            .collect();
        let hard_block = ctx.diagnostics().iter().any(|d| {
            d.context
                .as_ref()
                .and_then(|c| c.get("hardBlock"))
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
        });
        let errors_present = ctx.diagnostics().iter().any(|d| d.is_error());
        let warnings_present = ctx.diagnostics().iter().any(|d| d.is_warning());
        let verifier_errored: Vec<&StepResult> = steps
            .iter()
            .filter(|s| {
                s.execution == ExecutionStatus::Errored
                    && EXTERNAL_VERIFIERS.contains(&s.filter_id.as_str())
            })
            .collect();
        let risk_score = steps
            .iter()
            .filter_map(|s| s.metadata.get("score").and_then(|v| v.as_u64()))
            .max();
        let skipped_aborted = steps
            .iter()
            .any(|s| s.skip_reason() == Some("pipeline_aborted"));

        // Derived error-kind reasons for rule 4, from filter metadata
        let mut derived = Vec::new();
        for step in steps.iter().filter(|s| s.has_error_diagnostics()) {
            match step.metadata.get("errorKind").and_then(|v| v.as_str()) {
                Some("schema") => derived.push(ReasonCode::SchemaError),
                Some("schematron") => derived.push(ReasonCode::SchematronError),
                _ => {}
            }
        }

        let verifier_reason = |steps: &[&StepResult]| {
            let unavailable = steps.iter().any(|s| {
                s.metadata
                    .get("verifierUnavailable")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false)
            });
            if unavailable {
                ReasonCode::ExternalVerifierUnavailable
            } else {
                ReasonCode::ExternalVerifierFailed
            }
        };

        // Block rules, first match wins
        let mut block: Option<(BlockType, Vec<ReasonCode>)> = None;
        if !errored_required.is_empty() {
            block = Some((
                BlockType::System,
                vec![ReasonCode::RequiredCheckFailed, ReasonCode::StepError],
            ));
        } else if !missing_required.is_empty() {
            block = Some((BlockType::System, vec![ReasonCode::RequiredCheckMissing]));
        } else if hard_block {
            block = Some((BlockType::Compliance, vec![ReasonCode::HardBlockPresent]));
        } else if errors_present && config.error_behavior == Behavior::Block {
            let mut reasons = vec![ReasonCode::ErrorPresent];
            reasons.extend(derived.iter().copied());
            block = Some((BlockType::Compliance, reasons));
        } else if !verifier_errored.is_empty()
            && config.external_verifier_failure == Behavior::Block
        {
            block = Some((BlockType::Policy, vec![verifier_reason(&verifier_errored)]));
        } else if let (Some(threshold), Some(score)) = (config.risk_thresholds.block, risk_score) {
            if score >= threshold {
                block = Some((BlockType::Policy, vec![ReasonCode::RiskScoreBlock]));
            }
        }

        // Warn reasons are aggregated regardless of the block outcome
        let mut warn_reasons = Vec::new();
        if warnings_present {
            warn_reasons.push(ReasonCode::WarningsPresent);
        }
        if !verifier_errored.is_empty() && config.external_verifier_failure == Behavior::Warn {
            warn_reasons.push(verifier_reason(&verifier_errored));
        }
        if let (Some(threshold), Some(score)) = (config.risk_thresholds.warn, risk_score) {
            if score >= threshold {
                warn_reasons.push(ReasonCode::RiskScoreWarn);
            }
        }
        if skipped_aborted {
            warn_reasons.push(ReasonCode::StepSkippedAborted);
        }

        let (decision, block_type, mut reason_codes) = match block {
            Some((block_type, reasons)) => (PolicyDecision::Block, Some(block_type), reasons),
            None if !warn_reasons.is_empty() => {
                (PolicyDecision::AllowWithWarnings, None, Vec::new())
            }
            None => (PolicyDecision::Allow, None, Vec::new()),
        };
        for reason in warn_reasons {
            if !reason_codes.contains(&reason) {
                reason_codes.push(reason);
            }
        }

        let summary = match (decision, block_type) {
            (PolicyDecision::Allow, _) => {
                "Invoice passed all applicable compliance checks.".to_string()
            }
            (PolicyDecision::AllowWithWarnings, _) => {
                "Invoice accepted with warnings; review the reason codes.".to_string()
            }
            (PolicyDecision::Block, Some(BlockType::Compliance)) => {
                "Invoice blocked due to compliance findings.".to_string()
            }
            (PolicyDecision::Block, Some(BlockType::Policy)) => {
                "Invoice blocked by tenant policy.".to_string()
            }
            _ => "Invoice blocked because a required check could not be completed.".to_string(),
        };

        let step_analysis = config.include_step_analysis.then(|| {
            steps
                .iter()
                .map(|step| self.analyze_step(step, decision, &reason_codes, config))
                .collect()
        });

        PolicyGateDecision {
            decision,
            reason_codes,
            block_type,
            applied_policy_version: config.policy_version.clone(),
            effective_at: chrono::Utc::now(),
            summary,
            step_analysis,
        }
    }

    fn analyze_step(
        &self,
        step: &StepResult,
        decision: PolicyDecision,
        reason_codes: &[ReasonCode],
        config: &PolicyGateConfig,
    ) -> StepAnalysisEntry {
        let mut triggered = Vec::new();
        if step.execution == ExecutionStatus::Errored
            && config.required_checks.iter().any(|id| step.filter_id == id.as_str())
        {
            triggered.push(ReasonCode::RequiredCheckFailed);
        }
        if step.has_error_diagnostics() {
            triggered.push(ReasonCode::ErrorPresent);
        }
        if step.has_warning_diagnostics() {
            triggered.push(ReasonCode::WarningsPresent);
        }
        if step.execution == ExecutionStatus::Errored
            && EXTERNAL_VERIFIERS.contains(&step.filter_id.as_str())
        {
            triggered.push(if reason_codes.contains(&ReasonCode::ExternalVerifierUnavailable) {
                ReasonCode::ExternalVerifierUnavailable
            } else {
                ReasonCode::ExternalVerifierFailed
            });
        }
        if step.skip_reason() == Some("pipeline_aborted") {
            triggered.push(ReasonCode::StepSkippedAborted);
        }

        let contribution = if triggered.is_empty() {
            StepContribution::Neutral
        } else if decision == PolicyDecision::Block
            && triggered.iter().any(|r| {
                matches!(
                    r,
                    ReasonCode::RequiredCheckFailed | ReasonCode::ErrorPresent
                ) && reason_codes.contains(r)
            })
        {
            StepContribution::Block
        } else {
            StepContribution::Warn
        };

        StepAnalysisEntry {
            step_id: step.filter_id.to_string(),
            status: match step.execution {
                ExecutionStatus::Ran => "ran",
                ExecutionStatus::Skipped => "skipped",
                ExecutionStatus::Errored => "errored",
            }
            .to_string(),
            contributed_to_decision: contribution != StepContribution::Neutral,
            contribution,
            triggered_reasons: triggered,
            diagnostic_counts: step_counts(step),
        }
    }
}

fn step_counts(step: &StepResult) -> DiagnosticCounts {
    ValidationReport::count_diagnostics(&step.diagnostics)
}

impl Default for PolicyGateFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Filter for PolicyGateFilter {
    fn id(&self) -> &FilterId {
        &self.id
    }

    fn name(&self) -> &str {
        "Policy Gate"
    }

    fn version(&self) -> &str {
        "2.0.0"
    }

    fn description(&self) -> Option<&str> {
        Some("Synthesizes the final ALLOW / ALLOW_WITH_WARNINGS / BLOCK decision")
    }

    fn tags(&self) -> Vec<String> {
        vec!["decision".to_string()]
    }

    async fn execute(
        &self,
        ctx: &ValidationContext,
        config: &FilterConfig,
    ) -> Result<StepResult, StepError> {
        let typed: PolicyGateConfig =
            serde_json::from_value(serde_json::Value::Object(config.clone()))
                .map_err(|e| StepError::new("CONFIG_ERROR", format!("invalid gate config: {}", e)))?;

        let decision = self.decide(ctx, &typed);
        let decision_value = serde_json::to_value(&decision)
            .map_err(|e| StepError::new("SERIALIZATION_ERROR", e.to_string()))?;

        Ok(StepResult::ran(self.id.clone()).with_metadata_value("decision", decision_value))
    }
}
