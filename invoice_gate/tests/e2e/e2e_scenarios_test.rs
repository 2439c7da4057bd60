// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! End-to-end scenarios over the default plan: happy path, schema
//! failure, unsupported profile, verifier outage, filter panic, and
//! cleanup failure.

use std::sync::Arc;
use std::time::{Duration, Instant};

use regex::Regex;

use crate::common::{
    fid, happy_path_stubs, scenario_registry, FailingDeleteStore, StubBehavior, StubFilter,
    TestEngine,
};
use invoice_gate_domain::entities::{
    Diagnostic, ExecutionPlan, ExecutionStatus, PlanBuilder, PlanStep, PolicyDecision,
    ReasonCode, ReportState, RetentionWarningCode, StepError,
};
use invoice_gate_domain::services::filter::Filter;
use invoice_gate_domain::services::temp_store::TempStore;
use invoice_gate_domain::services::CleanupQueue;
use invoice_gate_domain::value_objects::fingerprint::FingerprintStatus;
use invoice_gate_domain::value_objects::{FailurePolicy, RetryConfig};

fn replace_stub(stubs: Vec<StubFilter>, id: &str, replacement: StubFilter) -> Vec<StubFilter> {
    let mut filtered: Vec<StubFilter> = stubs
        .into_iter()
        .filter(|s| s.id().as_str() != id)
        .collect();
    filtered.push(replacement);
    filtered
}

/// S1: all filters succeed.
#[tokio::test]
async fn test_s1_happy_path() {
    let registry = scenario_registry(happy_path_stubs()).unwrap();
    let engine = TestEngine::with_registry(registry);
    let input = engine
        .staged_input(ExecutionPlan::default_plan().unwrap())
        .await;

    let report = engine.orchestrator.execute(input).await.unwrap();

    assert_eq!(report.report_state, ReportState::Complete);
    assert!(report.retention_warnings.is_empty());

    let decision = report.final_decision.as_ref().unwrap();
    assert_eq!(decision.decision, PolicyDecision::Allow);
    assert!(decision.reason_codes.is_empty());

    let fingerprint = report.fingerprint.as_ref().unwrap();
    assert_eq!(fingerprint.status, FingerprintStatus::Approved);
    assert_eq!(fingerprint.score, 100);
    let id_shape = Regex::new(r"^FL-[0-9a-z]+-[0-9a-z]{6}$").unwrap();
    assert!(id_shape.is_match(&fingerprint.id), "id: {}", fingerprint.id);

    // Amounts stay decimal strings end to end
    assert_eq!(report.invoice_summary.total_amount.as_deref(), Some("357.00"));
}

/// S2: the schema check finds a blocking rule violation and the pipeline
/// fails fast.
#[tokio::test]
async fn test_s2_schema_failure_fail_fast() {
    let stubs = replace_stub(
        happy_path_stubs(),
        "kosit",
        StubFilter::new(
            "kosit",
            StubBehavior::Findings {
                diagnostics: vec![Diagnostic::error(
                    "BR-DE-01",
                    "business-rule",
                    fid("kosit"),
                    "buyer reference is missing",
                )],
                error_kind: Some("schematron".to_string()),
            },
        ),
    );
    let registry = scenario_registry(stubs).unwrap();
    let engine = TestEngine::with_registry(registry);
    let input = engine
        .staged_input(ExecutionPlan::default_plan().unwrap())
        .await;

    let report = engine.orchestrator.execute(input).await.unwrap();

    assert_eq!(report.report_state, ReportState::Incomplete);

    let by_id = |id: &str| report.steps.iter().find(|s| s.filter_id == id).unwrap();
    assert_eq!(by_id("kosit").execution, ExecutionStatus::Ran);
    // Everything after the failure is skipped, except the always-run tail
    for skipped in ["vies", "ecb-rates", "peppol", "steps-amount-validation", "semantic-risk"] {
        assert_eq!(by_id(skipped).execution, ExecutionStatus::Skipped, "{}", skipped);
        assert_eq!(by_id(skipped).skip_reason(), Some("pipeline_aborted"), "{}", skipped);
    }
    assert_eq!(by_id("fingerprint").execution, ExecutionStatus::Ran);
    assert_eq!(by_id("policy-gate").execution, ExecutionStatus::Ran);

    let decision = report.final_decision.as_ref().unwrap();
    assert_eq!(decision.decision, PolicyDecision::Block);
    assert_eq!(
        decision.block_type,
        Some(invoice_gate_domain::entities::BlockType::Compliance)
    );
    assert!(decision.reason_codes.contains(&ReasonCode::ErrorPresent));
    assert!(decision.reason_codes.contains(&ReasonCode::SchematronError));
}

/// S3: the validator has no scenario for the profile; the step skips and
/// the run degrades to a warning.
#[tokio::test]
async fn test_s3_profile_unsupported() {
    let stubs = replace_stub(
        happy_path_stubs(),
        "kosit",
        StubFilter::new("kosit", StubBehavior::ProfileUnsupported),
    );
    let registry = scenario_registry(stubs).unwrap();
    let engine = TestEngine::with_registry(registry);
    let input = engine
        .staged_input(ExecutionPlan::default_plan().unwrap())
        .await;

    let report = engine.orchestrator.execute(input).await.unwrap();

    let kosit = report.steps.iter().find(|s| s.filter_id == "kosit").unwrap();
    assert_eq!(kosit.execution, ExecutionStatus::Skipped);
    assert_eq!(
        kosit.metadata["reasonCode"],
        serde_json::json!("KOSIT_PROFILE_UNSUPPORTED")
    );

    // Downstream steps still evaluated
    let amount = report
        .steps
        .iter()
        .find(|s| s.filter_id == "steps-amount-validation")
        .unwrap();
    assert_eq!(amount.execution, ExecutionStatus::Ran);

    let decision = report.final_decision.as_ref().unwrap();
    assert_eq!(decision.decision, PolicyDecision::AllowWithWarnings);
    assert!(decision.reason_codes.contains(&ReasonCode::WarningsPresent));
}

/// S4: a live verifier is down; the retry budget bounds the attempts and
/// the run degrades instead of blocking.
#[tokio::test]
async fn test_s4_verifier_outage_with_budget() {
    let vies = StubFilter::new(
        "vies",
        StubBehavior::Fail(StepError::new("HTTP_ERROR", "upstream 503").with_status(503)),
    );
    let vies_calls = vies.calls.clone();

    let registry = scenario_registry(vec![
        StubFilter::new("parser", StubBehavior::ParseInvoice),
        vies,
    ])
    .unwrap();

    let plan = PlanBuilder::new()
        .id("s4")
        .add_step(PlanStep::filter(fid("parser"), 0))
        .add_step(
            PlanStep::filter(fid("vies"), 1)
                .with_failure_policy(FailurePolicy::SoftFail)
                .with_retry(RetryConfig {
                    max_retries: 2,
                    initial_delay_ms: 500,
                    backoff_multiplier: 2.0,
                    max_delay_ms: 5_000,
                    total_budget_ms: Some(2_000),
                    jitter_factor: 0.1,
                    ..Default::default()
                }),
        )
        .add_step(
            PlanStep::filter(fid("fingerprint"), 2)
                .with_failure_policy(FailurePolicy::AlwaysRun),
        )
        .add_step(
            PlanStep::filter(fid("policy-gate"), 3)
                .with_failure_policy(FailurePolicy::AlwaysRun),
        )
        .build()
        .unwrap();

    let engine = TestEngine::with_registry(registry);
    let input = engine.staged_input(plan).await;
    let started = Instant::now();
    let report = engine.orchestrator.execute(input).await.unwrap();
    let elapsed = started.elapsed();

    assert!(vies_calls.load(std::sync::atomic::Ordering::SeqCst) <= 3);
    assert!(elapsed <= Duration::from_millis(2_500), "elapsed {:?}", elapsed);

    let vies_step = report.steps.iter().find(|s| s.filter_id == "vies").unwrap();
    assert_eq!(vies_step.execution, ExecutionStatus::Errored);
    assert!(vies_step.has_warning_diagnostics());

    let decision = report.final_decision.as_ref().unwrap();
    assert_eq!(decision.decision, PolicyDecision::AllowWithWarnings);
    assert!(decision
        .reason_codes
        .contains(&ReasonCode::ExternalVerifierFailed));
    assert!(decision.reason_codes.contains(&ReasonCode::WarningsPresent));
}

/// S5: the parser panics; the run still produces a report, the always-run
/// tail executes, and the raw invoice is cleaned up.
#[tokio::test]
async fn test_s5_filter_panic() {
    let stubs = replace_stub(
        happy_path_stubs(),
        "parser",
        StubFilter::new("parser", StubBehavior::Panic("parser exploded")),
    );
    let registry = scenario_registry(stubs).unwrap();
    let engine = TestEngine::with_registry(registry);
    let input = engine
        .staged_input(ExecutionPlan::default_plan().unwrap())
        .await;
    let raw_key = input.raw.temp_key.clone();

    let report = engine.orchestrator.execute(input).await.unwrap();

    assert_eq!(report.report_state, ReportState::Errored);

    let parser = report.steps.iter().find(|s| s.filter_id == "parser").unwrap();
    assert_eq!(parser.execution, ExecutionStatus::Errored);
    let error = parser.error.as_ref().unwrap();
    assert_eq!(error.name, "PANIC");
    assert!(error.message.contains("parser exploded"));

    // Only the always-run tail executed after the panic
    let ran: Vec<&str> = report
        .steps
        .iter()
        .filter(|s| s.execution == ExecutionStatus::Ran)
        .map(|s| s.filter_id.as_str())
        .collect();
    assert_eq!(ran, vec!["fingerprint", "policy-gate"]);

    // The raw invoice is gone regardless of the panic
    assert!(!engine.temp_store.has(raw_key.as_str()).await.unwrap());
}

/// S6: secure delete fails for the raw invoice; the report is returned
/// normally with a queued-cleanup warning that names no key.
#[tokio::test]
async fn test_s6_cleanup_failure() {
    let registry = scenario_registry(happy_path_stubs()).unwrap();
    let store = Arc::new(FailingDeleteStore::new("raw-invoice:"));
    let engine = TestEngine::with_registry_and_store(registry, store);
    let input = engine
        .staged_input(ExecutionPlan::default_plan().unwrap())
        .await;
    let raw_key = input.raw.temp_key.clone();

    let report = engine.orchestrator.execute(input).await.unwrap();

    // The run itself is unaffected
    assert_eq!(report.report_state, ReportState::Complete);
    assert_eq!(
        report.final_decision.as_ref().unwrap().decision,
        PolicyDecision::Allow
    );
    assert_eq!(report.applied_retention_policy, "zero-retention");

    assert_eq!(report.retention_warnings.len(), 1);
    let warning = &report.retention_warnings[0];
    assert_eq!(warning.code, RetentionWarningCode::CleanupQueued);
    assert_eq!(warning.affected_count, 1);
    assert!(!warning.message.contains(raw_key.as_str()));

    // The failed delete is queued for retry
    let pending = engine.cleanup_queue.pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].key, raw_key.as_str());
}
