// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Orchestrator integration tests: plan order, parallelism bounds, abort
//! discipline, conditions, timeouts, and re-entrancy.

use std::sync::Arc;
use std::time::Duration;

use crate::common::{
    fid, ConcurrencyGauge, StubBehavior, StubFilter, TestEngine,
};
use invoice_gate::infrastructure::filters::FilterRegistry;
use invoice_gate_domain::entities::{
    ExecutionStatus, GlobalConfig, PlanBuilder, PlanStep, ReportState, StepCondition, StepError,
    ValidationOptions,
};
use invoice_gate_domain::services::filter::FilterConfig;
use invoice_gate_domain::services::temp_store::TempStore;
use invoice_gate_domain::value_objects::FailurePolicy;
use invoice_gate_domain::PipelineError;

fn registry_of(stubs: Vec<StubFilter>) -> FilterRegistry {
    let registry = FilterRegistry::new();
    for stub in stubs {
        registry
            .register(Arc::new(stub), FilterConfig::new())
            .unwrap();
    }
    registry
}

#[tokio::test]
async fn test_steps_complete_in_plan_order() {
    let registry = registry_of(vec![
        StubFilter::new("alpha", StubBehavior::Ok),
        StubFilter::new("bravo", StubBehavior::Ok),
        StubFilter::new("charlie", StubBehavior::Ok),
    ]);
    // Added out of order; the builder sorts by order
    let plan = PlanBuilder::new()
        .id("ordering")
        .add_step(PlanStep::filter(fid("charlie"), 9))
        .add_step(PlanStep::filter(fid("alpha"), 1))
        .add_step(PlanStep::filter(fid("bravo"), 5))
        .build()
        .unwrap();

    let engine = TestEngine::with_registry(registry);
    let input = engine.staged_input(plan).await;
    let report = engine.orchestrator.execute(input).await.unwrap();

    let ids: Vec<&str> = report.steps.iter().map(|s| s.filter_id.as_str()).collect();
    assert_eq!(ids, vec!["alpha", "bravo", "charlie"]);
    assert_eq!(report.report_state, ReportState::Complete);
}

#[tokio::test]
async fn test_parallel_group_respects_max_parallelism() {
    let gauge = Arc::new(ConcurrencyGauge::default());
    let children: Vec<StubFilter> = (0..8u32)
        .map(|i| {
            StubFilter::new(&format!("worker-{}", i), StubBehavior::Ok)
                .with_gauge(gauge.clone())
        })
        .collect();
    let registry = registry_of(
        children
            .into_iter()
            .chain(std::iter::once(StubFilter::new("downstream", StubBehavior::Ok)))
            .collect(),
    );

    let group_children: Vec<PlanStep> = (0..8u32)
        .map(|i| PlanStep::filter(fid(&format!("worker-{}", i)), i))
        .collect();
    let plan = PlanBuilder::new()
        .id("parallel")
        .global_config(GlobalConfig {
            max_parallelism: 3,
            ..Default::default()
        })
        .add_step(PlanStep::group(fid("fan-out"), 0, true, group_children))
        .add_step(PlanStep::filter(fid("downstream"), 1))
        .build()
        .unwrap();

    let engine = TestEngine::with_registry(registry);
    let input = engine.staged_input(plan).await;
    let report = engine.orchestrator.execute(input).await.unwrap();

    // Bound: never more than max_parallelism in flight
    assert!(gauge.max_observed() <= 3, "observed {}", gauge.max_observed());
    // All children completed before the downstream sibling
    let ids: Vec<&str> = report.steps.iter().map(|s| s.filter_id.as_str()).collect();
    let downstream_pos = ids.iter().position(|id| *id == "downstream").unwrap();
    assert_eq!(downstream_pos, ids.len() - 1);
    assert_eq!(
        report.steps.iter().filter(|s| s.execution == ExecutionStatus::Ran).count(),
        9
    );
}

#[tokio::test]
async fn test_fail_fast_aborts_all_subsequent_non_always_run_steps() {
    let registry = registry_of(vec![
        StubFilter::new(
            "failing",
            StubBehavior::Findings {
                diagnostics: vec![invoice_gate_domain::entities::Diagnostic::error(
                    "BR-DE-01",
                    "business-rule",
                    fid("failing"),
                    "mandatory field missing",
                )],
                error_kind: None,
            },
        ),
        StubFilter::new("second", StubBehavior::Ok),
        StubFilter::new("third", StubBehavior::Ok),
        StubFilter::new("final-audit", StubBehavior::Ok),
    ]);
    let plan = PlanBuilder::new()
        .id("abort")
        .add_step(PlanStep::filter(fid("failing"), 0))
        .add_step(PlanStep::filter(fid("second"), 1))
        .add_step(PlanStep::filter(fid("third"), 2))
        .add_step(
            PlanStep::filter(fid("final-audit"), 3).with_failure_policy(FailurePolicy::AlwaysRun),
        )
        .build()
        .unwrap();

    let engine = TestEngine::with_registry(registry);
    let input = engine.staged_input(plan).await;
    let report = engine.orchestrator.execute(input).await.unwrap();

    assert_eq!(report.report_state, ReportState::Incomplete);
    let by_id = |id: &str| report.steps.iter().find(|s| s.filter_id == id).unwrap();
    assert_eq!(by_id("failing").execution, ExecutionStatus::Ran);
    assert_eq!(by_id("second").execution, ExecutionStatus::Skipped);
    assert_eq!(by_id("second").skip_reason(), Some("pipeline_aborted"));
    assert_eq!(by_id("third").execution, ExecutionStatus::Skipped);
    // Always-run executes after the abort
    assert_eq!(by_id("final-audit").execution, ExecutionStatus::Ran);
}

#[tokio::test]
async fn test_continue_on_failure_suppresses_abort() {
    let registry = registry_of(vec![
        StubFilter::new(
            "tolerated",
            StubBehavior::Findings {
                diagnostics: vec![invoice_gate_domain::entities::Diagnostic::error(
                    "X-1",
                    "business-rule",
                    fid("tolerated"),
                    "known issue",
                )],
                error_kind: None,
            },
        ),
        StubFilter::new("after", StubBehavior::Ok),
    ]);
    let plan = PlanBuilder::new()
        .id("tolerant")
        .add_step(PlanStep::filter(fid("tolerated"), 0).with_continue_on_failure())
        .add_step(PlanStep::filter(fid("after"), 1))
        .build()
        .unwrap();

    let engine = TestEngine::with_registry(registry);
    let input = engine.staged_input(plan).await;
    let report = engine.orchestrator.execute(input).await.unwrap();

    assert_eq!(report.report_state, ReportState::Complete);
    assert!(report
        .steps
        .iter()
        .all(|s| s.execution != ExecutionStatus::Skipped));
}

#[tokio::test]
async fn test_soft_fail_error_records_warning_and_continues() {
    let registry = registry_of(vec![
        StubFilter::new(
            "flaky-verifier",
            StubBehavior::Fail(StepError::new("HTTP_ERROR", "upstream 503").with_status(503)),
        ),
        StubFilter::new("after", StubBehavior::Ok),
    ]);
    let plan = PlanBuilder::new()
        .id("soft")
        .add_step(
            PlanStep::filter(fid("flaky-verifier"), 0)
                .with_failure_policy(FailurePolicy::SoftFail),
        )
        .add_step(PlanStep::filter(fid("after"), 1))
        .build()
        .unwrap();

    let engine = TestEngine::with_registry(registry);
    let input = engine.staged_input(plan).await;
    let report = engine.orchestrator.execute(input).await.unwrap();

    let flaky = report
        .steps
        .iter()
        .find(|s| s.filter_id == "flaky-verifier")
        .unwrap();
    assert_eq!(flaky.execution, ExecutionStatus::Errored);
    assert!(flaky.has_warning_diagnostics());
    // The pipeline kept going
    let after = report.steps.iter().find(|s| s.filter_id == "after").unwrap();
    assert_eq!(after.execution, ExecutionStatus::Ran);
    assert_eq!(report.report_state, ReportState::Errored);
}

#[tokio::test]
async fn test_conditions_gate_execution() {
    let registry = registry_of(vec![
        StubFilter::new("parser", StubBehavior::ParseInvoice),
        StubFilter::new("on-parse", StubBehavior::Ok),
        StubFilter::new("on-failure", StubBehavior::Ok),
        StubFilter::new("on-field", StubBehavior::Ok),
    ]);
    let plan = PlanBuilder::new()
        .id("conditions")
        .add_step(PlanStep::filter(fid("parser"), 0))
        .add_step(PlanStep::filter(fid("on-parse"), 1).with_condition(
            StepCondition::FilterPassed { filter_id: fid("parser") },
        ))
        .add_step(PlanStep::filter(fid("on-failure"), 2).with_condition(
            StepCondition::FilterFailed { filter_id: fid("parser") },
        ))
        .add_step(PlanStep::filter(fid("on-field"), 3).with_condition(
            StepCondition::FieldExists { path: "header.currency".to_string() },
        ))
        .build()
        .unwrap();

    let engine = TestEngine::with_registry(registry);
    let input = engine.staged_input(plan).await;
    let report = engine.orchestrator.execute(input).await.unwrap();

    let by_id = |id: &str| report.steps.iter().find(|s| s.filter_id == id).unwrap();
    assert_eq!(by_id("on-parse").execution, ExecutionStatus::Ran);
    assert_eq!(by_id("on-failure").execution, ExecutionStatus::Skipped);
    assert_eq!(by_id("on-failure").skip_reason(), Some("condition_not_met"));
    // The parser output was adopted into the context, so the field exists
    assert_eq!(by_id("on-field").execution, ExecutionStatus::Ran);
}

#[tokio::test]
async fn test_disabled_steps_are_silent() {
    let registry = registry_of(vec![
        StubFilter::new("active", StubBehavior::Ok),
        StubFilter::new("inactive", StubBehavior::Ok),
    ]);
    let plan = PlanBuilder::new()
        .id("enablement")
        .add_step(PlanStep::filter(fid("active"), 0))
        .add_step(PlanStep::filter(fid("inactive"), 1).disabled())
        .build()
        .unwrap();

    let engine = TestEngine::with_registry(registry);
    let input = engine.staged_input(plan).await;
    let report = engine.orchestrator.execute(input).await.unwrap();

    assert_eq!(report.steps.len(), 1);
    assert_eq!(report.steps[0].filter_id, "active");
}

#[tokio::test]
async fn test_unregistered_filter_is_an_errored_step() {
    let registry = registry_of(vec![StubFilter::new("known", StubBehavior::Ok)]);
    let plan = PlanBuilder::new()
        .id("missing")
        .add_step(PlanStep::filter(fid("known"), 0))
        .add_step(PlanStep::filter(fid("ghost"), 1).with_failure_policy(FailurePolicy::SoftFail))
        .build()
        .unwrap();

    let engine = TestEngine::with_registry(registry);
    let input = engine.staged_input(plan).await;
    let report = engine.orchestrator.execute(input).await.unwrap();

    let ghost = report.steps.iter().find(|s| s.filter_id == "ghost").unwrap();
    assert_eq!(ghost.execution, ExecutionStatus::Errored);
    assert_eq!(ghost.error.as_ref().unwrap().name, "FILTER_NOT_FOUND");
    assert_eq!(ghost.filter_version, "unregistered");
}

#[tokio::test]
async fn test_step_timeout_becomes_timeout_error() {
    let registry = registry_of(vec![
        StubFilter::new("slow", StubBehavior::Sleep(Duration::from_millis(500))),
        StubFilter::new("after", StubBehavior::Ok),
    ]);
    let plan = PlanBuilder::new()
        .id("timeouts")
        .add_step(
            PlanStep::filter(fid("slow"), 0)
                .with_timeout_ms(50)
                .with_failure_policy(FailurePolicy::SoftFail),
        )
        .add_step(PlanStep::filter(fid("after"), 1))
        .build()
        .unwrap();

    let engine = TestEngine::with_registry(registry);
    let input = engine.staged_input(plan).await;
    let report = engine.orchestrator.execute(input).await.unwrap();

    let slow = report.steps.iter().find(|s| s.filter_id == "slow").unwrap();
    assert_eq!(slow.execution, ExecutionStatus::Errored);
    assert_eq!(slow.error.as_ref().unwrap().name, "TIMEOUT");
    let after = report.steps.iter().find(|s| s.filter_id == "after").unwrap();
    assert_eq!(after.execution, ExecutionStatus::Ran);
}

#[tokio::test]
async fn test_whole_run_timeout_skips_remaining_but_runs_always_run() {
    let registry = registry_of(vec![
        StubFilter::new("slow", StubBehavior::Sleep(Duration::from_millis(500))),
        StubFilter::new("never", StubBehavior::Ok),
        StubFilter::new("audit", StubBehavior::Ok),
    ]);
    let plan = PlanBuilder::new()
        .id("run-timeout")
        .add_step(PlanStep::filter(fid("slow"), 0))
        .add_step(PlanStep::filter(fid("never"), 1))
        .add_step(PlanStep::filter(fid("audit"), 2).with_failure_policy(FailurePolicy::AlwaysRun))
        .build()
        .unwrap();

    let engine = TestEngine::with_registry(registry);
    let input = engine
        .staged_input_with(
            plan,
            ValidationOptions {
                timeout_ms: Some(50),
                ..Default::default()
            },
        )
        .await;
    let report = engine.orchestrator.execute(input).await.unwrap();

    let by_id = |id: &str| report.steps.iter().find(|s| s.filter_id == id).unwrap();
    assert_eq!(by_id("slow").execution, ExecutionStatus::Errored);
    assert_eq!(by_id("slow").error.as_ref().unwrap().name, "CANCELLED");
    assert_eq!(by_id("never").execution, ExecutionStatus::Skipped);
    assert_eq!(by_id("audit").execution, ExecutionStatus::Ran);
}

#[tokio::test]
async fn test_second_concurrent_run_is_rejected() {
    let registry = registry_of(vec![StubFilter::new(
        "slow",
        StubBehavior::Sleep(Duration::from_millis(300)),
    )]);
    let plan = PlanBuilder::new()
        .id("busy")
        .add_step(PlanStep::filter(fid("slow"), 0))
        .build()
        .unwrap();

    let engine = TestEngine::with_registry(registry);
    let first_input = engine.staged_input(plan.clone()).await;
    let second_input = engine.staged_input(plan).await;

    let orchestrator = engine.orchestrator.clone();
    let first = tokio::spawn(async move { orchestrator.execute(first_input).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = engine.orchestrator.execute(second_input).await;
    assert!(matches!(second, Err(PipelineError::AlreadyExecuting(_))));

    // The in-flight run is unaffected
    assert!(first.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_temp_keys_are_swept_after_the_run() {
    let registry = registry_of(vec![StubFilter::new("parser", StubBehavior::ParseInvoice)]);
    let plan = PlanBuilder::new()
        .id("sweep")
        .add_step(PlanStep::filter(fid("parser"), 0))
        .build()
        .unwrap();

    let engine = TestEngine::with_registry(registry);
    let input = engine.staged_input(plan).await;
    let raw_key = input.raw.temp_key.clone();

    let report = engine.orchestrator.execute(input).await.unwrap();
    assert!(report.retention_warnings.is_empty());
    assert!(!engine.temp_store.has(raw_key.as_str()).await.unwrap());
}
