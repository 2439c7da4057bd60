// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Retry discipline through the orchestrator: bounded attempts, budget
//! enforcement, and recovery.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::common::{fid, StubBehavior, StubFilter, TestEngine};
use invoice_gate::infrastructure::filters::FilterRegistry;
use invoice_gate_domain::entities::{ExecutionStatus, PlanBuilder, PlanStep, StepError};
use invoice_gate_domain::services::filter::FilterConfig;
use invoice_gate_domain::value_objects::{FailurePolicy, RetryConfig};

fn retry(max_retries: u32, budget_ms: Option<u64>) -> RetryConfig {
    RetryConfig {
        max_retries,
        initial_delay_ms: 50,
        backoff_multiplier: 2.0,
        max_delay_ms: 200,
        total_budget_ms: budget_ms,
        jitter_factor: 0.1,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_attempts_are_bounded_by_max_retries() {
    let stub = StubFilter::new(
        "outage",
        StubBehavior::Fail(StepError::new("HTTP_ERROR", "upstream 503").with_status(503)),
    );
    let calls = stub.calls.clone();

    let registry = FilterRegistry::new();
    registry.register(Arc::new(stub), FilterConfig::new()).unwrap();

    let plan = PlanBuilder::new()
        .id("bounded")
        .add_step(
            PlanStep::filter(fid("outage"), 0)
                .with_failure_policy(FailurePolicy::SoftFail)
                .with_retry(retry(2, None)),
        )
        .build()
        .unwrap();

    let engine = TestEngine::with_registry(registry);
    let input = engine.staged_input(plan).await;
    let report = engine.orchestrator.execute(input).await.unwrap();

    // max_retries + 1 attempts, no more
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    let step = &report.steps[0];
    assert_eq!(step.execution, ExecutionStatus::Errored);
    assert_eq!(step.metadata["attempts"], serde_json::json!(3));
}

#[tokio::test]
async fn test_total_budget_bounds_wall_clock() {
    let stub = StubFilter::new(
        "outage",
        StubBehavior::Fail(StepError::new("HTTP_ERROR", "upstream 503").with_status(503)),
    );
    let calls = stub.calls.clone();

    let registry = FilterRegistry::new();
    registry.register(Arc::new(stub), FilterConfig::new()).unwrap();

    let plan = PlanBuilder::new()
        .id("budgeted")
        .add_step(
            PlanStep::filter(fid("outage"), 0)
                .with_failure_policy(FailurePolicy::SoftFail)
                .with_retry(RetryConfig {
                    max_retries: 50,
                    initial_delay_ms: 40,
                    backoff_multiplier: 1.0,
                    max_delay_ms: 40,
                    total_budget_ms: Some(150),
                    jitter_factor: 0.0,
                    ..Default::default()
                }),
        )
        .build()
        .unwrap();

    let engine = TestEngine::with_registry(registry);
    let input = engine.staged_input(plan).await;
    let started = Instant::now();
    let report = engine.orchestrator.execute(input).await.unwrap();

    // Elapsed stays within budget + one max delay (plus scheduling slack)
    assert!(started.elapsed() < Duration::from_millis(150 + 40 + 100));
    assert!(calls.load(std::sync::atomic::Ordering::SeqCst) <= 5);
    assert_eq!(report.steps[0].execution, ExecutionStatus::Errored);
}

#[tokio::test]
async fn test_transient_failure_recovers() {
    let stub = StubFilter::new(
        "flaky",
        StubBehavior::FailTimes {
            error: StepError::new("ECONNRESET", "connection reset"),
            times: 2,
        },
    );
    let calls = stub.calls.clone();

    let registry = FilterRegistry::new();
    registry.register(Arc::new(stub), FilterConfig::new()).unwrap();

    let plan = PlanBuilder::new()
        .id("recovery")
        .add_step(PlanStep::filter(fid("flaky"), 0).with_retry(retry(3, None)))
        .build()
        .unwrap();

    let engine = TestEngine::with_registry(registry);
    let input = engine.staged_input(plan).await;
    let report = engine.orchestrator.execute(input).await.unwrap();

    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    let step = &report.steps[0];
    assert_eq!(step.execution, ExecutionStatus::Ran);
    assert_eq!(step.metadata["attempts"], serde_json::json!(3));
}

#[tokio::test]
async fn test_permanent_errors_are_not_retried() {
    let stub = StubFilter::new(
        "broken",
        StubBehavior::Fail(StepError::new("CONFIG_ERROR", "missing endpoint")),
    );
    let calls = stub.calls.clone();

    let registry = FilterRegistry::new();
    registry.register(Arc::new(stub), FilterConfig::new()).unwrap();

    let plan = PlanBuilder::new()
        .id("permanent")
        .add_step(
            PlanStep::filter(fid("broken"), 0)
                .with_failure_policy(FailurePolicy::SoftFail)
                .with_retry(retry(5, None)),
        )
        .build()
        .unwrap();

    let engine = TestEngine::with_registry(registry);
    let input = engine.staged_input(plan).await;
    let report = engine.orchestrator.execute(input).await.unwrap();

    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(report.steps[0].execution, ExecutionStatus::Errored);
}
