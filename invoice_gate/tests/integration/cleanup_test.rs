// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Guaranteed-cleanup tests: every tracked key is deleted or queued on
//! every exit path, and the queue abandons keys only after exhausting its
//! retries.

use std::sync::Arc;

use crate::common::{fid, FailingDeleteStore, StubBehavior, StubFilter, TestEngine};
use invoice_gate::infrastructure::filters::FilterRegistry;
use invoice_gate::infrastructure::stores::{MemoryCleanupQueue, MemoryTempStore};
use invoice_gate_domain::entities::{PlanBuilder, PlanStep, RetentionWarningCode};
use invoice_gate_domain::services::cleanup_queue::{CleanupQueue, FailedDeleteRecord};
use invoice_gate_domain::services::filter::FilterConfig;
use invoice_gate_domain::services::temp_store::TempStore;

fn single_step_registry(stub: StubFilter) -> FilterRegistry {
    let registry = FilterRegistry::new();
    registry.register(Arc::new(stub), FilterConfig::new()).unwrap();
    registry
}

#[tokio::test]
async fn test_cleanup_runs_on_success() {
    let registry = single_step_registry(StubFilter::new("parser", StubBehavior::ParseInvoice));
    let plan = PlanBuilder::new()
        .id("success")
        .add_step(PlanStep::filter(fid("parser"), 0))
        .build()
        .unwrap();

    let engine = TestEngine::with_registry(registry);
    let input = engine.staged_input(plan).await;
    let raw_key = input.raw.temp_key.clone();

    let report = engine.orchestrator.execute(input).await.unwrap();

    assert!(report.retention_warnings.is_empty());
    assert!(!engine.temp_store.has(raw_key.as_str()).await.unwrap());
    assert!(engine.cleanup_queue.pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cleanup_runs_after_filter_panic() {
    let registry = single_step_registry(StubFilter::new("parser", StubBehavior::Panic("boom")));
    let plan = PlanBuilder::new()
        .id("panic")
        .add_step(PlanStep::filter(fid("parser"), 0))
        .build()
        .unwrap();

    let engine = TestEngine::with_registry(registry);
    let input = engine.staged_input(plan).await;
    let raw_key = input.raw.temp_key.clone();

    let report = engine.orchestrator.execute(input).await.unwrap();

    // The report still exists and the raw bytes are gone
    assert_eq!(
        report.steps[0].error.as_ref().unwrap().name,
        "PANIC"
    );
    assert!(!engine.temp_store.has(raw_key.as_str()).await.unwrap());
}

#[tokio::test]
async fn test_failed_deletes_are_queued_and_warned() {
    let registry = single_step_registry(StubFilter::new("parser", StubBehavior::Ok));
    let plan = PlanBuilder::new()
        .id("failing-store")
        .add_step(PlanStep::filter(fid("parser"), 0))
        .build()
        .unwrap();

    // Secure deletes fail for the raw-invoice namespace only
    let store = Arc::new(FailingDeleteStore::new("raw-invoice:"));
    let engine = TestEngine::with_registry_and_store(registry, store);
    let input = engine.staged_input(plan).await;
    let raw_key = input.raw.temp_key.clone();

    let report = engine.orchestrator.execute(input).await.unwrap();

    assert_eq!(report.retention_warnings.len(), 1);
    let warning = &report.retention_warnings[0];
    assert_eq!(warning.code, RetentionWarningCode::CleanupQueued);
    assert_eq!(warning.affected_count, 1);
    assert!(!warning.message.contains(raw_key.as_str()));

    let pending = engine.cleanup_queue.pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].key, raw_key.as_str());
    assert_eq!(pending[0].category.as_deref(), Some("raw-invoice"));
}

#[tokio::test]
async fn test_queue_retries_and_abandons() {
    let store = FailingDeleteStore::new("raw-invoice:");
    let queue = MemoryCleanupQueue::new();

    let mut record = FailedDeleteRecord::new("raw-invoice:stuck", "backend rejected");
    record.max_retries = 2;
    queue.enqueue(record).await.unwrap();

    // First pass fails but keeps the record
    let first = queue.process(&store).await.unwrap();
    assert_eq!(first.processed, 1);
    assert_eq!(first.failed, 1);
    assert_eq!(first.abandoned, 0);
    assert_eq!(queue.pending().await.unwrap().len(), 1);

    // Second pass exhausts the retries and abandons the key
    let second = queue.process(&store).await.unwrap();
    assert_eq!(second.abandoned, 1);
    assert_eq!(second.abandoned_keys, vec!["raw-invoice:stuck".to_string()]);
    assert!(queue.pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_queue_drains_once_the_store_recovers() {
    let store = MemoryTempStore::new();
    store
        .set(
            "raw-invoice:recovered",
            b"bytes".to_vec(),
            invoice_gate_domain::services::temp_store::SetOptions::new("raw-invoice"),
        )
        .await
        .unwrap();

    let queue = MemoryCleanupQueue::new();
    queue
        .enqueue(FailedDeleteRecord::new("raw-invoice:recovered", "was transient"))
        .await
        .unwrap();

    let outcome = queue.process(&store).await.unwrap();
    assert_eq!(outcome.succeeded, 1);
    assert!(!store.has("raw-invoice:recovered").await.unwrap());
    assert!(queue.pending().await.unwrap().is_empty());
}
