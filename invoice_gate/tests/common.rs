// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Common Test Helpers
//!
//! Shared utilities for integration and end-to-end tests: configurable
//! stub filters, engine wiring over in-memory backends, and canonical
//! invoice fixtures.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use invoice_gate::application::services::{PipelineOrchestrator, ValidationInput};
use invoice_gate::infrastructure::config::ConfigService;
use invoice_gate::infrastructure::filters::{FilterRegistry, FingerprintFilter, PolicyGateFilter};
use invoice_gate::infrastructure::stores::{MemoryCleanupQueue, MemoryTempStore};
use invoice_gate_domain::entities::{
    Diagnostic, ExecutionPlan, StepError, StepResult, ValidationContext, ValidationOptions,
};
use invoice_gate_domain::events::ObserverSet;
use invoice_gate_domain::services::filter::{Filter, FilterConfig};
use invoice_gate_domain::services::temp_store::{SetOptions, TempStore};
use invoice_gate_domain::value_objects::{ContentType, FilterId, RawInvoiceRef, RunId, TempKey};
use invoice_gate_domain::PipelineError;

pub fn fid(id: &str) -> FilterId {
    FilterId::new(id).unwrap()
}

/// Tracks in-flight executions to assert concurrency bounds.
#[derive(Default)]
pub struct ConcurrencyGauge {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl ConcurrencyGauge {
    pub fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    pub fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn max_observed(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

/// What a stub filter does when executed.
pub enum StubBehavior {
    /// Completes cleanly.
    Ok,
    /// Completes with the given diagnostics and optional `errorKind`.
    Findings {
        diagnostics: Vec<Diagnostic>,
        error_kind: Option<String>,
    },
    /// Fails every attempt with the given error.
    Fail(StepError),
    /// Fails the first `times` attempts, then completes.
    FailTimes { error: StepError, times: u32 },
    /// Panics.
    Panic(&'static str),
    /// Sleeps, then completes.
    Sleep(Duration),
    /// Completes with a risk score in metadata.
    Score(u32),
    /// Skips with the profile-unsupported reason code.
    ProfileUnsupported,
    /// Completes with a parsed canonical invoice in metadata.
    ParseInvoice,
}

/// Configurable test filter.
pub struct StubFilter {
    id: FilterId,
    behavior: StubBehavior,
    pub calls: Arc<AtomicU32>,
    gauge: Option<Arc<ConcurrencyGauge>>,
}

impl StubFilter {
    pub fn new(id: &str, behavior: StubBehavior) -> Self {
        Self {
            id: fid(id),
            behavior,
            calls: Arc::new(AtomicU32::new(0)),
            gauge: None,
        }
    }

    pub fn with_gauge(mut self, gauge: Arc<ConcurrencyGauge>) -> Self {
        self.gauge = Some(gauge);
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Filter for StubFilter {
    fn id(&self) -> &FilterId {
        &self.id
    }

    fn name(&self) -> &str {
        "Stub"
    }

    fn version(&self) -> &str {
        "0.0.1"
    }

    async fn execute(
        &self,
        _ctx: &ValidationContext,
        _config: &FilterConfig,
    ) -> Result<StepResult, StepError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gauge) = &self.gauge {
            gauge.enter();
            // Hold the slot long enough for batch overlap to be observable
            tokio::time::sleep(Duration::from_millis(25)).await;
            gauge.exit();
        }

        match &self.behavior {
            StubBehavior::Ok => Ok(StepResult::ran(self.id.clone())),
            StubBehavior::Findings {
                diagnostics,
                error_kind,
            } => {
                let mut result =
                    StepResult::ran(self.id.clone()).with_diagnostics(diagnostics.clone());
                if let Some(kind) = error_kind {
                    result = result.with_metadata_value("errorKind", json!(kind));
                }
                Ok(result)
            }
            StubBehavior::Fail(error) => Err(error.clone()),
            StubBehavior::FailTimes { error, times } => {
                if call < *times {
                    Err(error.clone())
                } else {
                    Ok(StepResult::ran(self.id.clone()))
                }
            }
            StubBehavior::Panic(message) => panic!("{}", message),
            StubBehavior::Sleep(duration) => {
                tokio::time::sleep(*duration).await;
                Ok(StepResult::ran(self.id.clone()))
            }
            StubBehavior::Score(score) => Ok(StepResult::ran(self.id.clone())
                .with_metadata_value("score", json!(score))),
            StubBehavior::ProfileUnsupported => Ok(StepResult::skipped(self.id.clone())
                .with_diagnostics(vec![Diagnostic::warning(
                    "KOSIT-PROFILE-UNSUPPORTED",
                    "schema",
                    self.id.clone(),
                    "No validation scenario matches this document profile",
                )])
                .with_metadata_value("reasonCode", json!("KOSIT_PROFILE_UNSUPPORTED"))
                .with_metadata_value("profileUnsupported", json!(true))),
            StubBehavior::ParseInvoice => Ok(StepResult::ran(self.id.clone())
                .with_metadata_value("parsedInvoice", sample_invoice_value())),
        }
    }
}

/// A canonical invoice in its JSON wire form.
pub fn sample_invoice_value() -> serde_json::Value {
    json!({
        "header": {
            "invoiceNumber": "RE-2025-0042",
            "issueDate": "2025-06-30",
            "dueDate": "2025-07-30",
            "currency": "EUR",
            "buyerReference": "04011000-12345-39"
        },
        "seller": {
            "name": "Seller GmbH",
            "vatId": "DE123456789",
            "address": { "street": "Lindenstr. 1", "city": "Berlin", "postalCode": "10969", "country": "DE" }
        },
        "buyer": {
            "name": "Buyer AG",
            "vatId": "DE987654321",
            "address": { "country": "DE" }
        },
        "lines": [{
            "id": "1",
            "description": "Consulting",
            "quantity": "3",
            "unitCode": "HUR",
            "unitPrice": "100.00",
            "lineNetAmount": "300.00",
            "taxCategory": "S",
            "taxRate": "19"
        }],
        "totals": {
            "lineExtensionAmount": "300.00",
            "taxExclusiveAmount": "300.00",
            "taxInclusiveAmount": "357.00",
            "payableAmount": "357.00"
        },
        "taxBreakdown": [{
            "category": "S",
            "rate": "19",
            "taxableAmount": "300.00",
            "taxAmount": "57.00"
        }]
    })
}

pub fn sample_invoice_bytes() -> Vec<u8> {
    sample_invoice_value().to_string().into_bytes()
}

/// Wired test engine over in-memory backends.
pub struct TestEngine {
    pub registry: Arc<FilterRegistry>,
    pub temp_store: Arc<dyn TempStore>,
    pub cleanup_queue: Arc<MemoryCleanupQueue>,
    pub orchestrator: Arc<PipelineOrchestrator>,
}

impl TestEngine {
    /// Builds an engine with the given registry over fresh stores.
    pub fn with_registry(registry: FilterRegistry) -> Self {
        Self::with_registry_and_store(registry, Arc::new(MemoryTempStore::new()))
    }

    /// Builds an engine over a caller-provided temp store backend.
    pub fn with_registry_and_store(
        registry: FilterRegistry,
        temp_store: Arc<dyn TempStore>,
    ) -> Self {
        let registry = Arc::new(registry);
        let cleanup_queue = Arc::new(MemoryCleanupQueue::new());
        let orchestrator = Arc::new(PipelineOrchestrator::new(
            registry.clone(),
            temp_store.clone(),
            cleanup_queue.clone(),
            Arc::new(ConfigService::from_defaults()),
            Arc::new(ObserverSet::new()),
        ));
        Self {
            registry,
            temp_store,
            cleanup_queue,
            orchestrator,
        }
    }

    /// Stages the sample invoice and builds a run input over `plan`.
    pub async fn staged_input(&self, plan: ExecutionPlan) -> ValidationInput {
        self.staged_input_with(plan, ValidationOptions::default()).await
    }

    pub async fn staged_input_with(
        &self,
        plan: ExecutionPlan,
        options: ValidationOptions,
    ) -> ValidationInput {
        let run_id = RunId::new();
        let temp_key = TempKey::for_run("raw-invoice", &run_id);
        self.temp_store
            .set(
                temp_key.as_str(),
                sample_invoice_bytes(),
                SetOptions::new("raw-invoice").encrypted(),
            )
            .await
            .unwrap();

        ValidationInput {
            run_id: Some(run_id),
            raw: RawInvoiceRef {
                temp_key,
                content_type: ContentType::Json,
                format_hint: None,
                size_bytes: sample_invoice_bytes().len() as u64,
            },
            plan: Some(plan),
            options,
            correlation_id: Some("test-correlation".to_string()),
        }
    }
}

/// Store wrapper whose secure deletes fail for keys with a given prefix.
pub struct FailingDeleteStore {
    inner: MemoryTempStore,
    failing_prefix: String,
}

impl FailingDeleteStore {
    pub fn new(failing_prefix: impl Into<String>) -> Self {
        Self {
            inner: MemoryTempStore::new(),
            failing_prefix: failing_prefix.into(),
        }
    }
}

#[async_trait]
impl TempStore for FailingDeleteStore {
    async fn set(
        &self,
        key: &str,
        data: Vec<u8>,
        options: SetOptions,
    ) -> Result<(), PipelineError> {
        self.inner.set(key, data, options).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PipelineError> {
        self.inner.get(key).await
    }

    async fn get_metadata(
        &self,
        key: &str,
    ) -> Result<Option<invoice_gate_domain::services::temp_store::TempEntryMetadata>, PipelineError>
    {
        self.inner.get_metadata(key).await
    }

    async fn has(&self, key: &str) -> Result<bool, PipelineError> {
        self.inner.has(key).await
    }

    async fn delete(&self, key: &str) -> Result<bool, PipelineError> {
        self.inner.delete(key).await
    }

    async fn secure_delete(&self, key: &str) -> Result<bool, PipelineError> {
        if key.starts_with(&self.failing_prefix) {
            return Err(PipelineError::temp_store("secure delete rejected by backend"));
        }
        self.inner.secure_delete(key).await
    }

    async fn ttl(&self, key: &str) -> Result<i64, PipelineError> {
        self.inner.ttl(key).await
    }

    async fn extend_ttl(&self, key: &str, additional_ms: u64) -> Result<bool, PipelineError> {
        self.inner.extend_ttl(key, additional_ms).await
    }

    async fn cleanup(&self) -> Result<usize, PipelineError> {
        self.inner.cleanup().await
    }

    async fn stats(
        &self,
    ) -> Result<invoice_gate_domain::services::temp_store::TempStoreStats, PipelineError> {
        self.inner.stats().await
    }

    async fn close(&self) -> Result<(), PipelineError> {
        self.inner.close().await
    }
}

/// Registers the real fingerprint and policy-gate filters plus the given
/// stubs; the stubs cover the remaining default-plan ids.
pub fn scenario_registry(stubs: Vec<StubFilter>) -> Result<FilterRegistry, PipelineError> {
    let registry = FilterRegistry::new();
    for stub in stubs {
        registry.register(Arc::new(stub), FilterConfig::new())?;
    }
    registry.register(Arc::new(FingerprintFilter::new()), FilterConfig::new())?;
    registry.register(Arc::new(PolicyGateFilter::new()), FilterConfig::new())?;
    Ok(registry)
}

/// Stubs for a clean happy-path run of the default plan.
pub fn happy_path_stubs() -> Vec<StubFilter> {
    vec![
        StubFilter::new("parser", StubBehavior::ParseInvoice),
        StubFilter::new("kosit", StubBehavior::Ok),
        StubFilter::new("vies", StubBehavior::Ok),
        StubFilter::new("ecb-rates", StubBehavior::Ok),
        StubFilter::new("peppol", StubBehavior::Ok),
        StubFilter::new("steps-amount-validation", StubBehavior::Ok),
        StubFilter::new("semantic-risk", StubBehavior::Score(0)),
    ]
}
