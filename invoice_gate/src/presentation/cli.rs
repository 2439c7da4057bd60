// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Worker CLI
//!
//! Command implementations for the `invoice_gate` binary and the
//! composition root that wires the engine together: registry with the
//! built-in filters (canonical ids plus the `steps-` aliases), in-memory
//! temp store, cleanup queue, configuration service, and observers.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use invoice_gate_bootstrap::shutdown::ShutdownCoordinator;
use invoice_gate_domain::entities::ExecutionPlan;
use invoice_gate_domain::events::ObserverSet;
use invoice_gate_domain::services::cleanup_queue::CleanupQueue;
use invoice_gate_domain::services::filter::FilterConfig;
use invoice_gate_domain::services::temp_store::TempStore;
use invoice_gate_domain::value_objects::{ContentType, FilterId, RawInvoice};

use crate::application::services::PipelineOrchestrator;
use crate::application::use_cases::{ExecuteValidation, ProcessJob};
use crate::infrastructure::config::ConfigService;
use crate::infrastructure::filters::{
    AmountValidationFilter, EcbRatesFilter, FilterRegistry, FingerprintFilter, KositFilter,
    ParserFilter, PeppolFilter, PolicyGateFilter, SemanticRiskFilter, ViesFilter,
};
use crate::infrastructure::metrics::{LoggingObserver, MetricsObserver};
use crate::infrastructure::repositories::SqliteJobRepository;
use crate::infrastructure::stores::{MemoryCleanupQueue, MemoryTempStore};

/// The wired engine shared by the CLI commands.
pub struct Engine {
    pub registry: Arc<FilterRegistry>,
    pub temp_store: Arc<dyn TempStore>,
    pub cleanup_queue: Arc<dyn CleanupQueue>,
    pub config_service: Arc<ConfigService>,
    pub observers: Arc<ObserverSet>,
}

impl Engine {
    /// Composition root: builds the shared components and registers the
    /// built-in filters.
    pub fn build(config_path: Option<&Path>) -> anyhow::Result<Self> {
        let temp_store: Arc<dyn TempStore> = Arc::new(MemoryTempStore::new());
        let cleanup_queue: Arc<dyn CleanupQueue> = Arc::new(MemoryCleanupQueue::new());
        let config_service = Arc::new(
            ConfigService::load(config_path).context("loading configuration")?,
        );

        let registry = Arc::new(FilterRegistry::new());
        register_builtin_filters(&registry, temp_store.clone())
            .context("registering built-in filters")?;

        let mut observers = ObserverSet::new();
        observers.register(Arc::new(MetricsObserver::new()));
        observers.register(Arc::new(LoggingObserver::new()));

        Ok(Self {
            registry,
            temp_store,
            cleanup_queue,
            config_service,
            observers: Arc::new(observers),
        })
    }

    /// A fresh orchestrator over the shared components. One orchestrator
    /// executes one run at a time; the worker builds one per slot.
    pub fn orchestrator(&self) -> Arc<PipelineOrchestrator> {
        Arc::new(PipelineOrchestrator::new(
            self.registry.clone(),
            self.temp_store.clone(),
            self.cleanup_queue.clone(),
            self.config_service.clone(),
            self.observers.clone(),
        ))
    }
}

/// Registers the built-in filters under their canonical ids and the
/// `steps-` aliases the plans may reference.
pub fn register_builtin_filters(
    registry: &FilterRegistry,
    temp_store: Arc<dyn TempStore>,
) -> anyhow::Result<()> {
    registry.register(Arc::new(ParserFilter::new(temp_store.clone())), FilterConfig::new())?;
    registry.register(
        Arc::new(ParserFilter::with_id(
            temp_store.clone(),
            FilterId::new("steps-parser")?,
        )),
        FilterConfig::new(),
    )?;
    registry.register(Arc::new(KositFilter::new(temp_store)), FilterConfig::new())?;
    registry.register(Arc::new(ViesFilter::new()), FilterConfig::new())?;
    registry.register(Arc::new(EcbRatesFilter::new()), FilterConfig::new())?;
    registry.register(Arc::new(PeppolFilter::new()), FilterConfig::new())?;
    registry.register(Arc::new(AmountValidationFilter::new()), FilterConfig::new())?;
    registry.register(Arc::new(SemanticRiskFilter::new()), FilterConfig::new())?;
    registry.register(Arc::new(FingerprintFilter::new()), FilterConfig::new())?;
    registry.register(Arc::new(PolicyGateFilter::new()), FilterConfig::new())?;
    registry.register(
        Arc::new(PolicyGateFilter::with_id(FilterId::new("steps-policy-gate")?)),
        FilterConfig::new(),
    )?;
    Ok(())
}

/// `validate` command: run one invoice file through the default plan and
/// print the report as JSON.
pub async fn run_validate(
    engine: &Engine,
    input: &Path,
    content_type: &str,
    timeout_ms: Option<u64>,
) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(input)
        .await
        .with_context(|| format!("reading {}", input.display()))?;

    let content_type = match content_type {
        "xml" => ContentType::Xml,
        "pdf" => ContentType::Pdf,
        _ => ContentType::Json,
    };

    let use_case = ExecuteValidation::new(engine.temp_store.clone(), engine.orchestrator());
    let report = use_case
        .execute(
            RawInvoice::new(bytes, content_type),
            None,
            invoice_gate_domain::entities::ValidationOptions {
                timeout_ms,
                ..Default::default()
            },
            None,
        )
        .await
        .context("executing validation")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// `worker` command: claim queued jobs until shutdown.
pub async fn run_worker(
    engine: &Engine,
    database_url: &str,
    poll_interval_ms: u64,
    concurrency: usize,
    coordinator: ShutdownCoordinator,
) -> anyhow::Result<()> {
    let repository = Arc::new(
        SqliteJobRepository::connect(database_url)
            .await
            .context("opening job repository")?,
    );
    info!(database_url, concurrency, "worker starting");

    let mut handles = Vec::with_capacity(concurrency);
    for slot in 0..concurrency {
        let processor = ProcessJob::new(repository.clone(), engine.orchestrator());
        let token = coordinator.token();
        let temp_store = engine.temp_store.clone();
        let cleanup_queue = engine.cleanup_queue.clone();
        let poll_interval = Duration::from_millis(poll_interval_ms);

        handles.push(tokio::spawn(async move {
            info!(slot, "worker slot running");
            while !token.is_cancelled() {
                match processor.process_next().await {
                    Ok(Some(processed)) => {
                        info!(slot, job_id = %processed.job_id, status = processed.status.as_str(), "job finished");
                    }
                    Ok(None) => {
                        // Idle slot: sweep expired entries and retry any
                        // queued deletes before sleeping.
                        if let Err(e) = temp_store.cleanup().await {
                            warn!(slot, error = %e, "temp store sweep failed");
                        }
                        if let Err(e) = cleanup_queue.process(temp_store.as_ref()).await {
                            warn!(slot, error = %e, "cleanup queue pass failed");
                        }
                        tokio::select! {
                            _ = token.cancelled() => break,
                            _ = tokio::time::sleep(poll_interval) => {}
                        }
                    }
                    Err(e) => {
                        warn!(slot, error = %e, "job processing error");
                        tokio::select! {
                            _ = token.cancelled() => break,
                            _ = tokio::time::sleep(poll_interval) => {}
                        }
                    }
                }
            }
            info!(slot, "worker slot stopped");
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }

    engine.temp_store.close().await.ok();
    engine.registry.shutdown();
    coordinator.complete_shutdown();
    Ok(())
}

/// `show-plan` command: print the default plan with its hashes.
pub fn show_plan() -> anyhow::Result<()> {
    let plan = ExecutionPlan::default_plan().map_err(|e| anyhow::anyhow!(e.to_string()))?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}
