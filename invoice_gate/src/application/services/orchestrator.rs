// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Orchestrator
//!
//! Walks the execution plan and runs its steps under the engine's
//! execution discipline: enablement, conditions, ordering, bounded
//! parallelism, per-attempt timeouts, retry policies, sticky abort, and
//! guaranteed cleanup.
//!
//! ## Execution model
//!
//! A run is logically single-threaded for context mutation: the
//! orchestrator is the sole writer, filters receive `&ValidationContext`.
//! Parallel groups dispatch their enabled children in batches bounded by
//! `max_parallelism`; child results are appended in batch order after the
//! batch completes, so downstream siblings always observe the whole group.
//!
//! ## Failure discipline
//!
//! Filter panics are caught and become `errored` step results; a fail-fast
//! step that errors (or runs with error diagnostics) aborts the pipeline
//! unless `continue_on_failure` is set. Abort is sticky; only always-run
//! steps (fingerprint, policy gate) execute afterwards, with a short
//! residual budget if the whole-run timeout already fired. Whatever
//! happens, the tracked temp keys are swept by the cleanup enforcer before
//! the report is returned.
//!
//! ## Re-entrancy
//!
//! One orchestrator instance executes one run at a time; a second call
//! while a run is in flight fails fast with `AlreadyExecuting`. Callers
//! wanting parallel runs instantiate independent orchestrators sharing the
//! registry and stores.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde_json::json;
use tracing::{debug, warn};

use invoice_gate_bootstrap::shutdown::CancellationToken;
use invoice_gate_domain::entities::{
    CanonicalInvoice, Diagnostic, DiagnosticSeverity, ExecutionPlan, ExecutionStatus, PlanStep,
    StepError, StepResult, ValidationContext, ValidationOptions, ValidationReport,
};
use invoice_gate_domain::events::{
    CleanupCompleted, ObserverSet, RunCompleted, RunStarted, StepCompleted, StepStarted,
};
use invoice_gate_domain::services::cleanup_queue::CleanupQueue;
use invoice_gate_domain::services::temp_store::TempStore;
use invoice_gate_domain::value_objects::{FailurePolicy, RawInvoiceRef, RunId, TempKey};
use invoice_gate_domain::PipelineError;

use crate::infrastructure::config::ConfigService;
use crate::infrastructure::filters::FilterRegistry;
use crate::infrastructure::metrics::PIPELINE_METRICS;
use crate::infrastructure::runtime::retry::run_attempts;

use super::cleanup_enforcer::CleanupEnforcer;
use super::report_assembler::ReportAssembler;

/// Residual per-step budget for always-run steps after cancellation.
const RESIDUAL_BUDGET: Duration = Duration::from_millis(2_000);

/// Input to a validation run.
pub struct ValidationInput {
    /// Pre-minted run id; `None` mints a fresh one. Callers that write the
    /// raw invoice under `raw-invoice:{run_id}` pass the id they used.
    pub run_id: Option<RunId>,
    pub raw: RawInvoiceRef,
    /// Plan override; `None` runs the built-in default plan.
    pub plan: Option<ExecutionPlan>,
    pub options: ValidationOptions,
    pub correlation_id: Option<String>,
}

/// The validation pipeline engine.
pub struct PipelineOrchestrator {
    registry: Arc<FilterRegistry>,
    cleanup_enforcer: CleanupEnforcer,
    config_service: Arc<ConfigService>,
    observers: Arc<ObserverSet>,
    executing: AtomicBool,
}

/// Resets the one-in-flight flag even if the run unwinds.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl PipelineOrchestrator {
    pub fn new(
        registry: Arc<FilterRegistry>,
        temp_store: Arc<dyn TempStore>,
        cleanup_queue: Arc<dyn CleanupQueue>,
        config_service: Arc<ConfigService>,
        observers: Arc<ObserverSet>,
    ) -> Self {
        Self {
            registry,
            cleanup_enforcer: CleanupEnforcer::new(temp_store, cleanup_queue),
            config_service,
            observers,
            executing: AtomicBool::new(false),
        }
    }

    /// Executes one validation run and returns its report.
    ///
    /// # Errors
    ///
    /// Only orchestration-level failures surface here:
    /// `AlreadyExecuting` when a run is in flight on this instance, and
    /// `InvalidPlan` / serialization failures from plan snapshotting.
    /// Filter failures of any kind end up as step results on the report.
    pub async fn execute(
        &self,
        input: ValidationInput,
    ) -> Result<ValidationReport, PipelineError> {
        if self
            .executing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PipelineError::AlreadyExecuting(
                "this orchestrator instance is already executing a run".to_string(),
            ));
        }
        let _guard = InFlightGuard(&self.executing);
        self.execute_inner(input).await
    }

    async fn execute_inner(
        &self,
        input: ValidationInput,
    ) -> Result<ValidationReport, PipelineError> {
        let plan = match input.plan {
            Some(plan) => plan,
            None => ExecutionPlan::default_plan()?,
        };
        if plan.steps().is_empty() {
            return Err(PipelineError::invalid_plan("plan has no steps"));
        }

        let run_id = input.run_id.unwrap_or_default();
        let effective = self.config_service.effective(&input.options);
        let config_snapshot_hash = effective.snapshot_hash()?;
        let plan_snapshot =
            ReportAssembler::plan_snapshot(&plan, &self.registry, config_snapshot_hash)?;

        let mut ctx = ValidationContext::new(
            run_id.clone(),
            input.correlation_id,
            input.raw,
            plan,
            input.options,
        );
        // The parser writes under this key; track it up front so cleanup
        // covers runs where the parser never got to report it.
        ctx.track_temp_key(TempKey::for_run("parsed-invoice", &run_id));

        self.observers.run_started(&RunStarted {
            run_id: run_id.clone(),
            plan_id: ctx.plan().id().to_string(),
            correlation_id: ctx.correlation_id().map(|s| s.to_string()),
            started_at: *ctx.started_at(),
        });

        // Whole-run timeout cancels the run token; always-run steps still
        // execute afterwards with the residual budget.
        let token = CancellationToken::new();
        let watchdog = ctx.options().timeout_ms.map(|timeout_ms| {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(timeout_ms)).await;
                debug!("whole-run timeout fired");
                token.cancel();
            })
        });

        let steps = ctx.plan().steps().to_vec();
        let walk = std::panic::AssertUnwindSafe(self.run_steps(&steps, &mut ctx, &token))
            .catch_unwind()
            .await;
        if walk.is_err() {
            warn!(run_id = %run_id, "orchestrator walk panicked; report will be partial");
            ctx.abort("Pipeline execution panicked");
        }

        if let Some(handle) = watchdog {
            handle.abort();
        }

        // Guaranteed cleanup on every path before the report is built.
        let tracked = ctx.tracked_temp_keys().to_vec();
        let cleanup = self
            .cleanup_enforcer
            .cleanup(&tracked, ctx.correlation_id())
            .await;
        self.observers.cleanup_completed(&CleanupCompleted {
            run_id: run_id.clone(),
            deleted: cleanup.deleted,
            queued: cleanup.queued.len(),
            duration_ms: cleanup.duration_ms,
        });

        let report = ReportAssembler::assemble(&ctx, plan_snapshot, &cleanup);
        self.observers.run_completed(&RunCompleted {
            run_id,
            report_state: report.report_state,
            decision: report.final_decision.as_ref().map(|d| d.decision),
            duration_ms: report.timing.duration_ms,
        });

        Ok(report)
    }

    /// Walks steps in plan order, honoring abort, enablement, conditions,
    /// and grouping. Boxed for recursion into sequential groups.
    fn run_steps<'a>(
        &'a self,
        steps: &'a [PlanStep],
        ctx: &'a mut ValidationContext,
        token: &'a CancellationToken,
    ) -> BoxFuture<'a, ()> {
        async move {
            for step in steps {
                if token.is_cancelled() && !ctx.is_aborted() {
                    ctx.abort("Pipeline timed out");
                }

                if ctx.is_aborted() && step.failure_policy != FailurePolicy::AlwaysRun {
                    if step.enabled {
                        self.record_result(step, skipped_result(step, "pipeline_aborted"), ctx);
                        if step.is_group() {
                            // Children fall through the same abort rules, so
                            // always-run descendants still execute.
                            self.run_steps(&step.children, ctx, token).await;
                        }
                    }
                    continue;
                }

                if !step.enabled {
                    continue;
                }

                if let Some(condition) = &step.condition {
                    if !ctx.evaluate_condition(condition) {
                        self.record_result(
                            step,
                            skipped_result(step, "condition_not_met"),
                            ctx,
                        );
                        continue;
                    }
                }

                if step.is_group() {
                    if step.parallel {
                        self.run_parallel_group(step, ctx, token).await;
                    } else {
                        self.run_steps(&step.children, ctx, token).await;
                    }
                } else {
                    let result = self.execute_filter(step, ctx, token).await;
                    self.record_result(step, result, ctx);
                }
            }
        }
        .boxed()
    }

    /// Dispatches a parallel group's enabled children in batches bounded
    /// by `max_parallelism`. Each batch completes before the next starts;
    /// results are appended in batch order.
    async fn run_parallel_group(
        &self,
        group: &PlanStep,
        ctx: &mut ValidationContext,
        token: &CancellationToken,
    ) {
        let batch_size = ctx.plan().global_config().max_parallelism.max(1);
        let children: Vec<&PlanStep> = group.children.iter().filter(|c| c.enabled).collect();

        for batch in children.chunks(batch_size) {
            if ctx.is_aborted() {
                // The abort landed mid-group: remaining children are
                // skipped unless they are always-run.
                for child in batch {
                    if child.failure_policy == FailurePolicy::AlwaysRun {
                        let result = self.execute_filter(child, ctx, token).await;
                        self.record_result(child, result, ctx);
                    } else {
                        self.record_result(child, skipped_result(child, "pipeline_aborted"), ctx);
                    }
                }
                continue;
            }

            let ctx_view: &ValidationContext = &*ctx;
            let attempts = batch.iter().map(|child| async move {
                if let Some(condition) = &child.condition {
                    if !ctx_view.evaluate_condition(condition) {
                        return skipped_result(child, "condition_not_met");
                    }
                }
                self.execute_filter(child, ctx_view, token).await
            });
            let results = join_all(attempts).await;

            for (child, result) in batch.iter().zip(results) {
                self.record_result(child, result, ctx);
            }
        }
    }

    /// Resolves and invokes one filter through the timeout+retry harness.
    /// Never propagates: every failure mode becomes a step result.
    async fn execute_filter(
        &self,
        step: &PlanStep,
        ctx: &ValidationContext,
        token: &CancellationToken,
    ) -> StepResult {
        let started_at = Utc::now();

        let Some(registered) = self.registry.get(&step.filter_id) else {
            return StepResult::errored(
                step.filter_id.clone(),
                StepError::filter_not_found(&step.filter_id),
            )
            .stamp("unregistered", started_at, Utc::now());
        };

        // Registered defaults under the step config; the step wins.
        let mut config = registered.default_config.clone();
        for (key, value) in &step.config {
            config.insert(key.clone(), value.clone());
        }

        let attempt_timeout = Duration::from_millis(
            step.timeout_ms
                .unwrap_or(ctx.plan().global_config().default_filter_timeout_ms),
        );

        // Always-run steps after cancellation get a fresh token and a
        // short residual budget instead of dying instantly.
        let (step_token, attempt_timeout) =
            if token.is_cancelled() && step.failure_policy == FailurePolicy::AlwaysRun {
                (CancellationToken::new(), attempt_timeout.min(RESIDUAL_BUDGET))
            } else {
                (token.clone(), attempt_timeout)
            };

        self.observers.step_started(&StepStarted {
            run_id: ctx.run_id().clone(),
            filter_id: step.filter_id.clone(),
            attempt: 1,
            started_at,
        });

        let filter = registered.filter.clone();
        let version = filter.version().to_string();
        let outcome = run_attempts(step.retry.as_ref(), attempt_timeout, &step_token, |_n| {
            let filter = filter.clone();
            let config = config.clone();
            async move {
                match std::panic::AssertUnwindSafe(filter.execute(ctx, &config))
                    .catch_unwind()
                    .await
                {
                    Ok(result) => result,
                    Err(panic) => Err(StepError::panic(panic_message(panic.as_ref()))),
                }
            }
            .boxed()
        })
        .await;

        if outcome.attempts > 1 {
            PIPELINE_METRICS
                .retry_attempts_total
                .inc_by((outcome.attempts - 1) as u64);
        }

        let mut result = match outcome.result {
            Ok(result) => result,
            Err(error) => StepResult::errored(step.filter_id.clone(), error),
        };
        if outcome.attempts > 1 {
            result = result.with_metadata_value("attempts", json!(outcome.attempts));
        }
        result.stamp(version, started_at, Utc::now())
    }

    /// Applies the failure policy, adopts parser output, tracks registered
    /// temp keys, fires hooks, records the result, and decides on abort.
    fn record_result(&self, step: &PlanStep, mut result: StepResult, ctx: &mut ValidationContext) {
        if step.failure_policy == FailurePolicy::BestEffort {
            result.demote_diagnostics(DiagnosticSeverity::Warning);
        }

        // A soft-failed step that never completed still has to be visible
        // to the decision layer as degradation.
        if result.execution == ExecutionStatus::Errored
            && matches!(
                step.failure_policy,
                FailurePolicy::SoftFail | FailurePolicy::BestEffort
            )
        {
            result.diagnostics.push(Diagnostic::warning(
                "STEP-UNAVAILABLE",
                "external",
                step.filter_id.clone(),
                "Step did not complete; continuing under a non-blocking failure policy",
            ));
            if result
                .error
                .as_ref()
                .map(|e| e.name == "SERVICE_UNAVAILABLE")
                .unwrap_or(false)
            {
                result
                    .metadata
                    .insert("verifierUnavailable".to_string(), json!(true));
            }
        }

        // Parser adoption: the canonical invoice travels through step
        // metadata into the context. The payload is removed from the
        // recorded result so the raw invoice model never reaches the
        // report; only the masked summary survives a run.
        if result.execution == ExecutionStatus::Ran
            && (result.filter_id == "parser" || result.filter_id == "steps-parser")
        {
            if let Some(value) = result.metadata.remove("parsedInvoice") {
                match serde_json::from_value::<CanonicalInvoice>(value) {
                    Ok(invoice) => ctx.set_parsed_invoice(invoice),
                    Err(e) => warn!(error = %e, "parser metadata did not deserialize"),
                }
            }
        }

        // Filter-registered temp keys join the guaranteed-cleanup set.
        if let Some(keys) = result.metadata.get("tempKeys").and_then(|v| v.as_array()) {
            for key in keys.iter().filter_map(|v| v.as_str()) {
                ctx.track_temp_key(TempKey::from_raw(key));
            }
        }

        self.observers.step_completed(&StepCompleted {
            run_id: ctx.run_id().clone(),
            filter_id: result.filter_id.clone(),
            execution: result.execution,
            duration_ms: result.duration_ms,
            error_diagnostics: result.diagnostics.iter().filter(|d| d.is_error()).count(),
        });

        let errored = result.execution == ExecutionStatus::Errored;
        let ran_with_errors =
            result.execution == ExecutionStatus::Ran && result.has_error_diagnostics();
        let filter_id = result.filter_id.clone();

        ctx.add_step_result(result);

        if step.failure_policy == FailurePolicy::FailFast
            && !step.continue_on_failure
            && (errored || ran_with_errors)
        {
            ctx.abort(format!("Filter '{}' failed", filter_id));
        }
    }
}

fn skipped_result(step: &PlanStep, reason: &str) -> StepResult {
    let now = Utc::now();
    StepResult::skipped(step.filter_id.clone())
        .with_metadata_value("skipReason", json!(reason))
        .stamp("", now, now)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "filter panicked".to_string()
    }
}
