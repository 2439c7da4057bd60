// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Validation Context
//!
//! Per-run execution state.
//!
//! ## Ownership and mutation discipline
//!
//! The orchestrator exclusively owns the context for the lifetime of a run
//! and is its sole writer. Filters receive `&ValidationContext`, which in
//! Rust *is* the read-only view: the borrow checker enforces at compile
//! time what other implementations of this engine enforce by convention.
//! Parallel groups hold the shared borrow while their children execute and
//! results are appended in batch order after the group completes.
//!
//! The context owns its step results and diagnostics in append-only
//! vectors; the report takes copies at completion and the context is
//! dropped in one move together with all transient state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::services::filter::FilterConfig;
use crate::value_objects::{RawInvoiceRef, RunId, TempKey};

use super::canonical_invoice::CanonicalInvoice;
use super::diagnostic::Diagnostic;
use super::execution_plan::{ExecutionPlan, StepCondition};
use super::step_result::{ExecutionStatus, StepResult};

/// Caller-supplied per-run options.
///
/// Only locale, timeout, and free-form metadata may be overridden per
/// request; everything else comes from the layered system configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Mutable per-run state, owned by the orchestrator.
#[derive(Debug, Clone)]
pub struct ValidationContext {
    // Immutable identity
    run_id: RunId,
    correlation_id: Option<String>,
    started_at: DateTime<Utc>,
    raw_invoice: RawInvoiceRef,
    plan: ExecutionPlan,
    options: ValidationOptions,

    // Mutable run state
    parsed_invoice: Option<CanonicalInvoice>,
    completed_steps: Vec<StepResult>,
    diagnostics: Vec<Diagnostic>,
    aborted: bool,
    abort_reason: Option<String>,
    tracked_temp_keys: Vec<TempKey>,
}

impl ValidationContext {
    pub fn new(
        run_id: RunId,
        correlation_id: Option<String>,
        raw_invoice: RawInvoiceRef,
        plan: ExecutionPlan,
        options: ValidationOptions,
    ) -> Self {
        let raw_key = raw_invoice.temp_key.clone();
        Self {
            run_id,
            correlation_id,
            started_at: Utc::now(),
            raw_invoice,
            plan,
            options,
            parsed_invoice: None,
            completed_steps: Vec::new(),
            diagnostics: Vec::new(),
            aborted: false,
            abort_reason: None,
            tracked_temp_keys: vec![raw_key],
        }
    }

    // ------------------------------------------------------------------
    // Immutable accessors
    // ------------------------------------------------------------------

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn started_at(&self) -> &DateTime<Utc> {
        &self.started_at
    }

    pub fn raw_invoice(&self) -> &RawInvoiceRef {
        &self.raw_invoice
    }

    pub fn plan(&self) -> &ExecutionPlan {
        &self.plan
    }

    pub fn options(&self) -> &ValidationOptions {
        &self.options
    }

    pub fn parsed_invoice(&self) -> Option<&CanonicalInvoice> {
        self.parsed_invoice.as_ref()
    }

    pub fn completed_steps(&self) -> &[StepResult] {
        &self.completed_steps
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn abort_reason(&self) -> Option<&str> {
        self.abort_reason.as_deref()
    }

    pub fn tracked_temp_keys(&self) -> &[TempKey] {
        &self.tracked_temp_keys
    }

    /// The result of a completed step, by filter id.
    pub fn step_result(&self, filter_id: &str) -> Option<&StepResult> {
        self.completed_steps.iter().find(|r| r.filter_id == filter_id)
    }

    /// True when a result has been recorded for the filter id.
    pub fn has_executed(&self, filter_id: &str) -> bool {
        self.step_result(filter_id).is_some()
    }

    /// The plan-level config of the step with the given id, if any.
    pub fn filter_config(&self, filter_id: &str) -> Option<&FilterConfig> {
        self.plan
            .iter_steps()
            .find(|s| s.filter_id == filter_id)
            .map(|s| &s.config)
    }

    /// Evaluates a step condition against the current run state.
    pub fn evaluate_condition(&self, condition: &StepCondition) -> bool {
        match condition {
            StepCondition::FilterPassed { filter_id } => self
                .step_result(filter_id.as_str())
                .map(|r| r.execution == ExecutionStatus::Ran && !r.has_error_diagnostics())
                .unwrap_or(false),
            StepCondition::FilterFailed { filter_id } => self
                .step_result(filter_id.as_str())
                .map(|r| r.execution == ExecutionStatus::Ran && r.has_error_diagnostics())
                .unwrap_or(false),
            StepCondition::FieldExists { path } => self
                .parsed_invoice
                .as_ref()
                .map(|invoice| invoice.field_exists(path))
                .unwrap_or(false),
        }
    }

    // ------------------------------------------------------------------
    // Mutations (orchestrator only)
    // ------------------------------------------------------------------

    /// Attaches the parsed invoice after the parser step completes.
    pub fn set_parsed_invoice(&mut self, invoice: CanonicalInvoice) {
        self.parsed_invoice = Some(invoice);
    }

    /// Records a step result and folds its diagnostics into the run stream.
    ///
    /// Diagnostic order mirrors step-completion order.
    pub fn add_step_result(&mut self, result: StepResult) {
        self.diagnostics.extend(result.diagnostics.iter().cloned());
        self.completed_steps.push(result);
    }

    /// Appends run-level diagnostics not tied to a step result.
    pub fn add_diagnostics(&mut self, diagnostics: Vec<Diagnostic>) {
        self.diagnostics.extend(diagnostics);
    }

    /// Aborts the run. Abort is sticky: the first reason wins.
    pub fn abort(&mut self, reason: impl Into<String>) {
        if !self.aborted {
            self.aborted = true;
            self.abort_reason = Some(reason.into());
        }
    }

    /// Registers a temp-store key for guaranteed cleanup at run end.
    pub fn track_temp_key(&mut self, key: TempKey) {
        if !self.tracked_temp_keys.contains(&key) {
            self.tracked_temp_keys.push(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::{ContentType, FilterId};

    fn context() -> ValidationContext {
        let run_id = RunId::new();
        let raw = RawInvoiceRef {
            temp_key: TempKey::for_run("raw-invoice", &run_id),
            content_type: ContentType::Json,
            format_hint: None,
            size_bytes: 64,
        };
        ValidationContext::new(
            run_id,
            Some("corr-1".to_string()),
            raw,
            ExecutionPlan::default_plan().unwrap(),
            ValidationOptions::default(),
        )
    }

    fn id(s: &str) -> FilterId {
        FilterId::new(s).unwrap()
    }

    #[test]
    fn test_raw_invoice_key_is_tracked_from_start() {
        let ctx = context();
        assert_eq!(ctx.tracked_temp_keys().len(), 1);
        assert!(ctx.tracked_temp_keys()[0].as_str().starts_with("raw-invoice:"));
    }

    #[test]
    fn test_abort_is_sticky() {
        let mut ctx = context();
        ctx.abort("first failure");
        ctx.abort("second failure");
        assert!(ctx.is_aborted());
        assert_eq!(ctx.abort_reason(), Some("first failure"));
    }

    #[test]
    fn test_step_results_fold_diagnostics_in_completion_order() {
        let mut ctx = context();
        ctx.add_step_result(StepResult::ran(id("parser")));
        ctx.add_step_result(StepResult::ran(id("kosit")).with_diagnostics(vec![
            Diagnostic::error("BR-DE-01", "business-rule", id("kosit"), "missing"),
        ]));

        assert!(ctx.has_executed("parser"));
        assert!(ctx.has_executed("kosit"));
        assert_eq!(ctx.diagnostics().len(), 1);
        assert_eq!(ctx.diagnostics()[0].code, "BR-DE-01");
    }

    #[test]
    fn test_condition_evaluation() {
        let mut ctx = context();
        assert!(!ctx.evaluate_condition(&StepCondition::FilterPassed { filter_id: id("parser") }));

        ctx.add_step_result(StepResult::ran(id("parser")));
        assert!(ctx.evaluate_condition(&StepCondition::FilterPassed { filter_id: id("parser") }));
        assert!(!ctx.evaluate_condition(&StepCondition::FilterFailed { filter_id: id("parser") }));

        ctx.add_step_result(StepResult::ran(id("kosit")).with_diagnostics(vec![
            Diagnostic::error("X", "schema", id("kosit"), "bad"),
        ]));
        assert!(ctx.evaluate_condition(&StepCondition::FilterFailed { filter_id: id("kosit") }));
    }

    #[test]
    fn test_field_exists_condition_requires_parsed_invoice() {
        let mut ctx = context();
        let condition = StepCondition::FieldExists {
            path: "header.currency".to_string(),
        };
        assert!(!ctx.evaluate_condition(&condition));

        ctx.set_parsed_invoice(CanonicalInvoice::sample_for_tests());
        assert!(ctx.evaluate_condition(&condition));
    }

    #[test]
    fn test_tracked_keys_deduplicate() {
        let mut ctx = context();
        let key = TempKey::from_raw("kosit-scratch:abc");
        ctx.track_temp_key(key.clone());
        ctx.track_temp_key(key);
        assert_eq!(ctx.tracked_temp_keys().len(), 2);
    }

    #[test]
    fn test_filter_config_lookup() {
        let ctx = context();
        assert!(ctx.filter_config("parser").is_some());
        assert!(ctx.filter_config("unknown").is_none());
    }
}
