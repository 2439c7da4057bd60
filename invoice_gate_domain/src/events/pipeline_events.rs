// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Events and Observers
//!
//! Fan-out observer interface for run lifecycle events.
//!
//! Observers receive notifications for run start, step start, step
//! completion, run completion, and cleanup completion. The event payloads
//! carry identifiers, statuses, and timing only; the full step results live
//! on the report. Observer failures are contained: a panicking observer is
//! logged by the caller and never disturbs the run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::policy_decision::PolicyDecision;
use crate::entities::step_result::ExecutionStatus;
use crate::entities::validation_report::ReportState;
use crate::value_objects::{FilterId, RunId};

/// A run began executing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStarted {
    pub run_id: RunId,
    pub plan_id: String,
    pub correlation_id: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// A step is about to execute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepStarted {
    pub run_id: RunId,
    pub filter_id: FilterId,
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
}

/// A step result was recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepCompleted {
    pub run_id: RunId,
    pub filter_id: FilterId,
    pub execution: ExecutionStatus,
    pub duration_ms: u64,
    pub error_diagnostics: usize,
}

/// A run finished and its report exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunCompleted {
    pub run_id: RunId,
    pub report_state: ReportState,
    pub decision: Option<PolicyDecision>,
    pub duration_ms: u64,
}

/// The cleanup enforcer finished for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupCompleted {
    pub run_id: RunId,
    pub deleted: usize,
    pub queued: usize,
    pub duration_ms: u64,
}

/// Observer of run lifecycle events.
///
/// Implementations must be cheap and non-blocking; heavy work belongs in a
/// channel consumer behind the observer.
pub trait PipelineObserver: Send + Sync {
    fn on_run_started(&self, event: &RunStarted) {
        let _ = event;
    }

    fn on_step_started(&self, event: &StepStarted) {
        let _ = event;
    }

    fn on_step_completed(&self, event: &StepCompleted) {
        let _ = event;
    }

    fn on_run_completed(&self, event: &RunCompleted) {
        let _ = event;
    }

    fn on_cleanup_completed(&self, event: &CleanupCompleted) {
        let _ = event;
    }
}

/// Fan-out set of observers.
///
/// Panics inside an observer are caught so a misbehaving hook can never
/// take down a run; the pipeline has already committed to producing a
/// report by the time hooks fire.
#[derive(Default)]
pub struct ObserverSet {
    observers: Vec<std::sync::Arc<dyn PipelineObserver>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, observer: std::sync::Arc<dyn PipelineObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn run_started(&self, event: &RunStarted) {
        self.each(|o| o.on_run_started(event));
    }

    pub fn step_started(&self, event: &StepStarted) {
        self.each(|o| o.on_step_started(event));
    }

    pub fn step_completed(&self, event: &StepCompleted) {
        self.each(|o| o.on_step_completed(event));
    }

    pub fn run_completed(&self, event: &RunCompleted) {
        self.each(|o| o.on_run_completed(event));
    }

    pub fn cleanup_completed(&self, event: &CleanupCompleted) {
        self.each(|o| o.on_cleanup_completed(event));
    }

    fn each(&self, f: impl Fn(&dyn PipelineObserver)) {
        for observer in &self.observers {
            let guarded = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                f(observer.as_ref())
            }));
            // Observer panics are swallowed; the caller's tracing layer
            // records them via the panic hook.
            drop(guarded);
        }
    }
}
