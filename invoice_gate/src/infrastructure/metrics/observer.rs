// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Observers
//!
//! Event-hook implementations: one feeding the Prometheus metrics, one
//! mirroring run progress into the tracing log at debug level.
//!
//! Both are registered into the orchestrator's `ObserverSet` by the
//! composition root; neither performs blocking work in the hook path.

use tracing::debug;

use invoice_gate_domain::entities::ExecutionStatus;
use invoice_gate_domain::events::{
    CleanupCompleted, PipelineObserver, RunCompleted, RunStarted, StepCompleted, StepStarted,
};

use super::pipeline_metrics::PIPELINE_METRICS;

/// Feeds run and step events into the Prometheus metrics.
#[derive(Default)]
pub struct MetricsObserver;

impl MetricsObserver {
    pub fn new() -> Self {
        Self
    }
}

impl PipelineObserver for MetricsObserver {
    fn on_run_started(&self, _event: &RunStarted) {
        PIPELINE_METRICS.runs_started_total.inc();
        PIPELINE_METRICS.runs_in_flight.inc();
    }

    fn on_step_completed(&self, event: &StepCompleted) {
        let label = match event.execution {
            ExecutionStatus::Ran => "ran",
            ExecutionStatus::Skipped => "skipped",
            ExecutionStatus::Errored => "errored",
        };
        PIPELINE_METRICS
            .steps_completed_total
            .with_label_values(&[label])
            .inc();
    }

    fn on_run_completed(&self, event: &RunCompleted) {
        let state = match event.report_state {
            invoice_gate_domain::entities::ReportState::Complete => "complete",
            invoice_gate_domain::entities::ReportState::Incomplete => "incomplete",
            invoice_gate_domain::entities::ReportState::Errored => "errored",
        };
        PIPELINE_METRICS
            .runs_completed_total
            .with_label_values(&[state])
            .inc();
        PIPELINE_METRICS.runs_in_flight.dec();
        PIPELINE_METRICS
            .run_duration_seconds
            .observe(event.duration_ms as f64 / 1000.0);
    }

    fn on_cleanup_completed(&self, event: &CleanupCompleted) {
        if event.queued > 0 {
            PIPELINE_METRICS
                .cleanup_queued_total
                .inc_by(event.queued as u64);
        }
    }
}

/// Mirrors run progress into the tracing log.
#[derive(Default)]
pub struct LoggingObserver;

impl LoggingObserver {
    pub fn new() -> Self {
        Self
    }
}

impl PipelineObserver for LoggingObserver {
    fn on_run_started(&self, event: &RunStarted) {
        debug!(run_id = %event.run_id, plan_id = %event.plan_id, "run started");
    }

    fn on_step_started(&self, event: &StepStarted) {
        debug!(run_id = %event.run_id, filter_id = %event.filter_id, attempt = event.attempt, "step started");
    }

    fn on_step_completed(&self, event: &StepCompleted) {
        debug!(
            run_id = %event.run_id,
            filter_id = %event.filter_id,
            execution = ?event.execution,
            duration_ms = event.duration_ms,
            "step completed"
        );
    }

    fn on_run_completed(&self, event: &RunCompleted) {
        debug!(
            run_id = %event.run_id,
            state = ?event.report_state,
            decision = ?event.decision,
            duration_ms = event.duration_ms,
            "run completed"
        );
    }

    fn on_cleanup_completed(&self, event: &CleanupCompleted) {
        debug!(
            run_id = %event.run_id,
            deleted = event.deleted,
            queued = event.queued,
            "cleanup completed"
        );
    }
}
