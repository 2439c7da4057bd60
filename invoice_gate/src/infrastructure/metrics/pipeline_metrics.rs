// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Metrics
//!
//! Process-wide Prometheus metrics for run and step outcomes.
//!
//! The metrics live behind a `LazyLock` so every component records into
//! the same registry without wiring; scraping is exposed through
//! `gather()` for whatever endpoint the deployment runs.

use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use std::sync::LazyLock;

/// Process-wide metrics handle.
pub static PIPELINE_METRICS: LazyLock<PipelineMetrics> = LazyLock::new(PipelineMetrics::new);

/// Prometheus metrics for the validation pipeline.
pub struct PipelineMetrics {
    registry: Registry,
    pub runs_started_total: IntCounter,
    /// Completed runs by report state (`complete`, `incomplete`, `errored`).
    pub runs_completed_total: IntCounterVec,
    /// Step results by execution status (`ran`, `skipped`, `errored`).
    pub steps_completed_total: IntCounterVec,
    pub retry_attempts_total: IntCounter,
    pub cleanup_queued_total: IntCounter,
    pub runs_in_flight: IntGauge,
    pub run_duration_seconds: Histogram,
}

impl PipelineMetrics {
    fn new() -> Self {
        // Metric names and label sets are compile-time constants; failure
        // here is a programming error, not a runtime condition.
        let runs_started_total = IntCounter::new(
            "invoice_gate_runs_started_total",
            "Validation runs started",
        )
        .expect("valid metric definition");
        let runs_completed_total = IntCounterVec::new(
            Opts::new(
                "invoice_gate_runs_completed_total",
                "Validation runs completed, by report state",
            ),
            &["state"],
        )
        .expect("valid metric definition");
        let steps_completed_total = IntCounterVec::new(
            Opts::new(
                "invoice_gate_steps_completed_total",
                "Step results recorded, by execution status",
            ),
            &["execution"],
        )
        .expect("valid metric definition");
        let retry_attempts_total = IntCounter::new(
            "invoice_gate_retry_attempts_total",
            "Retry attempts beyond the first try",
        )
        .expect("valid metric definition");
        let cleanup_queued_total = IntCounter::new(
            "invoice_gate_cleanup_queued_total",
            "Failed secure deletes handed to the cleanup queue",
        )
        .expect("valid metric definition");
        let runs_in_flight = IntGauge::new(
            "invoice_gate_runs_in_flight",
            "Validation runs currently executing",
        )
        .expect("valid metric definition");
        let run_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "invoice_gate_run_duration_seconds",
                "Wall-clock duration of completed runs",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        )
        .expect("valid metric definition");

        let registry = Registry::new();
        for collector in [
            Box::new(runs_started_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(runs_completed_total.clone()),
            Box::new(steps_completed_total.clone()),
            Box::new(retry_attempts_total.clone()),
            Box::new(cleanup_queued_total.clone()),
            Box::new(runs_in_flight.clone()),
            Box::new(run_duration_seconds.clone()),
        ] {
            registry
                .register(collector)
                .expect("metric registers once into a fresh registry");
        }

        Self {
            registry,
            runs_started_total,
            runs_completed_total,
            steps_completed_total,
            retry_attempts_total,
            cleanup_queued_total,
            runs_in_flight,
            run_duration_seconds,
        }
    }

    /// Gathers the current metric families for scraping.
    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }
}
