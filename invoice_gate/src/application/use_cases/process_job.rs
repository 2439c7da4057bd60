// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Process Job Use Case
//!
//! The worker loop body: claim one queued job, run it through the
//! pipeline, and persist the terminal outcome idempotently.
//!
//! Transient run failures requeue the job (`processing -> pending`) until
//! its retry budget is exhausted, after which it is failed terminally.
//! The persisted summary carries the decision, counts, and fingerprint id
//! only; the report's own fields are already masked and sanitized, and no
//! raw invoice data can reach a row by construction.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use invoice_gate_domain::entities::{
    PolicyDecision, ReportState, ValidationOptions, ValidationReport,
};
use invoice_gate_domain::repositories::job_repository::{
    JobRepository, JobResult, JobStatus, ValidationJob,
};
use invoice_gate_domain::value_objects::{ContentType, FormatHint, RawInvoiceRef, TempKey};
use invoice_gate_domain::PipelineError;

use crate::application::services::{PipelineOrchestrator, ValidationInput};

/// Outcome of one processed job.
#[derive(Debug, Clone)]
pub struct ProcessedJob {
    pub job_id: String,
    pub status: JobStatus,
    pub fingerprint_id: Option<String>,
}

/// Claims and processes queued validation jobs.
pub struct ProcessJob {
    repository: Arc<dyn JobRepository>,
    orchestrator: Arc<PipelineOrchestrator>,
}

impl ProcessJob {
    pub fn new(
        repository: Arc<dyn JobRepository>,
        orchestrator: Arc<PipelineOrchestrator>,
    ) -> Self {
        Self {
            repository,
            orchestrator,
        }
    }

    /// Claims the next pending job, if any, and processes it to a terminal
    /// or requeued state. Returns `None` when the queue is empty.
    pub async fn process_next(&self) -> Result<Option<ProcessedJob>, PipelineError> {
        let Some(job) = self.repository.claim_job().await? else {
            return Ok(None);
        };
        info!(job_id = %job.id, "job claimed");

        match self.run(&job).await {
            Ok(report) => {
                let status = Self::status_for(&report);
                let fingerprint_id = report.fingerprint.as_ref().map(|f| f.id.clone());
                let summary = Self::summary_for(&report);

                let stored = self
                    .repository
                    .store_job_result(
                        &job.id,
                        JobResult {
                            status,
                            fingerprint_id: fingerprint_id.clone(),
                            report_summary: Some(summary),
                            error_summary: None,
                        },
                    )
                    .await?;
                if stored.is_none() {
                    // Another worker finished this job first; ours is a
                    // duplicate delivery and the write was a no-op.
                    warn!(job_id = %job.id, "terminal write was a no-op");
                }

                Ok(Some(ProcessedJob {
                    job_id: job.id,
                    status,
                    fingerprint_id,
                }))
            }
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "run failed");
                if job.retry_count + 1 < job.max_retries {
                    self.repository.increment_retry(&job.id).await?;
                    self.repository
                        .update_job_status(&job.id, JobStatus::Pending)
                        .await?;
                    Ok(Some(ProcessedJob {
                        job_id: job.id,
                        status: JobStatus::Pending,
                        fingerprint_id: None,
                    }))
                } else {
                    self.repository
                        .store_job_result(
                            &job.id,
                            JobResult {
                                status: JobStatus::Failed,
                                fingerprint_id: None,
                                report_summary: None,
                                error_summary: Some(format!(
                                    "run failed in category '{}'",
                                    e.category()
                                )),
                            },
                        )
                        .await?;
                    Ok(Some(ProcessedJob {
                        job_id: job.id,
                        status: JobStatus::Failed,
                        fingerprint_id: None,
                    }))
                }
            }
        }
    }

    async fn run(&self, job: &ValidationJob) -> Result<ValidationReport, PipelineError> {
        let content_key = job.invoice_content_key.as_deref().ok_or_else(|| {
            PipelineError::validation_error("job has no invoice content key")
        })?;

        let content_type = match job.format.as_deref() {
            Some("xml") => ContentType::Xml,
            Some("pdf") => ContentType::Pdf,
            _ => ContentType::Json,
        };
        let format_hint = job
            .options
            .get("formatHint")
            .and_then(|v| v.as_str())
            .and_then(parse_format_hint);

        let options: ValidationOptions = serde_json::from_value(job.options.clone())
            .unwrap_or_default();

        self.orchestrator
            .execute(ValidationInput {
                run_id: None,
                raw: RawInvoiceRef {
                    temp_key: TempKey::from_raw(content_key),
                    content_type,
                    format_hint,
                    size_bytes: 0,
                },
                plan: None,
                options,
                correlation_id: job.correlation_id.clone(),
            })
            .await
    }

    /// Maps the report to the terminal job status.
    fn status_for(report: &ValidationReport) -> JobStatus {
        if report.report_state == ReportState::Errored && report.final_decision.is_none() {
            return JobStatus::Failed;
        }
        match report.final_decision.as_ref().map(|d| d.decision) {
            Some(PolicyDecision::Allow) => JobStatus::Completed,
            Some(PolicyDecision::AllowWithWarnings) => JobStatus::CompletedWithWarnings,
            Some(PolicyDecision::Block) => JobStatus::Blocked,
            None => JobStatus::Failed,
        }
    }

    /// Builds the sanitized row summary from the (already masked) report.
    fn summary_for(report: &ValidationReport) -> serde_json::Value {
        json!({
            "reportState": report.report_state,
            "decision": report.final_decision.as_ref().map(|d| d.decision),
            "reasonCodes": report.final_decision.as_ref().map(|d| d.reason_codes.clone()),
            "diagnosticCounts": report.diagnostic_counts,
            "fingerprintId": report.fingerprint.as_ref().map(|f| f.id.clone()),
            "durationMs": report.timing.duration_ms,
        })
    }
}

fn parse_format_hint(value: &str) -> Option<FormatHint> {
    match value {
        "xrechnung-cii" => Some(FormatHint::XrechnungCii),
        "xrechnung-ubl" => Some(FormatHint::XrechnungUbl),
        "zugferd-factur-x" => Some(FormatHint::ZugferdFacturX),
        "peppol-bis" => Some(FormatHint::PeppolBis),
        "ubl" => Some(FormatHint::Ubl),
        "cii" => Some(FormatHint::Cii),
        _ => None,
    }
}
