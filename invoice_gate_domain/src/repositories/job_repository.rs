// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Job Repository Port
//!
//! Persistence boundary for queued validation jobs.
//!
//! ## Invariants
//!
//! - Raw invoice content is never persisted. A job row carries only the
//!   temp-store key (`invoice_content_key`), and that key is cleared to
//!   null on every terminal transition.
//! - Status transitions are compare-and-set. `pending -> processing` only
//!   succeeds from `pending`; the retry transition `processing -> pending`
//!   only from `processing`; a terminal write only from `pending` or
//!   `processing`. A transition whose precondition does not hold is a no-op
//!   returning `None`, which makes the worker loop idempotent under
//!   at-least-once delivery.
//! - `report_summary` and `error_summary` are sanitized by the caller
//!   before they reach the repository.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::PipelineError;

/// Lifecycle status of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    CompletedWithWarnings,
    Blocked,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// The stable string form used in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::CompletedWithWarnings => "completed_with_warnings",
            JobStatus::Blocked => "blocked",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self, PipelineError> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "completed_with_warnings" => Ok(JobStatus::CompletedWithWarnings),
            "blocked" => Ok(JobStatus::Blocked),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(PipelineError::ValidationError(format!(
                "Unknown job status '{}'",
                other
            ))),
        }
    }

    /// Terminal statuses clear the invoice content key and accept no
    /// further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed
                | JobStatus::CompletedWithWarnings
                | JobStatus::Blocked
                | JobStatus::Failed
                | JobStatus::Cancelled
        )
    }
}

/// A queued validation job row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationJob {
    pub id: String,
    pub status: JobStatus,
    pub priority: i32,
    /// Temp-store key of the raw invoice; null after any terminal
    /// transition. Raw content itself is never a column.
    pub invoice_content_key: Option<String>,
    pub format: Option<String>,
    pub options: serde_json::Value,
    pub tenant_id: Option<String>,
    pub correlation_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result_fingerprint_id: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub plan_hash: Option<String>,
    pub config_snapshot_hash: Option<String>,
    pub engine_versions: serde_json::Value,
    /// Sanitized report summary (decision, counts, fingerprint id).
    pub report_summary: Option<serde_json::Value>,
    /// Sanitized one-line failure summary.
    pub error_summary: Option<String>,
}

impl ValidationJob {
    /// A freshly enqueued job.
    pub fn enqueued(id: impl Into<String>, invoice_content_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Pending,
            priority: 0,
            invoice_content_key: Some(invoice_content_key.into()),
            format: None,
            options: serde_json::Value::Object(serde_json::Map::new()),
            tenant_id: None,
            correlation_id: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result_fingerprint_id: None,
            error_message: None,
            retry_count: 0,
            max_retries: 3,
            plan_hash: None,
            config_snapshot_hash: None,
            engine_versions: serde_json::Value::Object(serde_json::Map::new()),
            report_summary: None,
            error_summary: None,
        }
    }
}

/// Terminal outcome handed to `store_job_result`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    /// Must be a terminal status.
    pub status: JobStatus,
    pub fingerprint_id: Option<String>,
    /// Sanitized summary; the repository stores it verbatim.
    pub report_summary: Option<serde_json::Value>,
    pub error_summary: Option<String>,
}

/// Aggregate queue statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStats {
    pub by_status: BTreeMap<String, u64>,
    pub total: u64,
}

/// Persistence boundary for validation jobs.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Inserts a new pending job.
    async fn create_job(&self, job: &ValidationJob) -> Result<(), PipelineError>;

    async fn get_job_by_id(&self, id: &str) -> Result<Option<ValidationJob>, PipelineError>;

    /// Compare-and-set status transition.
    ///
    /// `Processing` succeeds only from `pending`; `Pending` (requeue for
    /// retry) only from `processing`. Any other target or a failed
    /// precondition is a no-op returning `None`.
    async fn update_job_status(
        &self,
        id: &str,
        status: JobStatus,
    ) -> Result<Option<ValidationJob>, PipelineError>;

    /// Idempotent terminal write.
    ///
    /// Succeeds only from `pending` or `processing`; clears
    /// `invoice_content_key`. Jobs already terminal are untouched and the
    /// call returns `None`.
    async fn store_job_result(
        &self,
        id: &str,
        result: JobResult,
    ) -> Result<Option<ValidationJob>, PipelineError>;

    async fn get_jobs_by_status(
        &self,
        status: JobStatus,
        limit: u32,
    ) -> Result<Vec<ValidationJob>, PipelineError>;

    async fn get_jobs_by_tenant(
        &self,
        tenant_id: &str,
        limit: u32,
    ) -> Result<Vec<ValidationJob>, PipelineError>;

    /// Cancels a non-terminal job, clearing its content key.
    async fn cancel_job(&self, id: &str) -> Result<Option<ValidationJob>, PipelineError>;

    /// Increments the retry counter.
    async fn increment_retry(&self, id: &str) -> Result<Option<ValidationJob>, PipelineError>;

    /// Atomically claims the oldest highest-priority pending job,
    /// transitioning it to `processing`.
    async fn claim_job(&self) -> Result<Option<ValidationJob>, PipelineError>;

    async fn get_stats(&self) -> Result<JobStats, PipelineError>;

    /// Deletes terminal jobs completed before `older_than` ago. Returns the
    /// number of rows removed.
    async fn cleanup_old_jobs(&self, older_than: Duration) -> Result<u64, PipelineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_string_roundtrip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::CompletedWithWarnings,
            JobStatus::Blocked,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(JobStatus::parse("weird").is_err());
    }

    #[test]
    fn test_terminal_classification() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Blocked.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_enqueued_job_defaults() {
        let job = ValidationJob::enqueued("job-1", "raw-invoice:abc");
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.invoice_content_key.as_deref(), Some("raw-invoice:abc"));
        assert_eq!(job.retry_count, 0);
    }
}
