// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! SQLite job repository tests: compare-and-set transitions, idempotent
//! terminal writes, claiming, and the zero-retention column discipline.

use chrono::Duration;
use serde_json::json;

use invoice_gate::infrastructure::repositories::SqliteJobRepository;
use invoice_gate_domain::repositories::job_repository::{
    JobRepository, JobResult, JobStatus, ValidationJob,
};

fn job(id: &str) -> ValidationJob {
    let mut job = ValidationJob::enqueued(id, format!("raw-invoice:{}", id));
    job.tenant_id = Some("tenant-a".to_string());
    job
}

fn completed(fingerprint: &str) -> JobResult {
    JobResult {
        status: JobStatus::Completed,
        fingerprint_id: Some(fingerprint.to_string()),
        report_summary: Some(json!({"decision": "ALLOW", "reasonCodes": []})),
        error_summary: None,
    }
}

#[tokio::test]
async fn test_create_and_fetch_roundtrip() {
    let repo = SqliteJobRepository::in_memory().await.unwrap();
    repo.create_job(&job("job-1")).await.unwrap();

    let fetched = repo.get_job_by_id("job-1").await.unwrap().unwrap();
    assert_eq!(fetched.status, JobStatus::Pending);
    assert_eq!(fetched.invoice_content_key.as_deref(), Some("raw-invoice:job-1"));
    assert_eq!(fetched.tenant_id.as_deref(), Some("tenant-a"));

    assert!(repo.get_job_by_id("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_claim_transition_is_compare_and_set() {
    let repo = SqliteJobRepository::in_memory().await.unwrap();
    repo.create_job(&job("job-1")).await.unwrap();

    // pending -> processing succeeds once
    let claimed = repo
        .update_job_status("job-1", JobStatus::Processing)
        .await
        .unwrap();
    assert_eq!(claimed.unwrap().status, JobStatus::Processing);

    // The second identical transition is a no-op returning absent
    let second = repo
        .update_job_status("job-1", JobStatus::Processing)
        .await
        .unwrap();
    assert!(second.is_none());
}

#[tokio::test]
async fn test_requeue_only_from_processing() {
    let repo = SqliteJobRepository::in_memory().await.unwrap();
    repo.create_job(&job("job-1")).await.unwrap();

    // pending -> pending requeue is a no-op
    assert!(repo
        .update_job_status("job-1", JobStatus::Pending)
        .await
        .unwrap()
        .is_none());

    repo.update_job_status("job-1", JobStatus::Processing)
        .await
        .unwrap();
    let requeued = repo
        .update_job_status("job-1", JobStatus::Pending)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(requeued.status, JobStatus::Pending);
    assert!(requeued.started_at.is_none());
}

#[tokio::test]
async fn test_terminal_write_is_idempotent_and_clears_content_key() {
    let repo = SqliteJobRepository::in_memory().await.unwrap();
    repo.create_job(&job("job-1")).await.unwrap();
    repo.update_job_status("job-1", JobStatus::Processing)
        .await
        .unwrap();

    let stored = repo
        .store_job_result("job-1", completed("FL-abc-123456"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    // Zero retention: the temp-store reference is gone at terminal state
    assert!(stored.invoice_content_key.is_none());
    assert_eq!(stored.result_fingerprint_id.as_deref(), Some("FL-abc-123456"));

    // A duplicate delivery writes nothing and mutates nothing
    let before = repo.get_job_by_id("job-1").await.unwrap().unwrap();
    let duplicate = repo
        .store_job_result(
            "job-1",
            JobResult {
                status: JobStatus::Failed,
                fingerprint_id: None,
                report_summary: None,
                error_summary: Some("should not land".to_string()),
            },
        )
        .await
        .unwrap();
    assert!(duplicate.is_none());
    let after = repo.get_job_by_id("job-1").await.unwrap().unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_terminal_write_requires_terminal_status() {
    let repo = SqliteJobRepository::in_memory().await.unwrap();
    repo.create_job(&job("job-1")).await.unwrap();

    let result = repo
        .store_job_result(
            "job-1",
            JobResult {
                status: JobStatus::Processing,
                fingerprint_id: None,
                report_summary: None,
                error_summary: None,
            },
        )
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_claim_job_pops_by_priority_then_age() {
    let repo = SqliteJobRepository::in_memory().await.unwrap();

    let mut low = job("job-low");
    low.priority = 0;
    let mut high = job("job-high");
    high.priority = 5;
    repo.create_job(&low).await.unwrap();
    repo.create_job(&high).await.unwrap();

    let first = repo.claim_job().await.unwrap().unwrap();
    assert_eq!(first.id, "job-high");
    assert_eq!(first.status, JobStatus::Processing);

    let second = repo.claim_job().await.unwrap().unwrap();
    assert_eq!(second.id, "job-low");

    // Queue drained
    assert!(repo.claim_job().await.unwrap().is_none());
}

#[tokio::test]
async fn test_cancel_clears_content_key_only_for_active_jobs() {
    let repo = SqliteJobRepository::in_memory().await.unwrap();
    repo.create_job(&job("job-1")).await.unwrap();

    let cancelled = repo.cancel_job("job-1").await.unwrap().unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(cancelled.invoice_content_key.is_none());

    // A second cancel is a no-op
    assert!(repo.cancel_job("job-1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_increment_retry() {
    let repo = SqliteJobRepository::in_memory().await.unwrap();
    repo.create_job(&job("job-1")).await.unwrap();

    let updated = repo.increment_retry("job-1").await.unwrap().unwrap();
    assert_eq!(updated.retry_count, 1);
    assert!(repo.increment_retry("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_listing_and_stats() {
    let repo = SqliteJobRepository::in_memory().await.unwrap();
    repo.create_job(&job("job-1")).await.unwrap();
    repo.create_job(&job("job-2")).await.unwrap();
    let mut other_tenant = job("job-3");
    other_tenant.tenant_id = Some("tenant-b".to_string());
    repo.create_job(&other_tenant).await.unwrap();

    repo.update_job_status("job-1", JobStatus::Processing)
        .await
        .unwrap();

    let pending = repo.get_jobs_by_status(JobStatus::Pending, 10).await.unwrap();
    assert_eq!(pending.len(), 2);

    let tenant_a = repo.get_jobs_by_tenant("tenant-a", 10).await.unwrap();
    assert_eq!(tenant_a.len(), 2);

    let stats = repo.get_stats().await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.by_status.get("pending"), Some(&2));
    assert_eq!(stats.by_status.get("processing"), Some(&1));
}

#[tokio::test]
async fn test_cleanup_old_jobs_removes_only_terminal_rows() {
    let repo = SqliteJobRepository::in_memory().await.unwrap();
    repo.create_job(&job("job-done")).await.unwrap();
    repo.create_job(&job("job-open")).await.unwrap();

    repo.update_job_status("job-done", JobStatus::Processing)
        .await
        .unwrap();
    repo.store_job_result("job-done", completed("FL-x-000000"))
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    let removed = repo.cleanup_old_jobs(Duration::zero()).await.unwrap();
    assert_eq!(removed, 1);

    assert!(repo.get_job_by_id("job-done").await.unwrap().is_none());
    assert!(repo.get_job_by_id("job-open").await.unwrap().is_some());
}
