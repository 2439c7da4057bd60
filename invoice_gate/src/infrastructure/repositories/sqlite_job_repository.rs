// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SQLite Job Repository
//!
//! SQLite implementation of the `JobRepository` port.
//!
//! ## Idempotency
//!
//! Every transition is a guarded `UPDATE ... WHERE status IN (...)`. A
//! worker that crashes after claiming a job and re-delivers the message
//! later cannot corrupt state: the second claim finds the job no longer
//! `pending`, the second terminal write finds it already terminal, and
//! both are no-ops returning `None`. This is what makes at-least-once
//! delivery safe without distributed locks.
//!
//! ## Zero retention
//!
//! `invoice_content_key` is the only reference to invoice data and is
//! cleared by every terminal transition (`store_job_result`, `cancel_job`).

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use invoice_gate_domain::repositories::job_repository::{
    JobRepository, JobResult, JobStats, JobStatus, ValidationJob,
};
use invoice_gate_domain::PipelineError;

use super::schema;

const TERMINAL_STATUSES: &str =
    "'completed', 'completed_with_warnings', 'blocked', 'failed', 'cancelled'";

/// SQLite-backed job repository.
pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    /// Creates a repository over an existing pool, ensuring the schema.
    pub async fn new(pool: SqlitePool) -> Result<Self, PipelineError> {
        schema::ensure_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Connects to a database URL (`sqlite::memory:` or a file path).
    pub async fn connect(database_url: &str) -> Result<Self, PipelineError> {
        // An in-memory database exists per connection; the pool must stay
        // on one connection or each checkout sees an empty database.
        let pool = if database_url.contains(":memory:") {
            sqlx::sqlite::SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect(database_url)
                .await
        } else {
            SqlitePool::connect(database_url).await
        }
        .map_err(|e| PipelineError::database_error(format!("connection failed: {}", e)))?;
        Self::new(pool).await
    }

    /// In-memory repository for tests.
    pub async fn in_memory() -> Result<Self, PipelineError> {
        Self::connect("sqlite::memory:").await
    }

    fn db_err(context: &str, e: sqlx::Error) -> PipelineError {
        PipelineError::database_error(format!("{}: {}", context, e))
    }

    async fn fetch(&self, id: &str) -> Result<Option<ValidationJob>, PipelineError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Self::db_err("fetch job", e))?;
        row.map(job_from_row).transpose()
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn create_job(&self, job: &ValidationJob) -> Result<(), PipelineError> {
        sqlx::query(
            "INSERT INTO jobs (
                id, status, priority, invoice_content_key, format, options,
                tenant_id, correlation_id, created_at, started_at, completed_at,
                result_fingerprint_id, error_message, retry_count, max_retries,
                plan_hash, config_snapshot_hash, engine_versions, report_summary,
                error_summary
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
        )
        .bind(&job.id)
        .bind(job.status.as_str())
        .bind(job.priority)
        .bind(&job.invoice_content_key)
        .bind(&job.format)
        .bind(job.options.to_string())
        .bind(&job.tenant_id)
        .bind(&job.correlation_id)
        .bind(job.created_at.to_rfc3339())
        .bind(job.started_at.map(|t| t.to_rfc3339()))
        .bind(job.completed_at.map(|t| t.to_rfc3339()))
        .bind(&job.result_fingerprint_id)
        .bind(&job.error_message)
        .bind(job.retry_count as i64)
        .bind(job.max_retries as i64)
        .bind(&job.plan_hash)
        .bind(&job.config_snapshot_hash)
        .bind(job.engine_versions.to_string())
        .bind(job.report_summary.as_ref().map(|v| v.to_string()))
        .bind(&job.error_summary)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::db_err("insert job", e))?;
        Ok(())
    }

    async fn get_job_by_id(&self, id: &str) -> Result<Option<ValidationJob>, PipelineError> {
        self.fetch(id).await
    }

    async fn update_job_status(
        &self,
        id: &str,
        status: JobStatus,
    ) -> Result<Option<ValidationJob>, PipelineError> {
        let affected = match status {
            JobStatus::Processing => {
                sqlx::query(
                    "UPDATE jobs SET status = 'processing', started_at = ?1
                     WHERE id = ?2 AND status = 'pending'",
                )
                .bind(Utc::now().to_rfc3339())
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| Self::db_err("update status", e))?
                .rows_affected()
            }
            JobStatus::Pending => {
                sqlx::query(
                    "UPDATE jobs SET status = 'pending', started_at = NULL
                     WHERE id = ?1 AND status = 'processing'",
                )
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| Self::db_err("update status", e))?
                .rows_affected()
            }
            other => {
                return Err(PipelineError::validation_error(format!(
                    "status '{}' must be set through store_job_result or cancel_job",
                    other.as_str()
                )));
            }
        };

        if affected == 0 {
            return Ok(None);
        }
        self.fetch(id).await
    }

    async fn store_job_result(
        &self,
        id: &str,
        result: JobResult,
    ) -> Result<Option<ValidationJob>, PipelineError> {
        if !result.status.is_terminal() {
            return Err(PipelineError::validation_error(format!(
                "store_job_result requires a terminal status, got '{}'",
                result.status.as_str()
            )));
        }

        let affected = sqlx::query(
            "UPDATE jobs SET
                status = ?1,
                completed_at = ?2,
                result_fingerprint_id = ?3,
                report_summary = ?4,
                error_summary = ?5,
                invoice_content_key = NULL
             WHERE id = ?6 AND status IN ('pending', 'processing')",
        )
        .bind(result.status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(&result.fingerprint_id)
        .bind(result.report_summary.as_ref().map(|v| v.to_string()))
        .bind(&result.error_summary)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::db_err("store result", e))?
        .rows_affected();

        if affected == 0 {
            return Ok(None);
        }
        self.fetch(id).await
    }

    async fn get_jobs_by_status(
        &self,
        status: JobStatus,
        limit: u32,
    ) -> Result<Vec<ValidationJob>, PipelineError> {
        let rows = sqlx::query(
            "SELECT * FROM jobs WHERE status = ?1
             ORDER BY priority DESC, created_at ASC LIMIT ?2",
        )
        .bind(status.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::db_err("list by status", e))?;
        rows.into_iter().map(job_from_row).collect()
    }

    async fn get_jobs_by_tenant(
        &self,
        tenant_id: &str,
        limit: u32,
    ) -> Result<Vec<ValidationJob>, PipelineError> {
        let rows = sqlx::query(
            "SELECT * FROM jobs WHERE tenant_id = ?1
             ORDER BY created_at DESC LIMIT ?2",
        )
        .bind(tenant_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::db_err("list by tenant", e))?;
        rows.into_iter().map(job_from_row).collect()
    }

    async fn cancel_job(&self, id: &str) -> Result<Option<ValidationJob>, PipelineError> {
        let affected = sqlx::query(
            "UPDATE jobs SET status = 'cancelled', completed_at = ?1, invoice_content_key = NULL
             WHERE id = ?2 AND status IN ('pending', 'processing')",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::db_err("cancel job", e))?
        .rows_affected();

        if affected == 0 {
            return Ok(None);
        }
        self.fetch(id).await
    }

    async fn increment_retry(&self, id: &str) -> Result<Option<ValidationJob>, PipelineError> {
        let affected = sqlx::query("UPDATE jobs SET retry_count = retry_count + 1 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| Self::db_err("increment retry", e))?
            .rows_affected();

        if affected == 0 {
            return Ok(None);
        }
        self.fetch(id).await
    }

    async fn claim_job(&self) -> Result<Option<ValidationJob>, PipelineError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Self::db_err("begin claim", e))?;

        let candidate: Option<String> = sqlx::query(
            "SELECT id FROM jobs WHERE status = 'pending'
             ORDER BY priority DESC, created_at ASC LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| Self::db_err("select claimable", e))?
        .map(|row| row.get::<String, _>("id"));

        let Some(id) = candidate else {
            tx.commit().await.map_err(|e| Self::db_err("commit claim", e))?;
            return Ok(None);
        };

        let affected = sqlx::query(
            "UPDATE jobs SET status = 'processing', started_at = ?1
             WHERE id = ?2 AND status = 'pending'",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(&id)
        .execute(&mut *tx)
        .await
        .map_err(|e| Self::db_err("claim update", e))?
        .rows_affected();

        tx.commit().await.map_err(|e| Self::db_err("commit claim", e))?;

        if affected == 0 {
            // Lost the race to another worker
            return Ok(None);
        }
        self.fetch(&id).await
    }

    async fn get_stats(&self) -> Result<JobStats, PipelineError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM jobs GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::db_err("stats", e))?;

        let mut stats = JobStats::default();
        for row in rows {
            let status: String = row.get("status");
            let count: i64 = row.get("count");
            stats.total += count as u64;
            stats.by_status.insert(status, count as u64);
        }
        Ok(stats)
    }

    async fn cleanup_old_jobs(&self, older_than: Duration) -> Result<u64, PipelineError> {
        let cutoff = Utc::now() - older_than;
        let affected = sqlx::query(&format!(
            "DELETE FROM jobs WHERE status IN ({}) AND completed_at < ?1",
            TERMINAL_STATUSES
        ))
        .bind(cutoff.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| Self::db_err("cleanup old jobs", e))?
        .rows_affected();
        Ok(affected)
    }
}

fn parse_timestamp(value: Option<String>, column: &str) -> Result<Option<DateTime<Utc>>, PipelineError> {
    value
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| {
                    PipelineError::database_error(format!("invalid {} timestamp: {}", column, e))
                })
        })
        .transpose()
}

fn parse_json(value: Option<String>) -> serde_json::Value {
    value
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()))
}

fn job_from_row(row: SqliteRow) -> Result<ValidationJob, PipelineError> {
    let status_str: String = row.get("status");
    let created_at: String = row.get("created_at");

    Ok(ValidationJob {
        id: row.get("id"),
        status: JobStatus::parse(&status_str)?,
        priority: row.get::<i64, _>("priority") as i32,
        invoice_content_key: row.get("invoice_content_key"),
        format: row.get("format"),
        options: parse_json(row.get("options")),
        tenant_id: row.get("tenant_id"),
        correlation_id: row.get("correlation_id"),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| PipelineError::database_error(format!("invalid created_at: {}", e)))?,
        started_at: parse_timestamp(row.get("started_at"), "started_at")?,
        completed_at: parse_timestamp(row.get("completed_at"), "completed_at")?,
        result_fingerprint_id: row.get("result_fingerprint_id"),
        error_message: row.get("error_message"),
        retry_count: row.get::<i64, _>("retry_count") as u32,
        max_retries: row.get::<i64, _>("max_retries") as u32,
        plan_hash: row.get("plan_hash"),
        config_snapshot_hash: row.get("config_snapshot_hash"),
        engine_versions: parse_json(row.get("engine_versions")),
        report_summary: row
            .get::<Option<String>, _>("report_summary")
            .and_then(|s| serde_json::from_str(&s).ok()),
        error_summary: row.get("error_summary"),
    })
}
