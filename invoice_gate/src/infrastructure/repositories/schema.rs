// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Job Table Schema
//!
//! DDL for the `jobs` table.
//!
//! The schema deliberately has no column that could hold invoice content:
//! `invoice_content_key` references a temp-store entry and is nulled on
//! every terminal transition. Summaries are sanitized JSON written by the
//! application layer.

use sqlx::SqlitePool;

use invoice_gate_domain::PipelineError;

/// `jobs` table DDL.
pub const JOBS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    priority INTEGER NOT NULL DEFAULT 0,
    invoice_content_key TEXT,
    format TEXT,
    options TEXT NOT NULL DEFAULT '{}',
    tenant_id TEXT,
    correlation_id TEXT,
    created_at TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT,
    result_fingerprint_id TEXT,
    error_message TEXT,
    retry_count INTEGER NOT NULL DEFAULT 0,
    max_retries INTEGER NOT NULL DEFAULT 3,
    plan_hash TEXT,
    config_snapshot_hash TEXT,
    engine_versions TEXT NOT NULL DEFAULT '{}',
    report_summary TEXT,
    error_summary TEXT
)
"#;

const STATUS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status, priority, created_at)";

const TENANT_INDEX: &str = "CREATE INDEX IF NOT EXISTS idx_jobs_tenant ON jobs(tenant_id)";

/// Creates the jobs table and its indexes if they do not exist.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), PipelineError> {
    for statement in [JOBS_TABLE, STATUS_INDEX, TENANT_INDEX] {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| PipelineError::database_error(format!("schema creation failed: {}", e)))?;
    }
    Ok(())
}
