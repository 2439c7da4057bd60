// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Cleanup Queue Port
//!
//! Durable retry queue for secure deletes that failed.
//!
//! When the cleanup enforcer cannot securely delete a temp-store key, it
//! enqueues a `FailedDeleteRecord` here instead of leaking the entry
//! silently. A background worker calls `process` to re-attempt the deletes;
//! records that exhaust `max_retries` are abandoned and surfaced through
//! `abandoned_keys` for alerting.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::temp_store::TempStore;
use crate::PipelineError;

/// Default number of delete re-attempts before a record is abandoned.
pub const DEFAULT_MAX_DELETE_RETRIES: u32 = 5;

/// A secure delete that failed and awaits retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedDeleteRecord {
    pub key: String,
    pub failed_at: DateTime<Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl FailedDeleteRecord {
    pub fn new(key: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            failed_at: Utc::now(),
            retry_count: 0,
            max_retries: DEFAULT_MAX_DELETE_RETRIES,
            last_error: Some(error.into()),
            category: None,
            correlation_id: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Outcome of one `process` pass over the queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupQueueOutcome {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub abandoned: usize,
    /// Keys that exhausted their retries this pass; surfaced for alerting.
    pub abandoned_keys: Vec<String>,
}

/// Durable retry queue for failed secure deletes.
#[async_trait]
pub trait CleanupQueue: Send + Sync {
    /// Adds a failed delete for later retry. Re-enqueueing an existing key
    /// updates the record and keeps its retry count.
    async fn enqueue(&self, record: FailedDeleteRecord) -> Result<(), PipelineError>;

    /// All records awaiting retry.
    async fn pending(&self) -> Result<Vec<FailedDeleteRecord>, PipelineError>;

    /// Removes a record after its key was deleted out of band.
    async fn mark_completed(&self, key: &str) -> Result<(), PipelineError>;

    /// Records another failed attempt for a key.
    async fn mark_failed(&self, key: &str, error: &str) -> Result<(), PipelineError>;

    /// Re-attempts every pending delete against the store.
    async fn process(&self, store: &dyn TempStore) -> Result<CleanupQueueOutcome, PipelineError>;
}
