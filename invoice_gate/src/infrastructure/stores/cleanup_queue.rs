// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # In-Process Cleanup Queue
//!
//! The process-local implementation of the `CleanupQueue` port.
//!
//! Records are keyed by temp-store key; re-enqueueing an already-pending
//! key refreshes the record without resetting its retry count, so a key
//! that keeps failing marches toward abandonment instead of retrying
//! forever. `process` takes a snapshot before touching the store, so no
//! lock is held across an await point.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::warn;

use invoice_gate_domain::services::cleanup_queue::{
    CleanupQueue, CleanupQueueOutcome, FailedDeleteRecord,
};
use invoice_gate_domain::services::temp_store::TempStore;
use invoice_gate_domain::PipelineError;

/// In-memory `CleanupQueue` backend.
#[derive(Default)]
pub struct MemoryCleanupQueue {
    records: RwLock<HashMap<String, FailedDeleteRecord>>,
}

impl MemoryCleanupQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CleanupQueue for MemoryCleanupQueue {
    async fn enqueue(&self, record: FailedDeleteRecord) -> Result<(), PipelineError> {
        let mut records = self.records.write();
        match records.get_mut(&record.key) {
            Some(existing) => {
                existing.failed_at = record.failed_at;
                existing.last_error = record.last_error;
            }
            None => {
                records.insert(record.key.clone(), record);
            }
        }
        Ok(())
    }

    async fn pending(&self) -> Result<Vec<FailedDeleteRecord>, PipelineError> {
        let records = self.records.read();
        let mut pending: Vec<FailedDeleteRecord> = records.values().cloned().collect();
        pending.sort_by(|a, b| a.failed_at.cmp(&b.failed_at));
        Ok(pending)
    }

    async fn mark_completed(&self, key: &str) -> Result<(), PipelineError> {
        self.records.write().remove(key);
        Ok(())
    }

    async fn mark_failed(&self, key: &str, error: &str) -> Result<(), PipelineError> {
        let mut records = self.records.write();
        if let Some(record) = records.get_mut(key) {
            record.retry_count += 1;
            record.failed_at = Utc::now();
            record.last_error = Some(error.to_string());
        }
        Ok(())
    }

    async fn process(&self, store: &dyn TempStore) -> Result<CleanupQueueOutcome, PipelineError> {
        let snapshot = self.pending().await?;
        let mut outcome = CleanupQueueOutcome {
            processed: snapshot.len(),
            ..Default::default()
        };

        for record in snapshot {
            match store.secure_delete(&record.key).await {
                // Ok(false) means the key is already gone, which is success
                // from a retention standpoint.
                Ok(_) => {
                    outcome.succeeded += 1;
                    self.records.write().remove(&record.key);
                }
                Err(e) => {
                    let retry_count = record.retry_count + 1;
                    if retry_count >= record.max_retries {
                        warn!(
                            category = record.category.as_deref().unwrap_or("unknown"),
                            retries = retry_count,
                            "abandoning failed delete after exhausting retries"
                        );
                        outcome.abandoned += 1;
                        outcome.abandoned_keys.push(record.key.clone());
                        self.records.write().remove(&record.key);
                    } else {
                        outcome.failed += 1;
                        let mut records = self.records.write();
                        if let Some(pending) = records.get_mut(&record.key) {
                            pending.retry_count = retry_count;
                            pending.failed_at = Utc::now();
                            pending.last_error = Some(e.to_string());
                        }
                    }
                }
            }
        }

        Ok(outcome)
    }
}
