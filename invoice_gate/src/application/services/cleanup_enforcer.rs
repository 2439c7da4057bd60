// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Cleanup Enforcer
//!
//! The guaranteed secure-delete path for a run's ephemeral data.
//!
//! The orchestrator invokes the enforcer with every tracked temp key
//! immediately before returning the report, on every exit path. The
//! enforcer itself never fails: a secure delete that errors is handed to
//! the cleanup queue for durable retry and surfaces as a structured
//! retention warning on the report. Warnings carry counts and generic
//! messages only; a key never appears in any warning text.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, warn};

use invoice_gate_domain::entities::{RetentionWarning, RetentionWarningCode};
use invoice_gate_domain::services::cleanup_queue::{CleanupQueue, FailedDeleteRecord};
use invoice_gate_domain::services::temp_store::TempStore;
use invoice_gate_domain::value_objects::TempKey;

/// Result of one cleanup pass.
#[derive(Debug, Clone, Default)]
pub struct CleanupOutcome {
    /// True when every key was either deleted or queued for retry.
    pub completed: bool,
    /// Keys securely deleted (or already absent).
    pub deleted: usize,
    /// Keys handed to the cleanup queue.
    pub queued: Vec<String>,
    pub duration_ms: u64,
    pub warnings: Vec<RetentionWarning>,
}

/// Guaranteed secure-delete sweep over a run's tracked keys.
pub struct CleanupEnforcer {
    temp_store: Arc<dyn TempStore>,
    cleanup_queue: Arc<dyn CleanupQueue>,
}

impl CleanupEnforcer {
    pub fn new(temp_store: Arc<dyn TempStore>, cleanup_queue: Arc<dyn CleanupQueue>) -> Self {
        Self {
            temp_store,
            cleanup_queue,
        }
    }

    /// Securely deletes every tracked key. Never returns an error.
    pub async fn cleanup(&self, keys: &[TempKey], correlation_id: Option<&str>) -> CleanupOutcome {
        let started = Instant::now();
        let mut outcome = CleanupOutcome::default();
        let mut enqueue_failures = 0usize;

        for key in keys {
            match self.temp_store.secure_delete(key.as_str()).await {
                Ok(_) => {
                    // Ok(false) means the entry already expired, which is
                    // the retention outcome we wanted anyway.
                    outcome.deleted += 1;
                }
                Err(e) => {
                    let category = key.as_str().split(':').next().unwrap_or("unknown");
                    let mut record =
                        FailedDeleteRecord::new(key.as_str(), e.to_string()).with_category(category);
                    record.correlation_id = correlation_id.map(|s| s.to_string());

                    match self.cleanup_queue.enqueue(record).await {
                        Ok(()) => {
                            debug!(category, "secure delete failed, queued for retry");
                            outcome.queued.push(key.to_string());
                        }
                        Err(queue_err) => {
                            warn!(error = %queue_err, "secure delete failed and could not be queued");
                            enqueue_failures += 1;
                        }
                    }
                }
            }
        }

        if !outcome.queued.is_empty() {
            outcome.warnings.push(RetentionWarning {
                code: RetentionWarningCode::CleanupQueued,
                message: "Some ephemeral entries could not be deleted immediately and were queued for retry"
                    .to_string(),
                timestamp: Utc::now(),
                affected_count: outcome.queued.len(),
            });
        }
        if enqueue_failures > 0 {
            outcome.warnings.push(RetentionWarning {
                code: RetentionWarningCode::CleanupError,
                message: "Some ephemeral entries could not be deleted or queued for retry"
                    .to_string(),
                timestamp: Utc::now(),
                affected_count: enqueue_failures,
            });
        }

        outcome.completed = enqueue_failures == 0;
        outcome.duration_ms = started.elapsed().as_millis() as u64;
        outcome
    }
}
