// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Task Supervision Utilities
//!
//! Supervised concurrent task execution with proper error handling,
//! logging, and lifecycle management.
//!
//! ## Purpose
//!
//! - Prevents spawn-and-forget anti-patterns
//! - Ensures all task errors are captured and propagated
//! - Converts task panics into typed errors
//! - Provides structured logging for task lifecycle

use invoice_gate_domain::PipelineError;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Result type alias for application operations
pub type AppResult<T> = Result<T, PipelineError>;

/// Spawns a supervised task with automatic error logging and lifecycle
/// tracking.
///
/// Wraps `tokio::spawn` with supervision that logs task start and outcome
/// and returns a `JoinHandle` that must be awaited by the caller; no task
/// failure stays silent.
///
/// # Example
///
/// ```ignore
/// let handle = spawn_supervised("ttl-sweeper", async move {
///     sweep().await?;
///     Ok(())
/// });
/// join_supervised(handle).await?;
/// ```
pub fn spawn_supervised<F, T>(name: &'static str, fut: F) -> JoinHandle<AppResult<T>>
where
    F: std::future::Future<Output = AppResult<T>> + Send + 'static,
    T: Send + 'static,
{
    debug!(task = name, "task starting");

    tokio::spawn(async move {
        let result = fut.await;

        match &result {
            Ok(_) => debug!(task = name, "task completed successfully"),
            Err(e) => error!(task = name, error = ?e, "task failed"),
        }

        result
    })
}

/// Awaits a supervised task handle and propagates errors.
///
/// Handles both task panics (via `JoinError`) and task result errors, so
/// no failure mode is lost.
pub async fn join_supervised<T>(handle: JoinHandle<AppResult<T>>) -> AppResult<T> {
    let join_result: Result<AppResult<T>, tokio::task::JoinError> = handle.await;

    match join_result {
        Ok(task_result) => task_result,
        Err(e) => {
            if e.is_panic() {
                Err(PipelineError::FilterPanicked(format!("task panicked: {}", e)))
            } else if e.is_cancelled() {
                Err(PipelineError::cancelled("task was cancelled"))
            } else {
                Err(PipelineError::internal_error(format!("task join failed: {}", e)))
            }
        }
    }
}
