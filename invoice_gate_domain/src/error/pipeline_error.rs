// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! This module provides the hierarchical error system for the invoice gate
//! domain. It categorizes failures, provides actionable error messages, and
//! supports both automated error recovery and human-readable diagnostics.
//!
//! ## Error Architecture
//!
//! The error system organizes failures into logical categories:
//!
//! #### Orchestration Errors
//! - **InvalidPlan**: Malformed execution plan (empty, duplicate ids, cycles)
//! - **AlreadyExecuting**: A second run was submitted to a busy orchestrator
//! - **InvalidConfiguration**: Malformed or missing configuration settings
//!
//! #### Execution Errors
//! - **FilterNotFound**: A plan step references an unregistered filter
//! - **FilterPanicked**: A filter implementation panicked mid-execution
//! - **TimeoutError**: A step attempt or the whole run exceeded its budget
//! - **Cancelled**: The run-scoped cancellation token fired
//!
//! #### Infrastructure Errors
//! - **TempStoreError**: Short-lived store operation failures
//! - **CleanupError**: Secure-delete failures (captured, never propagated)
//! - **DatabaseError**: Job repository operation failures
//! - **IoError**: File system and network I/O failures
//! - **ExternalServiceError**: Failures from external verifier collaborators
//!
//! ## Error Recovery
//!
//! Some errors indicate temporary conditions that the retry harness may
//! retry (`TimeoutError`, `ExternalServiceError`, `IoError`); the rest
//! require configuration or code changes and are never retried.
//!
//! ## Security Considerations
//!
//! Error messages never carry raw invoice content, temp-store keys, or any
//! PII. Callers constructing messages from external data must sanitize first.

use thiserror::Error;

/// Domain-specific errors for the validation pipeline engine.
///
/// Each variant includes a descriptive message and is designed to provide
/// clear information about what went wrong and potentially how to fix it.
///
/// Filter-level failures do not use this type directly: they are captured as
/// `StepError` values inside step results so a run always produces a report.
/// `PipelineError` surfaces only for orchestration-level failures that
/// prevent a report from being produced at all.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Pipeline is already executing a run: {0}")]
    AlreadyExecuting(String),

    #[error("Filter not found: {0}")]
    FilterNotFound(String),

    #[error("Filter panicked: {0}")]
    FilterPanicked(String),

    #[error("Timeout error: {0}")]
    TimeoutError(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Temp store error: {0}")]
    TempStoreError(String),

    #[error("Cleanup error: {0}")]
    CleanupError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl PipelineError {
    /// Creates a new configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Creates a new invalid-plan error
    pub fn invalid_plan(msg: impl Into<String>) -> Self {
        Self::InvalidPlan(msg.into())
    }

    /// Creates a new timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::TimeoutError(msg.into())
    }

    /// Creates a new cancellation error
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Creates a new temp store error
    pub fn temp_store(msg: impl Into<String>) -> Self {
        Self::TempStoreError(msg.into())
    }

    /// Creates a new cleanup error
    pub fn cleanup(msg: impl Into<String>) -> Self {
        Self::CleanupError(msg.into())
    }

    /// Creates a new database error
    pub fn database_error(msg: impl Into<String>) -> Self {
        Self::DatabaseError(msg.into())
    }

    /// Creates a new validation error
    pub fn validation_error(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Creates a new external service error
    pub fn external_service(msg: impl Into<String>) -> Self {
        Self::ExternalServiceError(msg.into())
    }

    /// Creates a new internal error
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Checks if the error is recoverable
    ///
    /// Recoverable errors indicate transient conditions that the retry
    /// harness may retry when the step's retry configuration allows it.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::TimeoutError(_)
                | PipelineError::ExternalServiceError(_)
                | PipelineError::IoError(_)
        )
    }

    /// Gets the error category
    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::InvalidConfiguration(_) => "configuration",
            PipelineError::InvalidPlan(_) => "plan",
            PipelineError::AlreadyExecuting(_) => "orchestration",
            PipelineError::FilterNotFound(_) => "filter",
            PipelineError::FilterPanicked(_) => "filter",
            PipelineError::TimeoutError(_) => "timeout",
            PipelineError::Cancelled(_) => "cancellation",
            PipelineError::TempStoreError(_) => "temp-store",
            PipelineError::CleanupError(_) => "cleanup",
            PipelineError::SerializationError(_) => "serialization",
            PipelineError::ValidationError(_) => "validation",
            PipelineError::DatabaseError(_) => "database",
            PipelineError::JobNotFound(_) => "database",
            PipelineError::IoError(_) => "io",
            PipelineError::ExternalServiceError(_) => "external",
            PipelineError::InternalError(_) => "internal",
        }
    }
}

// Implement conversion from standard library errors
impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::SerializationError(err.to_string())
    }
}
