// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Temp Store Port
//!
//! Short-lived keyed byte store with TTL and secure delete.
//!
//! This is the *only* place raw invoice bytes may live during a run. Keys
//! are namespaced `category:run_id`; every entry expires at or before its
//! `expires_at`, and `secure_delete` overwrites the plaintext before
//! removal. Implementations must be safe for concurrent access across runs
//! and must treat expired entries as absent on read.
//!
//! This is an infrastructure port: the domain defines the contract, the
//! infrastructure layer provides the in-memory (or networked) backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::PipelineError;

/// Default TTL for raw invoice entries.
pub const DEFAULT_RAW_INVOICE_TTL_MS: u64 = 60_000;

/// Options for storing an entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetOptions {
    pub ttl_ms: u64,
    /// Key-namespace category (`raw-invoice`, `parsed-invoice`).
    pub category: String,
    /// Encrypt the entry at rest.
    pub encrypt: bool,
    pub correlation_id: Option<String>,
}

impl SetOptions {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            ttl_ms: DEFAULT_RAW_INVOICE_TTL_MS,
            category: category.into(),
            encrypt: false,
            correlation_id: None,
        }
    }

    pub fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    pub fn encrypted(mut self) -> Self {
        self.encrypt = true;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// Metadata of a stored entry, without the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempEntryMetadata {
    pub key: String,
    pub size_bytes: usize,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ttl_ms: u64,
    pub encrypted: bool,
    pub category: String,
    pub correlation_id: Option<String>,
}

/// Aggregate store statistics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TempStoreStats {
    pub entries: usize,
    pub total_bytes: usize,
    pub expired_swept: u64,
    pub secure_deletes: u64,
}

/// Short-lived keyed byte store with TTL and secure delete.
#[async_trait]
pub trait TempStore: Send + Sync {
    /// Stores an entry under `key`, replacing any previous value.
    async fn set(&self, key: &str, data: Vec<u8>, options: SetOptions) -> Result<(), PipelineError>;

    /// Reads an entry. Expired entries are absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PipelineError>;

    /// Reads entry metadata without the payload.
    async fn get_metadata(&self, key: &str) -> Result<Option<TempEntryMetadata>, PipelineError>;

    /// True when the key exists and has not expired.
    async fn has(&self, key: &str) -> Result<bool, PipelineError>;

    /// Removes an entry. Returns whether something was removed.
    async fn delete(&self, key: &str) -> Result<bool, PipelineError>;

    /// Overwrites the entry's buffers with zeros, then removes it.
    ///
    /// Best-effort on networked backends, where overwrite semantics depend
    /// on the remote store.
    async fn secure_delete(&self, key: &str) -> Result<bool, PipelineError>;

    /// Remaining TTL in milliseconds, or -1 when the key is missing or
    /// expired.
    async fn ttl(&self, key: &str) -> Result<i64, PipelineError>;

    /// Extends an entry's TTL. Returns false when the key is absent.
    async fn extend_ttl(&self, key: &str, additional_ms: u64) -> Result<bool, PipelineError>;

    /// Sweeps expired entries; returns how many were removed.
    async fn cleanup(&self) -> Result<usize, PipelineError>;

    /// Store statistics.
    async fn stats(&self) -> Result<TempStoreStats, PipelineError>;

    /// Securely drops all entries and shuts the store down.
    async fn close(&self) -> Result<(), PipelineError>;
}
