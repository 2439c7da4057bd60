// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # In-Memory Temp Store
//!
//! The process-local implementation of the `TempStore` port.
//!
//! ## Overview
//!
//! Entries live in a `parking_lot::RwLock<HashMap>` shared across runs.
//! Each entry carries its TTL and is treated as absent once expired;
//! expired entries are removed lazily on read and eagerly by `cleanup()`.
//!
//! ## Data hygiene
//!
//! - `secure_delete` zeroizes the entry's buffers before removal, so raw
//!   invoice bytes do not linger in freed allocations
//! - entries stored with `encrypt` are sealed with AES-256-GCM under a
//!   process-lifetime key and a random per-entry nonce; plaintext input
//!   buffers are zeroized right after sealing
//! - `close()` securely drops every remaining entry
//!
//! Locks are never held across await points; all awaited work happens on
//! owned data.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use aes_gcm::aead::{Aead, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, KeyInit, Nonce};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use zeroize::Zeroize;

use invoice_gate_domain::services::temp_store::{
    SetOptions, TempEntryMetadata, TempStore, TempStoreStats,
};
use invoice_gate_domain::PipelineError;

struct StoredEntry {
    data: Vec<u8>,
    nonce: Option<[u8; 12]>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    ttl_ms: u64,
    encrypted: bool,
    category: String,
    correlation_id: Option<String>,
}

impl StoredEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    fn wipe(&mut self) {
        self.data.zeroize();
        if let Some(nonce) = self.nonce.as_mut() {
            nonce.zeroize();
        }
    }
}

/// In-memory `TempStore` backend with TTL, secure delete, and optional
/// at-rest encryption.
pub struct MemoryTempStore {
    entries: RwLock<HashMap<String, StoredEntry>>,
    cipher: Aes256Gcm,
    expired_swept: AtomicU64,
    secure_deletes: AtomicU64,
    closed: AtomicBool,
}

impl MemoryTempStore {
    /// Creates a store with a fresh process-lifetime encryption key.
    pub fn new() -> Self {
        let key = Aes256Gcm::generate_key(OsRng);
        Self::with_key(&key)
    }

    fn with_key(key: &Key<Aes256Gcm>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            cipher: Aes256Gcm::new(key),
            expired_swept: AtomicU64::new(0),
            secure_deletes: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), PipelineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PipelineError::temp_store("store is closed"));
        }
        Ok(())
    }

    /// Removes an expired entry found during a read. Returns true when the
    /// key was present but expired.
    fn sweep_if_expired(&self, key: &str) -> bool {
        let now = Utc::now();
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(key) {
            if entry.is_expired(now) {
                if let Some(mut removed) = entries.remove(key) {
                    removed.wipe();
                }
                self.expired_swept.fetch_add(1, Ordering::SeqCst);
                return true;
            }
        }
        false
    }
}

impl Default for MemoryTempStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TempStore for MemoryTempStore {
    async fn set(
        &self,
        key: &str,
        mut data: Vec<u8>,
        options: SetOptions,
    ) -> Result<(), PipelineError> {
        self.ensure_open()?;

        let now = Utc::now();
        let ttl_ms = options.ttl_ms.max(1);
        let (stored, nonce) = if options.encrypt {
            let nonce = Aes256Gcm::generate_nonce(OsRng);
            let sealed = self
                .cipher
                .encrypt(&nonce, data.as_ref())
                .map_err(|_| PipelineError::temp_store("encryption failed"))?;
            data.zeroize();
            (sealed, Some(nonce.into()))
        } else {
            (data, None)
        };

        let entry = StoredEntry {
            data: stored,
            nonce,
            created_at: now,
            expires_at: now + Duration::milliseconds(ttl_ms as i64),
            ttl_ms,
            encrypted: options.encrypt,
            category: options.category,
            correlation_id: options.correlation_id,
        };

        let mut entries = self.entries.write();
        if let Some(mut previous) = entries.insert(key.to_string(), entry) {
            previous.wipe();
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PipelineError> {
        self.ensure_open()?;
        if self.sweep_if_expired(key) {
            return Ok(None);
        }

        let entries = self.entries.read();
        let Some(entry) = entries.get(key) else {
            return Ok(None);
        };
        if entry.is_expired(Utc::now()) {
            return Ok(None);
        }

        if entry.encrypted {
            let nonce_bytes = entry
                .nonce
                .ok_or_else(|| PipelineError::temp_store("encrypted entry without nonce"))?;
            let plain = self
                .cipher
                .decrypt(Nonce::from_slice(&nonce_bytes), entry.data.as_ref())
                .map_err(|_| PipelineError::temp_store("decryption failed"))?;
            Ok(Some(plain))
        } else {
            Ok(Some(entry.data.clone()))
        }
    }

    async fn get_metadata(&self, key: &str) -> Result<Option<TempEntryMetadata>, PipelineError> {
        self.ensure_open()?;
        if self.sweep_if_expired(key) {
            return Ok(None);
        }

        let entries = self.entries.read();
        Ok(entries.get(key).map(|entry| TempEntryMetadata {
            key: key.to_string(),
            size_bytes: entry.data.len(),
            created_at: entry.created_at,
            expires_at: entry.expires_at,
            ttl_ms: entry.ttl_ms,
            encrypted: entry.encrypted,
            category: entry.category.clone(),
            correlation_id: entry.correlation_id.clone(),
        }))
    }

    async fn has(&self, key: &str) -> Result<bool, PipelineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(false);
        }
        if self.sweep_if_expired(key) {
            return Ok(false);
        }
        Ok(self.entries.read().contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<bool, PipelineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(false);
        }
        Ok(self.entries.write().remove(key).is_some())
    }

    async fn secure_delete(&self, key: &str) -> Result<bool, PipelineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let mut entries = self.entries.write();
        match entries.remove(key) {
            Some(mut entry) => {
                entry.wipe();
                self.secure_deletes.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> Result<i64, PipelineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(-1);
        }
        if self.sweep_if_expired(key) {
            return Ok(-1);
        }
        let entries = self.entries.read();
        match entries.get(key) {
            Some(entry) => {
                let remaining = (entry.expires_at - Utc::now()).num_milliseconds();
                Ok(remaining.max(0))
            }
            None => Ok(-1),
        }
    }

    async fn extend_ttl(&self, key: &str, additional_ms: u64) -> Result<bool, PipelineError> {
        self.ensure_open()?;
        if self.sweep_if_expired(key) {
            return Ok(false);
        }
        let mut entries = self.entries.write();
        match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = entry.expires_at + Duration::milliseconds(additional_ms as i64);
                entry.ttl_ms += additional_ms;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn cleanup(&self) -> Result<usize, PipelineError> {
        let now = Utc::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            if let Some(mut entry) = entries.remove(key) {
                entry.wipe();
            }
        }
        let swept = before - entries.len();
        self.expired_swept.fetch_add(swept as u64, Ordering::SeqCst);
        Ok(swept)
    }

    async fn stats(&self) -> Result<TempStoreStats, PipelineError> {
        let entries = self.entries.read();
        Ok(TempStoreStats {
            entries: entries.len(),
            total_bytes: entries.values().map(|e| e.data.len()).sum(),
            expired_swept: self.expired_swept.load(Ordering::SeqCst),
            secure_deletes: self.secure_deletes.load(Ordering::SeqCst),
        })
    }

    async fn close(&self) -> Result<(), PipelineError> {
        self.closed.store(true, Ordering::SeqCst);
        let mut entries = self.entries.write();
        for (_, entry) in entries.iter_mut() {
            entry.wipe();
        }
        entries.clear();
        Ok(())
    }
}
