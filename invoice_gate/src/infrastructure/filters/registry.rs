// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Filter Registry
//!
//! Process-wide mapping from stable filter id to the filter instance and
//! its default configuration.
//!
//! The registry owns filters for the process lifetime: `on_init` runs at
//! registration, `on_destroy` at shutdown. During a run the registry is
//! read-only; the orchestrator resolves each plan step against it and
//! merges the registered default config under the step's config.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use invoice_gate_domain::services::filter::{Filter, FilterConfig};
use invoice_gate_domain::value_objects::FilterId;
use invoice_gate_domain::PipelineError;

/// A registered filter with its default configuration.
#[derive(Clone)]
pub struct RegisteredFilter {
    pub filter: Arc<dyn Filter>,
    pub default_config: FilterConfig,
}

/// Descriptive listing entry.
#[derive(Debug, Clone)]
pub struct FilterInfo {
    pub id: FilterId,
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

/// Process-wide filter registry.
#[derive(Default)]
pub struct FilterRegistry {
    entries: RwLock<HashMap<FilterId, RegisteredFilter>>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a filter under its id, running `on_init`.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidConfiguration` when the id is
    /// already registered, or the filter's own `on_init` error.
    pub fn register(
        &self,
        filter: Arc<dyn Filter>,
        default_config: FilterConfig,
    ) -> Result<(), PipelineError> {
        let id = filter.id().clone();
        {
            let entries = self.entries.read();
            if entries.contains_key(&id) {
                return Err(PipelineError::invalid_config(format!(
                    "Filter id '{}' is already registered",
                    id
                )));
            }
        }

        filter.on_init()?;
        debug!(filter_id = %id, version = filter.version(), "filter registered");

        self.entries.write().insert(
            id,
            RegisteredFilter {
                filter,
                default_config,
            },
        );
        Ok(())
    }

    /// Removes a filter, running `on_destroy`.
    pub fn unregister(&self, id: &FilterId) -> Result<(), PipelineError> {
        let removed = self.entries.write().remove(id);
        match removed {
            Some(entry) => {
                if let Err(e) = entry.filter.on_destroy() {
                    warn!(filter_id = %id, error = %e, "on_destroy failed during unregister");
                }
                Ok(())
            }
            None => Err(PipelineError::FilterNotFound(id.to_string())),
        }
    }

    /// Resolves a filter by id.
    pub fn get(&self, id: &FilterId) -> Option<RegisteredFilter> {
        self.entries.read().get(id).cloned()
    }

    /// Lists registered filters, sorted by id.
    pub fn list(&self) -> Vec<FilterInfo> {
        let entries = self.entries.read();
        let mut infos: Vec<FilterInfo> = entries
            .values()
            .map(|e| FilterInfo {
                id: e.filter.id().clone(),
                name: e.filter.name().to_string(),
                version: e.filter.version().to_string(),
                description: e.filter.description().map(|s| s.to_string()),
                tags: e.filter.tags(),
            })
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    /// The version of a registered filter, if present.
    pub fn version_of(&self, id: &FilterId) -> Option<String> {
        self.entries
            .read()
            .get(id)
            .map(|e| e.filter.version().to_string())
    }

    /// Runs `on_destroy` for every filter and clears the registry.
    pub fn shutdown(&self) {
        let mut entries = self.entries.write();
        for (id, entry) in entries.drain() {
            if let Err(e) = entry.filter.on_destroy() {
                warn!(filter_id = %id, error = %e, "on_destroy failed during shutdown");
            }
        }
    }
}
