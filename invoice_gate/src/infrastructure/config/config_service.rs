// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Configuration Service
//!
//! Layered effective configuration: system defaults, then the tenant TOML
//! overlay, then per-request overrides.
//!
//! Per-request overrides are deliberately narrow (locale, whole-run
//! timeout, free-form metadata); everything execution-relevant is pinned
//! by the system/tenant layers so two requests against the same tenant
//! always hash to the same `config_snapshot_hash` unless they override one
//! of those three fields.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use invoice_gate_domain::entities::ValidationOptions;
use invoice_gate_domain::services::canonical_json::canonical_hash;
use invoice_gate_domain::value_objects::AuditHash;
use invoice_gate_domain::PipelineError;

/// System-level configuration, overridable by the tenant file and the
/// `INVOICE_GATE_*` environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct SystemConfig {
    pub max_parallelism: usize,
    pub default_filter_timeout_ms: u64,
    pub strict_mode: bool,
    pub retry_on_error: bool,
    pub max_retries: u32,
    pub locale: String,
    pub tenant_id: Option<String>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            max_parallelism: 5,
            default_filter_timeout_ms: 10_000,
            strict_mode: false,
            retry_on_error: true,
            max_retries: 2,
            locale: "en".to_string(),
            tenant_id: None,
        }
    }
}

/// The per-run effective configuration, hashed into the plan snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveConfig {
    pub system: SystemConfig,
    pub locale: String,
    pub timeout_ms: Option<u64>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl EffectiveConfig {
    /// Canonical hash of the effective configuration.
    pub fn snapshot_hash(&self) -> Result<AuditHash, PipelineError> {
        canonical_hash(self)
    }
}

/// Builds effective configurations from the layered sources.
pub struct ConfigService {
    system: SystemConfig,
}

impl ConfigService {
    /// System defaults only.
    pub fn from_defaults() -> Self {
        Self {
            system: SystemConfig::default(),
        }
    }

    /// Wraps an already-resolved system configuration.
    pub fn with_system(system: SystemConfig) -> Self {
        Self { system }
    }

    /// Loads defaults, the optional tenant TOML overlay, and the
    /// `INVOICE_GATE_*` environment, in that precedence order.
    pub fn load(tenant_file: Option<&Path>) -> Result<Self, PipelineError> {
        let mut builder = config::Config::builder().add_source(
            config::Config::try_from(&SystemConfig::default())
                .map_err(|e| PipelineError::invalid_config(format!("defaults failed: {}", e)))?,
        );

        if let Some(path) = tenant_file {
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Toml));
        }
        builder = builder.add_source(config::Environment::with_prefix("INVOICE_GATE"));

        let system: SystemConfig = builder
            .build()
            .map_err(|e| PipelineError::invalid_config(format!("config load failed: {}", e)))?
            .try_deserialize()
            .map_err(|e| PipelineError::invalid_config(format!("config parse failed: {}", e)))?;

        info!(
            tenant = system.tenant_id.as_deref().unwrap_or("default"),
            max_parallelism = system.max_parallelism,
            "configuration loaded"
        );
        Ok(Self { system })
    }

    pub fn system(&self) -> &SystemConfig {
        &self.system
    }

    /// Applies the per-request overrides on top of the resolved system
    /// configuration.
    pub fn effective(&self, options: &ValidationOptions) -> EffectiveConfig {
        EffectiveConfig {
            system: self.system.clone(),
            locale: options
                .locale
                .clone()
                .unwrap_or_else(|| self.system.locale.clone()),
            timeout_ms: options.timeout_ms,
            metadata: options.metadata.clone(),
        }
    }
}
