// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Plan Snapshot Value Object
//!
//! A canonical, hashed record of the plan, effective configuration, and
//! engine/filter versions that were in force for a run. The snapshot is the
//! reproducibility anchor of the audit trail: two runs with identical
//! snapshots executed the same plan under the same configuration with the
//! same code versions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::entities::execution_plan::ExecutionPlan;
use crate::services::canonical_json::canonical_hash;
use crate::PipelineError;

use super::audit_hash::AuditHash;

/// Immutable record of everything that determined a run's behavior.
///
/// `plan_hash` covers the step tree, the engine and filter versions, and the
/// effective-config snapshot hash, all over canonical JSON, so semantically
/// equal reconstructions always produce the same hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSnapshot {
    pub plan_id: String,
    pub plan_version: String,
    pub plan_hash: AuditHash,
    pub config_hash: AuditHash,
    pub config_snapshot_hash: AuditHash,
    /// Versions of the engine components, keyed by component name.
    pub engine_versions: BTreeMap<String, String>,
    /// Versions of every registered filter referenced by the plan.
    pub filter_versions: BTreeMap<String, String>,
    /// Canonical hash of each step's effective configuration.
    pub step_config_hashes: BTreeMap<String, AuditHash>,
    pub captured_at: DateTime<Utc>,
}

impl PlanSnapshot {
    /// Captures a snapshot of `plan` with the given version maps and
    /// effective-config hash.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::SerializationError` if the plan cannot be
    /// canonicalized (which would indicate a non-serializable config value).
    pub fn capture(
        plan: &ExecutionPlan,
        engine_versions: BTreeMap<String, String>,
        filter_versions: BTreeMap<String, String>,
        config_snapshot_hash: AuditHash,
    ) -> Result<Self, PipelineError> {
        let mut step_config_hashes = BTreeMap::new();
        for step in plan.iter_steps() {
            step_config_hashes.insert(
                step.filter_id.to_string(),
                canonical_hash(&step.config)?,
            );
        }

        let plan_hash = canonical_hash(&serde_json::json!({
            "steps": plan.steps(),
            "engineVersions": engine_versions,
            "filterVersions": filter_versions,
            "configSnapshotHash": config_snapshot_hash,
        }))?;

        Ok(Self {
            plan_id: plan.id().to_string(),
            plan_version: plan.version().to_string(),
            plan_hash,
            config_hash: plan.config_hash().clone(),
            config_snapshot_hash,
            engine_versions,
            filter_versions,
            step_config_hashes,
            captured_at: Utc::now(),
        })
    }
}
