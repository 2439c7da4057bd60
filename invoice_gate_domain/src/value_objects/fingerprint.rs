// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Compliance Fingerprint Value Object
//!
//! The cryptographic summary of a completed run, suitable for audit
//! retention after all ephemeral invoice data has been deleted.
//!
//! The fingerprint id has the shape `FL-{base36 epoch ms}-{6 base36 random
//! chars}` and the digest covers the run id, outcome, per-check statuses,
//! the masked invoice summary, and the plan's config hash, all over
//! canonical JSON.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::services::canonical_json::canonical_hash;
use crate::PipelineError;

use super::audit_hash::AuditHash;
use super::run_id::RunId;

/// Outcome of an individual named check inside the fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    Verified,
    /// Verified against a live external source (VIES, ECB, Peppol).
    VerifiedLive,
    Failed,
    Skipped,
    Unverified,
}

/// Overall fingerprint status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FingerprintStatus {
    Approved,
    Rejected,
    Incomplete,
}

/// Reference to the plan a fingerprint was produced under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FingerprintPlanRef {
    pub id: String,
    pub version: String,
    pub config_hash: AuditHash,
}

/// The signed audit summary of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceFingerprint {
    /// `FL-{base36 timestamp}-{6 base36 random}`.
    pub id: String,
    pub status: FingerprintStatus,
    /// 0..=100; starts at 100 and decreases with findings.
    pub score: u32,
    pub timestamp: DateTime<Utc>,
    pub checks: BTreeMap<String, CheckStatus>,
    pub risk_notes: Vec<String>,
    pub fingerprint: AuditHash,
    pub execution_plan: FingerprintPlanRef,
    pub filter_versions: BTreeMap<String, String>,
    pub duration_ms: u64,
}

impl ComplianceFingerprint {
    /// Builds a fingerprint, computing the id and digest.
    ///
    /// The `invoice_summary` must already be masked; it is hashed, not
    /// stored, so nothing sensitive can enter the audit record through it.
    #[allow(clippy::too_many_arguments)]
    pub fn seal(
        run_id: &RunId,
        status: FingerprintStatus,
        score: u32,
        checks: BTreeMap<String, CheckStatus>,
        risk_notes: Vec<String>,
        invoice_summary: &serde_json::Value,
        execution_plan: FingerprintPlanRef,
        filter_versions: BTreeMap<String, String>,
        duration_ms: u64,
    ) -> Result<Self, PipelineError> {
        let timestamp = Utc::now();
        let digest = canonical_hash(&serde_json::json!({
            "runId": run_id,
            "status": status,
            "score": score,
            "checks": checks,
            "invoiceSummary": invoice_summary,
            "planConfigHash": execution_plan.config_hash,
            "timestamp": timestamp.timestamp_millis(),
        }))?;

        Ok(Self {
            id: generate_fingerprint_id(timestamp),
            status,
            score: score.min(100),
            timestamp,
            checks,
            risk_notes,
            fingerprint: digest,
            execution_plan,
            filter_versions,
            duration_ms,
        })
    }
}

/// Generates a fingerprint id: `FL-{base36 epoch ms}-{6 base36 chars}`.
fn generate_fingerprint_id(timestamp: DateTime<Utc>) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..6)
        .map(|_| {
            let idx = rng.random_range(0..36u32);
            std::char::from_digit(idx, 36).unwrap_or('0')
        })
        .collect();
    format!(
        "FL-{}-{}",
        base36_encode(timestamp.timestamp_millis().max(0) as u128),
        suffix
    )
}

fn base36_encode(mut value: u128) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        let digit = (value % 36) as u32;
        digits.push(std::char::from_digit(digit, 36).unwrap_or('0'));
        value /= 36;
    }
    digits.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    fn seal_sample() -> ComplianceFingerprint {
        ComplianceFingerprint::seal(
            &RunId::new(),
            FingerprintStatus::Approved,
            100,
            BTreeMap::from([("kosit".to_string(), CheckStatus::Verified)]),
            vec![],
            &serde_json::json!({"lineCount": 2, "currency": "EUR"}),
            FingerprintPlanRef {
                id: "default".to_string(),
                version: "1.0.0".to_string(),
                config_hash: canonical_hash(&serde_json::json!({})).unwrap(),
            },
            BTreeMap::new(),
            1200,
        )
        .unwrap()
    }

    #[test]
    fn test_fingerprint_id_format() {
        let fingerprint = seal_sample();
        let re = Regex::new(r"^FL-[0-9a-z]+-[0-9a-z]{6}$").unwrap();
        assert!(re.is_match(&fingerprint.id), "unexpected id: {}", fingerprint.id);
    }

    #[test]
    fn test_fingerprint_digest_format() {
        let fingerprint = seal_sample();
        assert!(fingerprint.fingerprint.as_str().starts_with("sha256:"));
        assert_eq!(fingerprint.fingerprint.hex().len(), 64);
    }

    #[test]
    fn test_score_is_capped() {
        let mut fingerprint = seal_sample();
        fingerprint.score = 100;
        let resealed = ComplianceFingerprint::seal(
            &RunId::new(),
            FingerprintStatus::Approved,
            250,
            BTreeMap::new(),
            vec![],
            &serde_json::json!({}),
            fingerprint.execution_plan.clone(),
            BTreeMap::new(),
            0,
        )
        .unwrap();
        assert_eq!(resealed.score, 100);
    }

    #[test]
    fn test_base36_encoding() {
        assert_eq!(base36_encode(0), "0");
        assert_eq!(base36_encode(35), "z");
        assert_eq!(base36_encode(36), "10");
    }

    #[test]
    fn test_check_status_serialization() {
        assert_eq!(
            serde_json::to_string(&CheckStatus::VerifiedLive).unwrap(),
            "\"VERIFIED_LIVE\""
        );
    }
}
