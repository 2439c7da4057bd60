// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Peppol Directory Filter
//!
//! Checks whether the seller is registered in the Peppol directory
//! (through the deployment's directory-proxy endpoint). A missing
//! registration is a warning; directory outages surface as execution
//! errors for the retry harness.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use invoice_gate_domain::entities::{Diagnostic, StepError, StepResult, ValidationContext};
use invoice_gate_domain::services::filter::{Filter, FilterConfig};
use invoice_gate_domain::value_objects::FilterId;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PeppolConfig {
    endpoint: String,
    timeout_ms: u64,
}

impl Default for PeppolConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://directory.internal/peppol/participants".to_string(),
            timeout_ms: 8_000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParticipantResponse {
    registered: bool,
}

/// Peppol participant lookup.
pub struct PeppolFilter {
    id: FilterId,
    client: reqwest::Client,
}

impl PeppolFilter {
    pub fn new() -> Self {
        Self {
            id: FilterId::new("peppol").unwrap_or_else(|_| unreachable!()),
            client: reqwest::Client::new(),
        }
    }
}

impl Default for PeppolFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Filter for PeppolFilter {
    fn id(&self) -> &FilterId {
        &self.id
    }

    fn name(&self) -> &str {
        "Peppol Directory Lookup"
    }

    fn version(&self) -> &str {
        "0.8.1"
    }

    fn tags(&self) -> Vec<String> {
        vec!["external".to_string()]
    }

    async fn execute(
        &self,
        ctx: &ValidationContext,
        config: &FilterConfig,
    ) -> Result<StepResult, StepError> {
        let typed: PeppolConfig = serde_json::from_value(serde_json::Value::Object(config.clone()))
            .map_err(|e| StepError::new("CONFIG_ERROR", format!("invalid config: {}", e)))?;

        let Some(invoice) = ctx.parsed_invoice() else {
            return Ok(StepResult::skipped(self.id.clone())
                .with_metadata_value("skipReason", json!("no_parsed_invoice")));
        };

        let Some(vat_id) = invoice.seller.vat_id.as_deref() else {
            return Ok(StepResult::ran(self.id.clone())
                .with_diagnostics(vec![Diagnostic::warning(
                    "PEPPOL-NO-IDENTIFIER",
                    "business-rule",
                    self.id.clone(),
                    "Seller has no VAT id to resolve against the Peppol directory",
                )]));
        };

        let response = self
            .client
            .get(format!("{}/{}", typed.endpoint.trim_end_matches('/'), vat_id))
            .timeout(std::time::Duration::from_millis(typed.timeout_ms))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    StepError::timeout("Peppol directory request timed out")
                } else {
                    StepError::new("NETWORK_ERROR", "Peppol directory request failed")
                }
            })?;

        let status = response.status().as_u16();
        if status == 404 {
            return Ok(StepResult::ran(self.id.clone()).with_diagnostics(vec![
                Diagnostic::warning(
                    "PEPPOL-NOT-REGISTERED",
                    "business-rule",
                    self.id.clone(),
                    "Seller is not registered in the Peppol directory",
                ),
            ]));
        }
        if !response.status().is_success() {
            return Err(StepError::new(
                "HTTP_ERROR",
                "Peppol directory returned an error status",
            )
            .with_status(status));
        }

        let participant: ParticipantResponse = response.json().await.map_err(|_| {
            StepError::new("NETWORK_ERROR", "Peppol directory returned an unreadable body")
        })?;

        let mut diagnostics = Vec::new();
        if !participant.registered {
            diagnostics.push(Diagnostic::warning(
                "PEPPOL-NOT-REGISTERED",
                "business-rule",
                self.id.clone(),
                "Seller is not registered in the Peppol directory",
            ));
        }

        Ok(StepResult::ran(self.id.clone()).with_diagnostics(diagnostics))
    }
}
