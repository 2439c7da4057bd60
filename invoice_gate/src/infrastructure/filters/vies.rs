// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # VIES Verifier Filter
//!
//! Live VAT-id verification against the EU VIES service (through the
//! deployment's VIES gateway endpoint).
//!
//! Transport failures and upstream 5xx responses surface as execution
//! errors so the retry harness can classify them; an invalid VAT id is a
//! validation finding on a `ran` step. The filter is wired as soft-fail in
//! the default plan, so a VIES outage degrades the run to
//! ALLOW_WITH_WARNINGS rather than blocking it.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use invoice_gate_domain::entities::{Diagnostic, StepError, StepResult, ValidationContext};
use invoice_gate_domain::services::filter::{Filter, FilterConfig};
use invoice_gate_domain::value_objects::FilterId;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ViesConfig {
    endpoint: String,
    timeout_ms: u64,
}

impl Default for ViesConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://vies.internal/check".to_string(),
            timeout_ms: 8_000,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ViesResponse {
    valid: bool,
}

/// Live VAT-id verifier.
pub struct ViesFilter {
    id: FilterId,
    client: reqwest::Client,
}

impl ViesFilter {
    pub fn new() -> Self {
        Self {
            id: FilterId::new("vies").unwrap_or_else(|_| unreachable!()),
            client: reqwest::Client::new(),
        }
    }

    async fn check_vat(
        &self,
        config: &ViesConfig,
        vat_id: &str,
    ) -> Result<bool, StepError> {
        let (country, number) = vat_id.split_at(2.min(vat_id.len()));
        let response = self
            .client
            .post(&config.endpoint)
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .json(&json!({ "countryCode": country, "vatNumber": number }))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(StepError::new("HTTP_ERROR", "VIES gateway returned an error status")
                .with_status(status));
        }

        let parsed: ViesResponse = response
            .json()
            .await
            .map_err(|_| StepError::new("NETWORK_ERROR", "VIES gateway returned an unreadable body"))?;
        Ok(parsed.valid)
    }
}

impl Default for ViesFilter {
    fn default() -> Self {
        Self::new()
    }
}

fn transport_error(e: reqwest::Error) -> StepError {
    if e.is_timeout() {
        StepError::timeout("VIES request timed out")
    } else if e.is_connect() {
        StepError::new("ECONNREFUSED", "could not connect to the VIES gateway")
    } else {
        StepError::new("NETWORK_ERROR", "VIES request failed")
    }
}

#[async_trait]
impl Filter for ViesFilter {
    fn id(&self) -> &FilterId {
        &self.id
    }

    fn name(&self) -> &str {
        "VIES VAT Verifier"
    }

    fn version(&self) -> &str {
        "1.3.0"
    }

    fn tags(&self) -> Vec<String> {
        vec!["external".to_string()]
    }

    async fn execute(
        &self,
        ctx: &ValidationContext,
        config: &FilterConfig,
    ) -> Result<StepResult, StepError> {
        let typed: ViesConfig = serde_json::from_value(serde_json::Value::Object(config.clone()))
            .map_err(|e| StepError::new("CONFIG_ERROR", format!("invalid config: {}", e)))?;

        let Some(invoice) = ctx.parsed_invoice() else {
            return Ok(StepResult::skipped(self.id.clone())
                .with_metadata_value("skipReason", json!("no_parsed_invoice")));
        };

        let mut diagnostics = Vec::new();
        let mut checked = 0usize;
        for (role, vat_id) in [
            ("seller", invoice.seller.vat_id.as_deref()),
            ("buyer", invoice.buyer.vat_id.as_deref()),
        ] {
            let Some(vat_id) = vat_id else { continue };
            checked += 1;
            if !self.check_vat(&typed, vat_id).await? {
                diagnostics.push(Diagnostic::error(
                    "VIES-INVALID-VAT",
                    "business-rule",
                    self.id.clone(),
                    format!("The {} VAT id is not registered in VIES", role),
                ));
            }
        }

        Ok(StepResult::ran(self.id.clone())
            .with_diagnostics(diagnostics)
            .with_metadata_value("checkedVatIds", json!(checked)))
    }
}
