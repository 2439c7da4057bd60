// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # ECB Rates Filter
//!
//! Verifies that non-EUR invoice currencies have a published ECB
//! reference rate (through the deployment's rate-cache endpoint). EUR
//! invoices pass trivially; an unknown currency is a finding, not an
//! execution error.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

use invoice_gate_domain::entities::{Diagnostic, StepError, StepResult, ValidationContext};
use invoice_gate_domain::services::filter::{Filter, FilterConfig};
use invoice_gate_domain::value_objects::FilterId;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct EcbConfig {
    endpoint: String,
    timeout_ms: u64,
}

impl Default for EcbConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://rates.internal/ecb/latest".to_string(),
            timeout_ms: 8_000,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RatesResponse {
    rates: HashMap<String, f64>,
}

/// ECB reference-rate verifier.
pub struct EcbRatesFilter {
    id: FilterId,
    client: reqwest::Client,
}

impl EcbRatesFilter {
    pub fn new() -> Self {
        Self {
            id: FilterId::new("ecb-rates").unwrap_or_else(|_| unreachable!()),
            client: reqwest::Client::new(),
        }
    }
}

impl Default for EcbRatesFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Filter for EcbRatesFilter {
    fn id(&self) -> &FilterId {
        &self.id
    }

    fn name(&self) -> &str {
        "ECB Reference Rates"
    }

    fn version(&self) -> &str {
        "1.0.2"
    }

    fn tags(&self) -> Vec<String> {
        vec!["external".to_string()]
    }

    async fn execute(
        &self,
        ctx: &ValidationContext,
        config: &FilterConfig,
    ) -> Result<StepResult, StepError> {
        let typed: EcbConfig = serde_json::from_value(serde_json::Value::Object(config.clone()))
            .map_err(|e| StepError::new("CONFIG_ERROR", format!("invalid config: {}", e)))?;

        let Some(invoice) = ctx.parsed_invoice() else {
            return Ok(StepResult::skipped(self.id.clone())
                .with_metadata_value("skipReason", json!("no_parsed_invoice")));
        };

        let currency = invoice.header.currency.as_str();
        if currency == "EUR" {
            return Ok(StepResult::ran(self.id.clone())
                .with_metadata_value("currency", json!("EUR")));
        }

        let response = self
            .client
            .get(&typed.endpoint)
            .timeout(std::time::Duration::from_millis(typed.timeout_ms))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    StepError::timeout("ECB rate request timed out")
                } else {
                    StepError::new("NETWORK_ERROR", "ECB rate request failed")
                }
            })?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(
                StepError::new("HTTP_ERROR", "ECB rate endpoint returned an error status")
                    .with_status(status),
            );
        }

        let rates: RatesResponse = response.json().await.map_err(|_| {
            StepError::new("NETWORK_ERROR", "ECB rate endpoint returned an unreadable body")
        })?;

        let mut diagnostics = Vec::new();
        if !rates.rates.contains_key(currency) {
            diagnostics.push(Diagnostic::warning(
                "ECB-UNKNOWN-CURRENCY",
                "business-rule",
                self.id.clone(),
                "Invoice currency has no published ECB reference rate",
            ));
        }

        Ok(StepResult::ran(self.id.clone())
            .with_diagnostics(diagnostics)
            .with_metadata_value("currency", json!(currency)))
    }
}
