// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Parser Filter
//!
//! Decodes raw submissions into the canonical invoice model.
//!
//! JSON submissions are decoded directly; amount fields are validated as
//! decimal strings by the model itself during deserialization. XML and PDF
//! submissions are the domain of the external schema runner and extraction
//! collaborators, so the filter marks them `requiresExternalParser` with an
//! info diagnostic instead of failing the run.
//!
//! The parsed invoice is written to the temp store under
//! `parsed-invoice:{run_id}` (encrypted, same TTL discipline as the raw
//! entry) and handed to the orchestrator through step metadata; the
//! orchestrator attaches it to the context and tracks the key for
//! guaranteed cleanup.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use invoice_gate_domain::entities::{
    CanonicalInvoice, Diagnostic, StepError, StepResult, ValidationContext,
};
use invoice_gate_domain::services::filter::{Filter, FilterConfig};
use invoice_gate_domain::services::temp_store::{SetOptions, TempStore, DEFAULT_RAW_INVOICE_TTL_MS};
use invoice_gate_domain::value_objects::{ContentType, FilterId, TempKey};

const DEFAULT_MAX_SIZE_BYTES: u64 = 10 * 1024 * 1024;

/// Canonical-invoice decoding filter.
pub struct ParserFilter {
    id: FilterId,
    temp_store: Arc<dyn TempStore>,
}

impl ParserFilter {
    /// Creates the filter under its canonical id `parser`.
    pub fn new(temp_store: Arc<dyn TempStore>) -> Self {
        Self {
            // The id literal is valid by construction.
            id: FilterId::new("parser").unwrap_or_else(|_| unreachable!()),
            temp_store,
        }
    }

    /// Creates the filter under an alias id (`steps-parser`).
    pub fn with_id(temp_store: Arc<dyn TempStore>, id: FilterId) -> Self {
        Self { id, temp_store }
    }

    fn max_size(config: &FilterConfig) -> u64 {
        config
            .get("maxSizeBytes")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_MAX_SIZE_BYTES)
    }
}

#[async_trait]
impl Filter for ParserFilter {
    fn id(&self) -> &FilterId {
        &self.id
    }

    fn name(&self) -> &str {
        "Canonical Invoice Parser"
    }

    fn version(&self) -> &str {
        "1.2.0"
    }

    fn description(&self) -> Option<&str> {
        Some("Decodes raw submissions into the canonical EN16931 invoice model")
    }

    fn tags(&self) -> Vec<String> {
        vec!["schema".to_string()]
    }

    async fn execute(
        &self,
        ctx: &ValidationContext,
        config: &FilterConfig,
    ) -> Result<StepResult, StepError> {
        let raw_key = ctx.raw_invoice().temp_key.as_str();
        let bytes = self
            .temp_store
            .get(raw_key)
            .await
            .map_err(StepError::from)?
            .ok_or_else(|| {
                StepError::new("TEMP_STORE_MISS", "raw invoice entry is missing or expired")
            })?;

        if bytes.len() as u64 > Self::max_size(config) {
            return Ok(StepResult::ran(self.id.clone())
                .with_diagnostics(vec![Diagnostic::error(
                    "PARSE-SIZE",
                    "schema",
                    self.id.clone(),
                    "Submission exceeds the configured size limit",
                )])
                .with_metadata_value("errorKind", json!("schema")));
        }

        match ctx.raw_invoice().content_type {
            ContentType::Json => match serde_json::from_slice::<CanonicalInvoice>(&bytes) {
                Ok(invoice) => {
                    let parsed_key = TempKey::for_run("parsed-invoice", ctx.run_id());
                    let payload = serde_json::to_vec(&invoice)
                        .map_err(|e| StepError::new("SERIALIZATION_ERROR", e.to_string()))?;
                    self.temp_store
                        .set(
                            parsed_key.as_str(),
                            payload,
                            SetOptions::new("parsed-invoice")
                                .with_ttl_ms(DEFAULT_RAW_INVOICE_TTL_MS)
                                .encrypted(),
                        )
                        .await
                        .map_err(StepError::from)?;

                    let invoice_value = serde_json::to_value(&invoice)
                        .map_err(|e| StepError::new("SERIALIZATION_ERROR", e.to_string()))?;

                    Ok(StepResult::ran(self.id.clone())
                        .with_metadata_value("parsedInvoice", invoice_value)
                        .with_metadata_value("tempKeys", json!([parsed_key.as_str()])))
                }
                Err(e) => Ok(StepResult::ran(self.id.clone())
                    .with_diagnostics(vec![Diagnostic::error(
                        "PARSE-STRUCTURE",
                        "schema",
                        self.id.clone(),
                        format!("Submission does not match the canonical invoice model: {}", e),
                    )])
                    .with_metadata_value("errorKind", json!("schema"))),
            },
            ContentType::Xml | ContentType::Pdf => Ok(StepResult::ran(self.id.clone())
                .with_diagnostics(vec![Diagnostic::info(
                    "PARSER-EXTERNAL",
                    "schema",
                    self.id.clone(),
                    "Submission format is handled by the external schema runner",
                )])
                .with_metadata_value("requiresExternalParser", json!(true))),
        }
    }
}
