// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Execute Validation Use Case
//!
//! The entry point for callers holding raw invoice bytes: stages the bytes
//! into the temp store under the run's key, builds the validation input,
//! and delegates to the orchestrator. From this point on the engine works
//! exclusively with the temp-store handle; the bytes passed in are the
//! last plaintext copy outside the store.

use std::sync::Arc;

use tracing::debug;

use invoice_gate_domain::entities::{ExecutionPlan, ValidationOptions, ValidationReport};
use invoice_gate_domain::services::temp_store::{SetOptions, TempStore, DEFAULT_RAW_INVOICE_TTL_MS};
use invoice_gate_domain::value_objects::{RawInvoice, RawInvoiceRef, RunId, TempKey};
use invoice_gate_domain::PipelineError;

use crate::application::services::{PipelineOrchestrator, ValidationInput};

/// Stages a raw invoice and runs it through the pipeline.
pub struct ExecuteValidation {
    temp_store: Arc<dyn TempStore>,
    orchestrator: Arc<PipelineOrchestrator>,
}

impl ExecuteValidation {
    pub fn new(temp_store: Arc<dyn TempStore>, orchestrator: Arc<PipelineOrchestrator>) -> Self {
        Self {
            temp_store,
            orchestrator,
        }
    }

    /// Stages `raw` under `raw-invoice:{run_id}` and executes the run.
    ///
    /// A correlation id is minted when the caller did not supply one, so
    /// every run is traceable end to end.
    pub async fn execute(
        &self,
        raw: RawInvoice,
        plan: Option<ExecutionPlan>,
        options: ValidationOptions,
        correlation_id: Option<String>,
    ) -> Result<ValidationReport, PipelineError> {
        let correlation_id =
            Some(correlation_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()));
        let run_id = RunId::new();
        let temp_key = TempKey::for_run("raw-invoice", &run_id);
        let size_bytes = raw.content.len() as u64;

        let mut set_options = SetOptions::new("raw-invoice")
            .with_ttl_ms(DEFAULT_RAW_INVOICE_TTL_MS)
            .encrypted();
        if let Some(correlation) = &correlation_id {
            set_options = set_options.with_correlation_id(correlation.clone());
        }

        self.temp_store
            .set(temp_key.as_str(), raw.content, set_options)
            .await?;
        debug!(run_id = %run_id, size_bytes, "raw invoice staged");

        let input = ValidationInput {
            run_id: Some(run_id),
            raw: RawInvoiceRef {
                temp_key,
                content_type: raw.content_type,
                format_hint: raw.format_hint,
                size_bytes,
            },
            plan,
            options,
            correlation_id,
        };

        self.orchestrator.execute(input).await
    }
}
