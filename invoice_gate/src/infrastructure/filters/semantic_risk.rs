// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Semantic Risk Filter
//!
//! Heuristic risk scoring over the parsed invoice.
//!
//! The filter emits a numeric `score` (0 = unremarkable, 100 = certainly
//! problematic) into its step metadata; the policy gate compares it
//! against the configured warn/block thresholds. Sellers on the configured
//! block list additionally produce a hard-block marker diagnostic
//! (`hardBlock: true` in the diagnostic context), which the gate treats as
//! an unconditional compliance block regardless of severity demotion.

use async_trait::async_trait;
use serde_json::json;

use invoice_gate_domain::entities::{
    CanonicalInvoice, Diagnostic, DiagnosticSeverity, StepError, StepResult, ValidationContext,
};
use invoice_gate_domain::services::filter::{Filter, FilterConfig};
use invoice_gate_domain::value_objects::{DecimalAmount, FilterId};

/// Heuristic risk scoring.
pub struct SemanticRiskFilter {
    id: FilterId,
}

impl SemanticRiskFilter {
    pub fn new() -> Self {
        Self {
            id: FilterId::new("semantic-risk").unwrap_or_else(|_| unreachable!()),
        }
    }

    fn blocked_sellers(config: &FilterConfig) -> Vec<String> {
        config
            .get("blockedSellers")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn amount_warn_threshold(config: &FilterConfig) -> Option<DecimalAmount> {
        config
            .get("warnAmountThreshold")
            .and_then(|v| v.as_str())
            .and_then(|s| DecimalAmount::parse(s).ok())
    }

    fn assess(
        &self,
        invoice: &CanonicalInvoice,
        config: &FilterConfig,
    ) -> (u32, Vec<Diagnostic>) {
        let mut score: u32 = 0;
        let mut diagnostics = Vec::new();

        if let Some(threshold) = Self::amount_warn_threshold(config) {
            if invoice.totals.payable_amount > threshold {
                score += 40;
                diagnostics.push(Diagnostic::new(
                    "RISK-AMOUNT",
                    DiagnosticSeverity::Info,
                    "business-rule",
                    self.id.clone(),
                    "Payable amount exceeds the configured review threshold",
                ));
            }
        }

        if invoice.totals.payable_amount.is_negative() {
            score += 20;
            diagnostics.push(Diagnostic::new(
                "RISK-NEGATIVE-TOTAL",
                DiagnosticSeverity::Info,
                "business-rule",
                self.id.clone(),
                "Payable amount is negative",
            ));
        }

        if let Some(due) = &invoice.header.due_date {
            if due < &invoice.header.issue_date {
                score += 30;
                diagnostics.push(Diagnostic::new(
                    "RISK-DUE-BEFORE-ISSUE",
                    DiagnosticSeverity::Info,
                    "business-rule",
                    self.id.clone(),
                    "Due date precedes the issue date",
                ));
            }
        }

        if let Some(vat_id) = &invoice.seller.vat_id {
            if Self::blocked_sellers(config).iter().any(|b| b == vat_id) {
                score = 100;
                let mut context = serde_json::Map::new();
                context.insert("hardBlock".to_string(), json!(true));
                diagnostics.push(
                    Diagnostic::error(
                        "RISK-BLOCKED-SELLER",
                        "compliance",
                        self.id.clone(),
                        "Seller is on the tenant block list",
                    )
                    .with_context(context),
                );
            }
        }

        (score.min(100), diagnostics)
    }
}

impl Default for SemanticRiskFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Filter for SemanticRiskFilter {
    fn id(&self) -> &FilterId {
        &self.id
    }

    fn name(&self) -> &str {
        "Semantic Risk Scoring"
    }

    fn version(&self) -> &str {
        "0.9.0"
    }

    fn tags(&self) -> Vec<String> {
        vec!["business-rule".to_string(), "risk".to_string()]
    }

    async fn execute(
        &self,
        ctx: &ValidationContext,
        config: &FilterConfig,
    ) -> Result<StepResult, StepError> {
        let Some(invoice) = ctx.parsed_invoice() else {
            return Ok(StepResult::skipped(self.id.clone())
                .with_metadata_value("skipReason", json!("no_parsed_invoice")));
        };

        let (score, diagnostics) = self.assess(invoice, config);
        Ok(StepResult::ran(self.id.clone())
            .with_diagnostics(diagnostics)
            .with_metadata_value("score", json!(score)))
    }
}
