// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Amount Validation Filter
//!
//! Recomputes line extensions, totals, and the VAT breakdown with decimal
//! arithmetic and reports EN16931 calculation-rule violations.
//!
//! All comparison happens at scale 2 with banker's rounding; the invoice's
//! own amount strings are never mutated. Mismatches are findings, not
//! execution errors: the step always `ran`, and the decision layer decides
//! what a BR-CO violation means for the run.

use async_trait::async_trait;

use invoice_gate_domain::entities::{
    CanonicalInvoice, Diagnostic, StepError, StepResult, ValidationContext,
};
use invoice_gate_domain::services::filter::{Filter, FilterConfig};
use invoice_gate_domain::value_objects::{DecimalAmount, FilterId};

/// Decimal recomputation of invoice totals.
pub struct AmountValidationFilter {
    id: FilterId,
}

impl AmountValidationFilter {
    pub fn new() -> Self {
        Self {
            id: FilterId::new("steps-amount-validation").unwrap_or_else(|_| unreachable!()),
        }
    }

    fn check(&self, invoice: &CanonicalInvoice) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let scale = 2;

        // BR-CO-10: sum of line net amounts equals the line extension total
        let mut line_sum = DecimalAmount::zero();
        for line in &invoice.lines {
            line_sum = line_sum.add(&line.line_net_amount);

            // Per-line: quantity x unit price must reproduce the net amount
            let expected = line.quantity.mul(&line.unit_price).round(scale);
            if expected != line.line_net_amount.round(scale) {
                diagnostics.push(
                    Diagnostic::error(
                        "BR-DE-LINE-NET",
                        "business-rule",
                        self.id.clone(),
                        format!(
                            "Line {} net amount does not equal quantity times unit price",
                            line.id
                        ),
                    )
                    .with_location(format!("lines.{}.lineNetAmount", line.id)),
                );
            }
        }
        if line_sum.round(scale) != invoice.totals.line_extension_amount.round(scale) {
            diagnostics.push(Diagnostic::error(
                "BR-CO-10",
                "business-rule",
                self.id.clone(),
                "Sum of line net amounts does not equal the line extension amount",
            ));
        }

        // BR-CO-13: tax exclusive = line extension - allowances + charges
        let mut expected_exclusive = invoice.totals.line_extension_amount.clone();
        for entry in &invoice.allowances_charges {
            if entry.is_charge {
                expected_exclusive = expected_exclusive.add(&entry.amount);
            } else {
                expected_exclusive = expected_exclusive.sub(&entry.amount);
            }
        }
        if expected_exclusive.round(scale) != invoice.totals.tax_exclusive_amount.round(scale) {
            diagnostics.push(Diagnostic::error(
                "BR-CO-13",
                "business-rule",
                self.id.clone(),
                "Tax exclusive amount does not match line extension adjusted by allowances and charges",
            ));
        }

        // BR-CO-17: each breakdown entry's tax = taxable x rate / 100
        let mut tax_sum = DecimalAmount::zero();
        let percent = DecimalAmount::parse("0.01").unwrap_or_else(|_| DecimalAmount::zero());
        for entry in &invoice.tax_breakdown {
            tax_sum = tax_sum.add(&entry.tax_amount);
            let expected_tax = entry.taxable_amount.mul(&entry.rate).mul(&percent).round(scale);
            if expected_tax != entry.tax_amount.round(scale) {
                diagnostics.push(Diagnostic::error(
                    "BR-CO-17",
                    "business-rule",
                    self.id.clone(),
                    format!(
                        "VAT amount for category {} does not equal taxable amount times rate",
                        entry.category
                    ),
                ));
            }
        }

        // BR-CO-15: tax inclusive = tax exclusive + total VAT
        let expected_inclusive = invoice.totals.tax_exclusive_amount.add(&tax_sum);
        if expected_inclusive.round(scale) != invoice.totals.tax_inclusive_amount.round(scale) {
            diagnostics.push(Diagnostic::error(
                "BR-CO-15",
                "business-rule",
                self.id.clone(),
                "Tax inclusive amount does not equal tax exclusive amount plus VAT",
            ));
        }

        diagnostics
    }
}

impl Default for AmountValidationFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Filter for AmountValidationFilter {
    fn id(&self) -> &FilterId {
        &self.id
    }

    fn name(&self) -> &str {
        "Amount Validation"
    }

    fn version(&self) -> &str {
        "1.1.0"
    }

    fn description(&self) -> Option<&str> {
        Some("Recomputes totals and VAT breakdown with banker's rounding")
    }

    fn tags(&self) -> Vec<String> {
        vec!["business-rule".to_string()]
    }

    async fn execute(
        &self,
        ctx: &ValidationContext,
        _config: &FilterConfig,
    ) -> Result<StepResult, StepError> {
        let Some(invoice) = ctx.parsed_invoice() else {
            return Ok(StepResult::skipped(self.id.clone())
                .with_metadata_value("skipReason", serde_json::json!("no_parsed_invoice")));
        };

        let diagnostics = self.check(invoice);
        Ok(StepResult::ran(self.id.clone()).with_diagnostics(diagnostics))
    }
}
