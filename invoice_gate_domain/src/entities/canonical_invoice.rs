// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Canonical Invoice Model
//!
//! The normalized EN16931 subset the engine validates against.
//!
//! ## Overview
//!
//! The parser filter produces a `CanonicalInvoice` from the raw submission;
//! downstream filters (amount validation, semantic risk, the live
//! verifiers) read it through the validation context. The model carries
//! only the fields the compliance rules need: header, parties, line items,
//! monetary totals, tax breakdown, allowances and charges, payment terms.
//!
//! ## Amount invariant
//!
//! Every monetary and quantity field is a `DecimalAmount`, serialized as a
//! decimal string. Recomputation happens through the decimal value object
//! with banker's rounding, never through binary floats, so the amounts that
//! were validated are byte-identical to the amounts in the audit record.

use serde::{Deserialize, Serialize};

use crate::value_objects::DecimalAmount;

/// Invoice header fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceHeader {
    pub invoice_number: String,
    /// ISO 8601 calendar date (`2025-06-30`).
    pub issue_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    /// ISO 4217 currency code.
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer_reference: Option<String>,
}

/// Postal address of a trade party.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostalAddress {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    /// ISO 3166-1 alpha-2 country code.
    pub country: String,
}

/// Seller or buyer party.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vat_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_registration_id: Option<String>,
    pub address: PostalAddress,
}

/// One invoice line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub id: String,
    pub description: String,
    pub quantity: DecimalAmount,
    /// UN/ECE Recommendation 20 unit code (`C62`, `HUR`, `KGM`).
    pub unit_code: String,
    pub unit_price: DecimalAmount,
    pub line_net_amount: DecimalAmount,
    /// EN16931 tax category code (`S`, `Z`, `E`, `AE`).
    pub tax_category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_rate: Option<DecimalAmount>,
}

/// Document-level monetary totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonetaryTotals {
    pub line_extension_amount: DecimalAmount,
    pub tax_exclusive_amount: DecimalAmount,
    pub tax_inclusive_amount: DecimalAmount,
    pub payable_amount: DecimalAmount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowance_total_amount: Option<DecimalAmount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge_total_amount: Option<DecimalAmount>,
}

/// One entry of the VAT breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxBreakdownEntry {
    pub category: String,
    pub rate: DecimalAmount,
    pub taxable_amount: DecimalAmount,
    pub tax_amount: DecimalAmount,
}

/// Document-level allowance or charge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowanceCharge {
    /// True for a charge, false for an allowance.
    pub is_charge: bool,
    pub amount: DecimalAmount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub tax_category: String,
}

/// Payment terms.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTerms {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    /// Masked or tokenized account reference; never a raw IBAN.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_reference: Option<String>,
}

/// The normalized EN16931 invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalInvoice {
    pub header: InvoiceHeader,
    pub seller: Party,
    pub buyer: Party,
    pub lines: Vec<LineItem>,
    pub totals: MonetaryTotals,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tax_breakdown: Vec<TaxBreakdownEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowances_charges: Vec<AllowanceCharge>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_terms: Option<PaymentTerms>,
}

impl CanonicalInvoice {
    /// Resolves a dotted path (`header.currency`, `lines.0.unitPrice`,
    /// `seller.vatId`) against the serialized form of the invoice.
    ///
    /// Used by plan step conditions (`field-exists`). Path segments address
    /// object keys in their camelCase wire form; numeric segments index
    /// into arrays.
    pub fn field_exists(&self, dotted_path: &str) -> bool {
        let Ok(root) = serde_json::to_value(self) else {
            return false;
        };
        let mut current = &root;
        for segment in dotted_path.split('.') {
            current = match current {
                serde_json::Value::Object(map) => match map.get(segment) {
                    Some(value) => value,
                    None => return false,
                },
                serde_json::Value::Array(items) => match segment.parse::<usize>().ok().and_then(|i| items.get(i)) {
                    Some(value) => value,
                    None => return false,
                },
                _ => return false,
            };
        }
        !current.is_null()
    }
}

#[cfg(test)]
impl CanonicalInvoice {
    /// Shared fixture for domain unit tests.
    pub(crate) fn sample_for_tests() -> CanonicalInvoice {
        fn amount(s: &str) -> DecimalAmount {
            DecimalAmount::parse(s).unwrap()
        }
        CanonicalInvoice {
            header: InvoiceHeader {
                invoice_number: "RE-2025-0042".to_string(),
                issue_date: "2025-06-30".to_string(),
                due_date: Some("2025-07-30".to_string()),
                currency: "EUR".to_string(),
                buyer_reference: Some("04011000-12345-39".to_string()),
            },
            seller: Party {
                name: "Seller GmbH".to_string(),
                vat_id: Some("DE123456789".to_string()),
                tax_registration_id: None,
                address: PostalAddress {
                    street: Some("Lindenstr. 1".to_string()),
                    city: Some("Berlin".to_string()),
                    postal_code: Some("10969".to_string()),
                    country: "DE".to_string(),
                },
            },
            buyer: Party {
                name: "Buyer AG".to_string(),
                vat_id: Some("DE987654321".to_string()),
                tax_registration_id: None,
                address: PostalAddress {
                    country: "DE".to_string(),
                    ..Default::default()
                },
            },
            lines: vec![LineItem {
                id: "1".to_string(),
                description: "Consulting".to_string(),
                quantity: amount("3"),
                unit_code: "HUR".to_string(),
                unit_price: amount("100.00"),
                line_net_amount: amount("300.00"),
                tax_category: "S".to_string(),
                tax_rate: Some(amount("19")),
            }],
            totals: MonetaryTotals {
                line_extension_amount: amount("300.00"),
                tax_exclusive_amount: amount("300.00"),
                tax_inclusive_amount: amount("357.00"),
                payable_amount: amount("357.00"),
                allowance_total_amount: None,
                charge_total_amount: None,
            },
            tax_breakdown: vec![TaxBreakdownEntry {
                category: "S".to_string(),
                rate: amount("19"),
                taxable_amount: amount("300.00"),
                tax_amount: amount("57.00"),
            }],
            allowances_charges: vec![],
            payment_terms: None,
        }
    }
}
