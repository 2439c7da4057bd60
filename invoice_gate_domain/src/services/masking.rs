// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # PII Masking and Diagnostic Sanitization
//!
//! One-way masking of identifying invoice values and sanitization of free
//! text before it reaches a diagnostic, a report, a warning, or a persisted
//! job row.
//!
//! ## Masking rules
//!
//! - VAT ids and invoice numbers: first two characters + `***` + last two;
//!   values of four characters or fewer become `****`
//! - Free text: XML elements with content, email addresses, IBANs, EU VAT
//!   ids, and phone numbers are replaced by fixed placeholders
//!
//! The patterns are compiled once at startup. If a pattern fails to compile
//! the fallback matches nothing rather than panicking; the sanitizer then
//! simply passes that class of text through, which the redline tests catch.

use once_cell::sync::Lazy;
use regex::Regex;

fn compiled(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|_| {
        Regex::new(r"[^\s\S]").unwrap_or_else(|_| unreachable!("empty pattern always compiles"))
    })
}

static XML_ELEMENT_REGEX: Lazy<Regex> =
    Lazy::new(|| compiled(r"<([A-Za-z][A-Za-z0-9:._-]*)(\s[^<>]*)?>[^<>]*</([A-Za-z][A-Za-z0-9:._-]*)>"));

static EMAIL_REGEX: Lazy<Regex> =
    Lazy::new(|| compiled(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b"));

static IBAN_REGEX: Lazy<Regex> =
    Lazy::new(|| compiled(r"\b[A-Z]{2}\d{2}[A-Z0-9]{11,30}\b"));

// Requires a 5+ digit run after the country prefix: long enough to catch
// every EU VAT number shape while leaving ordinary words ("DELETE",
// "ITEM") and already-masked ids (`DE***89`) alone.
static EU_VAT_REGEX: Lazy<Regex> = Lazy::new(|| {
    compiled(
        r"\b(?:AT|BE|BG|HR|CY|CZ|DK|EE|FI|FR|DE|EL|HU|IE|IT|LV|LT|LU|MT|NL|PL|PT|RO|SK|SI|ES|SE|XI)[A-Za-z]{0,2}\d{5,10}[0-9A-Za-z]{0,3}\b",
    )
});

// The national-format alternative requires a separator between area code
// and number; bare digit runs are indistinguishable from ids and
// timestamps and must not be rewritten.
static PHONE_REGEX: Lazy<Regex> =
    Lazy::new(|| compiled(r"(?:\+|00)\d[\d\s/()-]{6,18}\d|\b0\d{2,4}[\s/-]\d{4,10}\b"));

/// Masks an identifier to `first two + *** + last two`.
///
/// Values of four characters or fewer are fully masked to `****` since
/// keeping any character would reveal half the value.
pub fn mask_identifier(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}***{}", head, tail)
}

/// Masks a VAT id for the invoice summary.
pub fn mask_vat_id(vat_id: &str) -> String {
    mask_identifier(vat_id)
}

/// Masks an invoice number for the invoice summary.
pub fn mask_invoice_number(number: &str) -> String {
    mask_identifier(number)
}

/// Sanitizes free text for storage in diagnostics, warnings, and summaries.
///
/// XML elements are stripped first so their character content never reaches
/// the later passes; identifiers matched by the remaining patterns are
/// replaced by fixed placeholders.
pub fn sanitize_text(text: &str) -> String {
    let mut sanitized = XML_ELEMENT_REGEX.replace_all(text, "[xml]").to_string();
    sanitized = EMAIL_REGEX.replace_all(&sanitized, "[email]").to_string();
    sanitized = IBAN_REGEX.replace_all(&sanitized, "[iban]").to_string();
    sanitized = EU_VAT_REGEX.replace_all(&sanitized, "[vat-id]").to_string();
    sanitized = PHONE_REGEX.replace_all(&sanitized, "[phone]").to_string();
    sanitized
}

/// True when the text still matches one of the PII patterns.
///
/// Used by the redline tests and by debug assertions around persistence
/// boundaries.
pub fn contains_pii(text: &str) -> bool {
    XML_ELEMENT_REGEX.is_match(text)
        || EMAIL_REGEX.is_match(text)
        || IBAN_REGEX.is_match(text)
        || EU_VAT_REGEX.is_match(text)
        || PHONE_REGEX.is_match(text)
}
