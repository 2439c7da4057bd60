// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Value Objects
//!
//! Immutable, identity-free domain values. Each value object validates its
//! own invariants at construction and exposes side-effect free operations.

pub mod audit_hash;
pub mod decimal_amount;
pub mod filter_id;
pub mod fingerprint;
pub mod plan_snapshot;
pub mod raw_invoice;
pub mod retry_policy;
pub mod run_id;

pub use audit_hash::AuditHash;
pub use decimal_amount::{DecimalAmount, RoundingStrategy};
pub use filter_id::FilterId;
pub use fingerprint::{CheckStatus, ComplianceFingerprint, FingerprintStatus};
pub use plan_snapshot::PlanSnapshot;
pub use raw_invoice::{ContentType, FormatHint, RawInvoice, RawInvoiceRef, TempKey};
pub use retry_policy::{FailurePolicy, RetryConfig};
pub use run_id::RunId;
