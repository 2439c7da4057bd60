// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Entities
//!
//! Objects with identity and lifecycle: the execution plan, the per-run
//! validation context, the canonical invoice model, diagnostics and step
//! results, the policy decision, and the final report.

pub mod canonical_invoice;
pub mod diagnostic;
pub mod execution_plan;
pub mod policy_decision;
pub mod step_result;
pub mod validation_context;
pub mod validation_report;

pub use canonical_invoice::{
    AllowanceCharge, CanonicalInvoice, InvoiceHeader, LineItem, MonetaryTotals, Party,
    PaymentTerms, PostalAddress, TaxBreakdownEntry,
};
pub use diagnostic::{Diagnostic, DiagnosticSeverity};
pub use execution_plan::{ExecutionPlan, GlobalConfig, PlanBuilder, PlanStep, StepCondition};
pub use policy_decision::{
    BlockType, DiagnosticCounts, PolicyDecision, PolicyGateDecision, ReasonCode,
    StepAnalysisEntry, StepContribution,
};
pub use step_result::{ExecutionStatus, StepError, StepResult};
pub use validation_context::{ValidationContext, ValidationOptions};
pub use validation_report::{
    InvoiceSummary, ReportState, RetentionWarning, RetentionWarningCode, RunTiming,
    StepStatistics, ValidationReport,
};
