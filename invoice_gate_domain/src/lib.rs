//! # Invoice Gate Domain
//!
//! The invoice gate domain represents the core business logic and rules of the
//! compliance validation engine. It implements Domain-Driven Design (DDD)
//! patterns and is completely independent of external concerns like databases,
//! HTTP clients, or user interfaces.
//!
//! ## Domain-Driven Design Concepts
//!
//! ### Entities
//! Entities are objects with a distinct identity that runs through time and
//! different representations.
//!
//! **Examples in this domain:**
//! - `ExecutionPlan`: A declarative graph of validation steps
//! - `ValidationContext`: Per-run mutable execution state
//! - `CanonicalInvoice`: The normalized EN16931 invoice model
//! - `ValidationReport`: The audit-ready result of a run
//!
//! ### Value Objects
//! Value objects are immutable, identity-free objects defined by their
//! attributes. They are self-validating and side-effect free.
//!
//! **Examples in this domain:**
//! - `RunId`: Type-safe run identifier (ULID-backed)
//! - `FilterId`: Stable hyphenated validation-step identifier
//! - `DecimalAmount`: Arbitrary-precision amount with explicit rounding
//! - `AuditHash`: A `sha256:<hex>` audit digest
//! - `ComplianceFingerprint`: The signed summary of a completed run
//!
//! ### Domain Services
//! Stateless operations that express domain concepts and coordinate domain
//! objects: canonical JSON hashing, PII masking, and the `Filter` contract
//! every validation step implements.
//!
//! ### Infrastructure Ports
//! Async traits the infrastructure layer implements: `TempStore` (short-lived
//! keyed storage with secure delete), `CleanupQueue` (durable retry of failed
//! deletes), and `JobRepository` (idempotent job persistence).
//!
//! ## Business Rules and Invariants
//!
//! - Monetary and quantity amounts are decimal strings; arithmetic goes
//!   through `DecimalAmount` with banker's rounding as the default.
//! - Diagnostic messages are sanitized before storage; no raw invoice
//!   content, emails, IBANs, VAT ids, or phone numbers may leak into
//!   reports, warnings, or persisted rows.
//! - Raw invoice bytes live only in the temp store and are securely removed
//!   on every exit path (zero retention).
//! - Audit hashes are computed over canonical JSON so that semantically equal
//!   plans and configs always hash identically.

pub mod entities;
pub mod error;
pub mod events;
pub mod repositories;
pub mod services;
pub mod value_objects;

// Re-export commonly used types for convenient access
// These exports provide a clean API surface for consumers of the domain layer
pub use entities::{
    CanonicalInvoice, Diagnostic, DiagnosticSeverity, ExecutionPlan, ExecutionStatus, GlobalConfig,
    PlanBuilder, PlanStep, PolicyDecision, PolicyGateDecision, StepCondition, StepError,
    StepResult, ValidationContext, ValidationReport,
};
pub use error::PipelineError;
pub use events::{ObserverSet, PipelineObserver};
pub use services::{Filter, FilterConfig};
pub use value_objects::{AuditHash, DecimalAmount, FilterId, RawInvoice, RunId};
