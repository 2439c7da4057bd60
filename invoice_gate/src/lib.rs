// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Invoice Gate
//!
//! EN16931 e-invoice compliance validation pipeline engine.
//!
//! A caller submits a raw invoice; the engine runs an ordered, partially
//! parallel graph of validation filters and returns a signed, audit-ready
//! report plus a policy decision (ALLOW / ALLOW_WITH_WARNINGS / BLOCK).
//! Raw invoice bytes live only in the short-lived temp store and are
//! securely removed on every exit path.
//!
//! ## Layers
//!
//! - `application` - the orchestrator, report assembler, cleanup enforcer,
//!   and use cases (single-invoice execution, queued-job processing)
//! - `infrastructure` - concrete backends: retry harness, supervised
//!   tasks, in-memory temp store, cleanup queue, SQLite job repository,
//!   built-in filters, layered configuration, Prometheus metrics
//! - `presentation` - the worker CLI
//!
//! The domain model (plans, context, diagnostics, decisions, reports)
//! lives in the `invoice-gate-domain` crate; entry-point concerns (signal
//! handling, shutdown coordination, argument parsing) live in
//! `invoice-gate-bootstrap`.

pub mod application;
pub mod infrastructure;
pub mod presentation;

/// Engine version stamped into plan snapshots and job rows.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
