// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Built-in Filters
//!
//! The filters shipped with the engine:
//!
//! - `parser` - canonical-invoice decoding
//! - `kosit` - schema/schematron validation through the KoSIT runner
//! - `vies`, `ecb-rates`, `peppol` - live external verifiers
//! - `steps-amount-validation` - decimal recomputation of totals
//! - `semantic-risk` - heuristic risk scoring
//! - `fingerprint` - the always-run audit fingerprint
//! - `policy-gate` - the always-run decision layer
//!
//! Plus the process-wide registry that owns them.

pub mod amount_validation;
pub mod ecb_rates;
pub mod fingerprint;
pub mod kosit;
pub mod parser;
pub mod peppol;
pub mod policy_gate;
pub mod registry;
pub mod semantic_risk;
pub mod vies;

pub use amount_validation::AmountValidationFilter;
pub use ecb_rates::EcbRatesFilter;
pub use fingerprint::FingerprintFilter;
pub use kosit::KositFilter;
pub use parser::ParserFilter;
pub use peppol::PeppolFilter;
pub use policy_gate::PolicyGateFilter;
pub use registry::{FilterInfo, FilterRegistry, RegisteredFilter};
pub use semantic_risk::SemanticRiskFilter;
pub use vies::ViesFilter;
