// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Decimal Amount Value Object
//!
//! Arbitrary-precision monetary and quantity amounts with explicit rounding.
//!
//! ## Overview
//!
//! Every monetary or quantity field in the canonical invoice model is a
//! `DecimalAmount`. The wire representation is always a plain decimal string
//! (`"1234.56"`, `"-0.125"`), never a binary float, so amounts survive
//! serialization without precision loss and reports stay reproducible.
//!
//! Arithmetic goes through `bigdecimal` and all rounding is explicit. The
//! default strategy is banker's rounding (half-even), which is what EN16931
//! amount rules expect for tax and total recomputation.
//!
//! ## Usage
//!
//! ```
//! use invoice_gate_domain::value_objects::DecimalAmount;
//!
//! let price = DecimalAmount::parse("19.99").unwrap();
//! let qty = DecimalAmount::parse("3").unwrap();
//! let net = price.mul(&qty).round(2);
//! assert_eq!(net.to_string(), "59.97");
//! ```

use bigdecimal::{BigDecimal, RoundingMode, Signed, Zero};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{self, Display};
use std::str::FromStr;

use crate::PipelineError;

/// Rounding strategy for decimal arithmetic.
///
/// `HalfEven` (banker's rounding) is the default for all amount
/// recomputation; `HalfUp` is available for callers interoperating with
/// systems that round half away from zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoundingStrategy {
    HalfEven,
    HalfUp,
    Down,
    Up,
}

impl Default for RoundingStrategy {
    fn default() -> Self {
        RoundingStrategy::HalfEven
    }
}

impl RoundingStrategy {
    fn mode(self) -> RoundingMode {
        match self {
            RoundingStrategy::HalfEven => RoundingMode::HalfEven,
            RoundingStrategy::HalfUp => RoundingMode::HalfUp,
            RoundingStrategy::Down => RoundingMode::Down,
            RoundingStrategy::Up => RoundingMode::Up,
        }
    }
}

/// Arbitrary-precision decimal amount, serialized as a decimal string.
///
/// Immutable value object; all operations return new values. The serialized
/// form always matches `^-?\d*\.?\d+$`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DecimalAmount(BigDecimal);

impl DecimalAmount {
    /// Parses an amount from a decimal string.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::ValidationError` for anything that is not a
    /// plain decimal number (scientific notation is rejected so that the
    /// string form stays canonical).
    pub fn parse(s: &str) -> Result<Self, PipelineError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(PipelineError::ValidationError(
                "Amount string cannot be empty".to_string(),
            ));
        }
        if trimmed.contains(['e', 'E']) {
            return Err(PipelineError::ValidationError(format!(
                "Amount '{}' must be a plain decimal string",
                trimmed
            )));
        }
        BigDecimal::from_str(trimmed)
            .map(Self)
            .map_err(|e| PipelineError::ValidationError(format!("Invalid amount '{}': {}", trimmed, e)))
    }

    /// Zero with no fractional digits.
    pub fn zero() -> Self {
        Self(BigDecimal::zero())
    }

    /// Adds two amounts without rounding.
    pub fn add(&self, other: &Self) -> Self {
        Self(&self.0 + &other.0)
    }

    /// Subtracts `other` from `self` without rounding.
    pub fn sub(&self, other: &Self) -> Self {
        Self(&self.0 - &other.0)
    }

    /// Multiplies two amounts without rounding.
    pub fn mul(&self, other: &Self) -> Self {
        Self(&self.0 * &other.0)
    }

    /// Rounds to `scale` fractional digits with banker's rounding.
    pub fn round(&self, scale: i64) -> Self {
        self.round_with(scale, RoundingStrategy::HalfEven)
    }

    /// Rounds to `scale` fractional digits with an explicit strategy.
    pub fn round_with(&self, scale: i64, strategy: RoundingStrategy) -> Self {
        Self(self.0.with_scale_round(scale, strategy.mode()))
    }

    /// True when the amount is strictly negative.
    pub fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    /// True when the amount equals zero at any scale.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl Display for DecimalAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Plain notation only; scientific notation would break the canonical
        // string form persisted in reports.
        write!(f, "{}", self.0.to_plain_string())
    }
}

impl PartialOrd for DecimalAmount {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DecimalAmount {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl TryFrom<String> for DecimalAmount {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DecimalAmount> for String {
    fn from(amount: DecimalAmount) -> Self {
        amount.to_string()
    }
}
