// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Use cases: thin orchestration entry points for callers.

pub mod execute_validation;
pub mod process_job;

pub use execute_validation::ExecuteValidation;
pub use process_job::{ProcessJob, ProcessedJob};
