// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Runtime utilities: the timeout+retry harness and supervised tasks.

pub mod retry;
pub mod supervisor;

pub use retry::{run_attempts, AttemptOutcome};
pub use supervisor::{join_supervised, spawn_supervised, AppResult};
