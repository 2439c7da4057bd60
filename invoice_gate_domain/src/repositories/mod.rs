// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Repository Interfaces
//!
//! Persistence abstractions. The domain defines the contracts; the
//! infrastructure layer implements them against SQLite.

pub mod job_repository;

pub use job_repository::{
    JobRepository, JobResult, JobStats, JobStatus, ValidationJob,
};
