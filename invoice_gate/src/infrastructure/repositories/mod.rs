// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! SQLite-backed persistence for the optional job repository.

pub mod schema;
pub mod sqlite_job_repository;

pub use sqlite_job_repository::SqliteJobRepository;
