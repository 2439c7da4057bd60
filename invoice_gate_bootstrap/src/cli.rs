// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command-Line Interface Module
//!
//! Bootstrap-layer CLI parsing and validation for the worker binary.
//!
//! Parsing (clap) and validation are separated: `parse_and_validate`
//! returns a `Cli` whose numeric values are range-checked and whose paths
//! were at least syntactically sane, so the composition root never sees a
//! nonsensical configuration.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by CLI validation.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Invoice Gate - EN16931 e-invoice compliance validation worker
#[derive(Debug, Parser)]
#[command(name = "invoice_gate", version, about)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the tenant configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database URL for the job repository
    #[arg(long, global = true, default_value = "sqlite::memory:")]
    pub database_url: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Worker subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validate a single invoice file and print the report as JSON
    Validate {
        /// Path to the invoice file
        input: PathBuf,

        /// Content type of the file (xml, json, pdf)
        #[arg(long, default_value = "json")]
        content_type: String,

        /// Whole-run timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Run the worker loop, claiming queued jobs until shutdown
    Worker {
        /// Poll interval between empty claims, in milliseconds
        #[arg(long, default_value_t = 1000)]
        poll_interval_ms: u64,

        /// Maximum concurrent runs (one orchestrator each)
        #[arg(long, default_value_t = 2)]
        concurrency: usize,
    },

    /// Print the default execution plan with its hashes
    ShowPlan,
}

/// Parse and validate CLI arguments.
///
/// # Errors
///
/// Returns `ParseError::InvalidArgument` for out-of-range numeric values
/// or an unknown content type.
pub fn parse_and_validate() -> Result<Cli, ParseError> {
    validate(Cli::parse())
}

fn validate(cli: Cli) -> Result<Cli, ParseError> {
    match &cli.command {
        Command::Validate { content_type, timeout_ms, .. } => {
            if !matches!(content_type.as_str(), "xml" | "json" | "pdf") {
                return Err(ParseError::InvalidArgument(format!(
                    "content type '{}' must be one of xml, json, pdf",
                    content_type
                )));
            }
            if let Some(timeout) = timeout_ms {
                if *timeout == 0 || *timeout > 3_600_000 {
                    return Err(ParseError::InvalidArgument(
                        "timeout must be between 1 ms and 1 hour".to_string(),
                    ));
                }
            }
        }
        Command::Worker { poll_interval_ms, concurrency } => {
            if *poll_interval_ms < 10 {
                return Err(ParseError::InvalidArgument(
                    "poll interval must be at least 10 ms".to_string(),
                ));
            }
            if *concurrency == 0 || *concurrency > 64 {
                return Err(ParseError::InvalidArgument(
                    "concurrency must be between 1 and 64".to_string(),
                ));
            }
        }
        Command::ShowPlan => {}
    }
    Ok(cli)
}
