// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Worker binary entry point.
//!
//! Bootstrap owns argument parsing, tracing installation, and shutdown
//! wiring; the presentation layer owns command dispatch over the wired
//! engine.

use std::time::Duration;

use invoice_gate::presentation::cli;
use invoice_gate_bootstrap::shutdown::{install_signal_handlers, ShutdownCoordinator};
use invoice_gate_bootstrap::{cli::Command, init_tracing, parse_and_validate};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_and_validate().map_err(|e| anyhow::anyhow!("{}", e))?;
    init_tracing(args.verbose)?;

    let engine = cli::Engine::build(args.config.as_deref())?;

    match args.command {
        Command::Validate {
            input,
            content_type,
            timeout_ms,
        } => cli::run_validate(&engine, &input, &content_type, timeout_ms).await,
        Command::Worker {
            poll_interval_ms,
            concurrency,
        } => {
            let coordinator = ShutdownCoordinator::new(Duration::from_secs(
                invoice_gate_bootstrap::DEFAULT_GRACE_PERIOD_SECS,
            ));
            install_signal_handlers(coordinator.clone());
            cli::run_worker(
                &engine,
                &args.database_url,
                poll_interval_ms,
                concurrency,
                coordinator,
            )
            .await
        }
        Command::ShowPlan => cli::show_plan(),
    }
}
