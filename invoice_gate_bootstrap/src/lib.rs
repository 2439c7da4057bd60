// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

// Production code safety enforced via CI and `make lint-strict`
// (lib/bins checked separately from tests - tests may use unwrap/expect)

//! # Bootstrap Module
//!
//! The bootstrap module sits **outside** the enterprise application layers
//! (domain, application, infrastructure) and provides:
//!
//! - **Entry point** - Application lifecycle management
//! - **Signal handling** - Graceful shutdown (SIGTERM, SIGINT)
//! - **Argument parsing** - CLI argument validation
//! - **Logging** - Tracing subscriber installation and a minimal
//!   bootstrap-phase logger
//! - **Async coordination** - Shutdown coordination and cancellation
//!
//! ## Key Design Principles
//!
//! 1. **Separation from enterprise layers** - Bootstrap can access all
//!    layers; enterprise layers never depend on bootstrap internals beyond
//!    the cancellation token it hands out.
//! 2. **Graceful shutdown** - Signal handlers cancel a shared token; the
//!    worker loop drains in-flight runs within a grace period.
//! 3. **No surprises at startup** - Arguments are validated before any
//!    component is constructed, and validation failures map to a non-zero
//!    exit code without a stack trace.

pub mod cli;
pub mod logger;
pub mod shutdown;

pub use cli::{parse_and_validate, Cli, Command, ParseError};
pub use logger::{BootstrapLogger, ConsoleLogger, NoOpLogger};
pub use shutdown::{CancellationToken, ShutdownCoordinator, DEFAULT_GRACE_PERIOD_SECS};

/// Installs the global tracing subscriber for the worker process.
///
/// The filter defaults to `info` and honors `RUST_LOG`; `verbose` drops the
/// default to `debug`. Returns an error when a subscriber is already
/// installed (double initialization is a wiring bug worth surfacing).
pub fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))
}
