// /////////////////////////////////////////////////////////////////////////////
// Invoice Gate RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Timeout + Retry Harness
//!
//! Runs a step attempt under a per-attempt timeout and a run-scoped
//! cancellation token, retrying transient failures with exponential
//! backoff and jitter.
//!
//! ## Stop conditions
//!
//! The loop stops when the attempt succeeds, or when:
//!
//! - `max_retries` is exhausted
//! - the error is not classified retryable by the step's `RetryConfig`
//! - the total budget (wall clock including waits) would be exceeded
//! - the cancellation token fires
//!
//! A per-attempt timeout produces a `TIMEOUT` step error, which is
//! retryable under the default error-type set. Cancellation is never
//! retryable.

use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use invoice_gate_bootstrap::shutdown::CancellationToken;
use invoice_gate_domain::entities::StepError;
use invoice_gate_domain::value_objects::RetryConfig;
use rand::Rng;
use tracing::debug;

/// Outcome of the attempt loop.
pub struct AttemptOutcome<T> {
    pub result: Result<T, StepError>,
    /// Total attempts made, including the first try.
    pub attempts: u32,
}

/// Runs `attempt` under the timeout/retry/cancellation discipline.
///
/// `attempt` is called with the 0-indexed attempt number and returns the
/// boxed future for that try. Without a retry config there is exactly one
/// attempt.
pub async fn run_attempts<'a, T>(
    retry: Option<&RetryConfig>,
    attempt_timeout: Duration,
    token: &CancellationToken,
    mut attempt: impl FnMut(u32) -> BoxFuture<'a, Result<T, StepError>> + 'a,
) -> AttemptOutcome<T> {
    let started = Instant::now();
    let mut attempts: u32 = 0;

    loop {
        if token.is_cancelled() {
            return AttemptOutcome {
                result: Err(StepError::cancelled("cancelled before attempt")),
                attempts,
            };
        }

        let attempt_index = attempts;
        attempts += 1;

        let result = tokio::select! {
            _ = token.cancelled() => {
                Err(StepError::cancelled("cancelled while executing"))
            }
            timed = tokio::time::timeout(attempt_timeout, attempt(attempt_index)) => {
                match timed {
                    Ok(inner) => inner,
                    Err(_) => Err(StepError::timeout(format!(
                        "attempt exceeded {} ms",
                        attempt_timeout.as_millis()
                    ))),
                }
            }
        };

        let error = match result {
            Ok(value) => {
                return AttemptOutcome {
                    result: Ok(value),
                    attempts,
                }
            }
            Err(error) => error,
        };

        // Cancellation ends the loop regardless of configuration.
        if error.name == "CANCELLED" || token.is_cancelled() {
            return AttemptOutcome {
                result: Err(error),
                attempts,
            };
        }

        let Some(config) = retry else {
            return AttemptOutcome {
                result: Err(error),
                attempts,
            };
        };

        if attempt_index >= config.max_retries || !config.is_retryable(&error) {
            return AttemptOutcome {
                result: Err(error),
                attempts,
            };
        }

        let delay_ms = config.delay_for_attempt(attempt_index);
        let jitter_ms = jitter(delay_ms, config.effective_jitter_factor());
        let wait = Duration::from_millis(delay_ms + jitter_ms);

        if let Some(budget_ms) = config.total_budget_ms {
            let budget = Duration::from_millis(budget_ms);
            if started.elapsed() >= budget || started.elapsed() + wait >= budget {
                debug!(
                    error = %error,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    budget_ms,
                    "retry budget exhausted"
                );
                return AttemptOutcome {
                    result: Err(error),
                    attempts,
                };
            }
        }

        debug!(
            error = %error,
            attempt = attempt_index + 1,
            wait_ms = wait.as_millis() as u64,
            "retrying after transient failure"
        );

        tokio::select! {
            _ = token.cancelled() => {
                return AttemptOutcome {
                    result: Err(StepError::cancelled("cancelled while waiting to retry")),
                    attempts,
                };
            }
            _ = tokio::time::sleep(wait) => {}
        }
    }
}

/// Uniform random jitter in `[0, delay x factor]`.
fn jitter(delay_ms: u64, factor: f64) -> u64 {
    let ceiling = (delay_ms as f64 * factor) as u64;
    if ceiling == 0 {
        return 0;
    }
    rand::rng().random_range(0..=ceiling)
}
