// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Retry policy with exponential backoff and jitter for client operations.
//
// Only transport failures are retried, and always from the start of the
// operation on a fresh connection. A half-sent job is never resumed.

use std::future::Future;
use std::time::Duration;

use lpd_core::error::{LpdError, Result};
use lpd_core::types::ErrorClass;
use tracing::{debug, info, warn};

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    pub max_retries: u32,
    /// Base delay between retries (exponential backoff).
    pub base_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Result of evaluating whether to retry.
#[derive(Debug)]
pub enum RetryDecision {
    /// Retry after this delay.
    RetryAfter(Duration),
    /// Do not retry; the error will not go away by itself.
    GiveUp(ErrorClass),
    /// Maximum retries exhausted.
    Exhausted,
}

/// Classify an `LpdError` for retry decisions.
pub fn classify_error(err: &LpdError) -> ErrorClass {
    match err {
        LpdError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                ErrorClass::UserAction
            }
            _ => ErrorClass::Transient,
        },

        // The server answered, just not the way we wanted.
        LpdError::Protocol(_)
        | LpdError::UnexpectedEof { .. }
        | LpdError::Nack { .. }
        | LpdError::ShortTransfer { .. } => ErrorClass::Permanent,

        LpdError::InvalidFileName(_)
        | LpdError::FileExists(_)
        | LpdError::Backend(_)
        | LpdError::Hook(_) => ErrorClass::Permanent,

        LpdError::Config(_) => ErrorClass::UserAction,
    }
}

/// Decide whether to retry based on the error class and attempt count.
pub fn should_retry(err: &LpdError, attempt: u32, config: &RetryConfig) -> RetryDecision {
    match classify_error(err) {
        ErrorClass::Transient if attempt >= config.max_retries => {
            warn!(attempt, max = config.max_retries, "retry limit exhausted");
            RetryDecision::Exhausted
        }
        ErrorClass::Transient => {
            let delay = compute_delay(attempt, config);
            debug!(attempt, delay_ms = delay.as_millis(), "scheduling retry");
            RetryDecision::RetryAfter(delay)
        }
        class => {
            info!(?class, "not retrying");
            RetryDecision::GiveUp(class)
        }
    }
}

/// Run `operation` until it succeeds or [`should_retry`] gives up. Each call
/// must start from scratch, typically on a new connection.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        match should_retry(&err, attempt, config) {
            RetryDecision::RetryAfter(delay) => {
                warn!(attempt, error = %err, delay_ms = delay.as_millis(), "operation failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            RetryDecision::GiveUp(_) | RetryDecision::Exhausted => return Err(err),
        }
    }
}

/// delay = min(base * 2^attempt + jitter, max_delay), jitter in [0, base).
fn compute_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let base_ms = config.base_delay.as_millis() as u64;
    let exp_ms = base_ms.saturating_mul(1u64 << attempt.min(10));
    let total_ms = exp_ms.saturating_add(jitter(base_ms, attempt));
    let capped_ms = total_ms.min(config.max_delay.as_millis() as u64);

    Duration::from_millis(capped_ms)
}

fn jitter(base_ms: u64, attempt: u32) -> u64 {
    let hash = (attempt as u64).wrapping_mul(6364136223846793005);
    hash % base_ms.max(1)
}
