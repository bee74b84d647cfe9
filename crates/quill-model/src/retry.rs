// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::ModelError;

/// Exponential backoff with jitter, honoring server-supplied delays.
///
/// The computed delay for attempt `n` (0-based) is
/// `min(max_delay, base_delay * 2^n)` scaled by a random factor in
/// `[1 - jitter, 1 + jitter]`.  A server retry-after hint overrides the
/// computed delay when it is larger.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fractional jitter, e.g. 0.2 for ±20 %.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// The jittered exponential delay before retry number `attempt` (0-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        let factor = 1.0 + self.jitter * (fastrand::f64() * 2.0 - 1.0);
        exp.mul_f64(factor.max(0.0))
    }

    /// The backoff delay before retry number `attempt` (0-based), given the
    /// error that triggered it.  A larger server-supplied retry-after wins.
    pub fn delay_for(&self, attempt: u32, error: &ModelError) -> Duration {
        let jittered = self.backoff_delay(attempt);
        match error.retry_after() {
            Some(hint) if hint > jittered => hint,
            _ => jittered,
        }
    }

    /// Upper bound on one computed delay (used by tests and budget checks).
    pub fn max_single_delay(&self) -> Duration {
        self.max_delay.mul_f64(1.0 + self.jitter)
    }

    /// Drive `op` until it succeeds, fails terminally, is cancelled, or
    /// `max_attempts` attempts have been made.  The last error is surfaced.
    ///
    /// The backoff sleep itself is cancellation-aware: a cancel during the
    /// sleep returns [`ModelError::Cancelled`] immediately.
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, ModelError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ModelError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_error = None;
        for attempt in 0..attempts {
            if cancel.is_cancelled() {
                return Err(ModelError::Cancelled);
            }
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    if attempt + 1 < attempts {
                        let delay = self.delay_for(attempt, &e);
                        warn!(
                            attempt = attempt + 1,
                            max = attempts,
                            delay_ms = delay.as_millis() as u64,
                            "retryable error, backing off: {e}"
                        );
                        tokio::select! {
                            _ = cancel.cancelled() => return Err(ModelError::Cancelled),
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| ModelError::Internal("retry loop made no attempt".into())))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
