// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

use thiserror::Error;

/// Classified model-boundary errors.
///
/// The retry policy keys off [`ModelError::is_retryable`]; everything else
/// about an error is an opaque human-readable message.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Network timeouts, connection resets, other transient transport faults.
    #[error("transport error: {0}")]
    Transport(String),

    /// HTTP 429.  `retry_after` carries the server hint when present.
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    /// HTTP 401/403.  Never retried; the request task terminates.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The request itself was rejected (4xx other than 401/403/429).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// HTTP 5xx from the provider.
    #[error("server error (status {status}): {message}")]
    Server { status: u16, message: String },

    /// The request was cancelled by the caller.
    #[error("cancelled")]
    Cancelled,

    /// The model produced output the client could not interpret.
    #[error("malformed model output: {0}")]
    Malformed(String),

    /// Invariant violation inside the client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ModelError {
    /// Transport faults, rate limits, and 5xx responses are safe to retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ModelError::Transport(_) | ModelError::RateLimited { .. } | ModelError::Server { .. }
        )
    }

    /// The server-supplied retry delay, if this error carries one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ModelError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Short kind tag used in outbound `error` events.
    pub fn kind(&self) -> &'static str {
        match self {
            ModelError::Transport(_) => "transport",
            ModelError::RateLimited { .. } => "rate_limit",
            ModelError::Auth(_) => "auth",
            ModelError::InvalidRequest(_) => "invalid_request",
            ModelError::Server { .. } => "server",
            ModelError::Cancelled => "cancelled",
            ModelError::Malformed(_) => "malformed",
            ModelError::Internal(_) => "internal",
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds_are_retryable() {
        assert!(ModelError::Transport("reset".into()).is_retryable());
        assert!(ModelError::RateLimited { retry_after: None }.is_retryable());
        assert!(ModelError::Server {
            status: 503,
            message: "unavailable".into()
        }
        .is_retryable());
    }

    #[test]
    fn terminal_kinds_are_not_retryable() {
        assert!(!ModelError::Auth("bad key".into()).is_retryable());
        assert!(!ModelError::InvalidRequest("too long".into()).is_retryable());
        assert!(!ModelError::Cancelled.is_retryable());
        assert!(!ModelError::Malformed("trailing garbage".into()).is_retryable());
        assert!(!ModelError::Internal("oops".into()).is_retryable());
    }

    #[test]
    fn retry_after_only_on_rate_limit() {
        let e = ModelError::RateLimited {
            retry_after: Some(Duration::from_secs(30)),
        };
        assert_eq!(e.retry_after(), Some(Duration::from_secs(30)));
        assert_eq!(ModelError::Transport("x".into()).retry_after(), None);
    }

    #[test]
    fn kind_tags_are_stable() {
        assert_eq!(ModelError::RateLimited { retry_after: None }.kind(), "rate_limit");
        assert_eq!(ModelError::Auth(String::new()).kind(), "auth");
        assert_eq!(ModelError::Cancelled.kind(), "cancelled");
    }
}
