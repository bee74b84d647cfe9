// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! HTTP → [`ModelError`] classification shared by vendor bindings.
//!
//! The wire formats of individual providers live outside this workspace,
//! but they all speak HTTP, and the retry policy needs a uniform view of
//! what a status code means.  Bindings call these helpers so that every
//! provider classifies 429/5xx/auth failures identically.
use std::time::Duration;

use crate::ModelError;

/// Classify a non-success HTTP status plus response body.
pub fn classify_status(status: u16, body: &str, retry_after: Option<Duration>) -> ModelError {
    match status {
        429 => ModelError::RateLimited { retry_after },
        401 | 403 => ModelError::Auth(short(body)),
        400..=499 => ModelError::InvalidRequest(short(body)),
        500..=599 => ModelError::Server {
            status,
            message: short(body),
        },
        other => ModelError::Transport(format!("unexpected status {other}: {}", short(body))),
    }
}

/// Classify a reqwest transport failure.
pub fn classify_reqwest(err: &reqwest::Error) -> ModelError {
    if err.is_timeout() || err.is_connect() {
        return ModelError::Transport(err.to_string());
    }
    if let Some(status) = err.status() {
        return classify_status(status.as_u16(), &err.to_string(), None);
    }
    ModelError::Transport(err.to_string())
}

/// Parse a `Retry-After` header value (seconds form only).
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Error bodies can be whole HTML pages; keep messages readable.
fn short(body: &str) -> String {
    const MAX: usize = 400;
    let trimmed = body.trim();
    if trimmed.len() <= MAX {
        trimmed.to_string()
    } else {
        let mut cut = MAX;
        while !trimmed.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &trimmed[..cut])
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
