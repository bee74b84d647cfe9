// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use quill_model::ChatMessage;

/// Conservative character-ratio token estimator.
///
/// Roughly 4 characters per token for English-ish text and code, plus a
/// fixed per-message overhead for role markers and framing.  The estimate
/// intentionally rounds up: over-estimating triggers compression a little
/// early, under-estimating overflows the provider's window.
#[derive(Debug, Clone, Copy)]
pub struct TokenEstimator {
    chars_per_token: usize,
    per_message_overhead: usize,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self {
            chars_per_token: 4,
            per_message_overhead: 4,
        }
    }
}

impl TokenEstimator {
    pub fn new(chars_per_token: usize, per_message_overhead: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
            per_message_overhead,
        }
    }

    /// Estimated tokens for one message, including tool-call payloads.
    pub fn estimate_message(&self, message: &ChatMessage) -> usize {
        let mut chars = message.content.len();
        if let Some(name) = &message.name {
            chars += name.len();
        }
        for call in &message.tool_calls {
            chars += call.id.len() + call.name.len();
            chars += serde_json::Value::Object(call.args.clone()).to_string().len();
        }
        chars.div_ceil(self.chars_per_token) + self.per_message_overhead
    }

    /// Estimated tokens for a whole prompt.
    pub fn estimate(&self, messages: &[ChatMessage]) -> usize {
        messages.iter().map(|m| self.estimate_message(m)).sum()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
