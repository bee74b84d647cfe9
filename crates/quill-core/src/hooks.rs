// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;

use quill_model::{TokenUsage, ToolCallData};

use crate::{CompressionReport, Phase};

/// Observation points the agent loop fires during a request.
///
/// Per-step ordering: `on_step_start`, `on_before_llm`, `on_text_delta*`,
/// `on_after_llm`, `on_history_changed`, then per tool call `on_tool_call`,
/// `on_tool_result`, `on_history_changed`, and `on_done` at loop exit when
/// the request completed.
///
/// All methods default to no-ops so implementations pick the capabilities
/// they care about.
#[async_trait]
pub trait AgentHooks: Send + Sync {
    async fn on_step_start(&self, _step: u32, _phase: Phase) {}
    async fn on_before_llm(&self, _message_count: usize) {}
    async fn on_text_delta(&self, _delta: &str) {}
    async fn on_after_llm(&self, _text: &str, _tool_calls: &[ToolCallData]) {}
    async fn on_history_changed(&self) {}
    async fn on_tool_call(&self, _call: &ToolCallData) {}
    async fn on_tool_result(&self, _call_id: &str, _tool: &str, _output: &str, _is_error: bool) {}
    async fn on_usage(&self, _usage: TokenUsage) {}
    async fn on_retry_attempt(&self, _attempt: u32, _error: &str) {}
    async fn on_budget_compression(&self, _report: &CompressionReport) {}
    async fn on_done(&self, _summary: &str) {}
}

/// Hook implementation that observes nothing.
pub struct NullHooks;

#[async_trait]
impl AgentHooks for NullHooks {}

/// Fans every callback out to a list of hooks, in registration order.
pub struct CompositeHooks {
    hooks: Vec<Arc<dyn AgentHooks>>,
}

impl CompositeHooks {
    pub fn new(hooks: Vec<Arc<dyn AgentHooks>>) -> Self {
        Self { hooks }
    }
}

#[async_trait]
impl AgentHooks for CompositeHooks {
    async fn on_step_start(&self, step: u32, phase: Phase) {
        for h in &self.hooks {
            h.on_step_start(step, phase).await;
        }
    }

    async fn on_before_llm(&self, message_count: usize) {
        for h in &self.hooks {
            h.on_before_llm(message_count).await;
        }
    }

    async fn on_text_delta(&self, delta: &str) {
        for h in &self.hooks {
            h.on_text_delta(delta).await;
        }
    }

    async fn on_after_llm(&self, text: &str, tool_calls: &[ToolCallData]) {
        for h in &self.hooks {
            h.on_after_llm(text, tool_calls).await;
        }
    }

    async fn on_history_changed(&self) {
        for h in &self.hooks {
            h.on_history_changed().await;
        }
    }

    async fn on_tool_call(&self, call: &ToolCallData) {
        for h in &self.hooks {
            h.on_tool_call(call).await;
        }
    }

    async fn on_tool_result(&self, call_id: &str, tool: &str, output: &str, is_error: bool) {
        for h in &self.hooks {
            h.on_tool_result(call_id, tool, output, is_error).await;
        }
    }

    async fn on_usage(&self, usage: TokenUsage) {
        for h in &self.hooks {
            h.on_usage(usage).await;
        }
    }

    async fn on_retry_attempt(&self, attempt: u32, error: &str) {
        for h in &self.hooks {
            h.on_retry_attempt(attempt, error).await;
        }
    }

    async fn on_budget_compression(&self, report: &CompressionReport) {
        for h in &self.hooks {
            h.on_budget_compression(report).await;
        }
    }

    async fn on_done(&self, summary: &str) {
        for h in &self.hooks {
            h.on_done(summary).await;
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
