// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::ToolCategory;

/// A single tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    /// Opaque identifier issued by the model (forwarded verbatim)
    pub id: String,
    pub name: String,
    /// Parsed JSON argument object
    pub args: serde_json::Map<String, Value>,
}

impl ToolInvocation {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        let args = match args {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }

    /// Fetch a required string argument.
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(|v| v.as_str())
    }

    /// Fetch an optional integer argument.
    pub fn u64_arg(&self, key: &str) -> Option<u64> {
        self.args.get(key).and_then(|v| v.as_u64())
    }
}

/// The result of executing a tool.
///
/// `content` is always a string; the empty string is normalized to the
/// `"{}"` sentinel so the model transport never sees empty content.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub call_id: String,
    pub content: String,
    /// True when the tool failed non-fatally (content is the error message).
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let text: String = content.into();
        Self {
            call_id: call_id.into(),
            content: if text.is_empty() { "{}".into() } else { text },
            is_error: false,
        }
    }

    pub fn err(call_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: msg.into(),
            is_error: true,
        }
    }
}

/// Trait every built-in and user-supplied tool implements.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the parameters object
    fn parameters_schema(&self) -> Value;
    fn category(&self) -> ToolCategory;
    /// Side-effect-free tools return true — retrying them on transient
    /// failure is safe.
    fn retryable(&self) -> bool {
        false
    }
    /// Execute the tool.  Failures are wrapped in [`ToolOutput::err`];
    /// `cancel` must be observed by long-running tools.
    async fn execute(&self, call: &ToolInvocation, cancel: &CancellationToken) -> ToolOutput;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
