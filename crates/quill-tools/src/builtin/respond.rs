// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::{Tool, ToolCategory, ToolInvocation, ToolOutput};

/// The completion sentinel.
///
/// Calling `respond` tells the loop the task is finished; the summary
/// argument becomes the final answer.  The loop appends the result and
/// then sets `done`.
pub struct RespondTool;

#[async_trait]
impl Tool for RespondTool {
    fn name(&self) -> &str {
        "respond"
    }

    fn description(&self) -> &str {
        "Finish the task and deliver the final answer. Call this exactly once, when the work is complete."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "summary": {
                    "type": "string",
                    "description": "The final answer or summary of what was done"
                }
            },
            "required": ["summary"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Meta
    }

    async fn execute(&self, call: &ToolInvocation, _cancel: &CancellationToken) -> ToolOutput {
        match call.str_arg("summary") {
            Some(summary) => ToolOutput::ok(&call.id, summary),
            None => ToolOutput::err(&call.id, "missing 'summary'"),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
