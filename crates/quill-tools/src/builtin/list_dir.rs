// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::resolve_in_root;
use crate::{Tool, ToolCategory, ToolInvocation, ToolOutput};

/// List a directory, directories suffixed with `/`.
pub struct ListDirTool {
    root: PathBuf,
}

impl ListDirTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List the entries of a directory. Directories are shown with a trailing slash."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory path relative to the repository root; '.' for the root itself"
                }
            },
            "required": ["path"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Filesystem
    }

    fn retryable(&self) -> bool {
        true
    }

    async fn execute(&self, call: &ToolInvocation, _cancel: &CancellationToken) -> ToolOutput {
        let path = match call.str_arg("path") {
            Some(p) => p,
            None => return ToolOutput::err(&call.id, "missing 'path'"),
        };
        let resolved = match resolve_in_root(&self.root, path) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        match tokio::fs::read_dir(&resolved).await {
            Ok(mut rd) => {
                let mut entries = Vec::new();
                while let Ok(Some(entry)) = rd.next_entry().await {
                    let name = entry.file_name().to_string_lossy().to_string();
                    let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
                    entries.push(if is_dir { format!("{name}/") } else { name });
                }
                entries.sort();
                ToolOutput::ok(&call.id, entries.join("\n"))
            }
            Err(e) => ToolOutput::err(&call.id, format!("list error: {e}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
