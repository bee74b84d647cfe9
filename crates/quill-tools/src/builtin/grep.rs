// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use super::resolve_in_root;
use crate::{Tool, ToolCategory, ToolInvocation, ToolOutput};

const MAX_MATCHES: usize = 200;
const MAX_FILE_BYTES: u64 = 2_000_000;

/// Regex search across the repository tree.
pub struct GrepSearchTool {
    root: PathBuf,
}

impl GrepSearchTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Tool for GrepSearchTool {
    fn name(&self) -> &str {
        "grep_search"
    }

    fn description(&self) -> &str {
        "Search file contents with a regular expression. Returns `path:line: text` matches, most relevant (earliest) first."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regular expression to search for"
                },
                "path": {
                    "type": "string",
                    "description": "Subdirectory to search (default: repository root)"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Cap on returned matches (default 200)"
                }
            },
            "required": ["pattern"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Search
    }

    fn retryable(&self) -> bool {
        true
    }

    async fn execute(&self, call: &ToolInvocation, cancel: &CancellationToken) -> ToolOutput {
        let pattern = match call.str_arg("pattern") {
            Some(p) => p.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'pattern'"),
        };
        let regex = match regex::Regex::new(&pattern) {
            Ok(r) => r,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid pattern: {e}")),
        };
        let base = match call.str_arg("path") {
            Some(p) => match resolve_in_root(&self.root, p) {
                Ok(resolved) => resolved,
                Err(e) => return ToolOutput::err(&call.id, e),
            },
            None => self.root.clone(),
        };
        let cap = call
            .u64_arg("max_results")
            .map(|n| n as usize)
            .unwrap_or(MAX_MATCHES)
            .min(MAX_MATCHES);

        let root = self.root.clone();
        let cancel = cancel.clone();
        let call_id = call.id.clone();
        // The walk is blocking I/O; keep it off the async executor.
        let result = tokio::task::spawn_blocking(move || {
            let mut matches = Vec::new();
            for entry in WalkDir::new(&base)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| !is_hidden(e))
                .filter_map(Result::ok)
            {
                if cancel.is_cancelled() {
                    return Err("cancelled".to_string());
                }
                if !entry.file_type().is_file() {
                    continue;
                }
                if entry.metadata().map(|m| m.len() > MAX_FILE_BYTES).unwrap_or(true) {
                    continue;
                }
                let Ok(text) = std::fs::read_to_string(entry.path()) else {
                    continue; // binary or unreadable
                };
                let display = entry
                    .path()
                    .strip_prefix(&root)
                    .unwrap_or(entry.path())
                    .display()
                    .to_string();
                for (lineno, line) in text.lines().enumerate() {
                    if regex.is_match(line) {
                        matches.push(format!("{display}:{}: {line}", lineno + 1));
                        if matches.len() >= cap {
                            matches.push(format!("[... capped at {cap} matches ...]"));
                            return Ok(matches);
                        }
                    }
                }
            }
            Ok(matches)
        })
        .await;

        match result {
            Ok(Ok(matches)) if matches.is_empty() => ToolOutput::ok(&call_id, "no matches"),
            Ok(Ok(matches)) => ToolOutput::ok(&call_id, matches.join("\n")),
            Ok(Err(e)) => ToolOutput::err(&call_id, e),
            Err(e) => ToolOutput::err(&call_id, format!("search task failed: {e}")),
        }
    }
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|s| s.starts_with('.') && s != "." && s != "..")
            .unwrap_or(false)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
