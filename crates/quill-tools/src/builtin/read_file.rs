// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::resolve_in_root;
use crate::{Tool, ToolCategory, ToolInvocation, ToolOutput};

const READ_LIMIT: usize = 200_000;

/// Read a whole file (capped) relative to the repository root.
pub struct ReadFileTool {
    root: PathBuf,
}

impl ReadFileTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file from the repository. Large files are truncated; use read_span for a specific line range."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the repository root"
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
        debug!(path = %resolved.display(), "read_file");
        match tokio::fs::read(&resolved).await {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                let content = if text.len() > READ_LIMIT {
                    let mut cut = READ_LIMIT;
                    while !text.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    format!("{}...[truncated]", &text[..cut])
                } else {
                    text.to_string()
                };
                ToolOutput::ok(&call.id, content)
            }
            Err(e) => ToolOutput::err(&call.id, format!("read error: {e}")),
        }
    }
}

/// Read a 1-based inclusive line range from a file.
pub struct ReadSpanTool {
    root: PathBuf,
}

impl ReadSpanTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Tool for ReadSpanTool {
    fn name(&self) -> &str {
        "read_span"
    }

    fn description(&self) -> &str {
        "Read a line range from a file. Lines are 1-based and the range is inclusive."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the repository root"
                },
                "start_line": {
                    "type": "integer",
                    "description": "First line to read (1-based)"
                },
                "end_line": {
                    "type": "integer",
                    "description": "Last line to read (inclusive)"
                }
            },
            "required": ["path", "start_line", "end_line"]
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
        let start = match call.u64_arg("start_line") {
            Some(n) if n >= 1 => n as usize,
            _ => return ToolOutput::err(&call.id, "missing or invalid 'start_line'"),
        };
        let end = match call.u64_arg("end_line") {
            Some(n) if n as usize >= start => n as usize,
            _ => return ToolOutput::err(&call.id, "missing or invalid 'end_line'"),
        };
        let resolved = match resolve_in_root(&self.root, path) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        match tokio::fs::read_to_string(&resolved).await {
            Ok(text) => {
                let selected: Vec<String> = text
                    .lines()
                    .enumerate()
                    .skip(start - 1)
                    .take(end - start + 1)
                    .map(|(i, line)| format!("{}: {line}", i + 1))
                    .collect();
                if selected.is_empty() {
                    return ToolOutput::err(
                        &call.id,
                        format!("no lines in range {start}..{end} (file has {} lines)", text.lines().count()),
                    );
                }
                ToolOutput::ok(&call.id, selected.join("\n"))
            }
            Err(e) => ToolOutput::err(&call.id, format!("read error: {e}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn call(name: &str, args: serde_json::Value) -> ToolInvocation {
        ToolInvocation::new("c1", name, args)
    }

    #[tokio::test]
    async fn read_file_returns_content() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();
        let t = ReadFileTool::new(dir.path().to_path_buf());
        let out = t
            .execute(&call("read_file", json!({"path": "a.txt"})), &CancellationToken::new())
            .await;
        assert!(!out.is_error);
        assert_eq!(out.content, "hello");
    }

    #[tokio::test]
    async fn read_file_missing_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let t = ReadFileTool::new(dir.path().to_path_buf());
        let out = t
            .execute(&call("read_file", json!({"path": "nope.txt"})), &CancellationToken::new())
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("read error"));
    }

    #[tokio::test]
    async fn read_file_escaping_root_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let t = ReadFileTool::new(dir.path().to_path_buf());
        let out = t
            .execute(
                &call("read_file", json!({"path": "../outside.txt"})),
                &CancellationToken::new(),
            )
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("escapes"));
    }

    #[tokio::test]
    async fn read_span_selects_numbered_lines() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "one\ntwo\nthree\nfour").unwrap();
        let t = ReadSpanTool::new(dir.path().to_path_buf());
        let out = t
            .execute(
                &call("read_span", json!({"path": "a.txt", "start_line": 2, "end_line": 3})),
                &CancellationToken::new(),
            )
            .await;
        assert!(!out.is_error);
        assert_eq!(out.content, "2: two\n3: three");
    }

    #[tokio::test]
    async fn read_span_out_of_range_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "only\n").unwrap();
        let t = ReadSpanTool::new(dir.path().to_path_buf());
        let out = t
            .execute(
                &call("read_span", json!({"path": "a.txt", "start_line": 5, "end_line": 9})),
                &CancellationToken::new(),
            )
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("no lines in range"));
    }

    #[tokio::test]
    async fn read_span_rejects_inverted_range() {
        let dir = tempfile::tempdir().unwrap();
        let t = ReadSpanTool::new(dir.path().to_path_buf());
        let out = t
            .execute(
                &call("read_span", json!({"path": "a.txt", "start_line": 5, "end_line": 2})),
                &CancellationToken::new(),
            )
            .await;
        assert!(out.is_error);
    }

    #[test]
    fn both_tools_are_retryable_filesystem() {
        let dir = std::path::PathBuf::from("/tmp");
        let read = ReadFileTool::new(dir.clone());
        let span = ReadSpanTool::new(dir);
        assert!(read.retryable() && span.retryable());
        assert_eq!(read.category(), ToolCategory::Filesystem);
        assert_eq!(span.category(), ToolCategory::Filesystem);
    }
}
