// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{Tool, ToolCategory, ToolInvocation, ToolOutput};

const OUTPUT_LIMIT: usize = 100_000;

/// Run a shell command with the repository root as working directory.
///
/// Not retryable — commands may have side effects.  The per-call timeout
/// is enforced by the executor; this tool additionally observes the
/// cancellation token and kills the child promptly.
pub struct RunCommandTool {
    root: PathBuf,
}

impl RunCommandTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Run a shell command in the repository root and return its combined output and exit status."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command line to execute"
                }
            },
            "required": ["command"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Execution
    }

    async fn execute(&self, call: &ToolInvocation, cancel: &CancellationToken) -> ToolOutput {
        let command = match call.str_arg("command") {
            Some(c) => c,
            None => return ToolOutput::err(&call.id, "missing 'command'"),
        };
        debug!(command, "run_command");

        let child = match tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(&call.id, format!("spawn error: {e}")),
        };

        // Dropping the wait future on cancel kills the child (kill_on_drop).
        let wait = child.wait_with_output();
        let output = tokio::select! {
            _ = cancel.cancelled() => {
                return ToolOutput::err(&call.id, "cancelled");
            }
            result = wait => match result {
                Ok(o) => o,
                Err(e) => return ToolOutput::err(&call.id, format!("wait error: {e}")),
            },
        };

        let mut text = String::new();
        text.push_str(&String::from_utf8_lossy(&output.stdout));
        if !output.stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str("[stderr]\n");
            text.push_str(&String::from_utf8_lossy(&output.stderr));
        }
        if text.len() > OUTPUT_LIMIT {
            let mut cut = OUTPUT_LIMIT;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
            text.push_str("\n...[truncated]");
        }

        if output.status.success() {
            ToolOutput::ok(&call.id, text)
        } else {
            let code = output.status.code().unwrap_or(-1);
            ToolOutput::err(&call.id, format!("exit status {code}\n{text}"))
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn call(args: serde_json::Value) -> ToolInvocation {
        ToolInvocation::new("c", "run_command", args)
    }

    #[tokio::test]
    async fn captures_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let t = RunCommandTool::new(dir.path().to_path_buf());
        let out = t
            .execute(&call(json!({"command": "echo hi"})), &CancellationToken::new())
            .await;
        assert!(!out.is_error);
        assert_eq!(out.content.trim(), "hi");
    }

    #[tokio::test]
    async fn runs_in_repo_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let t = RunCommandTool::new(dir.path().to_path_buf());
        let out = t
            .execute(&call(json!({"command": "ls"})), &CancellationToken::new())
            .await;
        assert!(out.content.contains("marker.txt"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_error_with_status() {
        let dir = tempfile::tempdir().unwrap();
        let t = RunCommandTool::new(dir.path().to_path_buf());
        let out = t
            .execute(&call(json!({"command": "exit 3"})), &CancellationToken::new())
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("exit status 3"));
    }

    #[tokio::test]
    async fn stderr_is_labelled() {
        let dir = tempfile::tempdir().unwrap();
        let t = RunCommandTool::new(dir.path().to_path_buf());
        let out = t
            .execute(
                &call(json!({"command": "echo oops 1>&2"})),
                &CancellationToken::new(),
            )
            .await;
        assert!(out.content.contains("[stderr]"));
        assert!(out.content.contains("oops"));
    }

    #[tokio::test]
    async fn cancellation_kills_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let t = RunCommandTool::new(dir.path().to_path_buf());
        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            cancel.cancel();
        });
        let start = std::time::Instant::now();
        let out = t
            .execute(&call(json!({"command": "sleep 30"})), &token)
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("cancelled"));
        assert!(start.elapsed() < std::time::Duration::from_secs(5));
    }

    #[test]
    fn not_retryable() {
        let t = RunCommandTool::new(PathBuf::from("/tmp"));
        assert!(!t.retryable());
        assert_eq!(t.category(), ToolCategory::Execution);
    }
}
