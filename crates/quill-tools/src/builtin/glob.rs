// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::{Tool, ToolCategory, ToolInvocation, ToolOutput};

const MAX_RESULTS: usize = 500;

/// Find files by glob pattern (`*`, `**`, `?`) relative to the repo root.
pub struct GlobSearchTool {
    root: PathBuf,
}

impl GlobSearchTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Tool for GlobSearchTool {
    fn name(&self) -> &str {
        "glob_search"
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern, e.g. `src/**/*.rs` or `*.toml`. Paths are relative to the repository root."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern with *, ** and ? wildcards"
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
        let regex = match glob_to_regex(&pattern) {
            Ok(r) => r,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid pattern: {e}")),
        };

        let root = self.root.clone();
        let cancel = cancel.clone();
        let call_id = call.id.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut found = Vec::new();
            for entry in WalkDir::new(&root)
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
                let relative = entry
                    .path()
                    .strip_prefix(&root)
                    .unwrap_or(entry.path())
                    .to_string_lossy()
                    .to_string();
                if regex.is_match(&relative) {
                    found.push(relative);
                    if found.len() >= MAX_RESULTS {
                        found.push(format!("[... capped at {MAX_RESULTS} results ...]"));
                        break;
                    }
                }
            }
            Ok(found)
        })
        .await;

        match result {
            Ok(Ok(found)) if found.is_empty() => ToolOutput::ok(&call_id, "no matches"),
            Ok(Ok(found)) => ToolOutput::ok(&call_id, found.join("\n")),
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

/// Translate a glob into an anchored regex.
///
/// `**` crosses directory separators, `*` and `?` do not.
fn glob_to_regex(pattern: &str) -> Result<regex::Regex, regex::Error> {
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    // Swallow a following separator so `**/x` also matches `x`.
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        out.push_str("(?:.*/)?");
                    } else {
                        out.push_str(".*");
                    }
                } else {
                    out.push_str("[^/]*");
                }
            }
            '?' => out.push_str("[^/]"),
            c if "\\.+()[]{}^$|".contains(c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push('$');
    regex::Regex::new(&out)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn star_does_not_cross_directories() {
        let r = glob_to_regex("src/*.rs").unwrap();
        assert!(r.is_match("src/main.rs"));
        assert!(!r.is_match("src/sub/main.rs"));
    }

    #[test]
    fn double_star_crosses_directories() {
        let r = glob_to_regex("src/**/*.rs").unwrap();
        assert!(r.is_match("src/a/b/c.rs"));
        assert!(r.is_match("src/main.rs"), "**/ also matches zero dirs");
        assert!(!r.is_match("tests/x.rs"));
    }

    #[test]
    fn question_mark_matches_single_char() {
        let r = glob_to_regex("a?.txt").unwrap();
        assert!(r.is_match("ab.txt"));
        assert!(!r.is_match("abc.txt"));
        assert!(!r.is_match("a/.txt"));
    }

    #[test]
    fn dots_are_literal() {
        let r = glob_to_regex("*.rs").unwrap();
        assert!(!r.is_match("mainxrs"));
    }

    #[tokio::test]
    async fn finds_files_under_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/inner")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "").unwrap();
        std::fs::write(dir.path().join("src/inner/deep.rs"), "").unwrap();
        std::fs::write(dir.path().join("readme.md"), "").unwrap();
        let t = GlobSearchTool::new(dir.path().to_path_buf());
        let out = t
            .execute(
                &ToolInvocation::new("c", "glob_search", json!({"pattern": "src/**/*.rs"})),
                &CancellationToken::new(),
            )
            .await;
        assert!(out.content.contains("src/lib.rs"), "{}", out.content);
        assert!(out.content.contains("src/inner/deep.rs"));
        assert!(!out.content.contains("readme.md"));
    }

    #[tokio::test]
    async fn no_match_reports_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let t = GlobSearchTool::new(dir.path().to_path_buf());
        let out = t
            .execute(
                &ToolInvocation::new("c", "glob_search", json!({"pattern": "*.zig"})),
                &CancellationToken::new(),
            )
            .await;
        assert!(!out.is_error);
        assert_eq!(out.content, "no matches");
    }
}
