// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Built-in tools, one file per concern.
//!
//! Every filesystem-touching tool resolves paths against the session's
//! repository root and refuses to escape it.
mod glob;
mod grep;
mod list_dir;
mod read_file;
mod respond;
mod run_command;
mod write_file;

pub use glob::GlobSearchTool;
pub use grep::GrepSearchTool;
pub use list_dir::ListDirTool;
pub use read_file::{ReadFileTool, ReadSpanTool};
pub use respond::RespondTool;
pub use run_command::RunCommandTool;
pub use write_file::WriteFileTool;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::{Tool, ToolSet};

/// The standard built-in tool list for a session rooted at `repo_root`,
/// filtered by `set`.
pub fn standard_tools(repo_root: &Path, set: ToolSet) -> Vec<Arc<dyn Tool>> {
    let root = repo_root.to_path_buf();
    let all: Vec<Arc<dyn Tool>> = vec![
        Arc::new(ReadFileTool::new(root.clone())),
        Arc::new(ReadSpanTool::new(root.clone())),
        Arc::new(ListDirTool::new(root.clone())),
        Arc::new(GrepSearchTool::new(root.clone())),
        Arc::new(GlobSearchTool::new(root.clone())),
        Arc::new(RunCommandTool::new(root.clone())),
        Arc::new(WriteFileTool::new(root)),
        Arc::new(RespondTool),
    ];
    all.into_iter()
        .filter(|t| set.contains(t.category()))
        .collect()
}

/// Resolve `relative` against `root`, rejecting attempts to escape it.
///
/// Absolute paths are accepted only when they already live under the root.
/// `..` components are rejected outright rather than canonicalized, so the
/// check works for files that do not exist yet.
pub(crate) fn resolve_in_root(root: &Path, relative: &str) -> Result<PathBuf, String> {
    let candidate = Path::new(relative);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };
    if joined
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return Err(format!("path escapes repository root: {relative}"));
    }
    if !joined.starts_with(root) {
        return Err(format!("path outside repository root: {relative}"));
    }
    Ok(joined)
}
