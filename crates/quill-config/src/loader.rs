// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::{ProjectConfig, UserConfig};

/// Location of the per-user config file: `<config_dir>/quill/config.json`.
pub fn user_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quill")
        .join("config.json")
}

fn project_config_path(repo_root: &Path) -> PathBuf {
    repo_root.join(".quill").join("project.json")
}

/// Load the user config, falling back to defaults when the file is absent.
pub fn load_user_config() -> anyhow::Result<UserConfig> {
    load_user_config_from(&user_config_path())
}

fn load_user_config_from(path: &Path) -> anyhow::Result<UserConfig> {
    if !path.is_file() {
        debug!(path = %path.display(), "no user config; using defaults");
        return Ok(UserConfig::default());
    }
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Persist the user config with owner-only permissions.
///
/// The file holds provider credentials, so it is written 0o600 and the
/// containing directory is created 0o700.
pub fn save_user_config(config: &UserConfig) -> anyhow::Result<()> {
    save_user_config_to(config, &user_config_path())
}

fn save_user_config_to(config: &UserConfig, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
        restrict_permissions(parent, 0o700);
    }
    let text = serde_json::to_string_pretty(config).context("serializing user config")?;
    std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
    restrict_permissions(path, 0o600);
    Ok(())
}

/// Load the project config from `<repo_root>/.quill/project.json`.
/// Absent file means defaults (permission prompt unanswered).
pub fn load_project_config(repo_root: &Path) -> anyhow::Result<ProjectConfig> {
    let path = project_config_path(repo_root);
    if !path.is_file() {
        return Ok(ProjectConfig::default());
    }
    let text =
        std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

pub fn save_project_config(repo_root: &Path, config: &ProjectConfig) -> anyhow::Result<()> {
    let path = project_config_path(repo_root);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(config).context("serializing project config")?;
    std::fs::write(&path, text).with_context(|| format!("writing {}", path.display()))
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)) {
        tracing::warn!(path = %path.display(), "could not restrict permissions: {e}");
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) {}

// ─── Unit tests ──────────────────────────────────────────────────────────────
