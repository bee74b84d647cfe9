// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Serde default helper — returns `true`.
///
/// `#[serde(default)]` on a `bool` always falls back to `bool::default()`
/// (i.e. `false`), so a named function is required for enabled-by-default
/// fields.
fn default_true() -> bool {
    true
}

fn default_max_steps() -> u32 {
    50
}

fn default_tool_timeout_secs() -> u64 {
    60
}

fn default_context_tokens() -> usize {
    128_000
}

fn default_keep_last_n() -> usize {
    20
}

fn default_tool_output_cap_chars() -> usize {
    16_000
}

fn default_max_attempts() -> u32 {
    4
}

/// Per-user configuration persisted as JSON with owner-only permissions.
///
/// Holds provider credentials and defaults.  The engine core never reads
/// this at step time; the orchestrator resolves it at session start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    /// Provider identifier, e.g. "openai" | "anthropic" | "mock".
    #[serde(default = "UserConfig::default_provider")]
    pub provider: String,
    /// Model name forwarded to the provider API.
    #[serde(default = "UserConfig::default_model")]
    pub model: String,
    /// Environment variable that holds the API key (read at runtime).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Explicit API key; prefer api_key_env to keep secrets out of files
    /// that may be copied around.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Base URL override for local proxies and gateways.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl UserConfig {
    fn default_provider() -> String {
        "mock".into()
    }

    fn default_model() -> String {
        "quill-dev".into()
    }

    /// Merge a flat string map (from a `save_config` command) into this
    /// config.  Unknown keys are ignored so older front-ends can send
    /// settings a newer engine no longer has.
    pub fn apply_overrides(&mut self, overrides: &HashMap<String, String>) {
        for (key, value) in overrides {
            match key.as_str() {
                "provider" => self.provider = value.clone(),
                "model" => self.model = value.clone(),
                "api_key_env" => self.api_key_env = Some(value.clone()),
                "api_key" => self.api_key = Some(value.clone()),
                "base_url" => self.base_url = Some(value.clone()),
                "max_steps" => {
                    if let Ok(n) = value.parse() {
                        self.engine.max_steps = n;
                    }
                }
                "tool_timeout_secs" => {
                    if let Ok(n) = value.parse() {
                        self.engine.tool_timeout_secs = n;
                    }
                }
                "context_tokens" => {
                    if let Ok(n) = value.parse() {
                        self.engine.context_tokens = n;
                    }
                }
                "streaming" => {
                    if let Ok(b) = value.parse() {
                        self.engine.streaming = b;
                    }
                }
                other => {
                    tracing::debug!(key = other, "ignoring unknown config key");
                }
            }
        }
    }

    /// Flatten into the string map shape used by `config_loaded` events.
    pub fn to_string_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("provider".into(), self.provider.clone());
        map.insert("model".into(), self.model.clone());
        if let Some(env) = &self.api_key_env {
            map.insert("api_key_env".into(), env.clone());
        }
        if let Some(url) = &self.base_url {
            map.insert("base_url".into(), url.clone());
        }
        map.insert("max_steps".into(), self.engine.max_steps.to_string());
        map.insert(
            "tool_timeout_secs".into(),
            self.engine.tool_timeout_secs.to_string(),
        );
        map.insert(
            "context_tokens".into(),
            self.engine.context_tokens.to_string(),
        );
        map.insert("streaming".into(), self.engine.streaming.to_string());
        map
    }
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            provider: Self::default_provider(),
            model: Self::default_model(),
            api_key_env: None,
            api_key: None,
            base_url: None,
            engine: EngineConfig::default(),
        }
    }
}

/// Runtime knobs handed to each session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Step ceiling for one request.  Reaching it without completion is a
    /// `budget_exceeded` outcome, not an error.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Per-tool-call timeout in seconds.  Clamped to [1, 300] at use sites.
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    /// Token budget for the prompt sent to the model.
    #[serde(default = "default_context_tokens")]
    pub context_tokens: usize,
    /// Messages preserved verbatim by the summarizing processor.
    #[serde(default = "default_keep_last_n")]
    pub keep_last_n: usize,
    /// Character cap applied to tool outputs before middle-elision.
    #[serde(default = "default_tool_output_cap_chars")]
    pub tool_output_cap_chars: usize,
    /// Use the streaming model endpoint.
    #[serde(default = "default_true")]
    pub streaming: bool,
    /// Retry attempts per model call / retryable tool call.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl EngineConfig {
    /// The per-tool timeout, clamped to the 5-minute hard cap.
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs.clamp(1, 300))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            tool_timeout_secs: default_tool_timeout_secs(),
            context_tokens: default_context_tokens(),
            keep_last_n: default_keep_last_n(),
            tool_output_cap_chars: default_tool_output_cap_chars(),
            streaming: true,
            max_attempts: default_max_attempts(),
        }
    }
}

/// Per-project configuration stored in `<repo_root>/.quill/project.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Whether the user has consented to code indexing for this project.
    /// `None` means the permission prompt has not been answered yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexing_enabled: Option<bool>,
    /// Free-form rules text injected into the system prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<String>,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
