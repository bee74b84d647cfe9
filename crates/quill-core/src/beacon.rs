// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use quill_config::EngineConfig;
use quill_model::{ChatMessage, ModelClient, Role};
use quill_tools::{builtin::standard_tools, Tool, ToolCategory, ToolInvocation, ToolOutput,
    ToolRegistry, ToolSet};

use crate::{beacon_system_prompt, AgentLoop, History, NullHooks};

/// The scout sub-agent's step ceiling, independent of session config.
const BEACON_MAX_STEPS: u32 = 30;

/// Default cache TTL: identical investigations within this window reuse
/// the cached report.
pub const BEACON_CACHE_TTL: Duration = Duration::from_secs(600);

/// Structured result of one codebase investigation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BeaconReport {
    #[serde(rename = "investigation_goal")]
    pub goal: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub relevant_files: Vec<String>,
    #[serde(default)]
    pub key_types: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub files_read: Vec<String>,
}

impl BeaconReport {
    /// Human-readable digest returned as the `code_beacon` tool result.
    pub fn digest(&self) -> String {
        let mut out = format!("Investigation: {}\n\n{}\n", self.goal, self.summary);
        let section = |title: &str, items: &[String]| {
            if items.is_empty() {
                String::new()
            } else {
                format!(
                    "\n{title}:\n{}\n",
                    items
                        .iter()
                        .map(|i| format!("- {i}"))
                        .collect::<Vec<_>>()
                        .join("\n")
                )
            }
        };
        out.push_str(&section("Relevant files", &self.relevant_files));
        out.push_str(&section("Key types", &self.key_types));
        out.push_str(&section("Dependencies", &self.dependencies));
        out.push_str(&section("Patterns", &self.patterns));
        out.push_str(&section("Risks", &self.risks));
        out.push_str(&section("Recommendations", &self.recommendations));
        out.push_str(&section("Files read", &self.files_read));
        out
    }
}

// ─── Report extraction ────────────────────────────────────────────────────────

/// Pull the report out of a finished sub-session's history.
///
/// Scans assistant messages latest-to-earliest; prefers a ```json fenced
/// block, otherwise takes the first balanced JSON object that carries the
/// required `investigation_goal` field.  A parse failure yields a fallback
/// report built from the raw assistant texts.
pub fn extract_report(goal: &str, messages: &[ChatMessage]) -> BeaconReport {
    for message in messages.iter().rev() {
        if message.role != Role::Assistant || message.content.is_empty() {
            continue;
        }
        if let Some(mut report) = parse_report_from(&message.content) {
            report.files_read = collect_files_read(messages);
            return report;
        }
    }

    warn!(goal, "no parseable report in beacon history; building fallback");
    let texts: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::Assistant && !m.content.is_empty())
        .map(|m| m.content.as_str())
        .collect();
    BeaconReport {
        goal: goal.to_string(),
        summary: format!(
            "[report JSON missing or unparseable; raw scout output follows]\n{}",
            texts.join("\n---\n")
        ),
        relevant_files: Vec::new(),
        key_types: Vec::new(),
        dependencies: Vec::new(),
        patterns: Vec::new(),
        risks: Vec::new(),
        recommendations: Vec::new(),
        files_read: collect_files_read(messages),
    }
}

fn parse_report_from(content: &str) -> Option<BeaconReport> {
    // Fenced block first.
    let fenced = regex::Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```")
        .expect("static regex")
        .captures(content)
        .map(|c| c[1].to_string());
    if let Some(block) = fenced {
        if let Ok(report) = serde_json::from_str::<BeaconReport>(&block) {
            return Some(report);
        }
    }
    // Otherwise the first balanced object mentioning the required field.
    let mut search_from = 0;
    while let Some(offset) = content[search_from..].find('{') {
        let start = search_from + offset;
        let Some(candidate) = balanced_object(&content[start..]) else {
            break;
        };
        if candidate.contains("\"investigation_goal\"") {
            if let Ok(report) = serde_json::from_str::<BeaconReport>(candidate) {
                return Some(report);
            }
        }
        search_from = start + 1;
    }
    None
}

/// The shortest balanced `{...}` prefix of `s`, respecting JSON strings.
fn balanced_object(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Every file actually opened by an executed `read_file`/`read_span` call.
fn collect_files_read(messages: &[ChatMessage]) -> Vec<String> {
    let mut answered: std::collections::HashSet<&str> = std::collections::HashSet::new();
    for message in messages {
        if message.role == Role::Tool {
            if let Some(name) = message.name.as_deref() {
                if !message.content.starts_with("ERROR:") {
                    answered.insert(name);
                }
            }
        }
    }
    let mut seen = std::collections::HashSet::new();
    let mut files = Vec::new();
    for message in messages {
        for call in &message.tool_calls {
            if call.name != "read_file" && call.name != "read_span" {
                continue;
            }
            if !answered.contains(call.id.as_str()) {
                continue;
            }
            if let Some(path) = call.args.get("path").and_then(|v| v.as_str()) {
                if seen.insert(path.to_string()) {
                    files.push(path.to_string());
                }
            }
        }
    }
    files
}

// ─── Cache ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    goal: String,
    focus_areas: Vec<String>,
}

impl CacheKey {
    fn new(goal: &str, focus_areas: &[String]) -> Self {
        let mut sorted: Vec<String> = focus_areas.to_vec();
        sorted.sort();
        Self {
            goal: goal.to_string(),
            focus_areas: sorted,
        }
    }
}

/// TTL cache for beacon reports, keyed by `(goal, sorted focus areas)`.
/// Eviction is lazy: expired entries are dropped on lookup.
pub struct BeaconCache {
    entries: Mutex<HashMap<CacheKey, (BeaconReport, Instant)>>,
    ttl: Duration,
}

impl BeaconCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn get(&self, goal: &str, focus_areas: &[String]) -> Option<BeaconReport> {
        let key = CacheKey::new(goal, focus_areas);
        let mut entries = self.entries.lock().unwrap();
        match entries.get(&key) {
            Some((report, stored_at)) if stored_at.elapsed() < self.ttl => Some(report.clone()),
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, goal: &str, focus_areas: &[String], report: BeaconReport) {
        let key = CacheKey::new(goal, focus_areas);
        self.entries
            .lock()
            .unwrap()
            .insert(key, (report, Instant::now()));
    }
}

impl Default for BeaconCache {
    fn default() -> Self {
        Self::new(BEACON_CACHE_TTL)
    }
}

// ─── Sub-agent ────────────────────────────────────────────────────────────────

/// Run the scout: the same step machine under a read-only tool set and a
/// hard 30-step ceiling, then extract the report from its history.
pub async fn run_beacon(
    model: Arc<dyn ModelClient>,
    repo_root: &std::path::Path,
    goal: &str,
    focus_areas: &[String],
    base_config: &EngineConfig,
    cancel: &CancellationToken,
) -> anyhow::Result<BeaconReport> {
    let set = ToolSet::read_only();
    let registry = Arc::new(ToolRegistry::with_toolset(
        standard_tools(repo_root, set),
        set,
    ));
    let mut config = base_config.clone();
    config.max_steps = BEACON_MAX_STEPS;

    let agent = AgentLoop::new(model, registry, config, Arc::new(NullHooks));
    let mut history = History::new();
    history.append(ChatMessage::system(beacon_system_prompt(goal, focus_areas)))?;
    history.append(ChatMessage::user(format!("Investigate now: {goal}")))?;

    // Budget exhaustion is not an error for the scout — whatever history
    // exists is mined for a report (or the fallback).
    let outcome = agent.run(&mut history, cancel).await?;
    debug!(?outcome, steps = history.len(), "beacon sub-session finished");
    Ok(extract_report(goal, history.messages()))
}

/// `code_beacon` — the scout exposed as a tool in the main registry.
pub struct BeaconTool {
    model: Arc<dyn ModelClient>,
    repo_root: PathBuf,
    config: EngineConfig,
    cache: Arc<BeaconCache>,
}

impl BeaconTool {
    pub fn new(
        model: Arc<dyn ModelClient>,
        repo_root: PathBuf,
        config: EngineConfig,
        cache: Arc<BeaconCache>,
    ) -> Self {
        Self {
            model,
            repo_root,
            config,
            cache,
        }
    }
}

#[async_trait]
impl Tool for BeaconTool {
    fn name(&self) -> &str {
        "code_beacon"
    }

    fn description(&self) -> &str {
        "Dispatch a read-only scout sub-agent to investigate the codebase and return a structured report. \
         Use for questions that need several files read and synthesized."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "goal": {
                    "type": "string",
                    "description": "What the scout should find out"
                },
                "focus_areas": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Optional subsystems or topics to concentrate on"
                }
            },
            "required": ["goal"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Meta
    }

    async fn execute(&self, call: &ToolInvocation, cancel: &CancellationToken) -> ToolOutput {
        let goal = match call.str_arg("goal") {
            Some(g) => g.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'goal'"),
        };
        let focus_areas: Vec<String> = call
            .args
            .get("focus_areas")
            .and_then(|v| v.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        if let Some(cached) = self.cache.get(&goal, &focus_areas) {
            debug!(goal, "beacon cache hit");
            return ToolOutput::ok(&call.id, cached.digest());
        }

        match run_beacon(
            Arc::clone(&self.model),
            &self.repo_root,
            &goal,
            &focus_areas,
            &self.config,
            cancel,
        )
        .await
        {
            Ok(report) => {
                self.cache.put(&goal, &focus_areas, report.clone());
                ToolOutput::ok(&call.id, report.digest())
            }
            Err(e) => ToolOutput::err(&call.id, format!("beacon failed: {e}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
