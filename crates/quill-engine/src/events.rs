// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::trace;

use quill_core::{AgentHooks, CompressionKind, CompressionReport, Phase};
use quill_model::{TokenUsage, ToolCallData, UsageTotals};
use quill_proto::{
    ActivityStatus, ContextKind, Event, OutputStream, StatusKind, TextSource, ToolPhase,
};

/// Mutable session facts the hook updates as the loop runs; the
/// orchestrator folds them back into [`crate::SessionState`] afterwards.
#[derive(Debug, Default)]
pub(crate) struct LiveSession {
    pub phase: Phase,
    pub step_index: u32,
    pub totals: UsageTotals,
}

struct ActiveCall {
    tool: String,
    target: Option<String>,
    activity_id: u64,
    started_at: DateTime<Utc>,
}

/// Translates agent hook callbacks into outbound protocol events.
///
/// One instance per session; it holds the shared event queue sender, so
/// every event it produces flows through the bridge's single writer.
pub(crate) struct EventHooks {
    session_id: String,
    context_limit: u64,
    events: mpsc::Sender<Event>,
    live: Mutex<LiveSession>,
    calls: Mutex<HashMap<String, ActiveCall>>,
    next_activity: AtomicU64,
}

impl EventHooks {
    pub fn new(session_id: String, context_limit: usize, events: mpsc::Sender<Event>) -> Self {
        Self {
            session_id,
            context_limit: context_limit as u64,
            events,
            live: Mutex::new(LiveSession::default()),
            calls: Mutex::new(HashMap::new()),
            next_activity: AtomicU64::new(1),
        }
    }

    pub fn snapshot(&self) -> (Phase, u32, UsageTotals) {
        let live = self.live.lock().unwrap();
        (live.phase, live.step_index, live.totals)
    }

    async fn send(&self, event: Event) {
        // A dropped receiver means the bridge is shutting down; events are
        // simply discarded at that point.
        if self.events.send(event).await.is_err() {
            trace!(session_id = %self.session_id, "event queue closed");
        }
    }

    fn sid(&self) -> String {
        self.session_id.clone()
    }
}

#[async_trait]
impl AgentHooks for EventHooks {
    async fn on_step_start(&self, step: u32, phase: Phase) {
        {
            let mut live = self.live.lock().unwrap();
            live.step_index = step;
            live.phase = phase;
        }
        self.send(Event::Status {
            session_id: Some(self.sid()),
            status: StatusKind::Thinking,
            detail: Some(phase.as_str().to_string()),
        })
        .await;
    }

    async fn on_text_delta(&self, delta: &str) {
        self.send(Event::AssistantText {
            session_id: self.sid(),
            content: delta.to_string(),
            source: TextSource::Delta,
            is_final: None,
        })
        .await;
    }

    async fn on_after_llm(&self, text: &str, tool_calls: &[ToolCallData]) {
        if text.is_empty() {
            return;
        }
        self.send(Event::AssistantText {
            session_id: self.sid(),
            content: text.to_string(),
            source: TextSource::Assistant,
            is_final: if tool_calls.is_empty() { Some(true) } else { None },
        })
        .await;
    }

    async fn on_tool_call(&self, call: &ToolCallData) {
        let activity_id = self.next_activity.fetch_add(1, Ordering::Relaxed);
        let started_at = Utc::now();
        let target = call
            .args
            .get("path")
            .or_else(|| call.args.get("command"))
            .or_else(|| call.args.get("pattern"))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        self.calls.lock().unwrap().insert(
            call.id.clone(),
            ActiveCall {
                tool: call.name.clone(),
                target: target.clone(),
                activity_id,
                started_at,
            },
        );
        self.send(Event::Status {
            session_id: Some(self.sid()),
            status: StatusKind::RunningTools,
            detail: None,
        })
        .await;
        self.send(Event::ToolEvent {
            session_id: self.sid(),
            tool: call.name.clone(),
            phase: ToolPhase::Start,
            success: None,
            details: target.clone(),
        })
        .await;
        self.send(Event::Activity {
            session_id: self.sid(),
            activity_id,
            activity_type: "tool".into(),
            tool: Some(call.name.clone()),
            target,
            status: ActivityStatus::Started,
            code_change: None,
            started_at: Some(started_at),
            completed_at: None,
        })
        .await;
    }

    async fn on_tool_result(&self, call_id: &str, tool: &str, output: &str, is_error: bool) {
        let active = self.calls.lock().unwrap().remove(call_id);
        self.send(Event::ToolEvent {
            session_id: self.sid(),
            tool: tool.to_string(),
            phase: ToolPhase::End,
            success: Some(!is_error),
            details: None,
        })
        .await;
        self.send(Event::ToolOutput {
            session_id: self.sid(),
            invocation_id: call_id.to_string(),
            tool: tool.to_string(),
            output: output.to_string(),
            is_error,
            stream: OutputStream::Complete,
        })
        .await;
        if let Some(active) = active {
            let code_change = tool == "write_file";
            self.send(Event::Activity {
                session_id: self.sid(),
                activity_id: active.activity_id,
                activity_type: "tool".into(),
                tool: Some(active.tool),
                target: active.target.clone(),
                status: if is_error {
                    ActivityStatus::Failed
                } else {
                    ActivityStatus::Completed
                },
                code_change: Some(code_change),
                started_at: Some(active.started_at),
                completed_at: Some(Utc::now()),
            })
            .await;
            if code_change && !is_error {
                if let Some(target) = active.target {
                    self.send(Event::FilesChanged {
                        session_id: self.sid(),
                        files: vec![target],
                    })
                    .await;
                }
            }
        }
    }

    async fn on_usage(&self, usage: TokenUsage) {
        let totals = {
            let mut live = self.live.lock().unwrap();
            live.totals.add(usage);
            live.totals
        };
        self.send(Event::TokenUsage {
            session_id: self.sid(),
            prompt_tokens: usage.prompt_tokens,
            limit: self.context_limit,
            total: totals.total(),
        })
        .await;
    }

    async fn on_budget_compression(&self, report: &CompressionReport) {
        self.send(Event::Context {
            session_id: self.sid(),
            kind: match report.kind {
                CompressionKind::Compress => ContextKind::Compress,
                CompressionKind::Summarize => ContextKind::Summarize,
            },
            description: report.description.clone(),
            before: report.tokens_before as u64,
            after: report.tokens_after as u64,
        })
        .await;
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
