// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use quill_model::{ChatMessage, ChatRequest, ModelClient, Role};

use crate::TokenEstimator;

/// Violations of the history invariants.
///
/// These indicate a bug in the caller (or a compromised processor), so the
/// orchestrator treats them as fatal for the session.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HistoryError {
    #[error("system message only allowed as the first message")]
    SystemNotFirst,
    #[error("tool message '{answer}' does not answer the next pending call '{expected}'")]
    ToolAnswerOutOfOrder { answer: String, expected: String },
    #[error("tool message '{0}' has no pending tool call")]
    ToolAnswerWithoutCall(String),
    #[error("role {0:?} may not intervene while {1} tool calls await answers")]
    RoleDuringFanOut(Role, usize),
    #[error("tool message is missing the call id in 'name'")]
    ToolAnswerUnnamed,
}

/// The ordered conversation owned by one session.
///
/// Mutated only on the session's request task; processors take a borrowed
/// view and produce a fresh message list for the outbound model call, so
/// the stored sequence is never aliased across tasks.
///
/// `append` enforces the structural invariants:
/// - an assistant message with tool calls is followed by exactly its
///   tool-role answers, in emission order, with no other role intervening;
/// - every tool-role answer matches a pending call id;
/// - a system message can only open the conversation.
#[derive(Debug, Default)]
pub struct History {
    messages: Vec<ChatMessage>,
    /// Call ids awaiting their tool-role answers, in emission order.
    pending: VecDeque<String>,
    estimator: TokenEstimator,
    token_count: usize,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_estimator(estimator: TokenEstimator) -> Self {
        Self {
            estimator,
            ..Self::default()
        }
    }

    pub fn append(&mut self, message: ChatMessage) -> Result<(), HistoryError> {
        match message.role {
            Role::System => {
                if !self.messages.is_empty() {
                    return Err(HistoryError::SystemNotFirst);
                }
            }
            Role::Tool => {
                let answer = message
                    .name
                    .clone()
                    .ok_or(HistoryError::ToolAnswerUnnamed)?;
                match self.pending.front() {
                    Some(expected) if *expected == answer => {
                        self.pending.pop_front();
                    }
                    Some(expected) => {
                        return Err(HistoryError::ToolAnswerOutOfOrder {
                            answer,
                            expected: expected.clone(),
                        });
                    }
                    None => return Err(HistoryError::ToolAnswerWithoutCall(answer)),
                }
            }
            role => {
                if !self.pending.is_empty() {
                    return Err(HistoryError::RoleDuringFanOut(role, self.pending.len()));
                }
            }
        }
        if message.role == Role::Assistant && message.has_tool_calls() {
            self.pending = message.tool_calls.iter().map(|c| c.id.clone()).collect();
        }
        self.token_count += self.estimator.estimate_message(&message);
        self.messages.push(message);
        Ok(())
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Call ids of the current unanswered fan-out, in emission order.
    pub fn pending_calls(&self) -> Vec<String> {
        self.pending.iter().cloned().collect()
    }

    pub fn estimated_tokens(&self) -> usize {
        self.token_count
    }

    pub fn estimator(&self) -> TokenEstimator {
        self.estimator
    }

    /// Apply the ordered processor pipeline and return the prompt messages
    /// plus telemetry for each compression that actually happened.
    ///
    /// The stored history is untouched — compression shapes only what the
    /// model sees on this call.
    pub async fn prepare_for_call(
        &self,
        processors: &[Arc<dyn Processor>],
    ) -> (Vec<ChatMessage>, Vec<CompressionReport>) {
        let mut messages = self.messages.clone();
        let mut reports = Vec::new();
        for processor in processors {
            let (next, report) = processor.apply(messages).await;
            debug_assert!(
                pairing_intact(&next),
                "processor '{}' broke tool-call pairing",
                processor.name()
            );
            messages = next;
            if let Some(report) = report {
                reports.push(report);
            }
        }
        (messages, reports)
    }
}

/// True when every assistant fan-out in `messages` is immediately followed
/// by exactly its tool answers in order, and no tool message is orphaned.
pub(crate) fn pairing_intact(messages: &[ChatMessage]) -> bool {
    let mut pending: VecDeque<&str> = VecDeque::new();
    for message in messages {
        match message.role {
            Role::Tool => {
                let Some(name) = message.name.as_deref() else {
                    return false;
                };
                match pending.pop_front() {
                    Some(expected) if expected == name => {}
                    _ => return false,
                }
            }
            _ if !pending.is_empty() => return false,
            Role::Assistant if message.has_tool_calls() => {
                pending = message.tool_calls.iter().map(|c| c.id.as_str()).collect();
            }
            _ => {}
        }
    }
    pending.is_empty()
}

// ─── Processors ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionKind {
    /// Deterministic shrinking (dropping or truncating messages).
    Compress,
    /// LLM (or fallback) summarization of a prefix.
    Summarize,
}

/// Telemetry describing one compression that was applied.
#[derive(Debug, Clone)]
pub struct CompressionReport {
    pub kind: CompressionKind,
    pub description: String,
    pub tokens_before: usize,
    pub tokens_after: usize,
}

/// A transformation applied to the message list before a model call.
///
/// Processors must preserve tool-call pairing: no assistant fan-out may
/// lose its answers and no answer its fan-out.
#[async_trait]
pub trait Processor: Send + Sync {
    fn name(&self) -> &str;
    async fn apply(
        &self,
        messages: Vec<ChatMessage>,
    ) -> (Vec<ChatMessage>, Option<CompressionReport>);
}

/// Walk `start` backwards until it no longer points into a fan-out group,
/// so that slicing at `start` keeps assistant calls and answers together.
fn fan_out_safe_start(messages: &[ChatMessage], mut start: usize) -> usize {
    while start > 0 && start < messages.len() && messages[start].role == Role::Tool {
        start -= 1;
    }
    start
}

/// Keep the system message (when first) plus the final `n` messages,
/// never splitting a fan-out group.
pub struct KeepLastN {
    n: usize,
    estimator: TokenEstimator,
}

impl KeepLastN {
    pub fn new(n: usize, estimator: TokenEstimator) -> Self {
        Self { n, estimator }
    }
}

#[async_trait]
impl Processor for KeepLastN {
    fn name(&self) -> &str {
        "keep_last_n"
    }

    async fn apply(
        &self,
        messages: Vec<ChatMessage>,
    ) -> (Vec<ChatMessage>, Option<CompressionReport>) {
        let has_system = messages.first().map(|m| m.role == Role::System).unwrap_or(false);
        let body_start = usize::from(has_system);
        let body_len = messages.len() - body_start;
        if body_len <= self.n {
            return (messages, None);
        }
        let cut = fan_out_safe_start(&messages, messages.len() - self.n);
        let cut = cut.max(body_start);
        if cut == body_start {
            return (messages, None);
        }
        let tokens_before = self.estimator.estimate(&messages);
        let mut kept: Vec<ChatMessage> = Vec::with_capacity(messages.len() - cut + 1);
        if has_system {
            kept.push(messages[0].clone());
        }
        kept.extend_from_slice(&messages[cut..]);
        let tokens_after = self.estimator.estimate(&kept);
        let dropped = cut - body_start;
        (
            kept,
            Some(CompressionReport {
                kind: CompressionKind::Compress,
                description: format!("dropped {dropped} oldest messages"),
                tokens_before,
                tokens_after,
            }),
        )
    }
}

/// Middle-truncate tool outputs longer than `max_chars`, keeping an equal
/// head and tail around an elision marker.
pub struct TruncateToolOutputs {
    max_chars: usize,
    estimator: TokenEstimator,
}

impl TruncateToolOutputs {
    pub fn new(max_chars: usize, estimator: TokenEstimator) -> Self {
        Self { max_chars, estimator }
    }

    fn truncate(&self, content: &str) -> Option<String> {
        if content.len() <= self.max_chars {
            return None;
        }
        let keep = self.max_chars / 2;
        let mut head_end = keep;
        while !content.is_char_boundary(head_end) {
            head_end -= 1;
        }
        let mut tail_start = content.len() - keep;
        while !content.is_char_boundary(tail_start) {
            tail_start += 1;
        }
        let elided = tail_start - head_end;
        Some(format!(
            "{}\n[... {elided} characters elided ...]\n{}",
            &content[..head_end],
            &content[tail_start..]
        ))
    }
}

#[async_trait]
impl Processor for TruncateToolOutputs {
    fn name(&self) -> &str {
        "truncate_long_tool_outputs"
    }

    async fn apply(
        &self,
        mut messages: Vec<ChatMessage>,
    ) -> (Vec<ChatMessage>, Option<CompressionReport>) {
        if self.max_chars == 0 {
            return (messages, None);
        }
        let tokens_before = self.estimator.estimate(&messages);
        let mut truncated = 0usize;
        for message in &mut messages {
            if message.role != Role::Tool {
                continue;
            }
            if let Some(shorter) = self.truncate(&message.content) {
                message.content = shorter;
                truncated += 1;
            }
        }
        if truncated == 0 {
            return (messages, None);
        }
        let tokens_after = self.estimator.estimate(&messages);
        (
            messages,
            Some(CompressionReport {
                kind: CompressionKind::Compress,
                description: format!("middle-truncated {truncated} tool outputs"),
                tokens_before,
                tokens_after,
            }),
        )
    }
}

const SUMMARIZE_PROMPT: &str =
    "You are a context compaction assistant. Summarise the following conversation history \
     in a concise, information-dense way. Preserve all technical details, decisions, file \
     names, code snippets, and tool outputs that may be relevant to future work. \
     The summary will replace the original history to free up context space.";

/// Replace the prefix before the last `keep_last_n` messages with a single
/// synthetic user message containing an LLM summary, once the estimated
/// prompt exceeds `limit`.
///
/// On summarization failure the prefix is replaced with a deterministic
/// note listing the elided turn types, so the call can still go out.
pub struct SummarizePrefix {
    client: Arc<dyn ModelClient>,
    keep_last_n: usize,
    limit: usize,
    estimator: TokenEstimator,
}

impl SummarizePrefix {
    pub fn new(
        client: Arc<dyn ModelClient>,
        keep_last_n: usize,
        limit: usize,
        estimator: TokenEstimator,
    ) -> Self {
        Self {
            client,
            keep_last_n,
            limit,
            estimator,
        }
    }

    fn serialize_prefix(prefix: &[ChatMessage]) -> String {
        prefix
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::System => "System",
                    Role::User => "User",
                    Role::Assistant => "Assistant",
                    Role::Tool => "Tool",
                };
                if m.has_tool_calls() {
                    let calls: Vec<String> = m
                        .tool_calls
                        .iter()
                        .map(|c| {
                            format!(
                                "{}({})",
                                c.name,
                                serde_json::Value::Object(c.args.clone())
                            )
                        })
                        .collect();
                    format!("{role}: {} [tool calls: {}]", m.content, calls.join(", "))
                } else {
                    format!("{role}: {}", m.content)
                }
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn fallback_summary(prefix: &[ChatMessage]) -> String {
        let mut user = 0usize;
        let mut assistant = 0usize;
        let mut tool = 0usize;
        for m in prefix {
            match m.role {
                Role::User => user += 1,
                Role::Assistant => assistant += 1,
                Role::Tool => tool += 1,
                Role::System => {}
            }
        }
        format!(
            "[Earlier conversation elided to fit the context budget: \
             {user} user turns, {assistant} assistant turns, {tool} tool results. \
             Summarization was unavailable; ask the user to restate anything essential.]"
        )
    }
}

#[async_trait]
impl Processor for SummarizePrefix {
    fn name(&self) -> &str {
        "summarize_prefix"
    }

    async fn apply(
        &self,
        messages: Vec<ChatMessage>,
    ) -> (Vec<ChatMessage>, Option<CompressionReport>) {
        let tokens_before = self.estimator.estimate(&messages);
        if tokens_before <= self.limit {
            return (messages, None);
        }
        let has_system = messages.first().map(|m| m.role == Role::System).unwrap_or(false);
        let body_start = usize::from(has_system);
        if messages.len() - body_start <= self.keep_last_n {
            return (messages, None);
        }
        let cut = fan_out_safe_start(&messages, messages.len() - self.keep_last_n);
        let cut = cut.max(body_start);
        if cut == body_start {
            return (messages, None);
        }

        let prefix = &messages[body_start..cut];
        let request = ChatRequest {
            model: self.client.model_name().to_string(),
            messages: vec![
                ChatMessage::system(SUMMARIZE_PROMPT),
                ChatMessage::user(Self::serialize_prefix(prefix)),
            ],
            ..Default::default()
        };

        let summary = match self.client.chat(request).await {
            Ok(response) if !response.message.content.is_empty() => {
                format!("Summary of the earlier conversation:\n{}", response.message.content)
            }
            Ok(_) => {
                warn!("summarization returned empty text; using fallback summary");
                Self::fallback_summary(prefix)
            }
            Err(e) => {
                warn!("summarization failed ({e}); using fallback summary");
                Self::fallback_summary(prefix)
            }
        };

        let mut compacted = Vec::with_capacity(messages.len() - cut + 2);
        if has_system {
            compacted.push(messages[0].clone());
        }
        compacted.push(ChatMessage::user(summary));
        compacted.extend_from_slice(&messages[cut..]);
        let tokens_after = self.estimator.estimate(&compacted);
        (
            compacted,
            Some(CompressionReport {
                kind: CompressionKind::Summarize,
                description: format!("summarized {} prefix messages", cut - body_start),
                tokens_before,
                tokens_after,
            }),
        )
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
