// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;

use crate::{
    ChatMessage, ChatRequest, ChatResponse, EventStream, FinishReason, ModelClient, ModelError,
    StreamEvent, TokenUsage, ToolCallData,
};

/// Deterministic mock client for tests and offline runs.  Echoes the last
/// user message back as the assistant response.
#[derive(Default)]
pub struct MockClient;

#[async_trait]
impl ModelClient for MockClient {
    fn model_name(&self) -> &str {
        "mock-model"
    }

    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ModelError> {
        let reply = last_user_text(&req);
        Ok(ChatResponse {
            message: ChatMessage::assistant(format!("MOCK: {reply}")),
            tool_calls: Vec::new(),
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 10,
                total_tokens: 20,
            },
            finish_reason: FinishReason::Stop,
        })
    }

    async fn stream(&self, req: ChatRequest) -> Result<EventStream, ModelError> {
        let reply = last_user_text(&req);
        let events: Vec<Result<StreamEvent, ModelError>> = vec![
            Ok(StreamEvent::TextDelta(format!("MOCK: {reply}"))),
            Ok(StreamEvent::Usage(TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 10,
                total_tokens: 20,
            })),
        ];
        Ok(Box::pin(stream::iter(events)))
    }
}

fn last_user_text(req: &ChatRequest) -> String {
    req.messages
        .iter()
        .rev()
        .find(|m| matches!(m.role, crate::Role::User))
        .map(|m| m.content.clone())
        .unwrap_or_else(|| "[no input]".into())
}

/// A pre-scripted mock client.  Each call to `chat`/`stream` pops the next
/// event script from the front of the queue, so tests can specify exact
/// sequences — including tool calls and malformed calls — without network
/// access.
pub struct ScriptedClient {
    scripts: Arc<Mutex<Vec<Vec<StreamEvent>>>>,
    /// The last [`ChatRequest`] seen by this client.  Written on every call
    /// so tests can inspect what was sent.
    pub last_request: Arc<Mutex<Option<ChatRequest>>>,
    /// Total number of completed calls (chat + stream).
    pub calls: Arc<Mutex<u32>>,
}

impl ScriptedClient {
    /// Build a client from an ordered list of per-call event scripts.
    pub fn new(scripts: Vec<Vec<StreamEvent>>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts)),
            last_request: Arc::new(Mutex::new(None)),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Convenience: client that always returns a single text reply.
    pub fn always_text(reply: impl Into<String>) -> Self {
        let r = reply.into();
        Self::new(vec![vec![
            StreamEvent::TextDelta(r),
            StreamEvent::Usage(TokenUsage {
                prompt_tokens: 5,
                completion_tokens: 5,
                total_tokens: 10,
            }),
        ]])
    }

    /// Convenience: a tool call on the first turn, text on the second.
    pub fn tool_then_text(
        tool_id: impl Into<String>,
        tool_name: impl Into<String>,
        args: serde_json::Value,
        final_text: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            vec![StreamEvent::ToolCall(
                ToolCallData::new(tool_id, tool_name).with_args(args),
            )],
            vec![StreamEvent::TextDelta(final_text.into())],
        ])
    }

    fn next_script(&self) -> Vec<StreamEvent> {
        let mut scripts = self.scripts.lock().unwrap();
        if scripts.is_empty() {
            // Default fallback when all scripts are consumed
            vec![StreamEvent::TextDelta("[no more scripts]".into())]
        } else {
            scripts.remove(0)
        }
    }

    fn record(&self, req: ChatRequest) {
        *self.last_request.lock().unwrap() = Some(req);
        *self.calls.lock().unwrap() += 1;
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    fn model_name(&self) -> &str {
        "scripted-mock-model"
    }

    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ModelError> {
        self.record(req);
        let events = self.next_script();
        let mut text = String::new();
        let mut tool_calls = Vec::new();
        let mut usage = TokenUsage::default();
        for event in events {
            match event {
                StreamEvent::TextDelta(t) => text.push_str(&t),
                StreamEvent::ToolCall(c) => tool_calls.push(c),
                StreamEvent::Usage(u) => usage = u,
            }
        }
        let finish_reason = if tool_calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolCalls
        };
        Ok(ChatResponse {
            message: ChatMessage::assistant_with_calls(text, tool_calls.clone()),
            tool_calls,
            usage,
            finish_reason,
        })
    }

    async fn stream(&self, req: ChatRequest) -> Result<EventStream, ModelError> {
        self.record(req);
        let wrapped: Vec<Result<StreamEvent, ModelError>> =
            self.next_script().into_iter().map(Ok).collect();
        Ok(Box::pin(stream::iter(wrapped)))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    fn req() -> ChatRequest {
        ChatRequest {
            messages: vec![ChatMessage::user("hi")],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn mock_echoes_last_user_message() {
        let resp = MockClient.chat(req()).await.unwrap();
        assert!(resp.message.content.contains("MOCK: hi"));
        assert_eq!(resp.finish_reason, FinishReason::Stop);
    }

    #[tokio::test]
    async fn mock_stream_ends_cleanly() {
        let mut s = MockClient.stream(req()).await.unwrap();
        let mut saw_usage = false;
        while let Some(event) = s.next().await {
            if let StreamEvent::Usage(u) = event.unwrap() {
                saw_usage = true;
                assert_eq!(u.total_tokens, 20);
            }
        }
        assert!(saw_usage, "usage must arrive before close");
    }

    #[tokio::test]
    async fn scripted_chat_collects_tool_calls() {
        let client = ScriptedClient::tool_then_text(
            "c1",
            "list_dir",
            serde_json::json!({"path":"/"}),
            "done",
        );
        let first = client.chat(req()).await.unwrap();
        assert_eq!(first.tool_calls.len(), 1);
        assert_eq!(first.finish_reason, FinishReason::ToolCalls);
        let second = client.chat(req()).await.unwrap();
        assert!(second.tool_calls.is_empty());
        assert_eq!(second.message.content, "done");
    }

    #[tokio::test]
    async fn scripted_records_last_request_and_call_count() {
        let client = ScriptedClient::always_text("ok");
        let _ = client.chat(req()).await.unwrap();
        assert_eq!(client.call_count(), 1);
        let captured = client.last_request.lock().unwrap();
        assert_eq!(captured.as_ref().unwrap().messages.len(), 1);
    }

    #[tokio::test]
    async fn scripted_fallback_when_exhausted() {
        let client = ScriptedClient::new(vec![]);
        let resp = client.chat(req()).await.unwrap();
        assert!(resp.message.content.contains("no more scripts"));
    }
}
