use serde::{Deserialize, Serialize};

// ─── Message types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single message in the conversation history.
///
/// A tool-role message carries the id of the call it answers in `name` and
/// its `content` is never empty — the empty-result sentinel is `"{}"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallData>,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
            name: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
            name: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
            name: None,
            tool_calls: Vec::new(),
        }
    }

    /// An assistant message that requests tool invocations.
    pub fn assistant_with_calls(text: impl Into<String>, calls: Vec<ToolCallData>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
            name: None,
            tool_calls: calls,
        }
    }

    /// A tool-role answer to the call identified by `call_id`.
    /// Empty content is normalized to the `"{}"` sentinel.
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: normalize_tool_content(content.into()),
            name: Some(call_id.into()),
            tool_calls: Vec::new(),
        }
    }

    /// True when this assistant message fans out into tool calls.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// The model transports reject `null`/empty content on tool-role messages;
/// the empty string becomes `"{}"` at this boundary, not inside the core.
pub fn normalize_tool_content(content: String) -> String {
    if content.is_empty() {
        "{}".to_string()
    } else {
        content
    }
}

// ─── Tool calls ───────────────────────────────────────────────────────────────

/// A model-issued request to invoke a named tool.
///
/// `error` is populated by the streaming assembler when the model emitted a
/// malformed or truncated call; such calls are never dispatched and are
/// answered with an `ERROR:` tool message instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallData {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolCallData {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args: serde_json::Map::new(),
            error: None,
        }
    }

    pub fn with_args(mut self, args: serde_json::Value) -> Self {
        if let serde_json::Value::Object(map) = args {
            self.args = map;
        }
        self
    }
}

// ─── Requests & responses ─────────────────────────────────────────────────────

/// A tool schema exported to the model for one call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters object
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Request handed to a [`crate::ModelClient`].
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
    pub options: ChatOptions,
}

/// Why a completion ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    Other,
}

/// Non-streaming completion result.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub message: ChatMessage,
    pub tool_calls: Vec<ToolCallData>,
    pub usage: TokenUsage,
    pub finish_reason: FinishReason,
}

// ─── Streaming ────────────────────────────────────────────────────────────────

/// One streamed event from the model.
///
/// The assembler inside a client accumulates partial argument JSON and
/// emits `ToolCall` only when a call is fully assembled or finalized.
/// `Usage` may arrive after the last text delta.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    TextDelta(String),
    ToolCall(ToolCallData),
    Usage(TokenUsage),
}

// ─── Usage accounting ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Running totals accumulated across a session's model calls.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UsageTotals {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl UsageTotals {
    pub fn add(&mut self, usage: TokenUsage) {
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
    }

    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_roles() {
        assert_eq!(ChatMessage::system("s").role, Role::System);
        assert_eq!(ChatMessage::user("u").role, Role::User);
        assert_eq!(ChatMessage::assistant("a").role, Role::Assistant);
        assert_eq!(ChatMessage::tool_result("c1", "out").role, Role::Tool);
    }

    #[test]
    fn tool_result_carries_call_id_in_name() {
        let m = ChatMessage::tool_result("call-9", "data");
        assert_eq!(m.name.as_deref(), Some("call-9"));
        assert_eq!(m.content, "data");
    }

    #[test]
    fn empty_tool_result_normalized_to_sentinel() {
        let m = ChatMessage::tool_result("c", "");
        assert_eq!(m.content, "{}");
    }

    #[test]
    fn non_empty_content_passes_through() {
        assert_eq!(normalize_tool_content("x".into()), "x");
    }

    #[test]
    fn assistant_with_calls_reports_fan_out() {
        let m = ChatMessage::assistant_with_calls("", vec![ToolCallData::new("c1", "ls")]);
        assert!(m.has_tool_calls());
        assert!(!ChatMessage::assistant("text").has_tool_calls());
    }

    #[test]
    fn with_args_accepts_objects_only() {
        let call = ToolCallData::new("c", "t").with_args(serde_json::json!({"path": "/x"}));
        assert_eq!(call.args.get("path").and_then(|v| v.as_str()), Some("/x"));
        let ignored = ToolCallData::new("c", "t").with_args(serde_json::json!([1, 2]));
        assert!(ignored.args.is_empty());
    }

    #[test]
    fn message_serialization_omits_empty_fields() {
        let json = serde_json::to_string(&ChatMessage::user("hi")).unwrap();
        assert!(!json.contains("tool_calls"), "{json}");
        assert!(!json.contains("name"), "{json}");
    }

    #[test]
    fn message_round_trip_with_calls() {
        let m = ChatMessage::assistant_with_calls(
            "running",
            vec![ToolCallData::new("c1", "grep_search")
                .with_args(serde_json::json!({"pattern": "fn main"}))],
        );
        let json = serde_json::to_string(&m).unwrap();
        let back: ChatMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tool_calls.len(), 1);
        assert_eq!(back.tool_calls[0].name, "grep_search");
    }

    #[test]
    fn usage_totals_accumulate() {
        let mut totals = UsageTotals::default();
        totals.add(TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        });
        totals.add(TokenUsage {
            prompt_tokens: 3,
            completion_tokens: 2,
            total_tokens: 5,
        });
        assert_eq!(totals.prompt_tokens, 13);
        assert_eq!(totals.total(), 20);
    }
}
