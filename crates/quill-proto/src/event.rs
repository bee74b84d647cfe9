// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session lifecycle status values carried by [`Event::Status`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    EngineReady,
    SessionReady,
    Thinking,
    RunningTools,
    Done,
    BudgetExceeded,
    Disconnected,
}

/// Where a piece of assistant text came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TextSource {
    /// A streamed fragment.
    Delta,
    /// A complete assistant message.
    Assistant,
    /// The summary argument of the `respond` sentinel tool.
    #[serde(rename = "respond.summary")]
    RespondSummary,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolPhase {
    Start,
    End,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Started,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
    Command,
    Complete,
}

/// History compression telemetry kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    Compress,
    Summarize,
}

/// One turn in a `session_history` reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnSummary {
    pub role: String,
    pub text: String,
}

/// An outbound event record.
///
/// Field names are lowercase underscore; empty optional fields are omitted
/// rather than serialized as `null`.  Session-scoped events always carry
/// `session_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Status {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        status: StatusKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    AssistantText {
        session_id: String,
        content: String,
        source: TextSource,
        #[serde(
            rename = "final",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        is_final: Option<bool>,
    },
    ToolEvent {
        session_id: String,
        tool: String,
        phase: ToolPhase,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        success: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
    /// Rich UI-oriented activity record.
    Activity {
        session_id: String,
        activity_id: u64,
        activity_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
        status: ActivityStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code_change: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        started_at: Option<DateTime<Utc>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        completed_at: Option<DateTime<Utc>>,
    },
    ToolOutput {
        session_id: String,
        invocation_id: String,
        tool: String,
        output: String,
        is_error: bool,
        stream: OutputStream,
    },
    FilesChanged {
        session_id: String,
        files: Vec<String>,
    },
    Context {
        session_id: String,
        kind: ContextKind,
        description: String,
        before: u64,
        after: u64,
    },
    TokenUsage {
        session_id: String,
        prompt_tokens: u64,
        limit: u64,
        total: u64,
    },
    SetupRequired {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    ConfigLoaded {
        config: std::collections::HashMap<String, String>,
    },
    ConfigReloaded {
        session_id: String,
    },
    ProjectPermissionRequired {
        session_id: String,
    },
    SessionHistory {
        session_id: String,
        turns: Vec<TurnSummary>,
    },
    Cancelled {
        session_id: String,
    },
    Done {
        session_id: String,
        summary: String,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        kind: Option<String>,
    },
}

impl Event {
    /// Convenience constructor for a session-scoped status event.
    pub fn status(session_id: impl Into<String>, status: StatusKind) -> Self {
        Event::Status {
            session_id: Some(session_id.into()),
            status,
            detail: None,
        }
    }

    /// Convenience constructor for a session-less error event.
    pub fn error(message: impl Into<String>) -> Self {
        Event::Error {
            session_id: None,
            message: message.into(),
            kind: None,
        }
    }

    /// Convenience constructor for a session-scoped error event.
    pub fn session_error(
        session_id: impl Into<String>,
        message: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Event::Error {
            session_id: Some(session_id.into()),
            message: message.into(),
            kind: Some(kind.into()),
        }
    }
}

/// Encode an event as exactly one `\n`-terminated line.
///
/// Serialization of the event enums cannot fail (no non-string map keys,
/// no non-finite floats), so this is infallible.
pub fn encode_event(event: &Event) -> String {
    let mut line = serde_json::to_string(event).unwrap_or_else(|e| {
        // Unreachable for the types above; keep the stream alive regardless.
        format!(r#"{{"type":"error","message":"event encoding failed: {e}"}}"#)
    });
    line.push('\n');
    line
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
