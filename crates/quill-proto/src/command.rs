// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An inbound command record.
///
/// Unknown fields in a record are ignored; an unknown `type` is a
/// [`DecodeError::UnknownType`] which the bridge reports as an `error`
/// event without closing the stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Create (or adopt) a session.  The engine may substitute an
    /// authoritative id when `session_id` is absent.
    StartSession {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        repo_root: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meta: Option<HashMap<String, serde_json::Value>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        config: Option<HashMap<String, String>>,
    },
    /// Append a user message to the session history and start a request.
    UserMessage {
        session_id: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    /// Signal cancellation of the in-flight request.
    CancelRequest { session_id: String },
    /// Persist user configuration (string map merged into the stored file).
    SaveConfig { config: HashMap<String, String> },
    /// Reply with a `config_loaded` event.
    GetConfig {},
    /// Rebuild the model client for a session from the stored config.
    ReloadConfig { session_id: String },
    /// Resolve a pending project-permission prompt.
    ProjectPermission {
        session_id: String,
        indexing_enabled: bool,
    },
}

impl Command {
    /// The `type` discriminator string for this command.
    pub fn type_name(&self) -> &'static str {
        match self {
            Command::StartSession { .. } => "start_session",
            Command::UserMessage { .. } => "user_message",
            Command::CancelRequest { .. } => "cancel_request",
            Command::SaveConfig { .. } => "save_config",
            Command::GetConfig {} => "get_config",
            Command::ReloadConfig { .. } => "reload_config",
            Command::ProjectPermission { .. } => "project_permission",
        }
    }

    /// The session this command targets, if it is session-scoped.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Command::StartSession { session_id, .. } => session_id.as_deref(),
            Command::UserMessage { session_id, .. }
            | Command::CancelRequest { session_id }
            | Command::ReloadConfig { session_id }
            | Command::ProjectPermission { session_id, .. } => Some(session_id),
            Command::SaveConfig { .. } | Command::GetConfig {} => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("record has no 'type' field")]
    MissingType,
    #[error("unknown command type: {0}")]
    UnknownType(String),
    #[error("{type_name}: missing or empty required field '{field}'")]
    MissingField {
        type_name: &'static str,
        field: &'static str,
    },
}

const KNOWN_TYPES: &[&str] = &[
    "start_session",
    "user_message",
    "cancel_request",
    "save_config",
    "get_config",
    "reload_config",
    "project_permission",
];

/// Decode one line into a [`Command`], validating required fields per type.
///
/// Field presence is enforced by serde; emptiness of required string
/// fields is checked explicitly so that `{"type":"user_message",
/// "session_id":"","message":"x"}` is rejected rather than routed nowhere.
pub fn decode_command(line: &str) -> Result<Command, DecodeError> {
    let value: serde_json::Value = serde_json::from_str(line)?;
    let type_name = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or(DecodeError::MissingType)?;
    if !KNOWN_TYPES.contains(&type_name) {
        return Err(DecodeError::UnknownType(type_name.to_string()));
    }

    let cmd: Command = serde_json::from_value(value)?;
    validate(&cmd)?;
    Ok(cmd)
}

fn validate(cmd: &Command) -> Result<(), DecodeError> {
    let missing = |field| DecodeError::MissingField {
        type_name: cmd.type_name(),
        field,
    };
    match cmd {
        Command::StartSession { repo_root, .. } => {
            if repo_root.is_empty() {
                return Err(missing("repo_root"));
            }
        }
        Command::UserMessage {
            session_id,
            message,
            ..
        } => {
            if session_id.is_empty() {
                return Err(missing("session_id"));
            }
            if message.is_empty() {
                return Err(missing("message"));
            }
        }
        Command::CancelRequest { session_id }
        | Command::ReloadConfig { session_id }
        | Command::ProjectPermission { session_id, .. } => {
            if session_id.is_empty() {
                return Err(missing("session_id"));
            }
        }
        Command::SaveConfig { .. } | Command::GetConfig {} => {}
    }
    Ok(())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Decoding ──────────────────────────────────────────────────────────────

    #[test]
    fn start_session_minimal() {
        let cmd = decode_command(r#"{"type":"start_session","repo_root":"/r"}"#).unwrap();
        match cmd {
            Command::StartSession {
                session_id,
                repo_root,
                ..
            } => {
                assert!(session_id.is_none());
                assert_eq!(repo_root, "/r");
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn start_session_with_adopted_id_and_config() {
        let cmd = decode_command(
            r#"{"type":"start_session","session_id":"s1","repo_root":"/r","config":{"model":"m"}}"#,
        )
        .unwrap();
        match cmd {
            Command::StartSession {
                session_id, config, ..
            } => {
                assert_eq!(session_id.as_deref(), Some("s1"));
                assert_eq!(config.unwrap().get("model").map(String::as_str), Some("m"));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn user_message_decodes() {
        let cmd =
            decode_command(r#"{"type":"user_message","session_id":"s","message":"hi"}"#).unwrap();
        assert_eq!(cmd.session_id(), Some("s"));
        assert_eq!(cmd.type_name(), "user_message");
    }

    #[test]
    fn project_permission_carries_bool() {
        let cmd = decode_command(
            r#"{"type":"project_permission","session_id":"s","indexing_enabled":true}"#,
        )
        .unwrap();
        assert!(matches!(
            cmd,
            Command::ProjectPermission {
                indexing_enabled: true,
                ..
            }
        ));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let cmd = decode_command(
            r#"{"type":"cancel_request","session_id":"s","extra":"ignored","n":1}"#,
        )
        .unwrap();
        assert!(matches!(cmd, Command::CancelRequest { .. }));
    }

    // ── Error cases ───────────────────────────────────────────────────────────

    #[test]
    fn garbage_is_json_error() {
        assert!(matches!(
            decode_command("not json at all"),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn missing_type_field() {
        assert!(matches!(
            decode_command(r#"{"session_id":"s"}"#),
            Err(DecodeError::MissingType)
        ));
    }

    #[test]
    fn unknown_type_is_rejected_with_name() {
        match decode_command(r#"{"type":"warp_drive"}"#) {
            Err(DecodeError::UnknownType(t)) => assert_eq!(t, "warp_drive"),
            other => panic!("expected UnknownType, got {other:?}"),
        }
    }

    #[test]
    fn empty_session_id_rejected() {
        match decode_command(r#"{"type":"user_message","session_id":"","message":"hi"}"#) {
            Err(DecodeError::MissingField { field, .. }) => assert_eq!(field, "session_id"),
            other => panic!("expected MissingField, got {other:?}"),
        }
    }

    #[test]
    fn empty_message_rejected() {
        match decode_command(r#"{"type":"user_message","session_id":"s","message":""}"#) {
            Err(DecodeError::MissingField { field, .. }) => assert_eq!(field, "message"),
            other => panic!("expected MissingField, got {other:?}"),
        }
    }

    #[test]
    fn empty_repo_root_rejected() {
        assert!(matches!(
            decode_command(r#"{"type":"start_session","repo_root":""}"#),
            Err(DecodeError::MissingField {
                field: "repo_root",
                ..
            })
        ));
    }

    #[test]
    fn absent_required_field_is_error() {
        // serde rejects user_message without a message field
        assert!(decode_command(r#"{"type":"user_message","session_id":"s"}"#).is_err());
    }

    // ── Round-trip (P8) ───────────────────────────────────────────────────────

    #[test]
    fn every_command_round_trips_to_equivalent_json() {
        let lines = [
            r#"{"type":"start_session","repo_root":"/r"}"#,
            r#"{"type":"start_session","session_id":"s","repo_root":"/r","config":{"k":"v"}}"#,
            r#"{"type":"user_message","session_id":"s","message":"hi","request_id":"r1"}"#,
            r#"{"type":"cancel_request","session_id":"s"}"#,
            r#"{"type":"save_config","config":{"model":"m"}}"#,
            r#"{"type":"get_config"}"#,
            r#"{"type":"reload_config","session_id":"s"}"#,
            r#"{"type":"project_permission","session_id":"s","indexing_enabled":false}"#,
        ];
        for line in lines {
            let cmd = decode_command(line).unwrap();
            let encoded = serde_json::to_value(&cmd).unwrap();
            let original: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(encoded, original, "round-trip mismatch for {line}");
        }
    }
}
