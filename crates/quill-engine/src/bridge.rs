// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use quill_config::UserConfig;
use quill_core::BeaconCache;
use quill_proto::{decode_command, encode_event, Command, Event, StatusKind};

use crate::factory::ClientFactory;
use crate::session::{SessionHandle, SessionOrchestrator};

/// Engine-level wiring the bridge needs to create sessions.
pub struct BridgeOptions {
    pub factory: Arc<dyn ClientFactory>,
    /// When set, sessions use this config instead of loading the user's
    /// config file.  Tests rely on it for hermetic runs.
    pub config: Option<UserConfig>,
}

/// Serve the protocol on stdin/stdout until EOF.
pub async fn run_stdio(options: BridgeOptions) -> anyhow::Result<()> {
    let reader = BufReader::new(tokio::io::stdin());
    let writer = tokio::io::stdout();
    run_bridge(reader, writer, options).await
}

/// Single reader of command lines, single writer of event lines.
///
/// Each decoded command is routed by `session_id`; `start_session`
/// creates sessions, everything else without a known id is rejected with
/// an `error` event.  EOF on the reader cancels all sessions, waits for
/// them to finish, and drains the writer before returning.
pub async fn run_bridge<R, W>(reader: R, writer: W, options: BridgeOptions) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (event_tx, event_rx) = mpsc::channel::<Event>(256);
    let writer_task = tokio::spawn(write_events(writer, event_rx));

    let root_token = CancellationToken::new();
    let beacon_cache = Arc::new(BeaconCache::default());
    let mut sessions: HashMap<String, SessionHandle> = HashMap::new();
    let mut session_tasks: Vec<JoinHandle<()>> = Vec::new();

    let _ = event_tx
        .send(Event::Status {
            session_id: None,
            status: StatusKind::EngineReady,
            detail: None,
        })
        .await;

    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match decode_command(&line) {
            Ok(command) => command,
            Err(e) => {
                debug!("rejecting undecodable line: {e}");
                let _ = event_tx
                    .send(Event::Error {
                        session_id: None,
                        message: e.to_string(),
                        kind: Some("decode".into()),
                    })
                    .await;
                continue;
            }
        };

        match command {
            Command::StartSession {
                session_id,
                repo_root,
                config,
                ..
            } => {
                let id = session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                if let Some(handle) = sessions.get(&id) {
                    // Adoption of a live session; the orchestrator replies.
                    let _ = handle
                        .commands
                        .send(Command::StartSession {
                            session_id: Some(id.clone()),
                            repo_root,
                            meta: None,
                            config: None,
                        })
                        .await;
                    continue;
                }
                let mut user_config = match &options.config {
                    Some(config) => config.clone(),
                    None => quill_config::load_user_config().unwrap_or_default(),
                };
                if let Some(overrides) = &config {
                    user_config.apply_overrides(overrides);
                }
                let repo_root = PathBuf::from(repo_root);
                let project = quill_config::load_project_config(&repo_root).unwrap_or_default();
                let permission_pending = repo_root.join(".quill").join("project.json").is_file()
                    && project.indexing_enabled.is_none();

                let (orchestrator, handle) = SessionOrchestrator::new(
                    id.clone(),
                    repo_root,
                    user_config,
                    project,
                    Arc::clone(&options.factory),
                    Arc::clone(&beacon_cache),
                    event_tx.clone(),
                    root_token.child_token(),
                    permission_pending,
                );
                info!(session_id = %id, "creating session");
                session_tasks.push(tokio::spawn(orchestrator.run()));
                sessions.insert(id, handle);
            }
            Command::SaveConfig { config } => {
                let mut user_config = match &options.config {
                    Some(config) => config.clone(),
                    None => quill_config::load_user_config().unwrap_or_default(),
                };
                user_config.apply_overrides(&config);
                if let Err(e) = quill_config::save_user_config(&user_config) {
                    let _ = event_tx
                        .send(Event::Error {
                            session_id: None,
                            message: format!("could not save config: {e}"),
                            kind: Some("config".into()),
                        })
                        .await;
                    continue;
                }
                // Live sessions rebuild their clients from the new config.
                for handle in sessions.values() {
                    let _ = handle
                        .commands
                        .send(Command::ReloadConfig {
                            session_id: handle.id.clone(),
                        })
                        .await;
                }
            }
            Command::GetConfig {} => {
                let user_config = match &options.config {
                    Some(config) => config.clone(),
                    None => quill_config::load_user_config().unwrap_or_default(),
                };
                let _ = event_tx
                    .send(Event::ConfigLoaded {
                        config: user_config.to_string_map(),
                    })
                    .await;
            }
            session_command => {
                let Some(id) = session_command.session_id().map(str::to_string) else {
                    continue;
                };
                match sessions.get(&id) {
                    Some(handle) => {
                        if handle.commands.send(session_command).await.is_err() {
                            warn!(session_id = %id, "session task is gone");
                            sessions.remove(&id);
                        }
                    }
                    None => {
                        let _ = event_tx
                            .send(Event::Error {
                                session_id: Some(id),
                                message: "unknown session".into(),
                                kind: Some("routing".into()),
                            })
                            .await;
                    }
                }
            }
        }
    }

    // Input closed: orderly shutdown.  Cancelling the root token aborts
    // in-flight requests; dropping the handles ends the command loops.
    info!("input closed; shutting down {} session(s)", sessions.len());
    root_token.cancel();
    sessions.clear();
    for task in session_tasks {
        let _ = task.await;
    }
    let _ = event_tx
        .send(Event::Status {
            session_id: None,
            status: StatusKind::Disconnected,
            detail: None,
        })
        .await;
    drop(event_tx);
    writer_task.await??;
    Ok(())
}

/// The single writer: drains the shared queue so no two events can
/// interleave mid-line, flushing after every event.
async fn write_events<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut events: mpsc::Receiver<Event>,
) -> std::io::Result<()> {
    while let Some(event) = events.recv().await {
        writer.write_all(encode_event(&event).as_bytes()).await?;
        writer.flush().await?;
    }
    writer.shutdown().await
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::DefaultClientFactory;

    /// Drive the bridge with scripted input lines; returns decoded events.
    async fn run_with_input(input: String) -> Vec<Event> {
        let reader = BufReader::new(std::io::Cursor::new(input.into_bytes()));
        let (write_half, mut read_rx) = collecting_writer();
        let options = BridgeOptions {
            factory: Arc::new(DefaultClientFactory),
            config: Some(UserConfig::default()),
        };
        run_bridge(reader, write_half, options).await.unwrap();

        let mut bytes = Vec::new();
        while let Some(chunk) = read_rx.recv().await {
            bytes.extend_from_slice(&chunk);
        }
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str::<Event>(l).expect("valid event line"))
            .collect()
    }

    /// An AsyncWrite that forwards each write to a channel.
    fn collecting_writer() -> (impl AsyncWrite + Unpin + Send + 'static, mpsc::Receiver<Vec<u8>>)
    {
        use std::pin::Pin;
        use std::task::{Context, Poll};

        struct ChanWriter(mpsc::UnboundedSender<Vec<u8>>);
        impl AsyncWrite for ChanWriter {
            fn poll_write(
                self: Pin<&mut Self>,
                _cx: &mut Context<'_>,
                buf: &[u8],
            ) -> Poll<std::io::Result<usize>> {
                let _ = self.0.send(buf.to_vec());
                Poll::Ready(Ok(buf.len()))
            }
            fn poll_flush(
                self: Pin<&mut Self>,
                _cx: &mut Context<'_>,
            ) -> Poll<std::io::Result<()>> {
                Poll::Ready(Ok(()))
            }
            fn poll_shutdown(
                self: Pin<&mut Self>,
                _cx: &mut Context<'_>,
            ) -> Poll<std::io::Result<()>> {
                Poll::Ready(Ok(()))
            }
        }

        let (tx, urx) = mpsc::unbounded_channel();
        let (btx, brx) = mpsc::channel(1024);
        tokio::spawn(async move {
            let mut urx = urx;
            while let Some(chunk) = urx.recv().await {
                if btx.send(chunk).await.is_err() {
                    break;
                }
            }
        });
        (ChanWriter(tx), brx)
    }

    fn session_events<'a>(events: &'a [Event], only: &[&str]) -> Vec<&'a Event> {
        events
            .iter()
            .filter(|e| {
                let tag = match e {
                    Event::Status { status, .. } => match status {
                        StatusKind::SessionReady => "session_ready",
                        StatusKind::Thinking => "thinking",
                        StatusKind::BudgetExceeded => "budget_exceeded",
                        StatusKind::EngineReady => "engine_ready",
                        StatusKind::RunningTools => "running_tools",
                        StatusKind::Done => "done_status",
                        StatusKind::Disconnected => "disconnected",
                    },
                    Event::AssistantText { .. } => "assistant_text",
                    Event::Done { .. } => "done",
                    Event::Cancelled { .. } => "cancelled",
                    Event::Error { .. } => "error",
                    _ => "other",
                };
                only.contains(&tag)
            })
            .collect()
    }

    // ── S1: hello round-trip ──────────────────────────────────────────────────

    #[tokio::test]
    async fn s1_text_only_session() {
        // The mock client echoes the last user message; non-streaming is
        // not needed because MockClient emits one delta then usage.
        let input = concat!(
            r#"{"type":"start_session","session_id":"s1","repo_root":"/r"}"#,
            "\n",
            r#"{"type":"user_message","session_id":"s1","message":"hi"}"#,
            "\n",
        )
        .to_string();
        let events = run_with_input(input).await;

        let interesting = session_events(
            &events,
            &["session_ready", "thinking", "assistant_text", "done"],
        );
        // session_ready, thinking, delta, final assistant_text, done.
        assert!(matches!(
            interesting[0],
            Event::Status {
                status: StatusKind::SessionReady,
                ..
            }
        ));
        assert!(matches!(
            interesting[1],
            Event::Status {
                status: StatusKind::Thinking,
                ..
            }
        ));
        let finals: Vec<&&Event> = interesting
            .iter()
            .filter(|e| matches!(e, Event::AssistantText { is_final: Some(true), .. }))
            .collect();
        assert_eq!(finals.len(), 1);
        match interesting.last().unwrap() {
            Event::Done { summary, .. } => assert!(summary.contains("MOCK: hi")),
            other => panic!("expected done last, got {other:?}"),
        }
    }

    // ── Terminal events are exactly-once (P3) ─────────────────────────────────

    #[tokio::test]
    async fn p3_single_terminal_event_per_request() {
        let input = concat!(
            r#"{"type":"start_session","session_id":"s1","repo_root":"/r"}"#,
            "\n",
            r#"{"type":"user_message","session_id":"s1","message":"one"}"#,
            "\n",
            r#"{"type":"user_message","session_id":"s1","message":"two"}"#,
            "\n",
        )
        .to_string();
        let events = run_with_input(input).await;
        let terminals = events
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    Event::Done { .. }
                        | Event::Cancelled { .. }
                        | Event::Status {
                            status: StatusKind::BudgetExceeded,
                            ..
                        }
                )
            })
            .count();
        // The second message may race the first request and be rejected as
        // busy; either way every ACCEPTED request gets exactly one terminal
        // event.
        let busy = events
            .iter()
            .filter(|e| matches!(e, Event::Error { kind: Some(k), .. } if k == "busy"))
            .count();
        assert_eq!(terminals + busy, 2, "terminal or rejection per message");
        assert!(terminals >= 1);
    }

    // ── Decode errors never kill the bridge (§4.1) ────────────────────────────

    #[tokio::test]
    async fn undecodable_lines_produce_error_events_and_stream_survives() {
        let input = concat!(
            "this is not json\n",
            r#"{"type":"warp_drive"}"#,
            "\n",
            r#"{"type":"user_message","session_id":"","message":"x"}"#,
            "\n",
            r#"{"type":"start_session","session_id":"s1","repo_root":"/r"}"#,
            "\n",
        )
        .to_string();
        let events = run_with_input(input).await;
        let errors = events
            .iter()
            .filter(|e| matches!(e, Event::Error { kind: Some(k), .. } if k == "decode"))
            .count();
        assert_eq!(errors, 3);
        // The session after the garbage still came up.
        assert!(events.iter().any(|e| matches!(
            e,
            Event::Status {
                status: StatusKind::SessionReady,
                ..
            }
        )));
    }

    // ── Unknown session ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn commands_for_unknown_session_are_rejected() {
        let input = concat!(
            r#"{"type":"user_message","session_id":"ghost","message":"x"}"#,
            "\n",
        )
        .to_string();
        let events = run_with_input(input).await;
        assert!(events.iter().any(|e| matches!(
            e,
            Event::Error { session_id: Some(sid), kind: Some(k), .. }
                if sid == "ghost" && k == "routing"
        )));
    }

    // ── get_config / save_config ──────────────────────────────────────────────

    #[tokio::test]
    async fn get_config_replies_with_config_loaded() {
        let input = concat!(r#"{"type":"get_config"}"#, "\n").to_string();
        let events = run_with_input(input).await;
        assert!(events.iter().any(|e| matches!(
            e,
            Event::ConfigLoaded { config } if config.get("provider").map(String::as_str) == Some("mock")
        )));
    }

    // ── Shutdown drains writer ────────────────────────────────────────────────

    #[tokio::test]
    async fn eof_emits_engine_ready_first_and_disconnected_last() {
        let events = run_with_input(String::new()).await;
        assert!(matches!(
            events.first().unwrap(),
            Event::Status {
                status: StatusKind::EngineReady,
                ..
            }
        ));
        assert!(matches!(
            events.last().unwrap(),
            Event::Status {
                status: StatusKind::Disconnected,
                ..
            }
        ));
    }

    // ── Every emitted line is valid NDJSON ────────────────────────────────────

    #[tokio::test]
    async fn all_output_lines_decode_as_events() {
        let input = concat!(
            r#"{"type":"start_session","session_id":"s1","repo_root":"/r"}"#,
            "\n",
            r#"{"type":"user_message","session_id":"s1","message":"check framing"}"#,
            "\n",
        )
        .to_string();
        // run_with_input already fails the test if any line is not a
        // decodable Event; this asserts there was meaningful output.
        let events = run_with_input(input).await;
        assert!(events.len() >= 4);
    }
}
