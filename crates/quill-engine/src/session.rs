// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use quill_config::{ProjectConfig, UserConfig};
use quill_core::{
    system_prompt, AgentLoop, BeaconCache, BeaconTool, History, LoopOutcome, Phase,
};
use quill_model::{ChatMessage, ModelClient, ModelError, UsageTotals};
use quill_proto::{Command, Event, StatusKind, TextSource, TurnSummary};
use quill_tools::{builtin::standard_tools, ToolRegistry, ToolSet};

use crate::events::EventHooks;
use crate::factory::{ClientFactory, SwappableClient};

/// Everything a session knows about itself between requests.
pub struct SessionState {
    pub id: String,
    pub repo_root: PathBuf,
    pub model_name: String,
    /// `None` only while a request task owns the history.
    pub history: Option<History>,
    pub phase: Phase,
    pub step_index: u32,
    pub done: bool,
    pub totals: UsageTotals,
    pub config: UserConfig,
    pub project: ProjectConfig,
}

/// The in-flight request, if any.  At most one per session.
struct ActiveRequest {
    handle: JoinHandle<(History, Result<LoopOutcome, ModelError>)>,
    cancel: CancellationToken,
    hooks: Arc<EventHooks>,
}

/// Command-channel handle the bridge uses to reach a session.
#[derive(Clone)]
pub struct SessionHandle {
    pub id: String,
    pub commands: mpsc::Sender<Command>,
}

/// One conversation: owns the history, the active request task, the
/// cancellation signal, and the session's slice of the outbound queue.
/// Commands are handled serially; only `cancel_request` reaches into an
/// in-flight request (via its token).
pub struct SessionOrchestrator {
    state: SessionState,
    client: Arc<SwappableClient>,
    factory: Arc<dyn ClientFactory>,
    registry: Arc<ToolRegistry>,
    commands: mpsc::Receiver<Command>,
    events: mpsc::Sender<Event>,
    session_token: CancellationToken,
    active: Option<ActiveRequest>,
    /// Factory failure captured at construction; reported once as
    /// `setup_required` (the session then runs on the mock client).
    setup_error: Option<String>,
    /// True when the project config exists but the indexing consent
    /// prompt was never answered.
    permission_pending: bool,
}

impl SessionOrchestrator {
    /// Build a session and return its command handle.  The caller spawns
    /// [`SessionOrchestrator::run`] on its own task.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        repo_root: PathBuf,
        config: UserConfig,
        project: ProjectConfig,
        factory: Arc<dyn ClientFactory>,
        beacon_cache: Arc<BeaconCache>,
        events: mpsc::Sender<Event>,
        session_token: CancellationToken,
        permission_pending: bool,
    ) -> (Self, SessionHandle) {
        let mut setup_error = None;
        let inner = factory.build(&config).unwrap_or_else(|e| {
            setup_error = Some(e.to_string());
            Arc::new(quill_model::MockClient)
        });
        let client = Arc::new(SwappableClient::new(inner));

        let beacon_client: Arc<dyn ModelClient> = client.clone();
        let mut tools = standard_tools(&repo_root, ToolSet::all());
        tools.push(Arc::new(BeaconTool::new(
            beacon_client,
            repo_root.clone(),
            config.engine.clone(),
            beacon_cache,
        )));
        let registry = Arc::new(ToolRegistry::with_toolset(tools, ToolSet::all()));

        let mut history = History::new();
        let rules = project.rules.as_deref();
        if let Err(e) = history.append(ChatMessage::system(system_prompt(
            &repo_root.display().to_string(),
            rules,
        ))) {
            // Fresh history; cannot actually fail.
            error!(session_id = %id, "seeding system prompt failed: {e}");
        }

        let state = SessionState {
            id: id.clone(),
            repo_root,
            model_name: config.model.clone(),
            history: Some(history),
            phase: Phase::default(),
            step_index: 0,
            done: false,
            totals: UsageTotals::default(),
            config,
            project,
        };

        let (tx, rx) = mpsc::channel(64);
        let orchestrator = Self {
            state,
            client,
            factory,
            registry,
            commands: rx,
            events,
            session_token,
            active: None,
            setup_error,
            permission_pending,
        };
        (orchestrator, SessionHandle { id, commands: tx })
    }

    /// Turn summaries for a `session_history` reply.
    pub fn turn_summaries(history: &History) -> Vec<TurnSummary> {
        history
            .messages()
            .iter()
            .map(|m| {
                let role = match m.role {
                    quill_model::Role::System => "system",
                    quill_model::Role::User => "user",
                    quill_model::Role::Assistant => "assistant",
                    quill_model::Role::Tool => "tool",
                };
                let mut text: String = m.content.chars().take(200).collect();
                if text.len() < m.content.len() {
                    text.push('…');
                }
                TurnSummary {
                    role: role.into(),
                    text,
                }
            })
            .collect()
    }

    /// Serial command loop.  Exits when the bridge drops the command
    /// sender; an in-flight request is cancelled and awaited first.
    pub async fn run(mut self) {
        info!(session_id = %self.state.id, "session started");
        self.emit(Event::status(&self.state.id, StatusKind::SessionReady))
            .await;
        if let Some(detail) = self.setup_error.take() {
            self.emit(Event::SetupRequired {
                session_id: Some(self.state.id.clone()),
                detail: Some(detail),
            })
            .await;
        }
        if self.permission_pending {
            self.emit(Event::ProjectPermissionRequired {
                session_id: self.state.id.clone(),
            })
            .await;
        }
        loop {
            if let Some(mut request) = self.active.take() {
                tokio::select! {
                    finished = &mut request.handle => {
                        self.finish_request(finished, request.hooks).await;
                    }
                    command = self.commands.recv() => match command {
                        Some(command) => {
                            self.handle_while_busy(command, &request).await;
                            self.active = Some(request);
                        }
                        None => {
                            // Bridge is gone; cancel the request and wait.
                            request.cancel.cancel();
                            let finished = (&mut request.handle).await;
                            self.finish_request(finished, request.hooks).await;
                            break;
                        }
                    }
                }
            } else {
                match self.commands.recv().await {
                    Some(command) => self.handle_idle(command).await,
                    None => break,
                }
            }
        }
        info!(session_id = %self.state.id, "session ended");
    }

    async fn handle_idle(&mut self, command: Command) {
        match command {
            Command::UserMessage { message, .. } => self.start_request(message).await,
            Command::CancelRequest { .. } => {
                debug!(session_id = %self.state.id, "cancel with no request in flight; ignoring");
            }
            Command::ReloadConfig { .. } => self.reload_config().await,
            Command::ProjectPermission {
                indexing_enabled, ..
            } => self.resolve_permission(indexing_enabled).await,
            // Re-adoption of a live session: confirm and replay the turns.
            Command::StartSession { .. } => {
                self.emit(Event::status(&self.state.id, StatusKind::SessionReady))
                    .await;
                if let Some(history) = &self.state.history {
                    self.emit(Event::SessionHistory {
                        session_id: self.state.id.clone(),
                        turns: Self::turn_summaries(history),
                    })
                    .await;
                }
            }
            other => {
                warn!(session_id = %self.state.id, command = other.type_name(), "unroutable command");
            }
        }
    }

    async fn handle_while_busy(&mut self, command: Command, request: &ActiveRequest) {
        match command {
            Command::CancelRequest { .. } => {
                debug!(session_id = %self.state.id, "cancelling in-flight request");
                request.cancel.cancel();
            }
            Command::UserMessage { .. } => {
                self.emit(Event::session_error(
                    &self.state.id,
                    "a request is already in flight; cancel it first",
                    "busy",
                ))
                .await;
            }
            // Reload swaps the client immediately; the next loop step uses it.
            Command::ReloadConfig { .. } => self.reload_config().await,
            Command::ProjectPermission {
                indexing_enabled, ..
            } => self.resolve_permission(indexing_enabled).await,
            Command::StartSession { .. } => {
                // The request task owns the history; confirm without turns.
                self.emit(Event::status(&self.state.id, StatusKind::SessionReady))
                    .await;
            }
            other => {
                warn!(session_id = %self.state.id, command = other.type_name(), "unroutable command");
            }
        }
    }

    async fn start_request(&mut self, message: String) {
        let Some(mut history) = self.state.history.take() else {
            self.emit(Event::session_error(
                &self.state.id,
                "session history unavailable",
                "internal",
            ))
            .await;
            return;
        };
        if let Err(e) = history.append(ChatMessage::user(message)) {
            self.emit(Event::session_error(
                &self.state.id,
                format!("cannot append user message: {e}"),
                "internal",
            ))
            .await;
            self.state.history = Some(history);
            return;
        }

        let hooks = Arc::new(EventHooks::new(
            self.state.id.clone(),
            self.state.config.engine.context_tokens,
            self.events.clone(),
        ));
        let model: Arc<dyn ModelClient> = self.client.clone();
        let loop_hooks: Arc<dyn quill_core::AgentHooks> = hooks.clone();
        let agent = AgentLoop::new(
            model,
            Arc::clone(&self.registry),
            self.state.config.engine.clone(),
            loop_hooks,
        );
        let cancel = self.session_token.child_token();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let result = agent.run(&mut history, &task_cancel).await;
            (history, result)
        });
        self.state.done = false;
        self.active = Some(ActiveRequest {
            handle,
            cancel,
            hooks,
        });
    }

    /// Fold the finished request back into session state and emit exactly
    /// one terminal event.
    async fn finish_request(
        &mut self,
        finished: Result<(History, Result<LoopOutcome, ModelError>), tokio::task::JoinError>,
        hooks: Arc<EventHooks>,
    ) {
        let (history, result) = match finished {
            Ok(pair) => pair,
            Err(e) => {
                // The request task itself died; history is lost, which is
                // an invariant violation for the session.
                error!(session_id = %self.state.id, "request task panicked: {e}");
                self.emit(Event::session_error(
                    &self.state.id,
                    format!("request task panicked: {e}"),
                    "internal",
                ))
                .await;
                let mut fresh = History::new();
                let _ = fresh.append(ChatMessage::system(system_prompt(
                    &self.state.repo_root.display().to_string(),
                    self.state.project.rules.as_deref(),
                )));
                self.state.history = Some(fresh);
                return;
            }
        };
        self.state.history = Some(history);
        let (phase, step_index, totals) = hooks.snapshot();
        self.state.phase = phase;
        self.state.step_index = step_index;
        self.state.totals = totals;

        match result {
            Ok(LoopOutcome::Done {
                summary,
                via_respond,
            }) => {
                self.state.done = true;
                if via_respond {
                    self.emit(Event::AssistantText {
                        session_id: self.state.id.clone(),
                        content: summary.clone(),
                        source: TextSource::RespondSummary,
                        is_final: Some(true),
                    })
                    .await;
                }
                self.emit(Event::Done {
                    session_id: self.state.id.clone(),
                    summary,
                })
                .await;
            }
            Ok(LoopOutcome::BudgetExceeded) => {
                self.state.done = false;
                self.emit(Event::status(&self.state.id, StatusKind::BudgetExceeded))
                    .await;
            }
            Ok(LoopOutcome::Cancelled) => {
                self.state.done = false;
                self.emit(Event::Cancelled {
                    session_id: self.state.id.clone(),
                })
                .await;
            }
            Err(e) => {
                self.state.done = false;
                self.emit(Event::session_error(
                    &self.state.id,
                    e.to_string(),
                    e.kind(),
                ))
                .await;
            }
        }
    }

    async fn reload_config(&mut self) {
        match quill_config::load_user_config() {
            Ok(config) => {
                match self.factory.build(&config) {
                    Ok(client) => {
                        self.client.swap(client);
                        self.state.model_name = config.model.clone();
                        self.state.config = config;
                        self.emit(Event::ConfigReloaded {
                            session_id: self.state.id.clone(),
                        })
                        .await;
                    }
                    Err(e) => {
                        self.emit(Event::session_error(
                            &self.state.id,
                            format!("config reload failed: {e}"),
                            "config",
                        ))
                        .await;
                    }
                }
            }
            Err(e) => {
                self.emit(Event::session_error(
                    &self.state.id,
                    format!("config reload failed: {e}"),
                    "config",
                ))
                .await;
            }
        }
    }

    async fn resolve_permission(&mut self, indexing_enabled: bool) {
        self.state.project.indexing_enabled = Some(indexing_enabled);
        if let Err(e) =
            quill_config::save_project_config(&self.state.repo_root, &self.state.project)
        {
            warn!(session_id = %self.state.id, "could not persist project permission: {e}");
        }
        debug!(session_id = %self.state.id, indexing_enabled, "project permission resolved");
    }

    async fn emit(&self, event: Event) {
        let _ = self.events.send(event).await;
    }
}
