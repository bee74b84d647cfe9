// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use quill_config::EngineConfig;
use quill_model::{
    ChatMessage, ChatOptions, ChatRequest, ModelClient, ModelError, RetryPolicy, StreamEvent,
    TokenUsage, ToolCallData, ToolSpec,
};
use quill_tools::ToolRegistry;

use crate::{
    detect_phase, execute_batch, AgentHooks, History, KeepLastN, Processor, SummarizePrefix,
    TruncateToolOutputs,
};

/// How a request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The model declared completion — either by answering without tool
    /// calls or by calling the `respond` sentinel.
    Done { summary: String, via_respond: bool },
    /// The step ceiling was reached without completion.
    BudgetExceeded,
    /// The request's cancellation token fired.
    Cancelled,
}

/// The Reason-and-Act step machine.
///
/// One instance per session; `run` drives a single request on the
/// orchestrator's task, mutating the session history it is handed.
pub struct AgentLoop {
    model: Arc<dyn ModelClient>,
    registry: Arc<ToolRegistry>,
    config: EngineConfig,
    retry: RetryPolicy,
    hooks: Arc<dyn AgentHooks>,
}

impl AgentLoop {
    pub fn new(
        model: Arc<dyn ModelClient>,
        registry: Arc<ToolRegistry>,
        config: EngineConfig,
        hooks: Arc<dyn AgentHooks>,
    ) -> Self {
        let retry = RetryPolicy::new(config.max_attempts);
        Self {
            model,
            registry,
            config,
            retry,
            hooks,
        }
    }

    /// Replace the model client; the next step uses the new one.
    /// History is untouched.
    pub fn set_model(&mut self, model: Arc<dyn ModelClient>) {
        self.model = model;
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Run the loop until completion, budget exhaustion, hard failure, or
    /// cancellation.
    ///
    /// One step: detect phase, build the prompt under the token budget,
    /// call the model, append the assistant message, answer malformed
    /// calls in-band, execute the rest, append results in call order, and
    /// check for completion.
    pub async fn run(
        &self,
        history: &mut History,
        cancel: &CancellationToken,
    ) -> Result<LoopOutcome, ModelError> {
        for step in 0..self.config.max_steps {
            if cancel.is_cancelled() {
                return Ok(LoopOutcome::Cancelled);
            }

            let phase = detect_phase(history.messages(), &self.registry);
            self.hooks.on_step_start(step, phase).await;

            // Prompt construction under the token budget.  The stored
            // history is never mutated by the processors.
            let estimator = history.estimator();
            let processors: Vec<Arc<dyn Processor>> = vec![
                Arc::new(KeepLastN::new(self.config.keep_last_n, estimator)),
                Arc::new(TruncateToolOutputs::new(
                    self.config.tool_output_cap_chars,
                    estimator,
                )),
                Arc::new(SummarizePrefix::new(
                    Arc::clone(&self.model),
                    self.config.keep_last_n,
                    self.config.context_tokens,
                    estimator,
                )),
            ];
            let (messages, reports) = history.prepare_for_call(&processors).await;
            for report in &reports {
                self.hooks.on_budget_compression(report).await;
            }
            self.hooks.on_before_llm(messages.len()).await;

            let request = ChatRequest {
                model: self.model.model_name().to_string(),
                messages,
                tools: self.tool_specs(),
                options: ChatOptions::default(),
            };

            let turn = if self.config.streaming {
                self.stream_turn(request, cancel).await?
            } else {
                self.chat_turn(request, cancel).await?
            };
            let Some((text, tool_calls, usage)) = turn else {
                // Cancelled mid-call; partial results are discarded.
                return Ok(LoopOutcome::Cancelled);
            };

            if let Some(usage) = usage {
                self.hooks.on_usage(usage).await;
            }
            self.hooks.on_after_llm(&text, &tool_calls).await;

            if !text.is_empty() || !tool_calls.is_empty() {
                let assistant = if tool_calls.is_empty() {
                    ChatMessage::assistant(text.clone())
                } else {
                    ChatMessage::assistant_with_calls(text.clone(), tool_calls.clone())
                };
                history.append(assistant).map_err(internal)?;
            }
            // Fires every step, appended message or not (fixed hook order).
            self.hooks.on_history_changed().await;

            if tool_calls.is_empty() {
                self.hooks.on_done(&text).await;
                return Ok(LoopOutcome::Done {
                    summary: text,
                    via_respond: false,
                });
            }

            for call in &tool_calls {
                self.hooks.on_tool_call(call).await;
            }

            let outputs = execute_batch(
                &tool_calls,
                &self.registry,
                self.config.tool_timeout(),
                &self.retry,
                cancel,
            )
            .await;

            // Append results in call order; failures become ERROR: entries
            // and the loop continues.
            let mut respond_summary = None;
            for (call, output) in tool_calls.iter().zip(outputs) {
                let is_error = output.is_error;
                let content = if is_error {
                    format!("ERROR: Tool {} failed - {}", call.name, output.content)
                } else {
                    output.content
                };
                history
                    .append(ChatMessage::tool_result(&call.id, &content))
                    .map_err(internal)?;
                self.hooks
                    .on_tool_result(&call.id, &call.name, &content, is_error)
                    .await;
                self.hooks.on_history_changed().await;
                if call.name == "respond" && !is_error {
                    respond_summary = Some(content);
                }
            }

            // A cancel that fired during tool execution has already filled
            // the result slots, so every fan-out is answered and the model
            // can be re-prompted later.
            if cancel.is_cancelled() {
                return Ok(LoopOutcome::Cancelled);
            }

            if let Some(summary) = respond_summary {
                self.hooks.on_done(&summary).await;
                return Ok(LoopOutcome::Done {
                    summary,
                    via_respond: true,
                });
            }
            debug!(step, tool_rounds = step + 1, "step complete, looping");
        }

        warn!(
            max_steps = self.config.max_steps,
            "step ceiling reached without completion"
        );
        Ok(LoopOutcome::BudgetExceeded)
    }

    fn tool_specs(&self) -> Vec<ToolSpec> {
        self.registry
            .schemas()
            .into_iter()
            .map(|s| ToolSpec {
                name: s.name,
                description: s.description,
                parameters: s.parameters,
            })
            .collect()
    }

    /// One streaming model call.  `None` means the request was cancelled.
    async fn stream_turn(
        &self,
        request: ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<Option<(String, Vec<ToolCallData>, Option<TokenUsage>)>, ModelError> {
        let mut stream = {
            let mut attempt = 0u32;
            loop {
                if cancel.is_cancelled() {
                    return Ok(None);
                }
                let attempt_result = tokio::select! {
                    _ = cancel.cancelled() => return Ok(None),
                    result = self.model.stream(request.clone()) => result,
                };
                match attempt_result {
                    Ok(stream) => break stream,
                    Err(e) if e.is_retryable() && attempt + 1 < self.retry.max_attempts => {
                        let delay = self.retry.delay_for(attempt, &e);
                        attempt += 1;
                        self.hooks.on_retry_attempt(attempt, &e.to_string()).await;
                        tokio::select! {
                            _ = cancel.cancelled() => return Ok(None),
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        let mut usage = None;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    // The receive task stops consuming; partials are dropped.
                    return Ok(None);
                }
                event = stream.next() => match event {
                    None => break,
                    Some(Ok(StreamEvent::TextDelta(delta))) => {
                        self.hooks.on_text_delta(&delta).await;
                        text.push_str(&delta);
                    }
                    Some(Ok(StreamEvent::ToolCall(call))) => tool_calls.push(call),
                    Some(Ok(StreamEvent::Usage(u))) => usage = Some(u),
                    Some(Err(e)) => return Err(e),
                }
            }
        }
        Ok(Some((text, tool_calls, usage)))
    }

    /// One non-streaming model call.  `None` means cancelled.
    async fn chat_turn(
        &self,
        request: ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<Option<(String, Vec<ToolCallData>, Option<TokenUsage>)>, ModelError> {
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            let result = tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                result = self.model.chat(request.clone()) => result,
            };
            match result {
                Ok(response) => {
                    return Ok(Some((
                        response.message.content,
                        response.tool_calls,
                        Some(response.usage),
                    )));
                }
                Err(e) if e.is_retryable() && attempt + 1 < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt, &e);
                    attempt += 1;
                    self.hooks.on_retry_attempt(attempt, &e.to_string()).await;
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(None),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn internal(e: crate::HistoryError) -> ModelError {
    ModelError::Internal(format!("history invariant violated: {e}"))
}
