// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use quill_model::{RetryPolicy, ToolCallData};
use quill_tools::{Tool, ToolInvocation, ToolOutput, ToolRegistry};

/// How long a cancelled batch waits for in-flight tools to notice the
/// signal before their tasks are aborted outright.
const CANCEL_GRACE: Duration = Duration::from_millis(250);

enum Prepared {
    /// The streaming parser flagged the call; it is never dispatched.
    Malformed { id: String, reason: String },
    Unknown { id: String, name: String },
    Running(JoinHandle<ToolOutput>),
}

/// Execute a batch of tool calls concurrently, returning outputs in the
/// input order regardless of completion order.
///
/// - calls with `error` set are answered without dispatch;
/// - unknown tool names fail the call, not the batch;
/// - `retryable` tools are retried per `retry` on failure;
/// - each attempt is bounded by `timeout`;
/// - a cancelled batch fills every unfinished slot with a cancellation
///   error so the caller can still pair every call with an answer.
pub async fn execute_batch(
    calls: &[ToolCallData],
    registry: &Arc<ToolRegistry>,
    timeout: Duration,
    retry: &RetryPolicy,
    cancel: &CancellationToken,
) -> Vec<ToolOutput> {
    // Dispatch phase: every valid call starts immediately.
    let mut prepared = Vec::with_capacity(calls.len());
    for call in calls {
        if let Some(reason) = &call.error {
            prepared.push(Prepared::Malformed {
                id: call.id.clone(),
                reason: reason.clone(),
            });
            continue;
        }
        match registry.get(&call.name) {
            None => prepared.push(Prepared::Unknown {
                id: call.id.clone(),
                name: call.name.clone(),
            }),
            Some(tool) => {
                let invocation = ToolInvocation {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    args: call.args.clone(),
                };
                let child = cancel.child_token();
                let retry = retry.clone();
                prepared.push(Prepared::Running(tokio::spawn(run_one(
                    tool, invocation, timeout, retry, child,
                ))));
            }
        }
    }

    // Collection phase: await in input order.
    let mut outputs = Vec::with_capacity(prepared.len());
    let mut cancelled = cancel.is_cancelled();
    for (call, prepared) in calls.iter().zip(prepared) {
        let output = match prepared {
            Prepared::Malformed { id, reason } => {
                debug!(call_id = %id, "skipping malformed tool call: {reason}");
                ToolOutput::err(id, capitalize(&reason))
            }
            Prepared::Unknown { id, name } => {
                warn!(tool = %name, "model called an unknown tool");
                ToolOutput::err(id, format!("unknown tool: {name}"))
            }
            Prepared::Running(mut handle) => {
                let mut finished: Option<ToolOutput> = None;
                if !cancelled {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            cancelled = true;
                        }
                        result = &mut handle => {
                            finished = Some(unwrap_join(result, &call.id));
                        }
                    }
                }
                match finished {
                    Some(output) => output,
                    None => drain_cancelled(&mut handle, &call.id).await,
                }
            }
        };
        outputs.push(output);
    }
    outputs
}

/// One call's attempt loop: per-attempt timeout, retries for retryable
/// tools, immediate return on cancellation.
async fn run_one(
    tool: Arc<dyn Tool>,
    invocation: ToolInvocation,
    timeout: Duration,
    retry: RetryPolicy,
    cancel: CancellationToken,
) -> ToolOutput {
    let attempts = if tool.retryable() {
        retry.max_attempts.max(1)
    } else {
        1
    };
    let mut last = None;
    for attempt in 0..attempts {
        if cancel.is_cancelled() {
            return ToolOutput::err(&invocation.id, "cancelled");
        }
        let output = match tokio::time::timeout(timeout, tool.execute(&invocation, &cancel)).await {
            Ok(output) => output,
            Err(_) => ToolOutput::err(
                &invocation.id,
                format!("timed out after {}s", timeout.as_secs()),
            ),
        };
        if !output.is_error || cancel.is_cancelled() {
            return output;
        }
        if attempt + 1 < attempts {
            let delay = retry.backoff_delay(attempt);
            debug!(
                tool = %invocation.name,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "retrying failed tool call"
            );
            tokio::select! {
                _ = cancel.cancelled() => return ToolOutput::err(&invocation.id, "cancelled"),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        last = Some(output);
    }
    last.unwrap_or_else(|| ToolOutput::err(&invocation.id, "tool made no attempt"))
}

/// Give an in-flight task a short grace period after cancellation, then
/// abort it and record the cancellation error.
async fn drain_cancelled(handle: &mut JoinHandle<ToolOutput>, call_id: &str) -> ToolOutput {
    match tokio::time::timeout(CANCEL_GRACE, &mut *handle).await {
        Ok(result) => unwrap_join(result, call_id),
        Err(_) => {
            handle.abort();
            ToolOutput::err(call_id, "cancelled")
        }
    }
}

fn unwrap_join(
    result: Result<ToolOutput, tokio::task::JoinError>,
    call_id: &str,
) -> ToolOutput {
    match result {
        Ok(output) => output,
        Err(e) => ToolOutput::err(call_id, format!("tool panicked: {e}")),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
