// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::{ChatRequest, ChatResponse, ModelError, StreamEvent};

/// Streamed model events.
///
/// The stream ends without an `Err` item on success — that is the
/// "nil error then close" completion signal of the provider contract.
/// A mid-stream `Err` terminates the turn; callers must not poll further.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, ModelError>> + Send>>;

/// A remote reasoning model, reduced to two operations.
///
/// Concrete vendor bindings implement this outside the workspace; the
/// engine consumes only the trait.  Implementations must normalize empty
/// tool-message content to `"{}"` before sending (see
/// [`crate::normalize_tool_content`]) and must emit [`StreamEvent::ToolCall`]
/// only for fully assembled calls — partial argument JSON is accumulated
/// internally (see [`crate::ToolCallAssembler`]).
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Model identifier as reported to users.
    fn model_name(&self) -> &str;

    /// Request/response completion.
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ModelError>;

    /// Streaming completion.
    async fn stream(&self, req: ChatRequest) -> Result<EventStream, ModelError>;
}
