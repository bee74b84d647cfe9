// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! `quill-model` — the reasoning-model boundary.
//!
//! The engine talks to a remote model through exactly two operations,
//! [`ModelClient::chat`] and [`ModelClient::stream`].  Concrete vendor
//! bindings live outside this workspace; this crate owns the message data
//! model, the error taxonomy, the retry policy, the streaming tool-call
//! assembler, and the mock clients the rest of the workspace tests with.
pub mod http;
mod client;
mod error;
mod mock;
mod retry;
mod stream;
mod types;

pub use client::{EventStream, ModelClient};
pub use error::ModelError;
pub use mock::{MockClient, ScriptedClient};
pub use retry::RetryPolicy;
pub use stream::ToolCallAssembler;
pub use types::*;
