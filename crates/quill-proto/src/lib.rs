// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! `quill-proto` — the framed NDJSON protocol between the engine and its
//! front-ends.
//!
//! One JSON object per line, UTF-8, LF terminator.  Every record carries a
//! `type` discriminator.  Commands flow in, events flow out:
//!
//! ```text
//! front-end ──line──▶ decode_command() ──▶ Command ──▶ engine
//! engine    ──Event──▶ encode_event()  ──line──▶ front-end
//! ```
//!
//! Decoding errors never terminate the stream — the bridge answers them
//! with an `error` event on the same channel.
mod command;
mod event;

pub use command::{decode_command, Command, DecodeError};
pub use event::{
    encode_event, ActivityStatus, ContextKind, Event, OutputStream, StatusKind, TextSource,
    ToolPhase, TurnSummary,
};
