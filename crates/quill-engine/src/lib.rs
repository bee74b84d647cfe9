// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! `quill-engine` — session orchestration and the stdio bridge.
//!
//! ```text
//! stdin ──lines──▶ bridge reader ──▶ SessionOrchestrator (one task per session)
//!                                        │  AgentLoop ◀─▶ tools / model
//!                                        ▼
//!                  bridge writer ◀── shared event queue (single writer)
//! stdout ◀──lines──┘
//! ```
//!
//! The bridge owns exactly one reader and one writer; events from all
//! sessions funnel through a single queue so no two lines interleave.
mod bridge;
mod events;
mod factory;
mod session;

pub use bridge::{run_bridge, run_stdio, BridgeOptions};
pub use factory::{ClientFactory, DefaultClientFactory, SwappableClient};
pub use session::{SessionHandle, SessionOrchestrator, SessionState};
