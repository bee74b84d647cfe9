// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::BTreeMap;

use tracing::warn;

use crate::ToolCallData;

/// Accumulates partial tool-call fragments from a model stream.
///
/// Providers interleave argument-JSON fragments for parallel calls keyed by
/// an index; fragments for one call always arrive in order.  `finish()`
/// resolves every pending call: a call whose buffered arguments fail to
/// parse is still returned, with `error` set and empty args, so the loop
/// can answer it in-band instead of invoking it.
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    pending: BTreeMap<u32, Pending>,
}

#[derive(Debug, Default)]
struct Pending {
    id: String,
    name: String,
    args_buf: String,
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment.  `id` and `name` may be empty on continuation
    /// fragments; the first non-empty value wins.
    pub fn push(&mut self, index: u32, id: &str, name: &str, args_fragment: &str) {
        let entry = self.pending.entry(index).or_default();
        if entry.id.is_empty() && !id.is_empty() {
            entry.id = id.to_string();
        }
        if entry.name.is_empty() && !name.is_empty() {
            entry.name = name.to_string();
        }
        entry.args_buf.push_str(args_fragment);
    }

    /// True when at least one call has been started.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Resolve all pending calls in index order.
    ///
    /// `stream_complete` is false when the stream ended before its normal
    /// completion signal; unparseable arguments are then reported as
    /// "stream ended prematurely" rather than "invalid JSON".
    pub fn finish(self, stream_complete: bool) -> Vec<ToolCallData> {
        let mut calls = Vec::with_capacity(self.pending.len());
        for (i, (_, pending)) in self.pending.into_iter().enumerate() {
            if pending.name.is_empty() {
                warn!(call_id = %pending.id, "dropping tool call with empty name; cannot dispatch");
                continue;
            }
            let id = if pending.id.is_empty() {
                // An empty id cannot be paired with a tool result; synthesize
                // one so the turn can still complete.
                format!("call_synthetic_{i}")
            } else {
                pending.id
            };
            let mut call = ToolCallData::new(id, pending.name);
            if pending.args_buf.is_empty() {
                // No arguments at all is a complete empty object.
                calls.push(call);
                continue;
            }
            match serde_json::from_str::<serde_json::Value>(&pending.args_buf) {
                Ok(serde_json::Value::Object(map)) => call.args = map,
                Ok(other) => {
                    warn!(call_id = %call.id, "tool call arguments are not an object: {other}");
                    call.error = Some("invalid JSON".to_string());
                }
                Err(e) => {
                    warn!(call_id = %call.id, args = %pending.args_buf, "tool call arguments unparseable: {e}");
                    call.error = Some(if stream_complete {
                        "invalid JSON".to_string()
                    } else {
                        "stream ended prematurely".to_string()
                    });
                }
            }
            calls.push(call);
        }
        calls
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
