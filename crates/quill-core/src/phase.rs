// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use quill_model::{ChatMessage, Role};
use quill_tools::{ToolCategory, ToolRegistry};

/// Coarse label of what the session is currently doing, derived from
/// recent tool usage.  Advisory metadata only — nothing is gated on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Explore,
    DiscoverAndPlan,
    Edit,
    Validate,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Explore => "explore",
            Phase::DiscoverAndPlan => "discover_and_plan",
            Phase::Edit => "edit",
            Phase::Validate => "validate",
        }
    }
}

fn phase_of_category(category: ToolCategory) -> Option<Phase> {
    match category {
        ToolCategory::Filesystem | ToolCategory::Search => Some(Phase::Explore),
        ToolCategory::Semantic => Some(Phase::DiscoverAndPlan),
        ToolCategory::Editing => Some(Phase::Edit),
        ToolCategory::Execution => Some(Phase::Validate),
        ToolCategory::Meta => None,
    }
}

/// Scan history backwards; the most recent tool answer whose tool maps to
/// a phase category wins.  No tool usage yet means [`Phase::Explore`].
///
/// Tool answers carry the call id, not the tool name, so each one is
/// resolved against the assistant fan-out that precedes it.
pub fn detect_phase(messages: &[ChatMessage], registry: &ToolRegistry) -> Phase {
    // Map call id → tool name from every assistant fan-out.
    let mut call_names: HashMap<&str, &str> = HashMap::new();
    for message in messages {
        for call in &message.tool_calls {
            call_names.insert(call.id.as_str(), call.name.as_str());
        }
    }
    for message in messages.iter().rev() {
        if message.role != Role::Tool {
            continue;
        }
        let Some(call_id) = message.name.as_deref() else {
            continue;
        };
        let Some(tool_name) = call_names.get(call_id) else {
            continue;
        };
        if let Some(phase) = registry
            .category_of(tool_name)
            .and_then(phase_of_category)
        {
            return phase;
        }
    }
    Phase::Explore
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
