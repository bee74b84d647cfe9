// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

/// Coarse classification of what a tool touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Filesystem,
    Search,
    Execution,
    Editing,
    Semantic,
    Meta,
}

impl ToolCategory {
    pub const ALL: [ToolCategory; 6] = [
        ToolCategory::Filesystem,
        ToolCategory::Search,
        ToolCategory::Execution,
        ToolCategory::Editing,
        ToolCategory::Semantic,
        ToolCategory::Meta,
    ];
}

/// The set of tool categories exposed to one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSet {
    pub filesystem: bool,
    pub search: bool,
    pub execution: bool,
    pub editing: bool,
    pub semantic: bool,
    pub meta: bool,
}

impl ToolSet {
    /// Everything enabled — the main agent loop's default.
    pub fn all() -> Self {
        Self {
            filesystem: true,
            search: true,
            execution: true,
            editing: true,
            semantic: true,
            meta: true,
        }
    }

    /// The Beacon sub-agent's restricted set: no execution, no editing.
    pub fn read_only() -> Self {
        Self {
            filesystem: true,
            search: true,
            execution: false,
            editing: false,
            semantic: true,
            meta: true,
        }
    }

    pub fn contains(&self, category: ToolCategory) -> bool {
        match category {
            ToolCategory::Filesystem => self.filesystem,
            ToolCategory::Search => self.search,
            ToolCategory::Execution => self.execution,
            ToolCategory::Editing => self.editing,
            ToolCategory::Semantic => self.semantic,
            ToolCategory::Meta => self.meta,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_enables_every_category() {
        let set = ToolSet::all();
        for category in ToolCategory::ALL {
            assert!(set.contains(category), "{category:?} should be enabled");
        }
    }

    #[test]
    fn read_only_excludes_side_effecting_categories() {
        let set = ToolSet::read_only();
        assert!(!set.contains(ToolCategory::Execution));
        assert!(!set.contains(ToolCategory::Editing));
        assert!(set.contains(ToolCategory::Filesystem));
        assert!(set.contains(ToolCategory::Search));
        assert!(set.contains(ToolCategory::Semantic));
        assert!(set.contains(ToolCategory::Meta));
    }

    #[test]
    fn default_is_empty() {
        let set = ToolSet::default();
        for category in ToolCategory::ALL {
            assert!(!set.contains(category));
        }
    }
}
