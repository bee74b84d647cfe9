// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use crate::{Tool, ToolCategory, ToolSet};

/// A tool schema as exported to the model client.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Central registry holding the tools one session may invoke.
///
/// Immutable after construction; execution takes `&self` so calls can fan
/// out across tasks.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Build a registry from `tools`, keeping only those whose category is
    /// enabled in `set`.
    pub fn with_toolset(tools: Vec<Arc<dyn Tool>>, set: ToolSet) -> Self {
        let mut registry = Self::new();
        for tool in tools {
            if set.contains(tool.category()) {
                registry.register_arc(tool);
            }
        }
        registry
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// The category of a registered tool, if present.
    pub fn category_of(&self, name: &str) -> Option<ToolCategory> {
        self.tools.get(name).map(|t| t.category())
    }

    /// Schemas for every registered tool, sorted by name for stable prompts.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::{ToolInvocation, ToolOutput};

    struct EchoTool {
        name: &'static str,
        category: ToolCategory,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        fn category(&self) -> ToolCategory {
            self.category
        }
        async fn execute(&self, call: &ToolInvocation, _cancel: &CancellationToken) -> ToolOutput {
            ToolOutput::ok(&call.id, format!("echo:{}", serde_json::Value::Object(call.args.clone())))
        }
    }

    fn echo(name: &'static str, category: ToolCategory) -> Arc<dyn Tool> {
        Arc::new(EchoTool { name, category })
    }

    #[test]
    fn register_and_get() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool {
            name: "echo",
            category: ToolCategory::Meta,
        });
        assert!(reg.get("echo").is_some());
        assert!(reg.get("nope").is_none());
    }

    #[test]
    fn toolset_filters_categories_at_construction() {
        let reg = ToolRegistry::with_toolset(
            vec![
                echo("reader", ToolCategory::Filesystem),
                echo("runner", ToolCategory::Execution),
                echo("writer", ToolCategory::Editing),
            ],
            ToolSet::read_only(),
        );
        assert!(reg.contains("reader"));
        assert!(!reg.contains("runner"));
        assert!(!reg.contains("writer"));
    }

    #[test]
    fn schemas_sorted_by_name() {
        let reg = ToolRegistry::with_toolset(
            vec![
                echo("zeta", ToolCategory::Meta),
                echo("alpha", ToolCategory::Meta),
            ],
            ToolSet::all(),
        );
        let names: Vec<String> = reg.schemas().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn category_of_registered_tool() {
        let reg = ToolRegistry::with_toolset(
            vec![echo("reader", ToolCategory::Filesystem)],
            ToolSet::all(),
        );
        assert_eq!(reg.category_of("reader"), Some(ToolCategory::Filesystem));
        assert_eq!(reg.category_of("ghost"), None);
    }

    #[test]
    fn registering_same_name_twice_overwrites() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool {
            name: "t",
            category: ToolCategory::Meta,
        });
        reg.register(EchoTool {
            name: "t",
            category: ToolCategory::Meta,
        });
        assert_eq!(reg.names().len(), 1);
    }
}
