//! Tool Registry & Executor (§4.3): holds named tool capabilities with input
//! schemas and dispatches a normalized tool call to the matching capability.

mod r#trait;

pub use r#trait::{Tool, ToolSpec};

use std::collections::HashMap;
use std::sync::Arc;

use crate::message::ToolCall;

/// Holds named [`Tool`] capabilities. Shared read-only across agents (§5);
/// composition may construct a filtered view via [`ToolRegistry::filtered`].
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    /// "list all schemas" (§4.3), for the LLM Adapter.
    pub fn schemas(&self) -> Vec<ToolSpec> {
        let mut names: Vec<&String> = self.tools.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| self.tools[name].spec())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// A registry admitting only `names` — used to build a sub-agent's
    /// `tool_filter` view (§4.3, §4.9).
    pub fn filtered(&self, names: &[&str]) -> ToolRegistry {
        let allow: std::collections::HashSet<&str> = names.iter().copied().collect();
        ToolRegistry {
            tools: self
                .tools
                .iter()
                .filter(|(name, _)| allow.contains(name.as_str()))
                .map(|(name, tool)| (name.clone(), Arc::clone(tool)))
                .collect(),
        }
    }

    /// A registry admitting only the read-only tools in the registry.
    pub fn read_only(&self) -> ToolRegistry {
        ToolRegistry {
            tools: self
                .tools
                .iter()
                .filter(|(_, tool)| tool.read_only())
                .map(|(name, tool)| (name.clone(), Arc::clone(tool)))
                .collect(),
        }
    }
}

/// Dispatches a normalized [`ToolCall`] against a [`ToolRegistry`] (§4.3).
/// Single-threaded per agent; different agents may invoke concurrently.
pub struct ToolExecutor<'a> {
    registry: &'a ToolRegistry,
}

impl<'a> ToolExecutor<'a> {
    pub fn new(registry: &'a ToolRegistry) -> Self {
        Self { registry }
    }

    /// "invoke by name with arguments" (§4.3). Never returns `Err` — unknown
    /// tools and capability exceptions both become textual results the LLM
    /// can react to (§7 tier 1, "self-correcting").
    pub async fn invoke(&self, call: &ToolCall) -> String {
        match self.registry.get(&call.name) {
            None => format!("Tool '{}' not found", call.name),
            Some(tool) => match tool.invoke(call.arguments.clone()).await {
                Ok(text) => text,
                Err(err) => {
                    if err.starts_with("Error:") {
                        err
                    } else {
                        format!("Error: {err}")
                    }
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "echo".into(),
                description: "echoes its input".into(),
                input_schema: json!({"type": "object"}),
            }
        }

        async fn invoke(&self, args: Value) -> Result<String, String> {
            Ok(args.to_string())
        }
    }

    struct Explodes;

    #[async_trait]
    impl Tool for Explodes {
        fn name(&self) -> &str {
            "explodes"
        }

        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "explodes".into(),
                description: "always fails".into(),
                input_schema: json!({}),
            }
        }

        async fn invoke(&self, _args: Value) -> Result<String, String> {
            Err("boom".into())
        }
    }

    fn call(name: &str, args: Value) -> ToolCall {
        ToolCall { id: "c1".into(), name: name.into(), arguments: args }
    }

    #[tokio::test]
    async fn unknown_tool_returns_literal_not_found() {
        let registry = ToolRegistry::new();
        let executor = ToolExecutor::new(&registry);
        let result = executor.invoke(&call("missing", json!({}))).await;
        assert_eq!(result, "Tool 'missing' not found");
    }

    #[tokio::test]
    async fn known_tool_invokes_and_returns_text() {
        let registry = ToolRegistry::new().with_tool(Arc::new(Echo));
        let executor = ToolExecutor::new(&registry);
        let result = executor.invoke(&call("echo", json!({"x": 1}))).await;
        assert_eq!(result, r#"{"x":1}"#);
    }

    #[tokio::test]
    async fn tool_failure_is_rendered_as_error_text() {
        let registry = ToolRegistry::new().with_tool(Arc::new(Explodes));
        let executor = ToolExecutor::new(&registry);
        let result = executor.invoke(&call("explodes", json!({}))).await;
        assert_eq!(result, "Error: boom");
    }

    #[test]
    fn filtered_registry_admits_only_named_tools() {
        let registry = ToolRegistry::new()
            .with_tool(Arc::new(Echo))
            .with_tool(Arc::new(Explodes));
        let filtered = registry.filtered(&["echo"]);
        assert!(filtered.contains("echo"));
        assert!(!filtered.contains("explodes"));
    }
}
