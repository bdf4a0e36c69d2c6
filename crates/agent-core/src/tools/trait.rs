//! A tool capability (§4.3, §6): `{name, description, input_schema, invoke}`.

use async_trait::async_trait;
use serde_json::Value;

/// `{name, description, input_schema}` — passed to the LLM Adapter unchanged
/// except for canonical wrapping into the provider's `tools` field (§6).
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A tool capability (§4.3). Shared read-only across agents; an implementation
/// may hold its own internal state (e.g. an HTTP client) but must stay safe
/// under the runtime's concurrency model (§5).
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn spec(&self) -> ToolSpec;

    /// Whether this tool is read-only (§4.3) — composition sub-agents may be
    /// restricted to read-only tools via a `tool_filter`.
    fn read_only(&self) -> bool {
        false
    }

    /// Executes the tool. Failures should be returned as `Ok(text)` starting
    /// with `Error:` where possible (§4.3); an `Err` here is treated by the
    /// registry as a tool-capability exception and rendered the same way.
    async fn invoke(&self, args: Value) -> Result<String, String>;
}
