//! Agent Loop (§4.7): the reason/act/observe state machine executed against
//! a chosen [`MemoryNode`].

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::compress::ContextCompressor;
use crate::error::AgentError;
use crate::llm::{LlmAdapter, ToolSchema};
use crate::memory::{MemoryGraph, Summarizer};
use crate::message::{Message, StopReason};
use crate::tool_result::ToolResultProcessor;
use crate::tools::{ToolExecutor, ToolRegistry};

/// Fixed text returned when the iteration cap is hit without a final answer (§7).
pub const MAX_ITERATIONS_MESSAGE: &str = "Max iterations reached without completion.";

/// Fixed text returned when the model stops with no usable text at all
/// (`tool_use` with no tool_calls, or a terminal non-stop reason with no
/// content), matching the teacher's `think_node.rs` fallback.
const NO_TEXT_RESPONSE_FALLBACK: &str =
    "No text response from the model. Please try again or check the API.";

pub struct AgentLoop {
    llm: Arc<LlmAdapter>,
    tools: ToolRegistry,
    tool_result: ToolResultProcessor,
    max_iterations: u32,
}

impl AgentLoop {
    pub fn new(llm: Arc<LlmAdapter>, tools: ToolRegistry, max_iterations: u32) -> Self {
        Self {
            llm,
            tools,
            tool_result: ToolResultProcessor::new(),
            max_iterations,
        }
    }

    pub fn with_tool_result_processor(mut self, processor: ToolResultProcessor) -> Self {
        self.tool_result = processor;
        self
    }

    /// Runs the loop against `node_id`, using `system_messages` as the head
    /// of every outbound context and `compressor` to bound context growth
    /// (§4.6, §4.7). Returns the final text answer.
    pub async fn run(
        &self,
        graph: &mut MemoryGraph,
        node_id: &str,
        system_messages: &[Message],
        compressor: &mut ContextCompressor,
        summarizer: &dyn Summarizer,
    ) -> Result<String, AgentError> {
        let schemas = self.tool_schemas();

        for iteration in 1..=self.max_iterations {
            let span = tracing::info_span!("agent_loop_iteration", iteration);
            let _enter = span.enter();

            let raw_context = graph.context_for(node_id);
            let context = compressor
                .apply(system_messages, raw_context, summarizer)
                .await?;

            let mut outbound = Vec::with_capacity(system_messages.len() + context.len());
            outbound.extend(system_messages.iter().cloned());
            outbound.extend(context);

            let response = self
                .llm
                .call(outbound, schemas.clone(), 4096, None, Value::Null)
                .await?;

            let has_content = response.content.as_deref().map(|c| !c.is_empty()).unwrap_or(false);
            let has_tool_calls = !response.tool_calls.is_empty();

            if !has_content && !has_tool_calls {
                // Neither content nor tool_calls: Message::assistant would reject this
                // as malformed, so never construct it. Terminal with no usable text.
                debug!(?response.stop_reason, "response has no content and no tool_calls; defensive fallback");
                return Ok(NO_TEXT_RESPONSE_FALLBACK.to_string());
            }

            let assistant = Message::assistant(response.content.clone(), response.tool_calls.clone())?;
            graph.append(node_id, assistant)?;

            match response.stop_reason {
                StopReason::Stop => {
                    info!(iteration, "agent loop terminated with stop_reason=stop");
                    return Ok(response.content.filter(|c| !c.is_empty()).unwrap_or_else(|| NO_TEXT_RESPONSE_FALLBACK.to_string()));
                }
                StopReason::ToolUse => {
                    if response.tool_calls.is_empty() {
                        debug!("tool_use stop_reason with no tool_calls; defensive fallback");
                        return Ok(response
                            .content
                            .filter(|c| !c.is_empty())
                            .unwrap_or_else(|| NO_TEXT_RESPONSE_FALLBACK.to_string()));
                    }
                    let executor = ToolExecutor::new(&self.tools);
                    for call in &response.tool_calls {
                        let tool_context = tool_context_for(&call.arguments);
                        let raw = executor.invoke(call).await;
                        let (processed, modified) =
                            self.tool_result.process(&call.name, &raw, &tool_context);
                        if modified {
                            debug!(tool = %call.name, "tool result truncated with recovery section");
                        }
                        let tool_message =
                            Message::tool(processed, call.id.clone(), Some(call.name.clone()));
                        graph.append(node_id, tool_message)?;
                    }
                }
                StopReason::Length | StopReason::ContentFilter | StopReason::Other => {
                    warn!(?response.stop_reason, "agent loop terminated on non-stop finish reason");
                    return Ok(response
                        .content
                        .filter(|c| !c.is_empty())
                        .unwrap_or_else(|| NO_TEXT_RESPONSE_FALLBACK.to_string()));
                }
            }
        }

        Ok(MAX_ITERATIONS_MESSAGE.to_string())
    }

    fn tool_schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .schemas()
            .into_iter()
            .map(|spec| ToolSchema {
                name: spec.name,
                description: spec.description,
                input_schema: spec.input_schema,
            })
            .collect()
    }
}

/// Arguments double as the tool-specific recovery hints the Tool-Result
/// Processor expects (§4.4: `filename`, `pattern`, `command`, `url`, ...).
fn tool_context_for(arguments: &Value) -> HashMap<String, Value> {
    match arguments {
        Value::Object(map) => map.clone().into_iter().collect(),
        _ => HashMap::new(),
    }
}
