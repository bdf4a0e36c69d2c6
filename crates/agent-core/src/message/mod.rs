//! Canonical message model (§3, §4.1).
//!
//! Every other subsystem consumes `Message`; nothing downstream of the
//! normalizer inspects a provider-specific shape again (§9: "dynamic provider
//! shapes → canonical sum types").

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AgentError;

/// A closed role tag (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A closed stop-reason tag; provider-specific strings are normalized at the
/// adapter boundary (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Stop,
    ToolUse,
    Length,
    ContentFilter,
    Other,
}

impl StopReason {
    /// Normalizes provider-specific finish-reason strings (§4.2).
    pub fn normalize(raw: &str) -> StopReason {
        match raw {
            "stop" | "end_turn" | "complete" => StopReason::Stop,
            "tool_use" | "tool_use_requested" | "tool_calls" | "function_call" => {
                StopReason::ToolUse
            }
            "length" | "max_tokens" => StopReason::Length,
            "content_filter" => StopReason::ContentFilter,
            _ => StopReason::Other,
        }
    }
}

/// `{id, name, arguments}` — `id` is the sole key a matching `ToolResult` uses (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Always carried by a `role=tool` message (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub content: String,
}

/// The canonical message sum type (§3). Each variant enforces its own
/// role-dependent invariants through its constructor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        content: String,
        tool_call_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Message {
        Message::System { content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Message {
        Message::User { content: content.into() }
    }

    /// Fails with `MalformedMessage` if both `content` and `tool_calls` are absent/empty (§3, §4.1).
    pub fn assistant(
        content: Option<String>,
        tool_calls: Vec<ToolCall>,
    ) -> Result<Message, AgentError> {
        if content.as_deref().unwrap_or("").is_empty() && tool_calls.is_empty() {
            return Err(AgentError::MalformedMessage(
                "assistant message has neither content nor tool_calls".into(),
            ));
        }
        Ok(Message::Assistant { content, tool_calls })
    }

    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>, name: Option<String>) -> Message {
        Message::Tool {
            content: content.into(),
            tool_call_id: tool_call_id.into(),
            name,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Message::System { .. } => Role::System,
            Message::User { .. } => Role::User,
            Message::Assistant { .. } => Role::Assistant,
            Message::Tool { .. } => Role::Tool,
        }
    }

    /// Round-trips this message back into an incoming-shape `Value`, for use with
    /// `normalize_incoming` in idempotency tests and as the wire-serialization base.
    pub fn to_incoming_value(&self) -> Value {
        match self {
            Message::System { content } => serde_json::json!({"role": "system", "content": content}),
            Message::User { content } => serde_json::json!({"role": "user", "content": content}),
            Message::Assistant { content, tool_calls } => {
                let tool_calls: Vec<Value> = tool_calls
                    .iter()
                    .map(|tc| {
                        serde_json::json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {
                                "name": tc.name,
                                "arguments": serde_json::to_string(&tc.arguments).unwrap_or_default(),
                            }
                        })
                    })
                    .collect();
                let mut obj = serde_json::json!({"role": "assistant"});
                if let Some(c) = content {
                    obj["content"] = Value::String(c.clone());
                }
                if !tool_calls.is_empty() {
                    obj["tool_calls"] = Value::Array(tool_calls);
                }
                obj
            }
            Message::Tool { content, tool_call_id, name } => {
                let mut obj = serde_json::json!({
                    "role": "tool",
                    "content": content,
                    "tool_call_id": tool_call_id,
                });
                if let Some(n) = name {
                    obj["name"] = Value::String(n.clone());
                }
                obj
            }
        }
    }
}

/// `{input_tokens, output_tokens, cache_read?, cache_write?}` (§3).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_read: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_write: Option<u64>,
}

impl Usage {
    pub fn add(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_read = match (self.cache_read, other.cache_read) {
            (Some(a), Some(b)) => Some(a + b),
            (a, b) => a.or(b),
        };
        self.cache_write = match (self.cache_write, other.cache_write) {
            (Some(a), Some(b)) => Some(a + b),
            (a, b) => a.or(b),
        };
    }
}

/// Normalized LLM response (§3, §4.2). JSON-serializable; no provider-native objects leak out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub stop_reason: StopReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl Default for StopReason {
    fn default() -> Self {
        StopReason::Other
    }
}

/// Result of normalizing one incoming provider message: zero or more canonical
/// messages (a `tool_result`-block list expands into several) plus any
/// `reasoning` text stripped out of `thinking` blocks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedIncoming {
    pub messages: Vec<Message>,
    pub reasoning: Option<String>,
}

/// Normalizes a single incoming provider-shaped message into zero or more
/// canonical `Message`s (§4.1).
///
/// Covers: `{role, content: string}`; content-as-list-of-blocks (legacy shape,
/// `text`/`tool_use`/`tool_result`/`thinking` blocks); and the modern
/// `tool_calls` field shape.
pub fn normalize_incoming(value: &Value) -> Result<NormalizedIncoming, AgentError> {
    let role_str = value.get("role").and_then(Value::as_str).unwrap_or("assistant");

    // Modern shape: top-level `tool_calls` array.
    if let Some(calls) = value.get("tool_calls").and_then(Value::as_array) {
        let tool_calls = calls
            .iter()
            .map(parse_modern_tool_call)
            .collect::<Result<Vec<_>, _>>()?;
        let content = value
            .get("content")
            .and_then(Value::as_str)
            .map(|s| s.to_string());
        let message = Message::assistant(content, tool_calls)?;
        return Ok(NormalizedIncoming { messages: vec![message], reasoning: None });
    }

    match value.get("content") {
        Some(Value::Array(blocks)) => normalize_block_list(role_str, blocks),
        Some(Value::String(s)) => Ok(NormalizedIncoming {
            messages: vec![simple_message(role_str, s.clone())?],
            reasoning: None,
        }),
        None => Ok(NormalizedIncoming {
            messages: vec![simple_message(role_str, String::new())?],
            reasoning: None,
        }),
        Some(other) => Err(AgentError::MalformedMessage(format!(
            "unsupported content shape: {other}"
        ))),
    }
}

fn simple_message(role_str: &str, content: String) -> Result<Message, AgentError> {
    match role_str {
        "system" => Ok(Message::system(content)),
        "user" => Ok(Message::user(content)),
        "tool" => Err(AgentError::MalformedMessage(
            "tool-role message requires tool_call_id".into(),
        )),
        _ => Message::assistant(if content.is_empty() { None } else { Some(content) }, vec![]),
    }
}

fn parse_modern_tool_call(entry: &Value) -> Result<ToolCall, AgentError> {
    let id = entry
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::MalformedMessage("tool_calls entry missing id".into()))?
        .to_string();
    let function = entry
        .get("function")
        .ok_or_else(|| AgentError::MalformedMessage("tool_calls entry missing function".into()))?;
    let name = function
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::MalformedMessage("tool_calls entry missing function.name".into()))?
        .to_string();
    let arguments = match function.get("arguments") {
        Some(Value::String(s)) => {
            serde_json::from_str(s).unwrap_or_else(|_| Value::Object(Default::default()))
        }
        Some(other) => other.clone(),
        None => Value::Object(Default::default()),
    };
    Ok(ToolCall { id, name, arguments })
}

fn normalize_block_list(role_str: &str, blocks: &[Value]) -> Result<NormalizedIncoming, AgentError> {
    let mut text_parts: Vec<String> = Vec::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();
    let mut tool_messages: Vec<Message> = Vec::new();
    let mut reasoning_parts: Vec<String> = Vec::new();

    for block in blocks {
        let block_type = block.get("type").and_then(Value::as_str).unwrap_or("");
        match block_type {
            "text" => {
                if let Some(t) = block.get("text").and_then(Value::as_str) {
                    text_parts.push(t.to_string());
                }
            }
            "tool_use" => {
                let id = block
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| AgentError::MalformedMessage("tool_use block missing id".into()))?
                    .to_string();
                let name = block
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| AgentError::MalformedMessage("tool_use block missing name".into()))?
                    .to_string();
                let arguments = block.get("input").cloned().unwrap_or(Value::Object(Default::default()));
                tool_calls.push(ToolCall { id, name, arguments });
            }
            "tool_result" => {
                let tool_call_id = block
                    .get("tool_use_id")
                    .or_else(|| block.get("tool_call_id"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        AgentError::MalformedMessage("tool_result block missing tool_use_id".into())
                    })?
                    .to_string();
                let content = match block.get("content") {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                let name = block.get("name").and_then(Value::as_str).map(|s| s.to_string());
                tool_messages.push(Message::tool(content, tool_call_id, name));
            }
            "thinking" => {
                if let Some(t) = block.get("thinking").or_else(|| block.get("text")).and_then(Value::as_str) {
                    reasoning_parts.push(t.to_string());
                }
            }
            _ => {}
        }
    }

    let reasoning = if reasoning_parts.is_empty() {
        None
    } else {
        Some(reasoning_parts.join("\n"))
    };

    // A content list consisting of tool_result blocks expands to one message each (§4.1).
    if !tool_messages.is_empty() {
        return Ok(NormalizedIncoming { messages: tool_messages, reasoning });
    }

    let content = if text_parts.is_empty() {
        None
    } else {
        Some(text_parts.join(""))
    };

    let message = match role_str {
        "system" => Message::system(content.unwrap_or_default()),
        "user" => Message::user(content.unwrap_or_default()),
        _ => Message::assistant(content, tool_calls)?,
    };

    Ok(NormalizedIncoming { messages: vec![message], reasoning })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_simple_shape() {
        let v = serde_json::json!({"role": "user", "content": "hi"});
        let out = normalize_incoming(&v).unwrap();
        assert_eq!(out.messages, vec![Message::user("hi")]);
        assert!(out.reasoning.is_none());
    }

    #[test]
    fn normalizes_legacy_block_list_with_text_and_tool_use() {
        let v = serde_json::json!({
            "role": "assistant",
            "content": [
                {"type": "text", "text": "ok"},
                {"type": "tool_use", "id": "t1", "name": "calc", "input": {"x": 1}}
            ]
        });
        let out = normalize_incoming(&v).unwrap();
        assert_eq!(out.messages.len(), 1);
        match &out.messages[0] {
            Message::Assistant { content, tool_calls } => {
                assert_eq!(content.as_deref(), Some("ok"));
                assert_eq!(tool_calls.len(), 1);
                assert_eq!(tool_calls[0].id, "t1");
                assert_eq!(tool_calls[0].name, "calc");
                assert_eq!(tool_calls[0].arguments, serde_json::json!({"x": 1}));
            }
            other => panic!("expected assistant message, got {other:?}"),
        }
    }

    #[test]
    fn tool_result_block_list_expands_to_one_message_per_block() {
        let v = serde_json::json!({
            "role": "user",
            "content": [
                {"type": "tool_result", "tool_use_id": "a", "content": "r1"},
                {"type": "tool_result", "tool_use_id": "b", "content": "r2"}
            ]
        });
        let out = normalize_incoming(&v).unwrap();
        assert_eq!(out.messages.len(), 2);
        assert_eq!(out.messages[0], Message::tool("r1", "a", None));
        assert_eq!(out.messages[1], Message::tool("r2", "b", None));
    }

    #[test]
    fn thinking_blocks_become_reasoning_and_are_stripped_from_content() {
        let v = serde_json::json!({
            "role": "assistant",
            "content": [
                {"type": "thinking", "thinking": "let me think"},
                {"type": "text", "text": "answer"}
            ]
        });
        let out = normalize_incoming(&v).unwrap();
        assert_eq!(out.reasoning.as_deref(), Some("let me think"));
        match &out.messages[0] {
            Message::Assistant { content, .. } => assert_eq!(content.as_deref(), Some("answer")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn modern_tool_calls_shape_json_encodes_object_arguments_in_wire_form() {
        let v = serde_json::json!({
            "role": "assistant",
            "tool_calls": [
                {"id": "t1", "type": "function", "function": {"name": "calc", "arguments": "{\"x\":1}"}}
            ]
        });
        let out = normalize_incoming(&v).unwrap();
        match &out.messages[0] {
            Message::Assistant { tool_calls, .. } => {
                assert_eq!(tool_calls[0].arguments, serde_json::json!({"x": 1}));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn assistant_with_neither_content_nor_tool_calls_is_malformed() {
        let v = serde_json::json!({"role": "assistant", "content": [{"type": "thinking", "thinking": "x"}]});
        let err = normalize_incoming(&v).unwrap_err();
        assert!(matches!(err, AgentError::MalformedMessage(_)));
    }

    #[test]
    fn normalization_is_idempotent() {
        let v = serde_json::json!({
            "role": "assistant",
            "content": [
                {"type": "text", "text": "ok"},
                {"type": "tool_use", "id": "t1", "name": "calc", "input": {"x": 1}}
            ]
        });
        let once = normalize_incoming(&v).unwrap();
        let wire = once.messages[0].to_incoming_value();
        let twice = normalize_incoming(&wire).unwrap();
        assert_eq!(once.messages, twice.messages);
    }

    #[test]
    fn stop_reason_normalizes_provider_strings() {
        assert_eq!(StopReason::normalize("end_turn"), StopReason::Stop);
        assert_eq!(StopReason::normalize("tool_use_requested"), StopReason::ToolUse);
        assert_eq!(StopReason::normalize("max_tokens"), StopReason::Length);
        assert_eq!(StopReason::normalize("content_filter"), StopReason::ContentFilter);
        assert_eq!(StopReason::normalize("something_else"), StopReason::Other);
    }
}
