//! LLM adapter (§4.2): invokes a configured model, normalizes request and
//! response, and drives the retry policy around transient failures.
//!
//! The adapter never leaks a provider-native object; `call` always returns a
//! JSON-serializable [`LlmResponse`] with a normalized [`StopReason`].

mod mock;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AgentError;
use crate::message::{LlmResponse, Message};
use crate::retry::{retry_async, RetryPolicy};

pub use mock::MockLlmProvider;

/// One tool schema, passed through to the provider unchanged except for a
/// canonical wrapping into its `tools` field (§6).
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Parameters for one provider call (§4.2, §6).
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    pub max_tokens: u32,
    pub reasoning_effort: Option<ReasoningEffort>,
    pub extra_params: Value,
}

/// `LlmProvider` (consumed, §6): a single async call that returns a response
/// shaped like the spec's "first choice" projection — a message, a
/// provider-specific finish reason string, and a token usage block.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn call(&self, request: &LlmRequest) -> Result<ProviderResponse, AgentError>;
}

/// Raw provider response before stop-reason/usage normalization (§6).
#[derive(Debug, Clone, Default)]
pub struct ProviderResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<crate::message::ToolCall>,
    pub reasoning: Option<String>,
    pub finish_reason: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cache_read: Option<u64>,
    pub cache_write: Option<u64>,
}

/// Canonical reasoning-effort control (§4.2). `"default"`/empty normalize away
/// entirely (represented by `None` at the call site, not a variant here);
/// `"off"` normalizes to `None` (the variant).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningEffort {
    None,
    Minimal,
    Low,
    Medium,
    High,
    Xhigh,
}

impl ReasoningEffort {
    /// Parses a run-scoped reasoning-effort input, applying the input aliases
    /// from §4.2. Returns `Ok(None)` for `"default"` or an empty string (the
    /// control is omitted entirely, not just set to `none`).
    pub fn parse(input: &str) -> Result<Option<ReasoningEffort>, AgentError> {
        let normalized = input.trim().to_lowercase();
        match normalized.as_str() {
            "" | "default" => Ok(None),
            "off" | "none" => Ok(Some(ReasoningEffort::None)),
            "minimal" => Ok(Some(ReasoningEffort::Minimal)),
            "low" => Ok(Some(ReasoningEffort::Low)),
            "medium" => Ok(Some(ReasoningEffort::Medium)),
            "high" => Ok(Some(ReasoningEffort::High)),
            "xhigh" => Ok(Some(ReasoningEffort::Xhigh)),
            other => Err(AgentError::InvalidInput(format!(
                "invalid reasoning effort: {other}"
            ))),
        }
    }

    pub fn as_wire_str(&self) -> &'static str {
        match self {
            ReasoningEffort::None => "none",
            ReasoningEffort::Minimal => "minimal",
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
            ReasoningEffort::Xhigh => "xhigh",
        }
    }
}

/// Drives a configured [`LlmProvider`] through request/response normalization
/// and the retry policy (§4.2).
pub struct LlmAdapter {
    provider: Arc<dyn LlmProvider>,
    retry_policy: RetryPolicy,
    supports_tools: bool,
}

impl LlmAdapter {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            retry_policy: RetryPolicy::default(),
            supports_tools: true,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_supports_tools(mut self, supports: bool) -> Self {
        self.supports_tools = supports;
        self
    }

    pub fn supports_tools(&self) -> bool {
        self.supports_tools
    }

    /// `call(messages, tools?, max_tokens, reasoning_effort?, extra_params?)` (§4.2).
    ///
    /// Invokes the provider with the retry policy applied, then normalizes the
    /// response's finish reason and strips provider reasoning artifacts.
    pub async fn call(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolSchema>,
        max_tokens: u32,
        reasoning_effort: Option<ReasoningEffort>,
        extra_params: Value,
    ) -> Result<LlmResponse, AgentError> {
        let tools = if self.supports_tools { tools } else { Vec::new() };
        let request = LlmRequest {
            messages,
            tools,
            max_tokens,
            reasoning_effort,
            extra_params,
        };

        let provider = Arc::clone(&self.provider);
        let raw = retry_async(
            &self.retry_policy,
            jitter_sample,
            || {
                let provider = Arc::clone(&provider);
                let request = request.clone();
                async move { provider.call(&request).await }
            },
            |delay: Duration| async move {
                tokio::time::sleep(delay).await;
            },
        )
        .await?;

        Ok(LlmResponse {
            content: raw.content,
            tool_calls: raw.tool_calls,
            reasoning: raw.reasoning,
            stop_reason: crate::message::StopReason::normalize(&raw.finish_reason),
            usage: Some(crate::message::Usage {
                input_tokens: raw.prompt_tokens,
                output_tokens: raw.completion_tokens,
                cache_read: raw.cache_read,
                cache_write: raw.cache_write,
            }),
        })
    }
}

/// Deterministic low-variance jitter sample; real randomness belongs to the
/// binary wiring this adapter up, kept out of the core per §9 ("module-level
/// singletons → explicit configuration structs").
fn jitter_sample() -> f64 {
    0.0
}

/// Summarizes a window of messages via a single LLM call with a fixed
/// instruction prompt, satisfying the Memory Graph's and Context
/// Compressor's `Summarizer` collaborator (§4.5, §4.6).
#[async_trait]
impl crate::memory::Summarizer for LlmAdapter {
    async fn summarize(
        &self,
        messages: &[Message],
        target_tokens: Option<usize>,
    ) -> Result<String, AgentError> {
        let target = target_tokens.unwrap_or(200);
        let mut transcript = String::new();
        for message in messages {
            transcript.push_str(&format!("{message:?}\n"));
        }
        let instruction = format!(
            "Summarize the following conversation in roughly {target} tokens, \
             preserving concrete facts, decisions, and open threads:\n\n{transcript}"
        );
        let response = self
            .call(
                vec![Message::user(instruction)],
                vec![],
                target.max(64) as u32 * 4,
                None,
                Value::Null,
            )
            .await?;
        Ok(response.content.unwrap_or_default())
    }
}


impl Clone for LlmRequest {
    fn clone(&self) -> Self {
        LlmRequest {
            messages: self.messages.clone(),
            tools: self.tools.clone(),
            max_tokens: self.max_tokens,
            reasoning_effort: self.reasoning_effort,
            extra_params: self.extra_params.clone(),
        }
    }
}
