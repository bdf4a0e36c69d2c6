//! Context Compressor (§4.6): watches cumulative token cost and, when a
//! threshold is crossed, summarizes older messages into a single summary
//! message while preserving the short-term window and protected tool pairs.

use std::collections::HashSet;

use crate::error::AgentError;
use crate::memory::Summarizer;
use crate::message::Message;
use crate::tool_result::estimate_tokens;

/// `{max_context_tokens, target_tokens, compression_threshold, short_term_count,
/// compression_ratio, enable}` (§4.6).
#[derive(Debug, Clone)]
pub struct CompressorConfig {
    pub max_context_tokens: usize,
    pub target_tokens: usize,
    pub compression_threshold: usize,
    pub short_term_count: usize,
    pub compression_ratio: f64,
    pub enable: bool,
    /// Tool names whose assistant/tool-call pair is never split by compression (§4.6).
    pub protected_tools: HashSet<String>,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 128_000,
            target_tokens: 64_000,
            compression_threshold: 80_000,
            short_term_count: 10,
            compression_ratio: 0.2,
            enable: true,
            protected_tools: HashSet::new(),
        }
    }
}

/// Rolling state: cumulative tokens, last-step delta, and whether the last
/// step triggered compression (§4.6).
#[derive(Debug, Clone, Default)]
pub struct CompressorState {
    pub cumulative_tokens: usize,
    pub last_step_delta: usize,
    pub last_step_compressed: bool,
    pub last_savings: i64,
    pub net_savings: i64,
}

/// Context Compressor over a configured policy and rolling state (§4.6).
pub struct ContextCompressor {
    config: CompressorConfig,
    state: CompressorState,
}

impl ContextCompressor {
    pub fn new(config: CompressorConfig) -> Self {
        Self { config, state: CompressorState::default() }
    }

    pub fn state(&self) -> &CompressorState {
        &self.state
    }

    fn estimate_context_tokens(system_messages: &[Message], context: &[Message]) -> usize {
        let system_chars: usize = system_messages
            .iter()
            .map(|m| message_text_len(m))
            .sum();
        let context_chars: usize = context.iter().map(message_text_len).sum();
        estimate_tokens(&"x".repeat(system_chars + context_chars))
    }

    /// Applies the compression policy to `context` (§4.6 steps 1-6). Updates
    /// the rolling cumulative/delta counters and returns the context to send
    /// to the LLM (unchanged, or with its compressible prefix replaced).
    pub async fn apply(
        &mut self,
        system_messages: &[Message],
        context: Vec<Message>,
        summarizer: &dyn Summarizer,
    ) -> Result<Vec<Message>, AgentError> {
        let estimated = Self::estimate_context_tokens(system_messages, &context);
        let delta = estimated.saturating_sub(self.state.cumulative_tokens);
        self.state.last_step_delta = delta;
        self.state.cumulative_tokens = estimated;

        // Step 2: strict `>` per §9's resolution of the threshold-comparison open question.
        if !self.config.enable || estimated <= self.config.compression_threshold {
            self.state.last_step_compressed = false;
            return Ok(context);
        }

        let (prefix, tail) = self.split_compressible_prefix(&context);
        if prefix.is_empty() {
            self.state.last_step_compressed = false;
            return Ok(context);
        }

        let prefix_tokens: usize = prefix.iter().map(|m| estimate_tokens(&message_text(m))).sum();
        if prefix_tokens < 100 {
            self.state.last_step_compressed = false;
            return Ok(context);
        }

        let target = ((prefix_tokens as f64) * self.config.compression_ratio).round() as usize;
        let summary = summarizer.summarize(&prefix, Some(target)).await?;
        let summary_tokens = estimate_tokens(&summary);

        let savings = prefix_tokens as i64 - summary_tokens as i64;
        self.state.last_savings = savings;
        self.state.net_savings += savings;
        self.state.last_step_compressed = true;

        let mut out = Vec::with_capacity(tail.len() + 1);
        out.push(Message::user(summary));
        out.extend(tail);
        Ok(out)
    }

    /// Identifies the compressible prefix: everything older than the last
    /// `short_term_count` messages, excluding protected tool pairs, which are
    /// never split and are kept adjacent wherever they occur (§4.6).
    fn split_compressible_prefix(&self, context: &[Message]) -> (Vec<Message>, Vec<Message>) {
        let protected = self.protected_indices(context);
        let short_term_start = context.len().saturating_sub(self.config.short_term_count);

        let mut prefix = Vec::new();
        let mut tail = Vec::new();
        for (idx, message) in context.iter().enumerate() {
            if idx >= short_term_start || protected.contains(&idx) {
                tail.push(message.clone());
            } else {
                prefix.push(message.clone());
            }
        }
        (prefix, tail)
    }

    /// Indices of messages belonging to a protected assistant/tool-call pair:
    /// an assistant message carrying a tool_call whose name is protected,
    /// together with every matching `tool` message that follows it before the
    /// next assistant message.
    fn protected_indices(&self, context: &[Message]) -> HashSet<usize> {
        let mut protected = HashSet::new();
        let mut idx = 0;
        while idx < context.len() {
            if let Message::Assistant { tool_calls, .. } = &context[idx] {
                let protected_ids: HashSet<&str> = tool_calls
                    .iter()
                    .filter(|tc| self.config.protected_tools.contains(&tc.name))
                    .map(|tc| tc.id.as_str())
                    .collect();
                if !protected_ids.is_empty() {
                    protected.insert(idx);
                    let mut j = idx + 1;
                    while j < context.len() {
                        match &context[j] {
                            Message::Tool { tool_call_id, .. }
                                if protected_ids.contains(tool_call_id.as_str()) =>
                            {
                                protected.insert(j);
                                j += 1;
                            }
                            Message::Assistant { .. } => break,
                            _ => {
                                j += 1;
                            }
                        }
                    }
                }
            }
            idx += 1;
        }
        protected
    }
}

fn message_text(message: &Message) -> String {
    match message {
        Message::System { content } | Message::User { content } => content.clone(),
        Message::Assistant { content, tool_calls } => {
            let mut s = content.clone().unwrap_or_default();
            for tc in tool_calls {
                s.push_str(&tc.name);
                s.push_str(&tc.arguments.to_string());
            }
            s
        }
        Message::Tool { content, .. } => content.clone(),
    }
}

fn message_text_len(message: &Message) -> usize {
    message_text(message).chars().count()
}
