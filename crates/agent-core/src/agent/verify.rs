//! Verification Loop (§4.8): wraps the Agent Loop with an outer bound,
//! re-entering with corrective feedback until a [`Verifier`] judges the
//! answer complete.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::compress::ContextCompressor;
use crate::error::AgentError;
use crate::llm::LlmAdapter;
use crate::memory::{MemoryGraph, Summarizer};
use crate::message::Message;

use super::loop_::AgentLoop;

/// `{complete, reason}` (§4.8, §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    pub complete: bool,
    pub reason: String,
}

/// A capability that judges whether a final answer satisfies the task (§6).
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(
        &self,
        task: &str,
        result: &str,
        iteration: u32,
        previous_results: &[String],
    ) -> Result<VerificationResult, AgentError>;
}

/// Characters of `result` kept before the verification call (§9: matches the
/// original's verbatim truncation constant).
const VERIFICATION_RESULT_TRUNCATION: usize = 4000;

/// Default verifier (§4.8): a single LLM call with a fixed prompt, parsing a
/// response that begins with `COMPLETE:` or `INCOMPLETE:`.
pub struct LlmVerifier {
    llm: Arc<LlmAdapter>,
}

impl LlmVerifier {
    pub fn new(llm: Arc<LlmAdapter>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Verifier for LlmVerifier {
    async fn verify(
        &self,
        task: &str,
        result: &str,
        iteration: u32,
        previous_results: &[String],
    ) -> Result<VerificationResult, AgentError> {
        let truncated: String = result.chars().take(VERIFICATION_RESULT_TRUNCATION).collect();
        let previous = if previous_results.is_empty() {
            "(none)".to_string()
        } else {
            previous_results.join("\n---\n")
        };
        let prompt = crate::prompts::verification_prompt(task, &truncated, iteration, &previous);
        let response = self
            .llm
            .call(vec![Message::user(prompt)], vec![], 512, None, Value::Null)
            .await?;
        let text = response.content.unwrap_or_default();
        Ok(parse_verdict(&text))
    }
}

fn parse_verdict(text: &str) -> VerificationResult {
    let trimmed = text.trim();
    if let Some(reason) = trimmed.strip_prefix("COMPLETE:") {
        VerificationResult { complete: true, reason: reason.trim().to_string() }
    } else if let Some(reason) = trimmed.strip_prefix("INCOMPLETE:") {
        VerificationResult { complete: false, reason: reason.trim().to_string() }
    } else {
        // Fail open toward treating an unparseable verdict as incomplete so
        // the outer loop gets one more corrective pass instead of silently
        // accepting an unjudged answer.
        VerificationResult { complete: false, reason: trimmed.to_string() }
    }
}

/// Wraps [`AgentLoop`] with the outer verification bound `ralph_max_iterations` (§4.8).
pub struct VerificationLoop {
    inner: AgentLoop,
    verifier: Arc<dyn Verifier>,
    ralph_max_iterations: u32,
}

impl VerificationLoop {
    pub fn new(inner: AgentLoop, verifier: Arc<dyn Verifier>, ralph_max_iterations: u32) -> Self {
        Self { inner, verifier, ralph_max_iterations }
    }

    pub async fn run(
        &self,
        graph: &mut MemoryGraph,
        node_id: &str,
        task: &str,
        system_messages: &[Message],
        compressor: &mut ContextCompressor,
        summarizer: &dyn Summarizer,
    ) -> Result<String, AgentError> {
        let mut previous_results = Vec::new();

        for iteration in 1..=self.ralph_max_iterations {
            let result = self
                .inner
                .run(graph, node_id, system_messages, compressor, summarizer)
                .await?;

            if iteration == self.ralph_max_iterations {
                info!(iteration, "final outer iteration reached; returning unverified");
                return Ok(result);
            }

            let verdict = self
                .verifier
                .verify(task, &result, iteration, &previous_results)
                .await?;

            if verdict.complete {
                info!(iteration, "verifier accepted the result");
                return Ok(result);
            }

            debug!(iteration, reason = %verdict.reason, "verifier rejected the result; re-entering");
            previous_results.push(result);
            graph.append(node_id, Message::user(verdict.reason))?;
        }

        unreachable!("ralph_max_iterations loop always returns by its final iteration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_complete_and_incomplete_prefixes() {
        let complete = parse_verdict("COMPLETE: looks right");
        assert!(complete.complete);
        assert_eq!(complete.reason, "looks right");

        let incomplete = parse_verdict("INCOMPLETE: missing citation");
        assert!(!incomplete.complete);
        assert_eq!(incomplete.reason, "missing citation");
    }

    #[tokio::test]
    async fn verification_retry_scenario_injects_feedback_and_accepts_v2() {
        use crate::agent::loop_::AgentLoop;
        use crate::llm::{LlmRequest, LlmProvider, ProviderResponse};
        use crate::tools::ToolRegistry;
        use async_trait::async_trait;
        use std::sync::Mutex;

        struct Scripted {
            agent_answers: Mutex<Vec<&'static str>>,
            verdicts: Mutex<Vec<&'static str>>,
        }

        #[async_trait]
        impl LlmProvider for Scripted {
            async fn call(&self, request: &LlmRequest) -> Result<ProviderResponse, AgentError> {
                let is_verification_prompt = request
                    .messages
                    .iter()
                    .any(|m| matches!(m, Message::User { content } if content.contains("Judge whether")));
                if is_verification_prompt {
                    let mut verdicts = self.verdicts.lock().unwrap();
                    let text = verdicts.remove(0);
                    return Ok(ProviderResponse {
                        content: Some(text.to_string()),
                        finish_reason: "stop".into(),
                        ..Default::default()
                    });
                }
                let mut answers = self.agent_answers.lock().unwrap();
                let text = answers.remove(0);
                Ok(ProviderResponse {
                    content: Some(text.to_string()),
                    finish_reason: "stop".into(),
                    ..Default::default()
                })
            }
        }

        struct NoopSummarizer;
        #[async_trait]
        impl Summarizer for NoopSummarizer {
            async fn summarize(&self, _m: &[Message], _t: Option<usize>) -> Result<String, AgentError> {
                Ok(String::new())
            }
        }

        let provider = Arc::new(Scripted {
            agent_answers: Mutex::new(vec!["answer v1", "answer v2"]),
            verdicts: Mutex::new(vec!["INCOMPLETE: Missing X", "COMPLETE: OK"]),
        });
        let llm = Arc::new(LlmAdapter::new(provider));
        let agent_loop = AgentLoop::new(Arc::clone(&llm), ToolRegistry::new(), 5);
        let verifier = Arc::new(LlmVerifier::new(Arc::clone(&llm)));
        let verification_loop = VerificationLoop::new(agent_loop, verifier, 5);

        let mut graph = MemoryGraph::new();
        let root = graph.create_root(None);
        graph.append(&root, Message::user("do the task")).unwrap();

        let mut compressor = ContextCompressor::new(crate::compress::CompressorConfig {
            compression_threshold: usize::MAX,
            ..Default::default()
        });
        let summarizer = NoopSummarizer;

        let result = verification_loop
            .run(&mut graph, &root, "do the task", &[], &mut compressor, &summarizer)
            .await
            .unwrap();

        assert_eq!(result, "answer v2");
        let node = graph.node(&root).unwrap();
        assert!(node.messages.iter().any(|m| matches!(m, Message::User { content } if content == "Missing X")));
    }
}
