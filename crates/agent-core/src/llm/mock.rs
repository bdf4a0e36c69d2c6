//! A scripted [`LlmProvider`] for tests: returns a fixed sequence of
//! responses, one per call, looping the last one if exhausted.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::AgentError;

use super::{LlmProvider, LlmRequest, ProviderResponse};

pub struct MockLlmProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    calls: Mutex<Vec<LlmRequest>>,
}

impl MockLlmProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_text(content: impl Into<String>) -> Self {
        Self::new(vec![ProviderResponse {
            content: Some(content.into()),
            finish_reason: "stop".into(),
            ..Default::default()
        }])
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn call(&self, request: &LlmRequest) -> Result<ProviderResponse, AgentError> {
        self.calls.lock().unwrap().push(request.clone());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Ok(ProviderResponse {
                content: Some(String::new()),
                finish_reason: "stop".into(),
                ..Default::default()
            });
        }
        if responses.len() == 1 {
            Ok(responses[0].clone())
        } else {
            Ok(responses.remove(0))
        }
    }
}
