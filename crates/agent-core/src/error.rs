//! Error taxonomy for the agent runtime.
//!
//! Each variant carries a short stable `code()` (used by callers that branch on
//! error class rather than message text) plus a human-readable message.

use thiserror::Error;

/// The runtime's error taxonomy (§4.12 / §7).
#[derive(Debug, Error, Clone)]
pub enum AgentError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("tool failure: {0}")]
    ToolFailure(String),

    #[error("llm transient error: {0}")]
    LlmTransient(String),

    #[error("llm permanent error: {0}")]
    LlmPermanent(String),

    #[error("max depth exceeded: depth {depth} > max {max_depth}")]
    MaxDepthExceeded { depth: u32, max_depth: u32 },

    #[error("max agents exceeded: {spawned} > max {max_agents}")]
    MaxAgentsExceeded { spawned: u32, max_agents: u32 },

    #[error("cyclic dependency detected: {0}")]
    CyclicDependency(String),

    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("cancelled")]
    Cancelled,
}

impl AgentError {
    /// Short stable code, independent of the (potentially parameterized) message.
    pub fn code(&self) -> &'static str {
        match self {
            AgentError::InvalidInput(_) => "invalid_input",
            AgentError::MalformedMessage(_) => "malformed_message",
            AgentError::ToolFailure(_) => "tool_failure",
            AgentError::LlmTransient(_) => "llm_transient",
            AgentError::LlmPermanent(_) => "llm_permanent",
            AgentError::MaxDepthExceeded { .. } => "max_depth_exceeded",
            AgentError::MaxAgentsExceeded { .. } => "max_agents_exceeded",
            AgentError::CyclicDependency(_) => "cyclic_dependency",
            AgentError::BudgetExceeded(_) => "budget_exceeded",
            AgentError::Cancelled => "cancelled",
        }
    }

    /// Whether this error belongs to the "fatal to the task" tier (§7).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AgentError::MaxDepthExceeded { .. }
                | AgentError::MaxAgentsExceeded { .. }
                | AgentError::CyclicDependency(_)
                | AgentError::BudgetExceeded(_)
                | AgentError::LlmPermanent(_)
        )
    }

    /// Whether this error should be retried by the retry policy (§4.12: only LlmTransient).
    pub fn is_retriable(&self) -> bool {
        matches!(self, AgentError::LlmTransient(_))
    }
}
