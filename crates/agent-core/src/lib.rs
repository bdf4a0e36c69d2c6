//! # agent-core
//!
//! A minimal, LLM-driven agent runtime built around a reason/act/observe
//! loop: one [`memory::MemoryGraph`] node holds an agent's conversation,
//! an [`llm::LlmAdapter`] drives a configured model, a [`tools::ToolRegistry`]
//! exposes callable tools, and a [`composition::CompositionScheduler`] can
//! spawn bounded child agents onto additional graph nodes when a task
//! benefits from exploration or delegation.
//!
//! ## Design principles
//!
//! - **One conversation, one graph node**: agents hold a node id, never a
//!   raw reference, so concurrent spawn/delete cannot dangle.
//! - **Closed-tag messages**: [`message::Message`] is a sum type over
//!   System/User/Assistant/Tool variants with constructor-enforced
//!   invariants, normalized from whatever shape a provider hands back.
//! - **Bounded composition**: child agents are spawned under explicit
//!   depth/population bounds and their dependency graph is validated for
//!   cycles before any of them run.
//! - **Outer verification**: the [`agent::VerificationLoop`] wraps the
//!   [`agent::AgentLoop`] and re-enters it with corrective feedback until a
//!   [`agent::Verifier`] judges the answer complete, or an iteration cap is hit.
//!
//! ## Main modules
//!
//! - [`message`]: the canonical [`message::Message`] model and the incoming-shape normalizer.
//! - [`llm`]: [`llm::LlmAdapter`], the [`llm::LlmProvider`] trait, and [`llm::ReasoningEffort`].
//! - [`memory`]: [`memory::MemoryGraph`], the arena-keyed DAG of [`memory::MemoryNode`]s.
//! - [`compress`]: [`compress::ContextCompressor`], threshold-triggered prefix summarization.
//! - [`agent`]: [`agent::AgentLoop`] and [`agent::VerificationLoop`].
//! - [`composition`]: [`composition::CompositionScheduler`] — exploration and dependency-ordered sub-tasks.
//! - [`tools`]: [`tools::ToolRegistry`], [`tools::ToolExecutor`], the [`tools::Tool`] trait.
//! - [`tool_result`]: [`tool_result::ToolResultProcessor`] — recovery guidance for truncated tool output.
//! - [`session_store`]: the [`session_store::SessionStore`] trait and an in-memory reference implementation.
//! - [`longterm`]: optional long-term-memory and skills collaborators.
//! - [`runtime`]: [`runtime::RuntimeCoordinator`], the entry point wiring everything above together.
//! - [`error`]: [`error::AgentError`], the runtime's error taxonomy.
//! - [`retry`]: [`retry::RetryPolicy`] and the exponential-backoff retry driver.
//! - [`prompts`]: bundled prompt templates for composition assessment, exploration, and verification.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use agent_core::llm::{LlmAdapter, MockLlmProvider};
//! use agent_core::runtime::{RuntimeConfig, RuntimeCoordinator};
//! use agent_core::tools::ToolRegistry;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let llm = Arc::new(LlmAdapter::new(Arc::new(MockLlmProvider::with_text("hello"))));
//! let mut runtime = RuntimeCoordinator::new(llm, ToolRegistry::new(), RuntimeConfig::default());
//! let answer = runtime.run("say hello").await.unwrap();
//! println!("{answer}");
//! # }
//! ```

pub mod agent;
pub mod composition;
pub mod compress;
pub mod error;
pub mod llm;
pub mod longterm;
pub mod memory;
pub mod message;
pub mod prompts;
pub mod retry;
pub mod runtime;
pub mod session_store;
pub mod tool_result;
pub mod tools;

pub use agent::{AgentLoop, LlmVerifier, VerificationLoop, VerificationResult, Verifier, MAX_ITERATIONS_MESSAGE};
pub use composition::{CompositionPattern, CompositionScheduler, SubtaskSpec};
pub use compress::{CompressorConfig, CompressorState, ContextCompressor};
pub use error::AgentError;
pub use llm::{LlmAdapter, LlmProvider, LlmRequest, ProviderResponse, ReasoningEffort, ToolSchema};
pub use longterm::{LongTermMemoryProvider, NoopLongTermMemory, NoopSkillsProvider, SkillsProvider};
pub use memory::{MemoryGraph, MemoryGraphSnapshot, MemoryNode, Summarizer};
pub use message::{LlmResponse, Message, NormalizedIncoming, Role, StopReason, ToolCall, ToolResult, Usage};
pub use retry::RetryPolicy;
pub use runtime::{MemoryGraphStats, RuntimeConfig, RuntimeConfigStats, RuntimeCoordinator, RuntimeStats};
pub use session_store::{InMemorySessionStore, SessionSnapshot, SessionStats, SessionStore, SessionSummary};
pub use tool_result::ToolResultProcessor;
pub use tools::{Tool, ToolExecutor, ToolRegistry, ToolSpec};
