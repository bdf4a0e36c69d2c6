//! Runtime Coordinator (§4.10): the entry point that owns a task's
//! [`MemoryGraph`], wires the Agent Loop, Verification Loop, and Composition
//! Scheduler together, and assembles the root system prompt from the
//! optional long-term-memory and skills collaborators.
//!
//! Grounded on the teacher's `ReactRunner` (`agent/react/runner/runner.rs`),
//! generalized to own a [`MemoryGraph`] in place of a compiled state graph.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{error, info};

use crate::agent::{AgentLoop, LlmVerifier, VerificationLoop, Verifier};
use crate::compress::{CompressorConfig, ContextCompressor};
use crate::composition::{CompositionPattern, CompositionScheduler, SubtaskSpec};
use crate::error::AgentError;
use crate::llm::LlmAdapter;
use crate::longterm::{rewrite_skill_invocation, LongTermMemoryProvider, NoopLongTermMemory, NoopSkillsProvider, SkillsProvider};
use crate::memory::MemoryGraph;
use crate::message::Message;
use crate::session_store::SessionStore;
use crate::tools::ToolRegistry;

/// Bounds and toggles that shape one coordinator's behavior (§4.9, §4.10).
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub max_depth: u32,
    pub max_agents: u32,
    pub max_iterations: u32,
    pub ralph_max_iterations: u32,
    pub enable_composition: bool,
    pub persist_session: bool,
    pub decomposition_width: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_agents: 10,
            max_iterations: 25,
            ralph_max_iterations: 3,
            enable_composition: true,
            persist_session: false,
            decomposition_width: 3,
        }
    }
}

/// `{node_count, total_messages, nodes_with_summary}` (§4.10).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryGraphStats {
    pub node_count: usize,
    pub total_messages: usize,
    pub nodes_with_summary: usize,
}

/// `{max_depth, max_agents}` echoed back verbatim from the configured bounds (§4.10).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfigStats {
    pub max_depth: u32,
    pub max_agents: u32,
}

/// `{agent_count, memory_graph, config}` (§4.10).
#[derive(Debug, Clone)]
pub struct RuntimeStats {
    pub agent_count: u32,
    pub memory_graph: MemoryGraphStats,
    pub config: RuntimeConfigStats,
}

/// Owns one task's [`MemoryGraph`] and the collaborators needed to run it
/// end to end: the LLM Adapter, tool registry, Composition Scheduler,
/// optional session persistence, and optional long-term-memory/skills
/// system-prompt sections (§4.10).
pub struct RuntimeCoordinator {
    llm: Arc<LlmAdapter>,
    scheduler: CompositionScheduler,
    verifier: Arc<dyn Verifier>,
    session_store: Option<Arc<dyn SessionStore>>,
    long_term_memory: Arc<dyn LongTermMemoryProvider>,
    skills: Arc<dyn SkillsProvider>,
    graph: MemoryGraph,
    config: RuntimeConfig,
}

impl RuntimeCoordinator {
    pub fn new(llm: Arc<LlmAdapter>, tools: ToolRegistry, config: RuntimeConfig) -> Self {
        let scheduler = CompositionScheduler::new(
            Arc::clone(&llm),
            tools,
            config.max_depth,
            config.max_agents,
        )
        .with_enable_composition(config.enable_composition);
        let verifier = Arc::new(LlmVerifier::new(Arc::clone(&llm)));
        Self {
            llm,
            scheduler,
            verifier,
            session_store: None,
            long_term_memory: Arc::new(NoopLongTermMemory),
            skills: Arc::new(NoopSkillsProvider),
            graph: MemoryGraph::new(),
            config,
        }
    }

    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    pub fn with_long_term_memory(mut self, provider: Arc<dyn LongTermMemoryProvider>) -> Self {
        self.long_term_memory = provider;
        self
    }

    pub fn with_skills_provider(mut self, provider: Arc<dyn SkillsProvider>) -> Self {
        self.skills = provider;
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn Verifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn graph(&self) -> &MemoryGraph {
        &self.graph
    }

    /// `run(task) -> string` (§4.10):
    ///
    /// 1. Creates a root memory node tagged `{scope: "root", task}`.
    /// 2. Assembles the system prompt: long-term memory section, then skills
    ///    section, then nothing else — the task itself becomes the root's
    ///    first user message, rewritten for `$<skill>` invocations.
    /// 3. If composition is enabled, assesses the task's composition
    ///    pattern; `plan_execute` seeds the root's context with merged
    ///    exploration before the Agent Loop runs, while `parallel_explore`
    ///    and `sequential_delegate` produce their own final answer without a
    ///    further verification pass. Everything else runs the Agent Loop
    ///    wrapped by the Verification Loop directly.
    /// 4. Persists the session if `persist_session` is set and a session
    ///    store is configured.
    /// 5. Logs and re-raises on any uncaught error.
    pub async fn run(&mut self, task: &str) -> Result<String, AgentError> {
        match self.run_inner(task).await {
            Ok(result) => Ok(result),
            Err(err) => {
                error!(error = %err, code = err.code(), "runtime coordinator failed");
                Err(err)
            }
        }
    }

    async fn run_inner(&mut self, task: &str) -> Result<String, AgentError> {
        let mut meta = Map::new();
        meta.insert("scope".to_string(), Value::String("root".to_string()));
        meta.insert("task".to_string(), Value::String(task.to_string()));
        let root = self.graph.create_root(Some(meta.into_iter().collect()));

        let system_messages = self.system_messages().await?;
        let user_text = rewrite_skill_invocation(task);
        self.graph.append(&root, Message::user(user_text))?;

        let pattern = self.scheduler.assess(task).await?;
        info!(?pattern, "composition assessment complete");

        let result = match pattern {
            CompositionPattern::None => self.run_verified(&root, task, &system_messages).await?,
            CompositionPattern::PlanExecute => {
                let aspects = self.decompose_aspects(task).await?;
                self.scheduler
                    .explore(&mut self.graph, &root, aspects, 1, self.llm.as_ref())
                    .await?;
                self.run_verified(&root, task, &system_messages).await?
            }
            CompositionPattern::ParallelExplore => {
                let aspects = self.decompose_aspects(task).await?;
                self.scheduler
                    .parallel_explore(&mut self.graph, &root, task, aspects, 1, self.llm.as_ref())
                    .await?
            }
            CompositionPattern::SequentialDelegate => {
                let subtasks = self.decompose_subtasks(task).await?;
                self.scheduler
                    .multi_task(&mut self.graph, &root, subtasks, 1)
                    .await?
            }
        };

        if self.config.persist_session {
            self.persist(&root, &system_messages).await?;
        }

        Ok(result)
    }

    async fn run_verified(
        &mut self,
        root: &str,
        task: &str,
        system_messages: &[Message],
    ) -> Result<String, AgentError> {
        let agent_loop = AgentLoop::new(
            Arc::clone(&self.llm),
            self.scheduler.tools(),
            self.config.max_iterations,
        );
        let verification_loop = VerificationLoop::new(
            agent_loop,
            Arc::clone(&self.verifier),
            self.config.ralph_max_iterations,
        );
        let mut compressor = ContextCompressor::new(CompressorConfig::default());
        verification_loop
            .run(&mut self.graph, root, task, system_messages, &mut compressor, self.llm.as_ref())
            .await
    }

    /// Long-term-memory section first, then the skills section (§4.10,
    /// confirmed against `original_source/agent/runtime.py`'s system-message
    /// assembly order).
    async fn system_messages(&self) -> Result<Vec<Message>, AgentError> {
        let mut messages = Vec::new();
        if let Some(section) = self.long_term_memory.load_and_format().await? {
            messages.push(Message::system(section));
        }
        if let Some(section) = self.skills.render_section().await? {
            messages.push(Message::system(section));
        }
        Ok(messages)
    }

    async fn decompose_aspects(&self, task: &str) -> Result<Vec<String>, AgentError> {
        let prompt = crate::prompts::decomposition_prompt(task, self.config.decomposition_width);
        let response = self
            .llm
            .call(vec![Message::user(prompt)], vec![], 512, None, Value::Null)
            .await?;
        Ok(parse_numbered_list(&response.content.unwrap_or_default(), self.config.decomposition_width))
    }

    async fn decompose_subtasks(&self, task: &str) -> Result<Vec<SubtaskSpec>, AgentError> {
        let descriptions = self.decompose_aspects(task).await?;
        Ok(descriptions
            .into_iter()
            .enumerate()
            .map(|(i, description)| SubtaskSpec {
                id: i.to_string(),
                description,
                tool_filter: None,
                depends_on: if i == 0 { Vec::new() } else { vec![(i - 1).to_string()] },
                priority: 0,
                inherit_context: true,
            })
            .collect())
    }

    async fn persist(&self, root: &str, system_messages: &[Message]) -> Result<(), AgentError> {
        let Some(store) = &self.session_store else {
            return Ok(());
        };
        let session_id = store.create_session(None).await?;
        let messages = self.graph.context_for(root);
        store
            .save_memory(&session_id, system_messages.to_vec(), messages)
            .await
    }

    /// Statistics exposed for observability (§4.10): how many agents have
    /// been spawned so far, a memory-graph size snapshot, and the configured
    /// depth/population bounds.
    pub fn stats(&self) -> RuntimeStats {
        let node_count = self.graph.node_count();
        let mut total_messages = 0usize;
        let mut nodes_with_summary = 0usize;
        for id in self.graph.node_ids() {
            if let Some(node) = self.graph.node(&id) {
                total_messages += node.messages.len();
                if node.summary.is_some() {
                    nodes_with_summary += 1;
                }
            }
        }
        RuntimeStats {
            agent_count: self.scheduler.spawned_count(),
            memory_graph: MemoryGraphStats { node_count, total_messages, nodes_with_summary },
            config: RuntimeConfigStats { max_depth: self.config.max_depth, max_agents: self.config.max_agents },
        }
    }
}

/// Parses a numbered or bulleted list response into at most `max` trimmed
/// lines, stripping leading markers like `1.`, `1)`, `-`, `*` (§4.9).
fn parse_numbered_list(text: &str, max: usize) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                return None;
            }
            let stripped = trimmed
                .trim_start_matches(|c: char| c.is_ascii_digit())
                .trim_start_matches(['.', ')'])
                .trim_start_matches(['-', '*'])
                .trim();
            if stripped.is_empty() {
                None
            } else {
                Some(stripped.to_string())
            }
        })
        .take(max)
        .collect()
}
