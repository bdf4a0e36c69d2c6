//! Composition Scheduler (§4.9): spawns child agents under depth/population
//! bounds, runs parallel exploration and dependency-ordered sub-task
//! execution with cycle detection, and merges results back into the parent
//! memory node.

pub mod dag;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;

use crate::agent::AgentLoop;
use crate::error::AgentError;
use crate::llm::LlmAdapter;
use crate::memory::{MemoryGraph, Summarizer};
use crate::message::Message;
use crate::tools::ToolRegistry;

/// A closed tag (§3): `none`, `plan_execute`, `parallel_explore`, `sequential_delegate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositionPattern {
    None,
    PlanExecute,
    ParallelExplore,
    SequentialDelegate,
}

/// `{id, description, tool_filter?, depends_on, priority, inherit_context}` (§3).
#[derive(Debug, Clone)]
pub struct SubtaskSpec {
    pub id: String,
    pub description: String,
    pub tool_filter: Option<Vec<String>>,
    pub depends_on: Vec<String>,
    pub priority: i32,
    pub inherit_context: bool,
}

/// Default read-only tool set admitted to exploration sub-agents (§4.9),
/// configurable via [`CompositionScheduler::with_exploration_tools`].
const DEFAULT_EXPLORATION_TOOLS: &[&str] =
    &["glob", "grep", "read_file", "web_search", "web_fetch", "code_navigator"];

/// The name reserved for the composition capability itself; sub-task tool
/// filters always exclude it to prevent unbounded recursive composition (§4.9).
const COMPOSITION_TOOL_NAME: &str = "compose_task";

/// Width of one multi-task execution batch (§4.9).
const MAX_PARALLEL: usize = 4;

/// Per-subtask prior-result budget in the rendered "previous_results" section (§4.9).
const PREVIOUS_RESULT_BUDGET: usize = 500;

/// Per-subtask result body budget in the final composition result string (§4.9).
const RESULT_BODY_BUDGET: usize = 2000;

/// Default width of one parallel-exploration round (§4.9).
const DEFAULT_EXPLORATION_WIDTH: usize = 3;

pub struct CompositionScheduler {
    llm: Arc<LlmAdapter>,
    tools: ToolRegistry,
    max_depth: u32,
    max_agents: u32,
    enable_composition: bool,
    exploration_tools: Vec<String>,
    spawned: Arc<AtomicU32>,
    cancelled: Arc<AtomicBool>,
}

impl CompositionScheduler {
    pub fn new(llm: Arc<LlmAdapter>, tools: ToolRegistry, max_depth: u32, max_agents: u32) -> Self {
        Self {
            llm,
            tools,
            max_depth,
            max_agents,
            enable_composition: true,
            exploration_tools: DEFAULT_EXPLORATION_TOOLS.iter().map(|s| s.to_string()).collect(),
            spawned: Arc::new(AtomicU32::new(1)), // the root agent counts toward max_agents
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_enable_composition(mut self, enable: bool) -> Self {
        self.enable_composition = enable;
        self
    }

    pub fn with_exploration_tools(mut self, tools: Vec<String>) -> Self {
        self.exploration_tools = tools;
        self
    }

    pub fn enable_composition(&self) -> bool {
        self.enable_composition
    }

    /// The full tool registry configured for this scheduler, for a caller
    /// that wants to run a root agent with the same tools its children see.
    pub fn tools(&self) -> ToolRegistry {
        self.tools.clone()
    }

    /// How many agents (including the root) have been spawned so far (§4.10).
    pub fn spawned_count(&self) -> u32 {
        self.spawned.load(Ordering::SeqCst)
    }

    /// Cancels the scheduler; every outstanding child task observes this at
    /// its next checkpoint (§5).
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn check_cancelled(&self) -> Result<(), AgentError> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(AgentError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Reserves one agent slot, enforcing `max_depth`/`max_agents` (§4.9).
    fn reserve_agent_slot(&self, depth: u32) -> Result<(), AgentError> {
        if depth > self.max_depth {
            return Err(AgentError::MaxDepthExceeded { depth, max_depth: self.max_depth });
        }
        let spawned = self.spawned.fetch_add(1, Ordering::SeqCst) + 1;
        if spawned > self.max_agents {
            self.spawned.fetch_sub(1, Ordering::SeqCst);
            return Err(AgentError::MaxAgentsExceeded { spawned, max_agents: self.max_agents });
        }
        Ok(())
    }

    fn child_registry(&self, tool_filter: Option<&[String]>) -> ToolRegistry {
        match tool_filter {
            None => self.tools.clone(),
            Some(names) => {
                let refs: Vec<&str> = names
                    .iter()
                    .map(String::as_str)
                    .filter(|n| *n != COMPOSITION_TOOL_NAME)
                    .collect();
                self.tools.filtered(&refs)
            }
        }
    }

    fn exploration_registry(&self) -> ToolRegistry {
        let refs: Vec<&str> = self.exploration_tools.iter().map(String::as_str).collect();
        self.tools.filtered(&refs)
    }

    /// Classifies `task` into a [`CompositionPattern`] via one LLM call (§4.9,
    /// §9: always-present policy step, gated by `enable_composition`).
    pub async fn assess(&self, task: &str) -> Result<CompositionPattern, AgentError> {
        if !self.enable_composition {
            return Ok(CompositionPattern::None);
        }
        let prompt = crate::prompts::composition_assessment_prompt(task);
        let response = self
            .llm
            .call(vec![Message::user(prompt)], vec![], 256, None, Value::Null)
            .await?;
        Ok(parse_pattern(&response.content.unwrap_or_default()))
    }

    /// Runs `aspects` as parallel read-only exploration children of `parent_id`,
    /// merging their summaries back via `graph.merge` (§4.9). Returns the
    /// spawned child ids.
    pub async fn explore(
        &self,
        graph: &mut MemoryGraph,
        parent_id: &str,
        aspects: Vec<String>,
        depth: u32,
        summarizer: &dyn Summarizer,
    ) -> Result<(Vec<String>, Vec<String>), AgentError> {
        self.check_cancelled()?;
        let width = aspects.len().min(DEFAULT_EXPLORATION_WIDTH);
        let aspects: Vec<String> = aspects.into_iter().take(width).collect();

        let mut child_ids = Vec::with_capacity(aspects.len());
        for aspect in &aspects {
            self.reserve_agent_slot(depth)?;
            let mut meta = HashMap::new();
            meta.insert("scope".to_string(), Value::String(aspect.clone()));
            let child_id = graph.create_node(&[parent_id.to_string()], Some(meta))?;
            graph.append(&child_id, Message::user(crate::prompts::exploration_aspect_prompt(aspect)))?;
            child_ids.push(child_id);
        }

        let llm = Arc::clone(&self.llm);
        let registry = self.exploration_registry();
        let cancelled = Arc::clone(&self.cancelled);

        let futures: Vec<_> = child_ids
            .iter()
            .map(|child_id| {
                let llm = Arc::clone(&llm);
                let registry = registry.clone();
                let messages = graph.context_for(child_id);
                let cancelled = Arc::clone(&cancelled);
                async move {
                    if cancelled.load(Ordering::SeqCst) {
                        return Err(AgentError::Cancelled);
                    }
                    let handle = tokio::spawn(async move {
                        run_once(llm, registry, messages).await
                    });
                    match handle.await {
                        Ok(inner) => inner,
                        Err(join_err) => Err(AgentError::ToolFailure(format!(
                            "exploration task panicked: {join_err}"
                        ))),
                    }
                }
            })
            .collect();

        let results = join_all(futures).await;
        let mut texts = Vec::with_capacity(results.len());
        for (child_id, result) in child_ids.iter().zip(results) {
            let text = match result {
                Ok(text) => text,
                Err(err) => format!("Exploration failed: {err}"),
            };
            graph.append(child_id, Message::assistant(Some(text.clone()), vec![])?)?;
            texts.push(text);
        }

        graph.merge(&child_ids, parent_id, summarizer).await?;
        Ok((child_ids, texts))
    }

    /// `parallel_explore` (§4.9): explores, merges, then synthesizes a final
    /// answer with one additional LLM call.
    pub async fn parallel_explore(
        &self,
        graph: &mut MemoryGraph,
        parent_id: &str,
        task: &str,
        aspects: Vec<String>,
        depth: u32,
        summarizer: &dyn Summarizer,
    ) -> Result<String, AgentError> {
        let (_, texts) = self.explore(graph, parent_id, aspects, depth, summarizer).await?;
        let synthesis_prompt = crate::prompts::synthesis_prompt(task, &texts);
        let response = self
            .llm
            .call(vec![Message::user(synthesis_prompt)], vec![], 2048, None, Value::Null)
            .await?;
        Ok(response.content.unwrap_or_default())
    }

    /// Dependency-ordered multi-task execution (§4.9). Validates the
    /// dependency graph before running anything; a task that fails still
    /// counts as completed so descendants can run.
    pub async fn multi_task(
        &self,
        graph: &mut MemoryGraph,
        parent_id: &str,
        tasks: Vec<SubtaskSpec>,
        depth: u32,
    ) -> Result<String, AgentError> {
        if tasks.is_empty() {
            return Err(AgentError::InvalidInput("no subtasks provided".into()));
        }

        let n = tasks.len();
        let id_index: HashMap<String, usize> =
            tasks.iter().enumerate().map(|(i, t)| (t.id.clone(), i)).collect();
        let deps: HashMap<String, HashSet<String>> = tasks
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let prereqs = t
                    .depends_on
                    .iter()
                    .filter_map(|dep| id_index.get(dep).map(|idx| idx.to_string()))
                    .collect();
                (i.to_string(), prereqs)
            })
            .collect();

        // Reject any prerequisite id not present among the batch's own ids.
        for task in &tasks {
            for dep in &task.depends_on {
                if !id_index.contains_key(dep) {
                    return Err(AgentError::InvalidInput(format!(
                        "task {} depends on unknown id {dep}",
                        task.id
                    )));
                }
            }
        }

        // A cyclic dependency graph is a task-level outcome, not a fatal runtime
        // error (§7): it must surface as the non-empty result string `run(task)`
        // returns, not as an `Err` that aborts the task.
        if let Err(err) = dag::validate(n, &deps) {
            return match err {
                AgentError::CyclicDependency(reason) => {
                    Ok(format!("Error: Circular dependency detected ({reason})"))
                }
                other => Err(other),
            };
        }

        let mut completed: HashSet<String> = HashSet::new();
        let mut results: Vec<Option<(String, bool)>> = vec![None; n]; // (text, ok)

        while completed.len() < n {
            self.check_cancelled()?;
            let ready = dag::ready_tasks(n, &deps, &completed);
            if ready.is_empty() {
                break; // unreachable when validation ran, per §4.9
            }

            for batch in ready.chunks(MAX_PARALLEL) {
                let mut handles = Vec::with_capacity(batch.len());
                for idx_str in batch {
                    let idx: usize = idx_str.parse().unwrap();
                    self.reserve_agent_slot(depth)?;
                    let task = &tasks[idx];
                    let previous_section = render_previous_results(&results, &deps[idx_str], idx_str);
                    let child_id = graph.create_node(&[parent_id.to_string()], {
                        let mut meta = HashMap::new();
                        meta.insert("scope".to_string(), Value::String(task.id.clone()));
                        Some(meta)
                    })?;
                    let prompt = format!("{}\n\n{}", task.description, previous_section);
                    graph.append(&child_id, Message::user(prompt))?;

                    let tool_filter = task.tool_filter.clone();
                    let registry = self.child_registry(tool_filter.as_deref());
                    let llm = Arc::clone(&self.llm);
                    let messages = graph.context_for(&child_id);

                    handles.push((idx, child_id, tokio::spawn(async move {
                        run_once(llm, registry, messages).await
                    })));
                }

                for (idx, child_id, handle) in handles {
                    let outcome = match handle.await {
                        Ok(Ok(text)) => (text, true),
                        Ok(Err(err)) => (format!("Task failed: {err}"), false),
                        Err(join_err) => (format!("Task failed: {join_err}"), false),
                    };
                    graph.append(&child_id, Message::assistant(Some(outcome.0.clone()), vec![])?)?;
                    results[idx] = Some(outcome);
                    completed.insert(idx.to_string());
                }
            }
        }

        Ok(format_results(&tasks, &results))
    }
}

fn render_previous_results(
    results: &[Option<(String, bool)>],
    prereqs: &HashSet<String>,
    _self_id: &str,
) -> String {
    if prereqs.is_empty() {
        return String::new();
    }
    let mut ordered: Vec<&String> = prereqs.iter().collect();
    ordered.sort();
    let mut out = String::from("Previous results:\n");
    for idx_str in ordered {
        let idx: usize = idx_str.parse().unwrap();
        if let Some((text, _)) = &results[idx] {
            let truncated: String = text.chars().take(PREVIOUS_RESULT_BUDGET).collect();
            out.push_str(&format!("- [{idx_str}] {truncated}\n"));
        }
    }
    out
}

fn format_results(tasks: &[SubtaskSpec], results: &[Option<(String, bool)>]) -> String {
    let mut out = String::new();
    for (task, result) in tasks.iter().zip(results) {
        let (status, body) = match result {
            Some((text, true)) => ("done", text.as_str()),
            Some((text, false)) => ("failed", text.as_str()),
            None => ("skipped", ""),
        };
        let truncated: String = body.chars().take(RESULT_BODY_BUDGET).collect();
        out.push_str(&format!("## {} ({status})\n{truncated}\n\n", task.description));
    }
    out.trim_end().to_string()
}

fn parse_pattern(text: &str) -> CompositionPattern {
    let lowered = text.to_lowercase();
    if lowered.contains("sequential_delegate") {
        CompositionPattern::SequentialDelegate
    } else if lowered.contains("parallel_explore") {
        CompositionPattern::ParallelExplore
    } else if lowered.contains("plan_execute") {
        CompositionPattern::PlanExecute
    } else {
        CompositionPattern::None
    }
}

/// Runs a fresh, single-use [`AgentLoop`] over a seeded message list — used
/// for exploration and sub-task children, which do not themselves need a
/// rolling compressor state beyond their own short-lived context.
async fn run_once(
    llm: Arc<LlmAdapter>,
    tools: ToolRegistry,
    seed_messages: Vec<Message>,
) -> Result<String, AgentError> {
    let mut graph = MemoryGraph::new();
    let root = graph.create_root(None);
    for message in seed_messages {
        graph.append(&root, message)?;
    }
    let agent_loop = AgentLoop::new(llm.clone(), tools, 25);
    struct PassSummarizer(Arc<LlmAdapter>);
    #[async_trait::async_trait]
    impl Summarizer for PassSummarizer {
        async fn summarize(&self, messages: &[Message], target: Option<usize>) -> Result<String, AgentError> {
            self.0.summarize(messages, target).await
        }
    }
    let summarizer = PassSummarizer(llm);
    let mut compressor = crate::compress::ContextCompressor::new(crate::compress::CompressorConfig::default());
    agent_loop.run(&mut graph, &root, &[], &mut compressor, &summarizer).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmRequest, LlmProvider, MockLlmProvider, ProviderResponse};
    use async_trait::async_trait;

    struct NoopSummarizer;
    #[async_trait]
    impl Summarizer for NoopSummarizer {
        async fn summarize(&self, _m: &[Message], _t: Option<usize>) -> Result<String, AgentError> {
            Ok("merged summary".to_string())
        }
    }

    fn scheduler_with(responses: Vec<ProviderResponse>, max_depth: u32, max_agents: u32) -> CompositionScheduler {
        let provider = MockLlmProvider::new(responses);
        let llm = Arc::new(LlmAdapter::new(Arc::new(provider)));
        CompositionScheduler::new(llm, ToolRegistry::new(), max_depth, max_agents)
    }

    #[tokio::test]
    async fn empty_task_list_returns_error() {
        let scheduler = scheduler_with(vec![ProviderResponse::default()], 3, 10);
        let mut graph = MemoryGraph::new();
        let root = graph.create_root(None);
        let err = scheduler.multi_task(&mut graph, &root, vec![], 1).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn cycle_rejection_makes_no_llm_call() {
        let scheduler = scheduler_with(vec![ProviderResponse::default()], 3, 10);
        let mut graph = MemoryGraph::new();
        let root = graph.create_root(None);
        let tasks = vec![
            SubtaskSpec { id: "0".into(), description: "a".into(), tool_filter: None, depends_on: vec!["1".into()], priority: 0, inherit_context: false },
            SubtaskSpec { id: "1".into(), description: "b".into(), tool_filter: None, depends_on: vec!["0".into()], priority: 0, inherit_context: false },
        ];
        // §7: a cyclic dependency is a task-level outcome carried in the `Ok`
        // result string, not a fatal `Err` that aborts the task.
        let result = scheduler.multi_task(&mut graph, &root, tasks, 1).await.unwrap();
        assert!(result.starts_with("Error: Circular dependency detected"));
    }

    #[tokio::test]
    async fn max_depth_zero_prevents_any_child_spawn() {
        let scheduler = scheduler_with(vec![ProviderResponse::default()], 0, 10);
        let mut graph = MemoryGraph::new();
        let root = graph.create_root(None);
        let tasks = vec![SubtaskSpec {
            id: "0".into(),
            description: "a".into(),
            tool_filter: None,
            depends_on: vec![],
            priority: 0,
            inherit_context: false,
        }];
        let err = scheduler.multi_task(&mut graph, &root, tasks, 1).await.unwrap_err();
        assert!(matches!(err, AgentError::MaxDepthExceeded { .. }));
    }

    #[tokio::test]
    async fn max_agents_one_admits_only_the_root() {
        let scheduler = scheduler_with(vec![ProviderResponse::default()], 3, 1);
        let mut graph = MemoryGraph::new();
        let root = graph.create_root(None);
        let tasks = vec![SubtaskSpec {
            id: "0".into(),
            description: "a".into(),
            tool_filter: None,
            depends_on: vec![],
            priority: 0,
            inherit_context: false,
        }];
        let err = scheduler.multi_task(&mut graph, &root, tasks, 1).await.unwrap_err();
        assert!(matches!(err, AgentError::MaxAgentsExceeded { .. }));
    }

    #[tokio::test]
    async fn multi_task_runs_dependent_chain_and_propagates_previous_results() {
        let provider = MockLlmProvider::new(vec![
            ProviderResponse { content: Some("step one done".into()), finish_reason: "stop".into(), ..Default::default() },
            ProviderResponse { content: Some("step two done".into()), finish_reason: "stop".into(), ..Default::default() },
        ]);
        let llm = Arc::new(LlmAdapter::new(Arc::new(provider)));
        let scheduler = CompositionScheduler::new(llm, ToolRegistry::new(), 3, 10);
        let mut graph = MemoryGraph::new();
        let root = graph.create_root(None);

        let tasks = vec![
            SubtaskSpec { id: "0".into(), description: "first step".into(), tool_filter: None, depends_on: vec![], priority: 0, inherit_context: false },
            SubtaskSpec { id: "1".into(), description: "second step".into(), tool_filter: None, depends_on: vec!["0".into()], priority: 0, inherit_context: false },
        ];

        let result = scheduler.multi_task(&mut graph, &root, tasks, 1).await.unwrap();
        assert!(result.contains("## first step (done)"));
        assert!(result.contains("## second step (done)"));
    }

    #[tokio::test]
    async fn assess_disabled_returns_none_without_llm_call() {
        let scheduler = scheduler_with(vec![ProviderResponse {
            content: Some("parallel_explore".into()),
            finish_reason: "stop".into(),
            ..Default::default()
        }], 3, 10)
        .with_enable_composition(false);
        let pattern = scheduler.assess("do a thing").await.unwrap();
        assert!(matches!(pattern, CompositionPattern::None));
    }

    #[tokio::test]
    async fn assess_parses_pattern_keyword_from_response() {
        let scheduler = scheduler_with(vec![ProviderResponse {
            content: Some("sequential_delegate".into()),
            finish_reason: "stop".into(),
            ..Default::default()
        }], 3, 10);
        let pattern = scheduler.assess("do a thing").await.unwrap();
        assert!(matches!(pattern, CompositionPattern::SequentialDelegate));
    }

    #[tokio::test]
    async fn parallel_exploration_merge_concatenates_summaries() {
        let scheduler = scheduler_with(
            vec![
                ProviderResponse { content: Some("finding A".into()), finish_reason: "stop".into(), ..Default::default() },
                ProviderResponse { content: Some("finding B".into()), finish_reason: "stop".into(), ..Default::default() },
                ProviderResponse { content: Some("finding C".into()), finish_reason: "stop".into(), ..Default::default() },
            ],
            3,
            10,
        );
        let mut graph = MemoryGraph::new();
        let root = graph.create_root(None);
        let summarizer = NoopSummarizer;
        let (child_ids, _texts) = scheduler
            .explore(&mut graph, &root, vec!["a".into(), "b".into(), "c".into()], 1, &summarizer)
            .await
            .unwrap();
        assert_eq!(child_ids.len(), 3);
        let root_node = graph.node(&root).unwrap();
        assert_eq!(root_node.messages.len(), 1);
        match &root_node.messages[0] {
            Message::User { content } => assert!(content.contains("merged summary")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(graph.ancestors(&root).is_empty());
    }
}
