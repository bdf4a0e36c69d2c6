//! Memory Graph (§3, §4.5): a DAG of memory nodes, each holding a message
//! list, an optional summary, metadata, and parent/child links.
//!
//! Modeled as an arena keyed by id with symmetric parent/child edge lists
//! (§9, "DAG with shared nodes → arena + ids"); agents hold an id, never a
//! raw reference, so concurrent spawn/delete cannot dangle.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::AgentError;
use crate::message::Message;

/// Anything that can summarize a slice of messages into prose (§4.5, §4.6).
/// The memory graph is decoupled from the LLM Adapter so it stays
/// synchronous except at these two named suspension points.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, messages: &[Message], target_tokens: Option<usize>) -> Result<String, AgentError>;
}

/// `{id, messages, parent_ids, child_ids, summary?, metadata, created_at}` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryNode {
    pub id: String,
    pub messages: Vec<Message>,
    pub parent_ids: HashSet<String>,
    pub child_ids: HashSet<String>,
    pub summary: Option<String>,
    pub metadata: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl MemoryNode {
    fn new(id: String, metadata: HashMap<String, Value>) -> Self {
        Self {
            id,
            messages: Vec::new(),
            parent_ids: HashSet::new(),
            child_ids: HashSet::new(),
            summary: None,
            metadata,
            created_at: Utc::now(),
        }
    }

    fn scope(&self) -> String {
        self.metadata
            .get("scope")
            .and_then(Value::as_str)
            .unwrap_or("previous")
            .to_string()
    }
}

/// `{nodes, root_id?}` (§3). Invariant: the directed graph is acyclic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryGraph {
    nodes: HashMap<String, MemoryNode>,
    root_id: Option<String>,
}

/// Plain-data serialization of a whole graph (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryGraphSnapshot {
    pub nodes: Vec<MemoryNode>,
    pub root_id: Option<String>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn root_id(&self) -> Option<&str> {
        self.root_id.as_deref()
    }

    pub fn node(&self, id: &str) -> Option<&MemoryNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut MemoryNode> {
        self.nodes.get_mut(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// All node ids currently in the graph, in arbitrary order.
    pub fn node_ids(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    /// `create_root(metadata?) -> Node` (§4.5).
    pub fn create_root(&mut self, metadata: Option<HashMap<String, Value>>) -> String {
        let id = Self::fresh_id();
        self.nodes
            .insert(id.clone(), MemoryNode::new(id.clone(), metadata.unwrap_or_default()));
        self.root_id = Some(id.clone());
        id
    }

    /// `create_node(parent_ids, metadata?) -> Node` (§4.5). Every listed
    /// parent must already exist; the new node is linked to all of them.
    pub fn create_node(
        &mut self,
        parent_ids: &[String],
        metadata: Option<HashMap<String, Value>>,
    ) -> Result<String, AgentError> {
        for parent in parent_ids {
            if !self.nodes.contains_key(parent) {
                return Err(AgentError::InvalidInput(format!(
                    "unknown parent id: {parent}"
                )));
            }
        }
        let id = Self::fresh_id();
        let mut node = MemoryNode::new(id.clone(), metadata.unwrap_or_default());
        node.parent_ids = parent_ids.iter().cloned().collect();
        self.nodes.insert(id.clone(), node);
        for parent in parent_ids {
            self.nodes.get_mut(parent).unwrap().child_ids.insert(id.clone());
        }
        Ok(id)
    }

    /// BFS forward from `child_id` through `child_ids`; returns true if it
    /// reaches `parent_id` (§4.5 cycle check for `link`).
    fn would_cycle(&self, child_id: &str, parent_id: &str) -> bool {
        if child_id == parent_id {
            return true;
        }
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(child_id.to_string());
        visited.insert(child_id.to_string());
        while let Some(current) = queue.pop_front() {
            if let Some(node) = self.nodes.get(&current) {
                for child in &node.child_ids {
                    if child == parent_id {
                        return true;
                    }
                    if visited.insert(child.clone()) {
                        queue.push_back(child.clone());
                    }
                }
            }
        }
        false
    }

    /// `link(child_id, parent_id)` (§4.5). Adds an additional parent; must not
    /// introduce a cycle.
    pub fn link(&mut self, child_id: &str, parent_id: &str) -> Result<(), AgentError> {
        if !self.nodes.contains_key(child_id) || !self.nodes.contains_key(parent_id) {
            return Err(AgentError::InvalidInput("link: unknown node id".into()));
        }
        if self.would_cycle(child_id, parent_id) {
            return Err(AgentError::CyclicDependency(format!(
                "linking {child_id} under {parent_id} would create a cycle"
            )));
        }
        self.nodes.get_mut(child_id).unwrap().parent_ids.insert(parent_id.to_string());
        self.nodes.get_mut(parent_id).unwrap().child_ids.insert(child_id.to_string());
        Ok(())
    }

    /// `unlink(child_id, parent_id)` (§4.5). Safe if the edge is missing.
    pub fn unlink(&mut self, child_id: &str, parent_id: &str) {
        if let Some(node) = self.nodes.get_mut(child_id) {
            node.parent_ids.remove(parent_id);
        }
        if let Some(node) = self.nodes.get_mut(parent_id) {
            node.child_ids.remove(child_id);
        }
    }

    /// `delete(node_id)` (§4.5). Cleans every reference in parents/children;
    /// clears `root_id` if the root is deleted.
    pub fn delete(&mut self, node_id: &str) {
        let Some(node) = self.nodes.remove(node_id) else {
            return;
        };
        for parent in &node.parent_ids {
            if let Some(p) = self.nodes.get_mut(parent) {
                p.child_ids.remove(node_id);
            }
        }
        for child in &node.child_ids {
            if let Some(c) = self.nodes.get_mut(child) {
                c.parent_ids.remove(node_id);
            }
        }
        if self.root_id.as_deref() == Some(node_id) {
            self.root_id = None;
        }
    }

    /// `ancestors(node_id) -> sequence` (§4.5). BFS over `parent_ids`; visits
    /// each ancestor once, in reverse-BFS (closest-first) discovery order.
    pub fn ancestors(&self, node_id: &str) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::new();
        if let Some(node) = self.nodes.get(node_id) {
            for parent in &node.parent_ids {
                queue.push_back(parent.clone());
            }
        }
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            order.push(current.clone());
            if let Some(node) = self.nodes.get(&current) {
                for parent in &node.parent_ids {
                    if !visited.contains(parent) {
                        queue.push_back(parent.clone());
                    }
                }
            }
        }
        order
    }

    /// `context_for(node_id) -> sequence of Message` (§4.5).
    ///
    /// For each ancestor in reverse-BFS order (oldest first) that has a
    /// non-empty summary, emits one `user` message `"[Context from
    /// <scope>]\n<summary>"`; then appends the node's own local messages.
    pub fn context_for(&self, node_id: &str) -> Vec<Message> {
        let mut ancestors = self.ancestors(node_id);
        ancestors.reverse(); // oldest first
        let mut context = Vec::new();
        for ancestor_id in ancestors {
            if let Some(ancestor) = self.nodes.get(&ancestor_id) {
                if let Some(summary) = &ancestor.summary {
                    if !summary.is_empty() {
                        context.push(Message::user(format!(
                            "[Context from {}]\n{}",
                            ancestor.scope(),
                            summary
                        )));
                    }
                }
            }
        }
        if let Some(node) = self.nodes.get(node_id) {
            context.extend(node.messages.iter().cloned());
        }
        context
    }

    /// `summarize(node_id, force?) -> summary?` (§4.5). Summarizes the most
    /// recent 20 messages; no-op if the node has no messages; idempotent
    /// unless `force` is set.
    pub async fn summarize(
        &mut self,
        node_id: &str,
        summarizer: &dyn Summarizer,
        force: bool,
    ) -> Result<Option<String>, AgentError> {
        let Some(node) = self.nodes.get(node_id) else {
            return Err(AgentError::InvalidInput(format!("unknown node id: {node_id}")));
        };
        if node.messages.is_empty() {
            return Ok(node.summary.clone());
        }
        if node.summary.is_some() && !force {
            return Ok(node.summary.clone());
        }
        let window_start = node.messages.len().saturating_sub(20);
        let window = node.messages[window_start..].to_vec();
        let summary = summarizer.summarize(&window, None).await?;
        self.nodes.get_mut(node_id).unwrap().summary = Some(summary.clone());
        Ok(Some(summary))
    }

    /// `merge(source_ids, target_id)` (§4.5). Ensures each source has a
    /// summary, then appends one `user` message to the target concatenating
    /// each source's `[scope]\n<summary>` block with blank-line separators.
    pub async fn merge(
        &mut self,
        source_ids: &[String],
        target_id: &str,
        summarizer: &dyn Summarizer,
    ) -> Result<(), AgentError> {
        if !self.nodes.contains_key(target_id) {
            return Err(AgentError::InvalidInput(format!("unknown target id: {target_id}")));
        }
        let mut blocks = Vec::with_capacity(source_ids.len());
        for source_id in source_ids {
            self.summarize(source_id, summarizer, false).await?;
            let node = self
                .nodes
                .get(source_id)
                .ok_or_else(|| AgentError::InvalidInput(format!("unknown source id: {source_id}")))?;
            let summary = node.summary.clone().unwrap_or_default();
            blocks.push(format!("[{}]\n{}", node.scope(), summary));
        }
        let content = blocks.join("\n\n");
        self.nodes.get_mut(target_id).unwrap().messages.push(Message::user(content));
        Ok(())
    }

    /// Appends a message to a node's local history.
    pub fn append(&mut self, node_id: &str, message: Message) -> Result<(), AgentError> {
        self.nodes
            .get_mut(node_id)
            .ok_or_else(|| AgentError::InvalidInput(format!("unknown node id: {node_id}")))?
            .messages
            .push(message);
        Ok(())
    }

    /// Whole-graph dump (§4.5).
    pub fn dump(&self) -> MemoryGraphSnapshot {
        MemoryGraphSnapshot {
            nodes: self.nodes.values().cloned().collect(),
            root_id: self.root_id.clone(),
        }
    }

    /// Whole-graph restore (§4.5).
    pub fn restore(snapshot: MemoryGraphSnapshot) -> Self {
        let nodes = snapshot
            .nodes
            .into_iter()
            .map(|n| (n.id.clone(), n))
            .collect();
        Self {
            nodes,
            root_id: snapshot.root_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSummarizer(&'static str);

    #[async_trait]
    impl Summarizer for FixedSummarizer {
        async fn summarize(&self, _messages: &[Message], _target_tokens: Option<usize>) -> Result<String, AgentError> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn create_root_and_node_link_bidirectionally() {
        let mut graph = MemoryGraph::new();
        let root = graph.create_root(None);
        let child = graph.create_node(&[root.clone()], None).unwrap();
        assert!(graph.node(&root).unwrap().child_ids.contains(&child));
        assert!(graph.node(&child).unwrap().parent_ids.contains(&root));
    }

    #[test]
    fn link_rejects_cycle() {
        let mut graph = MemoryGraph::new();
        let a = graph.create_root(None);
        let b = graph.create_node(&[a.clone()], None).unwrap();
        let err = graph.link(&a, &b).unwrap_err();
        assert!(matches!(err, AgentError::CyclicDependency(_)));
    }

    #[test]
    fn unlink_is_safe_when_edge_missing() {
        let mut graph = MemoryGraph::new();
        let a = graph.create_root(None);
        let b = graph.create_node(&[], None).unwrap();
        graph.unlink(&b, &a); // no edge exists
        assert!(graph.node(&b).unwrap().parent_ids.is_empty());
    }

    #[test]
    fn delete_root_clears_root_id_and_references() {
        let mut graph = MemoryGraph::new();
        let root = graph.create_root(None);
        let child = graph.create_node(&[root.clone()], None).unwrap();
        graph.delete(&root);
        assert!(graph.root_id().is_none());
        assert!(graph.node(&child).unwrap().parent_ids.is_empty());
    }

    #[test]
    fn ancestors_visits_each_once_with_diamond_parents() {
        let mut graph = MemoryGraph::new();
        let root = graph.create_root(None);
        let a = graph.create_node(&[root.clone()], None).unwrap();
        let b = graph.create_node(&[root.clone()], None).unwrap();
        let c = graph.create_node(&[a.clone(), b.clone()], None).unwrap();
        let ancestors = graph.ancestors(&c);
        assert_eq!(ancestors.len(), 3);
        assert!(ancestors.contains(&root));
    }

    #[test]
    fn context_for_falls_back_to_local_messages_when_no_summary() {
        let mut graph = MemoryGraph::new();
        let root = graph.create_root(None);
        graph.append(&root, Message::user("hello")).unwrap();
        let context = graph.context_for(&root);
        assert_eq!(context, vec![Message::user("hello")]);
    }

    #[test]
    fn context_for_prepends_ancestor_summaries_oldest_first() {
        let mut graph = MemoryGraph::new();
        let mut meta = HashMap::new();
        meta.insert("scope".to_string(), Value::String("root".into()));
        let root = graph.create_root(Some(meta));
        graph.node_mut(&root).unwrap().summary = Some("root summary".into());
        let child = graph.create_node(&[root.clone()], None).unwrap();
        graph.append(&child, Message::user("hi")).unwrap();
        let context = graph.context_for(&child);
        assert_eq!(context.len(), 2);
        match &context[0] {
            Message::User { content } => assert!(content.contains("root summary")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn summarize_is_idempotent_unless_forced() {
        let mut graph = MemoryGraph::new();
        let root = graph.create_root(None);
        graph.append(&root, Message::user("a")).unwrap();
        let s1 = FixedSummarizer("first");
        graph.summarize(&root, &s1, false).await.unwrap();
        let s2 = FixedSummarizer("second");
        let result = graph.summarize(&root, &s2, false).await.unwrap();
        assert_eq!(result.as_deref(), Some("first"));
        let forced = graph.summarize(&root, &s2, true).await.unwrap();
        assert_eq!(forced.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn summarize_is_noop_for_node_with_no_messages() {
        let mut graph = MemoryGraph::new();
        let root = graph.create_root(None);
        let summarizer = FixedSummarizer("s");
        let result = graph.summarize(&root, &summarizer, false).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn merge_concatenates_source_summaries_into_one_user_message() {
        let mut graph = MemoryGraph::new();
        let root = graph.create_root(None);
        let mut meta1 = HashMap::new();
        meta1.insert("scope".to_string(), Value::String("aspect-1".into()));
        let c1 = graph.create_node(&[root.clone()], Some(meta1)).unwrap();
        graph.append(&c1, Message::user("finding one")).unwrap();
        let mut meta2 = HashMap::new();
        meta2.insert("scope".to_string(), Value::String("aspect-2".into()));
        let c2 = graph.create_node(&[root.clone()], Some(meta2)).unwrap();
        graph.append(&c2, Message::user("finding two")).unwrap();

        let summarizer = FixedSummarizer("S");
        graph.merge(&[c1.clone(), c2.clone()], &root, &summarizer).await.unwrap();

        let root_node = graph.node(&root).unwrap();
        assert_eq!(root_node.messages.len(), 1);
        match &root_node.messages[0] {
            Message::User { content } => {
                assert!(content.contains("[aspect-1]\nS"));
                assert!(content.contains("[aspect-2]\nS"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(graph.ancestors(&root).is_empty());
    }

    #[test]
    fn dump_and_restore_round_trips() {
        let mut graph = MemoryGraph::new();
        let root = graph.create_root(None);
        graph.append(&root, Message::user("hi")).unwrap();
        let snapshot = graph.dump();
        let restored = MemoryGraph::restore(snapshot);
        assert_eq!(restored.root_id(), Some(root.as_str()));
        assert_eq!(restored.node(&root).unwrap().messages.len(), 1);
    }
}
