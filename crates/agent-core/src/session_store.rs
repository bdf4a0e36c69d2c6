//! Session Store interface (§4.11): persistence is delegated entirely to a
//! consumed collaborator; concrete durable back-ends (YAML, SQLite) are out
//! of scope. An in-memory reference implementation is provided since the
//! spec only excludes *durable* back-ends, not this one.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;

use crate::error::AgentError;
use crate::message::Message;

/// One row of `list_sessions` (§4.11).
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub message_count: usize,
}

/// `{system_messages, messages, stats}` (§4.11).
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub system_messages: Vec<Message>,
    pub messages: Vec<Message>,
    pub stats: SessionStats,
}

/// Per-session running statistics (§4.11).
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub message_count: usize,
    pub total_tokens: u64,
}

/// The six operations in §4.11. Session ids are opaque strings; callers
/// never parse them.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, metadata: Option<HashMap<String, Value>>) -> Result<String, AgentError>;

    async fn save_message(&self, id: &str, message: Message, tokens: Option<u64>) -> Result<(), AgentError>;

    async fn save_memory(
        &self,
        id: &str,
        system_messages: Vec<Message>,
        messages: Vec<Message>,
    ) -> Result<(), AgentError>;

    async fn load_session(&self, id: &str) -> Result<Option<SessionSnapshot>, AgentError>;

    async fn list_sessions(&self, limit: usize, offset: usize) -> Result<Vec<SessionSummary>, AgentError>;

    async fn delete_session(&self, id: &str) -> Result<bool, AgentError>;

    async fn get_session_stats(&self, id: &str) -> Result<Option<SessionStats>, AgentError>;
}

#[derive(Debug, Clone, Default)]
struct SessionRecord {
    created_at: Option<DateTime<Utc>>,
    metadata: HashMap<String, Value>,
    system_messages: Vec<Message>,
    messages: Vec<Message>,
    stats: SessionStats,
}

/// In-memory reference implementation, `DashMap`-backed like the teacher's
/// default `Store`.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<String, SessionRecord>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(&self, metadata: Option<HashMap<String, Value>>) -> Result<String, AgentError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.sessions.insert(
            id.clone(),
            SessionRecord {
                created_at: None,
                metadata: metadata.unwrap_or_default(),
                ..Default::default()
            },
        );
        Ok(id)
    }

    async fn save_message(&self, id: &str, message: Message, tokens: Option<u64>) -> Result<(), AgentError> {
        let mut record = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| AgentError::InvalidInput(format!("unknown session id: {id}")))?;
        record.messages.push(message);
        record.stats.message_count += 1;
        if let Some(tokens) = tokens {
            record.stats.total_tokens += tokens;
        }
        Ok(())
    }

    async fn save_memory(
        &self,
        id: &str,
        system_messages: Vec<Message>,
        messages: Vec<Message>,
    ) -> Result<(), AgentError> {
        let mut record = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| AgentError::InvalidInput(format!("unknown session id: {id}")))?;
        record.stats.message_count = messages.len();
        record.system_messages = system_messages;
        record.messages = messages;
        Ok(())
    }

    async fn load_session(&self, id: &str) -> Result<Option<SessionSnapshot>, AgentError> {
        Ok(self.sessions.get(id).map(|record| SessionSnapshot {
            system_messages: record.system_messages.clone(),
            messages: record.messages.clone(),
            stats: record.stats.clone(),
        }))
    }

    async fn list_sessions(&self, limit: usize, offset: usize) -> Result<Vec<SessionSummary>, AgentError> {
        let mut rows: Vec<SessionSummary> = self
            .sessions
            .iter()
            .map(|entry| SessionSummary {
                id: entry.key().clone(),
                created_at: entry.value().created_at.unwrap_or_else(Utc::now),
                message_count: entry.value().messages.len(),
            })
            .collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn delete_session(&self, id: &str) -> Result<bool, AgentError> {
        Ok(self.sessions.remove(id).is_some())
    }

    async fn get_session_stats(&self, id: &str) -> Result<Option<SessionStats>, AgentError> {
        Ok(self.sessions.get(id).map(|record| record.stats.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_load_round_trips_empty_session() {
        let store = InMemorySessionStore::new();
        let id = store.create_session(None).await.unwrap();
        let snapshot = store.load_session(&id).await.unwrap().unwrap();
        assert!(snapshot.messages.is_empty());
    }

    #[tokio::test]
    async fn save_message_accumulates_stats() {
        let store = InMemorySessionStore::new();
        let id = store.create_session(None).await.unwrap();
        store.save_message(&id, Message::user("hi"), Some(10)).await.unwrap();
        store.save_message(&id, Message::user("again"), Some(5)).await.unwrap();
        let stats = store.get_session_stats(&id).await.unwrap().unwrap();
        assert_eq!(stats.message_count, 2);
        assert_eq!(stats.total_tokens, 15);
    }

    #[tokio::test]
    async fn save_memory_overwrites_message_list() {
        let store = InMemorySessionStore::new();
        let id = store.create_session(None).await.unwrap();
        store
            .save_memory(&id, vec![Message::system("sys")], vec![Message::user("a"), Message::user("b")])
            .await
            .unwrap();
        let snapshot = store.load_session(&id).await.unwrap().unwrap();
        assert_eq!(snapshot.messages.len(), 2);
        assert_eq!(snapshot.system_messages.len(), 1);
    }

    #[tokio::test]
    async fn delete_session_removes_it_and_reports_presence() {
        let store = InMemorySessionStore::new();
        let id = store.create_session(None).await.unwrap();
        assert!(store.delete_session(&id).await.unwrap());
        assert!(!store.delete_session(&id).await.unwrap());
        assert!(store.load_session(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn operations_on_unknown_session_return_invalid_input() {
        let store = InMemorySessionStore::new();
        let err = store.save_message("missing", Message::user("x"), None).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn list_sessions_respects_limit_and_offset() {
        let store = InMemorySessionStore::new();
        for _ in 0..5 {
            store.create_session(None).await.unwrap();
        }
        let page = store.list_sessions(2, 1).await.unwrap();
        assert_eq!(page.len(), 2);
    }
}
