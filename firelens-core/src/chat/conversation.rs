//! Conversations and their in-memory store

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

use crate::lock;

/// Characters of the first message used as the conversation title
pub const TITLE_CHARS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub reasoning: String,
    pub is_thinking: bool,
    pub timestamp: DateTime<Utc>,
    /// Structured report attached at the end of the turn
    pub chart_data: Option<serde_json::Value>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            reasoning: String::new(),
            is_thinking: false,
            timestamp: Utc::now(),
            chart_data: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    #[default]
    Idle,
    Loading,
    Streaming,
    Error,
}

impl std::fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversationStatus::Idle => write!(f, "idle"),
            ConversationStatus::Loading => write!(f, "loading"),
            ConversationStatus::Streaming => write!(f, "streaming"),
            ConversationStatus::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub updated_at: DateTime<Utc>,
    pub status: ConversationStatus,
    /// Agent message currently receiving streamed text
    pub streaming_message_id: Option<String>,
}

impl Conversation {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            messages: Vec::new(),
            updated_at: Utc::now(),
            status: ConversationStatus::Idle,
            streaming_message_id: None,
        }
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn message_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Append a user message, titling the conversation if it was empty.
    pub fn push_user_message(&mut self, text: &str) -> String {
        if self.messages.is_empty() {
            self.title = text.chars().take(TITLE_CHARS).collect();
        }
        let message = Message::new(Role::User, text);
        let id = message.id.clone();
        self.messages.push(message);
        self.updated_at = Utc::now();
        id
    }
}

/// Shared conversation collection.
///
/// Mutation is addressed by conversation id; each change bumps a revision
/// that observers can wait on.
#[derive(Clone)]
pub struct ConversationStore {
    conversations: Arc<Mutex<HashMap<String, Conversation>>>,
    revision: Arc<watch::Sender<u64>>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    pub fn new() -> Self {
        let (revision, _rx) = watch::channel(0);
        Self {
            conversations: Arc::new(Mutex::new(HashMap::new())),
            revision: Arc::new(revision),
        }
    }

    /// Create an empty conversation and return its id.
    pub fn create(&self, title: &str) -> String {
        let conversation = Conversation::new(title);
        let id = conversation.id.clone();
        lock(&self.conversations).insert(id.clone(), conversation);
        self.bump();
        id
    }

    pub fn insert(&self, conversation: Conversation) {
        lock(&self.conversations).insert(conversation.id.clone(), conversation);
        self.bump();
    }

    /// Snapshot of one conversation
    pub fn get(&self, id: &str) -> Option<Conversation> {
        lock(&self.conversations).get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        lock(&self.conversations).contains_key(id)
    }

    /// Snapshots, most recently updated first
    pub fn list(&self) -> Vec<Conversation> {
        let mut all: Vec<Conversation> = lock(&self.conversations).values().cloned().collect();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        all
    }

    /// Apply `f` to the conversation with `id`. Returns `None` if it does
    /// not exist (for example, it was closed mid-turn).
    pub fn update<R>(&self, id: &str, f: impl FnOnce(&mut Conversation) -> R) -> Option<R> {
        let result = {
            let mut conversations = lock(&self.conversations);
            conversations.get_mut(id).map(f)
        };
        if result.is_some() {
            self.bump();
        }
        result
    }

    pub fn remove(&self, id: &str) -> Option<Conversation> {
        let removed = lock(&self.conversations).remove(id);
        if removed.is_some() {
            self.bump();
        }
        removed
    }

    pub fn len(&self) -> usize {
        lock(&self.conversations).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Receiver that changes whenever any conversation does
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_message_sets_title() {
        let mut conversation = Conversation::new("New chat");
        conversation.push_user_message("Where are the largest fires in Siberia this week?");
        assert_eq!(conversation.title, "Where are the larges");

        conversation.push_user_message("And in Canada?");
        assert_eq!(conversation.title, "Where are the larges");
    }

    #[test]
    fn test_title_counts_characters() {
        let mut conversation = Conversation::new("New chat");
        conversation.push_user_message("分析一下最近一周澳大利亚东南部的火点分布情况并给出风险评估");
        assert_eq!(conversation.title.chars().count(), TITLE_CHARS);
    }

    #[test]
    fn test_update_is_addressed_by_id() {
        let store = ConversationStore::new();
        let a = store.create("a");
        let b = store.create("b");

        store.update(&a, |c| c.status = ConversationStatus::Streaming);

        assert_eq!(store.get(&a).unwrap().status, ConversationStatus::Streaming);
        assert_eq!(store.get(&b).unwrap().status, ConversationStatus::Idle);
        assert!(store.update("missing", |c| c.status = ConversationStatus::Error).is_none());
    }

    #[test]
    fn test_changes_track_mutations() {
        let store = ConversationStore::new();
        let mut rx = store.changes();
        let id = store.create("a");
        assert!(rx.has_changed().unwrap());
        let _ = rx.borrow_and_update();

        store.update("missing", |_| ());
        assert!(!rx.has_changed().unwrap());

        store.remove(&id);
        assert!(rx.has_changed().unwrap());
        assert!(store.is_empty());
    }
}
