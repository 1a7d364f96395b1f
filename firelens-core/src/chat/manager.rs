//! Per-conversation turn lifecycle
//!
//! Each conversation has at most one active turn. Sending a new message
//! cancels the previous turn of the same conversation; other conversations
//! are unaffected.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use futures_util::future::{AbortHandle, Abortable};
use futures_util::StreamExt;

use crate::config::ChatConfig;
use crate::error::{Error, Result};
use crate::lock;

use super::client::{ChatRequest, ChatTransport};
use super::conversation::{ConversationStatus, ConversationStore, Message, Role};
use super::session::{SessionUpdate, StreamSession};

/// Agent message content when a turn is stopped before any answer arrived
pub const CANCELLED_PLACEHOLDER: &str = "Request cancelled";
/// Agent message content when a turn fails
pub const ERROR_PLACEHOLDER: &str = "Error: failed to get response";

/// How a turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Blank input, nothing sent
    Skipped,
    Completed,
    Cancelled,
    Failed,
}

struct ActiveTurn {
    id: u64,
    handle: AbortHandle,
}

/// Runs chat turns against a transport and records them in a store.
pub struct ConversationManager<T: ChatTransport> {
    transport: T,
    store: ConversationStore,
    config: ChatConfig,
    user: String,
    active: Mutex<HashMap<String, ActiveTurn>>,
    next_turn: AtomicU64,
}

impl<T: ChatTransport> ConversationManager<T> {
    pub fn new(transport: T, store: ConversationStore, config: ChatConfig, user: &str) -> Self {
        Self {
            transport,
            store,
            config,
            user: user.to_string(),
            active: Mutex::new(HashMap::new()),
            next_turn: AtomicU64::new(1),
        }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Send `text` to conversation `conversation_id` and stream the reply
    /// into a new agent message.
    pub async fn send_message(&self, conversation_id: &str, text: &str) -> Result<TurnOutcome> {
        if text.trim().is_empty() {
            return Ok(TurnOutcome::Skipped);
        }
        if !self.store.contains(conversation_id) {
            return Err(Error::ConversationNotFound(conversation_id.to_string()));
        }

        self.cancel(conversation_id);
        let (turn_id, registration) = {
            let id = self.next_turn.fetch_add(1, Ordering::Relaxed);
            let (handle, registration) = AbortHandle::new_pair();
            lock(&self.active).insert(conversation_id.to_string(), ActiveTurn { id, handle });
            (id, registration)
        };

        self.store.update(conversation_id, |c| {
            c.push_user_message(text);
            c.status = ConversationStatus::Loading;
        });

        let agent = Message::new(Role::Agent, "");
        let agent_id = agent.id.clone();
        self.store.update(conversation_id, |c| {
            c.messages.push(agent);
            c.status = ConversationStatus::Streaming;
            c.streaming_message_id = Some(agent_id.clone());
        });

        tracing::info!(
            conversation = %conversation_id,
            turn = turn_id,
            "Sending chat message"
        );

        let request = ChatRequest {
            query: text.to_string(),
            user: self.user.clone(),
        };
        let result = Abortable::new(
            self.stream_turn(conversation_id, &agent_id, &request),
            registration,
        )
        .await;

        let outcome = match result {
            Ok(Ok(())) => {
                self.finish_turn(conversation_id, &agent_id, ConversationStatus::Idle, |_| {});
                TurnOutcome::Completed
            }
            Err(_aborted) => {
                self.finish_turn(conversation_id, &agent_id, ConversationStatus::Idle, |m| {
                    if m.content.is_empty() {
                        m.content = CANCELLED_PLACEHOLDER.to_string();
                    }
                    m.is_thinking = false;
                });
                TurnOutcome::Cancelled
            }
            Ok(Err(e)) => {
                tracing::warn!(conversation = %conversation_id, error = %e, "Chat turn failed");
                self.finish_turn(conversation_id, &agent_id, ConversationStatus::Error, |m| {
                    m.content = ERROR_PLACEHOLDER.to_string();
                    m.is_thinking = false;
                });
                TurnOutcome::Failed
            }
        };

        self.release(conversation_id, turn_id);
        tracing::debug!(conversation = %conversation_id, turn = turn_id, ?outcome, "Turn finished");
        Ok(outcome)
    }

    async fn stream_turn(
        &self,
        conversation_id: &str,
        agent_id: &str,
        request: &ChatRequest,
    ) -> Result<()> {
        let mut stream = self.transport.open(request).await?;
        let mut session = StreamSession::new(&self.config);

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for update in session.feed(&chunk) {
                self.apply_update(conversation_id, agent_id, update);
            }
        }
        for update in session.finish() {
            self.apply_update(conversation_id, agent_id, update);
        }
        Ok(())
    }

    fn apply_update(&self, conversation_id: &str, agent_id: &str, update: SessionUpdate) {
        self.store.update(conversation_id, |c| {
            let Some(message) = c.message_mut(agent_id) else {
                return;
            };
            match update {
                SessionUpdate::Text {
                    answer,
                    reasoning,
                    is_thinking,
                } => {
                    message.content.push_str(&answer);
                    message.reasoning.push_str(&reasoning);
                    message.is_thinking = is_thinking;
                }
                SessionUpdate::Payload { data, answer_text } => {
                    message.content = answer_text;
                    message.chart_data = Some(data);
                }
            }
        });
    }

    /// Settle the agent message, and the conversation status if this turn
    /// still owns the conversation.
    fn finish_turn(
        &self,
        conversation_id: &str,
        agent_id: &str,
        status: ConversationStatus,
        edit: impl FnOnce(&mut Message),
    ) {
        self.store.update(conversation_id, |c| {
            if let Some(message) = c.message_mut(agent_id) {
                edit(message);
            }
            if c.streaming_message_id.as_deref() == Some(agent_id) {
                c.status = status;
                c.streaming_message_id = None;
            }
            c.updated_at = chrono::Utc::now();
        });
    }

    fn release(&self, conversation_id: &str, turn_id: u64) {
        let mut active = lock(&self.active);
        if active.get(conversation_id).is_some_and(|t| t.id == turn_id) {
            active.remove(conversation_id);
        }
    }

    /// Stop the active turn of one conversation. No-op if there is none.
    pub fn cancel(&self, conversation_id: &str) {
        if let Some(turn) = lock(&self.active).remove(conversation_id) {
            tracing::debug!(conversation = %conversation_id, turn = turn.id, "Cancelling turn");
            turn.handle.abort();
        }
    }

    pub fn cancel_all(&self) {
        let turns: Vec<ActiveTurn> = lock(&self.active).drain().map(|(_, t)| t).collect();
        for turn in turns {
            turn.handle.abort();
        }
    }

    pub fn is_loading(&self, conversation_id: &str) -> bool {
        lock(&self.active).contains_key(conversation_id)
    }

    /// Cancel and forget a conversation.
    pub fn close(&self, conversation_id: &str) -> bool {
        self.cancel(conversation_id);
        self.store.remove(conversation_id).is_some()
    }
}

impl<T: ChatTransport> Drop for ConversationManager<T> {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
