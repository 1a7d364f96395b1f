//! Streaming chat protocol
//!
//! Layers, bottom up:
//!
//! 1. [`framing`]: bytes to text to `data:` record payloads
//! 2. [`events`]: JSON envelopes
//! 3. [`reasoning`]: answer/reasoning split over inline tags
//! 4. [`StreamSession`]: one turn's accumulated state
//! 5. [`ConversationManager`]: turns, cancellation and the conversation store

pub mod events;
pub mod framing;
pub mod reasoning;

mod client;
mod conversation;
mod manager;
mod session;

pub use client::{ChatRequest, ChatStream, ChatTransport, HttpChatClient};
pub use conversation::{
    Conversation, ConversationStatus, ConversationStore, Message, Role, TITLE_CHARS,
};
pub use events::StreamEvent;
pub use framing::{RecordSplitter, Utf8Decoder};
pub use manager::{ConversationManager, TurnOutcome, CANCELLED_PLACEHOLDER, ERROR_PLACEHOLDER};
pub use reasoning::{ReasoningTags, ScanMode, ScanState};
pub use session::{SessionUpdate, StreamSession};
