//! One streamed chat turn

use crate::config::ChatConfig;

use super::events::{StreamEvent, TextChunk, WorkflowFinished};
use super::framing::{RecordSplitter, Utf8Decoder};
use super::reasoning::{self, ReasoningTags, ScanState};

/// Change produced by feeding the session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// Text appended to the answer and/or reasoning
    Text {
        answer: String,
        reasoning: String,
        is_thinking: bool,
    },
    /// Structured report attached; `answer_text` is the cleaned full answer
    Payload {
        data: serde_json::Value,
        answer_text: String,
    },
}

/// Decoder state for a single turn.
///
/// Bytes go in through [`feed`](Self::feed); the accumulated answer and
/// reasoning only ever grow, except for the payload echo stripped when the
/// terminal record arrives.
#[derive(Debug)]
pub struct StreamSession {
    decoder: Utf8Decoder,
    splitter: RecordSplitter,
    tags: ReasoningTags,
    scan: ScanState,
    payload_field: String,
    payload_marker: String,
    answer_text: String,
    reasoning_text: String,
    chart_data: Option<serde_json::Value>,
    completed: bool,
}

impl Default for StreamSession {
    fn default() -> Self {
        Self::new(&ChatConfig::default())
    }
}

impl StreamSession {
    pub fn new(config: &ChatConfig) -> Self {
        Self {
            decoder: Utf8Decoder::new(),
            splitter: RecordSplitter::new(),
            tags: ReasoningTags::from_config(config),
            scan: ScanState::default(),
            payload_field: config.payload_field.clone(),
            payload_marker: config.payload_marker.clone(),
            answer_text: String::new(),
            reasoning_text: String::new(),
            chart_data: None,
            completed: false,
        }
    }

    pub fn answer_text(&self) -> &str {
        &self.answer_text
    }

    pub fn reasoning_text(&self) -> &str {
        &self.reasoning_text
    }

    pub fn chart_data(&self) -> Option<&serde_json::Value> {
        self.chart_data.as_ref()
    }

    pub fn is_reasoning(&self) -> bool {
        self.scan.is_reasoning()
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Feed raw bytes from the transport.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SessionUpdate> {
        if self.completed {
            tracing::debug!(bytes = chunk.len(), "Ignoring data after session end");
            return Vec::new();
        }
        let text = self.decoder.decode(chunk);
        self.feed_text(&text)
    }

    pub fn feed_str(&mut self, chunk: &str) -> Vec<SessionUpdate> {
        self.feed(chunk.as_bytes())
    }

    fn feed_text(&mut self, text: &str) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        for payload in self.splitter.push(text) {
            match StreamEvent::parse(&payload) {
                Ok(event) => updates.extend(self.handle_event(event)),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        record = %excerpt(&payload),
                        "Skipping unparseable stream record"
                    );
                }
            }
        }
        updates
    }

    fn handle_event(&mut self, event: StreamEvent) -> Option<SessionUpdate> {
        match event {
            StreamEvent::TextChunk { data } => self.handle_text(data),
            StreamEvent::WorkflowFinished { data } => self.handle_finished(data),
            StreamEvent::Other => None,
        }
    }

    fn handle_text(&mut self, chunk: TextChunk) -> Option<SessionUpdate> {
        let hint = chunk.reasoning_content.unwrap_or_default();
        let out = reasoning::step(&self.tags, std::mem::take(&mut self.scan), &chunk.text);
        self.scan = out.state;

        let mut reasoning = hint;
        let hinted = !reasoning.is_empty();
        reasoning.push_str(&out.reasoning);
        let answer = out.answer;

        let is_thinking = self.scan.is_reasoning() || (hinted && answer.is_empty());

        self.answer_text.push_str(&answer);
        self.reasoning_text.push_str(&reasoning);

        Some(SessionUpdate::Text {
            answer,
            reasoning,
            is_thinking,
        })
    }

    fn handle_finished(&mut self, finished: WorkflowFinished) -> Option<SessionUpdate> {
        let raw = match finished.outputs.get(&self.payload_field) {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => s.clone(),
            Some(serde_json::Value::Null) | None => return None,
            Some(serde_json::Value::String(_)) => return None,
            Some(other) => {
                tracing::warn!(
                    field = %self.payload_field,
                    kind = %json_kind(other),
                    "Report payload is not a JSON string"
                );
                return None;
            }
        };

        let data: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(
                    field = %self.payload_field,
                    error = %e,
                    payload = %excerpt(&raw),
                    "Failed to parse report payload"
                );
                return None;
            }
        };

        self.strip_payload_echo();
        self.chart_data = Some(data.clone());
        tracing::debug!(field = %self.payload_field, "Captured report payload");

        Some(SessionUpdate::Payload {
            data,
            answer_text: self.answer_text.clone(),
        })
    }

    /// Cut an echoed raw payload from the answer: from the first marker
    /// occurrence to the end, then trim.
    fn strip_payload_echo(&mut self) {
        if let Some(pos) = self.answer_text.find(&self.payload_marker) {
            self.answer_text.truncate(pos);
        }
        let trimmed = self.answer_text.trim();
        if trimmed.len() != self.answer_text.len() {
            self.answer_text = trimmed.to_string();
        }
    }

    /// End the session: release held-back tag fragments and drop any partial
    /// record.
    pub fn finish(&mut self) -> Vec<SessionUpdate> {
        if self.completed {
            return Vec::new();
        }
        self.completed = true;

        let tail = self.decoder.finish();
        let mut updates = if tail.is_empty() {
            Vec::new()
        } else {
            self.feed_text(&tail)
        };

        let discarded = self.splitter.discard();
        if discarded > 0 {
            tracing::debug!(bytes = discarded, "Discarded incomplete trailing record");
        }

        let out = reasoning::finish(std::mem::take(&mut self.scan));
        self.scan = out.state;
        if !out.answer.is_empty() || !out.reasoning.is_empty() {
            self.answer_text.push_str(&out.answer);
            self.reasoning_text.push_str(&out.reasoning);
            updates.push(SessionUpdate::Text {
                answer: out.answer,
                reasoning: out.reasoning,
                is_thinking: self.scan.is_reasoning(),
            });
        }
        updates
    }
}

fn excerpt(text: &str) -> String {
    const MAX: usize = 120;
    match text.char_indices().nth(MAX) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
