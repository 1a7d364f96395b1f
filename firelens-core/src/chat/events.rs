//! JSON envelopes carried in `data:` records

use serde::Deserialize;

use crate::error::Result;

/// One decoded stream event, discriminated by its `event` field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental text
    TextChunk { data: TextChunk },
    /// End of the workflow run, with its outputs
    WorkflowFinished {
        #[serde(default)]
        data: WorkflowFinished,
    },
    /// Lifecycle and node events this client does not use
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TextChunk {
    #[serde(default)]
    pub text: String,
    /// Reasoning sent in its own field instead of inline tags
    #[serde(default)]
    pub reasoning_content: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WorkflowFinished {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub outputs: serde_json::Map<String, serde_json::Value>,
}

impl StreamEvent {
    pub fn parse(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}
