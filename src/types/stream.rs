//! Streaming types.

use serde::{Deserialize, Serialize};

/// A content delta emitted by the model client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "text", rename_all = "snake_case")]
pub enum StreamDelta {
    /// Primary response text.
    Text(String),
    /// "Thinking" output; never interpreted as protocol.
    Reasoning(String),
}

impl StreamDelta {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Self::Reasoning(text.into())
    }
}
