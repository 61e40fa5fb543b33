//! Client-facing streaming events and their SSE wire framing.

use serde::{Deserialize, Serialize};

use crate::preview::TransactionPreview;

/// One event on the client-facing stream.
///
/// Serialized with a `type` discriminator so clients can dispatch without
/// knowing the full set of variants. For a given tool call, `tool_start`
/// always precedes `tool_end`; non-final `message_chunk`s all precede the
/// final one; exactly one terminal event closes a completed stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Always first: the request was accepted and reasoning has begun
    Thinking { message: String },
    /// A tool invocation started
    ToolStart {
        tool_name: String,
        tool_input: serde_json::Value,
    },
    /// A tool invocation finished
    ToolEnd {
        tool_name: String,
        tool_output: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// A fragment of assistant text; an empty final chunk ends the phase
    MessageChunk { content: String, is_final: bool },
    /// Previews surfaced by a tool, lifted out of its generic output
    TransactionPreviews {
        transactions: Vec<TransactionPreview>,
        count: usize,
    },
    /// Extraction only: the batch size is known
    Planning { count: usize },
    /// Extraction only: one preview call started
    TransactionStart,
    /// Extraction only: one preview resolved
    Transaction { data: TransactionPreview },
    /// Terminal: the run completed
    Done {
        #[serde(skip_serializing_if = "Option::is_none")]
        conversation_id: Option<String>,
    },
    /// Terminal: the run failed
    Error { message: String, recoverable: bool },
}

impl StreamEvent {
    pub fn thinking() -> Self {
        Self::Thinking {
            message: "Thinking...".to_string(),
        }
    }

    pub fn done(conversation_id: impl Into<String>) -> Self {
        Self::Done {
            conversation_id: Some(conversation_id.into()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

/// Frame an event as a server-sent-events data line
pub fn sse_frame(event: &StreamEvent) -> String {
    match serde_json::to_string(event) {
        Ok(json) => format!("data: {json}\n\n"),
        Err(err) => {
            tracing::error!("failed to serialize stream event: {err}");
            "data: {\"type\":\"error\",\"message\":\"internal error\",\"recoverable\":false}\n\n"
                .to_string()
        }
    }
}
