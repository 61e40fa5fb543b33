//! Streaming event types and utilities

use crate::types::{Content, Message, StopReason, Usage};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

/// Events emitted while the engine produces one assistant message.
///
/// Fragments for distinct content blocks interleave; `content_index`
/// correlates them until the matching `*End` event arrives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Initial message structure
    Start { message: Message },
    /// Text content started
    TextStart { content_index: usize },
    /// Text content delta
    TextDelta { content_index: usize, delta: String },
    /// Text content completed
    TextEnd { content_index: usize, text: String },
    /// Tool call started
    ToolCallStart {
        content_index: usize,
        id: String,
        name: String,
    },
    /// Tool call arguments delta (partial JSON)
    ToolCallDelta { content_index: usize, delta: String },
    /// Tool call completed
    ToolCallEnd {
        content_index: usize,
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
    /// Message completed successfully
    Done {
        message: Message,
        stop_reason: StopReason,
        usage: Usage,
    },
    /// Error occurred
    Error { message: String },
}

impl EngineEvent {
    /// Check if this is a terminal event (Done or Error)
    pub fn is_terminal(&self) -> bool {
        matches!(self, EngineEvent::Done { .. } | EngineEvent::Error { .. })
    }

    /// Get the final message if this is a Done event
    pub fn into_message(self) -> Option<Message> {
        match self {
            EngineEvent::Done { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// A lazy, single-pass stream of engine events
pub type EngineEventStream = Pin<Box<dyn Stream<Item = EngineEvent> + Send>>;

/// Builder for reconstructing an assistant message from streaming events
#[derive(Debug, Default)]
pub struct MessageBuilder {
    content_buffers: Vec<ContentBuffer>,
    usage: Usage,
    stop_reason: Option<StopReason>,
}

#[derive(Debug)]
enum ContentBuffer {
    Text(String),
    ToolCall {
        id: String,
        name: String,
        arguments_json: String,
    },
}

impl MessageBuilder {
    /// Create a new message builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a streaming event and update the message state
    pub fn process_event(&mut self, event: &EngineEvent) {
        match event {
            EngineEvent::TextStart { content_index } => {
                self.ensure_buffer(*content_index, ContentBuffer::Text(String::new()));
            }
            EngineEvent::TextDelta {
                content_index,
                delta,
            } => {
                if let Some(ContentBuffer::Text(text)) =
                    self.content_buffers.get_mut(*content_index)
                {
                    text.push_str(delta);
                }
            }
            EngineEvent::TextEnd {
                content_index,
                text,
            } => {
                if *content_index < self.content_buffers.len() {
                    self.content_buffers[*content_index] = ContentBuffer::Text(text.clone());
                }
            }
            EngineEvent::ToolCallStart {
                content_index,
                id,
                name,
            } => {
                self.ensure_buffer(
                    *content_index,
                    ContentBuffer::ToolCall {
                        id: id.clone(),
                        name: name.clone(),
                        arguments_json: String::new(),
                    },
                );
            }
            EngineEvent::ToolCallDelta {
                content_index,
                delta,
            } => {
                if let Some(ContentBuffer::ToolCall { arguments_json, .. }) =
                    self.content_buffers.get_mut(*content_index)
                {
                    arguments_json.push_str(delta);
                }
            }
            EngineEvent::ToolCallEnd {
                content_index,
                id,
                name,
                arguments,
            } => {
                if *content_index < self.content_buffers.len() {
                    self.content_buffers[*content_index] = ContentBuffer::ToolCall {
                        id: id.clone(),
                        name: name.clone(),
                        arguments_json: arguments.to_string(),
                    };
                }
            }
            EngineEvent::Done {
                stop_reason, usage, ..
            } => {
                self.stop_reason = Some(*stop_reason);
                self.usage = usage.clone();
            }
            _ => {}
        }
    }

    /// Build the final message
    pub fn build(self) -> Message {
        let content: Vec<Content> = self
            .content_buffers
            .into_iter()
            .map(|buf| match buf {
                ContentBuffer::Text(text) => Content::Text { text },
                ContentBuffer::ToolCall {
                    id,
                    name,
                    arguments_json,
                } => {
                    let arguments =
                        serde_json::from_str(&arguments_json).unwrap_or(serde_json::Value::Null);
                    Content::ToolCall {
                        id,
                        name,
                        arguments,
                    }
                }
            })
            .collect();

        Message::Assistant {
            content,
            metadata: crate::types::AssistantMetadata {
                usage: self.usage,
                stop_reason: self.stop_reason,
                timestamp: chrono::Utc::now().timestamp_millis(),
                ..Default::default()
            },
        }
    }

    fn ensure_buffer(&mut self, index: usize, default: ContentBuffer) {
        while self.content_buffers.len() <= index {
            self.content_buffers
                .push(ContentBuffer::Text(String::new()));
        }
        self.content_buffers[index] = default;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_text_only() {
        let mut builder = MessageBuilder::new();
        builder.process_event(&EngineEvent::TextStart { content_index: 0 });
        builder.process_event(&EngineEvent::TextDelta {
            content_index: 0,
            delta: "Spent ".into(),
        });
        builder.process_event(&EngineEvent::TextDelta {
            content_index: 0,
            delta: "$50".into(),
        });
        builder.process_event(&EngineEvent::Done {
            message: Message::assistant_empty(),
            stop_reason: StopReason::Stop,
            usage: Usage::default(),
        });

        let msg = builder.build();
        assert_eq!(msg.text(), "Spent $50");
    }

    #[test]
    fn test_builder_interleaved_tool_calls() {
        // Two tool calls whose argument fragments interleave; the builder
        // must correlate them by content index.
        let mut builder = MessageBuilder::new();
        builder.process_event(&EngineEvent::ToolCallStart {
            content_index: 0,
            id: "c1".into(),
            name: "create_transaction_preview".into(),
        });
        builder.process_event(&EngineEvent::ToolCallStart {
            content_index: 1,
            id: "c2".into(),
            name: "create_transaction_preview".into(),
        });
        builder.process_event(&EngineEvent::ToolCallDelta {
            content_index: 0,
            delta: "{\"amount\":".into(),
        });
        builder.process_event(&EngineEvent::ToolCallDelta {
            content_index: 1,
            delta: "{\"amount\": 20}".into(),
        });
        builder.process_event(&EngineEvent::ToolCallDelta {
            content_index: 0,
            delta: " 50}".into(),
        });

        let msg = builder.build();
        let calls = msg.tool_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "c1");
        assert_eq!(calls[0].2["amount"], 50);
        assert_eq!(calls[1].0, "c2");
        assert_eq!(calls[1].2["amount"], 20);
    }

    #[test]
    fn test_builder_tool_call_end_overrides_fragments() {
        let mut builder = MessageBuilder::new();
        builder.process_event(&EngineEvent::ToolCallStart {
            content_index: 0,
            id: "c1".into(),
            name: "convert_currency".into(),
        });
        builder.process_event(&EngineEvent::ToolCallDelta {
            content_index: 0,
            delta: "{\"amount\": 1".into(),
        });
        builder.process_event(&EngineEvent::ToolCallEnd {
            content_index: 0,
            id: "c1".into(),
            name: "convert_currency".into(),
            arguments: serde_json::json!({"amount": 100, "from_currency": "EUR", "to_currency": "USD"}),
        });

        let msg = builder.build();
        let calls = msg.tool_calls();
        assert_eq!(calls[0].2["amount"], 100);
        assert_eq!(calls[0].2["from_currency"], "EUR");
    }

    #[test]
    fn test_builder_malformed_arguments_fall_back_to_null() {
        let mut builder = MessageBuilder::new();
        builder.process_event(&EngineEvent::ToolCallStart {
            content_index: 0,
            id: "c1".into(),
            name: "list_tags".into(),
        });
        builder.process_event(&EngineEvent::ToolCallDelta {
            content_index: 0,
            delta: "{not json".into(),
        });

        let msg = builder.build();
        let calls = msg.tool_calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].2.is_null());
    }

    #[test]
    fn test_is_terminal() {
        assert!(
            EngineEvent::Done {
                message: Message::assistant_empty(),
                stop_reason: StopReason::Stop,
                usage: Usage::default(),
            }
            .is_terminal()
        );
        assert!(EngineEvent::Error { message: "x".into() }.is_terminal());
        assert!(!EngineEvent::TextStart { content_index: 0 }.is_terminal());
    }
}
