//! Anthropic Messages API engine

use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};

use crate::{
    engine::Engine,
    error::{Error, Result},
    stream::{EngineEvent, EngineEventStream},
    types::{Content, Context, Message, Model, RequestOptions, StopReason, ToolSpec, Usage},
};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Anthropic API client implementing [`Engine`]
pub struct AnthropicEngine {
    client: reqwest::Client,
    api_key: String,
    model: Model,
    timeout_secs: u64,
}

impl AnthropicEngine {
    /// Create a new engine for the given model
    pub fn new(api_key: impl Into<String>, model: Model) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Create from the `ANTHROPIC_API_KEY` environment variable
    pub fn from_env(model: Model) -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| Error::InvalidApiKey)?;
        Ok(Self::new(api_key, model))
    }

    /// Set the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    fn headers(&self) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Ok(key) = self.api_key.parse() {
            headers.insert("x-api-key", key);
        }
        headers.insert("accept", "application/json".parse().expect("static header"));
        headers.insert(
            "content-type",
            "application/json".parse().expect("static header"),
        );
        headers.insert(
            "anthropic-version",
            ANTHROPIC_VERSION.parse().expect("static header"),
        );
        headers
    }

    fn build_request(&self, context: &Context, options: &RequestOptions, stream: bool) -> ApiRequest {
        let tools = if context.tools.is_empty() {
            None
        } else {
            Some(convert_tools(&context.tools))
        };

        ApiRequest {
            model: self.model.id.clone(),
            messages: convert_messages(&context.messages),
            max_tokens: options.max_tokens.unwrap_or(self.model.max_tokens),
            stream,
            system: context.system_prompt.clone(),
            temperature: options.temperature,
            tools,
        }
    }
}

#[async_trait]
impl Engine for AnthropicEngine {
    async fn complete(&self, context: &Context, options: &RequestOptions) -> Result<Message> {
        let request = self.build_request(context, options, false);
        let url = format!("{}/v1/messages", self.model.base_url);

        tracing::debug!(model = %self.model.id, "anthropic complete request");

        let response = self
            .client
            .post(&url)
            .headers(self.headers())
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(self.timeout_secs)
                } else {
                    Error::Http(e)
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(Error::RateLimited { retry_after });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(parse_api_error(&body, status));
        }

        let body: ApiResponse = response.json().await?;
        Ok(body.into_message(&self.model.id))
    }

    async fn stream(
        &self,
        context: &Context,
        options: &RequestOptions,
    ) -> Result<EngineEventStream> {
        let request = self.build_request(context, options, true);
        let url = format!("{}/v1/messages", self.model.base_url);

        tracing::debug!(model = %self.model.id, "anthropic stream request");

        let request_builder = self
            .client
            .post(&url)
            .headers(self.headers())
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&request);

        let event_source = EventSource::new(request_builder)
            .map_err(|e| Error::Sse(format!("Failed to create event source: {}", e)))?;

        Ok(Box::pin(create_stream(event_source, self.model.id.clone())))
    }
}

/// Translate the native SSE events into [`EngineEvent`]s
fn create_stream(
    mut event_source: EventSource,
    model_id: String,
) -> impl futures::Stream<Item = EngineEvent> {
    stream! {
        let mut usage = Usage::default();
        let mut stop_reason = StopReason::Stop;
        let mut content_blocks: Vec<ContentBlock> = vec![];
        let mut error_message: Option<String> = None;

        yield EngineEvent::Start {
            message: Message::assistant_empty(),
        };

        while let Some(event_result) = event_source.next().await {
            match event_result {
                Ok(Event::Open) => {}
                Ok(Event::Message(message)) => {
                    if message.event == "message_start" {
                        if let Ok(data) = serde_json::from_str::<MessageStartEvent>(&message.data) {
                            usage.input = data.message.usage.input_tokens;
                            usage.output = data.message.usage.output_tokens;
                        }
                    } else if message.event == "content_block_start" {
                        if let Ok(data) = serde_json::from_str::<ContentBlockStartEvent>(&message.data) {
                            let index = data.index as usize;
                            while content_blocks.len() <= index {
                                content_blocks.push(ContentBlock::default());
                            }

                            match data.content_block.block_type.as_str() {
                                "text" => {
                                    content_blocks[index] = ContentBlock::Text {
                                        text: String::new(),
                                    };
                                    yield EngineEvent::TextStart { content_index: index };
                                }
                                "tool_use" => {
                                    let id = data.content_block.id.unwrap_or_default();
                                    let name = data.content_block.name.unwrap_or_default();
                                    content_blocks[index] = ContentBlock::ToolCall {
                                        id: id.clone(),
                                        name: name.clone(),
                                        arguments_json: String::new(),
                                    };
                                    yield EngineEvent::ToolCallStart {
                                        content_index: index,
                                        id,
                                        name,
                                    };
                                }
                                _ => {}
                            }
                        }
                    } else if message.event == "content_block_delta" {
                        if let Ok(data) = serde_json::from_str::<ContentBlockDeltaEvent>(&message.data) {
                            let index = data.index as usize;
                            if index < content_blocks.len() {
                                match data.delta.delta_type.as_str() {
                                    "text_delta" => {
                                        if let ContentBlock::Text { ref mut text } = content_blocks[index] {
                                            let delta = data.delta.text.unwrap_or_default();
                                            text.push_str(&delta);
                                            yield EngineEvent::TextDelta {
                                                content_index: index,
                                                delta,
                                            };
                                        }
                                    }
                                    "input_json_delta" => {
                                        if let ContentBlock::ToolCall { ref mut arguments_json, .. } = content_blocks[index] {
                                            let delta = data.delta.partial_json.unwrap_or_default();
                                            arguments_json.push_str(&delta);
                                            yield EngineEvent::ToolCallDelta {
                                                content_index: index,
                                                delta,
                                            };
                                        }
                                    }
                                    _ => {}
                                }
                            }
                        }
                    } else if message.event == "content_block_stop" {
                        if let Ok(data) = serde_json::from_str::<ContentBlockStopEvent>(&message.data) {
                            let index = data.index as usize;
                            if index < content_blocks.len() {
                                match &content_blocks[index] {
                                    ContentBlock::Text { text } => {
                                        yield EngineEvent::TextEnd {
                                            content_index: index,
                                            text: text.clone(),
                                        };
                                    }
                                    ContentBlock::ToolCall { id, name, arguments_json } => {
                                        let arguments = serde_json::from_str(arguments_json)
                                            .unwrap_or(serde_json::Value::Null);
                                        yield EngineEvent::ToolCallEnd {
                                            content_index: index,
                                            id: id.clone(),
                                            name: name.clone(),
                                            arguments,
                                        };
                                    }
                                    ContentBlock::Empty => {}
                                }
                            }
                        }
                    } else if message.event == "message_delta" {
                        if let Ok(data) = serde_json::from_str::<MessageDeltaEvent>(&message.data) {
                            if let Some(reason) = data.delta.stop_reason {
                                stop_reason = map_stop_reason(&reason);
                            }
                            usage.output = data.usage.output_tokens;
                        }
                    } else if message.event == "message_stop" {
                        break;
                    } else if message.event == "error" {
                        if let Ok(data) = serde_json::from_str::<ApiErrorEvent>(&message.data) {
                            error_message = Some(data.error.message);
                            stop_reason = StopReason::Error;
                        }
                        break;
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(e) => {
                    error_message = Some(e.to_string());
                    stop_reason = StopReason::Error;
                    break;
                }
            }
        }

        let content: Vec<Content> = content_blocks
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(Content::Text { text }),
                ContentBlock::ToolCall { id, name, arguments_json } => {
                    let arguments = serde_json::from_str(&arguments_json)
                        .unwrap_or(serde_json::Value::Null);
                    Some(Content::ToolCall { id, name, arguments })
                }
                ContentBlock::Empty => None,
            })
            .collect();

        let final_message = Message::Assistant {
            content,
            metadata: crate::types::AssistantMetadata {
                model: Some(model_id),
                usage: usage.clone(),
                stop_reason: Some(stop_reason),
                timestamp: chrono::Utc::now().timestamp_millis(),
            },
        };

        if let Some(error_msg) = error_message {
            yield EngineEvent::Error { message: error_msg };
        } else {
            yield EngineEvent::Done {
                message: final_message,
                stop_reason,
                usage,
            };
        }
    }
}

fn parse_api_error(body: &str, status: reqwest::StatusCode) -> Error {
    if let Ok(parsed) = serde_json::from_str::<ApiErrorEvent>(body) {
        Error::api(parsed.error.error_type, parsed.error.message)
    } else {
        Error::UnexpectedResponse(format!("HTTP {}: {}", status, body))
    }
}

fn map_stop_reason(reason: &str) -> StopReason {
    match reason {
        "end_turn" | "stop_sequence" => StopReason::Stop,
        "max_tokens" => StopReason::Length,
        "tool_use" => StopReason::ToolUse,
        _ => StopReason::Stop,
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ApiTool>>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: Vec<ApiContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

#[derive(Debug, Serialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

fn convert_tools(tools: &[ToolSpec]) -> Vec<ApiTool> {
    tools
        .iter()
        .map(|t| ApiTool {
            name: t.name.clone(),
            description: t.description.clone(),
            input_schema: t.parameters.clone(),
        })
        .collect()
}

fn convert_messages(messages: &[Message]) -> Vec<ApiMessage> {
    messages
        .iter()
        .map(|message| match message {
            Message::User { content, .. } => ApiMessage {
                role: "user",
                content: content.iter().map(convert_content).collect(),
            },
            Message::Assistant { content, .. } => ApiMessage {
                role: "assistant",
                content: content.iter().map(convert_content).collect(),
            },
            // Tool results travel back as user-role tool_result blocks
            Message::ToolResult {
                tool_call_id,
                content,
                is_error,
                ..
            } => ApiMessage {
                role: "user",
                content: vec![ApiContentBlock::ToolResult {
                    tool_use_id: tool_call_id.clone(),
                    content: content
                        .iter()
                        .filter_map(|c| c.as_text())
                        .collect::<Vec<_>>()
                        .join("\n"),
                    is_error: *is_error,
                }],
            },
        })
        .collect()
}

fn convert_content(content: &Content) -> ApiContentBlock {
    match content {
        Content::Text { text } => ApiContentBlock::Text { text: text.clone() },
        Content::ToolCall {
            id,
            name,
            arguments,
        } => ApiContentBlock::ToolUse {
            id: id.clone(),
            name: name.clone(),
            input: arguments.clone(),
        },
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ResponseBlock>,
    stop_reason: Option<String>,
    usage: ApiUsage,
}

impl ApiResponse {
    fn into_message(self, model_id: &str) -> Message {
        let content = self
            .content
            .into_iter()
            .map(|block| match block {
                ResponseBlock::Text { text } => Content::Text { text },
                ResponseBlock::ToolUse { id, name, input } => Content::ToolCall {
                    id,
                    name,
                    arguments: input,
                },
            })
            .collect();

        Message::Assistant {
            content,
            metadata: crate::types::AssistantMetadata {
                model: Some(model_id.to_string()),
                usage: Usage {
                    input: self.usage.input_tokens,
                    output: self.usage.output_tokens,
                },
                stop_reason: Some(
                    self.stop_reason
                        .as_deref()
                        .map(map_stop_reason)
                        .unwrap_or(StopReason::Stop),
                ),
                timestamp: chrono::Utc::now().timestamp_millis(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

#[derive(Debug, Deserialize, Default)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct MessageStartEvent {
    message: MessageStartBody,
}

#[derive(Debug, Deserialize)]
struct MessageStartBody {
    usage: ApiUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlockStartEvent {
    index: u32,
    content_block: ContentBlockStart,
}

#[derive(Debug, Deserialize)]
struct ContentBlockStart {
    #[serde(rename = "type")]
    block_type: String,
    id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlockDeltaEvent {
    index: u32,
    delta: BlockDelta,
}

#[derive(Debug, Deserialize)]
struct BlockDelta {
    #[serde(rename = "type")]
    delta_type: String,
    text: Option<String>,
    partial_json: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlockStopEvent {
    index: u32,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaEvent {
    delta: MessageDelta,
    #[serde(default)]
    usage: ApiUsage,
}

#[derive(Debug, Deserialize)]
struct MessageDelta {
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEvent {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "type", default)]
    error_type: String,
    message: String,
}

#[derive(Debug, Default)]
enum ContentBlock {
    #[default]
    Empty,
    Text {
        text: String,
    },
    ToolCall {
        id: String,
        name: String,
        arguments_json: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_messages_tool_result_role() {
        let messages = vec![
            Message::user("log $5 coffee"),
            Message::assistant(vec![Content::tool_call(
                "c1",
                "create_transaction_preview",
                serde_json::json!({"amount": 5.0}),
            )]),
            Message::tool_result("c1", "create_transaction_preview", "preview created", false),
        ];

        let api = convert_messages(&messages);
        assert_eq!(api.len(), 3);
        assert_eq!(api[0].role, "user");
        assert_eq!(api[1].role, "assistant");
        // Tool results are carried on the user role
        assert_eq!(api[2].role, "user");
        match &api[2].content[0] {
            ApiContentBlock::ToolResult { tool_use_id, content, is_error } => {
                assert_eq!(tool_use_id, "c1");
                assert_eq!(content, "preview created");
                assert!(!is_error);
            }
            other => panic!("expected tool_result block, got {:?}", other),
        }
    }

    #[test]
    fn test_response_into_message() {
        let response: ApiResponse = serde_json::from_value(serde_json::json!({
            "content": [
                {"type": "text", "text": "Recording that now."},
                {"type": "tool_use", "id": "toolu_1", "name": "create_transaction_preview",
                 "input": {"amount": 12.5, "description": "lunch"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 210, "output_tokens": 44}
        }))
        .unwrap();

        let message = response.into_message("claude-haiku-4-5-20251001");
        assert_eq!(message.text(), "Recording that now.");
        let calls = message.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, "create_transaction_preview");
        match &message {
            Message::Assistant { metadata, .. } => {
                assert_eq!(metadata.stop_reason, Some(StopReason::ToolUse));
                assert_eq!(metadata.usage.input, 210);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_map_stop_reason() {
        assert_eq!(map_stop_reason("end_turn"), StopReason::Stop);
        assert_eq!(map_stop_reason("max_tokens"), StopReason::Length);
        assert_eq!(map_stop_reason("tool_use"), StopReason::ToolUse);
        assert_eq!(map_stop_reason("???"), StopReason::Stop);
    }

    #[test]
    fn test_parse_api_error_structured() {
        let body = r#"{"type":"error","error":{"type":"rate_limit_error","message":"Rate limit exceeded"}}"#;
        let err = parse_api_error(body, reqwest::StatusCode::TOO_MANY_REQUESTS);
        assert!(err.is_rate_limited());
    }

    #[test]
    fn test_parse_api_error_unstructured() {
        let err = parse_api_error("<html>bad gateway</html>", reqwest::StatusCode::BAD_GATEWAY);
        assert!(matches!(err, Error::UnexpectedResponse(_)));
    }
}
