//! The orchestration loop: reasoning phases interleaved with concurrent
//! tool batches, in atomic and streaming forms.

use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio_util::sync::CancellationToken;

use fintel_ai::{Context, Engine, EngineEvent, Message, MessageBuilder, RequestOptions};

use crate::tool::{SpecialOutput, ToolRegistry, ToolResult};
use crate::trace::{TraceEvent, TraceSource};

/// How the loop advances after a tool batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    /// One reasoning phase, at most one tool batch, then stop. The batch
    /// results are recorded but never fed back to the engine.
    SingleShot,
    /// Feed tool results back and reason again, up to `max_turns` phases.
    Conversational { max_turns: u32 },
}

impl LoopMode {
    pub fn conversational() -> Self {
        Self::Conversational { max_turns: 10 }
    }
}

/// Agent configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// System prompt for every reasoning phase
    pub system_prompt: String,
    /// Loop advancement policy
    pub mode: LoopMode,
    /// Per-request engine options
    pub options: RequestOptions,
}

/// Everything a completed run produced
#[derive(Debug)]
pub struct RunOutcome {
    /// Full transcript: inputs, assistant phases and tool results
    pub messages: Vec<Message>,
    /// Text of the last assistant phase
    pub final_text: String,
    /// Structured payloads surfaced by tools, one per tool call
    pub special_outputs: Vec<SpecialOutput>,
}

/// Drives reasoning phases against an [`Engine`] and dispatches the
/// proposed tool calls through a [`ToolRegistry`].
pub struct Agent {
    config: AgentConfig,
    engine: Arc<dyn Engine>,
    registry: Arc<ToolRegistry>,
}

impl Agent {
    pub fn new(config: AgentConfig, engine: Arc<dyn Engine>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            config,
            engine,
            registry,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn build_context(&self, messages: &[Message]) -> Context {
        Context {
            system_prompt: Some(self.config.system_prompt.clone()),
            messages: messages.to_vec(),
            tools: self.registry.api_specs(),
        }
    }

    /// Run the loop to completion and return the full outcome.
    ///
    /// Tool calls within a phase are dispatched concurrently; their results
    /// are appended in completion order. Special outputs are deduplicated
    /// by tool call id.
    pub async fn run(
        &self,
        initial_messages: Vec<Message>,
        cancel: CancellationToken,
    ) -> crate::error::Result<RunOutcome> {
        let mut messages = initial_messages;
        let mut final_text = String::new();
        let mut special_outputs = Vec::new();
        let mut seen_calls: HashSet<String> = HashSet::new();
        let mut turn = 0u32;

        loop {
            turn += 1;
            if cancel.is_cancelled() {
                return Err(crate::error::Error::Engine(fintel_ai::Error::Aborted));
            }

            let context = self.build_context(&messages);
            let assistant = self.engine.complete(&context, &self.config.options).await?;
            final_text = assistant.text();

            let calls = owned_tool_calls(&assistant);
            messages.push(assistant);

            if calls.is_empty() {
                break;
            }

            tracing::debug!(turn, batch_size = calls.len(), "dispatching tool batch");
            let mut pending = dispatch_batch(&self.registry, calls, &cancel);
            while let Some((call_id, tool_name, result)) = pending.next().await {
                if let Some(special) = &result.special {
                    if seen_calls.insert(call_id.clone()) {
                        special_outputs.push(special.clone());
                    }
                }
                messages.push(Message::tool_result(
                    call_id,
                    tool_name,
                    result.content,
                    result.is_error,
                ));
            }

            match self.config.mode {
                LoopMode::SingleShot => break,
                LoopMode::Conversational { max_turns } => {
                    if turn >= max_turns {
                        tracing::warn!(max_turns, "turn limit reached, ending run");
                        break;
                    }
                }
            }
        }

        Ok(RunOutcome {
            messages,
            final_text,
            special_outputs,
        })
    }

    /// Run the loop as a lazy trace.
    ///
    /// Text deltas are forwarded as they arrive; each tool batch is
    /// announced up front (`BatchStart`, then `ToolStart` in proposal
    /// order) while `ToolEnd` items arrive in completion order. A failed
    /// run ends with a single `Failed` item. Cancelling the token ends
    /// the trace without a `Failed`.
    pub fn run_stream(
        &self,
        initial_messages: Vec<Message>,
        cancel: CancellationToken,
    ) -> TraceSource {
        let engine = Arc::clone(&self.engine);
        let registry = Arc::clone(&self.registry);
        let config = self.config.clone();

        let stream = async_stream::stream! {
            let mut messages = initial_messages;
            let mut turn = 0u32;

            'run: loop {
                turn += 1;
                if cancel.is_cancelled() {
                    break 'run;
                }

                let context = Context {
                    system_prompt: Some(config.system_prompt.clone()),
                    messages: messages.clone(),
                    tools: registry.api_specs(),
                };

                let mut events = match engine.stream(&context, &config.options).await {
                    Ok(events) => events,
                    Err(error) => {
                        yield TraceEvent::Failed { error };
                        break 'run;
                    }
                };

                let mut builder = MessageBuilder::new();
                let mut assistant: Option<Message> = None;
                loop {
                    let event = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break 'run,
                        event = events.next() => match event {
                            Some(event) => event,
                            None => break,
                        },
                    };

                    builder.process_event(&event);
                    match event {
                        EngineEvent::TextDelta { delta, .. } => {
                            yield TraceEvent::TextDelta { content: delta };
                        }
                        EngineEvent::Done { message, .. } => {
                            assistant = Some(message);
                        }
                        EngineEvent::Error { message } => {
                            yield TraceEvent::Failed {
                                error: fintel_ai::Error::api("stream_error", message),
                            };
                            break 'run;
                        }
                        _ => {}
                    }
                }

                yield TraceEvent::PhaseEnd;

                // A stream that drops before its terminal event still has a
                // usable message accumulated from the fragments.
                let assistant = assistant.unwrap_or_else(|| builder.build());
                let calls = owned_tool_calls(&assistant);
                messages.push(assistant);

                if calls.is_empty() {
                    break 'run;
                }

                yield TraceEvent::BatchStart { size: calls.len() };
                for (call_id, tool_name, arguments) in &calls {
                    yield TraceEvent::ToolStart {
                        call_id: call_id.clone(),
                        tool_name: tool_name.clone(),
                        arguments: arguments.clone(),
                    };
                }

                let mut pending = dispatch_batch(&registry, calls, &cancel);
                loop {
                    let completed = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break 'run,
                        completed = pending.next() => match completed {
                            Some(completed) => completed,
                            None => break,
                        },
                    };
                    let (call_id, tool_name, result) = completed;
                    messages.push(Message::tool_result(
                        &call_id,
                        &tool_name,
                        result.content.clone(),
                        result.is_error,
                    ));
                    yield TraceEvent::ToolEnd {
                        call_id,
                        tool_name,
                        result,
                    };
                }

                match config.mode {
                    LoopMode::SingleShot => break 'run,
                    LoopMode::Conversational { max_turns } => {
                        if turn >= max_turns {
                            tracing::warn!(max_turns, "turn limit reached, ending trace");
                            break 'run;
                        }
                    }
                }
            }
        };

        TraceSource::new(Box::pin(stream))
    }
}

/// Extract tool calls from an assistant message as owned values
fn owned_tool_calls(message: &Message) -> Vec<(String, String, serde_json::Value)> {
    message
        .tool_calls()
        .into_iter()
        .map(|(id, name, args)| (id.to_string(), name.to_string(), args.clone()))
        .collect()
}

/// Start every call in the batch concurrently; yields completions as they land
fn dispatch_batch(
    registry: &Arc<ToolRegistry>,
    calls: Vec<(String, String, serde_json::Value)>,
    cancel: &CancellationToken,
) -> FuturesUnordered<impl std::future::Future<Output = (String, String, ToolResult)>> {
    let pending = FuturesUnordered::new();
    for (call_id, tool_name, arguments) in calls {
        let registry = Arc::clone(registry);
        let cancel = cancel.clone();
        pending.push(async move {
            let result = registry
                .invoke(&call_id, &tool_name, arguments, cancel)
                .await;
            (call_id, tool_name, result)
        });
    }
    pending
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockEngine, noop_tool, slow_tool, special_tool};
    use async_trait::async_trait;
    use fintel_ai::{Content, EngineEventStream};

    fn registry_with(tools: Vec<crate::tool::BoxedTool>) -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool);
        }
        Arc::new(registry)
    }

    fn single_shot_agent(engine: MockEngine, registry: Arc<ToolRegistry>) -> Agent {
        Agent::new(
            AgentConfig {
                system_prompt: "test".into(),
                mode: LoopMode::SingleShot,
                options: RequestOptions::default(),
            },
            Arc::new(engine),
            registry,
        )
    }

    #[tokio::test]
    async fn test_run_no_tool_calls_ends_after_one_phase() {
        let engine = MockEngine::new(vec![Message::assistant(vec![Content::text("hello")])]);
        let agent = single_shot_agent(engine, registry_with(vec![]));

        let outcome = agent
            .run(vec![Message::user("hi")], CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.final_text, "hello");
        assert_eq!(outcome.messages.len(), 2);
        assert!(outcome.special_outputs.is_empty());
    }

    #[tokio::test]
    async fn test_single_shot_never_reenters_engine() {
        let engine = MockEngine::new(vec![Message::assistant(vec![
            Content::text("recording"),
            Content::tool_call("c1", "noop", serde_json::json!({})),
        ])]);
        let calls = engine.call_count();
        let (tool, executed) = noop_tool("noop");
        let agent = single_shot_agent(engine, registry_with(vec![tool]));

        let outcome = agent
            .run(vec![Message::user("log it")], CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(calls.load(std::sync::atomic::Ordering::Relaxed), 1);
        assert_eq!(executed.load(std::sync::atomic::Ordering::Relaxed), 1);
        // user + assistant + one tool result
        assert_eq!(outcome.messages.len(), 3);
    }

    #[tokio::test]
    async fn test_conversational_feeds_results_back() {
        let engine = MockEngine::new(vec![
            Message::assistant(vec![Content::tool_call("c1", "noop", serde_json::json!({}))]),
            Message::assistant(vec![Content::text("all done")]),
        ]);
        let calls = engine.call_count();
        let (tool, _) = noop_tool("noop");
        let agent = Agent::new(
            AgentConfig {
                system_prompt: "test".into(),
                mode: LoopMode::conversational(),
                options: RequestOptions::default(),
            },
            Arc::new(engine),
            registry_with(vec![tool]),
        );

        let outcome = agent
            .run(vec![Message::user("go")], CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::Relaxed), 2);
        assert_eq!(outcome.final_text, "all done");
    }

    #[tokio::test]
    async fn test_turn_limit_caps_the_loop() {
        // Engine proposes a tool call on every phase; the cap must end it.
        let looping: Vec<Message> = (0..20)
            .map(|i| {
                Message::assistant(vec![Content::tool_call(
                    format!("c{i}"),
                    "noop",
                    serde_json::json!({}),
                )])
            })
            .collect();
        let engine = MockEngine::new(looping);
        let calls = engine.call_count();
        let (tool, _) = noop_tool("noop");
        let agent = Agent::new(
            AgentConfig {
                system_prompt: "test".into(),
                mode: LoopMode::Conversational { max_turns: 3 },
                options: RequestOptions::default(),
            },
            Arc::new(engine),
            registry_with(vec![tool]),
        );

        agent
            .run(vec![Message::user("go")], CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_stream_batch_ordering() {
        // Two calls: a slow one proposed first, a fast one second. Starts
        // come in proposal order, ends in completion order.
        let engine = MockEngine::new(vec![Message::assistant(vec![
            Content::tool_call("slow_call", "slow", serde_json::json!({})),
            Content::tool_call("fast_call", "fast", serde_json::json!({})),
        ])]);
        let (slow, _) = slow_tool("slow", 80);
        let (fast, _) = noop_tool("fast");
        let agent = single_shot_agent(engine, registry_with(vec![slow, fast]));

        let mut source = agent.run_stream(vec![Message::user("go")], CancellationToken::new());
        let mut starts = Vec::new();
        let mut ends = Vec::new();
        let mut batch_size = None;
        while let Some(event) = source.next().await {
            match event {
                TraceEvent::BatchStart { size } => batch_size = Some(size),
                TraceEvent::ToolStart { call_id, .. } => starts.push(call_id),
                TraceEvent::ToolEnd { call_id, .. } => ends.push(call_id),
                _ => {}
            }
        }

        assert_eq!(batch_size, Some(2));
        assert_eq!(starts, vec!["slow_call", "fast_call"]);
        assert_eq!(ends, vec!["fast_call", "slow_call"]);
    }

    #[tokio::test]
    async fn test_stream_failure_is_last_item() {
        let engine = MockEngine::failing(fintel_ai::Error::RateLimited { retry_after: None });
        let agent = single_shot_agent(engine, registry_with(vec![]));

        let mut source = agent.run_stream(vec![Message::user("go")], CancellationToken::new());
        let first = source.next().await;
        assert!(matches!(
            first,
            Some(TraceEvent::Failed {
                error: fintel_ai::Error::RateLimited { .. }
            })
        ));
        assert!(source.next().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_ends_trace_without_failure() {
        let engine = MockEngine::new(vec![Message::assistant(vec![Content::tool_call(
            "c1",
            "slow",
            serde_json::json!({}),
        )])]);
        let (slow, _) = slow_tool("slow", 5_000);
        let agent = single_shot_agent(engine, registry_with(vec![slow]));

        let cancel = CancellationToken::new();
        let mut source = agent.run_stream(vec![Message::user("go")], cancel.clone());

        // Drain until the batch is announced, then cancel.
        let mut saw_failure = false;
        while let Some(event) = source.next().await {
            if matches!(event, TraceEvent::Failed { .. }) {
                saw_failure = true;
            }
            if matches!(event, TraceEvent::ToolStart { .. }) {
                cancel.cancel();
            }
        }
        assert!(!saw_failure);
    }

    /// Streams content fragments and hangs up without a terminal event
    struct TruncatedStreamEngine;

    #[async_trait]
    impl Engine for TruncatedStreamEngine {
        async fn complete(
            &self,
            _context: &Context,
            _options: &RequestOptions,
        ) -> fintel_ai::Result<Message> {
            Ok(Message::assistant(vec![Content::text("done")]))
        }

        async fn stream(
            &self,
            _context: &Context,
            _options: &RequestOptions,
        ) -> fintel_ai::Result<EngineEventStream> {
            Ok(Box::pin(async_stream::stream! {
                yield EngineEvent::TextStart { content_index: 0 };
                yield EngineEvent::TextDelta {
                    content_index: 0,
                    delta: "logging it".into(),
                };
                yield EngineEvent::ToolCallStart {
                    content_index: 1,
                    id: "c1".into(),
                    name: "noop".into(),
                };
                yield EngineEvent::ToolCallDelta {
                    content_index: 1,
                    delta: "{}".into(),
                };
            }))
        }
    }

    #[tokio::test]
    async fn test_stream_without_terminal_event_still_dispatches_tools() {
        let (tool, executed) = noop_tool("noop");
        let agent = Agent::new(
            AgentConfig {
                system_prompt: "test".into(),
                mode: LoopMode::SingleShot,
                options: RequestOptions::default(),
            },
            Arc::new(TruncatedStreamEngine),
            registry_with(vec![tool]),
        );

        let mut source = agent.run_stream(vec![Message::user("go")], CancellationToken::new());
        let mut events = Vec::new();
        while let Some(event) = source.next().await {
            events.push(event);
        }

        // The assistant message was rebuilt from the fragments.
        assert!(events.iter().any(
            |e| matches!(e, TraceEvent::ToolStart { call_id, tool_name, .. }
                if call_id == "c1" && tool_name == "noop")
        ));
        assert!(
            events
                .iter()
                .any(|e| matches!(e, TraceEvent::ToolEnd { call_id, .. } if call_id == "c1"))
        );
        assert_eq!(executed.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_special_outputs_deduplicated_by_call_id() {
        let special = SpecialOutput::TransactionPreviews {
            transactions: vec![],
            count: 0,
            message: "none".into(),
        };
        let (tool, executed) = special_tool("flag", special);
        // The same correlation id proposed twice in one batch
        let engine = MockEngine::new(vec![Message::assistant(vec![
            Content::tool_call("c1", "flag", serde_json::json!({})),
            Content::tool_call("c1", "flag", serde_json::json!({})),
        ])]);
        let agent = single_shot_agent(engine, registry_with(vec![tool]));

        let outcome = agent
            .run(vec![Message::user("go")], CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(executed.load(std::sync::atomic::Ordering::Relaxed), 2);
        assert_eq!(outcome.special_outputs.len(), 1);
    }

    #[tokio::test]
    async fn test_sibling_failure_does_not_abort_batch() {
        let engine = MockEngine::new(vec![Message::assistant(vec![
            Content::tool_call("ok_call", "ok", serde_json::json!({})),
            Content::tool_call("bad_call", "unknown_tool", serde_json::json!({})),
        ])]);
        let (ok, _) = noop_tool("ok");
        let agent = single_shot_agent(engine, registry_with(vec![ok]));

        let outcome = agent
            .run(vec![Message::user("go")], CancellationToken::new())
            .await
            .unwrap();

        let errors: Vec<bool> = outcome
            .messages
            .iter()
            .filter_map(|m| match m {
                Message::ToolResult { is_error, .. } => Some(*is_error),
                _ => None,
            })
            .collect();
        assert_eq!(errors.len(), 2);
        assert!(errors.contains(&true));
        assert!(errors.contains(&false));
    }
}
