//! The conversational assistant and its event streaming pipeline.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use chrono::{Duration, Local};
use regex::Regex;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

use fintel_ai::{Engine, Message, RequestOptions};

use crate::agent::{Agent, AgentConfig, LoopMode};
use crate::context::UserContext;
use crate::events::StreamEvent;
use crate::extract::Extractor;
use crate::storage::{Storage, StorageError};
use crate::tool::SpecialOutput;
use crate::tools::assistant_registry;
use crate::trace::TraceEvent;

const SYSTEM_PROMPT: &str = "\
You are a helpful financial assistant. You help users understand their finances, create transactions, and manage their money.

You have access to tools to:
- Analyze spending patterns and trends
- View budgets and budget utilization
- List categories, tags, and budgets
- Create transactions from natural language
- Get financial insights and personalized advice

When answering questions:
1. Be conversational and friendly
2. Use the tools available to get accurate data - don't make assumptions
3. Provide clear, actionable insights
4. Format numbers as currency when appropriate
5. If you need more context, ask clarifying questions

Remember: Always use tools to get real data rather than making assumptions. If a user asks about their spending, use the analytics tools to get actual numbers.
";

const RECENT_TRANSACTION_DAYS: i64 = 30;
const RECENT_TRANSACTION_LIMIT: usize = 50;

static RATE_LIMIT_PATTERNS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)rate.?limit|quota|too many requests|overloaded").expect("valid pattern")
});
static TIMEOUT_PATTERNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)time(d)?.?out").expect("valid pattern"));
static CONNECTIVITY_PATTERNS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)database|connection|connect|network|unreachable").expect("valid pattern")
});

/// Map an engine failure to a user-facing message plus a recoverable flag.
///
/// Typed variants are checked first; the pattern tables catch failures
/// that arrive as bare API error strings. The raw error is never shown
/// to the client.
pub fn classify_engine_error(error: &fintel_ai::Error) -> (String, bool) {
    if matches!(error, fintel_ai::Error::Aborted) {
        return ("Request cancelled".to_string(), false);
    }
    if error.is_rate_limited() {
        return (
            "Service temporarily unavailable due to rate limits. Please try again in a moment."
                .to_string(),
            true,
        );
    }
    if error.is_timeout() {
        return ("Request timed out. Please try again.".to_string(), true);
    }

    let raw = error.to_string();
    if RATE_LIMIT_PATTERNS.is_match(&raw) {
        return (
            "Service temporarily unavailable due to rate limits. Please try again in a moment."
                .to_string(),
            true,
        );
    }
    if TIMEOUT_PATTERNS.is_match(&raw) {
        return ("Request timed out. Please try again.".to_string(), true);
    }
    if error.is_connectivity() || CONNECTIVITY_PATTERNS.is_match(&raw) {
        return (
            "Database connection error. Please try again.".to_string(),
            true,
        );
    }

    (
        "An error occurred while processing your request.".to_string(),
        true,
    )
}

/// The chat-facing service: loads per-request context, assembles the full
/// tool catalog and re-classifies the loop's trace into client events.
pub struct Assistant {
    engine: Arc<dyn Engine>,
    advice_engine: Arc<dyn Engine>,
    extractor: Arc<Extractor>,
}

impl Assistant {
    /// `engine` drives the conversation; `advice_engine` and
    /// `extraction_engine` back the advice and transaction-creation leaves.
    pub fn new(
        engine: Arc<dyn Engine>,
        advice_engine: Arc<dyn Engine>,
        extraction_engine: Arc<dyn Engine>,
    ) -> Self {
        Self {
            engine,
            advice_engine,
            extractor: Arc::new(Extractor::new(extraction_engine)),
        }
    }

    /// Load everything the assistant knows about the user at request start
    pub async fn load_user_context(
        storage: &Arc<dyn Storage>,
        user_id: i64,
        account_id: i64,
    ) -> Result<UserContext, StorageError> {
        let since = Local::now().date_naive() - Duration::days(RECENT_TRANSACTION_DAYS);
        let categories = storage.categories(user_id).await?;
        let tags = storage.tags(user_id).await?;
        let budgets = storage.budgets(user_id).await?;
        let recent_transactions = storage
            .recent_transactions(user_id, account_id, since, RECENT_TRANSACTION_LIMIT)
            .await?;
        let account_balance = storage.account_balance(user_id, account_id).await?;
        Ok(UserContext {
            categories,
            tags,
            budgets,
            recent_transactions,
            account_balance,
        })
    }

    fn agent(
        &self,
        storage: Arc<dyn Storage>,
        user_id: i64,
        account_id: i64,
        user_context: &UserContext,
    ) -> Agent {
        let registry = assistant_registry(
            storage,
            Arc::clone(&self.extractor),
            Arc::clone(&self.advice_engine),
            user_id,
            account_id,
            user_context,
        );
        Agent::new(
            AgentConfig {
                system_prompt: SYSTEM_PROMPT.to_string(),
                mode: LoopMode::conversational(),
                options: RequestOptions::default(),
            },
            Arc::clone(&self.engine),
            Arc::new(registry),
        )
    }

    /// Stream one chat turn as client events.
    ///
    /// Always opens with `thinking`; a completed run ends with exactly one
    /// `done`, a failed one with exactly one categorized `error`, and a
    /// cancelled one with neither. The underlying trace source is released
    /// on every exit path.
    pub fn chat_stream(
        &self,
        message: String,
        user_id: i64,
        account_id: i64,
        storage: Arc<dyn Storage>,
        conversation_id: Option<String>,
        cancel: CancellationToken,
    ) -> impl Stream<Item = StreamEvent> + Send + use<> {
        let engine = Arc::clone(&self.engine);
        let advice_engine = Arc::clone(&self.advice_engine);
        let extractor = Arc::clone(&self.extractor);

        async_stream::stream! {
            tracing::info!(user_id, account_id, message_length = message.len(), "starting chat stream");
            yield StreamEvent::thinking();

            let user_context =
                match Self::load_user_context(&storage, user_id, account_id).await {
                    Ok(context) => context,
                    Err(e) => {
                        tracing::error!("failed to load user context: {e}");
                        yield StreamEvent::Error {
                            message: "Database connection error. Please try again.".to_string(),
                            recoverable: true,
                        };
                        return;
                    }
                };
            tracing::debug!(
                categories = user_context.categories.len(),
                tags = user_context.tags.len(),
                budgets = user_context.budgets.len(),
                transactions = user_context.recent_transactions.len(),
                "user context loaded"
            );

            let conversation_id =
                conversation_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

            let registry = assistant_registry(
                storage,
                extractor,
                advice_engine,
                user_id,
                account_id,
                &user_context,
            );
            let agent = Agent::new(
                AgentConfig {
                    system_prompt: SYSTEM_PROMPT.to_string(),
                    mode: LoopMode::conversational(),
                    options: RequestOptions::default(),
                },
                engine,
                Arc::new(registry),
            );

            let mut source = agent.run_stream(vec![Message::user(message)], cancel.clone());
            let mut lifted_calls: HashSet<String> = HashSet::new();

            while let Some(event) = source.next().await {
                if cancel.is_cancelled() {
                    tracing::info!(user_id, "chat stream cancelled by client");
                    source.close();
                    return;
                }

                match event {
                    TraceEvent::TextDelta { content } => {
                        if !content.is_empty() {
                            yield StreamEvent::MessageChunk {
                                content,
                                is_final: false,
                            };
                        }
                    }
                    TraceEvent::PhaseEnd => {
                        yield StreamEvent::MessageChunk {
                            content: String::new(),
                            is_final: true,
                        };
                    }
                    TraceEvent::BatchStart { .. } => {}
                    TraceEvent::ToolStart {
                        tool_name,
                        arguments,
                        ..
                    } => {
                        tracing::info!(%tool_name, "tool execution started");
                        yield StreamEvent::ToolStart {
                            tool_name,
                            tool_input: arguments,
                        };
                    }
                    TraceEvent::ToolEnd {
                        call_id,
                        tool_name,
                        result,
                    } => {
                        let mut output = result.content;
                        if let Some(SpecialOutput::TransactionPreviews {
                            transactions,
                            count,
                            message,
                        }) = result.special
                        {
                            if lifted_calls.insert(call_id) {
                                yield StreamEvent::TransactionPreviews {
                                    transactions,
                                    count,
                                };
                            }
                            output = message;
                        }
                        tracing::info!(
                            %tool_name,
                            success = !result.is_error,
                            "tool execution completed"
                        );
                        let error = result.is_error.then(|| output.clone());
                        yield StreamEvent::ToolEnd {
                            tool_name,
                            tool_output: output,
                            success: !result.is_error,
                            error,
                        };
                    }
                    TraceEvent::Failed { error } => {
                        tracing::error!("chat stream error: {error}");
                        let (message, recoverable) = classify_engine_error(&error);
                        source.close();
                        yield StreamEvent::Error {
                            message,
                            recoverable,
                        };
                        return;
                    }
                }
            }

            if cancel.is_cancelled() {
                source.close();
                return;
            }
            yield StreamEvent::Done {
                conversation_id: Some(conversation_id),
            };
        }
    }

    /// Non-streaming chat, for simple callers and tests
    pub async fn chat(
        &self,
        message: String,
        user_id: i64,
        account_id: i64,
        storage: Arc<dyn Storage>,
    ) -> crate::error::Result<String> {
        let user_context = Self::load_user_context(&storage, user_id, account_id).await?;
        let agent = self.agent(storage, user_id, account_id, &user_context);
        let outcome = agent
            .run(vec![Message::user(message)], CancellationToken::new())
            .await?;
        if outcome.final_text.is_empty() {
            Ok("I'm sorry, I couldn't process that request.".to_string())
        } else {
            Ok(outcome.final_text)
        }
    }
}
