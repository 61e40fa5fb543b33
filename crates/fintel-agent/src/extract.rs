//! Natural-language transaction extraction: a single-shot specialization
//! of the orchestration loop.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

use fintel_ai::{Engine, Message, RequestOptions};

use crate::agent::{Agent, AgentConfig, LoopMode};
use crate::context::{CategoryInfo, TagInfo};
use crate::events::StreamEvent;
use crate::preview::{TransactionPreview, preview_from_args};
use crate::service::classify_engine_error;
use crate::tool::ToolRegistry;
use crate::tools::{currency::ConvertCurrency, preview::CreateTransactionPreview};
use crate::trace::TraceEvent;

const EXTRACTION_PROMPT: &str = "\
You are a transaction parsing assistant. Parse the user's input and create transaction previews.

Available categories: {categories}
Available tags: {tags}

For each transaction mentioned:
1. Match the description to the most appropriate category from the available categories
2. Match any mentioned tags to available tags
3. Use convert_currency if currency conversion is needed
4. Use create_transaction_preview to add each transaction with:
   - amount (positive number)
   - description (brief text)
   - category_id (from available categories)
   - transaction_type ('expense' or 'income')
   - tag_ids (list of tag IDs, can be empty)
   - transaction_date (YYYY-MM-DD format, default to today: {today})

Default to 'expense' type unless income is clearly indicated.
Default to today's date unless specified.
";

fn extraction_prompt(categories: &[CategoryInfo], tags: &[TagInfo], today: NaiveDate) -> String {
    let categories = serde_json::to_string(categories).unwrap_or_default();
    let tags = serde_json::to_string(tags).unwrap_or_default();
    EXTRACTION_PROMPT
        .replace("{categories}", &categories)
        .replace("{tags}", &tags)
        .replace("{today}", &today.format("%Y-%m-%d").to_string())
}

/// Parses free-form text into [`TransactionPreview`]s.
///
/// Runs the loop in single-shot mode with only the extraction tools, then
/// reads the previews back out of the proposed `create_transaction_preview`
/// calls. Previews are deduplicated by tool call id in both the atomic and
/// streaming paths; future-dated previews are dropped and malformed ones
/// skipped with a warning.
pub struct Extractor {
    engine: Arc<dyn Engine>,
}

impl Extractor {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self { engine }
    }

    fn agent(&self, categories: &[CategoryInfo], tags: &[TagInfo], today: NaiveDate) -> Agent {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(CreateTransactionPreview));
        registry.register(Arc::new(ConvertCurrency::default()));
        Agent::new(
            AgentConfig {
                system_prompt: extraction_prompt(categories, tags, today),
                mode: LoopMode::SingleShot,
                options: RequestOptions::default(),
            },
            Arc::clone(&self.engine),
            Arc::new(registry),
        )
    }

    /// Atomic extraction: the full list at once
    pub async fn parse(
        &self,
        text: &str,
        categories: &[CategoryInfo],
        tags: &[TagInfo],
        cancel: CancellationToken,
    ) -> crate::error::Result<Vec<TransactionPreview>> {
        let today = Local::now().date_naive();
        let agent = self.agent(categories, tags, today);
        let outcome = agent.run(vec![Message::user(text)], cancel).await?;

        let mut seen: HashSet<String> = HashSet::new();
        let mut previews = Vec::new();
        for message in &outcome.messages {
            for (call_id, name, args) in message.tool_calls() {
                if name != crate::tools::preview::NAME || !seen.insert(call_id.to_string()) {
                    continue;
                }
                match preview_from_args(args, today) {
                    Ok(Some(preview)) => previews.push(preview),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(call_id, "skipping malformed transaction preview: {e}");
                    }
                }
            }
        }
        Ok(previews)
    }

    /// Streaming extraction: each preview as soon as its call resolves.
    ///
    /// Emits `Planning { count }` once the batch size is known, one
    /// `TransactionStart` per preview call as it starts, one
    /// `Transaction { data }` as it resolves, then a terminal `Done`.
    /// Failures surface as a single terminal `Error`.
    pub fn parse_stream(
        &self,
        text: &str,
        categories: &[CategoryInfo],
        tags: &[TagInfo],
        cancel: CancellationToken,
    ) -> impl Stream<Item = StreamEvent> + Send + use<> {
        let today = Local::now().date_naive();
        let agent = self.agent(categories, tags, today);
        let mut source = agent.run_stream(vec![Message::user(text)], cancel.clone());

        async_stream::stream! {
            let mut pending_args: HashMap<String, serde_json::Value> = HashMap::new();
            let mut seen: HashSet<String> = HashSet::new();
            let mut failed = false;

            while let Some(event) = source.next().await {
                if cancel.is_cancelled() {
                    source.close();
                    return;
                }
                match event {
                    TraceEvent::BatchStart { size } => {
                        yield StreamEvent::Planning { count: size };
                    }
                    TraceEvent::ToolStart {
                        call_id,
                        tool_name,
                        arguments,
                    } if tool_name == crate::tools::preview::NAME => {
                        pending_args.insert(call_id, arguments);
                        yield StreamEvent::TransactionStart;
                    }
                    TraceEvent::ToolEnd {
                        call_id, result, ..
                    } => {
                        if result.is_error || !seen.insert(call_id.clone()) {
                            continue;
                        }
                        let Some(args) = pending_args.remove(&call_id) else {
                            continue;
                        };
                        match preview_from_args(&args, today) {
                            Ok(Some(preview)) => {
                                yield StreamEvent::Transaction { data: preview };
                            }
                            Ok(None) => {}
                            Err(e) => {
                                tracing::warn!(
                                    %call_id,
                                    "skipping malformed transaction preview: {e}"
                                );
                            }
                        }
                    }
                    TraceEvent::Failed { error } => {
                        let (message, recoverable) = classify_engine_error(&error);
                        failed = true;
                        source.close();
                        yield StreamEvent::Error {
                            message,
                            recoverable,
                        };
                        break;
                    }
                    _ => {}
                }
            }

            if !failed && !cancel.is_cancelled() {
                yield StreamEvent::Done {
                    conversation_id: None,
                };
            }
        }
    }
}
