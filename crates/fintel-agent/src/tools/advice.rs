//! Personalized advice: a terminal single-turn engine call.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use fintel_ai::{Context, Engine, Message, RequestOptions};

use crate::context::UserContext;
use crate::tool::{Tool, ToolResult};

/// Generates advice from one tool-free engine call seeded with a compact
/// summary of the user's figures. Deliberately a leaf: it never proposes
/// further tool calls.
pub struct GetFinancialAdvice {
    engine: Arc<dyn Engine>,
    user_context: UserContext,
}

impl GetFinancialAdvice {
    pub fn new(engine: Arc<dyn Engine>, user_context: UserContext) -> Self {
        Self {
            engine,
            user_context,
        }
    }

    fn context_block(&self, extra: Option<&str>) -> String {
        let mut parts = vec![
            format!(
                "User's current account balance: ${:.2}",
                self.user_context.account_balance
            ),
            format!("Number of categories: {}", self.user_context.categories.len()),
            format!("Number of active budgets: {}", self.user_context.budgets.len()),
            format!(
                "Recent transactions: {} in last 30 days",
                self.user_context.recent_transactions.len()
            ),
        ];
        if let Some(extra) = extra {
            parts.push(format!("Additional context: {extra}"));
        }
        parts.join("\n")
    }
}

#[async_trait]
impl Tool for GetFinancialAdvice {
    fn name(&self) -> &str {
        "get_financial_advice"
    }

    fn description(&self) -> &str {
        "Get personalized financial advice based on the user's data and question. \
         Use this when the user asks for advice, suggestions, or recommendations. \
         Examples: 'How can I save more money?', \
         'Should I increase my entertainment budget?', \
         'What's a good budget for groceries?'"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "question": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Specific financial question or area for advice"
                },
                "context": {
                    "type": ["string", "null"],
                    "description": "Additional context like recent spending, budgets, or financial goals"
                }
            },
            "required": ["question"]
        })
    }

    async fn execute(
        &self,
        _call_id: &str,
        arguments: serde_json::Value,
        _cancel: CancellationToken,
    ) -> ToolResult {
        let question = arguments
            .get("question")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let extra = arguments.get("context").and_then(|v| v.as_str());

        let prompt = format!(
            "You are a helpful financial advisor. Provide practical, actionable advice \
             based on the user's question and their financial context.\n\n\
             User's Question: {question}\n\n\
             User's Financial Context:\n{}\n\n\
             Provide specific, actionable advice that is:\n\
             1. Practical and realistic\n\
             2. Based on their current situation\n\
             3. Encouraging and supportive\n\
             4. Focused on sustainable habits\n\n\
             Keep your response concise (1-3 paragraphs) and avoid generic advice.",
            self.context_block(extra)
        );

        let context = Context {
            system_prompt: None,
            messages: vec![Message::user(prompt)],
            tools: vec![],
        };
        let options = RequestOptions {
            max_tokens: Some(1024),
            temperature: Some(0.3),
        };

        match self.engine.complete(&context, &options).await {
            Ok(message) => ToolResult::text(message.text()),
            Err(e) => {
                tracing::error!("advice generation failed: {e}");
                ToolResult::error(format!("Could not generate advice: {e}"))
            }
        }
    }
}
