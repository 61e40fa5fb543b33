//! Natural-language transaction creation, delegating to the extractor.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::extract::Extractor;
use crate::storage::Storage;
use crate::tool::{SpecialOutput, Tool, ToolResult};

/// Parses described transactions into previews via the single-shot
/// extraction loop. Successful extractions come back as a structured
/// [`SpecialOutput`] so the streaming pipeline can lift them out of the
/// generic tool output.
pub struct CreateTransactions {
    storage: Arc<dyn Storage>,
    extractor: Arc<Extractor>,
    user_id: i64,
}

impl CreateTransactions {
    pub fn new(storage: Arc<dyn Storage>, extractor: Arc<Extractor>, user_id: i64) -> Self {
        Self {
            storage,
            extractor,
            user_id,
        }
    }
}

#[async_trait]
impl Tool for CreateTransactions {
    fn name(&self) -> &str {
        "create_transactions"
    }

    fn description(&self) -> &str {
        "Parse natural language text to create transaction previews. \
         Use this when the user wants to add transactions by describing them. \
         Examples: 'I spent $50 on groceries yesterday', \
         'Add coffee for $5, lunch $15, and gas $40', 'Got paid $2000 today'. \
         Returns transaction previews that the user will review and confirm."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Natural language description of transactions to create"
                }
            },
            "required": ["text"]
        })
    }

    async fn execute(
        &self,
        _call_id: &str,
        arguments: serde_json::Value,
        cancel: CancellationToken,
    ) -> ToolResult {
        let text = arguments.get("text").and_then(|v| v.as_str()).unwrap_or("");

        let categories = match self.storage.categories(self.user_id).await {
            Ok(categories) => categories,
            Err(e) => return ToolResult::error(e.to_string()),
        };
        let tags = match self.storage.tags(self.user_id).await {
            Ok(tags) => tags,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let transactions = match self.extractor.parse(text, &categories, &tags, cancel).await {
            Ok(transactions) => transactions,
            Err(e) => {
                tracing::error!("transaction extraction failed: {e}");
                return ToolResult::error(format!("Could not parse transactions: {e}"));
            }
        };

        if transactions.is_empty() {
            return ToolResult::text(
                "No transactions were identified in that text. Please provide more \
                 specific information like amounts and descriptions.",
            );
        }

        let count = transactions.len();
        let message = format!("Found {count} transaction(s) to create");
        ToolResult::text(message.clone()).with_special(SpecialOutput::TransactionPreviews {
            transactions,
            count,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockEngine, MockStorage};
    use fintel_ai::{Content, Message};

    fn extractor_with_one_preview() -> Arc<Extractor> {
        let engine = MockEngine::new(vec![Message::assistant(vec![Content::tool_call(
            "c1",
            crate::tools::preview::NAME,
            serde_json::json!({
                "amount": 50.0,
                "description": "groceries",
                "category_id": 1,
                "transaction_type": "expense"
            }),
        )])]);
        Arc::new(Extractor::new(Arc::new(engine)))
    }

    fn extractor_with_no_previews() -> Arc<Extractor> {
        let engine = MockEngine::new(vec![Message::assistant(vec![Content::text(
            "I could not find any transactions.",
        )])]);
        Arc::new(Extractor::new(Arc::new(engine)))
    }

    #[tokio::test]
    async fn test_previews_carried_as_special_output() {
        let tool = CreateTransactions::new(
            Arc::new(MockStorage::default()),
            extractor_with_one_preview(),
            1,
        );
        let result = tool
            .execute(
                "call",
                serde_json::json!({"text": "spent $50 on groceries"}),
                CancellationToken::new(),
            )
            .await;
        assert!(!result.is_error);
        assert_eq!(result.content, "Found 1 transaction(s) to create");
        match result.special {
            Some(SpecialOutput::TransactionPreviews {
                count, transactions, ..
            }) => {
                assert_eq!(count, 1);
                assert_eq!(transactions[0].amount, 50.0);
            }
            None => panic!("expected special output"),
        }
    }

    #[tokio::test]
    async fn test_empty_extraction_is_plain_text() {
        let tool = CreateTransactions::new(
            Arc::new(MockStorage::default()),
            extractor_with_no_previews(),
            1,
        );
        let result = tool
            .execute(
                "call",
                serde_json::json!({"text": "hello"}),
                CancellationToken::new(),
            )
            .await;
        assert!(!result.is_error);
        assert!(result.special.is_none());
        assert!(result.content.contains("No transactions were identified"));
    }

    #[tokio::test]
    async fn test_storage_failure_is_error_result() {
        let tool = CreateTransactions::new(
            Arc::new(MockStorage::failing()),
            extractor_with_one_preview(),
            1,
        );
        let result = tool
            .execute(
                "call",
                serde_json::json!({"text": "spent $50"}),
                CancellationToken::new(),
            )
            .await;
        assert!(result.is_error);
    }
}
