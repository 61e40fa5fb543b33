//! The extraction leaf tool: records one proposed transaction.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::tool::{Tool, ToolResult};

pub const NAME: &str = "create_transaction_preview";

/// Records a single transaction candidate for later confirmation.
///
/// Deliberately side-effect free: the preview itself is read back from the
/// proposing tool call's arguments, so this tool only acknowledges. The
/// schema enforces a strictly positive amount and the closed
/// expense/income vocabulary before the call ever reaches execution.
#[derive(Default)]
pub struct CreateTransactionPreview;

#[async_trait]
impl Tool for CreateTransactionPreview {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Create a transaction preview. Use this tool for each transaction you want to create. \
         The transaction will be added to a preview list for user confirmation."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "amount": {
                    "type": "number",
                    "exclusiveMinimum": 0,
                    "description": "Transaction amount (must be positive)"
                },
                "description": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Brief description of the transaction"
                },
                "category_id": {
                    "type": "integer",
                    "description": "Category ID for this transaction"
                },
                "transaction_type": {
                    "type": "string",
                    "enum": ["expense", "income"],
                    "description": "Transaction type: 'expense' or 'income'"
                },
                "tag_ids": {
                    "type": "array",
                    "items": { "type": "integer" },
                    "description": "List of tag IDs to apply"
                },
                "transaction_date": {
                    "type": "string",
                    "pattern": "^\\d{4}-\\d{2}-\\d{2}$",
                    "description": "Date in YYYY-MM-DD format"
                }
            },
            "required": ["amount", "description", "category_id", "transaction_type"]
        })
    }

    async fn execute(
        &self,
        _call_id: &str,
        arguments: serde_json::Value,
        _cancel: CancellationToken,
    ) -> ToolResult {
        let amount = arguments.get("amount").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let description = arguments
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let category_id = arguments
            .get("category_id")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        ToolResult::text(format!(
            "Transaction preview created: {amount} - {description} (category: {category_id})"
        ))
    }
}
