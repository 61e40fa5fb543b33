//! Catalog listings: categories, tags and budgets.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::storage::Storage;
use crate::tool::{BoxedTool, Tool, ToolResult};

const EMPTY_SCHEMA: fn() -> serde_json::Value =
    || serde_json::json!({ "type": "object", "properties": {} });

/// All three listing tools bound to one request-scoped storage handle
pub fn all(storage: Arc<dyn Storage>, user_id: i64) -> Vec<BoxedTool> {
    vec![
        Arc::new(ListCategories {
            storage: Arc::clone(&storage),
            user_id,
        }),
        Arc::new(ListTags {
            storage: Arc::clone(&storage),
            user_id,
        }),
        Arc::new(ListBudgets { storage, user_id }),
    ]
}

pub struct ListCategories {
    storage: Arc<dyn Storage>,
    user_id: i64,
}

#[async_trait]
impl Tool for ListCategories {
    fn name(&self) -> &str {
        "list_categories"
    }

    fn description(&self) -> &str {
        "List all available categories. Shows category names, icons, and colors."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        EMPTY_SCHEMA()
    }

    async fn execute(
        &self,
        _call_id: &str,
        _arguments: serde_json::Value,
        _cancel: CancellationToken,
    ) -> ToolResult {
        let categories = match self.storage.categories(self.user_id).await {
            Ok(categories) => categories,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        if categories.is_empty() {
            return ToolResult::text(
                "No categories found. You can create categories to organize your transactions.",
            );
        }

        let mut lines = vec!["Your categories:".to_string()];
        for cat in &categories {
            let icon = cat.icon.as_deref().unwrap_or("📁");
            let color = cat.color.as_deref().unwrap_or("gray");
            lines.push(format!("- {icon} {} (ID: {}, color: {color})", cat.name, cat.id));
        }
        ToolResult::text(lines.join("\n"))
    }
}

pub struct ListTags {
    storage: Arc<dyn Storage>,
    user_id: i64,
}

#[async_trait]
impl Tool for ListTags {
    fn name(&self) -> &str {
        "list_tags"
    }

    fn description(&self) -> &str {
        "List all available tags. Shows tag names and colors."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        EMPTY_SCHEMA()
    }

    async fn execute(
        &self,
        _call_id: &str,
        _arguments: serde_json::Value,
        _cancel: CancellationToken,
    ) -> ToolResult {
        let tags = match self.storage.tags(self.user_id).await {
            Ok(tags) => tags,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        if tags.is_empty() {
            return ToolResult::text(
                "No tags found. You can create tags to add additional labels to your transactions.",
            );
        }

        let mut lines = vec!["Your tags:".to_string()];
        for tag in &tags {
            let color = tag.color.as_deref().unwrap_or("gray");
            lines.push(format!("- {} (ID: {}, color: {color})", tag.name, tag.id));
        }
        ToolResult::text(lines.join("\n"))
    }
}

pub struct ListBudgets {
    storage: Arc<dyn Storage>,
    user_id: i64,
}

#[async_trait]
impl Tool for ListBudgets {
    fn name(&self) -> &str {
        "list_budgets"
    }

    fn description(&self) -> &str {
        "List all budgets with their categories and amounts. \
         Shows which categories have budget limits set."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        EMPTY_SCHEMA()
    }

    async fn execute(
        &self,
        _call_id: &str,
        _arguments: serde_json::Value,
        _cancel: CancellationToken,
    ) -> ToolResult {
        let budgets = match self.storage.budgets(self.user_id).await {
            Ok(budgets) => budgets,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        if budgets.is_empty() {
            return ToolResult::text(
                "No budgets found. You can create budgets to track spending limits for each category.",
            );
        }

        let categories = match self.storage.categories(self.user_id).await {
            Ok(categories) => categories,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let mut lines = vec!["Your budgets:".to_string()];
        let mut total_budgeted = 0.0;
        for budget in &budgets {
            let category = categories.iter().find(|c| c.id == budget.category_id);
            let name = category
                .map(|c| c.name.clone())
                .unwrap_or_else(|| format!("Category {}", budget.category_id));
            let icon = category
                .and_then(|c| c.icon.as_deref())
                .unwrap_or("📁");
            total_budgeted += budget.amount;
            let notes = budget
                .notes
                .as_deref()
                .map(|n| format!(" ({n})"))
                .unwrap_or_default();
            lines.push(format!("- {icon} {name}: ${:.2}{notes}", budget.amount));
        }
        lines.push(format!("\nTotal budgeted: ${total_budgeted:.2}"));

        ToolResult::text(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockStorage;

    #[tokio::test]
    async fn test_list_categories_includes_ids() {
        let tools = all(Arc::new(MockStorage::default()), 1);
        let result = tools[0]
            .execute("c1", serde_json::json!({}), CancellationToken::new())
            .await;
        assert!(!result.is_error);
        assert!(result.content.contains("Groceries"));
        assert!(result.content.contains("ID: 1"));
    }

    #[tokio::test]
    async fn test_list_budgets_totals() {
        let tools = all(Arc::new(MockStorage::default()), 1);
        let result = tools[2]
            .execute("c1", serde_json::json!({}), CancellationToken::new())
            .await;
        assert!(result.content.contains("Groceries: $400.00"));
        assert!(result.content.contains("Total budgeted: $400.00"));
    }

    #[tokio::test]
    async fn test_storage_failure_becomes_error_result() {
        let tools = all(Arc::new(MockStorage::failing()), 1);
        for tool in tools {
            let result = tool
                .execute("c1", serde_json::json!({}), CancellationToken::new())
                .await;
            assert!(result.is_error);
            assert!(result.content.contains("storage unavailable"));
        }
    }
}
