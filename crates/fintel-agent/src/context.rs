//! Per-request user context supplied to the assistant at conversation start.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::preview::TransactionKind;

/// Category snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryInfo {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Tag snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagInfo {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Budget snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetInfo {
    pub id: i64,
    pub category_id: i64,
    pub amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// One already-persisted transaction, as supplied in context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: i64,
    pub amount: f64,
    pub description: String,
    pub category_id: i64,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub date: NaiveDate,
}

/// Everything the assistant knows about the user at conversation start.
///
/// Loaded once per request through the storage collaborator; immutable for
/// the duration of the run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserContext {
    pub categories: Vec<CategoryInfo>,
    pub tags: Vec<TagInfo>,
    pub budgets: Vec<BudgetInfo>,
    pub recent_transactions: Vec<TransactionRecord>,
    pub account_balance: f64,
}

impl UserContext {
    /// Look up a category name by id
    pub fn category_name(&self, id: i64) -> Option<&str> {
        self.categories
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.name.as_str())
    }
}
