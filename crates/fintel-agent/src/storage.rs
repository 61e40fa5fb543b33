//! Storage collaborator contract.
//!
//! The core never touches persistence directly; every read goes through
//! this trait. Implementations live outside the core (relational CRUD,
//! analytic aggregates) and failures surface as [`StorageError`], which
//! tools convert into error results rather than crashing the run.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::{BudgetInfo, CategoryInfo, TagInfo, TransactionRecord};
use crate::preview::TransactionKind;

/// Errors surfaced by the storage collaborator
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("query failed: {0}")]
    Query(String),
    #[error("not found: {0}")]
    NotFound(String),
}

/// Inclusive-start, exclusive-end query window. `start = None` means "all".
#[derive(Debug, Clone, Copy)]
pub struct DateRange {
    pub start: Option<NaiveDateTime>,
    pub end: NaiveDateTime,
}

/// Time-bucket granularity for trend queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendBucket {
    Day,
    Week,
    Month,
}

/// Per-category aggregate row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySpending {
    pub category_name: String,
    pub amount: f64,
    pub transaction_count: u64,
}

/// One point in a spending trend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendPoint {
    pub period: String,
    pub income: f64,
    pub expenses: f64,
}

/// Budget-vs-actual row for one category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetUtilization {
    pub category_name: String,
    pub budget_amount: f64,
    pub spent_amount: f64,
}

impl BudgetUtilization {
    pub fn remaining(&self) -> f64 {
        self.budget_amount - self.spent_amount
    }

    pub fn utilization_percent(&self) -> f64 {
        if self.budget_amount <= 0.0 {
            return 0.0;
        }
        self.spent_amount / self.budget_amount * 100.0
    }
}

/// One top-expense row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopExpense {
    pub description: String,
    pub amount: f64,
    pub category: String,
    pub date: NaiveDate,
    pub tags: Vec<String>,
}

/// Income vs expense totals for a window
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncomeExpenseSummary {
    pub total_income: f64,
    pub total_expenses: f64,
    pub total_transactions: u64,
}

/// Per-tag aggregate row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagSpending {
    pub tag_name: String,
    pub amount: f64,
    pub transaction_count: u64,
}

/// The external persistence collaborator.
///
/// One request-scoped handle per user-facing request; the core never caches
/// it across requests.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn categories(&self, user_id: i64) -> Result<Vec<CategoryInfo>, StorageError>;

    async fn tags(&self, user_id: i64) -> Result<Vec<TagInfo>, StorageError>;

    async fn budgets(&self, user_id: i64) -> Result<Vec<BudgetInfo>, StorageError>;

    async fn recent_transactions(
        &self,
        user_id: i64,
        account_id: i64,
        since: NaiveDate,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, StorageError>;

    async fn account_balance(&self, user_id: i64, account_id: i64)
    -> Result<f64, StorageError>;

    async fn spending_by_category(
        &self,
        user_id: i64,
        account_id: i64,
        range: DateRange,
        kind: Option<TransactionKind>,
    ) -> Result<Vec<CategorySpending>, StorageError>;

    async fn spending_over_time(
        &self,
        user_id: i64,
        account_id: i64,
        range: DateRange,
        bucket: TrendBucket,
    ) -> Result<Vec<TrendPoint>, StorageError>;

    async fn budget_utilization(
        &self,
        user_id: i64,
        month: u32,
        year: i32,
    ) -> Result<Vec<BudgetUtilization>, StorageError>;

    async fn top_expenses(
        &self,
        user_id: i64,
        account_id: i64,
        range: DateRange,
        limit: usize,
    ) -> Result<Vec<TopExpense>, StorageError>;

    async fn income_vs_expense(
        &self,
        user_id: i64,
        account_id: i64,
        range: DateRange,
    ) -> Result<IncomeExpenseSummary, StorageError>;

    async fn spending_by_tag(
        &self,
        user_id: i64,
        account_id: i64,
        range: DateRange,
    ) -> Result<Vec<TagSpending>, StorageError>;
}
