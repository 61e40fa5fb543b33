//! Analytics tools: aggregate queries through the storage collaborator,
//! summarized into engine-readable text.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Duration, Local, NaiveDateTime};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::preview::TransactionKind;
use crate::storage::{DateRange, Storage, TrendBucket};
use crate::tool::{BoxedTool, Tool, ToolResult};

/// All six analytics tools bound to one request-scoped storage handle
pub fn all(storage: Arc<dyn Storage>, user_id: i64, account_id: i64) -> Vec<BoxedTool> {
    let ctx = QueryContext {
        storage,
        user_id,
        account_id,
    };
    vec![
        Arc::new(SpendingByCategory { ctx: ctx.clone() }),
        Arc::new(SpendingTrends { ctx: ctx.clone() }),
        Arc::new(BudgetAnalysis { ctx: ctx.clone() }),
        Arc::new(TopExpenses { ctx: ctx.clone() }),
        Arc::new(IncomeVsExpense { ctx: ctx.clone() }),
        Arc::new(SpendingByTag { ctx }),
    ]
}

#[derive(Clone)]
struct QueryContext {
    storage: Arc<dyn Storage>,
    user_id: i64,
    account_id: i64,
}

/// Resolve a named period into a query window ending now.
/// Unrecognized values (including "all") mean an unbounded start.
fn period_range(period: &str, now: NaiveDateTime) -> DateRange {
    let start = match period {
        "today" => Some(now.date().and_hms_opt(0, 0, 0).unwrap_or(now)),
        "week" => Some(now - Duration::days(7)),
        "month" => Some(now - Duration::days(30)),
        "quarter" => Some(now - Duration::days(90)),
        "year" => Some(now - Duration::days(365)),
        _ => None,
    };
    DateRange { start, end: now }
}

fn now_local() -> NaiveDateTime {
    Local::now().naive_local()
}

fn default_period() -> String {
    "month".to_string()
}

fn parse_args<T: for<'de> Deserialize<'de>>(arguments: serde_json::Value) -> Result<T, ToolResult> {
    serde_json::from_value(arguments)
        .map_err(|e| ToolResult::error(format!("Invalid arguments: {e}")))
}

fn period_schema(values: &[&str]) -> serde_json::Value {
    serde_json::json!({
        "type": "string",
        "enum": values,
        "description": "Time period to analyze"
    })
}

// --- get_spending_by_category ---

pub struct SpendingByCategory {
    ctx: QueryContext,
}

#[derive(Deserialize)]
struct SpendingByCategoryArgs {
    #[serde(default = "default_period")]
    period: String,
    #[serde(default = "default_expense")]
    transaction_type: Option<String>,
}

fn default_expense() -> Option<String> {
    Some("expense".to_string())
}

#[async_trait]
impl Tool for SpendingByCategory {
    fn name(&self) -> &str {
        "get_spending_by_category"
    }

    fn description(&self) -> &str {
        "Get spending or income broken down by category. \
         Returns total amount and transaction count for each category."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "period": period_schema(&["today", "week", "month", "year", "all"]),
                "transaction_type": {
                    "type": ["string", "null"],
                    "enum": ["income", "expense", null],
                    "description": "Filter by transaction type"
                }
            }
        })
    }

    async fn execute(
        &self,
        _call_id: &str,
        arguments: serde_json::Value,
        _cancel: CancellationToken,
    ) -> ToolResult {
        let args: SpendingByCategoryArgs = match parse_args(arguments) {
            Ok(args) => args,
            Err(error) => return error,
        };
        let kind = match args.transaction_type.as_deref() {
            Some("income") => Some(TransactionKind::Income),
            Some("expense") => Some(TransactionKind::Expense),
            _ => None,
        };
        let range = period_range(&args.period, now_local());

        let rows = match self
            .ctx
            .storage
            .spending_by_category(self.ctx.user_id, self.ctx.account_id, range, kind)
            .await
        {
            Ok(rows) => rows,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        if rows.is_empty() {
            return ToolResult::text("No transactions found for the specified period.");
        }

        let total: f64 = rows.iter().map(|r| r.amount).sum();
        let mut summary = format!(
            "Total spending across {} categories: ${total:.2}. ",
            rows.len()
        );
        if let Some(top) = rows.first() {
            let pct = if total > 0.0 { top.amount / total * 100.0 } else { 0.0 };
            summary.push_str(&format!(
                "Highest spending: {} (${:.2}, {pct:.1}%)",
                top.category_name, top.amount
            ));
        }

        let details: Vec<String> = rows
            .iter()
            .map(|r| {
                let pct = if total > 0.0 { r.amount / total * 100.0 } else { 0.0 };
                format!(
                    "- {}: ${:.2} ({pct:.1}%, {} transactions)",
                    r.category_name, r.amount, r.transaction_count
                )
            })
            .collect();

        ToolResult::text(format!(
            "{summary}\n\nDetailed breakdown:\n{}",
            details.join("\n")
        ))
    }
}

// --- get_spending_trends ---

pub struct SpendingTrends {
    ctx: QueryContext,
}

#[derive(Deserialize)]
struct SpendingTrendsArgs {
    #[serde(default = "default_period")]
    period: String,
    #[serde(default = "default_group_by")]
    group_by: String,
}

fn default_group_by() -> String {
    "day".to_string()
}

#[async_trait]
impl Tool for SpendingTrends {
    fn name(&self) -> &str {
        "get_spending_trends"
    }

    fn description(&self) -> &str {
        "Get spending trends over time, showing income and expenses by day/week/month. \
         Useful for understanding spending patterns and trends."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "period": period_schema(&["week", "month", "quarter", "year"]),
                "group_by": {
                    "type": "string",
                    "enum": ["day", "week", "month"],
                    "description": "Group results by time unit"
                }
            }
        })
    }

    async fn execute(
        &self,
        _call_id: &str,
        arguments: serde_json::Value,
        _cancel: CancellationToken,
    ) -> ToolResult {
        let args: SpendingTrendsArgs = match parse_args(arguments) {
            Ok(args) => args,
            Err(error) => return error,
        };
        let bucket = match args.group_by.as_str() {
            "week" => TrendBucket::Week,
            "month" => TrendBucket::Month,
            _ => TrendBucket::Day,
        };
        let range = period_range(&args.period, now_local());

        let rows = match self
            .ctx
            .storage
            .spending_over_time(self.ctx.user_id, self.ctx.account_id, range, bucket)
            .await
        {
            Ok(rows) => rows,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        if rows.is_empty() {
            return ToolResult::text("No transaction data found for the specified period.");
        }

        let total_income: f64 = rows.iter().map(|r| r.income).sum();
        let total_expense: f64 = rows.iter().map(|r| r.expenses).sum();
        ToolResult::text(format!(
            "Period analysis ({}): Total income ${total_income:.2}, \
             Total expense ${total_expense:.2}, Net ${:.2}",
            args.group_by,
            total_income - total_expense
        ))
    }
}

// --- get_budget_analysis ---

pub struct BudgetAnalysis {
    ctx: QueryContext,
}

#[derive(Deserialize)]
struct BudgetAnalysisArgs {
    month: Option<u32>,
    year: Option<i32>,
}

#[async_trait]
impl Tool for BudgetAnalysis {
    fn name(&self) -> &str {
        "get_budget_analysis"
    }

    fn description(&self) -> &str {
        "Analyze budget utilization for each category. \
         Shows how much has been spent vs budgeted amounts. \
         Highlights categories over budget or nearing limits."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "month": {
                    "type": ["integer", "null"],
                    "minimum": 1,
                    "maximum": 12,
                    "description": "Month number (1-12), defaults to current month"
                },
                "year": {
                    "type": ["integer", "null"],
                    "minimum": 2000,
                    "maximum": 2100,
                    "description": "Year (e.g., 2024), defaults to current year"
                }
            }
        })
    }

    async fn execute(
        &self,
        _call_id: &str,
        arguments: serde_json::Value,
        _cancel: CancellationToken,
    ) -> ToolResult {
        let args: BudgetAnalysisArgs = match parse_args(arguments) {
            Ok(args) => args,
            Err(error) => return error,
        };
        let now = now_local();
        let month = args.month.unwrap_or(now.month());
        let year = args.year.unwrap_or(now.year());

        let rows = match self
            .ctx
            .storage
            .budget_utilization(self.ctx.user_id, month, year)
            .await
        {
            Ok(rows) => rows,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        if rows.is_empty() {
            return ToolResult::text("No budgets found.");
        }

        let total_budgeted: f64 = rows.iter().map(|r| r.budget_amount).sum();
        let total_spent: f64 = rows.iter().map(|r| r.spent_amount).sum();
        let overall_pct = if total_budgeted > 0.0 {
            total_spent / total_budgeted * 100.0
        } else {
            0.0
        };
        let over = rows.iter().filter(|r| r.utilization_percent() > 100.0).count();
        let near = rows
            .iter()
            .filter(|r| {
                let pct = r.utilization_percent();
                (80.0..=100.0).contains(&pct)
            })
            .count();

        let mut summary = format!(
            "Budget overview: ${total_spent:.2} spent of ${total_budgeted:.2} budgeted ({overall_pct:.1}%). "
        );
        if over > 0 {
            summary.push_str(&format!("{over} category(ies) over budget. "));
        }
        if near > 0 {
            summary.push_str(&format!("{near} category(ies) near limit. "));
        }

        let details: Vec<String> = rows
            .iter()
            .map(|r| {
                let pct = r.utilization_percent();
                let status = if pct <= 80.0 {
                    "✓"
                } else if pct <= 100.0 {
                    "⚠"
                } else {
                    "✗"
                };
                format!(
                    "{status} {}: ${:.2} / ${:.2} ({pct:.1}%, ${:.2} remaining)",
                    r.category_name,
                    r.spent_amount,
                    r.budget_amount,
                    r.remaining()
                )
            })
            .collect();

        ToolResult::text(format!("{summary}\n\n{}", details.join("\n")))
    }
}

// --- get_top_expenses ---

pub struct TopExpenses {
    ctx: QueryContext,
}

#[derive(Deserialize)]
struct TopExpensesArgs {
    #[serde(default = "default_period")]
    period: String,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    10
}

#[async_trait]
impl Tool for TopExpenses {
    fn name(&self) -> &str {
        "get_top_expenses"
    }

    fn description(&self) -> &str {
        "Get the highest expense transactions for a given period. \
         Useful for identifying large purchases or unusual spending."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "period": period_schema(&["week", "month", "year", "all"]),
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 50,
                    "description": "Number of top expenses to return"
                }
            }
        })
    }

    async fn execute(
        &self,
        _call_id: &str,
        arguments: serde_json::Value,
        _cancel: CancellationToken,
    ) -> ToolResult {
        let args: TopExpensesArgs = match parse_args(arguments) {
            Ok(args) => args,
            Err(error) => return error,
        };
        let limit = args.limit.clamp(1, 50);
        let range = period_range(&args.period, now_local());

        let rows = match self
            .ctx
            .storage
            .top_expenses(self.ctx.user_id, self.ctx.account_id, range, limit)
            .await
        {
            Ok(rows) => rows,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        if rows.is_empty() {
            return ToolResult::text("No expenses found for the specified period.");
        }

        let total: f64 = rows.iter().map(|r| r.amount).sum();
        let details: Vec<String> = rows
            .iter()
            .enumerate()
            .map(|(i, r)| {
                format!(
                    "{}. {} - ${:.2} ({}, {})",
                    i + 1,
                    r.description,
                    r.amount,
                    r.category,
                    r.date
                )
            })
            .collect();

        ToolResult::text(format!(
            "Top {} expenses totaling ${total:.2}.\n\n{}",
            rows.len(),
            details.join("\n")
        ))
    }
}

// --- get_income_vs_expense ---

pub struct IncomeVsExpense {
    ctx: QueryContext,
}

#[derive(Deserialize)]
struct IncomeVsExpenseArgs {
    #[serde(default = "default_period")]
    period: String,
}

#[async_trait]
impl Tool for IncomeVsExpense {
    fn name(&self) -> &str {
        "get_income_vs_expense"
    }

    fn description(&self) -> &str {
        "Compare total income vs expenses for a period. Shows net savings or deficit."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "period": period_schema(&["today", "week", "month", "year", "all"])
            }
        })
    }

    async fn execute(
        &self,
        _call_id: &str,
        arguments: serde_json::Value,
        _cancel: CancellationToken,
    ) -> ToolResult {
        let args: IncomeVsExpenseArgs = match parse_args(arguments) {
            Ok(args) => args,
            Err(error) => return error,
        };
        let range = period_range(&args.period, now_local());

        let summary = match self
            .ctx
            .storage
            .income_vs_expense(self.ctx.user_id, self.ctx.account_id, range)
            .await
        {
            Ok(summary) => summary,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let net = summary.total_income - summary.total_expenses;
        let verdict = if net >= 0.0 { "net savings" } else { "net deficit" };
        ToolResult::text(format!(
            "Income ${:.2} vs expenses ${:.2}: {verdict} of ${:.2} \
             (Based on {} transactions)",
            summary.total_income,
            summary.total_expenses,
            net.abs(),
            summary.total_transactions
        ))
    }
}

// --- get_spending_by_tag ---

pub struct SpendingByTag {
    ctx: QueryContext,
}

#[derive(Deserialize)]
struct SpendingByTagArgs {
    #[serde(default = "default_period")]
    period: String,
}

#[async_trait]
impl Tool for SpendingByTag {
    fn name(&self) -> &str {
        "get_spending_by_tag"
    }

    fn description(&self) -> &str {
        "Get spending broken down by tags. Useful for tracking spending across \
         custom categories like projects, people, or purposes."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "period": period_schema(&["week", "month", "year", "all"])
            }
        })
    }

    async fn execute(
        &self,
        _call_id: &str,
        arguments: serde_json::Value,
        _cancel: CancellationToken,
    ) -> ToolResult {
        let args: SpendingByTagArgs = match parse_args(arguments) {
            Ok(args) => args,
            Err(error) => return error,
        };
        let range = period_range(&args.period, now_local());

        let rows = match self
            .ctx
            .storage
            .spending_by_tag(self.ctx.user_id, self.ctx.account_id, range)
            .await
        {
            Ok(rows) => rows,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        if rows.is_empty() {
            return ToolResult::text("No tagged transactions found for the specified period.");
        }

        let total: f64 = rows.iter().map(|r| r.amount).sum();
        let details: Vec<String> = rows
            .iter()
            .map(|r| {
                let pct = if total > 0.0 { r.amount / total * 100.0 } else { 0.0 };
                format!(
                    "- {}: ${:.2} ({pct:.1}%, {} transactions)",
                    r.tag_name, r.amount, r.transaction_count
                )
            })
            .collect();

        ToolResult::text(format!(
            "Total tagged spending: ${total:.2}\n\n{}",
            details.join("\n")
        ))
    }
}
