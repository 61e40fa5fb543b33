//! Shared test doubles: a scripted engine, canned storage and simple tools.

use std::sync::Arc;
use std::sync::atomic::AtomicU32;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use fintel_ai::{
    Content, Context, Engine, EngineEvent, EngineEventStream, Message, RequestOptions, StopReason,
    Usage,
};

use crate::context::{BudgetInfo, CategoryInfo, TagInfo, TransactionRecord};
use crate::preview::TransactionKind;
use crate::storage::{
    BudgetUtilization, CategorySpending, DateRange, IncomeExpenseSummary, Storage, StorageError,
    TagSpending, TopExpense, TrendBucket, TrendPoint,
};
use crate::tool::{BoxedTool, SpecialOutput, Tool, ToolResult};

/// Scripted engine: pops one canned response per call, in both atomic and
/// streaming form. Runs out of script gracefully with a "done" message.
pub struct MockEngine {
    responses: Mutex<Vec<Message>>,
    failures: Mutex<Vec<fintel_ai::Error>>,
    calls: Arc<AtomicU32>,
}

impl MockEngine {
    pub fn new(responses: Vec<Message>) -> Self {
        Self {
            responses: Mutex::new(responses),
            failures: Mutex::new(vec![]),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// An engine whose next call fails with the given error
    pub fn failing(error: fintel_ai::Error) -> Self {
        Self {
            responses: Mutex::new(vec![]),
            failures: Mutex::new(vec![error]),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn call_count(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }

    fn next(&self) -> fintel_ai::Result<Message> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let mut failures = self.failures.lock();
        if !failures.is_empty() {
            return Err(failures.remove(0));
        }
        let mut responses = self.responses.lock();
        if responses.is_empty() {
            Ok(Message::assistant(vec![Content::text("done")]))
        } else {
            Ok(responses.remove(0))
        }
    }
}

#[async_trait]
impl Engine for MockEngine {
    async fn complete(
        &self,
        _context: &Context,
        _options: &RequestOptions,
    ) -> fintel_ai::Result<Message> {
        self.next()
    }

    async fn stream(
        &self,
        _context: &Context,
        _options: &RequestOptions,
    ) -> fintel_ai::Result<EngineEventStream> {
        let message = self.next()?;
        let stream: EngineEventStream = Box::pin(async_stream::stream! {
            yield EngineEvent::Start {
                message: Message::assistant_empty(),
            };
            for (index, block) in message.content().iter().enumerate() {
                if let Content::Text { text } = block {
                    yield EngineEvent::TextDelta {
                        content_index: index,
                        delta: text.clone(),
                    };
                }
            }
            let stop_reason = if message.tool_calls().is_empty() {
                StopReason::Stop
            } else {
                StopReason::ToolUse
            };
            yield EngineEvent::Done {
                message,
                stop_reason,
                usage: Usage::default(),
            };
        });
        Ok(stream)
    }
}

struct FnTool {
    tool_name: String,
    delay_ms: u64,
    result: ToolResult,
    executed: Arc<AtomicU32>,
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.tool_name
    }

    fn description(&self) -> &str {
        "test tool"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(
        &self,
        _call_id: &str,
        _arguments: serde_json::Value,
        cancel: CancellationToken,
    ) -> ToolResult {
        if self.delay_ms > 0 {
            tokio::select! {
                _ = cancel.cancelled() => return ToolResult::error("cancelled"),
                _ = tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)) => {}
            }
        }
        self.executed
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.result.clone()
    }
}

/// A tool that succeeds immediately; returns the tool and its call counter
pub fn noop_tool(name: &str) -> (BoxedTool, Arc<AtomicU32>) {
    let executed = Arc::new(AtomicU32::new(0));
    let tool = FnTool {
        tool_name: name.to_string(),
        delay_ms: 0,
        result: ToolResult::text("ok"),
        executed: Arc::clone(&executed),
    };
    (Arc::new(tool), executed)
}

/// A tool that sleeps before succeeding
pub fn slow_tool(name: &str, delay_ms: u64) -> (BoxedTool, Arc<AtomicU32>) {
    let executed = Arc::new(AtomicU32::new(0));
    let tool = FnTool {
        tool_name: name.to_string(),
        delay_ms,
        result: ToolResult::text("ok"),
        executed: Arc::clone(&executed),
    };
    (Arc::new(tool), executed)
}

/// A tool whose result carries a structured payload
pub fn special_tool(name: &str, special: SpecialOutput) -> (BoxedTool, Arc<AtomicU32>) {
    let executed = Arc::new(AtomicU32::new(0));
    let tool = FnTool {
        tool_name: name.to_string(),
        delay_ms: 0,
        result: ToolResult::text("recorded").with_special(special),
        executed: Arc::clone(&executed),
    };
    (Arc::new(tool), executed)
}

/// Canned storage with a small, realistic dataset
#[derive(Default)]
pub struct MockStorage {
    pub fail: bool,
}

impl MockStorage {
    pub fn failing() -> Self {
        Self { fail: true }
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.fail {
            Err(StorageError::Unavailable("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid test date")
}

#[async_trait]
impl Storage for MockStorage {
    async fn categories(&self, _user_id: i64) -> Result<Vec<CategoryInfo>, StorageError> {
        self.check()?;
        Ok(vec![
            CategoryInfo {
                id: 1,
                name: "Groceries".into(),
                icon: Some("cart".into()),
                color: Some("#4caf50".into()),
            },
            CategoryInfo {
                id: 2,
                name: "Transport".into(),
                icon: Some("car".into()),
                color: Some("#2196f3".into()),
            },
            CategoryInfo {
                id: 3,
                name: "Salary".into(),
                icon: None,
                color: None,
            },
        ])
    }

    async fn tags(&self, _user_id: i64) -> Result<Vec<TagInfo>, StorageError> {
        self.check()?;
        Ok(vec![
            TagInfo {
                id: 10,
                name: "work".into(),
                color: Some("#9c27b0".into()),
            },
            TagInfo {
                id: 11,
                name: "family".into(),
                color: None,
            },
        ])
    }

    async fn budgets(&self, _user_id: i64) -> Result<Vec<BudgetInfo>, StorageError> {
        self.check()?;
        Ok(vec![BudgetInfo {
            id: 100,
            category_id: 1,
            amount: 400.0,
            notes: Some("monthly food".into()),
        }])
    }

    async fn recent_transactions(
        &self,
        _user_id: i64,
        _account_id: i64,
        _since: NaiveDate,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, StorageError> {
        self.check()?;
        let rows = vec![
            TransactionRecord {
                id: 1000,
                amount: 52.30,
                description: "Weekly groceries".into(),
                category_id: 1,
                kind: TransactionKind::Expense,
                date: date(2026, 8, 25),
            },
            TransactionRecord {
                id: 1001,
                amount: 2500.0,
                description: "August salary".into(),
                category_id: 3,
                kind: TransactionKind::Income,
                date: date(2026, 8, 24),
            },
        ];
        Ok(rows.into_iter().take(limit).collect())
    }

    async fn account_balance(
        &self,
        _user_id: i64,
        _account_id: i64,
    ) -> Result<f64, StorageError> {
        self.check()?;
        Ok(3120.55)
    }

    async fn spending_by_category(
        &self,
        _user_id: i64,
        _account_id: i64,
        _range: DateRange,
        _kind: Option<TransactionKind>,
    ) -> Result<Vec<CategorySpending>, StorageError> {
        self.check()?;
        Ok(vec![
            CategorySpending {
                category_name: "Groceries".into(),
                amount: 210.40,
                transaction_count: 6,
            },
            CategorySpending {
                category_name: "Transport".into(),
                amount: 84.00,
                transaction_count: 4,
            },
        ])
    }

    async fn spending_over_time(
        &self,
        _user_id: i64,
        _account_id: i64,
        _range: DateRange,
        _bucket: TrendBucket,
    ) -> Result<Vec<TrendPoint>, StorageError> {
        self.check()?;
        Ok(vec![
            TrendPoint {
                period: "2026-07".into(),
                income: 2500.0,
                expenses: 1820.0,
            },
            TrendPoint {
                period: "2026-08".into(),
                income: 2500.0,
                expenses: 1644.3,
            },
        ])
    }

    async fn budget_utilization(
        &self,
        _user_id: i64,
        _month: u32,
        _year: i32,
    ) -> Result<Vec<BudgetUtilization>, StorageError> {
        self.check()?;
        Ok(vec![BudgetUtilization {
            category_name: "Groceries".into(),
            budget_amount: 400.0,
            spent_amount: 210.40,
        }])
    }

    async fn top_expenses(
        &self,
        _user_id: i64,
        _account_id: i64,
        _range: DateRange,
        limit: usize,
    ) -> Result<Vec<TopExpense>, StorageError> {
        self.check()?;
        let rows = vec![
            TopExpense {
                description: "Car service".into(),
                amount: 310.0,
                category: "Transport".into(),
                date: date(2026, 8, 12),
                tags: vec!["family".into()],
            },
            TopExpense {
                description: "Weekly groceries".into(),
                amount: 52.30,
                category: "Groceries".into(),
                date: date(2026, 8, 25),
                tags: vec![],
            },
        ];
        Ok(rows.into_iter().take(limit).collect())
    }

    async fn income_vs_expense(
        &self,
        _user_id: i64,
        _account_id: i64,
        _range: DateRange,
    ) -> Result<IncomeExpenseSummary, StorageError> {
        self.check()?;
        Ok(IncomeExpenseSummary {
            total_income: 2500.0,
            total_expenses: 1644.3,
            total_transactions: 14,
        })
    }

    async fn spending_by_tag(
        &self,
        _user_id: i64,
        _account_id: i64,
        _range: DateRange,
    ) -> Result<Vec<TagSpending>, StorageError> {
        self.check()?;
        Ok(vec![TagSpending {
            tag_name: "family".into(),
            amount: 362.30,
            transaction_count: 3,
        }])
    }
}
