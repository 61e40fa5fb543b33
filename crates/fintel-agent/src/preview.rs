//! Transaction previews and normalization of raw tool-call arguments.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Direction of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Expense,
    Income,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Expense => "expense",
            TransactionKind::Income => "income",
        }
    }
}

/// An unconfirmed, not-yet-persisted transaction candidate.
///
/// Produced by interpreting `create_transaction_preview` tool calls; the
/// surrounding system presents these for explicit user approval before any
/// persistent write happens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionPreview {
    pub amount: f64,
    pub description: String,
    pub category_id: i64,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub date: NaiveDate,
    #[serde(default)]
    pub tags: Vec<i64>,
}

/// Why a proposed preview was rejected
#[derive(Error, Debug, PartialEq)]
pub enum PreviewError {
    #[error("amount must be strictly positive, got {0}")]
    NonPositiveAmount(f64),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("description must not be empty")]
    EmptyDescription,
    #[error("invalid transaction type: {0}")]
    InvalidKind(String),
    #[error("invalid date: {0}")]
    InvalidDate(String),
}

/// Normalize raw `create_transaction_preview` arguments into a preview.
///
/// Returns `Ok(None)` when the date resolves to the future relative to
/// `today` — those are excluded from extraction, not errors. Invalid amounts
/// and missing fields are rejected outright, never coerced.
pub fn preview_from_args(
    args: &serde_json::Value,
    today: NaiveDate,
) -> Result<Option<TransactionPreview>, PreviewError> {
    let amount = args
        .get("amount")
        .and_then(|v| v.as_f64())
        .ok_or(PreviewError::MissingField("amount"))?;
    if amount <= 0.0 {
        return Err(PreviewError::NonPositiveAmount(amount));
    }

    let description = args
        .get("description")
        .and_then(|v| v.as_str())
        .ok_or(PreviewError::MissingField("description"))?
        .trim()
        .to_string();
    if description.is_empty() {
        return Err(PreviewError::EmptyDescription);
    }

    let category_id = args
        .get("category_id")
        .and_then(|v| v.as_i64())
        .ok_or(PreviewError::MissingField("category_id"))?;

    let kind = match args.get("transaction_type").and_then(|v| v.as_str()) {
        Some("expense") => TransactionKind::Expense,
        Some("income") => TransactionKind::Income,
        Some(other) => return Err(PreviewError::InvalidKind(other.to_string())),
        None => return Err(PreviewError::MissingField("transaction_type")),
    };

    let date = match args.get("transaction_date").and_then(|v| v.as_str()) {
        Some(raw) if !raw.is_empty() => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| PreviewError::InvalidDate(raw.to_string()))?,
        _ => today,
    };
    if date > today {
        tracing::debug!(%date, "dropping future-dated transaction preview");
        return Ok(None);
    }

    let tags = args
        .get("tag_ids")
        .and_then(|v| v.as_array())
        .map(|items| items.iter().filter_map(|v| v.as_i64()).collect())
        .unwrap_or_default();

    Ok(Some(TransactionPreview {
        amount,
        description,
        category_id,
        kind,
        date,
        tags,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 14).unwrap()
    }

    #[test]
    fn test_full_args() {
        let args = serde_json::json!({
            "amount": 50.0,
            "description": "groceries",
            "category_id": 3,
            "transaction_type": "expense",
            "tag_ids": [1, 2],
            "transaction_date": "2025-11-13"
        });
        let preview = preview_from_args(&args, today()).unwrap().unwrap();
        assert_eq!(preview.amount, 50.0);
        assert_eq!(preview.kind, TransactionKind::Expense);
        assert_eq!(preview.date, NaiveDate::from_ymd_opt(2025, 11, 13).unwrap());
        assert_eq!(preview.tags, vec![1, 2]);
    }

    #[test]
    fn test_date_defaults_to_today() {
        let args = serde_json::json!({
            "amount": 20.0,
            "description": "gas",
            "category_id": 1,
            "transaction_type": "expense"
        });
        let preview = preview_from_args(&args, today()).unwrap().unwrap();
        assert_eq!(preview.date, today());
        assert!(preview.tags.is_empty());
    }

    #[test]
    fn test_future_date_dropped_silently() {
        let args = serde_json::json!({
            "amount": 3000.0,
            "description": "salary",
            "category_id": 7,
            "transaction_type": "income",
            "transaction_date": "2025-12-14"
        });
        assert_eq!(preview_from_args(&args, today()).unwrap(), None);
    }

    #[test]
    fn test_non_positive_amount_rejected() {
        for amount in [0.0, -12.5] {
            let args = serde_json::json!({
                "amount": amount,
                "description": "refund",
                "category_id": 1,
                "transaction_type": "expense"
            });
            assert_eq!(
                preview_from_args(&args, today()),
                Err(PreviewError::NonPositiveAmount(amount))
            );
        }
    }

    #[test]
    fn test_empty_description_rejected() {
        let args = serde_json::json!({
            "amount": 5.0,
            "description": "   ",
            "category_id": 1,
            "transaction_type": "expense"
        });
        assert_eq!(
            preview_from_args(&args, today()),
            Err(PreviewError::EmptyDescription)
        );
    }

    #[test]
    fn test_invalid_kind_rejected() {
        let args = serde_json::json!({
            "amount": 5.0,
            "description": "coffee",
            "category_id": 1,
            "transaction_type": "transfer"
        });
        assert!(matches!(
            preview_from_args(&args, today()),
            Err(PreviewError::InvalidKind(_))
        ));
    }

    #[test]
    fn test_invalid_date_rejected() {
        let args = serde_json::json!({
            "amount": 5.0,
            "description": "coffee",
            "category_id": 1,
            "transaction_type": "expense",
            "transaction_date": "yesterday"
        });
        assert!(matches!(
            preview_from_args(&args, today()),
            Err(PreviewError::InvalidDate(_))
        ));
    }

    #[test]
    fn test_serializes_with_original_field_names() {
        let preview = TransactionPreview {
            amount: 9.5,
            description: "lunch".into(),
            category_id: 2,
            kind: TransactionKind::Expense,
            date: today(),
            tags: vec![],
        };
        let json = serde_json::to_value(&preview).unwrap();
        assert_eq!(json["type"], "expense");
        assert_eq!(json["date"], "2025-11-14");
        assert!(json["tags"].as_array().unwrap().is_empty());
    }
}
