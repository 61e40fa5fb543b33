//! Currency conversion through a pluggable rate source.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::tool::{Tool, ToolResult};

/// Supplies exchange rates. The built-in [`StaticRates`] table is an
/// approximation, which the tool contract allows; a live implementation
/// can be swapped in without touching the tool.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Units of `to` per one unit of `from`, `None` for unknown currencies
    async fn rate(&self, from: &str, to: &str) -> Option<f64>;
}

/// Fixed table of USD-pivot rates
pub struct StaticRates;

/// USD value of one unit of each supported currency
const USD_PER_UNIT: &[(&str, f64)] = &[
    ("USD", 1.0),
    ("EUR", 1.09),
    ("GBP", 1.27),
    ("CHF", 1.13),
    ("CAD", 0.73),
    ("AUD", 0.66),
    ("JPY", 0.0067),
    ("PLN", 0.25),
    ("SEK", 0.095),
    ("NOK", 0.094),
];

#[async_trait]
impl RateSource for StaticRates {
    async fn rate(&self, from: &str, to: &str) -> Option<f64> {
        let usd_from = USD_PER_UNIT
            .iter()
            .find(|(code, _)| *code == from)
            .map(|(_, v)| *v)?;
        let usd_to = USD_PER_UNIT
            .iter()
            .find(|(code, _)| *code == to)
            .map(|(_, v)| *v)?;
        Some(usd_from / usd_to)
    }
}

/// Convert an amount between currencies
pub struct ConvertCurrency {
    rates: Arc<dyn RateSource>,
}

impl ConvertCurrency {
    pub fn new(rates: Arc<dyn RateSource>) -> Self {
        Self { rates }
    }
}

impl Default for ConvertCurrency {
    fn default() -> Self {
        Self::new(Arc::new(StaticRates))
    }
}

#[async_trait]
impl Tool for ConvertCurrency {
    fn name(&self) -> &str {
        "convert_currency"
    }

    fn description(&self) -> &str {
        "Convert an amount from one currency to another using current exchange rates. \
         Returns the converted amount."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "amount": {
                    "type": "number",
                    "exclusiveMinimum": 0,
                    "description": "Amount to convert"
                },
                "from_currency": {
                    "type": "string",
                    "minLength": 3,
                    "maxLength": 3,
                    "description": "Source currency code (e.g., EUR, USD)"
                },
                "to_currency": {
                    "type": "string",
                    "minLength": 3,
                    "maxLength": 3,
                    "description": "Target currency code (e.g., USD, EUR)"
                }
            },
            "required": ["amount", "from_currency", "to_currency"]
        })
    }

    async fn execute(
        &self,
        _call_id: &str,
        arguments: serde_json::Value,
        _cancel: CancellationToken,
    ) -> ToolResult {
        let amount = arguments.get("amount").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let from = arguments
            .get("from_currency")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_uppercase();
        let to = arguments
            .get("to_currency")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_uppercase();

        match self.rates.rate(&from, &to).await {
            Some(rate) => {
                let converted = amount * rate;
                ToolResult::text(format!("{amount:.2} {from} = {converted:.2} {to}"))
            }
            None => ToolResult::error(format!(
                "Unsupported currency pair: {from} -> {to}"
            )),
        }
    }
}
