//! Domain tools exposed to the reasoning engine.

pub mod advice;
pub mod analytics;
pub mod currency;
pub mod listing;
pub mod preview;
pub mod transactions;

use std::sync::Arc;

use fintel_ai::Engine;

use crate::context::UserContext;
use crate::extract::Extractor;
use crate::storage::Storage;
use crate::tool::ToolRegistry;

/// Build the full assistant catalog: analytics, listings, transaction
/// creation, advice and currency conversion.
pub fn assistant_registry(
    storage: Arc<dyn Storage>,
    extractor: Arc<Extractor>,
    advice_engine: Arc<dyn Engine>,
    user_id: i64,
    account_id: i64,
    user_context: &UserContext,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    for tool in analytics::all(Arc::clone(&storage), user_id, account_id) {
        registry.register(tool);
    }
    for tool in listing::all(Arc::clone(&storage), user_id) {
        registry.register(tool);
    }
    registry.register(Arc::new(transactions::CreateTransactions::new(
        storage, extractor, user_id,
    )));
    registry.register(Arc::new(advice::GetFinancialAdvice::new(
        advice_engine,
        user_context.clone(),
    )));
    registry.register(Arc::new(currency::ConvertCurrency::default()));

    registry
}
