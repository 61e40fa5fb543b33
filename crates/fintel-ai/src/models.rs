//! Model presets used by the fintel services.

use crate::types::Model;

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

/// Fast model used by the transaction-extraction agent. The large token
/// budget matters: one run may propose dozens of preview calls.
pub fn extraction_model() -> Model {
    Model {
        id: "claude-haiku-4-5-20251001".to_string(),
        base_url: ANTHROPIC_BASE_URL.to_string(),
        max_tokens: 4096,
    }
}

/// Stronger model backing the conversational assistant.
pub fn assistant_model() -> Model {
    Model {
        id: "claude-sonnet-4-5-20250929".to_string(),
        base_url: ANTHROPIC_BASE_URL.to_string(),
        max_tokens: 4096,
    }
}

/// Small model for the single-turn advice tool.
pub fn advice_model() -> Model {
    Model {
        id: "claude-haiku-4-5-20251001".to_string(),
        base_url: ANTHROPIC_BASE_URL.to_string(),
        max_tokens: 1024,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_budgets() {
        assert_eq!(extraction_model().max_tokens, 4096);
        assert_eq!(assistant_model().max_tokens, 4096);
        assert_eq!(advice_model().max_tokens, 1024);
        // extraction and advice share the fast model
        assert_eq!(extraction_model().id, advice_model().id);
    }
}
