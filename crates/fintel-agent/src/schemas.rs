//! Request/response schemas for the transport layer.

use serde::{Deserialize, Serialize};

use crate::preview::TransactionPreview;

/// Inbound chat request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub account_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

/// Synchronous chat response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: String,
    pub conversation_id: String,
}

/// Inbound transaction-extraction request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractRequest {
    pub text: String,
    pub account_id: i64,
}

/// Atomic extraction response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractResponse {
    pub transactions: Vec<TransactionPreview>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_omits_missing_conversation_id() {
        let request = ChatRequest {
            message: "what did I spend this month?".into(),
            account_id: 7,
            conversation_id: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("conversation_id").is_none());

        let parsed: ChatRequest = serde_json::from_value(serde_json::json!({
            "message": "hi",
            "account_id": 7,
            "conversation_id": "abc-123"
        }))
        .unwrap();
        assert_eq!(parsed.conversation_id.as_deref(), Some("abc-123"));
    }
}
