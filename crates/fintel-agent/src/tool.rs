//! Tool trait, results and the schema-validating registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::preview::TransactionPreview;

/// Structured payloads that the streaming pipeline re-classifies into
/// first-class events instead of generic tool output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpecialOutput {
    /// A batch of extracted transaction previews awaiting confirmation
    TransactionPreviews {
        transactions: Vec<TransactionPreview>,
        count: usize,
        message: String,
    },
}

/// Result of a tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Text returned to the engine
    pub content: String,
    /// Whether the execution resulted in an error
    pub is_error: bool,
    /// Optional structured payload for the streaming pipeline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special: Option<SpecialOutput>,
}

impl ToolResult {
    /// Create a successful text result
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: text.into(),
            is_error: false,
            special: None,
        }
    }

    /// Create an error result
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: message.into(),
            is_error: true,
            special: None,
        }
    }

    /// Attach a special payload to the result
    pub fn with_special(mut self, special: SpecialOutput) -> Self {
        self.special = Some(special);
        self
    }
}

/// Trait for callables exposed to the reasoning engine
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (used in API calls)
    fn name(&self) -> &str;

    /// Tool description for the engine
    fn description(&self) -> &str;

    /// JSON Schema for arguments
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with validated arguments
    async fn execute(
        &self,
        call_id: &str,
        arguments: serde_json::Value,
        cancel: CancellationToken,
    ) -> ToolResult;
}

/// Type alias for a boxed tool
pub type BoxedTool = Arc<dyn Tool>;

/// A fixed catalog of tools with pre-compiled argument validators.
///
/// Arguments are checked against each tool's declared schema before the
/// tool runs, so invalid enumerated parameters never reach storage.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<BoxedTool>,
    validators: HashMap<String, Arc<jsonschema::Validator>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool, compiling its schema validator
    pub fn register(&mut self, tool: BoxedTool) {
        let schema = tool.parameters_schema();
        match jsonschema::validator_for(&schema) {
            Ok(validator) => {
                self.validators
                    .insert(tool.name().to_string(), Arc::new(validator));
            }
            Err(e) => {
                tracing::warn!(
                    "Invalid parameter schema for tool '{}', skipping validation: {}",
                    tool.name(),
                    e
                );
            }
        }
        self.tools.push(tool);
    }

    /// Tool definitions as advertised to the engine
    pub fn api_specs(&self) -> Vec<fintel_ai::ToolSpec> {
        self.tools
            .iter()
            .map(|t| {
                fintel_ai::ToolSpec::new(t.name(), t.description(), t.parameters_schema())
            })
            .collect()
    }

    /// Registered tool names
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Validate and execute one invocation.
    ///
    /// All failure modes are contained: unknown tool, invalid arguments and
    /// tool-level failures come back as error results, never panics.
    pub async fn invoke(
        &self,
        call_id: &str,
        name: &str,
        arguments: serde_json::Value,
        cancel: CancellationToken,
    ) -> ToolResult {
        let Some(tool) = self.tools.iter().find(|t| t.name() == name) else {
            return ToolResult::error(format!("Tool not found: {}", name));
        };

        if let Some(validator) = self.validators.get(name) {
            if let Some(err) = validation_errors(&arguments, validator) {
                return ToolResult::error(err);
            }
        }

        tool.execute(call_id, arguments, cancel).await
    }
}

/// Collect validation errors into one message, `None` when valid.
fn validation_errors(
    args: &serde_json::Value,
    validator: &jsonschema::Validator,
) -> Option<String> {
    let errors: Vec<String> = validator
        .iter_errors(args)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{}: {}", path, e)
            }
        })
        .collect();

    if errors.is_empty() {
        None
    } else {
        Some(format!(
            "Tool argument validation failed:\n{}",
            errors.join("\n")
        ))
    }
}
