//! fintel-agent: tool orchestration and event streaming
//!
//! The reasoning/acting loop behind the fintel assistant: a tool registry
//! with schema-validated dispatch, a bounded orchestration loop over the
//! [`fintel_ai::Engine`] adapter, a streaming pipeline that turns the loop's
//! execution trace into client-facing events, and the natural-language
//! transaction-extraction service built on top.

pub mod agent;
pub mod context;
pub mod error;
pub mod events;
pub mod extract;
pub mod observability;
pub mod preview;
pub mod schemas;
pub mod service;
pub mod storage;
pub mod tool;
pub mod tools;
pub mod trace;

#[cfg(test)]
pub(crate) mod test_support;

pub use agent::{Agent, AgentConfig, LoopMode};
pub use context::UserContext;
pub use error::{Error, Result};
pub use events::StreamEvent;
pub use extract::Extractor;
pub use preview::{TransactionKind, TransactionPreview};
pub use service::Assistant;
pub use storage::{Storage, StorageError};
pub use tool::{BoxedTool, SpecialOutput, Tool, ToolRegistry, ToolResult};
pub use trace::{TraceEvent, TraceSource};
