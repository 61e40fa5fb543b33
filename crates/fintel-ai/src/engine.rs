//! The engine seam: one trait, two consumption modes.

use async_trait::async_trait;

use crate::error::Result;
use crate::stream::EngineEventStream;
use crate::types::{Context, Message, RequestOptions};

/// An opaque text/tool-call generator.
///
/// Given a conversation and a tool catalog it produces either free text, a
/// batch of proposed tool calls, or both. Implementations must support both
/// modes: `complete` returns the finished assistant message, `stream`
/// returns a lazy, single-pass, non-restartable sequence of partial
/// fragments.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Get the final decision in one shot.
    async fn complete(&self, context: &Context, options: &RequestOptions) -> Result<Message>;

    /// Get a live sequence of partial deltas as they are produced.
    async fn stream(&self, context: &Context, options: &RequestOptions)
    -> Result<EngineEventStream>;
}
