//! Execution trace: the closed union of items the orchestration loop
//! produces, and the cancellable source the streaming pipeline consumes.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::StreamExt;
use tokio_stream::Stream;

use crate::tool::ToolResult;

/// One unit of the loop's execution trace
#[derive(Debug)]
pub enum TraceEvent {
    /// Engine text fragment from the current reasoning phase
    TextDelta { content: String },
    /// The current reasoning phase completed
    PhaseEnd,
    /// An ACT batch is about to dispatch `size` concurrent invocations
    BatchStart { size: usize },
    /// One tool invocation started
    ToolStart {
        call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },
    /// One tool invocation finished
    ToolEnd {
        call_id: String,
        tool_name: String,
        result: ToolResult,
    },
    /// The run failed; always the last item of a failed trace
    Failed { error: fintel_ai::Error },
}

/// A lazy, single-pass stream of trace events
pub type TraceStream = Pin<Box<dyn Stream<Item = TraceEvent> + Send>>;

/// Cancellable, resumable producer of trace items.
///
/// `close()` releases the underlying stream and is idempotent; it also runs
/// on drop, so every exit path of a consumer releases the source. After
/// closing, `next()` returns `None`.
pub struct TraceSource {
    stream: Option<TraceStream>,
    closed: Arc<AtomicBool>,
    close_count: Arc<AtomicUsize>,
}

/// Observer handle for a [`TraceSource`], used to verify cleanup
#[derive(Clone)]
pub struct TraceHandle {
    closed: Arc<AtomicBool>,
    close_count: Arc<AtomicUsize>,
}

impl TraceHandle {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::Acquire)
    }
}

impl TraceSource {
    pub fn new(stream: TraceStream) -> Self {
        Self {
            stream: Some(stream),
            closed: Arc::new(AtomicBool::new(false)),
            close_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Pull the next trace item; `None` once exhausted or closed
    pub async fn next(&mut self) -> Option<TraceEvent> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        match self.stream.as_mut() {
            Some(stream) => stream.next().await,
            None => None,
        }
    }

    /// Release the underlying stream. Safe to call more than once.
    pub fn close(&mut self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.close_count.fetch_add(1, Ordering::Release);
            self.stream = None;
        }
    }

    /// Get an observer handle that outlives the source
    pub fn handle(&self) -> TraceHandle {
        TraceHandle {
            closed: Arc::clone(&self.closed),
            close_count: Arc::clone(&self.close_count),
        }
    }
}

impl Drop for TraceSource {
    fn drop(&mut self) {
        self.close();
    }
}
