//! fintel-ai: reasoning engine adapter for the fintel assistant
//!
//! Wraps the external LLM behind the [`Engine`] trait with two consumption
//! modes: atomic completion and an incremental event stream. The rest of the
//! system only ever sees [`Message`]s, [`EngineEvent`]s and typed errors.

pub mod engine;
pub mod error;
pub mod models;
pub mod providers;
pub mod stream;
pub mod types;

pub use engine::Engine;
pub use error::{Error, Result};
pub use stream::{EngineEvent, EngineEventStream, MessageBuilder};
pub use types::*;
