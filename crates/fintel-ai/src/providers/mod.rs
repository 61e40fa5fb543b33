//! Engine implementations

pub mod anthropic;

pub use anthropic::AnthropicEngine;
