//! Tracing setup for binaries embedding the assistant.

use thiserror::Error;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "fintel=info";

/// Failure to install the global subscriber
#[derive(Debug, Error)]
#[error("failed to install tracing subscriber: {0}")]
pub struct InitError(String);

/// Install the global fmt subscriber.
///
/// `filter` overrides the default directive; `RUST_LOG` overrides both.
/// The subscriber lives for the rest of the process, so there is no
/// teardown handle. Calling this twice returns an error instead of
/// panicking, so tests and embedding applications can race without
/// consequence.
pub fn init(filter: Option<&str>) -> Result<(), InitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter.unwrap_or(DEFAULT_FILTER)));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .map_err(|e| InitError(e.to_string()))
}
