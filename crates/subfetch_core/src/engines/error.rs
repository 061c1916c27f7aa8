//! Engine error types.

use thiserror::Error;

use super::transport::TransportError;

/// Errors raised by download engines and the engine registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A configured engine name is not in the registry.
    #[error("Unknown engine '{0}'")]
    UnknownEngine(String),

    /// Search failed because the source could not be reached or answered
    /// with something unusable.
    #[error("{engine} is unavailable: {message}")]
    Unavailable { engine: String, message: String },

    /// Payload retrieval failed or the reference is no longer valid.
    #[error("{engine} failed to fetch subtitles: {message}")]
    FetchFailed { engine: String, message: String },
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Create an unavailable error.
    pub fn unavailable(engine: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            engine: engine.into(),
            message: message.into(),
        }
    }

    /// Create a fetch failed error.
    pub fn fetch_failed(engine: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FetchFailed {
            engine: engine.into(),
            message: message.into(),
        }
    }

    /// Search-side mapping of a transport failure.
    pub fn from_search(engine: &str, err: TransportError) -> Self {
        Self::unavailable(engine, err.to_string())
    }

    /// Fetch-side mapping of a transport failure.
    pub fn from_fetch(engine: &str, err: TransportError) -> Self {
        Self::fetch_failed(engine, err.to_string())
    }
}
