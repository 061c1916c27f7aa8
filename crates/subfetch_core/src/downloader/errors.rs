//! Error types for the download pipeline.
//!
//! Payloads are plain strings so the session can keep the last failure
//! (`Clone`) and hand out its message through `error()`.

use thiserror::Error;

use crate::engines::EngineError;

/// A failure of one pipeline operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DownloadError {
    /// A requested engine name is not in the registry.
    #[error("Unknown engine '{0}'")]
    UnknownEngine(String),

    /// One engine could not be searched.
    #[error("{engine} is unavailable: {message}")]
    EngineUnavailable { engine: String, message: String },

    /// Payload retrieval failed.
    #[error("{engine} failed to fetch subtitles: {message}")]
    FetchFailed { engine: String, message: String },

    /// Every search completed but none produced a candidate.
    #[error("No subtitles found for '{0}'")]
    NoSubtitlesFound(String),

    /// The session has no engines to search with.
    #[error("No download engines are enabled")]
    NoEngines,

    /// A candidate index outside the list.
    #[error("Candidate index {index} is out of range (list has {len})")]
    InvalidIndex { index: usize, len: usize },

    /// An operation was called before the step it depends on.
    #[error("Cannot {operation}: {message}")]
    InvalidState { operation: String, message: String },

    /// The payload does not hash to the checksum the engine announced.
    #[error("Checksum mismatch: expected {algorithm} {expected}")]
    VerifyFailed { algorithm: String, expected: String },

    /// Archive extraction failed or found no usable subtitle.
    #[error("Unpacking failed: {0}")]
    UnpackFailed(String),

    /// The downloaded file is empty or not a recognizable subtitle.
    #[error("Subtitles do not match: {0}")]
    NotMatched(String),

    /// Conversion of the matched subtitle failed.
    #[error("Post-processing failed: {0}")]
    PostProcessFailed(String),

    /// The movie's folder cannot be written.
    #[error("Cannot write to '{0}'")]
    NotWritable(String),

    /// File I/O error with the operation that caused it.
    #[error("I/O error in {operation}: {message}")]
    Io { operation: String, message: String },
}

/// Result type for download operations.
pub type DownloadResult<T> = Result<T, DownloadError>;

impl DownloadError {
    /// Create an invalid state error.
    pub fn invalid_state(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidState {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create an I/O error.
    pub fn io(operation: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Io {
            operation: operation.into(),
            message: err.to_string(),
        }
    }

    /// Whether this failure came from a remote engine.
    pub fn is_engine_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownEngine(_) | Self::EngineUnavailable { .. } | Self::FetchFailed { .. }
        )
    }
}

impl From<EngineError> for DownloadError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::UnknownEngine(name) => Self::UnknownEngine(name),
            EngineError::Unavailable { engine, message } => Self::EngineUnavailable { engine, message },
            EngineError::FetchFailed { engine, message } => Self::FetchFailed { engine, message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_keep_their_kind() {
        let err: DownloadError = EngineError::unavailable("Napisy24", "timeout").into();
        assert_eq!(err.to_string(), "Napisy24 is unavailable: timeout");
        assert!(err.is_engine_error());

        let err: DownloadError = EngineError::UnknownEngine("Foo".into()).into();
        assert_eq!(err, DownloadError::UnknownEngine("Foo".into()));
    }

    #[test]
    fn no_subtitles_is_not_an_engine_error() {
        assert!(!DownloadError::NoSubtitlesFound("movie.avi".into()).is_engine_error());
    }
}
