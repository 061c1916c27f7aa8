//! Subtitle error types.

use std::path::PathBuf;

use super::types::TimeBasis;

/// Errors that can occur during subtitle operations.
#[derive(Debug, thiserror::Error)]
pub enum SubtitleError {
    /// Failed to read subtitle file.
    #[error("Failed to read file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write subtitle file.
    #[error("Failed to write file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A format name that is not in the registry.
    #[error("Unknown subtitle format '{0}'")]
    UnknownFormat(String),

    /// No registered format recognizes the file.
    #[error("Unrecognized subtitle format in '{0}'")]
    UnrecognizedContent(PathBuf),

    /// Parse error.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Encode requested for a document in the wrong basis.
    #[error("Format '{format}' cannot encode a {basis}-based document without retiming")]
    UnsupportedConversion {
        format: &'static str,
        basis: &'static str,
    },

    /// Retiming needs a frame rate and none (or an invalid one) was given.
    #[error("A valid frame rate is required for this conversion (got {0:?})")]
    MissingFrameRate(Option<f64>),

    /// Invalid conversion parameter.
    #[error("Invalid conversion parameter: {0}")]
    InvalidParameter(String),

    /// Unknown text encoding label.
    #[error("Unknown text encoding '{0}'")]
    UnknownEncoding(String),
}

/// Errors that can occur during subtitle parsing.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Invalid or malformed timing.
    #[error("Invalid timing at line {line}: '{value}'")]
    InvalidTime { line: usize, value: String },

    /// Line does not follow the format syntax.
    #[error("Invalid cue at line {line}: {message}")]
    InvalidCue { line: usize, message: String },

    /// Cue ends before it starts.
    #[error("Cue at line {line} ends before it starts ({start} > {end})")]
    InvertedCue { line: usize, start: u64, end: u64 },
}

/// Result type for subtitle operations.
pub type SubtitleResult<T> = Result<T, SubtitleError>;

impl SubtitleError {
    /// Create a read error.
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadError {
            path: path.into(),
            source,
        }
    }

    /// Create a write error.
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::WriteError {
            path: path.into(),
            source,
        }
    }

    /// Create an unsupported conversion error.
    pub fn unsupported(format: &'static str, basis: TimeBasis) -> Self {
        Self::UnsupportedConversion {
            format,
            basis: basis.name(),
        }
    }
}

impl ParseError {
    /// Create an invalid cue error.
    pub fn at_line(line: usize, message: impl Into<String>) -> Self {
        Self::InvalidCue {
            line,
            message: message.into(),
        }
    }

    /// Create an invalid time error.
    pub fn invalid_time(line: usize, value: impl Into<String>) -> Self {
        Self::InvalidTime {
            line,
            value: value.into(),
        }
    }
}
