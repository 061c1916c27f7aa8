//! Subtitle text decoding and encoding.
//!
//! Subtitle files in the wild are rarely UTF-8: Polish releases are
//! usually windows-1250, others ISO-8859-x. Files are read as bytes and
//! the detected encoding, BOM and line ending are carried along so that a
//! rewrite produces the same bytes for untouched cues.

use encoding_rs::{Encoding, UTF_8};

use super::error::{SubtitleError, SubtitleResult};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Line terminator used by a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::CrLf => "\r\n",
        }
    }
}

/// Decoded subtitle file content.
#[derive(Debug, Clone)]
pub struct SubtitleText {
    /// Lines without terminators.
    pub lines: Vec<String>,
    /// Encoding the bytes were decoded with.
    pub encoding: &'static Encoding,
    /// Line terminator found in the source.
    pub line_ending: LineEnding,
    /// Whether the source started with a byte order mark.
    pub bom: bool,
}

impl SubtitleText {
    /// UTF-8, LF, no BOM.
    pub fn from_lines(lines: Vec<String>) -> Self {
        Self {
            lines,
            encoding: UTF_8,
            line_ending: LineEnding::Lf,
            bom: false,
        }
    }

    /// Same encoding settings, different lines.
    pub fn with_lines(&self, lines: Vec<String>) -> Self {
        Self {
            lines,
            encoding: self.encoding,
            line_ending: self.line_ending,
            bom: self.bom,
        }
    }

    /// Decode raw bytes.
    ///
    /// A BOM wins; otherwise valid UTF-8 is taken as UTF-8 and anything
    /// else is decoded with `fallback`.
    pub fn decode(bytes: &[u8], fallback: &'static Encoding) -> Self {
        let (text, encoding, bom) = match Encoding::for_bom(bytes) {
            Some((encoding, bom_len)) => {
                let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
                (text.into_owned(), encoding, true)
            }
            None => match std::str::from_utf8(bytes) {
                Ok(text) => (text.to_string(), UTF_8, false),
                Err(_) => {
                    let (text, _) = fallback.decode_without_bom_handling(bytes);
                    (text.into_owned(), fallback, false)
                }
            },
        };

        let line_ending = if text.contains("\r\n") {
            LineEnding::CrLf
        } else {
            LineEnding::Lf
        };

        Self {
            lines: text.lines().map(str::to_string).collect(),
            encoding,
            line_ending,
            bom,
        }
    }

    /// Encode back to bytes. Every line, including the last, is terminated.
    ///
    /// UTF-16 sources are written as UTF-8 (the `encoding_rs` output encoding).
    pub fn encode(&self) -> Vec<u8> {
        let ending = self.line_ending.as_str();
        let mut joined = String::new();
        for line in &self.lines {
            joined.push_str(line);
            joined.push_str(ending);
        }

        let (bytes, used, _) = self.encoding.encode(&joined);
        let mut out = Vec::with_capacity(bytes.len() + UTF8_BOM.len());
        if self.bom && used == UTF_8 {
            out.extend_from_slice(UTF8_BOM);
        }
        out.extend_from_slice(&bytes);
        out
    }
}

/// Look up an encoding by WHATWG label (`utf-8`, `windows-1250`, `iso-8859-2`, ...).
pub fn encoding_for_label(label: &str) -> SubtitleResult<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| SubtitleError::UnknownEncoding(label.to_string()))
}
