//! Subtitle format plugins.
//!
//! Each plugin knows one line-oriented syntax. Decoding is strict: a line
//! that does not follow the syntax is a [`ParseError`], so `detect` (which
//! is "decodes, and has at least one cue") never claims a file the plugin
//! cannot read back.

mod microdvd;
mod mpl2;
mod subrip;
mod tmplayer;

pub use microdvd::MicroDvd;
pub use mpl2::Mpl2;
pub use subrip::{format_srt_time, parse_srt_time, SubRip};
pub use tmplayer::TmPlayer;

use crate::subtitles::error::{ParseError, SubtitleError, SubtitleResult};
use crate::subtitles::types::{FormatDescriptor, SubtitleDocument, TimeBasis};

/// A subtitle format plugin.
pub trait SubtitleFormat: Send + Sync {
    /// Static description (name, basis, extension).
    fn descriptor(&self) -> FormatDescriptor;

    /// Parse lines into a document.
    ///
    /// A file without any cue lines decodes to an empty document.
    fn decode(&self, lines: &[String]) -> Result<SubtitleDocument, ParseError>;

    /// Render a document already in this format's basis.
    fn encode_cues(&self, document: &SubtitleDocument) -> Vec<String>;

    fn format_name(&self) -> &'static str {
        self.descriptor().name
    }

    fn is_time_based(&self) -> bool {
        self.descriptor().is_time_based()
    }

    fn default_extension(&self) -> &'static str {
        self.descriptor().extension
    }

    fn basis(&self) -> TimeBasis {
        self.descriptor().basis
    }

    /// Whether the lines are a non-empty file in this format.
    fn detect(&self, lines: &[String]) -> bool {
        self.decode(lines).map(|doc| !doc.is_empty()).unwrap_or(false)
    }

    /// Render a document, refusing one whose basis does not match.
    fn encode(&self, document: &SubtitleDocument) -> SubtitleResult<Vec<String>> {
        if document.basis() != self.basis() {
            return Err(SubtitleError::unsupported(
                self.format_name(),
                document.basis(),
            ));
        }
        Ok(self.encode_cues(document))
    }
}

/// Parse `<open>digits<close><open>digits<close>text`.
///
/// Shared by the bracket formats (`{1}{2}` MicroDVD, `[1][2]` MPL2).
fn parse_delimited(line: &str, open: char, close: char) -> Option<(u64, u64, &str)> {
    let (start, rest) = take_delimited_number(line, open, close)?;
    let (end, text) = take_delimited_number(rest, open, close)?;
    Some((start, end, text))
}

fn take_delimited_number(s: &str, open: char, close: char) -> Option<(u64, &str)> {
    let rest = s.strip_prefix(open)?;
    let (digits, rest) = rest.split_once(close)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((digits.parse().ok()?, rest))
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Split `|`-separated text into lines.
fn split_pipe(text: &str) -> Vec<String> {
    text.split('|').map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimited_parses_both_bracket_styles() {
        assert_eq!(parse_delimited("{10}{20}Hi", '{', '}'), Some((10, 20, "Hi")));
        assert_eq!(parse_delimited("[5][15]a|b", '[', ']'), Some((5, 15, "a|b")));
        assert_eq!(parse_delimited("{10}{}Hi", '{', '}'), None);
        assert_eq!(parse_delimited(" {10}{20}Hi", '{', '}'), None);
        assert_eq!(parse_delimited("{1x}{20}Hi", '{', '}'), None);
    }

    #[test]
    fn split_pipe_keeps_empty_parts() {
        assert_eq!(split_pipe("a||b"), vec!["a", "", "b"]);
        assert_eq!(split_pipe(""), vec![""]);
    }
}
