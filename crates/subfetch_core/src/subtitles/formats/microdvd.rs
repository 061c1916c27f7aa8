//! MicroDVD (`{start}{end}text`), frame based.
//!
//! ```text
//! {100}{150}Hello|second line
//! ```

use super::{is_blank, parse_delimited, split_pipe, SubtitleFormat};
use crate::subtitles::error::ParseError;
use crate::subtitles::types::{FormatDescriptor, SubtitleCue, SubtitleDocument, TimeBasis};

const DESCRIPTOR: FormatDescriptor = FormatDescriptor {
    name: "mDVD",
    basis: TimeBasis::Frames,
    extension: "sub",
};

#[derive(Debug, Default, Clone, Copy)]
pub struct MicroDvd;

impl SubtitleFormat for MicroDvd {
    fn descriptor(&self) -> FormatDescriptor {
        DESCRIPTOR
    }

    fn decode(&self, lines: &[String]) -> Result<SubtitleDocument, ParseError> {
        let mut cues = Vec::new();

        for (i, line) in lines.iter().enumerate() {
            if is_blank(line) {
                continue;
            }

            let (start, end, text) = parse_delimited(line, '{', '}')
                .ok_or_else(|| ParseError::at_line(i + 1, "expected '{start}{end}text'"))?;

            if end < start {
                return Err(ParseError::InvertedCue {
                    line: i + 1,
                    start,
                    end,
                });
            }

            cues.push(SubtitleCue::new(start, end, split_pipe(text)));
        }

        Ok(SubtitleDocument::new(TimeBasis::Frames, cues))
    }

    fn encode_cues(&self, document: &SubtitleDocument) -> Vec<String> {
        document
            .cues()
            .iter()
            .map(|cue| format!("{{{}}}{{{}}}{}", cue.start, cue.end, cue.lines.join("|")))
            .collect()
    }
}
