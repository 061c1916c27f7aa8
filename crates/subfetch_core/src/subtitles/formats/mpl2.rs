//! MPL2 (`[start][end]text`), deciseconds.
//!
//! Positions are stored as milliseconds; anything finer than 100 ms is
//! rounded away on encode.

use super::{is_blank, parse_delimited, split_pipe, SubtitleFormat};
use crate::subtitles::error::ParseError;
use crate::subtitles::types::{FormatDescriptor, SubtitleCue, SubtitleDocument, TimeBasis};

const DESCRIPTOR: FormatDescriptor = FormatDescriptor {
    name: "MPL2",
    basis: TimeBasis::Time,
    extension: "txt",
};

const MS_PER_UNIT: u64 = 100;

#[derive(Debug, Default, Clone, Copy)]
pub struct Mpl2;

impl SubtitleFormat for Mpl2 {
    fn descriptor(&self) -> FormatDescriptor {
        DESCRIPTOR
    }

    fn decode(&self, lines: &[String]) -> Result<SubtitleDocument, ParseError> {
        let mut cues = Vec::new();

        for (i, line) in lines.iter().enumerate() {
            if is_blank(line) {
                continue;
            }

            let (start, end, text) = parse_delimited(line, '[', ']')
                .ok_or_else(|| ParseError::at_line(i + 1, "expected '[start][end]text'"))?;

            if end < start {
                return Err(ParseError::InvertedCue {
                    line: i + 1,
                    start,
                    end,
                });
            }

            let (Some(start), Some(end)) = (start.checked_mul(MS_PER_UNIT), end.checked_mul(MS_PER_UNIT)) else {
                return Err(ParseError::invalid_time(i + 1, line.as_str()));
            };

            cues.push(SubtitleCue::new(start, end, split_pipe(text)));
        }

        Ok(SubtitleDocument::new(TimeBasis::Time, cues))
    }

    fn encode_cues(&self, document: &SubtitleDocument) -> Vec<String> {
        document
            .cues()
            .iter()
            .map(|cue| {
                format!(
                    "[{}][{}]{}",
                    to_units(cue.start),
                    to_units(cue.end),
                    cue.lines.join("|")
                )
            })
            .collect()
    }
}

fn to_units(ms: u64) -> u64 {
    ms.saturating_add(MS_PER_UNIT / 2) / MS_PER_UNIT
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(s: &str) -> Vec<String> {
        s.lines().map(str::to_string).collect()
    }

    #[test]
    fn decodes_to_milliseconds() {
        let doc = Mpl2.decode(&lines("[12][34]/Italic|plain")).unwrap();
        assert_eq!(doc.basis(), TimeBasis::Time);
        assert_eq!(doc.cues()[0].start, 1200);
        assert_eq!(doc.cues()[0].end, 3400);
        assert_eq!(doc.cues()[0].lines, vec!["/Italic", "plain"]);
    }

    #[test]
    fn encode_rounds_to_deciseconds() {
        let doc = SubtitleDocument::new(
            TimeBasis::Time,
            vec![SubtitleCue::new(1249, 1250, ["a"])],
        );
        assert_eq!(Mpl2.encode(&doc).unwrap(), vec!["[12][13]a"]);
    }

    #[test]
    fn encode_matches_source() {
        let source = lines("[0][25]one\n[30][41]two|three");
        let doc = Mpl2.decode(&source).unwrap();
        assert_eq!(Mpl2.encode(&doc).unwrap(), source);
    }

    #[test]
    fn out_of_range_position_is_rejected() {
        let source = lines("[999999999999999999][999999999999999999]x");
        assert!(matches!(Mpl2.decode(&source), Err(ParseError::InvalidTime { line: 1, .. })));
        assert!(!Mpl2.detect(&source));
    }

    #[test]
    fn does_not_claim_microdvd() {
        assert!(!Mpl2.detect(&lines("{1}{2}text")));
    }
}
