//! TMPlayer (`H:MM:SS:text` or `H:MM:SS=text`).
//!
//! The format carries only a start second. On decode each cue ends at the
//! next cue's start, but never later than [`DEFAULT_DURATION_MS`] after its
//! own start. On encode starts are rounded to whole seconds and ends dropped.

use super::{is_blank, split_pipe, SubtitleFormat};
use crate::subtitles::error::ParseError;
use crate::subtitles::types::{FormatDescriptor, SubtitleCue, SubtitleDocument, TimeBasis};

const DESCRIPTOR: FormatDescriptor = FormatDescriptor {
    name: "TMPlayer",
    basis: TimeBasis::Time,
    extension: "txt",
};

/// Longest display time given to a cue on decode.
pub const DEFAULT_DURATION_MS: u64 = 3000;

#[derive(Debug, Default, Clone, Copy)]
pub struct TmPlayer;

impl SubtitleFormat for TmPlayer {
    fn descriptor(&self) -> FormatDescriptor {
        DESCRIPTOR
    }

    fn decode(&self, lines: &[String]) -> Result<SubtitleDocument, ParseError> {
        let mut starts = Vec::new();

        for (i, line) in lines.iter().enumerate() {
            if is_blank(line) {
                continue;
            }

            let (seconds, text) = parse_tmplayer_line(line)
                .ok_or_else(|| ParseError::at_line(i + 1, "expected 'H:MM:SS:text'"))?;
            starts.push((seconds * 1000, split_pipe(text)));
        }

        starts.sort_by_key(|(start, _)| *start);

        let next_starts: Vec<Option<u64>> = starts
            .iter()
            .skip(1)
            .map(|(start, _)| Some(*start))
            .chain(std::iter::once(None))
            .collect();

        let cues = starts
            .into_iter()
            .zip(next_starts)
            .map(|((start, text), next)| {
                let cap = start.saturating_add(DEFAULT_DURATION_MS);
                let end = next.map_or(cap, |next| next.min(cap));
                SubtitleCue::new(start, end, text)
            })
            .collect();

        Ok(SubtitleDocument::new(TimeBasis::Time, cues))
    }

    fn encode_cues(&self, document: &SubtitleDocument) -> Vec<String> {
        document
            .cues()
            .iter()
            .map(|cue| {
                let total = cue.start.saturating_add(500) / 1000;
                format!(
                    "{:02}:{:02}:{:02}:{}",
                    total / 3600,
                    (total / 60) % 60,
                    total % 60,
                    cue.lines.join("|")
                )
            })
            .collect()
    }
}

/// Split a TMPlayer line into (start seconds, text).
fn parse_tmplayer_line(line: &str) -> Option<(u64, &str)> {
    let (hours, rest) = line.split_once(':')?;
    let (minutes, rest) = rest.split_once(':')?;

    let seconds = rest.get(..2)?;
    let text = rest.get(2..)?;
    let text = text.strip_prefix(':').or_else(|| text.strip_prefix('='))?;

    if !(1..=2).contains(&hours.len()) || minutes.len() != 2 {
        return None;
    }
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(hours) || !all_digits(minutes) || !all_digits(seconds) {
        return None;
    }

    let (h, m, s): (u64, u64, u64) = (hours.parse().ok()?, minutes.parse().ok()?, seconds.parse().ok()?);
    if m >= 60 || s >= 60 {
        return None;
    }

    Some((h * 3600 + m * 60 + s, text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(s: &str) -> Vec<String> {
        s.lines().map(str::to_string).collect()
    }

    #[test]
    fn parses_both_separators() {
        assert_eq!(parse_tmplayer_line("00:01:02:Hi"), Some((62, "Hi")));
        assert_eq!(parse_tmplayer_line("1:00:00=Hi"), Some((3600, "Hi")));
        assert_eq!(parse_tmplayer_line("00:00:01,000 --> 00:00:02,000"), None);
        assert_eq!(parse_tmplayer_line("00:0:01:x"), None);
    }

    #[test]
    fn ends_are_derived_from_next_start() {
        let doc = TmPlayer
            .decode(&lines("00:00:01:One\n00:00:02:Two\n00:00:30:Three|lines"))
            .unwrap();

        assert_eq!(doc.len(), 3);
        assert_eq!((doc.cues()[0].start, doc.cues()[0].end), (1000, 2000));
        assert_eq!((doc.cues()[1].start, doc.cues()[1].end), (2000, 5000));
        assert_eq!((doc.cues()[2].start, doc.cues()[2].end), (30_000, 33_000));
        assert_eq!(doc.cues()[2].lines, vec!["Three", "lines"]);
    }

    #[test]
    fn encode_drops_end_and_rounds_start() {
        let doc = SubtitleDocument::new(
            TimeBasis::Time,
            vec![SubtitleCue::new(3_723_600, 3_725_000, ["a", "b"])],
        );
        assert_eq!(TmPlayer.encode(&doc).unwrap(), vec!["01:02:04:a|b"]);
    }

    #[test]
    fn long_hour_field_is_rejected() {
        assert!(!TmPlayer.detect(&lines("9999999999999999:00:00:x")));
    }

    #[test]
    fn does_not_claim_srt() {
        assert!(!TmPlayer.detect(&lines("1\n00:00:01,000 --> 00:00:02,000\nHi")));
    }
}
