//! SubRip (.srt).
//!
//! # Format Overview
//!
//! ```text
//! 1
//! 00:00:01,000 --> 00:00:04,000
//! Hello, world!
//!
//! 2
//! 00:00:05,000 --> 00:00:08,000
//! This is a test.
//! ```
//!
//! Each entry has:
//! - Index number (optional on input, regenerated on write)
//! - Timing line: `HH:MM:SS,mmm --> HH:MM:SS,mmm`
//! - Zero or more lines of text
//! - Blank line separator

use super::{is_blank, SubtitleFormat};
use crate::subtitles::error::ParseError;
use crate::subtitles::types::{FormatDescriptor, SubtitleCue, SubtitleDocument, TimeBasis};

const DESCRIPTOR: FormatDescriptor = FormatDescriptor {
    name: "SRT",
    basis: TimeBasis::Time,
    extension: "srt",
};

#[derive(Debug, Default, Clone, Copy)]
pub struct SubRip;

impl SubtitleFormat for SubRip {
    fn descriptor(&self) -> FormatDescriptor {
        DESCRIPTOR
    }

    fn decode(&self, lines: &[String]) -> Result<SubtitleDocument, ParseError> {
        let mut cues = Vec::new();
        let mut i = 0;

        while i < lines.len() {
            if is_blank(&lines[i]) {
                i += 1;
                continue;
            }

            // Index line is optional, some tools drop it
            let timing_idx = if is_index(&lines[i]) && i + 1 < lines.len() {
                i + 1
            } else {
                i
            };

            let timing_line = &lines[timing_idx];
            if !timing_line.contains("-->") {
                return Err(ParseError::at_line(
                    timing_idx + 1,
                    "expected cue index or timing line",
                ));
            }

            let (start, end) = parse_srt_timing(timing_line)
                .ok_or_else(|| ParseError::invalid_time(timing_idx + 1, timing_line.as_str()))?;

            if end < start {
                return Err(ParseError::InvertedCue {
                    line: timing_idx + 1,
                    start,
                    end,
                });
            }

            let mut j = timing_idx + 1;
            let mut text = Vec::new();
            while j < lines.len() && !is_blank(&lines[j]) {
                text.push(lines[j].clone());
                j += 1;
            }

            cues.push(SubtitleCue::new(start, end, text));
            i = j;
        }

        Ok(SubtitleDocument::new(TimeBasis::Time, cues))
    }

    fn encode_cues(&self, document: &SubtitleDocument) -> Vec<String> {
        let mut output = Vec::new();

        for (i, cue) in document.cues().iter().enumerate() {
            if i > 0 {
                output.push(String::new());
            }

            output.push((i + 1).to_string());
            output.push(format!(
                "{} --> {}",
                format_srt_time(cue.start),
                format_srt_time(cue.end)
            ));
            output.extend(cue.lines.iter().cloned());
        }

        output
    }
}

fn is_index(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit())
}

/// Parse SRT timing line: `HH:MM:SS,mmm --> HH:MM:SS,mmm`
///
/// Anything after the end timestamp (position hints) is ignored.
fn parse_srt_timing(line: &str) -> Option<(u64, u64)> {
    let (start, rest) = line.split_once("-->")?;
    let end = rest.split_whitespace().next()?;
    Some((parse_srt_time(start.trim())?, parse_srt_time(end)?))
}

/// Parse SRT timestamp: `HH:MM:SS,mmm` or `HH:MM:SS.mmm`
///
/// Returns time in milliseconds.
pub fn parse_srt_time(s: &str) -> Option<u64> {
    let mut parts = s.trim().split(':');
    let hours: u64 = parse_digits(parts.next()?)?;
    let minutes: u64 = parse_digits(parts.next()?)?;
    let seconds_part = parts.next()?;
    if parts.next().is_some() || minutes >= 60 {
        return None;
    }

    let (secs, frac) = match seconds_part.split_once([',', '.']) {
        Some((secs, frac)) => (secs, frac),
        None => (seconds_part, ""),
    };
    let seconds = parse_digits(secs)?;
    if seconds >= 60 {
        return None;
    }

    // Normalize based on number of digits
    let millis = match frac.len() {
        0 => 0,
        1 => parse_digits(frac)? * 100,
        2 => parse_digits(frac)? * 10,
        3 => parse_digits(frac)?,
        _ => parse_digits(frac.get(..3)?)?,
    };

    hours
        .checked_mul(3_600_000)?
        .checked_add(minutes * 60_000 + seconds * 1000 + millis)
}

fn parse_digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Format milliseconds as SRT timestamp (HH:MM:SS,mmm).
pub fn format_srt_time(ms: u64) -> String {
    let millis = ms % 1000;
    let total_secs = ms / 1000;
    let secs = total_secs % 60;
    let total_mins = total_secs / 60;
    let mins = total_mins % 60;
    let hours = total_mins / 60;

    format!("{:02}:{:02}:{:02},{:03}", hours, mins, secs, millis)
}
