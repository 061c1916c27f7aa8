//! Retiming and shifting of subtitle documents.
//!
//! Pure functions: every operation builds a new document and leaves the
//! input untouched.
//!
//! # Rules
//!
//! - time → frames: `frame = round(seconds * fps)`
//! - frames → time: `ms = round(frame / fps * 1000)`
//! - ratio: `position' = round(position * ratio)` for start and end alike
//! - delay: converted to the document's basis (frames use `fps * ratio`)
//!   and added to start and end. A cue that would start before zero is
//!   moved to zero and keeps its duration.

use super::error::{SubtitleError, SubtitleResult};
use super::types::{SubtitleCue, SubtitleDocument, TimeBasis};

/// Parameters for [`retime`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetimeOptions {
    /// Frame rate the source positions refer to.
    pub source_fps: Option<f64>,
    /// Target fps / source fps.
    pub fps_ratio: f64,
    /// Offset added to every cue, in seconds (may be negative).
    pub delay_seconds: f64,
}

impl Default for RetimeOptions {
    fn default() -> Self {
        Self {
            source_fps: None,
            fps_ratio: 1.0,
            delay_seconds: 0.0,
        }
    }
}

/// Whether converting `source` → `target` with this delay needs a frame rate.
pub fn fps_needed(source: TimeBasis, target: TimeBasis, delay_seconds: f64) -> bool {
    source != target || (target == TimeBasis::Frames && delay_seconds != 0.0)
}

/// Frame showing at `ms` (rounded to the nearest frame).
pub fn ms_to_frame(ms: u64, fps: f64) -> u64 {
    (ms as f64 / 1000.0 * fps).round() as u64
}

/// Start of frame `frame` in milliseconds (rounded).
pub fn frame_to_ms(frame: u64, fps: f64) -> u64 {
    (frame as f64 / fps * 1000.0).round() as u64
}

/// Convert a document to another basis.
pub fn change_basis(document: &SubtitleDocument, target: TimeBasis, fps: f64) -> SubtitleDocument {
    let convert: fn(u64, f64) -> u64 = match (document.basis(), target) {
        (TimeBasis::Time, TimeBasis::Frames) => ms_to_frame,
        (TimeBasis::Frames, TimeBasis::Time) => frame_to_ms,
        _ => return document.clone(),
    };

    document.map_cues(target, |cue| SubtitleCue {
        start: convert(cue.start, fps),
        end: convert(cue.end, fps),
        ..cue.clone()
    })
}

/// Multiply every position by `ratio`.
pub fn scale(document: &SubtitleDocument, ratio: f64) -> SubtitleDocument {
    let apply = |pos: u64| (pos as f64 * ratio).round() as u64;
    document.map_cues(document.basis(), |cue| SubtitleCue {
        start: apply(cue.start),
        end: apply(cue.end),
        ..cue.clone()
    })
}

/// Add `offset` (in the document's unit) to every cue.
///
/// Cues pushed before zero start at zero with their duration unchanged.
pub fn shift(document: &SubtitleDocument, offset: i64) -> SubtitleDocument {
    document.map_cues(document.basis(), |cue| {
        let start = if offset >= 0 {
            cue.start.saturating_add(offset.unsigned_abs())
        } else {
            cue.start.saturating_sub(offset.unsigned_abs())
        };
        SubtitleCue {
            start,
            end: start.saturating_add(cue.duration()),
            ..cue.clone()
        }
    })
}

/// Delay in seconds expressed in `basis` units.
///
/// `fps` is the frame rate the shifted positions refer to and is only
/// consulted for frame-based documents.
pub fn delay_in_basis(delay_seconds: f64, basis: TimeBasis, fps: Option<f64>) -> SubtitleResult<i64> {
    match basis {
        TimeBasis::Time => Ok((delay_seconds * 1000.0).round() as i64),
        TimeBasis::Frames => Ok((delay_seconds * valid_fps(fps)?).round() as i64),
    }
}

/// Retime `document` into `target` basis, then rescale and shift it.
pub fn retime(
    document: &SubtitleDocument,
    target: TimeBasis,
    options: &RetimeOptions,
) -> SubtitleResult<SubtitleDocument> {
    let ratio = options.fps_ratio;
    if !ratio.is_finite() || ratio <= 0.0 {
        return Err(SubtitleError::InvalidParameter(format!(
            "fps ratio must be positive, got {}",
            ratio
        )));
    }
    if !options.delay_seconds.is_finite() {
        return Err(SubtitleError::InvalidParameter(format!(
            "delay must be finite, got {}",
            options.delay_seconds
        )));
    }

    let fps = if fps_needed(document.basis(), target, options.delay_seconds) {
        Some(valid_fps(options.source_fps)?)
    } else {
        options.source_fps
    };

    let mut out = match fps {
        Some(fps) if document.basis() != target => change_basis(document, target, fps),
        _ => document.clone(),
    };

    if ratio != 1.0 {
        out = scale(&out, ratio);
    }

    if options.delay_seconds != 0.0 {
        let offset = delay_in_basis(options.delay_seconds, target, fps.map(|f| f * ratio))?;
        out = shift(&out, offset);
    }

    tracing::debug!(
        "Retimed {} cues {} -> {} (fps {:?}, ratio {}, delay {:+.3}s)",
        out.len(),
        document.basis().name(),
        target.name(),
        fps,
        ratio,
        options.delay_seconds
    );

    Ok(out)
}

fn valid_fps(fps: Option<f64>) -> SubtitleResult<f64> {
    match fps {
        Some(f) if f.is_finite() && f > 0.0 => Ok(f),
        other => Err(SubtitleError::MissingFrameRate(other)),
    }
}
