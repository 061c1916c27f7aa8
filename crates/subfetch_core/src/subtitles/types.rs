//! Core subtitle types.
//!
//! Positions are stored as integers in the unit of the document basis:
//! milliseconds for time-based documents, frame numbers for frame-based ones.
//! A document never mixes the two.

use serde::{Deserialize, Serialize};

/// How cue positions of a document are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeBasis {
    /// Positions are milliseconds.
    Time,
    /// Positions are video frame numbers.
    Frames,
}

impl TimeBasis {
    /// Get the display name for this basis.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::Frames => "frames",
        }
    }

    pub fn is_time_based(&self) -> bool {
        matches!(self, Self::Time)
    }
}

/// A single subtitle entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleCue {
    /// 1-based position of the cue in its document.
    pub index: usize,
    /// Start position (ms or frame, see [`TimeBasis`]).
    pub start: u64,
    /// End position (ms or frame, see [`TimeBasis`]).
    pub end: u64,
    /// Text lines as they appear in the file (no format separators).
    pub lines: Vec<String>,
}

impl SubtitleCue {
    /// Create a cue. The index is assigned when the cue joins a document.
    pub fn new<S: Into<String>>(start: u64, end: u64, lines: impl IntoIterator<Item = S>) -> Self {
        Self {
            index: 0,
            start,
            end,
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    /// Length of the cue in its basis unit.
    pub fn duration(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// Text with lines joined by `\n`.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

/// An ordered, immutable sequence of cues sharing one basis.
///
/// Retiming and shifting build a new document; see [`crate::subtitles::retime`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleDocument {
    basis: TimeBasis,
    cues: Vec<SubtitleCue>,
}

impl SubtitleDocument {
    /// Build a document, ordering cues by start (stable) and numbering them from 1.
    pub fn new(basis: TimeBasis, mut cues: Vec<SubtitleCue>) -> Self {
        cues.sort_by_key(|c| c.start);
        for (i, cue) in cues.iter_mut().enumerate() {
            cue.index = i + 1;
        }
        Self { basis, cues }
    }

    /// Empty document with the given basis.
    pub fn empty(basis: TimeBasis) -> Self {
        Self {
            basis,
            cues: Vec::new(),
        }
    }

    pub fn basis(&self) -> TimeBasis {
        self.basis
    }

    pub fn cues(&self) -> &[SubtitleCue] {
        &self.cues
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    /// Consume the document and return its cues.
    pub fn into_cues(self) -> Vec<SubtitleCue> {
        self.cues
    }

    /// Build a new document from this one with every cue mapped.
    pub fn map_cues(&self, basis: TimeBasis, f: impl FnMut(&SubtitleCue) -> SubtitleCue) -> Self {
        Self::new(basis, self.cues.iter().map(f).collect())
    }

    /// New document without the cues rejected by the predicate.
    pub fn retain(&self, mut keep: impl FnMut(&SubtitleCue) -> bool) -> Self {
        Self::new(
            self.basis,
            self.cues.iter().filter(|c| keep(c)).cloned().collect(),
        )
    }
}

/// Static description of a format plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FormatDescriptor {
    /// Short unique name (e.g. `mDVD`).
    pub name: &'static str,
    /// Position basis of the format.
    pub basis: TimeBasis,
    /// Default file extension, without the dot.
    pub extension: &'static str,
}

impl FormatDescriptor {
    pub fn is_time_based(&self) -> bool {
        self.basis.is_time_based()
    }
}
