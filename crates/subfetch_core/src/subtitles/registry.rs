//! Catalog of format plugins.
//!
//! The registry is built once with every supported format and shared
//! read-only afterwards. Enumeration order is stable: it is the detection
//! order and the default target selection order.

use super::error::{SubtitleError, SubtitleResult};
use super::formats::{MicroDvd, Mpl2, SubRip, SubtitleFormat, TmPlayer};
use super::types::FormatDescriptor;

/// Read-only catalog of subtitle formats.
pub struct FormatRegistry {
    formats: Vec<Box<dyn SubtitleFormat>>,
}

impl FormatRegistry {
    /// Registry with every built-in format.
    pub fn new() -> Self {
        Self {
            formats: vec![
                Box::new(MicroDvd),
                Box::new(Mpl2),
                Box::new(SubRip),
                Box::new(TmPlayer),
            ],
        }
    }

    /// Format names in enumeration order.
    pub fn enumerate_formats(&self) -> Vec<&'static str> {
        self.formats.iter().map(|f| f.format_name()).collect()
    }

    /// Descriptors in enumeration order.
    pub fn descriptors(&self) -> Vec<FormatDescriptor> {
        self.formats.iter().map(|f| f.descriptor()).collect()
    }

    /// First format in enumeration order.
    pub fn default_format(&self) -> &dyn SubtitleFormat {
        &*self.formats[0]
    }

    /// Look up a format by name (ASCII case-insensitive).
    pub fn select(&self, name: &str) -> SubtitleResult<&dyn SubtitleFormat> {
        self.formats
            .iter()
            .find(|f| f.format_name().eq_ignore_ascii_case(name.trim()))
            .map(|f| &**f)
            .ok_or_else(|| SubtitleError::UnknownFormat(name.to_string()))
    }

    /// First format whose `detect` accepts the lines.
    pub fn detect(&self, lines: &[String]) -> Option<&dyn SubtitleFormat> {
        self.formats
            .iter()
            .find(|f| f.detect(lines))
            .map(|f| &**f)
    }

    /// Default extensions of all formats, deduplicated, in enumeration order.
    pub fn extensions(&self) -> Vec<&'static str> {
        let mut out: Vec<&'static str> = Vec::new();
        for format in &self.formats {
            if !out.contains(&format.default_extension()) {
                out.push(format.default_extension());
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}
