//! Conversion engine: detect → decode → retime/shift → encode → write.
//!
//! The converter is immutable after construction and can be shared between
//! sessions. Nothing is written until encoding has succeeded, and the
//! target is replaced atomically, so a failed conversion never touches an
//! existing target file.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use encoding_rs::{Encoding, WINDOWS_1250};

use super::error::{SubtitleError, SubtitleResult};
use super::formats::SubtitleFormat;
use super::registry::FormatRegistry;
use super::retime::{self, RetimeOptions};
use super::text::{encoding_for_label, SubtitleText};
use super::types::SubtitleDocument;
use crate::fs_util::{atomic_write, extension_lower};
use crate::movie_info::MovieInfoProvider;

/// Timing and output options for one conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionOptions {
    /// Frame rate of the source positions. When `None` and one is needed,
    /// the rate of a movie next to the source file is probed.
    pub source_fps: Option<f64>,
    /// Target fps / source fps.
    pub fps_ratio: f64,
    /// Offset added to every cue, in seconds.
    pub delay_seconds: f64,
    /// Output encoding label; `None` keeps the source encoding.
    pub target_encoding: Option<String>,
    /// Cues whose text contains any of these words are dropped.
    pub remove_words: Vec<String>,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            source_fps: None,
            fps_ratio: 1.0,
            delay_seconds: 0.0,
            target_encoding: None,
            remove_words: Vec::new(),
        }
    }
}

/// Outcome of a successful conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionReport {
    pub source_format: &'static str,
    pub target_format: &'static str,
    pub target_path: PathBuf,
    /// Cues written.
    pub cues: usize,
    /// Cues dropped by `remove_words`.
    pub removed_cues: usize,
    /// Frame rate used for retiming, if any.
    pub frame_rate: Option<f64>,
    /// Name of the output encoding.
    pub encoding: &'static str,
}

/// A document after in-memory conversion, with its encoded lines.
#[derive(Debug, Clone)]
pub struct ConvertedDocument {
    pub document: SubtitleDocument,
    pub lines: Vec<String>,
    pub removed_cues: usize,
}

/// Format conversion entry point, usable inside or outside a download session.
pub struct SubtitleConverter {
    registry: Arc<FormatRegistry>,
    movie_info: Arc<dyn MovieInfoProvider>,
    fallback_encoding: &'static Encoding,
    movie_extensions: Vec<String>,
}

impl SubtitleConverter {
    pub fn new(registry: Arc<FormatRegistry>, movie_info: Arc<dyn MovieInfoProvider>) -> Self {
        Self {
            registry,
            movie_info,
            fallback_encoding: WINDOWS_1250,
            movie_extensions: Vec::new(),
        }
    }

    /// Encoding used for files that are not valid UTF-8.
    pub fn with_fallback_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.fallback_encoding = encoding;
        self
    }

    /// Movie extensions considered by [`Self::determine_movie_fps`] during conversion.
    pub fn with_movie_extensions(mut self, extensions: Vec<String>) -> Self {
        self.movie_extensions = extensions;
        self
    }

    pub fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    pub fn movie_info(&self) -> &dyn MovieInfoProvider {
        self.movie_info.as_ref()
    }

    /// Read and decode the text of a subtitle file.
    pub fn read_text(&self, path: &Path) -> SubtitleResult<SubtitleText> {
        let bytes = fs::read(path).map_err(|e| SubtitleError::read(path, e))?;
        Ok(SubtitleText::decode(&bytes, self.fallback_encoding))
    }

    /// Name of the first format that recognizes the file, or `None`.
    ///
    /// An unreadable file is reported as unrecognized.
    pub fn detect_format(&self, path: &Path) -> Option<&'static str> {
        match self.read_text(path) {
            Ok(text) => self.registry.detect(&text.lines).map(|f| f.format_name()),
            Err(e) => {
                tracing::warn!("{}", e);
                None
            }
        }
    }

    /// Read, detect and decode a file.
    pub fn load(&self, path: &Path) -> SubtitleResult<(SubtitleText, &dyn SubtitleFormat, SubtitleDocument)> {
        let text = self.read_text(path)?;
        let format = self
            .registry
            .detect(&text.lines)
            .ok_or_else(|| SubtitleError::UnrecognizedContent(path.to_path_buf()))?;
        let document = format.decode(&text.lines)?;
        Ok((text, format, document))
    }

    /// Whether converting between the two formats with this delay needs a frame rate.
    pub fn fps_needed(&self, source_format: &str, target_format: &str, delay_seconds: f64) -> SubtitleResult<bool> {
        let source = self.registry.select(source_format)?;
        let target = self.registry.select(target_format)?;
        Ok(retime::fps_needed(source.basis(), target.basis(), delay_seconds))
    }

    /// Frame rate of the movie with the same base name as `subtitle_path`.
    ///
    /// Looks for a sibling file with one of `movie_extensions`
    /// (case-insensitive) and probes it.
    pub fn determine_movie_fps(&self, subtitle_path: &Path, movie_extensions: &[String]) -> Option<f64> {
        let movie = find_sibling_movie(subtitle_path, movie_extensions)?;
        tracing::debug!("Frame rate source for {}: {}", subtitle_path.display(), movie.display());
        self.movie_fps(&movie)
    }

    /// Frame rate of a movie file, via the movie-info collaborator.
    pub fn movie_fps(&self, movie: &Path) -> Option<f64> {
        self.movie_info.movie_info(movie).map(|info| info.frame_rate)
    }

    /// `source` with the extension of `format` (or `extension` when given).
    pub fn default_target_path(source: &Path, format: &dyn SubtitleFormat, extension: Option<&str>) -> PathBuf {
        let ext = extension
            .map(|e| e.trim_start_matches('.'))
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| format.default_extension());
        source.with_extension(ext)
    }

    /// In-memory conversion of a decoded document.
    pub fn convert_document(
        &self,
        document: &SubtitleDocument,
        target_format: &str,
        options: &ConversionOptions,
    ) -> SubtitleResult<ConvertedDocument> {
        let target = self.registry.select(target_format)?;

        let filtered = remove_words(document, &options.remove_words);
        let removed_cues = document.len() - filtered.len();

        let retimed = retime::retime(
            &filtered,
            target.basis(),
            &RetimeOptions {
                source_fps: options.source_fps,
                fps_ratio: options.fps_ratio,
                delay_seconds: options.delay_seconds,
            },
        )?;
        let lines = target.encode(&retimed)?;

        Ok(ConvertedDocument {
            document: retimed,
            lines,
            removed_cues,
        })
    }

    /// Convert `source` to `target_format` and write it.
    ///
    /// `target_path` defaults to the source path with the target format's
    /// extension. On any failure nothing is written.
    pub fn convert_subtitles(
        &self,
        source: &Path,
        target_format: &str,
        target_path: Option<&Path>,
        options: &ConversionOptions,
    ) -> SubtitleResult<ConversionReport> {
        let (text, source_format, document) = self.load(source)?;
        let target = self.registry.select(target_format)?;

        let mut options = options.clone();
        if options.source_fps.is_none()
            && retime::fps_needed(source_format.basis(), target.basis(), options.delay_seconds)
        {
            options.source_fps = self.determine_movie_fps(source, &self.movie_extensions);
        }

        let converted = self.convert_document(&document, target.format_name(), &options)?;

        let mut output = text.with_lines(converted.lines);
        if let Some(label) = options.target_encoding.as_deref().filter(|l| !l.trim().is_empty()) {
            output.encoding = encoding_for_label(label)?;
            output.bom = false;
        }

        let target_path = match target_path {
            Some(p) => p.to_path_buf(),
            None => Self::default_target_path(source, target, None),
        };
        atomic_write(&target_path, &output.encode())
            .map_err(|e| SubtitleError::write(&target_path, e))?;

        tracing::info!(
            "Converted {} ({}) -> {} ({}), {} cues",
            source.display(),
            source_format.format_name(),
            target_path.display(),
            target.format_name(),
            converted.document.len()
        );

        Ok(ConversionReport {
            source_format: source_format.format_name(),
            target_format: target.format_name(),
            target_path,
            cues: converted.document.len(),
            removed_cues: converted.removed_cues,
            frame_rate: options.source_fps,
            encoding: output.encoding.name(),
        })
    }
}

/// Drop cues whose text contains any of `words` (case-insensitive).
fn remove_words(document: &SubtitleDocument, words: &[String]) -> SubtitleDocument {
    let words: Vec<String> = words
        .iter()
        .map(|w| w.trim().to_lowercase())
        .filter(|w| !w.is_empty())
        .collect();
    if words.is_empty() {
        return document.clone();
    }
    document.retain(|cue| {
        let text = cue.text().to_lowercase();
        !words.iter().any(|w| text.contains(w.as_str()))
    })
}

fn find_sibling_movie(subtitle_path: &Path, movie_extensions: &[String]) -> Option<PathBuf> {
    let stem = subtitle_path.file_stem()?;
    let dir = match subtitle_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut matches: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.file_stem() == Some(stem))
        .filter(|path| {
            extension_lower(path).is_some_and(|ext| {
                movie_extensions
                    .iter()
                    .any(|m| m.trim_start_matches('.').eq_ignore_ascii_case(&ext))
            })
        })
        .collect();
    matches.sort();
    matches.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movie_info::FixedMovieInfo;
    use crate::subtitles::formats::SubRip;
    use tempfile::tempdir;

    fn converter(fps: Option<f64>) -> SubtitleConverter {
        SubtitleConverter::new(Arc::new(FormatRegistry::new()), Arc::new(FixedMovieInfo(fps)))
            .with_movie_extensions(vec!["avi".into(), "mkv".into()])
    }

    #[test]
    fn frame_based_to_srt_at_23_976() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("movie.sub");
        fs::write(&source, "{100}{150}Hello\n").unwrap();

        let options = ConversionOptions {
            source_fps: Some(23.976),
            ..Default::default()
        };
        let report = converter(None)
            .convert_subtitles(&source, "SRT", None, &options)
            .unwrap();

        assert_eq!(report.source_format, "mDVD");
        assert_eq!(report.target_path, dir.path().join("movie.srt"));

        let written = fs::read_to_string(&report.target_path).unwrap();
        let lines: Vec<String> = written.lines().map(str::to_string).collect();
        let doc = SubRip.decode(&lines).unwrap();
        let cue = &doc.cues()[0];
        assert!(cue.start.abs_diff(4170) <= 2);
        assert!(cue.end.abs_diff(6255) <= 2);
        assert_eq!(cue.lines, vec!["Hello"]);
        assert_eq!(lines[0], "1");
    }

    #[test]
    fn plain_text_is_not_detected_or_converted() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("notes.txt");
        let target = dir.path().join("notes.srt");
        fs::write(&source, "Shopping list\nmilk\n").unwrap();

        let conv = converter(Some(25.0));
        assert_eq!(conv.detect_format(&source), None);

        let result = conv.convert_subtitles(&source, "SRT", Some(&target), &ConversionOptions::default());
        assert!(matches!(result, Err(SubtitleError::UnrecognizedContent(_))));
        assert!(!target.exists());
    }

    #[test]
    fn failed_conversion_keeps_existing_target() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("movie.sub");
        let target = dir.path().join("movie.srt");
        fs::write(&source, "{1}{2}x\n").unwrap();
        fs::write(&target, "old content").unwrap();

        let result = converter(None).convert_subtitles(&source, "SRT", Some(&target), &ConversionOptions::default());
        assert!(matches!(result, Err(SubtitleError::MissingFrameRate(None))));
        assert_eq!(fs::read_to_string(&target).unwrap(), "old content");

        let result = converter(Some(25.0)).convert_subtitles(&source, "VobSub", Some(&target), &ConversionOptions::default());
        assert!(matches!(result, Err(SubtitleError::UnknownFormat(_))));
        assert_eq!(fs::read_to_string(&target).unwrap(), "old content");
    }

    #[test]
    fn frame_rate_is_probed_from_sibling_movie() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("Film.MKV"), b"").unwrap();
        let source = dir.path().join("Film.sub");
        fs::write(&source, "{25}{50}Hi\n").unwrap();

        let conv = converter(Some(25.0));
        let exts = vec!["mkv".to_string()];
        assert_eq!(conv.determine_movie_fps(&source, &exts), Some(25.0));
        assert_eq!(conv.determine_movie_fps(&dir.path().join("Other.sub"), &exts), None);

        let report = conv
            .convert_subtitles(&source, "MPL2", None, &ConversionOptions::default())
            .unwrap();
        assert_eq!(report.frame_rate, Some(25.0));
        assert_eq!(report.target_path, dir.path().join("Film.txt"));
        assert_eq!(fs::read_to_string(&report.target_path).unwrap(), "[10][20]Hi\n");
    }

    #[test]
    fn keeps_source_encoding_and_line_endings() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("pl.txt");
        // "[10][20]żółw\r\n" in windows-1250
        let mut bytes = b"[10][20]".to_vec();
        bytes.extend_from_slice(&[0xBF, 0xF3, 0xB3, 0x77, b'\r', b'\n']);
        fs::write(&source, &bytes).unwrap();

        let conv = converter(None);
        assert_eq!(conv.detect_format(&source), Some("MPL2"));

        let target = dir.path().join("pl.srt");
        let report = conv
            .convert_subtitles(&source, "srt", Some(&target), &ConversionOptions::default())
            .unwrap();
        assert_eq!(report.encoding, "windows-1250");

        let mut expected = b"1\r\n00:00:01,000 --> 00:00:02,000\r\n".to_vec();
        expected.extend_from_slice(&[0xBF, 0xF3, 0xB3, 0x77, b'\r', b'\n']);
        assert_eq!(fs::read(&target).unwrap(), expected);

        let options = ConversionOptions {
            target_encoding: Some("utf-8".into()),
            ..Default::default()
        };
        conv.convert_subtitles(&source, "MPL2", Some(&target), &options).unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "[10][20]żółw\r\n");
    }

    #[test]
    fn remove_words_and_delay() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.srt");
        fs::write(
            &source,
            "1\n00:00:01,000 --> 00:00:02,000\nSynced by someone\n\n2\n00:00:05,000 --> 00:00:06,000\nHello\n",
        )
        .unwrap();

        let options = ConversionOptions {
            delay_seconds: -1.5,
            remove_words: vec!["SYNCED".into()],
            ..Default::default()
        };
        let report = converter(None)
            .convert_subtitles(&source, "SRT", None, &options)
            .unwrap();

        assert_eq!(report.removed_cues, 1);
        assert_eq!(
            fs::read_to_string(&source).unwrap(),
            "1\n00:00:03,500 --> 00:00:04,500\nHello\n"
        );
    }

    #[test]
    fn fps_needed_by_format_name() {
        let conv = converter(None);
        assert!(conv.fps_needed("mDVD", "SRT", 0.0).unwrap());
        assert!(!conv.fps_needed("MPL2", "SRT", 3.0).unwrap());
        assert!(conv.fps_needed("mDVD", "mDVD", 3.0).unwrap());
        assert!(conv.fps_needed("nope", "SRT", 0.0).is_err());
    }
}
