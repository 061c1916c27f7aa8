//! Per-movie session state threaded through the download pipeline.
//!
//! Every orchestrator operation takes the session by value and returns it,
//! so each transition is visible at the call site. A session owns its temp
//! directory until `cleanup()`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use super::errors::DownloadError;
use crate::engines::{Candidate, MovieFingerprint, SubtitleEngine};

/// Pipeline stage of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Searching,
    /// Candidates are available.
    Ready,
    Downloading,
    /// An archive payload waits for `unpack`.
    Unpacking,
    /// A subtitle file waits for `match_subtitles`.
    Verifying,
    /// The subtitle sits next to the movie.
    Matched,
    PostProcessed,
    Errored,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Searching => "searching",
            Stage::Ready => "ready",
            Stage::Downloading => "downloading",
            Stage::Unpacking => "unpacking",
            Stage::Verifying => "verifying",
            Stage::Matched => "matched",
            Stage::PostProcessed => "post-processed",
            Stage::Errored => "errored",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Working state for one movie.
pub struct Session {
    pub(super) movie_path: PathBuf,
    pub(super) fingerprint: Option<MovieFingerprint>,
    pub(super) engines: Vec<Arc<dyn SubtitleEngine>>,
    pub(super) current_engine: Option<String>,
    pub(super) candidates: Vec<Candidate>,
    pub(super) chosen_index: Option<usize>,
    pub(super) stage: Stage,
    pub(super) last_error: Option<DownloadError>,
    pub(super) temp_dir: Option<TempDir>,
    pub(super) payload: Option<Vec<u8>>,
    pub(super) subtitle_file: Option<PathBuf>,
    pub(super) matched: Option<PathBuf>,
    pub(super) matched_format: Option<&'static str>,
    pub(super) started_at: String,
}

impl Session {
    pub(super) fn new(movie_path: PathBuf, engines: Vec<Arc<dyn SubtitleEngine>>) -> Self {
        Self {
            movie_path,
            fingerprint: None,
            engines,
            current_engine: None,
            candidates: Vec::new(),
            chosen_index: None,
            stage: Stage::Idle,
            last_error: None,
            temp_dir: None,
            payload: None,
            subtitle_file: None,
            matched: None,
            matched_format: None,
            started_at: chrono::Local::now().to_rfc3339(),
        }
    }

    pub fn movie_path(&self) -> &Path {
        &self.movie_path
    }

    pub fn fingerprint(&self) -> Option<&MovieFingerprint> {
        self.fingerprint.as_ref()
    }

    /// Movie checksum, once computed.
    pub fn checksum(&self) -> Option<&str> {
        self.fingerprint.as_ref().map(|f| f.checksum())
    }

    /// Names of the engines this session searches.
    pub fn engine_names(&self) -> Vec<&'static str> {
        self.engines.iter().map(|e| e.name()).collect()
    }

    /// Engine of the search or download in progress (or last run).
    pub fn current_engine(&self) -> Option<&str> {
        self.current_engine.as_deref()
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn chosen_index(&self) -> Option<usize> {
        self.chosen_index
    }

    pub fn chosen(&self) -> Option<&Candidate> {
        self.chosen_index.and_then(|i| self.candidates.get(i))
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Last recorded failure, if any.
    pub fn last_error(&self) -> Option<&DownloadError> {
        self.last_error.as_ref()
    }

    /// Message of the last failure; empty when there is none.
    pub fn error(&self) -> String {
        self.last_error.as_ref().map(ToString::to_string).unwrap_or_default()
    }

    /// Whether the last operation succeeded.
    pub fn succeeded(&self) -> bool {
        self.stage != Stage::Errored
    }

    /// Session temp directory, if one was created.
    pub fn temp_dir(&self) -> Option<&Path> {
        self.temp_dir.as_ref().map(|d| d.path())
    }

    /// Downloaded or unpacked subtitle waiting to be matched.
    pub fn subtitle_file(&self) -> Option<&Path> {
        self.subtitle_file.as_deref()
    }

    /// Subtitle placed next to the movie.
    pub fn matched(&self) -> Option<&Path> {
        self.matched.as_deref()
    }

    pub fn matched_format(&self) -> Option<&'static str> {
        self.matched_format
    }

    /// When the session was created (RFC 3339, local time).
    pub fn started_at(&self) -> &str {
        &self.started_at
    }

    pub(super) fn fail(mut self, err: DownloadError) -> Self {
        tracing::error!("{}: {}", self.movie_path.display(), err);
        self.last_error = Some(err);
        self.stage = Stage::Errored;
        self
    }

    pub(super) fn enter(&mut self, stage: Stage) {
        tracing::debug!("{}: {} -> {}", self.movie_path.display(), self.stage, stage);
        self.stage = stage;
    }

    /// Drop everything produced after the search.
    pub(super) fn clear_download(&mut self) {
        self.payload = None;
        self.subtitle_file = None;
        self.matched = None;
        self.matched_format = None;
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("movie_path", &self.movie_path)
            .field("engines", &self.engine_names())
            .field("candidates", &self.candidates.len())
            .field("chosen_index", &self.chosen_index)
            .field("stage", &self.stage)
            .field("last_error", &self.last_error)
            .field("temp_dir", &self.temp_dir())
            .field("subtitle_file", &self.subtitle_file)
            .field("matched", &self.matched)
            .finish()
    }
}
