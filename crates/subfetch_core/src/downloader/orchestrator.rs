//! Download orchestrator.
//!
//! `SubtitleDownloader` is immutable and can serve any number of sessions.
//! Each operation consumes a [`Session`], records success or failure on it
//! and hands it back:
//!
//! ```text
//! Idle → Searching → Ready → Downloading → [Unpacking] → Verifying → Matched → PostProcessed
//! ```
//!
//! Any step can end in `Errored`. A failed step leaves the data of earlier
//! steps in place, so the caller can retry it (or download another
//! candidate) on the same session.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::archive::{self, ArchiveExtractor, DefaultExtractor};
use super::cache::ChecksumCache;
use super::candidates;
use super::errors::{DownloadError, DownloadResult};
use super::session::{Session, Stage};
use crate::config::Settings;
use crate::engines::{Checksum, EngineRegistry, MovieFingerprint};
use crate::fs_util::{atomic_write, extension_lower};
use crate::subtitles::{ConversionOptions, SubtitleConverter};

/// Name of a downloaded file whose format is not known yet.
const FALLBACK_EXTENSION: &str = "txt";

/// Drives search, download, unpack, match and post-processing.
pub struct SubtitleDownloader {
    settings: Arc<Settings>,
    engines: Arc<EngineRegistry>,
    converter: Arc<SubtitleConverter>,
    extractor: Arc<dyn ArchiveExtractor>,
    cache: Option<Arc<dyn ChecksumCache>>,
}

impl SubtitleDownloader {
    pub fn new(settings: Arc<Settings>, engines: Arc<EngineRegistry>, converter: Arc<SubtitleConverter>) -> Self {
        let extractor = Arc::new(DefaultExtractor::new(settings.general.p7zip_path.clone()));
        Self {
            settings,
            engines,
            converter,
            extractor,
            cache: None,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn ArchiveExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn ChecksumCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn converter(&self) -> &SubtitleConverter {
        &self.converter
    }

    /// New session for `movie` with the configured engines.
    ///
    /// A configured engine that is not registered leaves the session
    /// without engines and in `Errored`.
    pub fn new_session(&self, movie: impl Into<PathBuf>) -> Session {
        let session = Session::new(movie.into(), Vec::new());
        self.add_engines(session, &self.settings.engines.enabled_names())
    }

    /// Start over for another movie, keeping the session's engines.
    pub fn set_movie(&self, session: Session, movie: impl Into<PathBuf>) -> Session {
        let engines = session.engines.clone();
        self.cleanup(session);
        Session::new(movie.into(), engines)
    }

    /// Add engines by name. All-or-nothing: an unknown name leaves the
    /// engine list untouched and records `UnknownEngine`.
    pub fn add_engines<S: AsRef<str>>(&self, session: Session, names: &[S]) -> Session {
        step(session, |session| {
            for engine in self.engines.select(names)? {
                if !session.engines.iter().any(|e| e.name() == engine.name()) {
                    session.engines.push(engine);
                }
            }
            Ok(())
        })
    }

    /// Names of the engines the session searches.
    pub fn list_loaded_engines(&self, session: &Session) -> Vec<&'static str> {
        session.engine_names()
    }

    /// Whether subtitles can be written next to the movie.
    pub fn check_write_permissions(&self, session: &Session) -> DownloadResult<()> {
        let dir = movie_dir(&session.movie_path);
        tempfile::NamedTempFile::new_in(&dir)
            .map(drop)
            .map_err(|_| DownloadError::NotWritable(dir.display().to_string()))
    }

    /// Compute and store the movie fingerprint.
    pub fn checksum(&self, session: Session) -> Session {
        step(session, |session| {
            let fingerprint = compute_fingerprint(&session.movie_path)?;
            session.fingerprint = Some(fingerprint);
            Ok(())
        })
    }

    /// Search every language with every engine (or only `engine`) and
    /// merge the results.
    ///
    /// A failing engine is logged and recorded in `error()` but does not
    /// stop the other searches. The step fails when nothing was found.
    /// Empty `languages` means the configured language and its backup.
    pub fn look_for_subtitles<S: AsRef<str>>(&self, session: Session, languages: &[S], engine: Option<&str>) -> Session {
        step(session, |session| self.search(session, languages, engine))
    }

    fn search<S: AsRef<str>>(&self, session: &mut Session, languages: &[S], engine: Option<&str>) -> DownloadResult<()> {
        session.candidates.clear();
        session.chosen_index = None;
        session.last_error = None;
        session.clear_download();
        session.enter(Stage::Searching);

        if session.fingerprint.is_none() {
            session.fingerprint = Some(compute_fingerprint(&session.movie_path)?);
        }
        let Some(movie) = session.fingerprint.clone() else {
            return Err(DownloadError::invalid_state("search", "movie fingerprint missing"));
        };

        let engines = match engine {
            Some(name) => vec![self.engines.get(name)?],
            None => session.engines.clone(),
        };
        if engines.is_empty() {
            return Err(DownloadError::NoEngines);
        }

        let languages = normalize_languages(languages);
        let languages = if languages.is_empty() {
            self.settings.general.languages()
        } else {
            languages
        };

        let mut found = Vec::new();
        let mut searches = 0;
        let mut failures = 0;
        let mut last_failure = None;
        for language in &languages {
            for engine in &engines {
                searches += 1;
                session.current_engine = Some(engine.name().to_string());
                match engine.search(&movie, language) {
                    Ok(list) => {
                        tracing::debug!("{} [{}]: {} candidate(s)", engine.name(), language, list.len());
                        found.extend(list);
                    }
                    Err(e) => {
                        tracing::warn!("{}", e);
                        failures += 1;
                        last_failure = Some(DownloadError::from(e));
                    }
                }
            }
        }

        session.candidates = candidates::merge(found);
        session.last_error = last_failure.clone();

        if session.candidates.is_empty() {
            return Err(match last_failure {
                Some(err) if failures == searches => err,
                _ => DownloadError::NoSubtitlesFound(movie.file_name),
            });
        }

        session.chosen_index = self.best_idx(session);
        session.enter(Stage::Ready);
        tracing::info!(
            "Found {} candidate(s) for {} ({} of {} searches failed)",
            session.candidates.len(),
            movie.file_name,
            failures,
            searches
        );
        Ok(())
    }

    /// Dedup key remembered for this movie by the checksum cache.
    fn known_key(&self, session: &Session) -> Option<String> {
        let cache = self.cache.as_ref()?;
        cache.lookup(session.checksum()?)
    }

    /// Candidate to pick without asking: a remembered match, else the first.
    pub fn best_idx(&self, session: &Session) -> Option<usize> {
        candidates::best_index(&session.candidates, self.known_key(session).as_deref())
    }

    /// Whether the user has to choose among the candidates.
    pub fn need_to_show_list(&self, session: &Session) -> bool {
        candidates::need_to_show_list(&session.candidates, self.known_key(session).as_deref())
    }

    /// Fetch candidate `index`. Archives wait for [`Self::unpack`]; plain
    /// payloads go straight to verification.
    pub fn download(&self, session: Session, index: usize) -> Session {
        step(session, |session| self.fetch(session, index))
    }

    fn fetch(&self, session: &mut Session, index: usize) -> DownloadResult<()> {
        let candidate = session
            .candidates
            .get(index)
            .cloned()
            .ok_or(DownloadError::InvalidIndex {
                index,
                len: session.candidates.len(),
            })?;

        session.last_error = None;
        session.clear_download();
        session.chosen_index = Some(index);
        session.current_engine = Some(candidate.engine.clone());
        session.enter(Stage::Downloading);

        let engine = self.engines.get(&candidate.engine)?;
        let payload = engine.fetch(&candidate)?;
        tracing::info!("Downloaded {} bytes from {} ({})", payload.len(), candidate.engine, candidate.name);

        if let Some(checksum) = &candidate.checksum {
            session.enter(Stage::Verifying);
            if !checksum.verify(&payload) {
                let expected = match checksum {
                    Checksum::Md5(hash) | Checksum::Sha256(hash) => hash.clone(),
                };
                return Err(DownloadError::VerifyFailed {
                    algorithm: checksum.algorithm().to_string(),
                    expected,
                });
            }
        }

        if self.extractor.is_archive(&payload) {
            session.payload = Some(payload);
            session.enter(Stage::Unpacking);
            return Ok(());
        }

        let path = self.work_dir(session)?.join(download_file_name(
            &session.movie_path,
            &candidate.name,
            &self.converter.registry().extensions(),
        ));
        fs::write(&path, &payload).map_err(|e| DownloadError::io("saving download", e))?;
        session.payload = Some(payload);
        session.subtitle_file = Some(path);
        session.enter(Stage::Verifying);
        Ok(())
    }

    /// Extract the archive downloaded for candidate `index` and pick the
    /// subtitle that best matches the movie name.
    pub fn unpack(&self, session: Session, index: usize) -> Session {
        step(session, |session| self.extract(session, index))
    }

    fn extract(&self, session: &mut Session, index: usize) -> DownloadResult<()> {
        if session.chosen_index != Some(index) {
            return Err(DownloadError::invalid_state(
                "unpack",
                format!("candidate {} has not been downloaded", index),
            ));
        }
        let payload = session
            .payload
            .clone()
            .filter(|p| self.extractor.is_archive(p))
            .ok_or_else(|| DownloadError::invalid_state("unpack", "no archive was downloaded"))?;

        session.last_error = None;
        session.enter(Stage::Unpacking);

        let password = session
            .chosen()
            .and_then(|c| self.engines.get(&c.engine).ok())
            .and_then(|e| e.archive_password().map(str::to_string));

        let dest = self.work_dir(session)?.join(format!("unpacked-{}", index));
        if dest.exists() {
            fs::remove_dir_all(&dest).map_err(|e| DownloadError::io("clearing unpack folder", e))?;
        }

        let files = self
            .extractor
            .unpack(&payload, &dest, password.as_deref())
            .map_err(|e| DownloadError::UnpackFailed(e.to_string()))?;

        let extensions = self.converter.registry().extensions();
        let usable: Vec<PathBuf> = files
            .into_iter()
            .filter(|f| {
                extension_lower(f).is_some_and(|ext| extensions.contains(&ext.as_str()))
                    || self.converter.detect_format(f).is_some()
            })
            .collect();

        let stem = movie_stem(&session.movie_path);
        let chosen = archive::select_subtitle(&usable, &stem, &extensions)
            .cloned()
            .ok_or_else(|| DownloadError::UnpackFailed("no subtitle file in archive".to_string()))?;

        tracing::debug!("Selected {} from archive", chosen.display());
        session.subtitle_file = Some(chosen);
        session.enter(Stage::Verifying);
        Ok(())
    }

    /// Check the downloaded subtitle and place it next to the movie as
    /// `<movie stem>.<ext>`.
    pub fn match_subtitles(&self, session: Session) -> Session {
        step(session, |session| self.place(session))
    }

    fn place(&self, session: &mut Session) -> DownloadResult<()> {
        let source = session
            .subtitle_file
            .clone()
            .ok_or_else(|| DownloadError::invalid_state("match subtitles", "nothing has been downloaded"))?;
        session.last_error = None;

        let bytes = fs::read(&source).map_err(|e| DownloadError::io("reading downloaded subtitles", e))?;
        if bytes.is_empty() {
            return Err(DownloadError::NotMatched("downloaded file is empty".to_string()));
        }

        let format_name = self.converter.detect_format(&source).ok_or_else(|| {
            DownloadError::NotMatched(format!("'{}' is not a recognized subtitle format", file_name(&source)))
        })?;

        self.check_write_permissions(session)?;

        let registry = self.converter.registry();
        let extension = match extension_lower(&source) {
            Some(ext) if registry.extensions().contains(&ext.as_str()) => ext,
            _ => registry
                .select(format_name)
                .map_err(|e| DownloadError::NotMatched(e.to_string()))?
                .default_extension()
                .to_string(),
        };
        let target = session.movie_path.with_extension(extension);

        if self.settings.general.backup_existing {
            backup_existing(&target).map_err(|e| DownloadError::io("backing up existing subtitles", e))?;
        }
        atomic_write(&target, &bytes).map_err(|e| DownloadError::io("writing subtitles", e))?;

        if let (Some(cache), Some(checksum), Some(candidate)) = (&self.cache, session.checksum(), session.chosen()) {
            if let Err(e) = cache.record(checksum, &candidate.dedup_key()) {
                tracing::warn!("Cannot update checksum cache: {}", e);
            }
        }

        tracing::info!("Matched {} subtitles: {}", format_name, target.display());
        session.matched = Some(target);
        session.matched_format = Some(format_name);
        session.enter(Stage::Matched);
        Ok(())
    }

    /// Rewrite the matched subtitle with the configured format, extension,
    /// encoding and word filter. A no-op when post-processing is disabled.
    ///
    /// On failure the matched file stays as it was.
    pub fn post_process_subtitles(&self, session: Session) -> Session {
        step(session, |session| self.post_process(session))
    }

    fn post_process(&self, session: &mut Session) -> DownloadResult<()> {
        let config = &self.settings.postprocess;
        if !config.enabled {
            tracing::debug!("Post-processing disabled");
            return Ok(());
        }

        let (Some(source), Some(source_format)) = (session.matched.clone(), session.matched_format) else {
            return Err(DownloadError::invalid_state("post-process", "no subtitles have been matched"));
        };
        session.last_error = None;

        let failed = |e: crate::subtitles::SubtitleError| DownloadError::PostProcessFailed(e.to_string());

        let target_format = match config.sub_format.trim() {
            "" => source_format,
            name => name,
        };
        let target = self.converter.registry().select(target_format).map_err(failed)?;
        let extension = Some(config.sub_extension.trim()).filter(|e| !e.is_empty());
        let target_path = SubtitleConverter::default_target_path(&session.movie_path, target, extension);

        let source_fps = if self
            .converter
            .fps_needed(source_format, target.format_name(), 0.0)
            .map_err(failed)?
        {
            self.converter.movie_fps(&session.movie_path)
        } else {
            None
        };

        let options = ConversionOptions {
            source_fps,
            target_encoding: Some(config.encoding.trim())
                .filter(|e| !e.is_empty())
                .map(str::to_string),
            remove_words: config.remove_words.clone(),
            ..Default::default()
        };

        // Converted output is staged in the temp folder; files next to the
        // movie are only touched once it exists.
        let staged = self
            .work_dir(session)?
            .join("postprocessed")
            .join(file_name(&target_path));
        let report = self
            .converter
            .convert_subtitles(&source, target.format_name(), Some(&staged), &options)
            .map_err(failed)?;
        let bytes = fs::read(&staged).map_err(|e| DownloadError::io("reading converted subtitles", e))?;

        if target_path != source && self.settings.general.backup_existing {
            backup_existing(&target_path).map_err(|e| DownloadError::io("backing up existing subtitles", e))?;
        }
        atomic_write(&target_path, &bytes).map_err(|e| DownloadError::io("writing converted subtitles", e))?;

        if target_path != source {
            if let Err(e) = fs::remove_file(&source) {
                tracing::warn!("Cannot remove {}: {}", source.display(), e);
            }
        }

        tracing::info!(
            "Post-processed {} -> {} ({} cues, {} removed)",
            source.display(),
            target_path.display(),
            report.cues,
            report.removed_cues
        );
        session.matched = Some(target_path);
        session.matched_format = Some(report.target_format);
        session.enter(Stage::PostProcessed);
        Ok(())
    }

    /// Remove the session's temporary files. Safe to call any number of times.
    pub fn cleanup(&self, mut session: Session) -> Session {
        if let Some(dir) = session.temp_dir.take() {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => tracing::debug!("Removed {}", path.display()),
                Err(e) => tracing::warn!("Cannot remove {}: {}", path.display(), e),
            }
        }
        session.payload = None;
        session.subtitle_file = None;
        session
    }

    /// Session temp directory, created on first use under `general.tmp_path`.
    fn work_dir(&self, session: &mut Session) -> DownloadResult<PathBuf> {
        if let Some(dir) = &session.temp_dir {
            return Ok(dir.path().to_path_buf());
        }

        let root = self.settings.general.tmp_dir();
        fs::create_dir_all(&root).map_err(|e| DownloadError::io("creating temp folder", e))?;
        let dir = tempfile::Builder::new()
            .prefix("subfetch-")
            .tempdir_in(&root)
            .map_err(|e| DownloadError::io("creating temp folder", e))?;
        let path = dir.path().to_path_buf();
        session.temp_dir = Some(dir);
        Ok(path)
    }
}

/// Run one step, turning its error into an `Errored` session.
fn step(mut session: Session, f: impl FnOnce(&mut Session) -> DownloadResult<()>) -> Session {
    match f(&mut session) {
        Ok(()) => session,
        Err(e) => session.fail(e),
    }
}

fn compute_fingerprint(movie: &Path) -> DownloadResult<MovieFingerprint> {
    MovieFingerprint::compute(movie).map_err(|e| DownloadError::io(format!("hashing '{}'", movie.display()), e))
}

fn normalize_languages<S: AsRef<str>>(languages: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for language in languages {
        let language = language.as_ref().trim().to_lowercase();
        if !language.is_empty() && !out.contains(&language) {
            out.push(language);
        }
    }
    out
}

fn movie_dir(movie: &Path) -> PathBuf {
    match movie.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn movie_stem(movie: &Path) -> String {
    movie
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `<movie stem>.<ext>` with the candidate's extension when it is a known
/// subtitle extension.
fn download_file_name(movie: &Path, candidate_name: &str, subtitle_extensions: &[&str]) -> String {
    let extension = extension_lower(Path::new(candidate_name))
        .filter(|ext| subtitle_extensions.contains(&ext.as_str()))
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string());
    let stem = movie_stem(movie);
    let stem = if stem.is_empty() { "subtitles".to_string() } else { stem };
    format!("{}.{}", stem, extension)
}

/// Copy `path` to `<stem>_backup.<ext>` when it exists. The original stays
/// in place until the caller replaces it.
fn backup_existing(path: &Path) -> io::Result<()> {
    if !path.is_file() {
        return Ok(());
    }
    let stem = movie_stem(path);
    let backup = match path.extension() {
        Some(ext) => path.with_file_name(format!("{}_backup.{}", stem, ext.to_string_lossy())),
        None => path.with_file_name(format!("{}_backup", stem)),
    };
    fs::copy(path, &backup)?;
    tracing::info!("Backed up {} to {}", path.display(), backup.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineEntry;
    use crate::downloader::cache::MemoryChecksumCache;
    use crate::engines::{Candidate, EngineError, EngineMeta, EngineResult, SubtitleEngine};
    use crate::movie_info::FixedMovieInfo;
    use crate::subtitles::FormatRegistry;
    use parking_lot::Mutex;
    use std::io::{Cursor, Write};
    use tempfile::{tempdir, TempDir};

    const SRT: &str = "1\n00:00:01,000 --> 00:00:02,000\nHello\n";

    struct FakeEngine {
        name: &'static str,
        results: EngineResult<Vec<Candidate>>,
        payloads: Vec<(String, Vec<u8>)>,
        fetched: Mutex<Vec<String>>,
    }

    impl FakeEngine {
        fn new(name: &'static str, results: EngineResult<Vec<Candidate>>) -> Self {
            Self {
                name,
                results,
                payloads: Vec::new(),
                fetched: Mutex::new(Vec::new()),
            }
        }

        fn with_payload(mut self, reference: &str, payload: impl Into<Vec<u8>>) -> Self {
            self.payloads.push((reference.to_string(), payload.into()));
            self
        }
    }

    impl SubtitleEngine for FakeEngine {
        fn meta(&self) -> EngineMeta {
            EngineMeta {
                name: self.name,
                description: "test engine",
                site_url: "http://localhost",
            }
        }

        fn search(&self, _movie: &MovieFingerprint, _language: &str) -> EngineResult<Vec<Candidate>> {
            self.results.clone()
        }

        fn fetch(&self, candidate: &Candidate) -> EngineResult<Vec<u8>> {
            self.fetched.lock().push(candidate.reference.clone());
            self.payloads
                .iter()
                .find(|(r, _)| *r == candidate.reference)
                .map(|(_, p)| p.clone())
                .ok_or_else(|| EngineError::fetch_failed(self.name, "expired"))
        }
    }

    fn candidate(engine: &str, reference: &str, name: &str) -> Candidate {
        Candidate {
            engine: engine.to_string(),
            name: name.to_string(),
            language: "pl".to_string(),
            size: None,
            reference: reference.to_string(),
            checksum: None,
            content_hash: None,
        }
    }

    struct Fixture {
        dir: TempDir,
        movie: PathBuf,
        downloader: SubtitleDownloader,
    }

    fn fixture_with(engines: Vec<FakeEngine>, configure: impl FnOnce(&mut Settings)) -> Fixture {
        fixture_with_fps(engines, Some(25.0), configure)
    }

    fn fixture_with_fps(engines: Vec<FakeEngine>, fps: Option<f64>, configure: impl FnOnce(&mut Settings)) -> Fixture {
        let dir = tempdir().unwrap();
        let movie = dir.path().join("Film.avi");
        fs::write(&movie, vec![7u8; 8192]).unwrap();

        let mut settings = Settings::default();
        settings.general.tmp_path = dir.path().join("tmp").to_string_lossy().into_owned();
        settings.engines.enabled = engines.iter().map(|e| EngineEntry::new(e.name, true)).collect();
        configure(&mut settings);

        let mut registry = EngineRegistry::new();
        for engine in engines {
            registry.register(Arc::new(engine));
        }

        let converter = SubtitleConverter::new(Arc::new(FormatRegistry::new()), Arc::new(FixedMovieInfo(fps)));
        let downloader = SubtitleDownloader::new(Arc::new(settings), Arc::new(registry), Arc::new(converter));
        Fixture { dir, movie, downloader }
    }

    fn fixture(engines: Vec<FakeEngine>) -> Fixture {
        fixture_with(engines, |_| {})
    }

    fn zip_payload(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer
                .start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn one_failing_engine_does_not_abort_search() {
        let f = fixture(vec![
            FakeEngine::new("A", Ok(vec![candidate("A", "1", "a.srt")])),
            FakeEngine::new("B", Err(EngineError::unavailable("B", "connection refused"))),
            FakeEngine::new("C", Ok(vec![candidate("C", "2", "c.srt")])),
        ]);

        let session = f.downloader.new_session(&f.movie);
        assert_eq!(f.downloader.list_loaded_engines(&session), vec!["A", "B", "C"]);

        let session = f.downloader.look_for_subtitles(session, &["pl"], None);
        assert!(session.succeeded());
        assert_eq!(session.stage(), Stage::Ready);
        assert_eq!(session.candidates().len(), 2);
        assert!(session.error().contains("B is unavailable"));
        assert_eq!(f.downloader.best_idx(&session), Some(0));
        assert!(f.downloader.need_to_show_list(&session));
    }

    #[test]
    fn identical_content_from_two_engines_is_listed_once() {
        let mut first = candidate("A", "1", "a.srt");
        first.content_hash = Some("FEED".to_string());
        let mut second = candidate("C", "9", "c.srt");
        second.content_hash = Some("feed".to_string());

        let f = fixture(vec![
            FakeEngine::new("A", Ok(vec![first])),
            FakeEngine::new("C", Ok(vec![second])),
        ]);
        let session = f.downloader.look_for_subtitles(f.downloader.new_session(&f.movie), &["pl", "en"], None);

        assert_eq!(session.candidates().len(), 1);
        assert_eq!(session.candidates()[0].engine, "A");
        assert!(!f.downloader.need_to_show_list(&session));
    }

    #[test]
    fn nothing_found_is_not_an_engine_error() {
        let f = fixture(vec![
            FakeEngine::new("A", Ok(Vec::new())),
            FakeEngine::new("B", Err(EngineError::unavailable("B", "down"))),
        ]);
        let session = f.downloader.look_for_subtitles(f.downloader.new_session(&f.movie), &["pl"], None);
        assert!(!session.succeeded());
        assert!(matches!(session.last_error(), Some(DownloadError::NoSubtitlesFound(_))));

        let f = fixture(vec![FakeEngine::new("B", Err(EngineError::unavailable("B", "down")))]);
        let session = f.downloader.look_for_subtitles(f.downloader.new_session(&f.movie), &["pl"], None);
        assert!(!session.succeeded());
        assert!(matches!(session.last_error(), Some(DownloadError::EngineUnavailable { .. })));
        assert_eq!(session.error(), "B is unavailable: down");
    }

    #[test]
    fn unknown_engine_leaves_engine_list_unchanged() {
        let f = fixture(vec![FakeEngine::new("A", Ok(Vec::new())), FakeEngine::new("B", Ok(Vec::new()))]);
        let session = Session::new(f.movie.clone(), Vec::new());
        let session = f.downloader.add_engines(session, &["A"]);
        assert_eq!(session.engine_names(), vec!["A"]);

        let session = f.downloader.add_engines(session, &["B", "Subscene"]);
        assert!(!session.succeeded());
        assert_eq!(session.last_error(), Some(&DownloadError::UnknownEngine("Subscene".into())));
        assert_eq!(session.engine_names(), vec!["A"]);
    }

    #[test]
    fn single_named_engine_search() {
        let f = fixture(vec![
            FakeEngine::new("A", Ok(vec![candidate("A", "1", "a.srt")])),
            FakeEngine::new("B", Ok(vec![candidate("B", "2", "b.srt")])),
        ]);
        let session = f.downloader.look_for_subtitles(f.downloader.new_session(&f.movie), &["pl"], Some("b"));
        assert_eq!(session.candidates().len(), 1);
        assert_eq!(session.current_engine(), Some("B"));

        let session = f.downloader.look_for_subtitles(session, &["pl"], Some("Nope"));
        assert!(matches!(session.last_error(), Some(DownloadError::UnknownEngine(_))));
        assert!(session.candidates().is_empty());
    }

    #[test]
    fn plain_payload_pipeline_with_backup_and_cache() {
        let mut verified = candidate("A", "1", "Film.PL.srt");
        verified.checksum = Some(Checksum::Md5(format!("{:x}", md5::compute(SRT))));
        let engine = FakeEngine::new("A", Ok(vec![candidate("A", "0", "other.srt"), verified])).with_payload("1", SRT);

        let f = fixture(vec![engine]);
        let cache = Arc::new(MemoryChecksumCache::new());
        let downloader = f.downloader.with_cache(cache.clone());
        let existing = f.dir.path().join("Film.srt");
        fs::write(&existing, "old").unwrap();

        let session = downloader.look_for_subtitles(downloader.new_session(&f.movie), &[] as &[&str], None);
        assert!(session.checksum().is_some());
        assert!(downloader.need_to_show_list(&session));

        let session = downloader.download(session, 1);
        assert!(session.succeeded(), "{}", session.error());
        assert_eq!(session.stage(), Stage::Verifying);
        let temp = session.temp_dir().unwrap().to_path_buf();
        assert!(temp.starts_with(f.dir.path().join("tmp")));

        let session = downloader.match_subtitles(session);
        assert_eq!(session.stage(), Stage::Matched);
        assert_eq!(session.matched(), Some(existing.as_path()));
        assert_eq!(session.matched_format(), Some("SRT"));
        assert_eq!(fs::read_to_string(&existing).unwrap(), SRT);
        assert_eq!(fs::read_to_string(f.dir.path().join("Film_backup.srt")).unwrap(), "old");

        // Disabled post-processing is a successful no-op
        let session = downloader.post_process_subtitles(session);
        assert!(session.succeeded());
        assert_eq!(session.stage(), Stage::Matched);

        let session = downloader.cleanup(session);
        assert!(!temp.exists());
        let session = downloader.cleanup(session);
        assert!(session.temp_dir().is_none());

        // The remembered match is picked without asking next time
        let session = downloader.look_for_subtitles(session, &["pl"], None);
        assert_eq!(downloader.best_idx(&session), Some(1));
        assert!(!downloader.need_to_show_list(&session));
    }

    #[test]
    fn archive_pipeline_with_post_processing() {
        let payload = zip_payload(&[("Other.srt", SRT), ("Film.sub", "{25}{50}Movie info: synchro\n{75}{100}Hej|tam\n")]);
        let engine = FakeEngine::new("A", Ok(vec![candidate("A", "z", "pack.zip")])).with_payload("z", payload);
        let f = fixture_with(vec![engine], |s| {
            s.postprocess.enabled = true;
            s.postprocess.sub_format = "SRT".to_string();
        });
        let d = &f.downloader;

        let session = d.look_for_subtitles(d.new_session(&f.movie), &["pl"], None);
        let session = d.download(session, 0);
        assert_eq!(session.stage(), Stage::Unpacking);

        let session = d.unpack(session, 0);
        assert!(session.succeeded(), "{}", session.error());
        assert_eq!(session.subtitle_file().and_then(|p| p.file_name()).unwrap(), "Film.sub");

        let session = d.match_subtitles(session);
        assert_eq!(session.matched(), Some(f.dir.path().join("Film.sub").as_path()));
        assert_eq!(session.matched_format(), Some("mDVD"));

        let session = d.post_process_subtitles(session);
        assert!(session.succeeded(), "{}", session.error());
        assert_eq!(session.stage(), Stage::PostProcessed);

        let srt = f.dir.path().join("Film.srt");
        assert_eq!(session.matched(), Some(srt.as_path()));
        assert!(!f.dir.path().join("Film.sub").exists());
        let written = fs::read_to_string(&srt).unwrap();
        assert!(written.contains("00:00:03,000 --> 00:00:04,000"));
        assert!(!written.to_lowercase().contains("synchro"));

        d.cleanup(session);
    }

    #[test]
    fn failed_post_processing_keeps_existing_subtitles() {
        let engine = FakeEngine::new("A", Ok(vec![candidate("A", "1", "Film.sub")])).with_payload("1", "{25}{50}Hej\n");
        let f = fixture_with_fps(vec![engine], None, |s| {
            s.postprocess.enabled = true;
            s.postprocess.sub_format = "SRT".to_string();
        });
        let d = &f.downloader;
        let existing = f.dir.path().join("Film.srt");
        fs::write(&existing, "mine").unwrap();

        let session = d.download(d.look_for_subtitles(d.new_session(&f.movie), &["pl"], None), 0);
        let session = d.match_subtitles(session);
        let raw = f.dir.path().join("Film.sub");
        assert_eq!(session.matched(), Some(raw.as_path()));

        // No frame rate for the mDVD positions
        let session = d.post_process_subtitles(session);
        assert_eq!(session.stage(), Stage::Errored);
        assert!(matches!(session.last_error(), Some(DownloadError::PostProcessFailed(_))));
        assert_eq!(fs::read_to_string(&existing).unwrap(), "mine");
        assert!(!f.dir.path().join("Film_backup.srt").exists());
        assert!(raw.exists());
        assert_eq!(session.matched(), Some(raw.as_path()));
        d.cleanup(session);
    }

    #[test]
    fn failed_steps_can_be_retried() {
        let mut bad = candidate("A", "1", "a.srt");
        bad.checksum = Some(Checksum::Md5("00000000000000000000000000000000".to_string()));
        let engine = FakeEngine::new("A", Ok(vec![bad, candidate("A", "2", "b.srt")])).with_payload("1", SRT).with_payload("2", SRT);
        let f = fixture(vec![engine]);
        let d = &f.downloader;

        let session = d.look_for_subtitles(d.new_session(&f.movie), &["pl"], None);

        let session = d.download(session, 5);
        assert_eq!(session.last_error(), Some(&DownloadError::InvalidIndex { index: 5, len: 2 }));

        let session = d.download(session, 0);
        assert!(matches!(session.last_error(), Some(DownloadError::VerifyFailed { .. })));
        assert_eq!(session.candidates().len(), 2);

        let session = d.download(session, 1);
        assert!(session.succeeded());
        assert!(session.last_error().is_none());
        assert_eq!(session.error(), "");
        let session = d.match_subtitles(session);
        assert!(f.dir.path().join("Film.srt").exists());
        d.cleanup(session);
    }

    #[test]
    fn unrecognized_download_is_not_matched() {
        let engine = FakeEngine::new("A", Ok(vec![candidate("A", "1", "a.srt")])).with_payload("1", "just some words\n");
        let f = fixture(vec![engine]);
        let d = &f.downloader;

        let session = d.download(d.look_for_subtitles(d.new_session(&f.movie), &["pl"], None), 0);
        let session = d.match_subtitles(session);
        assert!(matches!(session.last_error(), Some(DownloadError::NotMatched(_))));
        assert!(!f.dir.path().join("Film.srt").exists());

        // Unpack without an archive is out of order
        let session = d.unpack(session, 0);
        assert!(matches!(session.last_error(), Some(DownloadError::InvalidState { .. })));
        d.cleanup(session);
    }

    #[test]
    fn fetch_failure_is_recorded() {
        let f = fixture(vec![FakeEngine::new("A", Ok(vec![candidate("A", "gone", "a.srt")]))]);
        let d = &f.downloader;
        let session = d.download(d.look_for_subtitles(d.new_session(&f.movie), &["pl"], None), 0);
        assert_eq!(session.stage(), Stage::Errored);
        assert_eq!(session.error(), "A failed to fetch subtitles: expired");
    }

    #[test]
    fn set_movie_keeps_engines() {
        let f = fixture(vec![FakeEngine::new("A", Ok(Vec::new()))]);
        let session = f.downloader.new_session(&f.movie);
        let session = f.downloader.set_movie(session, f.dir.path().join("Other.mkv"));
        assert_eq!(session.engine_names(), vec!["A"]);
        assert_eq!(session.stage(), Stage::Idle);
        assert!(f.downloader.check_write_permissions(&session).is_ok());
    }

    #[test]
    fn download_names() {
        let exts = ["sub", "srt", "txt"];
        assert_eq!(download_file_name(Path::new("/m/Film.avi"), "Rel.SRT", &exts), "Film.srt");
        assert_eq!(download_file_name(Path::new("/m/Film.avi"), "12345", &exts), "Film.txt");
    }
}
