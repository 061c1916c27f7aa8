//! Archive extraction for downloaded payloads.
//!
//! Payloads are sniffed by magic bytes. ZIP and gzip are handled in
//! process; 7z goes through the external `7z` tool, which is also the only
//! path that supports passwords. Anything else is a plain subtitle file.

use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::process::Command;

use flate2::read::GzDecoder;
use thiserror::Error;
use zip::ZipArchive;

use crate::fs_util::extension_lower;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const SEVEN_ZIP_MAGIC: &[u8] = &[0x37, 0x7a, 0xbc, 0xaf, 0x27, 0x1c];

/// Name given to a gzip member that carries no file name.
const GZIP_DEFAULT_NAME: &str = "subtitles.txt";

/// Errors from archive extraction.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Payload is not an archive this extractor understands.
    #[error("Unsupported archive format")]
    Unsupported,

    /// The archive could not be read.
    #[error("Corrupt {kind} archive: {message}")]
    Corrupt { kind: &'static str, message: String },

    /// The archive holds no regular files.
    #[error("Archive is empty")]
    Empty,

    /// The external 7z tool failed.
    #[error("7z failed: {0}")]
    Tool(String),

    /// File I/O error.
    #[error("I/O error writing '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ArchiveError {
    fn corrupt(kind: &'static str, message: impl ToString) -> Self {
        Self::Corrupt {
            kind,
            message: message.to_string(),
        }
    }

    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Archive kinds recognized by magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Gzip,
    SevenZip,
}

impl ArchiveKind {
    pub fn name(&self) -> &'static str {
        match self {
            ArchiveKind::Zip => "zip",
            ArchiveKind::Gzip => "gzip",
            ArchiveKind::SevenZip => "7z",
        }
    }
}

/// Archive kind of `payload`, if any.
pub fn sniff(payload: &[u8]) -> Option<ArchiveKind> {
    if payload.starts_with(ZIP_MAGIC) {
        Some(ArchiveKind::Zip)
    } else if payload.starts_with(GZIP_MAGIC) {
        Some(ArchiveKind::Gzip)
    } else if payload.starts_with(SEVEN_ZIP_MAGIC) {
        Some(ArchiveKind::SevenZip)
    } else {
        None
    }
}

/// Unpacks a payload into a directory.
pub trait ArchiveExtractor: Send + Sync {
    /// Extract `payload` into `dest` and return the extracted file paths.
    fn unpack(&self, payload: &[u8], dest: &Path, password: Option<&str>) -> Result<Vec<PathBuf>, ArchiveError>;

    fn is_archive(&self, payload: &[u8]) -> bool {
        sniff(payload).is_some()
    }
}

/// ZIP and gzip in process, 7z through the external tool.
#[derive(Debug, Clone)]
pub struct DefaultExtractor {
    p7zip: String,
}

impl Default for DefaultExtractor {
    fn default() -> Self {
        Self::new("7z")
    }
}

impl DefaultExtractor {
    /// `p7zip` is the path or name of the 7z executable.
    pub fn new(p7zip: impl Into<String>) -> Self {
        Self { p7zip: p7zip.into() }
    }

    /// Whether the 7z tool can be started.
    pub fn p7zip_available(&self) -> bool {
        Command::new(&self.p7zip)
            .arg("i")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn unpack_zip(&self, payload: &[u8], dest: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
        let mut archive = ZipArchive::new(Cursor::new(payload)).map_err(|e| ArchiveError::corrupt("zip", e))?;

        let mut files = Vec::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(|e| ArchiveError::corrupt("zip", e))?;
            if entry.is_dir() {
                continue;
            }
            let Some(relative) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
                tracing::warn!("Skipping unsafe archive entry '{}'", entry.name());
                continue;
            };

            let mut bytes = Vec::new();
            entry
                .read_to_end(&mut bytes)
                .map_err(|e| ArchiveError::corrupt("zip", e))?;

            let path = dest.join(relative);
            write_entry(&path, &bytes)?;
            files.push(path);
        }
        Ok(files)
    }

    fn unpack_gzip(&self, payload: &[u8], dest: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
        let mut decoder = GzDecoder::new(payload);
        let mut bytes = Vec::new();
        decoder
            .read_to_end(&mut bytes)
            .map_err(|e| ArchiveError::corrupt("gzip", e))?;

        let name = decoder
            .header()
            .and_then(|h| h.filename())
            .map(|n| String::from_utf8_lossy(n).into_owned())
            .and_then(|n| safe_file_name(&n))
            .unwrap_or_else(|| GZIP_DEFAULT_NAME.to_string());

        let path = dest.join(name);
        write_entry(&path, &bytes)?;
        Ok(vec![path])
    }

    fn unpack_7z(&self, payload: &[u8], dest: &Path, password: Option<&str>) -> Result<Vec<PathBuf>, ArchiveError> {
        let archive = tempfile::Builder::new()
            .prefix("subfetch-")
            .suffix(".7z")
            .tempfile()
            .map_err(|e| ArchiveError::io(dest, e))?;
        fs::write(archive.path(), payload).map_err(|e| ArchiveError::io(archive.path(), e))?;

        // An explicit (possibly empty) password keeps 7z from prompting.
        let output = Command::new(&self.p7zip)
            .arg("x")
            .arg("-y")
            .arg(format!("-p{}", password.unwrap_or("")))
            .arg(format!("-o{}", dest.display()))
            .arg(archive.path())
            .output()
            .map_err(|e| ArchiveError::Tool(format!("cannot run '{}': {}", self.p7zip, e)))?;

        if !output.status.success() {
            return Err(ArchiveError::Tool(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        list_files(dest)
    }
}

impl ArchiveExtractor for DefaultExtractor {
    fn unpack(&self, payload: &[u8], dest: &Path, password: Option<&str>) -> Result<Vec<PathBuf>, ArchiveError> {
        let kind = sniff(payload).ok_or(ArchiveError::Unsupported)?;
        fs::create_dir_all(dest).map_err(|e| ArchiveError::io(dest, e))?;

        tracing::debug!("Unpacking {} archive ({} bytes) to {}", kind.name(), payload.len(), dest.display());
        let mut files = match kind {
            ArchiveKind::Zip => self.unpack_zip(payload, dest)?,
            ArchiveKind::Gzip => self.unpack_gzip(payload, dest)?,
            ArchiveKind::SevenZip => self.unpack_7z(payload, dest, password)?,
        };

        if files.is_empty() {
            return Err(ArchiveError::Empty);
        }
        files.sort();
        Ok(files)
    }
}

fn write_entry(path: &Path, bytes: &[u8]) -> Result<(), ArchiveError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ArchiveError::io(parent, e))?;
    }
    fs::write(path, bytes).map_err(|e| ArchiveError::io(path, e))
}

/// Last normal component of an archive-provided name.
fn safe_file_name(name: &str) -> Option<String> {
    Path::new(name)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .last()
        .filter(|n| !n.is_empty())
}

/// Regular files under `dir` that really live inside it.
fn list_files(dir: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let root = dir.canonicalize().map_err(|e| ArchiveError::io(dir, e))?;
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let entries = fs::read_dir(&current).map_err(|e| ArchiveError::io(&current, e))?;
        for entry in entries.filter_map(Result::ok) {
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                match path.canonicalize() {
                    Ok(real) if real.starts_with(&root) => files.push(path),
                    _ => tracing::warn!("Skipping file outside extraction folder: {}", path.display()),
                }
            }
        }
    }
    Ok(files)
}

/// Pick the subtitle among extracted files.
///
/// Files with one of `subtitle_extensions` are preferred; among those the
/// one whose stem shares the longest prefix with `movie_stem` wins, ties
/// going to the first entry.
pub fn select_subtitle<'a>(files: &'a [PathBuf], movie_stem: &str, subtitle_extensions: &[&str]) -> Option<&'a PathBuf> {
    let subtitles: Vec<&PathBuf> = files
        .iter()
        .filter(|f| {
            extension_lower(f).is_some_and(|ext| subtitle_extensions.iter().any(|s| s.eq_ignore_ascii_case(&ext)))
        })
        .collect();
    let pool: Vec<&PathBuf> = if subtitles.is_empty() {
        files.iter().collect()
    } else {
        subtitles
    };

    let movie_stem = movie_stem.to_lowercase();
    let mut best: Option<(&PathBuf, usize)> = None;
    for file in pool {
        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let score = common_prefix_len(&stem, &movie_stem);
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((file, score));
        }
    }
    best.map(|(file, _)| file)
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    fn zip_payload(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn sniffs_magic_bytes() {
        assert_eq!(sniff(b"PK\x03\x04rest"), Some(ArchiveKind::Zip));
        assert_eq!(sniff(&[0x1f, 0x8b, 8, 0]), Some(ArchiveKind::Gzip));
        assert_eq!(sniff(&[0x37, 0x7a, 0xbc, 0xaf, 0x27, 0x1c, 0, 4]), Some(ArchiveKind::SevenZip));
        assert_eq!(sniff(b"{1}{2}Hello"), None);
        assert!(!DefaultExtractor::default().is_archive(b"1\n00:00:01,000 --> 00:00:02,000\n"));
    }

    #[test]
    fn unpacks_zip_entries() {
        let dir = tempdir().unwrap();
        let payload = zip_payload(&[("Film.srt", "1\n00:00:01,000 --> 00:00:02,000\nHi\n"), ("sub/readme.nfo", "x")]);

        let files = DefaultExtractor::default().unpack(&payload, dir.path(), None).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.contains(&dir.path().join("Film.srt")));
        assert_eq!(fs::read_to_string(dir.path().join("sub/readme.nfo")).unwrap(), "x");
    }

    #[test]
    fn zip_traversal_entries_are_skipped() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out");
        let payload = zip_payload(&[("../evil.srt", "x"), ("ok.srt", "y")]);

        let files = DefaultExtractor::default().unpack(&payload, &dest, None).unwrap();
        assert_eq!(files, vec![dest.join("ok.srt")]);
        assert!(!dir.path().join("evil.srt").exists());
    }

    #[test]
    fn unpacks_gzip_with_member_name() {
        let dir = tempdir().unwrap();
        let mut encoder = flate2::GzBuilder::new()
            .filename("../Film.sub")
            .write(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"{1}{25}Hej\n").unwrap();
        let payload = encoder.finish().unwrap();

        let files = DefaultExtractor::default().unpack(&payload, dir.path(), None).unwrap();
        assert_eq!(files, vec![dir.path().join("Film.sub")]);
        assert_eq!(fs::read(&files[0]).unwrap(), b"{1}{25}Hej\n");
    }

    #[test]
    fn corrupt_and_plain_payloads_fail() {
        let dir = tempdir().unwrap();
        let extractor = DefaultExtractor::default();
        assert!(matches!(
            extractor.unpack(b"PK\x03\x04garbage", dir.path(), None),
            Err(ArchiveError::Corrupt { kind: "zip", .. })
        ));
        assert!(matches!(
            extractor.unpack(b"plain text", dir.path(), None),
            Err(ArchiveError::Unsupported)
        ));
    }

    #[test]
    fn missing_7z_tool_is_reported() {
        let dir = tempdir().unwrap();
        let extractor = DefaultExtractor::new("/nonexistent/7z");
        assert!(!extractor.p7zip_available());
        assert!(matches!(
            extractor.unpack(&[0x37, 0x7a, 0xbc, 0xaf, 0x27, 0x1c, 0, 4], dir.path(), Some("pw")),
            Err(ArchiveError::Tool(_))
        ));
    }

    #[test]
    fn selects_best_matching_subtitle() {
        let files: Vec<PathBuf> = ["a/readme.txt.nfo", "a/Other.Movie.srt", "a/Film.2019.720p.srt", "a/Film.srt"]
            .iter()
            .map(PathBuf::from)
            .collect();
        let exts = ["sub", "srt", "txt"];

        let best = select_subtitle(&files, "Film.2019.720p.x264", &exts).unwrap();
        assert_eq!(best, &PathBuf::from("a/Film.2019.720p.srt"));

        // No prefix in common: first subtitle-like entry
        let best = select_subtitle(&files, "zzz", &exts).unwrap();
        assert_eq!(best, &PathBuf::from("a/Other.Movie.srt"));

        assert!(select_subtitle(&[], "Film", &exts).is_none());
    }
}
