//! Movie folder scanning.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::ScanSettings;
use crate::fs_util::extension_lower;
use crate::subtitles::FormatRegistry;

/// Movie files under `dir`, sorted.
///
/// Names containing one of `settings.skip_patterns` (case-insensitive) are
/// skipped, and with `skip_if_subtitles_exist` so are movies that already
/// have `<stem>.<subtitle ext>` next to them. Unreadable subdirectories are
/// logged and skipped; an unreadable `dir` is an error.
pub fn find_movies(dir: &Path, settings: &ScanSettings, movie_extensions: &[String]) -> io::Result<Vec<PathBuf>> {
    let subtitle_extensions = FormatRegistry::new().extensions();
    let skip_patterns: Vec<String> = settings
        .skip_patterns
        .iter()
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect();

    let mut movies = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    let mut first = true;

    while let Some(current) = pending.pop() {
        let entries = match fs::read_dir(&current) {
            Ok(entries) => entries,
            Err(e) if first => return Err(e),
            Err(e) => {
                tracing::warn!("Skipping {}: {}", current.display(), e);
                continue;
            }
        };
        first = false;

        for entry in entries.filter_map(Result::ok) {
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };

            if file_type.is_dir() {
                if settings.recursive {
                    pending.push(path);
                }
                continue;
            }

            let is_movie = extension_lower(&path).is_some_and(|ext| {
                movie_extensions
                    .iter()
                    .any(|m| m.trim_start_matches('.').eq_ignore_ascii_case(&ext))
            });
            if !is_movie {
                continue;
            }

            let name = entry.file_name().to_string_lossy().to_lowercase();
            if skip_patterns.iter().any(|p| name.contains(p.as_str())) {
                tracing::debug!("Skipping {} (pattern)", path.display());
                continue;
            }

            if settings.skip_if_subtitles_exist && has_subtitles(&path, &subtitle_extensions) {
                tracing::debug!("Skipping {} (has subtitles)", path.display());
                continue;
            }

            movies.push(path);
        }
    }

    movies.sort();
    tracing::info!("Found {} movie(s) in {}", movies.len(), dir.display());
    Ok(movies)
}

fn has_subtitles(movie: &Path, subtitle_extensions: &[&str]) -> bool {
    subtitle_extensions
        .iter()
        .any(|ext| movie.with_extension(ext).is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn extensions() -> Vec<String> {
        vec!["avi".to_string(), "mkv".to_string()]
    }

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn finds_movies_recursively_and_sorted() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("b.MKV"));
        touch(&dir.path().join("a.avi"));
        touch(&dir.path().join("notes.txt"));
        touch(&dir.path().join("season/e01.avi"));
        touch(&dir.path().join("a-sample.avi"));

        let found = find_movies(dir.path(), &ScanSettings::default(), &extensions()).unwrap();
        assert_eq!(
            found,
            vec![
                dir.path().join("a.avi"),
                dir.path().join("b.MKV"),
                dir.path().join("season/e01.avi"),
            ]
        );

        let flat = ScanSettings {
            recursive: false,
            ..Default::default()
        };
        assert_eq!(find_movies(dir.path(), &flat, &extensions()).unwrap().len(), 2);
    }

    #[test]
    fn skips_movies_with_subtitles() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("a.avi"));
        touch(&dir.path().join("a.srt"));
        touch(&dir.path().join("b.avi"));

        let settings = ScanSettings {
            skip_if_subtitles_exist: true,
            ..Default::default()
        };
        let found = find_movies(dir.path(), &settings, &extensions()).unwrap();
        assert_eq!(found, vec![dir.path().join("b.avi")]);
    }

    #[test]
    fn missing_dir_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(find_movies(&dir.path().join("nope"), &ScanSettings::default(), &extensions()).is_err());
    }
}
