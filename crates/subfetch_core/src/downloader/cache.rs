//! Movie checksum → matched candidate cache.
//!
//! Remembers which candidate was matched for a movie so a later search for
//! the same file can pick it without asking.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::fs_util::atomic_write;

/// Lookup and record of previously matched candidates.
pub trait ChecksumCache: Send + Sync {
    /// Dedup key of the candidate matched for `movie_checksum`.
    fn lookup(&self, movie_checksum: &str) -> Option<String>;

    /// Remember `candidate_key` as the match for `movie_checksum`.
    fn record(&self, movie_checksum: &str, candidate_key: &str) -> io::Result<()>;
}

/// In-process cache.
#[derive(Debug, Default)]
pub struct MemoryChecksumCache {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryChecksumCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChecksumCache for MemoryChecksumCache {
    fn lookup(&self, movie_checksum: &str) -> Option<String> {
        self.entries.lock().get(&movie_checksum.to_lowercase()).cloned()
    }

    fn record(&self, movie_checksum: &str, candidate_key: &str) -> io::Result<()> {
        self.entries
            .lock()
            .insert(movie_checksum.to_lowercase(), candidate_key.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CacheEntry {
    candidate: String,
    recorded_at: String,
}

/// JSON file backed cache, rewritten atomically on every record.
#[derive(Debug)]
pub struct FileChecksumCache {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, CacheEntry>>,
}

impl FileChecksumCache {
    /// Open the cache at `path`. A missing file is an empty cache; an
    /// unreadable one is logged and replaced on the next record.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring corrupt checksum cache {}: {}", path.display(), e);
                BTreeMap::new()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                tracing::warn!("Cannot read checksum cache {}: {}", path.display(), e);
                BTreeMap::new()
            }
        };
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// When the entry for `movie_checksum` was recorded (RFC 3339).
    pub fn recorded_at(&self, movie_checksum: &str) -> Option<String> {
        self.entries
            .lock()
            .get(&movie_checksum.to_lowercase())
            .map(|e| e.recorded_at.clone())
    }
}

impl ChecksumCache for FileChecksumCache {
    fn lookup(&self, movie_checksum: &str) -> Option<String> {
        self.entries
            .lock()
            .get(&movie_checksum.to_lowercase())
            .map(|e| e.candidate.clone())
    }

    fn record(&self, movie_checksum: &str, candidate_key: &str) -> io::Result<()> {
        let mut entries = self.entries.lock();
        entries.insert(
            movie_checksum.to_lowercase(),
            CacheEntry {
                candidate: candidate_key.to_string(),
                recorded_at: chrono::Utc::now().to_rfc3339(),
            },
        );
        let json = serde_json::to_string_pretty(&*entries).map_err(io::Error::other)?;
        atomic_write(&self.path, json.as_bytes())
    }
}
