//! Movie identity used by the engines.
//!
//! - `md5_10mb`: MD5 of the first 10 MiB (NapiProjekt / Napisy24 id, and
//!   the session checksum)
//! - `osdb_hash`: OpenSubtitles hash, file size plus the wrapping sum of
//!   the little-endian u64 words of the first and last 64 KiB

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Bytes hashed for the MD5 identity.
pub const MD5_CHUNK: u64 = 10 * 1024 * 1024;

/// Bytes read from each end for the OpenSubtitles hash.
pub const OSDB_CHUNK: u64 = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieFingerprint {
    pub path: PathBuf,
    pub file_name: String,
    pub size: u64,
    /// Lowercase hex.
    pub md5_10mb: String,
    /// 16 lowercase hex digits.
    pub osdb_hash: String,
}

impl MovieFingerprint {
    /// Hash a movie file.
    pub fn compute(path: &Path) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let size = file.metadata()?.len();

        let md5_10mb = md5_prefix(&mut file, MD5_CHUNK)?;
        let osdb_hash = format!("{:016x}", osdb_hash(&mut file, size)?);

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        tracing::debug!(
            "Fingerprint {}: size={} md5={} osdb={}",
            file_name,
            size,
            md5_10mb,
            osdb_hash
        );

        Ok(Self {
            path: path.to_path_buf(),
            file_name,
            size,
            md5_10mb,
            osdb_hash,
        })
    }

    /// The session checksum (MD5 identity).
    pub fn checksum(&self) -> &str {
        &self.md5_10mb
    }
}

fn md5_prefix(file: &mut File, limit: u64) -> io::Result<String> {
    file.seek(SeekFrom::Start(0))?;
    let mut context = md5::Context::new();
    let mut reader = file.take(limit);
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        context.consume(&buf[..n]);
    }
    Ok(format!("{:x}", context.compute()))
}

fn osdb_hash(file: &mut File, size: u64) -> io::Result<u64> {
    let chunk = OSDB_CHUNK.min(size);
    let mut hash = size;

    for offset in [0, size - chunk] {
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; chunk as usize];
        file.read_exact(&mut buf)?;
        for word in buf.chunks_exact(8) {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(word);
            hash = hash.wrapping_add(u64::from_le_bytes(bytes));
        }
    }

    Ok(hash)
}
