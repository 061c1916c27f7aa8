//! Download engines: one implementation per remote subtitle source.
//!
//! Engines are stateless beyond their configuration and are shared
//! read-only through the [`EngineRegistry`]. A search that finds nothing
//! returns an empty list; only transport or protocol failures are errors.

mod error;
pub mod fingerprint;
pub mod napiprojekt;
pub mod napisy24;
pub mod opensubtitles;
pub mod registry;
pub mod transport;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use error::{EngineError, EngineResult};
pub use fingerprint::MovieFingerprint;
pub use napiprojekt::NapiProjektEngine;
pub use napisy24::Napisy24Engine;
pub use opensubtitles::OpenSubtitlesEngine;
pub use registry::EngineRegistry;
pub use transport::{HttpClient, HttpRequest, HttpResponse, ReqwestClient, TransportError};

/// Static description of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineMeta {
    pub name: &'static str,
    pub description: &'static str,
    pub site_url: &'static str,
}

/// Checksum of a payload, when the source publishes one upfront.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Checksum {
    /// Lowercase hex MD5.
    Md5(String),
    /// Lowercase hex SHA-256.
    Sha256(String),
}

impl Checksum {
    /// Whether `payload` hashes to this checksum.
    pub fn verify(&self, payload: &[u8]) -> bool {
        match self {
            Checksum::Md5(expected) => {
                format!("{:x}", md5::compute(payload)).eq_ignore_ascii_case(expected)
            }
            Checksum::Sha256(expected) => {
                let digest = Sha256::digest(payload);
                hex(&digest).eq_ignore_ascii_case(expected)
            }
        }
    }

    pub fn algorithm(&self) -> &'static str {
        match self {
            Checksum::Md5(_) => "md5",
            Checksum::Sha256(_) => "sha256",
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// One search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    /// Engine that produced the result.
    pub engine: String,
    /// Display name (release or file name).
    pub name: String,
    /// Language code the result was searched with.
    pub language: String,
    /// Payload size in bytes, when known.
    pub size: Option<u64>,
    /// Engine-specific reference passed back to `fetch`.
    pub reference: String,
    /// Payload checksum for verification after download.
    pub checksum: Option<Checksum>,
    /// Content identity used for de-duplication across engines.
    pub content_hash: Option<String>,
}

impl Candidate {
    /// De-duplication key: content hash, else `engine:reference`.
    pub fn dedup_key(&self) -> String {
        match &self.content_hash {
            Some(hash) => format!("hash:{}", hash.to_ascii_lowercase()),
            None => format!("{}:{}", self.engine, self.reference),
        }
    }
}

/// A remote subtitle source.
pub trait SubtitleEngine: Send + Sync {
    fn meta(&self) -> EngineMeta;

    fn name(&self) -> &'static str {
        self.meta().name
    }

    /// Search one language for a movie. No match is an empty list.
    fn search(&self, movie: &MovieFingerprint, language: &str) -> EngineResult<Vec<Candidate>>;

    /// Download the payload of a candidate produced by this engine.
    fn fetch(&self, candidate: &Candidate) -> EngineResult<Vec<u8>>;

    /// Password for archives served by this engine.
    fn archive_password(&self) -> Option<&str> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_verification() {
        let payload = b"1\n00:00:01,000 --> 00:00:02,000\nHi\n";
        let md5 = Checksum::Md5(format!("{:x}", md5::compute(payload)).to_uppercase());
        assert!(md5.verify(payload));
        assert!(!md5.verify(b"other"));

        let sha = Checksum::Sha256(hex(&Sha256::digest(payload)));
        assert!(sha.verify(payload));
        assert!(!sha.verify(b""));
        assert_eq!(sha.algorithm(), "sha256");
    }

    #[test]
    fn dedup_key_prefers_content_hash() {
        let mut candidate = Candidate {
            engine: "A".to_string(),
            name: "x".to_string(),
            language: "pl".to_string(),
            size: None,
            reference: "42".to_string(),
            checksum: None,
            content_hash: None,
        };
        assert_eq!(candidate.dedup_key(), "A:42");

        candidate.content_hash = Some("ABC".to_string());
        assert_eq!(candidate.dedup_key(), "hash:abc");
    }
}
