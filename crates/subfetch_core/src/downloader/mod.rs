//! Multi-engine download pipeline.
//!
//! Search every enabled engine, merge the candidates, then fetch, unpack,
//! verify, place and post-process the chosen one. See
//! [`SubtitleDownloader`] for the stage sequence.

pub mod archive;
pub mod cache;
pub mod candidates;
mod errors;
mod orchestrator;
mod session;

pub use archive::{ArchiveError, ArchiveExtractor, ArchiveKind, DefaultExtractor};
pub use cache::{ChecksumCache, FileChecksumCache, MemoryChecksumCache};
pub use errors::{DownloadError, DownloadResult};
pub use orchestrator::SubtitleDownloader;
pub use session::{Session, Stage};
