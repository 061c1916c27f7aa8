//! subfetch core - subtitle conversion and download pipeline
//!
//! This crate contains all business logic with zero UI dependencies.
//! It is used by the `subfetch` command-line tool.

pub mod config;
pub mod downloader;
pub mod engines;
pub mod fs_util;
pub mod logging;
pub mod movie_info;
pub mod scan;
pub mod subtitles;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_returns_value() {
        assert!(!version().is_empty());
    }
}
