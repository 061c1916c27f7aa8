//! Movie metadata probing.
//!
//! The converter only needs the frame rate of a movie, and only to retime
//! between frame-based and time-based subtitles. "Could not determine" is
//! not an error for callers, so providers return an `Option`.

use std::path::Path;
use std::process::Command;

use serde_json::Value;
use thiserror::Error;

/// Errors from running a probe tool.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("File not found: {0}")]
    FileNotFound(std::path::PathBuf),

    #[error("Failed to run {tool}: {source}")]
    Spawn {
        tool: &'static str,
        source: std::io::Error,
    },

    #[error("{tool} failed with exit code {exit_code}: {message}")]
    CommandFailed {
        tool: &'static str,
        exit_code: i32,
        message: String,
    },

    #[error("Failed to parse probe output: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for probe operations.
pub type ProbeResult<T> = Result<T, ProbeError>;

/// What the core needs to know about a movie file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovieInfo {
    /// Frames per second of the first video stream.
    pub frame_rate: f64,
    /// Duration in seconds, when the container reports one.
    pub duration_secs: Option<f64>,
}

/// Source of movie metadata.
pub trait MovieInfoProvider: Send + Sync {
    /// Metadata for `path`, or `None` when it cannot be determined.
    fn movie_info(&self, path: &Path) -> Option<MovieInfo>;
}

/// Probe using `ffprobe -show_streams -of json`.
#[derive(Debug, Clone)]
pub struct FfprobeMovieInfo {
    program: String,
}

impl FfprobeMovieInfo {
    pub fn new() -> Self {
        Self {
            program: "ffprobe".to_string(),
        }
    }

    /// Use a different ffprobe executable.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run the probe and parse its output.
    pub fn probe(&self, path: &Path) -> ProbeResult<Option<MovieInfo>> {
        if !path.exists() {
            return Err(ProbeError::FileNotFound(path.to_path_buf()));
        }

        tracing::debug!("Probing movie: {}", path.display());

        let output = Command::new(&self.program)
            .args(["-v", "error", "-show_streams", "-show_format", "-of", "json"])
            .arg(path)
            .output()
            .map_err(|source| ProbeError::Spawn {
                tool: "ffprobe",
                source,
            })?;

        if !output.status.success() {
            return Err(ProbeError::CommandFailed {
                tool: "ffprobe",
                exit_code: output.status.code().unwrap_or(-1),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let json: Value = serde_json::from_slice(&output.stdout)?;
        Ok(parse_ffprobe_json(&json))
    }
}

impl Default for FfprobeMovieInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl MovieInfoProvider for FfprobeMovieInfo {
    fn movie_info(&self, path: &Path) -> Option<MovieInfo> {
        match self.probe(path) {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!("Could not probe {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// Extract the first video stream's frame rate from ffprobe JSON.
///
/// `r_frame_rate` is preferred; `avg_frame_rate` is used when the former
/// is missing or `0/0`.
fn parse_ffprobe_json(json: &Value) -> Option<MovieInfo> {
    let streams = json.get("streams")?.as_array()?;
    let video = streams
        .iter()
        .find(|s| s.get("codec_type").and_then(|t| t.as_str()) == Some("video"))?;

    let frame_rate = ["r_frame_rate", "avg_frame_rate"]
        .iter()
        .filter_map(|key| video.get(*key).and_then(|v| v.as_str()))
        .filter_map(parse_frame_rate)
        .find(|fps| fps.is_finite() && *fps > 0.0)?;

    let duration_secs = video
        .get("duration")
        .or_else(|| json.get("format").and_then(|f| f.get("duration")))
        .and_then(|d| d.as_str())
        .and_then(|d| d.parse::<f64>().ok());

    Some(MovieInfo {
        frame_rate,
        duration_secs,
    })
}

/// Parse frame rate string like "24000/1001" into a float.
pub fn parse_frame_rate(rate: &str) -> Option<f64> {
    if let Some((num, den)) = rate.split_once('/') {
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        if den != 0.0 {
            return Some(num / den);
        }
        return None;
    }
    rate.trim().parse().ok()
}

/// Provider that always answers with the same frame rate.
#[cfg(test)]
pub(crate) struct FixedMovieInfo(pub Option<f64>);

#[cfg(test)]
impl MovieInfoProvider for FixedMovieInfo {
    fn movie_info(&self, _path: &Path) -> Option<MovieInfo> {
        self.0.map(|frame_rate| MovieInfo {
            frame_rate,
            duration_secs: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frame_rate_strings() {
        let ntsc = parse_frame_rate("24000/1001").unwrap();
        assert!((ntsc - 23.976).abs() < 0.001);
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("abc"), None);
    }

    #[test]
    fn picks_first_video_stream() {
        let json = json!({
            "streams": [
                { "codec_type": "audio", "r_frame_rate": "0/0" },
                { "codec_type": "video", "r_frame_rate": "0/0", "avg_frame_rate": "25/1" }
            ],
            "format": { "duration": "5400.5" }
        });

        let info = parse_ffprobe_json(&json).unwrap();
        assert_eq!(info.frame_rate, 25.0);
        assert_eq!(info.duration_secs, Some(5400.5));
    }

    #[test]
    fn no_video_stream_is_none() {
        let json = json!({ "streams": [{ "codec_type": "audio" }] });
        assert!(parse_ffprobe_json(&json).is_none());
    }

    #[test]
    fn missing_file_is_an_error_and_none_for_callers() {
        let probe = FfprobeMovieInfo::new();
        let path = Path::new("/nonexistent/movie.mkv");
        assert!(matches!(probe.probe(path), Err(ProbeError::FileNotFound(_))));
        assert!(probe.movie_info(path).is_none());
    }
}
