//! Subtitle format conversion.
//!
//! # Components
//!
//! - **types**: the intermediate model (cues, documents, format descriptors)
//! - **formats**: one plugin per line-oriented syntax (mDVD, MPL2, SRT, TMPlayer)
//! - **registry**: the read-only catalog of plugins, used for detection
//! - **retime**: pure time/frame conversion, scaling and shifting
//! - **text**: byte-level I/O keeping encoding, BOM and line endings
//! - **converter**: detect → decode → retime → encode → write
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use subfetch_core::movie_info::FfprobeMovieInfo;
//! use subfetch_core::subtitles::{ConversionOptions, FormatRegistry, SubtitleConverter};
//!
//! let converter = SubtitleConverter::new(
//!     Arc::new(FormatRegistry::new()),
//!     Arc::new(FfprobeMovieInfo::new()),
//! );
//!
//! let options = ConversionOptions { source_fps: Some(23.976), ..Default::default() };
//! converter.convert_subtitles("movie.sub".as_ref(), "SRT", None, &options)?;
//! ```

pub mod converter;
mod error;
pub mod formats;
pub mod registry;
pub mod retime;
pub mod text;
mod types;

pub use converter::{ConversionOptions, ConversionReport, ConvertedDocument, SubtitleConverter};
pub use error::{ParseError, SubtitleError, SubtitleResult};
pub use formats::{MicroDvd, Mpl2, SubRip, SubtitleFormat, TmPlayer};
pub use registry::FormatRegistry;
pub use retime::RetimeOptions;
pub use text::{encoding_for_label, LineEnding, SubtitleText};
pub use types::{FormatDescriptor, SubtitleCue, SubtitleDocument, TimeBasis};
