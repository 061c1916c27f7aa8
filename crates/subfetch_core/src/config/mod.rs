//! Configuration management for subfetch.
//!
//! This module provides:
//! - TOML-based configuration with logical sections
//! - Atomic file writes (write to temp, then rename)
//! - Section-level updates (only changed section is modified)
//! - Validation on load with automatic defaults
//!
//! Settings are read-only input to the converter, engines and downloader;
//! they are passed in explicitly and never read from a global.
//!
//! # Example
//!
//! ```no_run
//! use subfetch_core::config::{ConfigManager, ConfigSection};
//!
//! let mut config = ConfigManager::new(".config/subfetch.toml");
//! config.load_or_create().unwrap();
//!
//! println!("Language: {}", config.settings().general.language);
//!
//! config.settings_mut().postprocess.enabled = true;
//! config.update_section(ConfigSection::Postprocess).unwrap();
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    ConfigSection, EngineCredentials, EngineEntry, EngineSettings, GeneralSettings,
    LoggingSettings, PostProcessSettings, ScanSettings, Settings,
};
