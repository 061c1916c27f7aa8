//! Config manager for loading, saving, and atomic updates.
//!
//! Key features:
//! - Atomic writes (write to temp file, then rename)
//! - Section-level updates (only modified section is changed)
//! - Validation on load (unknown sections are dropped, defaults filled in)
//! - Preserves comments and formatting with toml_edit

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use toml_edit::{DocumentMut, Item};

use super::settings::{ConfigSection, Settings};
use crate::fs_util::atomic_write;
use crate::subtitles::encoding_for_label;

/// Errors that can occur during config operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Failed to parse config for editing: {0}")]
    EditParseError(#[from] toml_edit::TomlError),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid value for '{key}': {message}")]
    Invalid { key: &'static str, message: String },
}

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Manages application configuration.
///
/// Handles loading, saving, and atomic section-level updates.
pub struct ConfigManager {
    /// Path to the config file.
    config_path: PathBuf,
    /// Current settings loaded in memory.
    settings: Settings,
}

impl ConfigManager {
    /// Create a new config manager with the given config file path.
    ///
    /// Does not load the config - call `load()` or `load_or_create()` after.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            settings: Settings::default(),
        }
    }

    /// Get the config file path.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Get a reference to the current settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Get a mutable reference to the current settings.
    ///
    /// Note: Changes made here are only in memory until `save()` or
    /// `update_section()` is called.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Consume the manager and return the settings.
    pub fn into_settings(self) -> Settings {
        self.settings
    }

    /// Load config from file.
    ///
    /// Returns error if file doesn't exist.
    pub fn load(&mut self) -> ConfigResult<()> {
        if !self.config_path.exists() {
            return Err(ConfigError::NotFound(self.config_path.clone()));
        }

        let content = fs::read_to_string(&self.config_path)?;
        let settings: Settings = toml::from_str(&content)?;
        validate(&settings)?;
        self.settings = settings;
        Ok(())
    }

    /// Load config from file, creating with defaults if it doesn't exist.
    ///
    /// Also validates and cleans up the config, saving if changes were made.
    pub fn load_or_create(&mut self) -> ConfigResult<()> {
        if self.config_path.exists() {
            let content = fs::read_to_string(&self.config_path)?;
            let (settings, was_modified) = self.parse_validate_and_clean(&content)?;
            self.settings = settings;

            // Save back if we had to clean anything up
            if was_modified {
                tracing::debug!("Rewriting config {}", self.config_path.display());
                self.save()?;
            }
        } else {
            self.settings = Settings::default();
            self.save()?;
        }
        Ok(())
    }

    /// Ensure the configured temp and log directories exist.
    pub fn ensure_dirs_exist(&self) -> ConfigResult<()> {
        let dirs = [&self.settings.general.tmp_path, &self.settings.logging.log_dir];

        for dir in dirs.into_iter().filter(|d| !d.trim().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        Ok(())
    }

    /// Parse, validate, and clean up config content.
    ///
    /// Returns the settings and whether any modifications were made.
    fn parse_validate_and_clean(&self, content: &str) -> ConfigResult<(Settings, bool)> {
        // Parse into a document for editing
        let doc: DocumentMut = content.parse()?;

        // Parse into settings (this applies defaults for missing fields)
        let settings: Settings = toml::from_str(content)?;
        validate(&settings)?;

        let has_unknown = doc
            .iter()
            .any(|(key, _)| !ConfigSection::ALL.iter().any(|s| s.table_name() == key));

        // If the content re-serializes differently, we had missing defaults
        let regenerated = render_with_comments(&settings)?;
        let was_modified = has_unknown || content.trim() != regenerated.trim();

        Ok((settings, was_modified))
    }

    /// Save the entire config atomically.
    pub fn save(&self) -> ConfigResult<()> {
        let content = render_with_comments(&self.settings)?;
        atomic_write(&self.config_path, content.as_bytes())?;
        Ok(())
    }

    /// Update a specific section atomically.
    ///
    /// This re-reads the file from disk, updates only the specified section,
    /// and writes back atomically. Other sections, and comments outside the
    /// updated table, are left as they are on disk.
    pub fn update_section(&mut self, section: ConfigSection) -> ConfigResult<()> {
        // Re-read current file from disk (get fresh state)
        let current_content = if self.config_path.exists() {
            fs::read_to_string(&self.config_path)?
        } else {
            String::new()
        };

        let mut doc: DocumentMut = if current_content.is_empty() {
            DocumentMut::new()
        } else {
            current_content.parse()?
        };

        let section_toml = match section {
            ConfigSection::General => toml::to_string_pretty(&self.settings.general)?,
            ConfigSection::Engines => toml::to_string_pretty(&self.settings.engines)?,
            ConfigSection::Postprocess => toml::to_string_pretty(&self.settings.postprocess)?,
            ConfigSection::Scan => toml::to_string_pretty(&self.settings.scan)?,
            ConfigSection::Logging => toml::to_string_pretty(&self.settings.logging)?,
        };

        let section_doc: DocumentMut = section_toml.parse()?;
        let mut section_table = section_doc.as_table().clone();
        section_table.set_implicit(false);

        doc[section.table_name()] = Item::Table(section_table);

        atomic_write(&self.config_path, doc.to_string().as_bytes())?;

        Ok(())
    }
}

/// Serialize settings with a comment above every section.
fn render_with_comments(settings: &Settings) -> ConfigResult<String> {
    let mut doc: DocumentMut = toml::to_string_pretty(settings)?.parse()?;

    for section in ConfigSection::ALL {
        if let Some(table) = doc
            .get_mut(section.table_name())
            .and_then(Item::as_table_mut)
        {
            table.set_implicit(false);
            table
                .decor_mut()
                .set_prefix(format!("\n# {}\n", section.comment()));
        }
    }

    Ok(format!(
        "# subfetch configuration\n# Sections may be updated individually; comments outside them are kept.\n{}",
        doc
    ))
}

fn validate(settings: &Settings) -> ConfigResult<()> {
    encoding_for_label(&settings.general.fallback_encoding).map_err(|e| ConfigError::Invalid {
        key: "general.fallback_encoding",
        message: e.to_string(),
    })?;

    let pp_encoding = settings.postprocess.encoding.trim();
    if !pp_encoding.is_empty() {
        encoding_for_label(pp_encoding).map_err(|e| ConfigError::Invalid {
            key: "postprocess.encoding",
            message: e.to_string(),
        })?;
    }

    if settings.general.network_timeout_secs == 0 {
        return Err(ConfigError::Invalid {
            key: "general.network_timeout_secs",
            message: "must be greater than zero".to_string(),
        });
    }

    Ok(())
}
