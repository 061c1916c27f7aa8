//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Each section can be updated independently for atomic section-level updates.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::logging::LogLevel;

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// General behaviour (paths, languages, encodings).
    #[serde(default)]
    pub general: GeneralSettings,

    /// Download engines and their credentials.
    #[serde(default)]
    pub engines: EngineSettings,

    /// Post-processing of matched subtitles.
    #[serde(default)]
    pub postprocess: PostProcessSettings,

    /// Movie folder scanning.
    #[serde(default)]
    pub scan: ScanSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// General settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralSettings {
    /// Root folder for temporary files (empty = system temp dir).
    #[serde(default)]
    pub tmp_path: String,

    /// Path or name of the 7-Zip executable.
    #[serde(default = "default_p7zip_path")]
    pub p7zip_path: String,

    /// Preferred subtitle language (ISO 639-1).
    #[serde(default = "default_language")]
    pub language: String,

    /// Language tried after the preferred one (empty = none).
    #[serde(default = "default_language_backup")]
    pub language_backup: String,

    /// Keep an existing subtitle next to the movie as `<name>_backup.<ext>`.
    #[serde(default = "default_true")]
    pub backup_existing: bool,

    /// Encoding used for subtitle files that are not valid UTF-8.
    #[serde(default = "default_fallback_encoding")]
    pub fallback_encoding: String,

    /// Network timeout in seconds.
    #[serde(default = "default_network_timeout")]
    pub network_timeout_secs: u64,

    /// Extensions recognized as movie files.
    #[serde(default = "default_movie_extensions")]
    pub movie_extensions: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_p7zip_path() -> String {
    "7z".to_string()
}

fn default_language() -> String {
    "pl".to_string()
}

fn default_language_backup() -> String {
    "en".to_string()
}

fn default_fallback_encoding() -> String {
    "windows-1250".to_string()
}

fn default_network_timeout() -> u64 {
    30
}

fn default_movie_extensions() -> Vec<String> {
    [
        "avi", "asf", "divx", "m4v", "mkv", "mov", "mp4", "mpeg", "mpg", "ogm", "rm", "rmvb",
        "ts", "webm", "wmv",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            tmp_path: String::new(),
            p7zip_path: default_p7zip_path(),
            language: default_language(),
            language_backup: default_language_backup(),
            backup_existing: true,
            fallback_encoding: default_fallback_encoding(),
            network_timeout_secs: default_network_timeout(),
            movie_extensions: default_movie_extensions(),
        }
    }
}

impl GeneralSettings {
    /// Directory for session temp dirs.
    pub fn tmp_dir(&self) -> PathBuf {
        if self.tmp_path.trim().is_empty() {
            std::env::temp_dir()
        } else {
            PathBuf::from(&self.tmp_path)
        }
    }

    /// Configured languages in preference order, without blanks or duplicates.
    pub fn languages(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for lang in [&self.language, &self.language_backup] {
            let lang = lang.trim().to_lowercase();
            if !lang.is_empty() && !out.contains(&lang) {
                out.push(lang);
            }
        }
        out
    }
}

/// One entry of the ordered engine list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineEntry {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl EngineEntry {
    pub fn new(name: impl Into<String>, enabled: bool) -> Self {
        Self {
            name: name.into(),
            enabled,
        }
    }
}

/// Per-engine login data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineCredentials {
    #[serde(default)]
    pub nick: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub api_key: String,
}

/// Download engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Engines in query order.
    #[serde(default = "default_engine_entries")]
    pub enabled: Vec<EngineEntry>,

    /// Credentials keyed by engine name.
    #[serde(default)]
    pub credentials: BTreeMap<String, EngineCredentials>,
}

fn default_engine_entries() -> Vec<EngineEntry> {
    vec![
        EngineEntry::new("NapiProjekt", true),
        EngineEntry::new("OpenSubtitles", true),
        EngineEntry::new("Napisy24", true),
    ]
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            enabled: default_engine_entries(),
            credentials: BTreeMap::new(),
        }
    }
}

impl EngineSettings {
    /// Names of enabled engines, in configured order.
    pub fn enabled_names(&self) -> Vec<String> {
        self.enabled
            .iter()
            .filter(|e| e.enabled)
            .map(|e| e.name.clone())
            .collect()
    }

    /// Credentials for an engine (empty when none are configured).
    pub fn credentials_for(&self, engine: &str) -> EngineCredentials {
        self.credentials.get(engine).cloned().unwrap_or_default()
    }
}

/// Post-processing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostProcessSettings {
    /// Run post-processing after a successful match.
    #[serde(default)]
    pub enabled: bool,

    /// Target format name (empty = keep the detected format).
    #[serde(default)]
    pub sub_format: String,

    /// Target extension (empty = format default).
    #[serde(default)]
    pub sub_extension: String,

    /// Target encoding label (empty = keep the source encoding).
    #[serde(default)]
    pub encoding: String,

    /// Cues containing any of these words are dropped.
    #[serde(default = "default_remove_words")]
    pub remove_words: Vec<String>,
}

fn default_remove_words() -> Vec<String> {
    vec!["movie info".to_string(), "synchro".to_string()]
}

impl Default for PostProcessSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            sub_format: String::new(),
            sub_extension: String::new(),
            encoding: String::new(),
            remove_words: default_remove_words(),
        }
    }
}

/// Movie folder scan configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSettings {
    /// Descend into subdirectories.
    #[serde(default = "default_true")]
    pub recursive: bool,

    /// Skip movies that already have a subtitle next to them.
    #[serde(default)]
    pub skip_if_subtitles_exist: bool,

    /// Case-insensitive substrings; matching file names are skipped.
    #[serde(default = "default_skip_patterns")]
    pub skip_patterns: Vec<String>,
}

fn default_skip_patterns() -> Vec<String> {
    vec!["sample".to_string()]
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            recursive: true,
            skip_if_subtitles_exist: false,
            skip_patterns: default_skip_patterns(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default level when `RUST_LOG` is not set.
    #[serde(default)]
    pub level: LogLevel,

    /// Also write `subfetch.log` to this folder (empty = stderr only).
    #[serde(default)]
    pub log_dir: String,
}

/// Names of config sections for targeted updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigSection {
    General,
    Engines,
    Postprocess,
    Scan,
    Logging,
}

impl ConfigSection {
    /// All sections in file order.
    pub const ALL: [ConfigSection; 5] = [
        ConfigSection::General,
        ConfigSection::Engines,
        ConfigSection::Postprocess,
        ConfigSection::Scan,
        ConfigSection::Logging,
    ];

    /// Get the TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::General => "general",
            ConfigSection::Engines => "engines",
            ConfigSection::Postprocess => "postprocess",
            ConfigSection::Scan => "scan",
            ConfigSection::Logging => "logging",
        }
    }

    /// Comment written above the section.
    pub fn comment(&self) -> &'static str {
        match self {
            ConfigSection::General => "General options",
            ConfigSection::Engines => "Download engines, queried in the listed order",
            ConfigSection::Postprocess => "Post-processing of downloaded subtitles",
            ConfigSection::Scan => "Movie folder scanning",
            ConfigSection::Logging => "Logging configuration",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_serializes() {
        let settings = Settings::default();
        let toml = toml::to_string_pretty(&settings).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[[engines.enabled]]"));
        assert!(toml.contains("fallback_encoding"));
    }

    #[test]
    fn settings_round_trip() {
        let mut settings = Settings::default();
        settings.engines.credentials.insert(
            "OpenSubtitles".to_string(),
            EngineCredentials {
                api_key: "abc".to_string(),
                ..Default::default()
            },
        );

        let toml = toml::to_string_pretty(&settings).unwrap();
        let parsed: Settings = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let minimal = "[general]\nlanguage = \"en\"";
        let parsed: Settings = toml::from_str(minimal).unwrap();
        // Custom value preserved
        assert_eq!(parsed.general.language, "en");
        // Defaults applied for missing
        assert_eq!(parsed.general.fallback_encoding, "windows-1250");
        assert_eq!(parsed.engines.enabled_names().len(), 3);
        assert!(parsed.scan.recursive);
    }

    #[test]
    fn enabled_names_keep_order_and_skip_disabled() {
        let toml = r#"
[[engines.enabled]]
name = "Napisy24"

[[engines.enabled]]
name = "NapiProjekt"
enabled = false

[[engines.enabled]]
name = "OpenSubtitles"
enabled = true
"#;
        let parsed: Settings = toml::from_str(toml).unwrap();
        assert_eq!(parsed.engines.enabled_names(), vec!["Napisy24", "OpenSubtitles"]);
        assert_eq!(parsed.engines.credentials_for("Napisy24"), EngineCredentials::default());
    }

    #[test]
    fn languages_are_deduplicated() {
        let general = GeneralSettings {
            language: "PL".to_string(),
            language_backup: "pl".to_string(),
            ..Default::default()
        };
        assert_eq!(general.languages(), vec!["pl"]);

        let general = GeneralSettings {
            language_backup: String::new(),
            ..Default::default()
        };
        assert_eq!(general.languages(), vec!["pl"]);
        assert_eq!(GeneralSettings::default().languages(), vec!["pl", "en"]);
    }
}
