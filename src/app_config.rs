use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::path::PathBuf;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Subtitle languages to fetch, ISO 639-1 or 639-2 codes
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,

    /// Directory holding the databases, HTTP caches and subtitle blobs
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Subtitle provider config
    #[serde(default)]
    pub opensubtitles: OpenSubtitlesConfig,

    /// Synchronizer config
    #[serde(default)]
    pub subsync: SubsyncConfig,

    /// Library scanning config
    #[serde(default)]
    pub scan: ScanConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Subtitle provider settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OpenSubtitlesConfig {
    /// REST endpoint base URL
    #[serde(default = "default_opensubtitles_endpoint")]
    pub endpoint: String,

    /// API key pool; rotated when a key's daily quota runs out
    #[serde(default)]
    pub api_keys: Vec<String>,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Synchronizer settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SubsyncConfig {
    /// Binary to spawn
    #[serde(default = "default_subsync_binary")]
    pub binary: String,

    /// Effort passed to the tool, 0.0 to 1.0
    #[serde(default = "default_subsync_effort")]
    pub effort: f64,
}

/// Library scanning settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ScanConfig {
    /// Video files smaller than this are skipped as samples/extras
    #[serde(default = "default_min_movie_size")]
    pub min_movie_size: u64,

    /// Number of videos processed concurrently
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Hours between unconditional full rescans
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,

    /// Seconds a scan request is debounced after the previous scan started
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: u64,
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

fn default_languages() -> Vec<String> {
    vec!["en".to_string()]
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("subagent")
}

fn default_opensubtitles_endpoint() -> String {
    "https://api.opensubtitles.com/api/v1".to_string()
}

fn default_user_agent() -> String {
    "SubAgent/1.0".to_string()
}

fn default_subsync_binary() -> String {
    "subsync".to_string()
}

fn default_subsync_effort() -> f64 {
    1.0
}

fn default_min_movie_size() -> u64 {
    32 * 1024 * 1024
}

fn default_concurrency() -> usize {
    2
}

fn default_interval_hours() -> u64 {
    12
}

fn default_debounce_secs() -> u64 {
    5
}

impl Config {
    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        if self.languages.is_empty() {
            return Err(anyhow!("At least one subtitle language is required"));
        }
        for code in &self.languages {
            crate::language_utils::SubtitleLanguage::parse(code)
                .map_err(|_| anyhow!("Unknown language code: {}", code))?;
        }
        if self.opensubtitles.api_keys.is_empty() {
            return Err(anyhow!(
                "At least one OpenSubtitles API key is required"
            ));
        }
        if !(0.0..=1.0).contains(&self.subsync.effort) {
            return Err(anyhow!(
                "Synchronization effort must be between 0.0 and 1.0"
            ));
        }
        if self.scan.concurrency == 0 {
            return Err(anyhow!("Scan concurrency must be at least 1"));
        }
        Ok(())
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            languages: default_languages(),
            cache_dir: default_cache_dir(),
            opensubtitles: OpenSubtitlesConfig::default(),
            subsync: SubsyncConfig::default(),
            scan: ScanConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}

impl Default for OpenSubtitlesConfig {
    fn default() -> Self {
        OpenSubtitlesConfig {
            endpoint: default_opensubtitles_endpoint(),
            api_keys: Vec::new(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for SubsyncConfig {
    fn default() -> Self {
        SubsyncConfig {
            binary: default_subsync_binary(),
            effort: default_subsync_effort(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            min_movie_size: default_min_movie_size(),
            concurrency: default_concurrency(),
            interval_hours: default_interval_hours(),
            debounce_secs: default_debounce_secs(),
        }
    }
}
