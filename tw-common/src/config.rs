//! Configuration loading
//!
//! Bootstrap settings come from a TOML file. Resolution order for the file
//! itself:
//! 1. Explicit path (command-line argument)
//! 2. `TW_CONFIG` environment variable
//! 3. `<config dir>/trackwall/config.toml`
//!
//! A missing file is not an error: every field has a compiled default and the
//! binaries layer their own CLI/env overrides on top.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{Error, Result};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "TW_CONFIG";

/// Complete TOML configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TomlConfig {
    pub server: ServerConfig,
    pub lastfm: LastFmConfig,
    pub enrich: EnrichConfig,
    pub cache: CacheConfig,
    pub carousel: CarouselConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Base URL the bundled placeholder art is served from
    pub public_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 5780,
            public_base_url: "http://localhost:5780".to_string(),
        }
    }
}

/// Listening-history service settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LastFmConfig {
    pub base_url: String,
    pub username: Option<String>,
    pub api_key: Option<String>,
    /// Plays per history page
    pub page_size: usize,
}

impl Default for LastFmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://ws.audioscrobbler.com/2.0/".to_string(),
            username: None,
            api_key: None,
            page_size: 50,
        }
    }
}

impl LastFmConfig {
    /// Username and API key, when both are present and non-blank
    pub fn credentials(&self) -> Option<(String, String)> {
        let username = self.username.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let api_key = self.api_key.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        Some((username.to_string(), api_key.to_string()))
    }
}

/// Track enrichment settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EnrichConfig {
    /// Art at or above this declared size stays a URL reference
    pub inline_max_bytes: u64,
    /// Art used when a scrobble carries none; defaults to
    /// `<public_base_url>/default.webp`
    pub placeholder_art_url: Option<String>,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            inline_max_bytes: 2 * 1024 * 1024,
            placeholder_art_url: None,
        }
    }
}

/// Coalescing cache settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_ms: 1000 }
    }
}

/// Carousel client tuning
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CarouselConfig {
    pub server_url: String,
    /// Indices requested per background fetch
    pub chunk_size: usize,
    /// Fetch ahead once this many or fewer tracks remain after the cursor
    pub prefetch_threshold: usize,
    /// Tracks ahead of the cursor whose art is preloaded
    pub preload_ahead: usize,
    pub transition_ms: u64,
    pub swipe_threshold_px: f32,
    pub refresh_interval_secs: u64,
    /// How long a completed full fetch suppresses the next sweep
    pub marker_validity_secs: u64,
    /// Override for the persisted fetch marker location
    pub marker_path: Option<PathBuf>,
}

impl Default for CarouselConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5780".to_string(),
            chunk_size: 5,
            prefetch_threshold: 3,
            preload_ahead: 3,
            transition_ms: 500,
            swipe_threshold_px: 50.0,
            refresh_interval_secs: 60,
            marker_validity_secs: 300,
            marker_path: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Pick the config file to read, without checking that it exists
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs::config_dir().map(|dir| dir.join("trackwall").join("config.toml"))
}

/// Load the TOML config, falling back to defaults when the file is absent
///
/// A file that exists but does not parse is an error; silently ignoring a
/// typo'd config would be worse than refusing to start.
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = resolve_config_path(cli_arg) else {
        warn!("No config directory on this platform, using built-in defaults");
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        warn!("Config file {} not found, using built-in defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(&path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

    info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Write a config file, creating parent directories as needed
pub fn write_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content =
        toml::to_string_pretty(config).map_err(|e| Error::Config(e.to_string()))?;
    std::fs::write(path, content)?;
    Ok(())
}
