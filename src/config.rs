//! Configuration file for ~/.config/gator/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! `register` and `login` rewrite it to record the current user.
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::feed::{DEFAULT_MAX_FEED_BYTES, DEFAULT_USER_AGENT};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file. `None` means `gator.db` next to the config file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,

    /// User set by the last `register` or `login`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_user_name: Option<String>,

    /// User-Agent header sent with every feed request.
    pub user_agent: String,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Feeds with larger bodies are rejected.
    pub max_feed_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: None,
            current_user_name: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout_secs: 30,
            max_feed_bytes: DEFAULT_MAX_FEED_BYTES,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 5] = [
        "db_path",
        "current_user_name",
        "user_agent",
        "request_timeout_secs",
        "max_feed_bytes",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::debug!(
            path = %path.display(),
            user = config.current_user_name.as_deref().unwrap_or("-"),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Write the configuration to `path`, replacing any existing file.
    ///
    /// The new content goes to a temporary sibling first and is renamed into
    /// place, so a crash never leaves a half-written config behind.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let suffix = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let temp_path = path.with_extension(format!("tmp.{suffix:016x}"));

        let write_temp = || -> std::io::Result<()> {
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()
        };

        if let Err(e) = write_temp().and_then(|()| std::fs::rename(&temp_path, path)) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e.into());
        }

        tracing::debug!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    /// Database location, defaulting to `gator.db` in `config_dir`.
    pub fn db_path_in(&self, config_dir: &Path) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| config_dir.join("gator.db"))
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }
}

// ============================================================================
// Tests
// ============================================================================
