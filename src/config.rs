//! Configuration for termlink.
//!
//! Settings are read from `~/.termlink/config.toml`:
//!
//! ```toml
//! # Origin of the hosting page; the socket mirrors its scheme and host
//! origin = "https://dashboard.example.com"
//!
//! # Backend host override (also TERMLINK_BACKEND_HOST)
//! backend_host = "terminal.example.com:8443"
//!
//! # Number of commands kept for ArrowUp/ArrowDown
//! history_limit = 100
//!
//! # Also send up_arrow/down_arrow to the backend
//! forward_history_keys = false
//!
//! # Print a banner when the connection opens
//! banner = true
//!
//! # Log level for ~/.termlink/termlink.log (RUST_LOG wins when set)
//! log_level = "info"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;
use url::Url;

use crate::history::HISTORY_LIMIT;

/// Environment variable overriding the backend host
pub const HOST_ENV: &str = "TERMLINK_BACKEND_HOST";

const DEFAULT_ORIGIN: &str = "http://localhost:8000";

/// Main configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Origin of the hosting page
    pub origin: String,
    /// Backend host override
    pub backend_host: Option<String>,
    /// Maximum history entries
    pub history_limit: usize,
    /// Forward history keys to the backend
    pub forward_history_keys: bool,
    /// Show the connected banner
    pub banner: bool,
    /// Log level
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            backend_host: None,
            history_limit: HISTORY_LIMIT,
            forward_history_keys: false,
            banner: true,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file, then apply the environment
    pub fn load() -> Self {
        let config = Self::get_config_path()
            .filter(|path| path.exists())
            .map(|path| Self::load_from(&path))
            .unwrap_or_default();
        config.with_host_override(std::env::var(HOST_ENV).ok())
    }

    /// Load a config file, falling back to defaults when it is unreadable
    pub fn load_from(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                return Self::default();
            }
        };
        Self::parse(&content).unwrap_or_else(|e| {
            warn!("Invalid config {}: {}", path.display(), e);
            Self::default()
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Apply a host override when one is set
    pub fn with_host_override(mut self, host: Option<String>) -> Self {
        if let Some(host) = host.filter(|h| !h.trim().is_empty()) {
            self.backend_host = Some(host);
        }
        self
    }

    pub fn origin_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.origin)
    }

    /// Directory holding config and log files
    pub fn data_dir() -> Option<PathBuf> {
        let dir = home_dir()?.join(".termlink");
        if !dir.exists() {
            let _ = fs::create_dir_all(&dir);
        }
        Some(dir)
    }

    /// Get config file path
    fn get_config_path() -> Option<PathBuf> {
        Self::data_dir().map(|dir| dir.join("config.toml"))
    }
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)
}
