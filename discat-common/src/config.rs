//! Configuration loading and database path resolution
//!
//! Settings come from a TOML config file; the database location follows the
//! priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`DISCAT_DB`)
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub database: DatabaseConfig,
    pub tool: ToolConfig,
    pub session: SessionConfig,
}

/// Catalog database settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite catalog database
    pub path: Option<PathBuf>,
}

/// External disc-reading tool settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Tool executable (name resolved via PATH, or an absolute path)
    pub binary: String,
    /// Extra arguments appended before the command verb
    pub extra_args: Vec<String>,
    /// Minimum title length passed to the tool (`--minlength`), in seconds
    pub min_title_seconds: u64,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            binary: "makemkvcon".to_string(),
            extra_args: Vec::new(),
            min_title_seconds: 0,
        }
    }
}

/// Read-session tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// A session with no tool output for this long is treated as crashed
    pub idle_timeout_secs: u64,
    /// Status event bus channel capacity
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 300,
            event_capacity: 256,
        }
    }
}

impl TomlConfig {
    /// Load configuration from an explicit path, or from the default
    /// locations. A missing file yields the compiled defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match default_config_file() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };

        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }
}

/// First existing config file among the default locations
/// (`~/.config/discat/config.toml`, then `/etc/discat/config.toml`).
fn default_config_file() -> Option<PathBuf> {
    if let Some(user_config) = dirs::config_dir().map(|d| d.join("discat").join("config.toml")) {
        if user_config.exists() {
            return Some(user_config);
        }
    }
    let system_config = PathBuf::from("/etc/discat/config.toml");
    if system_config.exists() {
        return Some(system_config);
    }
    None
}

/// Resolve the catalog database path per the priority order above.
///
/// The environment variable is consulted by the CLI layer (clap `env`), so
/// this only arbitrates between the CLI/env value, the config file, and the
/// compiled default.
pub fn resolve_database_path(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }
    if let Some(path) = &config.database.path {
        return path.clone();
    }
    default_database_path()
}

/// OS-dependent default database location
fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("discat"))
        .unwrap_or_else(|| PathBuf::from("./discat_data"))
        .join("catalog.db")
}
