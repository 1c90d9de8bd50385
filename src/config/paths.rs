//! Configuration and scratch paths
//!
//! The config file is `$SANDBOX_ENGINE_CONFIG`, or the first of
//! `config.json`, `config.json5`, `config.toml` found in the config
//! directory. Workspaces live under a scratch root in the system temp dir.

use std::path::{Path, PathBuf};

/// Explicit config file override
pub const CONFIG_FILE_ENV: &str = "SANDBOX_ENGINE_CONFIG";
/// Explicit config directory override
pub const CONFIG_DIR_ENV: &str = "SANDBOX_ENGINE_CONFIG_DIR";

const APP_DIR: &str = "sandbox-engine";
const CONFIG_CANDIDATES: [&str; 3] = ["config.json", "config.json5", "config.toml"];

/// Parser a config file is read with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON with comments and unquoted keys
    Json5,
    Toml,
}

impl ConfigFormat {
    /// Parser for the file extension, `None` when it is not recognised
    pub fn for_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") | Some("json5") => Some(ConfigFormat::Json5),
            Some("toml") => Some(ConfigFormat::Toml),
            _ => None,
        }
    }
}

/// Get the configuration directory
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        return PathBuf::from(dir);
    }

    dirs::config_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".config").join(APP_DIR))
                .unwrap_or_else(|| PathBuf::from(".sandbox-engine"))
        })
}

/// Get the main configuration file path
pub fn config_path() -> PathBuf {
    match std::env::var(CONFIG_FILE_ENV) {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => find_config_file(&config_dir()),
    }
}

/// First existing candidate in `dir`, or `config.json` when none exist
pub fn find_config_file(dir: &Path) -> PathBuf {
    CONFIG_CANDIDATES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
        .unwrap_or_else(|| dir.join(CONFIG_CANDIDATES[0]))
}

/// Default root for per-execution workspaces
pub fn default_scratch_root() -> PathBuf {
    std::env::temp_dir().join(APP_DIR)
}
