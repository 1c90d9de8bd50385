//! Configuration I/O - Loading configuration
//!
//! Handles reading configuration from files and environment variables.

use std::path::Path;
use std::time::Duration;

use super::paths::ConfigFormat;
use super::types::Config;
use crate::error::{Error, Result};

/// Load configuration with layered precedence:
/// 1. Config file (config.json / config.toml) if it exists, otherwise defaults
/// 2. Environment variable overrides (includes .env)
pub fn load_config() -> Result<Config> {
    let config_path = super::paths::config_path();

    let mut config = if config_path.exists() {
        load_config_from_path(&config_path)?
    } else {
        Config::default()
    };

    apply_env_overrides(&mut config);

    Ok(config)
}

/// Load configuration from a specific path
pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    let config: Config = match ConfigFormat::for_path(path) {
        Some(ConfigFormat::Json5) => json5::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid JSON config: {}", e)))?,
        Some(ConfigFormat::Toml) => toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid TOML config: {}", e)))?,
        None => json5::from_str(&content)
            .or_else(|_| toml::from_str(&content).map_err(|e| Error::Config(e.to_string())))
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?,
    };

    Ok(config)
}

/// Apply environment variable overrides to an existing config.
///
/// Loads `.env` first, then overlays any set variables. Env vars have the
/// highest precedence: defaults < file < env.
pub fn apply_env_overrides(config: &mut Config) {
    dotenvy::dotenv().ok();
    apply_overrides_from(config, |key| std::env::var(key).ok());
}

/// Apply overrides from an arbitrary variable source.
///
/// Unparseable values are ignored and the previous setting is kept.
pub fn apply_overrides_from<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    // Sandbox overrides
    if let Some(ms) = lookup("MAX_EXECUTION_TIME").and_then(|v| v.trim().parse::<u64>().ok()) {
        config.sandbox.timeout = Duration::from_millis(ms);
    }
    if let Some(mb) = lookup("MAX_MEMORY_MB").and_then(|v| v.trim().parse().ok()) {
        config.sandbox.memory_limit_mb = mb;
    }
    if let Some(host) = lookup("DOCKER_HOST").filter(|v| !v.trim().is_empty()) {
        config.sandbox.docker_host = Some(host.trim().to_string());
    }
    if let Some(fraction) = lookup("SANDBOX_CPU_FRACTION").and_then(|v| v.trim().parse().ok()) {
        config.sandbox.cpu_fraction = fraction;
    }
    if let Some(root) = lookup("SANDBOX_SCRATCH_ROOT").filter(|v| !v.trim().is_empty()) {
        config.sandbox.scratch_root = std::path::PathBuf::from(root);
    }
    if let Some(bytes) = lookup("SANDBOX_MAX_LOG_BYTES").and_then(|v| v.trim().parse().ok()) {
        config.sandbox.max_log_bytes = bytes;
    }
    if let Some(v) = lookup("SANDBOX_AUTO_BUILD") {
        config.sandbox.auto_build_local_images = v == "true" || v == "1";
    }

    // Gateway overrides
    if let Some(bind) = lookup("GATEWAY_BIND") {
        config.gateway.bind = bind;
    }
    if let Some(port) = lookup("GATEWAY_PORT").and_then(|v| v.parse().ok()) {
        config.gateway.port = port;
    }
    if let Some(limit) = lookup("GATEWAY_MAX_CONCURRENT").and_then(|v| v.parse().ok()) {
        config.gateway.max_concurrent = limit;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        apply_overrides_from(
            &mut config,
            lookup_from(&[
                ("MAX_EXECUTION_TIME", "1500"),
                ("MAX_MEMORY_MB", "256"),
                ("DOCKER_HOST", "unix:///tmp/docker.sock"),
                ("SANDBOX_AUTO_BUILD", "1"),
                ("SANDBOX_MAX_LOG_BYTES", "4096"),
                ("GATEWAY_MAX_CONCURRENT", "8"),
            ]),
        );

        assert_eq!(config.sandbox.timeout, Duration::from_millis(1500));
        assert_eq!(config.sandbox.memory_limit_mb, 256);
        assert_eq!(
            config.sandbox.docker_host.as_deref(),
            Some("unix:///tmp/docker.sock")
        );
        assert!(config.sandbox.auto_build_local_images);
        assert_eq!(config.sandbox.max_log_bytes, 4096);
        assert_eq!(config.gateway.max_concurrent, 8);
    }

    #[test]
    fn test_invalid_env_values_are_ignored() {
        let mut config = Config::default();
        apply_overrides_from(
            &mut config,
            lookup_from(&[("MAX_EXECUTION_TIME", "soon"), ("MAX_MEMORY_MB", "-1")]),
        );

        assert_eq!(config.sandbox.timeout, Duration::from_secs(30));
        assert_eq!(config.sandbox.memory_limit_mb, 512);
    }

    #[test]
    fn test_load_json5_and_toml() {
        let dir = tempdir().unwrap();

        let json_path = dir.path().join("config.json");
        std::fs::write(
            &json_path,
            "{ // comments allowed\n sandbox: { timeout: '5s', memory_limit_mb: 128 } }",
        )
        .unwrap();
        let config = load_config_from_path(&json_path).unwrap();
        assert_eq!(config.sandbox.timeout, Duration::from_secs(5));
        assert_eq!(config.sandbox.memory_limit_mb, 128);

        let toml_path = dir.path().join("config.toml");
        std::fs::write(&toml_path, "[gateway]\nport = 8080\n").unwrap();
        let config = load_config_from_path(&toml_path).unwrap();
        assert_eq!(config.gateway.port, 8080);
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let dir = tempdir().unwrap();
        let err = load_config_from_path(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
