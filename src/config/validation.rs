//! Configuration validation
//!
//! Validates configuration and reports issues.

use super::types::Config;
use crate::error::{Error, Result};

/// Result of configuration validation
#[derive(Debug, Clone)]
pub struct ConfigValidationResult {
    /// Whether the config is valid
    pub valid: bool,
    /// Validation errors (critical)
    pub errors: Vec<ValidationIssue>,
    /// Validation warnings (non-critical)
    pub warnings: Vec<ValidationIssue>,
}

impl ConfigValidationResult {
    /// Create a valid result
    pub fn valid() -> Self {
        ConfigValidationResult {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add an error
    pub fn with_error(mut self, issue: ValidationIssue) -> Self {
        self.valid = false;
        self.errors.push(issue);
        self
    }

    /// Add a warning
    pub fn with_warning(mut self, issue: ValidationIssue) -> Self {
        self.warnings.push(issue);
        self
    }

    /// Turn errors into a single config error, keeping warnings for the caller
    pub fn ensure_valid(self) -> Result<Self> {
        if self.valid {
            return Ok(self);
        }
        let details: Vec<String> = self.errors.iter().map(|issue| issue.to_string()).collect();
        Err(Error::Config(format!("Invalid configuration: {}", details.join("; "))))
    }
}

/// A validation issue
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the config field
    pub path: String,
    /// Issue message
    pub message: String,
    /// Suggested fix
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    /// Create a new issue
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Add a suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " ({})", suggestion)?;
        }
        Ok(())
    }
}

/// Validate the configuration
pub fn validate_config(config: &Config) -> ConfigValidationResult {
    let mut result = ConfigValidationResult::valid();

    result = validate_sandbox_config(config, result);
    result = validate_gateway_config(config, result);

    result
}

/// Smallest memory limit the container daemon accepts
const MIN_MEMORY_MB: u64 = 6;

/// Largest memory limit accepted (1 TiB)
const MAX_MEMORY_MB: u64 = 1024 * 1024;

/// Timeouts above this are allowed but almost certainly a mistake
const LONG_TIMEOUT_SECS: u64 = 600;

fn validate_sandbox_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    let sandbox = &config.sandbox;

    if sandbox.timeout.is_zero() {
        result = result.with_error(
            ValidationIssue::new("sandbox.timeout", "Execution timeout must be greater than zero")
                .with_suggestion("Set MAX_EXECUTION_TIME to a positive number of milliseconds"),
        );
    } else if sandbox.timeout.as_secs() > LONG_TIMEOUT_SECS {
        result = result.with_warning(ValidationIssue::new(
            "sandbox.timeout",
            format!(
                "Execution timeout of {}s lets runaway code hold a container for a long time",
                sandbox.timeout.as_secs()
            ),
        ));
    }

    if sandbox.memory_limit_mb < MIN_MEMORY_MB {
        result = result.with_error(
            ValidationIssue::new(
                "sandbox.memory_limit_mb",
                format!(
                    "Memory limit {}MB is below the daemon minimum of {}MB",
                    sandbox.memory_limit_mb, MIN_MEMORY_MB
                ),
            )
            .with_suggestion("Set MAX_MEMORY_MB to at least 6"),
        );
    } else if sandbox.memory_limit_mb > MAX_MEMORY_MB {
        result = result.with_error(
            ValidationIssue::new(
                "sandbox.memory_limit_mb",
                format!(
                    "Memory limit {}MB is above the maximum of {}MB",
                    sandbox.memory_limit_mb, MAX_MEMORY_MB
                ),
            )
            .with_suggestion("Set MAX_MEMORY_MB to a size the host can actually provide"),
        );
    }

    if !(sandbox.cpu_fraction > 0.0 && sandbox.cpu_fraction <= 64.0) {
        result = result.with_error(
            ValidationIssue::new(
                "sandbox.cpu_fraction",
                format!("CPU fraction {} must be in (0, 64]", sandbox.cpu_fraction),
            )
            .with_suggestion("Use 0.5 for half of one core"),
        );
    }

    if sandbox.max_log_bytes == 0 {
        result = result.with_warning(ValidationIssue::new(
            "sandbox.max_log_bytes",
            "Log capture limit is zero; no output will be returned",
        ));
    }

    if sandbox.max_file_bytes == 0 {
        result = result.with_warning(ValidationIssue::new(
            "sandbox.max_file_bytes",
            "Maximum artifact size is zero; no output files will be collected",
        ));
    }

    result
}

fn validate_gateway_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    if config.gateway.max_concurrent == 0 {
        result = result.with_error(
            ValidationIssue::new(
                "gateway.max_concurrent",
                "Admission limit of zero would block every execution",
            )
            .with_suggestion("Set GATEWAY_MAX_CONCURRENT to at least 1"),
        );
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_validate_default_config() {
        let config = Config::default();
        let result = validate_config(&config);

        assert!(result.valid);
        assert!(result.errors.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_validate_rejects_bad_limits() {
        let mut config = Config::default();
        config.sandbox.timeout = Duration::ZERO;
        config.sandbox.memory_limit_mb = 2;
        config.sandbox.cpu_fraction = 0.0;
        config.gateway.max_concurrent = 0;

        let result = validate_config(&config);
        assert!(!result.valid);
        let paths: Vec<&str> = result.errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "sandbox.timeout",
                "sandbox.memory_limit_mb",
                "sandbox.cpu_fraction",
                "gateway.max_concurrent"
            ]
        );
    }

    #[test]
    fn test_validate_rejects_huge_memory() {
        let mut config = Config::default();
        config.sandbox.memory_limit_mb = u64::MAX;

        let result = validate_config(&config);
        assert!(!result.valid);
        assert_eq!(result.errors[0].path, "sandbox.memory_limit_mb");
        assert!(result.errors[0].message.contains("above the maximum"));
    }

    #[test]
    fn test_ensure_valid_reports_suggestions() {
        let mut config = Config::default();
        config.sandbox.timeout = Duration::ZERO;

        let err = validate_config(&config).ensure_valid().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("sandbox.timeout: Execution timeout must be greater than zero"));
        assert!(message.contains("Set MAX_EXECUTION_TIME to a positive number of milliseconds"));

        let ok = validate_config(&Config::default()).ensure_valid().unwrap();
        assert!(ok.warnings.is_empty());
    }

    #[test]
    fn test_issue_display() {
        let plain = ValidationIssue::new("gateway.port", "in use");
        assert_eq!(plain.to_string(), "gateway.port: in use");
        assert_eq!(
            plain.with_suggestion("pick another").to_string(),
            "gateway.port: in use (pick another)"
        );
    }

    #[test]
    fn test_validate_warns_on_long_timeout() {
        let mut config = Config::default();
        config.sandbox.timeout = Duration::from_secs(3600);

        let result = validate_config(&config);
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
    }
}
