//! Configuration module
//!
//! - types/mod.rs: Core configuration types (Config, GatewayConfig)
//! - types/sandbox.rs: Execution limits and image recipe configuration
//! - io.rs: Configuration loading and environment overrides
//! - validation.rs: Configuration validation
//! - paths.rs: Configuration file paths

mod io;
pub(crate) mod paths;
mod types;
mod validation;

pub use types::{Config, GatewayConfig};

pub use types::sandbox::{ChartImageConfig, SandboxConfig};

pub use io::{apply_env_overrides, apply_overrides_from, load_config, load_config_from_path};
pub use paths::{config_dir, config_path, find_config_file, ConfigFormat};
pub use validation::{validate_config, ConfigValidationResult, ValidationIssue};
