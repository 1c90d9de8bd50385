//! Sandbox configuration types
//!
//! Process-wide limits applied to every container execution.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Sandbox configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Wall-clock limit measured from container start
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
    /// Memory ceiling in megabytes (swap is capped at the same value)
    #[serde(default = "default_memory_mb")]
    pub memory_limit_mb: u64,
    /// CPU quota as a fraction of one core
    #[serde(default = "default_cpu_fraction")]
    pub cpu_fraction: f64,
    /// Daemon socket address override
    #[serde(default)]
    pub docker_host: Option<String>,
    /// Root directory holding one subtree per in-flight execution
    #[serde(default = "default_scratch_root")]
    pub scratch_root: PathBuf,
    /// Largest output file that will be collected
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    /// Cap on captured stdout and stderr; output past it is dropped
    #[serde(default = "default_max_log_bytes")]
    pub max_log_bytes: usize,
    /// Build locally built images on first use instead of failing
    #[serde(default)]
    pub auto_build_local_images: bool,
    /// Recipe for the chart-capable Python image
    #[serde(default)]
    pub chart_image: ChartImageConfig,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        SandboxConfig {
            timeout: default_timeout(),
            memory_limit_mb: default_memory_mb(),
            cpu_fraction: default_cpu_fraction(),
            docker_host: None,
            scratch_root: default_scratch_root(),
            max_file_bytes: default_max_file_bytes(),
            max_log_bytes: default_max_log_bytes(),
            auto_build_local_images: false,
            chart_image: ChartImageConfig::default(),
        }
    }
}

impl SandboxConfig {
    /// Memory ceiling in bytes
    pub fn memory_limit_bytes(&self) -> i64 {
        i64::try_from(self.memory_limit_mb.saturating_mul(1024 * 1024)).unwrap_or(i64::MAX)
    }
}

fn default_timeout() -> Duration {
    Duration::from_millis(30_000)
}

fn default_memory_mb() -> u64 {
    512
}

fn default_cpu_fraction() -> f64 {
    0.5
}

fn default_scratch_root() -> PathBuf {
    crate::config::paths::default_scratch_root()
}

fn default_max_file_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_max_log_bytes() -> usize {
    10 * 1024 * 1024
}

/// Build recipe inputs for the locally built chart image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartImageConfig {
    /// Base image the recipe starts from
    #[serde(default = "default_chart_base")]
    pub base_image: String,
    /// Python packages baked into the image
    #[serde(default = "default_chart_packages")]
    pub packages: Vec<String>,
}

impl Default for ChartImageConfig {
    fn default() -> Self {
        ChartImageConfig {
            base_image: default_chart_base(),
            packages: default_chart_packages(),
        }
    }
}

fn default_chart_base() -> String {
    "python:3.11-slim".to_string()
}

fn default_chart_packages() -> Vec<String> {
    ["matplotlib", "pandas", "numpy", "seaborn", "plotly"]
        .iter()
        .map(|p| p.to_string())
        .collect()
}
