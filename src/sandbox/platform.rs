//! Host platform capabilities
//!
//! Daemon socket addressing and bind-mount path syntax differ between POSIX
//! hosts and drive-letter hosts. Both live behind [`HostPlatform`], selected
//! once at startup with [`detect`].

use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Platform-specific daemon addressing and path translation
pub trait HostPlatform: Send + Sync + std::fmt::Debug {
    /// Short platform label for logs
    fn name(&self) -> &'static str;

    /// Socket the daemon listens on when nothing is configured
    fn default_daemon_address(&self) -> &'static str;

    /// Strip a URL scheme this platform understands from an address
    fn strip_scheme<'a>(&self, address: &'a str) -> Option<&'a str>;

    /// Convert a host path into the syntax the daemon expects for bind sources
    fn to_mount_path(&self, host_path: &Path) -> String;

    /// Resolve the local socket path to connect to
    fn daemon_address(&self, configured: Option<&str>) -> Result<String> {
        let Some(address) = configured.map(str::trim).filter(|a| !a.is_empty()) else {
            return Ok(self.default_daemon_address().to_string());
        };

        if let Some(path) = self.strip_scheme(address) {
            return Ok(path.to_string());
        }
        if address.contains("://") {
            return Err(Error::Config(format!(
                "Unsupported daemon address {} on {} hosts; use a local socket",
                address,
                self.name()
            )));
        }
        Ok(address.to_string())
    }
}

/// Unix socket addressing, identity path translation
#[derive(Debug, Default, Clone, Copy)]
pub struct PosixPlatform;

impl HostPlatform for PosixPlatform {
    fn name(&self) -> &'static str {
        "posix"
    }

    fn default_daemon_address(&self) -> &'static str {
        "/var/run/docker.sock"
    }

    fn strip_scheme<'a>(&self, address: &'a str) -> Option<&'a str> {
        address.strip_prefix("unix://")
    }

    fn to_mount_path(&self, host_path: &Path) -> String {
        host_path.to_string_lossy().into_owned()
    }
}

/// Named-pipe addressing, `C:\a\b` becomes `/c/a/b`
#[derive(Debug, Default, Clone, Copy)]
pub struct DriveLetterPlatform;

impl HostPlatform for DriveLetterPlatform {
    fn name(&self) -> &'static str {
        "drive-letter"
    }

    fn default_daemon_address(&self) -> &'static str {
        "//./pipe/docker_engine"
    }

    fn strip_scheme<'a>(&self, address: &'a str) -> Option<&'a str> {
        address.strip_prefix("npipe://")
    }

    fn to_mount_path(&self, host_path: &Path) -> String {
        drive_letter_to_mount_path(&host_path.to_string_lossy())
    }
}

fn drive_letter_to_mount_path(raw: &str) -> String {
    // Canonicalized paths carry a verbatim prefix
    let raw = raw.strip_prefix(r"\\?\").unwrap_or(raw);
    let slashed = raw.replace('\\', "/");

    let mut chars = slashed.chars();
    match (chars.next(), chars.next()) {
        (Some(letter), Some(':')) if letter.is_ascii_alphabetic() => {
            format!("/{}{}", letter.to_ascii_lowercase(), &slashed[2..])
        }
        _ => slashed,
    }
}

/// Pick the platform implementation for the running host
pub fn detect() -> Arc<dyn HostPlatform> {
    if cfg!(windows) {
        Arc::new(DriveLetterPlatform)
    } else {
        Arc::new(PosixPlatform)
    }
}
