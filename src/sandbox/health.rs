//! Daemon reachability probe

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::error::Error;
use crate::sandbox::daemon::ContainerRuntime;

/// Status shown to operators and returned by the health endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub docker: bool,
    pub info: String,
}

/// Admission gate in front of every execution
#[derive(Clone)]
pub struct HealthMonitor {
    runtime: Arc<dyn ContainerRuntime>,
}

impl HealthMonitor {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        HealthMonitor { runtime }
    }

    /// Ping the daemon. Communication failures read as `false`.
    pub async fn probe(&self) -> bool {
        match self.runtime.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Docker health check failed: {}", e);
                false
            }
        }
    }

    /// Reachability plus the daemon version
    pub async fn report(&self) -> HealthReport {
        let result = match self.runtime.ping().await {
            Ok(()) => self.runtime.server_version().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(version) => HealthReport {
                docker: true,
                info: format!("Docker is running (Version: {})", version),
            },
            Err(e) if looks_not_running(&e) => HealthReport {
                docker: false,
                info: "Docker is not running. Please start Docker.".to_string(),
            },
            Err(e) => HealthReport {
                docker: false,
                info: format!("Docker error: {}", daemon_message(&e)),
            },
        }
    }
}

fn daemon_message(error: &Error) -> String {
    match error {
        Error::DaemonUnavailable(msg) => msg.clone(),
        other => other.to_string(),
    }
}

/// Missing socket or refused connection
fn looks_not_running(error: &Error) -> bool {
    let msg = daemon_message(error).to_lowercase();
    [
        "connection refused",
        "no such file",
        "not found",
        "enoent",
        "econnrefused",
        "error trying to connect",
    ]
    .iter()
    .any(|needle| msg.contains(needle))
}
