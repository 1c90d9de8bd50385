//! Container daemon connection
//!
//! [`ContainerRuntime`] is the full daemon surface the engine consumes. The
//! production implementation, [`DockerRuntime`], talks to the local daemon
//! socket through bollard; tests substitute an in-process fake.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::{BuildImageOptions, CreateImageOptions};
use bollard::models::HostConfig;
use bollard::{Docker, API_DEFAULT_VERSION};
use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::sandbox::container::{ContainerSpec, CPU_PERIOD_MICROS};
use crate::sandbox::image::split_image_reference;
use crate::sandbox::logs::RawLogCapture;
use crate::sandbox::platform::HostPlatform;

/// Minimum per-request timeout for the daemon client
const MIN_CLIENT_TIMEOUT_SECS: u64 = 120;

/// Daemon operations used by the engine
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Lightweight reachability check
    async fn ping(&self) -> Result<()>;

    /// Daemon server version
    async fn server_version(&self) -> Result<String>;

    /// Whether an image exists locally
    async fn image_exists(&self, image: &str) -> Result<bool>;

    /// Pull an image from its registry, resolving once the pull finishes
    async fn pull_image(&self, image: &str) -> Result<()>;

    /// Build an image from an in-memory tar build context
    async fn build_image(&self, tag: &str, context: Vec<u8>) -> Result<()>;

    /// Create a container and return its id
    async fn create_container(&self, name: &str, spec: &ContainerSpec) -> Result<String>;

    async fn start_container(&self, id: &str) -> Result<()>;

    /// Block until the container exits and return its status code
    async fn wait_container(&self, id: &str) -> Result<i64>;

    async fn kill_container(&self, id: &str) -> Result<()>;

    /// Fetch stdout and stderr without following, keeping at most `limit` bytes
    async fn container_logs(&self, id: &str, limit: usize) -> Result<RawLogCapture>;

    /// Force-remove a container
    async fn remove_container(&self, id: &str) -> Result<()>;
}

/// bollard-backed runtime talking to the local daemon
pub struct DockerRuntime {
    docker: Docker,
    address: String,
}

impl DockerRuntime {
    /// Connect to the daemon socket for this platform.
    ///
    /// No I/O happens until the first call; use a ping to check reachability.
    pub fn connect(
        platform: &dyn HostPlatform,
        configured: Option<&str>,
        execution_timeout: Duration,
    ) -> Result<Self> {
        let address = platform.daemon_address(configured)?;
        // The wait call stays open for the whole execution
        let client_timeout = (execution_timeout.as_secs() + 60).max(MIN_CLIENT_TIMEOUT_SECS);

        let docker = Docker::connect_with_socket(&address, client_timeout, API_DEFAULT_VERSION)
            .map_err(|e| {
                Error::DaemonUnavailable(format!("Failed to connect to Docker at {}: {}", address, e))
            })?;

        info!(platform = platform.name(), "Container runtime using {}", address);

        Ok(DockerRuntime { docker, address })
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

fn is_not_found(error: &BollardError) -> bool {
    matches!(
        error,
        BollardError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

fn container_config(spec: &ContainerSpec) -> Config<String> {
    Config {
        image: Some(spec.image.clone()),
        cmd: Some(spec.command.clone()),
        working_dir: Some(spec.workdir.clone()),
        network_disabled: Some(spec.network_disabled),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        tty: Some(false),
        host_config: Some(HostConfig {
            memory: Some(spec.memory_limit_bytes),
            memory_swap: Some(spec.memory_limit_bytes),
            cpu_period: Some(CPU_PERIOD_MICROS),
            cpu_quota: Some(spec.cpu_quota()),
            network_mode: spec.network_disabled.then(|| "none".to_string()),
            binds: Some(spec.mounts.iter().map(|m| m.to_bind()).collect()),
            auto_remove: Some(false),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<()> {
        self.docker.ping().await?;
        Ok(())
    }

    async fn server_version(&self) -> Result<String> {
        let info = self.docker.info().await?;
        Ok(info.server_version.unwrap_or_else(|| "unknown".to_string()))
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        let (from_image, tag) = split_image_reference(image);
        let options = CreateImageOptions {
            from_image,
            tag,
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(item) = stream.next().await {
            let info = item.map_err(|e| {
                Error::ImageUnavailable(format!("Failed to pull {}: {}", image, e))
            })?;
            if let Some(message) = info.error {
                return Err(Error::ImageUnavailable(format!(
                    "Failed to pull {}: {}",
                    image, message
                )));
            }
            if let Some(status) = info.status {
                debug!("Pull status: {}", status);
            }
        }

        info!("Image {} pulled successfully", image);
        Ok(())
    }

    async fn build_image(&self, tag: &str, context: Vec<u8>) -> Result<()> {
        let options = BuildImageOptions {
            dockerfile: "Dockerfile",
            t: tag,
            rm: true,
            ..Default::default()
        };

        let mut stream = self.docker.build_image(options, None, Some(context.into()));
        while let Some(item) = stream.next().await {
            let info = item.map_err(|e| {
                Error::ImageUnavailable(format!("Failed to build {}: {}", tag, e))
            })?;
            if let Some(message) = info.error {
                return Err(Error::ImageUnavailable(format!(
                    "Failed to build {}: {}",
                    tag, message
                )));
            }
            if let Some(line) = info.stream {
                debug!("Build: {}", line.trim_end());
            }
        }

        info!("Image {} built successfully", tag);
        Ok(())
    }

    async fn create_container(&self, name: &str, spec: &ContainerSpec) -> Result<String> {
        let options = CreateContainerOptions {
            name,
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), container_config(spec))
            .await
            .map_err(|e| Error::ContainerStart(format!("Failed to create container: {}", e)))?;

        for warning in &response.warnings {
            warn!("Container {}: {}", name, warning);
        }

        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| Error::ContainerStart(format!("Failed to start container: {}", e)))
    }

    async fn wait_container(&self, id: &str) -> Result<i64> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };

        let mut stream = self.docker.wait_container(id, Some(options));
        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports a non-zero exit as an error carrying the code
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(e.into()),
            None => Err(Error::DaemonUnavailable(
                "Container wait stream ended unexpectedly".to_string(),
            )),
        }
    }

    async fn kill_container(&self, id: &str) -> Result<()> {
        self.docker
            .kill_container(id, None::<KillContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn container_logs(&self, id: &str, limit: usize) -> Result<RawLogCapture> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: false,
            ..Default::default()
        };

        let mut stream = self.docker.logs(id, Some(options));
        let mut capture = RawLogCapture::with_limit(limit);

        while let Some(item) = stream.next().await {
            match item {
                Ok(output) => {
                    capture.push(output);
                    if capture.is_truncated() {
                        warn!("Logs for {} exceeded {} bytes, truncating", id, limit);
                        break;
                    }
                }
                Err(e) => {
                    warn!("Error reading logs for {}: {}", id, e);
                    break;
                }
            }
        }

        Ok(capture)
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        self.docker.remove_container(id, Some(options)).await?;
        debug!("Removed container: {}", id);
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::container::BindMount;
    use crate::sandbox::executor::LanguageKind;
    use crate::config::SandboxConfig;

    #[test]
    fn test_container_config_limits() {
        let mut spec = ContainerSpec::for_language(LanguageKind::Python, &SandboxConfig::default());
        spec.mounts.push(BindMount::read_only("/tmp/ws/code", "/code"));

        let config = container_config(&spec);
        let host = config.host_config.unwrap();

        assert_eq!(config.network_disabled, Some(true));
        assert_eq!(host.memory, Some(512 * 1024 * 1024));
        assert_eq!(host.memory_swap, host.memory);
        assert_eq!(host.cpu_period, Some(100_000));
        assert_eq!(host.cpu_quota, Some(50_000));
        assert_eq!(host.network_mode.as_deref(), Some("none"));
        assert_eq!(host.binds, Some(vec!["/tmp/ws/code:/code:ro".to_string()]));
    }

    #[test]
    fn test_not_found_detection() {
        let missing = BollardError::DockerResponseServerError {
            status_code: 404,
            message: "No such image".to_string(),
        };
        let broken = BollardError::DockerResponseServerError {
            status_code: 500,
            message: "boom".to_string(),
        };
        assert!(is_not_found(&missing));
        assert!(!is_not_found(&broken));
    }

    #[tokio::test]
    #[ignore = "requires a running Docker daemon"]
    async fn test_live_ping() {
        let platform = crate::sandbox::platform::detect();
        let runtime = DockerRuntime::connect(platform.as_ref(), None, Duration::from_secs(30)).unwrap();
        runtime.ping().await.unwrap();
    }
}
