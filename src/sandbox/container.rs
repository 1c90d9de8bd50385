//! Container specs and orchestration
//!
//! One canonical spec per language kind, derived from the fixed language
//! table plus process-wide limits. The orchestrator runs a spec against a
//! workspace, races natural exit against the wall-clock timeout and always
//! attempts removal.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::SandboxConfig;
use crate::error::Result;
use crate::sandbox::daemon::ContainerRuntime;
use crate::sandbox::executor::LanguageKind;
use crate::sandbox::logs::RawLogCapture;
use crate::sandbox::platform::HostPlatform;
use crate::sandbox::workspace::SandboxWorkspace;

/// Where the input directory is mounted (read-only)
pub const CONTAINER_INPUT_DIR: &str = "/code";
/// Where the output directory is mounted (read-write)
pub const CONTAINER_OUTPUT_DIR: &str = "/output";
/// CFS scheduling period the CPU quota is expressed against
pub const CPU_PERIOD_MICROS: i64 = 100_000;
/// Smallest quota the kernel accepts
const MIN_CPU_QUOTA_MICROS: i64 = 1_000;

/// Image for each language kind
pub fn image_for(kind: LanguageKind) -> &'static str {
    match kind {
        LanguageKind::Python => "python:3.11-slim",
        LanguageKind::PythonWithCharts => "local-sandbox-python",
        LanguageKind::Node => "node:20-slim",
    }
}

fn interpreter_for(kind: LanguageKind) -> &'static str {
    match kind {
        LanguageKind::Python | LanguageKind::PythonWithCharts => "python",
        LanguageKind::Node => "node",
    }
}

/// Host directory exposed inside the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    /// Host path, already in daemon syntax
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

impl BindMount {
    pub fn read_only(source: impl Into<String>, target: impl Into<String>) -> Self {
        BindMount {
            source: source.into(),
            target: target.into(),
            read_only: true,
        }
    }

    pub fn read_write(source: impl Into<String>, target: impl Into<String>) -> Self {
        BindMount {
            source: source.into(),
            target: target.into(),
            read_only: false,
        }
    }

    /// `source:target:mode` bind string
    pub fn to_bind(&self) -> String {
        let mode = if self.read_only { "ro" } else { "rw" };
        format!("{}:{}:{}", self.source, self.target, mode)
    }
}

/// Resource-constrained container description
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    pub image: String,
    pub command: Vec<String>,
    pub workdir: String,
    /// Memory ceiling; swap is capped at the same value
    pub memory_limit_bytes: i64,
    /// Fraction of one core per scheduling period
    pub cpu_share_fraction: f64,
    pub network_disabled: bool,
    pub mounts: Vec<BindMount>,
    /// Most log bytes kept from one run
    pub log_limit_bytes: usize,
}

impl ContainerSpec {
    /// Canonical spec for a language kind under the given limits
    pub fn for_language(kind: LanguageKind, limits: &SandboxConfig) -> Self {
        let source = format!("{}/{}", CONTAINER_INPUT_DIR, kind.source_filename());

        ContainerSpec {
            image: image_for(kind).to_string(),
            command: vec![interpreter_for(kind).to_string(), source],
            workdir: CONTAINER_INPUT_DIR.to_string(),
            memory_limit_bytes: limits.memory_limit_bytes(),
            cpu_share_fraction: limits.cpu_fraction,
            network_disabled: true,
            mounts: Vec::new(),
            log_limit_bytes: limits.max_log_bytes,
        }
    }

    /// Bind a workspace's directories, translating both sources the same way
    pub fn with_workspace(mut self, workspace: &SandboxWorkspace, platform: &dyn HostPlatform) -> Self {
        self.mounts = vec![
            BindMount::read_only(
                platform.to_mount_path(workspace.input_dir()),
                CONTAINER_INPUT_DIR,
            ),
            BindMount::read_write(
                platform.to_mount_path(workspace.output_dir()),
                CONTAINER_OUTPUT_DIR,
            ),
        ];
        self
    }

    /// CPU quota in microseconds per [`CPU_PERIOD_MICROS`]
    pub fn cpu_quota(&self) -> i64 {
        let quota = (CPU_PERIOD_MICROS as f64 * self.cpu_share_fraction).round() as i64;
        quota.max(MIN_CPU_QUOTA_MICROS)
    }
}

/// How a container run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// The process exited on its own with this status code
    Exited(i64),
    /// The wall-clock limit fired first and the container was killed
    TimedOut,
}

/// Exit status plus the undecoded combined output
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: ExitStatus,
    pub logs: RawLogCapture,
}

/// Kills and removes a container whose run was abandoned mid-flight
///
/// Armed from creation until removal has been attempted. Dropping it while
/// still armed (the run future was cancelled) hands cleanup to a detached
/// task so the container does not outlive its execution.
struct ContainerGuard {
    runtime: Arc<dyn ContainerRuntime>,
    id: Option<String>,
}

impl ContainerGuard {
    fn new(runtime: Arc<dyn ContainerRuntime>, id: &str) -> Self {
        ContainerGuard {
            runtime,
            id: Some(id.to_string()),
        }
    }

    fn disarm(&mut self) {
        self.id = None;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(container = %id, "No runtime left to remove abandoned container");
            return;
        };

        warn!(container = %id, "Execution abandoned, removing container");
        let runtime = self.runtime.clone();
        handle.spawn(async move {
            if let Err(e) = runtime.kill_container(&id).await {
                debug!(container = %id, "Kill of abandoned container failed: {}", e);
            }
            if let Err(e) = runtime.remove_container(&id).await {
                warn!(container = %id, "Failed to remove container: {}", e);
            }
        });
    }
}

/// Drives one container through create, start, wait/kill, logs and remove
#[derive(Clone)]
pub struct ContainerOrchestrator {
    runtime: Arc<dyn ContainerRuntime>,
    platform: Arc<dyn HostPlatform>,
}

impl ContainerOrchestrator {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, platform: Arc<dyn HostPlatform>) -> Self {
        ContainerOrchestrator { runtime, platform }
    }

    /// Run `spec` with the workspace bound in.
    ///
    /// The timeout counts from container start. Removal is attempted once the
    /// container exists, whatever happens afterwards, including when this
    /// future is dropped before it completes.
    pub async fn run(
        &self,
        spec: &ContainerSpec,
        workspace: &SandboxWorkspace,
        timeout: Duration,
    ) -> Result<RunOutcome> {
        let spec = spec
            .clone()
            .with_workspace(workspace, self.platform.as_ref());
        let name = format!("sandbox-{}", workspace.id());

        let id = self.runtime.create_container(&name, &spec).await?;
        let mut guard = ContainerGuard::new(self.runtime.clone(), &id);
        debug!("Created container: {} ({})", name, id);

        let outcome = self.start_and_wait(&id, timeout, spec.log_limit_bytes).await;

        if let Err(e) = self.runtime.remove_container(&id).await {
            warn!(container = %id, "Failed to remove container: {}", e);
        }
        guard.disarm();

        outcome
    }

    async fn start_and_wait(&self, id: &str, timeout: Duration, log_limit: usize) -> Result<RunOutcome> {
        self.runtime.start_container(id).await?;

        let status = tokio::select! {
            code = self.runtime.wait_container(id) => ExitStatus::Exited(code?),
            _ = tokio::time::sleep(timeout) => {
                warn!(container = %id, "Execution timed out after {:?}", timeout);
                // The container may already have stopped on its own
                if let Err(e) = self.runtime.kill_container(id).await {
                    debug!(container = %id, "Kill after timeout failed: {}", e);
                }
                ExitStatus::TimedOut
            }
        };

        let logs = self.runtime.container_logs(id, log_limit).await?;
        info!(
            container = %id,
            ?status,
            log_bytes = logs.len(),
            truncated = logs.is_truncated(),
            "Container finished"
        );

        Ok(RunOutcome { status, logs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::daemon::fake::FakeRuntime;
    use crate::sandbox::executor::ExecutionRequest;
    use crate::sandbox::platform::{DriveLetterPlatform, PosixPlatform};
    use crate::sandbox::workspace::WorkspaceManager;
    use tempfile::tempdir;

    #[test]
    fn test_spec_table() {
        let limits = SandboxConfig::default();

        let python = ContainerSpec::for_language(LanguageKind::Python, &limits);
        assert_eq!(python.image, "python:3.11-slim");
        assert_eq!(python.command, vec!["python", "/code/main.py"]);
        assert_eq!(python.workdir, "/code");
        assert!(python.network_disabled);

        let charts = ContainerSpec::for_language(LanguageKind::PythonWithCharts, &limits);
        assert_eq!(charts.image, "local-sandbox-python");
        assert_eq!(charts.command, vec!["python", "/code/main.py"]);

        let node = ContainerSpec::for_language(LanguageKind::Node, &limits);
        assert_eq!(node.image, "node:20-slim");
        assert_eq!(node.command, vec!["node", "/code/main.js"]);
    }

    #[test]
    fn test_cpu_quota() {
        let mut spec = ContainerSpec::for_language(LanguageKind::Python, &SandboxConfig::default());
        assert_eq!(spec.cpu_quota(), 50_000);
        spec.cpu_share_fraction = 2.0;
        assert_eq!(spec.cpu_quota(), 200_000);
        spec.cpu_share_fraction = 0.0001;
        assert_eq!(spec.cpu_quota(), 1_000);
    }

    #[test]
    fn test_bind_strings() {
        assert_eq!(BindMount::read_only("/a", "/code").to_bind(), "/a:/code:ro");
        assert_eq!(BindMount::read_write("/b", "/output").to_bind(), "/b:/output:rw");
    }

    #[tokio::test]
    async fn test_mounts_use_platform_translation() {
        let scratch = tempdir().unwrap();
        let workspace = WorkspaceManager::new(scratch.path())
            .provision(&ExecutionRequest::new("print(1)", LanguageKind::Python))
            .await
            .unwrap();

        let spec = ContainerSpec::for_language(LanguageKind::Python, &SandboxConfig::default())
            .with_workspace(&workspace, &PosixPlatform);
        assert_eq!(spec.mounts[0].source, workspace.input_dir().to_string_lossy());
        assert!(spec.mounts[0].read_only);
        assert_eq!(spec.mounts[1].target, "/output");
        assert!(!spec.mounts[1].read_only);

        let translated = ContainerSpec::for_language(LanguageKind::Python, &SandboxConfig::default())
            .with_workspace(&workspace, &DriveLetterPlatform);
        assert_eq!(
            translated.mounts[0].source,
            DriveLetterPlatform.to_mount_path(workspace.input_dir())
        );

        workspace.teardown().await;
    }

    async fn run_with(runtime: Arc<FakeRuntime>, timeout: Duration) -> (Result<RunOutcome>, Arc<FakeRuntime>) {
        let scratch = tempdir().unwrap();
        let workspace = WorkspaceManager::new(scratch.path())
            .provision(&ExecutionRequest::new("print(1)", LanguageKind::Python))
            .await
            .unwrap();
        let orchestrator = ContainerOrchestrator::new(runtime.clone(), Arc::new(PosixPlatform));
        let spec = ContainerSpec::for_language(LanguageKind::Python, &SandboxConfig::default());

        let outcome = orchestrator.run(&spec, &workspace, timeout).await;
        workspace.teardown().await;
        (outcome, runtime)
    }

    #[tokio::test]
    async fn test_natural_exit() {
        let runtime = Arc::new(FakeRuntime {
            exit_code: 3,
            ..FakeRuntime::new()
        });
        let (outcome, runtime) = run_with(runtime, Duration::from_secs(5)).await;

        let outcome = outcome.unwrap();
        assert_eq!(outcome.status, ExitStatus::Exited(3));
        assert!(!runtime.called("kill"));
        assert!(runtime.called("logs"));
        assert!(runtime.called("remove"));
    }

    #[tokio::test]
    async fn test_timeout_kills_then_fetches_logs_and_removes() {
        let runtime = Arc::new(FakeRuntime {
            hang: true,
            ..FakeRuntime::new()
        });
        let (outcome, runtime) = run_with(runtime, Duration::from_millis(50)).await;

        assert_eq!(outcome.unwrap().status, ExitStatus::TimedOut);
        let calls = runtime.calls();
        let kill = calls.iter().position(|c| c.starts_with("kill")).unwrap();
        let logs = calls.iter().position(|c| c.starts_with("logs")).unwrap();
        let remove = calls.iter().position(|c| c.starts_with("remove")).unwrap();
        assert!(kill < logs && logs < remove);
        assert_eq!(runtime.running_containers(), 0);
    }

    #[tokio::test]
    async fn test_dropped_run_kills_and_removes() {
        let runtime = Arc::new(FakeRuntime {
            hang: true,
            ..FakeRuntime::new()
        });
        let scratch = tempdir().unwrap();
        let workspace = WorkspaceManager::new(scratch.path())
            .provision(&ExecutionRequest::new("while True: pass", LanguageKind::Python))
            .await
            .unwrap();
        let orchestrator = ContainerOrchestrator::new(runtime.clone(), Arc::new(PosixPlatform));
        let spec = ContainerSpec::for_language(LanguageKind::Python, &SandboxConfig::default());

        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            orchestrator.run(&spec, &workspace, Duration::from_secs(30)),
        )
        .await;
        assert!(abandoned.is_err());

        for _ in 0..100 {
            if runtime.called("remove") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(runtime.called("kill"));
        assert!(runtime.called("remove"));
        assert_eq!(runtime.running_containers(), 0);

        workspace.teardown().await;
    }

    #[tokio::test]
    async fn test_start_failure_still_removes() {
        let runtime = Arc::new(FakeRuntime {
            start_fails: true,
            ..FakeRuntime::new()
        });
        let (outcome, runtime) = run_with(runtime, Duration::from_secs(5)).await;

        assert!(matches!(outcome, Err(crate::error::Error::ContainerStart(_))));
        assert!(runtime.called("remove"));
        assert!(!runtime.called("wait"));
    }
}
