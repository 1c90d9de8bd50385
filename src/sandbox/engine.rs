//! Sandboxed execution engine
//!
//! Ties the pieces together for one request: health gate, workspace,
//! image, container run, log decoding, artifact collection and teardown.
//! Every path ends in a single [`ExecutionResult`].

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::config::SandboxConfig;
use crate::error::{Error, Result};
use crate::sandbox::artifacts::ArtifactCollector;
use crate::sandbox::container::{ContainerOrchestrator, ContainerSpec, ExitStatus};
use crate::sandbox::daemon::{ContainerRuntime, DockerRuntime};
use crate::sandbox::executor::{CodeExecutor, ExecutionRequest, ExecutionResult, LanguageKind};
use crate::sandbox::health::HealthMonitor;
use crate::sandbox::image::{ImageRecipe, ImageResolver};
use crate::sandbox::logs;
use crate::sandbox::platform::{self, HostPlatform};
use crate::sandbox::workspace::{SandboxWorkspace, WorkspaceManager};

/// Container-backed code executor
pub struct SandboxEngine {
    config: SandboxConfig,
    health: HealthMonitor,
    workspaces: WorkspaceManager,
    images: ImageResolver,
    orchestrator: ContainerOrchestrator,
    artifacts: ArtifactCollector,
}

impl SandboxEngine {
    /// Build an engine around an already constructed runtime
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        platform: Arc<dyn HostPlatform>,
        config: SandboxConfig,
    ) -> Self {
        let recipes = vec![ImageRecipe::chart(&config.chart_image)];

        SandboxEngine {
            health: HealthMonitor::new(runtime.clone()),
            workspaces: WorkspaceManager::new(config.scratch_root.clone()),
            images: ImageResolver::new(runtime.clone(), recipes, config.auto_build_local_images),
            orchestrator: ContainerOrchestrator::new(runtime, platform),
            artifacts: ArtifactCollector::new(config.max_file_bytes),
            config,
        }
    }

    /// Connect to the local daemon for the detected host platform
    pub fn connect(config: SandboxConfig) -> Result<Self> {
        let platform = platform::detect();
        let runtime = DockerRuntime::connect(
            platform.as_ref(),
            config.docker_host.as_deref(),
            config.timeout,
        )?;
        info!(
            platform = platform.name(),
            address = runtime.address(),
            "Sandbox engine using Docker daemon"
        );

        Ok(SandboxEngine::new(Arc::new(runtime), platform, config))
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    pub fn images(&self) -> &ImageResolver {
        &self.images
    }

    /// Run one request to completion
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        let started = Instant::now();

        if !self.health.probe().await {
            let err = Error::DaemonUnavailable("health check failed".to_string());
            return ExecutionResult::failure(&err, started.elapsed());
        }

        let workspace = match self.workspaces.provision(&request).await {
            Ok(workspace) => workspace,
            Err(e) => {
                error!("Failed to provision workspace: {}", e);
                return ExecutionResult::failure(&e, started.elapsed());
            }
        };

        let result = match self.run_admitted(&request, &workspace, started).await {
            Ok(result) => result,
            Err(e) => {
                error!(workspace = %workspace.id(), "Execution failed: {}", e);
                ExecutionResult::failure(&e, started.elapsed())
            }
        };

        workspace.teardown().await;
        result
    }

    async fn run_admitted(
        &self,
        request: &ExecutionRequest,
        workspace: &SandboxWorkspace,
        started: Instant,
    ) -> Result<ExecutionResult> {
        let spec = ContainerSpec::for_language(request.language_kind, &self.config);
        self.images.ensure_image(&spec.image).await?;

        let outcome = self
            .orchestrator
            .run(&spec, workspace, self.config.timeout)
            .await?;
        let decoded = logs::decode(&outcome.logs);
        let files = self.artifacts.collect(workspace.output_dir()).await;
        let elapsed = started.elapsed();

        let result = match outcome.status {
            ExitStatus::Exited(0) => ExecutionResult::success(decoded.stdout, files, elapsed),
            ExitStatus::Exited(code) => {
                let err = Error::NonZeroExit(code);
                let message = if decoded.stderr.is_empty() {
                    err.to_string()
                } else {
                    decoded.stderr
                };
                ExecutionResult::failure(&err, elapsed)
                    .with_message(message)
                    .with_partial(decoded.stdout, files)
            }
            ExitStatus::TimedOut => {
                let err = Error::ExecutionTimeout(self.config.timeout.as_millis() as u64);
                ExecutionResult::failure(&err, elapsed).with_partial(decoded.stdout, files)
            }
        };

        info!(
            workspace = %workspace.id(),
            language = %request.language_kind,
            success = result.success,
            elapsed_ms = result.execution_time_millis,
            files = result.files.len(),
            "Execution finished"
        );
        Ok(result)
    }
}

#[async_trait]
impl CodeExecutor for SandboxEngine {
    fn name(&self) -> &str {
        "container"
    }

    fn supports_language(&self, _language: LanguageKind) -> bool {
        true
    }

    async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        SandboxEngine::execute(self, request).await
    }
}
