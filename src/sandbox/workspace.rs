//! Per-execution workspaces
//!
//! Each execution gets `<scratch_root>/sandbox-<id>/{code,output}`. The
//! source file lives in `code` (mounted read-only), artifacts land in
//! `output` (mounted read-write).

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::sandbox::executor::ExecutionRequest;

/// Private directory pair owned by one execution
///
/// Dropping a workspace that was never torn down removes it synchronously, so
/// the directories go away on every exit path, including cancellation.
#[derive(Debug)]
pub struct SandboxWorkspace {
    id: String,
    root: PathBuf,
    input_dir: PathBuf,
    output_dir: PathBuf,
    torn_down: bool,
}

impl SandboxWorkspace {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Remove both directories. Never fails; problems are logged.
    pub async fn teardown(mut self) {
        self.torn_down = true;
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => debug!("Removed workspace {}", self.root.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                workspace = %self.id,
                "Failed to remove workspace {}: {}",
                self.root.display(),
                e
            ),
        }
    }
}

impl Drop for SandboxWorkspace {
    fn drop(&mut self) {
        if self.torn_down {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.root) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    workspace = %self.id,
                    "Failed to remove workspace {}: {}",
                    self.root.display(),
                    e
                );
            }
        }
    }
}

/// Creates workspaces under a scratch root
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    scratch_root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(scratch_root: impl Into<PathBuf>) -> Self {
        WorkspaceManager {
            scratch_root: scratch_root.into(),
        }
    }

    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    /// Allocate a workspace and write the request's source into it
    pub async fn provision(&self, request: &ExecutionRequest) -> Result<SandboxWorkspace> {
        let id = Uuid::new_v4().to_string();
        let root = self.scratch_root.join(format!("sandbox-{}", id));

        let workspace = SandboxWorkspace {
            input_dir: root.join("code"),
            output_dir: root.join("output"),
            root,
            id,
            torn_down: false,
        };

        // Any early return below drops the guard and removes what was created
        tokio::fs::create_dir_all(&workspace.input_dir)
            .await
            .map_err(|e| workspace_error("create input directory", &workspace.input_dir, e))?;
        tokio::fs::create_dir_all(&workspace.output_dir)
            .await
            .map_err(|e| workspace_error("create output directory", &workspace.output_dir, e))?;
        open_output_dir(&workspace.output_dir).await?;

        let source_path = workspace
            .input_dir
            .join(request.language_kind.source_filename());
        tokio::fs::write(&source_path, request.source_code.as_bytes())
            .await
            .map_err(|e| workspace_error("write source file", &source_path, e))?;

        debug!(
            workspace = %workspace.id,
            language = %request.language_kind,
            "Provisioned workspace at {}",
            workspace.root.display()
        );

        Ok(workspace)
    }
}

fn workspace_error(action: &str, path: &Path, e: std::io::Error) -> Error {
    Error::Io(std::io::Error::new(
        e.kind(),
        format!("Failed to {} {}: {}", action, path.display(), e),
    ))
}

/// Let unprivileged container users write artifacts
#[cfg(unix)]
async fn open_output_dir(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o777))
        .await
        .map_err(|e| workspace_error("open permissions on", path, e))
}

#[cfg(not(unix))]
async fn open_output_dir(_path: &Path) -> Result<()> {
    Ok(())
}
