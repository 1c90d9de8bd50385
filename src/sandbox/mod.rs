//! Sandbox module - Container-backed code execution
//!
//! Untrusted snippets run to completion in short-lived, network-isolated
//! containers with memory and CPU limits. Each execution owns a private
//! workspace that is removed however the run ends.

mod artifacts;
mod container;
mod daemon;
mod engine;
mod executor;
mod health;
mod image;
mod logs;
mod platform;
mod workspace;

pub use artifacts::{classify, ArtifactCollector, MAX_FILE_BYTES};
pub use container::{
    image_for, BindMount, ContainerOrchestrator, ContainerSpec, ExitStatus, RunOutcome,
    CONTAINER_INPUT_DIR, CONTAINER_OUTPUT_DIR,
};
pub use daemon::{ContainerRuntime, DockerRuntime};
pub use engine::SandboxEngine;
pub use executor::{
    CodeExecutor, ExecutionRequest, ExecutionResult, LanguageKind, MimeKind, OutputFile,
};
pub use health::{HealthMonitor, HealthReport};
pub use image::{
    is_locally_built, split_image_reference, ImageRecipe, ImageResolver, CHART_IMAGE_TAG,
};
pub use logs::{decode, DecodedLogs, RawLogCapture};
pub use platform::{detect, DriveLetterPlatform, HostPlatform, PosixPlatform};
pub use workspace::{SandboxWorkspace, WorkspaceManager};

#[cfg(test)]
pub(crate) use daemon::fake::FakeRuntime;
#[cfg(test)]
pub(crate) use engine::tests as engine_tests;
