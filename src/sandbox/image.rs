//! Image resolution
//!
//! Public base images are pulled on demand. Images whose name carries the
//! `local-` marker are produced by this system from a build recipe and are
//! never pulled from a registry.

use std::sync::Arc;
use tracing::info;

use crate::config::ChartImageConfig;
use crate::error::{Error, Result};
use crate::sandbox::daemon::ContainerRuntime;

/// Name prefix marking images that only exist when built locally
pub const LOCAL_IMAGE_PREFIX: &str = "local-";

/// Tag of the chart-capable Python image
pub const CHART_IMAGE_TAG: &str = "local-sandbox-python";

/// Whether an image is locally built and must never be pulled
pub fn is_locally_built(image: &str) -> bool {
    image.starts_with(LOCAL_IMAGE_PREFIX)
}

/// Split `name[:tag|@digest]` into the pull name and tag.
///
/// A colon inside the registry host (`host:5000/img`) is not a tag.
pub fn split_image_reference(image: &str) -> (&str, &str) {
    if let Some((name, digest)) = image.split_once('@') {
        return (name, digest);
    }
    match image.rsplit_once(':') {
        Some((name, tag)) if !tag.contains('/') => (name, tag),
        _ => (image, "latest"),
    }
}

/// Generated build recipe for a locally built image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecipe {
    pub tag: String,
    pub base_image: String,
    pub packages: Vec<String>,
}

impl ImageRecipe {
    /// Recipe for the chart image
    pub fn chart(config: &ChartImageConfig) -> Self {
        ImageRecipe {
            tag: CHART_IMAGE_TAG.to_string(),
            base_image: config.base_image.clone(),
            packages: config.packages.clone(),
        }
    }

    /// Render the Dockerfile
    pub fn dockerfile(&self) -> String {
        let mut dockerfile = format!("FROM {}\n\n", self.base_image);

        if !self.packages.is_empty() {
            dockerfile.push_str("RUN pip install --no-cache-dir \\\n");
            let lines: Vec<String> = self.packages.iter().map(|p| format!("    {}", p)).collect();
            dockerfile.push_str(&lines.join(" \\\n"));
            dockerfile.push_str("\n\n");
        }

        dockerfile.push_str(
            "RUN useradd -m sandbox \\\n    && mkdir -p /output \\\n    && chown sandbox:sandbox /output\n\
             USER sandbox\n\
             WORKDIR /code\n",
        );
        dockerfile
    }

    /// Tar archive holding just the Dockerfile
    pub fn build_context(&self) -> Result<Vec<u8>> {
        let dockerfile = self.dockerfile();

        let mut header = tar::Header::new_gnu();
        header.set_size(dockerfile.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();

        let mut builder = tar::Builder::new(Vec::new());
        builder.append_data(&mut header, "Dockerfile", dockerfile.as_bytes())?;
        Ok(builder.into_inner()?)
    }
}

/// Makes sure the image a spec needs is present locally
#[derive(Clone)]
pub struct ImageResolver {
    runtime: Arc<dyn ContainerRuntime>,
    recipes: Vec<ImageRecipe>,
    auto_build: bool,
}

impl ImageResolver {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, recipes: Vec<ImageRecipe>, auto_build: bool) -> Self {
        ImageResolver {
            runtime,
            recipes,
            auto_build,
        }
    }

    /// Recipe that produces `tag`, if this system knows how to build it
    pub fn recipe_for(&self, tag: &str) -> Option<&ImageRecipe> {
        self.recipes.iter().find(|r| r.tag == tag)
    }

    /// Ensure `image` exists locally, pulling public images when missing
    pub async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.runtime.image_exists(image).await? {
            return Ok(());
        }

        if is_locally_built(image) {
            if self.auto_build {
                if let Some(recipe) = self.recipe_for(image) {
                    info!("Local image {} missing, building it", image);
                    return self.build(recipe).await;
                }
            }
            return Err(Error::ImageUnavailable(format!(
                "Local image {} not found. Please build it first (sandbox-engine build-image).",
                image
            )));
        }

        info!("Pulling image: {}", image);
        self.runtime.pull_image(image).await
    }

    /// Build the chart image regardless of whether it already exists
    pub async fn build_local_image(&self) -> Result<String> {
        let recipe = self.recipe_for(CHART_IMAGE_TAG).ok_or_else(|| {
            Error::Config(format!("No build recipe registered for {}", CHART_IMAGE_TAG))
        })?;
        self.build(recipe).await?;
        Ok(recipe.tag.clone())
    }

    /// Build a locally built image from its recipe
    pub async fn build(&self, recipe: &ImageRecipe) -> Result<()> {
        let context = recipe.build_context()?;
        info!(
            tag = %recipe.tag,
            base = %recipe.base_image,
            packages = %recipe.packages.join(" "),
            "Building sandbox image"
        );
        self.runtime.build_image(&recipe.tag, context).await
    }
}
