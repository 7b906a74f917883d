//! Container image builder

use std::sync::Arc;

use tracing::info;

use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::models::image::BuildSpec;
use crate::services::ContainerEngine;

/// Builds local images from a build context
pub struct ImageBuilder {
    engine: Arc<dyn ContainerEngine>,
}

impl ImageBuilder {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self { engine }
    }

    /// Build the image and return its local `name:tag` reference
    ///
    /// Build failures are not retried: the same context fails the same way.
    pub async fn build(&self, spec: &BuildSpec) -> Result<String, DeployError> {
        if spec.image_name().trim().is_empty() || spec.tag().trim().is_empty() {
            return Err(DeployError::Validation(
                "image name and tag must not be empty".to_string(),
            ));
        }

        let context = Dir::new(spec.build_context_path());
        if !context.exists().await {
            return Err(DeployError::Validation(format!(
                "build context does not exist: {}",
                context.path().display()
            )));
        }

        let local_tag = spec.local_tag();
        info!(
            "Building image {} from {}",
            local_tag,
            context.path().display()
        );
        self.engine.build(context.path(), &local_tag).await?;
        info!("Built image {}", local_tag);

        Ok(local_tag)
    }
}
