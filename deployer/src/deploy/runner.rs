//! Local container runner

use std::sync::Arc;

use tracing::{info, warn};

use crate::errors::DeployError;
use crate::services::{ContainerEngine, Removal, RunRequest};
use crate::storage::settings::{CatalogSettings, ModelSettings};

/// Port the application listens on inside the container
pub const CONTAINER_PORT: u16 = 80;

/// Result of a local run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRun {
    pub container_id: String,
    /// What happened to the previous container with the same name
    pub previous: Removal,
    pub url: String,
}

/// Replaces the local development container
pub struct LocalRunner {
    engine: Arc<dyn ContainerEngine>,
}

impl LocalRunner {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self { engine }
    }

    /// Stop and remove a named container
    ///
    /// A container that does not exist is reported as [`Removal::NotFound`],
    /// not as an error.
    pub async fn stop_local(&self, container_name: &str) -> Result<Removal, DeployError> {
        if self.engine.stop(container_name).await? == Removal::NotFound {
            return Ok(Removal::NotFound);
        }
        let removed = self.engine.remove(container_name).await?;
        info!("Removed container {}", container_name);
        Ok(removed)
    }

    /// Replace any container named `container_name` with a fresh one
    ///
    /// When the new container fails to start the previous one stays removed.
    pub async fn run_local(
        &self,
        image: &str,
        container_name: &str,
        port: u16,
        env: &[(String, String)],
    ) -> Result<LocalRun, DeployError> {
        let previous = self.stop_local(container_name).await?;
        if previous == Removal::NotFound {
            info!("No previous container named {}", container_name);
        }

        let request = RunRequest {
            image: image.to_string(),
            name: container_name.to_string(),
            host_port: port,
            container_port: CONTAINER_PORT,
            env: env.to_vec(),
        };
        let container_id = match self.engine.run(&request).await {
            Ok(id) => id,
            Err(e) => {
                if previous == Removal::Removed {
                    warn!(
                        "Previous container {} was removed and not restored",
                        container_name
                    );
                }
                return Err(e);
            }
        };

        let url = local_url(port);
        info!("Container {} running {} at {}", container_name, image, url);
        Ok(LocalRun {
            container_id,
            previous,
            url,
        })
    }
}

pub fn local_url(port: u16) -> String {
    format!("http://localhost:{}", port)
}

/// Render a temperature the way the application parses it (`1.0`, not `1`)
pub fn format_temperature(temperature: f64) -> String {
    format!("{:?}", temperature)
}

/// Environment handed to the application container
pub fn app_environment(
    region: &str,
    model: &ModelSettings,
    catalog: &CatalogSettings,
) -> Vec<(String, String)> {
    let mut env = vec![
        ("AWS_DEFAULT_REGION".to_string(), region.to_string()),
        ("STRANDS_MODEL_ID".to_string(), model.model_id.clone()),
        ("STRANDS_MAX_TOKENS".to_string(), model.max_tokens.to_string()),
        ("STRANDS_TEMPERATURE".to_string(), format_temperature(model.temperature)),
    ];

    let optional = [
        ("DATABASE_NAME", &catalog.database_name),
        ("TABLE_NAME", &catalog.table_name),
        ("ATHENA_RESULTS_BUCKET", &catalog.results_bucket),
    ];
    for (key, value) in optional {
        if let Some(value) = value.as_ref().filter(|v| !v.is_empty()) {
            env.push((key.to_string(), value.clone()));
        }
    }

    env
}
