//! Container tool backed by the `docker` (or compatible) CLI

use std::path::Path;

use async_trait::async_trait;
use secrecy::SecretString;
use tracing::debug;

use crate::errors::DeployError;
use crate::services::command::{args, run_captured, run_streamed, CommandOutput};
use crate::services::{ContainerEngine, Removal, RunRequest};

const NO_SUCH_CONTAINER: &str = "no such container";

/// Container engine driving a docker-compatible CLI
#[derive(Debug, Clone)]
pub struct ContainerCli {
    program: String,
}

impl ContainerCli {
    /// Use a specific CLI binary (e.g. `docker`, `podman`)
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run_error(&self, container: &str, e: impl std::fmt::Display) -> DeployError {
        DeployError::Run {
            container: container.to_string(),
            message: format!("failed to run {}: {}", self.program, e),
        }
    }

    fn removal(&self, container: &str, output: CommandOutput) -> Result<Removal, DeployError> {
        if output.success {
            Ok(Removal::Removed)
        } else if output.stderr_contains(NO_SUCH_CONTAINER) {
            debug!("Container {} does not exist", container);
            Ok(Removal::NotFound)
        } else {
            Err(DeployError::Run {
                container: container.to_string(),
                message: output.failure_message(),
            })
        }
    }
}

impl Default for ContainerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

/// Arguments for a detached `run`
pub fn run_args(request: &RunRequest) -> Vec<String> {
    let mut out = args(&["run", "-d", "--name", request.name.as_str(), "-p"]);
    out.push(format!("{}:{}", request.host_port, request.container_port));
    for (key, value) in &request.env {
        out.push("-e".to_string());
        out.push(format!("{}={}", key, value));
    }
    out.push(request.image.clone());
    out
}

#[async_trait]
impl ContainerEngine for ContainerCli {
    async fn build(&self, context: &Path, tag: &str) -> Result<(), DeployError> {
        let build_error = |message: String| DeployError::Build {
            image: tag.to_string(),
            message,
        };

        let context = context.to_string_lossy().into_owned();
        let output = run_streamed(&self.program, &args(&["build", "-t", tag, context.as_str()]))
            .await
            .map_err(|e| build_error(format!("failed to run {} build: {}", self.program, e)))?;

        if !output.success {
            return Err(build_error(output.failure_message()));
        }
        Ok(())
    }

    async fn tag(&self, source: &str, target: &str) -> Result<(), DeployError> {
        let output = run_captured(&self.program, &args(&["tag", source, target]), None)
            .await
            .map_err(|e| DeployError::Publish {
                reference: target.to_string(),
                message: format!("failed to run {} tag: {}", self.program, e),
            })?;

        if !output.success {
            return Err(DeployError::Publish {
                reference: target.to_string(),
                message: output.failure_message(),
            });
        }
        Ok(())
    }

    async fn push(&self, reference: &str) -> Result<(), DeployError> {
        let output = run_streamed(&self.program, &args(&["push", reference]))
            .await
            .map_err(|e| DeployError::Publish {
                reference: reference.to_string(),
                message: format!("failed to run {} push: {}", self.program, e),
            })?;

        if !output.success {
            return Err(DeployError::Publish {
                reference: reference.to_string(),
                message: output.failure_message(),
            });
        }
        Ok(())
    }

    async fn login(
        &self,
        endpoint: &str,
        username: &str,
        password: &SecretString,
    ) -> Result<(), DeployError> {
        let output = run_captured(
            &self.program,
            &args(&["login", "--username", username, "--password-stdin", endpoint]),
            Some(password),
        )
        .await
        .map_err(|e| DeployError::Auth {
            endpoint: endpoint.to_string(),
            message: format!("failed to run {} login: {}", self.program, e),
        })?;

        if !output.success {
            return Err(DeployError::Auth {
                endpoint: endpoint.to_string(),
                message: output.failure_message(),
            });
        }
        Ok(())
    }

    async fn run(&self, request: &RunRequest) -> Result<String, DeployError> {
        let output = run_captured(&self.program, &run_args(request), None)
            .await
            .map_err(|e| self.run_error(&request.name, e))?;

        if !output.success {
            return Err(DeployError::Run {
                container: request.name.clone(),
                message: output.failure_message(),
            });
        }
        Ok(output.stdout.trim().to_string())
    }

    async fn stop(&self, name: &str) -> Result<Removal, DeployError> {
        let output = run_captured(&self.program, &args(&["stop", name]), None)
            .await
            .map_err(|e| self.run_error(name, e))?;
        self.removal(name, output)
    }

    async fn remove(&self, name: &str) -> Result<Removal, DeployError> {
        let output = run_captured(&self.program, &args(&["rm", name]), None)
            .await
            .map_err(|e| self.run_error(name, e))?;
        self.removal(name, output)
    }
}
