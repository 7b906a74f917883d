//! Public endpoint resolution for provisioned stacks

use std::sync::Arc;

use tracing::{debug, info};

use crate::errors::DeployError;
use crate::models::stack::RunningInstance;
use crate::services::OrchestrationService;

/// Finds where a running task can be reached. Read-only.
pub struct EndpointResolver {
    service: Arc<dyn OrchestrationService>,
}

impl EndpointResolver {
    pub fn new(service: Arc<dyn OrchestrationService>) -> Self {
        Self { service }
    }

    /// Resolve the public address of the first running task in `cluster`
    pub async fn resolve_public_endpoint(
        &self,
        cluster: &str,
        stack_name: &str,
        region: &str,
    ) -> Result<RunningInstance, DeployError> {
        let tasks = self.service.list_tasks(cluster, region).await?;
        let task = tasks.into_iter().next().ok_or_else(|| {
            DeployError::NotFound(format!(
                "no running tasks in cluster {} for stack {} ({})",
                cluster, stack_name, region
            ))
        })?;
        debug!("Resolving endpoint of task {}", task);

        let interface = self
            .service
            .task_network_interface(cluster, &task, region)
            .await?
            .ok_or_else(|| {
                DeployError::Resolution(format!("task {} has no network interface", task))
            })?;

        let public_address = self
            .service
            .network_interface_public_ip(&interface, region)
            .await?
            .ok_or_else(|| {
                DeployError::Resolution(format!(
                    "network interface {} of task {} has no public address",
                    interface, task
                ))
            })?;

        info!("Stack {} reachable at {}", stack_name, public_address);
        Ok(RunningInstance {
            task_identifier: task,
            network_interface_identifier: interface,
            public_address,
        })
    }
}
