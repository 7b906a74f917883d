//! Stack provisioner

use std::sync::Arc;

use tracing::{info, warn};

use crate::errors::DeployError;
use crate::models::parameters::DeploymentParameters;
use crate::models::stack::{
    DeleteOutcome, StackState, SubmitOutcome, UpdateResponse, KNOWN_CAPABILITIES,
};
use crate::services::{OrchestrationService, StackRequest};

/// Creates, updates and deletes stacks
///
/// Requests are submitted and returned from immediately; convergence is
/// observed separately through [`StackProvisioner::status`] or the poller.
pub struct StackProvisioner {
    service: Arc<dyn OrchestrationService>,
}

impl StackProvisioner {
    pub fn new(service: Arc<dyn OrchestrationService>) -> Self {
        Self { service }
    }

    /// Create the stack if it does not exist, update it otherwise
    pub async fn deploy(
        &self,
        stack_name: &str,
        template: &str,
        parameters: &DeploymentParameters,
        capabilities: &[String],
        region: &str,
    ) -> Result<SubmitOutcome, DeployError> {
        parameters.validate()?;
        if stack_name.trim().is_empty() {
            return Err(DeployError::Validation("stack name must not be empty".to_string()));
        }

        let rejected = |message: String| DeployError::ProvisionRequest {
            stack: stack_name.to_string(),
            region: region.to_string(),
            message,
        };
        if template.trim().is_empty() {
            return Err(rejected("template body is empty".to_string()));
        }
        if let Some(unknown) = capabilities
            .iter()
            .find(|c| !KNOWN_CAPABILITIES.contains(&c.as_str()))
        {
            return Err(rejected(format!("unknown capability: {}", unknown)));
        }

        let request = StackRequest {
            stack_name: stack_name.to_string(),
            region: region.to_string(),
            template_body: template.to_string(),
            parameters: parameters.to_entries(),
            capabilities: capabilities.to_vec(),
        };

        let current = self.service.describe_stack(stack_name, region).await?;
        info!("Stack {} in {} is {}", stack_name, region, current);

        match current {
            StackState::NotFound => {
                self.service.create_stack(&request).await?;
                info!("Submitted create for stack {}", stack_name);
                Ok(SubmitOutcome::Created)
            }
            StackState::DeleteInProgress => Err(rejected(
                "stack is being deleted; wait for the delete to finish".to_string(),
            )),
            _ => match self.service.update_stack(&request).await? {
                UpdateResponse::Submitted => {
                    info!("Submitted update for stack {}", stack_name);
                    Ok(SubmitOutcome::Updated)
                }
                UpdateResponse::NoChanges => {
                    info!("Stack {} is already up to date", stack_name);
                    Ok(SubmitOutcome::Unchanged)
                }
            },
        }
    }

    /// Current stack state
    pub async fn status(&self, stack_name: &str, region: &str) -> Result<StackState, DeployError> {
        self.service.describe_stack(stack_name, region).await
    }

    /// Submit a delete for the stack; a missing stack is a no-op
    pub async fn teardown(
        &self,
        stack_name: &str,
        region: &str,
    ) -> Result<DeleteOutcome, DeployError> {
        match self.service.describe_stack(stack_name, region).await? {
            StackState::NotFound => {
                warn!("Stack {} does not exist in {}", stack_name, region);
                Ok(DeleteOutcome::NotFound)
            }
            _ => {
                self.service.delete_stack(stack_name, region).await?;
                info!("Submitted delete for stack {}", stack_name);
                Ok(DeleteOutcome::Submitted)
            }
        }
    }
}
