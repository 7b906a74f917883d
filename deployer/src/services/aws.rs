//! Identity, registry and orchestration services backed by the `aws` CLI

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Deserialize;
use tracing::debug;

use crate::errors::DeployError;
use crate::models::stack::{StackState, UpdateResponse};
use crate::services::command::{run_captured, CommandOutput};
use crate::services::{
    IdentityService, OrchestrationService, RegistryService, RepositoryCreation, StackRequest,
};

const REPOSITORY_NOT_FOUND: &str = "RepositoryNotFoundException";
const REPOSITORY_EXISTS: &str = "RepositoryAlreadyExistsException";
const STACK_MISSING: &str = "does not exist";
const NO_UPDATES: &str = "No updates are to be performed";

/// Cloud services driven through the `aws` command line
#[derive(Debug, Clone)]
pub struct AwsCli {
    program: String,
    profile: Option<String>,
}

impl AwsCli {
    pub fn new(profile: Option<String>) -> Self {
        Self {
            program: "aws".to_string(),
            profile,
        }
    }

    /// Invoke `aws <service> <operation> ...` with JSON output
    async fn call(
        &self,
        service: &str,
        operation: &str,
        region: Option<&str>,
        extra: &[String],
    ) -> std::io::Result<CommandOutput> {
        let mut cmd = vec![service.to_string(), operation.to_string()];
        cmd.extend(extra.iter().cloned());
        cmd.extend(["--output".to_string(), "json".to_string()]);
        if let Some(region) = region {
            cmd.extend(["--region".to_string(), region.to_string()]);
        }
        if let Some(profile) = &self.profile {
            cmd.extend(["--profile".to_string(), profile.clone()]);
        }
        run_captured(&self.program, &cmd, None).await
    }

    fn stack_error(request_stack: &str, region: &str, message: impl Into<String>) -> DeployError {
        DeployError::ProvisionRequest {
            stack: request_stack.to_string(),
            region: region.to_string(),
            message: message.into(),
        }
    }

    fn stack_args(request: &StackRequest) -> Result<Vec<String>, DeployError> {
        let mut out = vec![
            "--stack-name".to_string(),
            request.stack_name.clone(),
            "--template-body".to_string(),
            request.template_body.clone(),
            "--parameters".to_string(),
            serde_json::to_string(&request.parameters)?,
        ];
        if !request.capabilities.is_empty() {
            out.push("--capabilities".to_string());
            out.extend(request.capabilities.iter().cloned());
        }
        Ok(out)
    }
}

impl Default for AwsCli {
    fn default() -> Self {
        Self::new(None)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CallerIdentity {
    account: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeStacks {
    #[serde(default)]
    stacks: Vec<StackSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StackSummary {
    stack_status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListTasks {
    #[serde(default)]
    task_arns: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DescribeTasks {
    #[serde(default)]
    tasks: Vec<Task>,
}

#[derive(Debug, Deserialize)]
struct Task {
    #[serde(default)]
    attachments: Vec<Attachment>,
}

#[derive(Debug, Deserialize)]
struct Attachment {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    details: Vec<AttachmentDetail>,
}

#[derive(Debug, Deserialize)]
struct AttachmentDetail {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeNetworkInterfaces {
    #[serde(default)]
    network_interfaces: Vec<NetworkInterface>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NetworkInterface {
    #[serde(default)]
    association: Option<Association>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Association {
    #[serde(default)]
    public_ip: Option<String>,
}

/// Account id from `sts get-caller-identity`
pub fn parse_account(json: &str) -> Result<String, serde_json::Error> {
    let identity: CallerIdentity = serde_json::from_str(json)?;
    Ok(identity.account)
}

/// First stack's raw status from `cloudformation describe-stacks`
pub fn parse_stack_status(json: &str) -> Result<Option<String>, serde_json::Error> {
    let described: DescribeStacks = serde_json::from_str(json)?;
    Ok(described.stacks.into_iter().next().map(|s| s.stack_status))
}

/// Task identifiers from `ecs list-tasks`
pub fn parse_task_arns(json: &str) -> Result<Vec<String>, serde_json::Error> {
    let listed: ListTasks = serde_json::from_str(json)?;
    Ok(listed.task_arns)
}

/// Network interface id of the first task from `ecs describe-tasks`
pub fn parse_task_network_interface(json: &str) -> Result<Option<String>, serde_json::Error> {
    let described: DescribeTasks = serde_json::from_str(json)?;
    Ok(described
        .tasks
        .into_iter()
        .flat_map(|t| t.attachments)
        .filter(|a| a.kind.is_empty() || a.kind == "ElasticNetworkInterface")
        .flat_map(|a| a.details)
        .find(|d| d.name == "networkInterfaceId")
        .map(|d| d.value))
}

/// Public address from `ec2 describe-network-interfaces`
pub fn parse_public_ip(json: &str) -> Result<Option<String>, serde_json::Error> {
    let described: DescribeNetworkInterfaces = serde_json::from_str(json)?;
    Ok(described
        .network_interfaces
        .into_iter()
        .next()
        .and_then(|n| n.association)
        .and_then(|a| a.public_ip)
        .filter(|ip| !ip.is_empty()))
}

#[async_trait]
impl IdentityService for AwsCli {
    async fn caller_account(&self) -> Result<String, DeployError> {
        let output = self
            .call("sts", "get-caller-identity", None, &[])
            .await
            .map_err(|e| DeployError::Identity(format!("failed to run aws: {}", e)))?;

        if !output.success {
            return Err(DeployError::Identity(output.failure_message()));
        }
        parse_account(&output.stdout)
            .map_err(|e| DeployError::Identity(format!("unexpected identity response: {}", e)))
    }
}

#[async_trait]
impl RegistryService for AwsCli {
    async fn repository_exists(&self, name: &str, region: &str) -> Result<bool, DeployError> {
        let registry_error = |message: String| DeployError::Publish {
            reference: format!("repository {} in {}", name, region),
            message,
        };

        let extra = vec!["--repository-names".to_string(), name.to_string()];
        let output = self
            .call("ecr", "describe-repositories", Some(region), &extra)
            .await
            .map_err(|e| registry_error(format!("failed to run aws: {}", e)))?;

        repository_presence(&output).ok_or_else(|| registry_error(output.failure_message()))
    }

    async fn create_repository(
        &self,
        name: &str,
        region: &str,
    ) -> Result<RepositoryCreation, DeployError> {
        let registry_error = |message: String| DeployError::Publish {
            reference: format!("repository {} in {}", name, region),
            message,
        };

        let extra = vec!["--repository-name".to_string(), name.to_string()];
        let output = self
            .call("ecr", "create-repository", Some(region), &extra)
            .await
            .map_err(|e| registry_error(format!("failed to run aws: {}", e)))?;

        repository_creation(&output).ok_or_else(|| registry_error(output.failure_message()))
    }

    async fn login_password(&self, region: &str) -> Result<SecretString, DeployError> {
        let auth_error = |message: String| DeployError::Auth {
            endpoint: format!("registry in {}", region),
            message,
        };

        let output = self
            .call("ecr", "get-login-password", Some(region), &[])
            .await
            .map_err(|e| auth_error(format!("failed to run aws: {}", e)))?;

        if !output.success {
            return Err(auth_error(output.failure_message()));
        }
        let password = output.stdout.trim().to_string();
        if password.is_empty() {
            return Err(auth_error("empty login password".to_string()));
        }
        Ok(SecretString::from(password))
    }
}

#[async_trait]
impl OrchestrationService for AwsCli {
    async fn describe_stack(&self, name: &str, region: &str) -> Result<StackState, DeployError> {
        let extra = vec!["--stack-name".to_string(), name.to_string()];
        let output = self
            .call("cloudformation", "describe-stacks", Some(region), &extra)
            .await
            .map_err(|e| Self::stack_error(name, region, format!("failed to run aws: {}", e)))?;

        if !output.success {
            if stack_missing(&output) {
                return Ok(StackState::NotFound);
            }
            return Err(Self::stack_error(name, region, output.failure_message()));
        }

        let status = parse_stack_status(&output.stdout).map_err(|e| {
            Self::stack_error(name, region, format!("unexpected describe response: {}", e))
        })?;
        debug!("Stack {} status: {:?}", name, status);
        Ok(status
            .map(|s| StackState::from_status(&s))
            .unwrap_or(StackState::NotFound))
    }

    async fn create_stack(&self, request: &StackRequest) -> Result<(), DeployError> {
        let extra = Self::stack_args(request)?;
        let output = self
            .call("cloudformation", "create-stack", Some(request.region.as_str()), &extra)
            .await
            .map_err(|e| {
                Self::stack_error(&request.stack_name, &request.region, e.to_string())
            })?;

        if !output.success {
            return Err(Self::stack_error(
                &request.stack_name,
                &request.region,
                output.failure_message(),
            ));
        }
        Ok(())
    }

    async fn update_stack(&self, request: &StackRequest) -> Result<UpdateResponse, DeployError> {
        let extra = Self::stack_args(request)?;
        let output = self
            .call("cloudformation", "update-stack", Some(request.region.as_str()), &extra)
            .await
            .map_err(|e| {
                Self::stack_error(&request.stack_name, &request.region, e.to_string())
            })?;

        update_response(&output).ok_or_else(|| {
            Self::stack_error(&request.stack_name, &request.region, output.failure_message())
        })
    }

    async fn delete_stack(&self, name: &str, region: &str) -> Result<(), DeployError> {
        let extra = vec!["--stack-name".to_string(), name.to_string()];
        let output = self
            .call("cloudformation", "delete-stack", Some(region), &extra)
            .await
            .map_err(|e| Self::stack_error(name, region, e.to_string()))?;

        if !output.success {
            return Err(Self::stack_error(name, region, output.failure_message()));
        }
        Ok(())
    }

    async fn list_tasks(&self, cluster: &str, region: &str) -> Result<Vec<String>, DeployError> {
        let extra = vec![
            "--cluster".to_string(),
            cluster.to_string(),
            "--desired-status".to_string(),
            "RUNNING".to_string(),
        ];
        let output = self
            .call("ecs", "list-tasks", Some(region), &extra)
            .await
            .map_err(|e| DeployError::Resolution(format!("failed to run aws: {}", e)))?;

        if !output.success {
            return Err(DeployError::Resolution(format!(
                "unable to list tasks in cluster {} ({}): {}",
                cluster,
                region,
                output.failure_message()
            )));
        }
        parse_task_arns(&output.stdout)
            .map_err(|e| DeployError::Resolution(format!("unexpected response: {}", e)))
    }

    async fn task_network_interface(
        &self,
        cluster: &str,
        task: &str,
        region: &str,
    ) -> Result<Option<String>, DeployError> {
        let extra = vec![
            "--cluster".to_string(),
            cluster.to_string(),
            "--tasks".to_string(),
            task.to_string(),
        ];
        let output = self
            .call("ecs", "describe-tasks", Some(region), &extra)
            .await
            .map_err(|e| DeployError::Resolution(format!("failed to run aws: {}", e)))?;

        if !output.success {
            return Err(DeployError::Resolution(format!(
                "unable to describe task {}: {}",
                task,
                output.failure_message()
            )));
        }
        parse_task_network_interface(&output.stdout)
            .map_err(|e| DeployError::Resolution(format!("unexpected response: {}", e)))
    }

    async fn network_interface_public_ip(
        &self,
        interface: &str,
        region: &str,
    ) -> Result<Option<String>, DeployError> {
        let extra = vec![
            "--network-interface-ids".to_string(),
            interface.to_string(),
        ];
        let output = self
            .call("ec2", "describe-network-interfaces", Some(region), &extra)
            .await
            .map_err(|e| DeployError::Resolution(format!("failed to run aws: {}", e)))?;

        if !output.success {
            return Err(DeployError::Resolution(format!(
                "unable to describe network interface {}: {}",
                interface,
                output.failure_message()
            )));
        }
        parse_public_ip(&output.stdout)
            .map_err(|e| DeployError::Resolution(format!("unexpected response: {}", e)))
    }
}

/// Whether a `describe-repositories` call found the repository; `None` for other failures
pub fn repository_presence(output: &CommandOutput) -> Option<bool> {
    if output.success {
        Some(true)
    } else if output.stderr_contains(REPOSITORY_NOT_FOUND) {
        Some(false)
    } else {
        None
    }
}

/// Outcome of a `create-repository` call; losing a create race counts as success
pub fn repository_creation(output: &CommandOutput) -> Option<RepositoryCreation> {
    if output.success {
        Some(RepositoryCreation::Created)
    } else if output.stderr_contains(REPOSITORY_EXISTS) {
        Some(RepositoryCreation::AlreadyExists)
    } else {
        None
    }
}

/// A failed stack call that failed only because the stack is absent
pub fn stack_missing(output: &CommandOutput) -> bool {
    !output.success && output.stderr_contains(STACK_MISSING)
}

/// Outcome of an `update-stack` call
pub fn update_response(output: &CommandOutput) -> Option<UpdateResponse> {
    if output.success {
        Some(UpdateResponse::Submitted)
    } else if output.stderr_contains(NO_UPDATES) {
        Some(UpdateResponse::NoChanges)
    } else {
        None
    }
}
