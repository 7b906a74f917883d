//! Remote services the pipeline drives
//!
//! Each service is a trait so the pipeline stages can run against stubs in
//! tests. Production implementations shell out to the container tool and the
//! cloud CLI.

pub mod aws;
pub mod command;
pub mod container;

use std::path::Path;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::errors::DeployError;
use crate::models::parameters::ParameterEntry;
use crate::models::stack::{StackState, UpdateResponse};

/// Result of a stop or remove call on a named container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Removed,
    NotFound,
}

/// Result of a repository create call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryCreation {
    Created,
    AlreadyExists,
}

/// A detached container start request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub image: String,
    pub name: String,
    pub host_port: u16,
    pub container_port: u16,
    pub env: Vec<(String, String)>,
}

/// A create or update request for a stack
#[derive(Debug, Clone, PartialEq)]
pub struct StackRequest {
    pub stack_name: String,
    pub region: String,
    pub template_body: String,
    pub parameters: Vec<ParameterEntry>,
    pub capabilities: Vec<String>,
}

/// Local container build and run tool
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Build an image from a context directory
    async fn build(&self, context: &Path, tag: &str) -> Result<(), DeployError>;

    /// Add a second reference to a local image
    async fn tag(&self, source: &str, target: &str) -> Result<(), DeployError>;

    /// Push a fully qualified reference
    async fn push(&self, reference: &str) -> Result<(), DeployError>;

    /// Log the tool into a registry endpoint
    async fn login(
        &self,
        endpoint: &str,
        username: &str,
        password: &SecretString,
    ) -> Result<(), DeployError>;

    /// Start a detached container, returning its id
    async fn run(&self, request: &RunRequest) -> Result<String, DeployError>;

    /// Stop a named container
    async fn stop(&self, name: &str) -> Result<Removal, DeployError>;

    /// Remove a named container
    async fn remove(&self, name: &str) -> Result<Removal, DeployError>;
}

/// Caller identity lookup
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Account the current credentials belong to
    async fn caller_account(&self) -> Result<String, DeployError>;
}

/// Image registry
#[async_trait]
pub trait RegistryService: Send + Sync {
    async fn repository_exists(&self, name: &str, region: &str) -> Result<bool, DeployError>;

    async fn create_repository(
        &self,
        name: &str,
        region: &str,
    ) -> Result<RepositoryCreation, DeployError>;

    /// Short-lived registry password for the caller's account
    async fn login_password(&self, region: &str) -> Result<SecretString, DeployError>;
}

/// Stack provisioning and task inspection service
#[async_trait]
pub trait OrchestrationService: Send + Sync {
    async fn describe_stack(&self, name: &str, region: &str) -> Result<StackState, DeployError>;

    async fn create_stack(&self, request: &StackRequest) -> Result<(), DeployError>;

    async fn update_stack(&self, request: &StackRequest) -> Result<UpdateResponse, DeployError>;

    async fn delete_stack(&self, name: &str, region: &str) -> Result<(), DeployError>;

    /// Identifiers of running tasks in a cluster
    async fn list_tasks(&self, cluster: &str, region: &str) -> Result<Vec<String>, DeployError>;

    /// Network interface attached to a task, if any
    async fn task_network_interface(
        &self,
        cluster: &str,
        task: &str,
        region: &str,
    ) -> Result<Option<String>, DeployError>;

    /// Public address associated with a network interface, if any
    async fn network_interface_public_ip(
        &self,
        interface: &str,
        region: &str,
    ) -> Result<Option<String>, DeployError>;
}
