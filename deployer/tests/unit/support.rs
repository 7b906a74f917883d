//! Recording service stubs

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use deployctl::deploy::pipeline::{Pipeline, Services};
use deployctl::deploy::publisher::PublisherOptions;
use deployctl::errors::DeployError;
use deployctl::models::parameters::{self, DeploymentParameters};
use deployctl::models::stack::{StackState, UpdateResponse};
use deployctl::services::{
    ContainerEngine, IdentityService, OrchestrationService, Removal, RegistryService,
    RepositoryCreation, RunRequest, StackRequest,
};
use deployctl::utils::CooldownOptions;

pub const ACCOUNT: &str = "123456789012";

fn record(calls: &Mutex<Vec<String>>, call: String) {
    calls.lock().unwrap().push(call);
}

/// Container engine that records calls and keeps track of one named container
#[derive(Default)]
pub struct StubEngine {
    pub calls: Mutex<Vec<String>>,
    pub fail_build: bool,
    pub fail_login: bool,
    pub fail_run: bool,
    /// Pushes that fail before one succeeds
    pub push_failures: AtomicU32,
    /// Names of containers that currently exist, with their image
    pub containers: Mutex<Vec<(String, String)>>,
    pub login_password: Mutex<Option<String>>,
    pub runs: Mutex<Vec<RunRequest>>,
}

impl StubEngine {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn containers(&self) -> Vec<(String, String)> {
        self.containers.lock().unwrap().clone()
    }

    fn forget(&self, name: &str) -> Removal {
        let mut containers = self.containers.lock().unwrap();
        let before = containers.len();
        containers.retain(|(n, _)| n != name);
        if containers.len() < before {
            Removal::Removed
        } else {
            Removal::NotFound
        }
    }
}

#[async_trait]
impl ContainerEngine for StubEngine {
    async fn build(&self, _context: &Path, tag: &str) -> Result<(), DeployError> {
        record(&self.calls, format!("build {}", tag));
        if self.fail_build {
            return Err(DeployError::Build {
                image: tag.to_string(),
                message: "exit status 1".to_string(),
            });
        }
        Ok(())
    }

    async fn tag(&self, source: &str, target: &str) -> Result<(), DeployError> {
        record(&self.calls, format!("tag {} {}", source, target));
        Ok(())
    }

    async fn push(&self, reference: &str) -> Result<(), DeployError> {
        record(&self.calls, format!("push {}", reference));
        let remaining = self.push_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.push_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(DeployError::Publish {
                reference: reference.to_string(),
                message: "connection reset".to_string(),
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
        record(&self.calls, format!("login {} {}", endpoint, username));
        if self.fail_login {
            return Err(DeployError::Auth {
                endpoint: endpoint.to_string(),
                message: "denied".to_string(),
            });
        }
        *self.login_password.lock().unwrap() = Some(password.expose_secret().to_string());
        Ok(())
    }

    async fn run(&self, request: &RunRequest) -> Result<String, DeployError> {
        record(&self.calls, format!("run {}", request.name));
        self.runs.lock().unwrap().push(request.clone());
        if self.fail_run {
            return Err(DeployError::Run {
                container: request.name.clone(),
                message: "port is already allocated".to_string(),
            });
        }
        self.containers
            .lock()
            .unwrap()
            .push((request.name.clone(), request.image.clone()));
        Ok(format!("{}-id", request.name))
    }

    async fn stop(&self, name: &str) -> Result<Removal, DeployError> {
        record(&self.calls, format!("stop {}", name));
        let exists = self.containers.lock().unwrap().iter().any(|(n, _)| n == name);
        Ok(if exists {
            Removal::Removed
        } else {
            Removal::NotFound
        })
    }

    async fn remove(&self, name: &str) -> Result<Removal, DeployError> {
        record(&self.calls, format!("remove {}", name));
        Ok(self.forget(name))
    }
}

/// Identity service answering with a fixed account
pub struct StubIdentity {
    pub account: String,
    pub calls: AtomicU32,
}

impl StubIdentity {
    pub fn new(account: &str) -> Self {
        Self {
            account: account.to_string(),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityService for StubIdentity {
    async fn caller_account(&self) -> Result<String, DeployError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.account.clone())
    }
}

/// Registry that remembers the repositories it holds
#[derive(Default)]
pub struct StubRegistry {
    pub calls: Mutex<Vec<String>>,
    pub repositories: Mutex<Vec<String>>,
    /// Another caller creates the repository between our check and create
    pub lose_create_race: bool,
}

impl StubRegistry {
    pub fn with_repository(name: &str) -> Self {
        let registry = Self::default();
        registry.repositories.lock().unwrap().push(name.to_string());
        registry
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RegistryService for StubRegistry {
    async fn repository_exists(&self, name: &str, region: &str) -> Result<bool, DeployError> {
        record(&self.calls, format!("exists {} {}", name, region));
        Ok(self.repositories.lock().unwrap().iter().any(|r| r == name))
    }

    async fn create_repository(
        &self,
        name: &str,
        region: &str,
    ) -> Result<RepositoryCreation, DeployError> {
        record(&self.calls, format!("create {} {}", name, region));
        let mut repositories = self.repositories.lock().unwrap();
        if self.lose_create_race || repositories.iter().any(|r| r == name) {
            repositories.push(name.to_string());
            return Ok(RepositoryCreation::AlreadyExists);
        }
        repositories.push(name.to_string());
        Ok(RepositoryCreation::Created)
    }

    async fn login_password(&self, region: &str) -> Result<SecretString, DeployError> {
        record(&self.calls, format!("password {}", region));
        Ok(SecretString::from("s3cret-token".to_string()))
    }
}

/// Orchestration service replaying a scripted sequence of stack states
#[derive(Default)]
pub struct StubOrchestration {
    pub calls: Mutex<Vec<String>>,
    /// States returned by successive describes; the last one repeats
    pub states: Mutex<VecDeque<StackState>>,
    pub no_changes: bool,
    pub reject_create: bool,
    pub requests: Mutex<Vec<StackRequest>>,
    pub tasks: Vec<String>,
    pub interface: Option<String>,
    pub public_ip: Option<String>,
}

impl StubOrchestration {
    pub fn with_states(states: &[StackState]) -> Self {
        Self {
            states: Mutex::new(states.iter().cloned().collect()),
            ..Default::default()
        }
    }

    pub fn with_task(interface: Option<&str>, public_ip: Option<&str>) -> Self {
        Self {
            tasks: vec!["arn:aws:ecs:us-west-2:123456789012:task/app/abc".to_string()],
            interface: interface.map(str::to_string),
            public_ip: public_ip.map(str::to_string),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn describe_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.starts_with("describe"))
            .count()
    }
}

#[async_trait]
impl OrchestrationService for StubOrchestration {
    async fn describe_stack(&self, name: &str, region: &str) -> Result<StackState, DeployError> {
        record(&self.calls, format!("describe {} {}", name, region));
        let mut states = self.states.lock().unwrap();
        let state = if states.len() > 1 {
            states.pop_front()
        } else {
            states.front().cloned()
        };
        Ok(state.unwrap_or(StackState::NotFound))
    }

    async fn create_stack(&self, request: &StackRequest) -> Result<(), DeployError> {
        record(&self.calls, format!("create {}", request.stack_name));
        self.requests.lock().unwrap().push(request.clone());
        if self.reject_create {
            return Err(DeployError::ProvisionRequest {
                stack: request.stack_name.clone(),
                region: request.region.clone(),
                message: "Template format error".to_string(),
            });
        }
        Ok(())
    }

    async fn update_stack(&self, request: &StackRequest) -> Result<UpdateResponse, DeployError> {
        record(&self.calls, format!("update {}", request.stack_name));
        self.requests.lock().unwrap().push(request.clone());
        if self.no_changes {
            Ok(UpdateResponse::NoChanges)
        } else {
            Ok(UpdateResponse::Submitted)
        }
    }

    async fn delete_stack(&self, name: &str, _region: &str) -> Result<(), DeployError> {
        record(&self.calls, format!("delete {}", name));
        Ok(())
    }

    async fn list_tasks(&self, cluster: &str, _region: &str) -> Result<Vec<String>, DeployError> {
        record(&self.calls, format!("list_tasks {}", cluster));
        Ok(self.tasks.clone())
    }

    async fn task_network_interface(
        &self,
        _cluster: &str,
        task: &str,
        _region: &str,
    ) -> Result<Option<String>, DeployError> {
        record(&self.calls, format!("task_interface {}", task));
        Ok(self.interface.clone())
    }

    async fn network_interface_public_ip(
        &self,
        interface: &str,
        _region: &str,
    ) -> Result<Option<String>, DeployError> {
        record(&self.calls, format!("public_ip {}", interface));
        Ok(self.public_ip.clone())
    }
}

/// Every stub a pipeline needs, kept typed for assertions
pub struct Stubs {
    pub engine: Arc<StubEngine>,
    pub identity: Arc<StubIdentity>,
    pub registry: Arc<StubRegistry>,
    pub orchestration: Arc<StubOrchestration>,
}

impl Stubs {
    pub fn new(
        engine: StubEngine,
        registry: StubRegistry,
        orchestration: StubOrchestration,
    ) -> Self {
        Self {
            engine: Arc::new(engine),
            identity: Arc::new(StubIdentity::new(ACCOUNT)),
            registry: Arc::new(registry),
            orchestration: Arc::new(orchestration),
        }
    }

    pub fn services(&self) -> Services {
        Services {
            container: self.engine.clone(),
            identity: self.identity.clone(),
            registry: self.registry.clone(),
            orchestration: self.orchestration.clone(),
        }
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.services(), fast_publisher_options())
    }
}

impl Default for Stubs {
    fn default() -> Self {
        Self::new(
            StubEngine::default(),
            StubRegistry::default(),
            StubOrchestration::default(),
        )
    }
}

pub fn fast_cooldown() -> CooldownOptions {
    CooldownOptions {
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        multiplier: 2.0,
    }
}

pub fn fast_publisher_options() -> PublisherOptions {
    PublisherOptions {
        push_attempts: 3,
        push_cooldown: fast_cooldown(),
    }
}

/// A parameter set with every required key filled in
pub fn complete_parameters() -> DeploymentParameters {
    DeploymentParameters::new()
        .with(parameters::VPC_ID, "vpc-0abc")
        .with(parameters::SUBNET_ID, "subnet-0abc")
        .with(parameters::S3_BUCKET_NAME, "app-data")
        .with(parameters::IMAGE_URI, "123456789012.dkr.ecr.us-west-2.amazonaws.com/app:v1")
        .with(parameters::DATABASE_NAME, "analytics")
        .with(parameters::TABLE_NAME, "events")
        .with(parameters::STACK_NAME, "app-stack")
        .with(parameters::REGION, "us-west-2")
}

/// Sleep function that records the requested delays instead of sleeping
pub fn recording_sleep(
    delays: Arc<Mutex<Vec<Duration>>>,
) -> impl Fn(Duration) -> std::future::Ready<()> {
    move |delay| {
        delays.lock().unwrap().push(delay);
        std::future::ready(())
    }
}
