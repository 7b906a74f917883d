//! Pipeline orchestrator
//!
//! Composes the stages into fixed workflows. Steps run strictly in order and
//! the first failure stops the workflow; the failing step's error is handed
//! back unchanged together with the steps that had already completed. Side
//! effects of completed steps are left in place.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::deploy::builder::ImageBuilder;
use crate::deploy::endpoint::EndpointResolver;
use crate::deploy::fsm::{RunEvent, Step, Workflow, WorkflowFsm};
use crate::deploy::poller::{wait_for_stack, PollOutcome, PollPolicy};
use crate::deploy::provisioner::StackProvisioner;
use crate::deploy::publisher::{PublisherOptions, RegistryPublisher};
use crate::deploy::runner::LocalRunner;
use crate::deploy::verify::{verify_endpoint, VerifyOptions};
use crate::errors::{DeployError, ErrorKind};
use crate::models::image::{validate_repository_name, validate_tag, BuildSpec, PublishTarget};
use crate::models::parameters::DeploymentParameters;
use crate::models::stack::{RunningInstance, SubmitOutcome};
use crate::services::{
    ContainerEngine, IdentityService, OrchestrationService, RegistryService, RepositoryCreation,
};
use crate::utils::{generate_run_id, tokio_sleep};

/// A workflow stopped at `step`
#[derive(Error, Debug)]
#[error("{workflow} failed at step {step}: {error}")]
pub struct StepFailure {
    pub workflow: Workflow,
    pub step: Step,
    /// Steps that succeeded before the failure, in order
    pub completed: Vec<Step>,
    #[source]
    pub error: DeployError,
}

impl StepFailure {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    pub fn last_completed(&self) -> Option<Step> {
        self.completed.last().copied()
    }
}

/// Service handles the pipeline drives
#[derive(Clone)]
pub struct Services {
    pub container: Arc<dyn ContainerEngine>,
    pub identity: Arc<dyn IdentityService>,
    pub registry: Arc<dyn RegistryService>,
    pub orchestration: Arc<dyn OrchestrationService>,
}

/// Local smoke test request
#[derive(Debug, Clone)]
pub struct SmokeTestRequest {
    pub build: BuildSpec,
    pub container_name: String,
    pub port: u16,
    pub env: Vec<(String, String)>,
    /// Check the started container answers over HTTP
    pub verify: Option<VerifyOptions>,
}

/// Local smoke test result
#[derive(Debug, Clone, Serialize)]
pub struct SmokeTestReport {
    pub image: String,
    pub container_id: String,
    pub url: String,
    pub http_status: Option<u16>,
    pub steps: Vec<Step>,
}

/// Build-and-publish request
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub build: BuildSpec,
    pub repository: String,
    pub tag: String,
    pub region: String,
}

/// Build-and-publish result
#[derive(Debug, Clone, Serialize)]
pub struct PublishReport {
    pub local_image: String,
    pub remote_reference: String,
    pub repository_created: bool,
    pub steps: Vec<Step>,
}

/// Provision request
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub stack_name: String,
    pub template: String,
    pub parameters: DeploymentParameters,
    pub capabilities: Vec<String>,
    pub region: String,
    /// Poll until the stack settles
    pub wait: Option<PollPolicy>,
    /// Cluster to resolve the endpoint in once the stack settled successfully
    pub cluster: Option<String>,
}

/// Provision result
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    pub submitted: SubmitOutcome,
    pub poll: Option<PollOutcome>,
    pub endpoint: Option<RunningInstance>,
    pub steps: Vec<Step>,
}

/// Tracks one workflow execution
struct WorkflowRun {
    workflow: Workflow,
    run_id: String,
    fsm: WorkflowFsm,
    started_at: DateTime<Utc>,
}

impl WorkflowRun {
    fn start(workflow: Workflow) -> Self {
        let run = Self {
            workflow,
            run_id: generate_run_id(),
            fsm: WorkflowFsm::new(),
            started_at: Utc::now(),
        };
        info!("[{}] Starting workflow {}", run.run_id, workflow);
        run
    }

    fn transition(&mut self, event: RunEvent) {
        if let Err(e) = self.fsm.process(event) {
            warn!("[{}] {}", self.run_id, e);
        }
    }

    /// Run one step, stopping the workflow on error
    async fn step<T, Fut>(&mut self, step: Step, fut: Fut) -> Result<T, StepFailure>
    where
        Fut: Future<Output = Result<T, DeployError>>,
    {
        self.transition(RunEvent::Begin(step));
        info!("[{}] {} -> {}", self.run_id, self.workflow, step);

        match fut.await {
            Ok(value) => {
                self.transition(RunEvent::StepSucceeded);
                Ok(value)
            }
            Err(error) => {
                self.transition(RunEvent::StepFailed(error.to_string()));
                error!(
                    "[{}] {} failed at {}: {}",
                    self.run_id, self.workflow, step, error
                );
                Err(StepFailure {
                    workflow: self.workflow,
                    step,
                    completed: self.fsm.completed().to_vec(),
                    error,
                })
            }
        }
    }

    fn finish(mut self) -> Vec<Step> {
        self.transition(RunEvent::Finish);
        let elapsed = Utc::now() - self.started_at;
        info!(
            "[{}] Workflow {} completed in {}s",
            self.run_id,
            self.workflow,
            elapsed.num_seconds()
        );
        self.fsm.completed().to_vec()
    }
}

/// The deployment pipeline
pub struct Pipeline {
    builder: ImageBuilder,
    publisher: RegistryPublisher,
    provisioner: StackProvisioner,
    runner: LocalRunner,
    resolver: EndpointResolver,
    orchestration: Arc<dyn OrchestrationService>,
}

impl Pipeline {
    pub fn new(services: Services, publisher_options: PublisherOptions) -> Self {
        Self {
            builder: ImageBuilder::new(services.container.clone()),
            publisher: RegistryPublisher::new(
                services.identity,
                services.registry,
                services.container.clone(),
                publisher_options,
            ),
            provisioner: StackProvisioner::new(services.orchestration.clone()),
            runner: LocalRunner::new(services.container),
            resolver: EndpointResolver::new(services.orchestration.clone()),
            orchestration: services.orchestration,
        }
    }

    pub fn builder(&self) -> &ImageBuilder {
        &self.builder
    }

    pub fn publisher(&self) -> &RegistryPublisher {
        &self.publisher
    }

    pub fn provisioner(&self) -> &StackProvisioner {
        &self.provisioner
    }

    pub fn runner(&self) -> &LocalRunner {
        &self.runner
    }

    pub fn resolver(&self) -> &EndpointResolver {
        &self.resolver
    }

    /// Build the image and run it locally
    pub async fn local_smoke_test(
        &self,
        request: &SmokeTestRequest,
    ) -> Result<SmokeTestReport, StepFailure> {
        let mut run = WorkflowRun::start(Workflow::LocalSmokeTest);

        let image = run
            .step(Step::Build, self.builder.build(&request.build))
            .await?;

        let local = run
            .step(
                Step::RunLocal,
                self.runner.run_local(
                    &image,
                    &request.container_name,
                    request.port,
                    &request.env,
                ),
            )
            .await?;

        let http_status = match &request.verify {
            Some(options) => Some(
                run.step(
                    Step::Verify,
                    verify_endpoint(&local.url, &request.container_name, options),
                )
                .await?,
            ),
            None => None,
        };

        Ok(SmokeTestReport {
            image,
            container_id: local.container_id,
            url: local.url,
            http_status,
            steps: run.finish(),
        })
    }

    /// Build the image and push it to the caller's registry
    pub async fn build_and_publish(
        &self,
        request: &PublishRequest,
    ) -> Result<PublishReport, StepFailure> {
        self.build_and_publish_with(request, tokio_sleep).await
    }

    /// [`Pipeline::build_and_publish`] with an injected sleep between push attempts
    pub async fn build_and_publish_with<S, F>(
        &self,
        request: &PublishRequest,
        sleep_fn: S,
    ) -> Result<PublishReport, StepFailure>
    where
        S: Fn(Duration) -> F,
        F: Future<Output = ()>,
    {
        let mut run = WorkflowRun::start(Workflow::BuildAndPublish);

        // The destination is checked before anything is built or resolved
        let local_image = run
            .step(Step::Build, async {
                validate_repository_name(&request.repository)?;
                validate_tag(&request.tag)?;
                self.builder.build(&request.build).await
            })
            .await?;

        let account = run
            .step(Step::ResolveIdentity, self.publisher.resolve_identity())
            .await?;

        let (target, created) = run
            .step(Step::EnsureRepository, async {
                let target = PublishTarget::new(
                    account.as_str(),
                    request.region.as_str(),
                    request.repository.as_str(),
                    request.tag.as_str(),
                )?;
                let created = self
                    .publisher
                    .ensure_repository(&target.repository_name, &target.region)
                    .await?;
                Ok::<_, DeployError>((target, created))
            })
            .await?;

        run.step(
            Step::Authenticate,
            self.publisher.authenticate(&account, &request.region),
        )
        .await?;

        let remote_reference = run
            .step(
                Step::Publish,
                self.publisher
                    .publish_with(&local_image, &target, sleep_fn),
            )
            .await?;

        Ok(PublishReport {
            local_image,
            remote_reference,
            repository_created: created == RepositoryCreation::Created,
            steps: run.finish(),
        })
    }

    /// Submit the stack and optionally follow it to a terminal state
    pub async fn provision(
        &self,
        request: &ProvisionRequest,
    ) -> Result<ProvisionReport, StepFailure> {
        self.provision_with(request, tokio_sleep).await
    }

    /// [`Pipeline::provision`] with an injected sleep between status checks
    pub async fn provision_with<S, F>(
        &self,
        request: &ProvisionRequest,
        sleep_fn: S,
    ) -> Result<ProvisionReport, StepFailure>
    where
        S: Fn(Duration) -> F,
        F: Future<Output = ()>,
    {
        let mut run = WorkflowRun::start(Workflow::Provision);

        let submitted = run
            .step(
                Step::Deploy,
                self.provisioner.deploy(
                    &request.stack_name,
                    &request.template,
                    &request.parameters,
                    &request.capabilities,
                    &request.region,
                ),
            )
            .await?;

        let Some(policy) = &request.wait else {
            if request.cluster.is_some() {
                warn!("Endpoint is only resolved after waiting for the stack");
            }
            return Ok(ProvisionReport {
                submitted,
                poll: None,
                endpoint: None,
                steps: run.finish(),
            });
        };

        let poll = run
            .step(Step::Poll, async {
                let outcome = wait_for_stack(
                    self.orchestration.as_ref(),
                    &request.stack_name,
                    &request.region,
                    policy,
                    sleep_fn,
                )
                .await?;
                match &outcome {
                    PollOutcome::Settled(state) if !state.is_success() => {
                        Err(DeployError::ProvisionFailed {
                            stack: request.stack_name.clone(),
                            state: state.to_string(),
                        })
                    }
                    _ => Ok(outcome),
                }
            })
            .await?;

        let endpoint = match (&poll, &request.cluster) {
            (PollOutcome::Settled(_), Some(cluster)) => Some(
                run.step(
                    Step::ResolveEndpoint,
                    self.resolver.resolve_public_endpoint(
                        cluster,
                        &request.stack_name,
                        &request.region,
                    ),
                )
                .await?,
            ),
            _ => None,
        };

        Ok(ProvisionReport {
            submitted,
            poll: Some(poll),
            endpoint,
            steps: run.finish(),
        })
    }
}
