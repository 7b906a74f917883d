//! Registry publisher

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::errors::DeployError;
use crate::models::image::{registry_endpoint, validate_repository_name, PublishTarget};
use crate::services::{ContainerEngine, IdentityService, RegistryService, RepositoryCreation};
use crate::utils::{calc_exp_backoff, tokio_sleep, CooldownOptions};

/// Username the registry expects alongside its short-lived password
pub const REGISTRY_USERNAME: &str = "AWS";

/// Publisher options
#[derive(Debug, Clone)]
pub struct PublisherOptions {
    /// Push attempts before giving up
    pub push_attempts: u32,

    /// Delay between push attempts
    pub push_cooldown: CooldownOptions,
}

impl Default for PublisherOptions {
    fn default() -> Self {
        Self {
            push_attempts: 3,
            push_cooldown: CooldownOptions::default(),
        }
    }
}

/// Publishes local images into the caller's registry
pub struct RegistryPublisher {
    identity: Arc<dyn IdentityService>,
    registry: Arc<dyn RegistryService>,
    engine: Arc<dyn ContainerEngine>,
    options: PublisherOptions,
}

impl RegistryPublisher {
    pub fn new(
        identity: Arc<dyn IdentityService>,
        registry: Arc<dyn RegistryService>,
        engine: Arc<dyn ContainerEngine>,
        options: PublisherOptions,
    ) -> Self {
        Self {
            identity,
            registry,
            engine,
            options,
        }
    }

    /// Account identifier of the current credentials
    pub async fn resolve_identity(&self) -> Result<String, DeployError> {
        let account = self.identity.caller_account().await?;
        let account = account.trim().to_string();
        if account.is_empty() {
            return Err(DeployError::Identity(
                "caller identity has no account".to_string(),
            ));
        }
        info!("Resolved caller account {}", account);
        Ok(account)
    }

    /// Make sure the repository exists, creating it when absent
    ///
    /// Safe to call on every deployment: an existing repository, or one created
    /// concurrently between the check and the create, is success.
    pub async fn ensure_repository(
        &self,
        name: &str,
        region: &str,
    ) -> Result<RepositoryCreation, DeployError> {
        validate_repository_name(name)?;

        if self.registry.repository_exists(name, region).await? {
            debug!("Repository {} already exists in {}", name, region);
            return Ok(RepositoryCreation::AlreadyExists);
        }

        let created = self.registry.create_repository(name, region).await?;
        match created {
            RepositoryCreation::Created => info!("Created repository {} in {}", name, region),
            RepositoryCreation::AlreadyExists => {
                warn!("Repository {} appeared while creating it", name)
            }
        }
        Ok(created)
    }

    /// Log the container tool into the account's registry, returning the endpoint
    pub async fn authenticate(&self, account: &str, region: &str) -> Result<String, DeployError> {
        let endpoint = registry_endpoint(account, region);
        let password = self.registry.login_password(region).await?;
        self.engine
            .login(&endpoint, REGISTRY_USERNAME, &password)
            .await?;
        info!("Authenticated with registry {}", endpoint);
        Ok(endpoint)
    }

    /// Tag the local image for the target and push it
    ///
    /// Pushes are retried: an interrupted push resumes at the layer level.
    pub async fn publish(
        &self,
        local_tag: &str,
        target: &PublishTarget,
    ) -> Result<String, DeployError> {
        self.publish_with(local_tag, target, tokio_sleep).await
    }

    /// [`RegistryPublisher::publish`] with an injected sleep between push attempts
    pub async fn publish_with<S, F>(
        &self,
        local_tag: &str,
        target: &PublishTarget,
        sleep_fn: S,
    ) -> Result<String, DeployError>
    where
        S: Fn(Duration) -> F,
        F: Future<Output = ()>,
    {
        let reference = target.remote_reference();
        self.engine.tag(local_tag, &reference).await?;
        debug!("Tagged {} as {}", local_tag, reference);

        let attempts = self.options.push_attempts.max(1);
        let mut attempt = 0;
        loop {
            match self.engine.push(&reference).await {
                Ok(()) => break,
                Err(e) if attempt + 1 < attempts => {
                    let delay = calc_exp_backoff(&self.options.push_cooldown, attempt);
                    warn!(
                        "Push of {} failed (attempt {}/{}), retrying in {:?}: {}",
                        reference,
                        attempt + 1,
                        attempts,
                        delay,
                        e
                    );
                    sleep_fn(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }

        info!("Published {}", reference);
        Ok(reference)
    }
}
