//! Error types for the deployment pipeline

use thiserror::Error;

/// Main error type for the deployment pipeline
///
/// Every variant maps onto exactly one [`ErrorKind`]. Remote failures carry the
/// target (image, repository, stack, cluster) and region so a step can be
/// retried by hand.
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Build failed for {image}: {message}")]
    Build { image: String, message: String },

    #[error("Unable to resolve caller identity: {0}")]
    Identity(String),

    #[error("Registry authentication failed for {endpoint}: {message}")]
    Auth { endpoint: String, message: String },

    #[error("Publish failed for {reference}: {message}")]
    Publish { reference: String, message: String },

    #[error("Provision request rejected for stack {stack} in {region}: {message}")]
    ProvisionRequest {
        stack: String,
        region: String,
        message: String,
    },

    #[error("Stack {stack} settled in {state}")]
    ProvisionFailed { stack: String, state: String },

    #[error("Run failed for container {container}: {message}")]
    Run { container: String, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unable to resolve endpoint: {0}")]
    Resolution(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Error classification surfaced to callers and mapped to exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BuildError,
    IdentityError,
    AuthError,
    PublishError,
    ProvisionRequestError,
    ProvisionFailed,
    RunError,
    NotFoundError,
    ResolutionError,
    ValidationError,
    ConfigError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BuildError => "BuildError",
            ErrorKind::IdentityError => "IdentityError",
            ErrorKind::AuthError => "AuthError",
            ErrorKind::PublishError => "PublishError",
            ErrorKind::ProvisionRequestError => "ProvisionRequestError",
            ErrorKind::ProvisionFailed => "ProvisionFailed",
            ErrorKind::RunError => "RunError",
            ErrorKind::NotFoundError => "NotFoundError",
            ErrorKind::ResolutionError => "ResolutionError",
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::ConfigError => "ConfigError",
        }
    }

    /// Process exit code for a failure of this kind
    pub fn exit_code(&self) -> u8 {
        match self {
            ErrorKind::ConfigError => 2,
            ErrorKind::ValidationError => 3,
            ErrorKind::BuildError => 10,
            ErrorKind::IdentityError => 11,
            ErrorKind::AuthError => 12,
            ErrorKind::PublishError => 13,
            ErrorKind::ProvisionRequestError => 20,
            ErrorKind::ProvisionFailed => 21,
            ErrorKind::RunError => 30,
            ErrorKind::NotFoundError => 40,
            ErrorKind::ResolutionError => 41,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DeployError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeployError::Io(_) | DeployError::Json(_) | DeployError::Config(_) => {
                ErrorKind::ConfigError
            }
            DeployError::Build { .. } => ErrorKind::BuildError,
            DeployError::Identity(_) => ErrorKind::IdentityError,
            DeployError::Auth { .. } => ErrorKind::AuthError,
            DeployError::Publish { .. } => ErrorKind::PublishError,
            DeployError::ProvisionRequest { .. } => ErrorKind::ProvisionRequestError,
            DeployError::ProvisionFailed { .. } => ErrorKind::ProvisionFailed,
            DeployError::Run { .. } => ErrorKind::RunError,
            DeployError::NotFound(_) => ErrorKind::NotFoundError,
            DeployError::Resolution(_) => ErrorKind::ResolutionError,
            DeployError::Validation(_) => ErrorKind::ValidationError,
        }
    }
}
