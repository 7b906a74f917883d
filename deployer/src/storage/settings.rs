//! Settings file management

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::filesys::file::File;
use crate::errors::DeployError;
use crate::logs::LogLevel;
use crate::utils::CooldownOptions;

pub const DEFAULT_SETTINGS_FILE: &str = "deployctl.json";
pub const DEFAULT_MODEL_ID: &str = "anthropic.claude-3-sonnet-20240229-v1:0";
pub const DEFAULT_MAX_TOKENS: u32 = 4000;
pub const DEFAULT_TEMPERATURE: f64 = 1.0;
const MAX_POLL_DELAY_SECS: u64 = 3600;

/// Pipeline settings
///
/// Every component receives its configuration from here; nothing is read
/// from the process environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Target region for registry and stack operations
    #[serde(default = "default_region")]
    pub region: String,

    /// Named credentials profile handed to the cloud CLI
    #[serde(default)]
    pub aws_profile: Option<String>,

    /// Image build configuration
    #[serde(default)]
    pub image: ImageSettings,

    /// Registry repository, defaults to the image name
    #[serde(default)]
    pub repository: Option<String>,

    /// Local container configuration
    #[serde(default)]
    pub container: ContainerSettings,

    /// Model tunables handed to the application
    #[serde(default)]
    pub model: ModelSettings,

    /// Query catalog handed to the application
    #[serde(default)]
    pub catalog: CatalogSettings,

    /// Stack template configuration
    #[serde(default)]
    pub stack: StackSettings,

    /// Stack status polling policy
    #[serde(default)]
    pub poll: PollSettings,

    /// Attempts for an image push before giving up
    #[serde(default = "default_push_attempts")]
    pub push_attempts: u32,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_push_attempts() -> u32 {
    3
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            region: default_region(),
            aws_profile: None,
            image: ImageSettings::default(),
            repository: None,
            container: ContainerSettings::default(),
            model: ModelSettings::default(),
            catalog: CatalogSettings::default(),
            stack: StackSettings::default(),
            poll: PollSettings::default(),
            push_attempts: default_push_attempts(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file
    ///
    /// A missing file yields the defaults; a malformed one is an error.
    pub async fn load(file: &File) -> Result<Self, DeployError> {
        if !file.exists().await {
            return Ok(Self::default());
        }
        let settings = file.read_json::<Settings>().await.map_err(|e| {
            DeployError::Config(format!(
                "unable to read settings {}: {}",
                file.path().display(),
                e
            ))
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), DeployError> {
        let invalid = |message: &str| Err(DeployError::Config(message.to_string()));

        let poll = &self.poll;
        if !poll.multiplier.is_finite() || poll.multiplier < 1.0 {
            return invalid("poll.multiplier must be a finite number of at least 1.0");
        }
        if poll.max_attempts == 0 {
            return invalid("poll.max_attempts must be at least 1");
        }
        if poll.base_delay_secs > poll.max_delay_secs {
            return invalid("poll.base_delay_secs must not exceed poll.max_delay_secs");
        }
        if poll.max_delay_secs > MAX_POLL_DELAY_SECS {
            return invalid("poll.max_delay_secs must not exceed one hour");
        }
        if self.push_attempts == 0 {
            return invalid("push_attempts must be at least 1");
        }
        Ok(())
    }

    /// Repository name used for publishing
    pub fn repository_name(&self) -> &str {
        self.repository.as_deref().unwrap_or(&self.image.name)
    }
}

/// Image build settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSettings {
    /// Local image name
    #[serde(default = "default_image_name")]
    pub name: String,

    /// Build context directory
    #[serde(default = "default_build_context")]
    pub build_context: PathBuf,

    /// Image tag
    #[serde(default = "default_tag")]
    pub tag: String,
}

fn default_image_name() -> String {
    "app".to_string()
}

fn default_build_context() -> PathBuf {
    PathBuf::from(".")
}

fn default_tag() -> String {
    "latest".to_string()
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            name: default_image_name(),
            build_context: default_build_context(),
            tag: default_tag(),
        }
    }
}

/// Local container settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSettings {
    /// Docker-compatible CLI used for builds, pushes and local runs
    #[serde(default = "default_engine")]
    pub engine: String,

    /// Container name, reused across runs
    #[serde(default = "default_container_name")]
    pub name: String,

    /// Host port mapped onto the application port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_engine() -> String {
    "docker".to_string()
}

fn default_container_name() -> String {
    "app-local".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            name: default_container_name(),
            port: default_port(),
        }
    }
}

/// Model tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default = "default_model_id")]
    pub model_id: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

fn default_model_id() -> String {
    DEFAULT_MODEL_ID.to_string()
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

/// Query catalog used by the application
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSettings {
    #[serde(default)]
    pub database_name: Option<String>,

    #[serde(default)]
    pub table_name: Option<String>,

    /// Bucket receiving query results
    #[serde(default)]
    pub results_bucket: Option<String>,
}

/// Stack template settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackSettings {
    /// Template file path
    #[serde(default = "default_template_path")]
    pub template_path: PathBuf,

    /// Capabilities acknowledged on every request
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<String>,
}

fn default_template_path() -> PathBuf {
    PathBuf::from("template.yaml")
}

fn default_capabilities() -> Vec<String> {
    vec!["CAPABILITY_NAMED_IAM".to_string()]
}

impl Default for StackSettings {
    fn default() -> Self {
        Self {
            template_path: default_template_path(),
            capabilities: default_capabilities(),
        }
    }
}

/// Stack polling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSettings {
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,

    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_base_delay_secs() -> u64 {
    5
}

fn default_max_delay_secs() -> u64 {
    60
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_attempts() -> u32 {
    40
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            multiplier: default_multiplier(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl PollSettings {
    pub fn cooldown(&self) -> CooldownOptions {
        CooldownOptions {
            base_delay: Duration::from_secs(self.base_delay_secs),
            max_delay: Duration::from_secs(self.max_delay_secs),
            multiplier: self.multiplier,
        }
    }
}
