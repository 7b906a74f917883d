//! Command line interface
//!
//! Defines the `deployctl` commands and routes each one to its handler.

mod local;
mod publish;
mod stack;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use colored::*;
use thiserror::Error;

use crate::deploy::pipeline::{Pipeline, Services, StepFailure};
use crate::deploy::publisher::PublisherOptions;
use crate::errors::{DeployError, ErrorKind};
use crate::logs::LogLevel;
use crate::models::image::BuildSpec;
use crate::services::aws::AwsCli;
use crate::services::container::ContainerCli;
use crate::storage::settings::{Settings, DEFAULT_SETTINGS_FILE};
use crate::utils::version_info;

#[derive(Parser, Debug)]
#[command(name = "deployctl", version)]
#[command(about = "Build, publish and provision a containerized application", long_about = None)]
pub struct Cli {
    /// Settings file
    #[arg(
        long,
        global = true,
        env = "DEPLOYCTL_CONFIG",
        default_value = DEFAULT_SETTINGS_FILE
    )]
    pub config: PathBuf,

    /// Target region, overrides the settings file
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Log level, overrides the settings file
    #[arg(long, global = true)]
    pub log_level: Option<LogLevel>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Image selection shared by the commands that build
#[derive(Args, Debug, Clone, Default)]
pub struct ImageArgs {
    /// Local image name
    #[arg(long)]
    pub image: Option<String>,

    /// Build context directory
    #[arg(long)]
    pub context: Option<PathBuf>,

    /// Image tag
    #[arg(long)]
    pub tag: Option<String>,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the application image locally
    BuildLocal {
        #[command(flatten)]
        image: ImageArgs,
    },
    /// Build the image and (re)start it as a local container
    RunLocal {
        #[command(flatten)]
        image: ImageArgs,

        /// Host port mapped onto the application port
        #[arg(long)]
        port: Option<u16>,

        /// Container name
        #[arg(long)]
        name: Option<String>,

        /// Wait until the container answers over HTTP
        #[arg(long)]
        verify: bool,
    },
    /// Stop and remove the local container
    StopLocal {
        /// Container name
        #[arg(long)]
        name: Option<String>,
    },
    /// Build the image and push it to the registry
    Publish {
        #[command(flatten)]
        image: ImageArgs,

        /// Registry repository name
        #[arg(long)]
        repo: Option<String>,
    },
    /// Create or update the application stack
    Deploy {
        /// Stack name
        #[arg(long)]
        stack: String,

        /// Parameters file (JSON map or ParameterKey/ParameterValue list)
        #[arg(long)]
        params: PathBuf,

        /// Template file, overrides the settings file
        #[arg(long)]
        template: Option<PathBuf>,

        /// Poll until the stack settles
        #[arg(long)]
        wait: bool,

        /// Cluster to resolve the public endpoint in after waiting
        #[arg(long)]
        cluster: Option<String>,
    },
    /// Show the current stack state
    Status {
        /// Stack name
        #[arg(long)]
        stack: String,
    },
    /// Resolve the public address of the running application
    ResolveEndpoint {
        /// Cluster name
        #[arg(long)]
        cluster: String,

        /// Stack name
        #[arg(long)]
        stack: String,
    },
    /// Delete the application stack
    Teardown {
        /// Stack name
        #[arg(long)]
        stack: String,
    },
    /// Print version information
    Version,
}

/// Error surfaced to the command line
#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    Workflow(#[from] StepFailure),

    #[error(transparent)]
    Deploy(#[from] DeployError),
}

impl CommandError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommandError::Workflow(failure) => failure.kind(),
            CommandError::Deploy(e) => e.kind(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.kind().exit_code()
    }

    /// Print the error to stderr, with the failing step for workflows
    pub fn report(&self) {
        match self {
            CommandError::Workflow(failure) => {
                eprintln!(
                    "{} {}",
                    format!("error[{}]:", failure.kind()).red().bold(),
                    failure.error
                );
                eprintln!("  {} {}", "workflow:".dimmed(), failure.workflow);
                eprintln!("  {} {}", "failed step:".dimmed(), failure.step);
                let last = failure
                    .last_completed()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "none".to_string());
                eprintln!("  {} {}", "last completed step:".dimmed(), last);
            }
            CommandError::Deploy(e) => {
                eprintln!("{} {}", format!("error[{}]:", e.kind()).red().bold(), e);
            }
        }
    }
}

/// Resolved settings for one invocation
pub struct Context {
    pub settings: Settings,
    pub region: String,
}

impl Context {
    /// Apply command line overrides on top of the settings file
    pub fn new(settings: Settings, region: Option<String>) -> Self {
        let region = region.unwrap_or_else(|| settings.region.clone());
        Self { settings, region }
    }

    /// Pipeline backed by the container and cloud CLIs
    pub fn pipeline(&self) -> Pipeline {
        let aws = Arc::new(AwsCli::new(self.settings.aws_profile.clone()));
        let services = Services {
            container: Arc::new(ContainerCli::new(self.settings.container.engine.clone())),
            identity: aws.clone(),
            registry: aws.clone(),
            orchestration: aws,
        };
        let options = PublisherOptions {
            push_attempts: self.settings.push_attempts,
            ..Default::default()
        };
        Pipeline::new(services, options)
    }

    /// Build spec from the settings file and command line overrides
    pub fn build_spec(&self, args: &ImageArgs) -> BuildSpec {
        let image = &self.settings.image;
        BuildSpec::new(
            args.image.clone().unwrap_or_else(|| image.name.clone()),
            args.context
                .clone()
                .unwrap_or_else(|| image.build_context.clone()),
            args.tag.clone().unwrap_or_else(|| image.tag.clone()),
        )
    }
}

/// Handle a CLI command
pub async fn handle_command(command: Commands, context: &Context) -> Result<(), CommandError> {
    match command {
        Commands::BuildLocal { image } => local::build_local(context, &image).await,
        Commands::RunLocal {
            image,
            port,
            name,
            verify,
        } => local::run_local(context, &image, port, name, verify).await,
        Commands::StopLocal { name } => local::stop_local(context, name).await,
        Commands::Publish { image, repo } => publish::publish(context, &image, repo).await,
        Commands::Deploy {
            stack,
            params,
            template,
            wait,
            cluster,
        } => stack::deploy(context, stack, &params, template, wait, cluster).await,
        Commands::Status { stack } => stack::status(context, &stack).await,
        Commands::ResolveEndpoint { cluster, stack } => {
            stack::resolve_endpoint(context, &cluster, &stack).await
        }
        Commands::Teardown { stack } => stack::teardown(context, &stack).await,
        Commands::Version => {
            let version = version_info();
            println!("{}", serde_json::to_string_pretty(&version).map_err(DeployError::from)?);
            Ok(())
        }
    }
}
