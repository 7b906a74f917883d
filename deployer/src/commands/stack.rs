//! Stack commands

use std::path::{Path, PathBuf};

use colored::*;
use tracing::{info, warn};

use crate::commands::{CommandError, Context};
use crate::deploy::pipeline::ProvisionRequest;
use crate::deploy::poller::{PollOutcome, PollPolicy};
use crate::deploy::runner::format_temperature;
use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::models::parameters::{
    DeploymentParameters, MAX_TOKENS, MODEL_ID, REGION, STACK_NAME, TEMPERATURE,
};
use crate::models::stack::{DeleteOutcome, SubmitOutcome};
use crate::storage::settings::ModelSettings;

pub async fn deploy(
    context: &Context,
    stack_name: String,
    params: &Path,
    template: Option<PathBuf>,
    wait: bool,
    cluster: Option<String>,
) -> Result<(), CommandError> {
    let settings = &context.settings;
    let template_path = template.unwrap_or_else(|| settings.stack.template_path.clone());
    let template = read_template(&template_path).await?;
    let parameters = read_parameters(params, &settings.model).await?;
    check_stack_target(&parameters, &stack_name, &context.region)?;

    let request = ProvisionRequest {
        stack_name,
        template,
        parameters,
        capabilities: settings.stack.capabilities.clone(),
        region: context.region.clone(),
        wait: wait.then(|| PollPolicy {
            cooldown: settings.poll.cooldown(),
            max_attempts: settings.poll.max_attempts,
        }),
        cluster,
    };

    let report = context.pipeline().provision(&request).await?;
    let submitted = match report.submitted {
        SubmitOutcome::Created => "Create submitted",
        SubmitOutcome::Updated => "Update submitted",
        SubmitOutcome::Unchanged => "No changes",
    };
    println!(
        "{} for stack {} in {}",
        submitted.green().bold(),
        request.stack_name,
        request.region
    );

    match &report.poll {
        Some(PollOutcome::Settled(state)) => {
            println!("{} {}", "Settled".green().bold(), state);
        }
        Some(PollOutcome::StillInProgress { last, attempts }) => {
            println!(
                "{} {} after {} checks; run `deployctl status --stack {}` later",
                "Still".yellow().bold(),
                last,
                attempts,
                request.stack_name
            );
        }
        None => {}
    }

    if let Some(endpoint) = &report.endpoint {
        println!("{}", endpoint.public_address);
    }
    Ok(())
}

pub async fn status(context: &Context, stack_name: &str) -> Result<(), CommandError> {
    let state = context
        .pipeline()
        .provisioner()
        .status(stack_name, &context.region)
        .await?;
    println!("{}", state);
    Ok(())
}

pub async fn resolve_endpoint(
    context: &Context,
    cluster: &str,
    stack_name: &str,
) -> Result<(), CommandError> {
    let instance = context
        .pipeline()
        .resolver()
        .resolve_public_endpoint(cluster, stack_name, &context.region)
        .await?;
    info!(
        "Task {} via {}",
        instance.task_identifier, instance.network_interface_identifier
    );
    println!("{}", instance.public_address);
    Ok(())
}

pub async fn teardown(context: &Context, stack_name: &str) -> Result<(), CommandError> {
    let outcome = context
        .pipeline()
        .provisioner()
        .teardown(stack_name, &context.region)
        .await?;
    match outcome {
        DeleteOutcome::Submitted => {
            println!("{} for stack {}", "Delete submitted".green().bold(), stack_name)
        }
        DeleteOutcome::NotFound => println!(
            "{} stack {} does not exist in {}",
            "Skipped".yellow().bold(),
            stack_name,
            context.region
        ),
    }
    Ok(())
}

async fn read_template(path: &Path) -> Result<String, DeployError> {
    File::new(path).read_string().await.map_err(|e| {
        DeployError::Config(format!("unable to read template {}: {}", path.display(), e))
    })
}

/// Read a parameters file and fill in the model tunables it leaves out
pub async fn read_parameters(
    path: &Path,
    model: &ModelSettings,
) -> Result<DeploymentParameters, DeployError> {
    let mut parameters = File::new(path)
        .read_json::<DeploymentParameters>()
        .await
        .map_err(|e| {
            DeployError::Config(format!(
                "unable to read parameters {}: {}",
                path.display(),
                e
            ))
        })?;
    apply_model_defaults(&mut parameters, model);
    Ok(parameters)
}

/// The parameters file must describe the stack being submitted
fn check_stack_target(
    parameters: &DeploymentParameters,
    stack_name: &str,
    region: &str,
) -> Result<(), DeployError> {
    if let Some(named) = parameters.get(STACK_NAME).map(str::trim) {
        if !named.is_empty() && named != stack_name {
            return Err(DeployError::Validation(format!(
                "parameter {} is '{}' but the stack is '{}'",
                STACK_NAME, named, stack_name
            )));
        }
    }
    if let Some(named) = parameters.get(REGION).map(str::trim) {
        if !named.is_empty() && named != region {
            warn!(
                "Parameter {} is {} while the stack is submitted in {}",
                REGION, named, region
            );
        }
    }
    Ok(())
}

fn apply_model_defaults(parameters: &mut DeploymentParameters, model: &ModelSettings) {
    parameters.set_default(MODEL_ID, model.model_id.clone());
    parameters.set_default(MAX_TOKENS, model.max_tokens.to_string());
    parameters.set_default(TEMPERATURE, format_temperature(model.temperature));
}
