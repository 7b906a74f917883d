//! Local image and container commands

use colored::*;

use crate::commands::{CommandError, Context, ImageArgs};
use crate::deploy::pipeline::SmokeTestRequest;
use crate::deploy::runner::app_environment;
use crate::deploy::verify::VerifyOptions;
use crate::services::Removal;

pub async fn build_local(context: &Context, args: &ImageArgs) -> Result<(), CommandError> {
    let spec = context.build_spec(args);
    let image = context.pipeline().builder().build(&spec).await?;
    println!("{} {}", "Built".green().bold(), image);
    Ok(())
}

pub async fn run_local(
    context: &Context,
    args: &ImageArgs,
    port: Option<u16>,
    name: Option<String>,
    verify: bool,
) -> Result<(), CommandError> {
    let settings = &context.settings;
    let request = SmokeTestRequest {
        build: context.build_spec(args),
        container_name: name.unwrap_or_else(|| settings.container.name.clone()),
        port: port.unwrap_or(settings.container.port),
        env: app_environment(&context.region, &settings.model, &settings.catalog),
        verify: verify.then(VerifyOptions::default),
    };

    let report = context.pipeline().local_smoke_test(&request).await?;
    println!(
        "{} {} as {} ({})",
        "Running".green().bold(),
        report.image,
        request.container_name,
        short_id(&report.container_id)
    );
    if let Some(status) = report.http_status {
        println!("  {} HTTP {}", "verified".dimmed(), status);
    }
    println!("{}", report.url);
    Ok(())
}

pub async fn stop_local(context: &Context, name: Option<String>) -> Result<(), CommandError> {
    let name = name.unwrap_or_else(|| context.settings.container.name.clone());
    match context.pipeline().runner().stop_local(&name).await? {
        Removal::Removed => println!("{} {}", "Removed".green().bold(), name),
        Removal::NotFound => println!("{} {} was not running", "Skipped".yellow().bold(), name),
    }
    Ok(())
}

fn short_id(container_id: &str) -> &str {
    container_id.get(..12).unwrap_or(container_id)
}
