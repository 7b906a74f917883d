//! Registry publish command

use colored::*;

use crate::commands::{CommandError, Context, ImageArgs};
use crate::deploy::pipeline::PublishRequest;

pub async fn publish(
    context: &Context,
    args: &ImageArgs,
    repo: Option<String>,
) -> Result<(), CommandError> {
    let build = context.build_spec(args);
    let request = PublishRequest {
        repository: repo.unwrap_or_else(|| context.settings.repository_name().to_string()),
        tag: build.tag().to_string(),
        region: context.region.clone(),
        build,
    };

    let report = context.pipeline().build_and_publish(&request).await?;
    if report.repository_created {
        println!("{} {}", "Created repository".green(), request.repository);
    }
    println!(
        "{} {} -> {}",
        "Published".green().bold(),
        report.local_image,
        report.remote_reference
    );
    Ok(())
}
