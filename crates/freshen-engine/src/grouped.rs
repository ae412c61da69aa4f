//! Updates a compose project by pulling every member image and then
//! handing the whole project to the compose tool.

use std::path::Path;
use std::time::Instant;

use freshen_common::{FleetError, Precondition, Result, RuntimeClient};
use tracing::{debug, error, info, instrument};

use crate::config::FleetConfig;
use crate::detection::is_local_image;

#[instrument(skip(client, images, config), fields(operation = "update", image_count = images.len()))]
pub async fn update_grouped(
    client: &dyn RuntimeClient,
    project: &str,
    working_dir: Option<&Path>,
    images: &[String],
    config: &FleetConfig,
) -> Result<()> {
    let started = Instant::now();
    info!("Starting compose project update");

    let result = redeploy(client, project, working_dir, images, config).await;
    let duration_ms = started.elapsed().as_millis() as u64;
    match &result {
        Ok(()) => info!(duration_ms, "Compose project updated successfully"),
        Err(e) => error!(error = %e, kind = ?e.kind(), duration_ms, "Compose project update failed"),
    }
    result
}

async fn redeploy(
    client: &dyn RuntimeClient,
    project: &str,
    working_dir: Option<&Path>,
    images: &[String],
    config: &FleetConfig,
) -> Result<()> {
    let working_dir = working_dir
        .filter(|dir| !dir.as_os_str().is_empty())
        .ok_or_else(|| FleetError::Precondition {
            target: project.to_string(),
            reason: Precondition::MissingWorkingDir,
        })?;

    // All pulls finish before anything destructive runs. Images built by
    // the project are rebuilt by `up --build` instead.
    let mut pulled: Vec<&str> = Vec::with_capacity(images.len());
    for image in images {
        if pulled.contains(&image.as_str()) {
            continue;
        }
        if is_local_image(image) {
            debug!(%image, "Skipping pull for locally built image");
            continue;
        }
        debug!(%image, "Pulling image for compose project");
        client
            .pull_image(image)
            .await
            .map_err(|source| FleetError::Pull {
                target: project.to_string(),
                image: image.clone(),
                source,
            })?;
        pulled.push(image.as_str());
    }

    run_tool(client, project, working_dir, &config.compose_program, &config.compose_down_args).await?;
    run_tool(client, project, working_dir, &config.compose_program, &config.compose_up_args).await
}

async fn run_tool(
    client: &dyn RuntimeClient,
    project: &str,
    working_dir: &Path,
    program: &str,
    args: &[String],
) -> Result<()> {
    let command = std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ");
    debug!(%command, working_dir = %working_dir.display(), "Running compose command");

    let output = client
        .execute_command(working_dir, program, args)
        .await
        .map_err(|source| FleetError::ToolSpawn {
            target: project.to_string(),
            command: command.clone(),
            source,
        })?;

    if !output.success() {
        return Err(FleetError::ToolExec {
            target: project.to_string(),
            command,
            status: output.status,
            output: output.output,
        });
    }
    Ok(())
}
