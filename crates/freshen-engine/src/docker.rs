//! `RuntimeClient` backed by the local Docker daemon.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    RemoveContainerOptions, RestartContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerInspectResponse, ContainerSummary};
use bollard::Docker;
use freshen_common::{CommandOutput, RuntimeClient, RuntimeError, RuntimeResult};
use futures::TryStreamExt;
use tokio::process::Command;
use tracing::{debug, error};

#[derive(Clone)]
pub struct DockerRuntime {
    docker_client: Arc<Docker>,
}

impl DockerRuntime {
    pub fn new(docker_client: Arc<Docker>) -> Self {
        Self { docker_client }
    }

    /// Connects using `DOCKER_HOST` or the platform's local socket.
    pub fn connect() -> RuntimeResult<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self::new(Arc::new(docker)))
    }

    pub async fn ping(&self) -> RuntimeResult<()> {
        self.docker_client.ping().await?;
        Ok(())
    }
}

/// Splits an image reference into the `fromImage`/`tag` pair the pull API
/// expects. An untagged reference means `latest`; digest references are
/// passed through whole.
pub(crate) fn split_reference(image: &str) -> (&str, &str) {
    if image.contains('@') {
        return (image, "");
    }
    let name_start = image.rfind('/').map(|i| i + 1).unwrap_or(0);
    match image[name_start..].rfind(':') {
        Some(i) => (&image[..name_start + i], &image[name_start + i + 1..]),
        None => (image, "latest"),
    }
}

fn log_failure(call: &str, subject: &str, started: Instant, err: &RuntimeError) {
    error!(
        call,
        subject,
        error = %err,
        duration_ms = started.elapsed().as_millis() as u64,
        "Docker call failed"
    );
}

#[async_trait]
impl RuntimeClient for DockerRuntime {
    async fn list_instances(&self) -> RuntimeResult<Vec<ContainerSummary>> {
        let started = Instant::now();
        let options = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };
        let containers = self
            .docker_client
            .list_containers(Some(options))
            .await
            .map_err(RuntimeError::from)
            .inspect_err(|e| log_failure("list_containers", "*", started, e))?;
        debug!(
            count = containers.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Listed containers"
        );
        Ok(containers)
    }

    async fn inspect_instance(&self, id: &str) -> RuntimeResult<ContainerInspectResponse> {
        let started = Instant::now();
        let inspected = self
            .docker_client
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(RuntimeError::from)
            .inspect_err(|e| log_failure("inspect_container", id, started, e))?;
        debug!(
            container_id = %id,
            duration_ms = started.elapsed().as_millis() as u64,
            "Inspected container"
        );
        Ok(inspected)
    }

    async fn pull_image(&self, image: &str) -> RuntimeResult<()> {
        let started = Instant::now();
        let (from_image, tag) = split_reference(image);
        let options = CreateImageOptions {
            from_image,
            tag,
            ..Default::default()
        };
        // The pull only completes once the progress stream is drained.
        self.docker_client
            .create_image(Some(options), None, None)
            .try_for_each(|_| async { Ok(()) })
            .await
            .map_err(RuntimeError::from)
            .inspect_err(|e| log_failure("create_image", image, started, e))?;
        debug!(
            %image,
            duration_ms = started.elapsed().as_millis() as u64,
            "Pulled image"
        );
        Ok(())
    }

    async fn image_digest(&self, image: &str) -> RuntimeResult<String> {
        let started = Instant::now();
        let inspected = self
            .docker_client
            .inspect_image(image)
            .await
            .map_err(RuntimeError::from)
            .inspect_err(|e| log_failure("inspect_image", image, started, e))?;
        let digest = inspected
            .repo_digests
            .and_then(|digests| digests.into_iter().next())
            .or(inspected.id)
            .ok_or_else(|| RuntimeError::Api(format!("image {image} has no digest or id")))?;
        debug!(
            %image,
            %digest,
            duration_ms = started.elapsed().as_millis() as u64,
            "Resolved image digest"
        );
        Ok(digest)
    }

    async fn start_instance(&self, id: &str) -> RuntimeResult<()> {
        let started = Instant::now();
        self.docker_client
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(RuntimeError::from)
            .inspect_err(|e| log_failure("start_container", id, started, e))?;
        debug!(container_id = %id, "Started container");
        Ok(())
    }

    async fn stop_instance(&self, id: &str) -> RuntimeResult<()> {
        let started = Instant::now();
        self.docker_client
            .stop_container(id, None::<StopContainerOptions>)
            .await
            .map_err(RuntimeError::from)
            .inspect_err(|e| log_failure("stop_container", id, started, e))?;
        debug!(container_id = %id, "Stopped container");
        Ok(())
    }

    async fn restart_instance(&self, id: &str) -> RuntimeResult<()> {
        let started = Instant::now();
        self.docker_client
            .restart_container(id, None::<RestartContainerOptions>)
            .await
            .map_err(RuntimeError::from)
            .inspect_err(|e| log_failure("restart_container", id, started, e))?;
        debug!(container_id = %id, "Restarted container");
        Ok(())
    }

    async fn remove_instance(&self, id: &str) -> RuntimeResult<()> {
        let started = Instant::now();
        let remove_opts = Some(RemoveContainerOptions {
            force: true,
            ..Default::default()
        });
        self.docker_client
            .remove_container(id, remove_opts)
            .await
            .map_err(RuntimeError::from)
            .inspect_err(|e| log_failure("remove_container", id, started, e))?;
        debug!(container_id = %id, "Removed container");
        Ok(())
    }

    async fn create_instance(&self, name: &str, config: Config<String>) -> RuntimeResult<String> {
        let started = Instant::now();
        let create_options = Some(CreateContainerOptions {
            name: name.to_string(),
            ..Default::default()
        });
        let created = self
            .docker_client
            .create_container(create_options, config)
            .await
            .map_err(RuntimeError::from)
            .inspect_err(|e| log_failure("create_container", name, started, e))?;
        for warning in &created.warnings {
            debug!(%name, %warning, "Docker warning on create");
        }
        debug!(%name, container_id = %created.id, "Created container");
        Ok(created.id)
    }

    async fn execute_command(
        &self,
        working_dir: &Path,
        program: &str,
        args: &[String],
    ) -> RuntimeResult<CommandOutput> {
        run_command(working_dir, program, args).await
    }
}

/// Runs `program` in `working_dir`, returning its exit status and combined
/// stdout/stderr. The child is killed if the future is dropped.
pub(crate) async fn run_command(
    working_dir: &Path,
    program: &str,
    args: &[String],
) -> RuntimeResult<CommandOutput> {
    let started = Instant::now();
    let output = Command::new(program)
        .args(args)
        .current_dir(working_dir)
        .kill_on_drop(true)
        .output()
        .await?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    debug!(
        %program,
        working_dir = %working_dir.display(),
        status = ?output.status.code(),
        duration_ms = started.elapsed().as_millis() as u64,
        "External command finished"
    );
    Ok(CommandOutput {
        status: output.status.code(),
        output: combined,
    })
}
