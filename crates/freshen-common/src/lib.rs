// Re-export dependencies used in public interfaces of common types

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
pub use bollard;
use bollard::container::Config;
use bollard::models::{ContainerInspectResponse, ContainerSummary};
pub use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod model;

pub use model::{
    ConfigurationSnapshot, InstanceSnapshot, InstanceState, ManagedUnit, OperationKind,
    OperationOutcome, ResourceLimits, UnitKind,
};

/// Failure reported by the container runtime capability surface.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("No such object: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not modified: {0}")]
    NotModified(String),

    #[error("Docker API error: {0}")]
    Api(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<bollard::errors::Error> for RuntimeError {
    fn from(err: bollard::errors::Error) -> Self {
        match err {
            bollard::errors::Error::DockerResponseServerError {
                status_code,
                message,
            } => match status_code {
                304 => RuntimeError::NotModified(message),
                404 => RuntimeError::NotFound(message),
                409 => RuntimeError::Conflict(message),
                _ => RuntimeError::Api(format!("{message} (status {status_code})")),
            },
            other => RuntimeError::Api(other.to_string()),
        }
    }
}

pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

/// Closed set of failure tags. Every [`FleetError`] maps onto exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Enumerate,
    Inspect,
    MissingConfiguration,
    Pull,
    Stop,
    Remove,
    Create,
    Start,
    ToolExec,
    Precondition,
    NotFound,
    Lifecycle,
    Timeout,
}

/// Preconditions checked before any runtime I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    MissingIdentifier,
    MissingWorkingDir,
}

impl std::fmt::Display for Precondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Precondition::MissingIdentifier => write!(f, "container identifier is required"),
            Precondition::MissingWorkingDir => {
                write!(f, "working directory is required for compose project")
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("failed to list containers: {0}")]
    Enumerate(#[source] RuntimeError),

    #[error("failed to inspect container {target}: {source}")]
    Inspect {
        target: String,
        #[source]
        source: RuntimeError,
    },

    #[error("container {target} has no {section} configuration")]
    MissingConfiguration {
        target: String,
        section: &'static str,
    },

    #[error("failed to pull image {image} for {target}: {source}")]
    Pull {
        target: String,
        image: String,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to stop container {target}: {source}")]
    Stop {
        target: String,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to remove container {target}: {source}")]
    Remove {
        target: String,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to create new container {target}: {source}")]
    Create {
        target: String,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to start new container {target}: {source}")]
    Start {
        target: String,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to run `{command}` for project {target}: {source}")]
    ToolSpawn {
        target: String,
        command: String,
        #[source]
        source: RuntimeError,
    },

    #[error("`{command}` failed for project {target} (exit status {status:?})\nOutput: {output}")]
    ToolExec {
        target: String,
        command: String,
        status: Option<i32>,
        output: String,
    },

    #[error("{reason} ({target})")]
    Precondition {
        target: String,
        reason: Precondition,
    },

    #[error("container group {0} not found")]
    UnitNotFound(String),

    #[error("failed to {operation} container {target}: {source}")]
    Lifecycle {
        operation: OperationKind,
        target: String,
        #[source]
        source: RuntimeError,
    },

    #[error("{operation} of {target} timed out after {}s", .after.as_secs())]
    Timeout {
        operation: OperationKind,
        target: String,
        after: Duration,
    },
}

impl FleetError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FleetError::Enumerate(_) => FailureKind::Enumerate,
            FleetError::Inspect { .. } => FailureKind::Inspect,
            FleetError::MissingConfiguration { .. } => FailureKind::MissingConfiguration,
            FleetError::Pull { .. } => FailureKind::Pull,
            FleetError::Stop { .. } => FailureKind::Stop,
            FleetError::Remove { .. } => FailureKind::Remove,
            FleetError::Create { .. } => FailureKind::Create,
            FleetError::Start { .. } => FailureKind::Start,
            FleetError::ToolSpawn { .. } | FleetError::ToolExec { .. } => FailureKind::ToolExec,
            FleetError::Precondition { .. } => FailureKind::Precondition,
            FleetError::UnitNotFound(_) => FailureKind::NotFound,
            FleetError::Lifecycle { .. } => FailureKind::Lifecycle,
            FleetError::Timeout { .. } => FailureKind::Timeout,
        }
    }

    /// Friendly text for the caller, derived from the failure tag and, where
    /// it sharpens the message, from the runtime error variant.
    pub fn user_message(&self) -> String {
        let text = match self {
            FleetError::Enumerate(_) => "Failed to load container information.",
            FleetError::Inspect {
                source: RuntimeError::NotFound(_),
                ..
            }
            | FleetError::Stop {
                source: RuntimeError::NotFound(_),
                ..
            }
            | FleetError::Remove {
                source: RuntimeError::NotFound(_),
                ..
            }
            | FleetError::Lifecycle {
                source: RuntimeError::NotFound(_),
                ..
            } => "Container not found. It may have been removed.",
            FleetError::Inspect { .. } => "Failed to read the container configuration.",
            FleetError::MissingConfiguration { .. } => {
                "Container configuration is incomplete. It cannot be recreated."
            }
            FleetError::Pull {
                source: RuntimeError::NotFound(_),
                ..
            } => "Image not found. The image may not exist or has been removed.",
            FleetError::Pull { .. } => {
                "Failed to pull image. Check your internet connection and image name."
            }
            FleetError::Stop { .. } => "Failed to stop the running container.",
            FleetError::Remove { .. } => "Failed to remove the old container.",
            FleetError::Create {
                source: RuntimeError::Conflict(_),
                ..
            } => "Container name conflict. A container with this name already exists.",
            FleetError::Create {
                source: RuntimeError::NotFound(_),
                ..
            } => "Image or network not found. The replacement container could not be created.",
            FleetError::Create { .. } => "Failed to create the replacement container.",
            FleetError::Start { .. } => {
                "The replacement container was created but failed to start."
            }
            FleetError::ToolSpawn { .. } | FleetError::ToolExec { .. } => {
                "Docker Compose command failed. Check the compose file and project configuration."
            }
            FleetError::Precondition {
                reason: Precondition::MissingIdentifier,
                ..
            } => "Container ID required.",
            FleetError::Precondition {
                reason: Precondition::MissingWorkingDir,
                ..
            } => {
                "Working directory not found. The compose project directory may have been moved or deleted."
            }
            FleetError::UnitNotFound(_) => "Container not found.",
            FleetError::Lifecycle {
                operation,
                source: RuntimeError::NotModified(_),
                ..
            } => {
                return match operation {
                    OperationKind::Start => "Container is already running.".to_string(),
                    OperationKind::Stop => "Container is already stopped.".to_string(),
                    _ => "Container state did not change.".to_string(),
                };
            }
            FleetError::Lifecycle {
                source: RuntimeError::Conflict(_),
                ..
            } => "Operation already in progress. Please wait.",
            FleetError::Lifecycle { .. } => "Container lifecycle operation failed.",
            FleetError::Timeout {
                operation: OperationKind::Check,
                ..
            } => "Update check timed out. The Docker daemon may be unresponsive.",
            FleetError::Timeout { .. } => "Operation timed out. The container may be unresponsive.",
        };
        text.to_string()
    }
}

pub type Result<T> = std::result::Result<T, FleetError>;

/// Exit status and combined stdout/stderr of an external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: Option<i32>,
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Capability surface over the container runtime.
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// All containers, running and stopped.
    async fn list_instances(&self) -> RuntimeResult<Vec<ContainerSummary>>;

    async fn inspect_instance(&self, id: &str) -> RuntimeResult<ContainerInspectResponse>;

    async fn pull_image(&self, image: &str) -> RuntimeResult<()>;

    /// First repository digest of the image, or its content ID when none is recorded.
    async fn image_digest(&self, image: &str) -> RuntimeResult<String>;

    async fn start_instance(&self, id: &str) -> RuntimeResult<()>;

    async fn stop_instance(&self, id: &str) -> RuntimeResult<()>;

    async fn restart_instance(&self, id: &str) -> RuntimeResult<()>;

    async fn remove_instance(&self, id: &str) -> RuntimeResult<()>;

    /// Returns the new container's identifier.
    async fn create_instance(&self, name: &str, config: Config<String>) -> RuntimeResult<String>;

    async fn execute_command(
        &self,
        working_dir: &Path,
        program: &str,
        args: &[String],
    ) -> RuntimeResult<CommandOutput>;
}
