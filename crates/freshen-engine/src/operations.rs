//! Entry points used by callers: discovery, detection, and every mutating
//! action reported as an [`OperationOutcome`].

use std::sync::Arc;

use freshen_common::{
    FleetError, ManagedUnit, OperationKind, OperationOutcome, Precondition, Result, RuntimeClient,
    RuntimeError, UnitKind,
};
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{error, info, instrument, warn};

use crate::config::FleetConfig;
use crate::detection::{check_fleet, DetectionSummary};
use crate::grouped::update_grouped;
use crate::grouping::{discover_units, find_unit};
use crate::standalone::update_standalone;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Start,
    Stop,
    Restart,
}

impl LifecycleAction {
    pub fn operation(self) -> OperationKind {
        match self {
            LifecycleAction::Start => OperationKind::Start,
            LifecycleAction::Stop => OperationKind::Stop,
            LifecycleAction::Restart => OperationKind::Restart,
        }
    }
}

#[derive(Clone)]
pub struct Fleet {
    client: Arc<dyn RuntimeClient>,
    config: FleetConfig,
}

impl Fleet {
    pub fn new(client: Arc<dyn RuntimeClient>, config: FleetConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    pub async fn discover(&self) -> Result<Vec<ManagedUnit>> {
        discover_units(self.client.as_ref(), &self.config).await
    }

    /// Discovery plus one detection cycle, bounded by `check_timeout`.
    pub async fn check(&self) -> Result<(Vec<ManagedUnit>, DetectionSummary)> {
        check_fleet(self.client.as_ref(), &self.config).await
    }

    /// Updates the unit with identifier `id` (project name or container id),
    /// choosing the compose or recreate strategy from the unit kind.
    #[instrument(skip(self))]
    pub async fn update_unit(&self, id: &str) -> OperationOutcome {
        if id.trim().is_empty() {
            let err = FleetError::Precondition {
                target: String::new(),
                reason: Precondition::MissingIdentifier,
            };
            return failure(OperationKind::Update, "", err);
        }

        info!("Handling update request");
        let deadline = Instant::now() + self.config.update_timeout;
        let timed_out = || FleetError::Timeout {
            operation: OperationKind::Update,
            target: id.to_string(),
            after: self.config.update_timeout,
        };

        let units = match timeout_at(deadline, self.discover()).await {
            Ok(Ok(units)) => units,
            Ok(Err(e)) => return failure(OperationKind::Update, id, e),
            Err(_) => return failure(OperationKind::Update, id, timed_out()),
        };
        let Some(unit) = find_unit(&units, id) else {
            warn!("Container group not found");
            return failure(OperationKind::Update, id, FleetError::UnitNotFound(id.to_string()));
        };

        let client = self.client.as_ref();
        let result = match unit.kind {
            UnitKind::Grouped => {
                let images = unit.image_refs();
                timeout_at(
                    deadline,
                    update_grouped(
                        client,
                        &unit.name,
                        unit.working_dir.as_deref(),
                        &images,
                        &self.config,
                    ),
                )
                .await
            }
            UnitKind::Standalone => timeout_at(deadline, async {
                update_standalone(client, &unit.id).await.map(|_| ())
            })
            .await,
        };

        match result {
            Ok(Ok(())) => {
                info!(kind = ?unit.kind, "Update completed successfully");
                OperationOutcome::succeeded(
                    OperationKind::Update,
                    &unit.name,
                    format!("{} updated successfully", unit.name),
                )
            }
            Ok(Err(e)) => failure(OperationKind::Update, &unit.name, e),
            Err(_) => failure(
                OperationKind::Update,
                &unit.name,
                FleetError::Timeout {
                    operation: OperationKind::Update,
                    target: unit.name.clone(),
                    after: self.config.update_timeout,
                },
            ),
        }
    }

    pub async fn start(&self, id: &str) -> OperationOutcome {
        self.lifecycle(LifecycleAction::Start, id).await
    }

    pub async fn stop(&self, id: &str) -> OperationOutcome {
        self.lifecycle(LifecycleAction::Stop, id).await
    }

    pub async fn restart(&self, id: &str) -> OperationOutcome {
        self.lifecycle(LifecycleAction::Restart, id).await
    }

    #[instrument(skip(self))]
    pub async fn lifecycle(&self, action: LifecycleAction, id: &str) -> OperationOutcome {
        let operation = action.operation();
        if id.trim().is_empty() {
            let err = FleetError::Precondition {
                target: String::new(),
                reason: Precondition::MissingIdentifier,
            };
            return failure(operation, "", err);
        }

        info!("Handling lifecycle operation");
        let client = self.client.as_ref();
        let run = async {
            // Name lookup only improves messages; the action goes ahead without it.
            let name = match client.inspect_instance(id).await {
                Ok(inspected) => inspected
                    .name
                    .map(|n| n.trim_start_matches('/').to_string())
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| id.to_string()),
                Err(_) => id.to_string(),
            };
            let result: std::result::Result<(), RuntimeError> = match action {
                LifecycleAction::Start => client.start_instance(id).await,
                LifecycleAction::Stop => client.stop_instance(id).await,
                LifecycleAction::Restart => client.restart_instance(id).await,
            };
            (name, result)
        };

        match timeout(self.config.lifecycle_timeout, run).await {
            Ok((name, Ok(()))) => {
                info!(container = %name, "Lifecycle operation completed");
                OperationOutcome::succeeded(
                    operation,
                    &name,
                    format!("Container {name} {} successfully", operation.past_tense()),
                )
            }
            Ok((name, Err(source))) => failure(
                operation,
                &name,
                FleetError::Lifecycle {
                    operation,
                    target: name.clone(),
                    source,
                },
            ),
            Err(_) => failure(
                operation,
                id,
                FleetError::Timeout {
                    operation,
                    target: id.to_string(),
                    after: self.config.lifecycle_timeout,
                },
            ),
        }
    }
}

fn failure(operation: OperationKind, target: &str, err: FleetError) -> OperationOutcome {
    error!(
        %operation,
        container = %target,
        kind = ?err.kind(),
        user_message = %err.user_message(),
        details = %err,
        "Operation failed"
    );
    OperationOutcome::failed(operation, target, &err)
}
