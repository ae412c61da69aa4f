//! Recreates a single container on the latest image, keeping its
//! configuration.
//!
//! Steps run strictly in order: inspect, extract, pull, stop, remove,
//! create, start. The first failure returns immediately. Nothing is rolled
//! back: once the old container is removed, a failed create or start leaves
//! the unit without a running replacement, and a retry will hit a name
//! conflict if a replacement was created but not started.

use std::time::Instant;

use freshen_common::{FleetError, Result, RuntimeClient};
use tracing::{debug, error, info, instrument};

use crate::extract::{creation_config, extract_configuration};

/// Returns the identifier of the replacement container.
#[instrument(skip(client), fields(operation = "update"))]
pub async fn update_standalone(client: &dyn RuntimeClient, container_id: &str) -> Result<String> {
    let started = Instant::now();
    info!("Starting standalone container update");

    let result = recreate(client, container_id).await;
    let duration_ms = started.elapsed().as_millis() as u64;
    match &result {
        Ok(new_id) => info!(new_container_id = %new_id, duration_ms, "Standalone container updated successfully"),
        Err(e) => error!(error = %e, kind = ?e.kind(), duration_ms, "Standalone container update failed"),
    }
    result
}

async fn recreate(client: &dyn RuntimeClient, container_id: &str) -> Result<String> {
    let inspected = client
        .inspect_instance(container_id)
        .await
        .map_err(|source| FleetError::Inspect {
            target: container_id.to_string(),
            source,
        })?;

    let snapshot = extract_configuration(&inspected)?;
    let name = snapshot.name.clone();
    debug!(container = %name, image = %snapshot.image, "Extracted container parameters");

    debug!(container = %name, image = %snapshot.image, "Pulling latest image");
    client
        .pull_image(&snapshot.image)
        .await
        .map_err(|source| FleetError::Pull {
            target: name.clone(),
            image: snapshot.image.clone(),
            source,
        })?;

    debug!(container = %name, "Stopping old container");
    client
        .stop_instance(container_id)
        .await
        .map_err(|source| FleetError::Stop {
            target: name.clone(),
            source,
        })?;

    debug!(container = %name, "Removing old container");
    client
        .remove_instance(container_id)
        .await
        .map_err(|source| FleetError::Remove {
            target: name.clone(),
            source,
        })?;

    debug!(container = %name, image = %snapshot.image, "Creating new container");
    let new_id = client
        .create_instance(&name, creation_config(&snapshot))
        .await
        .map_err(|source| FleetError::Create {
            target: name.clone(),
            source,
        })?;

    debug!(container = %name, new_container_id = %new_id, "Starting new container");
    client
        .start_instance(&new_id)
        .await
        .map_err(|source| FleetError::Start {
            target: name.clone(),
            source,
        })?;

    Ok(new_id)
}
