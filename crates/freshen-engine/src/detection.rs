//! Update detection: pull each registry image once per cycle and compare
//! the running image's digest against the freshly pulled one.

use std::collections::HashMap;
use std::sync::Arc;

use freshen_common::{
    FleetError, InstanceSnapshot, ManagedUnit, OperationKind, Result, RuntimeClient,
};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::{Mutex, OnceCell};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, instrument, warn};

use crate::config::FleetConfig;
use crate::grouping::discover_units;

/// Heuristic for images that were built on this host and cannot be pulled.
///
/// Digest-only references, anything under `localhost`, and hyphenated or
/// underscored names without a registry or namespace segment (the shape
/// compose gives to `build:` services) count as local.
pub fn is_local_image(image: &str) -> bool {
    if image.starts_with("sha256:") {
        return true;
    }
    if image.starts_with("localhost/") || image.starts_with("localhost:") {
        return true;
    }

    if let Some((first, _)) = image.split_once('/') {
        if first.contains('.') || first.contains(':') {
            return false;
        }
    }

    let base = image.split(':').next().unwrap_or(image);
    !base.contains('/') && (base.contains('-') || base.contains('_'))
}

/// Image reference to latest digest, scoped to one detection cycle.
///
/// Each image gets a single cell so concurrent checks of containers that
/// share an image wait on one pull instead of issuing their own. A failed
/// pull or lookup is cached as `None` for the rest of the cycle.
#[derive(Default)]
pub struct DigestCache {
    entries: Mutex<HashMap<String, Arc<OnceCell<Option<String>>>>>,
}

impl DigestCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn latest_digest(&self, client: &dyn RuntimeClient, image: &str) -> Option<String> {
        let cell = {
            let mut entries = self.entries.lock().await;
            entries.entry(image.to_string()).or_default().clone()
        };
        cell.get_or_init(|| resolve_latest(client, image))
            .await
            .clone()
    }

    pub async fn unique_images(&self) -> usize {
        self.entries.lock().await.len()
    }
}

async fn resolve_latest(client: &dyn RuntimeClient, image: &str) -> Option<String> {
    if let Err(e) = client.pull_image(image).await {
        warn!(%image, error = %e, "Failed to pull image, skipping update check");
        return None;
    }
    match client.image_digest(image).await {
        Ok(digest) => Some(digest),
        Err(e) => {
            warn!(%image, error = %e, "Failed to get digest for image, skipping update check");
            None
        }
    }
}

async fn check_instance(client: &dyn RuntimeClient, cache: &DigestCache, instance: &mut InstanceSnapshot) {
    instance.has_update = false;

    if is_local_image(&instance.image) {
        debug!(container = %instance.name, image = %instance.image, "Skipping update check for local image");
        return;
    }

    let Some(latest) = cache.latest_digest(client, &instance.image).await else {
        return;
    };

    // The running image is looked up by content ID so the fresh pull of the
    // same tag does not mask it.
    let running_image = if instance.image_id.is_empty() {
        instance.image.as_str()
    } else {
        instance.image_id.as_str()
    };
    let current = match client.image_digest(running_image).await {
        Ok(digest) => digest,
        Err(e) => {
            warn!(
                container = %instance.name,
                image = %instance.image,
                error = %e,
                "Failed to get current digest for container, skipping update check"
            );
            return;
        }
    };

    instance.has_update = current != latest;
    instance.current_digest = Some(current);
    instance.latest_digest = Some(latest);
}

/// Returns `true` when the check finished before `deadline`.
async fn check_within(
    client: &dyn RuntimeClient,
    cache: &DigestCache,
    instance: &mut InstanceSnapshot,
    deadline: Instant,
) -> bool {
    if timeout_at(deadline, check_instance(client, cache, instance))
        .await
        .is_ok()
    {
        return true;
    }
    instance.has_update = false;
    warn!(
        container = %instance.name,
        image = %instance.image,
        "Update check did not finish in time, reporting no update"
    );
    false
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DetectionSummary {
    pub instances_checked: usize,
    pub instances_with_updates: usize,
    pub instances_timed_out: usize,
    pub units_with_updates: usize,
    pub unique_images: usize,
}

/// Runs one detection cycle over `units` bounded by the configured check
/// timeout.
pub async fn check_updates(
    client: &dyn RuntimeClient,
    units: &mut [ManagedUnit],
    config: &FleetConfig,
) -> DetectionSummary {
    let deadline = Instant::now() + config.check_timeout;
    check_updates_until(client, units, config, deadline).await
}

/// Annotates every instance and recomputes each unit's aggregate flags.
/// Image-level failures, and checks still pending at `deadline`, only clear
/// the affected instance's update flag.
#[instrument(skip_all, fields(units = units.len()))]
pub async fn check_updates_until(
    client: &dyn RuntimeClient,
    units: &mut [ManagedUnit],
    config: &FleetConfig,
    deadline: Instant,
) -> DetectionSummary {
    let started = Instant::now();
    let cache = DigestCache::new();

    let instances: Vec<&mut InstanceSnapshot> = units
        .iter_mut()
        .flat_map(|unit| unit.instances.iter_mut())
        .collect();
    let instances_checked = instances.len();
    debug!(containers = instances_checked, "Checking for updates");

    let checks = instances
        .into_iter()
        .map(|instance| check_within(client, &cache, instance, deadline));
    let finished: Vec<bool> = match config.detection_concurrency {
        Some(limit) => stream::iter(checks).buffer_unordered(limit).collect().await,
        None => futures::future::join_all(checks).await,
    };

    let mut summary = DetectionSummary {
        instances_checked,
        instances_timed_out: finished.iter().filter(|done| !**done).count(),
        unique_images: cache.unique_images().await,
        ..Default::default()
    };
    for unit in units.iter_mut() {
        unit.refresh();
        summary.instances_with_updates += unit.instances.iter().filter(|i| i.has_update).count();
        if unit.has_updates {
            summary.units_with_updates += 1;
        }
    }

    debug!(
        units_with_updates = summary.units_with_updates,
        containers_with_updates = summary.instances_with_updates,
        containers_timed_out = summary.instances_timed_out,
        unique_images = summary.unique_images,
        duration_ms = started.elapsed().as_millis() as u64,
        "Checked for updates"
    );
    summary
}

/// Discovery followed by a full detection cycle, both under one
/// `check_timeout` deadline. Discovery running past it is fatal.
pub async fn check_fleet(
    client: &dyn RuntimeClient,
    config: &FleetConfig,
) -> Result<(Vec<ManagedUnit>, DetectionSummary)> {
    let deadline = Instant::now() + config.check_timeout;
    let mut units = timeout_at(deadline, discover_units(client, config))
        .await
        .map_err(|_| FleetError::Timeout {
            operation: OperationKind::Check,
            target: "containers".to_string(),
            after: config.check_timeout,
        })??;
    let summary = check_updates_until(client, &mut units, config, deadline).await;
    Ok((units, summary))
}

pub async fn discover_and_check(
    client: &dyn RuntimeClient,
    config: &FleetConfig,
) -> Result<Vec<ManagedUnit>> {
    check_fleet(client, config).await.map(|(units, _)| units)
}
