//! Captures a container's launch parameters and turns them back into a
//! create request.

use std::collections::HashMap;

use bollard::container::{Config, NetworkingConfig};
use bollard::models::{ContainerInspectResponse, EndpointSettings, HostConfig};
use freshen_common::{ConfigurationSnapshot, FleetError, ResourceLimits, Result};

/// Builds a [`ConfigurationSnapshot`] from an inspection record.
///
/// Fails when either the container or host configuration is absent; no
/// partially populated snapshot is ever returned.
pub fn extract_configuration(inspect: &ContainerInspectResponse) -> Result<ConfigurationSnapshot> {
    let name = inspect
        .name
        .as_deref()
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_default();
    let target = if name.is_empty() {
        inspect.id.clone().unwrap_or_default()
    } else {
        name.clone()
    };

    let config = inspect
        .config
        .as_ref()
        .ok_or_else(|| FleetError::MissingConfiguration {
            target: target.clone(),
            section: "container",
        })?;
    let host_config = inspect
        .host_config
        .as_ref()
        .ok_or_else(|| FleetError::MissingConfiguration {
            target,
            section: "host",
        })?;

    let mut networks: Vec<String> = inspect
        .network_settings
        .as_ref()
        .and_then(|settings| settings.networks.as_ref())
        .map(|networks| networks.keys().cloned().collect())
        .unwrap_or_default();
    networks.sort();

    Ok(ConfigurationSnapshot {
        image: config.image.clone().unwrap_or_default(),
        name,
        env: config.env.clone(),
        cmd: config.cmd.clone(),
        entrypoint: config.entrypoint.clone(),
        port_bindings: host_config.port_bindings.clone().unwrap_or_default(),
        binds: host_config.binds.clone().unwrap_or_default(),
        mounts: host_config.mounts.clone().unwrap_or_default(),
        networks,
        network_mode: host_config.network_mode.clone(),
        restart_policy: host_config.restart_policy.clone(),
        labels: config.labels.clone(),
        resources: ResourceLimits::from_host_config(host_config),
    })
}

fn uses_endpoints(network_mode: Option<&str>) -> bool {
    match network_mode {
        Some("host") | Some("none") => false,
        Some(mode) => !mode.starts_with("container:"),
        None => true,
    }
}

/// Create request for a replacement container: same parameters, image
/// reference resolved again by the runtime at create time.
pub fn creation_config(snapshot: &ConfigurationSnapshot) -> Config<String> {
    let mut host_config = HostConfig {
        port_bindings: Some(snapshot.port_bindings.clone()),
        binds: Some(snapshot.binds.clone()),
        mounts: (!snapshot.mounts.is_empty()).then(|| snapshot.mounts.clone()),
        restart_policy: snapshot.restart_policy.clone(),
        network_mode: snapshot.network_mode.clone(),
        ..Default::default()
    };
    snapshot.resources.apply_to(&mut host_config);

    let exposed_ports: HashMap<String, HashMap<(), ()>> = snapshot
        .port_bindings
        .keys()
        .map(|port| (port.clone(), HashMap::new()))
        .collect();

    let networking_config = (!snapshot.networks.is_empty()
        && uses_endpoints(snapshot.network_mode.as_deref()))
    .then(|| NetworkingConfig {
        endpoints_config: snapshot
            .networks
            .iter()
            .map(|network| (network.clone(), EndpointSettings::default()))
            .collect(),
    });

    Config {
        image: Some(snapshot.image.clone()),
        env: snapshot.env.clone(),
        cmd: snapshot.cmd.clone(),
        entrypoint: snapshot.entrypoint.clone(),
        labels: snapshot.labels.clone(),
        exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
        host_config: Some(host_config),
        networking_config,
        ..Default::default()
    }
}
