//! Value objects built and owned by a single discovery or update call.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use bollard::models::{
    DeviceMapping, DeviceRequest, HostConfig, Mount, PortBinding, ResourcesBlkioWeightDevice,
    ResourcesUlimits, RestartPolicy, ThrottleDevice,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{FailureKind, FleetError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InstanceState {
    Running,
    Stopped,
    Other(String),
}

impl From<&str> for InstanceState {
    fn from(state: &str) -> Self {
        match state {
            "running" => InstanceState::Running,
            "exited" | "stopped" | "created" => InstanceState::Stopped,
            other => InstanceState::Other(other.to_string()),
        }
    }
}

impl From<String> for InstanceState {
    fn from(state: String) -> Self {
        InstanceState::from(state.as_str())
    }
}

impl From<InstanceState> for String {
    fn from(state: InstanceState) -> Self {
        match state {
            InstanceState::Running => "running".to_string(),
            InstanceState::Stopped => "stopped".to_string(),
            InstanceState::Other(other) => other,
        }
    }
}

/// One container as observed during discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    pub id: String,
    pub name: String,
    /// Image reference the container was started from, e.g. `nginx:latest`.
    pub image: String,
    /// Content ID of the image the container is actually running.
    pub image_id: String,
    pub current_digest: Option<String>,
    pub latest_digest: Option<String>,
    pub state: InstanceState,
    pub has_update: bool,
    pub labels: HashMap<String, String>,
}

impl InstanceSnapshot {
    pub fn is_running(&self) -> bool {
        self.state == InstanceState::Running
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    /// Members share a deployment-group label (compose project).
    Grouped,
    Standalone,
}

/// A compose project or a single container treated as its own unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedUnit {
    pub id: String,
    pub name: String,
    pub kind: UnitKind,
    pub instances: Vec<InstanceSnapshot>,
    pub working_dir: Option<PathBuf>,
    pub has_updates: bool,
    pub all_running: bool,
}

impl ManagedUnit {
    pub fn standalone(instance: InstanceSnapshot) -> Self {
        let mut unit = Self {
            id: instance.id.clone(),
            name: instance.name.clone(),
            kind: UnitKind::Standalone,
            instances: vec![instance],
            working_dir: None,
            has_updates: false,
            all_running: false,
        };
        unit.refresh();
        unit
    }

    pub fn grouped(project: impl Into<String>, working_dir: Option<PathBuf>) -> Self {
        let project = project.into();
        Self {
            id: project.clone(),
            name: project,
            kind: UnitKind::Grouped,
            instances: Vec::new(),
            working_dir,
            has_updates: false,
            all_running: false,
        }
    }

    /// Recompute the aggregate flags from the current members.
    pub fn refresh(&mut self) {
        self.has_updates = self.instances.iter().any(|i| i.has_update);
        self.all_running =
            !self.instances.is_empty() && self.instances.iter().all(InstanceSnapshot::is_running);
    }

    pub fn image_refs(&self) -> Vec<String> {
        self.instances.iter().map(|i| i.image.clone()).collect()
    }
}

/// Resource settings carried over verbatim from a container's host
/// configuration: CPU, memory, block IO, devices, GPUs and ulimits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub cpu_shares: Option<i64>,
    pub nano_cpus: Option<i64>,
    pub cpu_period: Option<i64>,
    pub cpu_quota: Option<i64>,
    pub cpu_realtime_period: Option<i64>,
    pub cpu_realtime_runtime: Option<i64>,
    pub cpuset_cpus: Option<String>,
    pub cpuset_mems: Option<String>,
    pub cpu_count: Option<i64>,
    pub cpu_percent: Option<i64>,
    pub memory: Option<i64>,
    pub memory_reservation: Option<i64>,
    pub memory_swap: Option<i64>,
    pub memory_swappiness: Option<i64>,
    pub oom_kill_disable: Option<bool>,
    pub pids_limit: Option<i64>,
    pub cgroup_parent: Option<String>,
    pub blkio_weight: Option<u16>,
    pub blkio_weight_device: Option<Vec<ResourcesBlkioWeightDevice>>,
    pub blkio_device_read_bps: Option<Vec<ThrottleDevice>>,
    pub blkio_device_write_bps: Option<Vec<ThrottleDevice>>,
    pub blkio_device_read_i_ops: Option<Vec<ThrottleDevice>>,
    pub blkio_device_write_i_ops: Option<Vec<ThrottleDevice>>,
    pub io_maximum_iops: Option<i64>,
    pub io_maximum_bandwidth: Option<i64>,
    pub devices: Option<Vec<DeviceMapping>>,
    pub device_cgroup_rules: Option<Vec<String>>,
    pub device_requests: Option<Vec<DeviceRequest>>,
    pub ulimits: Option<Vec<ResourcesUlimits>>,
    pub init: Option<bool>,
}

impl ResourceLimits {
    pub fn from_host_config(host: &HostConfig) -> Self {
        Self {
            cpu_shares: host.cpu_shares,
            nano_cpus: host.nano_cpus,
            cpu_period: host.cpu_period,
            cpu_quota: host.cpu_quota,
            cpu_realtime_period: host.cpu_realtime_period,
            cpu_realtime_runtime: host.cpu_realtime_runtime,
            cpuset_cpus: host.cpuset_cpus.clone(),
            cpuset_mems: host.cpuset_mems.clone(),
            cpu_count: host.cpu_count,
            cpu_percent: host.cpu_percent,
            memory: host.memory,
            memory_reservation: host.memory_reservation,
            memory_swap: host.memory_swap,
            memory_swappiness: host.memory_swappiness,
            oom_kill_disable: host.oom_kill_disable,
            pids_limit: host.pids_limit,
            cgroup_parent: host.cgroup_parent.clone(),
            blkio_weight: host.blkio_weight,
            blkio_weight_device: host.blkio_weight_device.clone(),
            blkio_device_read_bps: host.blkio_device_read_bps.clone(),
            blkio_device_write_bps: host.blkio_device_write_bps.clone(),
            blkio_device_read_i_ops: host.blkio_device_read_iops.clone(),
            blkio_device_write_i_ops: host.blkio_device_write_iops.clone(),
            io_maximum_iops: host.io_maximum_iops,
            io_maximum_bandwidth: host.io_maximum_bandwidth,
            devices: host.devices.clone(),
            device_cgroup_rules: host.device_cgroup_rules.clone(),
            device_requests: host.device_requests.clone(),
            ulimits: host.ulimits.clone(),
            init: host.init,
        }
    }

    pub fn apply_to(&self, host: &mut HostConfig) {
        host.cpu_shares = self.cpu_shares;
        host.nano_cpus = self.nano_cpus;
        host.cpu_period = self.cpu_period;
        host.cpu_quota = self.cpu_quota;
        host.cpu_realtime_period = self.cpu_realtime_period;
        host.cpu_realtime_runtime = self.cpu_realtime_runtime;
        host.cpuset_cpus = self.cpuset_cpus.clone();
        host.cpuset_mems = self.cpuset_mems.clone();
        host.cpu_count = self.cpu_count;
        host.cpu_percent = self.cpu_percent;
        host.memory = self.memory;
        host.memory_reservation = self.memory_reservation;
        host.memory_swap = self.memory_swap;
        host.memory_swappiness = self.memory_swappiness;
        host.oom_kill_disable = self.oom_kill_disable;
        host.pids_limit = self.pids_limit;
        host.cgroup_parent = self.cgroup_parent.clone();
        host.blkio_weight = self.blkio_weight;
        host.blkio_weight_device = self.blkio_weight_device.clone();
        host.blkio_device_read_bps = self.blkio_device_read_bps.clone();
        host.blkio_device_write_bps = self.blkio_device_write_bps.clone();
        host.blkio_device_read_iops = self.blkio_device_read_i_ops.clone();
        host.blkio_device_write_iops = self.blkio_device_write_i_ops.clone();
        host.io_maximum_iops = self.io_maximum_iops;
        host.io_maximum_bandwidth = self.io_maximum_bandwidth;
        host.devices = self.devices.clone();
        host.device_cgroup_rules = self.device_cgroup_rules.clone();
        host.device_requests = self.device_requests.clone();
        host.ulimits = self.ulimits.clone();
        host.init = self.init;
    }
}

/// Launch parameters sufficient to recreate a container from a newer image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationSnapshot {
    pub image: String,
    pub name: String,
    pub env: Option<Vec<String>>,
    pub cmd: Option<Vec<String>>,
    pub entrypoint: Option<Vec<String>>,
    pub port_bindings: HashMap<String, Option<Vec<PortBinding>>>,
    pub binds: Vec<String>,
    /// `--mount` style volumes, tmpfs and binds.
    pub mounts: Vec<Mount>,
    /// Sorted network names.
    pub networks: Vec<String>,
    pub network_mode: Option<String>,
    pub restart_policy: Option<RestartPolicy>,
    pub labels: Option<HashMap<String, String>>,
    pub resources: ResourceLimits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Check,
    Update,
    Start,
    Stop,
    Restart,
}

impl OperationKind {
    pub fn past_tense(&self) -> &'static str {
        match self {
            OperationKind::Check => "checked",
            OperationKind::Update => "updated",
            OperationKind::Start => "started",
            OperationKind::Stop => "stopped",
            OperationKind::Restart => "restarted",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Check => "check",
            OperationKind::Update => "update",
            OperationKind::Start => "start",
            OperationKind::Stop => "stop",
            OperationKind::Restart => "restart",
        };
        f.write_str(name)
    }
}

/// Result of a mutating action, handed back to the caller as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationOutcome {
    pub success: bool,
    pub message: String,
    /// User-facing failure text.
    pub error: Option<String>,
    /// Raw technical error chain.
    pub detail: Option<String>,
    pub kind: Option<FailureKind>,
    pub operation: OperationKind,
    pub target: String,
    pub timestamp: DateTime<Utc>,
}

impl OperationOutcome {
    pub fn succeeded(operation: OperationKind, target: impl Into<String>, message: String) -> Self {
        Self {
            success: true,
            message,
            error: None,
            detail: None,
            kind: None,
            operation,
            target: target.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn failed(operation: OperationKind, target: impl Into<String>, err: &FleetError) -> Self {
        let target = target.into();
        Self {
            success: false,
            message: format!("Failed to {operation} {target}"),
            error: Some(err.user_message()),
            detail: Some(err.to_string()),
            kind: Some(err.kind()),
            operation,
            target,
            timestamp: Utc::now(),
        }
    }
}
