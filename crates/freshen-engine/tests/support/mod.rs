//! Recording runtime used by the engine's integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::Config;
use bollard::models::{
    ContainerConfig, ContainerInspectResponse, ContainerSummary, EndpointSettings, HostConfig,
    NetworkSettings, PortBinding,
};
use freshen_common::{CommandOutput, RuntimeClient, RuntimeError, RuntimeResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    List,
    Inspect(String),
    Pull(String),
    Digest(String),
    Start(String),
    Stop(String),
    Restart(String),
    Remove(String),
    Create { name: String, config: Config<String> },
    Exec { dir: PathBuf, program: String, args: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailWith {
    Api,
    NotFound,
    Conflict,
    NotModified,
}

impl FailWith {
    fn error(self, what: &str) -> RuntimeError {
        match self {
            FailWith::Api => RuntimeError::Api(format!("mock failure: {what}")),
            FailWith::NotFound => RuntimeError::NotFound(what.to_string()),
            FailWith::Conflict => RuntimeError::Conflict(what.to_string()),
            FailWith::NotModified => RuntimeError::NotModified(what.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    List,
    Inspect,
    Pull,
    Digest,
    Start,
    Stop,
    Restart,
    Remove,
    Create,
}

#[derive(Default)]
pub struct MockRuntime {
    containers: Vec<ContainerSummary>,
    inspections: HashMap<String, ContainerInspectResponse>,
    digests: HashMap<String, String>,
    failures: HashMap<(Op, String), FailWith>,
    exit_codes: HashMap<String, (i32, String)>,
    pull_delay: Option<Duration>,
    slow_pulls: HashMap<String, Duration>,
    list_delay: Option<Duration>,
    calls: Mutex<Vec<Call>>,
    created: Mutex<HashSet<String>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_container(mut self, summary: ContainerSummary) -> Self {
        self.containers.push(summary);
        self
    }

    pub fn with_inspection(mut self, id: &str, inspect: ContainerInspectResponse) -> Self {
        self.inspections.insert(id.to_string(), inspect);
        self
    }

    /// Digest reported for an image reference or image id.
    pub fn with_digest(mut self, image: &str, digest: &str) -> Self {
        self.digests.insert(image.to_string(), digest.to_string());
        self
    }

    /// Makes `op` on `target` fail. Use `"*"` as target for `Op::List`.
    pub fn failing(mut self, op: Op, target: &str, with: FailWith) -> Self {
        self.failures.insert((op, target.to_string()), with);
        self
    }

    /// Exit code and output for a command whose arguments join to `args`.
    pub fn with_exit(mut self, args: &str, code: i32, output: &str) -> Self {
        self.exit_codes
            .insert(args.to_string(), (code, output.to_string()));
        self
    }

    pub fn with_pull_delay(mut self, delay: Duration) -> Self {
        self.pull_delay = Some(delay);
        self
    }

    /// Delays pulls of one image only.
    pub fn with_slow_pull(mut self, image: &str, delay: Duration) -> Self {
        self.slow_pulls.insert(image.to_string(), delay);
        self
    }

    pub fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| predicate(c)).count()
    }

    /// Position of the first call matching `predicate`.
    pub fn position(&self, predicate: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls().iter().position(|c| predicate(c))
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, op: Op, target: &str) -> RuntimeResult<()> {
        match self.failures.get(&(op, target.to_string())) {
            Some(with) => Err(with.error(&format!("{op:?} {target}"))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RuntimeClient for MockRuntime {
    async fn list_instances(&self) -> RuntimeResult<Vec<ContainerSummary>> {
        self.record(Call::List);
        if let Some(delay) = self.list_delay {
            tokio::time::sleep(delay).await;
        }
        self.check(Op::List, "*")?;
        Ok(self.containers.clone())
    }

    async fn inspect_instance(&self, id: &str) -> RuntimeResult<ContainerInspectResponse> {
        self.record(Call::Inspect(id.to_string()));
        self.check(Op::Inspect, id)?;
        self.inspections
            .get(id)
            .cloned()
            .ok_or_else(|| RuntimeError::NotFound(format!("No such container: {id}")))
    }

    async fn pull_image(&self, image: &str) -> RuntimeResult<()> {
        self.record(Call::Pull(image.to_string()));
        if let Some(delay) = self.slow_pulls.get(image).copied().or(self.pull_delay) {
            tokio::time::sleep(delay).await;
        }
        self.check(Op::Pull, image)
    }

    async fn image_digest(&self, image: &str) -> RuntimeResult<String> {
        self.record(Call::Digest(image.to_string()));
        self.check(Op::Digest, image)?;
        Ok(self
            .digests
            .get(image)
            .cloned()
            .unwrap_or_else(|| "sha256:mock-digest".to_string()))
    }

    async fn start_instance(&self, id: &str) -> RuntimeResult<()> {
        self.record(Call::Start(id.to_string()));
        self.check(Op::Start, id)
    }

    async fn stop_instance(&self, id: &str) -> RuntimeResult<()> {
        self.record(Call::Stop(id.to_string()));
        self.check(Op::Stop, id)
    }

    async fn restart_instance(&self, id: &str) -> RuntimeResult<()> {
        self.record(Call::Restart(id.to_string()));
        self.check(Op::Restart, id)
    }

    async fn remove_instance(&self, id: &str) -> RuntimeResult<()> {
        self.record(Call::Remove(id.to_string()));
        self.check(Op::Remove, id)
    }

    async fn create_instance(&self, name: &str, config: Config<String>) -> RuntimeResult<String> {
        self.record(Call::Create {
            name: name.to_string(),
            config,
        });
        self.check(Op::Create, name)?;
        if !self.created.lock().unwrap().insert(name.to_string()) {
            return Err(RuntimeError::Conflict(format!(
                "The container name \"/{name}\" is already in use"
            )));
        }
        Ok(format!("new-{name}"))
    }

    async fn execute_command(
        &self,
        working_dir: &Path,
        program: &str,
        args: &[String],
    ) -> RuntimeResult<CommandOutput> {
        self.record(Call::Exec {
            dir: working_dir.to_path_buf(),
            program: program.to_string(),
            args: args.to_vec(),
        });
        let (code, output) = self
            .exit_codes
            .get(&args.join(" "))
            .cloned()
            .unwrap_or((0, String::new()));
        Ok(CommandOutput {
            status: Some(code),
            output,
        })
    }
}

pub fn summary(
    id: &str,
    name: &str,
    image: &str,
    state: &str,
    labels: &[(&str, &str)],
) -> ContainerSummary {
    ContainerSummary {
        id: Some(id.to_string()),
        names: Some(vec![format!("/{name}")]),
        image: Some(image.to_string()),
        image_id: Some(format!("sha256:running-{id}")),
        state: Some(state.to_string()),
        labels: Some(
            labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ),
        ..Default::default()
    }
}

pub fn compose_labels<'a>(project: &'a str, dir: &'a str) -> [(&'static str, &'a str); 2] {
    [
        ("com.docker.compose.project", project),
        ("com.docker.compose.project.working_dir", dir),
    ]
}

pub fn inspection(id: &str, name: &str, image: &str) -> ContainerInspectResponse {
    let mut ports = HashMap::new();
    ports.insert(
        "80/tcp".to_string(),
        Some(vec![PortBinding {
            host_ip: Some(String::new()),
            host_port: Some("8080".to_string()),
        }]),
    );
    ports.insert(
        "443/tcp".to_string(),
        Some(vec![PortBinding {
            host_ip: Some("127.0.0.1".to_string()),
            host_port: Some("8443".to_string()),
        }]),
    );

    ContainerInspectResponse {
        id: Some(id.to_string()),
        name: Some(format!("/{name}")),
        config: Some(ContainerConfig {
            image: Some(image.to_string()),
            env: Some(vec![
                "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin".to_string(),
                "API_KEY=secret".to_string(),
                "MODE=production".to_string(),
            ]),
            cmd: Some(vec!["serve".to_string(), "--port=80".to_string()]),
            labels: Some(HashMap::from([("owner".to_string(), "ops".to_string())])),
            ..Default::default()
        }),
        host_config: Some(HostConfig {
            port_bindings: Some(ports),
            binds: Some(vec![
                "/srv/data:/data".to_string(),
                "config-vol:/etc/app:ro".to_string(),
            ]),
            memory: Some(512 * 1024 * 1024),
            cpu_shares: Some(512),
            ..Default::default()
        }),
        network_settings: Some(NetworkSettings {
            networks: Some(HashMap::from([(
                "bridge".to_string(),
                EndpointSettings::default(),
            )])),
            ..Default::default()
        }),
        ..Default::default()
    }
}
