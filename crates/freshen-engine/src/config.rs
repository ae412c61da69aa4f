use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

pub const DEFAULT_GROUP_LABEL: &str = "com.docker.compose.project";
pub const DEFAULT_WORKING_DIR_LABEL: &str = "com.docker.compose.project.working_dir";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetConfig {
    /// Label naming the deployment group a container belongs to.
    pub group_label: String,
    /// Label carrying the group's working directory.
    pub working_dir_label: String,
    pub update_timeout: Duration,
    pub lifecycle_timeout: Duration,
    /// Deadline for one discovery plus detection cycle. Instances still
    /// unresolved when it expires report no update.
    pub check_timeout: Duration,
    /// `None` fans out one check per container with no bound.
    pub detection_concurrency: Option<usize>,
    pub compose_program: String,
    pub compose_down_args: Vec<String>,
    pub compose_up_args: Vec<String>,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            group_label: DEFAULT_GROUP_LABEL.to_string(),
            working_dir_label: DEFAULT_WORKING_DIR_LABEL.to_string(),
            update_timeout: Duration::from_secs(300),
            lifecycle_timeout: Duration::from_secs(30),
            check_timeout: Duration::from_secs(300),
            detection_concurrency: None,
            compose_program: "docker".to_string(),
            compose_down_args: vec!["compose".to_string(), "down".to_string()],
            compose_up_args: vec![
                "compose".to_string(),
                "up".to_string(),
                "-d".to_string(),
                "--build".to_string(),
            ],
        }
    }
}

impl FleetConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from `FRESHEN_*` values, keeping the default for
    /// anything unset or unparseable.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(label) = non_empty(lookup("FRESHEN_GROUP_LABEL")) {
            config.group_label = label;
        }
        if let Some(label) = non_empty(lookup("FRESHEN_WORKING_DIR_LABEL")) {
            config.working_dir_label = label;
        }
        if let Some(secs) = parse_var::<u64>("FRESHEN_UPDATE_TIMEOUT_SECS", &lookup) {
            config.update_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>("FRESHEN_LIFECYCLE_TIMEOUT_SECS", &lookup) {
            config.lifecycle_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>("FRESHEN_CHECK_TIMEOUT_SECS", &lookup) {
            config.check_timeout = Duration::from_secs(secs);
        }
        config.detection_concurrency =
            parse_var::<usize>("FRESHEN_DETECTION_CONCURRENCY", &lookup).filter(|n| *n > 0);
        if let Some(program) = non_empty(lookup("FRESHEN_COMPOSE_PROGRAM")) {
            config.compose_program = program;
        }

        config
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_var<T: FromStr>(key: &str, lookup: &impl Fn(&str) -> Option<String>) -> Option<T> {
    let raw = non_empty(lookup(key))?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(%key, value = %raw, "Ignoring unparseable setting, using default");
            None
        }
    }
}
