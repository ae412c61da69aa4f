//! Partitions discovered containers into managed units.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

use bollard::models::ContainerSummary;
use freshen_common::{
    FleetError, InstanceSnapshot, InstanceState, ManagedUnit, Result, RuntimeClient, UnitKind,
};
use tracing::{debug, error, instrument};

use crate::config::FleetConfig;

/// Lists every container once and partitions the result.
#[instrument(skip_all)]
pub async fn discover_units(
    client: &dyn RuntimeClient,
    config: &FleetConfig,
) -> Result<Vec<ManagedUnit>> {
    let started = Instant::now();
    let containers = client.list_instances().await.map_err(|e| {
        error!(error = %e, duration_ms = started.elapsed().as_millis() as u64, "Failed to list containers");
        FleetError::Enumerate(e)
    })?;

    let units = group_instances(containers, config);
    debug!(
        units = units.len(),
        grouped = units.iter().filter(|u| u.kind == UnitKind::Grouped).count(),
        duration_ms = started.elapsed().as_millis() as u64,
        "Grouped containers"
    );
    Ok(units)
}

/// Grouped units first, in order of first appearance, then standalone ones.
pub fn group_instances(containers: Vec<ContainerSummary>, config: &FleetConfig) -> Vec<ManagedUnit> {
    let mut grouped: Vec<ManagedUnit> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut standalone = Vec::new();

    for summary in containers {
        let instance = snapshot_from_summary(summary);
        let project = instance
            .labels
            .get(&config.group_label)
            .filter(|p| !p.is_empty())
            .cloned();

        let Some(project) = project else {
            standalone.push(ManagedUnit::standalone(instance));
            continue;
        };

        let slot = *index.entry(project.clone()).or_insert_with(|| {
            grouped.push(ManagedUnit::grouped(project, None));
            grouped.len() - 1
        });
        let unit = &mut grouped[slot];
        // First working directory seen is authoritative.
        if unit.working_dir.is_none() {
            unit.working_dir = instance
                .labels
                .get(&config.working_dir_label)
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from);
        }
        unit.instances.push(instance);
    }

    for unit in &mut grouped {
        unit.refresh();
    }
    grouped.extend(standalone);
    grouped
}

pub fn snapshot_from_summary(summary: ContainerSummary) -> InstanceSnapshot {
    let name = summary
        .names
        .as_ref()
        .and_then(|names| names.first())
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_default();

    InstanceSnapshot {
        id: summary.id.unwrap_or_default(),
        name,
        image: summary.image.unwrap_or_default(),
        image_id: summary.image_id.unwrap_or_default(),
        current_digest: None,
        latest_digest: None,
        state: InstanceState::from(summary.state.unwrap_or_default()),
        has_update: false,
        labels: summary.labels.unwrap_or_default(),
    }
}

pub fn find_unit<'a>(units: &'a [ManagedUnit], id: &str) -> Option<&'a ManagedUnit> {
    units.iter().find(|unit| unit.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn summary(id: &str, name: &str, state: &str, labels: &[(&str, &str)]) -> ContainerSummary {
        ContainerSummary {
            id: Some(id.to_string()),
            names: Some(vec![format!("/{name}")]),
            image: Some("nginx:latest".to_string()),
            image_id: Some(format!("sha256:{id}")),
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

    fn compose(project: &str, dir: &str) -> Vec<(&'static str, String)> {
        vec![
            ("com.docker.compose.project", project.to_string()),
            ("com.docker.compose.project.working_dir", dir.to_string()),
        ]
    }

    fn labels<'a>(pairs: &'a [(&'static str, String)]) -> Vec<(&'static str, &'a str)> {
        pairs.iter().map(|(k, v)| (*k, v.as_str())).collect()
    }

    #[test]
    fn test_partition_by_project_label() {
        let shop = compose("shop", "/srv/shop");
        let blog = compose("blog", "/srv/blog");
        let containers = vec![
            summary("a1", "shop-web-1", "running", &labels(&shop)),
            summary("b1", "blog-app-1", "exited", &labels(&blog)),
            summary("s1", "portainer", "running", &[]),
            summary("a2", "shop-db-1", "running", &labels(&shop)),
            summary("s2", "empty-label", "running", &[("com.docker.compose.project", "")]),
        ];

        let units = group_instances(containers, &FleetConfig::default());

        assert_eq!(units.len(), 4);
        let shop = find_unit(&units, "shop").unwrap();
        assert_eq!(shop.kind, UnitKind::Grouped);
        assert_eq!(shop.instances.len(), 2);
        assert_eq!(shop.working_dir, Some(PathBuf::from("/srv/shop")));
        assert!(shop.all_running);

        let blog = find_unit(&units, "blog").unwrap();
        assert!(!blog.all_running);

        let portainer = find_unit(&units, "s1").unwrap();
        assert_eq!(portainer.kind, UnitKind::Standalone);
        assert_eq!(portainer.name, "portainer");
        assert_eq!(portainer.instances.len(), 1);

        let empty = find_unit(&units, "s2").unwrap();
        assert_eq!(empty.kind, UnitKind::Standalone);
    }

    #[test]
    fn test_every_instance_lands_in_exactly_one_unit() {
        let shop = compose("shop", "/srv/shop");
        let containers = vec![
            summary("a1", "shop-web-1", "running", &labels(&shop)),
            summary("a2", "shop-db-1", "running", &labels(&shop)),
            summary("s1", "solo", "running", &[]),
            summary("s2", "solo-2", "exited", &[]),
        ];
        let expected: HashSet<String> = containers
            .iter()
            .map(|c| c.id.clone().unwrap())
            .collect();

        let units = group_instances(containers, &FleetConfig::default());

        let ids: Vec<String> = units
            .iter()
            .flat_map(|u| u.instances.iter().map(|i| i.id.clone()))
            .collect();
        assert_eq!(ids.len(), expected.len());
        assert_eq!(ids.into_iter().collect::<HashSet<_>>(), expected);
        for unit in units.iter().filter(|u| u.kind == UnitKind::Standalone) {
            assert_eq!(unit.instances.len(), 1);
        }
    }

    #[test]
    fn test_first_working_dir_wins() {
        let first = [("com.docker.compose.project", "shop")];
        let second = compose("shop", "/srv/shop");
        let third = compose("shop", "/elsewhere");
        let containers = vec![
            summary("a1", "shop-web-1", "running", &first),
            summary("a2", "shop-db-1", "running", &labels(&second)),
            summary("a3", "shop-cache-1", "running", &labels(&third)),
        ];

        let units = group_instances(containers, &FleetConfig::default());

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].working_dir, Some(PathBuf::from("/srv/shop")));
    }

    #[test]
    fn test_custom_group_label() {
        let config = FleetConfig {
            group_label: "io.example.stack".to_string(),
            ..Default::default()
        };
        let containers = vec![
            summary("a1", "one", "running", &[("io.example.stack", "edge")]),
            summary("a2", "two", "running", &[("com.docker.compose.project", "shop")]),
        ];

        let units = group_instances(containers, &config);

        assert_eq!(find_unit(&units, "edge").unwrap().instances.len(), 1);
        assert_eq!(find_unit(&units, "a2").unwrap().kind, UnitKind::Standalone);
    }

    #[test]
    fn test_snapshot_strips_leading_slash() {
        let snapshot = snapshot_from_summary(summary("x", "web", "running", &[]));
        assert_eq!(snapshot.name, "web");
        assert_eq!(snapshot.image_id, "sha256:x");
        assert!(snapshot.is_running());
    }
}
