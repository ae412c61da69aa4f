// Re-export dependencies potentially needed by consumers (like the binary)
pub use bollard;
pub use freshen_common as common;

pub mod config;
pub mod detection;
pub mod docker;
pub mod extract;
pub mod grouped;
pub mod grouping;
pub mod operations;
pub mod standalone;
pub mod test_utils;

pub use config::FleetConfig;
pub use detection::{
    check_fleet, check_updates, check_updates_until, discover_and_check, is_local_image,
    DetectionSummary, DigestCache,
};
pub use docker::DockerRuntime;
pub use extract::{creation_config, extract_configuration};
pub use grouped::update_grouped;
pub use grouping::{discover_units, find_unit, group_instances};
pub use operations::{Fleet, LifecycleAction};
pub use standalone::update_standalone;
