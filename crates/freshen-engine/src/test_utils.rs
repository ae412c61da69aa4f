/// Test utilities for conditional test execution
use std::process::Command;

pub fn has_docker() -> bool {
    Command::new("docker")
        .arg("info")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

pub fn has_compose() -> bool {
    Command::new("docker")
        .args(["compose", "version"])
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Macro to skip tests when requirements aren't met
#[macro_export]
macro_rules! require_docker {
    () => {
        if !$crate::test_utils::has_docker() {
            eprintln!("Test ignored: Docker not available");
            return;
        }
    };
}

#[macro_export]
macro_rules! require_compose {
    () => {
        if !$crate::test_utils::has_compose() {
            eprintln!("Test ignored: docker compose not available");
            return;
        }
    };
}
