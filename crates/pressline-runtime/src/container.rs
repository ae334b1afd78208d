//! Container-stack driver.
//!
//! The orchestrator treats the container engine as an opaque capability:
//! it never parses engine-specific output beyond success/failure and
//! stdout text.

use crate::process::{run_checked, SHORT_TIMEOUT};
use crate::RuntimeError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecOutput {
    pub success: bool,
    pub stdout: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceState {
    pub service: String,
    pub running: bool,
}

pub trait ContainerRuntime: Send + Sync {
    fn name(&self) -> &str;

    /// Bring the stack at `path` up, detached.
    fn start_stack(&self, path: &Path) -> Result<(), RuntimeError>;

    /// Stop the stack, optionally removing its volumes.
    fn stop_stack(&self, path: &Path, remove_volumes: bool) -> Result<(), RuntimeError>;

    /// Run a command inside one of the stack's services.
    fn exec(&self, path: &Path, service: &str, command: &[String])
        -> Result<ExecOutput, RuntimeError>;

    fn status(&self, path: &Path) -> Result<Vec<ServiceState>, RuntimeError>;
}

/// Host implementation shelling out to `docker compose`.
pub struct ComposeRuntime {
    binary: String,
}

impl Default for ComposeRuntime {
    fn default() -> Self {
        Self {
            binary: "docker".to_owned(),
        }
    }
}

impl ComposeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn compose(&self, path: &Path) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("compose").current_dir(path);
        cmd
    }
}

impl ContainerRuntime for ComposeRuntime {
    fn name(&self) -> &'static str {
        "compose"
    }

    fn start_stack(&self, path: &Path) -> Result<(), RuntimeError> {
        debug!("starting stack at {}", path.display());
        let mut cmd = self.compose(path);
        cmd.args(["up", "-d"]);
        run_checked(cmd, SHORT_TIMEOUT)?;
        Ok(())
    }

    fn stop_stack(&self, path: &Path, remove_volumes: bool) -> Result<(), RuntimeError> {
        debug!(
            "stopping stack at {} (volumes: {remove_volumes})",
            path.display()
        );
        let mut cmd = self.compose(path);
        cmd.arg("down");
        if remove_volumes {
            cmd.arg("--volumes");
        }
        run_checked(cmd, SHORT_TIMEOUT)?;
        Ok(())
    }

    fn exec(
        &self,
        path: &Path,
        service: &str,
        command: &[String],
    ) -> Result<ExecOutput, RuntimeError> {
        let mut cmd = self.compose(path);
        cmd.args(["exec", "-T", service]);
        cmd.args(command);
        let output = crate::process::run_with_timeout(cmd, SHORT_TIMEOUT)?;
        Ok(ExecOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }

    fn status(&self, path: &Path) -> Result<Vec<ServiceState>, RuntimeError> {
        let mut cmd = self.compose(path);
        cmd.args(["ps", "--format", "{{.Service}} {{.State}}"]);
        let output = run_checked(cmd, SHORT_TIMEOUT)?;
        Ok(parse_ps_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn parse_ps_output(stdout: &str) -> Vec<ServiceState> {
    stdout
        .lines()
        .filter_map(|line| {
            let (service, state) = line.trim().split_once(' ')?;
            Some(ServiceState {
                service: service.to_owned(),
                running: state.eq_ignore_ascii_case("running"),
            })
        })
        .collect()
}
