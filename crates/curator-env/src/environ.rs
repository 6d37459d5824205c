//! Target environment lifecycle.
//!
//! The orchestrated tests run against a micromamba environment that this
//! manager creates, installs the resolved lock set into, and registers
//! as a Jupyter kernel. The core never mutates the environment during a
//! test run; everything here happens before or after orchestration.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{EnvError, EnvResult};

/// Manages the micromamba target environment.
#[derive(Debug, Clone)]
pub struct EnvironmentManager {
    micromamba: String,
}

impl EnvironmentManager {
    pub fn new(micromamba: impl Into<String>) -> Self {
        Self {
            micromamba: micromamba.into(),
        }
    }

    /// Create the target environment with the requested Python.
    pub async fn create(&self, name: &str, python_version: &str) -> EnvResult<()> {
        info!(environment = name, python = python_version, "creating target environment");
        self.run(&self.micromamba, &[
            "create",
            "-n",
            name,
            "-c",
            "conda-forge",
            "--yes",
            &format!("python={python_version}"),
            "pip",
            "uv",
            "papermill",
            "ipykernel",
        ])
        .await?;
        Ok(())
    }

    /// Delete the target environment.
    pub async fn delete(&self, name: &str) -> EnvResult<()> {
        info!(environment = name, "deleting target environment");
        self.run(&self.micromamba, &["env", "remove", "-n", name, "--yes"])
            .await?;
        Ok(())
    }

    /// Install the resolved lock set into the environment with uv.
    pub async fn install(&self, name: &str, lock_file: &Path) -> EnvResult<()> {
        info!(environment = name, lock = %lock_file.display(), "installing resolved packages");
        let lock = lock_file.display().to_string();
        self.run(&self.micromamba, &[
            "run", "-n", name, "uv", "pip", "install", "-r", &lock,
        ])
        .await?;
        Ok(())
    }

    /// Register the environment as a user Jupyter kernel so papermill
    /// can execute on it.
    pub async fn register_kernel(&self, name: &str, display_name: Option<&str>) -> EnvResult<()> {
        info!(environment = name, "registering jupyter kernel");
        self.run(&self.micromamba, &[
            "run",
            "-n",
            name,
            "python",
            "-m",
            "ipykernel",
            "install",
            "--user",
            "--name",
            name,
            "--display-name",
            display_name.unwrap_or(name),
        ])
        .await?;
        Ok(())
    }

    /// Remove the environment's kernel registration.
    pub async fn unregister_kernel(&self, name: &str) -> EnvResult<()> {
        info!(environment = name, "unregistering jupyter kernel");
        self.run("jupyter", &["kernelspec", "uninstall", "-y", name])
            .await?;
        Ok(())
    }

    async fn run(&self, program: &str, args: &[&str]) -> EnvResult<String> {
        debug!(program, ?args, "running collaborator command");
        let output = Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| EnvError::Launch {
                program: program.to_string(),
                source: e,
            })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(EnvError::CommandFailed {
                program: program.to_string(),
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }
}
