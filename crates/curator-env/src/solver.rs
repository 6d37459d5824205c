//! External dependency resolution via `uv pip compile`.
//!
//! The compiler's CompiledSpec is the solver's *input*; the pinned lock
//! lines coming back are its *output*. Nothing in between is interpreted
//! here.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use curator_core::CompiledSpec;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{EnvError, EnvResult};

/// Invokes `uv pip compile` on a compiled constraint set.
#[derive(Debug, Clone)]
pub struct UvSolver {
    /// Target Python version passed to the resolver.
    pub python_version: String,
}

impl UvSolver {
    pub fn new(python_version: impl Into<String>) -> Self {
        Self {
            python_version: python_version.into(),
        }
    }

    /// Resolve `spec` into fully pinned lock lines.
    ///
    /// Writes `<moniker>-requirements.in` and the solver's
    /// `<moniker>-compiled.txt` under `output_dir`.
    pub async fn resolve(
        &self,
        spec: &CompiledSpec,
        output_dir: &Path,
        moniker: &str,
    ) -> EnvResult<Vec<String>> {
        let input_file = output_dir.join(format!("{moniker}-requirements.in"));
        let output_file = output_dir.join(format!("{moniker}-compiled.txt"));

        write_requirements_in(spec, &input_file).await?;
        debug!(input = %input_file.display(), "running uv pip compile");

        let output = Command::new("uv")
            .arg("pip")
            .arg("compile")
            .arg("--output-file")
            .arg(&output_file)
            .arg("--no-header")
            .arg("--python-version")
            .arg(&self.python_version)
            .arg("--annotate")
            .arg(&input_file)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| EnvError::Launch {
                program: "uv".to_string(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(EnvError::Resolution {
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let lock_lines = read_lock_lines(&output_file).await?;
        info!(
            packages = lock_lines.len(),
            lock = %output_file.display(),
            "dependency resolution complete"
        );
        Ok(lock_lines)
    }
}

/// Render the compiled spec as a `requirements.in` file.
async fn write_requirements_in(spec: &CompiledSpec, path: &Path) -> EnvResult<PathBuf> {
    let mut content = spec.requirement_lines().join("\n");
    content.push('\n');
    tokio::fs::write(path, content)
        .await
        .map_err(|e| EnvError::Write {
            path: path.to_path_buf(),
            source: e,
        })?;
    Ok(path.to_path_buf())
}

/// Parse the pinned lines out of a compiled lock file.
async fn read_lock_lines(path: &Path) -> EnvResult<Vec<String>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| EnvError::SpecRead {
            path: path.to_path_buf(),
            source: e,
        })?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}
