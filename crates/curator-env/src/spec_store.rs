//! YAML curation spec: the configuration source for a run and the sink
//! for its compiled outputs.

use std::fs;
use std::path::{Path, PathBuf};

use curator_core::{CompiledSpec, CuratorConfig};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EnvError, EnvResult};

/// Identity section of a curation spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpecHeader {
    /// Human-readable name of the curated image/environment.
    pub image_name: String,

    /// Jupyter kernel the notebooks are tested on.
    pub kernel_name: String,

    /// Target Python version, e.g. "3.11".
    pub python_version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Git URLs of notebook repositories to clone under `repos_dir`.
    #[serde(default)]
    pub repositories: Vec<String>,
}

/// Results section, written back after compilation and testing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpecOutputs {
    /// Fully pinned lock lines from the external solver.
    #[serde(default)]
    pub package_versions: Vec<String>,

    /// Merged direct-constraint lines handed to the solver.
    #[serde(default)]
    pub compiled_requirements: Vec<String>,

    /// Content digest of the compiled constraint set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiled_digest: Option<String>,

    /// Logical names of the notebooks selected for testing.
    #[serde(default)]
    pub tested_notebooks: Vec<String>,
}

/// A full curation spec file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CurationSpec {
    pub header: SpecHeader,

    /// Root directories to search for notebooks, relative to `repos_dir`
    /// unless absolute.
    pub notebook_dirs: Vec<PathBuf>,

    /// Glob patterns notebooks must match (empty = `*.ipynb` default).
    #[serde(default = "default_include_patterns")]
    pub include_patterns: Vec<String>,

    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    #[serde(default = "default_repos_dir")]
    pub repos_dir: PathBuf,

    #[serde(default = "default_jobs")]
    pub jobs: usize,

    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    #[serde(default)]
    pub out: SpecOutputs,
}

fn default_include_patterns() -> Vec<String> {
    vec!["*.ipynb".to_string()]
}

fn default_repos_dir() -> PathBuf {
    PathBuf::from("./repos")
}

fn default_jobs() -> usize {
    1
}

fn default_timeout() -> u64 {
    30 * 60
}

impl CurationSpec {
    /// Load and validate a spec file.
    pub fn load(path: &Path) -> EnvResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| EnvError::SpecRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let spec: CurationSpec =
            serde_yaml::from_str(&content).map_err(|e| EnvError::SpecFormat {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        spec.validate()?;
        info!(spec = %path.display(), image = %spec.header.image_name, "loaded curation spec");
        Ok(spec)
    }

    /// Persist the spec (including its `out:` section) to `path`.
    pub fn save(&self, path: &Path) -> EnvResult<()> {
        let content = serde_yaml::to_string(self).map_err(|e| EnvError::SpecFormat {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        fs::write(path, content).map_err(|e| EnvError::Write {
            path: path.to_path_buf(),
            source: e,
        })?;
        info!(spec = %path.display(), "spec file written");
        Ok(())
    }

    pub fn validate(&self) -> EnvResult<()> {
        if self.header.image_name.trim().is_empty() {
            return Err(EnvError::SpecInvalid {
                reason: "header.image_name must not be empty".to_string(),
            });
        }
        if self.header.kernel_name.trim().is_empty() {
            return Err(EnvError::SpecInvalid {
                reason: "header.kernel_name must not be empty".to_string(),
            });
        }
        if self.notebook_dirs.is_empty() {
            return Err(EnvError::SpecInvalid {
                reason: "notebook_dirs must list at least one directory".to_string(),
            });
        }
        if self.jobs == 0 {
            return Err(EnvError::SpecInvalid {
                reason: "jobs must be at least 1".to_string(),
            });
        }
        if self.timeout_seconds == 0 {
            return Err(EnvError::SpecInvalid {
                reason: "timeout_seconds must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Filesystem-safe name derived from the image name.
    pub fn moniker(&self) -> String {
        self.header.image_name.replace(' ', "-").to_lowercase()
    }

    /// Notebook roots resolved against `repos_dir`.
    pub fn resolved_notebook_dirs(&self) -> Vec<PathBuf> {
        self.notebook_dirs
            .iter()
            .map(|d| {
                if d.is_absolute() {
                    d.clone()
                } else {
                    self.repos_dir.join(d)
                }
            })
            .collect()
    }

    /// Build the explicit core configuration from this spec.
    pub fn to_curator_config(&self, strict: bool) -> CuratorConfig {
        CuratorConfig {
            notebook_dirs: self.resolved_notebook_dirs(),
            include_patterns: self.include_patterns.clone(),
            exclude_patterns: self.exclude_patterns.clone(),
            repos_dir: self.repos_dir.clone(),
            jobs: self.jobs,
            timeout_seconds: self.timeout_seconds,
            strict,
        }
    }

    /// Record the compile step's products in the `out:` section.
    pub fn record_compiled(&mut self, compiled: &CompiledSpec, lock_lines: Vec<String>) {
        self.out.compiled_requirements = compiled.requirement_lines();
        self.out.compiled_digest = Some(compiled.digest.clone());
        self.out.package_versions = lock_lines;
    }
}
