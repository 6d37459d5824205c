//! Notebook identity.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A discovered notebook.
///
/// Identity is the canonical absolute path; ordering and equality follow
/// it, so reports keyed by `NotebookRef` are reproducible regardless of
/// completion order. Checkpoint copies of a notebook are never
/// materialized as a `NotebookRef`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotebookRef {
    /// Canonical absolute path of the notebook file.
    pub path: PathBuf,

    /// Path relative to the repos root, used in reports and selectors.
    pub logical_name: String,

    /// Name of the repository (or root directory) the notebook lives in.
    pub repository: String,

    /// When discovery found this notebook.
    pub discovered_at: DateTime<Utc>,
}

impl NotebookRef {
    /// Create a notebook reference rooted at `repos_dir`.
    ///
    /// The logical name is the path relative to `repos_dir` when the
    /// notebook lies beneath it, otherwise the full path.
    pub fn new(path: PathBuf, repos_dir: &Path) -> Self {
        let logical_name = path
            .strip_prefix(repos_dir)
            .unwrap_or(&path)
            .to_string_lossy()
            .into_owned();
        let repository = logical_name
            .split('/')
            .next()
            .unwrap_or(&logical_name)
            .to_string();
        Self {
            path,
            logical_name,
            repository,
            discovered_at: Utc::now(),
        }
    }

    /// Notebook filename without leading directories.
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .map(|n| n.to_str().unwrap_or_default())
            .unwrap_or_default()
    }
}

impl PartialEq for NotebookRef {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for NotebookRef {}

impl PartialOrd for NotebookRef {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NotebookRef {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.path.cmp(&other.path)
    }
}

impl std::fmt::Display for NotebookRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.logical_name)
    }
}
