//! Error types for discovery and compilation.

use std::path::PathBuf;

use crate::compiler::ConstraintConflict;

/// Errors produced by the discovery/compilation layer.
#[derive(Debug, thiserror::Error)]
pub enum CuratorError {
    #[error("notebook root directory does not exist: {path}")]
    Discovery { path: PathBuf },

    #[error("invalid include/exclude pattern {pattern:?}: {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("{} unresolvable constraint conflict(s): {}", .0.len(), summarize(.0))]
    Compilation(Vec<ConstraintConflict>),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for discovery/compilation operations.
pub type CuratorResult<T> = std::result::Result<T, CuratorError>;

fn summarize(conflicts: &[ConstraintConflict]) -> String {
    conflicts
        .iter()
        .map(|c| c.package.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
