//! Error types for the collaborator glue.

use std::path::PathBuf;

/// Errors from the spec store, solver, environment, and repo managers.
#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    #[error("failed to read spec file {path}: {source}")]
    SpecRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed spec file {path}: {reason}")]
    SpecFormat { path: PathBuf, reason: String },

    #[error("invalid spec: {reason}")]
    SpecInvalid { reason: String },

    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {code}: {stderr}")]
    CommandFailed {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("dependency resolution failed: {stderr}")]
    Resolution { stderr: String },

    #[error("timed out cloning repository {url} after {timeout_secs}s")]
    CloneTimeout { url: String, timeout_secs: u64 },
}

/// Result type for collaborator operations.
pub type EnvResult<T> = std::result::Result<T, EnvError>;
