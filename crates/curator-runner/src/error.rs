//! Error types for test orchestration.

/// Errors produced by the test orchestration layer.
///
/// Per-job failures (a notebook that fails, times out, or cannot launch)
/// are not errors here; they are recorded as outcomes in the report.
/// These variants abort the run before any job starts.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("test selector {selector:?} matched none of {available} discovered notebooks")]
    EmptySelection { selector: String, available: usize },

    #[error("invalid selector regex {pattern:?}: {source}")]
    Selector {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("worker pool size must be at least 1")]
    ZeroWorkers,
}

/// Result type for orchestration operations.
pub type RunnerResult<T> = std::result::Result<T, RunnerError>;
