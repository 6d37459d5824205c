//! Run configuration.
//!
//! Every component takes an explicit [`CuratorConfig`] instead of reading
//! ambient process state, so PatternMatcher and ConstraintCompiler can be
//! unit-tested without any process-level setup.

use std::path::PathBuf;

/// Configuration for one curation run.
#[derive(Debug, Clone)]
pub struct CuratorConfig {
    /// Root directories to search for notebooks, in search order.
    pub notebook_dirs: Vec<PathBuf>,

    /// Glob patterns a notebook filename must match (empty = match all).
    pub include_patterns: Vec<String>,

    /// Glob patterns that reject a path even when included.
    pub exclude_patterns: Vec<String>,

    /// Directory holding notebook repository clones. Logical notebook
    /// names are relative to this root.
    pub repos_dir: PathBuf,

    /// Worker-pool size for notebook testing.
    pub jobs: usize,

    /// Per-notebook execution timeout.
    pub timeout_seconds: u64,

    /// Abort the compile step on any requirements parse failure instead
    /// of warning and continuing.
    pub strict: bool,
}

impl Default for CuratorConfig {
    fn default() -> Self {
        Self {
            notebook_dirs: Vec::new(),
            include_patterns: vec!["*.ipynb".to_string()],
            exclude_patterns: Vec::new(),
            repos_dir: PathBuf::from("./repos"),
            jobs: 1,
            timeout_seconds: 30 * 60,
            strict: false,
        }
    }
}
