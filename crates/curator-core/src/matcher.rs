//! Path classification against include/exclude patterns.
//!
//! Selection is two independent predicates composed with AND: a
//! user-configurable glob layer and a structural layer that rejects
//! anything under an editor checkpoint/metadata directory. The structural
//! layer cannot be overridden by include patterns; a checkpoint copy such
//! as `.ipynb_checkpoints/a-checkpoint.ipynb` must never be counted as an
//! independent notebook no matter what the user patterns say.

use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::{CuratorError, CuratorResult};

/// Directory names that hold transient editor state, never real notebooks.
const STRUCTURAL_EXCLUDES: &[&str] = &[".ipynb_checkpoints", ".virtual_documents", ".Trash"];

/// Classifies candidate paths for notebook discovery.
///
/// A path is selected iff it matches at least one include pattern (an
/// empty include list matches everything), matches no exclude pattern,
/// and does not lie beneath a checkpoint-style directory. Matching is
/// case-sensitive and exclude wins over include.
#[derive(Debug)]
pub struct PatternMatcher {
    includes: GlobSet,
    include_all: bool,
    excludes: GlobSet,
}

impl PatternMatcher {
    /// Compile include and exclude glob patterns.
    pub fn new(include_patterns: &[String], exclude_patterns: &[String]) -> CuratorResult<Self> {
        Ok(Self {
            includes: build_glob_set(include_patterns)?,
            include_all: include_patterns.is_empty(),
            excludes: build_glob_set(exclude_patterns)?,
        })
    }

    /// Whether `path` is selected for discovery.
    pub fn is_selected(&self, path: &Path) -> bool {
        self.matches_patterns(path) && !Self::is_checkpoint_artifact(path)
    }

    /// The user-configurable layer: include AND NOT exclude.
    fn matches_patterns(&self, path: &Path) -> bool {
        let included = self.include_all || self.includes.is_match(path);
        included && !self.excludes.is_match(path)
    }

    /// The structural layer: true when any ancestor directory denotes
    /// transient editor/checkpoint state.
    pub fn is_checkpoint_artifact(path: &Path) -> bool {
        path.ancestors().skip(1).any(|dir| {
            dir.file_name()
                .and_then(|n| n.to_str())
                .map(|n| STRUCTURAL_EXCLUDES.contains(&n))
                .unwrap_or(false)
        })
    }
}

fn build_glob_set(patterns: &[String]) -> CuratorResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| CuratorError::Pattern {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| CuratorError::Pattern {
        pattern: patterns.join(","),
        reason: e.to_string(),
    })
}
