//! Notebook discovery.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::CuratorConfig;
use crate::error::{CuratorError, CuratorResult};
use crate::matcher::PatternMatcher;
use crate::notebook::NotebookRef;

/// Walks the configured notebook roots and returns the canonical,
/// deduplicated, lexicographically ordered notebook set.
///
/// Discovery is idempotent: two walks over an unchanged filesystem yield
/// the same sequence in the same order.
#[derive(Debug)]
pub struct NotebookDiscoverer {
    matcher: PatternMatcher,
    repos_dir: PathBuf,
}

impl NotebookDiscoverer {
    pub fn new(config: &CuratorConfig) -> CuratorResult<Self> {
        // Canonicalize when possible so logical names stay relative even
        // when the walked roots resolve through a symlink.
        let repos_dir =
            fs::canonicalize(&config.repos_dir).unwrap_or_else(|_| config.repos_dir.clone());
        Ok(Self {
            matcher: PatternMatcher::new(&config.include_patterns, &config.exclude_patterns)?,
            repos_dir,
        })
    }

    /// Discover notebooks under `roots`, in order.
    ///
    /// Every root is canonicalized before walking, so two spellings of
    /// the same directory (symlink alias, relative vs absolute) cannot
    /// materialize the same physical notebook twice.
    ///
    /// Fails with [`CuratorError::Discovery`] when a configured root does
    /// not exist. Finding zero notebooks is a legitimate result, not an
    /// error.
    pub fn discover(&self, roots: &[PathBuf]) -> CuratorResult<Vec<NotebookRef>> {
        let mut paths: BTreeSet<PathBuf> = BTreeSet::new();

        for root in roots {
            let root = fs::canonicalize(root)
                .map_err(|_| CuratorError::Discovery { path: root.clone() })?;
            if !root.is_dir() {
                return Err(CuratorError::Discovery { path: root });
            }
            for entry in WalkDir::new(&root).sort_by_file_name() {
                let entry = entry.map_err(|e| CuratorError::Io {
                    path: root.clone(),
                    source: e.into(),
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                if self.matcher.is_selected(entry.path()) {
                    debug!(path = %entry.path().display(), "selected notebook");
                    paths.insert(entry.into_path());
                } else {
                    debug!(path = %entry.path().display(), "skipped");
                }
            }
        }

        let notebooks: Vec<NotebookRef> = paths
            .into_iter()
            .map(|p| NotebookRef::new(p, &self.repos_dir))
            .collect();

        info!(count = notebooks.len(), "notebook discovery complete");
        Ok(notebooks)
    }
}

/// Convenience: discover using the roots configured in `config`.
pub fn discover_notebooks(config: &CuratorConfig) -> CuratorResult<Vec<NotebookRef>> {
    NotebookDiscoverer::new(config)?.discover(&config.notebook_dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn config_for(root: &Path) -> CuratorConfig {
        CuratorConfig {
            notebook_dirs: vec![root.to_path_buf()],
            repos_dir: root.to_path_buf(),
            ..CuratorConfig::default()
        }
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"{}").unwrap();
    }

    #[test]
    fn test_checkpoint_copies_are_not_independent_notebooks() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("notebooks/a/a.ipynb"));
        touch(&root.join("notebooks/a/.ipynb_checkpoints/a-checkpoint.ipynb"));
        touch(&root.join("notebooks/b/b.ipynb"));

        let config = config_for(root);
        let found = discover_notebooks(&config).unwrap();

        assert_eq!(found.len(), 2, "checkpoint copy must not be counted");
        assert_eq!(found[0].file_name(), "a.ipynb");
        assert_eq!(found[1].file_name(), "b.ipynb");
    }

    #[test]
    fn test_discovery_is_idempotent_and_ordered() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("z/last.ipynb"));
        touch(&root.join("a/first.ipynb"));
        touch(&root.join("m/middle.ipynb"));

        let config = config_for(root);
        let first = discover_notebooks(&config).unwrap();
        let second = discover_notebooks(&config).unwrap();

        assert_eq!(first, second);
        let names: Vec<&str> = first.iter().map(|n| n.file_name()).collect();
        assert_eq!(names, vec!["first.ipynb", "middle.ipynb", "last.ipynb"]);
    }

    #[test]
    fn test_missing_root_is_a_discovery_error() {
        let dir = tempdir().unwrap();
        let config = CuratorConfig {
            notebook_dirs: vec![dir.path().join("does-not-exist")],
            repos_dir: dir.path().to_path_buf(),
            ..CuratorConfig::default()
        };
        let err = discover_notebooks(&config).unwrap_err();
        assert!(matches!(err, CuratorError::Discovery { .. }));
    }

    #[test]
    fn test_zero_notebooks_is_not_an_error() {
        let dir = tempdir().unwrap();
        let config = config_for(dir.path());
        let found = discover_notebooks(&config).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_duplicate_roots_deduplicate() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("a/a.ipynb"));

        let config = CuratorConfig {
            notebook_dirs: vec![root.to_path_buf(), root.to_path_buf()],
            repos_dir: root.to_path_buf(),
            ..CuratorConfig::default()
        };
        let found = discover_notebooks(&config).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_aliased_root_does_not_duplicate_notebooks() {
        let dir = tempdir().unwrap();
        let real = dir.path().join("real");
        touch(&real.join("a/a.ipynb"));
        let alias = dir.path().join("alias");
        std::os::unix::fs::symlink(&real, &alias).unwrap();

        let config = CuratorConfig {
            notebook_dirs: vec![real, alias],
            repos_dir: dir.path().to_path_buf(),
            ..CuratorConfig::default()
        };
        let found = discover_notebooks(&config).unwrap();
        assert_eq!(found.len(), 1, "one physical notebook, one reference");
    }

    #[test]
    fn test_exclude_patterns_apply() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("keep/run.ipynb"));
        touch(&root.join("skip/scratch.ipynb"));

        let config = CuratorConfig {
            exclude_patterns: vec!["*scratch*".to_string()],
            ..config_for(root)
        };
        let found = discover_notebooks(&config).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].file_name(), "run.ipynb");
    }
}
