//! Notebook repository clones.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{EnvError, EnvResult};

const DEFAULT_CLONE_TIMEOUT: Duration = Duration::from_secs(300);

/// Clones and cleans up the notebook repositories named in the spec.
#[derive(Debug, Clone)]
pub struct RepositoryManager {
    repos_dir: PathBuf,
    clone_timeout: Duration,
}

impl RepositoryManager {
    pub fn new(repos_dir: impl Into<PathBuf>) -> Self {
        Self {
            repos_dir: repos_dir.into(),
            clone_timeout: DEFAULT_CLONE_TIMEOUT,
        }
    }

    pub fn with_clone_timeout(mut self, timeout: Duration) -> Self {
        self.clone_timeout = timeout;
        self
    }

    /// Local clone directory for a repository URL.
    pub fn clone_dir(&self, url: &str) -> PathBuf {
        self.repos_dir.join(repo_name(url))
    }

    /// Ensure every repository has a local clone, shallow-cloning the
    /// missing ones. Existing clones are left untouched.
    pub async fn ensure_clones(&self, urls: &[String]) -> EnvResult<Vec<PathBuf>> {
        tokio::fs::create_dir_all(&self.repos_dir)
            .await
            .map_err(|e| EnvError::Write {
                path: self.repos_dir.clone(),
                source: e,
            })?;

        let mut dirs = Vec::with_capacity(urls.len());
        for url in urls {
            let dir = self.clone_dir(url);
            if dir.is_dir() {
                debug!(repo = url, dir = %dir.display(), "clone already present");
            } else {
                self.clone_repo(url, &dir).await?;
            }
            dirs.push(dir);
        }
        Ok(dirs)
    }

    /// Remove the whole repos directory.
    pub async fn cleanup(&self) -> EnvResult<()> {
        if self.repos_dir.is_dir() {
            info!(dir = %self.repos_dir.display(), "removing repository clones");
            tokio::fs::remove_dir_all(&self.repos_dir)
                .await
                .map_err(|e| EnvError::Write {
                    path: self.repos_dir.clone(),
                    source: e,
                })?;
        }
        Ok(())
    }

    async fn clone_repo(&self, url: &str, dir: &Path) -> EnvResult<()> {
        info!(repo = url, dir = %dir.display(), "cloning repository");
        let child = Command::new("git")
            .arg("clone")
            .arg("--depth")
            .arg("1")
            .arg(url)
            .arg(dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EnvError::Launch {
                program: "git".to_string(),
                source: e,
            })?;

        let output = match tokio::time::timeout(self.clone_timeout, child.wait_with_output()).await
        {
            Ok(result) => result.map_err(|e| EnvError::Launch {
                program: "git".to_string(),
                source: e,
            })?,
            Err(_) => {
                // Drop killed the clone; remove whatever partial state
                // it left behind.
                warn!(repo = url, "clone timed out");
                let _ = tokio::fs::remove_dir_all(dir).await;
                return Err(EnvError::CloneTimeout {
                    url: url.to_string(),
                    timeout_secs: self.clone_timeout.as_secs(),
                });
            }
        };

        if output.status.success() {
            Ok(())
        } else {
            Err(EnvError::CommandFailed {
                program: "git".to_string(),
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }
}

/// Directory name for a repository URL: last path segment, `.git`
/// stripped.
fn repo_name(url: &str) -> String {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(url)
        .trim_end_matches(".git")
        .to_string()
}
