//! Execution backends.
//!
//! The orchestrator only needs start/await/kill semantics from whatever
//! actually runs a notebook; [`ExecutionBackend`] is that seam. The
//! production backend shells out to papermill. Tests inject
//! deterministic stubs.

use std::path::Path;
use std::process::Stdio;

use anyhow::Context;
use async_trait::async_trait;
use curator_core::NotebookRef;
use tokio::process::Command;
use tracing::debug;

/// Captured output of one finished notebook execution.
#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    /// Process exit code (0 = notebook ran clean).
    pub exit_code: i32,

    /// Combined stdout/stderr.
    pub output: String,
}

impl ExecutionOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs one notebook headlessly on a named kernel.
///
/// Implementations must spawn the execution as a child process whose
/// lifetime is tied to the returned future: when the orchestrator drops
/// the future at the timeout, the process must die with it.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Execute `notebook` to completion and return its output.
    ///
    /// An `Err` means the execution could not even be launched
    /// (infrastructure failure); a notebook that runs and fails returns
    /// `Ok` with a non-zero exit code.
    async fn execute(&self, notebook: &NotebookRef, kernel: &str) -> anyhow::Result<ExecutionOutput>;
}

/// Papermill-based backend.
///
/// The notebook's directory is copied into a scratch dir first so
/// executions cannot mutate the curated repository or each other; the
/// target environment stays read-only during the whole run.
#[derive(Debug, Default)]
pub struct PapermillBackend;

impl PapermillBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExecutionBackend for PapermillBackend {
    async fn execute(&self, notebook: &NotebookRef, kernel: &str) -> anyhow::Result<ExecutionOutput> {
        let source_dir = notebook
            .path
            .parent()
            .context("notebook path has no parent directory")?
            .to_path_buf();

        let scratch = tempfile::tempdir().context("failed to create scratch directory")?;
        let work_dir = scratch.path().join("notebook-test");
        copy_dir(&source_dir, &work_dir)
            .await
            .with_context(|| format!("failed to stage {}", source_dir.display()))?;

        debug!(notebook = %notebook, kernel, dir = %work_dir.display(), "launching papermill");

        // kill_on_drop ties the child's lifetime to this future: if the
        // orchestrator's timeout drops us, the process is killed.
        let child = Command::new("papermill")
            .arg("--no-progress-bar")
            .arg(notebook.file_name())
            .arg("-k")
            .arg(kernel)
            .arg("test-output.ipynb")
            .current_dir(&work_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to launch papermill for {notebook}"))?;

        let output = child
            .wait_with_output()
            .await
            .with_context(|| format!("failed waiting on papermill for {notebook}"))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(ExecutionOutput {
            exit_code: output.status.code().unwrap_or(-1),
            output: combined,
        })
    }
}

/// Recursively copy a directory, skipping checkpoint artifacts.
async fn copy_dir(from: &Path, to: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(to).await?;
    let mut entries = tokio::fs::read_dir(from).await?;
    while let Some(entry) = entries.next_entry().await? {
        let target = to.join(entry.file_name());
        let file_type = entry.file_type().await?;
        if file_type.is_dir() {
            if entry.file_name() == ".ipynb_checkpoints" {
                continue;
            }
            Box::pin(copy_dir(&entry.path(), &target)).await?;
        } else if file_type.is_file() {
            tokio::fs::copy(entry.path(), &target).await?;
        }
    }
    Ok(())
}
