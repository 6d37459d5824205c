//! Bounded-pool test orchestration.
//!
//! Jobs move `pending → running → {passed, failed, timed-out, errored}`.
//! At most `jobs` notebooks run at once; a permit is acquired in
//! discovery order *before* spawning, so start order is deterministic
//! while completion order is free. Each job writes its result exactly
//! once into a map keyed by notebook identity.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use curator_core::NotebookRef;
use tokio::sync::{Mutex, Semaphore};
use tracing::{info, warn};

use crate::backend::ExecutionBackend;
use crate::error::{RunnerError, RunnerResult};
use crate::job::{JobOutcome, TestJob, TestReport, TestResult};
use crate::selector::NotebookSelector;

/// Configuration for one orchestration run.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum number of concurrently running jobs.
    pub jobs: usize,

    /// Per-job wall-clock budget.
    pub timeout: Duration,

    /// Jupyter kernel the notebooks execute on.
    pub kernel: String,

    /// Stop *starting* new jobs once this many have not passed.
    /// Already-running jobs are never cancelled by this. `None` runs
    /// everything.
    pub max_failures: Option<usize>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            jobs: 1,
            timeout: Duration::from_secs(30 * 60),
            kernel: "base".to_string(),
            max_failures: None,
        }
    }
}

/// Schedules notebook executions across a bounded worker pool.
pub struct TestOrchestrator {
    backend: Arc<dyn ExecutionBackend>,
    config: OrchestratorConfig,
}

impl TestOrchestrator {
    pub fn new(backend: Arc<dyn ExecutionBackend>, config: OrchestratorConfig) -> Self {
        Self { backend, config }
    }

    /// Select and run `notebooks`, returning the aggregate report.
    ///
    /// Fails fast with [`RunnerError::EmptySelection`] before starting
    /// any job when `selector` matches none of the notebooks.
    pub async fn run(
        &self,
        notebooks: &[NotebookRef],
        selector: &NotebookSelector,
    ) -> RunnerResult<TestReport> {
        if self.config.jobs == 0 {
            return Err(RunnerError::ZeroWorkers);
        }
        let selected = selector.select(notebooks)?;

        info!(
            notebooks = selected.len(),
            jobs = self.config.jobs,
            timeout_secs = self.config.timeout.as_secs(),
            kernel = %self.config.kernel,
            "starting notebook test run"
        );

        let results: Arc<Mutex<BTreeMap<PathBuf, TestResult>>> =
            Arc::new(Mutex::new(BTreeMap::new()));
        let failures = Arc::new(AtomicUsize::new(0));
        let pool = Arc::new(Semaphore::new(self.config.jobs));
        let mut handles = Vec::with_capacity(selected.len());

        let limit_reached = |failures: &AtomicUsize| match self.config.max_failures {
            Some(limit) => failures.load(Ordering::SeqCst) >= limit,
            None => false,
        };

        for notebook in selected {
            // Checked before waiting for a slot and again after: results
            // can land while the acquire blocks.
            if limit_reached(&failures) {
                warn!("failure threshold reached; not starting further jobs");
                break;
            }

            // Acquiring here, not inside the task, pins start order to
            // discovery order.
            let permit = match Arc::clone(&pool).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            if limit_reached(&failures) {
                warn!("failure threshold reached; not starting further jobs");
                break;
            }

            let job = TestJob {
                notebook,
                timeout: self.config.timeout,
            };
            let backend = Arc::clone(&self.backend);
            let kernel = self.config.kernel.clone();
            let results = Arc::clone(&results);
            let failures = Arc::clone(&failures);

            handles.push(tokio::spawn(async move {
                let result = run_job(backend.as_ref(), &job, &kernel).await;
                if !result.passed() {
                    failures.fetch_add(1, Ordering::SeqCst);
                }
                results.lock().await.insert(job.notebook.path.clone(), result);
                drop(permit);
            }));
        }

        for handle in handles {
            // A panicked job task is an orchestration bug; surface it.
            if let Err(e) = handle.await {
                warn!(error = %e, "job task panicked");
            }
        }

        // Every task holding a results clone has been joined; taking the
        // map out under the lock cannot lose results.
        let results = std::mem::take(&mut *results.lock().await);
        let report = TestReport { results };

        info!(
            passed = report.passed_count(),
            failed = report.failed_count(),
            success = report.success(),
            "notebook test run complete"
        );
        Ok(report)
    }
}

/// Run one job to a terminal state. Never returns an error: launch
/// failures and timeouts become outcomes, isolated from sibling jobs.
async fn run_job(backend: &dyn ExecutionBackend, job: &TestJob, kernel: &str) -> TestResult {
    let started = Instant::now();
    let notebook = job.notebook.logical_name.clone();

    let execution = tokio::time::timeout(job.timeout, backend.execute(&job.notebook, kernel)).await;
    let duration_ms = started.elapsed().as_millis() as u64;

    match execution {
        // Timeout elapsed: dropping the execution future kills the
        // child process (kill_on_drop), so the job never runs unbounded.
        Err(_) => {
            warn!(%notebook, timeout_secs = job.timeout.as_secs(), "notebook timed out");
            TestResult {
                notebook,
                outcome: JobOutcome::TimedOut,
                duration_ms,
                output: format!("killed after exceeding {}s timeout", job.timeout.as_secs()),
            }
        }
        Ok(Err(e)) => {
            warn!(%notebook, error = %e, "notebook failed to launch");
            TestResult {
                notebook,
                outcome: JobOutcome::Errored,
                duration_ms,
                output: format!("{e:#}"),
            }
        }
        Ok(Ok(output)) => {
            let outcome = if output.success() {
                JobOutcome::Passed
            } else {
                JobOutcome::Failed
            };
            TestResult {
                notebook,
                outcome,
                duration_ms,
                output: output.output,
            }
        }
    }
}
