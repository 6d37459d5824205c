//! Integration tests for the test orchestrator with stub backends.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use curator_core::NotebookRef;
use curator_runner::{
    ExecutionBackend, ExecutionOutput, JobOutcome, NotebookSelector, OrchestratorConfig,
    RunnerError, TestOrchestrator,
};

fn notebooks(count: usize) -> Vec<NotebookRef> {
    (0..count)
        .map(|i| {
            NotebookRef::new(
                PathBuf::from(format!("/repos/demo/nb-{i:02}.ipynb")),
                Path::new("/repos"),
            )
        })
        .collect()
}

fn select_all() -> NotebookSelector {
    NotebookSelector::new(None).expect("empty selector")
}

/// Backend that sleeps briefly and passes, tracking the peak number of
/// concurrently running executions.
struct ConcurrencyProbe {
    running: AtomicUsize,
    peak: AtomicUsize,
    delay: Duration,
}

impl ConcurrencyProbe {
    fn new(delay: Duration) -> Self {
        Self {
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay,
        }
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionBackend for ConcurrencyProbe {
    async fn execute(&self, _nb: &NotebookRef, _kernel: &str) -> anyhow::Result<ExecutionOutput> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(ExecutionOutput {
            exit_code: 0,
            output: "ok".to_string(),
        })
    }
}

/// Backend that never returns; only a timeout ends it.
struct HangingBackend;

#[async_trait]
impl ExecutionBackend for HangingBackend {
    async fn execute(&self, _nb: &NotebookRef, _kernel: &str) -> anyhow::Result<ExecutionOutput> {
        futures::future::pending::<()>().await;
        unreachable!()
    }
}

/// Backend that fails to launch notebooks whose name contains "bad" and
/// passes the rest.
struct FlakyLaunchBackend;

#[async_trait]
impl ExecutionBackend for FlakyLaunchBackend {
    async fn execute(&self, nb: &NotebookRef, _kernel: &str) -> anyhow::Result<ExecutionOutput> {
        if nb.logical_name.contains("bad") {
            anyhow::bail!("kernel launch refused");
        }
        Ok(ExecutionOutput {
            exit_code: 0,
            output: String::new(),
        })
    }
}

#[tokio::test]
async fn test_pool_size_one_runs_strictly_sequentially() {
    let probe = Arc::new(ConcurrencyProbe::new(Duration::from_millis(30)));
    let orchestrator = TestOrchestrator::new(
        probe.clone(),
        OrchestratorConfig {
            jobs: 1,
            timeout: Duration::from_secs(5),
            ..OrchestratorConfig::default()
        },
    );

    let report = orchestrator
        .run(&notebooks(3), &select_all())
        .await
        .expect("run failed");

    assert!(report.success());
    assert_eq!(report.results.len(), 3);
    assert_eq!(probe.peak(), 1, "jobs must not overlap with one worker");
}

#[tokio::test]
async fn test_pool_size_three_runs_jobs_concurrently() {
    let probe = Arc::new(ConcurrencyProbe::new(Duration::from_millis(100)));
    let orchestrator = TestOrchestrator::new(
        probe.clone(),
        OrchestratorConfig {
            jobs: 3,
            timeout: Duration::from_secs(5),
            ..OrchestratorConfig::default()
        },
    );

    let report = orchestrator
        .run(&notebooks(3), &select_all())
        .await
        .expect("run failed");

    assert!(report.success());
    assert_eq!(probe.peak(), 3, "all three jobs should overlap");
}

#[tokio::test]
async fn test_hanging_job_is_killed_at_timeout_and_recorded_timed_out() {
    let orchestrator = TestOrchestrator::new(
        Arc::new(HangingBackend),
        OrchestratorConfig {
            jobs: 2,
            timeout: Duration::from_millis(50),
            ..OrchestratorConfig::default()
        },
    );

    let nbs = notebooks(2);
    let start = std::time::Instant::now();
    let report = orchestrator.run(&nbs, &select_all()).await.expect("run failed");

    assert!(!report.success());
    assert_eq!(report.results.len(), 2);
    for result in report.ordered() {
        assert_eq!(result.outcome, JobOutcome::TimedOut);
    }
    assert!(
        start.elapsed() < Duration::from_secs(2),
        "forced termination must not wait indefinitely"
    );
}

#[tokio::test]
async fn test_launch_failure_is_isolated_to_its_job() {
    let mut nbs = notebooks(3);
    nbs[1] = NotebookRef::new(
        PathBuf::from("/repos/demo/nb-bad.ipynb"),
        Path::new("/repos"),
    );

    let orchestrator = TestOrchestrator::new(
        Arc::new(FlakyLaunchBackend),
        OrchestratorConfig {
            jobs: 3,
            timeout: Duration::from_secs(5),
            ..OrchestratorConfig::default()
        },
    );

    let report = orchestrator.run(&nbs, &select_all()).await.expect("run failed");

    assert!(!report.success());
    assert_eq!(report.passed_count(), 2);
    let errored: Vec<_> = report
        .ordered()
        .filter(|r| r.outcome == JobOutcome::Errored)
        .collect();
    assert_eq!(errored.len(), 1);
    assert_eq!(errored[0].notebook, "demo/nb-bad.ipynb");
    assert!(errored[0].output.contains("kernel launch refused"));
}

#[tokio::test]
async fn test_selector_matching_nothing_starts_zero_jobs() {
    let probe = Arc::new(ConcurrencyProbe::new(Duration::from_millis(1)));
    let orchestrator = TestOrchestrator::new(
        probe.clone(),
        OrchestratorConfig {
            jobs: 4,
            timeout: Duration::from_secs(5),
            ..OrchestratorConfig::default()
        },
    );

    let selector = NotebookSelector::new(Some("no-such-notebook")).unwrap();
    let err = orchestrator
        .run(&notebooks(8), &selector)
        .await
        .unwrap_err();

    assert!(matches!(err, RunnerError::EmptySelection { available: 8, .. }));
    assert_eq!(probe.peak(), 0, "no job may start on a selection error");
}

#[tokio::test]
async fn test_report_is_keyed_by_identity_not_completion_order() {
    // Later notebooks finish first: completion order is reversed, the
    // report order must not be.
    struct ReverseDelay;

    #[async_trait]
    impl ExecutionBackend for ReverseDelay {
        async fn execute(
            &self,
            nb: &NotebookRef,
            _kernel: &str,
        ) -> anyhow::Result<ExecutionOutput> {
            let delay = if nb.logical_name.contains("nb-00") { 80 } else { 10 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(ExecutionOutput {
                exit_code: 0,
                output: String::new(),
            })
        }
    }

    let orchestrator = TestOrchestrator::new(
        Arc::new(ReverseDelay),
        OrchestratorConfig {
            jobs: 3,
            timeout: Duration::from_secs(5),
            ..OrchestratorConfig::default()
        },
    );

    let report = orchestrator
        .run(&notebooks(3), &select_all())
        .await
        .expect("run failed");

    let names: Vec<&str> = report.ordered().map(|r| r.notebook.as_str()).collect();
    assert_eq!(
        names,
        vec!["demo/nb-00.ipynb", "demo/nb-01.ipynb", "demo/nb-02.ipynb"]
    );
}

#[tokio::test]
async fn test_max_failures_stops_scheduling_new_jobs() {
    struct AlwaysFails;

    #[async_trait]
    impl ExecutionBackend for AlwaysFails {
        async fn execute(
            &self,
            _nb: &NotebookRef,
            _kernel: &str,
        ) -> anyhow::Result<ExecutionOutput> {
            Ok(ExecutionOutput {
                exit_code: 1,
                output: "boom".to_string(),
            })
        }
    }

    let orchestrator = TestOrchestrator::new(
        Arc::new(AlwaysFails),
        OrchestratorConfig {
            jobs: 1,
            timeout: Duration::from_secs(5),
            max_failures: Some(2),
            ..OrchestratorConfig::default()
        },
    );

    let report = orchestrator
        .run(&notebooks(6), &select_all())
        .await
        .expect("run failed");

    assert!(!report.success());
    // With one worker, every failure is visible before the next permit
    // frees up, so exactly the threshold number of jobs ever starts.
    assert_eq!(
        report.results.len(),
        2,
        "threshold should stop scheduling before all six jobs run"
    );
}
