//! Test jobs, per-notebook results, and the aggregate report.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use curator_core::NotebookRef;
use serde::{Deserialize, Serialize};

/// One scheduled headless execution of a single notebook.
///
/// Created when orchestration starts, consumed when the job reaches a
/// terminal state.
#[derive(Debug, Clone)]
pub struct TestJob {
    /// The notebook to execute.
    pub notebook: NotebookRef,

    /// Wall-clock budget for the execution process.
    pub timeout: Duration,
}

/// Terminal state of a test job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    /// Notebook executed to completion with exit code 0.
    Passed,
    /// Notebook executed but exited non-zero.
    Failed,
    /// Execution exceeded its budget and the process was killed.
    TimedOut,
    /// The execution backend could not even launch the notebook.
    Errored,
}

impl JobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Passed => "passed",
            JobOutcome::Failed => "failed",
            JobOutcome::TimedOut => "timed-out",
            JobOutcome::Errored => "errored",
        }
    }
}

/// Result of one test job. Immutable once set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    /// Logical name of the tested notebook.
    pub notebook: String,

    /// Terminal outcome.
    pub outcome: JobOutcome,

    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,

    /// Captured diagnostic output (combined stdout/stderr, or the
    /// launch error for `errored` jobs).
    pub output: String,
}

impl TestResult {
    pub fn passed(&self) -> bool {
        self.outcome == JobOutcome::Passed
    }
}

/// The complete set of per-notebook outcomes for one test run.
///
/// Keyed by canonical notebook path — the job's identity — so report
/// ordering is reproducible no matter in which order jobs completed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestReport {
    pub results: BTreeMap<PathBuf, TestResult>,
}

impl TestReport {
    /// Overall status: failed if any constituent result is not passed.
    pub fn success(&self) -> bool {
        self.results.values().all(TestResult::passed)
    }

    pub fn passed_count(&self) -> usize {
        self.results.values().filter(|r| r.passed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.len() - self.passed_count()
    }

    /// Results in deterministic (path) order.
    pub fn ordered(&self) -> impl Iterator<Item = &TestResult> {
        self.results.values()
    }

    /// One-line-per-notebook human summary.
    pub fn summary(&self) -> String {
        let mut lines: Vec<String> = self
            .ordered()
            .map(|r| {
                format!(
                    "{:<9} {:>8}ms  {}",
                    r.outcome.as_str(),
                    r.duration_ms,
                    r.notebook
                )
            })
            .collect();
        lines.push(format!(
            "{} passed, {} failed of {} notebooks",
            self.passed_count(),
            self.failed_count(),
            self.results.len()
        ));
        lines.join("\n")
    }
}
